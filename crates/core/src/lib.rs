pub mod budget;
pub mod error;
pub mod extract;
pub mod models;
pub mod prompt;
pub mod validate;

pub use budget::{category_totals, summarize_budget};
pub use error::{PlannerError, PlannerResult};
pub use extract::{extract_record, parse_json_object, StructuredRecord};
pub use models::*;
pub use prompt::{Prompt, PromptBuilder, DEFAULT_YEAR};
pub use validate::{
    resolve_trip_title, validate_free_text, validate_itinerary_request, validate_new_expense,
    ValidExpense,
};
