use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{PlannerError, PlannerResult};
use crate::extract::StructuredRecord;
use crate::models::{
    Activity, BudgetNarrative, DayPlan, ExpenseCategory, ExpenseDraft, ItineraryContext,
    ItineraryPlan, ItineraryRequest, NewExpense, RecordKind, TripInfoDraft,
    PLACEHOLDER_ANALYSIS, PLACEHOLDER_SUGGESTION,
};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const MAX_AMOUNT: f64 = 99_999_999.99;
pub const MAX_TRAVELERS: u32 = 999;
pub const MAX_DESTINATION_LEN: usize = 100;
pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_PREFERENCES_LEN: usize = 500;
pub const MAX_FREE_TEXT_LEN: usize = 2_000;
const MAX_FIELD_LEN: usize = 500;
const MAX_ANALYSIS_LEN: usize = 4_000;

static NULL: Value = Value::Null;

static DAY_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^day[\s_-]?(\d{1,3})$").expect("day key pattern compiles"));

#[derive(Debug, Clone, PartialEq)]
pub struct ValidExpense {
    pub amount: f64,
    pub category: ExpenseCategory,
    pub description: Option<String>,
    pub expense_date: NaiveDate,
}

/// Category gate for structured, human-entered input: only the six storage
/// codes are accepted.
pub fn validate_category_strict(raw: &str) -> PlannerResult<ExpenseCategory> {
    ExpenseCategory::from_code(raw).ok_or_else(|| {
        PlannerError::validation(format!(
            "category must be one of: {}",
            ExpenseCategory::ALL
                .iter()
                .map(|category| category.as_code())
                .collect::<Vec<_>>()
                .join("/")
        ))
    })
}

/// Category handling for model-extracted input: the model's label is passed
/// through as-is, only blank and literal null values are dropped.
pub fn accept_extracted_category(value: &Value) -> Option<String> {
    clean_text(value, 32)
}

pub fn parse_iso_date(raw: &str, field: &str) -> PlannerResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| PlannerError::validation(format!("{field} must use the YYYY-MM-DD format")))
}

pub fn normalize_extracted_date(value: &Value) -> Option<String> {
    let raw = value.as_str()?;
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .ok()
        .map(|date| date.format(DATE_FORMAT).to_string())
}

pub fn inclusive_day_count(start: NaiveDate, end: NaiveDate) -> PlannerResult<u32> {
    if end < start {
        return Err(PlannerError::validation(
            "end_date must not be before start_date",
        ));
    }

    u32::try_from((end - start).num_days() + 1)
        .map_err(|_| PlannerError::validation("trip is too long"))
}

pub fn bound_amount(raw: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    let clamped = raw.clamp(0.0, MAX_AMOUNT);
    Some((clamped * 100.0).round() / 100.0)
}

pub fn coerce_amount(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text
            .trim()
            .trim_end_matches('元')
            .trim()
            .replace(',', "")
            .parse::<f64>()
            .ok()?,
        _ => return None,
    };
    bound_amount(raw)
}

pub fn coerce_travelers(value: &Value) -> Option<u32> {
    let raw = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().trim_end_matches('人').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() || raw < 1.0 {
        return None;
    }
    Some((raw.round() as u32).min(MAX_TRAVELERS))
}

pub fn clean_text(value: &Value, max_len: usize) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => return None,
    };

    if text.is_empty() || text.eq_ignore_ascii_case("null") || text.eq_ignore_ascii_case("none") {
        return None;
    }

    Some(truncate_graphemes(&text, max_len))
}

pub fn truncate_graphemes(text: &str, max_len: usize) -> String {
    text.graphemes(true).take(max_len).collect::<String>().trim_end().to_string()
}

pub fn resolve_trip_title(title: Option<&str>, destination: &str) -> String {
    title
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| truncate_graphemes(value, MAX_TITLE_LEN))
        .unwrap_or_else(|| format!("{}之旅", destination))
}

pub fn validate_free_text(text: &str) -> PlannerResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(PlannerError::validation("text must not be empty"));
    }
    if text.graphemes(true).count() > MAX_FREE_TEXT_LEN {
        return Err(PlannerError::validation(format!(
            "text must be at most {MAX_FREE_TEXT_LEN} characters"
        )));
    }
    Ok(text.to_string())
}

pub fn validate_itinerary_request(request: &ItineraryRequest) -> PlannerResult<ItineraryContext> {
    let destination = request.destination.trim();
    if destination.is_empty() {
        return Err(PlannerError::validation("destination must not be empty"));
    }
    if destination.graphemes(true).count() > MAX_DESTINATION_LEN {
        return Err(PlannerError::validation(format!(
            "destination must be at most {MAX_DESTINATION_LEN} characters"
        )));
    }

    let start_date = parse_iso_date(&request.start_date, "start_date")?;
    let end_date = parse_iso_date(&request.end_date, "end_date")?;
    let days = inclusive_day_count(start_date, end_date)?;

    let budget = match request.budget {
        Some(value) if !value.is_finite() || value < 0.0 => {
            return Err(PlannerError::validation("budget must be a non-negative number"));
        }
        Some(value) => bound_amount(value),
        None => None,
    };

    if request.travelers == Some(0) {
        return Err(PlannerError::validation("travelers must be at least 1"));
    }

    let preferences = request
        .preferences
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(preferences) = preferences {
        if preferences.graphemes(true).count() > MAX_PREFERENCES_LEN {
            return Err(PlannerError::validation(format!(
                "preferences must be at most {MAX_PREFERENCES_LEN} characters"
            )));
        }
    }

    Ok(ItineraryContext {
        destination: destination.to_string(),
        start_date,
        end_date,
        days,
        budget,
        preferences: preferences.map(ToString::to_string),
        travelers: request.travelers.map(|value| value.min(MAX_TRAVELERS)),
    })
}

pub fn validate_new_expense(input: &NewExpense) -> PlannerResult<ValidExpense> {
    if !input.amount.is_finite() || input.amount < 0.0 || input.amount > MAX_AMOUNT {
        return Err(PlannerError::validation(
            "amount must be a non-negative number",
        ));
    }

    Ok(ValidExpense {
        amount: (input.amount * 100.0).round() / 100.0,
        category: validate_category_strict(&input.category)?,
        description: input
            .description
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| truncate_graphemes(value, MAX_FIELD_LEN)),
        expense_date: parse_iso_date(&input.expense_date, "expense_date")?,
    })
}

fn field<'a>(object: &'a Map<String, Value>, key: &str) -> &'a Value {
    object.get(key).unwrap_or(&NULL)
}

fn first_field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> &'a Value {
    keys.iter()
        .map(|key| field(object, key))
        .find(|value| !value.is_null())
        .unwrap_or(&NULL)
}

fn joined_text(value: &Value, max_len: usize) -> Option<String> {
    match value {
        Value::Array(items) => {
            let parts = items
                .iter()
                .filter_map(|item| clean_text(item, max_len))
                .collect::<Vec<_>>();
            if parts.is_empty() {
                None
            } else {
                Some(truncate_graphemes(&parts.join("、"), max_len))
            }
        }
        other => clean_text(other, max_len),
    }
}

impl StructuredRecord for ExpenseDraft {
    const KIND: RecordKind = RecordKind::Expense;

    fn null_record() -> Self {
        ExpenseDraft::null_record()
    }

    fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            amount: coerce_amount(field(object, "amount")),
            category: accept_extracted_category(field(object, "category")),
            description: clean_text(field(object, "description"), MAX_FIELD_LEN),
            expense_date: normalize_extracted_date(field(object, "expense_date")),
        }
    }
}

impl StructuredRecord for TripInfoDraft {
    const KIND: RecordKind = RecordKind::TripInfo;

    fn null_record() -> Self {
        TripInfoDraft::null_record()
    }

    fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            destination: clean_text(field(object, "destination"), MAX_DESTINATION_LEN),
            title: clean_text(field(object, "title"), MAX_TITLE_LEN),
            start_date: normalize_extracted_date(field(object, "start_date")),
            end_date: normalize_extracted_date(field(object, "end_date")),
            budget: coerce_amount(field(object, "budget")),
            travelers: coerce_travelers(field(object, "travelers")),
            preferences: joined_text(field(object, "preferences"), MAX_PREFERENCES_LEN),
        }
    }
}

impl StructuredRecord for ItineraryPlan {
    const KIND: RecordKind = RecordKind::Itinerary;

    fn null_record() -> Self {
        ItineraryPlan::null_record()
    }

    fn from_object(object: &Map<String, Value>) -> Self {
        let mut days = Vec::new();

        if let Some(Value::Array(items)) = object.get("days") {
            for (idx, item) in items.iter().enumerate() {
                if let Value::Object(day) = item {
                    let number = coerce_travelers(field(day, "day")).unwrap_or(idx as u32 + 1);
                    days.push(day_plan(number, item));
                }
            }
        }

        for (key, value) in object {
            let Some(captures) = DAY_KEY.captures(key.trim()) else {
                continue;
            };
            let Ok(number) = captures[1].parse::<u32>() else {
                continue;
            };
            days.push(day_plan(number, value));
        }

        days.sort_by_key(|day| day.day);
        Self { days }
    }
}

fn day_plan(day: u32, value: &Value) -> DayPlan {
    let (date, activities) = match value {
        Value::Object(entry) => (
            normalize_extracted_date(field(entry, "date")),
            field(entry, "activities"),
        ),
        Value::Array(_) => (None, value),
        _ => (None, &NULL),
    };

    let activities = activities
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(activity)
                .collect()
        })
        .unwrap_or_default();

    DayPlan {
        day,
        date,
        activities,
    }
}

fn activity(object: &Map<String, Value>) -> Activity {
    Activity {
        time: clean_text(field(object, "time"), 32),
        name: clean_text(first_field(object, &["activity", "name"]), MAX_TITLE_LEN),
        location: clean_text(field(object, "location"), MAX_TITLE_LEN),
        duration: clean_text(field(object, "duration"), 32),
        cost: coerce_amount(field(object, "cost")),
        category: accept_extracted_category(first_field(object, &["type", "category"])),
        description: clean_text(field(object, "description"), MAX_FIELD_LEN),
    }
}

impl StructuredRecord for BudgetNarrative {
    const KIND: RecordKind = RecordKind::BudgetNarrative;

    fn null_record() -> Self {
        BudgetNarrative::null_record()
    }

    fn from_object(object: &Map<String, Value>) -> Self {
        let analysis = clean_text(field(object, "analysis"), MAX_ANALYSIS_LEN)
            .unwrap_or_else(|| PLACEHOLDER_ANALYSIS.to_string());

        let mut suggestions = match field(object, "suggestions") {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| clean_text(item, MAX_FIELD_LEN))
                .collect::<Vec<_>>(),
            other => clean_text(other, MAX_FIELD_LEN).into_iter().collect(),
        };
        suggestions.truncate(3);
        suggestions.resize(3, PLACEHOLDER_SUGGESTION.to_string());
        let suggestions: [String; 3] = match suggestions.try_into() {
            Ok(exact) => exact,
            Err(_) => return BudgetNarrative::null_record(),
        };

        Self {
            analysis,
            suggestions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("test value is an object")
    }

    fn revalidate<R>(record: &R) -> R
    where
        R: StructuredRecord + serde::Serialize,
    {
        R::from_object(&object(serde_json::to_value(record).unwrap()))
    }

    #[test]
    fn strict_category_rejects_labels_and_unknown_codes() {
        assert_eq!(
            validate_category_strict("food").unwrap(),
            ExpenseCategory::Food
        );
        assert!(matches!(
            validate_category_strict("食物"),
            Err(PlannerError::Validation(_))
        ));
        assert!(validate_category_strict("Food").is_err());
        assert!(validate_category_strict("souvenirs").is_err());
    }

    #[test]
    fn extracted_category_passes_model_labels_through() {
        assert_eq!(
            accept_extracted_category(&json!("食物")),
            Some("食物".to_string())
        );
        assert_eq!(
            accept_extracted_category(&json!("纪念品")),
            Some("纪念品".to_string())
        );
        assert_eq!(accept_extracted_category(&json!("  ")), None);
        assert_eq!(accept_extracted_category(&json!("null")), None);
        assert_eq!(accept_extracted_category(&Value::Null), None);
    }

    #[test]
    fn direct_dates_must_be_iso() {
        assert!(parse_iso_date("2025-10-01", "expense_date").is_ok());
        let err = parse_iso_date("10月1日", "expense_date").unwrap_err();
        assert!(matches!(err, PlannerError::Validation(_)));
        assert!(err.to_string().contains("expense_date"));
    }

    #[test]
    fn extracted_dates_degrade_to_null() {
        assert_eq!(
            normalize_extracted_date(&json!("2025-10-01")),
            Some("2025-10-01".to_string())
        );
        assert_eq!(normalize_extracted_date(&json!("国庆节")), None);
        assert_eq!(normalize_extracted_date(&json!(20251001)), None);
    }

    #[test]
    fn amounts_are_bounded_and_rounded() {
        assert_eq!(coerce_amount(&json!(35.5)), Some(35.5));
        assert_eq!(coerce_amount(&json!("150元")), Some(150.0));
        assert_eq!(coerce_amount(&json!("1,200.456")), Some(1200.46));
        assert_eq!(coerce_amount(&json!(-20)), Some(0.0));
        assert_eq!(coerce_amount(&json!(1e12)), Some(MAX_AMOUNT));
        assert_eq!(coerce_amount(&json!("一百")), None);
        assert_eq!(coerce_amount(&Value::Null), None);
    }

    #[test]
    fn traveler_counts_are_positive_integers() {
        assert_eq!(coerce_travelers(&json!(2)), Some(2));
        assert_eq!(coerce_travelers(&json!("3人")), Some(3));
        assert_eq!(coerce_travelers(&json!(0)), None);
        assert_eq!(coerce_travelers(&json!("两人")), None);
    }

    #[test]
    fn nanjing_request_spans_four_days() {
        let context = validate_itinerary_request(&ItineraryRequest {
            destination: "Nanjing".to_string(),
            start_date: "2025-11-01".to_string(),
            end_date: "2025-11-04".to_string(),
            budget: Some(1000.0),
            preferences: None,
            travelers: None,
            title: None,
        })
        .unwrap();

        assert_eq!(context.days, 4);
        assert_eq!(context.budget, Some(1000.0));
    }

    #[test]
    fn itinerary_request_rejects_reversed_range() {
        let err = validate_itinerary_request(&ItineraryRequest {
            destination: "南京".to_string(),
            start_date: "2025-11-04".to_string(),
            end_date: "2025-11-01".to_string(),
            budget: None,
            preferences: None,
            travelers: None,
            title: None,
        })
        .unwrap_err();
        assert!(matches!(err, PlannerError::Validation(_)));
    }

    #[test]
    fn free_text_is_trimmed_and_bounded() {
        assert_eq!(validate_free_text("  打车50元 ").unwrap(), "打车50元");
        assert!(matches!(
            validate_free_text("   "),
            Err(PlannerError::Validation(_))
        ));
        assert!(validate_free_text(&"字".repeat(MAX_FREE_TEXT_LEN + 1)).is_err());
    }

    #[test]
    fn manual_expense_is_strict() {
        let valid = validate_new_expense(&NewExpense {
            trip_id: "t1".to_string(),
            amount: 88.5,
            category: "food".to_string(),
            description: Some("  午餐 ".to_string()),
            expense_date: "2025-10-01".to_string(),
        })
        .unwrap();
        assert_eq!(valid.category, ExpenseCategory::Food);
        assert_eq!(valid.description.as_deref(), Some("午餐"));

        let wrong_category = validate_new_expense(&NewExpense {
            trip_id: "t1".to_string(),
            amount: 10.0,
            category: "食物".to_string(),
            description: None,
            expense_date: "2025-10-01".to_string(),
        });
        assert!(wrong_category.is_err());

        let negative = validate_new_expense(&NewExpense {
            trip_id: "t1".to_string(),
            amount: -1.0,
            category: "food".to_string(),
            description: None,
            expense_date: "2025-10-01".to_string(),
        });
        assert!(negative.is_err());
    }

    #[test]
    fn itinerary_days_sort_numerically() {
        let plan = ItineraryPlan::from_object(&object(json!({
            "day10": { "date": "2025-11-10", "activities": [] },
            "day2": { "date": "2025-11-02", "activities": [] },
            "day1": {
                "date": "2025-11-01",
                "activities": [{
                    "time": "09:00",
                    "activity": "中山陵",
                    "location": "紫金山",
                    "duration": "2小时",
                    "cost": 0,
                    "type": "景点",
                    "description": "参观"
                }]
            },
            "summary": "ignored"
        })));

        let order = plan.days.iter().map(|day| day.day).collect::<Vec<_>>();
        assert_eq!(order, vec![1, 2, 10]);
        assert_eq!(plan.days[0].activities[0].name.as_deref(), Some("中山陵"));
        assert_eq!(plan.days[0].activities[0].category.as_deref(), Some("景点"));
    }

    #[test]
    fn narrative_always_has_three_suggestions() {
        let short = BudgetNarrative::from_object(&object(json!({
            "analysis": "餐饮支出偏高",
            "suggestions": ["少打车"]
        })));
        assert_eq!(short.suggestions[0], "少打车");
        assert_eq!(short.suggestions[1], PLACEHOLDER_SUGGESTION);

        let long = BudgetNarrative::from_object(&object(json!({
            "analysis": null,
            "suggestions": ["a", "b", "c", "d"]
        })));
        assert_eq!(long.analysis, PLACEHOLDER_ANALYSIS);
        assert_eq!(long.suggestions, ["a", "b", "c"].map(String::from));
    }

    #[test]
    fn validation_is_idempotent() {
        let expense = ExpenseDraft::from_object(&object(json!({
            "amount": "35.555元",
            "category": " 食物 ",
            "description": "晚餐",
            "expense_date": "2025-10-01"
        })));
        assert_eq!(revalidate(&expense), expense);

        let trip = TripInfoDraft::from_object(&object(json!({
            "destination": "东京",
            "title": "东京五日游",
            "start_date": "2025-12-25",
            "end_date": "bad",
            "budget": 10000,
            "travelers": "2人",
            "preferences": ["美食", "动漫文化"]
        })));
        assert_eq!(trip.preferences.as_deref(), Some("美食、动漫文化"));
        assert_eq!(revalidate(&trip), trip);

        let plan = ItineraryPlan::from_object(&object(json!({
            "day1": { "date": "2025-11-01", "activities": [{ "activity": "早餐", "cost": "50", "duration": 1 }] },
            "day2": { "activities": [] }
        })));
        assert_eq!(revalidate(&plan), plan);

        let narrative = BudgetNarrative::from_object(&object(json!({
            "analysis": "总体合理",
            "suggestions": ["x", "y"]
        })));
        assert_eq!(revalidate(&narrative), narrative);
    }
}
