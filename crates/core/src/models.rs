use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Transport,
    Accommodation,
    Food,
    Entertainment,
    Shopping,
    Other,
}

impl ExpenseCategory {
    pub const ALL: [Self; 6] = [
        Self::Transport,
        Self::Accommodation,
        Self::Food,
        Self::Entertainment,
        Self::Shopping,
        Self::Other,
    ];

    pub fn from_code(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_code() == value)
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Accommodation => "accommodation",
            Self::Food => "food",
            Self::Entertainment => "entertainment",
            Self::Shopping => "shopping",
            Self::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Transport => "交通",
            Self::Accommodation => "住宿",
            Self::Food => "食物",
            Self::Entertainment => "娱乐",
            Self::Shopping => "购物",
            Self::Other => "其他",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Planning,
    Ongoing,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "planning" => Some(Self::Planning),
            "ongoing" => Some(Self::Ongoing),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Itinerary,
    Expense,
    TripInfo,
    BudgetNarrative,
}

impl RecordKind {
    pub fn as_code(self) -> &'static str {
        match self {
            Self::Itinerary => "itinerary",
            Self::Expense => "expense",
            Self::TripInfo => "trip_info",
            Self::BudgetNarrative => "budget_narrative",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStage {
    Strict,
    Recovered,
    Fallback,
}

impl ParseStage {
    pub fn as_code(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Recovered => "recovered",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction<T> {
    pub record: T,
    pub parse_stage: ParseStage,
}

impl<T> Extraction<T> {
    pub fn is_degraded(&self) -> bool {
        self.parse_stage == ParseStage::Fallback
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Extraction<U> {
        Extraction {
            record: f(self.record),
            parse_stage: self.parse_stage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub time: Option<String>,
    #[serde(rename = "activity")]
    pub name: Option<String>,
    pub location: Option<String>,
    pub duration: Option<String>,
    pub cost: Option<f64>,
    #[serde(rename = "type")]
    pub category: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    pub day: u32,
    pub date: Option<String>,
    pub activities: Vec<Activity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItineraryPlan {
    pub days: Vec<DayPlan>,
}

impl ItineraryPlan {
    pub fn null_record() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpenseDraft {
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub expense_date: Option<String>,
}

impl ExpenseDraft {
    pub fn null_record() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripInfoDraft {
    pub destination: Option<String>,
    pub title: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub budget: Option<f64>,
    pub travelers: Option<u32>,
    pub preferences: Option<String>,
}

impl TripInfoDraft {
    pub fn null_record() -> Self {
        Self::default()
    }
}

pub const PLACEHOLDER_ANALYSIS: &str = "暂时无法生成预算分析，请稍后重试。";
pub const PLACEHOLDER_SUGGESTION: &str = "暂无建议";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetNarrative {
    pub analysis: String,
    pub suggestions: [String; 3],
}

impl BudgetNarrative {
    pub fn null_record() -> Self {
        Self {
            analysis: PLACEHOLDER_ANALYSIS.to_string(),
            suggestions: [
                PLACEHOLDER_SUGGESTION.to_string(),
                PLACEHOLDER_SUGGESTION.to_string(),
                PLACEHOLDER_SUGGESTION.to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItineraryRequest {
    pub destination: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub preferences: Option<String>,
    #[serde(default)]
    pub travelers: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryContext {
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: u32,
    pub budget: Option<f64>,
    pub preferences: Option<String>,
    pub travelers: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseContext {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripInfoContext {
    pub text: String,
    #[serde(default)]
    pub reference_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetContext {
    pub title: String,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget: Option<f64>,
    pub travelers: Option<u32>,
    pub expenses: Vec<ExpenseRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub id: String,
    pub title: String,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget: Option<f64>,
    pub travelers: Option<u32>,
    pub preferences: Option<String>,
    pub status: TripStatus,
    pub itinerary: ItineraryPlan,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TripRecord {
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExpense {
    pub trip_id: String,
    pub amount: f64,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    pub expense_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub id: String,
    pub trip_id: String,
    pub amount: f64,
    pub category: ExpenseCategory,
    pub description: Option<String>,
    pub expense_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub trip_id: String,
    pub total_budget: Option<f64>,
    pub total_expenses: f64,
    pub remaining_budget: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: ExpenseCategory,
    pub amount: f64,
    pub count: usize,
}
