use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use voyage_core::{ExpenseCategory, ExpenseRecord, ItineraryPlan, TripRecord, TripStatus};

pub trait TripRepository: Send + Sync {
    async fn create_trip(&self, trip: &TripRecord) -> Result<()>;
    async fn load_trip(&self, trip_id: &str) -> Result<Option<TripRecord>>;
    /// Newest first.
    async fn list_trips(&self) -> Result<Vec<TripRecord>>;
}

pub trait ExpenseRepository: Send + Sync {
    async fn add_expense(&self, expense: &ExpenseRecord) -> Result<()>;
    /// Ordered by expense date, then insertion time.
    async fn list_expenses(&self, trip_id: &str) -> Result<Vec<ExpenseRecord>>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    trips: Arc<RwLock<HashMap<String, TripRecord>>>,
    expenses: Arc<RwLock<Vec<ExpenseRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TripRepository for MemoryStore {
    async fn create_trip(&self, trip: &TripRecord) -> Result<()> {
        self.trips.write().insert(trip.id.clone(), trip.clone());
        Ok(())
    }

    async fn load_trip(&self, trip_id: &str) -> Result<Option<TripRecord>> {
        Ok(self.trips.read().get(trip_id).cloned())
    }

    async fn list_trips(&self) -> Result<Vec<TripRecord>> {
        let mut trips = self.trips.read().values().cloned().collect::<Vec<_>>();
        trips.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(trips)
    }
}

impl ExpenseRepository for MemoryStore {
    async fn add_expense(&self, expense: &ExpenseRecord) -> Result<()> {
        self.expenses.write().push(expense.clone());
        Ok(())
    }

    async fn list_expenses(&self, trip_id: &str) -> Result<Vec<ExpenseRecord>> {
        let mut expenses = self
            .expenses
            .read()
            .iter()
            .filter(|expense| expense.trip_id == trip_id)
            .cloned()
            .collect::<Vec<_>>();
        expenses.sort_by(|left, right| {
            left.expense_date
                .cmp(&right.expense_date)
                .then_with(|| left.created_at.cmp(&right.created_at))
        });
        Ok(expenses)
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url {}", database_url))?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to an in-memory database sees its own empty copy.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trips (
              id TEXT PRIMARY KEY,
              title TEXT NOT NULL,
              destination TEXT NOT NULL,
              start_date TEXT NOT NULL,
              end_date TEXT NOT NULL,
              budget REAL,
              travelers INTEGER,
              preferences TEXT,
              status TEXT NOT NULL DEFAULT 'planning',
              itinerary_json TEXT NOT NULL,
              created_at TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS expenses (
              id TEXT PRIMARY KEY,
              trip_id TEXT NOT NULL REFERENCES trips(id),
              amount REAL NOT NULL,
              category TEXT NOT NULL,
              description TEXT,
              expense_date TEXT NOT NULL,
              created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_expenses_trip ON expenses(trip_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("bad stored date {}", raw))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("bad stored timestamp {}", raw))?
        .with_timezone(&Utc))
}

fn trip_from_row(row: &SqliteRow) -> Result<TripRecord> {
    let itinerary_json: String = row.get("itinerary_json");
    let itinerary: ItineraryPlan =
        serde_json::from_str(&itinerary_json).context("stored itinerary is not valid json")?;
    let status: String = row.get("status");
    let travelers: Option<i64> = row.get("travelers");

    Ok(TripRecord {
        id: row.get("id"),
        title: row.get("title"),
        destination: row.get("destination"),
        start_date: parse_date(row.get::<String, _>("start_date").as_str())?,
        end_date: parse_date(row.get::<String, _>("end_date").as_str())?,
        budget: row.get("budget"),
        travelers: travelers.and_then(|value| u32::try_from(value).ok()),
        preferences: row.get("preferences"),
        status: TripStatus::parse(&status).unwrap_or(TripStatus::Planning),
        itinerary,
        created_at: parse_timestamp(row.get::<String, _>("created_at").as_str())?,
        updated_at: parse_timestamp(row.get::<String, _>("updated_at").as_str())?,
    })
}

fn expense_from_row(row: &SqliteRow) -> Result<ExpenseRecord> {
    let category: String = row.get("category");

    Ok(ExpenseRecord {
        id: row.get("id"),
        trip_id: row.get("trip_id"),
        amount: row.get("amount"),
        category: ExpenseCategory::from_code(&category).unwrap_or(ExpenseCategory::Other),
        description: row.get("description"),
        expense_date: parse_date(row.get::<String, _>("expense_date").as_str())?,
        created_at: parse_timestamp(row.get::<String, _>("created_at").as_str())?,
    })
}

impl TripRepository for SqliteStore {
    async fn create_trip(&self, trip: &TripRecord) -> Result<()> {
        let itinerary_json = serde_json::to_string(&trip.itinerary)?;

        sqlx::query(
            r#"
            INSERT INTO trips (
              id, title, destination, start_date, end_date, budget, travelers,
              preferences, status, itinerary_json, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&trip.id)
        .bind(&trip.title)
        .bind(&trip.destination)
        .bind(trip.start_date.format("%Y-%m-%d").to_string())
        .bind(trip.end_date.format("%Y-%m-%d").to_string())
        .bind(trip.budget)
        .bind(trip.travelers.map(i64::from))
        .bind(&trip.preferences)
        .bind(trip.status.as_code())
        .bind(itinerary_json)
        .bind(trip.created_at.to_rfc3339())
        .bind(trip.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed inserting trip {}", trip.id))?;

        Ok(())
    }

    async fn load_trip(&self, trip_id: &str) -> Result<Option<TripRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, destination, start_date, end_date, budget, travelers,
                   preferences, status, itinerary_json, created_at, updated_at
            FROM trips
            WHERE id = ?1
            "#,
        )
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(trip_from_row).transpose()
    }

    async fn list_trips(&self) -> Result<Vec<TripRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, destination, start_date, end_date, budget, travelers,
                   preferences, status, itinerary_json, created_at, updated_at
            FROM trips
            ORDER BY created_at DESC, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(trip_from_row).collect()
    }
}

impl ExpenseRepository for SqliteStore {
    async fn add_expense(&self, expense: &ExpenseRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO expenses (id, trip_id, amount, category, description, expense_date, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&expense.id)
        .bind(&expense.trip_id)
        .bind(expense.amount)
        .bind(expense.category.as_code())
        .bind(&expense.description)
        .bind(expense.expense_date.format("%Y-%m-%d").to_string())
        .bind(expense.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed inserting expense {}", expense.id))?;

        Ok(())
    }

    async fn list_expenses(&self, trip_id: &str) -> Result<Vec<ExpenseRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, trip_id, amount, category, description, expense_date, created_at
            FROM expenses
            WHERE trip_id = ?1
            ORDER BY expense_date, created_at
            "#,
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(expense_from_row).collect()
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }

    pub async fn from_url(database_url: Option<&str>) -> Result<Self> {
        match database_url.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => Self::sqlite(url).await,
            None => Ok(Self::memory()),
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Sqlite(_) => "sqlite",
        }
    }
}

impl TripRepository for Store {
    async fn create_trip(&self, trip: &TripRecord) -> Result<()> {
        match self {
            Store::Memory(store) => store.create_trip(trip).await,
            Store::Sqlite(store) => store.create_trip(trip).await,
        }
    }

    async fn load_trip(&self, trip_id: &str) -> Result<Option<TripRecord>> {
        match self {
            Store::Memory(store) => store.load_trip(trip_id).await,
            Store::Sqlite(store) => store.load_trip(trip_id).await,
        }
    }

    async fn list_trips(&self) -> Result<Vec<TripRecord>> {
        match self {
            Store::Memory(store) => store.list_trips().await,
            Store::Sqlite(store) => store.list_trips().await,
        }
    }
}

impl ExpenseRepository for Store {
    async fn add_expense(&self, expense: &ExpenseRecord) -> Result<()> {
        match self {
            Store::Memory(store) => store.add_expense(expense).await,
            Store::Sqlite(store) => store.add_expense(expense).await,
        }
    }

    async fn list_expenses(&self, trip_id: &str) -> Result<Vec<ExpenseRecord>> {
        match self {
            Store::Memory(store) => store.list_expenses(trip_id).await,
            Store::Sqlite(store) => store.list_expenses(trip_id).await,
        }
    }
}
