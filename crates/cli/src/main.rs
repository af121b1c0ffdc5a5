use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use voyage_agents::TravelPlanner;
use voyage_core::{ItineraryRequest, NewExpense, PromptBuilder, DEFAULT_YEAR};
use voyage_llm::{CompletionBackend, CompletionTimeouts, LlmSettings};
use voyage_observability::{init_tracing, AppMetrics};
use voyage_storage::Store;

#[derive(Debug, Parser)]
#[command(name = "voyage")]
#[command(about = "Travel planner CLI backed by an LLM completion service")]
struct Cli {
    /// Without a database url trips only live for the duration of one command.
    #[arg(long, env = "VOYAGE_DATABASE_URL")]
    database_url: Option<String>,

    /// Year assumed when extracted dates omit it.
    #[arg(long, default_value_t = DEFAULT_YEAR)]
    default_year: i32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a day-by-day itinerary and store it as a new trip.
    Itinerary {
        #[arg(long)]
        destination: String,
        #[arg(long)]
        start_date: String,
        #[arg(long)]
        end_date: String,
        #[arg(long)]
        budget: Option<f64>,
        #[arg(long)]
        preferences: Option<String>,
        #[arg(long)]
        travelers: Option<u32>,
        #[arg(long)]
        title: Option<String>,
    },
    /// Extract one expense from free text.
    Expense { text: String },
    /// Extract trip parameters from free text.
    TripInfo {
        text: String,
        /// Anchor for relative dates such as 明天.
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Ask for a budget analysis of a trip's recorded expenses.
    Analyze {
        #[arg(long)]
        trip_id: String,
    },
    AddExpense {
        #[arg(long)]
        trip_id: String,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        category: String,
        #[arg(long)]
        date: String,
        #[arg(long)]
        description: Option<String>,
    },
    Summary {
        #[arg(long)]
        trip_id: String,
    },
    Trips,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing("voyage_cli");
    let cli = Cli::parse();

    let planner = build_planner(cli.database_url.as_deref(), cli.default_year).await?;

    match cli.command {
        Command::Itinerary {
            destination,
            start_date,
            end_date,
            budget,
            preferences,
            travelers,
            title,
        } => {
            let generated = planner
                .generate_itinerary(ItineraryRequest {
                    destination,
                    start_date,
                    end_date,
                    budget,
                    preferences,
                    travelers,
                    title,
                })
                .await?;
            print_json(&generated)?;
        }
        Command::Expense { text } => print_json(&planner.extract_expense(&text).await?)?,
        Command::TripInfo { text, today } => {
            print_json(&planner.parse_trip_info(&text, today).await?)?
        }
        Command::Analyze { trip_id } => print_json(&planner.analyze_budget(&trip_id).await?)?,
        Command::AddExpense {
            trip_id,
            amount,
            category,
            date,
            description,
        } => {
            let expense = planner
                .add_expense(NewExpense {
                    trip_id,
                    amount,
                    category,
                    description,
                    expense_date: date,
                })
                .await?;
            print_json(&expense)?;
        }
        Command::Summary { trip_id } => print_json(&planner.budget_summary(&trip_id).await?)?,
        Command::Trips => print_json(&planner.list_trips().await?)?,
    }

    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn build_planner(
    database_url: Option<&str>,
    default_year: i32,
) -> Result<TravelPlanner<Store, CompletionBackend>> {
    let backend = CompletionBackend::from_settings(LlmSettings::from_env())
        .context("failed to build completion client")?;
    let store = Store::from_url(database_url).await?;

    Ok(TravelPlanner::new(
        Arc::new(store),
        Arc::new(backend),
        PromptBuilder::with_default_year(default_year),
        CompletionTimeouts::from_env(),
        AppMetrics::shared(),
    ))
}
