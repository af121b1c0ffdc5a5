use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use voyage_core::{
    extract_record, resolve_trip_title, summarize_budget, validate_free_text,
    validate_itinerary_request, validate_new_expense, BudgetContext, BudgetNarrative,
    BudgetSummary, ExpenseContext, ExpenseDraft, ExpenseRecord, Extraction, ItineraryPlan,
    ItineraryRequest, NewExpense, ParseStage, PlannerError, PlannerResult, Prompt, PromptBuilder,
    StructuredRecord, TripInfoContext, TripInfoDraft, TripRecord, TripStatus,
};
use voyage_llm::{CompletionClient, CompletionRequest, CompletionTimeouts};
use voyage_observability::AppMetrics;
use voyage_storage::{ExpenseRepository, TripRepository};

#[derive(Clone)]
pub struct TravelPlanner<S, C>
where
    S: TripRepository + ExpenseRepository,
    C: CompletionClient,
{
    store: Arc<S>,
    client: Arc<C>,
    prompts: PromptBuilder,
    timeouts: CompletionTimeouts,
    metrics: Arc<AppMetrics>,
}

impl<S, C> TravelPlanner<S, C>
where
    S: TripRepository + ExpenseRepository,
    C: CompletionClient,
{
    pub fn new(
        store: Arc<S>,
        client: Arc<C>,
        prompts: PromptBuilder,
        timeouts: CompletionTimeouts,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            store,
            client,
            prompts,
            timeouts,
            metrics,
        }
    }

    pub fn metrics(&self) -> &AppMetrics {
        &self.metrics
    }

    #[instrument(skip(self, request), fields(destination = %request.destination))]
    pub async fn generate_itinerary(
        &self,
        request: ItineraryRequest,
    ) -> PlannerResult<Extraction<TripRecord>> {
        self.metrics.inc_request();
        let context = validate_itinerary_request(&request)?;
        let prompt = self.prompts.itinerary(&context);

        let extraction = self.complete::<ItineraryPlan>(prompt).await?;

        let now = Utc::now();
        let title = resolve_trip_title(request.title.as_deref(), &context.destination);
        let trip = extraction.map(|itinerary| TripRecord {
            id: Uuid::new_v4().to_string(),
            title,
            destination: context.destination.clone(),
            start_date: context.start_date,
            end_date: context.end_date,
            budget: context.budget,
            travelers: context.travelers,
            preferences: context.preferences.clone(),
            status: TripStatus::Planning,
            itinerary,
            created_at: now,
            updated_at: now,
        });

        self.store
            .create_trip(&trip.record)
            .await
            .map_err(PlannerError::Storage)?;

        info!(
            trip_id = %trip.record.id,
            days = context.days,
            planned_days = trip.record.itinerary.days.len(),
            parse_stage = trip.parse_stage.as_code(),
            "itinerary generated"
        );

        Ok(trip)
    }

    #[instrument(skip(self, text))]
    pub async fn extract_expense(&self, text: &str) -> PlannerResult<Extraction<ExpenseDraft>> {
        self.metrics.inc_request();
        let text = validate_free_text(text)?;
        let prompt = self.prompts.expense(&ExpenseContext { text });
        self.complete::<ExpenseDraft>(prompt).await
    }

    #[instrument(skip(self, text))]
    pub async fn parse_trip_info(
        &self,
        text: &str,
        reference_date: Option<NaiveDate>,
    ) -> PlannerResult<Extraction<TripInfoDraft>> {
        self.metrics.inc_request();
        let text = validate_free_text(text)?;
        let prompt = self.prompts.trip_info(&TripInfoContext {
            text,
            reference_date,
        });
        self.complete::<TripInfoDraft>(prompt).await
    }

    #[instrument(skip(self))]
    pub async fn analyze_budget(&self, trip_id: &str) -> PlannerResult<Extraction<BudgetNarrative>> {
        self.metrics.inc_request();
        let trip = self.get_trip(trip_id).await?;
        let expenses = self
            .store
            .list_expenses(trip_id)
            .await
            .map_err(PlannerError::Storage)?;
        if expenses.is_empty() {
            return Err(PlannerError::validation(
                "budget analysis needs at least one recorded expense",
            ));
        }

        let prompt = self.prompts.budget_analysis(&BudgetContext {
            title: trip.title,
            destination: trip.destination,
            start_date: trip.start_date,
            end_date: trip.end_date,
            budget: trip.budget,
            travelers: trip.travelers,
            expenses,
        });
        self.complete::<BudgetNarrative>(prompt).await
    }

    #[instrument(skip(self, input), fields(trip_id = %input.trip_id))]
    pub async fn add_expense(&self, input: NewExpense) -> PlannerResult<ExpenseRecord> {
        self.metrics.inc_request();
        let valid = validate_new_expense(&input)?;
        self.get_trip(&input.trip_id).await?;

        let expense = ExpenseRecord {
            id: Uuid::new_v4().to_string(),
            trip_id: input.trip_id,
            amount: valid.amount,
            category: valid.category,
            description: valid.description,
            expense_date: valid.expense_date,
            created_at: Utc::now(),
        };

        self.store
            .add_expense(&expense)
            .await
            .map_err(PlannerError::Storage)?;

        info!(
            expense_id = %expense.id,
            category = expense.category.as_code(),
            "expense recorded"
        );
        Ok(expense)
    }

    pub async fn list_expenses(&self, trip_id: &str) -> PlannerResult<Vec<ExpenseRecord>> {
        self.get_trip(trip_id).await?;
        self.store
            .list_expenses(trip_id)
            .await
            .map_err(PlannerError::Storage)
    }

    pub async fn budget_summary(&self, trip_id: &str) -> PlannerResult<BudgetSummary> {
        let trip = self.get_trip(trip_id).await?;
        let expenses = self
            .store
            .list_expenses(trip_id)
            .await
            .map_err(PlannerError::Storage)?;
        Ok(summarize_budget(&trip.id, trip.budget, &expenses))
    }

    pub async fn get_trip(&self, trip_id: &str) -> PlannerResult<TripRecord> {
        self.store
            .load_trip(trip_id)
            .await
            .map_err(PlannerError::Storage)?
            .ok_or_else(|| PlannerError::NotFound(format!("trip {trip_id}")))
    }

    pub async fn list_trips(&self) -> PlannerResult<Vec<TripRecord>> {
        self.store.list_trips().await.map_err(PlannerError::Storage)
    }

    async fn complete<R: StructuredRecord>(&self, prompt: Prompt) -> PlannerResult<Extraction<R>> {
        let purpose = R::KIND.as_code();
        let request = CompletionRequest::new(R::KIND, prompt, self.timeouts.for_kind(R::KIND));

        let started = Instant::now();
        let response = match self.client.complete(&request).await {
            Ok(response) => response,
            Err(err) => {
                if matches!(err, PlannerError::Upstream(_)) {
                    self.metrics.inc_upstream_failure(purpose);
                }
                warn!(use_case = purpose, error = %err, "completion failed");
                return Err(err);
            }
        };
        let elapsed = started.elapsed();
        self.metrics.observe_completion(purpose, elapsed);

        let extraction = extract_record::<R>(&response.content);
        match extraction.parse_stage {
            ParseStage::Strict => {}
            ParseStage::Recovered => self.metrics.inc_recovered_parse(purpose),
            ParseStage::Fallback => {
                self.metrics.inc_fallback_parse(purpose);
                warn!(
                    use_case = purpose,
                    "completion text held no JSON object, returning null record"
                );
            }
        }

        info!(
            use_case = purpose,
            parse_stage = extraction.parse_stage.as_code(),
            elapsed_ms = elapsed.as_millis() as u64,
            model = response.model.as_deref().unwrap_or("unknown"),
            "extraction completed"
        );

        Ok(extraction)
    }
}
