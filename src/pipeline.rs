//! Lead pipeline orchestration.
//!
//! A run walks a fixed state machine:
//!
//! ```text
//! Start -> Enriching -> FindingOpportunities -> Scoring -+-> Routing ----------+-> Done
//!                                                        +-> MarkingUnqualified +
//! ```
//!
//! Scoring branches to routing only when the score reaches
//! [`ROUTING_SCORE_THRESHOLD`]. Every stage is wrapped in a timeout, and once
//! an error is recorded the remaining stages are skipped. Runs are
//! independent; cancelling one is done by dropping its future.

use crate::decision::{DecisionDelegate, RuleBasedDelegate};
use crate::errors::{ErrorKind, PipelineError, ResultExt};
use crate::models::{
    CompanyMetadata, EnrichedLead, InboundLead, OpportunityReport, RoutingDecision, ScoreCard,
    Stage, StageOutcome, UNASSIGNED_ERROR, UNASSIGNED_SCORE_TOO_LOW,
};
use crate::providers::{EnrichmentProvider, OpportunityProvider};
use crate::state::LeadState;
use crate::tables::{DecisionTables, TableHandle};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Leads scoring at or above this value go to routing.
pub const ROUTING_SCORE_THRESHOLD: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Upper bound on each stage's collaborator call.
    pub stage_timeout: Duration,
    /// Fetch metadata and opportunities at the same time. Results are still
    /// applied in stage order.
    pub concurrent_enrichment: bool,
    /// Treat a failed score card as a run error instead of a zero score.
    pub strict_scoring: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(30),
            concurrent_enrichment: false,
            strict_scoring: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    Start,
    Enriching,
    FindingOpportunities,
    Scoring,
    Routing,
    MarkingUnqualified,
    Done,
}

impl PipelineStep {
    /// Transition table. The only data-dependent edge is after scoring.
    pub fn next(self, state: &LeadState) -> PipelineStep {
        match self {
            PipelineStep::Start => PipelineStep::Enriching,
            PipelineStep::Enriching => PipelineStep::FindingOpportunities,
            PipelineStep::FindingOpportunities => PipelineStep::Scoring,
            PipelineStep::Scoring => {
                if state.score().unwrap_or(0) >= ROUTING_SCORE_THRESHOLD {
                    PipelineStep::Routing
                } else {
                    PipelineStep::MarkingUnqualified
                }
            }
            PipelineStep::Routing | PipelineStep::MarkingUnqualified | PipelineStep::Done => {
                PipelineStep::Done
            }
        }
    }
}

type Timed<T> = (Result<T, PipelineError>, Duration);

/// Collaborator results fetched ahead of their stage in concurrent mode.
#[derive(Default)]
struct Prefetched {
    metadata: Option<Timed<CompanyMetadata>>,
    opportunities: Option<Timed<OpportunityReport>>,
}

pub struct PipelineEngine {
    enrichment: Arc<dyn EnrichmentProvider>,
    opportunities: Arc<dyn OpportunityProvider>,
    decisions: Arc<dyn DecisionDelegate>,
    tables: Arc<TableHandle>,
    options: PipelineOptions,
}

impl PipelineEngine {
    /// Creates an engine using the rule-based decision delegate and default options.
    pub fn new(
        enrichment: Arc<dyn EnrichmentProvider>,
        opportunities: Arc<dyn OpportunityProvider>,
        tables: Arc<TableHandle>,
    ) -> Self {
        Self {
            enrichment,
            opportunities,
            decisions: Arc::new(RuleBasedDelegate),
            tables,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_decision_delegate(mut self, decisions: Arc<dyn DecisionDelegate>) -> Self {
        self.decisions = decisions;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Runs one lead through the pipeline.
    ///
    /// Never fails: stage errors are captured in the returned state's `error`.
    /// The decision tables snapshot is taken once, up front, and used for the
    /// whole run.
    pub async fn run(&self, inbound: InboundLead) -> LeadState {
        let snapshot = self.tables.snapshot();
        let mut state = LeadState::new(inbound, &snapshot.fingerprint);
        let span = tracing::info_span!("lead_pipeline", run_id = %state.run_id());

        async move {
            let Some(company) = state.inbound_lead().company_name().map(str::to_string) else {
                state.fail(
                    None,
                    &PipelineError::MissingInput("No company name provided".to_string()),
                );
                state.finish();
                return state;
            };

            tracing::info!(
                "Starting pipeline for '{}' (delegate: {}, tables {})",
                company,
                self.decisions.name(),
                &snapshot.fingerprint[..12]
            );

            let mut prefetched = Prefetched::default();
            let mut step = PipelineStep::Start;
            while step != PipelineStep::Done {
                state = match step {
                    PipelineStep::Start => state,
                    PipelineStep::Enriching => {
                        self.enrich(state, &company, &mut prefetched).await
                    }
                    PipelineStep::FindingOpportunities => {
                        self.find_opportunities(state, &company, &mut prefetched)
                            .await
                    }
                    PipelineStep::Scoring => self.score(state, &snapshot.tables).await,
                    PipelineStep::Routing => self.route(state, &snapshot.tables).await,
                    PipelineStep::MarkingUnqualified => mark_unqualified(state),
                    PipelineStep::Done => state,
                };
                step = step.next(&state);
            }

            state.finish();
            match state.error() {
                Some(err) => tracing::warn!("Pipeline for '{}' finished with error: {}", company, err),
                None => tracing::info!(
                    "✅ Pipeline for '{}' finished: score {:?}, assigned to {:?}",
                    company,
                    state.score(),
                    state.assigned_rep()
                ),
            }
            state
        }
        .instrument(span)
        .await
    }

    async fn with_timeout<T>(
        &self,
        stage: Stage,
        fut: impl Future<Output = Result<T, PipelineError>>,
    ) -> Timed<T> {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.options.stage_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout(format!(
                "{} did not finish within {:?}",
                stage, self.options.stage_timeout
            ))),
        };
        (result, started.elapsed())
    }

    async fn fetch_metadata(&self, company: &str) -> Timed<CompanyMetadata> {
        self.with_timeout(Stage::MetadataEnrichment, self.enrichment.fetch(company))
            .await
    }

    async fn fetch_opportunities(&self, company: &str) -> Timed<OpportunityReport> {
        self.with_timeout(Stage::OpportunityEnrichment, async {
            Ok(self.opportunities.fetch(company).await)
        })
        .await
    }

    async fn enrich(
        &self,
        mut state: LeadState,
        company: &str,
        prefetched: &mut Prefetched,
    ) -> LeadState {
        let stage = Stage::MetadataEnrichment;
        if skip_if_failed(&mut state, stage) {
            return state;
        }

        if self.options.concurrent_enrichment {
            tracing::debug!("Fetching metadata and opportunities concurrently");
            let (metadata, opportunities) = tokio::join!(
                self.fetch_metadata(company),
                self.fetch_opportunities(company)
            );
            prefetched.metadata = Some(metadata);
            prefetched.opportunities = Some(opportunities);
        }

        let (result, elapsed) = match prefetched.metadata.take() {
            Some(timed) => timed,
            None => self.fetch_metadata(company).await,
        };

        match result.context("Metadata enrichment failed") {
            Ok(metadata) => {
                let enriched = EnrichedLead::from_metadata(metadata);
                tracing::info!(
                    "✓ Enriched '{}': industry '{}', {} location(s)",
                    company,
                    enriched.industry,
                    enriched.locations.len()
                );
                state.set_enriched_lead(enriched);
                state.record(stage, StageOutcome::Completed, elapsed);
            }
            Err(e) => {
                state.fail(Some(stage), &e);
                state.record(stage, StageOutcome::Failed, elapsed);
            }
        }
        state
    }

    async fn find_opportunities(
        &self,
        mut state: LeadState,
        company: &str,
        prefetched: &mut Prefetched,
    ) -> LeadState {
        let stage = Stage::OpportunityEnrichment;
        if skip_if_failed(&mut state, stage) {
            return state;
        }

        let (result, elapsed) = match prefetched.opportunities.take() {
            Some(timed) => timed,
            None => self.fetch_opportunities(company).await,
        };

        match result {
            Ok(mut report) => {
                let from_news = report.signals_from_news();
                if !from_news.is_empty() {
                    report.opportunity_signals = from_news;
                }
                let signals = report.opportunity_signals.clone();
                tracing::info!("✓ {} opportunity signal(s) for '{}'", signals.len(), company);
                state.set_opportunity(report);
                state.append_opportunity_signals(signals);
                state.record(stage, StageOutcome::Completed, elapsed);
            }
            Err(e) => {
                state.fail(Some(stage), &e);
                state.record(stage, StageOutcome::Failed, elapsed);
            }
        }
        state
    }

    async fn score(&self, mut state: LeadState, tables: &DecisionTables) -> LeadState {
        let stage = Stage::IcpScoring;
        if skip_if_failed(&mut state, stage) {
            return state;
        }

        let Some(lead) = state.enriched_lead().cloned() else {
            state.fail(
                Some(stage),
                &PipelineError::MissingInput("enriched lead not available".to_string()),
            );
            state.record(stage, StageOutcome::Failed, Duration::ZERO);
            return state;
        };

        let (result, elapsed) = self
            .with_timeout(stage, self.decisions.score(&lead, tables))
            .await;

        let card = match result {
            Ok(card) => card,
            Err(e) if e.kind() == ErrorKind::DecisionParse => {
                tracing::warn!("Score response unusable: {}", e);
                ScoreCard::failed(format!("Failed to parse score: {}", e))
            }
            Err(e) => {
                state.fail(Some(stage), &e);
                state.record(stage, StageOutcome::Failed, elapsed);
                return state;
            }
        };

        let failed = card.is_failed();
        let reason = card.recommendation.clone();
        tracing::info!("✓ ICP score {} ({} categories)", card.score, card.breakdown.len());
        state.set_score_card(card);

        if failed && self.options.strict_scoring {
            state.fail(Some(stage), &PipelineError::DecisionParse(reason));
            state.record(stage, StageOutcome::Failed, elapsed);
        } else {
            state.record(stage, StageOutcome::Completed, elapsed);
        }
        state
    }

    async fn route(&self, mut state: LeadState, tables: &DecisionTables) -> LeadState {
        let stage = Stage::SdrRouting;
        if skip_if_failed(&mut state, stage) {
            return state;
        }

        let (Some(lead), Some(score)) = (state.enriched_lead().cloned(), state.score()) else {
            state.fail(
                Some(stage),
                &PipelineError::MissingInput("score not available for routing".to_string()),
            );
            state.record(stage, StageOutcome::Failed, Duration::ZERO);
            return state;
        };

        let (result, elapsed) = self
            .with_timeout(stage, self.decisions.route(&lead, score, tables))
            .await;

        let decision = match result {
            Ok(decision) => decision,
            Err(e) if e.kind() == ErrorKind::DecisionParse => {
                tracing::warn!("Routing response unusable: {}", e);
                RoutingDecision::unassigned_as(
                    UNASSIGNED_ERROR,
                    format!("Error parsing routing response: {}", e),
                )
            }
            Err(e) => {
                state.fail(Some(stage), &e);
                state.record(stage, StageOutcome::Failed, elapsed);
                return state;
            }
        };

        tracing::info!("✓ Routed to {}: {}", decision.assigned_rep, decision.routing_reason);
        state.set_routing(decision);
        state.record(stage, StageOutcome::Completed, elapsed);
        state
    }
}

/// Records a skip when an earlier stage already failed.
fn skip_if_failed(state: &mut LeadState, stage: Stage) -> bool {
    if state.has_error() {
        tracing::warn!("Skipping {} after earlier error", stage);
        state.record(stage, StageOutcome::Skipped, Duration::ZERO);
        return true;
    }
    false
}

fn mark_unqualified(mut state: LeadState) -> LeadState {
    let stage = Stage::MarkUnqualified;
    if skip_if_failed(&mut state, stage) {
        return state;
    }

    let started = Instant::now();
    let score = state.score().unwrap_or(0);
    tracing::info!("Lead below threshold ({} < {})", score, ROUTING_SCORE_THRESHOLD);
    state.set_routing(RoutingDecision::unassigned_as(
        UNASSIGNED_SCORE_TOO_LOW,
        format!(
            "Lead score ({}) is below minimum threshold of {}",
            score, ROUTING_SCORE_THRESHOLD
        ),
    ));
    state.record(stage, StageOutcome::Completed, started.elapsed());
    state
}
