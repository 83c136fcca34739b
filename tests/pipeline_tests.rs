/// End-to-end pipeline tests with in-memory collaborators
/// Covers branching, error propagation, timeouts, concurrency and cancellation
use async_trait::async_trait;
use lead_pipeline::decision::DecisionDelegate;
use lead_pipeline::errors::{ErrorKind, PipelineError};
use lead_pipeline::models::{
    CompanyMetadata, CompanySize, EnrichedLead, InboundLead, NewsItem, OpportunityReport,
    RoutingDecision, ScoreCard, ScoreCategory, StageOutcome, UNASSIGNED_ERROR,
    UNASSIGNED_SCORE_TOO_LOW,
};
use lead_pipeline::pipeline::{PipelineEngine, PipelineOptions};
use lead_pipeline::providers::{EnrichmentProvider, OpportunityProvider};
use lead_pipeline::tables::{DecisionTables, TableHandle};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

// ============ Fakes ============

#[derive(Default)]
struct FakeEnrichment {
    companies: HashMap<String, CompanyMetadata>,
    delay: Duration,
    calls: AtomicUsize,
    rendezvous: Option<Arc<Barrier>>,
}

impl FakeEnrichment {
    fn with(company: &str, metadata: CompanyMetadata) -> Self {
        let mut companies = HashMap::new();
        companies.insert(company.to_string(), metadata);
        Self {
            companies,
            ..Default::default()
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl EnrichmentProvider for FakeEnrichment {
    async fn fetch(&self, company_name: &str) -> Result<CompanyMetadata, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.rendezvous {
            barrier.wait().await;
        }
        tokio::time::sleep(self.delay).await;
        self.companies
            .get(company_name)
            .cloned()
            .ok_or_else(|| PipelineError::NoData(format!("no record for '{}'", company_name)))
    }
}

#[derive(Default)]
struct FakeOpportunities {
    report: OpportunityReport,
    delay: Duration,
    calls: AtomicUsize,
    rendezvous: Option<Arc<Barrier>>,
}

#[async_trait]
impl OpportunityProvider for FakeOpportunities {
    async fn fetch(&self, _company_name: &str) -> OpportunityReport {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.rendezvous {
            barrier.wait().await;
        }
        tokio::time::sleep(self.delay).await;
        self.report.clone()
    }
}

/// Decision delegate answering from fixed results.
struct ScriptedDelegate {
    score: Result<ScoreCard, PipelineError>,
    route: Result<RoutingDecision, PipelineError>,
    route_calls: AtomicUsize,
}

impl ScriptedDelegate {
    fn new(
        score: Result<ScoreCard, PipelineError>,
        route: Result<RoutingDecision, PipelineError>,
    ) -> Self {
        Self {
            score,
            route,
            route_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DecisionDelegate for ScriptedDelegate {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn score(
        &self,
        _lead: &EnrichedLead,
        _tables: &DecisionTables,
    ) -> Result<ScoreCard, PipelineError> {
        self.score.clone()
    }

    async fn route(
        &self,
        _lead: &EnrichedLead,
        _score: u32,
        _tables: &DecisionTables,
    ) -> Result<RoutingDecision, PipelineError> {
        self.route_calls.fetch_add(1, Ordering::SeqCst);
        self.route.clone()
    }
}

/// Enrichment that never answers and flags when its future is dropped.
struct HangingEnrichment {
    dropped: Arc<AtomicBool>,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EnrichmentProvider for HangingEnrichment {
    async fn fetch(&self, _company_name: &str) -> Result<CompanyMetadata, PipelineError> {
        let _flag = DropFlag(Arc::clone(&self.dropped));
        std::future::pending::<()>().await;
        unreachable!()
    }
}

// ============ Helpers ============

fn saas_metadata() -> CompanyMetadata {
    CompanyMetadata {
        industry: "SaaS".into(),
        company_size: Some(CompanySize::Count(600)),
        locations: vec!["USA".into()],
        technologies: vec!["Azure".into(), "AWS".into()],
        strategic_focus: vec!["Digital Transformation".into()],
        ..Default::default()
    }
}

fn retail_metadata() -> CompanyMetadata {
    CompanyMetadata {
        industry: "Retail".into(),
        company_size: Some(CompanySize::Count(150)),
        locations: vec!["UK".into()],
        technologies: vec!["Kubernetes".into(), "Docker".into()],
        strategic_focus: vec!["Innovation".into()],
        ..Default::default()
    }
}

fn engine(enrichment: FakeEnrichment, opportunities: FakeOpportunities) -> PipelineEngine {
    PipelineEngine::new(
        Arc::new(enrichment),
        Arc::new(opportunities),
        Arc::new(TableHandle::default()),
    )
}

fn card(score: u32) -> ScoreCard {
    let mut breakdown = BTreeMap::new();
    breakdown.insert(ScoreCategory::Industry, score.min(20));
    ScoreCard {
        score,
        breakdown,
        recommendation: "scripted".into(),
    }
}

fn outcomes(state: &lead_pipeline::state::LeadState) -> Vec<(&'static str, StageOutcome)> {
    state
        .history()
        .iter()
        .map(|record| (record.stage.name(), record.outcome))
        .collect()
}

// ============ Scenarios ============

#[tokio::test]
async fn test_qualified_lead_is_scored_and_routed() {
    let engine = engine(
        FakeEnrichment::with("Contoso", saas_metadata()),
        FakeOpportunities::default(),
    );

    let state = engine.run(InboundLead::for_company("Contoso")).await;

    assert!(state.error().is_none());
    assert_eq!(state.score(), Some(70));
    let breakdown = state.score_breakdown().unwrap();
    assert_eq!(breakdown[&ScoreCategory::Industry], 20);
    assert_eq!(breakdown[&ScoreCategory::CompanySize], 20);
    assert_eq!(breakdown[&ScoreCategory::Technologies], 10);
    assert_eq!(breakdown[&ScoreCategory::StrategicFocus], 5);
    assert_eq!(breakdown[&ScoreCategory::Location], 10);
    assert_eq!(breakdown[&ScoreCategory::Opportunities], 5);

    assert_eq!(state.assigned_rep(), Some("Sarah Chen"));
    assert_eq!(state.rep_email(), Some("sarah.chen@deloitte.com"));
    assert_eq!(
        state.stage_names(),
        vec![
            "metadata_enrichment",
            "opportunity_enrichment",
            "icp_scoring",
            "sdr_routing"
        ]
    );
    assert!(state.finished_at().is_some());
    assert_eq!(state.tables_fingerprint(), DecisionTables::default().fingerprint());
}

#[tokio::test]
async fn test_low_score_is_marked_unqualified() {
    let engine = engine(
        FakeEnrichment::with("Fabrikam", retail_metadata()),
        FakeOpportunities::default(),
    );

    let state = engine.run(InboundLead::for_company("Fabrikam")).await;

    assert!(state.error().is_none());
    assert_eq!(state.score(), Some(45));
    assert_eq!(state.assigned_rep(), Some(UNASSIGNED_SCORE_TOO_LOW));
    let reason = state.routing_reason().unwrap();
    assert!(reason.contains("45"));
    assert!(reason.contains("60"));
    assert_eq!(state.stage_names().last(), Some(&"mark_unqualified"));
}

#[tokio::test]
async fn test_blank_company_fails_before_any_stage() {
    let enrichment = Arc::new(FakeEnrichment::with("Contoso", saas_metadata()));
    let engine = PipelineEngine::new(
        enrichment.clone(),
        Arc::new(FakeOpportunities::default()),
        Arc::new(TableHandle::default()),
    );

    for company in ["", "   "] {
        let state = engine.run(InboundLead::for_company(company)).await;
        let error = state.error().unwrap();
        assert_eq!(error.kind, ErrorKind::MissingInput);
        assert!(error.stage.is_none());
        assert!(state.history().is_empty());
        assert!(state.enriched_lead().is_none());
        assert!(state.routing().is_none());
    }
    assert_eq!(enrichment.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_opportunity_signals_feed_scoring() {
    let news = |label: &str| NewsItem {
        title: format!("{} news", label),
        opportunity_type: label.to_string(),
        ..Default::default()
    };
    let opportunities = FakeOpportunities {
        report: OpportunityReport {
            news_items: vec![news("Cloud Migration"), news("Cloud Migration"), news("Product Launch")],
            ..Default::default()
        },
        ..Default::default()
    };
    let engine = engine(FakeEnrichment::with("Contoso", saas_metadata()), opportunities);

    let state = engine.run(InboundLead::for_company("Contoso")).await;

    let enriched = state.enriched_lead().unwrap();
    assert_eq!(enriched.opportunity_signals.len(), 3);
    assert_eq!(
        state.opportunity().unwrap().opportunity_signals,
        enriched.opportunity_signals
    );
    // 7 + 7 + 5 replaces the floor of 5.
    assert_eq!(state.score_breakdown().unwrap()[&ScoreCategory::Opportunities], 19);
    assert_eq!(state.score(), Some(84));
    assert!(state.recommendation().unwrap().starts_with("Strong ICP fit"));
}

// ============ Error propagation ============

#[tokio::test]
async fn test_first_error_skips_remaining_stages() {
    let opportunities = Arc::new(FakeOpportunities::default());
    let engine = PipelineEngine::new(
        Arc::new(FakeEnrichment::default()),
        opportunities.clone(),
        Arc::new(TableHandle::default()),
    );

    let state = engine.run(InboundLead::for_company("Unknown Co")).await;

    let error = state.error().unwrap();
    assert_eq!(error.kind, ErrorKind::NoData);
    assert_eq!(error.stage.map(|s| s.name()), Some("metadata_enrichment"));
    assert_eq!(
        outcomes(&state),
        vec![
            ("metadata_enrichment", StageOutcome::Failed),
            ("opportunity_enrichment", StageOutcome::Skipped),
            ("icp_scoring", StageOutcome::Skipped),
            ("mark_unqualified", StageOutcome::Skipped),
        ]
    );
    assert!(state.score().is_none());
    assert!(state.routing().is_none());
    assert_eq!(opportunities.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stage_timeout_is_recorded() {
    let engine = engine(
        FakeEnrichment::with("Contoso", saas_metadata()).delayed(Duration::from_millis(500)),
        FakeOpportunities::default(),
    )
    .with_options(PipelineOptions {
        stage_timeout: Duration::from_millis(50),
        ..Default::default()
    });

    let state = engine.run(InboundLead::for_company("Contoso")).await;

    let error = state.error().unwrap();
    assert_eq!(error.kind, ErrorKind::Timeout);
    assert!(error.message.contains("metadata_enrichment"));
    assert!(state.enriched_lead().is_none());
}

#[tokio::test]
async fn test_unparseable_score_is_soft_failure() {
    let delegate = Arc::new(ScriptedDelegate::new(
        Err(PipelineError::DecisionParse("not JSON".into())),
        Ok(RoutingDecision::unassigned("unused")),
    ));
    let engine = engine(
        FakeEnrichment::with("Contoso", saas_metadata()),
        FakeOpportunities::default(),
    )
    .with_decision_delegate(delegate.clone());

    let state = engine.run(InboundLead::for_company("Contoso")).await;

    assert!(state.error().is_none());
    assert_eq!(state.score(), Some(0));
    assert!(state.score_breakdown().unwrap().is_empty());
    assert!(state.recommendation().unwrap().contains("not JSON"));
    assert_eq!(state.assigned_rep(), Some(UNASSIGNED_SCORE_TOO_LOW));
    assert_eq!(delegate.route_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_strict_scoring_turns_failed_card_into_error() {
    let delegate = Arc::new(ScriptedDelegate::new(
        Err(PipelineError::DecisionParse("not JSON".into())),
        Ok(RoutingDecision::unassigned("unused")),
    ));
    let engine = engine(
        FakeEnrichment::with("Contoso", saas_metadata()),
        FakeOpportunities::default(),
    )
    .with_decision_delegate(delegate)
    .with_options(PipelineOptions {
        strict_scoring: true,
        ..Default::default()
    });

    let state = engine.run(InboundLead::for_company("Contoso")).await;

    let error = state.error().unwrap();
    assert_eq!(error.kind, ErrorKind::DecisionParse);
    assert_eq!(error.stage.map(|s| s.name()), Some("icp_scoring"));
    assert_eq!(state.score(), Some(0));
    assert!(state.routing().is_none());
    assert_eq!(
        outcomes(&state).last(),
        Some(&("mark_unqualified", StageOutcome::Skipped))
    );
}

#[tokio::test]
async fn test_unparseable_routing_is_unassigned_error() {
    let delegate = Arc::new(ScriptedDelegate::new(
        Ok(card(80)),
        Err(PipelineError::DecisionParse("unknown sales representative 'Bob'".into())),
    ));
    let engine = engine(
        FakeEnrichment::with("Contoso", saas_metadata()),
        FakeOpportunities::default(),
    )
    .with_decision_delegate(delegate);

    let state = engine.run(InboundLead::for_company("Contoso")).await;

    assert!(state.error().is_none());
    assert_eq!(state.assigned_rep(), Some(UNASSIGNED_ERROR));
    assert!(state.routing_reason().unwrap().contains("'Bob'"));
    assert_eq!(state.rep_email(), Some(""));
}

#[tokio::test]
async fn test_routing_provider_failure_sets_error() {
    let delegate = Arc::new(ScriptedDelegate::new(
        Ok(card(75)),
        Err(PipelineError::Provider("decision service returned 503".into())),
    ));
    let engine = engine(
        FakeEnrichment::with("Contoso", saas_metadata()),
        FakeOpportunities::default(),
    )
    .with_decision_delegate(delegate);

    let state = engine.run(InboundLead::for_company("Contoso")).await;

    let error = state.error().unwrap();
    assert_eq!(error.kind, ErrorKind::Provider);
    assert_eq!(error.stage.map(|s| s.name()), Some("sdr_routing"));
    assert!(state.routing().is_none());
    assert_eq!(state.score(), Some(75));
}

#[tokio::test]
async fn test_routing_never_invoked_below_threshold() {
    for score in [0, 30, 59] {
        let delegate = Arc::new(ScriptedDelegate::new(
            Ok(card(score)),
            Ok(RoutingDecision::unassigned("unused")),
        ));
        let engine = engine(
            FakeEnrichment::with("Contoso", saas_metadata()),
            FakeOpportunities::default(),
        )
        .with_decision_delegate(delegate.clone());

        let state = engine.run(InboundLead::for_company("Contoso")).await;

        assert_eq!(delegate.route_calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.assigned_rep(), Some(UNASSIGNED_SCORE_TOO_LOW));
    }
}

// ============ Concurrency ============

#[tokio::test]
async fn test_concurrent_enrichment_overlaps_fetches() {
    // Both fetches must be in flight at once to get past the barrier
    let barrier = Arc::new(Barrier::new(2));
    let mut enrichment = FakeEnrichment::with("Contoso", saas_metadata());
    enrichment.rendezvous = Some(barrier.clone());
    let opportunities = FakeOpportunities {
        report: OpportunityReport {
            news_items: vec![NewsItem {
                opportunity_type: "Cloud Migration".into(),
                ..Default::default()
            }],
            ..Default::default()
        },
        rendezvous: Some(barrier),
        ..Default::default()
    };
    let engine = engine(enrichment, opportunities).with_options(PipelineOptions {
        stage_timeout: Duration::from_secs(2),
        concurrent_enrichment: true,
        ..Default::default()
    });

    let state = engine.run(InboundLead::for_company("Contoso")).await;

    assert!(state.error().is_none(), "{:?}", state.error());
    assert_eq!(
        state.enriched_lead().unwrap().opportunity_signals,
        vec!["Cloud Migration".to_string()]
    );
    assert_eq!(
        state.stage_names()[..2],
        ["metadata_enrichment", "opportunity_enrichment"]
    );
}

#[tokio::test]
async fn test_parallel_runs_are_isolated() {
    let mut enrichment = FakeEnrichment::default();
    enrichment.companies.insert("Contoso".into(), saas_metadata());
    enrichment.companies.insert("Fabrikam".into(), retail_metadata());
    let engine = Arc::new(engine(enrichment, FakeOpportunities::default()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = Arc::clone(&engine);
        let company = if i % 2 == 0 { "Contoso" } else { "Fabrikam" };
        handles.push(tokio::spawn(async move {
            engine.run(InboundLead::for_company(company)).await
        }));
    }

    let mut run_ids = std::collections::HashSet::new();
    for handle in handles {
        let state = handle.await.unwrap();
        assert!(run_ids.insert(state.run_id()));
        match state.inbound_lead().company.as_str() {
            "Contoso" => assert_eq!(state.score(), Some(70)),
            "Fabrikam" => assert_eq!(state.score(), Some(45)),
            other => panic!("unexpected company {}", other),
        }
    }
}

#[tokio::test]
async fn test_table_swap_only_affects_later_runs() {
    let tables = Arc::new(TableHandle::default());
    let engine = PipelineEngine::new(
        Arc::new(FakeEnrichment::with("Contoso", saas_metadata())),
        Arc::new(FakeOpportunities::default()),
        tables.clone(),
    );

    let before = engine.run(InboundLead::for_company("Contoso")).await;
    assert_eq!(before.assigned_rep(), Some("Sarah Chen"));

    let mut next = DecisionTables::default();
    next.roster.retain(|rep| rep.name != "Sarah Chen");
    tables.swap(next).unwrap();

    let after = engine.run(InboundLead::for_company("Contoso")).await;
    assert_ne!(before.tables_fingerprint(), after.tables_fingerprint());
    assert_eq!(after.assigned_rep(), Some("Unassigned"));
    assert!(after.routing_reason().unwrap().contains("industry"));
}

#[tokio::test]
async fn test_dropping_run_cancels_in_flight_call() {
    let dropped = Arc::new(AtomicBool::new(false));
    let engine = Arc::new(PipelineEngine::new(
        Arc::new(HangingEnrichment {
            dropped: dropped.clone(),
        }),
        Arc::new(FakeOpportunities::default()),
        Arc::new(TableHandle::default()),
    ));

    let handle = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run(InboundLead::for_company("Contoso")).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!dropped.load(Ordering::SeqCst));

    handle.abort();
    let joined = handle.await;
    assert!(joined.unwrap_err().is_cancelled());
    assert!(dropped.load(Ordering::SeqCst));
}
