//! Per-run lead state.
//!
//! Each field group is written by exactly one stage. Writers are crate-private
//! and refuse a second write, so callers outside the pipeline can only read.

use crate::errors::PipelineError;
use crate::models::{
    EnrichedLead, InboundLead, OpportunityReport, RoutingDecision, ScoreCard, ScoreCategory,
    Stage, StageFailure, StageOutcome, StageRecord,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct LeadState {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    tables_fingerprint: String,
    inbound_lead: InboundLead,
    enriched_lead: Option<EnrichedLead>,
    opportunity: Option<OpportunityReport>,
    scoring: Option<ScoreCard>,
    routing: Option<RoutingDecision>,
    error: Option<StageFailure>,
    history: Vec<StageRecord>,
}

fn write_once<T>(slot: &mut Option<T>, value: T, group: &str) -> bool {
    if slot.is_some() {
        tracing::warn!("Refusing second write to {}", group);
        return false;
    }
    *slot = Some(value);
    true
}

impl LeadState {
    pub(crate) fn new(inbound_lead: InboundLead, tables_fingerprint: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            tables_fingerprint: tables_fingerprint.to_string(),
            inbound_lead,
            enriched_lead: None,
            opportunity: None,
            scoring: None,
            routing: None,
            error: None,
            history: Vec::new(),
        }
    }

    // ============ Readers ============

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Fingerprint of the decision tables snapshot this run used.
    pub fn tables_fingerprint(&self) -> &str {
        &self.tables_fingerprint
    }

    pub fn inbound_lead(&self) -> &InboundLead {
        &self.inbound_lead
    }

    pub fn enriched_lead(&self) -> Option<&EnrichedLead> {
        self.enriched_lead.as_ref()
    }

    pub fn opportunity(&self) -> Option<&OpportunityReport> {
        self.opportunity.as_ref()
    }

    pub fn score_card(&self) -> Option<&ScoreCard> {
        self.scoring.as_ref()
    }

    pub fn score(&self) -> Option<u32> {
        self.scoring.as_ref().map(|card| card.score)
    }

    pub fn score_breakdown(&self) -> Option<&BTreeMap<ScoreCategory, u32>> {
        self.scoring.as_ref().map(|card| &card.breakdown)
    }

    pub fn recommendation(&self) -> Option<&str> {
        self.scoring.as_ref().map(|card| card.recommendation.as_str())
    }

    pub fn routing(&self) -> Option<&RoutingDecision> {
        self.routing.as_ref()
    }

    pub fn assigned_rep(&self) -> Option<&str> {
        self.routing.as_ref().map(|r| r.assigned_rep.as_str())
    }

    pub fn rep_email(&self) -> Option<&str> {
        self.routing.as_ref().map(|r| r.rep_email.as_str())
    }

    pub fn routing_reason(&self) -> Option<&str> {
        self.routing.as_ref().map(|r| r.routing_reason.as_str())
    }

    pub fn error(&self) -> Option<&StageFailure> {
        self.error.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Stages in execution order with their outcome and wall time.
    pub fn history(&self) -> &[StageRecord] {
        &self.history
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.history.iter().map(|record| record.stage.name()).collect()
    }

    // ============ Writers ============

    pub(crate) fn set_enriched_lead(&mut self, lead: EnrichedLead) -> bool {
        write_once(&mut self.enriched_lead, lead, "enriched_lead")
    }

    pub(crate) fn set_opportunity(&mut self, report: OpportunityReport) -> bool {
        write_once(&mut self.opportunity, report, "opportunity")
    }

    /// Appends derived signals to the enriched lead. The only mutation allowed
    /// on `enriched_lead` after the metadata stage.
    pub(crate) fn append_opportunity_signals(&mut self, signals: Vec<String>) {
        match self.enriched_lead.as_mut() {
            Some(lead) => lead.opportunity_signals.extend(signals),
            None => tracing::warn!("No enriched lead to append opportunity signals to"),
        }
    }

    pub(crate) fn set_score_card(&mut self, card: ScoreCard) -> bool {
        write_once(&mut self.scoring, card, "scoring")
    }

    pub(crate) fn set_routing(&mut self, decision: RoutingDecision) -> bool {
        write_once(&mut self.routing, decision, "routing")
    }

    /// Captures `err` unless an earlier failure is already recorded.
    pub(crate) fn fail(&mut self, stage: Option<Stage>, err: &PipelineError) -> bool {
        if let Some(existing) = &self.error {
            tracing::debug!("Keeping first error ({}); dropping: {}", existing, err);
            return false;
        }
        tracing::error!(
            run_id = %self.run_id,
            stage = stage.map(Stage::name).unwrap_or("input"),
            "✗ {}",
            err
        );
        self.error = Some(StageFailure {
            stage,
            kind: err.kind(),
            message: err.to_string(),
        });
        true
    }

    pub(crate) fn record(&mut self, stage: Stage, outcome: StageOutcome, elapsed: Duration) {
        self.history.push(StageRecord {
            stage,
            outcome,
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}
