//! Scoring and routing decisions.
//!
//! A [`DecisionDelegate`] turns an enriched lead into a score card and a
//! routing decision. The default [`RuleBasedDelegate`] is deterministic and
//! works entirely from the decision tables. [`RemoteDecisionClient`] asks an
//! external decision service and validates whatever it answers.

use crate::circuit_breaker::{
    breaker_error, counts_as_failure, create_provider_circuit_breaker, ProviderCircuitBreaker,
};
use crate::errors::PipelineError;
use crate::models::{
    EnrichedLead, RoutingDecision, SalesRep, ScoreCard, ScoreCategory, UNASSIGNED,
};
use crate::routing::RoutingMatcher;
use crate::scoring::ScoringEngine;
use crate::tables::DecisionTables;
use async_trait::async_trait;
use failsafe::futures::CircuitBreaker;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

#[async_trait]
pub trait DecisionDelegate: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Scores `lead` against `tables.criteria`.
    ///
    /// # Errors
    ///
    /// * `DecisionParse` - the answer could not be turned into a valid card.
    /// * `Provider` / `Timeout` - the delegate could not be reached.
    async fn score(
        &self,
        lead: &EnrichedLead,
        tables: &DecisionTables,
    ) -> Result<ScoreCard, PipelineError>;

    /// Picks at most one representative from `tables.roster`.
    async fn route(
        &self,
        lead: &EnrichedLead,
        score: u32,
        tables: &DecisionTables,
    ) -> Result<RoutingDecision, PipelineError>;
}

/// Deterministic delegate backed by [`ScoringEngine`] and [`RoutingMatcher`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedDelegate;

#[async_trait]
impl DecisionDelegate for RuleBasedDelegate {
    fn name(&self) -> &str {
        "rule_based"
    }

    async fn score(
        &self,
        lead: &EnrichedLead,
        tables: &DecisionTables,
    ) -> Result<ScoreCard, PipelineError> {
        Ok(ScoringEngine::new(&tables.criteria).score(lead))
    }

    async fn route(
        &self,
        lead: &EnrichedLead,
        score: u32,
        tables: &DecisionTables,
    ) -> Result<RoutingDecision, PipelineError> {
        Ok(RoutingMatcher::new(&tables.roster, &tables.territories).route(lead, score))
    }
}

// ============ Remote delegate ============

/// Delegate that posts to `{base_url}/score` and `{base_url}/route`.
///
/// Replies may wrap the JSON object in prose or markdown fences; the object is
/// extracted leniently and then validated strictly.
pub struct RemoteDecisionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    breaker: ProviderCircuitBreaker,
}

impl RemoteDecisionClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                PipelineError::Provider(format!("Failed to create decision client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            breaker: create_provider_circuit_breaker(),
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<String, PipelineError> {
        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        if !status.is_success() {
            return Err(PipelineError::Provider(format!(
                "Decision service returned {}: {}",
                status, text
            )));
        }

        Ok(text)
    }

    async fn call(&self, path: &str, body: Value) -> Result<String, PipelineError> {
        self.breaker
            .call_with(counts_as_failure, self.post(path, body))
            .await
            .map_err(|e| breaker_error(e, "decision"))
    }
}

#[async_trait]
impl DecisionDelegate for RemoteDecisionClient {
    fn name(&self) -> &str {
        "remote"
    }

    async fn score(
        &self,
        lead: &EnrichedLead,
        tables: &DecisionTables,
    ) -> Result<ScoreCard, PipelineError> {
        let body = json!({
            "enriched_lead": lead,
            "icp_criteria": tables.criteria,
        });
        let raw = self.call("score", body).await?;
        parse_score_response(&raw)
    }

    async fn route(
        &self,
        lead: &EnrichedLead,
        score: u32,
        tables: &DecisionTables,
    ) -> Result<RoutingDecision, PipelineError> {
        let body = json!({
            "enriched_lead": lead,
            "icp_score": score,
            "sales_reps": tables.roster,
        });
        let raw = self.call("route", body).await?;
        parse_route_response(&raw, &tables.roster)
    }
}

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("valid fence pattern"))
}

/// Pulls the outermost JSON object out of a free-form reply.
///
/// Looks inside the first markdown code fence when there is one, then slices
/// from the first `{` to the last `}`.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let body = fence_pattern()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}

fn parse_object<'de, T: Deserialize<'de>>(raw: &'de str, what: &str) -> Result<T, PipelineError> {
    let object = extract_json_object(raw).ok_or_else(|| {
        PipelineError::DecisionParse(format!("no JSON object found in {} response", what))
    })?;
    serde_json::from_str(object)
        .map_err(|e| PipelineError::DecisionParse(format!("invalid {} response: {}", what, e)))
}

#[derive(Debug, Deserialize)]
struct RemoteScore {
    score: Value,
    #[serde(default, alias = "score_breakdown")]
    breakdown: BTreeMap<String, Value>,
    #[serde(default)]
    recommendation: String,
}

/// Accepts either a bare number or an object carrying `points`/`score`.
fn points_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(map) => map
            .get("points")
            .or_else(|| map.get("score"))
            .and_then(Value::as_f64),
        _ => None,
    }
}

fn whole_points(value: f64, what: &str) -> Result<u32, PipelineError> {
    if !value.is_finite() || value < 0.0 {
        return Err(PipelineError::DecisionParse(format!(
            "{} must be a non-negative number, got {}",
            what, value
        )));
    }
    Ok(value.round() as u32)
}

/// Validates a remote score answer.
///
/// The total is clamped to `[0, 100]`. Every category must be present,
/// within its cap, and the categories must add up to the total.
pub fn parse_score_response(raw: &str) -> Result<ScoreCard, PipelineError> {
    let remote: RemoteScore = parse_object(raw, "score")?;

    let total = remote
        .score
        .as_f64()
        .ok_or_else(|| PipelineError::DecisionParse("score is not a number".to_string()))?;
    let score = whole_points(total.clamp(0.0, 100.0), "score")?;

    let mut breakdown = BTreeMap::new();
    for (key, value) in &remote.breakdown {
        let category = ScoreCategory::from_key(key).ok_or_else(|| {
            PipelineError::DecisionParse(format!("unknown score category '{}'", key))
        })?;
        let points = points_of(value).ok_or_else(|| {
            PipelineError::DecisionParse(format!("category '{}' has no numeric points", key))
        })?;
        let points = whole_points(points, key)?;
        if points > category.max_points() {
            return Err(PipelineError::DecisionParse(format!(
                "category '{}' awarded {} points, cap is {}",
                key,
                points,
                category.max_points()
            )));
        }
        breakdown.insert(category, points);
    }

    if let Some(missing) = ScoreCategory::ALL
        .into_iter()
        .find(|category| !breakdown.contains_key(category))
    {
        return Err(PipelineError::DecisionParse(format!(
            "breakdown is missing category '{}'",
            missing.key()
        )));
    }

    let sum: u32 = breakdown.values().sum();
    if sum != score {
        return Err(PipelineError::DecisionParse(format!(
            "breakdown sums to {} but score is {}",
            sum, score
        )));
    }

    Ok(ScoreCard {
        score,
        breakdown,
        recommendation: remote.recommendation,
    })
}

#[derive(Debug, Deserialize)]
struct RemoteRoute {
    #[serde(alias = "assigned_rep")]
    rep_name: String,
    #[serde(default)]
    rep_email: String,
    #[serde(default, alias = "routing_reason")]
    reason: String,
}

/// Validates a remote routing answer against the roster.
///
/// The named representative must exist; the e-mail always comes from the
/// roster. Any `Unassigned...` label is passed through.
pub fn parse_route_response(raw: &str, roster: &[SalesRep]) -> Result<RoutingDecision, PipelineError> {
    let remote: RemoteRoute = parse_object(raw, "routing")?;
    let reason = if remote.reason.trim().is_empty() {
        "No reason provided".to_string()
    } else {
        remote.reason.trim().to_string()
    };
    let name = remote.rep_name.trim();

    if name.is_empty() || name.to_lowercase().starts_with(&UNASSIGNED.to_lowercase()) {
        let label = if name.starts_with(UNASSIGNED) { name } else { UNASSIGNED };
        return Ok(RoutingDecision::unassigned_as(label, reason));
    }

    let rep = roster
        .iter()
        .find(|rep| rep.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            PipelineError::DecisionParse(format!("unknown sales representative '{}'", name))
        })?;

    if !remote.rep_email.is_empty() && !remote.rep_email.eq_ignore_ascii_case(&rep.email) {
        tracing::warn!(
            "Decision service sent e-mail '{}' for {}; using roster e-mail",
            remote.rep_email,
            rep.name
        );
    }

    Ok(RoutingDecision::assigned(rep, reason))
}
