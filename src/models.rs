use crate::errors::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Assignment label used when the matcher finds no qualifying representative.
pub const UNASSIGNED: &str = "Unassigned";
/// Assignment label written by the unqualified-marking stage.
pub const UNASSIGNED_SCORE_TOO_LOW: &str = "Unassigned - Score Too Low";
/// Assignment label used when a routing delegate response is unusable.
pub const UNASSIGNED_ERROR: &str = "Unassigned - Error";

// ============ Inbound ============

/// Raw lead as submitted by the caller.
///
/// Only `company` is required; a blank company is treated the same as a
/// missing one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundLead {
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
}

impl InboundLead {
    /// Convenience constructor for a lead with only a company name.
    pub fn for_company(company: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            ..Default::default()
        }
    }

    /// Trimmed company name, `None` when blank.
    pub fn company_name(&self) -> Option<&str> {
        let trimmed = self.company.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }
}

// ============ Enrichment ============

/// Employee count as reported by the enrichment source: either a number or a
/// free-form string such as `"200-500"` or `"10,001+ employees"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompanySize {
    Count(u64),
    Text(String),
}

impl CompanySize {
    /// Numeric employee count. Ranges resolve to their arithmetic midpoint.
    ///
    /// Thousands separators are ignored, so `"1,000-5,000"` yields `3000`.
    /// Returns `None` when the text carries no digits.
    pub fn employee_count(&self) -> Option<u64> {
        match self {
            CompanySize::Count(n) => Some(*n),
            CompanySize::Text(text) => {
                let cleaned = text.replace(',', "");
                let numbers: Vec<u64> = cleaned
                    .split(|c: char| !c.is_ascii_digit())
                    .filter(|part| !part.is_empty())
                    .filter_map(|part| part.parse().ok())
                    .collect();

                match numbers.as_slice() {
                    [] => None,
                    [single] => Some(*single),
                    [low, high, ..] => Some(((*low as u128 + *high as u128) / 2) as u64),
                }
            }
        }
    }
}

impl fmt::Display for CompanySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompanySize::Count(n) => write!(f, "{}", n),
            CompanySize::Text(text) => write!(f, "{}", text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataConfidence {
    High,
    Medium,
    Low,
}

/// Company metadata returned by an `EnrichmentProvider`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyMetadata {
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub company_size: Option<CompanySize>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub products_services: Vec<String>,
    #[serde(default)]
    pub strategic_focus: Vec<String>,
    #[serde(default)]
    pub company_culture: String,
    #[serde(default)]
    pub data_confidence: Option<DataConfidence>,
}

/// Enriched attributes consumed by scoring and routing.
///
/// Built once from [`CompanyMetadata`]; the opportunity stage may only append
/// to `opportunity_signals`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedLead {
    pub industry: String,
    pub company_size: Option<CompanySize>,
    pub locations: Vec<String>,
    /// `locations` joined with `", "`.
    pub headquarters_location: String,
    pub technologies: Vec<String>,
    pub products_services: Vec<String>,
    pub strategic_focus: Vec<String>,
    pub company_culture: String,
    pub data_confidence: Option<DataConfidence>,
    #[serde(default)]
    pub opportunity_signals: Vec<String>,
}

impl EnrichedLead {
    pub fn from_metadata(metadata: CompanyMetadata) -> Self {
        let headquarters_location = metadata.locations.join(", ");
        Self {
            industry: metadata.industry,
            company_size: metadata.company_size,
            locations: metadata.locations,
            headquarters_location,
            technologies: metadata.technologies,
            products_services: metadata.products_services,
            strategic_focus: metadata.strategic_focus,
            company_culture: metadata.company_culture,
            data_confidence: metadata.data_confidence,
            opportunity_signals: Vec::new(),
        }
    }

    pub fn employee_count(&self) -> Option<u64> {
        self.company_size.as_ref().and_then(CompanySize::employee_count)
    }

    /// True when no attribute carries any information.
    pub fn is_blank(&self) -> bool {
        self.industry.trim().is_empty()
            && self.company_size.is_none()
            && self.headquarters_location.trim().is_empty()
            && self.technologies.is_empty()
            && self.products_services.is_empty()
            && self.strategic_focus.is_empty()
            && self.company_culture.trim().is_empty()
            && self.data_confidence.is_none()
            && self.opportunity_signals.is_empty()
    }
}

// ============ Opportunities ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub opportunity_type: String,
    #[serde(default)]
    pub opportunity_summary: String,
    #[serde(default)]
    pub opportunity_details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkedinPost {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub url: String,
}

/// Output of an `OpportunityProvider`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityReport {
    #[serde(default, alias = "browsed_opportunity_from_news")]
    pub news_items: Vec<NewsItem>,
    #[serde(default)]
    pub linkedin_posts: Vec<LinkedinPost>,
    #[serde(default, alias = "enrichment_opportunity")]
    pub summary: String,
    #[serde(default)]
    pub opportunity_signals: Vec<String>,
}

impl OpportunityReport {
    /// Category labels of all news items that carry one, in item order.
    pub fn signals_from_news(&self) -> Vec<String> {
        self.news_items
            .iter()
            .map(|item| item.opportunity_type.trim())
            .filter(|label| !label.is_empty())
            .map(str::to_string)
            .collect()
    }
}

// ============ Scoring ============

/// The six fixed scoring categories, in rubric order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreCategory {
    Industry,
    CompanySize,
    Technologies,
    StrategicFocus,
    Location,
    Opportunities,
}

impl ScoreCategory {
    pub const ALL: [ScoreCategory; 6] = [
        ScoreCategory::Industry,
        ScoreCategory::CompanySize,
        ScoreCategory::Technologies,
        ScoreCategory::StrategicFocus,
        ScoreCategory::Location,
        ScoreCategory::Opportunities,
    ];

    pub fn max_points(self) -> u32 {
        match self {
            ScoreCategory::Industry => 20,
            ScoreCategory::CompanySize => 20,
            ScoreCategory::Technologies => 15,
            ScoreCategory::StrategicFocus => 15,
            ScoreCategory::Location => 10,
            ScoreCategory::Opportunities => 20,
        }
    }

    /// Wire name, as used in breakdown maps.
    pub fn key(self) -> &'static str {
        match self {
            ScoreCategory::Industry => "industry",
            ScoreCategory::CompanySize => "company_size",
            ScoreCategory::Technologies => "technologies",
            ScoreCategory::StrategicFocus => "strategic_focus",
            ScoreCategory::Location => "location",
            ScoreCategory::Opportunities => "opportunities",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.key().eq_ignore_ascii_case(key.trim()))
    }

    pub fn label(self) -> &'static str {
        match self {
            ScoreCategory::Industry => "industry",
            ScoreCategory::CompanySize => "company size",
            ScoreCategory::Technologies => "technologies",
            ScoreCategory::StrategicFocus => "strategic focus",
            ScoreCategory::Location => "location",
            ScoreCategory::Opportunities => "opportunities",
        }
    }
}

/// Score, per-category breakdown and recommendation for one lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub score: u32,
    pub breakdown: BTreeMap<ScoreCategory, u32>,
    pub recommendation: String,
}

impl ScoreCard {
    /// Zero score with an empty breakdown, used when scoring cannot proceed.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            score: 0,
            breakdown: BTreeMap::new(),
            recommendation: reason.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.breakdown.is_empty()
    }

    pub fn points(&self, category: ScoreCategory) -> u32 {
        self.breakdown.get(&category).copied().unwrap_or(0)
    }
}

// ============ Routing ============

/// A member of the static sales roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesRep {
    pub name: String,
    pub email: String,
    pub territory: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub industry_focus: Vec<String>,
    #[serde(default)]
    pub min_company_size: u64,
    #[serde(default)]
    pub min_icp_score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub assigned_rep: String,
    pub rep_email: String,
    pub routing_reason: String,
}

impl RoutingDecision {
    pub fn assigned(rep: &SalesRep, reason: impl Into<String>) -> Self {
        Self {
            assigned_rep: rep.name.clone(),
            rep_email: rep.email.clone(),
            routing_reason: reason.into(),
        }
    }

    pub fn unassigned(reason: impl Into<String>) -> Self {
        Self::unassigned_as(UNASSIGNED, reason)
    }

    pub fn unassigned_as(label: &str, reason: impl Into<String>) -> Self {
        Self {
            assigned_rep: label.to_string(),
            rep_email: String::new(),
            routing_reason: reason.into(),
        }
    }

    pub fn is_assigned(&self) -> bool {
        !self.assigned_rep.starts_with(UNASSIGNED)
    }
}

// ============ Stage bookkeeping ============

/// Named pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    MetadataEnrichment,
    OpportunityEnrichment,
    IcpScoring,
    SdrRouting,
    MarkUnqualified,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::MetadataEnrichment => "metadata_enrichment",
            Stage::OpportunityEnrichment => "opportunity_enrichment",
            Stage::IcpScoring => "icp_scoring",
            Stage::SdrRouting => "sdr_routing",
            Stage::MarkUnqualified => "mark_unqualified",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    /// The stage saw a pre-existing error and left the state untouched.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub elapsed_ms: u64,
}

/// First failure captured during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFailure {
    /// `None` when the run was rejected before any stage executed.
    pub stage: Option<Stage>,
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{} failed: {}", stage, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_size_midpoint_and_separators() {
        assert_eq!(CompanySize::Count(600).employee_count(), Some(600));
        assert_eq!(
            CompanySize::Text("200-500".into()).employee_count(),
            Some(350)
        );
        assert_eq!(
            CompanySize::Text("1,000-5,000 employees".into()).employee_count(),
            Some(3000)
        );
        assert_eq!(
            CompanySize::Text("10,001+ employees".into()).employee_count(),
            Some(10001)
        );
        assert_eq!(CompanySize::Text("unknown".into()).employee_count(), None);
    }

    #[test]
    fn test_company_size_deserializes_number_or_string() {
        let n: CompanySize = serde_json::from_str("250").unwrap();
        let s: CompanySize = serde_json::from_str("\"50-99\"").unwrap();
        assert_eq!(n, CompanySize::Count(250));
        assert_eq!(s.employee_count(), Some(74));
    }

    #[test]
    fn test_headquarters_location_joins_locations() {
        let enriched = EnrichedLead::from_metadata(CompanyMetadata {
            locations: vec!["Redmond".into(), "Washington".into(), "U.S.".into()],
            ..Default::default()
        });
        assert_eq!(enriched.headquarters_location, "Redmond, Washington, U.S.");
    }

    #[test]
    fn test_signals_from_news_skips_unlabelled_items() {
        let report = OpportunityReport {
            news_items: vec![
                NewsItem {
                    opportunity_type: "Cloud Migration".into(),
                    ..Default::default()
                },
                NewsItem::default(),
                NewsItem {
                    opportunity_type: " Product Launch ".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(
            report.signals_from_news(),
            vec!["Cloud Migration".to_string(), "Product Launch".to_string()]
        );
    }

    #[test]
    fn test_breakdown_serializes_with_category_keys() {
        let mut breakdown = BTreeMap::new();
        breakdown.insert(ScoreCategory::CompanySize, 18);
        breakdown.insert(ScoreCategory::Industry, 20);
        let card = ScoreCard {
            score: 38,
            breakdown,
            recommendation: String::new(),
        };
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["breakdown"]["industry"], 20);
        assert_eq!(json["breakdown"]["company_size"], 18);
    }

    #[test]
    fn test_unassigned_labels_are_not_assigned() {
        assert!(!RoutingDecision::unassigned("none").is_assigned());
        assert!(!RoutingDecision::unassigned_as(UNASSIGNED_SCORE_TOO_LOW, "low").is_assigned());
        assert_eq!(InboundLead::for_company("   ").company_name(), None);
    }
}
