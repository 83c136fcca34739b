//! ICP scoring rubric.
//!
//! Six capped categories summing to at most 100 points:
//!
//! | Category        | Max | Floor                          |
//! |-----------------|-----|--------------------------------|
//! | industry        | 20  | 5 when unmatched               |
//! | company size    | 20  | lowest bucket when unknown     |
//! | technologies    | 15  | 3 when the list is empty       |
//! | strategic focus | 15  | 3 when the list is empty       |
//! | location        | 10  | 2 when unmatched               |
//! | opportunities   | 20  | 5 when no signal earns points  |
//!
//! The engine is a pure function of the lead and the criteria tables. It never
//! fails: malformed criteria or a blank lead produce a zero score with an empty
//! breakdown and an explanation in the recommendation.

use crate::errors::PipelineError;
use crate::models::{EnrichedLead, ScoreCard, ScoreCategory};
use crate::text_match::best_match;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const INDUSTRY_FLOOR: u32 = 5;
pub const TECHNOLOGY_FLOOR: u32 = 3;
pub const STRATEGIC_FOCUS_FLOOR: u32 = 3;
pub const LOCATION_FLOOR: u32 = 2;
pub const OPPORTUNITY_FLOOR: u32 = 5;

/// Employee-count bucket. A lead falls into the bucket with the highest
/// `min_employees` not exceeding its count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBucket {
    pub label: String,
    pub min_employees: u64,
    pub points: u32,
}

/// Lookup tables behind the rubric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcpCriteria {
    pub target_industries: BTreeMap<String, u32>,
    pub company_size_buckets: Vec<SizeBucket>,
    pub target_technologies: BTreeMap<String, u32>,
    pub strategic_focus_areas: BTreeMap<String, u32>,
    pub opportunity_signals: BTreeMap<String, u32>,
    pub target_locations: BTreeMap<String, u32>,
}

fn table(entries: &[(&str, u32)]) -> BTreeMap<String, u32> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

impl Default for IcpCriteria {
    fn default() -> Self {
        Self {
            target_industries: table(&[
                ("SaaS", 20),
                ("Cloud Computing", 20),
                ("Software", 20),
                ("Information Technology", 20),
                ("Technology", 18),
                ("Fintech", 18),
                ("Financial Services", 18),
                ("Healthcare Tech", 18),
                ("Healthcare", 15),
                ("Consulting", 15),
                ("Professional Services", 15),
                ("Manufacturing", 12),
                ("E-commerce", 12),
                ("Retail", 10),
            ]),
            company_size_buckets: vec![
                SizeBucket { label: "<50".into(), min_employees: 0, points: 5 },
                SizeBucket { label: "50-99".into(), min_employees: 50, points: 10 },
                SizeBucket { label: "100-199".into(), min_employees: 100, points: 15 },
                SizeBucket { label: "200-499".into(), min_employees: 200, points: 18 },
                SizeBucket { label: "500+".into(), min_employees: 500, points: 20 },
            ],
            target_technologies: table(&[
                ("Azure", 5),
                ("AWS", 5),
                ("Google Cloud", 5),
                ("Cloud", 4),
                ("Microsoft 365", 4),
                ("Office 365", 4),
                ("Salesforce", 4),
                ("SAP", 3),
                ("Oracle", 3),
                ("AI", 3),
                ("Machine Learning", 3),
                ("Data Analytics", 3),
                ("CRM", 3),
                ("ERP", 3),
                ("Docker", 2),
                ("Kubernetes", 2),
            ]),
            strategic_focus_areas: table(&[
                ("Digital Transformation", 5),
                ("Cloud Migration", 5),
                ("AI implementation", 5),
                ("AI innovation", 5),
                ("Cloud computing leadership", 5),
                ("Cloud adoption", 5),
                ("Data Analytics", 4),
                ("Cybersecurity", 4),
                ("Customer Experience", 4),
                ("Enterprise service development", 4),
                ("Innovation", 3),
                ("Automation", 3),
                ("Operational Efficiency", 3),
                ("Market Expansion", 3),
                ("Gaming expansion", 3),
                ("Product Development", 2),
            ]),
            opportunity_signals: table(&[
                ("Cloud Migration", 7),
                ("Digital Transformation", 7),
                ("AI/ML Implementation", 7),
                ("Strategic Partnership", 6),
                ("Partnership", 6),
                ("M&A Activity", 6),
                ("Global Expansion", 6),
                ("Product Launch", 5),
                ("Capital Investment", 5),
                ("Technology Upgrade", 5),
                ("Market Expansion", 5),
                ("Data Analytics", 4),
                ("Cybersecurity", 4),
                ("Operational Efficiency", 4),
            ]),
            target_locations: table(&[
                ("USA", 10),
                ("United States", 10),
                ("U.S.", 10),
                ("Canada", 10),
                ("Washington", 10),
                ("California", 10),
                ("New York", 10),
                ("UK", 8),
                ("United Kingdom", 8),
                ("EU", 7),
                ("Europe", 7),
                ("Germany", 7),
                ("France", 7),
                ("Australia", 6),
                ("Asia", 5),
            ]),
        }
    }
}

impl IcpCriteria {
    /// Checks that every table value fits its category cap and that the size
    /// buckets cover zero employees.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let tables = [
            (ScoreCategory::Industry, &self.target_industries),
            (ScoreCategory::Technologies, &self.target_technologies),
            (ScoreCategory::StrategicFocus, &self.strategic_focus_areas),
            (ScoreCategory::Opportunities, &self.opportunity_signals),
            (ScoreCategory::Location, &self.target_locations),
        ];

        for (category, entries) in tables {
            if let Some((term, points)) = entries
                .iter()
                .find(|(_, &points)| points > category.max_points())
            {
                return Err(PipelineError::DecisionParse(format!(
                    "{} entry '{}' is worth {} points, above the {} point cap",
                    category.label(),
                    term,
                    points,
                    category.max_points()
                )));
            }
        }

        if !self.company_size_buckets.iter().any(|b| b.min_employees == 0) {
            return Err(PipelineError::DecisionParse(
                "company size buckets must include a bucket starting at 0 employees".to_string(),
            ));
        }
        if let Some(bucket) = self
            .company_size_buckets
            .iter()
            .find(|b| b.points > ScoreCategory::CompanySize.max_points())
        {
            return Err(PipelineError::DecisionParse(format!(
                "company size bucket '{}' is worth {} points, above the {} point cap",
                bucket.label,
                bucket.points,
                ScoreCategory::CompanySize.max_points()
            )));
        }

        Ok(())
    }

    fn bucket_for(&self, employees: Option<u64>) -> Option<&SizeBucket> {
        match employees {
            Some(count) => self
                .company_size_buckets
                .iter()
                .filter(|b| b.min_employees <= count)
                .max_by_key(|b| b.min_employees),
            None => self.company_size_buckets.iter().min_by_key(|b| b.min_employees),
        }
    }
}

/// Deterministic rubric scorer over a borrowed set of criteria.
pub struct ScoringEngine<'a> {
    criteria: &'a IcpCriteria,
}

impl<'a> ScoringEngine<'a> {
    pub fn new(criteria: &'a IcpCriteria) -> Self {
        Self { criteria }
    }

    /// Scores one enriched lead.
    pub fn score(&self, lead: &EnrichedLead) -> ScoreCard {
        if let Err(e) = self.criteria.validate() {
            tracing::error!("ICP criteria rejected: {}", e);
            return ScoreCard::failed(format!("Scoring unavailable, invalid ICP criteria: {}", e));
        }
        if lead.is_blank() {
            tracing::warn!("No enriched lead data available for scoring");
            return ScoreCard::failed("No enriched data available to score");
        }

        let mut breakdown = BTreeMap::new();
        breakdown.insert(ScoreCategory::Industry, self.industry_points(lead));
        breakdown.insert(ScoreCategory::CompanySize, self.company_size_points(lead));
        breakdown.insert(
            ScoreCategory::Technologies,
            summed_points(
                &lead.technologies,
                &self.criteria.target_technologies,
                ScoreCategory::Technologies,
                TECHNOLOGY_FLOOR,
            ),
        );
        breakdown.insert(
            ScoreCategory::StrategicFocus,
            summed_points(
                &lead.strategic_focus,
                &self.criteria.strategic_focus_areas,
                ScoreCategory::StrategicFocus,
                STRATEGIC_FOCUS_FLOOR,
            ),
        );
        breakdown.insert(ScoreCategory::Location, self.location_points(lead));
        breakdown.insert(ScoreCategory::Opportunities, self.opportunity_points(lead));

        let score = breakdown.values().sum::<u32>().min(100);
        let recommendation = recommend(score, &breakdown);

        tracing::debug!("ICP breakdown: {:?}", breakdown);
        tracing::info!("ICP score calculated: {}/100", score);

        ScoreCard {
            score,
            breakdown,
            recommendation,
        }
    }

    fn industry_points(&self, lead: &EnrichedLead) -> u32 {
        best_match(&lead.industry, &self.criteria.target_industries)
            .map(|m| m.points)
            .unwrap_or(INDUSTRY_FLOOR)
            .min(ScoreCategory::Industry.max_points())
    }

    fn company_size_points(&self, lead: &EnrichedLead) -> u32 {
        let employees = lead.employee_count();
        if employees.is_none() {
            tracing::debug!("Company size unknown, using lowest bucket");
        }
        self.criteria
            .bucket_for(employees)
            .map(|b| b.points)
            .unwrap_or(0)
            .min(ScoreCategory::CompanySize.max_points())
    }

    /// Reads only `target_locations`; routing's territory aliases play no part here.
    fn location_points(&self, lead: &EnrichedLead) -> u32 {
        best_match(&lead.headquarters_location, &self.criteria.target_locations)
            .map(|m| m.points)
            .unwrap_or(LOCATION_FLOOR)
            .min(ScoreCategory::Location.max_points())
    }

    /// Every signal entry counts, so repeated triggers add up until the cap.
    fn opportunity_points(&self, lead: &EnrichedLead) -> u32 {
        let earned: u32 = lead
            .opportunity_signals
            .iter()
            .filter_map(|signal| best_match(signal, &self.criteria.opportunity_signals))
            .map(|m| m.points)
            .sum();

        if earned == 0 {
            OPPORTUNITY_FLOOR
        } else {
            earned.min(ScoreCategory::Opportunities.max_points())
        }
    }
}

/// Sum of distinct matched table entries, capped. An empty list earns the floor.
fn summed_points(
    items: &[String],
    table: &BTreeMap<String, u32>,
    category: ScoreCategory,
    floor: u32,
) -> u32 {
    if items.iter().all(|item| item.trim().is_empty()) {
        return floor;
    }

    let mut matched: BTreeSet<&str> = BTreeSet::new();
    let mut total = 0;
    for item in items {
        if let Some(m) = best_match(item, table) {
            if matched.insert(m.term) {
                total += m.points;
            }
        }
    }

    total.min(category.max_points())
}

fn recommend(score: u32, breakdown: &BTreeMap<ScoreCategory, u32>) -> String {
    let verdict = match score {
        80.. => "Strong ICP fit, prioritize for immediate outreach",
        60..=79 => "Good ICP fit, qualified for sales follow-up",
        40..=59 => "Moderate ICP fit, nurture before routing",
        _ => "Weak ICP fit, deprioritize",
    };

    // Ratio in per-mille keeps the ordering integer-only.
    let mut ranked: Vec<(ScoreCategory, u32)> = breakdown.iter().map(|(c, p)| (*c, *p)).collect();
    ranked.sort_by_key(|(category, points)| std::cmp::Reverse(points * 1000 / category.max_points()));

    let describe = |(category, points): &(ScoreCategory, u32)| {
        format!("{} ({}/{})", category.label(), points, category.max_points())
    };
    let strongest: Vec<String> = ranked.iter().take(2).map(describe).collect();
    let weakest = ranked.last().map(describe).unwrap_or_default();

    format!(
        "{} ({}/100). Strongest: {}. Weakest: {}.",
        verdict,
        score,
        strongest.join(", "),
        weakest
    )
}
