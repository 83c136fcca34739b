//! Rule-based sales representative matcher.
//!
//! Filters run in a fixed order: territory, industry, company size, ICP score.
//! The first filter that leaves no candidate names the reason the lead stays
//! unassigned. Survivors are ranked by industry match quality (exact first),
//! then by the lower `min_icp_score`, then by name.

use crate::models::{EnrichedLead, RoutingDecision, SalesRep};
use crate::text_match::{contains_phrase, match_quality, MatchQuality};
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Country/region aliases keyed by territory name, e.g. `"USA" → ["California", ...]`.
pub type TerritoryAliases = BTreeMap<String, Vec<String>>;

#[derive(Debug)]
struct Candidate<'a> {
    rep: &'a SalesRep,
    quality: MatchQuality,
    focus: &'a str,
}

pub struct RoutingMatcher<'a> {
    roster: &'a [SalesRep],
    territories: &'a TerritoryAliases,
}

impl<'a> RoutingMatcher<'a> {
    pub fn new(roster: &'a [SalesRep], territories: &'a TerritoryAliases) -> Self {
        Self {
            roster,
            territories,
        }
    }

    /// True when `location` names the territory itself or one of its aliases.
    pub fn covers(&self, territory: &str, location: &str) -> bool {
        if contains_phrase(location, territory) {
            return true;
        }
        self.territories
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(territory.trim()))
            .flat_map(|(_, aliases)| aliases.iter())
            .any(|alias| contains_phrase(location, alias))
    }

    /// Picks at most one representative for a lead that already cleared the
    /// minimum score gate.
    pub fn route(&self, lead: &EnrichedLead, score: u32) -> RoutingDecision {
        let location = lead.headquarters_location.trim();
        let industry = lead.industry.trim();
        let employees = lead.employee_count();
        let size = employees.unwrap_or(0);

        // 1. Territory
        let in_territory: Vec<&SalesRep> = self
            .roster
            .iter()
            .filter(|rep| !location.is_empty() && self.covers(&rep.territory, location))
            .collect();
        if in_territory.is_empty() {
            tracing::info!("No territory match for location '{}'", location);
            return RoutingDecision::unassigned(format!(
                "No representative territory covers headquarters location '{}'",
                display_or_unknown(location)
            ));
        }

        // 2. Industry
        let by_industry: Vec<Candidate> = in_territory
            .iter()
            .filter_map(|&rep| {
                rep.industry_focus
                    .iter()
                    .filter_map(|focus| {
                        match_quality(industry, focus).map(|quality| (quality, focus.as_str()))
                    })
                    .max_by_key(|(quality, _)| *quality)
                    .map(|(quality, focus)| Candidate { rep, quality, focus })
            })
            .collect();
        if by_industry.is_empty() {
            return RoutingDecision::unassigned(format!(
                "No representative covering territory ({}) focuses on industry '{}'",
                names(in_territory.iter().copied()),
                display_or_unknown(industry)
            ));
        }

        // 3a. Company size
        let smallest = by_industry
            .iter()
            .map(|c| c.rep.min_company_size)
            .min()
            .unwrap_or_default();
        let by_size: Vec<Candidate> = by_industry
            .into_iter()
            .filter(|c| c.rep.min_company_size <= size)
            .collect();
        if by_size.is_empty() {
            return RoutingDecision::unassigned(format!(
                "Company size {} is below every matching representative's minimum (smallest minimum {})",
                describe_size(employees),
                smallest
            ));
        }

        // 3b. ICP score
        let lowest = by_size
            .iter()
            .map(|c| c.rep.min_icp_score)
            .min()
            .unwrap_or_default();
        let mut qualified: Vec<Candidate> = by_size
            .into_iter()
            .filter(|c| c.rep.min_icp_score <= score)
            .collect();
        if qualified.is_empty() {
            return RoutingDecision::unassigned(format!(
                "ICP score {} is below every matching representative's minimum score (lowest minimum {})",
                score, lowest
            ));
        }

        // 4. Tie-break
        qualified.sort_by(|a, b| {
            (Reverse(a.quality), a.rep.min_icp_score, &a.rep.name).cmp(&(
                Reverse(b.quality),
                b.rep.min_icp_score,
                &b.rep.name,
            ))
        });
        let pool = qualified.len();
        let chosen = &qualified[0];
        tracing::debug!("Routing candidates after filters: {:?}", qualified);

        let quality = match chosen.quality {
            MatchQuality::Exact => "exact",
            MatchQuality::Partial => "partial",
        };
        let reason = format!(
            "Territory {} covers '{}'; {} industry match ('{}' ~ '{}'); ICP score {} meets minimum {} (margin +{}); company size {} meets minimum {} (margin +{}); selected from {} qualifying representative(s)",
            chosen.rep.territory,
            location,
            quality,
            industry,
            chosen.focus,
            score,
            chosen.rep.min_icp_score,
            score - chosen.rep.min_icp_score,
            describe_size(employees),
            chosen.rep.min_company_size,
            size - chosen.rep.min_company_size,
            pool
        );

        tracing::info!("Lead routed to {}", chosen.rep.name);
        RoutingDecision::assigned(chosen.rep, reason)
    }
}

fn names<'r>(reps: impl Iterator<Item = &'r SalesRep>) -> String {
    reps.map(|rep| rep.name.as_str()).collect::<Vec<_>>().join(", ")
}

fn display_or_unknown(value: &str) -> &str {
    if value.is_empty() {
        "unknown"
    } else {
        value
    }
}

fn describe_size(employees: Option<u64>) -> String {
    match employees {
        Some(n) => n.to_string(),
        None => "unknown (treated as 0)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompanySize, UNASSIGNED};
    use crate::tables::DecisionTables;

    fn lead(industry: &str, size: u64, location: &str) -> EnrichedLead {
        EnrichedLead {
            industry: industry.into(),
            company_size: Some(CompanySize::Count(size)),
            locations: vec![location.into()],
            headquarters_location: location.into(),
            ..Default::default()
        }
    }

    fn rep(name: &str, territory: &str, focus: &[&str], min_size: u64, min_score: u32) -> SalesRep {
        SalesRep {
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
            territory: territory.into(),
            region: String::new(),
            industry_focus: focus.iter().map(|f| f.to_string()).collect(),
            min_company_size: min_size,
            min_icp_score: min_score,
        }
    }

    #[test]
    fn test_default_roster_routes_usa_saas() {
        let tables = DecisionTables::default();
        let matcher = RoutingMatcher::new(&tables.roster, &tables.territories);

        let decision = matcher.route(&lead("SaaS", 600, "USA"), 70);
        assert_eq!(decision.assigned_rep, "Sarah Chen");
        assert_eq!(decision.rep_email, "sarah.chen@deloitte.com");
        assert!(decision.routing_reason.contains("margin +0"));
        assert!(decision.routing_reason.contains("margin +400"));
    }

    #[test]
    fn test_city_implies_country() {
        let tables = DecisionTables::default();
        let matcher = RoutingMatcher::new(&tables.roster, &tables.territories);
        assert!(matcher.covers("USA", "Redmond, Washington"));
        assert!(matcher.covers("Canada", "Toronto, Ontario"));
        assert!(!matcher.covers("UK", "Paris, France"));
    }

    #[test]
    fn test_exact_industry_beats_lower_minimum_score() {
        let roster = vec![
            rep("Zoe", "USA", &["Healthcare"], 0, 60),
            rep("Adam", "USA", &["Healthcare Tech"], 0, 65),
        ];
        let territories = TerritoryAliases::new();
        let matcher = RoutingMatcher::new(&roster, &territories);

        let decision = matcher.route(&lead("Healthcare Tech", 300, "USA"), 80);
        assert_eq!(decision.assigned_rep, "Adam");

        let decision = matcher.route(&lead("Healthcare", 300, "USA"), 80);
        assert_eq!(decision.assigned_rep, "Zoe");
    }

    #[test]
    fn test_lower_minimum_score_then_name() {
        let roster = vec![
            rep("Carol", "USA", &["SaaS"], 0, 70),
            rep("Bob", "USA", &["SaaS"], 0, 60),
            rep("Alice", "USA", &["SaaS"], 0, 60),
        ];
        let territories = TerritoryAliases::new();
        let matcher = RoutingMatcher::new(&roster, &territories);

        let decision = matcher.route(&lead("SaaS", 300, "USA"), 90);
        assert_eq!(decision.assigned_rep, "Alice");
        assert!(decision.routing_reason.contains("3 qualifying"));
    }

    #[test]
    fn test_elimination_reasons_name_the_criterion() {
        let tables = DecisionTables::default();
        let matcher = RoutingMatcher::new(&tables.roster, &tables.territories);

        let territory = matcher.route(&lead("SaaS", 600, "Brazil"), 90);
        assert_eq!(territory.assigned_rep, UNASSIGNED);
        assert!(territory.routing_reason.contains("territory"));
        assert!(territory.rep_email.is_empty());

        let industry = matcher.route(&lead("Mining", 600, "USA"), 90);
        assert!(industry.routing_reason.contains("industry"));

        let size = matcher.route(&lead("SaaS", 20, "USA"), 90);
        assert!(size.routing_reason.contains("Company size 20"));
        assert!(size.routing_reason.contains("smallest minimum 200"));

        let score = matcher.route(&lead("Fintech", 600, "UK"), 62);
        assert!(score.routing_reason.contains("ICP score 62"));
        assert!(score.routing_reason.contains("lowest minimum 65"));
    }

    #[test]
    fn test_elimination_minimums_ignore_reps_outside_the_industry() {
        let tables = DecisionTables::default();
        let matcher = RoutingMatcher::new(&tables.roster, &tables.territories);

        // Mike Johnson covers the USA at 100/60 but not SaaS
        let size = matcher.route(&lead("SaaS", 150, "USA"), 90);
        assert_eq!(size.assigned_rep, UNASSIGNED);
        assert!(size.routing_reason.contains("Company size 150"));
        assert!(size.routing_reason.contains("smallest minimum 200"));

        let score = matcher.route(&lead("SaaS", 600, "USA"), 65);
        assert_eq!(score.assigned_rep, UNASSIGNED);
        assert!(score.routing_reason.contains("ICP score 65"));
        assert!(score.routing_reason.contains("lowest minimum 70"));
    }
}
