//! Keyword classifier assigning an opportunity category to a news item.
//!
//! Categories are an ordered list of rule groups. Groups are tried in order;
//! the first group with a matching trigger owns the text, and inside it the
//! first matching rule decides the label (or the group's fallback). Keywords
//! match whole words, case-insensitively, so "ai" never fires on "said".

use crate::text_match::contains_phrase;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityRule {
    pub label: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub name: String,
    pub triggers: Vec<String>,
    #[serde(default)]
    pub rules: Vec<OpportunityRule>,
    pub fallback: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityClassifier {
    pub groups: Vec<RuleGroup>,
}

fn any_phrase(text: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|phrase| contains_phrase(text, phrase))
}

impl OpportunityClassifier {
    pub fn new(groups: Vec<RuleGroup>) -> Self {
        Self { groups }
    }

    /// Category for `text`, or `None` when no group is triggered.
    pub fn classify(&self, text: &str) -> Option<&str> {
        let group = self
            .groups
            .iter()
            .find(|group| any_phrase(text, &group.triggers))?;

        let label = group
            .rules
            .iter()
            .find(|rule| any_phrase(text, &rule.keywords))
            .map(|rule| rule.label.as_str())
            .unwrap_or(group.fallback.as_str());

        tracing::debug!("Classified opportunity as '{}' via group '{}'", label, group.name);
        Some(label)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn rule(label: &str, keywords: &[&str]) -> OpportunityRule {
    OpportunityRule {
        label: label.to_string(),
        keywords: strings(keywords),
    }
}

fn group(name: &str, triggers: &[&str], rules: Vec<OpportunityRule>, fallback: &str) -> RuleGroup {
    RuleGroup {
        name: name.to_string(),
        triggers: strings(triggers),
        rules,
        fallback: fallback.to_string(),
    }
}

impl Default for OpportunityClassifier {
    fn default() -> Self {
        Self::new(vec![
            group(
                "it",
                &[
                    "digital transformation", "modernization", "cloud", "cybersecurity", "ai",
                    "machine learning", "data analytics", "big data", "crm", "erp",
                    "mobile app", "software", "application",
                ],
                vec![
                    rule("Digital Transformation", &["digital transformation", "modernization"]),
                    rule("Cloud Migration", &["cloud", "migration", "aws", "azure", "google cloud"]),
                    rule("Data Analytics", &["data analytics", "big data", "business intelligence"]),
                    rule("Cybersecurity", &["cybersecurity", "security", "compliance"]),
                    rule("AI/ML Implementation", &["ai", "machine learning", "automation"]),
                    rule("CRM Implementation", &["crm", "customer relationship", "salesforce"]),
                    rule("ERP Implementation", &["erp", "enterprise resource", "sap"]),
                    rule("Application Development", &["mobile app", "application development"]),
                ],
                "IT Strategic Initiative",
            ),
            group(
                "marketing",
                &[
                    "marketing campaign", "brand launch", "rebrand", "market expansion",
                    "sales growth", "customer acquisition", "loyalty program", "e-commerce",
                    "digital marketing", "advertising", "social media", "campaign",
                ],
                vec![
                    rule("Brand Development", &["brand launch", "rebrand"]),
                    rule("Market Expansion", &["market expansion", "new market", "enter market"]),
                    rule("E-commerce Development", &["e-commerce", "online store", "digital commerce"]),
                    rule("Digital Marketing", &["social media", "digital marketing", "online advertising"]),
                ],
                "Marketing & Sales Initiative",
            ),
            group(
                "financial",
                &[
                    "funding", "investment", "ipo", "public offering", "capital raise",
                    "financing", "cost reduction", "efficiency", "revenue growth",
                    "profitability", "budget increase", "financial restructuring",
                ],
                vec![
                    rule("Capital Investment", &["funding", "investment", "capital raise", "financing"]),
                    rule("Public Offering", &["ipo", "public offering"]),
                    rule("Financial Optimization", &["cost reduction", "efficiency", "financial restructuring"]),
                ],
                "Financial Initiative",
            ),
            group(
                "operations",
                &[
                    "supply chain", "logistics", "operational efficiency", "outsourcing",
                    "manufacturing", "distribution", "inventory management", "procurement",
                    "warehouse", "facilities", "expansion", "relocation",
                ],
                vec![
                    rule("Supply Chain Optimization", &["supply chain", "logistics"]),
                    rule("Manufacturing Enhancement", &["manufacturing", "production"]),
                    rule("Facilities Expansion", &["warehouse", "facilities", "expansion", "relocation"]),
                ],
                "Operational Improvement",
            ),
            group(
                "people",
                &[
                    "hiring", "talent acquisition", "training program", "skill development",
                    "workforce expansion", "organization restructure", "management change",
                    "leadership", "executive appointment", "cultural transformation",
                ],
                vec![
                    rule("Training & Development", &["training program", "skill development"]),
                    rule("Talent Acquisition", &["hiring", "talent acquisition", "workforce expansion"]),
                    rule("Organizational Change", &["organization restructure", "management change", "leadership"]),
                ],
                "HR Initiative",
            ),
            group(
                "product",
                &[
                    "product launch", "new service", "r&d", "research and development",
                    "innovation center", "product redesign", "service improvement",
                    "customer experience", "user experience", "design", "prototype",
                ],
                vec![
                    rule("Product Launch", &["product launch", "new product"]),
                    rule("Service Development", &["new service", "service offering"]),
                    rule("R&D Initiative", &["r&d", "research and development", "innovation center"]),
                    rule("CX/UX Enhancement", &["customer experience", "user experience"]),
                ],
                "Product/Service Innovation",
            ),
            group(
                "sustainability",
                &[
                    "sustainability", "green initiative", "carbon neutral", "esg",
                    "environmental", "social responsibility", "governance", "renewable",
                    "circular economy", "ethical", "sustainable development",
                ],
                vec![],
                "Sustainability/ESG Initiative",
            ),
            group(
                "partnership",
                &[
                    "strategic alliance", "industry partnership", "channel partner",
                    "distribution agreement", "licensing agreement", "cross-industry",
                    "collaborative venture", "co-development", "business ecosystem",
                    "partnership", "collaboration", "joint venture",
                ],
                vec![],
                "Strategic Partnership",
            ),
            group(
                "global",
                &[
                    "global expansion", "international market", "new territory", "overseas",
                    "cross-border", "new country", "regional headquarters", "localization",
                    "foreign investment", "international presence", "global reach",
                ],
                vec![],
                "Global Expansion",
            ),
            group("m&a", &["acquisition", "merger", "takeover"], vec![], "M&A Activity"),
            group(
                "regulatory",
                &[
                    "regulatory compliance", "legal requirement", "industry standard",
                    "certification", "accreditation", "regulatory change", "policy adaptation",
                ],
                vec![],
                "Regulatory & Compliance",
            ),
            group(
                "growth",
                &["growth", "new market", "launch", "strategic", "initiative", "innovation"],
                vec![],
                "Business Expansion",
            ),
        ])
    }
}
