use crate::errors::PipelineError;
use crate::models::SalesRep;
use crate::routing::TerritoryAliases;
use crate::scoring::IcpCriteria;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Process-wide decision configuration: scoring criteria, sales roster and
/// territory aliases.
///
/// Loaded once at startup and never mutated in place. Reloading goes through
/// [`TableHandle::swap`], which replaces the whole set at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTables {
    #[serde(default)]
    pub criteria: IcpCriteria,
    #[serde(default = "default_roster")]
    pub roster: Vec<SalesRep>,
    #[serde(default = "default_territories")]
    pub territories: TerritoryAliases,
}

impl Default for DecisionTables {
    fn default() -> Self {
        Self {
            criteria: IcpCriteria::default(),
            roster: default_roster(),
            territories: default_territories(),
        }
    }
}

fn rep(
    name: &str,
    email: &str,
    territory: &str,
    region: &str,
    focus: &[&str],
    min_company_size: u64,
    min_icp_score: u32,
) -> SalesRep {
    SalesRep {
        name: name.to_string(),
        email: email.to_string(),
        territory: territory.to_string(),
        region: region.to_string(),
        industry_focus: focus.iter().map(|f| f.to_string()).collect(),
        min_company_size,
        min_icp_score,
    }
}

fn default_roster() -> Vec<SalesRep> {
    vec![
        rep(
            "Sarah Chen",
            "sarah.chen@deloitte.com",
            "USA",
            "West Coast",
            &["SaaS", "Cloud Computing", "Software", "Technology", "Fintech", "Healthcare Tech"],
            200,
            70,
        ),
        rep(
            "Mike Johnson",
            "mike.johnson@deloitte.com",
            "USA",
            "East Coast",
            &["Manufacturing", "Healthcare", "E-commerce"],
            100,
            60,
        ),
        rep(
            "Emma Wilson",
            "emma.wilson@deloitte.com",
            "Canada",
            "All Canada",
            &["SaaS", "Retail", "Fintech"],
            100,
            60,
        ),
        rep(
            "David Lee",
            "david.lee@deloitte.com",
            "UK",
            "Europe",
            &["SaaS", "Fintech"],
            150,
            65,
        ),
    ]
}

fn aliases(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn default_territories() -> TerritoryAliases {
    let mut territories = TerritoryAliases::new();
    territories.insert(
        "USA".to_string(),
        aliases(&[
            "United States", "U.S.", "US", "America", "Washington", "California", "New York",
            "Texas", "Massachusetts", "Illinois", "Seattle", "Redmond", "San Francisco",
            "Boston", "Chicago", "Austin",
        ]),
    );
    territories.insert(
        "Canada".to_string(),
        aliases(&[
            "Ontario", "Quebec", "British Columbia", "Alberta", "Toronto", "Vancouver",
            "Montreal", "Calgary", "Ottawa",
        ]),
    );
    territories.insert(
        "UK".to_string(),
        aliases(&[
            "United Kingdom", "U.K.", "England", "Scotland", "Wales", "Britain", "London",
            "Manchester", "Edinburgh",
        ]),
    );
    territories
}

impl DecisionTables {
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.criteria.validate()?;

        let mut seen = BTreeSet::new();
        for rep in &self.roster {
            if rep.name.trim().is_empty() || rep.territory.trim().is_empty() {
                return Err(PipelineError::DecisionParse(
                    "every sales representative needs a name and a territory".to_string(),
                ));
            }
            if !seen.insert(rep.name.as_str()) {
                return Err(PipelineError::DecisionParse(format!(
                    "duplicate sales representative '{}'",
                    rep.name
                )));
            }
        }

        Ok(())
    }

    /// Parses tables from JSON. Missing sections fall back to the built-in defaults.
    pub fn from_json(raw: &str) -> Result<Self, PipelineError> {
        let tables: DecisionTables = serde_json::from_str(raw)?;
        tables.validate()?;
        Ok(tables)
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read decision tables {}: {}", path.display(), e))?;
        let tables = Self::from_json(&raw)
            .map_err(|e| anyhow::anyhow!("Invalid decision tables {}: {}", path.display(), e))?;
        tracing::info!(
            "Loaded decision tables from {} ({} representatives)",
            path.display(),
            tables.roster.len()
        );
        Ok(tables)
    }

    /// Hex-encoded SHA-256 of the canonical JSON form.
    ///
    /// All tables are ordered collections, so equal tables always produce the
    /// same fingerprint.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Immutable view of the tables used by one pipeline run.
#[derive(Debug)]
pub struct TableSnapshot {
    pub tables: DecisionTables,
    pub fingerprint: String,
}

impl TableSnapshot {
    fn new(tables: DecisionTables) -> Self {
        let fingerprint = tables.fingerprint();
        Self {
            tables,
            fingerprint,
        }
    }
}

/// Shared handle to the current decision tables.
///
/// Readers take an `Arc` snapshot and keep it for the whole run, so a
/// concurrent [`swap`](TableHandle::swap) never exposes a half-updated table.
#[derive(Debug)]
pub struct TableHandle {
    current: RwLock<Arc<TableSnapshot>>,
}

impl TableHandle {
    pub fn new(tables: DecisionTables) -> Result<Self, PipelineError> {
        tables.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(TableSnapshot::new(tables))),
        })
    }

    pub fn snapshot(&self) -> Arc<TableSnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Validates and installs `tables`, returning the snapshot it replaced.
    /// Invalid tables leave the current snapshot in place.
    pub fn swap(&self, tables: DecisionTables) -> Result<Arc<TableSnapshot>, PipelineError> {
        tables.validate()?;
        let next = Arc::new(TableSnapshot::new(tables));
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let previous = std::mem::replace(&mut *guard, next);
        tracing::info!(
            "Decision tables swapped: {} -> {}",
            &previous.fingerprint[..12],
            &guard.fingerprint[..12]
        );
        Ok(previous)
    }
}

impl Default for TableHandle {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(TableSnapshot::new(DecisionTables::default()))),
        }
    }
}
