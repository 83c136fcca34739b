use lead_pipeline::config::Config;
use lead_pipeline::core::models::InboundLead;
use lead_pipeline::core::pipeline::PipelineEngine;
use lead_pipeline::integrations::decision::RemoteDecisionClient;
use lead_pipeline::integrations::providers::{HttpEnrichmentProvider, HttpOpportunityProvider};
use lead_pipeline::tables::{DecisionTables, TableHandle};
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Accepted input shapes: a bare lead, a lead wrapped in `inbound_lead`, or a
/// list of either.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LeadInput {
    Wrapped { inbound_lead: InboundLead },
    Bare(InboundLead),
}

impl LeadInput {
    fn into_lead(self) -> InboundLead {
        match self {
            LeadInput::Wrapped { inbound_lead } => inbound_lead,
            LeadInput::Bare(lead) => lead,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Batch {
    Many(Vec<LeadInput>),
    One(LeadInput),
}

async fn read_input() -> anyhow::Result<String> {
    match std::env::args().nth(1) {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read lead file {}: {}", path, e)),
        None => {
            let mut raw = String::new();
            tokio::io::stdin().read_to_string(&mut raw).await?;
            Ok(raw)
        }
    }
}

/// Main entry point for the application.
///
/// Reads one lead (or a JSON array of leads) from the file given as the first
/// argument, or from stdin, runs each through the pipeline and prints the
/// resulting states as JSON on stdout. Logs go to stderr.
///
/// # Returns
///
/// * `anyhow::Result<()>` - An error (non-zero exit) when setup fails or any run
///   finished with an error.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lead_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    let tables = match &config.decision_tables_path {
        Some(path) => DecisionTables::from_json_file(path).await?,
        None => DecisionTables::default(),
    };
    let tables = Arc::new(TableHandle::new(tables)?);

    let enrichment = Arc::new(HttpEnrichmentProvider::new(
        &config.enrichment_base_url,
        config.provider_api_key.clone(),
    )?);
    let opportunities = Arc::new(HttpOpportunityProvider::new(
        &config.opportunity_base_url,
        config.provider_api_key.clone(),
    )?);

    let mut engine = PipelineEngine::new(enrichment, opportunities, tables)
        .with_options(config.pipeline_options());
    if let Some(url) = &config.decision_service_url {
        let remote = RemoteDecisionClient::new(url, config.provider_api_key.clone())?;
        engine = engine.with_decision_delegate(Arc::new(remote));
        tracing::info!("✓ Remote decision service: {}", url);
    }
    let engine = Arc::new(engine);

    let raw = read_input().await?;
    let leads: Vec<InboundLead> = match serde_json::from_str::<Batch>(&raw)? {
        Batch::Many(items) => items.into_iter().map(LeadInput::into_lead).collect(),
        Batch::One(item) => vec![item.into_lead()],
    };

    let mut runs = JoinSet::new();
    for (index, lead) in leads.into_iter().enumerate() {
        let engine = Arc::clone(&engine);
        runs.spawn(async move { (index, engine.run(lead).await) });
    }

    let mut states = Vec::with_capacity(runs.len());
    while let Some(joined) = runs.join_next().await {
        states.push(joined?);
    }
    states.sort_by_key(|(index, _)| *index);
    let states: Vec<_> = states.into_iter().map(|(_, state)| state).collect();

    let failed = states.iter().filter(|state| state.has_error()).count();
    let output = match states.as_slice() {
        [single] => serde_json::to_string_pretty(single)?,
        many => serde_json::to_string_pretty(many)?,
    };
    println!("{}", output);

    if failed > 0 {
        anyhow::bail!("{} of {} pipeline run(s) finished with an error", failed, states.len());
    }
    Ok(())
}
