//! Lead Pipeline Library
//!
//! This library enriches an inbound sales lead with company metadata and
//! recent opportunity signals, scores it against an ideal customer profile
//! and routes qualified leads to a sales representative.
//!
//! # Modules
//!
//! - `core`: Domain-layer namespace (pipeline, scoring, routing).
//! - `integrations`: External collaborator namespace (providers, decision delegates).
//! - `circuit_breaker`: Circuit breaker for collaborator calls.
//! - `classifier`: Keyword classifier for opportunity categories.
//! - `config`: Configuration management.
//! - `decision`: Rule-based and remote decision delegates.
//! - `errors`: Error handling types.
//! - `models`: Core data models.
//! - `pipeline`: Stage state machine and engine.
//! - `providers`: Enrichment and opportunity providers.
//! - `routing`: Sales representative matcher.
//! - `scoring`: ICP scoring rubric.
//! - `state`: Per-run lead state.
//! - `tables`: Decision tables and the swappable table handle.
//! - `text_match`: Word-level matching helpers.

pub mod core;
pub mod integrations;

// Re-export primary modules for shared use in tests and the binary
pub mod circuit_breaker;
pub mod classifier;
pub mod config;
pub mod decision;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod routing;
pub mod scoring;
pub mod state;
pub mod tables;
pub mod text_match;
