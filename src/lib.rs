//! Conversational Financial Agent Core
//!
//! Turns a free-text (or voice-transcribed) question about a user's
//! financial data into a grounded natural-language answer:
//! - Heuristic scenario detection with parameter extraction
//! - Parallel record prefetch under a time budget
//! - Model-driven tool selection over a closed tool catalog
//! - A small forward-only workflow with graceful degradation at every step
//! - Mode-shaped synthesis (text, voice, hybrid long+short)
//!
//! PIPELINE:
//! REQUEST → DETECT → PREFETCH → PLAN → (FETCH-ALL?) → ANSWER

pub mod api;
pub mod budget;
pub mod error;
pub mod llm;
pub mod models;
pub mod planner;
pub mod scenario;
pub mod snapshot;
pub mod store;
pub mod synthesizer;
pub mod tools;
pub mod workflow;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use workflow::Orchestrator;
