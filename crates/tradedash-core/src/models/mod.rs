//! Data models for the dashboard backend payloads.
//!
//! - `ApiEnvelope`, `Acknowledgement`: the `{ success, data, message }` wrapper
//! - `CoinSummary`: entries of the top-coins listing
//! - `SymbolAnalysis` and friends: the per-symbol analysis report

pub mod envelope;
pub mod market;

pub use envelope::{Acknowledgement, ApiEnvelope, HealthStatus};
pub use market::{
    AiDecision, AnalysisMode, CoinSummary, LstmSignal, Signal, SupportResistance, SymbolAnalysis,
};
