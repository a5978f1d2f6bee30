use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Trading direction produced by the analysis pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Long,
    Short,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Signal::Long => "LONG",
            Signal::Short => "SHORT",
            Signal::Hold => "HOLD",
        };
        f.write_str(label)
    }
}

/// Whether the backend used the user's own exchange and AI keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Live,
    Simulated,
}

/// One entry of the top-coins listing.
/// Only the symbol is guaranteed; remaining market fields are passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinSummary {
    pub symbol: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl CoinSummary {
    /// Look up a numeric market field such as `price` or `volume`
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.fields.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiDecision {
    pub signal: Signal,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmSignal {
    pub signal: Signal,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportResistance {
    pub support: f64,
    pub resistance: f64,
}

/// Analysis report for a single symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolAnalysis {
    pub symbol: String,
    pub current_price: f64,
    pub final_signal: Signal,
    pub mode: AnalysisMode,
    pub ai_decision: AiDecision,
    pub lstm_signal: LstmSignal,
    pub support_resistance: SupportResistance,
    #[serde(default)]
    pub indicators: Value,
    #[serde(default)]
    pub breaker_blocks: Value,
    #[serde(default)]
    pub trade_setup: Value,
}

impl SymbolAnalysis {
    /// Relative distance from the current price to support and resistance, in percent
    pub fn range_percent(&self) -> (f64, f64) {
        if self.current_price == 0.0 {
            return (0.0, 0.0);
        }
        let sr = &self.support_resistance;
        (
            (self.current_price - sr.support) / self.current_price * 100.0,
            (sr.resistance - self.current_price) / self.current_price * 100.0,
        )
    }
}
