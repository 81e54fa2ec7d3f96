use serde::{Deserialize, Serialize};

/// Macro-volatility regime governing the momentum/reversion blend for one
/// scoring pass. Selected once per pass and immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    Trending,
    Transitional,
    HighVolatility,
}

/// Blend weights for one pass. The pairs below always sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeWeights {
    pub momentum: f64,
    pub reversion: f64,
}

impl Regime {
    /// Classify a volatility index reading.
    ///
    /// An unavailable reading falls back to `Transitional` rather than
    /// failing the pass.
    pub fn classify(reading: Option<f64>) -> Self {
        match reading {
            Some(v) if v > 28.0 => Regime::HighVolatility,
            Some(v) if v > 20.0 => Regime::Transitional,
            Some(_) => Regime::Trending,
            None => Regime::Transitional,
        }
    }

    pub fn weights(&self) -> RegimeWeights {
        match self {
            Regime::Trending => RegimeWeights {
                momentum: 0.70,
                reversion: 0.30,
            },
            Regime::Transitional => RegimeWeights {
                momentum: 0.45,
                reversion: 0.55,
            },
            Regime::HighVolatility => RegimeWeights {
                momentum: 0.25,
                reversion: 0.75,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Regime::Trending => "trending",
            Regime::Transitional => "transitional",
            Regime::HighVolatility => "high_volatility",
        }
    }
}
