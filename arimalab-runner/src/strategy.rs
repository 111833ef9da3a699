//! Trading decisions from forecast confidence bands.

use serde::{Deserialize, Serialize};

use crate::model::{FittedModel, Forecast};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PositionSide {
    #[default]
    Flat,
    Long,
    Short,
}

impl PositionSide {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionSide::Flat)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    EnterLong,
    EnterShort,
    ClosePosition,
    Hold,
}

/// Decides what to do after a bar closes, given every close so far.
pub trait DecisionRule {
    fn decide(&self, closes: &[f64], position: PositionSide) -> Decision;
}

/// Where the band is forecast from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandAnchor {
    /// Forecast from the closes before the current bar, so the current
    /// price is compared with what the model expected for it.
    #[default]
    Trailing,
    /// One fixed band forecast past the end of the fitted sample. This
    /// looks ahead when the model was fitted on the backtest period.
    FitEnd,
}

/// Mean reversion against the forecast band: buy below the lowest lower
/// bound, sell above the highest upper bound, exit once price is back
/// inside.
#[derive(Debug, Clone)]
pub struct BandRule {
    model: FittedModel,
    horizon: usize,
    min_history: usize,
    anchor: BandAnchor,
    fixed: Option<Forecast>,
}

impl BandRule {
    pub fn new(model: FittedModel, horizon: usize, min_history: usize) -> Self {
        Self {
            min_history: min_history.max(model.min_history()),
            model,
            horizon: horizon.max(1),
            anchor: BandAnchor::Trailing,
            fixed: None,
        }
    }

    pub fn with_anchor(mut self, anchor: BandAnchor) -> Self {
        self.anchor = anchor;
        self.fixed = match anchor {
            BandAnchor::FitEnd => self.model.predict(self.horizon).ok(),
            BandAnchor::Trailing => None,
        };
        self
    }

    pub fn model(&self) -> &FittedModel {
        &self.model
    }

    pub fn anchor(&self) -> BandAnchor {
        self.anchor
    }

    fn band(&self, prior: &[f64]) -> Option<(f64, f64)> {
        let forecast = match self.anchor {
            BandAnchor::FitEnd => self.fixed.clone(),
            BandAnchor::Trailing => match self.model.forecast_from(prior, self.horizon) {
                Ok(f) => Some(f),
                Err(e) => {
                    tracing::debug!(error = %e, "forecast failed, holding");
                    None
                }
            },
        }?;
        Some((forecast.band_low(), forecast.band_high()))
    }
}

impl DecisionRule for BandRule {
    fn decide(&self, closes: &[f64], position: PositionSide) -> Decision {
        let Some((&price, prior)) = closes.split_last() else {
            return Decision::Hold;
        };
        if prior.len() < self.min_history {
            return Decision::Hold;
        }
        let Some((lo, hi)) = self.band(prior) else {
            return Decision::Hold;
        };

        match position {
            PositionSide::Flat if price < lo => Decision::EnterLong,
            PositionSide::Flat if price > hi => Decision::EnterShort,
            PositionSide::Long | PositionSide::Short if (lo..=hi).contains(&price) => {
                Decision::ClosePosition
            }
            _ => Decision::Hold,
        }
    }
}
