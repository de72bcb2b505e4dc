use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParameters {
    pub initial_amount: f64,
    pub annual_return: f64,
    pub volatility: f64,
    pub years: u32,
    pub num_simulations: u32,
    pub seed: u32,
}

impl SimulationParameters {
    // negative horizons and trial counts are rejected at the API boundary
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !self.initial_amount.is_finite() || self.initial_amount <= 0.0 {
            return Err(SimulationError::invalid(
                "initial_amount",
                "must be a finite value > 0",
            ));
        }
        if !self.annual_return.is_finite() {
            return Err(SimulationError::invalid("annual_return", "must be finite"));
        }
        if !self.volatility.is_finite() || self.volatility < 0.0 {
            return Err(SimulationError::invalid(
                "volatility",
                "must be a finite value >= 0",
            ));
        }
        Ok(())
    }

    pub fn deterministic_final_value(&self) -> f64 {
        self.initial_amount * (1.0 + self.annual_return).powf(f64::from(self.years))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: &'static str,
    },
}

impl SimulationError {
    fn invalid(name: &'static str, reason: &'static str) -> Self {
        Self::InvalidParameter { name, reason }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    pub year: u32,
    pub value: f64,
}

pub type Trajectory = Vec<TrajectoryPoint>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRun {
    pub trajectories: Vec<Trajectory>,
    pub final_values: Vec<f64>,
}

impl SimulationRun {
    pub fn len(&self) -> usize {
        self.final_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.final_values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionSummary {
    pub mean: f64,
    pub median: f64,
    pub q10: f64,
    pub q25: f64,
    pub q75: f64,
    pub q90: f64,
    pub min: f64,
    pub max: f64,
    pub prob_loss: f64,
}

impl DistributionSummary {
    pub(crate) fn undefined() -> Self {
        Self {
            mean: f64::NAN,
            median: f64::NAN,
            q10: f64::NAN,
            q25: f64::NAN,
            q75: f64::NAN,
            q90: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
            prob_loss: f64::NAN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearBand {
    pub year: u32,
    pub median: f64,
    pub q10: f64,
    pub q25: f64,
    pub q75: f64,
    pub q90: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub range_label: String,
    pub start: f64,
    pub end: f64,
    pub count: usize,
}
