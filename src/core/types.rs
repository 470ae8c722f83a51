use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioInputs {
    pub current_savings: f64,
    pub monthly_contribution: f64,
    pub years_to_retirement: u32,
    pub expected_return: f64,
    pub inflation_rate: f64,
    pub withdrawal_rate: f64,
}

impl PortfolioInputs {
    pub fn annual_contribution(&self) -> f64 {
        self.monthly_contribution * 12.0
    }
}

impl Default for PortfolioInputs {
    fn default() -> Self {
        Self {
            current_savings: 500_000.0,
            monthly_contribution: 5_000.0,
            years_to_retirement: 10,
            expected_return: 0.07,
            inflation_rate: 0.03,
            withdrawal_rate: 0.04,
        }
    }
}

/// One projected year. Values are the snapshot recorded for that year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub year: u32,
    pub age: u32,
    pub portfolio_value: f64,
    pub contribution: f64,
    pub returns: f64,
    pub withdrawal: f64,
    pub inflation_adjusted_value: f64,
}

impl SimulationResult {
    pub(crate) fn depleted(year: u32, age: u32) -> Self {
        Self {
            year,
            age,
            portfolio_value: 0.0,
            contribution: 0.0,
            returns: 0.0,
            withdrawal: 0.0,
            inflation_adjusted_value: 0.0,
        }
    }

    pub fn is_all_zero(&self) -> bool {
        [
            self.portfolio_value,
            self.contribution,
            self.returns,
            self.withdrawal,
            self.inflation_adjusted_value,
        ]
        .iter()
        .all(|v| *v == 0.0)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FireResult {
    pub accumulation: Vec<SimulationResult>,
    pub drawdown: Vec<SimulationResult>,
    pub fire_number: f64,
    pub coast_fire_number: f64,
    pub portfolio_at_retirement: f64,
    pub annual_withdrawal: f64,
    pub years_to_fire: Option<u32>,
    pub depleted_at_age: Option<u32>,
    /// Heuristic score, not a probability estimate.
    pub success_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileBands {
    pub percentile5: Vec<f64>,
    pub percentile25: Vec<f64>,
    pub percentile50: Vec<f64>,
    pub percentile75: Vec<f64>,
    pub percentile95: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloResult {
    pub ages: Vec<u32>,
    #[serde(flatten)]
    pub bands: PercentileBands,
    pub success_rate: f64,
    pub median_end_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalSequence {
    pub start_year: u32,
    pub end_year: u32,
    pub final_value: f64,
    pub lowest_value: f64,
    pub lowest_year: u32,
    pub survived: bool,
    pub years_depleted: Option<u32>,
    pub real_returns: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalBacktestResult {
    pub sequences: Vec<HistoricalSequence>,
    pub success_rate: f64,
    pub failed_count: usize,
    pub worst: Option<HistoricalSequence>,
    pub best: Option<HistoricalSequence>,
    pub median_final_value: f64,
    pub average_final_value: f64,
}

/// Caller-supplied CPF balances. `total` is informational only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpfBalances {
    #[serde(rename = "OA")]
    pub oa: f64,
    #[serde(rename = "SA")]
    pub sa: f64,
    #[serde(rename = "MA")]
    pub ma: f64,
    pub total: f64,
}

impl CpfBalances {
    pub fn new(oa: f64, sa: f64, ma: f64) -> Self {
        Self {
            oa,
            sa,
            ma,
            total: oa + sa + ma,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpfProjection {
    pub age: u32,
    pub year: u32,
    #[serde(rename = "OA")]
    pub oa: f64,
    #[serde(rename = "SA")]
    pub sa: f64,
    #[serde(rename = "MA")]
    pub ma: f64,
    #[serde(rename = "RA")]
    pub ra: f64,
    pub total: f64,
    pub contributions: f64,
    pub interest: f64,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifestyleTier {
    Frugal,
    #[default]
    Moderate,
    Comfortable,
}
