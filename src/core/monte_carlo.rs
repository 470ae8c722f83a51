use log::debug;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::config::EngineConfig;
use super::engine::retirement_withdrawal;
use super::types::{MonteCarloResult, PercentileBands, PortfolioInputs};

const PERCENTILES: [f64; 5] = [0.05, 0.25, 0.5, 0.75, 0.95];

/// Uniform draws on [0, 1). Tests inject a scripted source; production code
/// uses [`SeededUniform`].
pub trait UniformSource {
    fn next_unit(&mut self) -> f64;
}

pub struct SeededUniform {
    rng: SmallRng,
}

impl SeededUniform {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }
}

impl UniformSource for SeededUniform {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen_range(0.0..1.0)
    }
}

/// Runs `simulations` independent two-phase trials and reduces them to
/// nearest-rank percentile bands, one entry per simulated year.
///
/// Drawdown values are clamped at zero each year but the path keeps being
/// simulated; unlike the deterministic drawdown it is not frozen.
pub fn run_monte_carlo_simulation<R: UniformSource + ?Sized>(
    inputs: &PortfolioInputs,
    current_age: u32,
    monthly_expenses: f64,
    simulations: u32,
    retirement_years: u32,
    config: &EngineConfig,
    rng: &mut R,
) -> MonteCarloResult {
    let first_withdrawal = retirement_withdrawal(inputs, monthly_expenses);
    let trials = (0..simulations)
        .map(|_| simulate_trial(inputs, first_withdrawal, retirement_years, config, rng))
        .collect::<Vec<_>>();

    let mut result = aggregate_trials(&trials);
    result.ages = (1..=inputs.years_to_retirement + retirement_years)
        .map(|offset| current_age + offset)
        .collect();
    debug!(
        "monte carlo: {simulations} trials over {} years, success rate {:.3}",
        result.ages.len(),
        result.success_rate
    );
    result
}

/// Reduces per-trial yearly values to percentile bands. The result does not
/// depend on trial order.
pub fn aggregate_trials(trials: &[Vec<f64>]) -> MonteCarloResult {
    let years = trials.iter().map(Vec::len).max().unwrap_or(0);
    let mut bands = PercentileBands {
        percentile5: Vec::with_capacity(years),
        percentile25: Vec::with_capacity(years),
        percentile50: Vec::with_capacity(years),
        percentile75: Vec::with_capacity(years),
        percentile95: Vec::with_capacity(years),
    };

    let mut column = Vec::with_capacity(trials.len());
    for year in 0..years {
        column.clear();
        column.extend(trials.iter().map(|t| t.get(year).copied().unwrap_or(0.0)));
        column.sort_by(|a, b| a.total_cmp(b));

        let [p5, p25, p50, p75, p95] = PERCENTILES.map(|p| nearest_rank(&column, p));
        bands.percentile5.push(p5);
        bands.percentile25.push(p25);
        bands.percentile50.push(p50);
        bands.percentile75.push(p75);
        bands.percentile95.push(p95);
    }

    let survivors = trials
        .iter()
        .filter(|t| t.last().copied().unwrap_or(0.0) > 0.0)
        .count();
    let success_rate = if trials.is_empty() {
        0.0
    } else {
        survivors as f64 / trials.len() as f64
    };
    let median_end_value = bands.percentile50.last().copied().unwrap_or(0.0);

    MonteCarloResult {
        ages: (1..=years as u32).collect(),
        bands,
        success_rate,
        median_end_value,
    }
}

fn simulate_trial<R: UniformSource + ?Sized>(
    inputs: &PortfolioInputs,
    first_withdrawal: f64,
    retirement_years: u32,
    config: &EngineConfig,
    rng: &mut R,
) -> Vec<f64> {
    let mut values =
        Vec::with_capacity((inputs.years_to_retirement + retirement_years) as usize);
    let annual_contribution = inputs.annual_contribution();
    let mut portfolio = inputs.current_savings;

    for _ in 0..inputs.years_to_retirement {
        let r = sample_return(inputs.expected_return, config.volatility, rng);
        portfolio = portfolio * (1.0 + r) + annual_contribution;
        values.push(portfolio);
    }

    let drawdown_mean = config.drawdown_return(inputs.expected_return);
    let mut withdrawal = first_withdrawal;
    for _ in 0..retirement_years {
        let r = sample_return(drawdown_mean, config.volatility, rng);
        portfolio = (portfolio * (1.0 + r) - withdrawal).max(0.0);
        values.push(portfolio);
        withdrawal *= 1.0 + inputs.inflation_rate;
    }

    values
}

fn sample_return<R: UniformSource + ?Sized>(mean: f64, volatility: f64, rng: &mut R) -> f64 {
    mean + rng.next_unit() * 2.0 * volatility - volatility
}

/// Value at rank `floor(n * p)` of an ascending slice; no interpolation.
fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (sorted.len() as f64 * p).floor() as usize;
    sorted[rank.min(sorted.len() - 1)]
}
