use log::debug;

use super::config::EngineConfig;
use super::types::{FireResult, PortfolioInputs, SimulationResult};

/// Saving phase, one record per year from 0 to `years_to_retirement`.
///
/// Record `k` holds the balance after `k` years of growth; its `contribution`
/// and `returns` are the flows that produced it, so year 0 carries neither.
pub fn project_accumulation(inputs: &PortfolioInputs, current_age: u32) -> Vec<SimulationResult> {
    let annual_contribution = inputs.annual_contribution();
    let mut portfolio = inputs.current_savings;
    let mut results = Vec::with_capacity(inputs.years_to_retirement as usize + 1);

    for year in 0..=inputs.years_to_retirement {
        let (contribution, returns) = if year == 0 {
            (0.0, 0.0)
        } else {
            let returns = portfolio * inputs.expected_return;
            portfolio = portfolio + annual_contribution + returns;
            (annual_contribution, returns)
        };

        results.push(SimulationResult {
            year,
            age: current_age + year,
            portfolio_value: portfolio,
            contribution,
            returns,
            withdrawal: 0.0,
            inflation_adjusted_value: portfolio / price_index(inputs.inflation_rate, year),
        });
    }

    results
}

/// Spending phase, one record per year from 0 to `years`.
///
/// Year 0 is the retirement instant and withdraws nothing. The withdrawal
/// grows with inflation every year. The first year that ends at or below zero
/// is recorded as 0 and every later year is the all-zero terminal record.
pub fn project_drawdown(
    starting_portfolio: f64,
    annual_withdrawal: f64,
    return_rate: f64,
    inflation_rate: f64,
    years: u32,
    start_age: u32,
) -> Vec<SimulationResult> {
    let mut results = Vec::with_capacity(years as usize + 1);
    let mut portfolio = starting_portfolio;
    let opening = portfolio.max(0.0);
    results.push(SimulationResult {
        year: 0,
        age: start_age,
        portfolio_value: opening,
        contribution: 0.0,
        returns: 0.0,
        withdrawal: 0.0,
        inflation_adjusted_value: opening,
    });

    let mut depleted = portfolio <= 0.0;
    let mut withdrawal = annual_withdrawal;

    for year in 1..=years {
        let age = start_age + year;
        if depleted {
            results.push(SimulationResult::depleted(year, age));
            continue;
        }

        let returns = portfolio * return_rate;
        portfolio = portfolio + returns - withdrawal;
        let recorded = portfolio.max(0.0);
        results.push(SimulationResult {
            year,
            age,
            portfolio_value: recorded,
            contribution: 0.0,
            returns,
            withdrawal,
            inflation_adjusted_value: recorded / price_index(inflation_rate, year),
        });

        if portfolio <= 0.0 {
            debug!("drawdown depleted at age {age} (year {year} of {years})");
            depleted = true;
        }
        withdrawal *= 1.0 + inflation_rate;
    }

    results
}

pub fn calculate_fire(
    inputs: &PortfolioInputs,
    current_age: u32,
    monthly_expenses: f64,
    retirement_years: u32,
    config: &EngineConfig,
) -> FireResult {
    let accumulation = project_accumulation(inputs, current_age);
    let portfolio_at_retirement = accumulation
        .last()
        .map(|r| r.portfolio_value)
        .unwrap_or(inputs.current_savings);

    let fire_number = fire_number(monthly_expenses * 12.0, inputs.withdrawal_rate);
    let annual_withdrawal = retirement_withdrawal(inputs, monthly_expenses);
    let drawdown = project_drawdown(
        portfolio_at_retirement,
        annual_withdrawal,
        config.drawdown_return(inputs.expected_return),
        inputs.inflation_rate,
        retirement_years,
        current_age + inputs.years_to_retirement,
    );

    let years_to_fire = accumulation
        .iter()
        .find(|r| r.portfolio_value >= fire_number)
        .map(|r| r.year);
    let depleted_at_age = drawdown
        .iter()
        .skip(1)
        .find(|r| r.portfolio_value <= 0.0)
        .map(|r| r.age);

    FireResult {
        fire_number,
        coast_fire_number: coast_fire_number(
            fire_number,
            inputs.expected_return,
            inputs.years_to_retirement,
        ),
        portfolio_at_retirement,
        annual_withdrawal,
        years_to_fire,
        depleted_at_age,
        success_probability: heuristic_success_probability(portfolio_at_retirement, fire_number),
        accumulation,
        drawdown,
    }
}

pub fn fire_number(annual_expenses: f64, withdrawal_rate: f64) -> f64 {
    if withdrawal_rate <= 0.0 {
        return f64::INFINITY;
    }
    annual_expenses / withdrawal_rate
}

/// First-year retirement spending: today's expenses carried forward by
/// inflation to the retirement year.
pub(crate) fn retirement_withdrawal(inputs: &PortfolioInputs, monthly_expenses: f64) -> f64 {
    monthly_expenses * 12.0 * price_index(inputs.inflation_rate, inputs.years_to_retirement)
}

fn coast_fire_number(fire_number: f64, expected_return: f64, years: u32) -> f64 {
    let growth = (1.0 + expected_return).powi(years as i32);
    if growth <= 1e-9 {
        return fire_number;
    }
    fire_number / growth
}

fn heuristic_success_probability(portfolio_at_retirement: f64, fire_number: f64) -> f64 {
    let score = if portfolio_at_retirement >= fire_number {
        0.95
    } else {
        (portfolio_at_retirement / fire_number) * 0.8
    };
    score.min(0.99)
}

fn price_index(inflation_rate: f64, years: u32) -> f64 {
    (1.0 + inflation_rate).powi(years as i32).max(1e-9)
}
