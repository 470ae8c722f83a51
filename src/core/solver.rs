use log::debug;
use serde::{Deserialize, Serialize};

use super::config::EngineConfig;
use super::engine::calculate_fire;
use super::types::PortfolioInputs;
use crate::error::FireError;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GoalType {
    /// Smallest monthly contribution that reaches the FIRE number by retirement.
    RequiredContribution,
    /// Largest monthly expense level the drawdown survives.
    MaxExpenses,
}

#[derive(Debug, Clone, Copy)]
pub struct GoalSolveConfig {
    pub goal_type: GoalType,
    pub current_age: u32,
    /// Held fixed while solving for a contribution.
    pub monthly_expenses: f64,
    pub retirement_years: u32,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_value: f64,
    pub goal_met: bool,
    pub margin: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveResult {
    pub goal_type: GoalType,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub solved_value: Option<f64>,
    pub achieved_margin: Option<f64>,
    pub iterations: Vec<GoalSolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
struct CandidateEval {
    goal_met: bool,
    /// Portfolio above the FIRE number, or the final drawdown balance.
    margin: f64,
}

pub fn solve_goal(
    inputs: &PortfolioInputs,
    config: GoalSolveConfig,
    engine: &EngineConfig,
) -> Result<GoalSolveResult, FireError> {
    validate_config(inputs, config)?;

    let low_eval = evaluate_candidate(inputs, config, engine, config.search_min);
    let high_eval = evaluate_candidate(inputs, config, engine, config.search_max);

    // RequiredContribution gets easier as the candidate grows; MaxExpenses harder.
    let met_grows_with_value = config.goal_type == GoalType::RequiredContribution;
    let (min_side, max_side) = if met_grows_with_value {
        (high_eval, low_eval)
    } else {
        (low_eval, high_eval)
    };

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let mut solved_value = None;
    let mut converged = false;
    let feasible;
    let message;

    if !min_side.goal_met {
        feasible = false;
        message = match config.goal_type {
            GoalType::RequiredContribution => {
                "No feasible contribution found within the search bounds."
            }
            GoalType::MaxExpenses => "Even the lowest expense bound depletes the portfolio.",
        }
        .to_string();
    } else if max_side.goal_met {
        feasible = true;
        converged = true;
        let (value, text) = match config.goal_type {
            GoalType::RequiredContribution => (
                config.search_min,
                "Already meets target at lower contribution bound.",
            ),
            GoalType::MaxExpenses => (
                config.search_max,
                "Upper expense bound is still sustainable; increase search max for a higher target.",
            ),
        };
        solved_value = Some(value);
        message = text.to_string();
    } else {
        let mut lo = config.search_min;
        let mut hi = config.search_max;
        for it in 1..=config.max_iterations {
            let mid = (lo + hi) * 0.5;
            let eval = evaluate_candidate(inputs, config, engine, mid);
            iterations.push(GoalSolveIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_value: mid,
                goal_met: eval.goal_met,
                margin: eval.margin,
            });

            if eval.goal_met == met_grows_with_value {
                hi = mid;
            } else {
                lo = mid;
            }

            if (hi - lo).abs() <= config.tolerance {
                converged = true;
                break;
            }
        }
        // Keep the bound that satisfies the goal.
        solved_value = Some(if met_grows_with_value { hi } else { lo });
        feasible = true;
        message = match (converged, config.goal_type) {
            (true, GoalType::RequiredContribution) => "Solved required contribution.",
            (true, GoalType::MaxExpenses) => "Solved maximum sustainable expenses.",
            (false, _) => {
                "Reached max iterations before tolerance was met; returning best estimate."
            }
        }
        .to_string();
    }

    let achieved_margin = solved_value.map(|v| evaluate_candidate(inputs, config, engine, v).margin);
    debug!(
        "goal solve {:?}: value {:?} after {} iterations (converged: {converged})",
        config.goal_type,
        solved_value,
        iterations.len()
    );

    Ok(GoalSolveResult {
        goal_type: config.goal_type,
        search_min: config.search_min,
        search_max: config.search_max,
        tolerance: config.tolerance,
        max_iterations: config.max_iterations,
        solved_value,
        achieved_margin,
        iterations,
        converged,
        feasible,
        message,
    })
}

fn evaluate_candidate(
    base_inputs: &PortfolioInputs,
    config: GoalSolveConfig,
    engine: &EngineConfig,
    candidate_value: f64,
) -> CandidateEval {
    let mut inputs = *base_inputs;
    let mut monthly_expenses = config.monthly_expenses;
    match config.goal_type {
        GoalType::RequiredContribution => inputs.monthly_contribution = candidate_value.max(0.0),
        GoalType::MaxExpenses => monthly_expenses = candidate_value.max(0.0),
    }

    let fire = calculate_fire(
        &inputs,
        config.current_age,
        monthly_expenses,
        config.retirement_years,
        engine,
    );

    match config.goal_type {
        GoalType::RequiredContribution => CandidateEval {
            goal_met: fire.portfolio_at_retirement >= fire.fire_number,
            margin: fire.portfolio_at_retirement - fire.fire_number,
        },
        GoalType::MaxExpenses => CandidateEval {
            goal_met: fire.depleted_at_age.is_none(),
            margin: fire.drawdown.last().map(|r| r.portfolio_value).unwrap_or(0.0),
        },
    }
}

fn validate_config(inputs: &PortfolioInputs, config: GoalSolveConfig) -> Result<(), FireError> {
    if config.goal_type == GoalType::RequiredContribution && inputs.withdrawal_rate <= 0.0 {
        return Err(FireError::invalid(
            "withdrawal_rate must be > 0 to solve for a contribution",
        ));
    }
    if config.goal_type == GoalType::RequiredContribution
        && (!config.monthly_expenses.is_finite() || config.monthly_expenses < 0.0)
    {
        return Err(FireError::invalid("monthly_expenses must be >= 0"));
    }
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return Err(FireError::invalid("search bounds must be finite"));
    }
    if config.search_min < 0.0 {
        return Err(FireError::invalid("search_min must be >= 0"));
    }
    if config.search_max <= config.search_min {
        return Err(FireError::invalid("search_max must be greater than search_min"));
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err(FireError::invalid("tolerance must be > 0"));
    }
    if config.max_iterations == 0 {
        return Err(FireError::invalid("max_iterations must be > 0"));
    }
    Ok(())
}
