mod config;
mod cpf;
mod engine;
mod historical;
mod monte_carlo;
mod runway;
mod solver;
mod types;

pub use config::{BonusTier, CpfBracket, CpfRules, EngineConfig, PlanConfig};
pub use cpf::{
    CpfContribution, CpfInterest, annual_contribution, annual_interest, effective_interest_rate,
    estimate_monthly_payout, project_cpf, projected_monthly_payout,
};
pub use engine::{calculate_fire, fire_number, project_accumulation, project_drawdown};
pub use historical::{HistoricalData, run_historical_backtest, sequence_count};
pub use monte_carlo::{SeededUniform, UniformSource, aggregate_trials, run_monte_carlo_simulation};
pub use runway::{
    RunwayEntry, annual_withdrawal_converted, compare_runway, resolve_portfolio_value,
    runway_years,
};
pub use solver::{GoalSolveConfig, GoalSolveIteration, GoalSolveResult, GoalType, solve_goal};
pub use types::{
    CpfBalances, CpfProjection, FireResult, HistoricalBacktestResult, HistoricalSequence,
    LifestyleTier, MonteCarloResult, PercentileBands, PortfolioInputs, SimulationResult,
};
