use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::catalog::{Country, CountryCatalog};
use crate::core::{
    CpfBalances, CpfProjection, CpfRules, EngineConfig, FireResult, GoalSolveConfig,
    GoalSolveResult, GoalType, HistoricalBacktestResult, HistoricalData, LifestyleTier,
    MonteCarloResult, PlanConfig, PortfolioInputs, RunwayEntry, SeededUniform, calculate_fire, compare_runway,
    effective_interest_rate, project_cpf, projected_monthly_payout, resolve_portfolio_value,
    run_historical_backtest, run_monte_carlo_simulation, solve_goal,
};
use crate::error::FireError;
use crate::share::{decode_state, decode_state_or_default, encode_state};
use crate::store::LocalStore;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliLifestyleTier {
    Frugal,
    Moderate,
    Comfortable,
}

impl From<CliLifestyleTier> for LifestyleTier {
    fn from(value: CliLifestyleTier) -> Self {
        match value {
            CliLifestyleTier::Frugal => LifestyleTier::Frugal,
            CliLifestyleTier::Moderate => LifestyleTier::Moderate,
            CliLifestyleTier::Comfortable => LifestyleTier::Comfortable,
        }
    }
}

impl From<LifestyleTier> for CliLifestyleTier {
    fn from(value: LifestyleTier) -> Self {
        match value {
            LifestyleTier::Frugal => CliLifestyleTier::Frugal,
            LifestyleTier::Moderate => CliLifestyleTier::Moderate,
            LifestyleTier::Comfortable => CliLifestyleTier::Comfortable,
        }
    }
}

/// Query/JSON body for `/api/plan`. Percentages use the same units as the CLI.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PlanPayload {
    current_savings: Option<f64>,
    monthly_contribution: Option<f64>,
    years_to_retirement: Option<u32>,
    expected_return: Option<f64>,
    inflation_rate: Option<f64>,
    withdrawal_rate: Option<f64>,

    current_age: Option<u32>,
    monthly_expenses: Option<f64>,
    retirement_years: Option<u32>,
    simulations: Option<u32>,
    seed: Option<u64>,

    volatility: Option<f64>,
    drawdown_haircut: Option<f64>,
    exchange_rate: Option<f64>,

    lifestyle_tier: Option<LifestyleTier>,
    min_rating: Option<u8>,
    include_cpf: Option<bool>,

    cpf_oa: Option<f64>,
    cpf_sa: Option<f64>,
    cpf_ma: Option<f64>,
    monthly_salary: Option<f64>,
    cpf_stop_age: Option<u32>,
    cpf_years: Option<u32>,

    solve_goals: Option<bool>,
}

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(
    name = "fire-atlas",
    about = "FIRE projections: deterministic, Monte Carlo, historical backtest, CPF and country runway"
)]
pub struct Cli {
    #[arg(long, default_value_t = 500_000.0)]
    current_savings: f64,
    #[arg(long, default_value_t = 5_000.0)]
    monthly_contribution: f64,
    #[arg(long, default_value_t = 10)]
    years_to_retirement: u32,
    #[arg(
        long,
        default_value_t = 7.0,
        help = "Expected annual return in percent, e.g. 7"
    )]
    expected_return: f64,
    #[arg(long, default_value_t = 3.0, help = "Annual inflation in percent")]
    inflation_rate: f64,
    #[arg(long, default_value_t = 4.0, help = "Safe withdrawal rate in percent")]
    withdrawal_rate: f64,
    #[arg(long, default_value_t = 35)]
    current_age: u32,
    #[arg(
        long,
        default_value_t = 2_000.0,
        help = "Monthly spending in today's money"
    )]
    monthly_expenses: f64,
    #[arg(long, default_value_t = 40)]
    retirement_years: u32,
    #[arg(long, default_value_t = 1_000)]
    simulations: u32,
    #[arg(long, help = "Seed for reproducible Monte Carlo runs")]
    seed: Option<u64>,
    #[arg(
        long,
        help = "Half-width of the Monte Carlo return band in percent [default: 15]"
    )]
    volatility: Option<f64>,
    #[arg(
        long,
        help = "Percentage points taken off the expected return during drawdown [default: 1]"
    )]
    drawdown_haircut: Option<f64>,
    #[arg(
        long,
        help = "Portfolio currency to USD for the country comparison [default: 0.74]"
    )]
    exchange_rate: Option<f64>,
    #[arg(long, value_enum, default_value_t = CliLifestyleTier::Moderate)]
    lifestyle_tier: CliLifestyleTier,
    #[arg(long, help = "Only compare countries rated at least this overall (0-10)")]
    min_rating: Option<u8>,
    #[arg(long, help = "Add the projected CPF balance to the runway portfolio")]
    include_cpf: bool,
    #[arg(long, default_value_t = 0.0)]
    cpf_oa: f64,
    #[arg(long, default_value_t = 0.0)]
    cpf_sa: f64,
    #[arg(long, default_value_t = 0.0)]
    cpf_ma: f64,
    #[arg(long, default_value_t = 0.0, help = "Monthly salary for CPF contributions")]
    monthly_salary: f64,
    #[arg(long, default_value_t = 65)]
    cpf_stop_age: u32,
    #[arg(long, default_value_t = 30)]
    cpf_years: u32,
    #[arg(long, help = "Also solve for the required contribution and max expenses")]
    solve_goals: bool,
    #[arg(long, help = "CSV with year,nominal_return,inflation columns")]
    historical_data: Option<PathBuf>,
    #[arg(long, help = "JSON country catalog replacing the built-in one")]
    countries: Option<PathBuf>,
    #[arg(
        long,
        help = "JSON settings file with `engine` and `cpf` sections; flags take precedence"
    )]
    config: Option<PathBuf>,
    #[arg(long, help = "Load the six portfolio inputs from a share token")]
    share_token: Option<String>,
    #[arg(long, help = "JSON file where the plan inputs are remembered")]
    store: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
struct CpfRequest {
    balances: CpfBalances,
    monthly_salary: f64,
    stop_contributions_at_age: u32,
    years_to_project: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    inputs: PortfolioInputs,
    current_age: u32,
    monthly_expenses: f64,
    retirement_years: u32,
    simulations: u32,
    seed: Option<u64>,
    engine: EngineConfig,
    cpf_rules: CpfRules,
    tier: LifestyleTier,
    min_rating: Option<u8>,
    include_cpf: bool,
    cpf: Option<CpfRequest>,
    solve_goals: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CpfReport {
    projections: Vec<CpfProjection>,
    effective_interest_rate: f64,
    balance_at_retirement: f64,
    monthly_payout: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoalsReport {
    required_contribution: GoalSolveResult,
    max_expenses: GoalSolveResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReport {
    inputs: PortfolioInputs,
    current_age: u32,
    monthly_expenses: f64,
    retirement_years: u32,
    fire: FireResult,
    monte_carlo: MonteCarloResult,
    historical: HistoricalBacktestResult,
    cpf: Option<CpfReport>,
    lifestyle_tier: LifestyleTier,
    comparison_portfolio: f64,
    runway: Vec<RunwayEntry>,
    goals: Option<GoalsReport>,
    share_token: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct ShareTokenResponse {
    token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SharedStateResponse {
    inputs: PortfolioInputs,
    restored: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ShareQuery {
    state: Option<String>,
}

/// Read-only data every request works against.
#[derive(Debug)]
pub struct AppContext {
    pub historical: HistoricalData,
    pub countries: CountryCatalog,
}

impl AppContext {
    pub fn embedded() -> Result<Self, FireError> {
        Ok(Self {
            historical: HistoricalData::embedded()?,
            countries: CountryCatalog::embedded()?,
        })
    }

    fn for_cli(cli: &Cli) -> Result<Self, FireError> {
        let historical = match &cli.historical_data {
            Some(path) => HistoricalData::from_path(path)?,
            None => HistoricalData::embedded()?,
        };
        let countries = match &cli.countries {
            Some(path) => CountryCatalog::from_path(path)?,
            None => CountryCatalog::embedded()?,
        };
        Ok(Self {
            historical,
            countries,
        })
    }
}

fn check_finite(value: f64, flag: &str) -> Result<(), FireError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(FireError::invalid(format!("{flag} must be a finite number")))
    }
}

const MAX_CURRENT_AGE: u32 = 120;
const MAX_PLAN_AGE: u32 = 150;
const MAX_CPF_YEARS: u32 = 100;

fn build_request(cli: Cli) -> Result<PlanRequest, FireError> {
    let PlanConfig {
        mut engine,
        cpf: cpf_rules,
    } = match &cli.config {
        Some(path) => PlanConfig::from_path(path)?,
        None => PlanConfig::default(),
    };
    if let Some(v) = cli.volatility {
        check_finite(v, "--volatility")?;
        engine.volatility = v / 100.0;
    }
    if let Some(v) = cli.drawdown_haircut {
        check_finite(v, "--drawdown-haircut")?;
        engine.drawdown_return_haircut = v / 100.0;
    }
    if let Some(v) = cli.exchange_rate {
        check_finite(v, "--exchange-rate")?;
        engine.exchange_rate = v;
    }

    for (value, flag) in [
        (cli.current_savings, "--current-savings"),
        (cli.monthly_contribution, "--monthly-contribution"),
        (cli.expected_return, "--expected-return"),
        (cli.inflation_rate, "--inflation-rate"),
        (cli.withdrawal_rate, "--withdrawal-rate"),
        (cli.monthly_expenses, "--monthly-expenses"),
        (cli.cpf_oa, "--cpf-oa"),
        (cli.cpf_sa, "--cpf-sa"),
        (cli.cpf_ma, "--cpf-ma"),
        (cli.monthly_salary, "--monthly-salary"),
    ] {
        check_finite(value, flag)?;
    }

    if cli.current_savings < 0.0 {
        return Err(FireError::invalid("--current-savings must be >= 0"));
    }
    if cli.monthly_contribution < 0.0 {
        return Err(FireError::invalid("--monthly-contribution must be >= 0"));
    }
    if cli.expected_return <= -100.0 {
        return Err(FireError::invalid("--expected-return must be > -100"));
    }
    if cli.inflation_rate <= -100.0 {
        return Err(FireError::invalid("--inflation-rate must be > -100"));
    }
    if !(0.0..=100.0).contains(&cli.withdrawal_rate) {
        return Err(FireError::invalid(
            "--withdrawal-rate must be between 0 and 100",
        ));
    }
    if cli.monthly_expenses < 0.0 {
        return Err(FireError::invalid("--monthly-expenses must be >= 0"));
    }
    if cli.current_age > MAX_CURRENT_AGE {
        return Err(FireError::invalid(format!(
            "--current-age must be <= {MAX_CURRENT_AGE}"
        )));
    }
    if cli.retirement_years == 0 {
        return Err(FireError::invalid("--retirement-years must be > 0"));
    }
    let final_age = cli
        .current_age
        .checked_add(cli.years_to_retirement)
        .and_then(|age| age.checked_add(cli.retirement_years));
    if final_age.is_none_or(|age| age > MAX_PLAN_AGE) {
        return Err(FireError::invalid(format!(
            "--current-age plus --years-to-retirement and --retirement-years must end by age {MAX_PLAN_AGE}"
        )));
    }
    if cli.simulations == 0 {
        return Err(FireError::invalid("--simulations must be > 0"));
    }
    if engine.volatility < 0.0 {
        return Err(FireError::invalid("--volatility must be >= 0"));
    }
    if engine.exchange_rate <= 0.0 {
        return Err(FireError::invalid("--exchange-rate must be > 0"));
    }
    if cli.min_rating.is_some_and(|r| r > 10) {
        return Err(FireError::invalid("--min-rating must be between 0 and 10"));
    }
    if cli.cpf_oa < 0.0 || cli.cpf_sa < 0.0 || cli.cpf_ma < 0.0 {
        return Err(FireError::invalid("--cpf-oa, --cpf-sa and --cpf-ma must be >= 0"));
    }
    if cli.monthly_salary < 0.0 {
        return Err(FireError::invalid("--monthly-salary must be >= 0"));
    }
    if cli.cpf_years > MAX_CPF_YEARS {
        return Err(FireError::invalid(format!(
            "--cpf-years must be <= {MAX_CPF_YEARS}"
        )));
    }

    let balances = CpfBalances::new(cli.cpf_oa, cli.cpf_sa, cli.cpf_ma);
    let cpf = (balances.total > 0.0 || cli.monthly_salary > 0.0).then_some(CpfRequest {
        balances,
        monthly_salary: cli.monthly_salary,
        stop_contributions_at_age: cli.cpf_stop_age,
        years_to_project: cli.cpf_years,
    });
    if cli.include_cpf && cpf.is_none() {
        return Err(FireError::invalid(
            "--include-cpf needs CPF balances or --monthly-salary",
        ));
    }

    Ok(PlanRequest {
        inputs: PortfolioInputs {
            current_savings: cli.current_savings,
            monthly_contribution: cli.monthly_contribution,
            years_to_retirement: cli.years_to_retirement,
            expected_return: cli.expected_return / 100.0,
            inflation_rate: cli.inflation_rate / 100.0,
            withdrawal_rate: cli.withdrawal_rate / 100.0,
        },
        current_age: cli.current_age,
        monthly_expenses: cli.monthly_expenses,
        retirement_years: cli.retirement_years,
        simulations: cli.simulations,
        seed: cli.seed,
        engine,
        cpf_rules,
        tier: cli.lifestyle_tier.into(),
        min_rating: cli.min_rating,
        include_cpf: cli.include_cpf,
        cpf,
        solve_goals: cli.solve_goals,
    })
}

/// Copies shared (fractional) inputs onto the percent-based CLI.
fn apply_shared_inputs(cli: &mut Cli, inputs: &PortfolioInputs) {
    cli.current_savings = inputs.current_savings;
    cli.monthly_contribution = inputs.monthly_contribution;
    cli.years_to_retirement = inputs.years_to_retirement;
    cli.expected_return = inputs.expected_return * 100.0;
    cli.inflation_rate = inputs.inflation_rate * 100.0;
    cli.withdrawal_rate = inputs.withdrawal_rate * 100.0;
}

fn build_plan_report(
    request: &PlanRequest,
    context: &AppContext,
) -> Result<PlanReport, FireError> {
    let inputs = &request.inputs;
    let fire = calculate_fire(
        inputs,
        request.current_age,
        request.monthly_expenses,
        request.retirement_years,
        &request.engine,
    );

    let mut rng = match request.seed {
        Some(seed) => SeededUniform::new(seed),
        None => SeededUniform::from_entropy(),
    };
    let monte_carlo = run_monte_carlo_simulation(
        inputs,
        request.current_age,
        request.monthly_expenses,
        request.simulations,
        request.retirement_years,
        &request.engine,
        &mut rng,
    );
    let historical = run_historical_backtest(
        inputs,
        request.current_age,
        request.retirement_years,
        &context.historical,
    );
    if historical.sequences.is_empty() {
        warn!(
            "horizon of {} years exceeds the {} years of historical data",
            inputs.years_to_retirement + request.retirement_years,
            context.historical.len()
        );
    }

    let retirement_age = request.current_age + inputs.years_to_retirement;
    let cpf = request
        .cpf
        .as_ref()
        .map(|cpf| {
            build_cpf_report(cpf, &request.cpf_rules, request.current_age, retirement_age)
        });

    let cpf_total = cpf.as_ref().map_or(0.0, |c| c.balance_at_retirement);
    let comparison_portfolio =
        resolve_portfolio_value(fire.portfolio_at_retirement, cpf_total, request.include_cpf);
    let runway = compare_runway(
        comparison_portfolio,
        inputs.withdrawal_rate,
        request.retirement_years,
        request.tier,
        context.countries.countries(),
        &request.engine,
        request.min_rating,
    );

    let goals = if request.solve_goals {
        Some(solve_goals(request, &fire)?)
    } else {
        None
    };

    Ok(PlanReport {
        inputs: *inputs,
        current_age: request.current_age,
        monthly_expenses: request.monthly_expenses,
        retirement_years: request.retirement_years,
        fire,
        monte_carlo,
        historical,
        cpf,
        lifestyle_tier: request.tier,
        comparison_portfolio,
        runway,
        goals,
        share_token: encode_state(inputs)?,
    })
}

fn build_cpf_report(
    cpf: &CpfRequest,
    rules: &CpfRules,
    current_age: u32,
    retirement_age: u32,
) -> CpfReport {
    let projections = project_cpf(
        &cpf.balances,
        cpf.monthly_salary,
        current_age,
        cpf.years_to_project,
        cpf.stop_contributions_at_age,
        rules,
    );
    // Past the end of the projection the last record stands in.
    let balance_at_retirement = projections
        .iter()
        .find(|p| p.age == retirement_age)
        .or_else(|| projections.last())
        .map_or(0.0, |p| p.total);

    CpfReport {
        effective_interest_rate: effective_interest_rate(&cpf.balances, current_age, rules),
        monthly_payout: projected_monthly_payout(&projections, rules),
        balance_at_retirement,
        projections,
    }
}

fn solve_goals(request: &PlanRequest, fire: &FireResult) -> Result<GoalsReport, FireError> {
    let base = GoalSolveConfig {
        goal_type: GoalType::RequiredContribution,
        current_age: request.current_age,
        monthly_expenses: request.monthly_expenses,
        retirement_years: request.retirement_years,
        search_min: 0.0,
        search_max: (fire.fire_number / 12.0).max(1_000.0),
        tolerance: 1.0,
        max_iterations: 60,
    };
    let growth = 1.0 + request.inputs.expected_return.max(0.0);
    let expenses_config = GoalSolveConfig {
        goal_type: GoalType::MaxExpenses,
        search_max: (fire.portfolio_at_retirement * growth / 12.0).max(1_000.0),
        ..base
    };

    Ok(GoalsReport {
        required_contribution: solve_goal(&request.inputs, base, &request.engine)?,
        max_expenses: solve_goal(&request.inputs, expenses_config, &request.engine)?,
    })
}

/// One-shot CLI run: prints the plan report as pretty JSON.
pub fn run_cli(mut cli: Cli) -> Result<String, FireError> {
    if let Some(token) = cli.share_token.clone() {
        let shared = decode_state_or_default(Some(token.as_str()));
        apply_shared_inputs(&mut cli, &shared);
    }
    let store_path = cli.store.clone();
    let context = AppContext::for_cli(&cli)?;
    let request = build_request(cli)?;
    let report = build_plan_report(&request, &context)?;

    if let Some(path) = store_path {
        let mut store = LocalStore::open(path);
        store.set("inputs", &report.inputs)?;
        store.set("lifestyleTier", &report.lifestyle_tier)?;
        store.save()?;
    }

    Ok(serde_json::to_string_pretty(&report)?)
}

pub async fn run_http_server(port: u16, context: AppContext) -> std::io::Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let app = router(Arc::new(context));

    let listener = TcpListener::bind(addr).await?;
    info!("FIRE API listening on http://{addr}");

    axum::serve(listener, app).await
}

fn router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api/plan", get(plan_get_handler).post(plan_post_handler))
        .route("/api/countries", get(countries_handler))
        .route("/api/share", get(share_get_handler).post(share_post_handler))
        .fallback(not_found_handler)
        .with_state(context)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn plan_get_handler(
    State(context): State<Arc<AppContext>>,
    Query(payload): Query<PlanPayload>,
) -> Response {
    plan_handler_impl(&context, payload)
}

async fn plan_post_handler(
    State(context): State<Arc<AppContext>>,
    Json(payload): Json<PlanPayload>,
) -> Response {
    plan_handler_impl(&context, payload)
}

fn plan_handler_impl(context: &AppContext, payload: PlanPayload) -> Response {
    let request = match plan_request_from_payload(payload) {
        Ok(request) => request,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };
    info!(
        "plan: age {}, {} years to retirement, {} simulations",
        request.current_age, request.inputs.years_to_retirement, request.simulations
    );
    match build_plan_report(&request, context) {
        Ok(report) => json_response(StatusCode::OK, report),
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

async fn countries_handler(State(context): State<Arc<AppContext>>) -> Response {
    let countries: &[Country] = context.countries.countries();
    json_response(StatusCode::OK, countries)
}

async fn share_post_handler(Json(inputs): Json<PortfolioInputs>) -> Response {
    match encode_state(&inputs) {
        Ok(token) => json_response(StatusCode::OK, ShareTokenResponse { token }),
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

async fn share_get_handler(Query(query): Query<ShareQuery>) -> Response {
    json_response(StatusCode::OK, shared_state_response(query.state.as_deref()))
}

fn shared_state_response(token: Option<&str>) -> SharedStateResponse {
    let Some(token) = token else {
        return SharedStateResponse {
            inputs: PortfolioInputs::default(),
            restored: false,
        };
    };
    match decode_state(token) {
        Ok(inputs) => SharedStateResponse {
            inputs,
            restored: true,
        },
        Err(err) => {
            warn!("share link rejected: {err}");
            SharedStateResponse {
                inputs: PortfolioInputs::default(),
                restored: false,
            }
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn plan_request_from_json(json: &str) -> Result<PlanRequest, FireError> {
    let payload = serde_json::from_str::<PlanPayload>(json)
        .map_err(|e| FireError::invalid(format!("Invalid API JSON payload: {e}")))?;
    plan_request_from_payload(payload)
}

fn plan_request_from_payload(payload: PlanPayload) -> Result<PlanRequest, FireError> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.current_savings {
        cli.current_savings = v;
    }
    if let Some(v) = payload.monthly_contribution {
        cli.monthly_contribution = v;
    }
    if let Some(v) = payload.years_to_retirement {
        cli.years_to_retirement = v;
    }
    if let Some(v) = payload.expected_return {
        cli.expected_return = v;
    }
    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = v;
    }
    if let Some(v) = payload.withdrawal_rate {
        cli.withdrawal_rate = v;
    }

    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.monthly_expenses {
        cli.monthly_expenses = v;
    }
    if let Some(v) = payload.retirement_years {
        cli.retirement_years = v;
    }
    if let Some(v) = payload.simulations {
        cli.simulations = v;
    }
    if payload.seed.is_some() {
        cli.seed = payload.seed;
    }

    if payload.volatility.is_some() {
        cli.volatility = payload.volatility;
    }
    if payload.drawdown_haircut.is_some() {
        cli.drawdown_haircut = payload.drawdown_haircut;
    }
    if payload.exchange_rate.is_some() {
        cli.exchange_rate = payload.exchange_rate;
    }

    if let Some(v) = payload.lifestyle_tier {
        cli.lifestyle_tier = v.into();
    }
    if payload.min_rating.is_some() {
        cli.min_rating = payload.min_rating;
    }
    if let Some(v) = payload.include_cpf {
        cli.include_cpf = v;
    }

    if let Some(v) = payload.cpf_oa {
        cli.cpf_oa = v;
    }
    if let Some(v) = payload.cpf_sa {
        cli.cpf_sa = v;
    }
    if let Some(v) = payload.cpf_ma {
        cli.cpf_ma = v;
    }
    if let Some(v) = payload.monthly_salary {
        cli.monthly_salary = v;
    }
    if let Some(v) = payload.cpf_stop_age {
        cli.cpf_stop_age = v;
    }
    if let Some(v) = payload.cpf_years {
        cli.cpf_years = v;
    }
    if let Some(v) = payload.solve_goals {
        cli.solve_goals = v;
    }

    if cli.simulations > 20_000 {
        return Err(FireError::invalid("simulations must be <= 20000"));
    }

    build_request(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        current_savings: 500_000.0,
        monthly_contribution: 5_000.0,
        years_to_retirement: 10,
        expected_return: 7.0,
        inflation_rate: 3.0,
        withdrawal_rate: 4.0,
        current_age: 35,
        monthly_expenses: 2_000.0,
        retirement_years: 40,
        simulations: 1_000,
        seed: None,
        volatility: None,
        drawdown_haircut: None,
        exchange_rate: None,
        lifestyle_tier: CliLifestyleTier::Moderate,
        min_rating: None,
        include_cpf: false,
        cpf_oa: 0.0,
        cpf_sa: 0.0,
        cpf_ma: 0.0,
        monthly_salary: 0.0,
        cpf_stop_age: 65,
        cpf_years: 30,
        solve_goals: false,
        historical_data: None,
        countries: None,
        config: None,
        share_token: None,
        store: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_cli() -> Cli {
        let mut cli = default_cli_for_api();
        cli.simulations = 50;
        cli.seed = Some(7);
        cli
    }

    fn context() -> AppContext {
        AppContext::embedded().expect("embedded data loads")
    }

    #[test]
    fn api_defaults_match_clap_defaults() {
        let parsed = Cli::try_parse_from(["fire-atlas"]).expect("defaults parse");
        assert_eq!(parsed, default_cli_for_api());
    }

    #[test]
    fn build_request_converts_percentages() {
        let request = build_request(sample_cli()).expect("valid request");
        assert_approx(request.inputs.expected_return, 0.07);
        assert_approx(request.inputs.inflation_rate, 0.03);
        assert_approx(request.inputs.withdrawal_rate, 0.04);
        assert_approx(request.engine.volatility, 0.15);
        assert_approx(request.engine.drawdown_return_haircut, 0.01);
        assert_eq!(request.tier, LifestyleTier::Moderate);
        assert!(request.cpf.is_none());
    }

    #[test]
    fn build_request_rejects_bad_values() {
        let mut cli = sample_cli();
        cli.withdrawal_rate = 120.0;
        let err = build_request(cli).expect_err("must reject withdrawal rate");
        assert!(err.to_string().contains("--withdrawal-rate"));

        let mut cli = sample_cli();
        cli.simulations = 0;
        let err = build_request(cli).expect_err("must reject zero simulations");
        assert!(err.to_string().contains("--simulations"));

        let mut cli = sample_cli();
        cli.current_savings = f64::NAN;
        let err = build_request(cli).expect_err("must reject NaN");
        assert!(err.to_string().contains("--current-savings"));

        let mut cli = sample_cli();
        cli.include_cpf = true;
        let err = build_request(cli).expect_err("must require CPF data");
        assert!(err.to_string().contains("--include-cpf"));

        let mut cli = sample_cli();
        cli.min_rating = Some(11);
        let err = build_request(cli).expect_err("must reject rating");
        assert!(err.to_string().contains("--min-rating"));
    }

    #[test]
    fn build_request_bounds_ages_and_horizons() {
        let mut cli = sample_cli();
        cli.current_age = u32::MAX - 5;
        let err = build_request(cli).expect_err("must reject huge age");
        assert!(matches!(err, FireError::InvalidInput(_)));
        assert!(err.to_string().contains("--current-age"));

        let mut cli = sample_cli();
        cli.current_age = 100;
        cli.years_to_retirement = 10;
        cli.retirement_years = u32::MAX - 50;
        let err = build_request(cli).expect_err("horizon must not wrap");
        assert!(matches!(err, FireError::InvalidInput(_)));
        assert!(err.to_string().contains("--retirement-years"));

        let mut cli = sample_cli();
        cli.current_age = 60;
        cli.years_to_retirement = 50;
        cli.retirement_years = 41;
        assert!(build_request(cli).is_err());

        let mut cli = sample_cli();
        cli.current_age = 60;
        cli.years_to_retirement = 50;
        cli.retirement_years = 40;
        assert!(build_request(cli).is_ok());

        let mut cli = sample_cli();
        cli.monthly_salary = 5_000.0;
        cli.cpf_years = 1_000;
        let err = build_request(cli).expect_err("must cap CPF projection");
        assert!(err.to_string().contains("--cpf-years"));
    }

    #[test]
    fn oversized_ages_from_the_web_are_rejected() {
        let err = plan_request_from_json(r#"{"currentAge": 4294967290}"#)
            .expect_err("must reject age");
        assert!(matches!(err, FireError::InvalidInput(_)));

        let payload = PlanPayload {
            years_to_retirement: Some(u32::MAX),
            ..PlanPayload::default()
        };
        assert!(plan_request_from_payload(payload).is_err());
    }

    #[test]
    fn config_file_sets_engine_and_cpf_rules() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"engine": {"volatility": 0.2, "exchangeRate": 0.8, "runwayCeiling": 50},
                "cpf": {"payoutAge": 70, "monthlyPayoutMultiplier": 0.01}}"#,
        )
        .expect("write settings");

        let mut cli = sample_cli();
        cli.config = Some(path.clone());
        cli.exchange_rate = Some(0.7);
        let request = build_request(cli).expect("valid request");
        assert_approx(request.engine.volatility, 0.2);
        assert_approx(request.engine.exchange_rate, 0.7);
        assert_approx(request.engine.runway_ceiling, 50.0);
        assert_eq!(request.cpf_rules.payout_age, 70);
        assert_approx(request.cpf_rules.monthly_payout_multiplier, 0.01);

        let mut cli = sample_cli();
        cli.config = Some(path);
        cli.volatility = Some(10.0);
        cli.monthly_salary = 6_000.0;
        cli.cpf_years = 40;
        let request = build_request(cli).expect("valid request");
        assert_approx(request.engine.volatility, 0.1);
        let report = build_plan_report(&request, &context()).expect("report");
        let cpf = report.cpf.expect("cpf report");
        let at_70 = cpf.projections.iter().find(|p| p.age == 70).expect("age 70");
        let payout = cpf.monthly_payout.expect("payout at 70");
        assert!(at_70.ra > 0.0);
        assert_approx(payout, at_70.ra * 0.01);

        let mut cli = sample_cli();
        cli.config = Some(dir.path().join("missing.json"));
        assert!(matches!(build_request(cli), Err(FireError::Io(_))));
    }

    #[test]
    fn countries_flag_replaces_catalog() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("countries.json");
        std::fs::write(
            &path,
            r#"{"countries": [{
                "id": "testland", "name": "Testland", "currency": "TST",
                "costOfLiving": {"total": {"frugal": 500, "moderate": 800, "comfortable": 1200}},
                "visa": {"name": "Long stay", "durationYears": 5},
                "lifestyle": {"overall": 7, "healthcare": 6, "safety": 8, "climate": 7, "expatCommunity": 5}
            }]}"#,
        )
        .expect("write catalog");

        let mut cli = sample_cli();
        cli.countries = Some(path);
        let json = run_cli(cli).expect("cli run");
        let report: serde_json::Value = serde_json::from_str(&json).expect("report json");
        let runway = report["runway"].as_array().expect("runway array");
        assert_eq!(runway.len(), 1);
        assert_eq!(runway[0]["countryId"], "testland");
    }

    #[test]
    fn plan_request_from_json_parses_web_keys() {
        let json = r#"{
          "currentSavings": 250000,
          "monthlyContribution": 3000,
          "yearsToRetirement": 15,
          "expectedReturn": 6.5,
          "withdrawalRate": 3.5,
          "currentAge": 40,
          "lifestyleTier": "comfortable",
          "minRating": 7,
          "cpfOa": 100000,
          "monthlySalary": 8000,
          "includeCpf": true,
          "seed": 11
        }"#;
        let request = plan_request_from_json(json).expect("json should parse");
        assert_approx(request.inputs.current_savings, 250_000.0);
        assert_approx(request.inputs.monthly_contribution, 3_000.0);
        assert_eq!(request.inputs.years_to_retirement, 15);
        assert_approx(request.inputs.expected_return, 0.065);
        assert_approx(request.inputs.inflation_rate, 0.03);
        assert_approx(request.inputs.withdrawal_rate, 0.035);
        assert_eq!(request.current_age, 40);
        assert_eq!(request.tier, LifestyleTier::Comfortable);
        assert_eq!(request.min_rating, Some(7));
        assert_eq!(request.seed, Some(11));
        assert!(request.include_cpf);
        let cpf = request.cpf.expect("cpf request");
        assert_approx(cpf.balances.total, 100_000.0);
        assert_approx(cpf.monthly_salary, 8_000.0);
    }

    #[test]
    fn plan_request_rejects_oversized_simulations() {
        let err = plan_request_from_json(r#"{"simulations": 50000}"#)
            .expect_err("must cap simulations");
        assert!(err.to_string().contains("simulations"));
    }

    #[test]
    fn plan_report_combines_all_engines() {
        let mut cli = sample_cli();
        cli.cpf_oa = 100_000.0;
        cli.cpf_sa = 80_000.0;
        cli.cpf_ma = 40_000.0;
        cli.monthly_salary = 8_000.0;
        cli.include_cpf = true;
        cli.solve_goals = true;
        let request = build_request(cli).expect("valid request");
        let report = build_plan_report(&request, &context()).expect("report");

        let years = 10 + 40;
        assert_eq!(report.fire.accumulation.len(), 11);
        assert_eq!(report.monte_carlo.ages.len(), years);
        assert_eq!(report.historical.sequences.len(), 96 - years);

        let cpf = report.cpf.as_ref().expect("cpf report");
        assert_eq!(cpf.projections.len(), 31);
        let at_45 = cpf.projections.iter().find(|p| p.age == 45).expect("age 45");
        assert_approx(cpf.balance_at_retirement, at_45.total);
        assert_approx(
            report.comparison_portfolio,
            report.fire.portfolio_at_retirement + at_45.total,
        );
        assert_eq!(report.runway.len(), 11);

        let goals = report.goals.as_ref().expect("goals");
        assert!(goals.required_contribution.feasible);
        assert!(goals.max_expenses.feasible);
        assert_eq!(
            decode_state(&report.share_token).expect("token decodes"),
            request.inputs
        );
    }

    #[test]
    fn same_seed_gives_same_monte_carlo() {
        let request = build_request(sample_cli()).expect("valid request");
        let ctx = context();
        let a = build_plan_report(&request, &ctx).expect("report");
        let b = build_plan_report(&request, &ctx).expect("report");
        assert_eq!(a.monte_carlo, b.monte_carlo);
    }

    #[test]
    fn shared_state_response_restores_or_falls_back() {
        let inputs = PortfolioInputs {
            current_savings: 42.0,
            ..PortfolioInputs::default()
        };
        let token = encode_state(&inputs).expect("encode");
        let restored = shared_state_response(Some(&token));
        assert!(restored.restored);
        assert_eq!(restored.inputs, inputs);

        let rejected = shared_state_response(Some("garbage"));
        assert!(!rejected.restored);
        assert_eq!(rejected.inputs, PortfolioInputs::default());
        assert!(!shared_state_response(None).restored);
    }

    #[test]
    fn share_token_survives_a_query_string() {
        let inputs = PortfolioInputs {
            current_savings: 123_456.0,
            years_to_retirement: 9,
            ..PortfolioInputs::default()
        };
        let token = encode_state(&inputs).expect("encode");
        let uri: axum::http::Uri = format!("/api/share?state={token}").parse().expect("uri");
        let Query(query) = Query::<ShareQuery>::try_from_uri(&uri).expect("query");
        assert_eq!(query.state.as_deref(), Some(token.as_str()));

        let restored = shared_state_response(query.state.as_deref());
        assert!(restored.restored);
        assert_eq!(restored.inputs, inputs);
    }

    #[test]
    fn run_cli_applies_share_token_and_saves_store() {
        let dir = TempDir::new().expect("tempdir");
        let store_path = dir.path().join("plan.json");
        let shared = PortfolioInputs {
            current_savings: 800_000.0,
            monthly_contribution: 1_000.0,
            years_to_retirement: 5,
            expected_return: 0.05,
            inflation_rate: 0.02,
            withdrawal_rate: 0.035,
        };

        let mut cli = sample_cli();
        cli.share_token = Some(encode_state(&shared).expect("encode"));
        cli.store = Some(store_path.clone());
        let json = run_cli(cli).expect("cli run");
        assert!(json.contains("\"portfolioAtRetirement\""));

        let store = LocalStore::open(&store_path);
        let saved: PortfolioInputs = store.load_or_default("inputs");
        assert_eq!(saved.years_to_retirement, 5);
        assert_approx(saved.current_savings, 800_000.0);
        assert_approx(saved.withdrawal_rate, 0.035);
    }

    #[tokio::test]
    async fn countries_route_lists_catalog() {
        let response = countries_handler(State(Arc::new(context()))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );
    }

    #[tokio::test]
    async fn plan_route_reports_validation_errors() {
        let payload = PlanPayload {
            withdrawal_rate: Some(150.0),
            ..PlanPayload::default()
        };
        let response = plan_get_handler(State(Arc::new(context())), Query(payload)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let payload = PlanPayload {
            simulations: Some(20),
            seed: Some(3),
            ..PlanPayload::default()
        };
        let response = plan_post_handler(State(Arc::new(context())), Json(payload)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
