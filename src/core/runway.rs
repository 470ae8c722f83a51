use serde::Serialize;

use crate::catalog::Country;

use super::config::EngineConfig;
use super::types::LifestyleTier;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunwayEntry {
    pub country_id: String,
    pub name: String,
    /// Annual cost in the comparison currency at the requested tier.
    pub annual_cost: f64,
    /// Years of cost covered by one year of withdrawals, capped at the
    /// configured ceiling.
    pub runway_years: f64,
    pub unlimited: bool,
    /// Runway covers the whole retirement horizon.
    pub affordable: bool,
    pub monthly_budget: f64,
}

/// Portfolio value used for the comparison; the CPF balance only counts when
/// the caller opts in.
pub fn resolve_portfolio_value(portfolio: f64, cpf_total: f64, include_cpf: bool) -> f64 {
    if include_cpf {
        portfolio + cpf_total
    } else {
        portfolio
    }
}

/// Annual withdrawal converted into the comparison currency.
pub fn annual_withdrawal_converted(
    portfolio_value: f64,
    withdrawal_rate: f64,
    config: &EngineConfig,
) -> f64 {
    portfolio_value * withdrawal_rate * config.exchange_rate
}

pub fn runway_years(annual_withdrawal: f64, annual_cost: f64, ceiling: f64) -> (f64, bool) {
    if annual_cost <= 0.0 {
        return (ceiling, true);
    }
    let raw = annual_withdrawal / annual_cost;
    if raw >= ceiling {
        (ceiling, true)
    } else {
        (raw.max(0.0), false)
    }
}

/// Ranks countries by runway, longest first, ties broken by name. Countries
/// rated below `min_rating` overall are left out. A country is affordable
/// when its runway reaches `retirement_years` or is unlimited.
pub fn compare_runway(
    portfolio_value: f64,
    withdrawal_rate: f64,
    retirement_years: u32,
    tier: LifestyleTier,
    countries: &[Country],
    config: &EngineConfig,
    min_rating: Option<u8>,
) -> Vec<RunwayEntry> {
    let annual_withdrawal = annual_withdrawal_converted(portfolio_value, withdrawal_rate, config);

    let mut entries: Vec<RunwayEntry> = countries
        .iter()
        .filter(|c| min_rating.is_none_or(|min| c.lifestyle.overall >= min))
        .map(|country| {
            let annual_cost = country.annual_cost(tier);
            let (runway_years, unlimited) =
                runway_years(annual_withdrawal, annual_cost, config.runway_ceiling);
            RunwayEntry {
                country_id: country.id.clone(),
                name: country.name.clone(),
                annual_cost,
                runway_years,
                unlimited,
                affordable: unlimited || runway_years >= f64::from(retirement_years),
                monthly_budget: annual_withdrawal / 12.0,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.runway_years
            .total_cmp(&a.runway_years)
            .then_with(|| a.name.cmp(&b.name))
    });
    entries
}
