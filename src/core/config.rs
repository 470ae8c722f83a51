//! Tunable constants shared by the engines.
//!
//! Defaults reproduce the figures the planner has always used; callers that
//! model a different currency or CPF schedule pass their own values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FireError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Half-width of the uniform noise band around the expected return.
    pub volatility: f64,
    /// Subtracted from the expected return once drawdown starts.
    pub drawdown_return_haircut: f64,
    /// Portfolio currency to comparison currency (SGD -> USD).
    pub exchange_rate: f64,
    /// Runway values above this are reported as unlimited.
    pub runway_ceiling: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            volatility: 0.15,
            drawdown_return_haircut: 0.01,
            exchange_rate: 0.74,
            runway_ceiling: 100.0,
        }
    }
}

impl EngineConfig {
    pub fn drawdown_return(&self, expected_return: f64) -> f64 {
        expected_return - self.drawdown_return_haircut
    }
}

/// Contribution schedule for one age bracket. `upper_age` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpfBracket {
    pub upper_age: u32,
    pub total_rate: f64,
    pub oa_share: f64,
    pub sa_share: f64,
    pub ma_share: f64,
}

impl CpfBracket {
    pub fn share_sum(&self) -> f64 {
        self.oa_share + self.sa_share + self.ma_share
    }
}

/// Balance allowance for a bonus tier: the first `limit` dollars earn `rate`,
/// with at most `oa_cap` of the allowance taken by the OA.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusTier {
    pub rate: f64,
    pub limit: f64,
    pub oa_cap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CpfRules {
    pub oa_rate: f64,
    pub sa_rate: f64,
    pub ma_rate: f64,
    pub ra_rate: f64,
    pub extra_interest: BonusTier,
    pub senior_extra_interest: BonusTier,
    pub senior_bonus_age: u32,
    pub monthly_wage_ceiling: f64,
    pub brackets: Vec<CpfBracket>,
    pub transfer_age: u32,
    pub payout_age: u32,
    pub monthly_payout_multiplier: f64,
}

impl Default for CpfRules {
    fn default() -> Self {
        Self {
            oa_rate: 0.025,
            sa_rate: 0.04,
            ma_rate: 0.04,
            ra_rate: 0.04,
            extra_interest: BonusTier {
                rate: 0.01,
                limit: 60_000.0,
                oa_cap: 20_000.0,
            },
            senior_extra_interest: BonusTier {
                rate: 0.01,
                limit: 30_000.0,
                oa_cap: 20_000.0,
            },
            senior_bonus_age: 55,
            monthly_wage_ceiling: 6_800.0,
            brackets: vec![
                CpfBracket {
                    upper_age: 55,
                    total_rate: 0.37,
                    oa_share: 23.0 / 37.0,
                    sa_share: 6.0 / 37.0,
                    ma_share: 8.0 / 37.0,
                },
                CpfBracket {
                    upper_age: 60,
                    total_rate: 0.31,
                    oa_share: 12.0 / 31.0,
                    sa_share: 11.5 / 31.0,
                    ma_share: 7.5 / 31.0,
                },
                CpfBracket {
                    upper_age: 65,
                    total_rate: 0.22,
                    oa_share: 3.5 / 22.0,
                    sa_share: 9.0 / 22.0,
                    ma_share: 9.5 / 22.0,
                },
                CpfBracket {
                    upper_age: 70,
                    total_rate: 0.165,
                    oa_share: 1.0 / 16.5,
                    sa_share: 5.0 / 16.5,
                    ma_share: 10.5 / 16.5,
                },
            ],
            transfer_age: 55,
            payout_age: 65,
            monthly_payout_multiplier: 0.0078,
        }
    }
}

impl CpfRules {
    /// Ages past the last bracket keep the last bracket's schedule.
    pub fn bracket_for_age(&self, age: u32) -> Option<&CpfBracket> {
        self.brackets
            .iter()
            .find(|b| age <= b.upper_age)
            .or_else(|| self.brackets.last())
    }
}

/// Settings file for the CLI. Missing sections and keys keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlanConfig {
    pub engine: EngineConfig,
    pub cpf: CpfRules,
}

impl PlanConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FireError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, FireError> {
        let config: PlanConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), FireError> {
        let engine = &self.engine;
        let engine_values = [
            engine.volatility,
            engine.drawdown_return_haircut,
            engine.exchange_rate,
            engine.runway_ceiling,
        ];
        if engine_values.iter().any(|v| !v.is_finite()) {
            return Err(FireError::invalid("engine settings must be finite"));
        }
        if engine.volatility < 0.0 {
            return Err(FireError::invalid("engine volatility must be >= 0"));
        }
        if engine.exchange_rate <= 0.0 || engine.runway_ceiling <= 0.0 {
            return Err(FireError::invalid(
                "engine exchangeRate and runwayCeiling must be > 0",
            ));
        }

        let cpf = &self.cpf;
        if cpf.brackets.is_empty() {
            return Err(FireError::invalid("CPF rules need at least one bracket"));
        }
        if cpf
            .brackets
            .windows(2)
            .any(|pair| pair[0].upper_age >= pair[1].upper_age)
        {
            return Err(FireError::invalid(
                "CPF brackets must be ordered by increasing upperAge",
            ));
        }
        for bracket in &cpf.brackets {
            if !(0.0..=1.0).contains(&bracket.total_rate)
                || (bracket.share_sum() - 1.0).abs() > 1e-6
            {
                return Err(FireError::invalid(format!(
                    "CPF bracket up to age {} needs a rate in [0, 1] and shares summing to 1",
                    bracket.upper_age
                )));
            }
        }
        let rates = [
            cpf.oa_rate,
            cpf.sa_rate,
            cpf.ma_rate,
            cpf.ra_rate,
            cpf.extra_interest.rate,
            cpf.senior_extra_interest.rate,
            cpf.monthly_wage_ceiling,
            cpf.monthly_payout_multiplier,
        ];
        if rates.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(FireError::invalid(
                "CPF rates, wage ceiling and payout multiplier must be >= 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bracket_shares_sum_to_one() {
        let rules = CpfRules::default();
        assert_eq!(rules.brackets.len(), 4);
        for bracket in &rules.brackets {
            assert!(
                (bracket.share_sum() - 1.0).abs() <= 1e-6,
                "bracket up to {} sums to {}",
                bracket.upper_age,
                bracket.share_sum()
            );
        }
    }

    #[test]
    fn bracket_lookup_is_inclusive_and_saturates() {
        let rules = CpfRules::default();
        assert_eq!(rules.bracket_for_age(30).map(|b| b.upper_age), Some(55));
        assert_eq!(rules.bracket_for_age(55).map(|b| b.upper_age), Some(55));
        assert_eq!(rules.bracket_for_age(56).map(|b| b.upper_age), Some(60));
        assert_eq!(rules.bracket_for_age(65).map(|b| b.upper_age), Some(65));
        assert_eq!(rules.bracket_for_age(66).map(|b| b.upper_age), Some(70));
        assert_eq!(rules.bracket_for_age(82).map(|b| b.upper_age), Some(70));
    }

    #[test]
    fn drawdown_return_applies_haircut() {
        let config = EngineConfig::default();
        assert!((config.drawdown_return(0.07) - 0.06).abs() <= 1e-12);
    }

    #[test]
    fn plan_config_fills_missing_keys_with_defaults() {
        let config = PlanConfig::from_json(
            r#"{"engine": {"runwayCeiling": 60}, "cpf": {"oaRate": 0.03, "payoutAge": 67}}"#,
        )
        .expect("partial config");
        assert_eq!(config.engine.runway_ceiling, 60.0);
        assert_eq!(config.engine.volatility, 0.15);
        assert_eq!(config.cpf.oa_rate, 0.03);
        assert_eq!(config.cpf.payout_age, 67);
        assert_eq!(config.cpf.brackets, CpfRules::default().brackets);

        assert_eq!(PlanConfig::from_json("{}").expect("empty"), PlanConfig::default());
    }

    #[test]
    fn plan_config_rejects_unusable_rules() {
        for raw in [
            r#"{"cpf": {"brackets": []}}"#,
            r#"{"cpf": {"brackets": [{"upperAge": 55, "totalRate": 0.37, "oaShare": 0.5, "saShare": 0.1, "maShare": 0.1}]}}"#,
            r#"{"cpf": {"oaRate": -0.01}}"#,
            r#"{"engine": {"exchangeRate": 0}}"#,
            r#"{"engine": {"volatility": -0.1}}"#,
        ] {
            assert!(
                matches!(PlanConfig::from_json(raw), Err(FireError::InvalidInput(_))),
                "accepted {raw}"
            );
        }
        assert!(matches!(PlanConfig::from_json("[1]"), Err(FireError::Json(_))));
    }
}
