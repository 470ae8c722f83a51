//! Static cost-of-living catalog consumed by the runway comparator.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::LifestyleTier;
use crate::error::FireError;

const EMBEDDED_COUNTRIES: &str = include_str!("../data/countries.json");

/// Monthly cost in USD for each lifestyle tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierCosts {
    pub frugal: f64,
    pub moderate: f64,
    pub comfortable: f64,
}

impl TierCosts {
    pub fn for_tier(&self, tier: LifestyleTier) -> f64 {
        match tier {
            LifestyleTier::Frugal => self.frugal,
            LifestyleTier::Moderate => self.moderate,
            LifestyleTier::Comfortable => self.comfortable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostOfLiving {
    pub total: TierCosts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisaInfo {
    pub name: String,
    pub min_age: Option<u32>,
    pub annual_income_requirement_usd: Option<f64>,
    pub duration_years: u32,
}

/// Ratings out of 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifestyleRatings {
    pub overall: u8,
    pub healthcare: u8,
    pub safety: u8,
    pub climate: u8,
    pub expat_community: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Country {
    pub id: String,
    pub name: String,
    pub currency: String,
    pub cost_of_living: CostOfLiving,
    pub visa: VisaInfo,
    pub lifestyle: LifestyleRatings,
}

impl Country {
    pub fn monthly_cost(&self, tier: LifestyleTier) -> f64 {
        self.cost_of_living.total.for_tier(tier)
    }

    pub fn annual_cost(&self, tier: LifestyleTier) -> f64 {
        self.monthly_cost(tier) * 12.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryCatalog {
    countries: Vec<Country>,
}

impl CountryCatalog {
    pub fn embedded() -> Result<Self, FireError> {
        Self::from_json(EMBEDDED_COUNTRIES)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FireError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, FireError> {
        let catalog: CountryCatalog = serde_json::from_str(raw)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), FireError> {
        if self.countries.is_empty() {
            return Err(FireError::invalid("country catalog is empty"));
        }
        let mut seen = HashSet::new();
        for country in &self.countries {
            if !seen.insert(country.id.as_str()) {
                return Err(FireError::invalid(format!(
                    "duplicate country id `{}`",
                    country.id
                )));
            }
            let costs = country.cost_of_living.total;
            let all = [costs.frugal, costs.moderate, costs.comfortable];
            if all.iter().any(|c| !c.is_finite() || *c < 0.0) {
                return Err(FireError::invalid(format!(
                    "country `{}` has a negative or non-finite cost",
                    country.id
                )));
            }
        }
        Ok(())
    }

    pub fn countries(&self) -> &[Country] {
        &self.countries
    }

    pub fn get(&self, id: &str) -> Option<&Country> {
        self.countries.iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_catalog_loads() {
        let catalog = CountryCatalog::embedded().expect("embedded catalog should parse");
        assert_eq!(catalog.len(), 11);
        let thailand = catalog.get("thailand").expect("thailand present");
        assert_eq!(thailand.name, "Thailand");
        assert_eq!(thailand.monthly_cost(LifestyleTier::Frugal), 1_100.0);
        assert_eq!(thailand.annual_cost(LifestyleTier::Moderate), 21_600.0);
        assert_eq!(thailand.visa.min_age, Some(50));
    }

    #[test]
    fn embedded_tiers_are_ordered() {
        let catalog = CountryCatalog::embedded().expect("embedded catalog should parse");
        for country in catalog.countries() {
            let t = country.cost_of_living.total;
            assert!(t.frugal <= t.moderate && t.moderate <= t.comfortable, "{}", country.id);
        }
    }

    #[test]
    fn rejects_duplicate_ids_and_negative_costs() {
        let one = r#"{"id":"x","name":"X","currency":"XXX",
            "costOfLiving":{"total":{"frugal":1,"moderate":2,"comfortable":3}},
            "visa":{"name":"v","minAge":null,"annualIncomeRequirementUsd":null,"durationYears":1},
            "lifestyle":{"overall":5,"healthcare":5,"safety":5,"climate":5,"expatCommunity":5}}"#;
        let dup = format!(r#"{{"countries":[{one},{one}]}}"#);
        let err = CountryCatalog::from_json(&dup).expect_err("duplicates rejected");
        assert!(err.to_string().contains("duplicate country id"));

        let negative = format!(r#"{{"countries":[{}]}}"#, one.replace("\"frugal\":1", "\"frugal\":-1"));
        let err = CountryCatalog::from_json(&negative).expect_err("negative rejected");
        assert!(err.to_string().contains("negative"));

        let err = CountryCatalog::from_json(r#"{"countries":[]}"#).expect_err("empty rejected");
        assert!(err.to_string().contains("empty"));
    }
}
