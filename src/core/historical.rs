//! Historical sequence backtesting.
//!
//! Each start year replays the user's full horizon against the actual annual
//! market returns and inflation that followed it. The dataset ships as
//! `data/historical_returns.csv` and can be swapped for another file with the
//! same columns.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::debug;
use serde::Deserialize;

use super::types::{HistoricalBacktestResult, HistoricalSequence, PortfolioInputs};
use crate::error::FireError;

const EMBEDDED_CSV: &str = include_str!("../../data/historical_returns.csv");

#[derive(Debug, Deserialize)]
struct HistoricalRow {
    year: u32,
    nominal_return: f64,
    inflation: f64,
}

/// Calendar-aligned annual observations: index `i` is year `first_year + i`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalData {
    first_year: u32,
    returns: Vec<f64>,
    inflation: Vec<f64>,
}

impl HistoricalData {
    pub fn new(first_year: u32, returns: Vec<f64>, inflation: Vec<f64>) -> Result<Self, FireError> {
        if returns.len() != inflation.len() {
            return Err(FireError::HistoricalData(format!(
                "{} returns but {} inflation observations",
                returns.len(),
                inflation.len()
            )));
        }
        Ok(Self {
            first_year,
            returns,
            inflation,
        })
    }

    pub fn embedded() -> Result<Self, FireError> {
        Self::from_reader(EMBEDDED_CSV.as_bytes())
    }

    pub fn from_path(path: &Path) -> Result<Self, FireError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, FireError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows = Vec::new();
        for record in csv_reader.deserialize::<HistoricalRow>() {
            rows.push(record?);
        }

        let first_year = rows
            .first()
            .map(|row| row.year)
            .ok_or_else(|| FireError::HistoricalData("no observations".to_string()))?;
        for (idx, row) in rows.iter().enumerate() {
            let expected = first_year + idx as u32;
            if row.year != expected {
                return Err(FireError::HistoricalData(format!(
                    "expected year {expected}, found {}",
                    row.year
                )));
            }
        }

        Self::new(
            first_year,
            rows.iter().map(|row| row.nominal_return).collect(),
            rows.iter().map(|row| row.inflation).collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    pub fn first_year(&self) -> u32 {
        self.first_year
    }

    pub fn returns(&self) -> &[f64] {
        &self.returns
    }

    pub fn inflation(&self) -> &[f64] {
        &self.inflation
    }

    fn year_at(&self, idx: usize) -> u32 {
        self.first_year + idx as u32
    }
}

/// Number of start years whose window fits in the data. Zero, not an error,
/// when the horizon is longer than the history.
pub fn sequence_count(data_len: usize, total_years: usize) -> usize {
    data_len.saturating_sub(total_years)
}

pub fn run_historical_backtest(
    inputs: &PortfolioInputs,
    current_age: u32,
    retirement_years: u32,
    data: &HistoricalData,
) -> HistoricalBacktestResult {
    let total_years = (inputs.years_to_retirement + retirement_years) as usize;
    let count = sequence_count(data.len(), total_years);

    let sequences = (0..count)
        .map(|start| replay_sequence(inputs, retirement_years, data, start))
        .collect::<Vec<_>>();
    let result = summarize(sequences);

    debug!(
        "historical backtest from age {current_age}: {count} windows of {total_years} years, {} failed",
        result.failed_count
    );
    result
}

fn replay_sequence(
    inputs: &PortfolioInputs,
    retirement_years: u32,
    data: &HistoricalData,
    start: usize,
) -> HistoricalSequence {
    let accumulation_years = inputs.years_to_retirement as usize;
    let total_years = accumulation_years + retirement_years as usize;
    let annual_contribution = inputs.annual_contribution();

    let mut portfolio = inputs.current_savings;
    let mut lowest_value = portfolio;
    let mut lowest_year = data.year_at(start);
    let mut real_returns = Vec::with_capacity(total_years);

    for offset in 0..accumulation_years {
        let idx = start + offset;
        let nominal = data.returns[idx];
        real_returns.push(real_return(nominal, data.inflation[idx]));
        portfolio = portfolio * (1.0 + nominal) + annual_contribution;
        if portfolio < lowest_value {
            lowest_value = portfolio;
            lowest_year = data.year_at(idx);
        }
    }

    let mut withdrawal = portfolio * inputs.withdrawal_rate;
    let mut years_depleted = None;

    for offset in 0..retirement_years as usize {
        let idx = start + accumulation_years + offset;
        let nominal = data.returns[idx];
        let inflation = data.inflation[idx];
        real_returns.push(real_return(nominal, inflation));

        if years_depleted.is_some() {
            continue;
        }

        portfolio = portfolio * (1.0 + nominal) - withdrawal;
        if portfolio <= 0.0 {
            portfolio = 0.0;
            years_depleted = Some(offset as u32 + 1);
        }
        if portfolio < lowest_value {
            lowest_value = portfolio;
            lowest_year = data.year_at(idx);
        }
        withdrawal *= 1.0 + inflation;
    }

    HistoricalSequence {
        start_year: data.year_at(start),
        end_year: data.year_at(start + total_years.max(1) - 1),
        final_value: portfolio,
        lowest_value,
        lowest_year,
        survived: years_depleted.is_none(),
        years_depleted,
        real_returns,
    }
}

fn real_return(nominal: f64, inflation: f64) -> f64 {
    (1.0 + nominal) / (1.0 + inflation) - 1.0
}

fn summarize(sequences: Vec<HistoricalSequence>) -> HistoricalBacktestResult {
    let failed_count = sequences.iter().filter(|s| !s.survived).count();
    let success_rate = if sequences.is_empty() {
        0.0
    } else {
        (sequences.len() - failed_count) as f64 / sequences.len() as f64
    };

    let worst = sequences
        .iter()
        .min_by(|a, b| a.final_value.total_cmp(&b.final_value))
        .cloned();
    let best = sequences
        .iter()
        .max_by(|a, b| a.final_value.total_cmp(&b.final_value))
        .cloned();

    let mut finals = sequences.iter().map(|s| s.final_value).collect::<Vec<_>>();
    finals.sort_by(|a, b| a.total_cmp(b));
    let average_final_value = if finals.is_empty() {
        0.0
    } else {
        finals.iter().sum::<f64>() / finals.len() as f64
    };

    HistoricalBacktestResult {
        success_rate,
        failed_count,
        worst,
        best,
        median_final_value: median(&finals),
        average_final_value,
        sequences,
    }
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) * 0.5,
    }
}
