//! URL-safe sharing of a plan's inputs.
//!
//! A token is unpadded URL-safe base64 (`-` and `_`, no `=`) over the
//! camelCase JSON of [`PortfolioInputs`], so it can sit in a query string
//! as-is. Padded tokens are accepted on decode.
//! Decoding checks that every field is present before deserializing so a
//! truncated link is rejected instead of half-filled.

use base64::{
    Engine as _, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, general_purpose},
};
use log::warn;
use serde_json::Value;

use crate::core::PortfolioInputs;
use crate::error::FireError;

const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    general_purpose::NO_PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const REQUIRED_FIELDS: [&str; 6] = [
    "currentSavings",
    "monthlyContribution",
    "yearsToRetirement",
    "expectedReturn",
    "inflationRate",
    "withdrawalRate",
];

pub fn encode_state(inputs: &PortfolioInputs) -> Result<String, FireError> {
    let json = serde_json::to_vec(inputs)?;
    Ok(TOKEN_ENGINE.encode(json))
}

pub fn decode_state(token: &str) -> Result<PortfolioInputs, FireError> {
    let bytes = TOKEN_ENGINE.decode(token.trim())?;
    let value: Value = serde_json::from_slice(&bytes)?;
    let Some(object) = value.as_object() else {
        return Err(FireError::invalid("shared state is not a JSON object"));
    };
    if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !object.contains_key(**f)) {
        return Err(FireError::MissingField(*missing));
    }
    Ok(serde_json::from_value(value)?)
}

/// Falls back to the default plan when the token can't be used.
pub fn decode_state_or_default(token: Option<&str>) -> PortfolioInputs {
    let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
        return PortfolioInputs::default();
    };
    decode_state(token).unwrap_or_else(|err| {
        warn!("ignoring shared state: {err}");
        PortfolioInputs::default()
    })
}
