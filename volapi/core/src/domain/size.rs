// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Volume size strings.
//!
//! Sizes are always stored in MiB. Clients may send either a bare JSON
//! number (already MiB) or a string with an explicit unit suffix.

use serde::Deserialize;
use thiserror::Error;

/// Platform default when a create request carries no size.
pub const DEFAULT_VOLUME_SIZE_MB: u64 = 10240;

const UNIT_MULTIPLIERS: &[(&str, u64)] = &[("GB", 1024), ("g", 1024), ("MB", 1), ("m", 1)];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizeParseError {
    #[error("size {0:?} has no unit, expected one of: g, GB, m, MB")]
    MissingUnit(String),
    #[error("size {0:?} has an unknown unit, expected one of: g, GB, m, MB")]
    UnknownUnit(String),
    #[error("size {0:?} has a non-numeric magnitude")]
    InvalidMagnitude(String),
    #[error("size must be greater than zero")]
    Zero,
    #[error("size {0:?} is too large")]
    Overflow(String),
}

/// A size as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    Mebibytes(u64),
    Text(String),
}

impl SizeSpec {
    pub fn to_mebibytes(&self) -> Result<u64, SizeParseError> {
        match self {
            Self::Mebibytes(0) => Err(SizeParseError::Zero),
            Self::Mebibytes(mb) => Ok(*mb),
            Self::Text(text) => parse_size(text),
        }
    }
}

/// Parses `"10g"`, `"10GB"`, `"500m"` or `"500MB"` into MiB.
pub fn parse_size(input: &str) -> Result<u64, SizeParseError> {
    let trimmed = input.trim();
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (magnitude, unit) = trimmed.split_at(digits_end);

    if magnitude.is_empty() {
        return Err(SizeParseError::InvalidMagnitude(input.to_string()));
    }
    if unit.is_empty() {
        return Err(SizeParseError::MissingUnit(input.to_string()));
    }

    let multiplier = UNIT_MULTIPLIERS
        .iter()
        .find(|(suffix, _)| *suffix == unit)
        .map(|(_, multiplier)| *multiplier)
        .ok_or_else(|| SizeParseError::UnknownUnit(input.to_string()))?;

    let magnitude: u64 = magnitude
        .parse()
        .map_err(|_| SizeParseError::Overflow(input.to_string()))?;
    if magnitude == 0 {
        return Err(SizeParseError::Zero);
    }

    magnitude
        .checked_mul(multiplier)
        .ok_or_else(|| SizeParseError::Overflow(input.to_string()))
}
