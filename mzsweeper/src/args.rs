use std::fmt::Display;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use mzsweep::fragments::{default_ion_specs, FragmentError};
use mzsweep::{IonLabelConvention, IonSpec};

pub fn non_negative_float_f32(s: &str) -> Result<f32, String> {
    let value = s.parse::<f32>().map_err(|e| e.to_string())?;
    if value < 0.0 {
        Err(format!("`{s}` is less than zero"))
    } else {
        Ok(value)
    }
}

pub fn positive_float_f64(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    if value <= 0.0 || !value.is_finite() {
        Err(format!("`{s}` is not a positive number"))
    } else {
        Ok(value)
    }
}

/// Parse ion specifications such as `b2` or `y3`, or fall back to
/// `a1..a4, b1..b4, c1..c4, x1..x4, y1..y4, z1..z4` when none are given
pub fn parse_ion_specs<S: AsRef<str>>(ions: &[S]) -> Result<Vec<IonSpec>, FragmentError> {
    if ions.is_empty() {
        return Ok(default_ion_specs());
    }
    ions.iter().map(|s| s.as_ref().parse()).collect()
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ArgLabelConvention {
    #[default]
    /// Number C-terminal ions by their cleavage site from the N-terminus
    CleavageSite,
    /// Number every ion by the residues it contains
    ResidueCount,
}

impl From<ArgLabelConvention> for IonLabelConvention {
    fn from(value: ArgLabelConvention) -> Self {
        match value {
            ArgLabelConvention::CleavageSite => IonLabelConvention::CleavageSite,
            ArgLabelConvention::ResidueCount => IonLabelConvention::ResidueCount,
        }
    }
}

impl Display for ArgLabelConvention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
