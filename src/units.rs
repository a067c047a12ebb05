// units.rs — angle / speed parsing and normalisation

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewerError};

/// An angle as written in a configuration file: a bare number is radians,
/// a string may carry a `deg`/`rad` unit (`"30deg"`, `"1.2rad"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AngleValue {
    Radians(f64),
    Text(String),
}

impl AngleValue {
    /// Resolve to radians in `[0, 2π)`, or a latitude in `[-π/2, π/2]` when `zero_center`.
    pub fn resolve(&self, zero_center: bool) -> Result<f64> {
        match self {
            AngleValue::Radians(v) => Ok(wrap_angle(*v, zero_center)),
            AngleValue::Text(s) => parse_angle(s, zero_center),
        }
    }
}

impl Default for AngleValue {
    fn default() -> Self {
        AngleValue::Radians(0.0)
    }
}

impl From<f64> for AngleValue {
    fn from(v: f64) -> Self {
        AngleValue::Radians(v)
    }
}

impl From<&str> for AngleValue {
    fn from(s: &str) -> Self {
        AngleValue::Text(s.to_string())
    }
}

/// Bring any angle into `[0, 2π)`.
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    // rem_euclid rounds tiny negative inputs up to exactly TAU
    if a >= TAU {
        0.0
    } else {
        a
    }
}

pub fn clamp_latitude(latitude: f64) -> f64 {
    latitude.clamp(-FRAC_PI_2, FRAC_PI_2)
}

fn wrap_angle(angle: f64, zero_center: bool) -> f64 {
    if zero_center {
        clamp_latitude(normalize_angle(angle + PI) - PI)
    } else {
        normalize_angle(angle)
    }
}

/// Smallest angular distance between two longitudes, in `[0, π]`.
pub fn angular_distance(a: f64, b: f64) -> f64 {
    let d = normalize_angle(a - b);
    d.min(TAU - d)
}

/// Split `"-12.5deg"` into `(-12.5, "deg")`.
fn split_number(text: &str) -> Option<(f64, &str)> {
    let bytes = text.as_bytes();
    let mut end = 0;
    if bytes.first() == Some(&b'-') {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }

    let value = text[..end].trim_end_matches('.').parse::<f64>().ok()?;
    Some((value, text[end..].trim()))
}

/// Parse a speed such as `"2rpm"`, `"10dps"` or `"1 radians per second"`.
/// Returns radians per second.
pub fn parse_speed(speed: &str) -> Result<f64> {
    let speed = speed.trim();
    let (mut value, unit) =
        split_number(speed).ok_or_else(|| ViewerError::UnknownSpeedUnit(speed.to_string()))?;

    if unit.ends_with("pm") || unit.ends_with("per minute") {
        value /= 60.0;
    }

    match unit {
        "dpm" | "degrees per minute" | "dps" | "degrees per second" => Ok(value.to_radians()),
        "radians per minute" | "radians per second" => Ok(value),
        "rpm" | "revolutions per minute" | "rps" | "revolutions per second" => Ok(value * TAU),
        other => Err(ViewerError::UnknownSpeedUnit(other.to_string())),
    }
}

/// Parse an angle such as `"45deg"`, `"0.5rad"` or `"1.2"` (radians).
pub fn parse_angle(angle: &str, zero_center: bool) -> Result<f64> {
    let text = angle.trim().to_lowercase();
    let (value, unit) =
        split_number(&text).ok_or_else(|| ViewerError::InvalidAngle(angle.to_string()))?;

    let radians = match unit {
        "" | "rad" | "rads" => value,
        "deg" | "degs" => value.to_radians(),
        other => return Err(ViewerError::UnknownAngleUnit(other.to_string())),
    };

    Ok(wrap_angle(radians, zero_center))
}
