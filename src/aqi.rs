use crate::error::ReadingError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Good,
    Moderate,
    SensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
    VeryHazardous,
}

#[derive(Debug, Clone, Copy)]
pub struct Breakpoint {
    pub c_low: f64,
    pub c_high: f64,
    pub i_low: f64,
    pub i_high: f64,
    pub category: Category,
}

const fn bp(c_low: f64, c_high: f64, i_low: f64, i_high: f64, category: Category) -> Breakpoint {
    Breakpoint {
        c_low,
        c_high,
        i_low,
        i_high,
        category,
    }
}

/// EPA PM2.5 breakpoints (µg/m³, 24h), ordered by concentration.
pub const PM25_BREAKPOINTS: [Breakpoint; 7] = [
    bp(0.0, 12.0, 0.0, 50.0, Category::Good),
    bp(12.1, 35.4, 51.0, 100.0, Category::Moderate),
    bp(35.5, 55.4, 101.0, 150.0, Category::SensitiveGroups),
    bp(55.5, 150.4, 151.0, 200.0, Category::Unhealthy),
    bp(150.5, 250.4, 201.0, 300.0, Category::VeryUnhealthy),
    bp(250.5, 350.4, 301.0, 400.0, Category::Hazardous),
    bp(350.5, 500.4, 401.0, 500.0, Category::VeryHazardous),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AqiResult {
    pub score: f64,
    pub category: Category,
}

/// Converts a PM2.5 concentration into an AQI score and category.
///
/// The concentration is truncated to one decimal before lookup, so values in
/// the gaps between table rows (12.05) land in the lower row. Anything above
/// the top of the table saturates at 500.
pub fn compute(concentration: f64) -> Result<AqiResult, ReadingError> {
    if !concentration.is_finite() || concentration < 0.0 {
        return Err(ReadingError::InvalidConcentration(concentration));
    }

    let top = &PM25_BREAKPOINTS[PM25_BREAKPOINTS.len() - 1];
    // epsilon keeps 55.4 from truncating to 55.3 on binary rounding
    let c = ((concentration * 10.0 + 1e-9).floor() / 10.0).min(top.c_high);

    let row = PM25_BREAKPOINTS
        .iter()
        .find(|row| c <= row.c_high)
        .unwrap_or(top);

    let score = (row.i_high - row.i_low) / (row.c_high - row.c_low) * (c - row.c_low) + row.i_low;

    Ok(AqiResult {
        score: score.round(),
        category: row.category,
    })
}

pub fn fahrenheit_to_celsius(text: &str) -> Result<f64, ReadingError> {
    let fahrenheit: f64 = text
        .trim()
        .parse()
        .map_err(|_| ReadingError::InvalidTemperature(text.to_string()))?;

    if !fahrenheit.is_finite() {
        return Err(ReadingError::InvalidTemperature(text.to_string()));
    }

    Ok((fahrenheit - 32.0) * 5.0 / 9.0)
}
