use chrono::{Days, NaiveDate};

use crate::error::DateError;

pub const DEFAULT_INPUT_FORMAT: &str = "%d/%m/%Y";

/// Strict single-format parse. Callers treat a failure as "date unknown".
pub fn parse(date_text: &str, input_format: &str) -> Result<NaiveDate, DateError> {
    NaiveDate::parse_from_str(date_text.trim(), input_format).map_err(|_| DateError::InvalidDate {
        input: date_text.to_string(),
        format: input_format.to_string(),
    })
}

/// Accepts whole numbers, including spreadsheet floats such as `3.0`.
pub fn parse_nights(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(value) = text.parse::<i64>() {
        return Some(value);
    }
    let value = text.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 {
        Some(value as i64)
    } else {
        None
    }
}

/// Check-in is check-out minus the stay length; stays shorter than one night yield nothing.
pub fn derive_checkin(checkout: Option<NaiveDate>, nights: Option<i64>) -> Option<NaiveDate> {
    let checkout = checkout?;
    let nights = u64::try_from(nights?).ok().filter(|n| *n > 0)?;
    checkout.checked_sub_days(Days::new(nights))
}
