use chrono::{DateTime, Utc};

pub(super) fn parse_threshold(raw: &str) -> std::result::Result<f64, String> {
    let value = raw
        .parse::<f64>()
        .map_err(|_| format!("invalid float value '{raw}'"))?;
    if !value.is_finite() || value <= 0.0 || value > 1.0 {
        return Err(format!("value must be within (0.0, 1.0], got {value}"));
    }
    Ok(value)
}

pub(super) fn parse_rfc3339_utc(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| format!("invalid RFC 3339 timestamp '{raw}': {err}"))
}
