use chrono::{DateTime, Utc};

/// Fixed-width UTC format, matching SQLite's `strftime('%Y-%m-%dT%H:%M:%fZ')`.
/// Text in this format sorts in time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_is_fixed_width() {
        let whole = parse_timestamp("2024-03-01T10:00:00Z").unwrap();
        let fractional = parse_timestamp("2024-03-01T10:00:00.5Z").unwrap();

        assert_eq!(format_timestamp(whole), "2024-03-01T10:00:00.000Z");
        assert_eq!(format_timestamp(fractional), "2024-03-01T10:00:00.500Z");
    }

    #[test]
    fn test_text_order_matches_time_order() {
        let earlier = parse_timestamp("2024-03-01T09:59:59.999Z").unwrap();
        let later = parse_timestamp("2024-03-01T10:00:00.000Z").unwrap();
        assert!(format_timestamp(earlier) < format_timestamp(later));
    }

    #[test]
    fn test_parse_round_trips_formatted_value() {
        let value = "2024-03-01T10:00:00.123Z";
        assert_eq!(format_timestamp(parse_timestamp(value).unwrap()), value);
    }
}
