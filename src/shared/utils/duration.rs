use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// Parse a lock duration.
///
/// Accepts the short form `<number><ms|s|m|h|d>` (e.g. `30s`, `10m`) and the
/// ISO-8601 time form `PT[nH][nM][n[.n]S]` (e.g. `PT30S`, `PT1H30M`).
pub fn parse_duration(duration_str: &str) -> Result<Duration, String> {
    let value = duration_str.trim();

    if let Some(duration) = parse_short(value)? {
        return Ok(duration);
    }
    if let Some(duration) = parse_iso(value)? {
        return Ok(duration);
    }

    Err(format!(
        "Invalid duration format: {}. Expected <number><ms|s|m|h|d> or PT..S",
        duration_str
    ))
}

fn parse_short(value: &str) -> Result<Option<Duration>, String> {
    static SHORT_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = SHORT_REGEX
        .get_or_init(|| Regex::new(r"^(\d+)(ms|s|m|h|d)$").expect("Invalid duration regex"));

    let Some(caps) = re.captures(value) else {
        return Ok(None);
    };

    let number: u64 = caps[1]
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", &caps[1]))?;

    let duration = match &caps[2] {
        "ms" => Duration::from_millis(number),
        "s" => Duration::from_secs(number),
        "m" => Duration::from_secs(scale(number, 60, value)?),
        "h" => Duration::from_secs(scale(number, 60 * 60, value)?),
        "d" => Duration::from_secs(scale(number, 60 * 60 * 24, value)?),
        unit => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(Some(duration))
}

fn parse_iso(value: &str) -> Result<Option<Duration>, String> {
    static ISO_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = ISO_REGEX.get_or_init(|| {
        Regex::new(r"^(?i)PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)(?:\.(\d{1,3}))?S)?$")
            .expect("Invalid ISO duration regex")
    });

    let Some(caps) = re.captures(value) else {
        return Ok(None);
    };
    if caps.get(1).is_none() && caps.get(2).is_none() && caps.get(3).is_none() {
        return Err(format!("Empty ISO-8601 duration: {}", value));
    }

    let field = |index: usize| -> Result<u64, String> {
        caps.get(index)
            .map(|m| {
                m.as_str()
                    .parse::<u64>()
                    .map_err(|_| format!("Invalid number in duration: {}", m.as_str()))
            })
            .unwrap_or(Ok(0))
    };

    let hours = field(1)?;
    let minutes = field(2)?;
    let seconds = field(3)?;
    let millis = match caps.get(4) {
        // ".5" means 500ms
        Some(fraction) => format!("{:0<3}", fraction.as_str())
            .parse::<u64>()
            .map_err(|_| format!("Invalid fraction in duration: {}", fraction.as_str()))?,
        None => 0,
    };

    let secs = scale(hours, 3600, value)?
        .checked_add(scale(minutes, 60, value)?)
        .and_then(|secs| secs.checked_add(seconds))
        .ok_or_else(|| out_of_range(value))?;

    Duration::from_secs(secs)
        .checked_add(Duration::from_millis(millis))
        .map(Some)
        .ok_or_else(|| out_of_range(value))
}

fn scale(number: u64, factor: u64, value: &str) -> Result<u64, String> {
    number.checked_mul(factor).ok_or_else(|| out_of_range(value))
}

fn out_of_range(value: &str) -> String {
    format!("Duration out of range: {}", value)
}
