const SECS_PER_DAY: f64 = 86_400.0;
const SECS_PER_HOUR: f64 = 3_600.0;
const SECS_PER_MINUTE: f64 = 60.0;

/// Renders a duration in seconds as `"N days, N hours, N minutes"`.
///
/// Day and hour clauses are only emitted when non-zero; the minute clause is
/// always present. Negative and non-finite inputs render as zero.
pub fn humanize_uptime(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };

    let days = (seconds / SECS_PER_DAY).floor() as u64;
    let hours = ((seconds % SECS_PER_DAY) / SECS_PER_HOUR).floor() as u64;
    let minutes = ((seconds % SECS_PER_HOUR) / SECS_PER_MINUTE).floor() as u64;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{days} {}, ", unit("day", days)));
    }
    if hours > 0 {
        out.push_str(&format!("{hours} {}, ", unit("hour", hours)));
    }
    out.push_str(&format!("{minutes} {}", unit("minute", minutes)));
    out
}

fn unit(name: &str, count: u64) -> String {
    if count == 1 {
        name.to_string()
    } else {
        format!("{name}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_only() {
        assert_eq!(humanize_uptime(125.0), "2 minutes");
        assert_eq!(humanize_uptime(60.0), "1 minute");
        assert_eq!(humanize_uptime(59.0), "0 minutes");
        assert_eq!(humanize_uptime(0.0), "0 minutes");
    }

    #[test]
    fn hours_and_days_are_optional_clauses() {
        assert_eq!(humanize_uptime(3660.0), "1 hour, 1 minute");
        assert_eq!(humanize_uptime(7200.0), "2 hours, 0 minutes");
        assert_eq!(humanize_uptime(90000.0), "1 day, 1 hour, 0 minutes");
        assert_eq!(humanize_uptime(86400.0 * 3.0 + 125.0), "3 days, 2 minutes");
        assert_eq!(
            humanize_uptime(86400.0 * 2.0 + 3600.0 * 5.0 + 60.0 * 30.0 + 59.9),
            "2 days, 5 hours, 30 minutes"
        );
    }

    #[test]
    fn fractional_seconds_are_floored() {
        assert_eq!(humanize_uptime(119.999), "1 minute");
    }

    #[test]
    fn invalid_input_renders_as_zero() {
        assert_eq!(humanize_uptime(-5.0), "0 minutes");
        assert_eq!(humanize_uptime(f64::NAN), "0 minutes");
        assert_eq!(humanize_uptime(f64::INFINITY), "0 minutes");
    }
}
