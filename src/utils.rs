use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use std::str::FromStr;

/// Installs the global logger. `level` accepts the usual `log` level names;
/// anything unrecognized falls back to `info`.
pub fn setup_logger(level: &str) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .trace(Color::BrightBlack)
        .debug(Color::Cyan)
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red);

    let level = LevelFilter::from_str(level).unwrap_or(LevelFilter::Info);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Warn)
        .level_for("eth_exposure", level)
        .chain(std::io::stderr())
        .apply()?;

    Ok(())
}

/// Human readable age of `timestamp` relative to `now`.
pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - timestamp).num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = seconds / 60;
    if minutes == 1 {
        return "1 minute ago".to_string();
    }
    if minutes < 60 {
        return format!("{minutes} minutes ago");
    }

    let hours = minutes / 60;
    if hours == 1 {
        return "1 hour ago".to_string();
    }
    if hours < 24 {
        return format!("{hours} hours ago");
    }

    let days = hours / 24;
    if days == 1 {
        return "yesterday".to_string();
    }
    if days < 7 {
        return format!("{days} days ago");
    }

    timestamp.format("%Y-%m-%d").to_string()
}

/// `0x12345678...9abcdef0`: first 10 and last 8 characters.
pub fn short_address(address: &str) -> String {
    if address.len() <= 18 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}...{}", &address[..10], &address[address.len() - 8..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_relative_time_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
        let cases = [
            (Duration::seconds(5), "just now"),
            (Duration::seconds(90), "1 minute ago"),
            (Duration::minutes(42), "42 minutes ago"),
            (Duration::minutes(61), "1 hour ago"),
            (Duration::hours(5), "5 hours ago"),
            (Duration::hours(30), "yesterday"),
            (Duration::days(3), "3 days ago"),
            (Duration::days(10), "2024-05-10"),
        ];
        for (ago, expected) in cases {
            assert_eq!(format_relative_time(now - ago, now), expected);
        }
    }

    #[test]
    fn test_short_address() {
        assert_eq!(
            short_address("0x1234567890abcdef1234567890abcdef12345678"),
            "0x12345678...12345678"
        );
        assert_eq!(short_address("0x123"), "0x123");
    }
}
