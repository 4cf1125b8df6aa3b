//! Metrics query commands

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{format_cores, format_epoch, format_gib, print_table, OutputFormat};

/// Row for the hourly usage table
#[derive(Tabled, serde::Serialize)]
struct UsageRow {
    #[tabled(rename = "Hour (UTC)")]
    hour: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
}

/// Parse a lookback such as `90m`, `24h` or `7d` into seconds
pub fn parse_since(since: &str) -> Result<i64> {
    let since = since.trim();
    let Some(unit) = since.chars().last() else {
        bail!("Empty time period");
    };
    let amount: i64 = since[..since.len() - unit.len_utf8()]
        .parse()
        .with_context(|| format!("Invalid time period: {}", since))?;
    if amount <= 0 {
        bail!("Time period must be positive: {}", since);
    }

    let unit_secs = match unit {
        'm' => 60,
        'h' => 3600,
        'd' => 86_400,
        _ => bail!("Unknown time unit '{}' (use m, h or d)", unit),
    };
    amount
        .checked_mul(unit_secs)
        .with_context(|| format!("Time period too large: {}", since))
}

/// Resolve the query window: explicit bounds win over `since`
pub fn resolve_window(
    start: Option<i64>,
    end: Option<i64>,
    since: &str,
    now: i64,
) -> Result<(i64, i64)> {
    let end = end.unwrap_or(now);
    let start = match start {
        Some(start) => start,
        None => end
            .checked_sub(parse_since(since)?)
            .with_context(|| format!("Window before {} is out of range", end))?,
    };
    if start > end {
        bail!("Start {} is after end {}", start, end);
    }
    Ok((start, end))
}

/// Show hourly usage for one resource
pub async fn show_metrics(
    client: &ApiClient,
    resource: &str,
    start: Option<i64>,
    end: Option<i64>,
    since: &str,
    format: OutputFormat,
) -> Result<()> {
    let (start, end) = resolve_window(start, end, since, chrono::Utc::now().timestamp())?;
    let response = client.metrics(resource, start, end).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&response)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!("{} {}", "Resource:".bold(), resource.cyan());
            println!(
                "{} {} to {}",
                "Window:  ".bold(),
                format_epoch(start),
                format_epoch(end)
            );
            println!();

            let rows: Vec<UsageRow> = response
                .metrics
                .iter()
                .map(|point| UsageRow {
                    hour: format_epoch(point.timestamp),
                    cpu: format_cores(point.cpu_value),
                    memory: format_gib(point.memory_value),
                })
                .collect();
            print_table(&rows, format);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_since_units() {
        assert_eq!(parse_since("90m").unwrap(), 5400);
        assert_eq!(parse_since("24h").unwrap(), 86_400);
        assert_eq!(parse_since("7d").unwrap(), 604_800);
    }

    #[test]
    fn test_parse_since_rejects_garbage() {
        assert!(parse_since("").is_err());
        assert!(parse_since("h").is_err());
        assert!(parse_since("0h").is_err());
        assert!(parse_since("10w").is_err());
        assert!(parse_since("abc").is_err());
    }

    #[test]
    fn test_parse_since_rejects_overflow() {
        assert!(parse_since("999999999999999999d").is_err());
        assert!(parse_since("99999999999999999999h").is_err());
    }

    #[test]
    fn test_window_rejects_underflow() {
        assert!(resolve_window(None, Some(i64::MIN + 10), "1h", 10_000).is_err());
    }

    #[test]
    fn test_window_defaults_to_since_before_now() {
        assert_eq!(resolve_window(None, None, "2h", 10_000).unwrap(), (2_800, 10_000));
    }

    #[test]
    fn test_window_explicit_bounds_win() {
        assert_eq!(
            resolve_window(Some(100), Some(200), "not-used", 10_000).unwrap(),
            (100, 200)
        );
        assert_eq!(resolve_window(None, Some(7200), "1h", 10_000).unwrap(), (3600, 7200));
    }

    #[test]
    fn test_window_rejects_inverted_bounds() {
        assert!(resolve_window(Some(300), Some(200), "1h", 10_000).is_err());
    }
}
