use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use gitsweep::rate_limit::{RateLimitConfig, RateLimitState, RateLimitTracker};
use gitsweep::{ClientResolver, Scope};

use crate::config::Config;

/// Output format for rate limit display.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// Query the GraphQL quota for one scope and print it.
pub(crate) async fn handle_limits(
    scope: &str,
    output: OutputFormat,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let scope = Scope::new(scope);
    let resolver = config.resolver();
    let client = resolver.client_for(&scope).await?;

    let rate_config = config.rate_limit_config();
    let tracker = RateLimitTracker::new(rate_config.clone());
    let timeout = Duration::from_secs(config.sync.request_timeout_secs);
    let state = tracker
        .refresh(&scope, client.as_ref(), timeout)
        .await?
        .ok_or("GitHub returned no rateLimit data")?;

    let display = RateLimitDisplay::from_state(&scope, &state, &rate_config, Utc::now());
    display.print(output)?;
    Ok(())
}

/// Rate limit information for display.
#[derive(Debug, Clone, serde::Serialize, tabled::Tabled)]
pub(crate) struct RateLimitDisplay {
    #[tabled(rename = "Scope")]
    pub scope: String,
    #[tabled(rename = "Limit")]
    pub limit: String,
    #[tabled(rename = "Used")]
    pub used: String,
    #[tabled(rename = "Remaining")]
    pub remaining: String,
    #[tabled(rename = "Usage %")]
    pub usage_percent: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Resets At")]
    pub reset_at: String,
    #[tabled(rename = "Resets In")]
    pub reset_in: String,
}

impl RateLimitDisplay {
    pub(crate) fn from_state(
        scope: &Scope,
        state: &RateLimitState,
        config: &RateLimitConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let usage_percent = if state.limit > 0 {
            (f64::from(state.used) / f64::from(state.limit)) * 100.0
        } else {
            0.0
        };

        let status = if state.remaining < config.critical_threshold {
            "critical"
        } else if state.remaining < config.low_threshold {
            "low"
        } else {
            "ok"
        };

        let (reset_at, reset_in) = match state.reset_at {
            Some(reset) => {
                let until = reset.signed_duration_since(now);
                let reset_in = if until.num_seconds() > 0 {
                    format_duration(until)
                } else {
                    "now".to_string()
                };
                (reset.format("%Y-%m-%d %H:%M:%S UTC").to_string(), reset_in)
            }
            None => ("unknown".to_string(), "unknown".to_string()),
        };

        Self {
            scope: scope.to_string(),
            limit: state.limit.to_string(),
            used: state.used.to_string(),
            remaining: state.remaining.to_string(),
            usage_percent: format!("{:.1}%", usage_percent),
            status: status.to_string(),
            reset_at,
            reset_in,
        }
    }

    pub(crate) fn print(self, format: OutputFormat) -> Result<(), serde_json::Error> {
        match format {
            OutputFormat::Table => {
                let mut table = tabled::Table::new(vec![self]);
                table.with(tabled::settings::Style::rounded());
                println!("{}", table);
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&self)?);
            }
        }
        Ok(())
    }
}

/// Format a duration in a human-readable way.
fn format_duration(duration: chrono::Duration) -> String {
    let total_secs = duration.num_seconds();
    if total_secs < 60 {
        format!("{}s", total_secs)
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample_state(remaining: u32, reset_at: Option<DateTime<Utc>>) -> RateLimitState {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        RateLimitState {
            remaining,
            limit: 5000,
            used: 5000 - remaining,
            last_cost: 1,
            reset_at,
            last_updated: now,
        }
    }

    #[test]
    fn output_format_default_is_table() {
        assert!(matches!(OutputFormat::default(), OutputFormat::Table));
    }

    #[test]
    fn format_duration_handles_seconds_minutes_and_hours() {
        assert_eq!(format_duration(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_duration(chrono::Duration::seconds(120)), "2m");
        assert_eq!(format_duration(chrono::Duration::seconds(125)), "2m 5s");
        assert_eq!(format_duration(chrono::Duration::seconds(3600)), "1h");
        assert_eq!(format_duration(chrono::Duration::seconds(3900)), "1h 5m");
    }

    #[test]
    fn display_formats_percent_and_reset() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let reset = now + chrono::Duration::minutes(30);
        let state = sample_state(3750, Some(reset));
        let config = RateLimitConfig::default();
        let display = RateLimitDisplay::from_state(&Scope::new("acme"), &state, &config, now);

        assert_eq!(display.scope, "acme");
        assert_eq!(display.limit, "5000");
        assert_eq!(display.used, "1250");
        assert_eq!(display.remaining, "3750");
        assert_eq!(display.usage_percent, "25.0%");
        assert_eq!(display.status, "ok");
        assert_eq!(display.reset_at, "2026-03-01 12:30:00 UTC");
        assert_eq!(display.reset_in, "30m");
    }

    #[test]
    fn display_status_follows_thresholds() {
        let now = Utc::now();
        let config = RateLimitConfig::default();
        let scope = Scope::new("acme");

        let low = RateLimitDisplay::from_state(&scope, &sample_state(400, None), &config, now);
        assert_eq!(low.status, "low");
        assert_eq!(low.reset_at, "unknown");

        let critical = RateLimitDisplay::from_state(&scope, &sample_state(50, None), &config, now);
        assert_eq!(critical.status, "critical");
    }

    #[test]
    fn display_print_supports_json_and_table() {
        let now = Utc::now();
        let display = RateLimitDisplay::from_state(
            &Scope::new("acme"),
            &sample_state(4000, Some(now)),
            &RateLimitConfig::default(),
            now,
        );

        // Smoke tests: this should not panic in either output mode.
        display.clone().print(OutputFormat::Json).unwrap();
        display.print(OutputFormat::Table).unwrap();
    }
}
