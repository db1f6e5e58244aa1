use std::io::IsTerminal;

use crossterm::style::{Color, Stylize};

use crate::args::OutputFormat;
use crate::error::{AppError, AppResult, MetricsError};
use crate::metrics::{MetricsSummary, TrafficSummary};

const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

/// Prints the final summary to stdout in the requested format.
///
/// # Errors
///
/// Returns an error if the JSON summary cannot be encoded.
pub(crate) fn print_summary(
    summary: &MetricsSummary,
    format: OutputFormat,
    no_color: bool,
) -> AppResult<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(summary)
                .map_err(|err| AppError::metrics(MetricsError::EncodeSummary { source: err }))?;
            println!("{json}");
        }
        OutputFormat::Text => {
            let use_color = !no_color && std::io::stdout().is_terminal();
            for line in summary_lines(summary) {
                if use_color && line.starts_with("Errors:") && summary.errors > 0 {
                    println!("{}", line.with(Color::Red));
                } else if use_color && line.starts_with("Disconnected:") && summary.disconnected > 0
                {
                    println!("{}", line.with(Color::Yellow));
                } else {
                    println!("{line}");
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn summary_lines(summary: &MetricsSummary) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!("Time ran: {} seconds", format_millis(summary.duration_ms)));
    if let Some(established) = summary.established_ms {
        lines.push(format!(
            "Established after: {} seconds",
            format_millis(established)
        ));
    }
    lines.push(format!(
        "Connected: {} of {}",
        summary.connected, summary.scheduled
    ));
    lines.push(format!("Disconnected: {}", summary.disconnected));
    lines.push(format!("Errors: {}", summary.errors));
    lines.push(String::new());
    lines.push(format!(
        "{:<4}{:>12}{:>12}{:>12}{:>12}{:>12}{:>12}{:>10}",
        "", "Total Data", "Avg. Msg", "Max. Msg", "Min. Msg", "p50 Msg", "p99 Msg", "# Msgs"
    ));
    lines.push(traffic_row("TX", &summary.tx));
    lines.push(traffic_row("RX", &summary.rx));

    if summary.has_failures() && !summary.error_counts.is_empty() {
        lines.push(String::new());
        lines.push("Received errors:".to_owned());
        for entry in &summary.error_counts {
            lines.push(format!("{}x {}", entry.count, entry.message));
        }
    }
    lines
}

fn traffic_row(label: &str, traffic: &TrafficSummary) -> String {
    format!(
        "{:<4}{:>12}{:>12}{:>12}{:>12}{:>12}{:>12}{:>10}",
        label,
        format_bytes(traffic.total_bytes),
        format_bytes(traffic.avg_bytes),
        format_bytes(traffic.max_bytes),
        format_bytes(traffic.min_bytes),
        format_bytes(traffic.p50_bytes),
        format_bytes(traffic.p99_bytes),
        traffic.messages
    )
}

/// `1234` -> `1.234`.
pub(crate) fn format_millis(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

/// Binary units with two decimals, plain bytes below 1 KiB.
pub(crate) fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut unit = 1024_u64;
    let mut label = "KiB";
    for (power, name) in UNITS.into_iter().enumerate().skip(1) {
        let next = 1024_u64.checked_pow(u32::try_from(power.saturating_add(1)).unwrap_or(u32::MAX));
        let Some(next) = next.filter(|next| bytes >= *next) else {
            break;
        };
        unit = next;
        label = name;
    }
    let scaled = u128::from(bytes)
        .saturating_mul(100)
        .checked_div(u128::from(unit))
        .unwrap_or(0);
    let whole = scaled.checked_div(100).unwrap_or(0);
    let frac = scaled.checked_rem(100).unwrap_or(0);
    format!("{}.{:02} {}", whole, frac, label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ErrorCount;

    fn summary() -> MetricsSummary {
        MetricsSummary {
            scheduled: 10,
            duration_ms: 12_345,
            established_ms: Some(2_001),
            connected: 9,
            disconnected: 2,
            errors: 1,
            tx: TrafficSummary {
                total_bytes: 2048,
                messages: 4,
                avg_bytes: 512,
                min_bytes: 100,
                max_bytes: 1000,
                p50_bytes: 500,
                p99_bytes: 1000,
            },
            rx: TrafficSummary::default(),
            error_counts: vec![
                ErrorCount {
                    message: "Disconnect: going away".to_owned(),
                    count: 2,
                },
                ErrorCount {
                    message: "connection refused".to_owned(),
                    count: 1,
                },
            ],
        }
    }

    #[test]
    fn bytes_use_binary_units() -> AppResult<()> {
        let cases = [
            (0, "0 B"),
            (1023, "1023 B"),
            (1024, "1.00 KiB"),
            (1536, "1.50 KiB"),
            (5 * 1024 * 1024, "5.00 MiB"),
            (3 * 1024 * 1024 * 1024, "3.00 GiB"),
        ];
        for (bytes, expected) in cases {
            if format_bytes(bytes) != expected {
                return Err(AppError::metrics(format!(
                    "{} formatted as {}, expected {}",
                    bytes,
                    format_bytes(bytes),
                    expected
                )));
            }
        }
        Ok(())
    }

    #[test]
    fn summary_lines_include_counts_and_error_tally() -> AppResult<()> {
        let lines = summary_lines(&summary());
        let expected = [
            "Time ran: 12.345 seconds",
            "Connected: 9 of 10",
            "Disconnected: 2",
            "Errors: 1",
            "Received errors:",
            "2x Disconnect: going away",
            "1x connection refused",
        ];
        for line in expected {
            if !lines.iter().any(|candidate| candidate == line) {
                return Err(AppError::metrics(format!("Missing line '{}' in {:?}", line, lines)));
            }
        }
        let tx = lines
            .iter()
            .find(|line| line.starts_with("TX"))
            .ok_or_else(|| AppError::metrics("Missing TX row"))?;
        if !tx.contains("2.00 KiB") || !tx.contains("512 B") || !tx.ends_with('4') {
            return Err(AppError::metrics(format!("Unexpected TX row '{}'", tx)));
        }
        Ok(())
    }

    #[test]
    fn clean_runs_omit_the_error_section() -> AppResult<()> {
        let mut clean = summary();
        clean.errors = 0;
        clean.disconnected = 0;
        clean.error_counts.clear();
        if summary_lines(&clean).iter().any(|line| line == "Received errors:") {
            return Err(AppError::metrics("Unexpected error section"));
        }
        Ok(())
    }
}
