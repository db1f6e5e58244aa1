use std::path::Path;

use super::counters::EventCounters;
use super::format::{escape_label, write_line};
use crate::error::{AppError, AppResult, SinkError};

const PREFIX: &str = "sockme";

impl EventCounters {
    /// Renders the counters in the Prometheus text exposition format.
    /// Dotted suffixes become a `reason` label on the base counter.
    ///
    /// # Errors
    ///
    /// Returns an error if formatting fails.
    pub fn render_prometheus(&self) -> AppResult<String> {
        let mut output = String::new();
        let mut family: Option<&str> = None;

        for (name, value) in self.counters() {
            let (base, reason) = match name.split_once('.') {
                Some((base, reason)) => (base, Some(reason)),
                None => (name, None),
            };
            if family != Some(base) {
                write_line(
                    &mut output,
                    &format!(
                        "# HELP {}_{}_total Count of {} events.",
                        PREFIX,
                        base,
                        base.replace('_', " ")
                    ),
                )?;
                write_line(
                    &mut output,
                    &format!("# TYPE {}_{}_total counter", PREFIX, base),
                )?;
                family = Some(base);
            }
            let line = match reason {
                Some(reason) => format!(
                    "{}_{}_total{{reason=\"{}\"}} {}",
                    PREFIX,
                    base,
                    escape_label(reason),
                    value
                ),
                None => format!("{}_{}_total {}", PREFIX, base, value),
            };
            write_line(&mut output, &line)?;
        }

        for (name, measure) in self.measures() {
            write_line(
                &mut output,
                &format!(
                    "# HELP {}_{}_bytes Message {} in bytes.",
                    PREFIX,
                    name,
                    name.replace('_', " ")
                ),
            )?;
            write_line(
                &mut output,
                &format!("# TYPE {}_{}_bytes gauge", PREFIX, name),
            )?;
            for (stat, value) in [
                ("count", measure.count),
                ("sum", measure.sum),
                ("min", measure.min),
                ("max", measure.max),
            ] {
                write_line(
                    &mut output,
                    &format!("{}_{}_bytes{{stat=\"{}\"}} {}", PREFIX, name, stat, value),
                )?;
            }
        }
        Ok(output)
    }

    /// Writes [`EventCounters::render_prometheus`] output to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering or writing the file fails.
    pub async fn write_prometheus(&self, path: &Path) -> AppResult<()> {
        let output = self.render_prometheus()?;
        tokio::fs::write(path, output).await.map_err(|err| {
            AppError::sink(SinkError::WritePrometheus {
                path: path.to_path_buf(),
                source: err,
            })
        })
    }
}
