use hdrhistogram::Histogram;

use crate::error::{AppError, AppResult, MetricsError};

/// Message size distribution in bytes.
#[derive(Debug, Clone)]
pub struct SizeHistogram {
    hist: Histogram<u64>,
}

impl SizeHistogram {
    /// Create an empty, auto-resizing histogram.
    ///
    /// # Errors
    ///
    /// Returns an error if the histogram cannot be created.
    pub fn new() -> AppResult<Self> {
        let hist = Histogram::<u64>::new(3).map_err(|err| {
            AppError::metrics(MetricsError::Histogram {
                context: "create size histogram",
                source: Box::new(err),
            })
        })?;
        Ok(Self { hist })
    }

    /// Values past the tracked range are clamped rather than dropped.
    pub fn record(&mut self, bytes: u64) {
        self.hist.saturating_record(bytes);
    }

    /// `(p50, p99)`, both zero when nothing was recorded.
    #[must_use]
    pub fn percentiles(&self) -> (u64, u64) {
        if self.count() == 0 {
            return (0, 0);
        }
        (
            self.hist.value_at_quantile(0.5),
            self.hist.value_at_quantile(0.99),
        )
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.hist.len()
    }
}
