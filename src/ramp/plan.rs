use std::time::Duration;

use crate::args::PositiveU64;

/// Batch layout for admitting one URL's connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampPlan {
    amount: u64,
    batch_size: u64,
    batches: u64,
    delay: Duration,
}

impl RampPlan {
    /// Splits `amount` admissions into batches of at most `concurrent`, spread
    /// evenly over `interval_secs`. Without a cap, or with a cap at or above
    /// `amount`, everything goes in one undelayed batch.
    #[must_use]
    pub fn new(amount: u64, concurrent: Option<PositiveU64>, interval_secs: u64) -> Self {
        let batch_size = concurrent
            .map(PositiveU64::get)
            .filter(|cap| *cap < amount)
            .unwrap_or(amount);
        let batches = if batch_size == 0 || batch_size >= amount {
            1
        } else {
            amount.div_ceil(batch_size)
        };
        let delay_ms = if batches > 1 {
            interval_secs
                .saturating_mul(1000)
                .checked_div(batches.saturating_sub(1))
                .unwrap_or(0)
        } else {
            0
        };
        Self {
            amount,
            batch_size,
            batches,
            delay: Duration::from_millis(delay_ms),
        }
    }

    #[must_use]
    pub const fn amount(&self) -> u64 {
        self.amount
    }

    #[must_use]
    pub const fn batch_size(&self) -> u64 {
        self.batch_size
    }

    #[must_use]
    pub const fn batches(&self) -> u64 {
        self.batches
    }

    /// Pause between the end of one batch and the start of the next.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Ordinals admitted in batch `index`, highest first. Ids count down from
    /// `amount` to 1 across the whole ramp.
    #[must_use]
    pub fn batch_ordinals(&self, index: u64) -> std::iter::Rev<std::ops::RangeInclusive<u64>> {
        let admitted_before = index.saturating_mul(self.batch_size);
        let first = self.amount.saturating_sub(admitted_before);
        let last = first
            .saturating_sub(self.batch_size)
            .saturating_add(1)
            .max(1);
        if first == 0 {
            // Empty range.
            return (1..=0).rev();
        }
        (last..=first).rev()
    }
}
