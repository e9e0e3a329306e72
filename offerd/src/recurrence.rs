//! Recurrence descriptors and period arithmetic.
//!
//! Seconds and days step linearly; months and years step through the
//! calendar, so periods are not all the same length.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

/// Recurrence time units, as carried on the wire.
pub mod time_unit {
    pub const SECONDS: u8 = 0;
    pub const DAYS: u8 = 1;
    pub const MONTHS: u8 = 2;
    pub const YEARS: u8 = 3;
}

/// An offer's recurrence descriptor: "every `period` `time_unit`s".
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    pub time_unit: u8,
    pub period: u32,
}

/// Anchors the recurrence to an absolute base time. If `start_any_period` is
/// set, the payer may start at any period (and must then say which one).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceBase {
    pub start_any_period: bool,
    pub basetime: u64,
}

/// Restricts when an invoice for a given period may be paid, relative to the
/// period start.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RecurrencePaywindow {
    pub seconds_before: u32,
    pub proportional_amount: bool,
    pub seconds_after: u32,
}

impl Recurrence {
    pub fn valid_time_unit(&self) -> bool {
        self.time_unit <= time_unit::YEARS
    }

    /// The unix start time of period `period_idx`, counting from `basetime`.
    /// Returns `None` on arithmetic overflow or out-of-range dates.
    pub fn period_start(&self, basetime: u64, period_idx: u64) -> Option<u64> {
        let period = u64::from(self.period);
        match self.time_unit {
            time_unit::SECONDS => {
                basetime.checked_add(period_idx.checked_mul(period)?)
            }
            time_unit::DAYS => basetime.checked_add(
                period_idx.checked_mul(period)?.checked_mul(86_400)?,
            ),
            time_unit::MONTHS => add_months(basetime, period_idx, period),
            time_unit::YEARS => add_months(
                basetime,
                period_idx,
                period.checked_mul(12)?,
            ),
            _ => None,
        }
    }

    /// The inclusive `[start, end]` unix-seconds window in which the invoice
    /// for `period_idx` may be paid.
    ///
    /// With an explicit paywindow, the window straddles the period start.
    /// Otherwise it defaults to "from the previous period's start through the
    /// end of this period" (from the period start, for the first period).
    pub fn paywindow(
        &self,
        paywindow: Option<&RecurrencePaywindow>,
        basetime: u64,
        period_idx: u64,
    ) -> Option<(u64, u64)> {
        let pstart = self.period_start(basetime, period_idx)?;
        match paywindow {
            Some(pw) => {
                let start =
                    pstart.saturating_sub(u64::from(pw.seconds_before));
                let end =
                    pstart.checked_add(u64::from(pw.seconds_after))?;
                Some((start, end))
            }
            None => {
                let start = match period_idx.checked_sub(1) {
                    Some(prev_idx) => self.period_start(basetime, prev_idx)?,
                    None => pstart,
                };
                let end = self
                    .period_start(basetime, period_idx.checked_add(1)?)?
                    .checked_sub(1)?;
                Some((start, end))
            }
        }
    }
}

fn add_months(basetime: u64, period_idx: u64, months_per: u64) -> Option<u64> {
    let total_months =
        u32::try_from(period_idx.checked_mul(months_per)?).ok()?;
    let base = DateTime::<Utc>::from_timestamp(
        i64::try_from(basetime).ok()?,
        0,
    )?;
    let shifted = base.checked_add_months(Months::new(total_months))?;
    u64::try_from(shifted.timestamp()).ok()
}
