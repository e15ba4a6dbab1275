//! Prediction time axis: hour alignment, sampling epochs and timestamp strings.

use crate::error::{ConfigurationError, PreconditionError};
use crate::Epoch;
use chrono::{DateTime, Utc};

pub const SECONDS_PER_HOUR: i64 = 3600;
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Default spacing between two predictions.
pub const DEFAULT_TIME_INCREMENT_SECONDS: i64 = 900;

/// UTC layout of every timestamp handed to product encoders.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d.%H%M%SZ";

pub fn is_hour_aligned(epoch: Epoch) -> bool {
    epoch.rem_euclid(SECONDS_PER_HOUR) == 0
}

/// Most recent hour boundary at or before `epoch`.
pub fn hour_floor(epoch: Epoch) -> Epoch {
    epoch - epoch.rem_euclid(SECONDS_PER_HOUR)
}

/// Round `epoch` down to the previous multiple of `increment` seconds.
pub fn round_down_to_increment(epoch: Epoch, increment: i64) -> Epoch {
    if increment <= 0 {
        return epoch;
    }
    epoch - epoch.rem_euclid(increment)
}

/// Format an epoch as `YYYYMMDD.HHMMSSZ` in UTC.
pub fn format_timestamp(epoch: Epoch) -> Result<String, PreconditionError> {
    let dt: DateTime<Utc> =
        DateTime::from_timestamp(epoch, 0).ok_or(PreconditionError::EpochOutOfRange(epoch))?;
    Ok(dt.format(TIMESTAMP_FORMAT).to_string())
}

/// The validated set of epochs a run predicts for.
///
/// Both ends are hour-aligned and inclusive. The increment divides an hour, so
/// every hour boundary in the range is also a sampling epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeline {
    start: Epoch,
    end: Epoch,
    increment: i64,
}

impl Timeline {
    pub fn new(start: Epoch, end: Epoch, increment: i64) -> Result<Self, ConfigurationError> {
        if start <= 0 {
            return Err(ConfigurationError::InvalidRun(format!(
                "start epoch {} must be positive",
                start
            )));
        }
        if end <= start {
            return Err(ConfigurationError::InvalidRun(format!(
                "end epoch {} must be after start epoch {}",
                end, start
            )));
        }
        if !is_hour_aligned(start) || !is_hour_aligned(end) {
            return Err(ConfigurationError::InvalidRun(format!(
                "start {} and end {} must both be multiples of {} seconds",
                start, end, SECONDS_PER_HOUR
            )));
        }
        if increment <= 0 || increment > SECONDS_PER_HOUR || SECONDS_PER_HOUR % increment != 0 {
            return Err(ConfigurationError::InvalidRun(format!(
                "time increment {} must be a positive divisor of {} seconds",
                increment, SECONDS_PER_HOUR
            )));
        }
        Ok(Self {
            start,
            end,
            increment,
        })
    }

    pub fn start(&self) -> Epoch {
        self.start
    }

    pub fn end(&self) -> Epoch {
        self.end
    }

    pub fn increment(&self) -> i64 {
        self.increment
    }

    /// Sampling epochs in ascending order.
    pub fn epochs(&self) -> impl Iterator<Item = Epoch> {
        let increment = self.increment;
        (self.start..=self.end).step_by(increment as usize)
    }

    pub fn len(&self) -> usize {
        ((self.end - self.start) / self.increment) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Hour boundaries needing an ephemeris snapshot.
    ///
    /// Sub-hourly sampling gets one extra hour past `end` so that windows
    /// reaching beyond the last sample still have astronomy available.
    pub fn astro_hours(&self) -> impl Iterator<Item = Epoch> {
        let last = if self.increment == SECONDS_PER_HOUR {
            self.end
        } else {
            self.end + SECONDS_PER_HOUR
        };
        (self.start..=last).step_by(SECONDS_PER_HOUR as usize)
    }
}
