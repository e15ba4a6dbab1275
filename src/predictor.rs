//! # Harmonic Predictor
//!
//! Superposes constituent contributions into water levels and current vectors.
//!
//! ## Per-Sample Computation
//! For every constituent contributing to a field at a point:
//!
//! ```text
//! f × A × cos(V + Δt × ω − g)
//! ```
//!
//! where `f`, `V` and `ω` come from the worker's [`AstroClock`] as of the most
//! recent hour boundary and `Δt` is the offset from that boundary.
//!
//! ## Post-Processing
//! - **Datum correction**: `0.979 × Σ Z amplitudes`, added to every `Z` value.
//!   Ad-hoc; stands in for an official chart datum conversion.
//! - **Trend**: least-squares slope over a centred window of five samples.
//! - **UV rotation**: optional counter-clockwise rotation of current vectors.

use crate::astro::clock::AstroClock;
use crate::astro::constituent::ConstituentState;
use crate::astro::ephemeris::EphemerisCache;
use crate::error::PreconditionError;
use crate::points::PointRecord;
use crate::timeline::{format_timestamp, Timeline, SECONDS_PER_HOUR};
use crate::{Epoch, Field, FieldValues, PointSeries, Trend};

/// Multiplier of the summed `Z` amplitudes in the ad-hoc chart datum correction.
pub const ADHOC_CHART_DATUM_CORR_FACTOR: f64 = 0.979;

/// Default slope magnitude, in units per hour, below which a level is steady.
pub const DEFAULT_TREND_THRESHOLD: f64 = 0.2;

/// Trends are only meaningful for samples this close together.
pub const TREND_MAX_INCREMENT_SECONDS: i64 = 900;

/// Contribution of one constituent at `offset_seconds` after the last update.
pub fn amplitude_at(
    state: &ConstituentState,
    amplitude: f64,
    phase_lag: f64,
    offset_seconds: f64,
) -> f64 {
    state.nodal_factor
        * amplitude
        * (state.argument + offset_seconds * state.frequency - phase_lag).cos()
}

/// Ad-hoc chart datum correction of one grid point.
pub fn datum_correction(point: &PointRecord, factor: f64) -> f64 {
    factor * point.z_amplitude_sum()
}

/// Rotate a current vector counter-clockwise by `angle_radians`.
pub fn rotate_uv(u: f64, v: f64, angle_radians: f64) -> (f64, f64) {
    let (s, c) = angle_radians.sin_cos();
    (c * u - s * v, s * u + c * v)
}

/// Trend of the centre sample of a five-sample window.
///
/// `increment_seconds` is the spacing between consecutive samples.
pub fn classify_window(window: &[f64; 5], increment_seconds: i64, threshold: f64) -> Trend {
    let step_hours = increment_seconds as f64 / SECONDS_PER_HOUR as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for (k, z) in (-2i32..=2).zip(window.iter()) {
        let offset = f64::from(k) * step_hours;
        num += offset * z;
        den += offset * offset;
    }
    let slope = num / den;

    if slope.abs() <= threshold {
        Trend::Steady
    } else if slope > 0.0 {
        Trend::Increasing
    } else {
        Trend::Decreasing
    }
}

/// Trend of every sample in a series.
///
/// The first two and last two samples lack a full window and are `Unknown`.
pub fn classify_trends(levels: &[f64], increment_seconds: i64, threshold: f64) -> Vec<Trend> {
    let mut trends = vec![Trend::Unknown; levels.len()];
    for (i, window) in levels.windows(5).enumerate() {
        let window = [window[0], window[1], window[2], window[3], window[4]];
        trends[i + 2] = classify_window(&window, increment_seconds, threshold);
    }
    trends
}

/// What to compute for every point of a tile.
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesOptions {
    pub fields: Vec<Field>,
    /// Counter-clockwise rotation applied to (U, V).
    pub rotate_uv_radians: Option<f64>,
    /// Trend threshold, present when the sampling allows classification.
    pub trend_threshold: Option<f64>,
    /// Factor of the ad-hoc datum correction, present when it applies.
    pub datum_correction_factor: Option<f64>,
}

impl SeriesOptions {
    pub fn water_levels(increment_seconds: i64) -> Self {
        Self {
            fields: vec![Field::Z],
            rotate_uv_radians: None,
            trend_threshold: (increment_seconds == TREND_MAX_INCREMENT_SECONDS)
                .then_some(DEFAULT_TREND_THRESHOLD),
            datum_correction_factor: Some(ADHOC_CHART_DATUM_CORR_FACTOR),
        }
    }

    pub fn currents() -> Self {
        Self {
            fields: vec![Field::U, Field::V],
            rotate_uv_radians: None,
            trend_threshold: None,
            datum_correction_factor: None,
        }
    }
}

/// Per-worker predictor: owns the worker's [`AstroClock`].
pub struct HarmonicPredictor<'t> {
    clock: AstroClock<'t>,
    cache: &'t EphemerisCache,
}

impl<'t> HarmonicPredictor<'t> {
    pub fn new(clock: AstroClock<'t>, cache: &'t EphemerisCache) -> Self {
        Self { clock, cache }
    }

    /// Sum of every constituent contribution to `field` at `point`.
    ///
    /// Uses the clock state as last updated; `offset_seconds` is measured from
    /// that update.
    pub fn sum_field(
        clock: &AstroClock<'_>,
        point: &PointRecord,
        field: Field,
        offset_seconds: f64,
    ) -> Result<f64, PreconditionError> {
        let mut total = 0.0;
        for sample in point.samples(field) {
            let state = clock.state(&sample.constituent)?;
            total += amplitude_at(state, sample.amplitude, sample.phase, offset_seconds);
        }
        Ok(total)
    }

    /// Predict one field at one point and epoch.
    pub fn predict_at(
        &mut self,
        point: &PointRecord,
        field: Field,
        epoch: Epoch,
        latitude_deg: f64,
    ) -> Result<f64, PreconditionError> {
        let offset = self
            .clock
            .advance_to(epoch, latitude_deg.to_radians(), self.cache)?;
        Self::sum_field(&self.clock, point, field, offset)
    }

    /// Predict every configured field of one point over a timeline.
    ///
    /// Epochs are visited in ascending order so the clock only moves forward.
    pub fn predict_series(
        &mut self,
        point: &PointRecord,
        timeline: &Timeline,
        latitude_deg: f64,
        options: &SeriesOptions,
    ) -> Result<PointSeries, PreconditionError> {
        let latitude_radians = latitude_deg.to_radians();
        let correction = options
            .datum_correction_factor
            .map(|factor| datum_correction(point, factor));

        let mut stamps = Vec::with_capacity(timeline.len());
        let mut rows = Vec::with_capacity(timeline.len());

        for epoch in timeline.epochs() {
            let offset = self.clock.advance_to(epoch, latitude_radians, self.cache)?;
            let mut values = FieldValues::default();
            for &field in &options.fields {
                let value = Self::sum_field(&self.clock, point, field, offset)?;
                values.set(field, value);
            }
            if let (Some(z), Some(corr)) = (values.z, correction) {
                values.z = Some(z + corr);
            }
            let uv = (options.rotate_uv_radians, values.u, values.v);
            if let (Some(angle), Some(u), Some(v)) = uv {
                let (u, v) = rotate_uv(u, v, angle);
                values.u = Some(u);
                values.v = Some(v);
            }
            stamps.push(format_timestamp(epoch)?);
            rows.push(values);
        }

        if let Some(threshold) = options.trend_threshold {
            let levels: Vec<f64> = rows.iter().filter_map(|v| v.z).collect();
            if levels.len() == rows.len() {
                let trends = classify_trends(&levels, timeline.increment(), threshold);
                for (row, trend) in rows.iter_mut().zip(trends) {
                    row.trend = Some(trend);
                }
            }
        }

        Ok(stamps.into_iter().zip(rows).collect())
    }

    pub fn clock(&self) -> &AstroClock<'t> {
        &self.clock
    }
}
