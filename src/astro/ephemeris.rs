//! Sun & moon mean-longitude ephemerides for the Foreman harmonic method.
//!
//! Longitudes are low-order polynomials in the number of days elapsed since
//! 1899-12-31T12:00Z. Each longitude is kept as its fractional cycle only; each
//! rate is expressed in cycles per (365-day) year.
//!
//! Snapshots can only be taken at whole hours: the Foreman method updates its
//! astronomic arguments at hh:00:00 and extrapolates linearly in between.

use crate::error::PreconditionError;
use crate::timeline::{is_hour_aligned, Timeline, SECONDS_PER_DAY, SECONDS_PER_HOUR};
use crate::Epoch;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Polynomial coefficients and scale factors of the ephemeris model.
///
/// Coefficients are in degrees, with the linear term per day and the
/// quadratic/cubic terms applied to `D2 = d1_factor × D1`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EphemerisParams {
    /// Seconds from 1899-12-31T12:00Z to 1970-01-01T00:00Z.
    pub gregorian_day0_seconds: i64,
    pub d1_factor: f64,
    pub deg2_derivative_factor: f64,
    pub deg3_derivative_factor: f64,
    pub days_per_year: f64,
    /// Hours in the year used to turn Doodson rate sums into frequencies.
    pub hours_per_year: f64,
    /// Mean longitude of the sun (h).
    pub sun_h: [f64; 3],
    /// Mean longitude of the solar perigee (p').
    pub sun_pp: [f64; 4],
    /// Mean longitude of the moon (s).
    pub moon_s: [f64; 4],
    /// Mean longitude of the lunar perigee (p).
    pub moon_p: [f64; 4],
    /// Negated mean longitude of the ascending node (N').
    pub asc_node_np: [f64; 4],
}

impl Default for EphemerisParams {
    fn default() -> Self {
        Self {
            gregorian_day0_seconds: 2_209_032_000,
            d1_factor: 1.0e-4,
            deg2_derivative_factor: 2.0e-8,
            deg3_derivative_factor: 3.0e-12,
            days_per_year: 365.0,
            hours_per_year: 8760.0,
            sun_h: [279.696678, 0.9856473354, 0.00002267],
            sun_pp: [281.220844, 0.0000470684, 0.0000339, 0.00000007],
            moon_s: [270.434164, 13.1763965268, -0.000085, 0.000000039],
            moon_p: [334.329556, 0.1114040803, -0.0007739, -0.00000026],
            asc_node_np: [-259.183275, 0.0529539222, -0.0001557, -0.00000005],
        }
    }
}

/// Astronomical state at one whole hour. Immutable once computed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EphemerisSnapshot {
    pub epoch: Epoch,
    /// Lunar time, in cycles.
    pub tau: f64,
    pub d_tau: f64,
    pub moon_s: f64,
    pub moon_ds: f64,
    pub sun_h: f64,
    pub sun_dh: f64,
    pub moon_p: f64,
    pub moon_dp: f64,
    pub asc_node_np: f64,
    pub asc_node_dnp: f64,
    pub sun_pp: f64,
    pub sun_dpp: f64,
}

impl EphemerisSnapshot {
    /// Longitudes in Doodson-number order: (τ, s, h, p, N', p').
    pub fn longitudes(&self) -> [f64; 6] {
        [
            self.tau,
            self.moon_s,
            self.sun_h,
            self.moon_p,
            self.asc_node_np,
            self.sun_pp,
        ]
    }

    /// First derivatives in Doodson-number order.
    pub fn rates(&self) -> [f64; 6] {
        [
            self.d_tau,
            self.moon_ds,
            self.sun_dh,
            self.moon_dp,
            self.asc_node_dnp,
            self.sun_dpp,
        ]
    }
}

fn frac(v: f64) -> f64 {
    v - v.floor()
}

/// Polynomial longitude folded to its fractional cycle.
fn longitude_cycles(coeffs: &[f64], d1: f64, d2: f64) -> f64 {
    let mut degrees = coeffs[0] + coeffs[1] * d1;
    if let Some(c2) = coeffs.get(2) {
        degrees += c2 * d2 * d2;
    }
    if let Some(c3) = coeffs.get(3) {
        degrees += c3 * d2 * d2 * d2;
    }
    frac(degrees / 360.0)
}

/// First derivative of a longitude polynomial in cycles per year.
fn rate_cycles_per_year(coeffs: &[f64], d1: f64, params: &EphemerisParams) -> f64 {
    let mut degrees_per_day = coeffs[1];
    if let Some(c2) = coeffs.get(2) {
        degrees_per_day += params.deg2_derivative_factor * c2 * d1;
    }
    if let Some(c3) = coeffs.get(3) {
        degrees_per_day += params.deg3_derivative_factor * c3 * d1 * d1;
    }
    degrees_per_day * params.days_per_year / 360.0
}

/// Compute the ephemerides at an hour-aligned epoch.
///
/// Callers holding an arbitrary epoch must round it down with
/// [`crate::timeline::hour_floor`] first.
pub fn compute_at(
    epoch: Epoch,
    params: &EphemerisParams,
) -> Result<EphemerisSnapshot, PreconditionError> {
    if !is_hour_aligned(epoch) {
        return Err(PreconditionError::UnalignedEpoch(epoch));
    }

    // ---------- 1. Days since 1899-12-31 12:00 UTC ----------
    let d1 = (epoch + params.gregorian_day0_seconds) as f64 / SECONDS_PER_DAY as f64;
    let d2 = params.d1_factor * d1;

    // ---------- 2. Mean longitudes (fractional cycles) ----------
    let sun_h = longitude_cycles(&params.sun_h, d1, d2);
    let sun_pp = longitude_cycles(&params.sun_pp, d1, d2);
    let moon_s = longitude_cycles(&params.moon_s, d1, d2);
    let moon_p = longitude_cycles(&params.moon_p, d1, d2);
    let asc_node_np = longitude_cycles(&params.asc_node_np, d1, d2);

    // ---------- 3. Rates ----------
    let sun_dh = rate_cycles_per_year(&params.sun_h, d1, params);
    let sun_dpp = rate_cycles_per_year(&params.sun_pp, d1, params);
    let moon_ds = rate_cycles_per_year(&params.moon_s, d1, params);
    let moon_dp = rate_cycles_per_year(&params.moon_p, d1, params);
    let asc_node_dnp = rate_cycles_per_year(&params.asc_node_np, d1, params);

    // ---------- 4. Lunar time ----------
    let hour_of_day = epoch.rem_euclid(SECONDS_PER_DAY) / SECONDS_PER_HOUR;
    let tau = hour_of_day as f64 / 24.0 + (sun_h - moon_s);
    let d_tau = params.days_per_year + (sun_dh - moon_ds);

    Ok(EphemerisSnapshot {
        epoch,
        tau,
        d_tau,
        moon_s,
        moon_ds,
        sun_h,
        sun_dh,
        moon_p,
        moon_dp,
        asc_node_np,
        asc_node_dnp,
        sun_pp,
        sun_dpp,
    })
}

/// Snapshots memoized by epoch.
///
/// Filled once before workers start and then only read; a miss computes a
/// fresh snapshot without caching it.
#[derive(Clone, Debug)]
pub struct EphemerisCache {
    params: EphemerisParams,
    snapshots: HashMap<Epoch, EphemerisSnapshot>,
}

impl EphemerisCache {
    pub fn new(params: EphemerisParams) -> Self {
        Self {
            params,
            snapshots: HashMap::new(),
        }
    }

    /// Precompute every hour a timeline will need.
    pub fn for_timeline(
        params: EphemerisParams,
        timeline: &Timeline,
    ) -> Result<Self, PreconditionError> {
        let mut cache = Self::new(params);
        for hour in timeline.astro_hours() {
            cache.insert(hour)?;
        }
        Ok(cache)
    }

    pub fn insert(&mut self, epoch: Epoch) -> Result<EphemerisSnapshot, PreconditionError> {
        let snapshot = compute_at(epoch, &self.params)?;
        self.snapshots.insert(epoch, snapshot);
        Ok(snapshot)
    }

    pub fn get(&self, epoch: Epoch) -> Result<EphemerisSnapshot, PreconditionError> {
        match self.snapshots.get(&epoch) {
            Some(snapshot) => Ok(*snapshot),
            None => compute_at(epoch, &self.params),
        }
    }

    pub fn params(&self) -> &EphemerisParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2000-01-01T00:00:00Z
    const Y2K: Epoch = 946_684_800;

    #[test]
    fn rejects_unaligned_epoch() {
        let params = EphemerisParams::default();
        assert_eq!(
            compute_at(Y2K + 60, &params),
            Err(PreconditionError::UnalignedEpoch(Y2K + 60))
        );
    }

    #[test]
    fn identical_epochs_are_bit_identical() {
        let params = EphemerisParams::default();
        let a = compute_at(Y2K, &params).unwrap();
        let b = compute_at(Y2K, &params).unwrap();
        for (x, y) in a.longitudes().iter().zip(b.longitudes().iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
        for (x, y) in a.rates().iter().zip(b.rates().iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn longitudes_are_fractional_cycles() {
        let params = EphemerisParams::default();
        let snap = compute_at(Y2K + 17 * 3600, &params).unwrap();
        // every longitude but lunar time
        for value in snap.longitudes().into_iter().skip(1) {
            assert!(
                (0.0..1.0).contains(&value),
                "longitude {} not in [0, 1)",
                value
            );
        }
    }

    #[test]
    fn sun_longitude_matches_almanac_at_y2k() {
        // The mean sun sits near 280 degrees at the start of January.
        let snap = compute_at(Y2K, &EphemerisParams::default()).unwrap();
        let degrees = snap.sun_h * 360.0;
        assert!(
            (degrees - 280.0).abs() < 1.0,
            "mean sun longitude {} deg",
            degrees
        );
    }

    #[test]
    fn lunar_time_rate_is_near_one_lunar_day() {
        // d_tau in cycles per year: 365 + (~1) - (~13.36)
        let snap = compute_at(Y2K, &EphemerisParams::default()).unwrap();
        assert!((snap.d_tau - 352.6).abs() < 0.1, "d_tau = {}", snap.d_tau);
        assert!(
            (snap.moon_ds - 13.359).abs() < 0.01,
            "moon_ds = {}",
            snap.moon_ds
        );
        assert!(
            (snap.sun_dh - 0.9993).abs() < 0.001,
            "sun_dh = {}",
            snap.sun_dh
        );
    }

    #[test]
    fn lunar_time_advances_with_hour_of_day() {
        let params = EphemerisParams::default();
        let midnight = compute_at(Y2K, &params).unwrap();
        let six = compute_at(Y2K + 6 * 3600, &params).unwrap();
        let hour_part = |s: &EphemerisSnapshot| s.tau - (s.sun_h - s.moon_s);
        assert!((hour_part(&six) - hour_part(&midnight) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn cache_serves_precomputed_and_fresh_snapshots() {
        let timeline = Timeline::new(Y2K, Y2K + 3 * 3600, 900).unwrap();
        let cache = EphemerisCache::for_timeline(EphemerisParams::default(), &timeline).unwrap();
        assert_eq!(cache.len(), 5);
        let cached = cache.get(Y2K + 3600).unwrap();
        assert_eq!(cached, compute_at(Y2K + 3600, cache.params()).unwrap());
        assert!(
            cache.get(Y2K + 100 * 3600).is_ok(),
            "miss must compute on the fly"
        );
        assert!(cache.get(Y2K + 10).is_err());
    }
}
