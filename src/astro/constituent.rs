//! Main tidal constituents: static definitions and the Foreman astronomic update.
//!
//! A main constituent's frequency and astronomic argument come straight from its
//! six Doodson numbers applied to the ephemerides. Its nodal modulation comes from
//! the vector sum of its satellites, each weighted by an amplitude ratio that may
//! depend on latitude.

use super::ephemeris::EphemerisSnapshot;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::f64::consts::TAU;

/// How a satellite's amplitude ratio is adjusted for latitude.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AmplitudeRatioFlag {
    /// Ratio used as is.
    #[default]
    None,
    /// Ratio scaled by `(1 − 5 sin²φ) / sin φ × K1`.
    Type1,
    /// Ratio scaled by `sin φ × K2`.
    Type2,
}

impl TryFrom<u8> for AmplitudeRatioFlag {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Type1),
            2 => Ok(Self::Type2),
            other => Err(format!("amplitude ratio flag must be 0, 1 or 2, got {}", other)),
        }
    }
}

impl From<AmplitudeRatioFlag> for u8 {
    fn from(flag: AmplitudeRatioFlag) -> Self {
        match flag {
            AmplitudeRatioFlag::None => 0,
            AmplitudeRatioFlag::Type1 => 1,
            AmplitudeRatioFlag::Type2 => 2,
        }
    }
}

/// Secondary correction attached to a main constituent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Satellite {
    pub amplitude_ratio: f64,
    /// In cycles.
    pub phase_correction: f64,
    /// Changes applied to (p, N', p').
    #[serde(rename = "DoodsonNbChanges")]
    pub doodson_deltas: [i32; 3],
    #[serde(rename = "AmplitudeRatioFlag", default)]
    pub flag: AmplitudeRatioFlag,
}

/// Static description of a main constituent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConstituentDefinition {
    pub name: String,
    /// Multipliers of (τ, s, h, p, N', p').
    pub doodson_numbers: [i32; 6],
    /// In cycles.
    #[serde(default)]
    pub phase_correction: f64,
    #[serde(default)]
    pub satellites: Vec<Satellite>,
}

/// Numeric constants of the nodal correction scheme.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AstroParams {
    /// K1 of the type-1 amplitude ratio adjustment.
    pub nodal_adj_k1: f64,
    /// K2 of the type-2 amplitude ratio adjustment.
    pub nodal_adj_k2: f64,
    /// Whole-cycle threshold removed from raw arguments.
    pub phase_int_threshold: f64,
    pub cos_acc_init: f64,
    pub sin_acc_init: f64,
    /// Nodal factor of a constituent without satellites.
    pub nodal_factor_init: f64,
}

impl Default for AstroParams {
    fn default() -> Self {
        Self {
            nodal_adj_k1: 0.36309,
            nodal_adj_k2: 2.59808,
            phase_int_threshold: 1.0,
            cos_acc_init: 1.0,
            sin_acc_init: 0.0,
            nodal_factor_init: 1.0,
        }
    }
}

/// Astronomic state of one constituent for one epoch and latitude.
///
/// `argument` is in cycles right after a raw update and in radians within
/// [0, 2π) once [`fold_argument`] has been applied.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstituentState {
    /// Radians per second.
    pub frequency: f64,
    pub argument: f64,
    pub nodal_factor: f64,
}

impl ConstituentState {
    pub fn reset(nodal_factor_init: f64) -> Self {
        Self {
            frequency: 0.0,
            argument: 0.0,
            nodal_factor: nodal_factor_init,
        }
    }
}

/// Convert an argument in cycles to radians within [0, 2π).
pub fn fold_argument(cycles: f64) -> f64 {
    let radians = (TAU * cycles).rem_euclid(TAU);
    // rem_euclid can round up to TAU for tiny negative inputs
    if radians >= TAU {
        0.0
    } else {
        radians
    }
}

/// Latitude weighting of a satellite's amplitude ratio.
///
/// Type 1 divides by `sin φ` and is not finite at the equator.
pub fn adjustment_factor(flag: AmplitudeRatioFlag, sin_lat: f64, params: &AstroParams) -> f64 {
    match flag {
        AmplitudeRatioFlag::None => 1.0,
        AmplitudeRatioFlag::Type1 => {
            (1.0 - 5.0 * sin_lat * sin_lat) / sin_lat * params.nodal_adj_k1
        }
        AmplitudeRatioFlag::Type2 => sin_lat * params.nodal_adj_k2,
    }
}

/// Accumulate the cosine and sine sums over a constituent's satellites.
pub fn satellite_sums(
    satellites: &[Satellite],
    latitude_radians: f64,
    ephemeris: &EphemerisSnapshot,
    params: &AstroParams,
) -> (f64, f64) {
    let sin_lat = latitude_radians.sin();
    let mut cos_sum = params.cos_acc_init;
    let mut sin_sum = params.sin_acc_init;

    for sat in satellites {
        let [dp, dnp, dpp] = sat.doodson_deltas;
        let cycles = sat.phase_correction
            + f64::from(dp) * ephemeris.moon_p
            + f64::from(dnp) * ephemeris.asc_node_np
            + f64::from(dpp) * ephemeris.sun_pp;
        let angle = fold_argument(cycles);
        let weight = sat.amplitude_ratio * adjustment_factor(sat.flag, sin_lat, params);
        cos_sum += weight * angle.cos();
        sin_sum += weight * angle.sin();
    }

    (cos_sum, sin_sum)
}

/// Raw astronomic update of a main constituent.
///
/// The returned argument is still in cycles: the fold into radians happens once
/// every constituent of the epoch, shallow water ones included, is up to date.
pub fn update_main(
    def: &ConstituentDefinition,
    latitude_radians: f64,
    ephemeris: &EphemerisSnapshot,
    params: &AstroParams,
    hours_per_year: f64,
) -> ConstituentState {
    let rates = ephemeris.rates();
    let longitudes = ephemeris.longitudes();

    let mut rate_sum = 0.0;
    let mut argument = def.phase_correction;
    for ((&doodson, rate), longitude) in def.doodson_numbers.iter().zip(rates).zip(longitudes) {
        let doodson = f64::from(doodson);
        rate_sum += doodson * rate;
        argument += doodson * longitude;
    }

    let frequency = TAU / (hours_per_year * 3600.0) * rate_sum;

    let threshold = params.phase_int_threshold;
    argument -= threshold * (argument / threshold).trunc();

    let mut nodal_factor = params.nodal_factor_init;
    if !def.satellites.is_empty() {
        let (cos_sum, sin_sum) =
            satellite_sums(&def.satellites, latitude_radians, ephemeris, params);
        nodal_factor = cos_sum.hypot(sin_sum);
        argument += sin_sum.atan2(cos_sum) / TAU;
    }

    ConstituentState {
        frequency,
        argument,
        nodal_factor,
    }
}
