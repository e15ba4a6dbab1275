//! Shallow water constituents derived from main constituents.

use super::constituent::ConstituentState;
use crate::error::PreconditionError;
use crate::Epoch;
use serde::{Deserialize, Serialize};

/// One (main constituent, multiplier) term of a derivation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivationLink {
    #[serde(rename = "MainConstituent")]
    pub main: String,
    #[serde(rename = "MultFactor")]
    pub multiplier: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DerivedDefinition {
    pub name: String,
    #[serde(rename = "MainConstituentsDerivations")]
    pub links: Vec<DerivationLink>,
}

/// A main constituent's current state as seen by a derivation.
#[derive(Clone, Copy, Debug)]
pub struct LinkedState<'a> {
    pub main: &'a str,
    pub multiplier: f64,
    pub state: &'a ConstituentState,
    /// Epoch of the main constituent's last update, if any.
    pub updated_at: Option<Epoch>,
}

/// Combine already-updated main constituents into a shallow water state.
///
/// Every linked main constituent must carry a raw (unfolded) update for
/// `epoch`. The result is raw as well.
pub fn update_derived<'a, I>(
    name: &str,
    links: I,
    epoch: Epoch,
    nodal_factor_init: f64,
) -> Result<ConstituentState, PreconditionError>
where
    I: IntoIterator<Item = LinkedState<'a>>,
{
    let mut derived = ConstituentState::reset(nodal_factor_init);

    for link in links {
        if link.updated_at != Some(epoch) {
            return Err(PreconditionError::StaleDependency {
                derived: name.to_string(),
                main: link.main.to_string(),
                epoch,
            });
        }
        let m = link.multiplier;
        derived.frequency += m * link.state.frequency;
        derived.nodal_factor *= link.state.nodal_factor.powf(m);
        derived.argument += m * link.state.argument;
    }

    Ok(derived)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPOCH: Epoch = 1_704_067_200;

    fn state(frequency: f64, argument: f64, nodal_factor: f64) -> ConstituentState {
        ConstituentState {
            frequency,
            argument,
            nodal_factor,
        }
    }

    #[test]
    fn ms4_combines_m2_and_s2() {
        let m2 = state(1.405e-4, 0.31, 0.97);
        let s2 = state(1.454e-4, 0.12, 1.0);
        let links = [
            LinkedState {
                main: "M2",
                multiplier: 1.0,
                state: &m2,
                updated_at: Some(EPOCH),
            },
            LinkedState {
                main: "S2",
                multiplier: 1.0,
                state: &s2,
                updated_at: Some(EPOCH),
            },
        ];
        let ms4 = update_derived("MS4", links, EPOCH, 1.0).unwrap();
        assert!((ms4.frequency - (1.405e-4 + 1.454e-4)).abs() < 1e-9);
        assert!((ms4.argument - 0.43).abs() < 1e-9);
        assert!((ms4.nodal_factor - 0.97).abs() < 1e-9);
    }

    #[test]
    fn multiplier_is_an_exponent_for_nodal_factor() {
        let m2 = state(1.405e-4, 0.31, 0.97);
        let link = LinkedState {
            main: "M2",
            multiplier: 2.0,
            state: &m2,
            updated_at: Some(EPOCH),
        };
        let m4 = update_derived("M4", [link], EPOCH, 1.0).unwrap();
        assert!((m4.nodal_factor - 0.97 * 0.97).abs() < 1e-9);
        assert!((m4.frequency - 2.81e-4).abs() < 1e-9);
        assert!((m4.argument - 0.62).abs() < 1e-9);
    }

    #[test]
    fn stale_dependency_is_a_precondition_error() {
        let m2 = state(1.405e-4, 0.31, 0.97);
        let stale = LinkedState {
            main: "M2",
            multiplier: 2.0,
            state: &m2,
            updated_at: Some(EPOCH - 3600),
        };
        let err = update_derived("M4", [stale], EPOCH, 1.0).unwrap_err();
        assert_eq!(
            err,
            PreconditionError::StaleDependency {
                derived: "M4".to_string(),
                main: "M2".to_string(),
                epoch: EPOCH,
            }
        );

        let never = LinkedState {
            updated_at: None,
            ..stale
        };
        assert!(update_derived("M4", [never], EPOCH, 1.0).is_err());
    }
}
