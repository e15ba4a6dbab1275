//! # Foreman Harmonic Astronomy
//!
//! Static constituent tables and the astronomic machinery that turns them into
//! time-dependent constituent states.
//!
//! ## Static Data
//! [`AstroTables`] is loaded once per run from a JSON file with the layout of
//! the classical Foreman tables:
//!
//! ```json
//! {
//!   "MainConstituents": [
//!     { "Name": "M2", "DoodsonNumbers": [2, 0, 0, 0, 0, 0], "PhaseCorrection": 0.0,
//!       "Satellites": [ { "AmplitudeRatio": 0.0373, "PhaseCorrection": 0.5,
//!                         "DoodsonNbChanges": [0, -1, 0], "AmplitudeRatioFlag": 0 } ] }
//!   ],
//!   "ShallowWaterConstituents": [
//!     { "Name": "M4", "MainConstituentsDerivations": [ { "MainConstituent": "M2", "MultFactor": 2.0 } ] }
//!   ]
//! }
//! ```
//!
//! `AstroParams` and `Ephemerides` sections are optional; omitted values take the
//! standard Foreman constants. The tables are immutable for the lifetime of the
//! run and shared by reference with every worker.

pub mod clock;
pub mod constituent;
pub mod derived;
pub mod ephemeris;

use crate::error::ConfigurationError;
use constituent::{AmplitudeRatioFlag, AstroParams, ConstituentDefinition, Satellite};
use derived::{DerivationLink, DerivedDefinition};
use ephemeris::EphemerisParams;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AstroTables {
    #[serde(default)]
    pub astro_params: AstroParams,
    #[serde(default)]
    pub ephemerides: EphemerisParams,
    pub main_constituents: Vec<ConstituentDefinition>,
    #[serde(default)]
    pub shallow_water_constituents: Vec<DerivedDefinition>,
}

impl AstroTables {
    /// Read and validate a JSON constituent table.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let tables: AstroTables =
            serde_json::from_str(&contents).map_err(|source| ConfigurationError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        tables.validate()?;
        Ok(tables)
    }

    /// Check the invariants every consumer relies on.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.main_constituents.is_empty() {
            return Err(ConfigurationError::InvalidTable(
                "no main constituents defined".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for name in self
            .main_constituents
            .iter()
            .map(|c| &c.name)
            .chain(self.shallow_water_constituents.iter().map(|c| &c.name))
        {
            if name.trim().is_empty() {
                return Err(ConfigurationError::InvalidTable(
                    "constituent with an empty name".to_string(),
                ));
            }
            if !names.insert(name.as_str()) {
                return Err(ConfigurationError::InvalidTable(format!(
                    "constituent {} defined more than once",
                    name
                )));
            }
        }

        let main_names: HashSet<&str> = self
            .main_constituents
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        for derived in &self.shallow_water_constituents {
            if derived.links.is_empty() {
                return Err(ConfigurationError::InvalidTable(format!(
                    "shallow water constituent {} has no derivation",
                    derived.name
                )));
            }
            for link in &derived.links {
                if !main_names.contains(link.main.as_str()) {
                    return Err(ConfigurationError::UnknownMainConstituent {
                        derived: derived.name.clone(),
                        main: link.main.clone(),
                    });
                }
            }
        }

        if self.astro_params.phase_int_threshold <= 0.0 {
            return Err(ConfigurationError::InvalidTable(
                "phase integer threshold must be positive".to_string(),
            ));
        }
        if self.ephemerides.hours_per_year <= 0.0 {
            return Err(ConfigurationError::InvalidTable(
                "hours per year must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn main(&self, name: &str) -> Option<&ConstituentDefinition> {
        self.main_constituents.iter().find(|c| c.name == name)
    }

    pub fn derived(&self, name: &str) -> Option<&DerivedDefinition> {
        self.shallow_water_constituents
            .iter()
            .find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.main(name).is_some() || self.derived(name).is_some()
    }

    /// A compact table of the dominant constituents.
    ///
    /// Enough for tests and demonstrations; production runs load the complete
    /// Foreman table with [`AstroTables::load_from_path`].
    pub fn builtin() -> Self {
        fn sat(ratio: f64, phase: f64, deltas: [i32; 3], flag: AmplitudeRatioFlag) -> Satellite {
            Satellite {
                amplitude_ratio: ratio,
                phase_correction: phase,
                doodson_deltas: deltas,
                flag,
            }
        }
        fn main(
            name: &str,
            doodson: [i32; 6],
            phase: f64,
            sats: Vec<Satellite>,
        ) -> ConstituentDefinition {
            ConstituentDefinition {
                name: name.to_string(),
                doodson_numbers: doodson,
                phase_correction: phase,
                satellites: sats,
            }
        }
        fn derived(name: &str, links: &[(&str, f64)]) -> DerivedDefinition {
            DerivedDefinition {
                name: name.to_string(),
                links: links
                    .iter()
                    .map(|(main, multiplier)| DerivationLink {
                        main: main.to_string(),
                        multiplier: *multiplier,
                    })
                    .collect(),
            }
        }

        use AmplitudeRatioFlag::{None as Plain, Type1, Type2};

        AstroTables {
            astro_params: AstroParams::default(),
            ephemerides: EphemerisParams::default(),
            main_constituents: vec![
                main("Z0", [0, 0, 0, 0, 0, 0], 0.0, Vec::new()),
                main(
                    "M2",
                    [2, 0, 0, 0, 0, 0],
                    0.0,
                    vec![
                        sat(0.0005, 0.75, [-1, -1, 0], Type2),
                        sat(0.0373, 0.5, [0, -1, 0], Plain),
                        sat(0.0006, 0.75, [1, -1, 0], Type2),
                        sat(0.0002, 0.0, [2, 0, 0], Plain),
                    ],
                ),
                main(
                    "S2",
                    [2, 2, -2, 0, 0, 0],
                    0.0,
                    vec![
                        sat(0.0022, 0.0, [0, 0, 2], Plain),
                        sat(0.0001, 0.75, [1, 0, 0], Type2),
                    ],
                ),
                main(
                    "N2",
                    [2, -1, 0, 1, 0, 0],
                    0.0,
                    vec![
                        sat(0.0006, 0.75, [-2, -2, 0], Type2),
                        sat(0.0373, 0.5, [0, -1, 0], Plain),
                    ],
                ),
                main(
                    "K1",
                    [1, 1, 0, 0, 0, 0],
                    0.25,
                    vec![
                        sat(0.0002, 0.0, [-2, -1, 0], Plain),
                        sat(0.0001, 0.75, [-1, -1, 0], Type1),
                        sat(0.0198, 0.5, [0, -1, 0], Plain),
                        sat(0.1356, 0.0, [0, 1, 0], Plain),
                        sat(0.0029, 0.5, [0, 2, 0], Plain),
                    ],
                ),
                main(
                    "O1",
                    [1, -1, 0, 0, 0, 0],
                    0.75,
                    vec![
                        sat(0.0003, 0.75, [-1, 0, 0], Type1),
                        sat(0.0058, 0.5, [0, -2, 0], Plain),
                        sat(0.1885, 0.0, [0, -1, 0], Plain),
                        sat(0.0004, 0.25, [1, 0, 0], Type1),
                    ],
                ),
            ],
            shallow_water_constituents: vec![
                derived("M4", &[("M2", 2.0)]),
                derived("MS4", &[("M2", 1.0), ("S2", 1.0)]),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn builtin_table_is_valid() {
        let tables = AstroTables::builtin();
        tables.validate().unwrap();
        assert!(tables.contains("M2"));
        assert!(tables.contains("MS4"));
        assert!(!tables.contains("M6"));
    }

    #[test]
    fn load_applies_default_parameters() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "MainConstituents": [
                    {{ "Name": "M2", "DoodsonNumbers": [2, 0, 0, 0, 0, 0] }}
                ],
                "ShallowWaterConstituents": [
                    {{ "Name": "M4", "MainConstituentsDerivations": [ {{ "MainConstituent": "M2", "MultFactor": 2.0 }} ] }}
                ]
            }}"#
        )
        .unwrap();

        let tables = AstroTables::load_from_path(file.path()).unwrap();
        assert_eq!(tables.astro_params, AstroParams::default());
        assert_eq!(tables.ephemerides.hours_per_year, 8760.0);
        assert_eq!(tables.main("M2").map(|c| c.satellites.len()), Some(0));
        assert_eq!(
            tables.derived("M4").map(|c| c.links[0].multiplier),
            Some(2.0)
        );
    }

    #[test]
    fn unknown_derivation_source_is_a_configuration_error() {
        let mut tables = AstroTables::builtin();
        let orphan = DerivedDefinition {
            name: "2MK3".to_string(),
            links: vec![DerivationLink {
                main: "MK9".to_string(),
                multiplier: 1.0,
            }],
        };
        tables.shallow_water_constituents.push(orphan);
        match tables.validate() {
            Err(ConfigurationError::UnknownMainConstituent { derived, main }) => {
                assert_eq!(derived, "2MK3");
                assert_eq!(main, "MK9");
            }
            other => panic!("expected UnknownMainConstituent, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut tables = AstroTables::builtin();
        let m2 = tables.main("M2").cloned().unwrap();
        tables.main_constituents.push(m2);
        assert!(matches!(tables.validate(), Err(ConfigurationError::InvalidTable(_))));
    }

    #[test]
    fn malformed_json_names_the_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = AstroTables::load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigurationError::Json { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AstroTables::load_from_path("/nonexistent/tables.json").unwrap_err();
        assert!(matches!(err, ConfigurationError::Io { .. }));
    }
}
