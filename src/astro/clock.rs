//! Per-worker astronomic state for every constituent of a table.
//!
//! An [`AstroClock`] owns one mutable [`ConstituentState`] per main and shallow
//! water constituent. It is created at prediction start, recomputed at each hour
//! boundary and never shared: every worker builds its own clock over the shared,
//! read-only [`AstroTables`].
//!
//! An update runs in three phases:
//! 1. raw update of every main constituent
//! 2. raw combination of every shallow water constituent
//! 3. fold of all arguments into radians within [0, 2π)

use super::constituent::{fold_argument, update_main, ConstituentState};
use super::derived::{update_derived, LinkedState};
use super::ephemeris::{EphemerisCache, EphemerisSnapshot};
use super::AstroTables;
use crate::error::PreconditionError;
use crate::timeline::{hour_floor, is_hour_aligned};
use crate::Epoch;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Main(usize),
    Derived(usize),
}

#[derive(Clone, Copy, Debug)]
struct Tracked {
    state: ConstituentState,
    updated_at: Option<Epoch>,
}

#[derive(Clone, Debug)]
pub struct AstroClock<'t> {
    tables: &'t AstroTables,
    main: Vec<Tracked>,
    derived: Vec<Tracked>,
    /// Main-constituent indexes and multipliers of every derivation.
    derived_links: Vec<Vec<(usize, f64)>>,
    slots: HashMap<String, Slot>,
    updated_at: Option<Epoch>,
    latitude_radians: f64,
}

impl<'t> AstroClock<'t> {
    /// Build a fresh clock. The tables must have passed [`AstroTables::validate`].
    pub fn new(tables: &'t AstroTables) -> Self {
        let init = Tracked {
            state: ConstituentState::reset(tables.astro_params.nodal_factor_init),
            updated_at: None,
        };

        let mut slots = HashMap::new();
        for (i, def) in tables.main_constituents.iter().enumerate() {
            slots.insert(def.name.clone(), Slot::Main(i));
        }

        let mut derived_links = Vec::with_capacity(tables.shallow_water_constituents.len());
        for (i, def) in tables.shallow_water_constituents.iter().enumerate() {
            slots.insert(def.name.clone(), Slot::Derived(i));
            let links = def
                .links
                .iter()
                .filter_map(|link| match slots.get(&link.main) {
                    Some(Slot::Main(idx)) => Some((*idx, link.multiplier)),
                    _ => None,
                })
                .collect();
            derived_links.push(links);
        }

        Self {
            tables,
            main: vec![init; tables.main_constituents.len()],
            derived: vec![init; tables.shallow_water_constituents.len()],
            derived_links,
            slots,
            updated_at: None,
            latitude_radians: 0.0,
        }
    }

    /// Recompute every constituent for the snapshot's epoch and a latitude.
    ///
    /// A latitude whose sine is zero leaves type-1 satellites undefined and is
    /// rejected, as is any other non-finite state.
    pub fn update(
        &mut self,
        latitude_radians: f64,
        ephemeris: &EphemerisSnapshot,
    ) -> Result<(), PreconditionError> {
        let epoch = ephemeris.epoch;
        if !is_hour_aligned(epoch) {
            return Err(PreconditionError::UnalignedEpoch(epoch));
        }
        // A failed derivation below must not leave a half-updated clock usable.
        self.updated_at = None;

        let tables = self.tables;
        let params = &tables.astro_params;
        let hours_per_year = tables.ephemerides.hours_per_year;

        for (tracked, def) in self.main.iter_mut().zip(&tables.main_constituents) {
            tracked.state = update_main(def, latitude_radians, ephemeris, params, hours_per_year);
            tracked.updated_at = Some(epoch);
        }

        for (i, def) in tables.shallow_water_constituents.iter().enumerate() {
            let main = &self.main;
            let links = self.derived_links[i]
                .iter()
                .map(|&(idx, multiplier)| LinkedState {
                    main: tables.main_constituents[idx].name.as_str(),
                    multiplier,
                    state: &main[idx].state,
                    updated_at: main[idx].updated_at,
                });
            let state = update_derived(&def.name, links, epoch, params.nodal_factor_init)?;
            self.derived[i] = Tracked {
                state,
                updated_at: Some(epoch),
            };
        }

        for tracked in self.main.iter_mut().chain(self.derived.iter_mut()) {
            tracked.state.argument = fold_argument(tracked.state.argument);
            let state = &tracked.state;
            if !(state.argument.is_finite() && state.nodal_factor.is_finite()) {
                return Err(PreconditionError::DegenerateLatitude(latitude_radians));
            }
        }

        self.updated_at = Some(epoch);
        self.latitude_radians = latitude_radians;
        Ok(())
    }

    /// Bring the clock to the hour boundary at or before `epoch` and return
    /// the offset in seconds from that boundary.
    ///
    /// Nothing is recomputed while the boundary and latitude are unchanged.
    pub fn advance_to(
        &mut self,
        epoch: Epoch,
        latitude_radians: f64,
        cache: &EphemerisCache,
    ) -> Result<f64, PreconditionError> {
        let hour = hour_floor(epoch);
        let current = self.updated_at == Some(hour)
            && self.latitude_radians.to_bits() == latitude_radians.to_bits();
        if !current {
            let snapshot = cache.get(hour)?;
            self.update(latitude_radians, &snapshot)?;
        }
        self.offset_seconds(epoch)
    }

    /// Seconds elapsed between the last update and `epoch`.
    pub fn offset_seconds(&self, epoch: Epoch) -> Result<f64, PreconditionError> {
        let updated = self.updated_at.ok_or(PreconditionError::NotUpdated)?;
        if epoch < updated {
            return Err(PreconditionError::EpochBeforeUpdate {
                requested: epoch,
                updated,
            });
        }
        Ok((epoch - updated) as f64)
    }

    /// Folded state of a constituent by name.
    pub fn state(&self, name: &str) -> Result<&ConstituentState, PreconditionError> {
        if self.updated_at.is_none() {
            return Err(PreconditionError::NotUpdated);
        }
        match self.slots.get(name) {
            Some(Slot::Main(i)) => Ok(&self.main[*i].state),
            Some(Slot::Derived(i)) => Ok(&self.derived[*i].state),
            None => Err(PreconditionError::MissingConstituentState(name.to_string())),
        }
    }

    pub fn updated_at(&self) -> Option<Epoch> {
        self.updated_at
    }

    pub fn tables(&self) -> &'t AstroTables {
        self.tables
    }
}
