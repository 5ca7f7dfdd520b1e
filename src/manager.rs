//! Zone settings editor state.
//!
//! [`ZoneConfigManager`] keeps two copies of the [`Configuration`]: the committed one,
//! mirrored in the local cache and acknowledged by the settings server, and the working
//! one bound to the editor fields. Edits only ever touch the working copy. A save
//! validates it, sends it to the server and only then replaces the committed copy and
//! the cache entry. Every failed save puts the working copy back to the committed one.
//!
//! Saving is split into [`ZoneConfigManager::begin_save`] and
//! [`ZoneConfigManager::finish_save`] so the network call can run elsewhere; the
//! [`SaveTicket`] carries the snapshot that was sent and the editing session it came
//! from, which keeps late results from touching a newer session.

use crate::remote::{RemoteError, SettingsBackend, ZoneReading};
use crate::store::{HR_SETTINGS_KEY, SettingsStore};
use crate::validation::{GENERIC_SAVE_ERROR, validate};
use crate::zones::{Bound, Configuration, MaxHeartRate, ZoneIndexError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Cancelled,
    Saved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Success,
    ValidationFailed,
    RemoteError,
    /// Another save from this manager has not finished yet.
    AlreadySaving,
}

/// Receives the zone the average heart rate falls into after a save.
pub trait ZoneDisplay {
    fn show_zone(&mut self, reading: &ZoneReading);
}

impl<F: FnMut(&ZoneReading)> ZoneDisplay for F {
    fn show_zone(&mut self, reading: &ZoneReading) {
        self(reading)
    }
}

/// A save that passed validation and is waiting for the server.
#[derive(Debug)]
pub struct SaveTicket {
    token: u64,
    session: u64,
    config: Configuration,
}

impl SaveTicket {
    pub fn config(&self) -> &Configuration {
        &self.config
    }
}

pub struct ZoneConfigManager<S: SettingsStore> {
    store: S,
    committed: Configuration,
    working: Configuration,
    validation_errors: Vec<String>,
    is_open: bool,
    session: u64,
    next_token: u64,
    in_flight: Option<u64>,
    revision: u64,
    average_hr: Option<String>,
}

impl<S: SettingsStore> ZoneConfigManager<S> {
    /// Load the committed configuration from `store`, or the defaults if the cache
    /// has nothing usable.
    pub fn new(store: S) -> Self {
        let committed = load_committed(&store);
        Self {
            store,
            working: committed.clone(),
            committed,
            validation_errors: Vec::new(),
            is_open: false,
            session: 0,
            next_token: 0,
            in_flight: None,
            revision: 0,
            average_hr: None,
        }
    }

    pub fn committed(&self) -> &Configuration {
        &self.committed
    }

    pub fn working(&self) -> &Configuration {
        &self.working
    }

    pub fn validation_errors(&self) -> &[String] {
        &self.validation_errors
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn is_saving(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Bumped whenever the working copy is replaced as a whole, so editors can
    /// refresh their field text.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn average_hr(&self) -> Option<&str> {
        self.average_hr.as_deref()
    }

    /// Average heart rate text used for the zone lookup after a save, e.g. `"142.5 bpm"`.
    pub fn set_average_hr(&mut self, text: Option<String>) {
        self.average_hr = text;
    }

    pub fn open_editing_surface(&mut self) {
        self.reset_working();
        self.validation_errors.clear();
        self.is_open = true;
        self.session += 1;
    }

    pub fn close_editing_surface(&mut self, reason: CloseReason) {
        if reason == CloseReason::Cancelled {
            self.reset_working();
            self.validation_errors.clear();
        }
        self.is_open = false;
    }

    pub fn set_max_heart_rate(&mut self, raw: &str) {
        self.working.max_heart_rate = MaxHeartRate::from_input(raw);
    }

    pub fn set_zone_bound(
        &mut self,
        index: usize,
        bound: Bound,
        raw: &str,
    ) -> Result<(), ZoneIndexError> {
        let zone = self
            .working
            .zones
            .get_mut(index)
            .ok_or(ZoneIndexError(index))?;
        let value = crate::zones::coerce_zone_bound(raw);
        match bound {
            Bound::Min => zone.min = value,
            Bound::Max => zone.max = value,
        }
        Ok(())
    }

    /// Validate the working copy and, if it passes, hand out the ticket for the
    /// server request.
    pub fn begin_save(&mut self) -> Result<SaveTicket, SaveOutcome> {
        if self.in_flight.is_some() {
            log::debug!("Save requested while another save is in flight");
            return Err(SaveOutcome::AlreadySaving);
        }
        let errors = validate(&self.working);
        if !errors.is_empty() {
            log::info!("Zone settings failed validation: {errors:?}");
            self.validation_errors = errors;
            return Err(SaveOutcome::ValidationFailed);
        }
        self.next_token += 1;
        self.in_flight = Some(self.next_token);
        Ok(SaveTicket {
            token: self.next_token,
            session: self.session,
            config: self.working.clone(),
        })
    }

    /// Apply the server's answer for `ticket`.
    ///
    /// A result that arrives after its editing session was closed or replaced still
    /// updates the committed copy on success, but never reopens the editor, never
    /// reports errors into the newer session and never touches its working copy.
    pub fn finish_save(
        &mut self,
        ticket: SaveTicket,
        result: Result<(), RemoteError>,
    ) -> SaveOutcome {
        if self.in_flight == Some(ticket.token) {
            self.in_flight = None;
        }
        let current = self.is_open && self.session == ticket.session;

        match result {
            Ok(()) => {
                log::info!("Zone settings saved");
                self.committed = ticket.config;
                self.persist_committed();
                if current {
                    self.validation_errors.clear();
                    self.close_editing_surface(CloseReason::Saved);
                }
                if !self.is_open {
                    self.reset_working();
                }
                SaveOutcome::Success
            }
            Err(err) => {
                log::error!("Error saving settings: {err}");
                if current {
                    self.validation_errors = match err {
                        RemoteError::Rejected { details } if !details.is_empty() => details,
                        _ => vec![GENERIC_SAVE_ERROR.to_string()],
                    };
                    self.reset_working();
                }
                SaveOutcome::RemoteError
            }
        }
    }

    /// Validate, persist remotely, commit, then refresh the zone display.
    pub fn save(
        &mut self,
        backend: &dyn SettingsBackend,
        display: &mut dyn ZoneDisplay,
    ) -> SaveOutcome {
        let ticket = match self.begin_save() {
            Ok(ticket) => ticket,
            Err(outcome) => return outcome,
        };
        let result = backend.save_settings(ticket.config());
        let outcome = self.finish_save(ticket, result);
        if outcome == SaveOutcome::Success {
            self.refresh_zone(backend, display);
        }
        outcome
    }

    /// Best-effort zone lookup for the current average heart rate.
    pub fn refresh_zone(&self, backend: &dyn SettingsBackend, display: &mut dyn ZoneDisplay) {
        if let Some(average) = self.average_hr.as_deref() {
            report_zone(backend.calculate_zone(average), display);
        }
    }

    fn reset_working(&mut self) {
        self.working = self.committed.clone();
        self.revision += 1;
    }

    fn persist_committed(&mut self) {
        let data = match serde_json::to_string(&self.committed) {
            Ok(data) => data,
            Err(e) => {
                log::error!("Failed to encode zone settings: {e}");
                return;
            }
        };
        if let Err(e) = self.store.set(HR_SETTINGS_KEY, &data) {
            log::error!("Failed to cache zone settings: {e}");
        }
    }
}

/// Pass a zone lookup result on to `display`. Failures are only logged.
pub fn report_zone(result: Result<ZoneReading, RemoteError>, display: &mut dyn ZoneDisplay) {
    match result {
        Ok(reading) => display.show_zone(&reading),
        Err(e) => log::error!("Error fetching updated zone: {e}"),
    }
}

fn load_committed<S: SettingsStore>(store: &S) -> Configuration {
    match store.get(HR_SETTINGS_KEY) {
        Ok(Some(data)) => Configuration::from_cache_json(&data).unwrap_or_else(|e| {
            log::warn!("Cached zone settings unreadable, using defaults: {e}");
            Configuration::default()
        }),
        Ok(None) => Configuration::default(),
        Err(e) => {
            log::warn!("Zone settings cache unavailable, using defaults: {e}");
            Configuration::default()
        }
    }
}
