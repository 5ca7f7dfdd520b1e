use crate::manager::SaveTicket;
use crate::remote::{RemoteError, SettingsBackend, ZoneReading};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;

/// Messages sent back to the UI thread, in the order the requests complete.
#[derive(Debug)]
pub enum WorkerEvent {
    Saved {
        ticket: SaveTicket,
        result: Result<(), RemoteError>,
    },
    /// `request` is the number the caller gave the lookup. Lookups run on their
    /// own threads, so a higher number can arrive before a lower one.
    Zone {
        request: u64,
        result: Result<ZoneReading, RemoteError>,
    },
}

/// A zone lookup to issue, numbered by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneLookup {
    pub request: u64,
    pub average_hr: String,
}

impl ZoneLookup {
    fn run(self, backend: &dyn SettingsBackend, events: &Sender<WorkerEvent>) {
        let result = backend.calculate_zone(&self.average_hr);
        let event = WorkerEvent::Zone {
            request: self.request,
            result,
        };
        if events.send(event).is_err() {
            log::warn!(
                "Zone lookup {} finished after the dashboard closed",
                self.request
            );
        }
    }
}

/// Run a save off the UI thread.
///
/// The settings request goes first; only when the server acknowledged it and a
/// lookup was given is the zone recalculated. Results are sent as
/// [`WorkerEvent::Saved`] followed by [`WorkerEvent::Zone`].
pub fn spawn_save(
    backend: Arc<dyn SettingsBackend + Send + Sync>,
    ticket: SaveTicket,
    lookup: Option<ZoneLookup>,
    events: Sender<WorkerEvent>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let result = backend.save_settings(ticket.config());
        let saved = result.is_ok();
        if events.send(WorkerEvent::Saved { ticket, result }).is_err() {
            log::warn!("Save finished after the dashboard closed");
            return;
        }
        if let (true, Some(lookup)) = (saved, lookup) {
            lookup.run(&*backend, &events);
        }
    })
}

/// Look up the zone without saving anything first.
pub fn spawn_zone_lookup(
    backend: Arc<dyn SettingsBackend + Send + Sync>,
    lookup: ZoneLookup,
    events: Sender<WorkerEvent>,
) -> JoinHandle<()> {
    std::thread::spawn(move || lookup.run(&*backend, &events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{SaveOutcome, ZoneConfigManager};
    use crate::store::MemoryStore;
    use crate::zones::{Bound, Configuration};
    use std::sync::Mutex;
    use std::sync::mpsc::channel;

    struct RecordingBackend {
        accept: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl SettingsBackend for RecordingBackend {
        fn save_settings(&self, _config: &Configuration) -> Result<(), RemoteError> {
            self.calls.lock().unwrap().push("save");
            if self.accept {
                Ok(())
            } else {
                Err(RemoteError::Rejected { details: vec![] })
            }
        }

        fn calculate_zone(&self, _average_hr: &str) -> Result<ZoneReading, RemoteError> {
            self.calls.lock().unwrap().push("zone");
            Ok(ZoneReading::Unknown)
        }
    }

    fn run(accept: bool, average_hr: Option<&str>) -> (Vec<WorkerEvent>, Vec<&'static str>) {
        let backend = Arc::new(RecordingBackend {
            accept,
            calls: Mutex::new(Vec::new()),
        });
        let mut manager = ZoneConfigManager::new(MemoryStore::new());
        manager.open_editing_surface();
        let ticket = manager.begin_save().unwrap();

        let (tx, rx) = channel();
        let lookup = average_hr.map(|average| ZoneLookup {
            request: 1,
            average_hr: average.to_string(),
        });
        spawn_save(backend.clone(), ticket, lookup, tx)
            .join()
            .unwrap();
        let events: Vec<_> = rx.try_iter().collect();
        let calls = backend.calls.lock().unwrap().clone();
        (events, calls)
    }

    #[test]
    fn zone_lookup_follows_acknowledged_save() {
        let (events, calls) = run(true, Some("140 bpm"));
        assert_eq!(calls, vec!["save", "zone"]);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], WorkerEvent::Saved { result: Ok(()), .. }));
        assert!(matches!(
            events[1],
            WorkerEvent::Zone {
                request: 1,
                result: Ok(ZoneReading::Unknown)
            }
        ));
    }

    #[test]
    fn no_zone_lookup_after_rejection_or_without_average() {
        let (events, calls) = run(false, Some("140 bpm"));
        assert_eq!(calls, vec!["save"]);
        assert_eq!(events.len(), 1);

        let (events, calls) = run(true, None);
        assert_eq!(calls, vec!["save"]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn standalone_zone_lookup_skips_save() {
        let backend = Arc::new(RecordingBackend {
            accept: true,
            calls: Mutex::new(Vec::new()),
        });
        let (tx, rx) = channel();
        let lookup = ZoneLookup {
            request: 7,
            average_hr: "120 bpm".into(),
        };
        spawn_zone_lookup(backend.clone(), lookup, tx).join().unwrap();
        assert!(matches!(
            rx.recv().unwrap(),
            WorkerEvent::Zone {
                request: 7,
                result: Ok(_)
            }
        ));
        assert_eq!(*backend.calls.lock().unwrap(), vec!["zone"]);
    }

    #[test]
    fn saved_event_completes_the_ticket() {
        let backend = Arc::new(RecordingBackend {
            accept: true,
            calls: Mutex::new(Vec::new()),
        });
        let mut manager = ZoneConfigManager::new(MemoryStore::new());
        manager.open_editing_surface();
        manager.set_zone_bound(1, Bound::Min, "45").unwrap();
        let ticket = manager.begin_save().unwrap();

        let (tx, rx) = channel();
        spawn_save(backend, ticket, None, tx).join().unwrap();
        match rx.recv().unwrap() {
            WorkerEvent::Saved { ticket, result } => {
                assert_eq!(manager.finish_save(ticket, result), SaveOutcome::Success);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(manager.committed().zones.get(1).unwrap().min, 45.0);
    }

    #[test]
    fn zone_result_after_receiver_dropped_is_not_fatal() {
        let backend = Arc::new(RecordingBackend {
            accept: true,
            calls: Mutex::new(Vec::new()),
        });
        let (tx, rx) = channel();
        drop(rx);
        let lookup = ZoneLookup {
            request: 1,
            average_hr: "120 bpm".into(),
        };
        spawn_zone_lookup(backend.clone(), lookup, tx).join().unwrap();
        assert_eq!(*backend.calls.lock().unwrap(), vec!["zone"]);
    }
}
