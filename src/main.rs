use eframe::{App, Frame, NativeOptions, egui};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::{Duration, Instant};

mod manager;
use manager::{CloseReason, SaveOutcome, ZoneConfigManager, report_zone};
mod remote;
use remote::{HttpBackend, SettingsBackend, ZoneReading};
mod settings;
use settings::AppSettings;
mod store;
use store::{FileStore, MemoryStore, SettingsStore};
mod toast;
use toast::{ToastKind, Toasts};
mod validation;
mod worker;
use worker::{WorkerEvent, ZoneLookup, spawn_save, spawn_zone_lookup};
mod zones;
use zones::{
    Bound, Configuration, MaxHeartRate, ZONE_COUNT, ZoneSet, format_bound, parse_float_prefix,
    parse_int_prefix,
};

const SAVED_MESSAGE: &str = "Settings saved successfully!";

/// Text buffers behind the settings window's inputs.
///
/// Every edit goes straight to the working configuration. A buffer is rewritten
/// when the stored value differs from the number the user typed (a capped max HR,
/// a negative bound) and when the manager replaces the working copy as a whole.
/// Blank or half-typed text such as `"-"` or `"5."` is left alone.
#[derive(Debug, Default)]
struct ZoneForm {
    max_hr: String,
    bounds: [[String; 2]; ZONE_COUNT],
    revision: Option<u64>,
}

impl ZoneForm {
    fn sync(&mut self, config: &Configuration, revision: u64) {
        self.max_hr = config.max_heart_rate.to_input();
        for (index, _, zone) in config.zones.iter() {
            self.bounds[index - 1] = [format_bound(zone.min), format_bound(zone.max)];
        }
        self.revision = Some(revision);
    }

    fn edit_max_hr<S: SettingsStore>(&mut self, manager: &mut ZoneConfigManager<S>) {
        manager.set_max_heart_rate(&self.max_hr);
        if let MaxHeartRate::Bpm(stored) = manager.working().max_heart_rate {
            if parse_int_prefix(&self.max_hr) != Some(stored) {
                self.max_hr = stored.to_string();
            }
        }
    }

    fn edit_bound<S: SettingsStore>(
        &mut self,
        manager: &mut ZoneConfigManager<S>,
        index: usize,
        bound: Bound,
    ) {
        let Some([min, max]) = index.checked_sub(1).and_then(|i| self.bounds.get_mut(i)) else {
            log::error!("No zone {index} in the settings form");
            return;
        };
        let text = match bound {
            Bound::Min => min,
            Bound::Max => max,
        };
        if let Err(e) = manager.set_zone_bound(index, bound, text) {
            log::error!("{e}");
            return;
        }
        let Some(zone) = manager.working().zones.get(index) else {
            return;
        };
        let stored = match bound {
            Bound::Min => zone.min,
            Bound::Max => zone.max,
        };
        if parse_float_prefix(text).is_some_and(|typed| typed != stored) {
            *text = format_bound(stored);
        }
    }
}

struct DashboardApp<S: SettingsStore> {
    manager: ZoneConfigManager<S>,
    backend: Arc<dyn SettingsBackend + Send + Sync>,
    settings: AppSettings,
    settings_dirty: bool,
    average_hr_input: String,
    zone_text: String,
    /// Number given to the most recent zone lookup.
    zone_request: u64,
    /// Number of the lookup currently shown in `zone_text`.
    zone_shown: u64,
    form: ZoneForm,
    toasts: Toasts,
    events_tx: Sender<WorkerEvent>,
    events_rx: Receiver<WorkerEvent>,
}

impl<S: SettingsStore> DashboardApp<S> {
    fn new(
        store: S,
        backend: Arc<dyn SettingsBackend + Send + Sync>,
        settings: AppSettings,
    ) -> Self {
        let mut manager = ZoneConfigManager::new(store);
        manager.set_average_hr(settings.average_hr.clone());
        let (events_tx, events_rx) = channel();
        let mut app = Self {
            manager,
            backend,
            average_hr_input: settings.average_hr.clone().unwrap_or_default(),
            settings,
            settings_dirty: false,
            zone_text: String::new(),
            zone_request: 0,
            zone_shown: 0,
            form: ZoneForm::default(),
            toasts: Toasts::default(),
            events_tx,
            events_rx,
        };
        app.request_zone();
        app
    }

    /// Number a lookup for the current average heart rate, if there is one.
    fn next_zone_lookup(&mut self) -> Option<ZoneLookup> {
        let average_hr = self.manager.average_hr()?.to_string();
        self.zone_request += 1;
        Some(ZoneLookup {
            request: self.zone_request,
            average_hr,
        })
    }

    fn request_zone(&mut self) {
        if let Some(lookup) = self.next_zone_lookup() {
            spawn_zone_lookup(self.backend.clone(), lookup, self.events_tx.clone());
        }
    }

    fn start_save(&mut self) {
        match self.manager.begin_save() {
            Ok(ticket) => {
                log::info!("Saving zone settings: {:?}", ticket.config());
                let lookup = self.next_zone_lookup();
                spawn_save(self.backend.clone(), ticket, lookup, self.events_tx.clone());
            }
            Err(outcome) => log::debug!("Save not started: {outcome:?}"),
        }
    }

    /// Apply whatever the worker threads have reported since the last frame.
    fn poll_worker(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                WorkerEvent::Saved { ticket, result } => {
                    match self.manager.finish_save(ticket, result) {
                        SaveOutcome::Success => self.toasts.success(SAVED_MESSAGE),
                        SaveOutcome::RemoteError if !self.manager.is_open() => {
                            self.toasts.error(validation::GENERIC_SAVE_ERROR)
                        }
                        _ => {}
                    }
                }
                WorkerEvent::Zone { request, .. } if request < self.zone_shown => {
                    log::debug!("Dropping zone lookup {request}, {} is newer", self.zone_shown);
                }
                WorkerEvent::Zone { request, result } => {
                    self.zone_shown = request;
                    let text = &mut self.zone_text;
                    report_zone(result, &mut |reading: &ZoneReading| {
                        *text = reading.display_text()
                    });
                }
            }
        }
    }

    fn set_average_hr(&mut self) {
        let trimmed = self.average_hr_input.trim();
        let value = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self.manager.set_average_hr(value.clone());
        self.settings.average_hr = value;
        self.settings_dirty = true;
    }

    fn dashboard_ui(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("title").show(ctx, |ui| {
            ui.heading("Heart Rate Zones");
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::Grid::new("summary_grid").num_columns(2).show(ui, |ui| {
                ui.label("Average heart rate");
                let resp = ui.text_edit_singleline(&mut self.average_hr_input);
                if resp.lost_focus()
                    && self.manager.average_hr().unwrap_or("") != self.average_hr_input.trim()
                {
                    self.set_average_hr();
                    self.request_zone();
                }
                ui.end_row();

                ui.label("Zone");
                ui.horizontal(|ui| {
                    ui.label(&self.zone_text);
                    if ui
                        .small_button("ⓘ")
                        .on_hover_text("Open Zone Settings")
                        .clicked()
                    {
                        self.manager.open_editing_surface();
                    }
                });
                ui.end_row();

                ui.label("Maximum heart rate");
                ui.label(match self.manager.committed().max_heart_rate.bpm() {
                    Some(bpm) => format!("{bpm} bpm"),
                    None => "-".to_string(),
                });
                ui.end_row();
            });

            ui.separator();
            egui::Grid::new("committed_zones").num_columns(2).show(ui, |ui| {
                for (index, label, zone) in self.manager.committed().zones.iter() {
                    ui.label(format!("Zone {index}: {label}"));
                    ui.label(format!(
                        "{} - {} %",
                        format_bound(zone.min),
                        format_bound(zone.max)
                    ));
                    ui.end_row();
                }
            });
        });
    }

    fn settings_window(&mut self, ctx: &egui::Context) {
        if !self.manager.is_open() {
            return;
        }
        if self.form.revision != Some(self.manager.revision()) {
            self.form.sync(self.manager.working(), self.manager.revision());
        }

        let mut open = true;
        let mut cancel = false;
        let mut save = false;
        let Self { manager, form, .. } = self;
        egui::Window::new("Zone Settings")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.label(egui::RichText::new("Edit your maximum heart rate or zones").strong());
                ui.label(
                    "Heart rate zones help track training intensity. They are calculated as a \
                     percentage of your maximum heart rate. Adjust them here if you know your zones.",
                );

                if !manager.validation_errors().is_empty() {
                    ui.add_space(4.0);
                    for msg in manager.validation_errors() {
                        ui.colored_label(egui::Color32::from_rgb(220, 38, 38), msg);
                    }
                }

                ui.add_space(8.0);
                ui.label("Maximum Heart Rate (bpm)");
                if ui.text_edit_singleline(&mut form.max_hr).changed() {
                    form.edit_max_hr(manager);
                }

                ui.add_space(8.0);
                egui::Grid::new("zone_grid").num_columns(2).show(ui, |ui| {
                    for index in 1..=ZONE_COUNT {
                        let label = ZoneSet::label(index).unwrap_or_default();
                        ui.label(format!("Zone {index}: {label}"));
                        ui.horizontal(|ui| {
                            for (bound, slot, sep) in [(Bound::Min, 0, "-"), (Bound::Max, 1, "%")] {
                                let text = &mut form.bounds[index - 1][slot];
                                let edit = egui::TextEdit::singleline(text).desired_width(48.0);
                                if ui.add(edit).changed() {
                                    form.edit_bound(manager, index, bound);
                                }
                                ui.label(sep);
                            }
                        });
                        ui.end_row();
                    }
                });

                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Cancel").clicked() {
                        cancel = true;
                    }
                    let saving = manager.is_saving();
                    if ui.add_enabled(!saving, egui::Button::new("Save")).clicked() {
                        save = true;
                    }
                    if saving {
                        ui.spinner();
                    }
                });
            });

        if cancel || !open {
            self.manager.close_editing_surface(CloseReason::Cancelled);
        } else if save {
            self.start_save();
        }
    }

    fn toast_area(&mut self, ctx: &egui::Context) {
        self.toasts.prune(Instant::now());
        if self.toasts.is_empty() {
            return;
        }
        let mut dismissed = None;
        egui::Area::new(egui::Id::new("toasts"))
            .anchor(egui::Align2::LEFT_BOTTOM, [10.0, -10.0])
            .show(ctx, |ui| {
                for (i, toast) in self.toasts.visible().iter().enumerate() {
                    egui::Frame::popup(ui.style()).show(ui, |ui| {
                        ui.horizontal(|ui| {
                            let color = match toast.kind {
                                ToastKind::Success => egui::Color32::from_rgb(34, 197, 94),
                                ToastKind::Error => egui::Color32::from_rgb(239, 68, 68),
                            };
                            ui.colored_label(color, &toast.message);
                            if ui.small_button("×").clicked() {
                                dismissed = Some(i);
                            }
                        });
                    });
                }
            });
        if let Some(i) = dismissed {
            self.toasts.dismiss(i);
        }
    }

    fn ui(&mut self, ctx: &egui::Context) {
        self.poll_worker();
        self.dashboard_ui(ctx);
        self.settings_window(ctx);
        self.toast_area(ctx);

        if self.manager.is_saving() || !self.toasts.is_empty() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
        if self.settings_dirty {
            if let Err(e) = self.settings.save() {
                log::error!("Failed to save dashboard settings: {e}");
            }
            self.settings_dirty = false;
        }
    }
}

impl<S: SettingsStore> App for DashboardApp<S> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.ui(ctx);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        if let Err(e) = self.settings.save() {
            log::error!("Failed to save dashboard settings: {e}");
        }
    }
}

fn run<S: SettingsStore + 'static>(store: S, settings: AppSettings) -> eframe::Result<()> {
    let http = HttpBackend::new(&settings.resolve_api_url());
    log::info!("Using settings server at {}", http.base_url());
    let backend: Arc<dyn SettingsBackend + Send + Sync> = Arc::new(http);
    eframe::run_native(
        "Heart Rate Zones",
        NativeOptions::default(),
        Box::new(move |_cc| Box::new(DashboardApp::new(store, backend, settings))),
    )
}

fn main() -> eframe::Result<()> {
    env_logger::init();
    let settings = AppSettings::load();
    match FileStore::in_config_dir() {
        Ok(store) => run(store, settings),
        Err(e) => {
            log::warn!("{e}; zone settings will not be cached");
            run(MemoryStore::new(), settings)
        }
    }
}
