//! Desktop utility that downloads the audio tracks of a playlist through yt-dlp

// Worker-to-UI progress bridge and cancellation
mod bridge;
// External download engine (yt-dlp) and its option bundle
mod engine;
// Crate-wide error type
mod error;
// Status list and log data
mod model;
// Engine output parsing
mod progress;
// settings.json persistence
mod settings;
// UI-side application state
mod state;

use std::sync::Arc;

// eframe/egui for GUI application framework
use eframe::{App, Frame, egui};
use egui::{Color32, Visuals};
// FileDialog for folder selection dialogs
use rfd::FileDialog;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::YtDlpEngine;
use error::AppError;
use model::LogLevel;
use settings::{AudioFormat, SETTINGS_FILE, Settings, SettingsStore};
use state::{AppState, NoticeKind};

/// Program entry point: initializes logging and the runtime, then launches the GUI
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // The runtime outlives the window; workers are spawned through its handle
    let runtime = Runtime::new()?;
    let handle = runtime.handle().clone();
    let engine = Arc::new(YtDlpEngine::from_env());
    let store = SettingsStore::new(SETTINGS_FILE);
    info!(engine = %engine.binary().display(), settings = %store.path().display(), "starting");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([800.0, 600.0]),
        ..Default::default()
    };
    eframe::run_native(
        "YT Audio Downloader",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(Visuals::dark());
            let state = AppState::new(engine, store, handle, Some(cc.egui_ctx.clone()));
            Box::new(DownloaderApp::new(state))
        }),
    )?;
    Ok(())
}

/// Window state on top of [`AppState`]
struct DownloaderApp {
    state: AppState<YtDlpEngine>,
    /// Whether the settings window is shown
    settings_open: bool,
    /// Edited copy of the settings, committed on Save
    draft: Settings,
}

impl DownloaderApp {
    fn new(state: AppState<YtDlpEngine>) -> Self {
        let draft = state.settings.clone();
        Self {
            state,
            settings_open: false,
            draft,
        }
    }

    fn inputs(&mut self, ui: &mut egui::Ui) {
        ui.group(|ui| {
            ui.label("Playlist URL");
            ui.horizontal(|ui| {
                ui.text_edit_singleline(&mut self.state.url);
                if ui.button("Paste").clicked() {
                    self.state.paste_url(read_clipboard());
                }
            });
        });

        ui.group(|ui| {
            ui.label("Output Location");
            ui.horizontal(|ui| {
                ui.text_edit_singleline(&mut self.state.output_dir);
                if ui.button("Browse").clicked() {
                    let current = self.state.output_dir.trim().to_string();
                    let mut dialog = FileDialog::new();
                    if !current.is_empty() {
                        dialog = dialog.set_directory(&current);
                    }
                    self.state.choose_directory(dialog.pick_folder());
                }
            });
        });
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui
                .add_enabled(self.state.can_start(), egui::Button::new("Start Download"))
                .clicked()
            {
                // Rejections are surfaced by the state as a notice or a log warning
                let _ = self.state.start();
            }
            if ui
                .add_enabled(self.state.can_stop(), egui::Button::new("Stop"))
                .clicked()
            {
                self.state.stop();
            }
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("⚙").clicked() {
                    self.draft = self.state.settings.clone();
                    self.settings_open = true;
                }
            });
        });
    }

    fn status_list(&self, ui: &mut egui::Ui) {
        ui.heading("Download Progress");
        egui::ScrollArea::vertical()
            .id_source("status_list")
            .auto_shrink([false; 2])
            .max_height(ui.available_height() * 0.5)
            .show(ui, |ui| {
                egui::Grid::new("status_grid")
                    .striped(true)
                    .num_columns(3)
                    .show(ui, |ui| {
                        ui.strong("Title");
                        ui.strong("Status");
                        ui.strong("Progress");
                        ui.end_row();
                        for item in self.state.items() {
                            ui.label(&item.title);
                            ui.label(item.status.label());
                            ui.label(item.percent_label());
                            ui.end_row();
                        }
                    });
            });
        ui.add(egui::ProgressBar::new(self.state.overall_progress()).show_percentage());
    }

    fn log_pane(&self, ui: &mut egui::Ui) {
        ui.heading("Log");
        egui::ScrollArea::vertical()
            .id_source("log_pane")
            .auto_shrink([false; 2])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for entry in self.state.log() {
                    match entry.level {
                        LogLevel::Info => ui.label(&entry.message),
                        LogLevel::Warning => ui.colored_label(Color32::from_rgb(255, 165, 0), &entry.message),
                        LogLevel::Success => ui.colored_label(Color32::LIGHT_GREEN, &entry.message),
                        LogLevel::Error => ui.colored_label(Color32::RED, &entry.message),
                    };
                }
            });
    }

    fn settings_window(&mut self, ctx: &egui::Context) {
        let mut open = self.settings_open;
        let mut save = false;
        egui::Window::new("Settings")
            .collapsible(false)
            .resizable(false)
            .open(&mut open)
            .show(ctx, |ui| {
                egui::Grid::new("settings_grid").num_columns(2).show(ui, |ui| {
                    ui.label("Max Concurrent Downloads:");
                    ui.add(egui::DragValue::new(&mut self.draft.concurrency).clamp_range(1..=10));
                    ui.end_row();

                    ui.label("Download Format:");
                    egui::ComboBox::from_id_source("format")
                        .selected_text(self.draft.format.as_str())
                        .show_ui(ui, |ui| {
                            for format in AudioFormat::ALL {
                                ui.selectable_value(&mut self.draft.format, format, format.as_str());
                            }
                        });
                    ui.end_row();

                    ui.label("Max Retries:");
                    ui.add(egui::DragValue::new(&mut self.draft.retries).clamp_range(0..=10));
                    ui.end_row();
                });
                save = ui.button("Save").clicked();
            });
        if save {
            self.state.save_settings(self.draft.clone());
        }
        self.settings_open = open;
    }

    fn notice_window(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.state.notice().cloned() else {
            return;
        };
        let mut dismissed = false;
        egui::Window::new(notice.title.as_str())
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                match notice.kind {
                    NoticeKind::Info => ui.label(&notice.message),
                    NoticeKind::Error => ui.colored_label(Color32::RED, &notice.message),
                };
                dismissed = ui.button("OK").clicked();
            });
        if dismissed {
            self.state.dismiss_notice();
        }
    }
}

/// GUI update loop: called each frame to apply worker events and redraw
impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.state.pump_events();

        let blocked = self.state.notice().is_some();
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_enabled_ui(!blocked, |ui| {
                self.inputs(ui);
                self.controls(ui);
                ui.separator();
                self.status_list(ui);
                ui.separator();
                self.log_pane(ui);
            });
        });

        if self.settings_open {
            self.settings_window(ctx);
        }
        self.notice_window(ctx);

        if self.state.can_stop() {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }
}

fn read_clipboard() -> Result<String, AppError> {
    arboard::Clipboard::new()
        .and_then(|mut clipboard| clipboard.get_text())
        .map_err(|err| AppError::Clipboard(err.to_string()))
}
