use eframe::egui;
use log::warn;

use flow_loom::gui::frontend::FlowApp;
use flow_loom::persistence::persist;
use flow_loom::persistence::settings::AppSettings;

fn main() -> eframe::Result {
    env_logger::init();

    let settings = AppSettings::load().unwrap_or_else(|e| {
        warn!("settings unreadable, using defaults: {}", e);
        AppSettings::default()
    });
    // Reopen the most recently saved project, if any
    let last_project = match persist::list_projects(&settings.projects_dir()) {
        Ok(mut list) if !list.is_empty() => Some(list.swap_remove(0)),
        Ok(_) => None,
        Err(e) => {
            warn!("could not scan projects: {}", e);
            None
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1300.0, 710.0])
            // Provide sensible bounds so the UI stays usable on small screens
            .with_min_inner_size([700.0, 420.0])
            .with_resizable(true),
        ..Default::default()
    };
    eframe::run_native(
        "Flow-Loom",
        options,
        Box::new(move |_cc| {
            let app = match last_project {
                Some(project) => FlowApp::from_project(settings, project),
                None => FlowApp::new(settings),
            };
            Ok(Box::new(app) as Box<dyn eframe::App>)
        }),
    )
}
