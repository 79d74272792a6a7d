use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use eframe::egui::{self, Color32, Pos2, Rect, Sense, Stroke, Vec2};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::graph_utils::alignment::{self, NodeBox};
use crate::graph_utils::connection::ConnectionState;
use crate::graph_utils::error::EditorError;
use crate::graph_utils::graph::{Edge, GraphSnapshot, GraphStore, Handle, Node, NodeId, Point};
use crate::graph_utils::ids::UuidIds;
use crate::graph_utils::registry::{DefaultPlans, NodeCategory, NodeKind, NodeKindRegistry, PlanTier};
use crate::gui::controller::{
    EditorHost, EditorIntent, GraphController, IntentSender, Key, KeyChord, Selection,
    ShortcutAction,
};
use crate::gui::render::{self, RendererSet};
use crate::persistence::persist::{self, ProjectFile};
use crate::persistence::settings::AppSettings;

// Style for toast notifications
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum NoticeStyle {
    Subtle,
    Prominent,
}

/// The desktop app's side of the editor contract: saves go to RON project
/// files, upgrade prompts become a modal.
pub struct DesktopHost {
    projects_dir: PathBuf,
    project_id: Uuid,
    project_name: String,
    last_saved: Option<PathBuf>,
    upgrade_prompt: Option<String>,
}

impl DesktopHost {
    pub fn new(projects_dir: PathBuf, project_id: Uuid, project_name: impl Into<String>) -> Self {
        Self {
            projects_dir,
            project_id,
            project_name: project_name.into(),
            last_saved: None,
            upgrade_prompt: None,
        }
    }
}

impl EditorHost for DesktopHost {
    fn on_save(&mut self, nodes: &[Node], edges: &[Edge]) -> anyhow::Result<()> {
        let project = ProjectFile::from_parts(self.project_id, &self.project_name, nodes, edges);
        let path = persist::save_project(&self.projects_dir, &project)?;
        self.last_saved = Some(path);
        Ok(())
    }

    fn on_unsaved_change(&mut self) {
        debug!("project {} has unsaved changes", self.project_id);
    }

    fn on_upgrade_prompt(&mut self, reason: &EditorError) {
        self.upgrade_prompt = Some(reason.to_string());
    }
}

// A wire being dragged out of a handle
struct WireDrag {
    node: NodeId,
    handle: Handle,
}

// Unclamped drag position, accumulated from pointer deltas
struct NodeDrag {
    node: NodeId,
    raw: Point,
}

// Geometry of one node for the current frame
struct Placed {
    id: NodeId,
    world: NodeBox,
    screen: Rect,
    handles: &'static [Handle],
}

pub struct FlowApp {
    controller: GraphController<DesktopHost>,
    intents: IntentSender,
    renderers: RendererSet,
    settings: AppSettings,
    pan: Vec2,
    zoom: f32,
    node_drag: Option<NodeDrag>,
    wire: Option<WireDrag>,
    rename_focus_pending: bool,
    notice: Option<(String, Instant, NoticeStyle)>,
    error: Option<String>,
    show_open_window: bool,
    project_list: Vec<ProjectFile>,
    last_title: String,
}

impl FlowApp {
    fn build(settings: AppSettings, project: ProjectFile) -> Self {
        let store = GraphStore::new(NodeKindRegistry::builtin(), DefaultPlans, UuidIds);
        let host = DesktopHost::new(settings.projects_dir(), project.project_id, project.name.clone());
        let mut controller = GraphController::new(store, host, settings.editor_config());
        controller.switch_project(project.project_id.to_string(), project.graph);
        let intents = controller.intent_sender();
        Self {
            controller,
            intents,
            renderers: RendererSet::default(),
            settings,
            pan: Vec2::new(40.0, 40.0),
            zoom: 1.0,
            node_drag: None,
            wire: None,
            rename_focus_pending: false,
            notice: None,
            error: None,
            show_open_window: false,
            project_list: Vec::new(),
            last_title: String::new(),
        }
    }

    pub fn new(settings: AppSettings) -> Self {
        Self::build(settings, ProjectFile::new(Uuid::now_v7(), "Untitled funnel", GraphSnapshot::new()))
    }

    pub fn from_project(settings: AppSettings, project: ProjectFile) -> Self {
        Self::build(settings, project)
    }

    fn notify(&mut self, msg: impl Into<String>, style: NoticeStyle) {
        self.notice = Some((msg.into(), Instant::now(), style));
    }

    fn show_error(&mut self, e: &EditorError) {
        // Gated commands are answered by the upgrade modal instead
        if !e.wants_upgrade() {
            self.error = Some(e.to_string());
        }
    }

    fn save_now(&mut self) {
        match self.controller.save() {
            Ok(()) => {
                self.error = None;
                let where_to = self
                    .controller
                    .host()
                    .last_saved
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                self.notify(format!("Saved to {}", where_to), NoticeStyle::Prominent);
            }
            Err(e) => self.error = Some(format!("Save failed: {}", e)),
        }
    }

    fn current_project(&self) -> ProjectFile {
        let host = self.controller.host();
        ProjectFile::from_parts(
            host.project_id,
            &host.project_name,
            self.controller.store().nodes(),
            self.controller.store().edges(),
        )
    }

    fn save_version(&mut self) {
        let project = self.current_project();
        match persist::save_versioned(&self.controller.host().projects_dir, &project) {
            Ok(path) => self.notify(format!("Version saved to {}", path.display()), NoticeStyle::Prominent),
            Err(e) => self.error = Some(format!("Save version failed: {}", e)),
        }
    }

    // Keep a backup before leaving a project with unsaved edits
    fn backup_if_dirty(&mut self) {
        if !self.controller.has_unsaved_changes() {
            return;
        }
        let project = self.current_project();
        let host = self.controller.host();
        match persist::save_versioned(&host.projects_dir, &project) {
            Ok(path) => info!("backed up unsaved project to {}", path.display()),
            Err(e) => warn!("backup before switching project failed: {}", e),
        }
    }

    fn switch_to(&mut self, project: ProjectFile) {
        self.backup_if_dirty();
        let host = self.controller.host_mut();
        host.project_id = project.project_id;
        host.project_name = project.name.clone();
        host.last_saved = None;
        self.controller.switch_project(project.project_id.to_string(), project.graph);
        self.controller.set_presentation_mode(self.settings.presentation_on_open);
        self.node_drag = None;
        self.wire = None;
        self.pan = Vec2::new(40.0, 40.0);
        self.zoom = 1.0;
        self.notify(format!("Opened {}", project.name), NoticeStyle::Subtle);
    }

    pub fn menu_new_project(&mut self) {
        self.switch_to(ProjectFile::new(Uuid::now_v7(), "Untitled funnel", GraphSnapshot::new()));
    }

    pub fn menu_open_project(&mut self) {
        match persist::list_projects(&self.settings.projects_dir()) {
            Ok(list) => {
                self.project_list = list;
                self.show_open_window = true;
            }
            Err(e) => self.error = Some(format!("Could not list projects: {}", e)),
        }
    }

    fn set_plan(&mut self, tier: PlanTier) {
        self.controller.set_plan_tier(tier);
        self.settings.plan_tier = tier;
        self.persist_settings();
    }

    fn persist_settings(&mut self) {
        if let Err(e) = self.settings.save() {
            self.error = Some(format!("Settings not saved: {}", e));
        }
    }

    fn shortcut(&mut self, chord: KeyChord) {
        let action = self.controller.handle_key(chord);
        // A history jump can remove the node or handle under the pointer
        if matches!(action, Some(ShortcutAction::Undo | ShortcutAction::Redo | ShortcutAction::DeleteSelection)) {
            self.node_drag = None;
            self.wire = None;
        }
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        use egui::{KeyboardShortcut, Modifiers};
        let save = KeyboardShortcut::new(Modifiers::COMMAND, egui::Key::S);
        let redo_shift = KeyboardShortcut::new(Modifiers::COMMAND | Modifiers::SHIFT, egui::Key::Z);
        let undo = KeyboardShortcut::new(Modifiers::COMMAND, egui::Key::Z);
        let redo_y = KeyboardShortcut::new(Modifiers::COMMAND, egui::Key::Y);

        if ctx.input_mut(|i| i.consume_shortcut(&save)) {
            self.save_now();
        }
        // A focused text field keeps its own editing keys
        if !ctx.wants_keyboard_input() {
            // Shift variant first: the plain chord would also match it
            if ctx.input_mut(|i| i.consume_shortcut(&redo_shift)) {
                self.shortcut(KeyChord::command_shift(Key::Z));
            } else if ctx.input_mut(|i| i.consume_shortcut(&undo)) {
                self.shortcut(KeyChord::command(Key::Z));
            }
            if ctx.input_mut(|i| i.consume_shortcut(&redo_y)) {
                self.shortcut(KeyChord::command(Key::Y));
            }
            if ctx.input(|i| i.key_pressed(egui::Key::Delete)) {
                self.shortcut(KeyChord::plain(Key::Delete));
            }
            if ctx.input(|i| i.key_pressed(egui::Key::Backspace)) {
                self.shortcut(KeyChord::plain(Key::Backspace));
            }
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.shortcut(KeyChord::plain(Key::Escape));
            self.wire = None;
        }
    }

    fn top_bar(&mut self, ctx: &egui::Context) {
        use egui::{KeyboardShortcut, Modifiers};
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Flow-Loom");

                ui.menu_button("File", |ui| {
                    if ui.add(egui::Button::new("Save").shortcut_text(ctx.format_shortcut(&KeyboardShortcut::new(Modifiers::COMMAND, egui::Key::S)))).clicked() {
                        self.save_now();
                        ui.close();
                    }
                    if ui.button("Save Version").clicked() {
                        self.save_version();
                        ui.close();
                    }
                    if ui.button("Open Project…").clicked() {
                        self.menu_open_project();
                        ui.close();
                    }
                    if ui.button("New Project").clicked() {
                        self.menu_new_project();
                        ui.close();
                    }
                    ui.separator();
                    if ui.button("Quit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                        ui.close();
                    }
                });

                ui.menu_button("Edit", |ui| {
                    let editable = !self.controller.is_presentation();
                    let undo_btn = egui::Button::new("Undo").shortcut_text(ctx.format_shortcut(&KeyboardShortcut::new(Modifiers::COMMAND, egui::Key::Z)));
                    if ui.add_enabled(editable && self.controller.can_undo(), undo_btn).clicked() {
                        self.shortcut(KeyChord::command(Key::Z));
                        ui.close();
                    }
                    let redo_btn = egui::Button::new("Redo").shortcut_text(ctx.format_shortcut(&KeyboardShortcut::new(Modifiers::COMMAND | Modifiers::SHIFT, egui::Key::Z)));
                    if ui.add_enabled(editable && self.controller.can_redo(), redo_btn).clicked() {
                        self.shortcut(KeyChord::command_shift(Key::Z));
                        ui.close();
                    }
                    ui.separator();
                    let has_sel = self.controller.selection().is_some();
                    if ui.add_enabled(editable && has_sel, egui::Button::new("Delete Selection")).clicked() {
                        self.shortcut(KeyChord::plain(Key::Delete));
                        ui.close();
                    }
                    if let Some(Selection::Edge(id)) = self.controller.selection() {
                        let animated = self.controller.store().edge(id).is_some_and(|e| e.animated);
                        let text = if animated { "Stop Animating Connection" } else { "Animate Connection" };
                        if ui.add_enabled(editable, egui::Button::new(text)).clicked() {
                            self.intents.send(EditorIntent::ToggleEdgeAnimated(id.clone()));
                            ui.close();
                        }
                    }
                });

                ui.menu_button("View", |ui| {
                    let mut presentation = self.controller.is_presentation();
                    if ui.checkbox(&mut presentation, "Presentation mode").changed() {
                        self.controller.set_presentation_mode(presentation);
                        self.wire = None;
                        self.node_drag = None;
                    }
                    let mut snap = self.settings.snap_to_guides;
                    if ui.checkbox(&mut snap, "Snap to alignment guides").changed() {
                        self.controller.set_snap_to_guides(snap);
                        self.settings.snap_to_guides = snap;
                        self.persist_settings();
                    }
                    ui.separator();
                    if ui.button("Reset View").clicked() {
                        self.pan = Vec2::new(40.0, 40.0);
                        self.zoom = 1.0;
                        ui.close();
                    }
                });

                ui.menu_button("Plan", |ui| {
                    let mut tier = self.controller.config().plan_tier;
                    ui.radio_value(&mut tier, PlanTier::Free, "Free");
                    ui.radio_value(&mut tier, PlanTier::Pro, "Pro");
                    ui.radio_value(&mut tier, PlanTier::Agency, "Agency");
                    if tier != self.controller.config().plan_tier {
                        self.set_plan(tier);
                    }
                });

                let store = self.controller.store();
                let capacity = match self.controller.remaining_capacity() {
                    Some(left) => format!(" ({} left)", left),
                    None => String::new(),
                };
                ui.small(format!("N:{}{} E:{}", store.node_count(), capacity, store.edge_count()));
                if self.controller.has_unsaved_changes() {
                    ui.small("● unsaved");
                }
                if let Some(err) = &self.error {
                    ui.separator();
                    ui.colored_label(Color32::RED, err);
                }
                if let Some((msg, at, style)) = &self.notice {
                    let ttl = match style { NoticeStyle::Subtle => 2, NoticeStyle::Prominent => 4 };
                    if at.elapsed() < Duration::from_secs(ttl) {
                        ui.separator();
                        let color = match style {
                            NoticeStyle::Subtle => Color32::GRAY,
                            NoticeStyle::Prominent => Color32::from_rgb(120, 220, 120),
                        };
                        ui.colored_label(color, msg);
                        ctx.request_repaint_after(Duration::from_millis(250));
                    }
                }
            });
        });
    }

    fn palette_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::left("palette").resizable(false).default_width(180.0).show(ctx, |ui| {
            ui.heading("Palette");
            if self.controller.is_presentation() {
                ui.small("Presentation mode: editing disabled");
            }
            ui.separator();
            let editable = !self.controller.is_presentation();
            let groups = [
                (NodeCategory::Page, "Pages"),
                (NodeCategory::Icon, "Traffic & actions"),
                (NodeCategory::Diamond, "Logic"),
                (NodeCategory::Note, "Annotations"),
            ];
            let palette = self.controller.palette();
            for (category, title) in groups {
                ui.label(egui::RichText::new(title).strong());
                for entry in palette.iter().filter(|e| e.spec.category == category) {
                    let text = if entry.locked {
                        format!("🔒 {}", entry.spec.display_label)
                    } else {
                        entry.spec.display_label.clone()
                    };
                    if editable {
                        let id = egui::Id::new(("palette", entry.kind.as_str()));
                        ui.dnd_drag_source(id, entry.kind.clone(), |ui| {
                            ui.label(text);
                        });
                    } else {
                        ui.weak(text);
                    }
                }
                ui.add_space(6.0);
            }
        });
    }

    fn canvas(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let available = ui.available_rect_before_wrap();
            let bg_resp = ui.allocate_rect(available, Sense::click_and_drag());
            let painter = ui.painter_at(available);
            let presentation = self.controller.is_presentation();

            // Zoom with scroll, keeping the point under the cursor fixed
            if bg_resp.hovered() {
                let scroll = ui.input(|i| i.raw_scroll_delta.y);
                if scroll != 0.0 {
                    let factor = (1.0 + scroll * 0.001).clamp(0.9, 1.1);
                    let new_zoom = (self.zoom * factor).clamp(0.25, 2.0);
                    if let Some(p) = ui.ctx().pointer_hover_pos() {
                        let rel = p - available.min - self.pan;
                        self.pan += rel - rel * (new_zoom / self.zoom);
                    }
                    self.zoom = new_zoom;
                }
            }

            // Helpers to transform between world and screen space
            let origin = available.min.to_vec2();
            let (pan, zoom) = (self.pan, self.zoom);
            let to_screen = move |p: Point| -> Pos2 { Pos2::new(p.x * zoom + pan.x + origin.x, p.y * zoom + pan.y + origin.y) };
            let from_screen = move |p: Pos2| -> Point { Point::new((p.x - origin.x - pan.x) / zoom, (p.y - origin.y - pan.y) / zoom) };

            // Palette drop
            if let Some(kind) = bg_resp.dnd_release_payload::<NodeKind>() {
                if let Some(pointer) = ui.input(|i| i.pointer.interact_pos()) {
                    let kind: NodeKind = (*kind).clone();
                    let category = self.controller.store().registry().get(&kind).map(|s| s.category).unwrap_or(NodeCategory::Page);
                    let size = self.renderers.for_category(category).size();
                    let at = from_screen(pointer);
                    let at = Point::new(at.x - size.x / 2.0, at.y - size.y / 2.0);
                    if let Err(e) = self.controller.drop_from_palette(kind, at) {
                        self.show_error(&e);
                    }
                }
            }

            let placed: Vec<Placed> = self
                .controller
                .node_views()
                .iter()
                .map(|view| {
                    let renderer = self.renderers.for_category(view.category);
                    let world = render::node_box(renderer, view.node.position);
                    let far = Point::new(world.origin.x + world.width, world.origin.y + world.height);
                    Placed {
                        id: view.node.id.clone(),
                        world,
                        screen: Rect::from_min_max(to_screen(world.origin), to_screen(far)),
                        handles: renderer.handles(),
                    }
                })
                .collect();
            let pointer = ui.ctx().pointer_hover_pos();

            // Edges under nodes
            let mut edge_hit: Option<String> = None;
            {
                let boxes: HashMap<&str, &NodeBox> = placed.iter().map(|p| (p.id.as_str(), &p.world)).collect();
                for ev in self.controller.edge_views() {
                    let (Some(sb), Some(tb)) = (boxes.get(ev.edge.source.as_str()), boxes.get(ev.edge.target.as_str())) else {
                        continue;
                    };
                    let (s, t) = alignment::edge_endpoints(sb, ev.edge.source_handle, tb, ev.edge.target_handle);
                    let (a, b) = (to_screen(s), to_screen(t));
                    self.renderers.edge().paint(&painter, a, b, &ev, zoom);
                    if let Some(p) = pointer {
                        if point_segment_distance(p, a, b) <= 6.0 {
                            edge_hit = Some(ev.edge.id.clone());
                        }
                    }
                }
            }

            let mut clicked_node = false;
            let mut drag_update: Option<(NodeId, Point)> = None;
            let mut drag_end = false;
            let mut rename_update: Option<String> = None;
            let mut rename_done: Option<bool> = None;
            {
                let views = self.controller.node_views();
                let pending = !matches!(self.controller.connection(), ConnectionState::Idle);
                let palette = self.controller.palette();
                for (view, place) in views.iter().zip(placed.iter()) {
                    let renderer = self.renderers.for_category(view.category);
                    let resp = ui.allocate_rect(place.screen, Sense::click_and_drag());
                    renderer.paint(&painter, place.screen, view, zoom);

                    if !presentation {
                        if resp.drag_started() {
                            self.node_drag = Some(NodeDrag { node: place.id.clone(), raw: view.node.position });
                        }
                        if resp.dragged() {
                            if let Some(d) = self.node_drag.as_mut().filter(|d| d.node == place.id) {
                                let delta = resp.drag_delta() / zoom;
                                d.raw = Point::new(d.raw.x + delta.x, d.raw.y + delta.y);
                                drag_update = Some((d.node.clone(), d.raw));
                            }
                        }
                        if resp.drag_stopped() {
                            drag_end = true;
                        }
                    }
                    if resp.double_clicked() && !presentation {
                        self.intents.send(EditorIntent::BeginRename { node: place.id.clone() });
                        self.rename_focus_pending = true;
                    } else if resp.clicked() {
                        self.intents.send(EditorIntent::NodeClicked(place.id.clone()));
                        clicked_node = true;
                    }

                    if !presentation {
                        resp.context_menu(|ui| {
                            if ui.button("Rename").clicked() {
                                self.intents.send(EditorIntent::BeginRename { node: place.id.clone() });
                                self.rename_focus_pending = true;
                                ui.close();
                            }
                            if !place.handles.is_empty() && ui.button("Connect to…").clicked() {
                                self.intents.send(EditorIntent::BeginAutoConnect { node: place.id.clone() });
                                ui.close();
                            }
                            ui.menu_button("Change type", |ui| {
                                for entry in palette.iter().filter(|e| *e.kind != view.node.kind) {
                                    let text = if entry.locked {
                                        format!("🔒 {}", entry.spec.display_label)
                                    } else {
                                        entry.spec.display_label.clone()
                                    };
                                    if ui.button(text).clicked() {
                                        self.intents.send(EditorIntent::SwapKind { node: place.id.clone(), kind: entry.kind.clone() });
                                        ui.close();
                                    }
                                }
                            });
                            ui.separator();
                            if ui.button(egui::RichText::new("Delete").color(Color32::RED)).clicked() {
                                self.intents.send(EditorIntent::DeleteNode(place.id.clone()));
                                ui.close();
                            }
                        });
                    }

                    // Inline rename field over the label
                    if let Some(draft) = view.rename_draft {
                        let field = Rect::from_center_size(
                            place.screen.center_bottom() + Vec2::new(0.0, 14.0),
                            Vec2::new(place.screen.width().max(120.0), 22.0),
                        );
                        let mut text = draft.to_string();
                        let r = ui.put(field, egui::TextEdit::singleline(&mut text));
                        if self.rename_focus_pending {
                            r.request_focus();
                            self.rename_focus_pending = false;
                        }
                        if r.changed() {
                            rename_update = Some(text.clone());
                        }
                        if r.lost_focus() {
                            rename_update = Some(text);
                            rename_done = Some(!ui.input(|i| i.key_pressed(egui::Key::Escape)));
                        }
                    }

                    // Handles: shown on hover, on selection, and while wiring
                    let near = pointer.is_some_and(|p| place.screen.expand(12.0).contains(p));
                    let show_handles = !presentation && (near || view.selected || view.valid_target || self.wire.is_some());
                    if show_handles {
                        for &h in place.handles {
                            let anchor = to_screen(place.world.anchor(h));
                            let hrect = Rect::from_center_size(anchor, Vec2::splat(12.0));
                            let hresp = ui.allocate_rect(hrect, Sense::click_and_drag());
                            let fill = if hresp.hovered() { Color32::from_rgb(255, 170, 60) } else { Color32::WHITE };
                            painter.circle_filled(anchor, 4.0, fill);
                            painter.circle_stroke(anchor, 4.0, Stroke::new(1.0, Color32::DARK_GRAY));
                            if hresp.drag_started() {
                                self.intents.send(EditorIntent::BeginConnect { node: place.id.clone(), handle: h });
                                self.wire = Some(WireDrag { node: place.id.clone(), handle: h });
                            } else if hresp.clicked() && view.valid_target {
                                self.intents.send(EditorIntent::CompleteConnect { node: place.id.clone(), handle: h });
                            }
                        }
                    }

                    // Click-to-connect affordance on the selected node
                    if view.selected && !pending && !presentation && !place.handles.is_empty() {
                        let brect = Rect::from_center_size(place.screen.right_top() + Vec2::new(10.0, -10.0), Vec2::splat(16.0));
                        let bresp = ui.allocate_rect(brect, Sense::click());
                        painter.circle_filled(brect.center(), 8.0, Color32::from_rgb(80, 120, 255));
                        painter.text(brect.center(), egui::Align2::CENTER_CENTER, "+", egui::FontId::proportional(14.0), Color32::WHITE);
                        if bresp.on_hover_text("Connect to another node").clicked() {
                            self.intents.send(EditorIntent::BeginAutoConnect { node: place.id.clone() });
                        }
                    }
                }
            }

            // Wire follows the pointer until released over a node or the pane
            if let Some(wire) = &self.wire {
                let from = placed.iter().find(|p| p.id == wire.node).map(|p| to_screen(p.world.anchor(wire.handle)));
                if let (Some(from), Some(p)) = (from, ui.ctx().pointer_latest_pos()) {
                    painter.line_segment([from, p], Stroke::new(1.5, Color32::from_rgb(255, 170, 60)));
                }
                if ui.input(|i| i.pointer.any_released()) {
                    let released_on = ui.ctx().pointer_latest_pos().and_then(|p| {
                        placed
                            .iter()
                            .find(|pl| pl.id != wire.node && !pl.handles.is_empty() && pl.screen.contains(p))
                            .map(|pl| (pl.id.clone(), pl.world.nearest_handle(from_screen(p))))
                    });
                    match released_on {
                        Some((node, handle)) => self.intents.send(EditorIntent::CompleteConnect { node, handle }),
                        None => self.intents.send(EditorIntent::CancelConnect),
                    }
                    self.wire = None;
                }
            }

            if let Some((id, raw)) = drag_update {
                if let Err(e) = self.controller.drag_node(&id, raw) {
                    self.show_error(&e);
                }
            }
            if drag_end {
                self.controller.end_drag();
                self.node_drag = None;
            }
            if let Some(text) = rename_update {
                self.controller.set_rename_draft(text);
            }
            match rename_done {
                Some(true) => {
                    if let Err(e) = self.controller.commit_rename() {
                        self.show_error(&e);
                    }
                }
                Some(false) => {
                    self.controller.cancel_rename();
                }
                None => {}
            }

            // Alignment guides for the node being dragged
            let guides = self.controller.guides();
            let guide_stroke = Stroke::new(1.0, Color32::from_rgb(255, 80, 160));
            if let Some(x) = guides.vertical {
                let sx = to_screen(Point::new(x, 0.0)).x;
                painter.line_segment([Pos2::new(sx, available.top()), Pos2::new(sx, available.bottom())], guide_stroke);
            }
            if let Some(y) = guides.horizontal {
                let sy = to_screen(Point::new(0.0, y)).y;
                painter.line_segment([Pos2::new(available.left(), sy), Pos2::new(available.right(), sy)], guide_stroke);
            }

            if !matches!(self.controller.connection(), ConnectionState::Idle) {
                painter.text(
                    available.center_top() + Vec2::new(0.0, 12.0),
                    egui::Align2::CENTER_TOP,
                    "Pick a node to connect to · Esc to cancel",
                    egui::FontId::proportional(14.0),
                    Color32::from_rgb(255, 170, 60),
                );
            }

            if bg_resp.clicked() && !clicked_node {
                match edge_hit {
                    Some(id) => self.intents.send(EditorIntent::EdgeClicked(id)),
                    None => self.intents.send(EditorIntent::PaneClicked),
                }
            }

            // Background panning when nothing else owns the drag
            if self.node_drag.is_none() && self.wire.is_none() {
                let delta = bg_resp.drag_delta();
                if delta != Vec2::ZERO {
                    self.pan += delta;
                }
            }
        });
    }

    fn apply_intents(&mut self) {
        let errors = self.controller.process_intents();
        if let Some(e) = errors.last() {
            self.show_error(e);
        }
    }

    fn upgrade_window(&mut self, ctx: &egui::Context) {
        let Some(msg) = self.controller.host().upgrade_prompt.clone() else {
            return;
        };
        let tier = self.controller.config().plan_tier;
        let mut open = true;
        let mut upgrade_to: Option<PlanTier> = None;
        egui::Window::new("Upgrade your plan")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.label(msg);
                ui.small(format!("Current plan: {:?}", tier));
                ui.separator();
                ui.horizontal(|ui| {
                    if tier == PlanTier::Free && ui.button("Upgrade to Pro").clicked() {
                        upgrade_to = Some(PlanTier::Pro);
                    }
                    if tier != PlanTier::Agency && ui.button("Upgrade to Agency").clicked() {
                        upgrade_to = Some(PlanTier::Agency);
                    }
                });
            });
        if let Some(t) = upgrade_to {
            self.set_plan(t);
            open = false;
        }
        if !open {
            self.controller.host_mut().upgrade_prompt = None;
        }
    }

    fn open_project_window(&mut self, ctx: &egui::Context) {
        if !self.show_open_window {
            return;
        }
        let mut open = true;
        let mut chosen: Option<usize> = None;
        egui::Window::new("Open Project")
            .open(&mut open)
            .resizable(true)
            .collapsible(false)
            .show(ctx, |ui| {
                if self.project_list.is_empty() {
                    ui.label("No saved projects yet.");
                }
                for (i, p) in self.project_list.iter().enumerate() {
                    let text = format!("{}  ({} nodes, {} edges)", p.name, p.graph.nodes.len(), p.graph.edges.len());
                    if ui.button(text).clicked() {
                        chosen = Some(i);
                    }
                }
            });
        if let Some(i) = chosen {
            let project = self.project_list.swap_remove(i);
            self.switch_to(project);
            open = false;
        }
        if !open {
            self.show_open_window = false;
            self.project_list.clear();
        }
    }

    fn sync_title(&mut self, ctx: &egui::Context) {
        let dirty = if self.controller.has_unsaved_changes() { " *" } else { "" };
        let title = format!("Flow-Loom - {}{}", self.controller.host().project_name, dirty);
        if title != self.last_title {
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(title.clone()));
            self.last_title = title;
        }
    }
}

impl eframe::App for FlowApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_shortcuts(ctx);
        self.top_bar(ctx);
        self.palette_panel(ctx);
        self.canvas(ctx);
        self.apply_intents();
        self.upgrade_window(ctx);
        self.open_project_window(ctx);
        self.sync_title(ctx);
    }
}

// Geometry helper: distance from point P to segment AB in screen space
fn point_segment_distance(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ap = Vec2::new(p.x - a.x, p.y - a.y);
    let ab = Vec2::new(b.x - a.x, b.y - a.y);
    let ab_len2 = ab.x * ab.x + ab.y * ab.y;
    if ab_len2 <= f32::EPSILON {
        return ((p.x - a.x).powi(2) + (p.y - a.y).powi(2)).sqrt();
    }
    let t = ((ap.x * ab.x + ap.y * ab.y) / ab_len2).clamp(0.0, 1.0);
    let proj = Pos2::new(a.x + ab.x * t, a.y + ab.y * t);
    ((p.x - proj.x).powi(2) + (p.y - proj.y).powi(2)).sqrt()
}
