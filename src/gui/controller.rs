use std::sync::mpsc::{self, Receiver, Sender};

use log::{debug, info, warn};

use crate::graph_utils::alignment::{self, SnapGuides};
use crate::graph_utils::connection::{ConnectionController, ConnectionState, EdgeRequest};
use crate::graph_utils::error::{EditorError, Result};
use crate::graph_utils::graph::{Edge, EdgeId, GraphSnapshot, GraphStore, Handle, Node, NodeId, Point};
use crate::graph_utils::history::{HistoryManager, DEFAULT_HISTORY_DEPTH};
use crate::graph_utils::registry::{NodeCategory, NodeKind, NodeKindSpec, PlanTier};

/// What the embedding application provides to the editor.
pub trait EditorHost {
    /// Explicit save. The editor never calls this on its own.
    fn on_save(&mut self, nodes: &[Node], edges: &[Edge]) -> anyhow::Result<()>;

    /// Fired once per batch of changes to the diagram data.
    fn on_unsaved_change(&mut self) {}

    /// A gated command was refused; the host should offer an upgrade.
    fn on_upgrade_prompt(&mut self, _reason: &EditorError) {}
}

#[derive(Clone, Debug, PartialEq)]
pub struct EditorConfig {
    pub plan_tier: PlanTier,
    pub history_depth: usize,
    /// Clamp dragged nodes onto guide lines instead of only drawing them.
    pub snap_to_guides: bool,
    pub presentation: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            plan_tier: PlanTier::Free,
            history_depth: DEFAULT_HISTORY_DEPTH,
            snap_to_guides: false,
            presentation: false,
        }
    }
}

/// Requests renderers send upward. Renderers never mutate anything directly.
#[derive(Clone, Debug, PartialEq)]
pub enum EditorIntent {
    NodeClicked(NodeId),
    EdgeClicked(EdgeId),
    PaneClicked,
    BeginConnect { node: NodeId, handle: Handle },
    BeginAutoConnect { node: NodeId },
    CompleteConnect { node: NodeId, handle: Handle },
    CompleteAutoConnect { node: NodeId },
    CancelConnect,
    SwapKind { node: NodeId, kind: NodeKind },
    BeginRename { node: NodeId },
    DeleteNode(NodeId),
    DeleteEdge(EdgeId),
    ToggleEdgeAnimated(EdgeId),
}

/// Cloneable handle renderers use to emit intents.
#[derive(Clone, Debug)]
pub struct IntentSender(Sender<EditorIntent>);

impl IntentSender {
    pub fn send(&self, intent: EditorIntent) {
        // The receiving end lives as long as the controller.
        let _ = self.0.send(intent);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    Node(NodeId),
    Edge(EdgeId),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Key {
    Z,
    Y,
    Delete,
    Backspace,
    Escape,
    Enter,
}

/// Host-neutral key press. `command` is Ctrl, or Cmd on macOS.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KeyChord {
    pub key: Key,
    pub command: bool,
    pub shift: bool,
}

impl KeyChord {
    pub const fn plain(key: Key) -> Self { KeyChord { key, command: false, shift: false } }
    pub const fn command(key: Key) -> Self { KeyChord { key, command: true, shift: false } }
    pub const fn command_shift(key: Key) -> Self { KeyChord { key, command: true, shift: true } }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShortcutAction {
    Undo,
    Redo,
    DeleteSelection,
    Cancel,
    CommitRename,
}

/// Everything a node renderer needs to draw one node.
#[derive(Clone, Debug)]
pub struct NodeView<'a> {
    pub node: &'a Node,
    pub category: NodeCategory,
    pub icon: &'a str,
    pub selected: bool,
    pub connect_source: bool,
    pub valid_target: bool,
    pub rename_draft: Option<&'a str>,
}

#[derive(Clone, Debug)]
pub struct EdgeView<'a> {
    pub edge: &'a Edge,
    pub selected: bool,
}

#[derive(Clone, Debug)]
pub struct PaletteEntry<'a> {
    pub kind: &'a NodeKind,
    pub spec: &'a NodeKindSpec,
    /// Pro kind under a plan that does not allow it.
    pub locked: bool,
}

#[derive(Clone, Debug)]
struct RenameSession {
    node: NodeId,
    draft: String,
}

/// Composition root: the only place that drives the store, the history and
/// the connection state machine.
pub struct GraphController<H: EditorHost> {
    store: GraphStore,
    history: HistoryManager,
    connection: ConnectionController,
    host: H,
    config: EditorConfig,
    project_id: Option<String>,
    selection: Option<Selection>,
    rename: Option<RenameSession>,
    dragging: Option<NodeId>,
    guides: SnapGuides,
    intents_tx: Sender<EditorIntent>,
    intents_rx: Receiver<EditorIntent>,
    unsaved: bool,
    batch_depth: u32,
    batch_dirty: bool,
}

impl<H: EditorHost> GraphController<H> {
    pub fn new(store: GraphStore, host: H, config: EditorConfig) -> Self {
        let (intents_tx, intents_rx) = mpsc::channel();
        Self {
            store,
            history: HistoryManager::with_capacity(config.history_depth),
            connection: ConnectionController::new(),
            host,
            config,
            project_id: None,
            selection: None,
            rename: None,
            dragging: None,
            guides: SnapGuides::default(),
            intents_tx,
            intents_rx,
            unsaved: false,
            batch_depth: 0,
            batch_dirty: false,
        }
    }

    pub fn store(&self) -> &GraphStore { &self.store }
    pub fn history(&self) -> &HistoryManager { &self.history }
    pub fn connection(&self) -> &ConnectionState { self.connection.state() }
    pub fn host(&self) -> &H { &self.host }
    pub fn host_mut(&mut self) -> &mut H { &mut self.host }
    pub fn config(&self) -> &EditorConfig { &self.config }
    pub fn selection(&self) -> Option<&Selection> { self.selection.as_ref() }
    pub fn guides(&self) -> SnapGuides { self.guides }
    pub fn dragging(&self) -> Option<&str> { self.dragging.as_deref() }
    pub fn project_id(&self) -> Option<&str> { self.project_id.as_deref() }
    pub fn is_presentation(&self) -> bool { self.config.presentation }
    pub fn has_unsaved_changes(&self) -> bool { self.unsaved }
    pub fn can_undo(&self) -> bool { self.history.can_undo() }
    pub fn can_redo(&self) -> bool { self.history.can_redo() }

    pub fn intent_sender(&self) -> IntentSender { IntentSender(self.intents_tx.clone()) }

    pub fn set_plan_tier(&mut self, tier: PlanTier) { self.config.plan_tier = tier; }

    pub fn set_snap_to_guides(&mut self, on: bool) { self.config.snap_to_guides = on; }

    /// Read-only mode. Entering it drops any pending connection or rename.
    pub fn set_presentation_mode(&mut self, on: bool) {
        if on {
            self.connection.cancel();
            self.rename = None;
            self.dragging = None;
            self.guides = SnapGuides::default();
        }
        self.config.presentation = on;
    }

    /// Load another project. History never crosses a project boundary.
    pub fn switch_project(&mut self, project_id: impl Into<String>, graph: GraphSnapshot) {
        let project_id = project_id.into();
        info!("switching to project {} ({} nodes, {} edges)", project_id, graph.nodes.len(), graph.edges.len());
        self.store.restore(graph);
        self.history.reset();
        self.connection.cancel();
        self.selection = None;
        self.rename = None;
        self.dragging = None;
        self.guides = SnapGuides::default();
        self.unsaved = false;
        self.batch_dirty = false;
        self.project_id = Some(project_id);
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.config.presentation { Err(EditorError::ReadOnly) } else { Ok(()) }
    }

    fn ensure_node(&self, id: &str) -> Result<()> {
        match self.store.node(id) {
            Some(_) => Ok(()),
            None => Err(EditorError::NodeNotFound(id.to_string())),
        }
    }

    fn mark_changed(&mut self) {
        self.unsaved = true;
        self.batch_dirty = true;
        if self.batch_depth == 0 {
            self.flush_changes();
        }
    }

    fn flush_changes(&mut self) {
        if self.batch_dirty {
            self.batch_dirty = false;
            self.host.on_unsaved_change();
        }
    }

    /// Run a structural mutation. The pre-mutation graph is recorded in
    /// history only when the mutation succeeds.
    fn structural<T>(&mut self, f: impl FnOnce(&mut GraphStore) -> Result<T>) -> Result<T> {
        self.ensure_editable()?;
        let before = self.store.snapshot();
        let out = f(&mut self.store)?;
        self.history.snapshot(&before);
        self.mark_changed();
        Ok(out)
    }

    fn prompt_if_gated<T>(&mut self, res: Result<T>) -> Result<T> {
        if let Err(e) = &res {
            if e.wants_upgrade() {
                self.host.on_upgrade_prompt(e);
            }
        }
        res
    }

    pub fn add_node(&mut self, position: Point, kind: NodeKind) -> Result<NodeId> {
        let tier = self.config.plan_tier;
        self.structural(|s| s.add_node(position, kind, tier))
    }

    /// Palette drop at world coordinates. The new node becomes the selection.
    pub fn drop_from_palette(&mut self, kind: NodeKind, position: Point) -> Result<NodeId> {
        let res = self.add_node(position, kind);
        let id = self.prompt_if_gated(res)?;
        self.selection = Some(Selection::Node(id.clone()));
        Ok(id)
    }

    pub fn delete_node(&mut self, id: &str) -> Result<bool> {
        self.ensure_editable()?;
        if self.store.node(id).is_none() {
            return Ok(false);
        }
        self.structural(|s| Ok(s.remove_node(id)))?;
        if self.connection.source() == Some(id) {
            self.connection.cancel();
        }
        if self.rename.as_ref().is_some_and(|r| r.node == id) {
            self.rename = None;
        }
        self.prune_selection();
        Ok(true)
    }

    pub fn delete_edge(&mut self, id: &str) -> Result<bool> {
        self.ensure_editable()?;
        if self.store.edge(id).is_none() {
            return Ok(false);
        }
        self.structural(|s| Ok(s.remove_edge(id)))?;
        self.prune_selection();
        Ok(true)
    }

    pub fn swap_node_kind(&mut self, id: &str, kind: NodeKind) -> Result<()> {
        let tier = self.config.plan_tier;
        let res = self.structural(|s| s.swap_node_kind(id, kind, tier));
        self.prompt_if_gated(res)?;
        if self.rename.as_ref().is_some_and(|r| r.node == id) {
            self.rename = None;
        }
        Ok(())
    }

    /// Direct edge creation, bypassing connect-mode.
    pub fn connect(
        &mut self,
        source: &str,
        target: &str,
        source_handle: Option<Handle>,
        target_handle: Option<Handle>,
    ) -> Result<EdgeId> {
        self.structural(|s| s.add_edge(source, target, source_handle, target_handle))
    }

    fn execute(&mut self, req: EdgeRequest) -> Result<Option<EdgeId>> {
        self.connect(&req.source, &req.target, req.source_handle, req.target_handle).map(Some)
    }

    pub fn begin_connect(&mut self, node: &str, handle: Handle) -> Result<()> {
        self.ensure_editable()?;
        self.ensure_node(node)?;
        self.connection.begin_from_handle(node, handle);
        Ok(())
    }

    pub fn begin_auto_connect(&mut self, node: &str) -> Result<()> {
        self.ensure_editable()?;
        self.ensure_node(node)?;
        self.connection.begin_auto(node);
        Ok(())
    }

    /// Drop a wire on `handle` of `node`. `None` when nothing was created.
    pub fn complete_connect(&mut self, node: &str, handle: Handle) -> Result<Option<EdgeId>> {
        self.ensure_editable()?;
        match self.connection.complete_on_handle(node, handle) {
            Some(req) => self.execute(req),
            None => Ok(None),
        }
    }

    pub fn complete_auto_connect(&mut self, node: &str) -> Result<Option<EdgeId>> {
        self.ensure_editable()?;
        match self.connection.complete_auto(node) {
            Some(req) => self.execute(req),
            None => Ok(None),
        }
    }

    pub fn cancel_connect(&mut self) -> bool { self.connection.cancel() }

    pub fn is_valid_target(&self, node: &str) -> bool { self.connection.is_valid_target(node) }

    /// Click on a node body: finishes a pending click-to-connect, selects otherwise.
    pub fn node_clicked(&mut self, id: &str) -> Result<Option<EdgeId>> {
        if !self.connection.is_idle() {
            return self.complete_auto_connect(id);
        }
        self.ensure_node(id)?;
        self.selection = Some(Selection::Node(id.to_string()));
        Ok(None)
    }

    pub fn edge_clicked(&mut self, id: &str) {
        if self.store.edge(id).is_some() {
            self.selection = Some(Selection::Edge(id.to_string()));
        }
    }

    /// Click on empty canvas: cancels connect-mode, commits a rename, deselects.
    pub fn pane_clicked(&mut self) {
        if self.connection.cancel() {
            debug!("pending connection cancelled by pane click");
        }
        if let Err(e) = self.commit_rename() {
            debug!("rename reverted: {}", e);
        }
        self.selection = None;
    }

    pub fn clear_selection(&mut self) { self.selection = None; }

    fn prune_selection(&mut self) {
        let stale = match &self.selection {
            Some(Selection::Node(id)) => self.store.node(id).is_none(),
            Some(Selection::Edge(id)) => self.store.edge(id).is_none(),
            None => false,
        };
        if stale {
            self.selection = None;
        }
    }

    pub fn delete_selection(&mut self) -> Result<bool> {
        match self.selection.clone() {
            Some(Selection::Node(id)) => self.delete_node(&id),
            Some(Selection::Edge(id)) => self.delete_edge(&id),
            None => Ok(false),
        }
    }

    fn after_history_jump(&mut self) {
        self.connection.cancel();
        self.rename = None;
        self.dragging = None;
        self.guides = SnapGuides::default();
        self.prune_selection();
        self.mark_changed();
    }

    pub fn undo(&mut self) -> Result<()> {
        self.ensure_editable()?;
        let prev = self.history.undo(self.store.graph())?;
        info!("undo ({} left)", self.history.past_len());
        self.store.restore(prev);
        self.after_history_jump();
        Ok(())
    }

    pub fn redo(&mut self) -> Result<()> {
        self.ensure_editable()?;
        let next = self.history.redo(self.store.graph())?;
        info!("redo ({} left)", self.history.future_len());
        self.store.restore(next);
        self.after_history_jump();
        Ok(())
    }

    /// Map a key press to an editor action. Returns what was performed.
    pub fn handle_key(&mut self, chord: KeyChord) -> Option<ShortcutAction> {
        let action = match (chord.key, chord.command, chord.shift) {
            (Key::Z, true, false) => ShortcutAction::Undo,
            (Key::Z, true, true) | (Key::Y, true, _) => ShortcutAction::Redo,
            (Key::Delete | Key::Backspace, false, _) => ShortcutAction::DeleteSelection,
            (Key::Escape, _, _) => ShortcutAction::Cancel,
            (Key::Enter, false, _) => ShortcutAction::CommitRename,
            _ => return None,
        };
        let performed = match action {
            ShortcutAction::Undo => self.undo().is_ok(),
            ShortcutAction::Redo => self.redo().is_ok(),
            // The text field owns Delete/Backspace while a label is being edited.
            ShortcutAction::DeleteSelection => {
                self.rename.is_none() && self.delete_selection().unwrap_or(false)
            }
            ShortcutAction::Cancel => {
                let had_rename = self.rename.take().is_some();
                self.connection.cancel() || had_rename
            }
            ShortcutAction::CommitRename => {
                self.rename.is_some() && self.commit_rename().is_ok()
            }
        };
        performed.then_some(action)
    }

    pub fn begin_rename(&mut self, id: &str) -> Result<()> {
        self.ensure_editable()?;
        let node = self.store.node(id).ok_or_else(|| EditorError::NodeNotFound(id.to_string()))?;
        self.rename = Some(RenameSession { node: node.id.clone(), draft: node.label.clone() });
        Ok(())
    }

    /// Keystrokes of an in-progress rename. Nothing reaches the store yet.
    pub fn set_rename_draft(&mut self, text: impl Into<String>) {
        if let Some(r) = self.rename.as_mut() {
            r.draft = text.into();
        }
    }

    pub fn rename_target(&self) -> Option<&str> { self.rename.as_ref().map(|r| r.node.as_str()) }

    pub fn rename_draft(&self) -> Option<&str> { self.rename.as_ref().map(|r| r.draft.as_str()) }

    /// Blur or Enter. A blank draft reverts to the stored label and reports
    /// `EmptyLabel`; neither outcome records history.
    pub fn commit_rename(&mut self) -> Result<()> {
        let Some(session) = self.rename.take() else {
            return Ok(());
        };
        let unchanged = self.store.node(&session.node).is_some_and(|n| n.label == session.draft.trim());
        if unchanged {
            return Ok(());
        }
        self.store.update_node_label(&session.node, &session.draft)?;
        self.mark_changed();
        Ok(())
    }

    pub fn cancel_rename(&mut self) -> bool { self.rename.take().is_some() }

    /// Live drag event. Returns the guide lines to draw for this position.
    pub fn drag_node(&mut self, id: &str, proposed: Point) -> Result<SnapGuides> {
        self.ensure_editable()?;
        let others = self.store.nodes().iter().map(|n| (n.id.as_str(), n.position));
        let guides = alignment::drag_snap(id, proposed, others);
        let position = if self.config.snap_to_guides {
            alignment::clamp_to_guides(proposed, guides)
        } else {
            proposed
        };
        self.store.move_node(id, position)?;
        self.dragging = Some(id.to_string());
        self.guides = guides;
        Ok(guides)
    }

    pub fn end_drag(&mut self) {
        if self.dragging.take().is_some() {
            self.guides = SnapGuides::default();
            self.mark_changed();
        }
    }

    pub fn set_node_attribute(&mut self, id: &str, key: impl Into<String>, value: serde_json::Value) -> Result<()> {
        self.ensure_editable()?;
        self.store.upsert_node_attribute(id, key.into(), value)?;
        self.mark_changed();
        Ok(())
    }

    pub fn remove_node_attribute(&mut self, id: &str, key: &str) -> Result<bool> {
        self.ensure_editable()?;
        let removed = self.store.remove_node_attribute(id, key)?;
        if removed {
            self.mark_changed();
        }
        Ok(removed)
    }

    pub fn set_edge_animated(&mut self, id: &str, animated: bool) -> Result<bool> {
        self.ensure_editable()?;
        let found = self.store.set_edge_animated(id, animated);
        if found {
            self.mark_changed();
        }
        Ok(found)
    }

    /// Explicit save through the host callback.
    pub fn save(&mut self) -> anyhow::Result<()> {
        self.host.on_save(self.store.nodes(), self.store.edges())?;
        info!("saved {} nodes, {} edges", self.store.node_count(), self.store.edge_count());
        self.unsaved = false;
        Ok(())
    }

    /// Apply one intent. Direct callers get their own notification batch.
    pub fn dispatch(&mut self, intent: EditorIntent) -> Result<()> {
        match intent {
            EditorIntent::NodeClicked(id) => self.node_clicked(&id).map(drop),
            EditorIntent::EdgeClicked(id) => {
                self.edge_clicked(&id);
                Ok(())
            }
            EditorIntent::PaneClicked => {
                self.pane_clicked();
                Ok(())
            }
            EditorIntent::BeginConnect { node, handle } => self.begin_connect(&node, handle),
            EditorIntent::BeginAutoConnect { node } => self.begin_auto_connect(&node),
            EditorIntent::CompleteConnect { node, handle } => self.complete_connect(&node, handle).map(drop),
            EditorIntent::CompleteAutoConnect { node } => self.complete_auto_connect(&node).map(drop),
            EditorIntent::CancelConnect => {
                self.cancel_connect();
                Ok(())
            }
            EditorIntent::SwapKind { node, kind } => self.swap_node_kind(&node, kind),
            EditorIntent::BeginRename { node } => self.begin_rename(&node),
            EditorIntent::DeleteNode(id) => self.delete_node(&id).map(drop),
            EditorIntent::DeleteEdge(id) => self.delete_edge(&id).map(drop),
            EditorIntent::ToggleEdgeAnimated(id) => {
                let animated = self.store.edge(&id).map(|e| !e.animated).unwrap_or(false);
                self.set_edge_animated(&id, animated).map(drop)
            }
        }
    }

    /// Drain every queued intent as one batch; the host hears about
    /// unsaved changes at most once. Returns the refused intents' errors.
    pub fn process_intents(&mut self) -> Vec<EditorError> {
        let mut errors = Vec::new();
        self.batch_depth += 1;
        while let Ok(intent) = self.intents_rx.try_recv() {
            if let Err(e) = self.dispatch(intent.clone()) {
                warn!("intent {:?} refused: {}", intent, e);
                errors.push(e);
            }
        }
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.flush_changes();
        }
        errors
    }

    pub fn node_views(&self) -> Vec<NodeView<'_>> {
        let registry = self.store.registry();
        self.store
            .nodes()
            .iter()
            .map(|node| {
                let (category, icon) = match registry.get(&node.kind) {
                    Some(spec) => (spec.category, spec.icon.as_str()),
                    None => (NodeCategory::Page, ""),
                };
                let rename_draft = self.rename.as_ref().filter(|r| r.node == node.id).map(|r| r.draft.as_str());
                NodeView {
                    node,
                    category,
                    icon,
                    selected: matches!(&self.selection, Some(Selection::Node(id)) if *id == node.id),
                    connect_source: self.connection.source() == Some(node.id.as_str()),
                    valid_target: self.connection.is_valid_target(&node.id),
                    rename_draft,
                }
            })
            .collect()
    }

    pub fn edge_views(&self) -> Vec<EdgeView<'_>> {
        self.store
            .edges()
            .iter()
            .map(|edge| EdgeView {
                edge,
                selected: matches!(&self.selection, Some(Selection::Edge(id)) if *id == edge.id),
            })
            .collect()
    }

    pub fn palette(&self) -> Vec<PaletteEntry<'_>> {
        let limits = self.store.limits(self.config.plan_tier);
        self.store
            .registry()
            .iter()
            .map(|(kind, spec)| PaletteEntry { kind, spec, locked: spec.is_pro && !limits.allows_pro_kinds })
            .collect()
    }

    /// Nodes left before the plan's ceiling; `None` when unbounded.
    pub fn remaining_capacity(&self) -> Option<usize> {
        self.store
            .limits(self.config.plan_tier)
            .max_nodes
            .map(|max| max.saturating_sub(self.store.node_count()))
    }
}
