use flow_loom::graph_utils::connection::ConnectionState;
use flow_loom::graph_utils::error::EditorError;
use flow_loom::graph_utils::graph::{Edge, GraphSnapshot, GraphStore, Handle, Node, Point};
use flow_loom::graph_utils::ids::SequentialIds;
use flow_loom::graph_utils::registry::{DefaultPlans, NodeKind, NodeKindRegistry, PlanTier};
use flow_loom::gui::controller::{
    EditorConfig, EditorHost, EditorIntent, GraphController, Key, KeyChord, Selection, ShortcutAction,
};

#[derive(Default)]
struct RecordingHost {
    saves: Vec<(usize, usize)>,
    unsaved_changes: usize,
    upgrade_prompts: Vec<EditorError>,
    fail_save: bool,
}

impl EditorHost for RecordingHost {
    fn on_save(&mut self, nodes: &[Node], edges: &[Edge]) -> anyhow::Result<()> {
        if self.fail_save {
            anyhow::bail!("disk full");
        }
        self.saves.push((nodes.len(), edges.len()));
        Ok(())
    }

    fn on_unsaved_change(&mut self) {
        self.unsaved_changes += 1;
    }

    fn on_upgrade_prompt(&mut self, reason: &EditorError) {
        self.upgrade_prompts.push(reason.clone());
    }
}

fn new_controller() -> GraphController<RecordingHost> {
    new_controller_with(EditorConfig::default())
}

fn new_controller_with(config: EditorConfig) -> GraphController<RecordingHost> {
    let store = GraphStore::new(NodeKindRegistry::builtin(), DefaultPlans, SequentialIds::new());
    GraphController::new(store, RecordingHost::default(), config)
}

fn kind(k: &str) -> NodeKind {
    NodeKind::new(k)
}

#[test]
fn controller_connect_undo_redo_walkthrough() {
    let mut ctl = new_controller();
    let empty = ctl.store().snapshot();
    let a = ctl.add_node(Point::new(0.0, 0.0), kind("opt_in_page")).unwrap();
    let after_a = ctl.store().snapshot();
    let b = ctl.add_node(Point::new(200.0, 0.0), kind("sales_page")).unwrap();

    ctl.begin_connect(&a, Handle::Right).unwrap();
    assert!(ctl.is_valid_target(&b));
    let e = ctl.complete_connect(&b, Handle::Left).unwrap().expect("edge created");
    let edge = ctl.store().edge(&e).unwrap();
    assert_eq!((edge.source_handle, edge.target_handle), (Some(Handle::Right), Some(Handle::Left)));
    assert_eq!(ctl.connection(), &ConnectionState::Idle);
    let full = ctl.store().snapshot();

    ctl.undo().unwrap();
    assert_eq!(ctl.store().edge_count(), 0);
    assert_eq!(ctl.store().node_count(), 2);
    ctl.undo().unwrap();
    assert!(ctl.store().node(&b).is_none());
    assert_eq!(ctl.store().graph(), &after_a);

    ctl.redo().unwrap();
    assert!(ctl.store().node(&b).is_some());
    ctl.redo().unwrap();
    assert_eq!(ctl.store().graph(), &full);
    assert_eq!(ctl.redo(), Err(EditorError::NoOpRedo));

    // Undoing every step lands on the graph before the first mutation
    while ctl.can_undo() {
        ctl.undo().unwrap();
    }
    assert_eq!(ctl.store().graph(), &empty);
    while ctl.can_redo() {
        ctl.redo().unwrap();
    }
    assert_eq!(ctl.store().graph(), &full);
}

#[test]
fn controller_undo_mid_drag_ends_the_drag() {
    let mut ctl = new_controller();
    ctl.add_node(Point::new(0.0, 0.0), kind("opt_in_page")).unwrap();
    let b = ctl.add_node(Point::new(200.0, 3.0), kind("sales_page")).unwrap();
    let guides = ctl.drag_node(&b, Point::new(120.0, 1.0)).unwrap();
    assert_eq!(guides.horizontal, Some(0.0));
    assert_eq!(ctl.dragging(), Some(b.as_str()));

    assert_eq!(ctl.handle_key(KeyChord::command(Key::Z)), Some(ShortcutAction::Undo));
    assert!(ctl.store().node(&b).is_none());
    assert_eq!(ctl.dragging(), None);
    assert!(ctl.guides().is_empty());
    assert_eq!(ctl.drag_node(&b, Point::new(130.0, 1.0)), Err(EditorError::NodeNotFound(b.clone())));
}

#[test]
fn controller_failed_commands_leave_history_alone() {
    let mut ctl = new_controller();
    let a = ctl.add_node(Point::new(0.0, 0.0), kind("opt_in_page")).unwrap();
    assert_eq!(ctl.history().past_len(), 1);

    assert!(matches!(ctl.connect(&a, &a, None, None), Err(EditorError::SelfLoop { .. })));
    assert!(matches!(ctl.add_node(Point::new(0.0, 0.0), kind("ab_split")), Err(EditorError::PlanRestricted { .. })));
    assert_eq!(ctl.delete_node("ghost"), Ok(false));
    assert_eq!(ctl.delete_edge("ghost"), Ok(false));
    assert_eq!(ctl.history().past_len(), 1);
}

#[test]
fn controller_gated_palette_drop_prompts_upgrade() {
    let mut ctl = new_controller();
    let err = ctl.drop_from_palette(kind("ab_split"), Point::new(0.0, 0.0)).unwrap_err();
    assert!(err.wants_upgrade());
    assert_eq!(ctl.host().upgrade_prompts, vec![err]);
    assert_eq!(ctl.store().node_count(), 0);
    assert!(!ctl.can_undo());

    for i in 0..20 {
        ctl.add_node(Point::new(i as f32 * 10.0, 0.0), kind("email")).unwrap();
    }
    assert_eq!(ctl.remaining_capacity(), Some(0));
    let err = ctl.drop_from_palette(kind("email"), Point::new(0.0, 500.0)).unwrap_err();
    assert_eq!(err, EditorError::CapacityExceeded { limit: 20 });
    assert_eq!(ctl.host().upgrade_prompts.len(), 2);

    ctl.set_plan_tier(PlanTier::Agency);
    assert_eq!(ctl.remaining_capacity(), None);
    let id = ctl.drop_from_palette(kind("ab_split"), Point::new(0.0, 500.0)).unwrap();
    assert_eq!(ctl.selection(), Some(&Selection::Node(id)));
}

#[test]
fn controller_swap_to_pro_kind_prompts_upgrade() {
    let mut ctl = new_controller();
    let a = ctl.add_node(Point::new(0.0, 0.0), kind("decision")).unwrap();
    let err = ctl.swap_node_kind(&a, kind("ab_split")).unwrap_err();
    assert!(matches!(err, EditorError::PlanRestricted { .. }));
    assert_eq!(ctl.host().upgrade_prompts.len(), 1);
    assert_eq!(ctl.history().past_len(), 1);

    ctl.swap_node_kind(&a, kind("sales_page")).unwrap();
    assert_eq!(ctl.store().node(&a).unwrap().label, "Sales Page");
    ctl.undo().unwrap();
    assert_eq!(ctl.store().node(&a).unwrap().kind, kind("decision"));
}

#[test]
fn controller_click_to_connect_flow() {
    let mut ctl = new_controller();
    let a = ctl.add_node(Point::new(0.0, 0.0), kind("facebook_ads")).unwrap();
    let b = ctl.add_node(Point::new(200.0, 0.0), kind("opt_in_page")).unwrap();

    ctl.begin_auto_connect(&a).unwrap();
    // Clicking the source itself ends the attempt without an edge
    assert_eq!(ctl.node_clicked(&a), Ok(None));
    assert_eq!(ctl.connection(), &ConnectionState::Idle);

    ctl.begin_auto_connect(&a).unwrap();
    let e = ctl.node_clicked(&b).unwrap().expect("edge");
    let edge = ctl.store().edge(&e).unwrap();
    assert_eq!((edge.source_handle, edge.target_handle), (None, None));

    // With nothing pending a click selects
    assert_eq!(ctl.node_clicked(&b), Ok(None));
    assert_eq!(ctl.selection(), Some(&Selection::Node(b.clone())));

    ctl.begin_auto_connect(&a).unwrap();
    ctl.pane_clicked();
    assert_eq!(ctl.connection(), &ConnectionState::Idle);
    assert_eq!(ctl.selection(), None);
    assert_eq!(ctl.begin_auto_connect("ghost"), Err(EditorError::NodeNotFound("ghost".into())));
}

#[test]
fn controller_delete_node_clears_dependent_state() {
    let mut ctl = new_controller();
    let a = ctl.add_node(Point::new(0.0, 0.0), kind("opt_in_page")).unwrap();
    let b = ctl.add_node(Point::new(200.0, 0.0), kind("sales_page")).unwrap();
    ctl.connect(&a, &b, None, None).unwrap();
    ctl.node_clicked(&a).unwrap();
    ctl.begin_connect(&a, Handle::Right).unwrap();

    assert_eq!(ctl.delete_node(&a), Ok(true));
    assert_eq!(ctl.store().edge_count(), 0);
    assert_eq!(ctl.selection(), None);
    assert_eq!(ctl.connection(), &ConnectionState::Idle);
}

#[test]
fn controller_keyboard_shortcuts() {
    let mut ctl = new_controller();
    assert_eq!(ctl.handle_key(KeyChord::command(Key::Z)), None);

    let a = ctl.drop_from_palette(kind("email"), Point::new(0.0, 0.0)).unwrap();
    assert_eq!(ctl.handle_key(KeyChord::command(Key::Z)), Some(ShortcutAction::Undo));
    assert_eq!(ctl.store().node_count(), 0);
    assert_eq!(ctl.handle_key(KeyChord::command_shift(Key::Z)), Some(ShortcutAction::Redo));
    assert_eq!(ctl.store().node_count(), 1);
    ctl.handle_key(KeyChord::command(Key::Z));
    assert_eq!(ctl.handle_key(KeyChord::command(Key::Y)), Some(ShortcutAction::Redo));

    ctl.node_clicked(&a).unwrap();
    ctl.begin_rename(&a).unwrap();
    // The rename field owns Delete
    assert_eq!(ctl.handle_key(KeyChord::plain(Key::Delete)), None);
    assert_eq!(ctl.handle_key(KeyChord::plain(Key::Escape)), Some(ShortcutAction::Cancel));
    assert_eq!(ctl.rename_target(), None);

    assert_eq!(ctl.handle_key(KeyChord::plain(Key::Backspace)), Some(ShortcutAction::DeleteSelection));
    assert_eq!(ctl.store().node_count(), 0);
    assert_eq!(ctl.handle_key(KeyChord::plain(Key::Escape)), None);
    assert_eq!(ctl.handle_key(KeyChord::plain(Key::Z)), None);
}

#[test]
fn controller_rename_commits_trimmed_or_reverts() {
    let mut ctl = new_controller();
    let a = ctl.add_node(Point::new(0.0, 0.0), kind("opt_in_page")).unwrap();
    ctl.host_mut().unsaved_changes = 0;

    ctl.begin_rename(&a).unwrap();
    assert_eq!(ctl.rename_draft(), Some("Opt-in Page"));
    ctl.set_rename_draft("   ");
    assert_eq!(ctl.commit_rename(), Err(EditorError::EmptyLabel));
    assert_eq!(ctl.store().node(&a).unwrap().label, "Opt-in Page");
    assert_eq!(ctl.rename_target(), None);
    assert_eq!(ctl.host().unsaved_changes, 0);

    ctl.begin_rename(&a).unwrap();
    ctl.set_rename_draft("  Lead magnet ");
    assert_eq!(ctl.handle_key(KeyChord::plain(Key::Enter)), Some(ShortcutAction::CommitRename));
    assert_eq!(ctl.store().node(&a).unwrap().label, "Lead magnet");
    assert_eq!(ctl.history().past_len(), 1, "renames are not undoable steps");
    assert_eq!(ctl.host().unsaved_changes, 1);
}

#[test]
fn controller_presentation_mode_is_read_only() {
    let mut ctl = new_controller();
    let a = ctl.add_node(Point::new(0.0, 0.0), kind("opt_in_page")).unwrap();
    ctl.begin_auto_connect(&a).unwrap();
    ctl.begin_rename(&a).unwrap();

    ctl.set_presentation_mode(true);
    assert!(ctl.is_presentation());
    assert_eq!(ctl.connection(), &ConnectionState::Idle);
    assert_eq!(ctl.rename_target(), None);

    assert_eq!(ctl.add_node(Point::new(0.0, 0.0), kind("email")), Err(EditorError::ReadOnly));
    assert_eq!(ctl.undo(), Err(EditorError::ReadOnly));
    assert_eq!(ctl.begin_connect(&a, Handle::Right), Err(EditorError::ReadOnly));
    assert_eq!(ctl.drag_node(&a, Point::new(5.0, 5.0)), Err(EditorError::ReadOnly));
    assert_eq!(ctl.delete_node(&a), Err(EditorError::ReadOnly));
    assert_eq!(ctl.handle_key(KeyChord::command(Key::Z)), None);
    assert_eq!(ctl.store().node_count(), 1);

    // Selection still works for walking through a diagram
    ctl.node_clicked(&a).unwrap();
    assert_eq!(ctl.selection(), Some(&Selection::Node(a)));

    ctl.set_presentation_mode(false);
    assert!(ctl.undo().is_ok());
}

#[test]
fn controller_intent_batch_notifies_once() {
    let mut ctl = new_controller();
    let a = ctl.add_node(Point::new(0.0, 0.0), kind("facebook_ads")).unwrap();
    let b = ctl.add_node(Point::new(200.0, 0.0), kind("opt_in_page")).unwrap();
    let c = ctl.add_node(Point::new(400.0, 0.0), kind("sales_page")).unwrap();
    assert_eq!(ctl.host().unsaved_changes, 3);
    ctl.host_mut().unsaved_changes = 0;

    let tx = ctl.intent_sender();
    tx.send(EditorIntent::BeginConnect { node: a.clone(), handle: Handle::Right });
    tx.send(EditorIntent::CompleteConnect { node: b.clone(), handle: Handle::Left });
    tx.send(EditorIntent::BeginAutoConnect { node: b.clone() });
    tx.send(EditorIntent::CompleteAutoConnect { node: c.clone() });
    let errors = ctl.process_intents();

    assert!(errors.is_empty());
    assert_eq!(ctl.store().edge_count(), 2);
    assert_eq!(ctl.host().unsaved_changes, 1);
    assert_eq!(ctl.history().past_len(), 5);

    // Nothing queued: no notification
    assert!(ctl.process_intents().is_empty());
    assert_eq!(ctl.host().unsaved_changes, 1);
}

#[test]
fn controller_intent_errors_are_collected() {
    let mut ctl = new_controller();
    let a = ctl.add_node(Point::new(0.0, 0.0), kind("opt_in_page")).unwrap();
    let tx = ctl.intent_sender();
    tx.send(EditorIntent::BeginConnect { node: "ghost".into(), handle: Handle::Top });
    tx.send(EditorIntent::SwapKind { node: a.clone(), kind: kind("webinar_page") });
    tx.send(EditorIntent::BeginRename { node: a.clone() });

    let errors = ctl.process_intents();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0], EditorError::NodeNotFound("ghost".into()));
    assert!(matches!(errors[1], EditorError::PlanRestricted { .. }));
    assert_eq!(ctl.rename_target(), Some(a.as_str()));
}

#[test]
fn controller_edge_selection_and_animation() {
    let mut ctl = new_controller();
    let a = ctl.add_node(Point::new(0.0, 0.0), kind("email")).unwrap();
    let b = ctl.add_node(Point::new(200.0, 0.0), kind("purchase")).unwrap();
    let e = ctl.connect(&a, &b, None, None).unwrap();

    ctl.dispatch(EditorIntent::ToggleEdgeAnimated(e.clone())).unwrap();
    assert!(ctl.store().edge(&e).unwrap().animated);
    assert_eq!(ctl.history().past_len(), 3);

    ctl.edge_clicked(&e);
    assert_eq!(ctl.selection(), Some(&Selection::Edge(e.clone())));
    assert_eq!(ctl.delete_selection(), Ok(true));
    assert_eq!(ctl.store().edge_count(), 0);
    assert_eq!(ctl.selection(), None);
    assert!(ctl.edge_views().is_empty());
}

#[test]
fn controller_drag_reports_guides_and_optionally_clamps() {
    let mut ctl = new_controller();
    let a = ctl.add_node(Point::new(0.0, 0.0), kind("opt_in_page")).unwrap();
    ctl.add_node(Point::new(200.0, 103.0), kind("sales_page")).unwrap();
    ctl.host_mut().unsaved_changes = 0;

    let guides = ctl.drag_node(&a, Point::new(198.0, 50.0)).unwrap();
    assert_eq!(guides.vertical, Some(200.0));
    assert_eq!(guides.horizontal, None);
    assert_eq!(ctl.store().node(&a).unwrap().position, Point::new(198.0, 50.0));
    ctl.end_drag();
    assert!(ctl.guides().is_empty());
    assert_eq!(ctl.host().unsaved_changes, 1);
    assert_eq!(ctl.history().past_len(), 2, "moves are not undoable steps");

    ctl.set_snap_to_guides(true);
    ctl.drag_node(&a, Point::new(198.0, 50.0)).unwrap();
    assert_eq!(ctl.store().node(&a).unwrap().position, Point::new(200.0, 50.0));
}

#[test]
fn controller_save_goes_through_host() {
    let mut ctl = new_controller();
    let a = ctl.add_node(Point::new(0.0, 0.0), kind("email")).unwrap();
    let b = ctl.add_node(Point::new(200.0, 0.0), kind("purchase")).unwrap();
    ctl.connect(&a, &b, None, None).unwrap();
    assert!(ctl.has_unsaved_changes());

    ctl.host_mut().fail_save = true;
    assert!(ctl.save().is_err());
    assert!(ctl.has_unsaved_changes());

    ctl.host_mut().fail_save = false;
    ctl.save().unwrap();
    assert_eq!(ctl.host().saves, vec![(2, 1)]);
    assert!(!ctl.has_unsaved_changes());
}

#[test]
fn controller_switch_project_resets_history() {
    let mut ctl = new_controller();
    ctl.add_node(Point::new(0.0, 0.0), kind("email")).unwrap();
    assert!(ctl.can_undo());

    let mut other = GraphSnapshot::new();
    other.nodes.push(Node {
        id: "node_7".into(),
        position: Point::new(10.0, 10.0),
        kind: kind("note"),
        label: "Kickoff".into(),
        attributes: Default::default(),
    });
    ctl.switch_project("p2", other);
    assert_eq!(ctl.project_id(), Some("p2"));
    assert!(!ctl.can_undo());
    assert!(!ctl.can_redo());
    assert!(!ctl.has_unsaved_changes());
    assert_eq!(ctl.store().node_count(), 1);

    let id = ctl.add_node(Point::new(0.0, 0.0), kind("email")).unwrap();
    assert_eq!(id, "node_8");
}

#[test]
fn controller_views_reflect_state() {
    let mut ctl = new_controller_with(EditorConfig { plan_tier: PlanTier::Free, ..Default::default() });
    let a = ctl.add_node(Point::new(0.0, 0.0), kind("google_ads")).unwrap();
    let b = ctl.add_node(Point::new(200.0, 0.0), kind("decision")).unwrap();
    ctl.begin_auto_connect(&a).unwrap();

    let views = ctl.node_views();
    assert!(views[0].connect_source);
    assert!(!views[0].valid_target);
    assert!(views[1].valid_target);
    assert_eq!(views[0].icon, "google");
    assert_eq!(views[1].node.id, b);

    let palette = ctl.palette();
    assert_eq!(palette.len(), 18);
    assert!(palette.iter().any(|e| e.kind.as_str() == "ab_split" && e.locked));
    assert!(palette.iter().all(|e| !e.locked || e.spec.is_pro));
    assert_eq!(ctl.remaining_capacity(), Some(18));
}
