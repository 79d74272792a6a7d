use log::{debug, warn};

use super::graph::{Handle, NodeId};

/// Which exit the pending connection leaves its source from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectHandle {
    /// Click-to-connect: the exit side is only resolved on commit.
    Auto,
    Side(Handle),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    AwaitingTarget { source: NodeId, handle: ConnectHandle },
}

/// Edge the controller should create once a gesture completes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdgeRequest {
    pub source: NodeId,
    pub target: NodeId,
    pub source_handle: Option<Handle>,
    pub target_handle: Option<Handle>,
}

/// Connect-mode state machine. Holds at most one attempt at a time.
#[derive(Clone, Debug, Default)]
pub struct ConnectionController {
    state: ConnectionState,
}

impl ConnectionController {
    pub fn new() -> Self { Self::default() }

    pub fn state(&self) -> &ConnectionState { &self.state }

    pub fn is_idle(&self) -> bool { self.state == ConnectionState::Idle }

    pub fn source(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::AwaitingTarget { source, .. } => Some(source),
            ConnectionState::Idle => None,
        }
    }

    /// Drag-a-wire from a specific handle.
    pub fn begin_from_handle(&mut self, node: &str, handle: Handle) {
        self.begin(node, ConnectHandle::Side(handle));
    }

    /// Click-to-connect from the generic connect affordance.
    pub fn begin_auto(&mut self, node: &str) {
        self.begin(node, ConnectHandle::Auto);
    }

    fn begin(&mut self, node: &str, handle: ConnectHandle) {
        if let ConnectionState::AwaitingTarget { source, handle: old } = &self.state {
            // Last gesture wins; the earlier attempt is dropped without a prompt.
            warn!("discarding pending connection from {} ({:?}) for a new one from {}", source, old, node);
        }
        debug!("awaiting connection target from {} ({:?})", node, handle);
        self.state = ConnectionState::AwaitingTarget { source: node.to_string(), handle };
    }

    /// Finish on an explicit target handle. Always returns to `Idle`.
    pub fn complete_on_handle(&mut self, target: &str, target_handle: Handle) -> Option<EdgeRequest> {
        let (source, handle) = self.take()?;
        if source == target {
            debug!("ignoring self-connection on {}", target);
            return None;
        }
        let source_handle = match handle {
            ConnectHandle::Auto => Handle::Right,
            ConnectHandle::Side(h) => h,
        };
        Some(EdgeRequest {
            source,
            target: target.to_string(),
            source_handle: Some(source_handle),
            target_handle: Some(target_handle),
        })
    }

    /// Finish by clicking a target node; handles are left to the renderer.
    pub fn complete_auto(&mut self, target: &str) -> Option<EdgeRequest> {
        let (source, _) = self.take()?;
        if source == target {
            debug!("ignoring self-connection on {}", target);
            return None;
        }
        Some(EdgeRequest { source, target: target.to_string(), source_handle: None, target_handle: None })
    }

    /// Pane click or Escape.
    pub fn cancel(&mut self) -> bool {
        let was_pending = !self.is_idle();
        self.state = ConnectionState::Idle;
        was_pending
    }

    /// Every node but the source is a drop surface while a connection is pending.
    pub fn is_valid_target(&self, node: &str) -> bool {
        matches!(&self.state, ConnectionState::AwaitingTarget { source, .. } if source != node)
    }

    fn take(&mut self) -> Option<(NodeId, ConnectHandle)> {
        match std::mem::take(&mut self.state) {
            ConnectionState::AwaitingTarget { source, handle } => Some((source, handle)),
            ConnectionState::Idle => None,
        }
    }
}
