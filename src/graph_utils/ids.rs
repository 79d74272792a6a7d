use uuid::Uuid;

/// Source of fresh node and edge ids, injected into the store.
pub trait IdGenerator {
    fn next_node_id(&mut self) -> String;
    fn next_edge_id(&mut self) -> String;

    /// Called for every id already present in a loaded graph so that later
    /// ids never collide with it.
    fn observe(&mut self, _existing: &str) {}
}

/// `node_1`, `node_2`, ... and `edge_1`, `edge_2`, ... from one counter.
#[derive(Clone, Debug, Default)]
pub struct SequentialIds {
    last: u64,
}

impl SequentialIds {
    pub fn new() -> Self { Self::default() }

    fn bump(&mut self) -> u64 {
        self.last += 1;
        self.last
    }
}

impl IdGenerator for SequentialIds {
    fn next_node_id(&mut self) -> String { format!("node_{}", self.bump()) }

    fn next_edge_id(&mut self) -> String { format!("edge_{}", self.bump()) }

    fn observe(&mut self, existing: &str) {
        let suffix = existing.rsplit('_').next().unwrap_or("");
        if let Ok(n) = suffix.parse::<u64>() {
            self.last = self.last.max(n);
        }
    }
}

/// Time-ordered UUID v7 ids; what the desktop app uses.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_node_id(&mut self) -> String { Uuid::now_v7().to_string() }

    fn next_edge_id(&mut self) -> String { Uuid::now_v7().to_string() }
}
