//! Snapping geometry for dragged nodes and rendered edges.
//!
//! Nothing in here touches stored state: drag snapping only reports guide
//! lines, and edge snapping only adjusts the path that gets drawn.

use super::graph::{Handle, Point};

/// Strict: a drag guide appears when the axis difference is below this.
pub const DRAG_SNAP_TOLERANCE: f32 = 5.0;
/// Inclusive: edge endpoints closer than this on an axis get straightened.
pub const EDGE_SNAP_TOLERANCE: f32 = 6.0;

/// Guide lines to draw while a node is dragged.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SnapGuides {
    /// x of a vertical guide.
    pub vertical: Option<f32>,
    /// y of a horizontal guide.
    pub horizontal: Option<f32>,
}

impl SnapGuides {
    pub fn is_empty(&self) -> bool { self.vertical.is_none() && self.horizontal.is_none() }
}

/// Find, per axis, the closest other node within tolerance of `proposed`.
pub fn drag_snap<'a, I>(moving: &str, proposed: Point, others: I) -> SnapGuides
where
    I: IntoIterator<Item = (&'a str, Point)>,
{
    let mut best_x: Option<(f32, f32)> = None;
    let mut best_y: Option<(f32, f32)> = None;
    for (id, pos) in others {
        if id == moving {
            continue;
        }
        let dx = (pos.x - proposed.x).abs();
        if dx < DRAG_SNAP_TOLERANCE && best_x.is_none_or(|(d, _)| dx < d) {
            best_x = Some((dx, pos.x));
        }
        let dy = (pos.y - proposed.y).abs();
        if dy < DRAG_SNAP_TOLERANCE && best_y.is_none_or(|(d, _)| dy < d) {
            best_y = Some((dy, pos.y));
        }
    }
    SnapGuides { vertical: best_x.map(|(_, x)| x), horizontal: best_y.map(|(_, y)| y) }
}

/// Move a proposed drag position onto its guides, for hosts that clamp.
pub fn clamp_to_guides(proposed: Point, guides: SnapGuides) -> Point {
    Point {
        x: guides.vertical.unwrap_or(proposed.x),
        y: guides.horizontal.unwrap_or(proposed.y),
    }
}

/// Straighten nearly-vertical and nearly-horizontal edge segments.
pub fn snap_edge_endpoints(source: Point, target: Point) -> (Point, Point) {
    let (mut s, mut t) = (source, target);
    if (s.x - t.x).abs() <= EDGE_SNAP_TOLERANCE {
        let x = (s.x + t.x) / 2.0;
        s.x = x;
        t.x = x;
    }
    if (s.y - t.y).abs() <= EDGE_SNAP_TOLERANCE {
        let y = (s.y + t.y) / 2.0;
        s.y = y;
        t.y = y;
    }
    (s, t)
}

/// Axis-aligned box a renderer draws a node into.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NodeBox {
    pub origin: Point,
    pub width: f32,
    pub height: f32,
}

impl NodeBox {
    pub fn new(origin: Point, width: f32, height: f32) -> Self { NodeBox { origin, width, height } }

    pub fn center(&self) -> Point {
        Point::new(self.origin.x + self.width / 2.0, self.origin.y + self.height / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.origin.x
            && p.x <= self.origin.x + self.width
            && p.y >= self.origin.y
            && p.y <= self.origin.y + self.height
    }

    /// Midpoint of the border side a handle sits on.
    pub fn anchor(&self, handle: Handle) -> Point {
        let c = self.center();
        match handle {
            Handle::Top => Point::new(c.x, self.origin.y),
            Handle::Right => Point::new(self.origin.x + self.width, c.y),
            Handle::Bottom => Point::new(c.x, self.origin.y + self.height),
            Handle::Left => Point::new(self.origin.x, c.y),
        }
    }

    /// Handle whose anchor is closest to `p`.
    pub fn nearest_handle(&self, p: Point) -> Handle {
        let mut best = Handle::Right;
        let mut best_d2 = f32::INFINITY;
        for h in Handle::ALL {
            let a = self.anchor(h);
            let d2 = (a.x - p.x).powi(2) + (a.y - p.y).powi(2);
            if d2 < best_d2 {
                best_d2 = d2;
                best = h;
            }
        }
        best
    }
}

/// Facing sides for an edge stored without explicit handles.
pub fn auto_handles(source: &NodeBox, target: &NodeBox) -> (Handle, Handle) {
    let (sc, tc) = (source.center(), target.center());
    let dx = tc.x - sc.x;
    let dy = tc.y - sc.y;
    if dx.abs() >= dy.abs() {
        if dx >= 0.0 { (Handle::Right, Handle::Left) } else { (Handle::Left, Handle::Right) }
    } else if dy >= 0.0 {
        (Handle::Bottom, Handle::Top)
    } else {
        (Handle::Top, Handle::Bottom)
    }
}

/// Rendered endpoints of an edge between two boxes, wobble removed.
pub fn edge_endpoints(
    source: &NodeBox,
    source_handle: Option<Handle>,
    target: &NodeBox,
    target_handle: Option<Handle>,
) -> (Point, Point) {
    let (auto_s, auto_t) = auto_handles(source, target);
    let s = source.anchor(source_handle.unwrap_or(auto_s));
    let t = target.anchor(target_handle.unwrap_or(auto_t));
    snap_edge_endpoints(s, t)
}
