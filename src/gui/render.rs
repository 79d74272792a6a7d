use eframe::egui::{self, Align2, Color32, FontId, Painter, Pos2, Rect, Shape, Stroke, Vec2};

use crate::graph_utils::alignment::NodeBox;
use crate::graph_utils::graph::{Handle, Point};
use crate::graph_utils::registry::NodeCategory;
use crate::gui::controller::{EdgeView, NodeView};

/// Contract for anything that draws a node.
///
/// Renderers only paint. Anything the user does on top of a node
/// (connecting, renaming, swapping its type) is reported by the canvas as an
/// `EditorIntent`; renderers never see the store.
pub trait NodeRenderer {
    /// Box size in world units.
    fn size(&self) -> Vec2;

    /// Handles this shape exposes for wiring.
    fn handles(&self) -> &'static [Handle] { &Handle::ALL }

    fn paint(&self, painter: &Painter, rect: Rect, view: &NodeView<'_>, zoom: f32);
}

pub trait EdgeRenderer {
    fn paint(&self, painter: &Painter, from: Pos2, to: Pos2, view: &EdgeView<'_>, zoom: f32);
}

pub fn node_box(renderer: &dyn NodeRenderer, origin: Point) -> NodeBox {
    let size = renderer.size();
    NodeBox::new(origin, size.x, size.y)
}

fn outline(view: &NodeView<'_>, zoom: f32) -> Stroke {
    if view.connect_source {
        Stroke::new(2.5 * zoom, Color32::from_rgb(255, 170, 60))
    } else if view.selected {
        Stroke::new(2.0 * zoom, Color32::from_rgb(80, 120, 255))
    } else if view.valid_target {
        Stroke::new(2.0 * zoom, Color32::from_rgb(80, 220, 120))
    } else {
        Stroke::new(1.0 * zoom, Color32::DARK_GRAY)
    }
}

fn label_font(zoom: f32) -> FontId { FontId::proportional((13.0 * zoom).clamp(8.0, 24.0)) }

fn paint_label(painter: &Painter, pos: Pos2, align: Align2, view: &NodeView<'_>, zoom: f32, color: Color32) {
    // The inline text field is drawn by the canvas while renaming
    if view.rename_draft.is_none() {
        painter.text(pos, align, &view.node.label, label_font(zoom), color);
    }
}

/// Short glyph for an icon name, e.g. `facebook` -> `F`.
fn icon_glyph(icon: &str) -> String {
    icon.chars().next().map(|c| c.to_ascii_uppercase().to_string()).unwrap_or_default()
}

/// Landing, sales and order pages: a browser-like card.
pub struct PageRenderer;

impl NodeRenderer for PageRenderer {
    fn size(&self) -> Vec2 { Vec2::new(160.0, 100.0) }

    fn paint(&self, painter: &Painter, rect: Rect, view: &NodeView<'_>, zoom: f32) {
        let rounding = 6.0 * zoom;
        painter.rect_filled(rect, rounding, Color32::from_rgb(250, 250, 252));
        let bar = Rect::from_min_size(rect.min, Vec2::new(rect.width(), 14.0 * zoom));
        painter.rect_filled(bar, rounding, Color32::from_rgb(225, 228, 235));
        for i in 0..3 {
            let c = bar.left_center() + Vec2::new((8.0 + i as f32 * 8.0) * zoom, 0.0);
            painter.circle_filled(c, 2.5 * zoom, Color32::from_rgb(170, 175, 185));
        }
        painter.rect_stroke(rect, rounding, outline(view, zoom), egui::StrokeKind::Inside);
        paint_label(painter, rect.center_bottom() + Vec2::new(0.0, 4.0 * zoom), Align2::CENTER_TOP, view, zoom, Color32::LIGHT_GRAY);
    }
}

/// Traffic sources and actions: a round badge.
pub struct IconRenderer;

impl NodeRenderer for IconRenderer {
    fn size(&self) -> Vec2 { Vec2::new(64.0, 64.0) }

    fn paint(&self, painter: &Painter, rect: Rect, view: &NodeView<'_>, zoom: f32) {
        let r = rect.width().min(rect.height()) * 0.5;
        painter.circle_filled(rect.center(), r, Color32::from_rgb(60, 90, 160));
        painter.circle_stroke(rect.center(), r, outline(view, zoom));
        painter.text(rect.center(), Align2::CENTER_CENTER, icon_glyph(view.icon), FontId::proportional(24.0 * zoom), Color32::WHITE);
        paint_label(painter, rect.center_bottom() + Vec2::new(0.0, 4.0 * zoom), Align2::CENTER_TOP, view, zoom, Color32::LIGHT_GRAY);
    }
}

/// Decisions and splits.
pub struct DiamondRenderer;

impl NodeRenderer for DiamondRenderer {
    fn size(&self) -> Vec2 { Vec2::new(80.0, 80.0) }

    fn paint(&self, painter: &Painter, rect: Rect, view: &NodeView<'_>, zoom: f32) {
        let points = vec![rect.center_top(), rect.right_center(), rect.center_bottom(), rect.left_center()];
        painter.add(Shape::convex_polygon(points, Color32::from_rgb(120, 80, 170), outline(view, zoom)));
        paint_label(painter, rect.center_bottom() + Vec2::new(0.0, 4.0 * zoom), Align2::CENTER_TOP, view, zoom, Color32::LIGHT_GRAY);
    }
}

/// Free-text sticky note. Notes do not take part in wiring.
pub struct NoteRenderer;

impl NodeRenderer for NoteRenderer {
    fn size(&self) -> Vec2 { Vec2::new(180.0, 90.0) }

    fn handles(&self) -> &'static [Handle] { &[] }

    fn paint(&self, painter: &Painter, rect: Rect, view: &NodeView<'_>, zoom: f32) {
        painter.rect_filled(rect, 2.0 * zoom, Color32::from_rgb(255, 236, 150));
        painter.rect_stroke(rect, 2.0 * zoom, outline(view, zoom), egui::StrokeKind::Inside);
        paint_label(painter, rect.left_top() + Vec2::splat(8.0 * zoom), Align2::LEFT_TOP, view, zoom, Color32::from_rgb(60, 50, 20));
    }
}

/// Straight connector with an arrow head; animated edges are dashed.
pub struct ArrowEdgeRenderer;

impl EdgeRenderer for ArrowEdgeRenderer {
    fn paint(&self, painter: &Painter, from: Pos2, to: Pos2, view: &EdgeView<'_>, zoom: f32) {
        let color = if view.selected { Color32::from_rgb(255, 200, 80) } else { Color32::from_rgb(170, 170, 180) };
        let width = if view.selected { 2.5 } else { 1.5 };
        let stroke = Stroke::new(width * zoom, color);
        if view.edge.animated {
            painter.extend(Shape::dashed_line(&[from, to], stroke, 8.0 * zoom, 5.0 * zoom));
        } else {
            painter.line_segment([from, to], stroke);
        }
        let dir = to - from;
        let len = dir.length();
        if len > f32::EPSILON {
            let d = dir / len;
            let n = Vec2::new(-d.y, d.x);
            let size = 8.0 * zoom;
            let base = to - d * size;
            let head = vec![to, base + n * (size * 0.5), base - n * (size * 0.5)];
            painter.add(Shape::convex_polygon(head, color, Stroke::NONE));
        }
    }
}

/// One renderer per category, swappable by the host.
pub struct RendererSet {
    page: Box<dyn NodeRenderer>,
    icon: Box<dyn NodeRenderer>,
    diamond: Box<dyn NodeRenderer>,
    note: Box<dyn NodeRenderer>,
    edge: Box<dyn EdgeRenderer>,
}

impl Default for RendererSet {
    fn default() -> Self {
        Self {
            page: Box::new(PageRenderer),
            icon: Box::new(IconRenderer),
            diamond: Box::new(DiamondRenderer),
            note: Box::new(NoteRenderer),
            edge: Box::new(ArrowEdgeRenderer),
        }
    }
}

impl RendererSet {
    pub fn for_category(&self, category: NodeCategory) -> &dyn NodeRenderer {
        match category {
            NodeCategory::Page => self.page.as_ref(),
            NodeCategory::Icon => self.icon.as_ref(),
            NodeCategory::Diamond => self.diamond.as_ref(),
            NodeCategory::Note => self.note.as_ref(),
        }
    }

    pub fn with_node_renderer(mut self, category: NodeCategory, renderer: impl NodeRenderer + 'static) -> Self {
        let slot = match category {
            NodeCategory::Page => &mut self.page,
            NodeCategory::Icon => &mut self.icon,
            NodeCategory::Diamond => &mut self.diamond,
            NodeCategory::Note => &mut self.note,
        };
        *slot = Box::new(renderer);
        self
    }

    pub fn with_edge_renderer(mut self, renderer: impl EdgeRenderer + 'static) -> Self {
        self.edge = Box::new(renderer);
        self
    }

    pub fn edge(&self) -> &dyn EdgeRenderer { self.edge.as_ref() }
}
