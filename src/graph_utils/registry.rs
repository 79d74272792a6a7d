use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Registry key of a node type, e.g. `sales_page` or `facebook_ads`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKind(pub String);

impl NodeKind {
    pub fn new(kind: impl Into<String>) -> Self { NodeKind(kind.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for NodeKind {
    fn from(s: &str) -> Self { NodeKind(s.to_string()) }
}

/// Visual family a kind is drawn with. Only renderer dispatch looks at this.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeCategory {
    Page,
    Icon,
    Diamond,
    Note,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeKindSpec {
    pub category: NodeCategory,
    pub is_pro: bool,
    pub display_label: String,
    pub icon: String,
}

/// Lookup table from node kind to its capabilities, kept in palette order.
#[derive(Clone, Debug, Default)]
pub struct NodeKindRegistry {
    order: Vec<NodeKind>,
    specs: HashMap<NodeKind, NodeKindSpec>,
}

impl NodeKindRegistry {
    pub fn new() -> Self { Self::default() }

    /// Register (or replace) a kind. Replacing keeps its palette slot.
    pub fn register(&mut self, kind: NodeKind, spec: NodeKindSpec) {
        if self.specs.insert(kind.clone(), spec).is_none() {
            self.order.push(kind);
        }
    }

    pub fn get(&self, kind: &NodeKind) -> Option<&NodeKindSpec> { self.specs.get(kind) }

    pub fn contains(&self, kind: &NodeKind) -> bool { self.specs.contains_key(kind) }

    pub fn len(&self) -> usize { self.order.len() }

    pub fn is_empty(&self) -> bool { self.order.is_empty() }

    /// Kinds with their specs, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeKind, &NodeKindSpec)> {
        self.order.iter().filter_map(move |k| self.specs.get(k).map(|s| (k, s)))
    }

    pub fn kinds_in(&self, category: NodeCategory) -> Vec<&NodeKind> {
        self.iter().filter(|(_, s)| s.category == category).map(|(k, _)| k).collect()
    }

    /// The stock funnel palette shipped with the desktop app.
    pub fn builtin() -> Self { BUILTIN_KINDS.clone() }
}

static BUILTIN_KINDS: Lazy<NodeKindRegistry> = Lazy::new(|| {
    use NodeCategory::*;
    let table: &[(&str, NodeCategory, bool, &str, &str)] = &[
        // Pages
        ("opt_in_page", Page, false, "Opt-in Page", "file-text"),
        ("sales_page", Page, false, "Sales Page", "file-dollar"),
        ("order_form", Page, false, "Order Form", "shopping-cart"),
        ("upsell_page", Page, false, "Upsell", "trending-up"),
        ("downsell_page", Page, true, "Downsell", "trending-down"),
        ("thank_you_page", Page, false, "Thank You", "heart"),
        ("webinar_page", Page, true, "Webinar", "video"),
        ("membership_area", Page, true, "Membership Area", "lock"),
        // Traffic sources and actions
        ("facebook_ads", Icon, false, "Facebook Ads", "facebook"),
        ("google_ads", Icon, false, "Google Ads", "google"),
        ("organic_search", Icon, false, "Organic Search", "search"),
        ("email", Icon, false, "Email", "mail"),
        ("sms", Icon, true, "SMS", "message-square"),
        ("tiktok_ads", Icon, true, "TikTok Ads", "music"),
        ("purchase", Icon, false, "Purchase", "credit-card"),
        // Logic
        ("decision", Diamond, false, "Decision", "git-branch"),
        ("ab_split", Diamond, true, "A/B Split", "shuffle"),
        // Annotations
        ("note", Note, false, "Note", "sticky-note"),
    ];
    let mut reg = NodeKindRegistry::new();
    for (kind, category, is_pro, label, icon) in table {
        reg.register(
            NodeKind::new(*kind),
            NodeKindSpec {
                category: *category,
                is_pro: *is_pro,
                display_label: label.to_string(),
                icon: icon.to_string(),
            },
        );
    }
    reg
});

/// Billing tier of the current user. Opaque to the engine beyond its limits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Agency,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlanLimits {
    /// `None` means unbounded.
    pub max_nodes: Option<usize>,
    pub allows_pro_kinds: bool,
}

/// Host-supplied resolution of a tier to its limits.
pub trait PlanLookup {
    fn limits(&self, tier: PlanTier) -> PlanLimits;
}

/// 20 / 100 / unbounded nodes; only the free tier is barred from pro kinds.
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultPlans;

impl PlanLookup for DefaultPlans {
    fn limits(&self, tier: PlanTier) -> PlanLimits {
        match tier {
            PlanTier::Free => PlanLimits { max_nodes: Some(20), allows_pro_kinds: false },
            PlanTier::Pro => PlanLimits { max_nodes: Some(100), allows_pro_kinds: true },
            PlanTier::Agency => PlanLimits { max_nodes: None, allows_pro_kinds: true },
        }
    }
}

impl<F> PlanLookup for F
where
    F: Fn(PlanTier) -> PlanLimits,
{
    fn limits(&self, tier: PlanTier) -> PlanLimits { self(tier) }
}
