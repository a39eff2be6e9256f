//! Display metadata for categories: visibility and mask labels.
//!
//! The overlay never feeds back into the aggregation. It decides which rows a report renders and
//! how they are labelled, and where the figures of hidden rows end up.

use crate::engine::bilancial::BilancialInformation;
use crate::error::Res;
use crate::model::{CategoryId, CategoryLookup, CategoryRegistry, CategoryTree};
use crate::utils;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, warn};

/// The label of the synthetic row that carries a parent's directly booked entries.
pub const INDIVIDUAL_LABEL: &str = "(individual)";

/// The label of the root row.
pub const ROOT_LABEL: &str = "Total";

/// The display flags of one category.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OverlayFlags {
    pub visible: bool,
    pub mask: Option<String>,
}

impl Default for OverlayFlags {
    fn default() -> Self {
        Self {
            visible: true,
            mask: None,
        }
    }
}

impl OverlayFlags {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Display flags keyed by category. Categories without an entry are visible and unmasked.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct OverlayState {
    flags: BTreeMap<CategoryId, OverlayFlags>,
}

impl OverlayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(&self, category: CategoryId) -> OverlayFlags {
        self.flags.get(&category).cloned().unwrap_or_default()
    }

    /// The root is always visible.
    pub fn is_visible(&self, category: CategoryId) -> bool {
        category.is_root() || self.flags.get(&category).map_or(true, |f| f.visible)
    }

    pub fn mask(&self, category: CategoryId) -> Option<&str> {
        self.flags.get(&category).and_then(|f| f.mask.as_deref())
    }

    pub fn set_visible(&mut self, category: CategoryId, visible: bool) {
        self.update(category, |f| f.visible = visible);
    }

    /// Sets or clears the mask. An empty mask clears it.
    pub fn set_mask(&mut self, category: CategoryId, mask: Option<String>) {
        let mask = mask.filter(|m| !m.trim().is_empty());
        self.update(category, |f| f.mask = mask);
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// The categories with non-default flags, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (CategoryId, &OverlayFlags)> {
        self.flags.iter().map(|(id, flags)| (*id, flags))
    }

    fn update(&mut self, category: CategoryId, change: impl FnOnce(&mut OverlayFlags)) {
        let flags = self.flags.entry(category).or_default();
        change(flags);
        if flags.is_default() {
            self.flags.remove(&category);
        }
    }

    /// Reads the persisted overlay at `path`.
    ///
    /// Nodes without a string `tail`, unknown keys and paths that the registry does not know are
    /// skipped. Categories are looked up, never created. A missing or unreadable file yields the
    /// default state.
    pub async fn load(path: &Path, registry: &CategoryRegistry) -> Self {
        if !path.is_file() {
            debug!("No overlay file at {}", path.display());
            return Self::default();
        }
        match utils::deserialize::<Value>(path).await {
            Ok(value) => Self::from_value(&value, registry),
            Err(e) => {
                warn!("Ignoring the overlay file: {e:#}");
                Self::default()
            }
        }
    }

    pub(crate) fn from_value(value: &Value, registry: &CategoryRegistry) -> Self {
        let mut state = Self::default();
        let mut path = Vec::new();
        state.read_children(value, &mut path, registry);
        state
    }

    fn read_children(&mut self, node: &Value, path: &mut Vec<String>, registry: &CategoryRegistry) {
        let Some(children) = node.get("children").and_then(Value::as_array) else {
            return;
        };
        for child in children {
            let Some(tail) = child.get("tail").and_then(Value::as_str) else {
                continue;
            };
            path.push(tail.to_string());
            if let Some(id) = registry.find(path.as_slice()) {
                if let Some(visible) = child.get("visible").and_then(Value::as_bool) {
                    self.set_visible(id, visible);
                }
                let mask = child.get("mask").and_then(Value::as_str).map(str::to_string);
                self.set_mask(id, mask);
                self.read_children(child, path, registry);
            } else {
                debug!("Skipping overlay flags for unknown category {}", path.join(":"));
            }
            path.pop();
        }
    }

    /// Writes every non-default flag as a nested tree of `tail` nodes.
    pub async fn save(&self, path: &Path, tree: &CategoryTree) -> Res<()> {
        let file = PersistedOverlay {
            children: self.nodes(tree, CategoryId::ROOT),
        };
        let json = serde_json::to_string_pretty(&file)?;
        utils::write(path, json).await
    }

    fn nodes(&self, tree: &CategoryTree, parent: CategoryId) -> Vec<PersistedNode> {
        tree.children(parent)
            .iter()
            .filter_map(|&id| {
                let children = self.nodes(tree, id);
                let flags = self.flags(id);
                if children.is_empty() && flags.is_default() {
                    return None;
                }
                Some(PersistedNode {
                    tail: tree.tail(id).to_string(),
                    visible: flags.visible,
                    mask: flags.mask,
                    children,
                })
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedOverlay {
    children: Vec<PersistedNode>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedNode {
    tail: String,
    visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mask: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<PersistedNode>,
}

/// What an overlay node stands for.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OverlayKind {
    Category(CategoryId),
    /// The entries booked directly on the category, shown as a child of it.
    Individual(CategoryId),
}

impl OverlayKind {
    pub fn category(&self) -> CategoryId {
        match self {
            OverlayKind::Category(id) | OverlayKind::Individual(id) => *id,
        }
    }
}

/// A node of the display tree.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OverlayNode {
    kind: OverlayKind,
    children: Vec<OverlayNode>,
}

/// One rendered row.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct OverlayRow {
    pub category: CategoryId,
    /// Whether this is the synthetic row of directly booked entries.
    pub individual_row: bool,
    pub depth: usize,
    pub label: String,
    /// The displayed individual figure, including any hidden descendants folded into this row.
    pub individual: Decimal,
    pub cumulative: Decimal,
}

/// The display tree of one snapshot.
#[derive(Debug, Clone)]
pub struct CategoryOverlay {
    root: OverlayNode,
    tree: CategoryTree,
    state: OverlayState,
}

impl CategoryOverlay {
    /// Builds the display tree of the categories present in `info`.
    ///
    /// A category that has child rows and is also in `direct` gets a synthetic individual child,
    /// so its own row no longer shows the directly booked entries.
    pub fn build(
        tree: &CategoryTree,
        info: &BilancialInformation,
        direct: &BTreeSet<CategoryId>,
        state: &OverlayState,
    ) -> Self {
        Self {
            root: Self::build_node(tree, info, direct, CategoryId::ROOT),
            tree: tree.clone(),
            state: state.clone(),
        }
    }

    fn build_node(
        tree: &CategoryTree,
        info: &BilancialInformation,
        direct: &BTreeSet<CategoryId>,
        id: CategoryId,
    ) -> OverlayNode {
        let mut children: Vec<OverlayNode> = tree
            .children(id)
            .iter()
            .filter(|child| info.categories().contains_key(child))
            .map(|&child| Self::build_node(tree, info, direct, child))
            .collect();
        if !children.is_empty() && direct.contains(&id) {
            children.insert(
                0,
                OverlayNode {
                    kind: OverlayKind::Individual(id),
                    children: Vec::new(),
                },
            );
        }
        OverlayNode {
            kind: OverlayKind::Category(id),
            children,
        }
    }

    fn has_individual_child(node: &OverlayNode) -> bool {
        node.children
            .iter()
            .any(|c| matches!(c.kind, OverlayKind::Individual(_)))
    }

    /// Depth-first rows. The root row is always rendered. A hidden row is not rendered and its
    /// individual figure is added to the nearest visible ancestor; its descendants still render.
    pub fn rows(&self, info: &BilancialInformation) -> Vec<OverlayRow> {
        let mut rows = Vec::new();
        self.walk(&self.root, info, 0, None, &mut rows);
        rows
    }

    fn walk(
        &self,
        node: &OverlayNode,
        info: &BilancialInformation,
        depth: usize,
        anchor: Option<usize>,
        rows: &mut Vec<OverlayRow>,
    ) {
        let id = node.kind.category();
        let (individual, cumulative) = match node.kind {
            OverlayKind::Individual(_) => (info.individual(id), info.individual(id)),
            OverlayKind::Category(_) if Self::has_individual_child(node) => {
                (Decimal::ZERO, info.cumulative(id))
            }
            OverlayKind::Category(_) => (info.individual(id), info.cumulative(id)),
        };

        let mut anchor = anchor;
        let mut child_depth = depth;
        if self.state.is_visible(id) {
            rows.push(OverlayRow {
                category: id,
                individual_row: matches!(node.kind, OverlayKind::Individual(_)),
                depth,
                label: self.label(node.kind),
                individual,
                cumulative,
            });
            anchor = Some(rows.len() - 1);
            child_depth = depth + 1;
        } else if let Some(ix) = anchor {
            rows[ix].individual += individual;
        }

        for child in &node.children {
            self.walk(child, info, child_depth, anchor, rows);
        }
    }

    fn label(&self, kind: OverlayKind) -> String {
        match kind {
            OverlayKind::Individual(_) => INDIVIDUAL_LABEL.to_string(),
            OverlayKind::Category(id) if id.is_root() => ROOT_LABEL.to_string(),
            OverlayKind::Category(id) => self
                .state
                .mask(id)
                .map(str::to_string)
                .unwrap_or_else(|| self.tree.tail(id).to_string()),
        }
    }
}
