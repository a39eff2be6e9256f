//! The canonical category hierarchy.
//!
//! Every distinct category path maps to exactly one `CategoryNode` in a `CategoryRegistry`, and
//! callers hold `CategoryId` handles to those nodes. Two handles from the same registry are equal
//! if and only if they name the same path, so equality, hashing and tree membership are all
//! handle comparisons.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

/// The separator used when a category path is rendered or parsed without further configuration.
pub const DEFAULT_SEPARATOR: &str = ":";

/// A handle to a canonical category node.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(u32);

impl CategoryId {
    /// The root category, i.e. the empty path.
    pub const ROOT: CategoryId = CategoryId(0);

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for CategoryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An immutable node of the category tree.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CategoryNode {
    id: CategoryId,
    parent: Option<CategoryId>,
    tail: String,
    path: Vec<String>,
}

impl CategoryNode {
    pub fn id(&self) -> CategoryId {
        self.id
    }

    /// `None` only for the root.
    pub fn parent(&self) -> Option<CategoryId> {
        self.parent
    }

    /// The last path segment. Empty for the root.
    pub fn tail(&self) -> &str {
        &self.tail
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The number of segments in the path. The root has depth zero.
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// Read operations shared by the live `CategoryRegistry` and its `CategoryTree` snapshots.
///
/// An id that is unknown to the lookup behaves like the root: it has an empty path and no parent.
pub trait CategoryLookup {
    fn get(&self, id: CategoryId) -> Option<&CategoryNode>;

    fn parent(&self, id: CategoryId) -> Option<CategoryId> {
        self.get(id).and_then(|node| node.parent())
    }

    fn path(&self, id: CategoryId) -> &[String] {
        self.get(id).map(|node| node.path()).unwrap_or(&[])
    }

    fn tail(&self, id: CategoryId) -> &str {
        self.get(id).map(|node| node.tail()).unwrap_or("")
    }

    fn depth(&self, id: CategoryId) -> usize {
        self.path(id).len()
    }

    /// True iff `a == b` or the parent of `a` is a subcategory of `b`.
    fn is_subcategory_of(&self, a: CategoryId, b: CategoryId) -> bool {
        let mut current = Some(a);
        while let Some(id) = current {
            if id == b {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Walks up the deeper of the two categories until one is an ancestor of the other. If either
    /// input is absent, the root is returned.
    fn greatest_common_ancestor(&self, a: Option<CategoryId>, b: Option<CategoryId>) -> CategoryId {
        let (Some(mut a), Some(mut b)) = (a, b) else {
            return CategoryId::ROOT;
        };
        loop {
            if self.is_subcategory_of(a, b) {
                return b;
            }
            if self.is_subcategory_of(b, a) {
                return a;
            }
            let deeper = if self.depth(a) >= self.depth(b) {
                &mut a
            } else {
                &mut b
            };
            match self.parent(*deeper) {
                Some(parent) => *deeper = parent,
                None => return CategoryId::ROOT,
            }
        }
    }

    /// The root is minimal, every category is greater than its ancestors, and unrelated categories
    /// compare by the segment directly below their deepest common ancestor.
    fn compare(&self, a: CategoryId, b: CategoryId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let (pa, pb) = (self.path(a), self.path(b));
        for (sa, sb) in pa.iter().zip(pb.iter()) {
            match sa.cmp(sb) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        pa.len().cmp(&pb.len())
    }

    /// The human-readable path, e.g. `Food:Drinks`. The root renders as an empty string.
    fn display(&self, id: CategoryId, separator: &str) -> String {
        self.path(id).join(separator)
    }

    /// Yields `id` and then each of its ancestors up to and including the root.
    fn ancestors(&self, id: CategoryId) -> Vec<CategoryId> {
        let mut out = vec![id];
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            out.push(parent);
            current = parent;
        }
        out
    }
}

/// The canonical factory for categories.
///
/// Creation is serialized behind a write lock, while reads of existing nodes only need the read
/// lock. Nodes are never removed or changed, so a handle stays valid for the registry's lifetime.
#[derive(Debug)]
pub struct CategoryRegistry {
    arena: RwLock<Arena>,
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CategoryRegistry {
    pub fn new() -> Self {
        Self {
            arena: RwLock::new(Arena::new()),
        }
    }

    /// Returns the canonical category for `segments`, creating it and any missing ancestors. An
    /// empty sequence yields the root.
    pub fn category<I, S>(&self, segments: I) -> CategoryId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path: Vec<String> = segments.into_iter().map(Into::into).collect();
        if let Some(id) = self.read().by_path.get(&path) {
            return *id;
        }
        self.write().intern(path)
    }

    /// Parses a display string such as `Food:Drinks` and returns its canonical category. A blank
    /// string yields the root. Segments are trimmed.
    pub fn category_from_str(&self, s: &str, separator: &str) -> CategoryId {
        if s.trim().is_empty() {
            return CategoryId::ROOT;
        }
        self.category(s.split(separator).map(str::trim))
    }

    /// Looks up an existing category without creating anything.
    pub fn find<S: AsRef<str>>(&self, segments: &[S]) -> Option<CategoryId> {
        let path: Vec<String> = segments.iter().map(|s| s.as_ref().to_string()).collect();
        self.read().by_path.get(&path).copied()
    }

    /// Like `category_from_str` but never creates anything.
    pub fn find_str(&self, s: &str, separator: &str) -> Option<CategoryId> {
        if s.trim().is_empty() {
            return Some(CategoryId::ROOT);
        }
        let segments: Vec<&str> = s.split(separator).map(str::trim).collect();
        self.find(&segments)
    }

    pub fn len(&self) -> usize {
        self.read().nodes.len()
    }

    /// Always false: the root exists from the start.
    pub fn is_empty(&self) -> bool {
        self.read().nodes.is_empty()
    }

    pub fn is_subcategory_of(&self, a: CategoryId, b: CategoryId) -> bool {
        self.read().is_subcategory_of(a, b)
    }

    pub fn greatest_common_ancestor(
        &self,
        a: Option<CategoryId>,
        b: Option<CategoryId>,
    ) -> CategoryId {
        self.read().greatest_common_ancestor(a, b)
    }

    pub fn compare(&self, a: CategoryId, b: CategoryId) -> Ordering {
        self.read().compare(a, b)
    }

    pub fn parent(&self, id: CategoryId) -> Option<CategoryId> {
        self.read().parent(id)
    }

    pub fn path(&self, id: CategoryId) -> Vec<String> {
        self.read().path(id).to_vec()
    }

    pub fn display(&self, id: CategoryId, separator: &str) -> String {
        self.read().display(id, separator)
    }

    /// Takes an immutable snapshot of the current tree. The snapshot does not hold any lock.
    pub fn tree(&self) -> CategoryTree {
        let arena = self.read();
        let mut children = arena.children.clone();
        for list in children.iter_mut() {
            list.sort_by(|a, b| arena.compare(*a, *b));
        }
        CategoryTree(Arc::new(TreeInner {
            nodes: arena.nodes.clone(),
            children,
        }))
    }

    fn read(&self) -> RwLockReadGuard<'_, Arena> {
        self.arena.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arena> {
        self.arena.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct Arena {
    nodes: Vec<Arc<CategoryNode>>,
    children: Vec<Vec<CategoryId>>,
    by_path: HashMap<Vec<String>, CategoryId>,
    /// `segments[depth][segment]` holds every category whose path has `segment` at `depth`.
    segments: Vec<HashMap<String, BTreeSet<CategoryId>>>,
}

impl Arena {
    fn new() -> Self {
        let root = CategoryNode {
            id: CategoryId::ROOT,
            parent: None,
            tail: String::new(),
            path: Vec::new(),
        };
        let mut by_path = HashMap::new();
        by_path.insert(Vec::new(), CategoryId::ROOT);
        Self {
            nodes: vec![Arc::new(root)],
            children: vec![Vec::new()],
            by_path,
            segments: Vec::new(),
        }
    }

    fn intern(&mut self, path: Vec<String>) -> CategoryId {
        if let Some(id) = self.by_path.get(&path) {
            return *id;
        }
        let (mut current, existing) = self.nearest_existing(&path);
        for depth in existing..path.len() {
            current = self.push(current, path[..=depth].to_vec());
        }
        current
    }

    /// Finds the deepest existing category whose path is a prefix of `path` by intersecting the
    /// per-depth segment sets from the front. Returns that category and its depth.
    fn nearest_existing(&self, path: &[String]) -> (CategoryId, usize) {
        let mut ancestor = (CategoryId::ROOT, 0);
        let mut matches: Option<BTreeSet<CategoryId>> = None;
        for (depth, segment) in path.iter().enumerate() {
            let Some(candidates) = self
                .segments
                .get(depth)
                .and_then(|level| level.get(segment.as_str()))
            else {
                break;
            };
            let next: BTreeSet<CategoryId> = match &matches {
                None => candidates.clone(),
                Some(previous) => previous.intersection(candidates).copied().collect(),
            };
            let exact = next
                .iter()
                .copied()
                .find(|id| self.depth(*id) == depth + 1);
            match exact {
                Some(id) => ancestor = (id, depth + 1),
                None => break,
            }
            matches = Some(next);
        }
        ancestor
    }

    fn push(&mut self, parent: CategoryId, path: Vec<String>) -> CategoryId {
        let id = CategoryId(self.nodes.len() as u32);
        let tail = path.last().cloned().unwrap_or_default();
        for (depth, segment) in path.iter().enumerate() {
            if self.segments.len() <= depth {
                self.segments.push(HashMap::new());
            }
            self.segments[depth]
                .entry(segment.clone())
                .or_default()
                .insert(id);
        }
        trace!("Creating category {id} '{}'", path.join(DEFAULT_SEPARATOR));
        self.by_path.insert(path.clone(), id);
        self.nodes.push(Arc::new(CategoryNode {
            id,
            parent: Some(parent),
            tail,
            path,
        }));
        self.children.push(Vec::new());
        self.children[parent.index()].push(id);
        id
    }
}

impl CategoryLookup for Arena {
    fn get(&self, id: CategoryId) -> Option<&CategoryNode> {
        self.nodes.get(id.index()).map(Arc::as_ref)
    }
}

/// An immutable, cheaply cloned snapshot of a `CategoryRegistry`.
///
/// Children are ordered by `CategoryLookup::compare`.
#[derive(Debug, Clone)]
pub struct CategoryTree(Arc<TreeInner>);

#[derive(Debug)]
struct TreeInner {
    nodes: Vec<Arc<CategoryNode>>,
    children: Vec<Vec<CategoryId>>,
}

impl CategoryTree {
    pub fn children(&self, id: CategoryId) -> &[CategoryId] {
        self.0
            .children
            .get(id.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.0.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.nodes.is_empty()
    }
}

impl CategoryLookup for CategoryTree {
    fn get(&self, id: CategoryId) -> Option<&CategoryNode> {
        self.0.nodes.get(id.index()).map(Arc::as_ref)
    }
}
