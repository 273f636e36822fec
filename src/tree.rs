//! The container tree.
//!
//! [`Tree`] owns every node in an arena keyed by [`NodeId`].  Children are
//! referenced by id in sibling order; parents are recorded in a separate,
//! non-owning side table that is patched on every [`attach`](Tree::attach)
//! and [`detach`](Tree::detach).  No node ever points at its parent.
//!
//! ```text
//! root
//! └── output "VIRTUAL-1"
//!     ├── workspace 1 (splith)
//!     │   ├── window  percent 0.5
//!     │   └── con (splitv) percent 0.5
//!     │       └── window  percent 1.0
//!     └── workspace 4 (tabbed, empty)
//! ```
//!
//! Each parent also keeps a *focus stack*: its children ordered from most to
//! least recently focused.  The chain of first entries from the root is the
//! focus path, and [`Tree::focused`] is the single node at its end.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Siblings' percents must sum to one within this tolerance.
pub const PERCENT_EPSILON: f64 = 1e-6;

/// Process-wide id counter so ids stay unique even across rolled-back edits.
static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a workspace or container arranges its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    SplitH,
    SplitV,
    Tabbed,
    Stacking,
}

impl Layout {
    /// Parse the i3 name of a layout.
    pub fn from_name(name: &str) -> Option<Layout> {
        match name {
            "splith" => Some(Layout::SplitH),
            "splitv" => Some(Layout::SplitV),
            "tabbed" => Some(Layout::Tabbed),
            "stacking" => Some(Layout::Stacking),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Layout::SplitH => "splith",
            Layout::SplitV => "splitv",
            Layout::Tabbed => "tabbed",
            Layout::Stacking => "stacking",
        }
    }

    /// Whether this is one of the two split orientations.
    pub fn is_split(self) -> bool {
        matches!(self, Layout::SplitH | Layout::SplitV)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry of an output, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// The variant of a node together with its variant-specific data.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Output { name: String, rect: Rect },
    Workspace { num: i32 },
    Container,
    Window { app_id: String },
}

/// A single node in the arena.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    layout: Layout,
    percent: f64,
    nodes: Vec<NodeId>,
    focus: Vec<NodeId>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Fraction of the parent's extent occupied by this node.
    pub fn percent(&self) -> f64 {
        self.percent
    }

    /// Children in sibling order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Children from most to least recently focused.
    pub fn focus_stack(&self) -> &[NodeId] {
        &self.focus
    }

    pub fn is_window(&self) -> bool {
        matches!(self.kind, NodeKind::Window { .. })
    }

    pub fn is_workspace(&self) -> bool {
        matches!(self.kind, NodeKind::Workspace { .. })
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, NodeKind::Container)
    }

    pub fn is_output(&self) -> bool {
        matches!(self.kind, NodeKind::Output { .. })
    }

    /// Workspace number, if this node is a workspace.
    pub fn num(&self) -> Option<i32> {
        match self.kind {
            NodeKind::Workspace { num } => Some(num),
            _ => None,
        }
    }
}

/// Errors from structural tree edits.
///
/// These indicate a caller bug (an edit against a node that does not exist
/// or is in the wrong state), never a user mistake.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("node {0} is already attached")]
    AlreadyAttached(NodeId),
    #[error("node {0} is not attached")]
    NotAttached(NodeId),
    #[error("the root cannot be moved")]
    RootImmovable,
    #[error("split ratio {0} is outside (0, 1]")]
    InvalidRatio(f64),
}

/// A broken structural invariant.  Fatal: it means an edit was applied
/// halfway or two writers raced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("percents under {parent} sum to {sum}")]
    PercentSum { parent: NodeId, sum: f64 },
    #[error("parent table disagrees with children of {0}")]
    ParentTable(NodeId),
    #[error("focus stack of {0} does not match its children")]
    FocusStack(NodeId),
    #[error("output {0} has no workspace")]
    EmptyOutput(NodeId),
    #[error("root has no output")]
    NoOutput,
    #[error("focused node {0} is not on the focus path")]
    FocusPath(NodeId),
    #[error("{0} holds focus while its workspace has windows")]
    WindowNotFocused(NodeId),
}

/// Serialized node type, i3 style: containers and windows are both `con`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Root,
    Output,
    Workspace,
    Con,
}

/// Immutable, serializable copy of a subtree, shaped like an i3 `get_tree`
/// reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: u64,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: Option<String>,
    pub num: Option<i32>,
    pub layout: String,
    pub percent: Option<f64>,
    pub focused: bool,
    pub focus: Vec<u64>,
    pub window: Option<u64>,
    pub app_id: Option<String>,
    pub rect: Rect,
    pub nodes: Vec<NodeSnapshot>,
}

/// The container tree.  See the [module documentation](self).
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: HashMap<NodeId, Node>,
    parents: HashMap<NodeId, NodeId>,
    root: NodeId,
    focused: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Create a tree holding only the root.
    pub fn new() -> Self {
        let root = Node {
            id: NodeId::next(),
            kind: NodeKind::Root,
            layout: Layout::SplitH,
            percent: 1.0,
            nodes: Vec::new(),
            focus: Vec::new(),
        };
        let id = root.id;
        Self {
            nodes: HashMap::from([(id, root)]),
            parents: HashMap::new(),
            root: id,
            focused: id,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The single focused node.
    pub fn focused(&self) -> NodeId {
        self.focused
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.nodes.get(&id).ok_or(TreeError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.nodes.get_mut(&id).ok_or(TreeError::UnknownNode(id))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied()
    }

    /// Children of `id` in sibling order (empty for unknown ids).
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map(|n| n.nodes.as_slice()).unwrap_or(&[])
    }

    /// Whether `id` is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            if cur == self.root {
                return true;
            }
            match self.parents.get(&cur) {
                Some(p) => cur = *p,
                None => return false,
            }
        }
    }

    /// Create a detached node.  It joins the tree on [`attach`](Self::attach).
    pub fn create(&mut self, kind: NodeKind, layout: Layout) -> NodeId {
        let node = Node {
            id: NodeId::next(),
            kind,
            layout,
            percent: 1.0,
            nodes: Vec::new(),
            focus: Vec::new(),
        };
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    /// Append `child` as the last child of `parent`.
    ///
    /// Sibling percents are reset to an even split unless `ratio` is given,
    /// in which case `child` takes `ratio` and existing siblings are scaled
    /// by `1 - ratio`.
    pub fn attach(
        &mut self,
        parent: NodeId,
        child: NodeId,
        ratio: Option<f64>,
    ) -> Result<(), TreeError> {
        let index = self.node(parent)?.nodes.len();
        self.attach_at(parent, index, child, ratio)
    }

    /// Insert `child` at `index` among `parent`'s children.
    pub fn attach_at(
        &mut self,
        parent: NodeId,
        index: usize,
        child: NodeId,
        ratio: Option<f64>,
    ) -> Result<(), TreeError> {
        if child == self.root {
            return Err(TreeError::RootImmovable);
        }
        if self.parents.contains_key(&child) {
            return Err(TreeError::AlreadyAttached(child));
        }
        self.node(child)?;
        if let Some(r) = ratio {
            if !(r > 0.0 && r <= 1.0) {
                return Err(TreeError::InvalidRatio(r));
            }
        }

        let siblings = {
            let p = self.node_mut(parent)?;
            let index = index.min(p.nodes.len());
            p.nodes.insert(index, child);
            p.focus.push(child);
            p.nodes.clone()
        };
        self.parents.insert(child, parent);

        match ratio {
            Some(r) if siblings.len() > 1 => {
                for sib in siblings.iter().filter(|s| **s != child) {
                    self.node_mut(*sib)?.percent *= 1.0 - r;
                }
                self.node_mut(child)?.percent = r;
            }
            _ => {
                let even = 1.0 / siblings.len() as f64;
                for sib in &siblings {
                    self.node_mut(*sib)?.percent = even;
                }
            }
        }
        Ok(())
    }

    /// Remove `node` (and its subtree) from its parent, keeping it in the
    /// arena so it can be attached elsewhere.
    ///
    /// The removed percent is handed back to the remaining siblings in
    /// proportion to their current share.
    pub fn detach(&mut self, node: NodeId) -> Result<(), TreeError> {
        let parent = self.parents.remove(&node).ok_or(TreeError::NotAttached(node))?;
        let removed = self.node(node)?.percent;
        let siblings = {
            let p = self.node_mut(parent)?;
            p.nodes.retain(|n| *n != node);
            p.focus.retain(|n| *n != node);
            p.nodes.clone()
        };

        let remaining: f64 = siblings
            .iter()
            .filter_map(|s| self.nodes.get(s))
            .map(|n| n.percent)
            .sum();
        let share = 1.0 - removed;
        for sib in &siblings {
            let n = self.node_mut(*sib)?;
            if share > PERCENT_EPSILON && remaining > PERCENT_EPSILON {
                n.percent /= remaining;
            } else {
                n.percent = 1.0 / siblings.len() as f64;
            }
        }
        self.node_mut(node)?.percent = 1.0;

        if self.subtree(node).contains(&self.focused) {
            self.focused = parent;
        }
        Ok(())
    }

    /// Detach `node` and drop its whole subtree from the arena.
    pub fn remove(&mut self, node: NodeId) -> Result<(), TreeError> {
        if self.parents.contains_key(&node) {
            self.detach(node)?;
        }
        for id in self.subtree(node) {
            self.nodes.remove(&id);
            self.parents.remove(&id);
        }
        Ok(())
    }

    /// Put a new container with `layout` in `node`'s place and move `node`
    /// inside it.  The container inherits `node`'s position, percent and
    /// focus rank.
    pub fn wrap(&mut self, node: NodeId, layout: Layout) -> Result<NodeId, TreeError> {
        let parent = self.parent(node).ok_or(TreeError::NotAttached(node))?;
        let was_focused = self.focused == node;
        let container = self.create(NodeKind::Container, layout);
        let percent = self.node(node)?.percent;

        {
            let p = self.node_mut(parent)?;
            for slot in p.nodes.iter_mut().chain(p.focus.iter_mut()) {
                if *slot == node {
                    *slot = container;
                }
            }
        }
        self.parents.remove(&node);
        self.parents.insert(container, parent);
        self.node_mut(container)?.percent = percent;
        self.attach(container, node, None)?;

        if was_focused {
            self.focused = node;
        }
        Ok(container)
    }

    pub fn set_layout(&mut self, id: NodeId, layout: Layout) -> Result<(), TreeError> {
        self.node_mut(id)?.layout = layout;
        Ok(())
    }

    /// Make `id` the focused node, moving every link on its path to the
    /// front of its parent's focus stack.
    pub fn focus(&mut self, id: NodeId) -> Result<(), TreeError> {
        if !self.is_attached(id) {
            return Err(TreeError::NotAttached(id));
        }
        let mut child = id;
        while let Some(parent) = self.parent(child) {
            let p = self.node_mut(parent)?;
            p.focus.retain(|n| *n != child);
            p.focus.insert(0, child);
            child = parent;
        }
        self.focused = id;
        Ok(())
    }

    /// Follow focus stacks down from `id` to the most recently focused
    /// leaf beneath it (or `id` itself when it has no children).
    pub fn focus_leaf(&self, id: NodeId) -> NodeId {
        let mut cur = id;
        while let Some(next) = self.nodes.get(&cur).and_then(|n| n.focus.first()) {
            cur = *next;
        }
        cur
    }

    /// Nearest ancestor of `id` (including `id` itself) matching `pred`.
    pub fn ancestor(&self, id: NodeId, pred: impl Fn(&Node) -> bool) -> Option<NodeId> {
        let mut cur = Some(id);
        while let Some(c) = cur {
            let node = self.nodes.get(&c)?;
            if pred(node) {
                return Some(c);
            }
            cur = self.parent(c);
        }
        None
    }

    /// The workspace containing `id`, or `id` when it is a workspace.
    pub fn workspace_of(&self, id: NodeId) -> Option<NodeId> {
        self.ancestor(id, Node::is_workspace)
    }

    /// The output containing `id`, or `id` when it is an output.
    pub fn output_of(&self, id: NodeId) -> Option<NodeId> {
        self.ancestor(id, Node::is_output)
    }

    /// First node, in depth-first tree order, that satisfies `pred`.
    pub fn find(&self, pred: impl Fn(&Node) -> bool) -> Option<NodeId> {
        self.iter().find(|n| pred(n)).map(|n| n.id)
    }

    /// Every node satisfying `pred`, in depth-first tree order.
    pub fn find_all(&self, pred: impl Fn(&Node) -> bool) -> Vec<NodeId> {
        self.iter().filter(|n| pred(n)).map(|n| n.id).collect()
    }

    /// Depth-first iteration over attached nodes, starting at the root.
    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        self.subtree(self.root).into_iter().filter_map(|id| self.nodes.get(&id))
    }

    /// `id` and all its descendants in depth-first order.
    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            if let Some(n) = self.nodes.get(&cur) {
                stack.extend(n.nodes.iter().rev());
            }
        }
        out
    }

    /// Serializable copy of the whole tree.
    pub fn snapshot(&self) -> NodeSnapshot {
        self.snapshot_at(self.root, None)
    }

    /// Serializable copy of the subtree rooted at `id`.
    pub fn snapshot_node(&self, id: NodeId) -> Option<NodeSnapshot> {
        self.nodes.get(&id)?;
        let rect = self.output_of(id).and_then(|o| match &self.nodes.get(&o)?.kind {
            NodeKind::Output { rect, .. } => Some(*rect),
            _ => None,
        });
        Some(self.snapshot_at(id, rect))
    }

    fn snapshot_at(&self, id: NodeId, output_rect: Option<Rect>) -> NodeSnapshot {
        let Some(node) = self.nodes.get(&id) else {
            return NodeSnapshot {
                id: id.0,
                node_type: NodeType::Con,
                name: None,
                num: None,
                layout: "none".into(),
                percent: None,
                focused: false,
                focus: Vec::new(),
                window: None,
                app_id: None,
                rect: Rect::default(),
                nodes: Vec::new(),
            };
        };

        let (node_type, name, layout, percent, window, app_id, rect) = match &node.kind {
            NodeKind::Root => (
                NodeType::Root,
                Some("root".to_string()),
                "splith".to_string(),
                None,
                None,
                None,
                Rect::default(),
            ),
            NodeKind::Output { name, rect } => (
                NodeType::Output,
                Some(name.clone()),
                "output".to_string(),
                None,
                None,
                None,
                *rect,
            ),
            NodeKind::Workspace { num } => (
                NodeType::Workspace,
                Some(num.to_string()),
                node.layout.as_str().to_string(),
                None,
                None,
                None,
                output_rect.unwrap_or_default(),
            ),
            NodeKind::Container => (
                NodeType::Con,
                None,
                node.layout.as_str().to_string(),
                Some(node.percent),
                None,
                None,
                Rect::default(),
            ),
            NodeKind::Window { app_id } => (
                NodeType::Con,
                Some(app_id.clone()),
                "none".to_string(),
                Some(node.percent),
                Some(node.id.0),
                Some(app_id.clone()),
                Rect::default(),
            ),
        };

        let child_rect = match &node.kind {
            NodeKind::Output { rect, .. } => Some(*rect),
            _ => output_rect,
        };

        NodeSnapshot {
            id: node.id.0,
            node_type,
            name,
            num: node.num(),
            layout,
            percent,
            focused: node.id == self.focused,
            focus: node.focus.iter().map(|n| n.0).collect(),
            window,
            app_id,
            rect,
            nodes: node.nodes.iter().map(|c| self.snapshot_at(*c, child_rect)).collect(),
        }
    }

    /// Verify the structural invariants of the attached tree.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let root = self.nodes.get(&self.root).ok_or(InvariantViolation::NoOutput)?;
        if !root.nodes.iter().any(|o| self.nodes.get(o).is_some_and(Node::is_output)) {
            return Err(InvariantViolation::NoOutput);
        }

        for node in self.iter() {
            let has_workspace = node
                .nodes
                .iter()
                .any(|w| self.nodes.get(w).is_some_and(Node::is_workspace));
            if node.is_output() && !has_workspace {
                return Err(InvariantViolation::EmptyOutput(node.id));
            }
            if node.nodes.iter().any(|c| self.parents.get(c) != Some(&node.id)) {
                return Err(InvariantViolation::ParentTable(node.id));
            }
            let mut by_order = node.nodes.clone();
            let mut by_focus = node.focus.clone();
            by_order.sort();
            by_focus.sort();
            if by_order != by_focus {
                return Err(InvariantViolation::FocusStack(node.id));
            }
            if !node.nodes.is_empty() {
                let sum: f64 = node
                    .nodes
                    .iter()
                    .filter_map(|c| self.nodes.get(c))
                    .map(|c| c.percent)
                    .sum();
                if (sum - 1.0).abs() > PERCENT_EPSILON {
                    return Err(InvariantViolation::PercentSum { parent: node.id, sum });
                }
            }
        }

        // Every link from the root down to the focused node must head its
        // parent's focus stack.
        let mut cur = self.focused;
        if !self.is_attached(cur) {
            return Err(InvariantViolation::FocusPath(self.focused));
        }
        while let Some(parent) = self.parent(cur) {
            if self.nodes.get(&parent).and_then(|p| p.focus.first()) != Some(&cur) {
                return Err(InvariantViolation::FocusPath(self.focused));
            }
            cur = parent;
        }

        // Only an empty workspace may hold focus instead of a window.
        if !self.nodes.get(&self.focused).is_some_and(Node::is_window) {
            let scope = self.workspace_of(self.focused).unwrap_or(self.focused);
            let has_windows = self
                .subtree(scope)
                .iter()
                .any(|id| self.nodes.get(id).is_some_and(Node::is_window));
            if has_windows {
                return Err(InvariantViolation::WindowNotFocused(self.focused));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root → output → workspace, with the workspace focused.
    fn skeleton() -> (Tree, NodeId, NodeId) {
        let mut tree = Tree::new();
        let output = tree.create(
            NodeKind::Output {
                name: "VIRTUAL-1".into(),
                rect: Rect { x: 0, y: 0, width: 800, height: 600 },
            },
            Layout::SplitH,
        );
        tree.attach(tree.root(), output, None).unwrap();
        let ws = tree.create(NodeKind::Workspace { num: 1 }, Layout::SplitH);
        tree.attach(output, ws, None).unwrap();
        tree.focus(ws).unwrap();
        (tree, output, ws)
    }

    fn window(tree: &mut Tree, app: &str) -> NodeId {
        tree.create(NodeKind::Window { app_id: app.into() }, Layout::SplitH)
    }

    fn percent(tree: &Tree, id: NodeId) -> f64 {
        tree.get(id).unwrap().percent()
    }

    #[test]
    fn single_child_takes_whole_extent() {
        let (mut tree, _, ws) = skeleton();
        let a = window(&mut tree, "a");
        tree.attach(ws, a, None).unwrap();
        tree.focus(a).unwrap();
        assert_eq!(percent(&tree, a), 1.0);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn second_sibling_splits_evenly() {
        let (mut tree, _, ws) = skeleton();
        let a = window(&mut tree, "a");
        let b = window(&mut tree, "b");
        tree.attach(ws, a, None).unwrap();
        tree.attach(ws, b, None).unwrap();
        assert_eq!(percent(&tree, a), 0.5);
        assert_eq!(percent(&tree, b), 0.5);
        assert_eq!(tree.children(ws), &[a, b]);
    }

    #[test]
    fn explicit_ratio_scales_existing_siblings() {
        let (mut tree, _, ws) = skeleton();
        let a = window(&mut tree, "a");
        let b = window(&mut tree, "b");
        let c = window(&mut tree, "c");
        tree.attach(ws, a, None).unwrap();
        tree.attach(ws, b, None).unwrap();
        tree.attach(ws, c, Some(0.5)).unwrap();
        tree.focus(c).unwrap();
        assert!((percent(&tree, a) - 0.25).abs() < PERCENT_EPSILON);
        assert!((percent(&tree, b) - 0.25).abs() < PERCENT_EPSILON);
        assert_eq!(percent(&tree, c), 0.5);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn invalid_ratio_is_rejected_without_change() {
        let (mut tree, _, ws) = skeleton();
        let a = window(&mut tree, "a");
        assert_eq!(tree.attach(ws, a, Some(1.5)), Err(TreeError::InvalidRatio(1.5)));
        assert!(tree.children(ws).is_empty());
        assert!(tree.parent(a).is_none());
    }

    #[test]
    fn detach_redistributes_proportionally() {
        let (mut tree, _, ws) = skeleton();
        let a = window(&mut tree, "a");
        let b = window(&mut tree, "b");
        let c = window(&mut tree, "c");
        tree.attach(ws, a, None).unwrap();
        tree.attach(ws, b, None).unwrap();
        tree.attach(ws, c, Some(0.5)).unwrap();
        // a = b = 0.25, c = 0.5
        tree.focus(a).unwrap();
        tree.detach(c).unwrap();
        assert!((percent(&tree, a) - 0.5).abs() < PERCENT_EPSILON);
        assert!((percent(&tree, b) - 0.5).abs() < PERCENT_EPSILON);
        assert!(tree.parent(c).is_none());
        assert!(tree.get(c).is_some(), "detached nodes stay in the arena");
        tree.check_invariants().unwrap();
    }

    #[test]
    fn detach_unattached_node_fails() {
        let (mut tree, _, _) = skeleton();
        let a = window(&mut tree, "a");
        assert_eq!(tree.detach(a), Err(TreeError::NotAttached(a)));
    }

    #[test]
    fn attach_twice_fails() {
        let (mut tree, _, ws) = skeleton();
        let a = window(&mut tree, "a");
        tree.attach(ws, a, None).unwrap();
        assert_eq!(tree.attach(ws, a, None), Err(TreeError::AlreadyAttached(a)));
    }

    #[test]
    fn focus_moves_path_to_front_of_stacks() {
        let (mut tree, _, ws) = skeleton();
        let a = window(&mut tree, "a");
        let b = window(&mut tree, "b");
        tree.attach(ws, a, None).unwrap();
        tree.attach(ws, b, None).unwrap();
        tree.focus(b).unwrap();
        tree.focus(a).unwrap();
        assert_eq!(tree.get(ws).unwrap().focus_stack(), &[a, b]);
        assert_eq!(tree.focused(), a);
        assert_eq!(tree.focus_leaf(tree.root()), a);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn detaching_focused_node_moves_focus_to_parent() {
        let (mut tree, _, ws) = skeleton();
        let a = window(&mut tree, "a");
        tree.attach(ws, a, None).unwrap();
        tree.focus(a).unwrap();
        tree.detach(a).unwrap();
        assert_eq!(tree.focused(), ws);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn wrap_replaces_node_in_place() {
        let (mut tree, _, ws) = skeleton();
        let a = window(&mut tree, "a");
        let b = window(&mut tree, "b");
        tree.attach(ws, a, None).unwrap();
        tree.attach(ws, b, None).unwrap();
        tree.focus(b).unwrap();

        let con = tree.wrap(b, Layout::SplitV).unwrap();
        assert_eq!(tree.children(ws), &[a, con]);
        assert_eq!(tree.children(con), &[b]);
        assert_eq!(percent(&tree, con), 0.5);
        assert_eq!(percent(&tree, b), 1.0);
        assert_eq!(tree.focused(), b);
        assert_eq!(tree.parent(b), Some(con));
        tree.check_invariants().unwrap();
    }

    #[test]
    fn find_uses_tree_order() {
        let (mut tree, output, _) = skeleton();
        let ws2 = tree.create(NodeKind::Workspace { num: 2 }, Layout::SplitH);
        tree.attach(output, ws2, None).unwrap();
        assert_eq!(tree.find(|n| n.num() == Some(2)), Some(ws2));
        assert_eq!(tree.find_all(Node::is_workspace).len(), 2);
        assert_eq!(tree.find(|n| n.num() == Some(9)), None);
    }

    #[test]
    fn remove_drops_subtree() {
        let (mut tree, _, ws) = skeleton();
        let a = window(&mut tree, "a");
        tree.attach(ws, a, None).unwrap();
        let con = tree.wrap(a, Layout::Tabbed).unwrap();
        tree.remove(con).unwrap();
        assert!(tree.get(con).is_none());
        assert!(tree.get(a).is_none());
        assert!(tree.children(ws).is_empty());
    }

    #[test]
    fn empty_snapshot_shape() {
        let (tree, _, _) = skeleton();
        let snap = tree.snapshot();
        assert_eq!(snap.node_type, NodeType::Root);
        let output = &snap.nodes[0];
        assert_eq!(output.node_type, NodeType::Output);
        assert_eq!(output.layout, "output");
        let ws = &output.nodes[0];
        assert_eq!(ws.node_type, NodeType::Workspace);
        assert_eq!(ws.num, Some(1));
        assert!(ws.focused);
        assert!(ws.nodes.is_empty());
        assert_eq!(ws.rect.width, 800);
    }

    #[test]
    fn windows_serialize_as_con() {
        let (mut tree, _, ws) = skeleton();
        let a = window(&mut tree, "gedit");
        tree.attach(ws, a, None).unwrap();
        tree.focus(a).unwrap();
        let json = serde_json::to_value(tree.snapshot()).unwrap();
        let win = &json["nodes"][0]["nodes"][0]["nodes"][0];
        assert_eq!(win["type"], "con");
        assert_eq!(win["focused"], true);
        assert_eq!(win["percent"], 1.0);
        assert_eq!(win["app_id"], "gedit");
        assert_eq!(json["nodes"][0]["nodes"][0]["focused"], false);
    }

    #[test]
    fn invariant_check_catches_percent_drift() {
        let (mut tree, _, ws) = skeleton();
        let a = window(&mut tree, "a");
        let b = window(&mut tree, "b");
        tree.attach(ws, a, None).unwrap();
        tree.attach(ws, b, None).unwrap();
        tree.nodes.get_mut(&a).unwrap().percent = 0.7;
        assert!(matches!(
            tree.check_invariants(),
            Err(InvariantViolation::PercentSum { .. })
        ));
    }

    #[test]
    fn invariant_check_catches_empty_output() {
        let (mut tree, _, ws) = skeleton();
        tree.remove(ws).unwrap();
        assert!(matches!(tree.check_invariants(), Err(InvariantViolation::EmptyOutput(_))));
    }

    #[test]
    fn invariant_check_requires_a_focused_window() {
        let (mut tree, _, ws) = skeleton();
        tree.check_invariants().unwrap();

        let a = window(&mut tree, "a");
        tree.attach(ws, a, None).unwrap();
        assert_eq!(tree.check_invariants(), Err(InvariantViolation::WindowNotFocused(ws)));

        let con = tree.wrap(a, Layout::SplitV).unwrap();
        tree.focus(con).unwrap();
        assert_eq!(tree.check_invariants(), Err(InvariantViolation::WindowNotFocused(con)));

        tree.focus(a).unwrap();
        tree.check_invariants().unwrap();
    }

    #[test]
    fn layout_names_round_trip() {
        for layout in [Layout::SplitH, Layout::SplitV, Layout::Tabbed, Layout::Stacking] {
            assert_eq!(Layout::from_name(layout.as_str()), Some(layout));
        }
        assert_eq!(Layout::from_name("split"), None);
    }
}
