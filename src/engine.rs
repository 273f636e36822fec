//! Workspace navigation, layout switching, and window placement.
//!
//! [`Engine`] owns the [`Tree`] and applies parsed [`Command`]s to it.  Every
//! sub-command is atomic: the engine keeps a copy of its state, applies the
//! command, and puts the copy back if anything fails, so a rejected command
//! never leaves a half-edited tree behind.  Events produced while applying a
//! command are queued and only become visible through
//! [`drain_events`](Engine::drain_events) once the command succeeded.
//!
//! # Workspace order
//!
//! `workspace next`/`prev` walk every workspace across all outputs in
//! creation order, wrapping at the ends.  The `*_on_output` variants walk
//! only the focused output's workspaces in attachment order.
//!
//! # Reaping
//!
//! A workspace emptied by a move or left empty by a switch survives the
//! command that emptied it.  [`reap_empty_workspaces`](Engine::reap_empty_workspaces)
//! removes every empty workspace that is not its output's visible one; the
//! daemon calls it at the start of each IPC request.
//!
//! # Focus
//!
//! Whenever the focused workspace holds a window, a window is focused.  An
//! empty workspace holds focus itself.  `focus parent|child` are rejected
//! because they would park focus on a container.
//!
//! # Directions
//!
//! `focus <direction>` and `move <direction>` work on the tree alone.  They
//! walk up from the focused window to the nearest ancestor whose layout runs
//! along the direction (`splith`/`tabbed` for left and right,
//! `splitv`/`stacking` for up and down) and that has a sibling on that side.
//! Nothing happens when the walk reaches the workspace without finding one.

use crate::command::{
    self, Command, CommandResult, Criteria, Direction, FocusTarget, LayoutCommand, SplitDirection,
    WorkspaceTarget,
};
use crate::config::OutputConfig;
use crate::event::{Event, WindowChange, WindowEvent, WorkspaceChange, WorkspaceEvent};
use crate::tree::{Layout, Node, NodeId, NodeKind, Rect, Tree, TreeError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// A command whose target could not be resolved against the current tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolutionError {
    #[error("no window is focused")]
    NoFocusedWindow,
    #[error("focus {0} is not supported: focus stays on windows")]
    Unsupported(&'static str),
    #[error("no window matches the criteria")]
    NoMatch,
    #[error("node {0} is not a window")]
    NotAWindow(NodeId),
    #[error("no output is focused")]
    NoOutput,
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// A workspace remembered for `back_and_forth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WorkspaceRef {
    id: NodeId,
    num: i32,
}

/// Everything a command may change, cloned for rollback.
#[derive(Debug, Clone)]
struct State {
    tree: Tree,
    previous_workspace: Option<WorkspaceRef>,
    last_split: Layout,
}

/// Reply element of `GET_WORKSPACES`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub id: u64,
    pub num: i32,
    pub name: String,
    pub visible: bool,
    pub focused: bool,
    pub output: String,
    pub rect: Rect,
}

/// Reply element of `GET_OUTPUTS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputInfo {
    pub id: u64,
    pub name: String,
    pub active: bool,
    pub primary: bool,
    pub rect: Rect,
    pub current_workspace: Option<String>,
}

/// The navigation and layout state machine.  See the
/// [module documentation](self).
pub struct Engine {
    state: State,
    default_layout: Layout,
    pending: Vec<Event>,
    exit_requested: bool,
}

impl Engine {
    /// Build the initial tree: one output per entry of `outputs` (a single
    /// 1920×1080 `VIRTUAL-1` when empty), each with one empty workspace
    /// numbered 1, 2, … in output order.  The first output's workspace is
    /// focused.
    pub fn new(outputs: &[OutputConfig], default_layout: Layout) -> Self {
        let fallback = [OutputConfig::default()];
        let outputs = if outputs.is_empty() { &fallback[..] } else { outputs };

        let mut tree = Tree::new();
        let root = tree.root();
        let mut first_workspace = None;
        for (i, out) in outputs.iter().enumerate() {
            let output = tree.create(
                NodeKind::Output {
                    name: out.name.clone(),
                    rect: out.rect(),
                },
                Layout::SplitH,
            );
            let ws = tree.create(NodeKind::Workspace { num: i as i32 + 1 }, default_layout);
            // Fresh nodes under fresh parents: these cannot fail.
            let attached = tree
                .attach(root, output, None)
                .and_then(|_| tree.attach(output, ws, None));
            if let Err(e) = attached {
                warn!("failed to build output {}: {}", out.name, e);
                continue;
            }
            first_workspace.get_or_insert(ws);
        }
        if let Some(ws) = first_workspace {
            if let Err(e) = tree.focus(ws) {
                warn!("failed to focus initial workspace: {}", e);
            }
        }
        info!("engine started with {} output(s)", outputs.len());

        Self {
            state: State {
                tree,
                previous_workspace: None,
                last_split: Layout::SplitH,
            },
            default_layout,
            pending: Vec::new(),
            exit_requested: false,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.state.tree
    }

    /// Whether an `exit` command has been executed.
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Take the events produced since the last call, in order.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.pending)
    }

    //  Command interpreter

    /// Parse and apply a `RUN_COMMAND` payload, one result per sub-command.
    ///
    /// Sub-commands run in order; a failed one is rolled back on its own
    /// and does not stop the ones after it.
    pub fn execute(&mut self, text: &str) -> Vec<CommandResult> {
        command::parse(text)
            .into_iter()
            .map(|parsed| match parsed {
                Ok(cmd) => self.apply(&cmd),
                Err(e) => {
                    debug!("parse error in {:?}: {}", text, e);
                    CommandResult::parse_failed(&e)
                }
            })
            .collect()
    }

    /// Apply one parsed command atomically.
    pub fn apply(&mut self, cmd: &Command) -> CommandResult {
        let backup = self.state.clone();
        let mark = self.pending.len();
        match self.run(cmd) {
            Ok(()) => CommandResult::ok(),
            Err(e) => {
                info!("command {:?} rejected: {}", cmd, e);
                self.state = backup;
                self.pending.truncate(mark);
                CommandResult::failed(e)
            }
        }
    }

    fn run(&mut self, cmd: &Command) -> Result<(), ResolutionError> {
        match cmd {
            Command::Workspace(target) => {
                info!("workspace {}", target);
                if let Some(ws) = self.resolve_workspace(*target)? {
                    self.focus_workspace(ws)?;
                }
                Ok(())
            }
            Command::MoveToWorkspace(target) => {
                info!("move to workspace {}", target);
                self.move_to_workspace(*target)
            }
            Command::Layout(layout) => self.set_layout(layout),
            Command::Split(direction) => self.split(*direction),
            Command::Focus(target) => self.focus(*target),
            Command::Move(direction) => self.move_direction(*direction),
            Command::FocusMatching(criteria) => {
                let window = self
                    .tree()
                    .find(|n| criteria.matches(n))
                    .ok_or(ResolutionError::NoMatch)?;
                self.focus_window(window)
            }
            Command::Kill => {
                let window = self.focused_window().ok_or(ResolutionError::NoFocusedWindow)?;
                self.close_window(window)
            }
            Command::KillMatching(criteria) => self.kill_matching(criteria),
            Command::Nop => Ok(()),
            Command::Exit => {
                info!("exit requested");
                self.exit_requested = true;
                Ok(())
            }
        }
    }

    //  Queries

    /// The workspace holding the focused node.
    pub fn focused_workspace(&self) -> Option<NodeId> {
        self.tree().workspace_of(self.tree().focused())
    }

    pub fn focused_output(&self) -> Option<NodeId> {
        self.tree().output_of(self.tree().focused())
    }

    /// The focused node, if it is a window.
    pub fn focused_window(&self) -> Option<NodeId> {
        let focused = self.tree().focused();
        self.tree().get(focused).filter(|n| n.is_window()).map(Node::id)
    }

    /// Number of the focused workspace.
    pub fn focused_workspace_num(&self) -> Option<i32> {
        self.focused_workspace()
            .and_then(|ws| self.tree().get(ws))
            .and_then(Node::num)
    }

    /// All workspaces across all outputs in creation order.
    pub fn workspaces(&self) -> Vec<NodeId> {
        let mut all = self.tree().find_all(Node::is_workspace);
        all.sort();
        all
    }

    /// Workspaces of `output` in attachment order.
    pub fn workspaces_on(&self, output: NodeId) -> Vec<NodeId> {
        self.tree()
            .children(output)
            .iter()
            .copied()
            .filter(|id| self.tree().get(*id).is_some_and(Node::is_workspace))
            .collect()
    }

    /// The workspace currently shown on `output`.
    fn visible_workspace(&self, output: NodeId) -> Option<NodeId> {
        self.tree()
            .get(output)
            .and_then(|o| o.focus_stack().first().copied())
    }

    /// `GET_WORKSPACES` reply, in tree order.
    pub fn workspace_infos(&self) -> Vec<WorkspaceInfo> {
        let focused = self.focused_workspace();
        self.tree()
            .find_all(Node::is_workspace)
            .into_iter()
            .filter_map(|ws| {
                let node = self.tree().get(ws)?;
                let output = self.tree().output_of(ws)?;
                let (name, rect) = match self.tree().get(output)?.kind() {
                    NodeKind::Output { name, rect } => (name.clone(), *rect),
                    _ => return None,
                };
                let num = node.num()?;
                Some(WorkspaceInfo {
                    id: ws.0,
                    num,
                    name: num.to_string(),
                    visible: self.visible_workspace(output) == Some(ws),
                    focused: focused == Some(ws),
                    output: name,
                    rect,
                })
            })
            .collect()
    }

    /// `GET_OUTPUTS` reply, in tree order.
    pub fn output_infos(&self) -> Vec<OutputInfo> {
        let root = self.tree().root();
        self.tree()
            .children(root)
            .iter()
            .enumerate()
            .filter_map(|(i, output)| {
                let (name, rect) = match self.tree().get(*output)?.kind() {
                    NodeKind::Output { name, rect } => (name.clone(), *rect),
                    _ => return None,
                };
                let current_workspace = self
                    .visible_workspace(*output)
                    .and_then(|ws| self.tree().get(ws))
                    .and_then(Node::num)
                    .map(|n| n.to_string());
                Some(OutputInfo {
                    id: output.0,
                    name,
                    active: true,
                    primary: i == 0,
                    rect,
                    current_workspace,
                })
            })
            .collect()
    }

    //  Workspaces

    /// Resolve a target to an existing or newly created workspace, or
    /// `None` when the target is a no-op from here.
    fn resolve_workspace(
        &mut self,
        target: WorkspaceTarget,
    ) -> Result<Option<NodeId>, ResolutionError> {
        let current = self.focused_workspace().ok_or(ResolutionError::NoOutput)?;
        let resolved = match target {
            WorkspaceTarget::Number(num) => Some(self.workspace_by_number(num)?),
            WorkspaceTarget::Next => cycle(&self.workspaces(), current, 1),
            WorkspaceTarget::Prev => cycle(&self.workspaces(), current, -1),
            WorkspaceTarget::NextOnOutput | WorkspaceTarget::PrevOnOutput => {
                let output = self.focused_output().ok_or(ResolutionError::NoOutput)?;
                let step = if target == WorkspaceTarget::NextOnOutput { 1 } else { -1 };
                cycle(&self.workspaces_on(output), current, step)
            }
            WorkspaceTarget::BackAndForth => match self.state.previous_workspace {
                None => {
                    debug!("back_and_forth without history");
                    None
                }
                Some(prev) if self.tree().get(prev.id).is_some_and(Node::is_workspace) => {
                    Some(prev.id)
                }
                Some(prev) => Some(self.workspace_by_number(prev.num)?),
            },
        };
        Ok(resolved.filter(|ws| *ws != current))
    }

    /// The first workspace numbered `num` in tree order, created on the
    /// focused output when there is none.
    fn workspace_by_number(&mut self, num: i32) -> Result<NodeId, ResolutionError> {
        if let Some(ws) = self.tree().find(|n| n.num() == Some(num)) {
            return Ok(ws);
        }
        let output = self.focused_output().ok_or(ResolutionError::NoOutput)?;
        let tree = &mut self.state.tree;
        let ws = tree.create(NodeKind::Workspace { num }, self.default_layout);
        tree.attach(output, ws, None)?;
        debug!("created workspace {} on {}", num, output);
        let current = tree.snapshot_node(ws);
        self.pending.push(Event::Workspace(WorkspaceEvent {
            change: WorkspaceChange::Init,
            current,
            old: None,
        }));
        Ok(ws)
    }

    /// Focus `ws` (its most recently focused window, or itself when empty),
    /// remembering the workspace we came from.
    fn focus_workspace(&mut self, ws: NodeId) -> Result<(), ResolutionError> {
        let old = self.focused_workspace();
        if old == Some(ws) {
            return Ok(());
        }
        let leaf = self.tree().focus_leaf(ws);
        self.state.tree.focus(leaf)?;
        self.remember(old);
        self.push_workspace_focus(ws, old);
        Ok(())
    }

    fn remember(&mut self, workspace: Option<NodeId>) {
        self.state.previous_workspace = workspace.and_then(|id| {
            let num = self.tree().get(id)?.num()?;
            Some(WorkspaceRef { id, num })
        });
    }

    fn push_workspace_focus(&mut self, current: NodeId, old: Option<NodeId>) {
        let event = WorkspaceEvent {
            change: WorkspaceChange::Focus,
            current: self.tree().snapshot_node(current),
            old: old.and_then(|o| self.tree().snapshot_node(o)),
        };
        self.pending.push(Event::Workspace(event));
    }

    /// Remove every empty workspace that is not its output's visible one.
    /// Returns how many were removed.
    pub fn reap_empty_workspaces(&mut self) -> usize {
        let doomed: Vec<NodeId> = self
            .tree()
            .find_all(|n| n.is_workspace() && n.nodes().is_empty())
            .into_iter()
            .filter(|ws| {
                let output = self.tree().output_of(*ws);
                output.and_then(|o| self.visible_workspace(o)) != Some(*ws)
            })
            .collect();

        for ws in &doomed {
            let snapshot = self.tree().snapshot_node(*ws);
            match self.state.tree.remove(*ws) {
                Ok(()) => {
                    debug!("reaped empty workspace {}", ws);
                    self.pending.push(Event::Workspace(WorkspaceEvent {
                        change: WorkspaceChange::Empty,
                        current: snapshot,
                        old: None,
                    }));
                }
                Err(e) => warn!("failed to reap workspace {}: {}", ws, e),
            }
        }
        doomed.len()
    }

    //  Windows

    /// Move the focused window to `target` and follow it.
    fn move_to_workspace(&mut self, target: WorkspaceTarget) -> Result<(), ResolutionError> {
        let focused = self.focused_window().ok_or(ResolutionError::NoFocusedWindow)?;
        let Some(dest) = self.resolve_workspace(target)? else {
            debug!("move target is the current workspace");
            return Ok(());
        };

        let origin = self.focused_workspace();
        let old_parent = self.tree().parent(focused);
        self.state.tree.detach(focused)?;
        if let Some(parent) = old_parent {
            self.collapse(parent)?;
        }
        self.state.tree.attach(dest, focused, None)?;
        self.state.tree.focus(focused)?;
        self.remember(origin);

        if let Some(container) = self.tree().snapshot_node(focused) {
            self.pending.push(Event::Window(WindowEvent {
                change: WindowChange::Move,
                container,
            }));
        }
        self.push_workspace_focus(dest, origin);
        Ok(())
    }

    /// Remove `node` and its ancestors while they are containers with no
    /// children left.
    fn collapse(&mut self, node: NodeId) -> Result<(), TreeError> {
        let mut cur = node;
        loop {
            let Some(n) = self.tree().get(cur) else {
                return Ok(());
            };
            if !n.is_container() || !n.nodes().is_empty() {
                return Ok(());
            }
            let parent = self.tree().parent(cur);
            self.state.tree.remove(cur)?;
            match parent {
                Some(p) => cur = p,
                None => return Ok(()),
            }
        }
    }

    /// Attach a new window next to the focused one (or into the focused
    /// workspace) and focus it.
    ///
    /// This is the entry point for whatever creates windows; it is not part
    /// of the command language.
    pub fn open_window(&mut self, app_id: &str) -> Result<NodeId, ResolutionError> {
        let focused = self.tree().focused();
        let window = self.state.tree.create(
            NodeKind::Window {
                app_id: app_id.to_string(),
            },
            Layout::SplitH,
        );

        let attached = match self.tree().get(focused).map(|n| n.kind().clone()) {
            Some(NodeKind::Window { .. }) => match self.tree().parent(focused) {
                Some(parent) => {
                    let index = self
                        .tree()
                        .children(parent)
                        .iter()
                        .position(|c| *c == focused)
                        .map_or(0, |i| i + 1);
                    self.state.tree.attach_at(parent, index, window, None)
                }
                None => Err(TreeError::NotAttached(focused)),
            },
            Some(NodeKind::Workspace { .. }) => self.state.tree.attach(focused, window, None),
            _ => match self.focused_workspace() {
                Some(ws) => self.state.tree.attach(ws, window, None),
                None => Err(TreeError::NotAttached(focused)),
            },
        };
        if let Err(e) = attached.and_then(|_| self.state.tree.focus(window)) {
            let _ = self.state.tree.remove(window);
            return Err(e.into());
        }
        info!("opened window {} ({})", window, app_id);

        if let Some(container) = self.tree().snapshot_node(window) {
            self.pending.push(Event::Window(WindowEvent {
                change: WindowChange::New,
                container: container.clone(),
            }));
            self.pending.push(Event::Window(WindowEvent {
                change: WindowChange::Focus,
                container,
            }));
        }
        Ok(window)
    }

    /// Close `window`, collapse emptied containers, and hand focus to the
    /// next most recently focused sibling when the window had focus.
    pub fn close_window(&mut self, window: NodeId) -> Result<(), ResolutionError> {
        if !self.tree().get(window).is_some_and(Node::is_window) {
            return Err(ResolutionError::NotAWindow(window));
        }
        let had_focus = self.tree().focused() == window;
        let parent = self.tree().parent(window).ok_or(TreeError::NotAttached(window))?;
        let snapshot = self.tree().snapshot_node(window);

        self.state.tree.remove(window)?;
        self.collapse(parent)?;

        if had_focus {
            // `remove` left focus on the nearest surviving ancestor.
            let anchor = self.tree().focused();
            let leaf = self.tree().focus_leaf(anchor);
            self.state.tree.focus(leaf)?;
        }
        info!("closed window {}", window);
        if let Some(container) = snapshot {
            self.pending.push(Event::Window(WindowEvent {
                change: WindowChange::Close,
                container,
            }));
        }
        Ok(())
    }

    //  Layout

    /// The node a `layout` command acts on: the parent of the focused
    /// window, or the focused workspace when it has none.
    fn layout_target(&self) -> Option<NodeId> {
        match self.focused_window() {
            Some(window) => self.tree().parent(window),
            None => self.focused_workspace(),
        }
    }

    fn set_layout(&mut self, cmd: &LayoutCommand) -> Result<(), ResolutionError> {
        let target = self.layout_target().ok_or(ResolutionError::NoOutput)?;
        let current = self
            .tree()
            .get(target)
            .map(Node::layout)
            .ok_or(TreeError::UnknownNode(target))?;

        let next = match cmd {
            LayoutCommand::Set(layout) => *layout,
            LayoutCommand::Default => self.default_layout,
            LayoutCommand::ToggleSplit => match current {
                Layout::SplitH => Layout::SplitV,
                Layout::SplitV => Layout::SplitH,
                _ => self.state.last_split,
            },
            LayoutCommand::ToggleList(items) => {
                let chosen = match items.iter().position(|item| item.matches(current)) {
                    Some(i) => items.get((i + 1) % items.len()),
                    None => items.first(),
                };
                match chosen {
                    Some(command::LayoutItem::Mode(layout)) => *layout,
                    Some(command::LayoutItem::Split) => {
                        if current.is_split() {
                            current
                        } else {
                            self.state.last_split
                        }
                    }
                    None => current,
                }
            }
        };

        info!("layout {} -> {} on {}", current, next, target);
        self.state.tree.set_layout(target, next)?;
        if next.is_split() {
            self.state.last_split = next;
        }
        Ok(())
    }

    /// Wrap the focused window in a new container split in `direction`.
    ///
    /// When the window is its parent's only child, the parent's layout is
    /// changed instead of nesting another container.
    fn split(&mut self, direction: SplitDirection) -> Result<(), ResolutionError> {
        let window = self.focused_window().ok_or(ResolutionError::NoFocusedWindow)?;
        let parent = self.tree().parent(window).ok_or(TreeError::NotAttached(window))?;
        let parent_layout = self
            .tree()
            .get(parent)
            .map(Node::layout)
            .ok_or(TreeError::UnknownNode(parent))?;

        let layout = match direction {
            SplitDirection::Horizontal => Layout::SplitH,
            SplitDirection::Vertical => Layout::SplitV,
            SplitDirection::Toggle if parent_layout == Layout::SplitH => Layout::SplitV,
            SplitDirection::Toggle => Layout::SplitH,
        };

        if self.tree().children(parent).len() == 1 {
            self.state.tree.set_layout(parent, layout)?;
        } else {
            let container = self.state.tree.wrap(window, layout)?;
            debug!("wrapped {} in {} ({})", window, container, layout);
        }
        self.state.last_split = layout;
        Ok(())
    }

    //  Focus

    fn focus(&mut self, target: FocusTarget) -> Result<(), ResolutionError> {
        // An empty workspace has nothing to move between.
        let Some(focused) = self.focused_window() else {
            return match target {
                FocusTarget::Parent => Err(ResolutionError::Unsupported("parent")),
                FocusTarget::Child => Err(ResolutionError::Unsupported("child")),
                _ => Ok(()),
            };
        };
        let neighbour = match target {
            FocusTarget::Next | FocusTarget::Prev => {
                let parent = self.tree().parent(focused).ok_or(TreeError::NotAttached(focused))?;
                let siblings = self.tree().children(parent);
                let index = siblings
                    .iter()
                    .position(|c| *c == focused)
                    .ok_or(TreeError::NotAttached(focused))?;
                if target == FocusTarget::Next {
                    siblings.get(index + 1).copied()
                } else {
                    index.checked_sub(1).and_then(|i| siblings.get(i).copied())
                }
            }
            FocusTarget::Direction(direction) => self.neighbour(focused, direction).map(|(_, n)| n),
            FocusTarget::Parent => return Err(ResolutionError::Unsupported("parent")),
            FocusTarget::Child => return Err(ResolutionError::Unsupported("child")),
        };
        match neighbour {
            Some(n) => {
                let leaf = self.tree().focus_leaf(n);
                self.focus_window(leaf)
            }
            None => Ok(()),
        }
    }

    /// Focus `window`, switching workspaces when it lives elsewhere.
    fn focus_window(&mut self, window: NodeId) -> Result<(), ResolutionError> {
        if !self.tree().get(window).is_some_and(Node::is_window) {
            return Err(ResolutionError::NotAWindow(window));
        }
        if self.tree().focused() == window {
            return Ok(());
        }
        let old = self.focused_workspace();
        let ws = self.tree().workspace_of(window);
        self.state.tree.focus(window)?;
        if let Some(ws) = ws.filter(|ws| old != Some(*ws)) {
            self.remember(old);
            self.push_workspace_focus(ws, old);
        }
        if let Some(container) = self.tree().snapshot_node(window) {
            self.pending.push(Event::Window(WindowEvent {
                change: WindowChange::Focus,
                container,
            }));
        }
        Ok(())
    }

    /// Walk up from `node` to the nearest ancestor laid out along `direction`
    /// with a sibling on that side.  Returns the child of that ancestor on
    /// the path from `node`, and the sibling.
    fn neighbour(&self, node: NodeId, direction: Direction) -> Option<(NodeId, NodeId)> {
        let mut cur = node;
        loop {
            let parent = self.tree().parent(cur)?;
            let p = self.tree().get(parent)?;
            if direction.runs_along(p.layout()) {
                let index = p.nodes().iter().position(|c| *c == cur)?;
                let side = if direction.is_forward() {
                    p.nodes().get(index + 1)
                } else {
                    index.checked_sub(1).and_then(|i| p.nodes().get(i))
                };
                if let Some(sibling) = side {
                    return Some((cur, *sibling));
                }
            }
            if p.is_workspace() {
                return None;
            }
            cur = parent;
        }
    }

    /// Move the focused window one step in `direction`.
    ///
    /// Inside a parent laid out along the direction the window swaps places
    /// with its neighbour.  Otherwise it leaves its container and lands
    /// beside the nearest ancestor container that has room on that side.
    fn move_direction(&mut self, direction: Direction) -> Result<(), ResolutionError> {
        let window = self.focused_window().ok_or(ResolutionError::NoFocusedWindow)?;
        let Some((anchor, sibling)) = self.neighbour(window, direction) else {
            debug!("nothing {} of {}", direction, window);
            return Ok(());
        };
        let target = self.tree().parent(anchor).ok_or(TreeError::NotAttached(anchor))?;
        let old_parent = self.tree().parent(window).ok_or(TreeError::NotAttached(window))?;
        // Swap with a sibling window, or step out beside the container.
        let beside = if anchor == window { sibling } else { anchor };

        self.state.tree.detach(window)?;
        let index = self
            .tree()
            .children(target)
            .iter()
            .position(|c| *c == beside)
            .ok_or(TreeError::NotAttached(beside))?;
        let index = if direction.is_forward() { index + 1 } else { index };
        self.state.tree.attach_at(target, index, window, None)?;
        self.collapse(old_parent)?;
        self.state.tree.focus(window)?;
        info!("moved {} {}", window, direction);

        if let Some(container) = self.tree().snapshot_node(window) {
            self.pending.push(Event::Window(WindowEvent {
                change: WindowChange::Move,
                container,
            }));
        }
        Ok(())
    }

    /// Close every window matching `criteria`.
    fn kill_matching(&mut self, criteria: &Criteria) -> Result<(), ResolutionError> {
        let windows = self.tree().find_all(|n| criteria.matches(n));
        if windows.is_empty() {
            return Err(ResolutionError::NoMatch);
        }
        for window in windows {
            self.close_window(window)?;
        }
        Ok(())
    }
}

/// Step `delta` places from `current` within `ring`, wrapping at both ends.
fn cycle(ring: &[NodeId], current: NodeId, delta: isize) -> Option<NodeId> {
    let len = ring.len() as isize;
    let index = ring.iter().position(|id| *id == current)? as isize;
    let next = (index + delta).rem_euclid(len);
    ring.get(next as usize).copied()
}
