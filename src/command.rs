//! The textual command language accepted by `RUN_COMMAND`.
//!
//! A payload holds one or more sub-commands separated by `;` (or `,`).
//! Each sub-command is a whitespace-delimited list of tokens; double quotes
//! group a token that contains spaces.  Verbs are case-sensitive.
//!
//! A group may start with window criteria in brackets.  They scope every
//! sub-command up to the next `;`, including ones chained with `,`.
//!
//! ```text
//! workspace 4
//! workspace next_on_output
//! move window to workspace back_and_forth
//! layout toggle stacking splith tabbed
//! split vertical; focus prev
//! focus left; move down
//! [con_id=12] focus
//! [app_id="gedit"] kill
//! exit
//! ```
//!
//! Parsing never touches the tree: [`parse`] yields a typed [`Command`] (or
//! a [`ParseError`]) per sub-command, and the
//! [`Engine`](crate::engine::Engine) applies them.

use crate::tree::{Layout, Node, NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a `workspace` or `move … to workspace` command goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceTarget {
    /// A workspace by number, created on the focused output if missing.
    Number(i32),
    Next,
    Prev,
    NextOnOutput,
    PrevOnOutput,
    BackAndForth,
}

impl fmt::Display for WorkspaceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkspaceTarget::Number(n) => write!(f, "{}", n),
            WorkspaceTarget::Next => write!(f, "next"),
            WorkspaceTarget::Prev => write!(f, "prev"),
            WorkspaceTarget::NextOnOutput => write!(f, "next_on_output"),
            WorkspaceTarget::PrevOnOutput => write!(f, "prev_on_output"),
            WorkspaceTarget::BackAndForth => write!(f, "back_and_forth"),
        }
    }
}

/// One entry of a `layout toggle …` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutItem {
    Mode(Layout),
    /// Either split orientation; resolves to the last one used.
    Split,
}

impl LayoutItem {
    /// Whether `layout` is the mode this item stands for.
    pub fn matches(self, layout: Layout) -> bool {
        match self {
            LayoutItem::Mode(mode) => mode == layout,
            LayoutItem::Split => layout.is_split(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutCommand {
    Set(Layout),
    /// The configured default layout.
    Default,
    /// Flip between `splith` and `splitv`.
    ToggleSplit,
    /// Advance to the entry after the current layout, or the first entry
    /// when the current layout is not listed.
    ToggleList(Vec<LayoutItem>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDirection {
    Horizontal,
    Vertical,
    Toggle,
}

/// A direction for `focus` and `move`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub fn from_name(name: &str) -> Option<Direction> {
        match name {
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            _ => None,
        }
    }

    /// Whether `layout` places children along this direction's axis:
    /// `splith` and `tabbed` left to right, `splitv` and `stacking` top to
    /// bottom.
    pub fn runs_along(self, layout: Layout) -> bool {
        match self {
            Direction::Left | Direction::Right => matches!(layout, Layout::SplitH | Layout::Tabbed),
            Direction::Up | Direction::Down => matches!(layout, Layout::SplitV | Layout::Stacking),
        }
    }

    /// Whether this direction walks towards later siblings.
    pub fn is_forward(self) -> bool {
        matches!(self, Direction::Right | Direction::Down)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Up => "up",
            Direction::Down => "down",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusTarget {
    Next,
    Prev,
    /// Accepted for i3 compatibility; focus never leaves windows, so the
    /// engine rejects these.
    Parent,
    Child,
    Direction(Direction),
}

/// Window criteria from a `[key=value ...]` prefix.  Every given key must
/// match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    pub con_id: Option<NodeId>,
    pub app_id: Option<String>,
}

impl Criteria {
    pub fn matches(&self, node: &Node) -> bool {
        let NodeKind::Window { app_id } = node.kind() else {
            return false;
        };
        self.con_id.map_or(true, |id| id == node.id())
            && self.app_id.as_ref().map_or(true, |want| want == app_id)
    }
}

/// A parsed sub-command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Workspace(WorkspaceTarget),
    /// Move the focused window (or container) to a workspace and follow it.
    MoveToWorkspace(WorkspaceTarget),
    Layout(LayoutCommand),
    Split(SplitDirection),
    Focus(FocusTarget),
    /// Move the focused window one place in a direction.
    Move(Direction),
    /// `[criteria] focus`: focus the first matching window in tree order.
    FocusMatching(Criteria),
    /// Close the focused window.
    Kill,
    /// `[criteria] kill`: close every matching window.
    KillMatching(Criteria),
    Nop,
    Exit,
}

/// Malformed command text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("{command}: expected {expected}")]
    MissingArgument { command: &'static str, expected: &'static str },
    #[error("{command}: invalid argument {arg:?}")]
    InvalidArgument { command: &'static str, arg: String },
    #[error("{command}: unexpected trailing arguments {args:?}")]
    TrailingArguments { command: &'static str, args: Vec<String> },
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("unterminated criteria")]
    UnterminatedCriteria,
    #[error("invalid criterion {0:?}")]
    InvalidCriterion(String),
    #[error("{0}: criteria are not supported")]
    CriteriaNotSupported(String),
}

/// Outcome of one sub-command, serialized as an element of the
/// `RUN_COMMAND` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parse_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            parse_error: false,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            parse_error: false,
            error: Some(error.to_string()),
        }
    }

    pub fn parse_failed(error: &ParseError) -> Self {
        Self {
            success: false,
            parse_error: true,
            error: Some(error.to_string()),
        }
    }
}

/// One sub-command as tokens.
#[derive(Debug, Default)]
struct Piece {
    /// Raw text between `[` and `]`, when the piece starts a scoped group.
    criteria: Option<String>,
    tokens: Vec<String>,
    /// Whether a `,` joined this piece to the previous one.
    chained: bool,
}

impl Piece {
    fn is_empty(&self) -> bool {
        self.criteria.is_none() && self.tokens.is_empty()
    }
}

/// Split `text` into sub-commands of tokens.
fn tokenize(text: &str) -> Result<Vec<Piece>, ParseError> {
    let mut pieces = Vec::new();
    let mut piece = Piece::default();
    let mut token = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if quoted {
            if c == '"' {
                quoted = false;
            } else {
                token.push(c);
            }
            continue;
        }
        match c {
            '"' => {
                quoted = true;
                in_token = true;
            }
            '[' if !in_token && piece.is_empty() => {
                let mut raw = String::new();
                let mut in_quotes = false;
                loop {
                    match chars.next() {
                        None => return Err(ParseError::UnterminatedCriteria),
                        Some(']') if !in_quotes => break,
                        Some(c) => {
                            if c == '"' {
                                in_quotes = !in_quotes;
                            }
                            raw.push(c);
                        }
                    }
                }
                piece.criteria = Some(raw);
            }
            ';' | ',' => {
                if in_token {
                    piece.tokens.push(std::mem::take(&mut token));
                    in_token = false;
                }
                if !piece.is_empty() {
                    pieces.push(std::mem::take(&mut piece));
                }
                piece.chained = c == ',';
            }
            c if c.is_whitespace() => {
                if in_token {
                    piece.tokens.push(std::mem::take(&mut token));
                    in_token = false;
                }
            }
            c => {
                token.push(c);
                in_token = true;
            }
        }
    }

    if quoted {
        return Err(ParseError::UnterminatedQuote);
    }
    if in_token {
        piece.tokens.push(token);
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    Ok(pieces)
}

/// Parse the inside of `[...]`: space-separated `key=value` pairs, values
/// optionally quoted.
fn parse_criteria(raw: &str) -> Result<Criteria, ParseError> {
    let mut criteria = Criteria::default();
    let mut rest = raw.trim_start();
    if rest.is_empty() {
        return Err(ParseError::InvalidCriterion(String::new()));
    }
    while !rest.is_empty() {
        let (key, tail) = rest
            .split_once('=')
            .ok_or_else(|| ParseError::InvalidCriterion(rest.to_string()))?;
        let (value, tail) = match tail.strip_prefix('"') {
            Some(quoted) => quoted
                .split_once('"')
                .ok_or_else(|| ParseError::InvalidCriterion(rest.to_string()))?,
            None => tail.split_once(char::is_whitespace).unwrap_or((tail, "")),
        };
        match key.trim() {
            "con_id" => {
                let id = value
                    .parse()
                    .map_err(|_| ParseError::InvalidCriterion(format!("con_id={}", value)))?;
                criteria.con_id = Some(NodeId(id));
            }
            "app_id" => criteria.app_id = Some(value.to_string()),
            other => return Err(ParseError::InvalidCriterion(other.to_string())),
        }
        rest = tail.trim_start();
    }
    Ok(criteria)
}

/// Parse a full `RUN_COMMAND` payload, one result per sub-command.
pub fn parse(text: &str) -> Vec<Result<Command, ParseError>> {
    let pieces = match tokenize(text) {
        Err(e) => return vec![Err(e)],
        Ok(pieces) if pieces.is_empty() => return vec![Err(ParseError::Empty)],
        Ok(pieces) => pieces,
    };
    let mut scope: Option<Result<Criteria, ParseError>> = None;
    pieces
        .iter()
        .map(|piece| {
            if !piece.chained {
                scope = None;
            }
            if let Some(raw) = &piece.criteria {
                scope = Some(parse_criteria(raw));
            }
            match &scope {
                None => parse_tokens(&piece.tokens),
                Some(Ok(criteria)) => parse_scoped(criteria, &piece.tokens),
                Some(Err(e)) => Err(e.clone()),
            }
        })
        .collect()
}

/// Parse a sub-command that runs under `criteria`.
fn parse_scoped(criteria: &Criteria, tokens: &[String]) -> Result<Command, ParseError> {
    let (verb, args) = tokens.split_first().ok_or(ParseError::Empty)?;
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match verb.as_str() {
        "focus" => no_arguments("focus", &args).map(|_| Command::FocusMatching(criteria.clone())),
        "kill" => no_arguments("kill", &args).map(|_| Command::KillMatching(criteria.clone())),
        other => Err(ParseError::CriteriaNotSupported(other.to_string())),
    }
}

/// Parse a single sub-command given as tokens.
pub fn parse_tokens(tokens: &[String]) -> Result<Command, ParseError> {
    let (verb, args) = tokens.split_first().ok_or(ParseError::Empty)?;
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match verb.as_str() {
        "workspace" => parse_workspace_target("workspace", &args).map(Command::Workspace),
        "move" => parse_move(&args),
        "layout" => parse_layout(&args).map(Command::Layout),
        "split" => parse_split(&args).map(Command::Split),
        "focus" => parse_focus(&args).map(Command::Focus),
        "kill" => no_arguments("kill", &args).map(|_| Command::Kill),
        "nop" => Ok(Command::Nop),
        "exit" => no_arguments("exit", &args).map(|_| Command::Exit),
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}

fn no_arguments(command: &'static str, args: &[&str]) -> Result<(), ParseError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(ParseError::TrailingArguments {
            command,
            args: args.iter().map(|s| s.to_string()).collect(),
        })
    }
}

fn parse_workspace_number(command: &'static str, arg: &str) -> Result<i32, ParseError> {
    match arg.parse::<i32>() {
        Ok(n) if n >= 0 => Ok(n),
        _ => Err(ParseError::InvalidArgument {
            command,
            arg: arg.to_string(),
        }),
    }
}

fn parse_workspace_target(
    command: &'static str,
    args: &[&str],
) -> Result<WorkspaceTarget, ParseError> {
    let (first, rest) = args.split_first().ok_or(ParseError::MissingArgument {
        command,
        expected: "a workspace number or next/prev/next_on_output/prev_on_output/back_and_forth",
    })?;

    let (target, rest) = match *first {
        "next" => (WorkspaceTarget::Next, rest),
        "prev" => (WorkspaceTarget::Prev, rest),
        "next_on_output" => (WorkspaceTarget::NextOnOutput, rest),
        "prev_on_output" => (WorkspaceTarget::PrevOnOutput, rest),
        "back_and_forth" => (WorkspaceTarget::BackAndForth, rest),
        "number" => {
            let (num, rest) = rest.split_first().ok_or(ParseError::MissingArgument {
                command,
                expected: "a number after `number`",
            })?;
            (WorkspaceTarget::Number(parse_workspace_number(command, num)?), rest)
        }
        other => (WorkspaceTarget::Number(parse_workspace_number(command, other)?), rest),
    };
    no_arguments(command, rest)?;
    Ok(target)
}

/// `move [window|container] [to] workspace <target>` or
/// `move [window|container] <direction>`
fn parse_move(args: &[&str]) -> Result<Command, ParseError> {
    let mut rest = args;
    if let Some((&("window" | "container"), tail)) = rest.split_first() {
        rest = tail;
    }
    if let Some((first, tail)) = rest.split_first() {
        if let Some(direction) = Direction::from_name(first) {
            no_arguments("move", tail)?;
            return Ok(Command::Move(direction));
        }
    }
    if let Some((&"to", tail)) = rest.split_first() {
        rest = tail;
    }
    match rest.split_first() {
        Some((&"workspace", tail)) => {
            parse_workspace_target("move", tail).map(Command::MoveToWorkspace)
        }
        Some((other, _)) => Err(ParseError::InvalidArgument {
            command: "move",
            arg: other.to_string(),
        }),
        None => Err(ParseError::MissingArgument {
            command: "move",
            expected: "`to workspace <target>` or a direction",
        }),
    }
}

fn parse_layout_item(arg: &str) -> Result<LayoutItem, ParseError> {
    if arg == "split" {
        return Ok(LayoutItem::Split);
    }
    Layout::from_name(arg)
        .map(LayoutItem::Mode)
        .ok_or_else(|| ParseError::InvalidArgument {
            command: "layout",
            arg: arg.to_string(),
        })
}

fn parse_layout(args: &[&str]) -> Result<LayoutCommand, ParseError> {
    let (first, rest) = args.split_first().ok_or(ParseError::MissingArgument {
        command: "layout",
        expected: "splith, splitv, tabbed, stacking, default or toggle",
    })?;

    match *first {
        "default" => no_arguments("layout", rest).map(|_| LayoutCommand::Default),
        "toggle" => match rest {
            [] => Ok(LayoutCommand::ToggleList(vec![
                LayoutItem::Mode(Layout::Stacking),
                LayoutItem::Mode(Layout::Tabbed),
                LayoutItem::Split,
            ])),
            ["split"] => Ok(LayoutCommand::ToggleSplit),
            ["all"] => Ok(LayoutCommand::ToggleList(vec![
                LayoutItem::Mode(Layout::Stacking),
                LayoutItem::Mode(Layout::Tabbed),
                LayoutItem::Mode(Layout::SplitH),
                LayoutItem::Mode(Layout::SplitV),
            ])),
            list => list
                .iter()
                .map(|arg| parse_layout_item(arg))
                .collect::<Result<Vec<_>, _>>()
                .map(LayoutCommand::ToggleList),
        },
        mode => {
            let layout = Layout::from_name(mode).ok_or_else(|| ParseError::InvalidArgument {
                command: "layout",
                arg: mode.to_string(),
            })?;
            no_arguments("layout", rest)?;
            Ok(LayoutCommand::Set(layout))
        }
    }
}

fn parse_split(args: &[&str]) -> Result<SplitDirection, ParseError> {
    let (first, rest) = args.split_first().ok_or(ParseError::MissingArgument {
        command: "split",
        expected: "vertical, horizontal or toggle",
    })?;
    let direction = match *first {
        "vertical" | "v" => SplitDirection::Vertical,
        "horizontal" | "h" => SplitDirection::Horizontal,
        "toggle" | "t" => SplitDirection::Toggle,
        other => {
            return Err(ParseError::InvalidArgument {
                command: "split",
                arg: other.to_string(),
            })
        }
    };
    no_arguments("split", rest)?;
    Ok(direction)
}

fn parse_focus(args: &[&str]) -> Result<FocusTarget, ParseError> {
    let (first, rest) = args.split_first().ok_or(ParseError::MissingArgument {
        command: "focus",
        expected: "next, prev, left, right, up, down, parent or child",
    })?;
    let target = match *first {
        "next" => FocusTarget::Next,
        "prev" => FocusTarget::Prev,
        "parent" => FocusTarget::Parent,
        "child" => FocusTarget::Child,
        other => match Direction::from_name(other) {
            Some(direction) => FocusTarget::Direction(direction),
            None => {
                return Err(ParseError::InvalidArgument {
                    command: "focus",
                    arg: other.to_string(),
                })
            }
        },
    };
    no_arguments("focus", rest)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(text: &str) -> Result<Command, ParseError> {
        let mut all = parse(text);
        assert_eq!(all.len(), 1, "expected a single sub-command in {text:?}");
        all.remove(0)
    }

    #[test]
    fn workspace_targets() {
        assert_eq!(one("workspace 4"), Ok(Command::Workspace(WorkspaceTarget::Number(4))));
        assert_eq!(one("workspace number 7"), Ok(Command::Workspace(WorkspaceTarget::Number(7))));
        assert_eq!(one("workspace next"), Ok(Command::Workspace(WorkspaceTarget::Next)));
        assert_eq!(one("workspace prev"), Ok(Command::Workspace(WorkspaceTarget::Prev)));
        assert_eq!(
            one("workspace next_on_output"),
            Ok(Command::Workspace(WorkspaceTarget::NextOnOutput))
        );
        assert_eq!(
            one("workspace prev_on_output"),
            Ok(Command::Workspace(WorkspaceTarget::PrevOnOutput))
        );
        assert_eq!(
            one("workspace back_and_forth"),
            Ok(Command::Workspace(WorkspaceTarget::BackAndForth))
        );
    }

    #[test]
    fn malformed_workspace_targets() {
        assert!(matches!(one("workspace"), Err(ParseError::MissingArgument { .. })));
        assert!(matches!(one("workspace sideways"), Err(ParseError::InvalidArgument { .. })));
        assert!(matches!(one("workspace -3"), Err(ParseError::InvalidArgument { .. })));
        assert!(matches!(one("workspace 4 5"), Err(ParseError::TrailingArguments { .. })));
    }

    #[test]
    fn move_variants() {
        let expected = Ok(Command::MoveToWorkspace(WorkspaceTarget::Number(2)));
        assert_eq!(one("move window to workspace 2"), expected);
        assert_eq!(one("move container to workspace 2"), expected);
        assert_eq!(one("move to workspace 2"), expected);
        assert_eq!(
            one("move window to workspace back_and_forth"),
            Ok(Command::MoveToWorkspace(WorkspaceTarget::BackAndForth))
        );
        assert!(matches!(one("move sideways"), Err(ParseError::InvalidArgument { .. })));
        assert!(matches!(one("move window to"), Err(ParseError::MissingArgument { .. })));
    }

    #[test]
    fn directions() {
        assert_eq!(one("move left"), Ok(Command::Move(Direction::Left)));
        assert_eq!(one("move window down"), Ok(Command::Move(Direction::Down)));
        assert_eq!(
            one("focus right"),
            Ok(Command::Focus(FocusTarget::Direction(Direction::Right)))
        );
        assert_eq!(one("focus up"), Ok(Command::Focus(FocusTarget::Direction(Direction::Up))));
        assert!(matches!(one("move left 10 px"), Err(ParseError::TrailingArguments { .. })));

        assert!(Direction::Left.runs_along(Layout::Tabbed));
        assert!(!Direction::Left.runs_along(Layout::SplitV));
        assert!(Direction::Down.runs_along(Layout::Stacking));
        assert!(Direction::Down.is_forward() && !Direction::Up.is_forward());
    }

    #[test]
    fn criteria_scope_their_group() {
        let by_id = Criteria {
            con_id: Some(NodeId(12)),
            app_id: None,
        };
        assert_eq!(one("[con_id=12] focus"), Ok(Command::FocusMatching(by_id.clone())));
        assert_eq!(
            parse("[con_id=12] focus, kill; kill"),
            vec![
                Ok(Command::FocusMatching(by_id.clone())),
                Ok(Command::KillMatching(by_id)),
                Ok(Command::Kill),
            ]
        );
        assert_eq!(
            one(r#"[app_id="gnome calculator" con_id=3] kill"#),
            Ok(Command::KillMatching(Criteria {
                con_id: Some(NodeId(3)),
                app_id: Some("gnome calculator".into()),
            }))
        );
    }

    #[test]
    fn malformed_criteria() {
        assert_eq!(one("[con_id=3 focus"), Err(ParseError::UnterminatedCriteria));
        assert!(matches!(one("[con_id=x] focus"), Err(ParseError::InvalidCriterion(_))));
        assert!(matches!(one("[class=Xterm] focus"), Err(ParseError::InvalidCriterion(_))));
        assert!(matches!(one("[] focus"), Err(ParseError::InvalidCriterion(_))));
        assert_eq!(
            one("[con_id=3] workspace 2"),
            Err(ParseError::CriteriaNotSupported("workspace".into()))
        );
        // A bad scope fails every command chained under it.
        let all = parse("[title=x] focus, kill; workspace 2");
        assert!(all[0].is_err() && all[1].is_err());
        assert_eq!(all[2], Ok(Command::Workspace(WorkspaceTarget::Number(2))));
    }

    #[test]
    fn criteria_match_windows_only() {
        let mut tree = crate::tree::Tree::new();
        let win = tree.create(NodeKind::Window { app_id: "gedit".into() }, Layout::SplitH);
        let con = tree.create(NodeKind::Container, Layout::SplitH);
        let win_node = tree.get(win).unwrap();
        assert!(Criteria::default().matches(win_node));
        assert!(Criteria {
            con_id: Some(win),
            app_id: Some("gedit".into())
        }
        .matches(win_node));
        assert!(!Criteria {
            con_id: None,
            app_id: Some("kate".into())
        }
        .matches(win_node));
        assert!(!Criteria {
            con_id: Some(con),
            app_id: None
        }
        .matches(tree.get(con).unwrap()));
    }

    #[test]
    fn layout_modes() {
        assert_eq!(one("layout splitv"), Ok(Command::Layout(LayoutCommand::Set(Layout::SplitV))));
        assert_eq!(one("layout tabbed"), Ok(Command::Layout(LayoutCommand::Set(Layout::Tabbed))));
        assert_eq!(one("layout default"), Ok(Command::Layout(LayoutCommand::Default)));
        assert_eq!(one("layout toggle split"), Ok(Command::Layout(LayoutCommand::ToggleSplit)));
        assert_eq!(
            one("layout toggle stacking splith tabbed"),
            Ok(Command::Layout(LayoutCommand::ToggleList(vec![
                LayoutItem::Mode(Layout::Stacking),
                LayoutItem::Mode(Layout::SplitH),
                LayoutItem::Mode(Layout::Tabbed),
            ])))
        );
        assert!(matches!(
            one("layout toggle stacking bogus"),
            Err(ParseError::InvalidArgument { .. })
        ));
        assert!(matches!(one("layout diagonal"), Err(ParseError::InvalidArgument { .. })));
    }

    #[test]
    fn bare_toggle_uses_i3_default_cycle() {
        assert_eq!(
            one("layout toggle"),
            Ok(Command::Layout(LayoutCommand::ToggleList(vec![
                LayoutItem::Mode(Layout::Stacking),
                LayoutItem::Mode(Layout::Tabbed),
                LayoutItem::Split,
            ])))
        );
    }

    #[test]
    fn verbs_are_case_sensitive() {
        assert_eq!(one("Workspace 1"), Err(ParseError::UnknownCommand("Workspace".into())));
        assert_eq!(one("EXIT"), Err(ParseError::UnknownCommand("EXIT".into())));
    }

    #[test]
    fn multiple_sub_commands() {
        let all = parse("workspace 3; layout tabbed ;exit");
        assert_eq!(
            all,
            vec![
                Ok(Command::Workspace(WorkspaceTarget::Number(3))),
                Ok(Command::Layout(LayoutCommand::Set(Layout::Tabbed))),
                Ok(Command::Exit),
            ]
        );
    }

    #[test]
    fn one_bad_sub_command_does_not_hide_others() {
        let all = parse("frobnicate; workspace 2");
        assert!(all[0].is_err());
        assert_eq!(all[1], Ok(Command::Workspace(WorkspaceTarget::Number(2))));
    }

    #[test]
    fn quotes_group_tokens() {
        assert_eq!(one(r#"nop "a comment; with separators""#), Ok(Command::Nop));
        assert_eq!(one(r#"workspace "5""#), Ok(Command::Workspace(WorkspaceTarget::Number(5))));
        assert_eq!(parse(r#"nop "oops"#), vec![Err(ParseError::UnterminatedQuote)]);
    }

    #[test]
    fn empty_text() {
        assert_eq!(parse(""), vec![Err(ParseError::Empty)]);
        assert_eq!(parse("  ;  "), vec![Err(ParseError::Empty)]);
    }

    #[test]
    fn split_and_focus() {
        assert_eq!(one("split v"), Ok(Command::Split(SplitDirection::Vertical)));
        assert_eq!(one("split horizontal"), Ok(Command::Split(SplitDirection::Horizontal)));
        assert_eq!(one("split toggle"), Ok(Command::Split(SplitDirection::Toggle)));
        assert_eq!(one("focus parent"), Ok(Command::Focus(FocusTarget::Parent)));
        assert!(matches!(one("focus floating"), Err(ParseError::InvalidArgument { .. })));
        assert_eq!(one("kill"), Ok(Command::Kill));
    }

    #[test]
    fn command_result_serialization() {
        assert_eq!(serde_json::to_string(&CommandResult::ok()).unwrap(), r#"{"success":true}"#);
        let parse_err = CommandResult::parse_failed(&ParseError::Empty);
        assert_eq!(
            serde_json::to_string(&parse_err).unwrap(),
            r#"{"success":false,"parse_error":true,"error":"empty command"}"#
        );
    }

    #[test]
    fn layout_item_matching() {
        assert!(LayoutItem::Split.matches(Layout::SplitV));
        assert!(!LayoutItem::Split.matches(Layout::Tabbed));
        assert!(LayoutItem::Mode(Layout::Tabbed).matches(Layout::Tabbed));
    }
}
