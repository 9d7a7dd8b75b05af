//! Defensive search over the host's UI fiber tree.
//!
//! The tree comes from a renderer that was never meant to be introspected:
//! link fields get renamed between host versions and props may hold anything.
//! [`find`] therefore treats every fault while evaluating a node as "no match
//! here" and keeps walking.

use serde_json::Value;

use crate::guard::guard_with_default;

/// Upper bound on visited nodes for a single search.
pub const MAX_VISITED: usize = 100_000;

/// A node with first-child / next-sibling links.
pub trait FiberNode {
    fn child(&self) -> Option<&Self>;
    fn sibling(&self) -> Option<&Self>;
}

fn link<'a>(node: &'a Value, primary: &str, fallback: &str) -> Option<&'a Value> {
    let present = |v: &&Value| !v.is_null();
    node.get(primary)
        .filter(present)
        .or_else(|| node.get(fallback).filter(present))
}

impl FiberNode for Value {
    fn child(&self) -> Option<&Self> {
        link(self, "child", "_child")
    }

    fn sibling(&self) -> Option<&Self> {
        link(self, "sibling", "_sibling")
    }
}

/// First node in pre-order (child before sibling) accepted by `predicate`.
///
/// A predicate that panics on a node counts as a non-match for that node.
pub fn find<'a, N, F>(root: Option<&'a N>, mut predicate: F) -> Option<&'a N>
where
    N: FiberNode + ?Sized,
    F: FnMut(&N) -> bool,
{
    try_find(root, |node| Ok::<_, ()>(predicate(node)))
}

/// Like [`find`], for predicates that report invalid field access as `Err`.
pub fn try_find<'a, N, E, F>(root: Option<&'a N>, mut predicate: F) -> Option<&'a N>
where
    N: FiberNode + ?Sized,
    F: FnMut(&N) -> Result<bool, E>,
{
    let mut stack: Vec<&'a N> = root.into_iter().collect();
    let mut visited = 0usize;

    while let Some(node) = stack.pop() {
        visited += 1;
        if visited > MAX_VISITED {
            tracing::warn!(limit = MAX_VISITED, "fiber search gave up, tree too large");
            return None;
        }

        let matched = guard_with_default("fiber predicate", false, || {
            predicate(node).unwrap_or(false)
        });
        if matched {
            return Some(node);
        }

        // Sibling goes on the stack first so the whole child subtree is
        // searched before it.
        if let Some(sibling) = guard_with_default("fiber sibling", None, || node.sibling()) {
            stack.push(sibling);
        }
        if let Some(child) = guard_with_default("fiber child", None, || node.child()) {
            stack.push(child);
        }
    }
    None
}

/// The props a fiber was last rendered with, falling back to pending props.
pub fn safe_props(node: &Value) -> Option<&Value> {
    let usable = |v: &&Value| !v.is_null() && *v != &Value::Bool(false);
    node.get("memoizedProps")
        .filter(usable)
        .or_else(|| node.get("pendingProps").filter(usable))
}

/// Locate the gamepad UI root below `parent`.
pub fn find_gamepad_root(parent: Option<&Value>) -> Option<&Value> {
    find(parent, |fiber| {
        let Some(props) = safe_props(fiber) else {
            return false;
        };
        let class_match = props
            .get("className")
            .and_then(Value::as_str)
            .is_some_and(|c| c.contains("GamePadUI"));
        class_match
            || props.get("id").and_then(Value::as_str) == Some("gamepadui")
            || props.get("data-testid").and_then(Value::as_str) == Some("game-pad-ui")
    })
}
