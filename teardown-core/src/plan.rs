//! Teardown plans: a YAML description of a registry tree that can be built,
//! disposed, and reported on.
//!
//! # Format
//!
//! ```yaml
//! root:
//!   name: session
//!   children:
//!     - { name: listener, kind: action, fail: "unhook failed" }
//!     - name: timers
//!       children:
//!         - { name: tick, kind: action }
//!     - { name: scratch, kind: action, detach: true }
//!     - { kind: empty }
//!     - { kind: self }
//! late:
//!   - { name: straggler, kind: action }
//! dispose_twice: true
//! ```
//!
//! Every teardown that runs writes its `name` to a [`Journal`], so a run
//! produces the exact order in which cleanup happened.

use std::cell::RefCell;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::disposable::Disposable;
use crate::error::{PlanError, TeardownError, UsageError};
use crate::teardown::Teardown;

// ---------------------------------------------------------------------------
// 1. Document model
// ---------------------------------------------------------------------------

/// A whole plan document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub root: PlanNode,
    /// Teardowns handed to the root after it has been disposed.
    #[serde(default)]
    pub late: Vec<PlanNode>,
    /// Dispose the root a second time and check nothing else ran.
    #[serde(default)]
    pub dispose_twice: bool,
}

/// One teardown in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanNode {
    #[serde(default)]
    pub name: String,
    /// `registry`, `action`, `empty` or `self`. Kept as text so an unknown
    /// kind is reported as a usage error rather than a parse failure.
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Failure message returned by this node's action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail: Option<String>,
    /// Registry nodes only: whether the registry has a primary action.
    #[serde(default = "default_primary")]
    pub primary: bool,
    /// Add the node, then remove it again before the root is disposed.
    /// Rejected on `self` and `empty` nodes.
    #[serde(default)]
    pub detach: bool,
    /// Dispose the node on its own before the root is disposed.
    #[serde(default)]
    pub predispose: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PlanNode>,
}

fn default_kind() -> String {
    NodeKind::Registry.to_string()
}

fn default_primary() -> bool {
    true
}

/// Parsed form of [`PlanNode::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Registry,
    Action,
    Empty,
    /// The parent registry itself.
    SelfRef,
}

impl FromStr for NodeKind {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "registry" => Ok(Self::Registry),
            "action" => Ok(Self::Action),
            "empty" => Ok(Self::Empty),
            "self" => Ok(Self::SelfRef),
            other => Err(UsageError::UnsupportedKind {
                kind: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Registry => "registry",
            Self::Action => "action",
            Self::Empty => "empty",
            Self::SelfRef => "self",
        };
        f.write_str(s)
    }
}

impl PlanNode {
    /// Parse and check this node's kind.
    pub fn node_kind(&self) -> Result<NodeKind, UsageError> {
        let kind: NodeKind = self.kind.parse()?;
        if kind != NodeKind::Registry && !self.children.is_empty() {
            return Err(UsageError::UnexpectedChildren {
                name: self.name.clone(),
                kind: kind.to_string(),
            });
        }
        if matches!(kind, NodeKind::Empty | NodeKind::SelfRef) {
            let flag = if self.predispose {
                Some("predispose")
            } else if self.detach {
                Some("detach")
            } else {
                None
            };
            if let Some(flag) = flag {
                return Err(UsageError::InvalidFlag {
                    name: self.name.clone(),
                    kind: kind.to_string(),
                    flag: flag.to_string(),
                });
            }
        }
        Ok(kind)
    }
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

impl Plan {
    /// Load and validate a plan file.
    ///
    /// Returns `PlanError::Parse` (with path + line context) for malformed YAML
    /// and `PlanError::Usage` for an unknown or misused node kind.
    pub fn load_at(path: &Path) -> Result<Self, PlanError> {
        let contents = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let plan: Plan = serde_yaml::from_str(&contents).map_err(|source| PlanError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, PlanError> {
        let plan: Plan = serde_yaml::from_str(yaml)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Check every node kind in the tree, including `late` nodes.
    pub fn validate(&self) -> Result<(), UsageError> {
        if self.root.node_kind()? != NodeKind::Registry {
            return Err(UsageError::UnsupportedKind {
                kind: format!("{} (root must be a registry)", self.root.kind),
            });
        }
        validate_tree(&self.root)?;
        self.late.iter().try_for_each(validate_tree)
    }

    /// Pre-order walk yielding `(depth, node)`.
    pub fn walk(&self) -> Vec<(usize, &PlanNode)> {
        let mut out = Vec::new();
        collect(&self.root, 0, &mut out);
        out
    }
}

fn validate_tree(node: &PlanNode) -> Result<(), UsageError> {
    node.node_kind()?;
    node.children.iter().try_for_each(validate_tree)
}

fn collect<'a>(node: &'a PlanNode, depth: usize, out: &mut Vec<(usize, &'a PlanNode)>) {
    out.push((depth, node));
    for child in &node.children {
        collect(child, depth + 1, out);
    }
}

// ---------------------------------------------------------------------------
// 3. Journal
// ---------------------------------------------------------------------------

/// Shared, append-only record of the teardowns that ran.
#[derive(Debug, Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        self.0.borrow_mut().push(name.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// An action that records `name` and then fails with `fail`, if set.
    fn action(
        &self,
        name: &str,
        fail: Option<&str>,
    ) -> impl FnOnce() -> Result<(), TeardownError> + 'static {
        let journal = self.clone();
        let name = name.to_string();
        let fail = fail.map(str::to_string);
        move || {
            journal.record(&name);
            match fail {
                Some(msg) => Err(TeardownError::failed(msg)),
                None => Ok(()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 4. Build & execute
// ---------------------------------------------------------------------------

/// What happened during [`execute`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    /// Teardown names in the order they ran.
    pub executed: Vec<String>,
    /// Failures from nodes disposed on their own before the root.
    pub predispose_errors: Vec<String>,
    /// Flattened failures from disposing the root.
    pub errors: Vec<String>,
    /// Failures from teardowns added after the root was disposed.
    pub late_errors: Vec<String>,
    /// `Some(true)` when a second dispose ran nothing and reported nothing.
    pub second_dispose_noop: Option<bool>,
}

impl PlanReport {
    pub fn has_failures(&self) -> bool {
        !(self.predispose_errors.is_empty() && self.errors.is_empty() && self.late_errors.is_empty())
    }
}

/// Registries built from a plan, before anything is disposed.
#[derive(Debug)]
pub struct BuiltPlan {
    pub root: Disposable,
    /// Nodes marked `predispose`, in pre-order.
    pub predispose: Vec<Disposable>,
    pub journal: Journal,
}

/// Build the registry tree for `plan` without disposing anything.
pub fn build(plan: &Plan) -> Result<BuiltPlan, PlanError> {
    plan.validate()?;
    let journal = Journal::new();
    let mut predispose = Vec::new();
    let root = build_registry(&plan.root, &journal, &mut predispose)?;
    Ok(BuiltPlan {
        root,
        predispose,
        journal,
    })
}

/// Build `plan`, dispose it, and report what ran and what failed.
pub fn execute(plan: &Plan) -> Result<PlanReport, PlanError> {
    let BuiltPlan {
        root,
        predispose,
        journal,
    } = build(plan)?;
    let mut report = PlanReport::default();

    for registry in predispose {
        if let Err(err) = registry.dispose() {
            report
                .predispose_errors
                .extend(err.errors().iter().map(ToString::to_string));
        }
    }

    if let Err(err) = root.dispose() {
        report.errors = err.errors().iter().map(ToString::to_string).collect();
    }

    if plan.dispose_twice {
        let before = journal.len();
        let clean = root.dispose().is_ok();
        report.second_dispose_noop = Some(clean && journal.len() == before);
    }

    for node in &plan.late {
        let teardown = build_teardown(node, &root, &journal, &mut Vec::new())?;
        if let Err(err) = root.add(teardown) {
            report.late_errors.extend(error_messages(err));
        }
    }

    report.executed = journal.entries();
    tracing::debug!(
        executed = report.executed.len(),
        failures = report.errors.len(),
        "plan executed"
    );
    Ok(report)
}

fn error_messages(err: TeardownError) -> Vec<String> {
    match err {
        TeardownError::Aggregate(aggregate) => {
            aggregate.into_iter().map(|e| e.to_string()).collect()
        }
        other => vec![other.to_string()],
    }
}

fn build_registry(
    node: &PlanNode,
    journal: &Journal,
    predispose: &mut Vec<Disposable>,
) -> Result<Disposable, PlanError> {
    let registry = if node.primary {
        Disposable::with_action(journal.action(&node.name, node.fail.as_deref()))
    } else {
        Disposable::new()
    };
    for child in &node.children {
        let teardown = build_teardown(child, &registry, journal, predispose)?;
        let detach = match &teardown {
            Teardown::Registry(handle) if child.detach => Some(handle.clone()),
            _ => None,
        };
        // still active, so add only queues the child
        let _ = registry.add(teardown);
        if let Some(handle) = detach {
            registry.remove(&handle);
        }
    }
    Ok(registry)
}

/// Turn `node` into something `parent.add` accepts.
///
/// Nodes that must be addressable later (`detach`, `predispose`) are always
/// materialised as registries so a handle exists.
fn build_teardown(
    node: &PlanNode,
    parent: &Disposable,
    journal: &Journal,
    predispose: &mut Vec<Disposable>,
) -> Result<Teardown, PlanError> {
    let teardown = match node.node_kind()? {
        NodeKind::Empty => Teardown::Registry(Disposable::EMPTY),
        NodeKind::SelfRef => Teardown::Registry(parent.clone()),
        NodeKind::Action if !(node.detach || node.predispose) => {
            Teardown::action(journal.action(&node.name, node.fail.as_deref()))
        }
        NodeKind::Action => Teardown::Registry(Disposable::with_action(
            journal.action(&node.name, node.fail.as_deref()),
        )),
        NodeKind::Registry => Teardown::Registry(build_registry(node, journal, predispose)?),
    };
    if node.predispose {
        if let Teardown::Registry(handle) = &teardown {
            predispose.push(handle.clone());
        }
    }
    Ok(teardown)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
