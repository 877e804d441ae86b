//! Composite teardown registry.
//!
//! # Model
//!
//! A [`Disposable`] is a cheap, cloneable handle to a registry node. The node
//! holds an optional primary action plus an ordered list of child registries.
//! Clones share the node; identity is pointer identity ([`Disposable::ptr_eq`]).
//!
//! ```text
//! Active { action, children } --dispose()--> Disposed
//! ```
//!
//! Disposing runs the primary action, then every child in the order it was
//! added. Failures do not stop the cascade; they are collected into one flat
//! [`AggregateTeardownError`].
//!
//! Parents *own* their children in the sense that they must attempt to dispose
//! them. A child can still be disposed elsewhere, or detached with
//! [`Disposable::remove`]; disposal is idempotent so either order is fine.
//!
//! Handles are `!Send`: the registry is single-threaded.
//!
//! Handles are reference counted. Two registries that own each other
//! (`p.add(&q); q.add(&p)`), or an action that captures its own registry's
//! handle, form an `Rc` cycle that is only broken by disposing one of them.
//! Such a registry leaks if it is never disposed; holding it in a
//! [`DisposeGuard`] makes sure the cycle is cut when the guard goes away.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{absorb, AggregateTeardownError, TeardownError};
use crate::teardown::{Teardown, TeardownFn};

enum State {
    Active {
        action: Option<TeardownFn>,
        children: Option<Vec<Disposable>>,
    },
    Disposed,
}

struct Node {
    state: RefCell<State>,
}

/// Handle to a registry node. `node == None` is the [`Disposable::EMPTY`] sentinel.
#[derive(Clone)]
pub struct Disposable {
    node: Option<Rc<Node>>,
}

impl Disposable {
    /// Shared, already-disposed registry. Nothing can be attached to it.
    pub const EMPTY: Disposable = Disposable { node: None };

    /// A new active registry with no primary action.
    pub fn new() -> Self {
        Self::from_parts(None)
    }

    /// A new active registry that runs `action` first when disposed.
    pub fn with_action<F>(action: F) -> Self
    where
        F: FnOnce() -> Result<(), TeardownError> + 'static,
    {
        Self::from_parts(Some(Box::new(action)))
    }

    fn from_parts(action: Option<TeardownFn>) -> Self {
        Self {
            node: Some(Rc::new(Node {
                state: RefCell::new(State::Active {
                    action,
                    children: None,
                }),
            })),
        }
    }

    pub fn is_disposed(&self) -> bool {
        match &self.node {
            None => true,
            Some(node) => matches!(*node.state.borrow(), State::Disposed),
        }
    }

    pub fn is_empty_sentinel(&self) -> bool {
        self.node.is_none()
    }

    /// `true` when both handles point at the same registry.
    pub fn ptr_eq(&self, other: &Disposable) -> bool {
        match (&self.node, &other.node) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Number of children currently owned. Always 0 once disposed.
    pub fn child_count(&self) -> usize {
        let Some(node) = &self.node else {
            return 0;
        };
        let len = match &*node.state.borrow() {
            State::Active {
                children: Some(children),
                ..
            } => children.len(),
            _ => 0,
        };
        len
    }

    pub fn has_children(&self) -> bool {
        self.child_count() > 0
    }

    /// Dispose this registry and everything it owns.
    ///
    /// Idempotent: only the first call does anything. The primary action runs
    /// first, then children in add order. Every step is attempted; failures
    /// are returned together, flattened, once the whole cascade has run.
    pub fn dispose(&self) -> Result<(), AggregateTeardownError> {
        let Some(node) = &self.node else {
            return Ok(());
        };

        // Detach everything before running user code so re-entrant calls see
        // the registry as disposed.
        let (action, children) = match node.state.replace(State::Disposed) {
            State::Disposed => return Ok(()),
            State::Active { action, children } => (action, children.unwrap_or_default()),
        };

        tracing::debug!(
            children = children.len(),
            has_action = action.is_some(),
            "disposing registry"
        );

        let mut errors = Vec::new();
        if let Some(action) = action {
            if let Err(err) = action() {
                absorb(&mut errors, err);
            }
        }
        for child in children {
            if let Err(err) = child.dispose() {
                errors.extend(err.into_errors());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            tracing::warn!(failures = errors.len(), "registry disposed with failures");
            Err(AggregateTeardownError::new(errors))
        }
    }

    /// Track `teardown` so it is disposed along with this registry.
    ///
    /// Empty input, this registry itself, [`Disposable::EMPTY`] and registries
    /// that are already disposed are ignored. If this registry is already
    /// disposed the teardown is disposed right away and its failures, if any,
    /// are returned here as a [`TeardownError::Aggregate`].
    pub fn add(&self, teardown: impl Into<Teardown>) -> Result<(), TeardownError> {
        let child = match teardown.into() {
            Teardown::Empty => return Ok(()),
            Teardown::Action(action) => Self::from_parts(Some(action)),
            Teardown::Registry(registry) => {
                if registry.is_empty_sentinel() || registry.ptr_eq(self) || registry.is_disposed()
                {
                    return Ok(());
                }
                registry
            }
        };

        if let Some(node) = &self.node {
            if let State::Active { children, .. } = &mut *node.state.borrow_mut() {
                children.get_or_insert_with(Vec::new).push(child);
                return Ok(());
            }
        }

        tracing::debug!("registry already disposed; disposing child immediately");
        child.dispose().map_err(TeardownError::from)
    }

    /// Stop tracking `child`. The child is not disposed.
    ///
    /// Only the first entry pointing at the same registry is detached.
    pub fn remove(&self, child: &Disposable) {
        if child.is_empty_sentinel() || child.ptr_eq(self) {
            return;
        }
        let Some(node) = &self.node else {
            return;
        };
        if let State::Active {
            children: Some(children),
            ..
        } = &mut *node.state.borrow_mut()
        {
            if let Some(idx) = children.iter().position(|c| c.ptr_eq(child)) {
                children.remove(idx);
                tracing::debug!(remaining = children.len(), "detached child registry");
            }
        }
    }

    /// Wrap this registry in a guard that disposes it on drop.
    pub fn guard(self) -> DisposeGuard {
        DisposeGuard { registry: self }
    }
}

impl Default for Disposable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty_sentinel() {
            return f.write_str("Disposable::EMPTY");
        }
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .field("children", &self.child_count())
            .finish()
    }
}

/// Disposes the wrapped registry when dropped.
///
/// Disposal releases the primary action and every child handle, which also
/// breaks any `Rc` cycle running through the registry.
///
/// `Drop` cannot return an error, so failures are logged and discarded. Call
/// [`DisposeGuard::dispose`] to observe them.
#[must_use = "dropping the guard disposes the registry immediately"]
pub struct DisposeGuard {
    registry: Disposable,
}

impl DisposeGuard {
    pub fn registry(&self) -> &Disposable {
        &self.registry
    }

    /// Dispose now and report failures.
    pub fn dispose(self) -> Result<(), AggregateTeardownError> {
        let registry = self.disarm();
        registry.dispose()
    }

    /// Give the registry back without disposing it.
    pub fn disarm(mut self) -> Disposable {
        std::mem::replace(&mut self.registry, Disposable::EMPTY)
    }
}

impl Drop for DisposeGuard {
    fn drop(&mut self) {
        if let Err(err) = self.registry.dispose() {
            tracing::warn!(error = %err, "teardown failed while dropping guard");
        }
    }
}

impl fmt::Debug for DisposeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DisposeGuard").field(&self.registry).finish()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
