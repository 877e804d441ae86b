//! Error types for teardown-core.

use std::fmt::Write as _;
use std::path::PathBuf;

use thiserror::Error;

/// A single, type-erased teardown failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of a failed teardown step.
///
/// The variant tag is what dispose cascades match on when flattening: a
/// [`TeardownError::Aggregate`] is spliced into the parent's list, anything
/// else is appended as one entry.
#[derive(Debug, Error)]
pub enum TeardownError {
    /// One teardown action failed.
    #[error("{0}")]
    Failed(BoxError),

    /// Several teardown steps failed during one dispose cascade.
    #[error(transparent)]
    Aggregate(#[from] AggregateTeardownError),

    /// The caller handed over something that is not a teardown.
    #[error(transparent)]
    Usage(#[from] UsageError),
}

impl TeardownError {
    /// Wrap any error (or message) as a single teardown failure.
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed(err.into())
    }
}

/// Flattened list of failures collected while disposing a registry tree.
///
/// Never contains another aggregate: nested aggregates are spliced in on
/// construction.
#[derive(Debug, Error)]
#[error("{}", render_errors(.errors))]
pub struct AggregateTeardownError {
    errors: Vec<TeardownError>,
}

impl AggregateTeardownError {
    pub fn new(errors: impl IntoIterator<Item = TeardownError>) -> Self {
        let mut flat = Vec::new();
        for err in errors {
            absorb(&mut flat, err);
        }
        Self { errors: flat }
    }

    /// Failures in the order they were captured.
    pub fn errors(&self) -> &[TeardownError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<TeardownError> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl IntoIterator for AggregateTeardownError {
    type Item = TeardownError;
    type IntoIter = std::vec::IntoIter<TeardownError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

/// Append `err` to `errors`, splicing aggregates in place of nesting them.
pub(crate) fn absorb(errors: &mut Vec<TeardownError>, err: TeardownError) {
    match err {
        TeardownError::Aggregate(aggregate) => errors.extend(aggregate.errors),
        other => errors.push(other),
    }
}

fn render_errors(errors: &[TeardownError]) -> String {
    let mut out = format!(
        "{} error{} occurred during teardown:",
        errors.len(),
        if errors.len() == 1 { "" } else { "s" }
    );
    for (i, err) in errors.iter().enumerate() {
        let _ = write!(out, "\n  {}) {err}", i + 1);
    }
    out
}

/// Caller misuse: a teardown of a kind the registry cannot track.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("unsupported teardown kind '{kind}'; expected: registry, action, empty, self")]
    UnsupportedKind { kind: String },

    /// Only registries own children; actions, `empty` and `self` cannot.
    #[error("teardown '{name}' of kind '{kind}' cannot own children")]
    UnexpectedChildren { name: String, kind: String },

    /// `detach` and `predispose` need a registry of the node's own.
    #[error("teardown '{name}' of kind '{kind}' cannot be marked '{flag}'")]
    InvalidFlag {
        name: String,
        kind: String,
        flag: String,
    },
}

/// All errors that can arise from loading or running a teardown plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Underlying I/O failure reading the plan file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse plan at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// YAML parse error for an in-memory document.
    #[error("failed to parse plan: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid plan: {0}")]
    Usage(#[from] UsageError),
}
