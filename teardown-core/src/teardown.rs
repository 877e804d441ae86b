//! The closed set of things a [`Disposable`] can take ownership of.

use std::fmt;

use crate::disposable::Disposable;
use crate::error::TeardownError;

/// A boxed teardown action. Runs at most once.
pub type TeardownFn = Box<dyn FnOnce() -> Result<(), TeardownError>>;

/// Input accepted by [`Disposable::add`].
pub enum Teardown {
    /// Nothing to track.
    Empty,
    /// A plain action; wrapped into a fresh child registry on `add`.
    Action(TeardownFn),
    /// An existing registry, tracked as-is.
    Registry(Disposable),
}

impl Teardown {
    pub fn action<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<(), TeardownError> + 'static,
    {
        Self::Action(Box::new(f))
    }
}

impl From<Disposable> for Teardown {
    fn from(registry: Disposable) -> Self {
        Self::Registry(registry)
    }
}

impl From<&Disposable> for Teardown {
    fn from(registry: &Disposable) -> Self {
        Self::Registry(registry.clone())
    }
}

impl From<TeardownFn> for Teardown {
    fn from(f: TeardownFn) -> Self {
        Self::Action(f)
    }
}

impl<T: Into<Teardown>> From<Option<T>> for Teardown {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

impl From<()> for Teardown {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Action(_) => f.write_str("Action(..)"),
            Self::Registry(registry) => f.debug_tuple("Registry").field(registry).finish(),
        }
    }
}
