//! Result keys and result aliases.

use std::{
    any::{type_name, Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

pub(crate) type AnyResult = Arc<dyn Any + Send + Sync>;

type Projection<T> = dyn Fn(&Arc<T>) -> AnyResult + Send + Sync;

/// The stable identity of an analysis result shape.
///
/// Two keys are equal exactly when they name the same Rust type. The type name is kept
/// for diagnostics only.
#[derive(Clone, Copy)]
pub struct ResultKey {
    id: TypeId,
    name: &'static str,
}

impl ResultKey {
    /// The key for result type `T`.
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// The result type's name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ResultKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ResultKey {}

impl Hash for ResultKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResultKey({})", self.name)
    }
}

/// An additional key under which an analysis publishes (a view of) its result.
///
/// When an analysis with aliases is installed, every alias key is served from the same
/// cache slot as the analysis' primary result. Installing another analysis for one of
/// those keys later only takes over that key; the slot stays alive for the others.
pub struct ResultAlias<T> {
    key: ResultKey,
    project: Arc<Projection<T>>,
}

impl<T: Send + Sync + 'static> ResultAlias<T> {
    /// Publishes the result under key `U` through `project`.
    pub fn new<U: Send + Sync + 'static>(
        project: impl Fn(&T) -> U + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: ResultKey::of::<U>(),
            project: Arc::new(move |result: &Arc<T>| Arc::new(project(result)) as AnyResult),
        }
    }

    /// Publishes a shared result under key `U` without copying it.
    pub fn shared<U: Send + Sync + 'static>(
        project: impl Fn(&Arc<T>) -> Arc<U> + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: ResultKey::of::<U>(),
            project: Arc::new(move |result: &Arc<T>| project(result) as AnyResult),
        }
    }

    /// The alias key.
    #[must_use]
    pub const fn key(&self) -> ResultKey {
        self.key
    }

    pub(crate) fn project(&self, result: &Arc<T>) -> AnyResult {
        (self.project)(result)
    }
}

impl<T> Clone for ResultAlias<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            project: Arc::clone(&self.project),
        }
    }
}

impl<T> fmt::Debug for ResultAlias<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultAlias").field("key", &self.key).finish()
    }
}
