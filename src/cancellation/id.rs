//! Type-erased cancellation identifiers.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Anything usable as a cancellation id: strings, integers, unit structs,
/// enums. Two ids are equal only if they have the same type and value.
pub trait CancelKey: Hash + Eq + fmt::Debug + Send + Sync + 'static {}

impl<T: Hash + Eq + fmt::Debug + Send + Sync + 'static> CancelKey for T {}

trait ErasedKey: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_erased(&self, other: &dyn ErasedKey) -> bool;
    fn hash_erased(&self, state: &mut dyn Hasher);
    fn fmt_erased(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<K: CancelKey> ErasedKey for K {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_erased(&self, other: &dyn ErasedKey) -> bool {
        other
            .as_any()
            .downcast_ref::<K>()
            .is_some_and(|other| other == self)
    }

    fn hash_erased(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<K>().hash(&mut state);
        self.hash(&mut state);
    }

    fn fmt_erased(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An opaque, hashable cancellation id.
#[derive(Clone)]
pub struct CancelId(Arc<dyn ErasedKey>);

impl CancelId {
    /// Wrap `key`. Wrapping an existing `CancelId` returns it unchanged.
    pub fn new<K: CancelKey>(key: K) -> Self {
        if let Some(id) = (&key as &dyn Any).downcast_ref::<CancelId>() {
            return id.clone();
        }
        Self(Arc::new(key))
    }
}

impl PartialEq for CancelId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_erased(other.0.as_ref())
    }
}

impl Eq for CancelId {}

impl Hash for CancelId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash_erased(state);
    }
}

impl fmt::Debug for CancelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_erased(f)
    }
}
