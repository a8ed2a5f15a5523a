//! Deferred configuration values.
//!
//! Configuration fields such as host paths, repository prefixes, or published
//! ports may not be known when a map is assembled. A [`Value`] either carries
//! the final value directly, or a producer that is invoked when planning first
//! needs it. [`Value::lazy_once`] caches the first result for the rest of the
//! process lifetime.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

type Producer<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Cell backing [`Value::LazyOnce`]; evaluates once and keeps the result.
pub struct OnceCell<T> {
    func: Producer<T>,
    cell: OnceLock<T>,
}

impl<T: Clone> OnceCell<T> {
    fn get(&self) -> T {
        self.cell.get_or_init(|| (self.func)()).clone()
    }

    /// Whether the producer has already run.
    pub fn evaluated(&self) -> bool {
        self.cell.get().is_some()
    }
}

/// A configuration value that is either constant or produced on demand.
pub enum Value<T> {
    Constant(T),
    /// Re-evaluated on every access.
    Lazy(Producer<T>),
    /// Evaluated on first access, then cached.
    LazyOnce(Arc<OnceCell<T>>),
}

impl<T: Clone> Value<T> {
    pub fn lazy<F>(func: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Value::Lazy(Arc::new(func))
    }

    pub fn lazy_once<F>(func: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Value::LazyOnce(Arc::new(OnceCell {
            func: Arc::new(func),
            cell: OnceLock::new(),
        }))
    }

    /// Resolves the value, running the producer if necessary.
    pub fn resolve(&self) -> T {
        match self {
            Value::Constant(v) => v.clone(),
            Value::Lazy(f) => f(),
            Value::LazyOnce(cell) => cell.get(),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Value::Constant(_))
    }
}

impl<T> From<T> for Value<T> {
    fn from(value: T) -> Self {
        Value::Constant(value)
    }
}

impl From<&str> for Value<String> {
    fn from(value: &str) -> Self {
        Value::Constant(value.to_string())
    }
}

impl<T: Clone> Clone for Value<T> {
    fn clone(&self) -> Self {
        match self {
            Value::Constant(v) => Value::Constant(v.clone()),
            Value::Lazy(f) => Value::Lazy(f.clone()),
            Value::LazyOnce(cell) => Value::LazyOnce(cell.clone()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            Value::Lazy(_) => f.write_str("Lazy(..)"),
            Value::LazyOnce(cell) => {
                if let Some(v) = cell.cell.get() {
                    f.debug_tuple("LazyOnce").field(v).finish()
                } else {
                    f.write_str("LazyOnce(<pending>)")
                }
            }
        }
    }
}

/// Comparison resolves both sides; two producers are equal when their current
/// results are.
impl<T: Clone + PartialEq> PartialEq for Value<T> {
    fn eq(&self, other: &Self) -> bool {
        self.resolve() == other.resolve()
    }
}

impl<T: Clone + Eq> Eq for Value<T> {}

impl<T: Default> Default for Value<T> {
    fn default() -> Self {
        Value::Constant(T::default())
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Value<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Value::Constant)
    }
}

impl<T: Clone + Serialize> Serialize for Value<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.resolve().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn constant_resolves_to_itself() {
        let v: Value<String> = "abc".into();
        assert_eq!(v.resolve(), "abc");
        assert!(v.is_constant());
    }

    #[test]
    fn lazy_runs_on_every_access() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let v = Value::lazy(move || c.fetch_add(1, Ordering::SeqCst));
        assert_eq!(v.resolve(), 0);
        assert_eq!(v.resolve(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn lazy_once_caches_first_result() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let v = Value::lazy_once(move || c.fetch_add(1, Ordering::SeqCst));
        assert_eq!(v.resolve(), 0);
        assert_eq!(v.resolve(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn equality_resolves_producers() {
        let v = Value::lazy(|| "x".to_string());
        assert_eq!(v, Value::Constant("x".to_string()));
    }

    #[test]
    fn deserializes_as_constant() {
        let v: Value<u16> = serde_json::from_str("8080").unwrap();
        assert_eq!(v, Value::Constant(8080));
    }
}
