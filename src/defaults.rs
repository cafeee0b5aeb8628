//! Default values
//!
//! What `get` returns for a key that is not in the index.

use std::fmt;
use std::sync::Arc;

/// Function computing a default from the missing key
pub type DefaultFn<K, V> = Arc<dyn Fn(&K) -> V + Send + Sync>;

/// Default-value policy of an engine instance
pub enum DefaultValue<K, V> {
    /// Missing keys read as absent
    None,

    /// Missing keys read as a clone of this value
    Value(V),

    /// Missing keys read as whatever the function returns for them
    Compute(DefaultFn<K, V>),
}

impl<K, V> DefaultValue<K, V> {
    /// Wrap a closure
    pub fn compute<F>(f: F) -> Self
    where
        F: Fn(&K) -> V + Send + Sync + 'static,
    {
        DefaultValue::Compute(Arc::new(f))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DefaultValue::None)
    }
}

impl<K, V: Clone> DefaultValue<K, V> {
    /// The default for `key`, if the policy yields one
    pub fn resolve(&self, key: &K) -> Option<V> {
        match self {
            DefaultValue::None => None,
            DefaultValue::Value(value) => Some(value.clone()),
            DefaultValue::Compute(f) => Some(f(key)),
        }
    }
}

impl<K, V: Clone> Clone for DefaultValue<K, V> {
    fn clone(&self) -> Self {
        match self {
            DefaultValue::None => DefaultValue::None,
            DefaultValue::Value(value) => DefaultValue::Value(value.clone()),
            DefaultValue::Compute(f) => DefaultValue::Compute(Arc::clone(f)),
        }
    }
}

impl<K, V> Default for DefaultValue<K, V> {
    fn default() -> Self {
        DefaultValue::None
    }
}

impl<K, V: fmt::Debug> fmt::Debug for DefaultValue<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::None => f.write_str("None"),
            DefaultValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            DefaultValue::Compute(_) => f.write_str("Compute(<fn>)"),
        }
    }
}
