//! Run-scoped key/value store shared by every task of one indexing run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Float(f64),
    Str(String),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }
}

/// Types that can be stored on the blackboard.
pub trait BlackboardValue: Clone + Default + Send + 'static {
    fn into_value(self) -> Value;
    fn from_value(value: &Value) -> Option<Self>;
}

impl BlackboardValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl BlackboardValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl BlackboardValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl BlackboardValue for String {
    fn into_value(self) -> Value {
        Value::Str(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Cheaply cloneable handle; all clones see the same entries.
///
/// Every operation takes the single internal lock, so `update` is atomic with
/// respect to concurrent `set`/`update` calls from parallel task branches.
/// Reading a key with the wrong type is a caller bug: it trips a debug
/// assertion and yields the type's default in release builds.
#[derive(Debug, Clone, Default)]
pub struct Blackboard {
    entries: Arc<Mutex<HashMap<String, Value>>>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set<T: BlackboardValue>(&self, key: &str, value: T) {
        self.lock().insert(key.to_string(), value.into_value());
    }

    pub fn get<T: BlackboardValue>(&self, key: &str) -> T {
        self.try_get(key).unwrap_or_default()
    }

    /// Returns `None` when the key is absent.
    pub fn try_get<T: BlackboardValue>(&self, key: &str) -> Option<T> {
        let entries = self.lock();
        let value = entries.get(key)?;
        let typed = T::from_value(value);
        debug_assert!(
            typed.is_some(),
            "blackboard key '{key}' holds a {} value",
            value.type_name()
        );
        if typed.is_none() {
            tracing::error!(key, stored = value.type_name(), "Blackboard type mismatch");
        }
        typed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Atomically replaces the value under `key` with `f(old)` and returns the
    /// new value. An absent key starts from the type's default.
    pub fn update<T, F>(&self, key: &str, f: F) -> T
    where
        T: BlackboardValue,
        F: FnOnce(T) -> T,
    {
        let mut entries = self.lock();
        let old = entries
            .get(key)
            .and_then(T::from_value)
            .unwrap_or_default();
        let new = f(old);
        entries.insert(key.to_string(), new.clone().into_value());
        new
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
