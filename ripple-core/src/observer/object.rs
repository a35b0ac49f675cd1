//! Reactive objects.
//!
//! An [`Object`] is a shared, insertion-ordered map from keys to slots. A
//! slot is either plain (no interception) or reactive: a value paired with a
//! [`PropertyCell`] holding the property's dep. [`observe`](super::observe)
//! turns every plain slot into a reactive one; afterwards reads through
//! [`Object::get`] register dependencies and writes through [`Object::set`]
//! notify subscribers.
//!
//! Keys added with [`Object::set`] after observation stay plain. Use the
//! module-level [`set`](super::set) to add a key reactively.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::{depend_array, observe, Observer, Value};
use crate::error::{Error, Result};
use crate::reactive::{Dep, EvaluationContext, Host, HostRef};

/// Diagnostic hook run before a reactive property is written.
pub type CustomSetter = Arc<dyn Fn() + Send + Sync>;

/// A reactive property's bookkeeping.
pub(crate) struct PropertyCell {
    pub(crate) dep: Dep,
    pub(crate) custom_setter: Option<CustomSetter>,

    /// Shallow properties do not observe their values and do not expose
    /// nested deps to readers.
    pub(crate) shallow: bool,
}

pub(crate) enum Slot {
    Plain(Value),
    Reactive { value: Value, cell: Arc<PropertyCell> },
}

impl Slot {
    fn value(&self) -> &Value {
        match self {
            Slot::Plain(value) | Slot::Reactive { value, .. } => value,
        }
    }
}

/// A shared map of properties.
///
/// Cloning an `Object` creates a new handle to the same properties.
#[derive(Clone)]
pub struct Object {
    inner: Arc<ObjectInner>,
}

pub(crate) struct ObjectInner {
    pub(crate) props: Mutex<IndexMap<String, Slot>>,
    pub(crate) observer: OnceLock<Arc<Observer>>,
    frozen: AtomicBool,
    raw: AtomicBool,
}

impl Object {
    pub fn new() -> Self {
        Self::from_entries(std::iter::empty())
    }

    /// Build a plain object. Nothing is observed until [`observe`] is called.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Self {
            inner: Arc::new(ObjectInner {
                props: Mutex::new(
                    entries
                        .into_iter()
                        .map(|(key, value)| (key, Slot::Plain(value)))
                        .collect(),
                ),
                observer: OnceLock::new(),
                frozen: AtomicBool::new(false),
                raw: AtomicBool::new(false),
            }),
        }
    }

    /// Read `key`, registering the read with the evaluating watcher.
    pub fn get(&self, key: &str) -> Value {
        self.inner.get(key)
    }

    /// Read `key` without tracking.
    pub fn peek(&self, key: &str) -> Value {
        self.inner
            .props
            .lock()
            .get(key)
            .map(|slot| slot.value().clone())
            .unwrap_or_default()
    }

    /// Write `key`.
    ///
    /// For a reactive property this is a no-op when `value` is the same
    /// value as the current one; otherwise the custom setter runs, the new
    /// value is observed (unless shallow) and subscribers are notified.
    /// Errors come only from internal watchers re-run by the notification.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::InvalidData(format!(
                "cannot assign to property \"{key}\" of a frozen object"
            )));
        }

        let cell = {
            let mut props = self.inner.props.lock();
            match props.get_mut(key) {
                Some(Slot::Reactive { value: current, cell }) => {
                    if current.same_value(&value) {
                        return Ok(());
                    }
                    Arc::clone(cell)
                }
                Some(Slot::Plain(current)) => {
                    *current = value;
                    return Ok(());
                }
                None => {
                    props.insert(key.to_string(), Slot::Plain(value));
                    return Ok(());
                }
            }
        };

        if let Some(hook) = &cell.custom_setter {
            hook();
        }

        if let Some(Slot::Reactive { value: current, .. }) = self.inner.props.lock().get_mut(key) {
            *current = value.clone();
        }

        if !cell.shallow {
            observe(&value, false);
        }
        cell.dep.notify()
    }

    /// Store `value` under `key` as a plain slot, bypassing interception.
    ///
    /// Meant for assembling data before it is observed.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.inner.props.lock().insert(key.into(), Slot::Plain(value));
    }

    /// Remove `key` without notifying anyone.
    pub(crate) fn remove_raw(&self, key: &str) -> Option<Value> {
        self.inner.props.lock().shift_remove(key).map(|slot| match slot {
            Slot::Plain(value) | Slot::Reactive { value, .. } => value,
        })
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.props.lock().contains_key(key)
    }

    /// Keys in insertion order. Not tracked.
    pub fn keys(&self) -> Vec<String> {
        self.inner.props.lock().keys().cloned().collect()
    }

    /// Untracked snapshot of all entries.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.inner
            .props
            .lock()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.props.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` has a reactive accessor installed.
    pub fn is_reactive(&self, key: &str) -> bool {
        matches!(self.inner.props.lock().get(key), Some(Slot::Reactive { .. }))
    }

    /// The dep backing the reactive property `key`.
    pub fn dep(&self, key: &str) -> Option<Dep> {
        match self.inner.props.lock().get(key) {
            Some(Slot::Reactive { cell, .. }) => Some(cell.dep.clone()),
            _ => None,
        }
    }

    pub fn observer(&self) -> Option<Arc<Observer>> {
        self.inner.observer.get().cloned()
    }

    /// Freeze the object: it will never be observed and rejects writes.
    pub fn freeze(&self) -> &Self {
        self.inner.frozen.store(true, Ordering::SeqCst);
        self
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::SeqCst)
    }

    /// Exclude the object from observation while keeping it writable.
    pub fn mark_raw(&self) -> &Self {
        self.inner.raw.store(true, Ordering::SeqCst);
        self
    }

    pub fn is_raw(&self) -> bool {
        self.inner.raw.load(Ordering::SeqCst)
    }

    /// Resolve watcher paths against this object.
    pub fn host_ref(&self) -> HostRef {
        let weak: Weak<ObjectInner> = Arc::downgrade(&self.inner);
        weak
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    pub(crate) fn downgrade(&self) -> Weak<ObjectInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<ObjectInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &ObjectInner {
        &self.inner
    }
}

impl ObjectInner {
    fn get(&self, key: &str) -> Value {
        let (value, cell) = match self.props.lock().get(key) {
            None => return Value::Undefined,
            Some(Slot::Plain(value)) => return value.clone(),
            Some(Slot::Reactive { value, cell }) => (value.clone(), Arc::clone(cell)),
        };

        if EvaluationContext::is_tracking() {
            cell.dep.depend();
            if !cell.shallow {
                if let Some(child) = value.observer() {
                    child.dep().depend();
                    if let Value::Array(items) = &value {
                        depend_array(items);
                    }
                }
            }
        }
        value
    }
}

impl Host for ObjectInner {
    fn lookup(&self, key: &str) -> Result<Value> {
        Ok(self.get(key))
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}
