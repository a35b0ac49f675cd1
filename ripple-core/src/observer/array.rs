//! Reactive arrays.
//!
//! Arrays have no per-index deps. Every mutating method goes through
//! [`Array::mutate`], which observes the inserted items and then notifies
//! the array's observer dep once. Readers that touched the array through a
//! reactive property are subscribed to that dep, so any structural change
//! re-runs them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use super::{observe, Observer, Value};
use crate::error::{Error, Result};

/// A shared, growable list of values.
///
/// Cloning an `Array` creates a new handle to the same items.
#[derive(Clone)]
pub struct Array {
    inner: Arc<ArrayInner>,
}

pub(crate) struct ArrayInner {
    items: Mutex<Vec<Value>>,
    pub(crate) observer: OnceLock<Arc<Observer>>,
    frozen: AtomicBool,
    raw: AtomicBool,
}

impl Array {
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    /// Item at `index`, or `Undefined` when out of bounds.
    pub fn get(&self, index: usize) -> Value {
        self.inner.items.lock().get(index).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Untracked snapshot of the items.
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.lock().clone()
    }

    /// Append `value`, returning the new length.
    pub fn push(&self, value: Value) -> Result<usize> {
        self.mutate("push", vec![value.clone()], |items| {
            items.push(value);
            items.len()
        })
    }

    pub fn pop(&self) -> Result<Value> {
        self.mutate("pop", Vec::new(), |items| items.pop().unwrap_or_default())
    }

    pub fn shift(&self) -> Result<Value> {
        self.mutate("shift", Vec::new(), |items| {
            if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            }
        })
    }

    /// Prepend `values`, returning the new length.
    pub fn unshift(&self, values: Vec<Value>) -> Result<usize> {
        self.mutate("unshift", values.clone(), |items| {
            items.splice(0..0, values);
            items.len()
        })
    }

    /// Remove `delete_count` items at `start` and insert `values` in their
    /// place. Both bounds are clamped to the array. Returns the removed items.
    pub fn splice(&self, start: usize, delete_count: usize, values: Vec<Value>) -> Result<Vec<Value>> {
        self.mutate("splice", values.clone(), |items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, values).collect()
        })
    }

    /// Sort in place with `compare`.
    pub fn sort_by<F>(&self, compare: F) -> Result<()>
    where
        F: FnMut(&Value, &Value) -> std::cmp::Ordering,
    {
        self.mutate("sort", Vec::new(), |items| items.sort_by(compare))
    }

    pub fn reverse(&self) -> Result<()> {
        self.mutate("reverse", Vec::new(), |items| items.reverse())
    }

    /// Run `op` against the items, observe `inserted`, then notify.
    ///
    /// The item lock is released before observing or notifying, so
    /// subscribers may read the array while they re-run.
    fn mutate<R>(&self, method: &str, inserted: Vec<Value>, op: impl FnOnce(&mut Vec<Value>) -> R) -> Result<R> {
        if self.is_frozen() {
            return Err(Error::InvalidData(format!("cannot {method} a frozen array")));
        }

        let result = op(&mut self.inner.items.lock());

        let Some(ob) = self.observer() else {
            return Ok(result);
        };
        for value in &inserted {
            observe(value, false);
        }
        tracing::trace!(method, dep = %ob.dep().id(), "array mutated");
        ob.dep().notify()?;
        Ok(result)
    }

    /// Grow the array with `Undefined` up to `len` items. Does not notify;
    /// frozen arrays are left alone. Fails if the allocation is refused.
    pub(crate) fn pad_to(&self, len: usize) -> Result<()> {
        if self.is_frozen() {
            return Ok(());
        }
        let mut items = self.inner.items.lock();
        if items.len() < len {
            let additional = len - items.len();
            items
                .try_reserve(additional)
                .map_err(|err| Error::InvalidData(format!("cannot grow array to {len} items: {err}")))?;
            items.resize(len, Value::Undefined);
        }
        Ok(())
    }

    pub fn observer(&self) -> Option<Arc<Observer>> {
        self.inner.observer.get().cloned()
    }

    /// Freeze the array: it will never be observed and rejects mutation.
    pub fn freeze(&self) -> &Self {
        self.inner.frozen.store(true, Ordering::SeqCst);
        self
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::SeqCst)
    }

    /// Exclude the array from observation while keeping it mutable.
    pub fn mark_raw(&self) -> &Self {
        self.inner.raw.store(true, Ordering::SeqCst);
        self
    }

    pub fn is_raw(&self) -> bool {
        self.inner.raw.load(Ordering::SeqCst)
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    pub(crate) fn downgrade(&self) -> Weak<ArrayInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<ArrayInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &ArrayInner {
        &self.inner
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self {
            inner: Arc::new(ArrayInner {
                items: Mutex::new(items),
                observer: OnceLock::new(),
                frozen: AtomicBool::new(false),
                raw: AtomicBool::new(false),
            }),
        }
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}
