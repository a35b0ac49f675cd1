//! Observation
//!
//! This module turns plain objects and arrays into reactive state.
//!
//! # Observers
//!
//! An [`Observer`] is attached to each observed object or array. It owns a
//! dep that fires on structural changes: keys added through [`set`], keys
//! removed through [`del`], and array mutations. Per-property changes fire
//! the property's own dep instead (see [`define_reactive`]).
//!
//! Observation is idempotent and recursive. Observing a value walks its
//! keys (or items) and observes every nested object or array it reaches.
//! Frozen and raw values, scalars, and anything observed while observation
//! is toggled off are skipped.
//!
//! # Root data
//!
//! Objects used as an instance's root data carry a count of the instances
//! using them. Adding or deleting keys on such an object is refused with a
//! warning, since the instance proxies only the keys known at creation.

mod array;
mod object;
mod value;

pub use array::Array;
pub use object::{CustomSetter, Object};
pub use value::Value;

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use array::ArrayInner;
use object::{ObjectInner, PropertyCell, Slot};

use crate::config;
use crate::error::{Error, Result};
use crate::reactive::Dep;

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Indices at or above this are refused by [`set`], matching the largest
/// valid array length of the host model.
pub const MAX_ARRAY_INDEX: usize = u32::MAX as usize;

/// Enable or disable observation of new values on this thread.
///
/// While disabled, [`observe`] creates no new observers. Values that are
/// already observed are unaffected.
pub fn toggle_observing(value: bool) {
    SHOULD_OBSERVE.with(|flag| flag.set(value));
}

pub fn should_observe() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

enum Target {
    Object(Weak<ObjectInner>),
    Array(Weak<ArrayInner>),
}

/// Bookkeeping attached to an observed object or array.
pub struct Observer {
    dep: Dep,

    /// Number of instances using the value as root data.
    vm_count: AtomicUsize,

    target: Target,
}

impl Observer {
    fn new(target: Target) -> Self {
        Self {
            dep: Dep::new(),
            vm_count: AtomicUsize::new(0),
            target,
        }
    }

    /// Dep notified on structural changes to the observed value.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    pub fn vm_count(&self) -> usize {
        self.vm_count.load(Ordering::SeqCst)
    }

    pub(crate) fn attach_vm(&self) {
        self.vm_count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn detach_vm(&self) {
        // Saturating: detaching an unattached observer is a no-op.
        let _ = self
            .vm_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// The observed value, if it is still alive.
    pub fn value(&self) -> Option<Value> {
        match &self.target {
            Target::Object(weak) => weak.upgrade().map(|inner| Value::Object(Object::from_inner(inner))),
            Target::Array(weak) => weak.upgrade().map(|inner| Value::Array(Array::from_inner(inner))),
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep.id())
            .field("vm_count", &self.vm_count())
            .finish()
    }
}

/// Attach an observer to `value`, or return the one it already has.
///
/// Returns `None` for scalars and for values that may not be observed.
/// With `as_root_data` the observer's instance count is incremented.
pub fn observe(value: &Value, as_root_data: bool) -> Option<Arc<Observer>> {
    let ob = match value {
        Value::Object(obj) => match obj.observer() {
            Some(ob) => ob,
            None if !should_observe() || obj.is_frozen() || obj.is_raw() => return None,
            None => {
                let mut created = false;
                let ob = Arc::clone(obj.inner().observer.get_or_init(|| {
                    created = true;
                    Arc::new(Observer::new(Target::Object(obj.downgrade())))
                }));
                if created {
                    walk(obj);
                }
                ob
            }
        },
        Value::Array(arr) => match arr.observer() {
            Some(ob) => ob,
            None if !should_observe() || arr.is_frozen() || arr.is_raw() => return None,
            None => {
                let mut created = false;
                let ob = Arc::clone(arr.inner().observer.get_or_init(|| {
                    created = true;
                    Arc::new(Observer::new(Target::Array(arr.downgrade())))
                }));
                if created {
                    observe_array(&arr.to_vec());
                }
                ob
            }
        },
        _ => return None,
    };

    if as_root_data {
        ob.attach_vm();
    }
    Some(ob)
}

/// Install reactive accessors for every key of `obj`.
fn walk(obj: &Object) {
    for key in obj.keys() {
        define_reactive(obj, &key, None, None, false);
    }
}

/// Observe every item of `items`.
pub fn observe_array(items: &[Value]) {
    for item in items {
        observe(item, false);
    }
}

/// Make `key` of `obj` a reactive property.
///
/// With `value` the property is (re)initialised to it; otherwise the
/// current value is kept. Redefining an already reactive key keeps its dep,
/// so existing subscribers stay attached. `custom_setter` runs before every
/// effective write. `shallow` properties neither observe their value nor
/// expose nested deps to readers. Frozen objects are left untouched.
pub fn define_reactive(
    obj: &Object,
    key: &str,
    value: Option<Value>,
    custom_setter: Option<CustomSetter>,
    shallow: bool,
) {
    if obj.is_frozen() {
        return;
    }

    let (value, dep) = {
        let props = obj.inner().props.lock();
        let (current, dep) = match props.get(key) {
            Some(Slot::Plain(current)) => (current.clone(), None),
            Some(Slot::Reactive { value, cell }) => (value.clone(), Some(cell.dep.clone())),
            None => (Value::Undefined, None),
        };
        (value.unwrap_or(current), dep.unwrap_or_default())
    };

    if !shallow {
        observe(&value, false);
    }

    let cell = Arc::new(PropertyCell {
        dep,
        custom_setter,
        shallow,
    });
    obj.inner()
        .props
        .lock()
        .insert(key.to_string(), Slot::Reactive { value, cell });
}

/// Register the current watcher with every observed item of `arr`,
/// recursing into nested arrays.
///
/// Items have no property dep of their own, so this is how a read of an
/// array subscribes to in-place changes of its elements.
pub fn depend_array(arr: &Array) {
    for item in arr.to_vec() {
        if let Some(ob) = item.observer() {
            ob.dep().depend();
        }
        if let Value::Array(nested) = &item {
            depend_array(nested);
        }
    }
}

/// Set `key` on `target`, adding it as a reactive property if it is new.
///
/// Array targets take a numeric index; writing past the end pads with
/// `Undefined`. Adding a key to an observed object notifies the object's
/// observer dep. Returns the value written.
pub fn set(target: &Value, key: &str, value: Value) -> Result<Value> {
    match target {
        Value::Array(arr) => {
            let Ok(index) = key.parse::<usize>() else {
                config::warn(format!("Cannot set non-index key \"{key}\" on an array."));
                return Ok(value);
            };
            if index >= MAX_ARRAY_INDEX {
                config::warn(format!("Array index {index} is out of range."));
                return Ok(value);
            }
            arr.pad_to(index)?;
            arr.splice(index, 1, vec![value.clone()])?;
            Ok(value)
        }
        Value::Object(obj) => {
            if obj.has(key) || obj.is_frozen() {
                obj.set(key, value.clone())?;
                return Ok(value);
            }

            let Some(ob) = obj.observer() else {
                obj.set(key, value.clone())?;
                return Ok(value);
            };
            if ob.vm_count() > 0 {
                config::warn(
                    "Avoid adding reactive properties to an instance or its root data at \
                     runtime - declare it upfront in the data option.",
                );
                return Ok(value);
            }

            define_reactive(obj, key, Some(value.clone()), None, false);
            ob.dep().notify()?;
            Ok(value)
        }
        other => {
            config::warn(format!(
                "Cannot set reactive property on undefined, null, or primitive value: {}",
                other.kind()
            ));
            Ok(value)
        }
    }
}

/// Delete `key` from `target`, notifying the observer dep if it existed.
pub fn del(target: &Value, key: &str) -> Result<()> {
    match target {
        Value::Array(arr) => {
            if let Ok(index) = key.parse::<usize>() {
                arr.splice(index, 1, Vec::new())?;
            }
            Ok(())
        }
        Value::Object(obj) => {
            let ob = obj.observer();
            if ob.as_ref().is_some_and(|ob| ob.vm_count() > 0) {
                config::warn(
                    "Avoid deleting properties on an instance or its root data - just set it to null.",
                );
                return Ok(());
            }
            if !obj.has(key) {
                return Ok(());
            }
            if obj.is_frozen() {
                return Err(Error::InvalidData(format!(
                    "cannot delete property \"{key}\" of a frozen object"
                )));
            }

            obj.remove_raw(key);
            match ob {
                Some(ob) => ob.dep().notify(),
                None => Ok(()),
            }
        }
        other => {
            config::warn(format!(
                "Cannot delete reactive property on undefined, null, or primitive value: {}",
                other.kind()
            ));
            Ok(())
        }
    }
}
