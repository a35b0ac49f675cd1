//! State initialization: props, methods, data, computed, watch.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use indexmap::IndexMap;

use super::options::{GetterFn, Handler, PropDefault, PropOptions, WatchFn, WatchHandler};
use super::{Binding, ComputedEntry, Unwatch, Vm};
use crate::config;
use crate::error::{Error, Result};
use crate::observer::{define_reactive, observe, should_observe, toggle_observing, CustomSetter, Object, Value};
use crate::reactive::{untracked, Expression, Watcher, WatcherOptions};

/// Attribute names reserved by the host and unusable as props.
const RESERVED_ATTRIBUTES: &[&str] = &["key", "ref", "slot", "slot-scope", "is"];

/// Members every instance already has. Methods may not reuse these names.
const INSTANCE_MEMBERS: &[&str] = &[
    "$data", "$props", "$watch", "$set", "$delete", "$mount", "$destroy", "_data", "_props", "_watchers",
];

/// Keys starting with `$` or `_` are not proxied from data.
fn is_reserved(key: &str) -> bool {
    key.starts_with('$') || key.starts_with('_')
}

/// `fooBar` becomes `foo-bar`.
fn hyphenate(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Sets the observation toggle and restores the previous setting on drop.
struct ObservingScope {
    previous: bool,
}

impl ObservingScope {
    fn set(value: bool) -> Self {
        let previous = should_observe();
        toggle_observing(value);
        Self { previous }
    }
}

impl Drop for ObservingScope {
    fn drop(&mut self) {
        toggle_observing(self.previous);
    }
}

pub(super) fn init_state(vm: &Vm) -> Result<()> {
    let options = &vm.inner.options;

    if !options.props.is_empty() {
        init_props(vm);
    }
    if !options.methods.is_empty() {
        init_methods(vm);
    }
    if options.data.is_some() {
        init_data(vm);
    } else {
        observe(&Value::from(vm.data()), true);
    }
    if !options.computed.is_empty() {
        init_computed(vm)?;
    }
    if !options.watch.is_empty() {
        init_watch(vm)?;
    }
    Ok(())
}

fn init_props(vm: &Vm) {
    let inner = &vm.inner;

    // Values handed down by a parent are already reactive where they need
    // to be; only root instances convert them.
    let _scope = inner.options.has_parent.then(|| ObservingScope::set(false));

    for (key, prop) in &inner.options.props {
        let hyphenated = hyphenate(key);
        if RESERVED_ATTRIBUTES.contains(&hyphenated.as_str()) {
            config::warn(format!(
                "\"{hyphenated}\" is a reserved attribute and cannot be used as component prop."
            ));
        }

        let value = resolve_prop(key, prop, &inner.options.props_data);
        let setter = config::diagnostics_enabled().then(|| prop_mutation_warning(vm, key));
        define_reactive(&inner.props, key, Some(value), setter, false);
        inner.bindings.lock().insert(key.clone(), Binding::Prop);
    }
}

/// The value of prop `key`: the parent's value if given, else the default.
fn resolve_prop(key: &str, prop: &PropOptions, props_data: &IndexMap<String, Value>) -> Value {
    if let Some(value) = props_data.get(key) {
        if !matches!(value, Value::Undefined) {
            return value.clone();
        }
    }

    if prop.required {
        config::warn(format!("Missing required prop: \"{key}\""));
    }

    let value = match &prop.default {
        None => return Value::Undefined,
        Some(PropDefault::Value(value)) => {
            if value.is_object() {
                config::warn(format!(
                    "Invalid default value for prop \"{key}\": Props with type Object/Array must \
                     use a factory function to return the default value."
                ));
            }
            value.clone()
        }
        Some(PropDefault::Factory(factory)) => factory(),
    };

    // A default is a fresh value owned by this instance, so it is observed
    // even where parent values are not.
    let _scope = ObservingScope::set(true);
    observe(&value, false);
    value
}

fn prop_mutation_warning(vm: &Vm, key: &str) -> CustomSetter {
    let this = vm.inner.this.clone();
    let key = key.to_string();
    Arc::new(move || {
        let Some(inner) = this.upgrade() else {
            return;
        };
        if inner.options.has_parent && !inner.updating_props.load(Ordering::SeqCst) {
            config::warn(format!(
                "Avoid mutating a prop directly since the value will be overwritten whenever \
                 the parent component re-renders. Instead, use a data or computed property \
                 based on the prop's value. Prop being mutated: \"{key}\""
            ));
        }
    })
}

pub(super) fn update_props(vm: &Vm, values: &IndexMap<String, Value>) -> Result<()> {
    let inner = &vm.inner;
    let _scope = ObservingScope::set(false);
    for (key, prop) in &inner.options.props {
        let value = resolve_prop(key, prop, values);
        inner.props.set(key, value)?;
    }
    Ok(())
}

fn init_methods(vm: &Vm) {
    let inner = &vm.inner;
    let options = &inner.options;

    for (key, method) in &options.methods {
        if method.is_none() {
            config::warn(format!(
                "Method \"{key}\" has an undefined value in the component definition. \
                 Did you reference the function correctly?"
            ));
        }
        if options.props.contains_key(key) {
            config::warn(format!("Method \"{key}\" has already been defined as a prop."));
            continue;
        }
        if is_reserved(key) && INSTANCE_MEMBERS.contains(&key.as_str()) {
            config::warn(format!(
                "Method \"{key}\" conflicts with an existing instance method. \
                 Avoid defining component methods that start with _ or $."
            ));
        }

        inner.methods.lock().insert(key.clone(), method.clone());
        inner.bindings.lock().insert(key.clone(), Binding::Method);
    }
}

fn init_data(vm: &Vm) {
    let inner = &vm.inner;
    let options = &inner.options;

    let data = match get_data(vm) {
        Value::Object(obj) => obj,
        other => {
            config::warn(format!("data functions should return an object, got {}", other.kind()));
            Object::new()
        }
    };
    *inner.data.lock() = data.clone();

    for key in data.keys() {
        if options.methods.contains_key(&key) {
            config::warn(format!("Method \"{key}\" has already been defined as a data property."));
        }
        if options.props.contains_key(&key) {
            config::warn(format!(
                "The data property \"{key}\" is already declared as a prop. Use prop default value instead."
            ));
        } else if !is_reserved(&key) {
            inner.bindings.lock().insert(key, Binding::Data);
        }
    }

    observe(&Value::from(data), true);
}

/// Run the data factory with dependency collection suspended, so an
/// enclosing watcher does not subscribe to whatever the factory reads.
fn get_data(vm: &Vm) -> Value {
    let Some(factory) = vm.inner.options.data.clone() else {
        return Value::from(Object::new());
    };
    untracked(|| factory(vm)).unwrap_or_else(|error| {
        config::handle_error(&error, "data()");
        Value::from(Object::new())
    })
}

fn init_computed(vm: &Vm) -> Result<()> {
    let inner = &vm.inner;

    for (key, def) in &inner.options.computed {
        let getter: GetterFn = match &def.get {
            Some(get) => Arc::clone(get),
            None => {
                config::warn(format!("Getter is missing for computed property \"{key}\"."));
                Arc::new(|_: &Vm| -> Result<Value> { Ok(Value::Undefined) })
            }
        };

        let watcher = Watcher::new(
            Some(vm.host_ref()),
            vm.bind_getter(getter),
            None,
            WatcherOptions::default().lazy(),
        )?;
        inner.computed.lock().insert(
            key.clone(),
            ComputedEntry {
                watcher,
                options: def.clone(),
            },
        );

        let existing = inner.bindings.lock().get(key).copied();
        match existing {
            None => {
                inner.bindings.lock().insert(key.clone(), Binding::Computed);
            }
            Some(Binding::Data) => {
                config::warn(format!("The computed property \"{key}\" is already defined in data."));
            }
            Some(Binding::Prop) => {
                config::warn(format!("The computed property \"{key}\" is already defined as a prop."));
            }
            Some(Binding::Method) => {
                config::warn(format!("The computed property \"{key}\" is already defined as a method."));
            }
            Some(Binding::Computed) => {}
        }
    }
    Ok(())
}

fn init_watch(vm: &Vm) -> Result<()> {
    for (key, handlers) in &vm.inner.options.watch {
        for handler in handlers {
            create_watcher(vm, key, handler)?;
        }
    }
    Ok(())
}

fn create_watcher(vm: &Vm, key: &str, handler: &WatchHandler) -> Result<Unwatch> {
    let callback: WatchFn = match &handler.handler {
        Handler::Callback(f) => Arc::clone(f),
        Handler::Method(name) => {
            let method = vm.inner.methods.lock().get(name).cloned();
            match method {
                Some(Some(method)) => Arc::new(move |vm: &Vm, new: &Value, old: &Value| {
                    method(vm, &[new.clone(), old.clone()]).map(drop)
                }),
                Some(None) => Arc::new(|_: &Vm, _: &Value, _: &Value| -> Result<()> { Ok(()) }),
                None => return Err(Error::UnknownMethod(name.clone())),
            }
        }
    };
    vm.watch_with(Expression::path(key), callback, handler.flags.into())
}
