//! Instances
//!
//! A [`Vm`] is the host that reactive state is initialized on. It owns the
//! props object, the root data object, method and computed tables, and
//! every watcher created against it.
//!
//! # Initialization Order
//!
//! [`Vm::new`] applies the options in a fixed order:
//!
//! 1. **props**: resolved from the parent's values or defaults and made
//!    reactive on the props object.
//! 2. **methods**: a method colliding with a prop is rejected.
//! 3. **data**: the factory runs untracked; its result becomes the root
//!    data. A key colliding with a prop is shadowed by the prop.
//! 4. **computed**: each gets a lazy watcher. Reads re-evaluate only when
//!    the watcher is dirty.
//! 5. **watch**: each declared handler becomes a user watcher.
//!
//! Collisions produce warnings, never errors.
//!
//! # Key Resolution
//!
//! [`Vm::get`] and [`Vm::set`] resolve a top-level key through a binding
//! table filled during initialization, the same table that path watchers
//! resolve their first segment against.

mod options;
mod state;

pub use options::{
    ComponentOptions, ComputedOptions, DataFn, GetterFn, Handler, MethodFn, PropDefault, PropOptions,
    SetterFn, WatchFlags, WatchFn, WatchHandler,
};

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::config;
use crate::error::{Error, Result};
use crate::observer::{self, Object, Value};
use crate::reactive::{callback, EvaluationContext, Expression, Host, HostRef, Watcher, WatcherId, WatcherOptions};

/// What a top-level key of an instance refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Prop,
    Method,
    Data,
    Computed,
}

#[derive(Clone)]
struct ComputedEntry {
    watcher: Watcher,
    options: ComputedOptions,
}

/// A reactive instance.
///
/// Cloning a `Vm` creates a new handle to the same instance.
#[derive(Clone)]
pub struct Vm {
    inner: Arc<VmInner>,
}

pub(crate) struct VmInner {
    id: u64,
    this: Weak<VmInner>,
    options: ComponentOptions,

    props: Object,
    data: Mutex<Object>,
    bindings: Mutex<IndexMap<String, Binding>>,
    methods: Mutex<IndexMap<String, Option<MethodFn>>>,
    computed: Mutex<IndexMap<String, ComputedEntry>>,

    /// Every live watcher created against this instance.
    watchers: Mutex<IndexMap<WatcherId, Watcher>>,
    render: Mutex<Option<Watcher>>,

    /// Set while the parent pushes new prop values.
    updating_props: AtomicBool,
    destroyed: AtomicBool,
}

/// Handle returned by [`Vm::watch`].
#[derive(Debug, Clone)]
pub struct Unwatch {
    watcher: Watcher,
}

impl Unwatch {
    /// Stop watching. Idempotent.
    pub fn unwatch(&self) {
        self.watcher.teardown();
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }
}

impl Vm {
    /// Create an instance and initialize its state.
    pub fn new(options: ComponentOptions) -> Result<Self> {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);

        let inner = Arc::new_cyclic(|this| VmInner {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            this: this.clone(),
            options,
            props: Object::new(),
            data: Mutex::new(Object::new()),
            bindings: Mutex::new(IndexMap::new()),
            methods: Mutex::new(IndexMap::new()),
            computed: Mutex::new(IndexMap::new()),
            watchers: Mutex::new(IndexMap::new()),
            render: Mutex::new(None),
            updating_props: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        });
        let vm = Self { inner };

        if let Err(error) = state::init_state(&vm) {
            vm.destroy();
            return Err(error);
        }
        tracing::debug!(vm = vm.id(), "instance initialized");
        Ok(vm)
    }

    fn from_weak(this: &Weak<VmInner>) -> Option<Self> {
        this.upgrade().map(|inner| Self { inner })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The root data object.
    pub fn data(&self) -> Object {
        self.inner.data.lock().clone()
    }

    /// The props object.
    pub fn props(&self) -> Object {
        self.inner.props.clone()
    }

    /// Read a prop, data key or computed property.
    ///
    /// Unknown keys and method names read as `Undefined`. A computed
    /// property is recomputed only if its watcher is dirty, and the reading
    /// watcher (if any) inherits the computed's dependencies.
    pub fn get(&self, key: &str) -> Result<Value> {
        let binding = self.inner.bindings.lock().get(key).copied();
        match binding {
            Some(Binding::Prop) => Ok(self.inner.props.get(key)),
            Some(Binding::Data) => Ok(self.data().get(key)),
            Some(Binding::Computed) => self.computed_value(key),
            Some(Binding::Method) | None => Ok(Value::Undefined),
        }
    }

    fn computed_value(&self, key: &str) -> Result<Value> {
        let Some(entry) = self.inner.computed.lock().get(key).cloned() else {
            return Ok(Value::Undefined);
        };

        if !entry.options.cache {
            return match &entry.options.get {
                Some(get) => get(self),
                None => Ok(Value::Undefined),
            };
        }

        let value = entry.watcher.evaluate()?;
        if EvaluationContext::is_tracking() {
            entry.watcher.depend();
        }
        Ok(value)
    }

    /// Write a prop, data key or computed property.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        match key {
            "$data" => {
                config::warn("Avoid replacing instance root $data. Use nested data properties instead.");
                return Ok(());
            }
            "$props" => {
                config::warn("$props is readonly.");
                return Ok(());
            }
            _ => {}
        }

        let binding = self.inner.bindings.lock().get(key).copied();
        match binding {
            Some(Binding::Prop) => self.inner.props.set(key, value),
            Some(Binding::Data) => self.data().set(key, value),
            Some(Binding::Computed) => {
                let setter = self
                    .inner
                    .computed
                    .lock()
                    .get(key)
                    .and_then(|entry| entry.options.set.clone());
                match setter {
                    Some(set) => set(self, value),
                    None => {
                        config::warn(format!(
                            "Computed property \"{key}\" was assigned to but it has no setter."
                        ));
                        Ok(())
                    }
                }
            }
            Some(Binding::Method) | None => {
                config::warn(format!(
                    "Property \"{key}\" is not reactive on this instance. Declare it in data, \
                     props or computed."
                ));
                Ok(())
            }
        }
    }

    /// Call a method by name.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let method = self.inner.methods.lock().get(name).cloned();
        match method {
            Some(Some(method)) => method(self, args),
            Some(None) => Ok(Value::Undefined),
            None => Err(Error::UnknownMethod(name.to_string())),
        }
    }

    /// Whether `key` resolves to a prop, method, data key or computed.
    pub fn has(&self, key: &str) -> bool {
        self.inner.bindings.lock().contains_key(key)
    }

    /// Watch `expression` (a path or a closure) and call `callback` with
    /// `(new, old)` when it changes.
    ///
    /// The watcher is a user watcher: errors from its getter and callback
    /// are reported, not returned. The only error returned comes from an
    /// `immediate` callback of a non-user watcher, which cannot occur here.
    pub fn watch<F>(&self, expression: impl Into<Expression>, callback: F, options: WatcherOptions) -> Result<Unwatch>
    where
        F: Fn(&Vm, &Value, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.watch_with(expression.into(), Arc::new(callback), options)
    }

    /// Watch the result of `getter`, evaluated with this instance.
    pub fn watch_fn<G, F>(&self, getter: G, callback: F, options: WatcherOptions) -> Result<Unwatch>
    where
        G: Fn(&Vm) -> Result<Value> + Send + Sync + 'static,
        F: Fn(&Vm, &Value, &Value) -> Result<()> + Send + Sync + 'static,
    {
        let expression = self.bind_getter(Arc::new(getter));
        self.watch_with(expression, Arc::new(callback), options)
    }

    pub(crate) fn watch_with(&self, expression: Expression, handler: WatchFn, mut options: WatcherOptions) -> Result<Unwatch> {
        options.user = true;
        let this = self.inner.this.clone();
        let callback = callback(move |new, old| match Vm::from_weak(&this) {
            Some(vm) => handler(&vm, new, old),
            None => Ok(()),
        });
        let watcher = Watcher::new(Some(self.host_ref()), expression, Some(callback), options)?;
        Ok(Unwatch { watcher })
    }

    /// Turn an instance getter into a watcher expression that does not keep
    /// the instance alive.
    fn bind_getter(&self, getter: GetterFn) -> Expression {
        let this = self.inner.this.clone();
        Expression::function(move || match Vm::from_weak(&this) {
            Some(vm) => getter(&vm),
            None => Ok(Value::Undefined),
        })
    }

    /// Add or replace `key` on a reactive object or array.
    pub fn set_property(&self, target: &Value, key: &str, value: Value) -> Result<Value> {
        observer::set(target, key, value)
    }

    /// Delete `key` from a reactive object or array.
    pub fn delete_property(&self, target: &Value, key: &str) -> Result<()> {
        observer::del(target, key)
    }

    /// Install the render watcher, replacing any previous one.
    ///
    /// The render function runs immediately and again whenever anything it
    /// read changes. Its errors propagate to whoever triggered the re-run.
    pub fn mount<F>(&self, render: F) -> Result<()>
    where
        F: Fn(&Vm) -> Result<Value> + Send + Sync + 'static,
    {
        let expression = self.bind_getter(Arc::new(render));
        let watcher = Watcher::new(Some(self.host_ref()), expression, None, WatcherOptions::default())?;
        let previous = self.inner.render.lock().replace(watcher);
        if let Some(previous) = previous {
            previous.teardown();
        }
        Ok(())
    }

    /// Output of the last render, or `Undefined` if not mounted.
    pub fn rendered(&self) -> Value {
        self.render_watcher()
            .map(|watcher| watcher.value())
            .unwrap_or_default()
    }

    pub fn render_watcher(&self) -> Option<Watcher> {
        self.inner.render.lock().clone()
    }

    /// Push new prop values from the parent.
    ///
    /// Every declared prop is re-resolved; props missing from `values` fall
    /// back to their default. Writes made here do not trigger the
    /// prop-mutation warning.
    pub fn update_props<I, K>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let values: IndexMap<String, Value> = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let _updating = UpdatingProps::enter(&self.inner);
        state::update_props(self, &values)
    }

    /// The lazy watcher backing the computed property `key`.
    pub fn computed_watcher(&self, key: &str) -> Option<Watcher> {
        self.inner
            .computed
            .lock()
            .get(key)
            .map(|entry| entry.watcher.clone())
    }

    /// Number of live watchers owned by this instance.
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.lock().len()
    }

    /// Tear down every watcher and release the root data. Idempotent.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let watchers: Vec<Watcher> = self.inner.watchers.lock().values().cloned().collect();
        for watcher in &watchers {
            watcher.teardown();
        }
        self.inner.render.lock().take();

        if let Some(ob) = self.data().observer() {
            ob.detach_vm();
        }
        tracing::debug!(vm = self.id(), watchers = watchers.len(), "instance destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Resolve watcher paths against this instance.
    pub fn host_ref(&self) -> HostRef {
        let weak: HostRef = self.inner.this.clone();
        weak
    }
}

/// Marks the instance as receiving props from its parent until dropped.
struct UpdatingProps<'a> {
    inner: &'a VmInner,
}

impl<'a> UpdatingProps<'a> {
    fn enter(inner: &'a VmInner) -> Self {
        inner.updating_props.store(true, Ordering::SeqCst);
        Self { inner }
    }
}

impl Drop for UpdatingProps<'_> {
    fn drop(&mut self) {
        self.inner.updating_props.store(false, Ordering::SeqCst);
    }
}

impl Host for VmInner {
    fn lookup(&self, key: &str) -> Result<Value> {
        match Vm::from_weak(&self.this) {
            Some(vm) => vm.get(key),
            None => Ok(Value::Undefined),
        }
    }

    fn track_watcher(&self, watcher: &Watcher) {
        self.watchers.lock().insert(watcher.id(), watcher.clone());
    }

    fn untrack_watcher(&self, id: WatcherId) {
        self.watchers.lock().shift_remove(&id);
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("id", &self.inner.id)
            .field("bindings", &*self.inner.bindings.lock())
            .field("watchers", &self.watcher_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::observer::observe;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn capture_warnings() -> (Arc<Mutex<Vec<String>>>, Config) {
        let warnings = Arc::new(Mutex::new(Vec::new()));
        let sink = warnings.clone();
        let previous = config::install(Config::default().with_warn_handler(move |msg| {
            sink.lock().push(msg.to_string());
        }));
        (warnings, previous)
    }

    fn with_data(json: serde_json::Value) -> ComponentOptions {
        ComponentOptions::new().data(move |_| Ok(Value::from(json.clone())))
    }

    #[test]
    fn init_order_resolves_collisions() {
        let (warnings, previous) = capture_warnings();
        let vm = Vm::new(
            ComponentOptions::new()
                .prop("a", PropOptions::new())
                .prop_value("a", 1)
                .method("a", |_, _| Ok(Value::from("method a")))
                .method("m", |_, _| Ok(Value::from("method m")))
                .data(|_| Ok(Value::from(json!({ "a": 10, "m": 20, "d": 30, "_hidden": 40 }))))
                .computed("d", ComputedOptions::getter(|_| Ok(Value::from("computed d"))))
                .computed("c", ComputedOptions::getter(|vm| vm.get("d"))),
        )
        .unwrap();
        config::install(previous);

        // Props beat methods and data.
        assert_eq!(vm.get("a").unwrap(), Value::from(1));
        assert_eq!(vm.call("a", &[]), Err(Error::UnknownMethod("a".to_string())));

        // Data shadows a method binding but the method stays callable.
        assert_eq!(vm.get("m").unwrap(), Value::from(20));
        assert_eq!(vm.call("m", &[]).unwrap(), Value::from("method m"));

        // Data beats computed.
        assert_eq!(vm.get("d").unwrap(), Value::from(30));
        assert_eq!(vm.get("c").unwrap(), Value::from(30));

        // Reserved data keys stay on the data object only.
        assert!(!vm.has("_hidden"));
        assert_eq!(vm.data().get("_hidden"), Value::from(40));

        assert_eq!(
            *warnings.lock(),
            vec![
                "Method \"a\" has already been defined as a prop.".to_string(),
                "Method \"a\" has already been defined as a data property.".to_string(),
                "The data property \"a\" is already declared as a prop. Use prop default value instead."
                    .to_string(),
                "Method \"m\" has already been defined as a data property.".to_string(),
                "The computed property \"d\" is already defined in data.".to_string(),
            ]
        );
    }

    #[test]
    fn computed_caches_until_dependency_changes() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let vm = Vm::new(with_data(json!({ "a": 2, "b": 3 })).computed(
            "product",
            ComputedOptions::getter(move |vm| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::from(vm.get("a")?.as_number() * vm.get("b")?.as_number()))
            }),
        ))
        .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        assert_eq!(vm.get("product").unwrap(), Value::from(6));
        assert_eq!(vm.get("product").unwrap(), Value::from(6));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        vm.set("a", Value::from(5)).unwrap();
        assert!(vm.computed_watcher("product").unwrap().is_dirty());
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        assert_eq!(vm.get("product").unwrap(), Value::from(15));
        assert_eq!(vm.get("product").unwrap(), Value::from(15));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn render_sees_through_computed() {
        let vm = Vm::new(with_data(json!({ "a": 1, "b": 2 })).computed(
            "sum",
            ComputedOptions::getter(|vm| Ok(Value::from(vm.get("a")?.as_number() + vm.get("b")?.as_number()))),
        ))
        .unwrap();

        let renders = Arc::new(AtomicUsize::new(0));
        let counter = renders.clone();
        vm.mount(move |vm| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::from(format!("sum={}", vm.get("sum")?.as_number())))
        })
        .unwrap();
        assert_eq!(vm.rendered(), Value::from("sum=3"));

        vm.set("a", Value::from(1)).unwrap();
        assert_eq!(renders.load(Ordering::SeqCst), 1);

        vm.set("a", Value::from(5)).unwrap();
        assert_eq!(renders.load(Ordering::SeqCst), 2);
        assert_eq!(vm.rendered(), Value::from("sum=7"));
    }

    #[test]
    fn render_reading_data_before_computed_sees_fresh_value() {
        let vm = Vm::new(with_data(json!({ "a": 1 })).computed(
            "double",
            ComputedOptions::getter(|vm| Ok(Value::from(vm.get("a")?.as_number() * 2.0))),
        ))
        .unwrap();
        vm.mount(|vm| {
            let a = vm.get("a")?.as_number();
            let double = vm.get("double")?.as_number();
            Ok(Value::from(format!("a={a} double={double}")))
        })
        .unwrap();
        assert_eq!(vm.rendered(), Value::from("a=1 double=2"));

        vm.set("a", Value::from(5)).unwrap();
        assert_eq!(vm.rendered(), Value::from("a=5 double=10"));
    }

    #[test]
    fn computed_setters() {
        let (warnings, previous) = capture_warnings();
        let vm = Vm::new(
            with_data(json!({ "first": "Ada", "last": "Lovelace" }))
                .computed(
                    "full",
                    ComputedOptions::getter(|vm| {
                        let first = vm.get("first")?;
                        let last = vm.get("last")?;
                        Ok(Value::from(format!(
                            "{} {}",
                            first.as_str().unwrap_or_default(),
                            last.as_str().unwrap_or_default()
                        )))
                    })
                    .with_setter(|vm, value| {
                        let full = value.as_str().unwrap_or_default().to_string();
                        let (first, last) = full.split_once(' ').unwrap_or((full.as_str(), ""));
                        vm.set("first", Value::from(first))?;
                        vm.set("last", Value::from(last))
                    }),
                )
                .computed("constant", ComputedOptions::getter(|_| Ok(Value::Null))),
        )
        .unwrap();

        vm.set("full", Value::from("Grace Hopper")).unwrap();
        vm.set("constant", Value::from(1)).unwrap();
        config::install(previous);

        assert_eq!(vm.get("full").unwrap(), Value::from("Grace Hopper"));
        assert_eq!(vm.get("last").unwrap(), Value::from("Hopper"));
        assert_eq!(
            *warnings.lock(),
            vec!["Computed property \"constant\" was assigned to but it has no setter.".to_string()]
        );
    }

    #[test]
    fn uncached_computed_calls_getter_every_read() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let vm = Vm::new(ComponentOptions::new().computed(
            "now",
            ComputedOptions::getter(move |_| Ok(Value::from(counter.fetch_add(1, Ordering::SeqCst))))
                .uncached(),
        ))
        .unwrap();

        assert_eq!(vm.get("now").unwrap(), Value::from(0));
        assert_eq!(vm.get("now").unwrap(), Value::from(1));
        assert!(vm.computed_watcher("now").unwrap().is_dirty());
    }

    #[test]
    fn declared_watchers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = |seen: &Arc<Mutex<Vec<String>>>| {
            let seen = seen.clone();
            move |entry: String| seen.lock().push(entry)
        };
        let (on_count, on_immediate, on_deep, on_shallow, on_name) =
            (log(&seen), log(&seen), log(&seen), log(&seen), log(&seen));

        let vm = Vm::new(
            with_data(json!({ "count": 0, "user": { "name": "ada" } }))
                .method("onCount", move |_, args| {
                    on_count(format!("method {} <- {}", args[0].as_number(), args[1].as_number()));
                    Ok(Value::Undefined)
                })
                .watch("count", WatchHandler::method("onCount"))
                .watch(
                    "count",
                    WatchHandler::callback(move |_, new, _| {
                        on_immediate(format!("callback {}", new.as_number()));
                        Ok(())
                    })
                    .immediate(),
                )
                .watch(
                    "user",
                    WatchHandler::callback(move |_, _, _| {
                        on_deep("deep".to_string());
                        Ok(())
                    })
                    .deep(),
                )
                .watch(
                    "user",
                    WatchHandler::callback(move |_, _, _| {
                        on_shallow("shallow".to_string());
                        Ok(())
                    }),
                )
                .watch(
                    "user.name",
                    WatchHandler::callback(move |_, new, _| {
                        on_name(format!("name {}", new.as_str().unwrap_or_default()));
                        Ok(())
                    }),
                ),
        )
        .unwrap();
        assert_eq!(vm.watcher_count(), 5);

        vm.set("count", Value::from(1)).unwrap();
        let user = vm.get("user").unwrap();
        user.as_object().unwrap().set("name", Value::from("grace")).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                "callback 0".to_string(),
                "method 1 <- 0".to_string(),
                "callback 1".to_string(),
                "deep".to_string(),
                "name grace".to_string(),
            ]
        );
    }

    #[test]
    fn missing_handler_method_fails_creation() {
        let result = Vm::new(with_data(json!({ "a": 1 })).watch("a", WatchHandler::method("missing")));
        assert_eq!(result.unwrap_err(), Error::UnknownMethod("missing".to_string()));
    }

    #[test]
    fn unwatch_stops_callbacks() {
        let vm = Vm::new(with_data(json!({ "n": 1 }))).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = vm
            .watch(
                "n",
                move |_, _, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                WatcherOptions::default(),
            )
            .unwrap();
        assert!(handle.watcher().options().user);
        assert_eq!(vm.watcher_count(), 1);

        vm.set("n", Value::from(2)).unwrap();
        handle.unwatch();
        handle.unwatch();
        vm.set("n", Value::from(3)).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(vm.watcher_count(), 0);
    }

    #[test]
    fn data_factory_reads_are_not_tracked() {
        let external = Object::from_json(json!({ "seed": 1 })).unwrap();
        observe(&Value::from(external.clone()), false);

        let source = external.clone();
        let outer = Watcher::new(
            None,
            Expression::function(move || {
                let source = source.clone();
                let vm = Vm::new(
                    ComponentOptions::new()
                        .data(move |_| Ok(Value::from(json!({ "copy": source.get("seed").as_number() })))),
                )?;
                vm.get("copy")
            }),
            None,
            WatcherOptions::default(),
        )
        .unwrap();

        assert_eq!(outer.value(), Value::from(1));
        assert_eq!(outer.dep_count(), 1);
        assert!(!external.dep("seed").unwrap().has_sub(outer.id()));
    }

    #[test]
    fn bad_data_is_reported() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let warnings = Arc::new(Mutex::new(Vec::new()));
        let (error_sink, warn_sink) = (errors.clone(), warnings.clone());
        let previous = config::install(
            Config::default()
                .with_error_handler(move |err, info| error_sink.lock().push(format!("{info}: {err}")))
                .with_warn_handler(move |msg| warn_sink.lock().push(msg.to_string())),
        );

        let failed = Vm::new(ComponentOptions::new().data(|_| Err(Error::computation("boom")))).unwrap();
        let scalar = Vm::new(ComponentOptions::new().data(|_| Ok(Value::from(1)))).unwrap();
        config::install(previous);

        assert!(failed.data().is_empty());
        assert!(scalar.data().is_empty());
        assert_eq!(*errors.lock(), vec!["data(): boom".to_string()]);
        assert_eq!(
            *warnings.lock(),
            vec!["data functions should return an object, got number".to_string()]
        );
    }

    #[test]
    fn child_props_warn_on_mutation() {
        let (warnings, previous) = capture_warnings();
        let child = Vm::new(
            ComponentOptions::new()
                .child()
                .prop("title", PropOptions::new().default_value("untitled"))
                .prop_value("title", "hello"),
        )
        .unwrap();
        let root = Vm::new(ComponentOptions::new().prop("title", PropOptions::new())).unwrap();

        child.set("title", Value::from("changed")).unwrap();
        root.set("title", Value::from("changed")).unwrap();
        child.update_props([("title", Value::from("from parent"))]).unwrap();
        assert_eq!(child.get("title").unwrap(), Value::from("from parent"));
        child.update_props(Vec::<(String, Value)>::new()).unwrap();
        assert_eq!(child.get("title").unwrap(), Value::from("untitled"));
        config::install(previous);

        let warnings = warnings.lock();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].ends_with("Prop being mutated: \"title\""));
    }

    #[test]
    fn only_root_props_are_deep_observed() {
        let config_for = || Object::from_json(json!({ "depth": 1 })).unwrap();
        let (child_value, root_value) = (config_for(), config_for());

        Vm::new(
            ComponentOptions::new()
                .child()
                .prop("config", PropOptions::new())
                .prop_value("config", child_value.clone()),
        )
        .unwrap();
        Vm::new(
            ComponentOptions::new()
                .prop("config", PropOptions::new())
                .prop_value("config", root_value.clone()),
        )
        .unwrap();

        assert!(child_value.observer().is_none());
        assert!(root_value.observer().is_some());
    }

    #[test]
    fn prop_warnings() {
        let (warnings, previous) = capture_warnings();
        Vm::new(
            ComponentOptions::new()
                .prop("slotScope", PropOptions::new())
                .prop("needed", PropOptions::new().required())
                .prop("shared", PropOptions::new().default_value(Object::new())),
        )
        .unwrap();
        config::install(previous);

        let warnings = warnings.lock();
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].starts_with("\"slot-scope\" is a reserved attribute"));
        assert_eq!(warnings[1], "Missing required prop: \"needed\"");
        assert!(warnings[2].starts_with("Invalid default value for prop \"shared\""));
    }

    #[test]
    fn root_data_cannot_grow_until_destroyed() {
        let (warnings, previous) = capture_warnings();
        let vm = Vm::new(with_data(json!({ "a": 1 }))).unwrap();
        let data = Value::from(vm.data());

        vm.set_property(&data, "late", Value::from(1)).unwrap();
        vm.delete_property(&data, "a").unwrap();
        assert!(!vm.data().has("late"));
        assert!(vm.data().has("a"));
        assert_eq!(warnings.lock().len(), 2);

        vm.destroy();
        vm.set_property(&data, "late", Value::from(1)).unwrap();
        config::install(previous);
        assert!(vm.data().is_reactive("late"));
    }

    #[test]
    fn destroy_tears_everything_down() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (on_watch, on_render) = (calls.clone(), calls.clone());
        let vm = Vm::new(
            with_data(json!({ "n": 1 }))
                .computed("double", ComputedOptions::getter(|vm| Ok(Value::from(vm.get("n")?.as_number() * 2.0))))
                .watch(
                    "n",
                    WatchHandler::callback(move |_, _, _| {
                        on_watch.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                ),
        )
        .unwrap();
        vm.mount(move |vm| {
            on_render.fetch_add(1, Ordering::SeqCst);
            vm.get("double")
        })
        .unwrap();

        let data = vm.data();
        let ob = data.observer().unwrap();
        assert_eq!(ob.vm_count(), 1);
        assert_eq!(vm.watcher_count(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        vm.destroy();
        vm.destroy();
        assert!(vm.is_destroyed());
        assert_eq!(vm.watcher_count(), 0);
        assert_eq!(ob.vm_count(), 0);
        assert!(vm.render_watcher().is_none());

        data.set("n", Value::from(2)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(data.dep("n").unwrap().subscriber_count(), 0);
    }

    #[test]
    fn reserved_writes_warn() {
        let (warnings, previous) = capture_warnings();
        let vm = Vm::new(ComponentOptions::new().method("go", |_, _| Ok(Value::Null))).unwrap();
        vm.set("$data", Value::from(Object::new())).unwrap();
        vm.set("$props", Value::Null).unwrap();
        vm.set("go", Value::Null).unwrap();
        config::install(previous);

        let warnings = warnings.lock();
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].starts_with("Avoid replacing instance root $data"));
        assert_eq!(warnings[1], "$props is readonly.");
        assert!(warnings[2].starts_with("Property \"go\" is not reactive"));
    }
}
