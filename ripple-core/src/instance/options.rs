//! Component Options
//!
//! Options arrive already merged; this module only describes their shape.
//! Every table is an [`IndexMap`] so initialization visits keys in
//! declaration order.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::Vm;
use crate::error::Result;
use crate::observer::Value;
use crate::reactive::WatcherOptions;

/// A method. Receives the instance and the call arguments.
pub type MethodFn = Arc<dyn Fn(&Vm, &[Value]) -> Result<Value> + Send + Sync>;

/// Data factory. Must return an object.
pub type DataFn = Arc<dyn Fn(&Vm) -> Result<Value> + Send + Sync>;

/// Computed getter. Also the signature of render functions.
pub type GetterFn = Arc<dyn Fn(&Vm) -> Result<Value> + Send + Sync>;

pub type SetterFn = Arc<dyn Fn(&Vm, Value) -> Result<()> + Send + Sync>;

/// Watch callback, invoked with `(new, old)`.
pub type WatchFn = Arc<dyn Fn(&Vm, &Value, &Value) -> Result<()> + Send + Sync>;

/// Where a prop's value comes from when the parent passes none.
#[derive(Clone)]
pub enum PropDefault {
    Value(Value),

    /// Called once per instance. Required for object and array defaults,
    /// which would otherwise be shared between instances.
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

#[derive(Clone, Default)]
pub struct PropOptions {
    pub default: Option<PropDefault>,
    pub required: bool,
}

impl PropOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(PropDefault::Value(value.into()));
        self
    }

    pub fn default_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(PropDefault::Factory(Arc::new(factory)));
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A computed property definition.
#[derive(Clone)]
pub struct ComputedOptions {
    /// A missing getter is reported and behaves as one returning `Undefined`.
    pub get: Option<GetterFn>,
    pub set: Option<SetterFn>,

    /// With `cache` off, every read calls the getter directly.
    pub cache: bool,
}

impl ComputedOptions {
    pub fn getter<F>(get: F) -> Self
    where
        F: Fn(&Vm) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            get: Some(Arc::new(get)),
            set: None,
            cache: true,
        }
    }

    pub fn with_setter<F>(mut self, set: F) -> Self
    where
        F: Fn(&Vm, Value) -> Result<()> + Send + Sync + 'static,
    {
        self.set = Some(Arc::new(set));
        self
    }

    pub fn uncached(mut self) -> Self {
        self.cache = false;
        self
    }
}

impl Default for ComputedOptions {
    fn default() -> Self {
        Self {
            get: None,
            set: None,
            cache: true,
        }
    }
}

/// What a declared watch calls.
#[derive(Clone)]
pub enum Handler {
    Callback(WatchFn),

    /// Name of a method on the instance, called with `[new, old]`.
    Method(String),
}

/// Flags of a declared watch. Deserializable so declarations can be loaded
/// from configuration alongside a method-name handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchFlags {
    pub deep: bool,
    pub immediate: bool,
    pub sync: bool,
}

impl From<WatchFlags> for WatcherOptions {
    fn from(flags: WatchFlags) -> Self {
        WatcherOptions {
            deep: flags.deep,
            immediate: flags.immediate,
            sync: flags.sync,
            ..WatcherOptions::default()
        }
    }
}

/// One declared watch.
#[derive(Clone)]
pub struct WatchHandler {
    pub handler: Handler,
    pub flags: WatchFlags,
}

impl WatchHandler {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&Vm, &Value, &Value) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            handler: Handler::Callback(Arc::new(f)),
            flags: WatchFlags::default(),
        }
    }

    pub fn method(name: impl Into<String>) -> Self {
        Self {
            handler: Handler::Method(name.into()),
            flags: WatchFlags::default(),
        }
    }

    pub fn deep(mut self) -> Self {
        self.flags.deep = true;
        self
    }

    pub fn immediate(mut self) -> Self {
        self.flags.immediate = true;
        self
    }

    pub fn sync(mut self) -> Self {
        self.flags.sync = true;
        self
    }
}

/// Pre-merged options for one instance.
#[derive(Clone, Default)]
pub struct ComponentOptions {
    pub props: IndexMap<String, PropOptions>,

    /// Values passed by the parent, keyed by prop name.
    pub props_data: IndexMap<String, Value>,

    /// `None` marks a method declared without a body.
    pub methods: IndexMap<String, Option<MethodFn>>,

    pub data: Option<DataFn>,
    pub computed: IndexMap<String, ComputedOptions>,
    pub watch: IndexMap<String, Vec<WatchHandler>>,

    /// Child instances do not deep-observe their props and warn when a prop
    /// is written from inside.
    pub has_parent: bool,
}

impl ComponentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prop(mut self, key: impl Into<String>, options: PropOptions) -> Self {
        self.props.insert(key.into(), options);
        self
    }

    pub fn prop_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props_data.insert(key.into(), value.into());
        self
    }

    pub fn method<F>(mut self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Vm, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.insert(key.into(), Some(Arc::new(f)));
        self
    }

    pub fn data<F>(mut self, f: F) -> Self
    where
        F: Fn(&Vm) -> Result<Value> + Send + Sync + 'static,
    {
        self.data = Some(Arc::new(f));
        self
    }

    pub fn computed(mut self, key: impl Into<String>, options: ComputedOptions) -> Self {
        self.computed.insert(key.into(), options);
        self
    }

    /// Add a watch on `key`. A key may have several handlers.
    pub fn watch(mut self, key: impl Into<String>, handler: WatchHandler) -> Self {
        self.watch.entry(key.into()).or_default().push(handler);
        self
    }

    pub fn child(mut self) -> Self {
        self.has_parent = true;
        self
    }
}

impl fmt::Debug for ComponentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentOptions")
            .field("props", &self.props.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("data", &self.data.is_some())
            .field("computed", &self.computed.keys().collect::<Vec<_>>())
            .field("watch", &self.watch.keys().collect::<Vec<_>>())
            .field("has_parent", &self.has_parent)
            .finish()
    }
}
