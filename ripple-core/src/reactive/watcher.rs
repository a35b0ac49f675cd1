//! Watcher Implementation
//!
//! A Watcher is a unit of computation that subscribes to the deps it reads
//! and reacts when any of them change. The same type covers all the roles a
//! subscriber plays in the runtime:
//!
//! - **Render watchers**: internal, eager. Errors propagate to the caller.
//! - **Computed watchers**: internal and `lazy`. They cache their value and
//!   only mark themselves dirty on change; the value is recomputed on the
//!   next [`Watcher::evaluate`].
//! - **User watchers**: created through `watch`. Errors from the getter or
//!   the callback are reported through [`config::handle_error`] and never
//!   propagate.
//!
//! # How Watchers Work
//!
//! 1. [`Watcher::get`] pushes the watcher onto the evaluation stack and runs
//!    the getter. Every reactive read links the watcher to the dep that was
//!    read, collecting this pass's dependency set ("new deps").
//!
//! 2. After the getter returns, deps from the previous pass that were not
//!    read this time are unsubscribed, and the new set replaces the old one.
//!    This is what lets conditional dependencies detach cleanly.
//!
//! 3. When a dep changes it calls [`Watcher::update`]: lazy watchers become
//!    dirty, `sync` watchers re-run at once, everything else is handed to
//!    the configured [`Scheduler`](crate::scheduler::Scheduler).
//!
//! 4. [`Watcher::teardown`] unsubscribes from every dep. It is idempotent
//!    and may be called while the watcher is evaluating.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::context::EvaluationContext;
use super::dep::Dep;
use super::path::{parse_path, resolve_path};
use super::subscriber::{DepId, WatcherId};
use super::traverse::traverse;
use crate::config;
use crate::error::{Error, Result};
use crate::observer::Value;

/// A getter computation.
pub type ComputeFn = Arc<dyn Fn() -> Result<Value> + Send + Sync>;

/// A change callback, invoked with `(new, old)`.
pub type Callback = Arc<dyn Fn(&Value, &Value) -> Result<()> + Send + Sync>;

/// Wrap a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&Value, &Value) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Something a watcher's path expression is resolved against.
///
/// Hosts are also told about the watchers created against them, so that
/// tearing down the host can tear down its watchers.
pub trait Host: Send + Sync {
    /// Read the top-level `key`, tracking the read.
    fn lookup(&self, key: &str) -> Result<Value>;

    fn track_watcher(&self, _watcher: &Watcher) {}

    fn untrack_watcher(&self, _id: WatcherId) {}
}

/// Weak handle to a [`Host`]. Watchers never keep their host alive.
pub type HostRef = Weak<dyn Host>;

/// What a watcher computes.
#[derive(Clone)]
pub enum Expression {
    /// A dot-delimited path such as `"user.name"`, resolved against the host.
    Path(String),

    /// An arbitrary computation.
    Function(ComputeFn),
}

impl Expression {
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        Self::Function(Arc::new(f))
    }
}

impl From<&str> for Expression {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for Expression {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Function(_) => f.write_str("Function"),
        }
    }
}

/// Flags recognised by [`Watcher::new`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherOptions {
    /// Defer the first evaluation and cache the value until invalidated.
    pub lazy: bool,

    /// Report errors instead of propagating them.
    pub user: bool,

    /// Register with every nested property of the result.
    pub deep: bool,

    /// Re-run synchronously on change instead of going through the scheduler.
    pub sync: bool,

    /// Invoke the callback once at creation with the initial value.
    pub immediate: bool,
}

impl WatcherOptions {
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn user(mut self) -> Self {
        self.user = true;
        self
    }

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn sync(mut self) -> Self {
        self.sync = true;
        self
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }
}

enum Getter {
    Path(Vec<String>),
    Function(ComputeFn),
    /// The path could not be parsed; always yields `Undefined`.
    Noop,
}

/// A subscriber to reactive state.
///
/// Cloning a `Watcher` creates a new handle to the same watcher. When the
/// last handle is dropped the watcher unsubscribes itself.
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<WatcherInner>,
}

pub(crate) struct WatcherInner {
    id: WatcherId,

    /// Human-readable form of the expression, used in diagnostics.
    expression: String,

    getter: Getter,
    callback: Option<Callback>,
    options: WatcherOptions,
    host: Option<HostRef>,
    state: Mutex<WatcherState>,
}

struct WatcherState {
    /// Cached value of the last successful pass.
    value: Value,

    /// Cached value is stale (lazy watchers only).
    dirty: bool,

    /// Cleared by teardown.
    active: bool,

    /// Deps subscribed to as of the last completed pass.
    deps: IndexMap<DepId, Dep>,

    /// Deps read during the pass in progress.
    new_deps: IndexMap<DepId, Dep>,
}

impl Watcher {
    /// Create a watcher.
    ///
    /// Non-lazy watchers evaluate immediately to collect their initial
    /// dependencies; an error from that first evaluation of an internal
    /// watcher is returned after the watcher is torn down.
    pub fn new(
        host: Option<HostRef>,
        expression: impl Into<Expression>,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Result<Self> {
        let (label, getter) = match expression.into() {
            Expression::Function(f) => ("<function>".to_string(), Getter::Function(f)),
            Expression::Path(path) => match parse_path(&path) {
                Some(segments) => (path, Getter::Path(segments)),
                None => {
                    config::warn(format!(
                        "Failed watching path: \"{path}\". Watcher only accepts simple \
                         dot-delimited paths. For full control, use a function instead."
                    ));
                    (path, Getter::Noop)
                }
            },
        };

        let watcher = Self {
            inner: Arc::new(WatcherInner {
                id: WatcherId::new(),
                expression: label,
                getter,
                callback,
                options,
                host,
                state: Mutex::new(WatcherState {
                    value: Value::Undefined,
                    dirty: options.lazy,
                    active: true,
                    deps: IndexMap::new(),
                    new_deps: IndexMap::new(),
                }),
            }),
        };

        if let Some(host) = watcher.host() {
            host.track_watcher(&watcher);
        }

        if !options.lazy {
            match watcher.get() {
                Ok(value) => watcher.inner.state.lock().value = value,
                Err(error) => {
                    watcher.teardown();
                    return Err(error);
                }
            }
        }

        if options.immediate {
            if let Some(callback) = &watcher.inner.callback {
                let value = watcher.value();
                watcher.invoke(callback, &value, &Value::Undefined, "callback for immediate watcher")?;
            }
        }

        tracing::debug!(watcher = %watcher.id(), expression = %watcher.inner.expression, "watcher created");
        Ok(watcher)
    }

    pub(crate) fn from_inner(inner: Arc<WatcherInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<WatcherInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn id(&self) -> WatcherId {
        self.inner.id
    }

    pub fn expression(&self) -> &str {
        &self.inner.expression
    }

    pub fn options(&self) -> WatcherOptions {
        self.inner.options
    }

    /// The cached value. Does not evaluate or track anything.
    pub fn value(&self) -> Value {
        self.inner.state.lock().value.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().dirty
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().active
    }

    /// Ids of the deps this watcher is subscribed to, in first-read order.
    pub fn dep_ids(&self) -> Vec<DepId> {
        self.inner.state.lock().deps.keys().copied().collect()
    }

    pub fn dep_count(&self) -> usize {
        self.inner.state.lock().deps.len()
    }

    pub fn ptr_eq(&self, other: &Watcher) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn host(&self) -> Option<Arc<dyn Host>> {
        self.inner.host.as_ref().and_then(Weak::upgrade)
    }

    /// Evaluate the getter and re-collect dependencies.
    ///
    /// For user watchers a failing getter is reported and the previous
    /// value is returned; dependency cleanup runs either way.
    pub fn get(&self) -> Result<Value> {
        match self.pass()? {
            Some(value) => Ok(value),
            None => Ok(self.value()),
        }
    }

    /// One evaluation pass. `None` means a user getter failed and the
    /// error was reported.
    fn pass(&self) -> Result<Option<Value>> {
        tracing::debug!(watcher = %self.id(), expression = %self.inner.expression, "evaluate");

        let result = {
            let _frame = EvaluationContext::enter(self);
            let result = self.compute();
            if self.inner.options.deep {
                if let Ok(value) = &result {
                    traverse(value);
                }
            }
            result
        };
        self.cleanup_deps();

        match result {
            Ok(value) => Ok(Some(value)),
            Err(error) if self.inner.options.user => {
                config::handle_error(
                    &error,
                    &format!("getter for watcher \"{}\"", self.inner.expression),
                );
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    fn compute(&self) -> Result<Value> {
        match &self.inner.getter {
            Getter::Function(f) => f(),
            Getter::Path(segments) => match self.host() {
                Some(host) => resolve_path(host.as_ref(), segments),
                None => Ok(Value::Undefined),
            },
            Getter::Noop => Ok(Value::Undefined),
        }
    }

    /// Record that `dep` was read during the current pass.
    ///
    /// Repeated reads within one pass are ignored, and deps already held
    /// from the previous pass are not re-subscribed.
    pub fn add_dep(&self, dep: &Dep) {
        let id = dep.id();
        let subscribe = {
            let mut state = self.inner.state.lock();
            if !state.active || state.new_deps.contains_key(&id) {
                return;
            }
            state.new_deps.insert(id, dep.clone());
            !state.deps.contains_key(&id)
        };

        if subscribe {
            tracing::trace!(watcher = %self.id(), dep = %id, "subscribe");
            dep.add_sub(self);
        }
    }

    /// Drop subscriptions that were not renewed by the last pass and make
    /// the new dependency set current.
    fn cleanup_deps(&self) {
        let stale: SmallVec<[Dep; 4]> = {
            let mut state = self.inner.state.lock();
            let WatcherState {
                deps,
                new_deps,
                active,
                ..
            } = &mut *state;

            let mut stale: SmallVec<[Dep; 4]> = deps
                .values()
                .filter(|dep| !new_deps.contains_key(&dep.id()))
                .cloned()
                .collect();
            *deps = std::mem::take(new_deps);

            // Torn down mid-evaluation: nothing may stay subscribed.
            if !*active {
                stale.extend(deps.drain(..).map(|(_, dep)| dep));
            }
            stale
        };

        for dep in stale {
            tracing::trace!(watcher = %self.id(), dep = %dep.id(), "unsubscribe");
            dep.remove_sub(self.id());
        }
    }

    /// Called by a dep when it changes.
    pub fn update(&self) -> Result<()> {
        let options = self.inner.options;
        if options.lazy {
            self.inner.state.lock().dirty = true;
            Ok(())
        } else if options.sync {
            self.run()
        } else {
            config::scheduler().queue(self)
        }
    }

    /// Re-evaluate and invoke the callback if the value changed.
    ///
    /// Object and array values always count as changed, since they may have
    /// been mutated in place; so does any value of a `deep` watcher.
    pub fn run(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }

        let Some(value) = self.pass()? else {
            return Ok(());
        };

        let old = {
            let mut state = self.inner.state.lock();
            let unchanged = value.same_value(&state.value)
                && !value.is_object()
                && !self.inner.options.deep;
            if unchanged {
                return Ok(());
            }
            std::mem::replace(&mut state.value, value.clone())
        };

        if let Some(callback) = &self.inner.callback {
            self.invoke(callback, &value, &old, "callback for watcher")?;
        }
        Ok(())
    }

    fn invoke(&self, callback: &Callback, value: &Value, old: &Value, context: &str) -> Result<()> {
        match callback(value, old) {
            Ok(()) => Ok(()),
            Err(error) if self.inner.options.user => {
                config::handle_error(&error, &format!("{context} \"{}\"", self.inner.expression));
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    /// Return the cached value, recomputing it first if dirty.
    ///
    /// Only lazy watchers can be evaluated on demand.
    pub fn evaluate(&self) -> Result<Value> {
        if !self.inner.options.lazy {
            return Err(Error::NotLazy(self.inner.expression.clone()));
        }

        if self.is_dirty() {
            if let Some(value) = self.pass()? {
                let mut state = self.inner.state.lock();
                state.value = value;
                state.dirty = false;
            }
        }
        Ok(self.value())
    }

    /// Expose every dep of this watcher to the watcher currently evaluating.
    ///
    /// A computed value read from a render uses this so that changes to
    /// the computed's inputs invalidate the render as well.
    pub fn depend(&self) {
        let deps: SmallVec<[Dep; 8]> = self.inner.state.lock().deps.values().cloned().collect();
        for dep in deps {
            dep.depend();
        }
    }

    /// Unsubscribe from every dep. Idempotent.
    pub fn teardown(&self) {
        let deps: SmallVec<[Dep; 8]> = {
            let mut state = self.inner.state.lock();
            if !state.active {
                return;
            }
            state.active = false;
            let mut deps: SmallVec<[Dep; 8]> = state.deps.drain(..).map(|(_, dep)| dep).collect();
            deps.extend(state.new_deps.drain(..).map(|(_, dep)| dep));
            deps
        };

        if let Some(host) = self.host() {
            host.untrack_watcher(self.id());
        }

        for dep in deps {
            dep.remove_sub(self.id());
        }
        tracing::debug!(watcher = %self.id(), expression = %self.inner.expression, "teardown");
    }
}

impl Drop for WatcherInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for dep in state.deps.values().chain(state.new_deps.values()) {
            dep.remove_sub(self.id);
        }
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("expression", &self.inner.expression)
            .field("options", &self.inner.options)
            .field("dirty", &state.dirty)
            .field("active", &state.active)
            .field("dep_count", &state.deps.len())
            .finish()
    }
}
