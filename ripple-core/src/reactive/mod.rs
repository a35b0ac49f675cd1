//! Dependency Tracking
//!
//! This module implements the subscription machinery: deps, watchers, and
//! the evaluation stack that links them.
//!
//! # Concepts
//!
//! ## Deps
//!
//! A [`Dep`] is a point of observation. Reactive properties and observed
//! containers each own one. When a dep is read while a watcher is
//! evaluating, the watcher subscribes to it. When the dep changes, every
//! subscriber is notified.
//!
//! ## Watchers
//!
//! A [`Watcher`] evaluates a getter (a closure or a dot-delimited path),
//! records the deps it read, and re-evaluates when any of them change.
//! Computed properties, user watches and render functions are all watchers
//! with different [`WatcherOptions`].
//!
//! ## Evaluation Stack
//!
//! The evaluation stack is thread-local. The watcher on top is the one that
//! reads are attributed to; see [`EvaluationContext`].
//!
//! # Implementation Notes
//!
//! Deps hold their subscribers weakly and watchers hold their deps
//! strongly, so dropping the last handle to a watcher is enough to detach
//! it. No lock is held while user code (getters, callbacks) runs.

mod context;
mod dep;
mod path;
mod subscriber;
mod traverse;
mod watcher;

pub use context::{untracked, EvaluationContext};
pub use dep::Dep;
pub use subscriber::{DepId, WatcherId};
pub use traverse::traverse;
pub use watcher::{callback, Callback, ComputeFn, Expression, Host, HostRef, Watcher, WatcherOptions};
