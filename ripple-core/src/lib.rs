//! Ripple Core
//!
//! This crate provides the dependency-tracking runtime for the Ripple
//! reactive state framework. It implements:
//!
//! - Observation of plain objects and arrays (per-property deps)
//! - Watchers: lazy computed values, user watches and render functions
//! - A thread-local evaluation stack that attributes reads to watchers
//! - Instances that initialize props, methods, data, computed and watch
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `observer`: the value model and the conversion of objects and arrays
//!   into reactive containers
//! - `reactive`: deps, watchers and the evaluation stack
//! - `scheduler`: when invalidated watchers re-run
//! - `instance`: component instances and their state initialization
//! - `config`: per-thread settings and diagnostic hooks
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{observe, Expression, Object, Value, Watcher, WatcherOptions};
//!
//! let state = Object::from_json(serde_json::json!({ "a": 1, "b": 2 })).unwrap();
//! observe(&Value::from(state.clone()), false);
//!
//! let source = state.clone();
//! let sum = Watcher::new(
//!     None,
//!     Expression::function(move || {
//!         Ok(Value::from(source.get("a").as_number() + source.get("b").as_number()))
//!     }),
//!     None,
//!     WatcherOptions::default(),
//! )
//! .unwrap();
//! assert_eq!(sum.value(), Value::from(3));
//!
//! // The watcher re-runs as soon as a dependency changes.
//! state.set("a", Value::from(5)).unwrap();
//! assert_eq!(sum.value(), Value::from(7));
//! ```

pub mod config;
pub mod error;
pub mod instance;
pub mod observer;
pub mod reactive;
pub mod scheduler;

pub use config::Config;
pub use error::{Error, Result};
pub use instance::{ComponentOptions, ComputedOptions, PropOptions, Unwatch, Vm, WatchHandler};
pub use observer::{define_reactive, del, observe, set, Array, Object, Observer, Value};
pub use reactive::{Dep, Expression, Watcher, WatcherOptions};
pub use scheduler::{Immediate, Scheduler, UpdateQueue};
