//! Runtime Configuration
//!
//! Configuration is installed per thread, the same way the evaluation stack
//! is. The reactive runtime is single-threaded, so each thread driving it
//! gets its own diagnostics policy and scheduler.
//!
//! Misuse diagnostics and reported user errors flow through [`warn`] and
//! [`handle_error`]. By default they are emitted with `tracing`; hooks can be
//! installed to capture them instead.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::scheduler::{Immediate, Scheduler};

/// Hook receiving misuse warnings.
pub type WarnHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Hook receiving errors reported from user watchers. The second argument
/// names where the error happened, e.g. `callback for watcher "a.b"`.
pub type ErrorHandler = Arc<dyn Fn(&Error, &str) + Send + Sync>;

/// Runtime configuration.
#[derive(Clone)]
pub struct Config {
    /// Suppress all warnings.
    pub silent: bool,

    /// Production mode turns off misuse diagnostics and diagnostic ordering.
    pub production: bool,

    /// Sort subscribers by creation id before each notify pass so parents
    /// update before children. Ignored in production mode.
    pub sort_notifications: bool,

    /// Replaces the default `tracing::warn!` sink.
    pub warn_handler: Option<WarnHandler>,

    /// Replaces the default `tracing::error!` sink.
    pub error_handler: Option<ErrorHandler>,

    /// Receives non-lazy, non-sync watchers when they are invalidated.
    pub scheduler: Arc<dyn Scheduler>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            silent: false,
            production: false,
            sort_notifications: false,
            warn_handler: None,
            error_handler: None,
            scheduler: Arc::new(Immediate),
        }
    }
}

impl Config {
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_warn_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.warn_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Error, &str) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn sorted_notifications(mut self) -> Self {
        self.sort_notifications = true;
        self
    }

    /// Whether misuse diagnostics should be produced at all.
    pub fn diagnostics_enabled(&self) -> bool {
        !self.production
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("silent", &self.silent)
            .field("production", &self.production)
            .field("sort_notifications", &self.sort_notifications)
            .field("warn_handler", &self.warn_handler.is_some())
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

/// Install `config` for the current thread, returning the previous one.
pub fn install(config: Config) -> Config {
    CONFIG.with(|current| current.replace(config))
}

/// Snapshot of the configuration active on this thread.
pub fn current() -> Config {
    CONFIG.with(|current| current.borrow().clone())
}

/// Modify the active configuration in place.
pub fn update<F>(f: F)
where
    F: FnOnce(&mut Config),
{
    CONFIG.with(|current| f(&mut current.borrow_mut()));
}

pub(crate) fn scheduler() -> Arc<dyn Scheduler> {
    CONFIG.with(|current| Arc::clone(&current.borrow().scheduler))
}

pub(crate) fn diagnostics_enabled() -> bool {
    CONFIG.with(|current| current.borrow().diagnostics_enabled())
}

pub(crate) fn sort_notifications() -> bool {
    CONFIG.with(|current| {
        let config = current.borrow();
        config.sort_notifications && config.diagnostics_enabled()
    })
}

/// Emit a misuse diagnostic.
///
/// Never aborts execution. Dropped in production mode or when silenced.
pub fn warn(message: impl AsRef<str>) {
    let message = message.as_ref();
    // Clone the hook out so it may itself read the configuration.
    let handler = CONFIG.with(|current| {
        let config = current.borrow();
        if config.silent || !config.diagnostics_enabled() {
            return Err(());
        }
        Ok(config.warn_handler.clone())
    });

    match handler {
        Ok(Some(handler)) => handler(message),
        Ok(None) => tracing::warn!(target: "ripple::warn", "{message}"),
        Err(()) => {}
    }
}

/// Report an error raised by a user computation.
///
/// `info` describes where the error came from.
pub fn handle_error(error: &Error, info: &str) {
    let handler = CONFIG.with(|current| current.borrow().error_handler.clone());
    match handler {
        Some(handler) => handler(error, info),
        None => tracing::error!(target: "ripple::error", %error, "error in {info}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn warn_routes_to_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let previous = install(Config::default().with_warn_handler(move |msg| {
            sink.lock().push(msg.to_string());
        }));

        warn("first");
        update(|config| config.silent = true);
        warn("second");
        update(|config| {
            config.silent = false;
            config.production = true;
        });
        warn("third");

        install(previous);
        assert_eq!(*seen.lock(), vec!["first".to_string()]);
    }

    #[test]
    fn errors_route_to_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let previous = install(Config::default().with_error_handler(move |err, info| {
            sink.lock().push(format!("{info}: {err}"));
        }));

        handle_error(&Error::computation("boom"), "getter for watcher \"a\"");

        install(previous);
        assert_eq!(*seen.lock(), vec!["getter for watcher \"a\": boom".to_string()]);
    }

    #[test]
    fn sorting_is_diagnostic_only() {
        let previous = install(Config::default().sorted_notifications());
        assert!(sort_notifications());
        update(|config| config.production = true);
        assert!(!sort_notifications());
        install(previous);
    }
}
