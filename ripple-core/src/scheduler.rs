//! Update Scheduler
//!
//! The scheduler decides when invalidated watchers re-run. Lazy watchers
//! never reach it (they only mark themselves dirty) and `sync` watchers
//! bypass it; every other watcher is handed to the scheduler installed in
//! the thread's [`Config`](crate::config::Config).
//!
//! Two schedulers are provided:
//!
//! - [`Immediate`] re-runs the watcher on the spot. This is the default and
//!   makes every write behave synchronously.
//! - [`UpdateQueue`] batches watchers until [`UpdateQueue::flush`] is
//!   called, so several writes in a row cause a single re-run.
//!
//! # Flush Order
//!
//! The queue runs watchers in ascending id order. Ids are assigned at
//! creation, so:
//!
//! 1. Watchers created earlier (parents, user watchers declared before a
//!    render) run before watchers created later.
//! 2. A watcher invalidated again while the flush is in progress is queued
//!    once more and picked up by the same flush.
//! 3. A watcher that keeps re-queueing itself is stopped after
//!    [`MAX_UPDATE_COUNT`] runs in one flush, with a warning.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::config;
use crate::error::Result;
use crate::reactive::{Watcher, WatcherId};

/// Runs per watcher within a single flush before it is treated as an
/// infinite update loop.
pub const MAX_UPDATE_COUNT: usize = 100;

/// Receives watchers that need to re-run.
pub trait Scheduler: Send + Sync {
    fn queue(&self, watcher: &Watcher) -> Result<()>;
}

/// Runs every queued watcher immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl Scheduler for Immediate {
    fn queue(&self, watcher: &Watcher) -> Result<()> {
        watcher.run()
    }
}

/// Deduplicating queue flushed on demand.
#[derive(Default)]
pub struct UpdateQueue {
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    /// Pending watchers keyed by id; a watcher is queued at most once.
    pending: BTreeMap<WatcherId, Watcher>,
    flushing: bool,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of watchers waiting for the next flush.
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the watcher with `id` is waiting.
    pub fn contains(&self, id: WatcherId) -> bool {
        self.state.lock().pending.contains_key(&id)
    }

    /// Run pending watchers in id order until the queue is empty.
    ///
    /// Returns the number of runs performed. A nested call made by a watcher
    /// during the flush is a no-op. On error the remaining watchers are
    /// dropped from the queue and the error is returned.
    pub fn flush(&self) -> Result<usize> {
        {
            let mut state = self.state.lock();
            if state.flushing {
                return Ok(0);
            }
            state.flushing = true;
        }

        let mut circular: HashMap<WatcherId, usize> = HashMap::new();
        let mut runs = 0;
        let mut aborted = false;
        let result = loop {
            // Released before running so the watcher can queue itself again.
            let next = self.state.lock().pending.pop_first();
            let Some((id, watcher)) = next else {
                break Ok(runs);
            };

            let count = circular.entry(id).or_insert(0);
            *count += 1;
            if *count > MAX_UPDATE_COUNT {
                let message = if watcher.options().user {
                    format!(
                        "You may have an infinite update loop in watcher with expression \"{}\"",
                        watcher.expression()
                    )
                } else {
                    "You may have an infinite update loop in a render function.".to_string()
                };
                config::warn(message);
                aborted = true;
                break Ok(runs);
            }

            if let Err(error) = watcher.run() {
                aborted = true;
                break Err(error);
            }
            runs += 1;
        };

        let mut state = self.state.lock();
        state.flushing = false;
        if aborted {
            state.pending.clear();
        }
        tracing::debug!(runs, "flushed update queue");
        result
    }
}

impl Scheduler for UpdateQueue {
    fn queue(&self, watcher: &Watcher) -> Result<()> {
        let mut state = self.state.lock();
        if !state.pending.contains_key(&watcher.id()) {
            tracing::trace!(watcher = %watcher.id(), "queued");
            state.pending.insert(watcher.id(), watcher.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Error;
    use crate::observer::{observe, Object, Value};
    use crate::reactive::{callback, Expression, WatcherOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn with_queue<R>(f: impl FnOnce(&Arc<UpdateQueue>) -> R) -> R {
        let queue = Arc::new(UpdateQueue::new());
        let previous = config::install(Config::default().with_scheduler(queue.clone()));
        let result = f(&queue);
        config::install(previous);
        result
    }

    fn state(key: &str, value: Value) -> Object {
        let obj = Object::from_entries([(key.to_string(), value)]);
        observe(&Value::from(obj.clone()), false);
        obj
    }

    fn reader(obj: &Object, key: &'static str, runs: &Arc<AtomicUsize>) -> Watcher {
        let obj = obj.clone();
        let runs = runs.clone();
        Watcher::new(
            None,
            Expression::function(move || {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(obj.get(key))
            }),
            None,
            WatcherOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn immediate_runs_on_queue() {
        let obj = state("a", Value::from(1));
        let runs = Arc::new(AtomicUsize::new(0));
        let _watcher = reader(&obj, "a", &runs);

        obj.set("a", Value::from(2)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn queue_deduplicates_until_flush() {
        with_queue(|queue| {
            let obj = state("a", Value::from(1));
            let runs = Arc::new(AtomicUsize::new(0));
            let watcher = reader(&obj, "a", &runs);

            obj.set("a", Value::from(2)).unwrap();
            obj.set("a", Value::from(3)).unwrap();
            assert_eq!(queue.len(), 1);
            assert!(queue.contains(watcher.id()));
            assert_eq!(runs.load(Ordering::SeqCst), 1);

            assert_eq!(queue.flush().unwrap(), 1);
            assert_eq!(runs.load(Ordering::SeqCst), 2);
            assert_eq!(watcher.value(), Value::from(3));
            assert!(queue.is_empty());
        });
    }

    #[test]
    fn flush_runs_in_creation_order() {
        with_queue(|queue| {
            let obj = state("a", Value::from(1));
            let order = Arc::new(Mutex::new(Vec::new()));

            let make = |label: &'static str| {
                let obj = obj.clone();
                let order = order.clone();
                Watcher::new(
                    None,
                    Expression::function(move || Ok(obj.get("a"))),
                    Some(callback(move |_, _| {
                        order.lock().push(label);
                        Ok(())
                    })),
                    WatcherOptions::default(),
                )
                .unwrap()
            };
            let first = make("first");
            let second = make("second");

            // Queue out of order.
            queue.queue(&second).unwrap();
            queue.queue(&first).unwrap();
            obj.set("a", Value::from(2)).unwrap();
            queue.flush().unwrap();

            assert_eq!(*order.lock(), vec!["first", "second"]);
        });
    }

    #[test]
    fn watchers_queued_during_flush_run_in_same_flush() {
        with_queue(|queue| {
            let obj = state("a", Value::from(0));
            let target = state("b", Value::from(0));
            let sink = target.clone();

            let _forward = Watcher::new(
                None,
                Expression::function({
                    let obj = obj.clone();
                    move || Ok(obj.get("a"))
                }),
                Some(callback(move |new, _| sink.set("b", new.clone()))),
                WatcherOptions::default(),
            )
            .unwrap();

            let runs = Arc::new(AtomicUsize::new(0));
            let follower = reader(&target, "b", &runs);

            obj.set("a", Value::from(7)).unwrap();
            assert_eq!(queue.flush().unwrap(), 2);
            assert_eq!(follower.value(), Value::from(7));
        });
    }

    #[test]
    fn infinite_loops_are_cut_off() {
        let warnings = Arc::new(Mutex::new(Vec::new()));
        let sink = warnings.clone();
        let queue = Arc::new(UpdateQueue::new());
        let previous = config::install(
            Config::default()
                .with_scheduler(queue.clone())
                .with_warn_handler(move |msg| sink.lock().push(msg.to_string())),
        );

        let obj = state("n", Value::from(0));
        let source = obj.clone();
        let writer = obj.clone();
        let _looping = Watcher::new(
            None,
            Expression::function(move || Ok(source.get("n"))),
            Some(callback(move |new, _| writer.set("n", Value::from(new.as_number() + 1.0)))),
            WatcherOptions::default().user(),
        )
        .unwrap();

        obj.set("n", Value::from(1)).unwrap();
        let runs = queue.flush().unwrap();
        config::install(previous);

        assert_eq!(runs, MAX_UPDATE_COUNT);
        assert!(queue.is_empty());
        let warnings = warnings.lock();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("You may have an infinite update loop in watcher"));
    }

    #[test]
    fn flush_stops_on_internal_error() {
        with_queue(|queue| {
            let obj = state("fail", Value::from(false));
            let source = obj.clone();
            let _render = Watcher::new(
                None,
                Expression::function(move || {
                    if source.get("fail").as_bool() {
                        return Err(Error::computation("render failed"));
                    }
                    Ok(Value::Null)
                }),
                None,
                WatcherOptions::default(),
            )
            .unwrap();

            obj.set("fail", Value::from(true)).unwrap();
            assert_eq!(queue.flush().unwrap_err(), Error::computation("render failed"));
            assert!(queue.is_empty());
        });
    }
}
