//! Evaluation Context
//!
//! The evaluation context tracks which watcher is currently running.
//! This enables automatic dependency tracking: when a reactive property is
//! read, the current watcher is registered as one of its subscribers.
//!
//! # Implementation
//!
//! We use a thread-local stack of targets. Evaluating a watcher pushes it;
//! the returned guard pops it on drop. A frame may also be empty, which
//! suspends tracking for everything evaluated inside it (used while calling
//! data factories, whose reads must not subscribe the enclosing watcher).
//!
//! Nesting follows last-in-first-out order, so a computed watcher evaluated
//! in the middle of a render attributes its reads to itself and hands the
//! render watcher back afterwards.

use std::cell::RefCell;

use super::subscriber::WatcherId;
use super::watcher::Watcher;

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Watcher>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the evaluation frame when dropped.
///
/// This keeps the stack balanced even if the computation panics.
pub struct EvaluationContext {
    target: Option<WatcherId>,
}

impl EvaluationContext {
    /// Push `watcher` as the current dependency target.
    pub fn enter(watcher: &Watcher) -> Self {
        Self::push(Some(watcher.clone()))
    }

    /// Push an empty frame: reads inside it are not attributed to anyone.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(target: Option<Watcher>) -> Self {
        let id = target.as_ref().map(Watcher::id);
        TARGET_STACK.with(|stack| stack.borrow_mut().push(target));
        Self { target: id }
    }

    /// Whether a watcher is currently collecting dependencies.
    pub fn is_tracking() -> bool {
        TARGET_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// The watcher at the top of the stack, if any.
    pub fn current() -> Option<Watcher> {
        TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Number of frames on the stack, empty frames included.
    pub fn depth() -> usize {
        TARGET_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for EvaluationContext {
    fn drop(&mut self) {
        let popped = TARGET_STACK.with(|stack| stack.borrow_mut().pop());

        // Frames must unwind in the order they were entered.
        if let Some(frame) = popped {
            debug_assert_eq!(
                frame.as_ref().map(Watcher::id),
                self.target,
                "EvaluationContext mismatch"
            );
        }
    }
}

/// Run `f` with dependency collection suspended.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _frame = EvaluationContext::untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::Value;
    use crate::reactive::{Expression, WatcherOptions};

    fn lazy_watcher() -> Watcher {
        Watcher::new(
            None,
            Expression::function(|| Ok(Value::Undefined)),
            None,
            WatcherOptions::default().lazy(),
        )
        .expect("lazy watchers do not evaluate on creation")
    }

    #[test]
    fn context_tracks_target() {
        let watcher = lazy_watcher();

        assert!(!EvaluationContext::is_tracking());
        assert!(EvaluationContext::current().is_none());

        {
            let _ctx = EvaluationContext::enter(&watcher);

            assert!(EvaluationContext::is_tracking());
            assert_eq!(EvaluationContext::current().map(|w| w.id()), Some(watcher.id()));
        }

        // Context should be cleaned up after drop
        assert!(!EvaluationContext::is_tracking());
        assert_eq!(EvaluationContext::depth(), 0);
    }

    #[test]
    fn nested_contexts() {
        let outer = lazy_watcher();
        let inner = lazy_watcher();

        {
            let _ctx1 = EvaluationContext::enter(&outer);
            assert_eq!(EvaluationContext::current().map(|w| w.id()), Some(outer.id()));

            {
                let _ctx2 = EvaluationContext::enter(&inner);
                assert_eq!(EvaluationContext::current().map(|w| w.id()), Some(inner.id()));
                assert_eq!(EvaluationContext::depth(), 2);
            }

            // After inner context drops, outer should be current
            assert_eq!(EvaluationContext::current().map(|w| w.id()), Some(outer.id()));
        }

        assert!(EvaluationContext::current().is_none());
    }

    #[test]
    fn untracked_frame_hides_outer_target() {
        let outer = lazy_watcher();
        let _ctx = EvaluationContext::enter(&outer);

        untracked(|| {
            assert!(!EvaluationContext::is_tracking());
            assert!(EvaluationContext::current().is_none());
            assert_eq!(EvaluationContext::depth(), 2);
        });

        assert!(EvaluationContext::is_tracking());
    }
}
