//! Single-fulfillment asynchronous completion primitive
//!
//! A [`Promise`] represents the eventual completion of an asynchronous
//! operation. It is either fulfilled with a value or failed with an error,
//! exactly once. Observers registered with [`Promise::on_success`],
//! [`Promise::on_failure`] and [`Promise::on_complete`] are never run inline:
//! each one is dispatched to its own task after the internal lock is released,
//! so neither the completer nor the registering caller can be blocked by them.

use crate::Error;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

type SuccessFn<T> = Box<dyn FnOnce(T) + Send>;
type FailureFn<E> = Box<dyn FnOnce(Arc<E>) + Send>;
type CompleteFn<T, E> = Box<dyn FnOnce(Outcome<T, E>) + Send>;

/// Terminal value of a promise
pub type Outcome<T, E = Error> = std::result::Result<T, Arc<E>>;

/// Eventual value-or-error of an asynchronous operation.
///
/// Cloning a promise yields another handle to the same completion state.
pub struct Promise<T, E = Error> {
    inner: Arc<Inner<T, E>>,
}

struct Inner<T, E> {
    state: Mutex<State<T, E>>,
    completed: Notify,
}

struct State<T, E> {
    success_fn: Option<SuccessFn<T>>,
    failure_fn: Option<FailureFn<E>>,
    complete_fn: Option<CompleteFn<T, E>>,
    outcome: Option<Outcome<T, E>>,
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    /// Create a pending promise
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    success_fn: None,
                    failure_fn: None,
                    complete_fn: None,
                    outcome: None,
                }),
                completed: Notify::new(),
            }),
        }
    }

    /// Register the function called when the promise is fulfilled.
    ///
    /// Replaces any previously registered success function. If the promise is
    /// already fulfilled, the function is dispatched right away.
    pub fn on_success<F>(&self, on_success: F) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        let ready = {
            let mut state = self.lock();
            match &state.outcome {
                Some(Ok(value)) => Some(value.clone()),
                _ => {
                    state.success_fn = Some(Box::new(on_success));
                    return self;
                }
            }
        };

        if let Some(value) = ready {
            dispatch(move || on_success(value));
        }
        self
    }

    /// Register the function called when the promise fails.
    ///
    /// Replaces any previously registered failure function. If the promise has
    /// already failed, the function is dispatched right away.
    pub fn on_failure<F>(&self, on_failure: F) -> &Self
    where
        F: FnOnce(Arc<E>) + Send + 'static,
    {
        let ready = {
            let mut state = self.lock();
            match &state.outcome {
                Some(Err(err)) => Some(err.clone()),
                _ => {
                    state.failure_fn = Some(Box::new(on_failure));
                    return self;
                }
            }
        };

        if let Some(err) = ready {
            dispatch(move || on_failure(err));
        }
        self
    }

    /// Register the function called when the promise completes either way.
    ///
    /// Replaces any previously registered completion function. If the promise
    /// is already completed, the function is dispatched right away.
    pub fn on_complete<F>(&self, on_complete: F) -> &Self
    where
        F: FnOnce(Outcome<T, E>) + Send + 'static,
    {
        let ready = {
            let mut state = self.lock();
            match &state.outcome {
                Some(outcome) => Some(outcome.clone()),
                None => {
                    state.complete_fn = Some(Box::new(on_complete));
                    return self;
                }
            }
        };

        if let Some(outcome) = ready {
            dispatch(move || on_complete(outcome));
        }
        self
    }

    /// Fulfill the promise with `value`.
    ///
    /// Fails with [`Error::AlreadyCompleted`] if the promise was already
    /// fulfilled or failed.
    pub fn fulfill(&self, value: T) -> crate::Result<()> {
        let (success_fn, complete_fn) = {
            let mut state = self.lock();
            if state.outcome.is_some() {
                return Err(Error::AlreadyCompleted);
            }
            state.outcome = Some(Ok(value.clone()));
            (state.success_fn.take(), state.complete_fn.take())
        };
        self.inner.completed.notify_waiters();

        if let Some(f) = success_fn {
            let value = value.clone();
            dispatch(move || f(value));
        }
        if let Some(f) = complete_fn {
            dispatch(move || f(Ok(value)));
        }
        Ok(())
    }

    /// Fail the promise with `err`.
    ///
    /// Fails with [`Error::NilError`] when no error is given and with
    /// [`Error::AlreadyCompleted`] if the promise was already completed.
    pub fn fail(&self, err: impl Into<Option<E>>) -> crate::Result<()> {
        let err = Arc::new(err.into().ok_or(Error::NilError)?);

        let (failure_fn, complete_fn) = {
            let mut state = self.lock();
            if state.outcome.is_some() {
                return Err(Error::AlreadyCompleted);
            }
            state.outcome = Some(Err(err.clone()));
            (state.failure_fn.take(), state.complete_fn.take())
        };
        self.inner.completed.notify_waiters();

        if let Some(f) = failure_fn {
            let err = err.clone();
            dispatch(move || f(err));
        }
        if let Some(f) = complete_fn {
            dispatch(move || f(Err(err)));
        }
        Ok(())
    }

    /// Whether the promise reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.lock().outcome.is_some()
    }

    /// Terminal value, if the promise is completed
    pub fn outcome(&self) -> Option<Outcome<T, E>> {
        self.lock().outcome.clone()
    }

    /// Wait until the promise completes.
    ///
    /// Does not consume any registered observer.
    pub async fn wait(&self) -> Outcome<T, E> {
        loop {
            let notified = self.inner.completed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T, E>> {
        // Observers never run under the lock, so a poisoned guard still
        // holds consistent state.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Default for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> std::fmt::Debug for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// Run an observer on an independent execution unit
fn dispatch<F>(job: F)
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(job);
        }
        Err(_) => {
            std::thread::spawn(job);
        }
    }
}
