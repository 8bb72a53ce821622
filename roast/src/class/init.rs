use std::thread::{self, ThreadId};

use log::trace;
use parking_lot::{Condvar, Mutex};

use crate::ObjectRef;

#[derive(Debug, Clone)]
pub enum InitState {
    Pending,
    InProgress(ThreadId),
    Complete,
    /// `None` when a host fault aborted the initializer
    Failed(Option<ObjectRef>),
}

/// What the caller of [`Initialization::begin`] has to do next.
#[derive(Debug)]
pub enum InitEntry<'a> {
    /// complete, or being initialized by the calling thread
    Ready,
    /// the caller now owns initialization and must call a
    /// [`InitGuard`] method when done
    Run(InitGuard<'a>),
    Failed(Option<ObjectRef>),
}

/// Per-class initialization lock and condition.
#[derive(Debug)]
pub struct Initialization {
    state: Mutex<InitState>,
    cond: Condvar,
}

impl Initialization {
    pub fn new() -> Self {
        Self::with_state(InitState::Pending)
    }

    /// array and primitive classes have nothing to run
    pub fn completed() -> Self {
        Self::with_state(InitState::Complete)
    }

    fn with_state(state: InitState) -> Self {
        Self {
            state: Mutex::new(state),
            cond: Condvar::new(),
        }
    }

    pub fn state(&self) -> InitState {
        self.state.lock().clone()
    }

    pub fn is_complete(&self) -> bool {
        matches!(*self.state.lock(), InitState::Complete)
    }

    /// Blocks while another thread is initializing, then reports what the
    /// calling thread must do.
    pub fn begin(&self) -> InitEntry<'_> {
        let current = thread::current().id();
        let mut state = self.state.lock();
        loop {
            match &*state {
                InitState::Complete => return InitEntry::Ready,
                InitState::Failed(cause) => return InitEntry::Failed(cause.clone()),
                InitState::InProgress(owner) if *owner == current => return InitEntry::Ready,
                InitState::InProgress(owner) => {
                    trace!("waiting for initialization owned by {owner:?}");
                    self.cond.wait(&mut state);
                }
                InitState::Pending => {
                    *state = InitState::InProgress(current);
                    return InitEntry::Run(InitGuard {
                        init: self,
                        done: false,
                    });
                }
            }
        }
    }

    fn publish(&self, state: InitState) {
        *self.state.lock() = state;
        self.cond.notify_all();
    }
}

impl Default for Initialization {
    fn default() -> Self {
        Self::new()
    }
}

/// Ownership of a running initialization. Dropping it without calling
/// [`InitGuard::complete`] or [`InitGuard::fail`] marks the class failed
/// and wakes every waiter.
#[derive(Debug)]
pub struct InitGuard<'a> {
    init: &'a Initialization,
    done: bool,
}

impl InitGuard<'_> {
    pub fn complete(mut self) {
        self.done = true;
        self.init.publish(InitState::Complete);
    }

    pub fn fail(mut self, cause: Option<ObjectRef>) {
        self.done = true;
        self.init.publish(InitState::Failed(cause));
    }
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.init.publish(InitState::Failed(None));
        }
    }
}
