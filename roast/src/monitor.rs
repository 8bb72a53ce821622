use std::{
    collections::HashMap,
    sync::Arc,
    thread::{self, ThreadId},
};

use parking_lot::{Condvar, Mutex};

/// Source of per-object mutual exclusion. Objects are identified by
/// their address.
pub trait Synchronizer: Send + Sync {
    /// Blocks until the calling thread owns the monitor. Reentrant.
    fn enter(&self, address: u64);

    /// Releases one level of ownership. `false` when the calling thread
    /// does not own the monitor; nothing changes in that case.
    fn exit(&self, address: u64) -> bool;

    fn is_owned_by_current_thread(&self, address: u64) -> bool;
}

#[derive(Debug, Default)]
struct MonitorState {
    owner: Option<ThreadId>,
    count: usize,
}

/// Reentrant mutex that can be released from a different call than the
/// one that acquired it, unlike a guard-based lock.
#[derive(Debug, Default)]
pub struct Monitor {
    state: Mutex<MonitorState>,
    released: Condvar,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) {
        let current = thread::current().id();
        let mut state = self.state.lock();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(current);
                    state.count = 1;
                    return;
                }
                Some(owner) if owner == current => {
                    state.count += 1;
                    return;
                }
                Some(_) => self.released.wait(&mut state),
            }
        }
    }

    pub fn exit(&self) -> bool {
        let current = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(current) {
            return false;
        }
        state.count -= 1;
        if state.count == 0 {
            state.owner = None;
            self.released.notify_one();
        }
        true
    }

    pub fn is_owned_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    /// recursion depth of the current owner
    pub fn count(&self) -> usize {
        self.state.lock().count
    }
}

/// Default [`Synchronizer`]: one [`Monitor`] per address, created on
/// first use. Entries live as long as the table; there is no collector
/// to tell when an address is dead.
#[derive(Debug, Default)]
pub struct MonitorTable {
    monitors: Mutex<HashMap<u64, Arc<Monitor>, ahash::RandomState>>,
}

impl MonitorTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn monitor(&self, address: u64) -> Arc<Monitor> {
        self.monitors.lock().entry(address).or_default().clone()
    }

    fn existing(&self, address: u64) -> Option<Arc<Monitor>> {
        self.monitors.lock().get(&address).cloned()
    }
}

impl Synchronizer for MonitorTable {
    fn enter(&self, address: u64) {
        // table lock released before blocking on the monitor
        let monitor = self.monitor(address);
        monitor.enter();
    }

    fn exit(&self, address: u64) -> bool {
        self.existing(address).is_some_and(|monitor| monitor.exit())
    }

    fn is_owned_by_current_thread(&self, address: u64) -> bool {
        self.existing(address)
            .is_some_and(|monitor| monitor.is_owned_by_current_thread())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    #[test]
    fn reentrant_enter_and_exit() {
        let table = MonitorTable::new();
        table.enter(0x10);
        table.enter(0x10);
        assert!(table.is_owned_by_current_thread(0x10));
        assert!(table.exit(0x10));
        assert!(table.is_owned_by_current_thread(0x10));
        assert!(table.exit(0x10));
        assert!(!table.is_owned_by_current_thread(0x10));
        assert!(!table.exit(0x10));
    }

    #[test]
    fn exit_without_enter_fails() {
        let table = MonitorTable::new();
        assert!(!table.exit(0x20));
    }

    #[test]
    fn foreign_exit_fails() {
        let table = Arc::new(MonitorTable::new());
        table.enter(0x30);
        let other = table.clone();
        let released = thread::spawn(move || other.exit(0x30)).join().unwrap();
        assert!(!released);
        assert!(table.exit(0x30));
    }

    #[test]
    fn excludes_other_threads() {
        let table = Arc::new(MonitorTable::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let table = table.clone();
                let inside = inside.clone();
                thread::spawn(move || {
                    for _ in 0..20 {
                        table.enter(0x40);
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        thread::sleep(Duration::from_micros(50));
                        inside.fetch_sub(1, Ordering::SeqCst);
                        assert!(table.exit(0x40));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
    }
}
