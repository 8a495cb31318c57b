//! Per-monitor FIFO queues of threads blocked in `wait()`

use crate::object::ObjectRef;
use crate::thread::ThreadId;
use std::collections::VecDeque;

/// Threads waiting on one monitor, oldest first
#[derive(Debug, Default)]
pub struct WaitSet {
    monitor: Option<ObjectRef>,
    threads: VecDeque<ThreadId>,
}

impl WaitSet {
    /// Waiting threads in arrival order
    pub fn threads(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.threads.iter().copied()
    }

    fn is_for(&self, monitor: &ObjectRef) -> bool {
        self.monitor.as_ref().map_or(false, |m| m.ptr_eq(monitor))
    }

    fn release_if_empty(&mut self) {
        if self.threads.is_empty() {
            self.monitor = None;
        }
    }
}

/// Pool of wait-sets
///
/// A slot is bound to a monitor while at least one thread waits on it and
/// returns to the pool once drained.
#[derive(Debug, Default)]
pub struct WaitSets {
    slots: Vec<WaitSet>,
}

impl WaitSets {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, monitor: &ObjectRef) -> Option<usize> {
        self.slots.iter().position(|slot| slot.is_for(monitor))
    }

    /// Queue `thread` on `monitor`
    pub fn add(&mut self, monitor: &ObjectRef, thread: ThreadId) {
        let index = match self.find(monitor) {
            Some(index) => index,
            None => match self.slots.iter().position(|slot| slot.monitor.is_none()) {
                Some(free) => {
                    self.slots[free].monitor = Some(monitor.clone());
                    free
                }
                None => {
                    self.slots.push(WaitSet {
                        monitor: Some(monitor.clone()),
                        threads: VecDeque::new(),
                    });
                    self.slots.len() - 1
                }
            },
        };
        log::trace!("thread {} waits on {:?}", thread.index(), monitor);
        self.slots[index].threads.push_back(thread);
    }

    /// Dequeue the oldest waiter of `monitor`
    pub fn take_first(&mut self, monitor: &ObjectRef) -> Option<ThreadId> {
        let index = self.find(monitor)?;
        let slot = &mut self.slots[index];
        let thread = slot.threads.pop_front();
        slot.release_if_empty();
        thread
    }

    /// Dequeue every waiter of `monitor`, oldest first
    pub fn take_all(&mut self, monitor: &ObjectRef) -> Vec<ThreadId> {
        match self.find(monitor) {
            Some(index) => {
                let slot = &mut self.slots[index];
                let threads = slot.threads.drain(..).collect();
                slot.release_if_empty();
                threads
            }
            None => Vec::new(),
        }
    }

    /// Remove `thread` from whichever set it waits in
    pub fn remove(&mut self, thread: ThreadId) -> bool {
        for slot in &mut self.slots {
            if let Some(position) = slot.threads.iter().position(|&t| t == thread) {
                slot.threads.remove(position);
                slot.release_if_empty();
                return true;
            }
        }
        false
    }

    /// Waiters of `monitor`, oldest first
    pub fn waiters(&self, monitor: &ObjectRef) -> Vec<ThreadId> {
        self.find(monitor)
            .map(|index| self.slots[index].threads().collect())
            .unwrap_or_default()
    }

    /// Number of pooled slots, bound or free
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
