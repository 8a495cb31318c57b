//! Monitor acquisition, release and wait/notify

use crate::object::ObjectRef;
use crate::thread::{ThreadId, ThreadStatus};
use crate::vm::Vm;
use crate::VmResult;
use std::time::{Duration, Instant};

/// Reason why a thread is blocked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// Another thread holds the monitor
    AwaitingMonitor(ThreadId),
}

impl Vm {
    /// Thread other than `thread` holding `monitor`
    pub fn monitor_holder(&self, thread: ThreadId, monitor: &ObjectRef) -> Option<ThreadId> {
        self.threads
            .iter()
            .find(|t| t.id != thread && t.holds_lock(monitor))
            .map(|t| t.id)
    }

    /// Take one hold on `monitor`
    ///
    /// When another thread holds it, `thread` moves to `WaitingForMonitor`
    /// and must yield; the hold is pushed when the lock is handed over.
    pub fn acquire_lock(&mut self, thread: ThreadId, monitor: &ObjectRef) -> Result<(), BlockReason> {
        if let Some(holder) = self.monitor_holder(thread, monitor) {
            let t = &mut self.threads[thread.index()];
            t.status = ThreadStatus::WaitingForMonitor;
            t.monitor_to_resume = Some(monitor.clone());
            t.resume_holds = 1;
            log::trace!("{} blocks on {:?} held by thread {}", t.name, monitor, holder.index());
            return Err(BlockReason::AwaitingMonitor(holder));
        }
        self.threads[thread.index()].monitors.push(monitor.clone());
        Ok(())
    }

    /// Drop the most recent hold on `monitor`
    ///
    /// Once the last hold is gone the first thread in registration order
    /// waiting for the monitor is granted it.
    pub fn release_lock(&mut self, thread: ThreadId, monitor: &ObjectRef) -> VmResult<()> {
        let t = &mut self.threads[thread.index()];
        let Some(position) = t.monitors.iter().rposition(|m| m.ptr_eq(monitor)) else {
            return Err(self.throw(
                "java/lang/IllegalMonitorStateException",
                Some("current thread is not owner"),
            ));
        };
        t.monitors.remove(position);
        if !t.holds_lock(monitor) {
            self.grant_next(monitor);
        }
        Ok(())
    }

    /// Drop every hold `thread` has, granting each monitor onwards
    pub fn release_all_locks(&mut self, thread: ThreadId) {
        let held = std::mem::take(&mut self.threads[thread.index()].monitors);
        let mut released: Vec<ObjectRef> = Vec::new();
        for monitor in held {
            if !released.iter().any(|m| m.ptr_eq(&monitor)) {
                released.push(monitor);
            }
        }
        for monitor in &released {
            self.grant_next(monitor);
        }
    }

    fn grant_next(&mut self, monitor: &ObjectRef) {
        let next = self.live.iter().copied().find(|id| {
            let t = &self.threads[id.index()];
            t.status == ThreadStatus::WaitingForMonitor
                && t.monitor_to_resume.as_ref().map_or(false, |m| m.ptr_eq(monitor))
        });
        if let Some(id) = next {
            self.grant(id);
        }
    }

    fn grant(&mut self, id: ThreadId) {
        let t = &mut self.threads[id.index()];
        if let Some(monitor) = t.monitor_to_resume.take() {
            let holds = t.resume_holds.max(1);
            t.monitors.extend(std::iter::repeat(monitor).take(holds));
        }
        t.resume_holds = 0;
        t.status = if std::mem::take(&mut t.pending_interrupt) {
            ThreadStatus::Interrupted
        } else {
            ThreadStatus::Running
        };
        log::trace!("monitor granted to {}", t.name);
    }

    /// Re-acquire the monitor a woken waiter gave up
    pub(crate) fn reacquire(&mut self, id: ThreadId) {
        let monitor = self.threads[id.index()].monitor_to_resume.clone();
        match monitor {
            Some(monitor) if self.monitor_holder(id, &monitor).is_some() => {
                self.threads[id.index()].status = ThreadStatus::WaitingForMonitor;
            }
            _ => self.grant(id),
        }
    }

    fn check_owner(&self, thread: ThreadId, monitor: &ObjectRef) -> VmResult<()> {
        if self.threads[thread.index()].holds_lock(monitor) {
            Ok(())
        } else {
            Err(self.throw(
                "java/lang/IllegalMonitorStateException",
                Some("current thread is not owner"),
            ))
        }
    }

    /// Release `monitor` and block until notified or timed out
    ///
    /// Zero `timeout_ms` with zero `nanos` waits indefinitely. The caller
    /// yields after this returns.
    pub fn wait(&mut self, thread: ThreadId, monitor: &ObjectRef, timeout_ms: i64, nanos: i32) -> VmResult<()> {
        self.check_owner(thread, monitor)?;
        if timeout_ms < 0 {
            return Err(self.throw("java/lang/IllegalArgumentException", Some("timeout value is negative")));
        }
        if !(0..=999_999).contains(&nanos) {
            return Err(self.throw(
                "java/lang/IllegalArgumentException",
                Some("nanosecond timeout value out of range"),
            ));
        }
        let mut millis = timeout_ms;
        if nanos >= 500_000 || (nanos != 0 && timeout_ms == 0) {
            millis += 1;
        }
        let wake_up = (millis > 0).then(|| Instant::now() + Duration::from_millis(millis as u64));

        let t = &mut self.threads[thread.index()];
        let holds = t.holds(monitor);
        t.monitors.retain(|m| !m.ptr_eq(monitor));
        t.status = ThreadStatus::WaitingForNotification;
        t.wake_up = wake_up;
        t.monitor_to_resume = Some(monitor.clone());
        t.resume_holds = holds;

        self.wait_sets.add(monitor, thread);
        self.grant_next(monitor);
        Ok(())
    }

    /// Wake the oldest waiter of `monitor`
    pub fn notify(&mut self, thread: ThreadId, monitor: &ObjectRef) -> VmResult<()> {
        self.check_owner(thread, monitor)?;
        if let Some(waiter) = self.wait_sets.take_first(monitor) {
            self.wake_waiter(waiter);
        }
        Ok(())
    }

    /// Wake every waiter of `monitor`, oldest first
    pub fn notify_all(&mut self, thread: ThreadId, monitor: &ObjectRef) -> VmResult<()> {
        self.check_owner(thread, monitor)?;
        for waiter in self.wait_sets.take_all(monitor) {
            self.wake_waiter(waiter);
        }
        Ok(())
    }

    fn wake_waiter(&mut self, waiter: ThreadId) {
        self.threads[waiter.index()].wake_up = None;
        self.reacquire(waiter);
    }

    /// Wake a waiter whose timeout elapsed
    pub(crate) fn expire_wait(&mut self, waiter: ThreadId) {
        self.wait_sets.remove(waiter);
        self.wake_waiter(waiter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm_with_threads(count: usize) -> (Vm, Vec<ThreadId>) {
        let mut vm = Vm::new();
        let ids = (0..count)
            .map(|i| {
                let id = vm.create_thread(Some(format!("t{}", i)));
                vm.threads[id.index()].status = ThreadStatus::Running;
                vm.live.push(id);
                id
            })
            .collect();
        (vm, ids)
    }

    #[test]
    fn test_mutual_exclusion() {
        let (mut vm, ids) = vm_with_threads(3);
        let lock = ObjectRef::string("lock");

        assert!(vm.acquire_lock(ids[0], &lock).is_ok());
        assert!(vm.acquire_lock(ids[0], &lock).is_ok());
        assert_eq!(vm.acquire_lock(ids[2], &lock), Err(BlockReason::AwaitingMonitor(ids[0])));
        assert_eq!(vm.acquire_lock(ids[1], &lock), Err(BlockReason::AwaitingMonitor(ids[0])));

        // reentrant hold keeps the lock
        vm.release_lock(ids[0], &lock).unwrap();
        assert_eq!(vm.threads[ids[1].index()].status, ThreadStatus::WaitingForMonitor);

        // registration order picks t1 over t2
        vm.release_lock(ids[0], &lock).unwrap();
        assert_eq!(vm.threads[ids[1].index()].status, ThreadStatus::Running);
        assert!(vm.threads[ids[1].index()].holds_lock(&lock));
        assert_eq!(vm.threads[ids[2].index()].status, ThreadStatus::WaitingForMonitor);
        let holders = vm.threads.iter().filter(|t| t.holds_lock(&lock)).count();
        assert_eq!(holders, 1);
    }

    #[test]
    fn test_release_without_hold() {
        let (mut vm, ids) = vm_with_threads(1);
        let lock = ObjectRef::string("lock");
        match vm.release_lock(ids[0], &lock) {
            Err(crate::VmError::Throw(ex)) => {
                assert_eq!(ex.type_name(), "java/lang/IllegalMonitorStateException")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_wait_restores_reentrant_depth() {
        let (mut vm, ids) = vm_with_threads(2);
        let lock = ObjectRef::string("lock");
        vm.acquire_lock(ids[0], &lock).unwrap();
        vm.acquire_lock(ids[0], &lock).unwrap();

        vm.wait(ids[0], &lock, 0, 0).unwrap();
        assert!(!vm.threads[ids[0].index()].holds_lock(&lock));
        assert!(vm.threads[ids[0].index()].wake_up.is_none());

        vm.acquire_lock(ids[1], &lock).unwrap();
        vm.notify(ids[1], &lock).unwrap();
        assert_eq!(vm.threads[ids[0].index()].status, ThreadStatus::WaitingForMonitor);

        vm.release_lock(ids[1], &lock).unwrap();
        assert_eq!(vm.threads[ids[0].index()].status, ThreadStatus::Running);
        assert_eq!(vm.threads[ids[0].index()].holds(&lock), 2);
    }

    #[test]
    fn test_notify_all_fifo() {
        let (mut vm, ids) = vm_with_threads(4);
        let lock = ObjectRef::string("lock");
        for &id in &ids[..3] {
            vm.acquire_lock(id, &lock).unwrap();
            vm.wait(id, &lock, 0, 0).unwrap();
        }
        assert_eq!(vm.wait_sets.waiters(&lock), ids[..3].to_vec());

        vm.acquire_lock(ids[3], &lock).unwrap();
        vm.notify_all(ids[3], &lock).unwrap();
        assert!(vm.wait_sets.waiters(&lock).is_empty());
        vm.release_lock(ids[3], &lock).unwrap();
        assert_eq!(vm.threads[ids[0].index()].status, ThreadStatus::Running);
        assert_eq!(vm.threads[ids[1].index()].status, ThreadStatus::WaitingForMonitor);

        vm.release_lock(ids[0], &lock).unwrap();
        assert_eq!(vm.threads[ids[1].index()].status, ThreadStatus::Running);
    }

    #[test]
    fn test_wait_argument_checks() {
        let (mut vm, ids) = vm_with_threads(1);
        let lock = ObjectRef::string("lock");
        assert!(vm.wait(ids[0], &lock, 0, 0).is_err());

        vm.acquire_lock(ids[0], &lock).unwrap();
        assert!(vm.wait(ids[0], &lock, -1, 0).is_err());
        assert!(vm.wait(ids[0], &lock, 0, 1_000_000).is_err());
        assert!(vm.threads[ids[0].index()].holds_lock(&lock));

        vm.wait(ids[0], &lock, 5, 600_000).unwrap();
        assert!(vm.threads[ids[0].index()].wake_up.is_some());
    }

    #[test]
    fn test_expired_wait_leaves_wait_set() {
        let (mut vm, ids) = vm_with_threads(1);
        let lock = ObjectRef::string("lock");
        vm.acquire_lock(ids[0], &lock).unwrap();
        vm.wait(ids[0], &lock, 1, 0).unwrap();

        vm.expire_wait(ids[0]);
        assert!(vm.wait_sets.waiters(&lock).is_empty());
        assert_eq!(vm.threads[ids[0].index()].status, ThreadStatus::Running);
        assert!(vm.threads[ids[0].index()].holds_lock(&lock));
    }
}
