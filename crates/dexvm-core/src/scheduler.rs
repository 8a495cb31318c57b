//! Cooperative green-thread scheduler
//!
//! [`Vm::run`] starts the main thread and then walks the live threads in
//! registration order, giving each runnable thread one priority-weighted
//! instruction budget per pass. Sleeping threads and timed waiters are
//! polled against the wall clock once per pass.
//!
//! The VM itself is single-threaded. A [`StopHandle`] is the one piece that
//! crosses OS threads: another thread may request a stop and block until the
//! scheduler acknowledges it between two thread steps.

use crate::class::Method;
use crate::interpreter::{Interpreter, StepOutcome};
use crate::object::{ArrayData, HostObject, Object, ObjectRef};
use crate::thread::{ThreadId, ThreadStatus, MAX_PRIORITY, MIN_PRIORITY};
use crate::value::Register;
use crate::vm::Vm;
use crate::{VmError, VmResult};
use parking_lot::{Condvar, Mutex};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Descriptor of the static entry point
pub const MAIN_DESCRIPTOR: &str = "([Ljava/lang/String;)V";

#[derive(Debug, Default)]
struct StopState {
    requested: bool,
    running: bool,
}

/// Cooperative stop request for a running VM
///
/// Cloneable and `Send`; the VM checks it between thread steps.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    inner: Arc<(Mutex<StopState>, Condvar)>,
}

impl StopHandle {
    /// Create a handle for a VM that is not running
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop and block until the scheduler has drained
    ///
    /// Returns immediately when the VM is not running.
    pub fn stop(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock();
        if !state.running {
            return;
        }
        state.requested = true;
        while state.running {
            cvar.wait(&mut state);
        }
    }

    /// Check whether a stop has been requested
    pub fn is_requested(&self) -> bool {
        self.inner.0.lock().requested
    }

    /// Check whether the scheduler loop is running
    pub fn is_running(&self) -> bool {
        self.inner.0.lock().running
    }

    fn begin(&self) {
        let mut state = self.inner.0.lock();
        state.running = true;
        state.requested = false;
    }

    fn finish(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock();
        state.running = false;
        state.requested = false;
        cvar.notify_all();
    }
}

impl Vm {
    /// Run `main_class.main(String[])` until every thread ended or a stop
    ///
    /// `main_class` may use dots or slashes (`com.example.Main`). Uncaught
    /// module exceptions go to the error hook and end only their thread.
    pub fn run(&mut self, main_class: &str, args: &[String]) -> VmResult<()> {
        self.finished = false;
        self.stop.begin();
        let result = match self.run_main(main_class, args) {
            Err(VmError::Stopped) => {
                log::debug!("stop requested inside a host callback");
                Ok(())
            }
            other => other,
        };
        self.stop.finish();
        self.finished = true;
        result
    }

    fn run_main(&mut self, main_class: &str, args: &[String]) -> VmResult<()> {
        let name = main_class.replace('.', "/");
        let class = self
            .load_class(&name)?
            .ok_or_else(|| VmError::NoSuchClass(name.clone()))?;
        let entry = self
            .registry
            .class(class)
            .find_direct("main", MAIN_DESCRIPTOR)
            .ok_or_else(|| VmError::NoSuchMethod(format!("{}.main{}", name, MAIN_DESCRIPTOR)))?;

        let argv = ArrayData::Object {
            component: "Ljava/lang/String;".to_string(),
            items: args.iter().map(|a| Some(ObjectRef::string(a.as_str()))).collect(),
        };
        let main = self.create_thread(Some("main".to_string()));
        self.start_method(main, entry, &[Register::object(ObjectRef::new(Object::array(argv)))])?;
        self.schedule()
    }

    /// Whether the last [`Vm::run`] has completed
    pub fn is_end(&self) -> bool {
        self.finished
    }

    /// Handle for stopping this VM from another OS thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn schedule(&mut self) -> VmResult<()> {
        loop {
            if self.live.is_empty() {
                log::debug!("all threads ended");
                return Ok(());
            }
            let mut progressed = false;
            for id in self.live.clone() {
                if self.stop.is_requested() {
                    log::debug!("stop requested, leaving scheduler");
                    return Ok(());
                }
                progressed |= self.step_thread(id)?;
            }
            if !progressed {
                self.idle()?;
            }
        }
    }

    /// Give one thread its turn; returns whether it made progress
    fn step_thread(&mut self, id: ThreadId) -> VmResult<bool> {
        match self.thread(id).status {
            ThreadStatus::Running => {
                let outcome = Interpreter::new(self, id).execute(false);
                self.settle(outcome)?;
                Ok(true)
            }
            ThreadStatus::Interrupted => {
                self.thread_mut(id).status = ThreadStatus::Running;
                let exception = self.interrupted_exception();
                let outcome = Interpreter::new(self, id).raise(exception);
                match outcome {
                    StepOutcome::Continue => {
                        let outcome = Interpreter::new(self, id).execute(false);
                        self.settle(outcome)?;
                    }
                    other => self.settle(other)?,
                }
                Ok(true)
            }
            _ => Ok(self.wake_if_due(id)),
        }
    }

    /// Resume a sleeper or timed waiter whose deadline has passed
    fn wake_if_due(&mut self, id: ThreadId) -> bool {
        let thread = self.thread(id);
        if !thread.wake_up.map_or(false, |at| at <= Instant::now()) {
            return false;
        }
        let status = thread.status;
        match status {
            ThreadStatus::Sleeping => {
                let t = self.thread_mut(id);
                t.wake_up = None;
                t.status = ThreadStatus::Running;
                true
            }
            ThreadStatus::WaitingForNotification => {
                log::trace!("wait of {} timed out", self.thread(id).name);
                self.expire_wait(id);
                true
            }
            _ => false,
        }
    }

    /// Drive `thread` until its frame stack is back to `base`
    ///
    /// Used under a host callback: whenever `thread` yields or blocks, the
    /// other live threads get a pass so they can wake it. An exception that
    /// leaves the boundary frame comes back as [`VmError::Throw`].
    pub(crate) fn run_nested(&mut self, thread: ThreadId, base: usize) -> VmResult<()> {
        loop {
            if self.thread(thread).depth() <= base {
                return Ok(());
            }
            if self.stop.is_requested() {
                return Err(VmError::Stopped);
            }
            let progressed = match self.thread(thread).status {
                ThreadStatus::Running => {
                    let outcome = Interpreter::new(self, thread).execute(true);
                    self.nested_outcome(outcome)?;
                    true
                }
                ThreadStatus::Interrupted => {
                    self.thread_mut(thread).status = ThreadStatus::Running;
                    let exception = self.interrupted_exception();
                    let outcome = Interpreter::new(self, thread).raise(exception);
                    self.nested_outcome(outcome)?;
                    true
                }
                _ => self.wake_if_due(thread),
            };
            if self.thread(thread).depth() <= base {
                return Ok(());
            }

            let mut others = false;
            for id in self.live.clone() {
                if id != thread {
                    others |= self.step_thread(id)?;
                }
            }
            if !progressed && !others {
                if self.thread(thread).wake_up.is_some() {
                    std::thread::sleep(Duration::from_millis(self.options.idle_sleep_ms));
                } else {
                    self.idle()?;
                }
            }
        }
    }

    fn nested_outcome(&mut self, outcome: StepOutcome) -> VmResult<()> {
        match outcome {
            StepOutcome::Continue | StepOutcome::Yielded(None) => Ok(()),
            StepOutcome::Yielded(Some(exception)) => Err(VmError::Throw(exception)),
            StepOutcome::Error(error) => Err(error),
        }
    }

    fn settle(&mut self, outcome: StepOutcome) -> VmResult<()> {
        match outcome {
            StepOutcome::Continue | StepOutcome::Yielded(None) => Ok(()),
            StepOutcome::Yielded(Some(exception)) => self.report_uncaught(&exception),
            StepOutcome::Error(error) => Err(error),
        }
    }

    fn interrupted_exception(&self) -> ObjectRef {
        ObjectRef::new(Object::host(HostObject::throwable("java/lang/InterruptedException", None)))
    }

    /// Nothing ran this pass: back off, or report a deadlock
    fn idle(&mut self) -> VmResult<()> {
        let timed = self.live.iter().any(|id| {
            let t = self.thread(*id);
            t.wake_up.is_some()
                && matches!(t.status, ThreadStatus::Sleeping | ThreadStatus::WaitingForNotification)
        });
        if !timed && self.options.detect_deadlock {
            let blocked: Vec<String> = self
                .live
                .iter()
                .map(|id| {
                    let t = self.thread(*id);
                    format!("{} ({:?})", t.name, t.status)
                })
                .collect();
            return Err(VmError::Deadlock(format!("all threads blocked: {}", blocked.join(", "))));
        }
        std::thread::sleep(Duration::from_millis(self.options.idle_sleep_ms));
        Ok(())
    }

    // =========================================================
    // Thread Primitives
    // =========================================================

    /// Module-visible `java/lang/Thread` object of `id`
    pub fn thread_object(&mut self, id: ThreadId) -> ObjectRef {
        if let Some(handle) = &self.thread(id).handle {
            return handle.clone();
        }
        let handle = ObjectRef::new(Object::host(HostObject::Thread(id)));
        self.thread_mut(id).handle = Some(handle.clone());
        handle
    }

    /// Start `id`, running `run()V` of its target
    ///
    /// A thread without a target module `run` method ends right away.
    pub fn start_thread(&mut self, id: ThreadId) -> VmResult<()> {
        self.check_not_started(id)?;
        let target = self.thread(id).target.clone();
        let run = match target.as_ref().and_then(|t| t.as_instance()) {
            Some(instance) => {
                let class_name = instance.class_name().to_string();
                self.get_virtual_method(&class_name, "run", "()V")?
            }
            None => None,
        };
        match (run, target) {
            (Some(run), Some(target)) => self.start_method(id, run, &[Register::object(target)]),
            _ => {
                self.thread_mut(id).status = ThreadStatus::Running;
                self.live.push(id);
                self.end_thread(id);
                Ok(())
            }
        }
    }

    fn start_method(&mut self, id: ThreadId, method: Rc<Method>, args: &[Register]) -> VmResult<()> {
        self.check_not_started(id)?;
        log::debug!("starting thread {}", self.thread(id).name);
        self.thread_mut(id).status = ThreadStatus::Running;
        self.live.push(id);
        self.enter_method(id, method, args)?;
        Ok(())
    }

    fn check_not_started(&self, id: ThreadId) -> VmResult<()> {
        let t = self.thread(id);
        if t.status != ThreadStatus::NotStarted {
            return Err(VmError::IllegalState(format!("thread {} already started", t.name)));
        }
        Ok(())
    }

    /// Interrupt a sleeping, joining or waiting thread
    ///
    /// The thread receives `InterruptedException` at its next turn. From any
    /// other state this does nothing.
    pub fn interrupt(&mut self, id: ThreadId) {
        match self.thread(id).status {
            ThreadStatus::Sleeping => {
                let t = self.thread_mut(id);
                t.wake_up = None;
                t.status = ThreadStatus::Interrupted;
            }
            ThreadStatus::Joining => {
                let t = self.thread_mut(id);
                t.status = ThreadStatus::Interrupted;
                if let Some(target) = t.joining.take() {
                    self.thread_mut(target).joined.retain(|j| *j != id);
                }
            }
            ThreadStatus::WaitingForNotification => {
                self.wait_sets.remove(id);
                let t = self.thread_mut(id);
                t.wake_up = None;
                t.pending_interrupt = true;
                self.reacquire(id);
            }
            _ => {}
        }
        log::trace!("interrupt {} -> {:?}", self.thread(id).name, self.thread(id).status);
    }

    /// Change the priority of `id`
    pub fn set_priority(&mut self, id: ThreadId, priority: i32) -> VmResult<()> {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            return Err(VmError::IllegalState(format!(
                "priority {} outside {}..={}",
                priority, MIN_PRIORITY, MAX_PRIORITY
            )));
        }
        self.thread_mut(id).priority = priority;
        Ok(())
    }

    /// Block `thread` until `target` ends
    ///
    /// Returns `false` without blocking when the target is not alive.
    pub fn join(&mut self, thread: ThreadId, target: ThreadId) -> bool {
        if !self.thread(target).is_alive() {
            return false;
        }
        let t = self.thread_mut(thread);
        t.status = ThreadStatus::Joining;
        t.joining = Some(target);
        self.thread_mut(target).joined.push(thread);
        true
    }

    /// Put `thread` to sleep for `millis` milliseconds
    pub fn sleep(&mut self, thread: ThreadId, millis: i64) -> VmResult<()> {
        if millis < 0 {
            return Err(self.throw("java/lang/IllegalArgumentException", Some("timeout value is negative")));
        }
        let t = self.thread_mut(thread);
        t.status = ThreadStatus::Sleeping;
        t.wake_up = Some(Instant::now() + Duration::from_millis(millis as u64));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(vm: &mut Vm) -> ThreadId {
        let id = vm.create_thread(None);
        vm.thread_mut(id).status = ThreadStatus::Running;
        vm.live.push(id);
        id
    }

    #[test]
    fn test_stop_when_idle_returns() {
        let handle = StopHandle::new();
        handle.stop();
        assert!(!handle.is_requested());
        assert!(!handle.is_running());
    }

    #[test]
    fn test_stop_waits_for_finish() {
        let handle = StopHandle::new();
        handle.begin();
        let remote = handle.clone();
        let stopper = std::thread::spawn(move || remote.stop());
        while !handle.is_requested() {
            std::thread::yield_now();
        }
        handle.finish();
        stopper.join().unwrap();
        assert!(!handle.is_running());
    }

    #[test]
    fn test_set_priority_bounds() {
        let mut vm = Vm::new();
        let id = running(&mut vm);
        vm.set_priority(id, MAX_PRIORITY).unwrap();
        assert_eq!(vm.thread(id).priority, MAX_PRIORITY);
        assert!(matches!(vm.set_priority(id, 0), Err(VmError::IllegalState(_))));
        assert!(matches!(vm.set_priority(id, 11), Err(VmError::IllegalState(_))));
        assert_eq!(vm.thread(id).priority, MAX_PRIORITY);
    }

    #[test]
    fn test_start_twice_is_illegal() {
        let mut vm = Vm::new();
        let id = vm.create_thread(None);
        vm.start_thread(id).unwrap();
        assert_eq!(vm.thread(id).status, ThreadStatus::Ended);
        assert!(matches!(vm.start_thread(id), Err(VmError::IllegalState(_))));
    }

    #[test]
    fn test_join_and_end() {
        let mut vm = Vm::new();
        let a = running(&mut vm);
        let b = running(&mut vm);
        assert!(vm.join(a, b));
        assert_eq!(vm.thread(a).status, ThreadStatus::Joining);

        vm.end_thread(b);
        assert_eq!(vm.thread(a).status, ThreadStatus::Running);
        assert!(vm.thread(a).joining.is_none());
        assert!(!vm.join(a, b));
        assert_eq!(vm.live_threads(), &[a]);
    }

    #[test]
    fn test_interrupt_transitions() {
        let mut vm = Vm::new();
        let sleeper = running(&mut vm);
        vm.sleep(sleeper, 10_000).unwrap();
        vm.interrupt(sleeper);
        assert_eq!(vm.thread(sleeper).status, ThreadStatus::Interrupted);
        assert!(vm.thread(sleeper).wake_up.is_none());

        let runner = running(&mut vm);
        vm.interrupt(runner);
        assert_eq!(vm.thread(runner).status, ThreadStatus::Running);

        let joiner = running(&mut vm);
        vm.join(joiner, runner);
        vm.interrupt(joiner);
        assert_eq!(vm.thread(joiner).status, ThreadStatus::Interrupted);
        assert!(vm.thread(runner).joined.is_empty());
    }

    #[test]
    fn test_interrupt_waiter_reacquires() {
        let mut vm = Vm::new();
        let waiter = running(&mut vm);
        let holder = running(&mut vm);
        let lock = ObjectRef::string("lock");
        vm.acquire_lock(waiter, &lock).unwrap();
        vm.wait(waiter, &lock, 0, 0).unwrap();
        vm.acquire_lock(holder, &lock).unwrap();

        vm.interrupt(waiter);
        assert!(vm.wait_sets.waiters(&lock).is_empty());
        assert_eq!(vm.thread(waiter).status, ThreadStatus::WaitingForMonitor);

        vm.release_lock(holder, &lock).unwrap();
        assert_eq!(vm.thread(waiter).status, ThreadStatus::Interrupted);
        assert!(vm.thread(waiter).holds_lock(&lock));
    }

    #[test]
    fn test_negative_sleep_throws() {
        let mut vm = Vm::new();
        let id = running(&mut vm);
        assert!(matches!(vm.sleep(id, -1), Err(VmError::Throw(_))));
        assert_eq!(vm.thread(id).status, ThreadStatus::Running);
    }

    #[test]
    fn test_deadlock_reported() {
        let mut vm = Vm::new();
        let a = running(&mut vm);
        let b = running(&mut vm);
        vm.join(a, b);
        vm.join(b, a);
        assert!(matches!(vm.schedule(), Err(VmError::Deadlock(_))));
    }
}
