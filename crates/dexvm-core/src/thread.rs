//! Green threads
//!
//! A [`Thread`] is pure state: a recycled frame stack, a status and the
//! bookkeeping the scheduler and monitors need. Threads live in the VM's
//! thread arena and refer to each other by [`ThreadId`].

use crate::class::Method;
use crate::frame::Frame;
use crate::object::ObjectRef;
use crate::{VmError, VmResult};
use std::rc::Rc;
use std::time::Instant;

/// Lowest thread priority
pub const MIN_PRIORITY: i32 = 1;
/// Default thread priority
pub const NORM_PRIORITY: i32 = 5;
/// Highest thread priority
pub const MAX_PRIORITY: i32 = 10;

/// Index of a thread in the VM's thread arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub usize);

impl ThreadId {
    /// Arena index
    pub fn index(self) -> usize {
        self.0
    }
}

/// Lifecycle state of a thread
///
/// Every state from `Running` on counts as alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThreadStatus {
    /// Created, `start` not called yet
    NotStarted,
    /// Frame stack exhausted
    Ended,
    /// Runnable
    Running,
    /// Blocked in `join`
    Joining,
    /// Blocked in `sleep` until `wake_up`
    Sleeping,
    /// Interrupted, `InterruptedException` pending
    Interrupted,
    /// Blocked acquiring `monitor_to_resume`
    WaitingForMonitor,
    /// Blocked in `wait`, optionally until `wake_up`
    WaitingForNotification,
}

impl ThreadStatus {
    /// Check whether the thread has started and not ended
    pub fn is_alive(self) -> bool {
        self >= ThreadStatus::Running
    }
}

/// Logical VM thread
#[derive(Debug)]
pub struct Thread {
    /// Arena id
    pub id: ThreadId,
    /// Thread name
    pub name: String,
    /// Lifecycle state
    pub status: ThreadStatus,
    /// Scheduling priority, `MIN_PRIORITY..=MAX_PRIORITY`
    pub priority: i32,
    frames: Vec<Frame>,
    depth: usize,
    /// Held monitors, innermost last; reentrant holds repeat
    pub monitors: Vec<ObjectRef>,
    /// Deadline of a sleep or timed wait
    pub wake_up: Option<Instant>,
    /// Monitor to acquire before the thread may run again
    pub monitor_to_resume: Option<ObjectRef>,
    /// Holds to restore once `monitor_to_resume` is granted
    pub resume_holds: usize,
    /// Deliver `InterruptedException` once the monitor is granted
    pub pending_interrupt: bool,
    /// Thread this one is joining
    pub joining: Option<ThreadId>,
    /// Threads joining this one
    pub joined: Vec<ThreadId>,
    /// Object whose `run()V` the thread executes
    pub target: Option<ObjectRef>,
    /// Module-visible `java/lang/Thread` object
    pub handle: Option<ObjectRef>,
}

impl Thread {
    /// Create a thread that has not started
    pub fn new(id: ThreadId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: ThreadStatus::NotStarted,
            priority: NORM_PRIORITY,
            frames: Vec::new(),
            depth: 0,
            monitors: Vec::new(),
            wake_up: None,
            monitor_to_resume: None,
            resume_holds: 0,
            pending_interrupt: false,
            joining: None,
            joined: Vec::new(),
            target: None,
            handle: None,
        }
    }

    /// Check whether the thread has started and not ended
    pub fn is_alive(&self) -> bool {
        self.status.is_alive()
    }

    /// Number of active frames
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Activate the next frame for `method`
    pub fn push_frame(&mut self, method: Rc<Method>, thread_boundary: bool) -> &mut Frame {
        if self.depth == self.frames.len() {
            self.frames.push(Frame::new());
        }
        let frame = &mut self.frames[self.depth];
        self.depth += 1;
        frame.init(method, thread_boundary);
        frame
    }

    /// Deactivate the top frame
    ///
    /// Returns whether it was a boundary frame, and the monitor it held.
    pub fn pop_frame(&mut self) -> VmResult<(bool, Option<ObjectRef>)> {
        if self.depth == 0 {
            return Err(VmError::Internal(format!("frame stack of {} is empty", self.name)));
        }
        self.depth -= 1;
        let frame = &mut self.frames[self.depth];
        let boundary = frame.thread_boundary;
        Ok((boundary, frame.destroy()))
    }

    /// Top frame
    pub fn current_frame(&self) -> Option<&Frame> {
        self.depth.checked_sub(1).map(|top| &self.frames[top])
    }

    /// Top frame, mutable
    pub fn current_frame_mut(&mut self) -> Option<&mut Frame> {
        match self.depth.checked_sub(1) {
            Some(top) => Some(&mut self.frames[top]),
            None => None,
        }
    }

    /// Top frame, or an error when the stack is empty
    pub fn frame(&self) -> VmResult<&Frame> {
        self.current_frame()
            .ok_or_else(|| VmError::Internal(format!("thread {} has no frame", self.name)))
    }

    /// Top frame, mutable, or an error when the stack is empty
    pub fn frame_mut(&mut self) -> VmResult<&mut Frame> {
        let name = &self.name;
        match self.depth.checked_sub(1) {
            Some(top) => Ok(&mut self.frames[top]),
            None => Err(VmError::Internal(format!("thread {} has no frame", name))),
        }
    }

    /// Number of holds on `monitor`
    pub fn holds(&self, monitor: &ObjectRef) -> usize {
        self.monitors.iter().filter(|m| m.ptr_eq(monitor)).count()
    }

    /// Check whether the thread holds `monitor`
    pub fn holds_lock(&self, monitor: &ObjectRef) -> bool {
        self.monitors.iter().any(|m| m.ptr_eq(monitor))
    }

    /// `Thread[name,priority]`
    pub fn describe(&self) -> String {
        format!("Thread[{},{}]", self.name, self.priority)
    }
}
