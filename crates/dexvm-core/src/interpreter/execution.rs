//! Execution result types for the interpreter
//!
//! A thread step ends in one of the [`StepOutcome`] states. The scheduler
//! uses it to decide what to do next:
//! - `Continue`: the instruction budget ran out, the thread stays runnable
//! - `Yielded`: the thread gave up control; a payload is an uncaught exception
//! - `Error`: the module cannot be executed further

use crate::object::ObjectRef;
use crate::VmError;

/// Result of running a thread for one scheduler step
#[derive(Debug)]
pub enum StepOutcome {
    /// Budget exhausted, the thread is still runnable
    Continue,

    /// Control returned to the scheduler
    ///
    /// Carries the exception that terminated the thread (or the boundary
    /// frame) when one was not caught.
    Yielded(Option<ObjectRef>),

    /// Execution failed with a VM-level error
    Error(VmError),
}

impl StepOutcome {
    /// Create a plain yield
    pub fn yielded() -> Self {
        StepOutcome::Yielded(None)
    }

    /// Create a yield carrying an uncaught exception
    pub fn uncaught(exception: ObjectRef) -> Self {
        StepOutcome::Yielded(Some(exception))
    }

    /// Check if the step ended in an error
    pub fn is_error(&self) -> bool {
        matches!(self, StepOutcome::Error(_))
    }

    /// Uncaught exception payload, if any
    pub fn exception(&self) -> Option<&ObjectRef> {
        match self {
            StepOutcome::Yielded(Some(exception)) => Some(exception),
            _ => None,
        }
    }
}

/// Result of executing a single instruction
///
/// Module-level exceptions do not appear here: they travel as
/// `Err(VmError::Throw(..))` and are unwound by the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeResult {
    /// Continue with the next instruction
    Continue,

    /// Give control back to the scheduler, the thread may be blocked
    Yield,

    /// A boundary frame returned or the last frame popped
    Exit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_outcome_helpers() {
        let ex = ObjectRef::string("boom");
        assert_eq!(StepOutcome::uncaught(ex.clone()).exception(), Some(&ex));
        assert!(StepOutcome::yielded().exception().is_none());
        assert!(StepOutcome::Error(VmError::Internal("x".into())).is_error());
        assert!(!StepOutcome::Continue.is_error());
    }
}
