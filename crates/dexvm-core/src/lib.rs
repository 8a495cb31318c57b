//! dexvm runtime
//!
//! This crate provides the virtual machine that executes parsed DEX modules:
//! - Tagged registers and the object model
//! - Class registry with run-once static initialisation
//! - Frame and thread state with the instruction dispatch loop
//! - Logical monitors, wait-sets and a cooperative green-thread scheduler
//! - The shim layer that stands in for the host class library

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod class;
pub mod field;
pub mod frame;
pub mod interpreter;
pub mod io;
pub mod object;
pub mod registry;
pub mod scheduler;
pub mod shim;
pub mod sync;
pub mod thread;
pub mod value;
pub mod vm;

pub use class::{Class, ClassId, Method, ModulePool};
pub use field::{Field, FieldValue};
pub use frame::Frame;
pub use interpreter::{Interpreter, StepOutcome};
pub use io::SharedBuffer;
pub use object::{ArrayData, HostObject, Instance, Object, ObjectRef};
pub use registry::ClassRegistry;
pub use scheduler::StopHandle;
pub use shim::{HookResult, Shim, ShimContext, StandardShim};
pub use thread::{Thread, ThreadId, ThreadStatus};
pub use value::Register;
pub use vm::{Vm, VmOptions};

use dexvm_bytecode::LoadError;

/// VM execution errors
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// The module could not be decoded
    #[error(transparent)]
    Load(#[from] LoadError),

    /// No module class and no shim hook resolves an instruction
    #[error("{0}")]
    NotImplemented(String),

    /// Embedder misuse such as starting a thread twice
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The requested class is not defined by any loaded module
    #[error("no such class: {0}")]
    NoSuchClass(String),

    /// No method with the requested name and descriptor
    #[error("no such method: {0}")]
    NoSuchMethod(String),

    /// A module-level exception in flight
    #[error("uncaught exception {0:?}")]
    Throw(ObjectRef),

    /// A register was read with the wrong tag
    #[error("type error: {0}")]
    TypeError(String),

    /// Every live thread is blocked without a timeout
    #[error("deadlock: {0}")]
    Deadlock(String),

    /// A stop was requested while a host callback was running module code
    #[error("stopped")]
    Stopped,

    /// Writing module output failed
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Interpreter invariant violated
    #[error("internal error: {0}")]
    Internal(String),
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;
