//! Host library hooks
//!
//! Module code calls into the host class library (`java/lang/String`,
//! `java/lang/Thread`, `java/io/PrintStream`, ...) whenever a method, field or
//! constructor reference does not resolve to a loaded module class. The
//! interpreter stages the call's arguments into the caller frame and asks the
//! [`Shim`] to service it through a [`ShimContext`].

mod format;
mod standard;

pub use format::{double_to_string, float_to_string};
pub use standard::StandardShim;

use crate::field::FieldValue;
use crate::frame::Frame;
use crate::object::{HostObject, ObjectRef, Stream};
use crate::thread::ThreadId;
use crate::value::{join_wide, Register};
use crate::vm::Vm;
use crate::{VmError, VmResult};

/// Outcome of a shim hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookResult {
    /// The hook does not know the member
    Unhandled,
    /// Serviced; execution continues with the next instruction
    Done,
    /// Serviced; the calling thread gives up the rest of its turn
    Yield,
}

/// Host class library seen by the interpreter
///
/// Method hooks read arguments with [`ShimContext::arg`] and friends and
/// leave results through [`ShimContext::return_int`] and friends. Names are
/// internal class names, descriptors are DEX method or type descriptors.
pub trait Shim {
    /// Static method of a host class
    fn class_method(
        &self,
        ctx: &mut ShimContext<'_>,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> VmResult<HookResult>;

    /// Virtual method of a host class; argument 0 is the receiver
    fn instance_method(
        &self,
        ctx: &mut ShimContext<'_>,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> VmResult<HookResult>;

    /// Interface method of a host interface
    fn interface_method(
        &self,
        ctx: &mut ShimContext<'_>,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> VmResult<HookResult> {
        self.instance_method(ctx, class_name, name, descriptor)
    }

    /// Constructor of a host class; argument 0 is the object under construction
    fn constructor(&self, ctx: &mut ShimContext<'_>, class_name: &str, descriptor: &str) -> VmResult<HookResult>;

    /// Read a static field of a host class
    fn class_field_get(
        &self,
        ctx: &mut ShimContext<'_>,
        class_name: &str,
        name: &str,
        type_desc: &str,
    ) -> VmResult<Option<FieldValue>>;

    /// Write a static field of a host class, `false` when unknown
    fn class_field_set(
        &self,
        ctx: &mut ShimContext<'_>,
        class_name: &str,
        name: &str,
        type_desc: &str,
        value: FieldValue,
    ) -> VmResult<bool>;

    /// Custom `java/lang/Class` object for a type descriptor
    fn class_getter(&self, _ctx: &mut ShimContext<'_>, _descriptor: &str) -> VmResult<Option<ObjectRef>> {
        Ok(None)
    }

    /// Allocate an array whose component type the VM cannot represent
    fn new_object_array(&self, _component: &str, _len: usize) -> Option<ObjectRef> {
        None
    }

    /// Superclass of a host class, `None` for `java/lang/Object`
    fn superclass_of(&self, class_name: &str) -> Option<String>;

    /// Interfaces a host class implements
    fn interfaces_of(&self, _class_name: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Access to the VM from inside a hook
pub struct ShimContext<'a> {
    /// The machine the call runs on
    pub vm: &'a mut Vm,
    /// Calling thread
    pub thread: ThreadId,
}

impl<'a> ShimContext<'a> {
    /// Create a context for a call made by `thread`
    pub fn new(vm: &'a mut Vm, thread: ThreadId) -> Self {
        Self { vm, thread }
    }

    /// Frame that made the call
    pub fn frame(&self) -> VmResult<&Frame> {
        self.vm.thread(self.thread).frame()
    }

    /// Mutable frame that made the call
    pub fn frame_mut(&mut self) -> VmResult<&mut Frame> {
        self.vm.thread_mut(self.thread).frame_mut()
    }

    // =========================================================
    // Arguments
    // =========================================================

    /// Argument word at `position`
    pub fn arg(&self, position: usize) -> VmResult<Register> {
        self.frame()?.argument(position).cloned()
    }

    /// 32-bit argument at `position`
    pub fn arg_int(&self, position: usize) -> VmResult<i32> {
        self.frame()?.argument(position)?.as_int()
    }

    /// 64-bit argument spanning `position` and `position + 1`
    pub fn arg_long(&self, position: usize) -> VmResult<i64> {
        let frame = self.frame()?;
        let low = frame.argument(position)?.as_int()?;
        let high = frame.argument(position + 1)?.as_int()?;
        Ok(join_wide(low, high))
    }

    /// Reference argument at `position`
    pub fn arg_object(&self, position: usize) -> VmResult<Option<ObjectRef>> {
        self.frame()?.argument(position)?.as_object()
    }

    /// Receiver of an instance call
    ///
    /// A null receiver throws `java/lang/NullPointerException`.
    pub fn receiver(&self) -> VmResult<ObjectRef> {
        self.arg_object(0)?
            .ok_or_else(|| self.throw("java/lang/NullPointerException", None))
    }

    // =========================================================
    // Results
    // =========================================================

    /// Leave a 32-bit result for `move-result`
    pub fn return_int(&mut self, value: i32) -> VmResult<()> {
        self.frame_mut()?.single_return = value;
        Ok(())
    }

    /// Leave a boolean result for `move-result`
    pub fn return_bool(&mut self, value: bool) -> VmResult<()> {
        self.return_int(value as i32)
    }

    /// Leave a 64-bit result for `move-result-wide`
    pub fn return_long(&mut self, value: i64) -> VmResult<()> {
        self.frame_mut()?.double_return = value;
        Ok(())
    }

    /// Leave a reference result for `move-result-object`
    pub fn return_object(&mut self, value: Option<ObjectRef>) -> VmResult<()> {
        self.frame_mut()?.object_return = value;
        Ok(())
    }

    /// Leave a new host string for `move-result-object`
    pub fn return_string(&mut self, value: impl Into<String>) -> VmResult<()> {
        self.return_object(Some(ObjectRef::string(value)))
    }

    // =========================================================
    // Helpers
    // =========================================================

    /// Host object backing `obj`
    ///
    /// A module instance of a class extending a host class answers with its
    /// host parent, everything else with itself.
    pub fn to_target_instance(&self, obj: &ObjectRef) -> ObjectRef {
        match obj.as_instance().and_then(|instance| instance.parent()) {
            Some(parent) => parent,
            None => obj.clone(),
        }
    }

    /// Build a module-level exception
    pub fn throw(&self, class_name: &str, message: Option<&str>) -> VmError {
        self.vm.throw(class_name, message)
    }

    /// Write to `System.out` or `System.err`
    pub fn write(&mut self, stream: Stream, text: &str) -> VmResult<()> {
        self.vm.write_stream(stream, text)
    }

    /// `String.valueOf(Object)`
    ///
    /// Module instances whose class chain declares `toString()` have it run
    /// on the calling thread.
    pub fn string_of(&mut self, obj: Option<&ObjectRef>) -> VmResult<String> {
        let Some(obj) = obj else {
            return Ok("null".to_string());
        };
        if let Some(instance) = obj.as_instance() {
            let class_name = instance.class_name().to_string();
            if let Some(method) = self
                .vm
                .get_virtual_method(&class_name, "toString", "()Ljava/lang/String;")?
            {
                self.vm.call_nested(self.thread, method, &[Register::object(obj.clone())])?;
                let result = self.frame_mut()?.object_return.take();
                return self.string_of(result.as_ref());
            }
        }
        Ok(self.describe(obj))
    }

    /// `Object.toString()` as the host library implements it
    pub fn describe(&self, obj: &ObjectRef) -> String {
        if let Some(instance) = obj.as_instance() {
            if let Some(parent) = instance.parent() {
                let described = matches!(
                    parent.host_ref().as_deref(),
                    Some(HostObject::Throwable { .. }) | Some(HostObject::Thread(_))
                );
                if described {
                    return self.host_string(&parent, Some(instance.class_name()));
                }
            }
            return format!("{}@{:x}", instance.class_name().replace('/', "."), obj.identity_hash());
        }
        self.host_string(obj, None)
    }

    /// Text of a host object or array, reporting `class_name` when given
    fn host_string(&self, obj: &ObjectRef, class_name: Option<&str>) -> String {
        let shown = |default: &str| class_name.unwrap_or(default).replace('/', ".");
        if let Some(array) = obj.as_array() {
            return format!("{}@{:x}", array.borrow().descriptor().replace('/', "."), obj.identity_hash());
        }
        let Some(host) = obj.host_ref() else {
            return format!("{}@{:x}", obj.type_name().replace('/', "."), obj.identity_hash());
        };
        match &*host {
            HostObject::String(s) | HostObject::StringBuffer(s) => s.clone(),
            HostObject::Boxed(boxed) => standard::boxed_string(boxed),
            HostObject::Class(descriptor) => standard::class_string(descriptor),
            HostObject::Thread(id) => self.vm.thread(*id).describe(),
            HostObject::Throwable { class_name: host_class, message, .. } => match message {
                Some(message) => format!("{}: {}", shown(host_class), message),
                None => shown(host_class),
            },
            other => format!("{}@{:x}", shown(other.class_name()), obj.identity_hash()),
        }
    }
}
