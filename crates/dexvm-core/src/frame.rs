//! Method activation frames
//!
//! Frames are recycled: a thread keeps one frame per stack depth and
//! re-initialises it on every call. [`Frame::init`] only grows the backing
//! vectors, so stale values survive into the next activation until
//! [`Frame::destroy`] zeroes them.

use crate::class::Method;
use crate::object::ObjectRef;
use crate::value::{join_wide, split_wide, Register};
use crate::{VmError, VmResult};
use std::rc::Rc;

/// One method activation
#[derive(Debug, Default)]
pub struct Frame {
    /// Executing method, `None` while the slot is unused
    pub method: Option<Rc<Method>>,
    /// Next instruction
    pub pc: usize,
    /// Start of the instruction being executed
    pub insn_pc: usize,
    registers: Vec<Register>,
    register_count: usize,
    arguments: Vec<Register>,
    /// Last 32-bit return value
    pub single_return: i32,
    /// Last 64-bit return value
    pub double_return: i64,
    /// Last reference return value
    pub object_return: Option<ObjectRef>,
    /// Exception delivered to the active handler
    pub throwable_return: Option<ObjectRef>,
    /// Monitor held for a synchronized method
    pub monitor: Option<ObjectRef>,
    /// Returning from this frame hands control back to the embedder
    pub thread_boundary: bool,
}

impl Frame {
    /// Create an unused frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare the frame for a call of `method`
    pub fn init(&mut self, method: Rc<Method>, thread_boundary: bool) {
        self.pc = 0;
        self.insn_pc = 0;
        self.register_count = method.registers;
        if self.registers.len() < method.registers {
            self.registers.resize(method.registers, Register::default());
        }
        if self.arguments.len() < method.outs {
            self.arguments.resize(method.outs, Register::default());
        }
        self.thread_boundary = thread_boundary;
        self.monitor = None;
        self.method = Some(method);
    }

    /// Zero every slot and detach the method
    ///
    /// Returns the monitor of a synchronized method for the owning thread to
    /// release.
    pub fn destroy(&mut self) -> Option<ObjectRef> {
        self.registers.iter_mut().for_each(|r| *r = Register::default());
        self.arguments.iter_mut().for_each(|r| *r = Register::default());
        self.single_return = 0;
        self.double_return = 0;
        self.object_return = None;
        self.throwable_return = None;
        self.method = None;
        self.pc = 0;
        self.insn_pc = 0;
        self.register_count = 0;
        self.thread_boundary = false;
        self.monitor.take()
    }

    /// Executing method
    pub fn method(&self) -> VmResult<&Rc<Method>> {
        self.method
            .as_ref()
            .ok_or_else(|| VmError::Internal("frame has no method".into()))
    }

    /// Number of registers of the current activation
    pub fn register_count(&self) -> usize {
        self.register_count
    }

    fn check(&self, reg: usize) -> VmResult<()> {
        if reg < self.register_count {
            Ok(())
        } else {
            Err(VmError::Internal(format!(
                "register v{} outside frame of {} registers",
                reg, self.register_count
            )))
        }
    }

    /// Raw register slot
    pub fn register(&self, reg: usize) -> VmResult<&Register> {
        self.check(reg)?;
        Ok(&self.registers[reg])
    }

    /// Overwrite a register slot, tag included
    pub fn set_register(&mut self, reg: usize, value: Register) -> VmResult<()> {
        self.check(reg)?;
        self.registers[reg] = value;
        Ok(())
    }

    /// Read a 32-bit register
    pub fn int(&self, reg: usize) -> VmResult<i32> {
        self.register(reg)?.as_int()
    }

    /// Write a 32-bit register
    pub fn set_int(&mut self, reg: usize, value: i32) -> VmResult<()> {
        self.set_register(reg, Register::Int(value))
    }

    /// Read the register pair `reg`, `reg + 1`
    pub fn long(&self, reg: usize) -> VmResult<i64> {
        let low = self.int(reg)?;
        let high = self.int(reg + 1)?;
        Ok(join_wide(low, high))
    }

    /// Write the register pair `reg`, `reg + 1`
    pub fn set_long(&mut self, reg: usize, value: i64) -> VmResult<()> {
        self.check(reg + 1)?;
        let (low, high) = split_wide(value);
        self.registers[reg] = Register::Int(low);
        self.registers[reg + 1] = Register::Int(high);
        Ok(())
    }

    /// Read a reference register
    pub fn object(&self, reg: usize) -> VmResult<Option<ObjectRef>> {
        self.register(reg)?.as_object()
    }

    /// Write a reference register
    pub fn set_object(&mut self, reg: usize, value: Option<ObjectRef>) -> VmResult<()> {
        self.set_register(reg, Register::Object(value))
    }

    /// Copy incoming arguments into the highest registers
    pub fn set_incoming(&mut self, args: &[Register]) -> VmResult<()> {
        let first = self.register_count.checked_sub(args.len()).ok_or_else(|| {
            VmError::Internal(format!(
                "{} argument words for a frame of {} registers",
                args.len(),
                self.register_count
            ))
        })?;
        self.registers[first..self.register_count].clone_from_slice(args);
        Ok(())
    }

    fn stage(&mut self, position: usize, value: Register) {
        if self.arguments.len() <= position {
            self.arguments.resize(position + 1, Register::default());
        }
        self.arguments[position] = value;
    }

    /// Stage a 32-bit outgoing argument
    pub fn set_argument_int(&mut self, position: usize, value: i32) {
        self.stage(position, Register::Int(value));
    }

    /// Stage a 64-bit outgoing argument over two positions
    pub fn set_argument_long(&mut self, position: usize, value: i64) {
        let (low, high) = split_wide(value);
        self.stage(position, Register::Int(low));
        self.stage(position + 1, Register::Int(high));
    }

    /// Stage a reference outgoing argument
    pub fn set_argument_object(&mut self, position: usize, value: Option<ObjectRef>) {
        self.stage(position, Register::Object(value));
    }

    /// Staged argument at `position`
    pub fn argument(&self, position: usize) -> VmResult<&Register> {
        self.arguments
            .get(position)
            .ok_or_else(|| VmError::Internal(format!("no staged argument at position {}", position)))
    }

    /// The first `count` staged arguments
    pub fn arguments(&self, count: usize) -> VmResult<&[Register]> {
        self.arguments
            .get(..count)
            .ok_or_else(|| VmError::Internal(format!("{} arguments requested, {} staged", count, self.arguments.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{Code, ModulePool};
    use dexvm_bytecode::DexFile;

    fn method(registers: usize, ins: usize, outs: usize) -> Rc<Method> {
        Rc::new(Method {
            class_name: "Test".into(),
            name: "m".into(),
            descriptor: "()V".into(),
            flags: 0,
            registers,
            ins,
            outs,
            code: Code::new(vec![0x000e]),
            tries: Vec::new(),
            handlers: Vec::new(),
            pool: Rc::new(ModulePool::from_dex(&DexFile::default())),
        })
    }

    #[test]
    fn test_init_grows_without_clearing() {
        let mut frame = Frame::new();
        frame.init(method(4, 0, 0), false);
        frame.set_int(3, 7).unwrap();

        frame.init(method(2, 0, 0), false);
        assert_eq!(frame.register_count(), 2);
        assert!(frame.int(3).is_err());

        frame.init(method(4, 0, 0), false);
        assert_eq!(frame.int(3).unwrap(), 7);
    }

    #[test]
    fn test_destroy_zeroes() {
        let mut frame = Frame::new();
        frame.init(method(2, 0, 0), true);
        frame.set_object(0, Some(ObjectRef::string("x"))).unwrap();
        frame.single_return = 3;
        frame.monitor = Some(ObjectRef::string("lock"));

        assert!(frame.destroy().is_some());
        assert!(frame.method.is_none());
        assert_eq!(frame.single_return, 0);
        assert!(!frame.thread_boundary);

        frame.init(method(2, 0, 0), false);
        assert!(!frame.register(0).unwrap().is_object());
        assert!(frame.monitor.is_none());
    }

    #[test]
    fn test_wide_registers() {
        let mut frame = Frame::new();
        frame.init(method(3, 0, 0), false);
        frame.set_long(1, -2).unwrap();
        assert_eq!(frame.long(1).unwrap(), -2);
        assert!(frame.set_long(2, 0).is_err());
    }

    #[test]
    fn test_argument_staging() {
        let mut frame = Frame::new();
        frame.init(method(1, 0, 2), false);
        frame.set_argument_object(0, None);
        frame.set_argument_long(1, 0x1_0000_0005);
        assert_eq!(frame.argument(1).unwrap().as_int().unwrap(), 5);
        assert_eq!(frame.argument(2).unwrap().as_int().unwrap(), 1);
        assert_eq!(frame.arguments(3).unwrap().len(), 3);
    }

    #[test]
    fn test_incoming_arguments_fill_top_registers() {
        let mut frame = Frame::new();
        frame.init(method(4, 2, 0), false);
        frame
            .set_incoming(&[Register::Int(1), Register::Int(2)])
            .unwrap();
        assert_eq!(frame.int(2).unwrap(), 1);
        assert_eq!(frame.int(3).unwrap(), 2);
        assert!(frame.set_incoming(&vec![Register::Int(0); 5]).is_err());
    }
}
