//! Instruction dispatch
//!
//! An [`Interpreter`] borrows the VM for one thread and runs that thread's
//! top frame either until it gives up control (the class-initialiser driver)
//! or for a priority-weighted instruction budget (the scheduler driver).
//! Handlers for each opcode family live in [`opcodes`].

mod execution;
pub mod opcodes;

pub use execution::{OpcodeResult, StepOutcome};

use crate::class::Method;
use crate::frame::Frame;
use crate::object::ObjectRef;
use crate::thread::{Thread, ThreadId};
use crate::vm::Vm;
use crate::{VmError, VmResult};
use dexvm_bytecode::Opcode;
use std::rc::Rc;

/// Operand view of the instruction at `pc`
pub(crate) struct Insn<'m> {
    method: &'m Rc<Method>,
    pc: usize,
}

impl<'m> Insn<'m> {
    fn new(method: &'m Rc<Method>, pc: usize) -> Self {
        Self { method, pc }
    }

    /// Method holding the instruction
    pub(crate) fn method(&self) -> &'m Rc<Method> {
        self.method
    }

    /// Address of the instruction
    pub(crate) fn pc(&self) -> usize {
        self.pc
    }

    /// Code unit `offset` units into the instruction
    pub(crate) fn word(&self, offset: usize) -> VmResult<u16> {
        self.method.code.word(self.pc + offset)
    }

    /// `vA` of the 4-bit formats
    pub(crate) fn a(&self) -> VmResult<usize> {
        Ok(((self.word(0)? >> 8) & 0xF) as usize)
    }

    /// `vB` of the 4-bit formats
    pub(crate) fn b(&self) -> VmResult<usize> {
        Ok((self.word(0)? >> 12) as usize)
    }

    /// `vAA`, the high byte of the first unit
    pub(crate) fn aa(&self) -> VmResult<usize> {
        Ok((self.word(0)? >> 8) as usize)
    }

    /// `vBB`, the low byte of the second unit
    pub(crate) fn bb(&self) -> VmResult<usize> {
        Ok((self.word(1)? & 0xFF) as usize)
    }

    /// `vCC`, the high byte of the second unit
    pub(crate) fn cc(&self) -> VmResult<usize> {
        Ok((self.word(1)? >> 8) as usize)
    }

    /// Signed 16-bit unit
    pub(crate) fn s16(&self, offset: usize) -> VmResult<i32> {
        Ok(self.word(offset)? as i16 as i32)
    }

    /// 32-bit value spread over two units, low unit first
    pub(crate) fn u32_at(&self, offset: usize) -> VmResult<u32> {
        let low = self.word(offset)? as u32;
        let high = self.word(offset + 1)? as u32;
        Ok(low | (high << 16))
    }
}

/// Executes one thread's frames
pub struct Interpreter<'a> {
    vm: &'a mut Vm,
    thread: ThreadId,
}

impl<'a> Interpreter<'a> {
    /// Bind the interpreter to `thread`
    pub fn new(vm: &'a mut Vm, thread: ThreadId) -> Self {
        Self { vm, thread }
    }

    /// Run the thread's top frame
    ///
    /// With `endless` set the thread runs until it yields or its boundary
    /// frame returns. Otherwise it runs for `instructions_per_priority ×
    /// priority` instructions.
    pub fn execute(&mut self, endless: bool) -> StepOutcome {
        let budget = if endless {
            None
        } else {
            let priority = self.thread().priority.max(1) as usize;
            Some(self.vm.options.instructions_per_priority.max(1) * priority)
        };

        let mut executed = 0usize;
        loop {
            if budget.map_or(false, |b| executed >= b) {
                return StepOutcome::Continue;
            }
            executed += 1;
            match self.step() {
                Ok(OpcodeResult::Continue) => {}
                Ok(OpcodeResult::Yield) | Ok(OpcodeResult::Exit) => return StepOutcome::yielded(),
                Err(VmError::Throw(exception)) => match self.unwind(exception) {
                    Ok(None) => {}
                    Ok(Some(uncaught)) => return StepOutcome::uncaught(uncaught),
                    Err(error) => return StepOutcome::Error(error),
                },
                Err(error) => return StepOutcome::Error(error),
            }
        }
    }

    /// Raise `exception` at the current instruction of the top frame
    ///
    /// Returns `Continue` when a handler took it.
    pub fn raise(&mut self, exception: ObjectRef) -> StepOutcome {
        match self.unwind(exception) {
            Ok(None) => StepOutcome::Continue,
            Ok(Some(uncaught)) => StepOutcome::uncaught(uncaught),
            Err(error) => StepOutcome::Error(error),
        }
    }

    fn step(&mut self) -> VmResult<OpcodeResult> {
        let frame = self.frame()?;
        let method = Rc::clone(frame.method()?);
        let pc = frame.pc;
        let low = method.code.lower(pc)?;
        let opcode = Opcode::from_u8(low)
            .ok_or_else(|| VmError::NotImplemented(format!("not implemented instruction: 0x{:02x}", low)))?;

        let frame = self.frame_mut()?;
        frame.insn_pc = pc;
        frame.pc = pc + opcode.width() as usize;
        log::trace!("{}.{} {:04x}: {}", method.class_name, method.name, pc, opcode);

        let insn = Insn::new(&method, pc);
        self.dispatch(&insn, opcode)
    }

    fn dispatch(&mut self, insn: &Insn<'_>, opcode: Opcode) -> VmResult<OpcodeResult> {
        match opcode.to_u8() {
            0x00..=0x0D => self.exec_move_ops(insn, opcode),
            0x0E..=0x11 => self.exec_return_ops(insn, opcode),
            0x12..=0x1C => self.exec_constant_ops(insn, opcode),
            0x1D..=0x20 | 0x22 => self.exec_object_ops(insn, opcode),
            0x21 | 0x23..=0x26 | 0x44..=0x51 => self.exec_array_ops(insn, opcode),
            0x27 => self.exec_exception_ops(insn, opcode),
            0x28..=0x2C | 0x32..=0x3D => self.exec_control_flow_ops(insn, opcode),
            0x2D..=0x31 => self.exec_comparison_ops(insn, opcode),
            0x52..=0x6D => self.exec_field_ops(insn, opcode),
            0x6E..=0x78 => self.exec_call_ops(insn, opcode),
            0x81..=0x8F => self.exec_conversion_ops(insn, opcode),
            _ => self.exec_arithmetic_ops(insn, opcode),
        }
    }

    /// Walk the frame stack for a handler of `exception`
    ///
    /// Returns the exception back when no frame up to a boundary catches it.
    fn unwind(&mut self, exception: ObjectRef) -> VmResult<Option<ObjectRef>> {
        loop {
            let Some(frame) = self.thread().current_frame() else {
                self.vm.end_thread(self.thread);
                return Ok(Some(exception));
            };
            let method = Rc::clone(frame.method()?);
            let pc = frame.insn_pc;

            if let Some(address) = self.find_handler(&method, pc, &exception)? {
                log::trace!("{:?} caught in {} at {:04x}", exception, method.name, address);
                let frame = self.frame_mut()?;
                frame.throwable_return = Some(exception);
                frame.pc = address;
                return Ok(None);
            }

            let boundary = self.vm.pop_frame(self.thread)?;
            if boundary {
                return Ok(Some(exception));
            }
            if self.thread().depth() == 0 {
                self.vm.end_thread(self.thread);
                return Ok(Some(exception));
            }
        }
    }

    /// Handler address for `exception` raised at `pc`
    ///
    /// Only the last try range covering `pc` is consulted, which is the
    /// innermost one for nested blocks.
    fn find_handler(&mut self, method: &Method, pc: usize, exception: &ObjectRef) -> VmResult<Option<usize>> {
        let Some(range) = method
            .tries
            .iter()
            .filter(|t| t.start as usize <= pc && pc < t.end as usize)
            .last()
        else {
            return Ok(None);
        };
        let group = method
            .handlers
            .get(range.handler)
            .ok_or_else(|| VmError::Internal(format!("handler group {} missing", range.handler)))?;

        for catch in &group.catches {
            match &catch.type_name {
                None => return Ok(Some(catch.address as usize)),
                Some(name) => {
                    if self.vm.is_instance_of_class(exception, name)? {
                        return Ok(Some(catch.address as usize));
                    }
                }
            }
        }
        Ok(None)
    }

    // =========================================================
    // Helpers shared by the opcode handlers
    // =========================================================

    pub(crate) fn thread(&self) -> &Thread {
        self.vm.thread(self.thread)
    }

    pub(crate) fn thread_mut(&mut self) -> &mut Thread {
        self.vm.thread_mut(self.thread)
    }

    pub(crate) fn frame(&self) -> VmResult<&Frame> {
        self.thread().frame()
    }

    pub(crate) fn frame_mut(&mut self) -> VmResult<&mut Frame> {
        self.thread_mut().frame_mut()
    }

    /// Continue at `insn_pc + offset`
    pub(crate) fn jump(&mut self, insn_pc: usize, offset: i32) -> VmResult<OpcodeResult> {
        let target = insn_pc as i64 + offset as i64;
        if target < 0 {
            return Err(VmError::Internal(format!("branch from {:04x} to {}", insn_pc, target)));
        }
        self.frame_mut()?.pc = target as usize;
        Ok(OpcodeResult::Continue)
    }

    /// Module-level exception of a host throwable class
    pub(crate) fn throw(&self, class_name: &str, message: Option<&str>) -> VmError {
        self.vm.throw(class_name, message)
    }

    /// Dereference a register value, raising `NullPointerException` on null
    pub(crate) fn non_null(&self, obj: Option<ObjectRef>) -> VmResult<ObjectRef> {
        obj.ok_or_else(|| self.throw("java/lang/NullPointerException", None))
    }
}
