use crate::class::Method;
use crate::interpreter::{Insn, Interpreter, OpcodeResult};
use crate::object::{Object, ObjectRef};
use crate::shim::{HookResult, ShimContext};
use crate::{VmError, VmResult};
use dexvm_bytecode::{MethodDescriptor, MethodRef, Opcode};
use std::rc::Rc;

/// Value handed back to the caller by a `return` instruction
enum ReturnValue {
    Void,
    Single(i32),
    Wide(i64),
    Object(Option<ObjectRef>),
}

/// Shim hook consulted when no module method resolves a call
#[derive(Clone, Copy)]
enum Hook {
    Instance,
    Interface,
    Class,
    Constructor,
}

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_return_ops(
        &mut self,
        insn: &Insn<'_>,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        let value = match opcode {
            Opcode::ReturnVoid => ReturnValue::Void,
            Opcode::Return => ReturnValue::Single(self.frame()?.int(insn.aa()?)?),
            Opcode::ReturnWide => ReturnValue::Wide(self.frame()?.long(insn.aa()?)?),
            Opcode::ReturnObject => ReturnValue::Object(self.frame()?.object(insn.aa()?)?),
            _ => {
                return Err(VmError::Internal(format!(
                    "{} dispatched to return handler",
                    opcode
                )))
            }
        };
        self.return_from_method(value)
    }

    fn return_from_method(&mut self, value: ReturnValue) -> VmResult<OpcodeResult> {
        let boundary = self.vm.pop_frame(self.thread)?;
        match self.thread_mut().current_frame_mut() {
            Some(caller) => {
                match value {
                    ReturnValue::Void => {}
                    ReturnValue::Single(v) => caller.single_return = v,
                    ReturnValue::Wide(v) => caller.double_return = v,
                    ReturnValue::Object(v) => caller.object_return = v,
                }
                if boundary {
                    Ok(OpcodeResult::Exit)
                } else {
                    Ok(OpcodeResult::Continue)
                }
            }
            None => {
                if !boundary {
                    self.vm.end_thread(self.thread);
                }
                Ok(OpcodeResult::Exit)
            }
        }
    }

    pub(in crate::interpreter) fn exec_call_ops(
        &mut self,
        insn: &Insn<'_>,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        let range = matches!(
            opcode,
            Opcode::InvokeVirtualRange
                | Opcode::InvokeSuperRange
                | Opcode::InvokeDirectRange
                | Opcode::InvokeStaticRange
                | Opcode::InvokeInterfaceRange
        );
        let target = insn.method().pool.method_ref(insn.word(1)? as u32)?.clone();
        let is_static = matches!(opcode, Opcode::InvokeStatic | Opcode::InvokeStaticRange);
        let words = self.stage_arguments(insn, range, !is_static, &target.descriptor)?;

        match opcode {
            // =========================================================
            // Virtual Dispatch
            // =========================================================
            Opcode::InvokeVirtual
            | Opcode::InvokeVirtualRange
            | Opcode::InvokeInterface
            | Opcode::InvokeInterfaceRange => {
                let receiver = self.staged_receiver()?;
                if let Object::Instance(instance) = &*receiver {
                    let class_name = instance.class_name().to_string();
                    if let Some(method) = self.vm.get_virtual_method(&class_name, &target.name, &target.descriptor)? {
                        return self.call_method(method, words);
                    }
                }
                let hook = if matches!(opcode, Opcode::InvokeInterface | Opcode::InvokeInterfaceRange) {
                    Hook::Interface
                } else {
                    Hook::Instance
                };
                self.call_shim(hook, &target)
            }

            // =========================================================
            // Superclass Dispatch
            // =========================================================
            Opcode::InvokeSuper | Opcode::InvokeSuperRange => {
                self.staged_receiver()?;
                if let Some(method) =
                    self.vm.get_virtual_method(&target.class_name, &target.name, &target.descriptor)?
                {
                    return self.call_method(method, words);
                }
                self.call_shim(Hook::Instance, &target)
            }

            // =========================================================
            // Direct and Static Calls
            // =========================================================
            Opcode::InvokeDirect | Opcode::InvokeDirectRange => {
                if let Some(method) =
                    self.vm.get_direct_method(&target.class_name, &target.name, &target.descriptor)?
                {
                    return self.call_method(method, words);
                }
                self.staged_receiver()?;
                let hook = if target.name == "<init>" {
                    Hook::Constructor
                } else {
                    Hook::Instance
                };
                self.call_shim(hook, &target)
            }

            Opcode::InvokeStatic | Opcode::InvokeStaticRange => {
                if let Some(method) =
                    self.vm.get_direct_method(&target.class_name, &target.name, &target.descriptor)?
                {
                    return self.call_method(method, words);
                }
                self.call_shim(Hook::Class, &target)
            }

            _ => Err(VmError::Internal(format!(
                "{} dispatched to call handler",
                opcode
            ))),
        }
    }

    /// Copy the invoke operands into the outgoing argument area
    ///
    /// Wide parameters take two positions. Returns the number of words staged.
    fn stage_arguments(
        &mut self,
        insn: &Insn<'_>,
        range: bool,
        has_receiver: bool,
        descriptor: &str,
    ) -> VmResult<usize> {
        let parsed =
            MethodDescriptor::parse(descriptor).map_err(|e| VmError::Internal(e.to_string()))?;

        let (count, registers): (usize, Vec<usize>) = if range {
            let count = insn.aa()?;
            let first = insn.word(2)? as usize;
            (count, (first..first + count).collect())
        } else {
            let packed = ((insn.aa()? as u32) << 16) | insn.word(2)? as u32;
            let count = (packed >> 20) as usize;
            (count, (0..count.min(5)).map(|n| ((packed >> (4 * n)) & 0xF) as usize).collect())
        };

        let expected = parsed.param_words() + has_receiver as usize;
        if expected != count {
            return Err(VmError::Internal(format!(
                "{} argument registers for {} words of {}",
                count, expected, descriptor
            )));
        }

        let frame = self.frame_mut()?;
        let mut position = 0;
        if has_receiver {
            let receiver = frame.object(registers[0])?;
            frame.set_argument_object(0, receiver);
            position = 1;
        }
        for param in &parsed.params {
            let reg = registers[position];
            match param.as_bytes().first() {
                Some(b'J') | Some(b'D') => {
                    let value = frame.long(reg)?;
                    frame.set_argument_long(position, value);
                    position += 2;
                }
                Some(b'L') | Some(b'[') => {
                    let value = frame.object(reg)?;
                    frame.set_argument_object(position, value);
                    position += 1;
                }
                _ => {
                    let value = frame.int(reg)?;
                    frame.set_argument_int(position, value);
                    position += 1;
                }
            }
        }
        Ok(position)
    }

    fn staged_receiver(&self) -> VmResult<ObjectRef> {
        let receiver = self.frame()?.argument(0)?.as_object()?;
        self.non_null(receiver)
    }

    /// Push a frame for a module method with the staged arguments
    pub(crate) fn call_method(&mut self, method: Rc<Method>, words: usize) -> VmResult<OpcodeResult> {
        if !method.has_code() {
            return Err(VmError::NotImplemented(format!(
                "not implemented method = {}",
                method.signature()
            )));
        }
        let args = self.frame()?.arguments(words)?.to_vec();
        if self.vm.enter_method(self.thread, method, &args)? {
            Ok(OpcodeResult::Continue)
        } else {
            Ok(OpcodeResult::Yield)
        }
    }

    fn call_shim(&mut self, hook: Hook, target: &MethodRef) -> VmResult<OpcodeResult> {
        // calls through a module class land on its first host ancestor
        let class_name = self.host_class_of(&target.class_name)?;
        log::trace!("shim {}.{}{}", class_name, target.name, target.descriptor);

        let shim = Rc::clone(&self.vm.shim);
        let mut ctx = ShimContext::new(self.vm, self.thread);
        let (result, kind) = match hook {
            Hook::Instance => (
                shim.instance_method(&mut ctx, &class_name, &target.name, &target.descriptor)?,
                "instance method",
            ),
            Hook::Interface => (
                shim.interface_method(&mut ctx, &class_name, &target.name, &target.descriptor)?,
                "interface method",
            ),
            Hook::Class => (
                shim.class_method(&mut ctx, &class_name, &target.name, &target.descriptor)?,
                "class method",
            ),
            Hook::Constructor => (
                shim.constructor(&mut ctx, &class_name, &target.descriptor)?,
                "constructor",
            ),
        };

        match result {
            HookResult::Done => Ok(OpcodeResult::Continue),
            HookResult::Yield => Ok(OpcodeResult::Yield),
            HookResult::Unhandled => Err(VmError::NotImplemented(format!(
                "not implemented {} = {} - {} - {}",
                kind, class_name, target.name, target.descriptor
            ))),
        }
    }
}
