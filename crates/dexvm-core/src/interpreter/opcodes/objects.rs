use crate::interpreter::{Insn, Interpreter, OpcodeResult};
use crate::object::{HostObject, Object, ObjectRef};
use crate::{VmError, VmResult};
use dexvm_bytecode::descriptor::class_name;
use dexvm_bytecode::Opcode;

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_object_ops(
        &mut self,
        insn: &Insn<'_>,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        match opcode {
            // =========================================================
            // Monitors
            // =========================================================
            Opcode::MonitorEnter => {
                let monitor = self.frame()?.object(insn.aa()?)?;
                let monitor = self.non_null(monitor)?;
                match self.vm.acquire_lock(self.thread, &monitor) {
                    Ok(()) => Ok(OpcodeResult::Continue),
                    Err(reason) => {
                        log::trace!("{:?} blocked on {:?}: {:?}", self.thread, monitor, reason);
                        Ok(OpcodeResult::Yield)
                    }
                }
            }

            Opcode::MonitorExit => {
                let monitor = self.frame()?.object(insn.aa()?)?;
                let monitor = self.non_null(monitor)?;
                self.vm.release_lock(self.thread, &monitor)?;
                Ok(OpcodeResult::Continue)
            }

            // =========================================================
            // Type Checks
            // =========================================================
            Opcode::CheckCast => {
                let target = insn.method().pool.type_desc(insn.word(1)? as u32)?.to_string();
                if let Some(obj) = self.frame()?.object(insn.aa()?)? {
                    if !self.vm.is_instance_of(&obj, &target)? {
                        let message = format!(
                            "{} cannot be cast to {}",
                            dotted(&obj.type_name()),
                            dotted(class_name(&target))
                        );
                        return Err(self.throw("java/lang/ClassCastException", Some(&message)));
                    }
                }
                Ok(OpcodeResult::Continue)
            }

            Opcode::InstanceOf => {
                let target = insn.method().pool.type_desc(insn.word(1)? as u32)?.to_string();
                let result = match self.frame()?.object(insn.b()?)? {
                    Some(obj) => self.vm.is_instance_of(&obj, &target)?,
                    None => false,
                };
                self.frame_mut()?.set_int(insn.a()?, result as i32)?;
                Ok(OpcodeResult::Continue)
            }

            // =========================================================
            // Allocation
            // =========================================================
            Opcode::NewInstance => {
                let descriptor = insn.method().pool.type_desc(insn.word(1)? as u32)?.to_string();
                let name = class_name(&descriptor);
                let obj = match self.vm.load_class(name)? {
                    Some(id) => self.vm.new_instance(id)?,
                    // constructed later by the shim's <init> hook
                    None => ObjectRef::new(Object::host(HostObject::Uninitialized(name.to_string()))),
                };
                self.frame_mut()?.set_object(insn.aa()?, Some(obj))?;
                Ok(OpcodeResult::Continue)
            }

            _ => Err(VmError::Internal(format!(
                "{} dispatched to object handler",
                opcode
            ))),
        }
    }
}

/// `java/lang/String` to `java.lang.String`
pub(crate) fn dotted(name: &str) -> String {
    name.replace('/', ".")
}
