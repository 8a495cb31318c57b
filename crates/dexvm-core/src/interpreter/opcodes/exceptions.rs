use crate::interpreter::{Insn, Interpreter, OpcodeResult};
use crate::{VmError, VmResult};
use dexvm_bytecode::Opcode;

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_exception_ops(
        &mut self,
        insn: &Insn<'_>,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        match opcode {
            Opcode::Throw => {
                let exception = self.frame()?.object(insn.aa()?)?;
                let exception = self.non_null(exception)?;
                log::trace!("throw {:?}", exception);
                Err(VmError::Throw(exception))
            }
            _ => Err(VmError::Internal(format!(
                "{} dispatched to exception handler",
                opcode
            ))),
        }
    }
}
