use crate::interpreter::{Insn, Interpreter, OpcodeResult};
use crate::value::{int_to_float, long_to_double};
use crate::{VmError, VmResult};
use dexvm_bytecode::Opcode;
use std::cmp::Ordering;

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_comparison_ops(
        &mut self,
        insn: &Insn<'_>,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        let dst = insn.aa()?;
        let (b, c) = (insn.bb()?, insn.cc()?);
        let frame = self.frame_mut()?;

        let ordering = match opcode {
            Opcode::CmplFloat | Opcode::CmpgFloat => {
                let x = int_to_float(frame.int(b)?);
                let y = int_to_float(frame.int(c)?);
                x.partial_cmp(&y)
            }
            Opcode::CmplDouble | Opcode::CmpgDouble => {
                let x = long_to_double(frame.long(b)?);
                let y = long_to_double(frame.long(c)?);
                x.partial_cmp(&y)
            }
            Opcode::CmpLong => Some(frame.long(b)?.cmp(&frame.long(c)?)),
            _ => {
                return Err(VmError::Internal(format!(
                    "{} dispatched to comparison handler",
                    opcode
                )))
            }
        };

        // unordered operands bias towards the instruction's own sign
        let result = match ordering {
            Some(Ordering::Less) => -1,
            Some(Ordering::Equal) => 0,
            Some(Ordering::Greater) => 1,
            None if matches!(opcode, Opcode::CmplFloat | Opcode::CmplDouble) => -1,
            None => 1,
        };
        frame.set_int(dst, result)?;
        Ok(OpcodeResult::Continue)
    }
}
