use crate::interpreter::{Insn, Interpreter, OpcodeResult};
use crate::{VmError, VmResult};
use dexvm_bytecode::Opcode;

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_move_ops(
        &mut self,
        insn: &Insn<'_>,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        let frame = self.frame_mut()?;
        match opcode {
            Opcode::Nop => {}

            // =========================================================
            // Register Moves
            // =========================================================
            Opcode::Move | Opcode::MoveFrom16 | Opcode::Move16 => {
                let (dst, src) = move_operands(insn, opcode)?;
                let value = frame.int(src)?;
                frame.set_int(dst, value)?;
            }

            Opcode::MoveWide | Opcode::MoveWideFrom16 | Opcode::MoveWide16 => {
                let (dst, src) = move_operands(insn, opcode)?;
                // source and destination pairs may overlap
                let value = frame.long(src)?;
                frame.set_long(dst, value)?;
            }

            Opcode::MoveObject | Opcode::MoveObjectFrom16 | Opcode::MoveObject16 => {
                let (dst, src) = move_operands(insn, opcode)?;
                let value = frame.object(src)?;
                frame.set_object(dst, value)?;
            }

            // =========================================================
            // Results and Exceptions
            // =========================================================
            Opcode::MoveResult => {
                let value = frame.single_return;
                frame.set_int(insn.aa()?, value)?;
            }

            Opcode::MoveResultWide => {
                let value = frame.double_return;
                frame.set_long(insn.aa()?, value)?;
            }

            Opcode::MoveResultObject => {
                let value = frame.object_return.take();
                frame.set_object(insn.aa()?, value)?;
            }

            Opcode::MoveException => {
                let value = frame.throwable_return.take();
                frame.set_object(insn.aa()?, value)?;
            }

            _ => {
                return Err(VmError::Internal(format!(
                    "{} dispatched to move handler",
                    opcode
                )))
            }
        }
        Ok(OpcodeResult::Continue)
    }
}

fn move_operands(insn: &Insn<'_>, opcode: Opcode) -> VmResult<(usize, usize)> {
    match opcode {
        Opcode::Move | Opcode::MoveWide | Opcode::MoveObject => Ok((insn.a()?, insn.b()?)),
        Opcode::MoveFrom16 | Opcode::MoveWideFrom16 | Opcode::MoveObjectFrom16 => {
            Ok((insn.aa()?, insn.word(1)? as usize))
        }
        _ => Ok((insn.word(1)? as usize, insn.word(2)? as usize)),
    }
}
