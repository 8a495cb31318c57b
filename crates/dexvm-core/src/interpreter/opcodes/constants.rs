use crate::interpreter::{Insn, Interpreter, OpcodeResult};
use crate::{VmError, VmResult};
use dexvm_bytecode::Opcode;

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_constant_ops(
        &mut self,
        insn: &Insn<'_>,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        match opcode {
            // =========================================================
            // 32-bit Literals
            // =========================================================
            Opcode::Const4 => {
                let literal = (insn.word(0)? as i16 >> 12) as i32;
                self.frame_mut()?.set_int(insn.a()?, literal)?;
            }

            Opcode::Const16 => {
                let literal = insn.s16(1)?;
                self.frame_mut()?.set_int(insn.aa()?, literal)?;
            }

            Opcode::Const => {
                let literal = insn.u32_at(1)? as i32;
                self.frame_mut()?.set_int(insn.aa()?, literal)?;
            }

            Opcode::ConstHigh16 => {
                let literal = (insn.word(1)? as i32) << 16;
                self.frame_mut()?.set_int(insn.aa()?, literal)?;
            }

            // =========================================================
            // 64-bit Literals
            // =========================================================
            Opcode::ConstWide16 => {
                let literal = insn.s16(1)? as i64;
                self.frame_mut()?.set_long(insn.aa()?, literal)?;
            }

            Opcode::ConstWide32 => {
                let literal = insn.u32_at(1)? as i32 as i64;
                self.frame_mut()?.set_long(insn.aa()?, literal)?;
            }

            Opcode::ConstWide => {
                let low = insn.u32_at(1)? as u64;
                let high = insn.u32_at(3)? as u64;
                self.frame_mut()?.set_long(insn.aa()?, (low | (high << 32)) as i64)?;
            }

            Opcode::ConstWideHigh16 => {
                let literal = (insn.word(1)? as i64) << 48;
                self.frame_mut()?.set_long(insn.aa()?, literal)?;
            }

            // =========================================================
            // Table Constants
            // =========================================================
            Opcode::ConstString | Opcode::ConstStringJumbo => {
                let index = if opcode == Opcode::ConstString {
                    insn.word(1)? as u32
                } else {
                    insn.u32_at(1)?
                };
                let string = insn.method().pool.string_object(index)?;
                self.frame_mut()?.set_object(insn.aa()?, Some(string))?;
            }

            Opcode::ConstClass => {
                let descriptor = insn.method().pool.type_desc(insn.word(1)? as u32)?.to_string();
                let class = self.vm.class_object(self.thread, &descriptor)?;
                self.frame_mut()?.set_object(insn.aa()?, Some(class))?;
            }

            _ => {
                return Err(VmError::Internal(format!(
                    "{} dispatched to constant handler",
                    opcode
                )))
            }
        }
        Ok(OpcodeResult::Continue)
    }
}
