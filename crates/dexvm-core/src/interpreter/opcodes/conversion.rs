use crate::interpreter::{Insn, Interpreter, OpcodeResult};
use crate::value::{double_to_long, float_to_int, int_to_float, long_to_double};
use crate::{VmError, VmResult};
use dexvm_bytecode::Opcode;

impl<'a> Interpreter<'a> {
    /// Primitive conversions, `vA <- op vB`
    ///
    /// Float-to-integer conversions saturate and map NaN to zero.
    pub(in crate::interpreter) fn exec_conversion_ops(
        &mut self,
        insn: &Insn<'_>,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        let (dst, src) = (insn.a()?, insn.b()?);
        let frame = self.frame_mut()?;
        match opcode {
            // =========================================================
            // From int
            // =========================================================
            Opcode::IntToLong => {
                let v = frame.int(src)?;
                frame.set_long(dst, v as i64)?;
            }
            Opcode::IntToFloat => {
                let v = frame.int(src)?;
                frame.set_int(dst, float_to_int(v as f32))?;
            }
            Opcode::IntToDouble => {
                let v = frame.int(src)?;
                frame.set_long(dst, double_to_long(v as f64))?;
            }
            Opcode::IntToByte => {
                let v = frame.int(src)?;
                frame.set_int(dst, v as i8 as i32)?;
            }
            Opcode::IntToChar => {
                let v = frame.int(src)?;
                frame.set_int(dst, v as u16 as i32)?;
            }
            Opcode::IntToShort => {
                let v = frame.int(src)?;
                frame.set_int(dst, v as i16 as i32)?;
            }

            // =========================================================
            // From long
            // =========================================================
            Opcode::LongToInt => {
                let v = frame.long(src)?;
                frame.set_int(dst, v as i32)?;
            }
            Opcode::LongToFloat => {
                let v = frame.long(src)?;
                frame.set_int(dst, float_to_int(v as f32))?;
            }
            Opcode::LongToDouble => {
                let v = frame.long(src)?;
                frame.set_long(dst, double_to_long(v as f64))?;
            }

            // =========================================================
            // From float
            // =========================================================
            Opcode::FloatToInt => {
                let v = int_to_float(frame.int(src)?);
                frame.set_int(dst, v as i32)?;
            }
            Opcode::FloatToLong => {
                let v = int_to_float(frame.int(src)?);
                frame.set_long(dst, v as i64)?;
            }
            Opcode::FloatToDouble => {
                let v = int_to_float(frame.int(src)?);
                frame.set_long(dst, double_to_long(v as f64))?;
            }

            // =========================================================
            // From double
            // =========================================================
            Opcode::DoubleToInt => {
                let v = long_to_double(frame.long(src)?);
                frame.set_int(dst, v as i32)?;
            }
            Opcode::DoubleToLong => {
                let v = long_to_double(frame.long(src)?);
                frame.set_long(dst, v as i64)?;
            }
            Opcode::DoubleToFloat => {
                let v = long_to_double(frame.long(src)?);
                frame.set_int(dst, float_to_int(v as f32))?;
            }

            _ => {
                return Err(VmError::Internal(format!(
                    "{} dispatched to conversion handler",
                    opcode
                )))
            }
        }
        Ok(OpcodeResult::Continue)
    }
}
