use crate::interpreter::{Insn, Interpreter, OpcodeResult};
use crate::value::{double_to_long, float_to_int, int_to_float, long_to_double};
use crate::{VmError, VmResult};
use dexvm_bytecode::Opcode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Rsub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

use BinOp::*;

/// Operation order within each type group of `binop` and `binop/2addr`
const REGISTER_OPS: [BinOp; 11] = [Add, Sub, Mul, Div, Rem, And, Or, Xor, Shl, Shr, Ushr];

/// Operation order of the `binop/lit16` and `binop/lit8` groups
const LITERAL_OPS: [BinOp; 11] = [Add, Rsub, Mul, Div, Rem, And, Or, Xor, Shl, Shr, Ushr];

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_arithmetic_ops(
        &mut self,
        insn: &Insn<'_>,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        let code = opcode.to_u8();
        match code {
            // =========================================================
            // Unary Operations
            // =========================================================
            0x7B..=0x80 => {
                let (dst, src) = (insn.a()?, insn.b()?);
                let frame = self.frame_mut()?;
                match opcode {
                    Opcode::NegInt => {
                        let v = frame.int(src)?;
                        frame.set_int(dst, v.wrapping_neg())?;
                    }
                    Opcode::NotInt => {
                        let v = frame.int(src)?;
                        frame.set_int(dst, !v)?;
                    }
                    Opcode::NegLong => {
                        let v = frame.long(src)?;
                        frame.set_long(dst, v.wrapping_neg())?;
                    }
                    Opcode::NotLong => {
                        let v = frame.long(src)?;
                        frame.set_long(dst, !v)?;
                    }
                    Opcode::NegFloat => {
                        let v = int_to_float(frame.int(src)?);
                        frame.set_int(dst, float_to_int(-v))?;
                    }
                    _ => {
                        let v = long_to_double(frame.long(src)?);
                        frame.set_long(dst, double_to_long(-v))?;
                    }
                }
            }

            // =========================================================
            // Register Operands
            // =========================================================
            0x90..=0xCF => {
                let (index, dst, x, y) = if code >= 0xB0 {
                    let (a, b) = (insn.a()?, insn.b()?);
                    ((code - 0xB0) as usize, a, a, b)
                } else {
                    ((code - 0x90) as usize, insn.aa()?, insn.bb()?, insn.cc()?)
                };
                match index {
                    0..=10 => {
                        let frame = self.frame()?;
                        let (lhs, rhs) = (frame.int(x)?, frame.int(y)?);
                        let value = self.int_op(REGISTER_OPS[index], lhs, rhs)?;
                        self.frame_mut()?.set_int(dst, value)?;
                    }
                    11..=21 => {
                        let op = REGISTER_OPS[index - 11];
                        let frame = self.frame()?;
                        let lhs = frame.long(x)?;
                        // shift distances are a single int register
                        let rhs = if matches!(op, Shl | Shr | Ushr) {
                            frame.int(y)? as i64
                        } else {
                            frame.long(y)?
                        };
                        let value = self.long_op(op, lhs, rhs)?;
                        self.frame_mut()?.set_long(dst, value)?;
                    }
                    22..=26 => {
                        let frame = self.frame_mut()?;
                        let lhs = int_to_float(frame.int(x)?);
                        let rhs = int_to_float(frame.int(y)?);
                        let value = float_op(REGISTER_OPS[index - 22], lhs, rhs);
                        frame.set_int(dst, float_to_int(value))?;
                    }
                    _ => {
                        let frame = self.frame_mut()?;
                        let lhs = long_to_double(frame.long(x)?);
                        let rhs = long_to_double(frame.long(y)?);
                        let value = double_op(REGISTER_OPS[index - 27], lhs, rhs);
                        frame.set_long(dst, double_to_long(value))?;
                    }
                }
            }

            // =========================================================
            // Literal Operands
            // =========================================================
            0xD0..=0xE2 => {
                let (op, dst, src, literal) = if code <= 0xD7 {
                    (LITERAL_OPS[(code - 0xD0) as usize], insn.a()?, insn.b()?, insn.s16(1)?)
                } else {
                    let literal = insn.cc()? as u8 as i8 as i32;
                    (LITERAL_OPS[(code - 0xD8) as usize], insn.aa()?, insn.bb()?, literal)
                };
                let lhs = self.frame()?.int(src)?;
                let value = self.int_op(op, lhs, literal)?;
                self.frame_mut()?.set_int(dst, value)?;
            }

            _ => {
                return Err(VmError::Internal(format!(
                    "{} dispatched to arithmetic handler",
                    opcode
                )))
            }
        }
        Ok(OpcodeResult::Continue)
    }

    fn int_op(&self, op: BinOp, x: i32, y: i32) -> VmResult<i32> {
        if y == 0 && matches!(op, Div | Rem) {
            return Err(self.throw("java/lang/ArithmeticException", Some("/ by zero")));
        }
        let value = match op {
            Add => x.wrapping_add(y),
            Sub => x.wrapping_sub(y),
            Rsub => y.wrapping_sub(x),
            Mul => x.wrapping_mul(y),
            Div => x.wrapping_div(y),
            Rem => x.wrapping_rem(y),
            And => x & y,
            Or => x | y,
            Xor => x ^ y,
            Shl => x << (y & 0x1F),
            Shr => x >> (y & 0x1F),
            Ushr => ((x as u32) >> (y & 0x1F)) as i32,
        };
        Ok(value)
    }

    fn long_op(&self, op: BinOp, x: i64, y: i64) -> VmResult<i64> {
        if y == 0 && matches!(op, Div | Rem) {
            return Err(self.throw("java/lang/ArithmeticException", Some("/ by zero")));
        }
        let value = match op {
            Add => x.wrapping_add(y),
            Sub => x.wrapping_sub(y),
            Rsub => y.wrapping_sub(x),
            Mul => x.wrapping_mul(y),
            Div => x.wrapping_div(y),
            Rem => x.wrapping_rem(y),
            And => x & y,
            Or => x | y,
            Xor => x ^ y,
            Shl => x << (y & 0x3F),
            Shr => x >> (y & 0x3F),
            Ushr => ((x as u64) >> (y & 0x3F)) as i64,
        };
        Ok(value)
    }
}

fn float_op(op: BinOp, x: f32, y: f32) -> f32 {
    match op {
        Add => x + y,
        Sub => x - y,
        Mul => x * y,
        Div => x / y,
        _ => x % y,
    }
}

fn double_op(op: BinOp, x: f64, y: f64) -> f64 {
    match op {
        Add => x + y,
        Sub => x - y,
        Mul => x * y,
        Div => x / y,
        _ => x % y,
    }
}
