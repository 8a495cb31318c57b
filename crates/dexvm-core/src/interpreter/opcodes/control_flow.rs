use crate::frame::Frame;
use crate::interpreter::{Insn, Interpreter, OpcodeResult};
use crate::value::Register;
use crate::{VmError, VmResult};
use dexvm_bytecode::Opcode;

const PACKED_SWITCH_IDENT: u16 = 0x0100;
const SPARSE_SWITCH_IDENT: u16 = 0x0200;

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_control_flow_ops(
        &mut self,
        insn: &Insn<'_>,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        let pc = insn.pc();
        match opcode {
            // =========================================================
            // Unconditional Jumps
            // =========================================================
            Opcode::Goto => self.jump(pc, insn.aa()? as u8 as i8 as i32),
            Opcode::Goto16 => self.jump(pc, insn.s16(1)?),
            Opcode::Goto32 => self.jump(pc, insn.u32_at(1)? as i32),

            // =========================================================
            // Switches
            // =========================================================
            Opcode::PackedSwitch => {
                let value = self.frame()?.int(insn.aa()?)?;
                let payload = payload_address(pc, insn.u32_at(1)? as i32)?;
                let code = &insn.method().code;
                check_ident(code.word(payload)?, PACKED_SWITCH_IDENT, "packed-switch")?;
                let size = code.word(payload + 1)? as i64;
                let first_key = read_i32(insn, payload + 2)?;
                let slot = value as i64 - first_key as i64;
                if (0..size).contains(&slot) {
                    let offset = read_i32(insn, payload + 4 + 2 * slot as usize)?;
                    return self.jump(pc, offset);
                }
                Ok(OpcodeResult::Continue)
            }

            Opcode::SparseSwitch => {
                let value = self.frame()?.int(insn.aa()?)?;
                let payload = payload_address(pc, insn.u32_at(1)? as i32)?;
                let code = &insn.method().code;
                check_ident(code.word(payload)?, SPARSE_SWITCH_IDENT, "sparse-switch")?;
                let size = code.word(payload + 1)? as usize;
                let keys = payload + 2;
                let targets = keys + 2 * size;
                for i in 0..size {
                    if read_i32(insn, keys + 2 * i)? == value {
                        let offset = read_i32(insn, targets + 2 * i)?;
                        return self.jump(pc, offset);
                    }
                }
                Ok(OpcodeResult::Continue)
            }

            // =========================================================
            // Two-register Branches
            // =========================================================
            Opcode::IfEq | Opcode::IfNe => {
                let equal = registers_equal(self.frame()?, insn.a()?, insn.b()?)?;
                if equal == (opcode == Opcode::IfEq) {
                    return self.jump(pc, insn.s16(1)?);
                }
                Ok(OpcodeResult::Continue)
            }

            Opcode::IfLt | Opcode::IfGe | Opcode::IfGt | Opcode::IfLe => {
                let frame = self.frame()?;
                let a = frame.int(insn.a()?)?;
                let b = frame.int(insn.b()?)?;
                let taken = match opcode {
                    Opcode::IfLt => a < b,
                    Opcode::IfGe => a >= b,
                    Opcode::IfGt => a > b,
                    _ => a <= b,
                };
                if taken {
                    return self.jump(pc, insn.s16(1)?);
                }
                Ok(OpcodeResult::Continue)
            }

            // =========================================================
            // Zero-test Branches
            // =========================================================
            Opcode::IfEqz | Opcode::IfNez => {
                let zero = match self.frame()?.register(insn.aa()?)? {
                    Register::Int(v) => *v == 0,
                    Register::Object(obj) => obj.is_none(),
                };
                if zero == (opcode == Opcode::IfEqz) {
                    return self.jump(pc, insn.s16(1)?);
                }
                Ok(OpcodeResult::Continue)
            }

            Opcode::IfLtz | Opcode::IfGez | Opcode::IfGtz | Opcode::IfLez => {
                let a = self.frame()?.int(insn.aa()?)?;
                let taken = match opcode {
                    Opcode::IfLtz => a < 0,
                    Opcode::IfGez => a >= 0,
                    Opcode::IfGtz => a > 0,
                    _ => a <= 0,
                };
                if taken {
                    return self.jump(pc, insn.s16(1)?);
                }
                Ok(OpcodeResult::Continue)
            }

            _ => Err(VmError::Internal(format!(
                "{} dispatched to control flow handler",
                opcode
            ))),
        }
    }
}

/// `if-eq` equality over tagged registers
///
/// Two references compare by identity. A reference and an int compare with
/// the int standing for null (zero) or for "some non-null object" (non-zero).
fn registers_equal(frame: &Frame, a: usize, b: usize) -> VmResult<bool> {
    let equal = match (frame.register(a)?, frame.register(b)?) {
        (Register::Int(x), Register::Int(y)) => x == y,
        (Register::Object(x), Register::Object(y)) => match (x, y) {
            (Some(x), Some(y)) => x.ptr_eq(y),
            (None, None) => true,
            _ => false,
        },
        (Register::Object(obj), Register::Int(v)) | (Register::Int(v), Register::Object(obj)) => {
            if *v == 0 {
                obj.is_none()
            } else {
                obj.is_some()
            }
        }
    };
    Ok(equal)
}

fn payload_address(pc: usize, offset: i32) -> VmResult<usize> {
    let address = pc as i64 + offset as i64;
    if address < 0 {
        return Err(VmError::Internal(format!("payload before code start from {:04x}", pc)));
    }
    Ok(address as usize)
}

fn check_ident(found: u16, expected: u16, what: &str) -> VmResult<()> {
    if found != expected {
        return Err(VmError::Internal(format!(
            "illegal {} payload ident: expected {:#06x}, found {:#06x}",
            what, expected, found
        )));
    }
    Ok(())
}

fn read_i32(insn: &Insn<'_>, address: usize) -> VmResult<i32> {
    let code = &insn.method().code;
    let low = code.word(address)? as u32;
    let high = code.word(address + 1)? as u32;
    Ok((low | (high << 16)) as i32)
}
