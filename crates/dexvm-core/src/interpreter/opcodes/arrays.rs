use crate::interpreter::{Insn, Interpreter, OpcodeResult};
use crate::object::{ArrayData, Object, ObjectRef};
use crate::{VmError, VmResult};
use dexvm_bytecode::Opcode;
use std::cell::RefCell;

const ARRAY_DATA_IDENT: u16 = 0x0300;

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_array_ops(
        &mut self,
        insn: &Insn<'_>,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        match opcode {
            // =========================================================
            // Length and Allocation
            // =========================================================
            Opcode::ArrayLength => {
                let array = self.frame()?.object(insn.b()?)?;
                let array = self.non_null(array)?;
                let len = array_cell(&array)?.borrow().len();
                self.frame_mut()?.set_int(insn.a()?, len as i32)?;
            }

            Opcode::NewArray => {
                let size = self.frame()?.int(insn.b()?)?;
                let descriptor = insn.method().pool.type_desc(insn.word(1)? as u32)?.to_string();
                let array = self.allocate_array(&descriptor, size)?;
                self.frame_mut()?.set_object(insn.a()?, Some(array))?;
            }

            Opcode::FilledNewArray | Opcode::FilledNewArrayRange => {
                let descriptor = insn.method().pool.type_desc(insn.word(1)? as u32)?.to_string();
                let registers = filled_registers(insn, opcode == Opcode::FilledNewArrayRange)?;
                let array = self.allocate_array(&descriptor, registers.len() as i32)?;
                {
                    let frame = self.frame()?;
                    let mut data = array_cell(&array)?.borrow_mut();
                    let reference = data.element_width().is_none();
                    for (index, &reg) in registers.iter().enumerate() {
                        if reference {
                            data.set_object(index, frame.object(reg)?)?;
                        } else {
                            data.set_word(index, frame.int(reg)?)?;
                        }
                    }
                }
                self.frame_mut()?.object_return = Some(array);
            }

            Opcode::FillArrayData => {
                let array = self.frame()?.object(insn.aa()?)?;
                let array = self.non_null(array)?;
                let payload = insn.pc() as i64 + insn.u32_at(1)? as i32 as i64;
                self.fill_array(insn, &array, payload)?;
            }

            // =========================================================
            // Element Access
            // =========================================================
            Opcode::Aget
            | Opcode::AgetBoolean
            | Opcode::AgetByte
            | Opcode::AgetChar
            | Opcode::AgetShort => {
                let (array, index) = self.element(insn)?;
                let value = array_cell(&array)?.borrow().get_word(index)?;
                self.frame_mut()?.set_int(insn.aa()?, value)?;
            }

            Opcode::AgetWide => {
                let (array, index) = self.element(insn)?;
                let value = array_cell(&array)?.borrow().get_wide(index)?;
                self.frame_mut()?.set_long(insn.aa()?, value)?;
            }

            Opcode::AgetObject => {
                let (array, index) = self.element(insn)?;
                let value = array_cell(&array)?.borrow().get_object(index)?;
                self.frame_mut()?.set_object(insn.aa()?, value)?;
            }

            Opcode::Aput
            | Opcode::AputBoolean
            | Opcode::AputByte
            | Opcode::AputChar
            | Opcode::AputShort => {
                let (array, index) = self.element(insn)?;
                let value = self.frame()?.int(insn.aa()?)?;
                array_cell(&array)?.borrow_mut().set_word(index, value)?;
            }

            Opcode::AputWide => {
                let (array, index) = self.element(insn)?;
                let value = self.frame()?.long(insn.aa()?)?;
                array_cell(&array)?.borrow_mut().set_wide(index, value)?;
            }

            Opcode::AputObject => {
                let (array, index) = self.element(insn)?;
                let value = self.frame()?.object(insn.aa()?)?;
                array_cell(&array)?.borrow_mut().set_object(index, value)?;
            }

            _ => {
                return Err(VmError::Internal(format!(
                    "{} dispatched to array handler",
                    opcode
                )))
            }
        }
        Ok(OpcodeResult::Continue)
    }

    /// Allocate a one-dimensional array of type `descriptor`
    ///
    /// Element types the allocator cannot represent go to the shim's
    /// `new_object_array` hook.
    pub(crate) fn allocate_array(&mut self, descriptor: &str, size: i32) -> VmResult<ObjectRef> {
        if size < 0 {
            return Err(self.throw("java/lang/NegativeArraySizeException", Some(&size.to_string())));
        }
        let component = descriptor.strip_prefix('[').ok_or_else(|| {
            VmError::Internal(format!("new-array with non-array type {}", descriptor))
        })?;
        if let Some(data) = ArrayData::new(component, size as usize) {
            return Ok(ObjectRef::new(Object::array(data)));
        }
        let shim = std::rc::Rc::clone(&self.vm.shim);
        match shim.new_object_array(component, size as usize) {
            Some(array) => Ok(array),
            None => Err(VmError::NotImplemented(format!(
                "not implemented array = {}",
                descriptor
            ))),
        }
    }

    /// Array and checked index of an `aget`/`aput` instruction
    fn element(&self, insn: &Insn<'_>) -> VmResult<(ObjectRef, usize)> {
        let frame = self.frame()?;
        let array = self.non_null(frame.object(insn.bb()?)?)?;
        let index = frame.int(insn.cc()?)?;
        let len = array_cell(&array)?.borrow().len();
        if index < 0 || index as usize >= len {
            let message = format!("length={}; index={}", len, index);
            return Err(self.throw("java/lang/ArrayIndexOutOfBoundsException", Some(&message)));
        }
        Ok((array, index as usize))
    }

    fn fill_array(&self, insn: &Insn<'_>, array: &ObjectRef, payload: i64) -> VmResult<()> {
        if payload < 0 {
            return Err(VmError::Internal(format!(
                "fill-array-data payload before code start from {:04x}",
                insn.pc()
            )));
        }
        let payload = payload as usize;
        let code = &insn.method().code;
        let ident = code.word(payload)?;
        if ident != ARRAY_DATA_IDENT {
            return Err(VmError::Internal(format!(
                "illegal fill-array-data payload ident: expected {:#06x}, found {:#06x}",
                ARRAY_DATA_IDENT, ident
            )));
        }
        let width = code.word(payload + 1)? as usize;
        let count = (code.word(payload + 2)? as u32 | ((code.word(payload + 3)? as u32) << 16)) as usize;

        let mut data = array_cell(array)?.borrow_mut();
        if data.element_width() != Some(width) {
            return Err(VmError::Internal(format!(
                "fill-array-data element width {} does not match {}",
                width,
                data.descriptor()
            )));
        }
        if count > data.len() {
            let message = format!("length={}; index={}", data.len(), count);
            drop(data);
            return Err(self.throw("java/lang/ArrayIndexOutOfBoundsException", Some(&message)));
        }

        let byte_len = width * count;
        let mut bytes = Vec::with_capacity(byte_len + 1);
        for unit in 0..(byte_len + 1) / 2 {
            bytes.extend_from_slice(&code.word(payload + 4 + unit)?.to_le_bytes());
        }
        bytes.truncate(byte_len);
        data.fill(&bytes);
        Ok(())
    }
}

/// Element storage of an array object
fn array_cell(obj: &ObjectRef) -> VmResult<&RefCell<ArrayData>> {
    obj.as_array()
        .ok_or_else(|| VmError::TypeError(format!("{:?} is not an array", obj)))
}

/// Element registers of `filled-new-array` and its range form
fn filled_registers(insn: &Insn<'_>, range: bool) -> VmResult<Vec<usize>> {
    if range {
        let count = insn.aa()?;
        let first = insn.word(2)? as usize;
        return Ok((first..first + count).collect());
    }
    let packed = ((insn.aa()? as u32) << 16) | insn.word(2)? as u32;
    let count = ((packed >> 20) as usize).min(5);
    Ok((0..count).map(|n| ((packed >> (4 * n)) & 0xF) as usize).collect())
}
