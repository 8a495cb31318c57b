use crate::field::FieldValue;
use crate::frame::Frame;
use crate::interpreter::{Insn, Interpreter, OpcodeResult};
use crate::shim::ShimContext;
use crate::{VmError, VmResult};
use dexvm_bytecode::{FieldRef, Opcode};
use std::rc::Rc;

/// Value shape selected by the opcode within each field group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Word,
    Wide,
    Object,
    Boolean,
    Byte,
    Char,
    Short,
}

impl Shape {
    /// Shape of the `offset`th opcode of a get or put group
    fn at(offset: u8) -> Self {
        match offset {
            0 => Shape::Word,
            1 => Shape::Wide,
            2 => Shape::Object,
            3 => Shape::Boolean,
            4 => Shape::Byte,
            5 => Shape::Char,
            _ => Shape::Short,
        }
    }

    /// Read register `reg` as a field value, narrowing sub-word types
    fn load(self, frame: &Frame, reg: usize) -> VmResult<FieldValue> {
        let value = match self {
            Shape::Wide => FieldValue::Long(frame.long(reg)?),
            Shape::Object => FieldValue::Object(frame.object(reg)?),
            Shape::Word => FieldValue::Int(frame.int(reg)?),
            Shape::Boolean => FieldValue::Int((frame.int(reg)? != 0) as i32),
            Shape::Byte => FieldValue::Int(frame.int(reg)? as i8 as i32),
            Shape::Char => FieldValue::Int(frame.int(reg)? as u16 as i32),
            Shape::Short => FieldValue::Int(frame.int(reg)? as i16 as i32),
        };
        Ok(value)
    }

    /// Write a field value into register `reg`
    fn store(self, frame: &mut Frame, reg: usize, value: &FieldValue) -> VmResult<()> {
        match self {
            Shape::Wide => frame.set_long(reg, value.as_long()?),
            Shape::Object => frame.set_object(reg, value.as_object()?),
            _ => frame.set_int(reg, value.as_int()?),
        }
    }
}

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_field_ops(
        &mut self,
        insn: &Insn<'_>,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        let code = opcode.to_u8();
        let field = insn.method().pool.field_ref(insn.word(1)? as u32)?.clone();
        match code {
            // =========================================================
            // Instance Fields
            // =========================================================
            0x52..=0x58 => {
                let shape = Shape::at(code - 0x52);
                let value = self.instance_field(insn.b()?, &field)?;
                shape.store(self.frame_mut()?, insn.a()?, &value)?;
            }

            0x59..=0x5F => {
                let shape = Shape::at(code - 0x59);
                let value = shape.load(self.frame()?, insn.a()?)?;
                self.set_instance_field(insn.b()?, &field, value)?;
            }

            // =========================================================
            // Static Fields
            // =========================================================
            0x60..=0x66 => {
                let shape = Shape::at(code - 0x60);
                let value = self.static_field(&field)?;
                shape.store(self.frame_mut()?, insn.aa()?, &value)?;
            }

            _ => {
                let shape = Shape::at(code - 0x67);
                let value = shape.load(self.frame()?, insn.aa()?)?;
                self.set_static_field(&field, value)?;
            }
        }
        Ok(OpcodeResult::Continue)
    }

    fn instance_field(&self, reg: usize, field: &FieldRef) -> VmResult<FieldValue> {
        let obj = self.non_null(self.frame()?.object(reg)?)?;
        obj.as_instance()
            .and_then(|instance| instance.get_field(&field.class_name, &field.name))
            .ok_or_else(|| not_implemented(field))
    }

    fn set_instance_field(&self, reg: usize, field: &FieldRef, value: FieldValue) -> VmResult<()> {
        let obj = self.non_null(self.frame()?.object(reg)?)?;
        let stored = obj
            .as_instance()
            .map_or(false, |instance| instance.set_field(&field.class_name, &field.name, value));
        if stored {
            Ok(())
        } else {
            Err(not_implemented(field))
        }
    }

    fn static_field(&mut self, field: &FieldRef) -> VmResult<FieldValue> {
        if let Some((class, index)) = self.vm.get_static_field(&field.class_name, &field.name)? {
            return Ok(self.vm.registry.class(class).static_fields[index].value.clone());
        }
        let class_name = self.host_class_of(&field.class_name)?;
        let shim = Rc::clone(&self.vm.shim);
        let mut ctx = ShimContext::new(self.vm, self.thread);
        shim.class_field_get(&mut ctx, &class_name, &field.name, &field.type_desc)?
            .ok_or_else(|| not_implemented(field))
    }

    fn set_static_field(&mut self, field: &FieldRef, value: FieldValue) -> VmResult<()> {
        if let Some((class, index)) = self.vm.get_static_field(&field.class_name, &field.name)? {
            self.vm.registry.class_mut(class).static_fields[index].value = value;
            return Ok(());
        }
        let class_name = self.host_class_of(&field.class_name)?;
        let shim = Rc::clone(&self.vm.shim);
        let mut ctx = ShimContext::new(self.vm, self.thread);
        if shim.class_field_set(&mut ctx, &class_name, &field.name, &field.type_desc, value)? {
            Ok(())
        } else {
            Err(not_implemented(field))
        }
    }

    /// Host class answering for members referenced through `class_name`
    pub(in crate::interpreter) fn host_class_of(&mut self, class_name: &str) -> VmResult<String> {
        if self.vm.registry.contains(class_name) {
            self.vm.first_host_ancestor(class_name)
        } else {
            Ok(class_name.to_string())
        }
    }
}

fn not_implemented(field: &FieldRef) -> VmError {
    VmError::NotImplemented(format!(
        "not implemented field = {} - {}",
        field.class_name, field.name
    ))
}
