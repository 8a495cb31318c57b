//! Runtime class and method metadata

use crate::field::{Field, FieldValue};
use crate::object::ObjectRef;
use crate::{VmError, VmResult};
use dexvm_bytecode::dex::{ACC_STATIC, ACC_SYNCHRONIZED};
use dexvm_bytecode::{ClassDef, DexFile, EncodedMethod, EncodedValue, FieldRef, HandlerGroup, MethodRef, TryItem};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Index of a class in the registry arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub usize);

impl ClassId {
    /// Arena index
    pub fn index(self) -> usize {
        self.0
    }
}

/// Tables of one module shared by all of its methods
pub struct ModulePool {
    /// String table
    pub strings: Vec<String>,
    /// Type table, descriptor form
    pub types: Vec<String>,
    /// Field reference table
    pub field_ids: Vec<FieldRef>,
    /// Method reference table
    pub method_ids: Vec<MethodRef>,
    /// String objects created by `const-string`, one per table entry
    interned: RefCell<Vec<Option<ObjectRef>>>,
}

impl ModulePool {
    /// Take the constant tables of a parsed module
    pub fn from_dex(dex: &DexFile) -> Self {
        Self {
            strings: dex.strings.clone(),
            types: dex.types.clone(),
            field_ids: dex.field_ids.clone(),
            method_ids: dex.method_ids.clone(),
            interned: RefCell::new(vec![None; dex.strings.len()]),
        }
    }

    fn out_of_range(table: &str, index: u32) -> VmError {
        VmError::Internal(format!("{} index {} out of range", table, index))
    }

    /// String table entry
    pub fn string(&self, index: u32) -> VmResult<&str> {
        self.strings
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| Self::out_of_range("string", index))
    }

    /// Type table entry
    pub fn type_desc(&self, index: u32) -> VmResult<&str> {
        self.types
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| Self::out_of_range("type", index))
    }

    /// Field reference table entry
    pub fn field_ref(&self, index: u32) -> VmResult<&FieldRef> {
        self.field_ids
            .get(index as usize)
            .ok_or_else(|| Self::out_of_range("field", index))
    }

    /// Method reference table entry
    pub fn method_ref(&self, index: u32) -> VmResult<&MethodRef> {
        self.method_ids
            .get(index as usize)
            .ok_or_else(|| Self::out_of_range("method", index))
    }

    /// The string object for a table entry, same object on every call
    pub fn string_object(&self, index: u32) -> VmResult<ObjectRef> {
        let text = self.string(index)?;
        let mut interned = self.interned.borrow_mut();
        let slot = interned
            .get_mut(index as usize)
            .ok_or_else(|| Self::out_of_range("string", index))?;
        Ok(slot.get_or_insert_with(|| ObjectRef::string(text)).clone())
    }
}

impl fmt::Debug for ModulePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModulePool")
            .field("strings", &self.strings.len())
            .field("types", &self.types.len())
            .finish()
    }
}

/// Instruction words of a method body
#[derive(Debug, Clone, Default)]
pub struct Code {
    words: Vec<u16>,
}

impl Code {
    /// Wrap raw code units
    pub fn new(words: Vec<u16>) -> Self {
        Self { words }
    }

    /// Number of code units
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Check whether the body is empty
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Full code unit at `pc`
    #[inline]
    pub fn word(&self, pc: usize) -> VmResult<u16> {
        self.words
            .get(pc)
            .copied()
            .ok_or_else(|| VmError::Internal(format!("pc {} outside code of {} units", pc, self.words.len())))
    }

    /// Low byte at `pc`
    #[inline]
    pub fn lower(&self, pc: usize) -> VmResult<u8> {
        Ok((self.word(pc)? & 0xFF) as u8)
    }

    /// High byte at `pc`
    #[inline]
    pub fn upper(&self, pc: usize) -> VmResult<u8> {
        Ok((self.word(pc)? >> 8) as u8)
    }
}

/// A resolved method
#[derive(Debug)]
pub struct Method {
    /// Declaring class, internal form
    pub class_name: String,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Access flags
    pub flags: u32,
    /// Register file size
    pub registers: usize,
    /// Incoming argument words
    pub ins: usize,
    /// Outgoing argument words
    pub outs: usize,
    /// Body, empty for abstract and native methods
    pub code: Code,
    /// Try ranges
    pub tries: Vec<TryItem>,
    /// Handler groups
    pub handlers: Vec<HandlerGroup>,
    /// Constant tables of the defining module
    pub pool: Rc<ModulePool>,
}

impl Method {
    fn from_encoded(class_name: &str, method: &EncodedMethod, pool: &Rc<ModulePool>) -> Self {
        let (registers, ins, outs, code, tries, handlers) = match &method.code {
            Some(code) => (
                code.registers_size as usize,
                code.ins_size as usize,
                code.outs_size as usize,
                Code::new(code.insns.clone()),
                code.tries.clone(),
                code.handlers.clone(),
            ),
            None => (0, 0, 0, Code::default(), Vec::new(), Vec::new()),
        };
        Self {
            class_name: class_name.to_string(),
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            flags: method.access_flags,
            registers,
            ins,
            outs,
            code,
            tries,
            handlers,
            pool: Rc::clone(pool),
        }
    }

    /// Check whether the method takes a receiver
    pub fn is_instance(&self) -> bool {
        self.flags & ACC_STATIC == 0
    }

    /// Check whether calls hold the receiver (or class) monitor
    pub fn is_synchronized(&self) -> bool {
        self.flags & ACC_SYNCHRONIZED != 0
    }

    /// Check whether the method has a body
    pub fn has_code(&self) -> bool {
        !self.code.is_empty()
    }

    /// `class - name - descriptor` triple used in diagnostics
    pub fn signature(&self) -> String {
        format!("{} - {} - {}", self.class_name, self.name, self.descriptor)
    }
}

/// A module-defined class
#[derive(Debug)]
pub struct Class {
    /// Arena id
    pub id: ClassId,
    /// Internal name
    pub name: String,
    /// Access flags
    pub flags: u32,
    /// Set for interfaces and abstract classes
    pub is_interface: bool,
    /// Superclass, internal form
    pub super_name: String,
    /// Implemented interfaces
    pub interfaces: Vec<String>,
    /// Static fields with their current values
    pub static_fields: Vec<Field>,
    /// Instance field templates
    pub instance_fields: Vec<Field>,
    /// Static, private and constructor methods
    pub direct_methods: Vec<Rc<Method>>,
    /// Overridable methods
    pub virtual_methods: Vec<Rc<Method>>,
    /// Set once the class has been handed out by the registry
    pub bound: bool,
}

impl Class {
    /// Build the runtime class of a definition
    ///
    /// Static fields start from the module's encoded initial values, string
    /// values are the module's interned string objects.
    pub fn from_def(id: ClassId, def: &ClassDef, pool: &Rc<ModulePool>) -> VmResult<Self> {
        let mut static_fields = Vec::with_capacity(def.static_fields.len());
        for (position, encoded) in def.static_fields.iter().enumerate() {
            let mut field = Field::new(&def.name, &encoded.name, &encoded.type_desc, encoded.access_flags);
            if let Some(value) = def.static_values.get(position) {
                field.value = initial_value(value, &encoded.type_desc, pool)?;
            }
            static_fields.push(field);
        }
        let instance_fields = def
            .instance_fields
            .iter()
            .map(|f| Field::new(&def.name, &f.name, &f.type_desc, f.access_flags))
            .collect();
        let build = |methods: &[EncodedMethod]| -> Vec<Rc<Method>> {
            methods
                .iter()
                .map(|m| Rc::new(Method::from_encoded(&def.name, m, pool)))
                .collect()
        };

        Ok(Self {
            id,
            name: def.name.clone(),
            flags: def.access_flags,
            is_interface: def.is_interface,
            super_name: def.superclass.clone(),
            interfaces: def.interfaces.clone(),
            static_fields,
            instance_fields,
            direct_methods: build(&def.direct_methods),
            virtual_methods: build(&def.virtual_methods),
            bound: false,
        })
    }

    /// Direct method by name and descriptor
    pub fn find_direct(&self, name: &str, descriptor: &str) -> Option<Rc<Method>> {
        self.direct_methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
            .cloned()
    }

    /// Virtual method declared by this class
    pub fn find_virtual(&self, name: &str, descriptor: &str) -> Option<Rc<Method>> {
        self.virtual_methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
            .cloned()
    }

    /// Position of a static field declared by this class
    pub fn static_field_index(&self, name: &str) -> Option<usize> {
        self.static_fields.iter().position(|f| f.name == name)
    }
}

fn initial_value(value: &EncodedValue, type_desc: &str, pool: &ModulePool) -> VmResult<FieldValue> {
    let field_value = match value {
        EncodedValue::Null => FieldValue::Object(None),
        EncodedValue::String(index) => FieldValue::Object(Some(pool.string_object(*index)?)),
        other => match (other.as_int(), other.as_long()) {
            (Some(word), _) if !matches!(type_desc, "J" | "D") => FieldValue::Int(word),
            (Some(word), _) => FieldValue::Long(word as i64),
            (None, Some(wide)) => FieldValue::Long(wide),
            _ => FieldValue::default_for(type_desc),
        },
    };
    Ok(field_value)
}
