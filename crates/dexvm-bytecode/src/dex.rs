//! In-memory form of a parsed DEX module
//!
//! Every table keeps the index order of the file so instruction operands can
//! address strings, types, protos, fields and methods directly. Class names are
//! stored in internal form (`java/lang/Object`), type entries in descriptor
//! form (`Ljava/lang/Object;`).

use serde::Serialize;

/// `public` access flag
pub const ACC_PUBLIC: u32 = 0x1;
/// `private` access flag
pub const ACC_PRIVATE: u32 = 0x2;
/// `protected` access flag
pub const ACC_PROTECTED: u32 = 0x4;
/// `static` access flag
pub const ACC_STATIC: u32 = 0x8;
/// `final` access flag
pub const ACC_FINAL: u32 = 0x10;
/// `synchronized` access flag (methods)
pub const ACC_SYNCHRONIZED: u32 = 0x20;
/// `native` access flag (methods)
pub const ACC_NATIVE: u32 = 0x100;
/// `interface` access flag (classes)
pub const ACC_INTERFACE: u32 = 0x200;
/// `abstract` access flag
pub const ACC_ABSTRACT: u32 = 0x400;
/// Constructor marker (methods)
pub const ACC_CONSTRUCTOR: u32 = 0x10000;

/// Marker for an absent index (`superclass_idx` of `java/lang/Object`)
pub const NO_INDEX: u32 = 0xFFFF_FFFF;

/// A parsed module
#[derive(Debug, Clone, Default, Serialize)]
pub struct DexFile {
    /// Header fields
    pub header: DexHeader,
    /// Structural map, kept for inspection only
    pub map: Vec<MapItem>,
    /// String table
    pub strings: Vec<String>,
    /// Type table, descriptor form
    pub types: Vec<String>,
    /// Method descriptors, `(params)return` form
    pub protos: Vec<String>,
    /// Field reference table
    pub field_ids: Vec<FieldRef>,
    /// Method reference table
    pub method_ids: Vec<MethodRef>,
    /// Class definitions, in file order
    pub class_defs: Vec<ClassDef>,
}

impl DexFile {
    /// Find a class definition by internal name
    pub fn find_class(&self, name: &str) -> Option<&ClassDef> {
        self.class_defs.iter().find(|class| class.name == name)
    }
}

/// Fixed header section
#[derive(Debug, Clone, Default, Serialize)]
pub struct DexHeader {
    /// Adler-32 checksum (not verified)
    pub checksum: u32,
    /// SHA-1 signature (not verified)
    pub signature: [u8; 20],
    /// Total file size
    pub file_size: u32,
    /// Header size, always `HEADER_SIZE`
    pub header_size: u32,
    /// Offset of the map list
    pub map_off: u32,
}

/// Entry of the structural map
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapItem {
    /// Section type code
    pub type_code: u16,
    /// Number of items in the section
    pub size: u32,
    /// Offset of the section
    pub offset: u32,
}

/// Row of the field reference table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldRef {
    /// Declaring class, internal form
    pub class_name: String,
    /// Field type descriptor
    pub type_desc: String,
    /// Field name
    pub name: String,
}

/// Row of the method reference table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodRef {
    /// Declaring class, internal form
    pub class_name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Method name
    pub name: String,
}

/// A class definition with its class data
#[derive(Debug, Clone, Serialize)]
pub struct ClassDef {
    /// Internal class name
    pub name: String,
    /// Access flags
    pub access_flags: u32,
    /// Set for interfaces and abstract classes
    pub is_interface: bool,
    /// Superclass, `java/lang/Object` when absent
    pub superclass: String,
    /// Implemented interfaces
    pub interfaces: Vec<String>,
    /// Static fields, in class-data order
    pub static_fields: Vec<EncodedField>,
    /// Instance fields, in class-data order
    pub instance_fields: Vec<EncodedField>,
    /// Static, private and constructor methods
    pub direct_methods: Vec<EncodedMethod>,
    /// Overridable methods
    pub virtual_methods: Vec<EncodedMethod>,
    /// Initial values of the first static fields
    pub static_values: Vec<EncodedValue>,
}

/// Field declared by a class
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedField {
    /// Index into the field reference table
    pub field_index: u32,
    /// Access flags
    pub access_flags: u32,
    /// Field name
    pub name: String,
    /// Field type descriptor
    pub type_desc: String,
}

/// Method declared by a class
#[derive(Debug, Clone, Serialize)]
pub struct EncodedMethod {
    /// Index into the method reference table
    pub method_index: u32,
    /// Access flags
    pub access_flags: u32,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Body, absent for abstract and native methods
    pub code: Option<CodeItem>,
}

impl EncodedMethod {
    /// Check whether the method takes an implicit receiver
    pub fn is_instance(&self) -> bool {
        self.access_flags & ACC_STATIC == 0
    }

    /// Check whether the method is declared `synchronized`
    pub fn is_synchronized(&self) -> bool {
        self.access_flags & ACC_SYNCHRONIZED != 0
    }
}

/// Method body
#[derive(Debug, Clone, Default, Serialize)]
pub struct CodeItem {
    /// Number of registers
    pub registers_size: u16,
    /// Number of incoming argument words
    pub ins_size: u16,
    /// Number of outgoing argument words
    pub outs_size: u16,
    /// Instruction stream
    pub insns: Vec<u16>,
    /// Try ranges, in file order
    pub tries: Vec<TryItem>,
    /// Handler groups referenced by `TryItem::handler`
    pub handlers: Vec<HandlerGroup>,
}

/// A protected instruction range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TryItem {
    /// First covered code unit
    pub start: u32,
    /// One past the last covered code unit
    pub end: u32,
    /// Index into `CodeItem::handlers`
    pub handler: usize,
}

/// Handlers shared by one or more try ranges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HandlerGroup {
    /// Typed handlers followed by the catch-all, if any
    pub catches: Vec<CatchHandler>,
}

/// One handler entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatchHandler {
    /// Caught class in internal form, `None` for catch-all
    pub type_name: Option<String>,
    /// Handler address in code units
    pub address: u32,
}

/// Static field initial value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EncodedValue {
    /// `VALUE_BYTE`
    Byte(i8),
    /// `VALUE_SHORT`
    Short(i16),
    /// `VALUE_CHAR`
    Char(u16),
    /// `VALUE_INT`
    Int(i32),
    /// `VALUE_LONG`
    Long(i64),
    /// `VALUE_FLOAT`
    Float(f32),
    /// `VALUE_DOUBLE`
    Double(f64),
    /// `VALUE_STRING`, index into the string table
    String(u32),
    /// `VALUE_NULL`
    Null,
    /// `VALUE_BOOLEAN`
    Boolean(bool),
}

impl EncodedValue {
    /// Value as the 32-bit register form (floats as raw bits)
    pub fn as_int(&self) -> Option<i32> {
        match *self {
            Self::Byte(v) => Some(v as i32),
            Self::Short(v) => Some(v as i32),
            Self::Char(v) => Some(v as i32),
            Self::Int(v) => Some(v),
            Self::Float(v) => Some(v.to_bits() as i32),
            Self::Boolean(v) => Some(v as i32),
            _ => None,
        }
    }

    /// Value as the 64-bit register form (doubles as raw bits)
    pub fn as_long(&self) -> Option<i64> {
        match *self {
            Self::Long(v) => Some(v),
            Self::Double(v) => Some(v.to_bits() as i64),
            _ => None,
        }
    }
}
