//! Field storage

use crate::object::ObjectRef;
use crate::{VmError, VmResult};
use dexvm_bytecode::dex::ACC_STATIC;

/// Value held by a field, shaped by its type descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Every 32-bit or narrower type, floats as raw bits
    Int(i32),
    /// `J` and `D`, doubles as raw bits
    Long(i64),
    /// Reference types
    Object(Option<ObjectRef>),
}

impl FieldValue {
    /// Zero value for a type descriptor
    pub fn default_for(type_desc: &str) -> Self {
        match type_desc.as_bytes().first() {
            Some(b'J') | Some(b'D') => FieldValue::Long(0),
            Some(b'L') | Some(b'[') => FieldValue::Object(None),
            _ => FieldValue::Int(0),
        }
    }

    /// Read as a 32-bit word
    pub fn as_int(&self) -> VmResult<i32> {
        match self {
            FieldValue::Int(v) => Ok(*v),
            FieldValue::Object(None) => Ok(0),
            other => Err(VmError::TypeError(format!("field {:?} read as int", other))),
        }
    }

    /// Read as a 64-bit value
    pub fn as_long(&self) -> VmResult<i64> {
        match self {
            FieldValue::Long(v) => Ok(*v),
            other => Err(VmError::TypeError(format!("field {:?} read as long", other))),
        }
    }

    /// Read as a reference
    pub fn as_object(&self) -> VmResult<Option<ObjectRef>> {
        match self {
            FieldValue::Object(obj) => Ok(obj.clone()),
            FieldValue::Int(0) => Ok(None),
            other => Err(VmError::TypeError(format!("field {:?} read as object", other))),
        }
    }
}

/// A declared field with its current value
#[derive(Debug, Clone)]
pub struct Field {
    /// Declaring class, internal form
    pub class_name: String,
    /// Field name
    pub name: String,
    /// Type descriptor
    pub type_desc: String,
    /// Access flags
    pub flags: u32,
    /// Current value
    pub value: FieldValue,
}

impl Field {
    /// Create a field holding the zero value of its type
    pub fn new(class_name: &str, name: &str, type_desc: &str, flags: u32) -> Self {
        Self {
            class_name: class_name.to_string(),
            name: name.to_string(),
            type_desc: type_desc.to_string(),
            flags,
            value: FieldValue::default_for(type_desc),
        }
    }

    /// Check whether the field is per-instance
    pub fn is_instance(&self) -> bool {
        self.flags & ACC_STATIC == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_by_descriptor() {
        assert_eq!(FieldValue::default_for("J"), FieldValue::Long(0));
        assert_eq!(FieldValue::default_for("D"), FieldValue::Long(0));
        assert_eq!(FieldValue::default_for("[I"), FieldValue::Object(None));
        assert_eq!(FieldValue::default_for("Ljava/lang/String;"), FieldValue::Object(None));
        assert_eq!(FieldValue::default_for("Z"), FieldValue::Int(0));
    }

    #[test]
    fn test_static_flag() {
        assert!(Field::new("A", "x", "I", 0).is_instance());
        assert!(!Field::new("A", "x", "I", ACC_STATIC).is_instance());
    }

    #[test]
    fn test_mismatched_reads() {
        assert!(FieldValue::Long(1).as_int().is_err());
        assert!(FieldValue::Int(5).as_object().is_err());
        assert!(FieldValue::Int(0).as_object().unwrap().is_none());
    }
}
