//! Register values
//!
//! A register holds either a 32-bit word or an object reference. Floats and
//! doubles travel as their IEEE-754 bit patterns, and a 64-bit value occupies
//! a register pair with the low word first.

use crate::object::ObjectRef;
use crate::{VmError, VmResult};

/// A single register slot
#[derive(Debug, Clone)]
pub enum Register {
    /// 32-bit word (int, float bits or half of a wide value)
    Int(i32),
    /// Object reference, `None` is null
    Object(Option<ObjectRef>),
}

impl Default for Register {
    fn default() -> Self {
        Register::Int(0)
    }
}

impl Register {
    /// The null reference
    pub fn null() -> Self {
        Register::Object(None)
    }

    /// A non-null reference
    pub fn object(obj: ObjectRef) -> Self {
        Register::Object(Some(obj))
    }

    /// Check whether the slot carries the object tag
    pub fn is_object(&self) -> bool {
        matches!(self, Register::Object(_))
    }

    /// Read the slot as a 32-bit word
    ///
    /// A null reference reads as zero.
    pub fn as_int(&self) -> VmResult<i32> {
        match self {
            Register::Int(v) => Ok(*v),
            Register::Object(None) => Ok(0),
            Register::Object(Some(obj)) => Err(VmError::TypeError(format!(
                "object register {} read as int",
                obj.type_name()
            ))),
        }
    }

    /// Read the slot as an object reference
    ///
    /// A zero word reads as null, since `const/4 vA, 0` is the null constant.
    pub fn as_object(&self) -> VmResult<Option<ObjectRef>> {
        match self {
            Register::Object(obj) => Ok(obj.clone()),
            Register::Int(0) => Ok(None),
            Register::Int(v) => Err(VmError::TypeError(format!(
                "int register {} read as object",
                v
            ))),
        }
    }
}

impl From<Option<ObjectRef>> for Register {
    fn from(obj: Option<ObjectRef>) -> Self {
        Register::Object(obj)
    }
}

impl From<i32> for Register {
    fn from(v: i32) -> Self {
        Register::Int(v)
    }
}

/// Reinterpret register bits as a float
#[inline]
pub fn int_to_float(bits: i32) -> f32 {
    f32::from_bits(bits as u32)
}

/// Reinterpret a float as register bits
#[inline]
pub fn float_to_int(value: f32) -> i32 {
    value.to_bits() as i32
}

/// Reinterpret wide register bits as a double
#[inline]
pub fn long_to_double(bits: i64) -> f64 {
    f64::from_bits(bits as u64)
}

/// Reinterpret a double as wide register bits
#[inline]
pub fn double_to_long(value: f64) -> i64 {
    value.to_bits() as i64
}

/// Join a register pair into a 64-bit value
#[inline]
pub fn join_wide(low: i32, high: i32) -> i64 {
    ((high as i64) << 32) | (low as u32 as i64)
}

/// Split a 64-bit value into its (low, high) register pair
#[inline]
pub fn split_wide(value: i64) -> (i32, i32) {
    (value as i32, (value >> 32) as i32)
}
