//! Dalvik instruction set
//!
//! Every opcode of the DEX 035 instruction set with its mnemonic and
//! instruction format. The opcode is always the low byte of the first code
//! unit; the format fixes how many 16-bit code units the instruction spans.

use std::fmt;

/// Instruction encoding format
///
/// The first digit is the width in code units, the second the number of
/// registers, the suffix the kind of extra data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Format 10x
    F10x,
    /// Format 12x
    F12x,
    /// Format 11n
    F11n,
    /// Format 11x
    F11x,
    /// Format 10t
    F10t,
    /// Format 20t
    F20t,
    /// Format 22x
    F22x,
    /// Format 21t
    F21t,
    /// Format 21s
    F21s,
    /// Format 21h
    F21h,
    /// Format 21c
    F21c,
    /// Format 23x
    F23x,
    /// Format 22b
    F22b,
    /// Format 22t
    F22t,
    /// Format 22s
    F22s,
    /// Format 22c
    F22c,
    /// Format 30t
    F30t,
    /// Format 32x
    F32x,
    /// Format 31i
    F31i,
    /// Format 31t
    F31t,
    /// Format 31c
    F31c,
    /// Format 35c
    F35c,
    /// Format 3rc
    F3rc,
    /// Format 51l
    F51l,
}

impl Format {
    /// Number of 16-bit code units an instruction in this format occupies
    pub fn width(self) -> u32 {
        match self {
            Self::F10x | Self::F12x | Self::F11n | Self::F11x | Self::F10t => 1,
            Self::F20t | Self::F22x | Self::F21t | Self::F21s | Self::F21h | Self::F21c | Self::F23x | Self::F22b | Self::F22t | Self::F22s | Self::F22c => 2,
            Self::F30t | Self::F32x | Self::F31i | Self::F31t | Self::F31c | Self::F35c | Self::F3rc => 3,
            Self::F51l => 5,
        }
    }
}

/// Dalvik opcode enumeration
///
/// Values 0x3E-0x43, 0x73, 0x79-0x7A and 0xE3-0xFF are unused in the 035
/// format and have no variant.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Moves and Returns =====
    /// No operation
    Nop = 0x00,
    /// Copy a 32-bit register
    Move = 0x01,
    /// Copy a 32-bit register (16-bit source)
    MoveFrom16 = 0x02,
    /// Copy a 32-bit register (16-bit source and destination)
    Move16 = 0x03,
    /// Copy a register pair
    MoveWide = 0x04,
    /// Copy a register pair (16-bit source)
    MoveWideFrom16 = 0x05,
    /// Copy a register pair (16-bit source and destination)
    MoveWide16 = 0x06,
    /// Copy an object reference
    MoveObject = 0x07,
    /// Copy an object reference (16-bit source)
    MoveObjectFrom16 = 0x08,
    /// Copy an object reference (16-bit source and destination)
    MoveObject16 = 0x09,
    /// Store the single-word result of the last invoke
    MoveResult = 0x0A,
    /// Store the double-word result of the last invoke
    MoveResultWide = 0x0B,
    /// Store the object result of the last invoke
    MoveResultObject = 0x0C,
    /// Store the exception just caught
    MoveException = 0x0D,
    /// Return without a value
    ReturnVoid = 0x0E,
    /// Return a single-word value
    Return = 0x0F,
    /// Return a double-word value
    ReturnWide = 0x10,
    /// Return an object reference
    ReturnObject = 0x11,

    // ===== Constants =====
    /// Load a sign-extended 4-bit literal
    Const4 = 0x12,
    /// Load a sign-extended 16-bit literal
    Const16 = 0x13,
    /// Load a 32-bit literal
    Const = 0x14,
    /// Load a 16-bit literal shifted into the high half
    ConstHigh16 = 0x15,
    /// Load a sign-extended 16-bit literal into a pair
    ConstWide16 = 0x16,
    /// Load a sign-extended 32-bit literal into a pair
    ConstWide32 = 0x17,
    /// Load a 64-bit literal into a pair
    ConstWide = 0x18,
    /// Load a 16-bit literal into the top bits of a pair
    ConstWideHigh16 = 0x19,
    /// Load a string constant
    ConstString = 0x1A,
    /// Load a string constant (32-bit index)
    ConstStringJumbo = 0x1B,
    /// Load a class object
    ConstClass = 0x1C,

    // ===== Monitors, Types and Allocation =====
    /// Acquire an object monitor
    MonitorEnter = 0x1D,
    /// Release an object monitor
    MonitorExit = 0x1E,
    /// Throw unless the reference is assignable to a type
    CheckCast = 0x1F,
    /// Test whether a reference is assignable to a type
    InstanceOf = 0x20,
    /// Load the length of an array
    ArrayLength = 0x21,
    /// Allocate an instance
    NewInstance = 0x22,
    /// Allocate an array
    NewArray = 0x23,
    /// Allocate an array filled from registers
    FilledNewArray = 0x24,
    /// Allocate an array filled from a register range
    FilledNewArrayRange = 0x25,
    /// Fill an array from an embedded data table
    FillArrayData = 0x26,

    // ===== Throw and Jumps =====
    /// Throw an exception
    Throw = 0x27,
    /// Unconditional jump (8-bit offset)
    Goto = 0x28,
    /// Unconditional jump (16-bit offset)
    Goto16 = 0x29,
    /// Unconditional jump (32-bit offset)
    Goto32 = 0x2A,
    /// Jump through a dense switch table
    PackedSwitch = 0x2B,
    /// Jump through a sorted key/target table
    SparseSwitch = 0x2C,

    // ===== Comparisons and Branches =====
    /// Compare floats, NaN yields -1
    CmplFloat = 0x2D,
    /// Compare floats, NaN yields 1
    CmpgFloat = 0x2E,
    /// Compare doubles, NaN yields -1
    CmplDouble = 0x2F,
    /// Compare doubles, NaN yields 1
    CmpgDouble = 0x30,
    /// Compare longs
    CmpLong = 0x31,
    /// Branch if vA == vB
    IfEq = 0x32,
    /// Branch if vA != vB
    IfNe = 0x33,
    /// Branch if vA < vB
    IfLt = 0x34,
    /// Branch if vA >= vB
    IfGe = 0x35,
    /// Branch if vA > vB
    IfGt = 0x36,
    /// Branch if vA <= vB
    IfLe = 0x37,
    /// Branch if vA == 0
    IfEqz = 0x38,
    /// Branch if vA != 0
    IfNez = 0x39,
    /// Branch if vA < 0
    IfLtz = 0x3A,
    /// Branch if vA >= 0
    IfGez = 0x3B,
    /// Branch if vA > 0
    IfGtz = 0x3C,
    /// Branch if vA <= 0
    IfLez = 0x3D,

    // ===== Array Elements =====
    /// Load a 32-bit array element
    Aget = 0x44,
    /// Load a double-word array element
    AgetWide = 0x45,
    /// Load a object array element
    AgetObject = 0x46,
    /// Load a boolean array element
    AgetBoolean = 0x47,
    /// Load a byte array element
    AgetByte = 0x48,
    /// Load a char array element
    AgetChar = 0x49,
    /// Load a short array element
    AgetShort = 0x4A,
    /// Store a 32-bit array element
    Aput = 0x4B,
    /// Store a double-word array element
    AputWide = 0x4C,
    /// Store a object array element
    AputObject = 0x4D,
    /// Store a boolean array element
    AputBoolean = 0x4E,
    /// Store a byte array element
    AputByte = 0x4F,
    /// Store a char array element
    AputChar = 0x50,
    /// Store a short array element
    AputShort = 0x51,

    // ===== Instance Fields =====
    /// Load a 32-bit instance field
    Iget = 0x52,
    /// Load a double-word instance field
    IgetWide = 0x53,
    /// Load a object instance field
    IgetObject = 0x54,
    /// Load a boolean instance field
    IgetBoolean = 0x55,
    /// Load a byte instance field
    IgetByte = 0x56,
    /// Load a char instance field
    IgetChar = 0x57,
    /// Load a short instance field
    IgetShort = 0x58,
    /// Store a 32-bit instance field
    Iput = 0x59,
    /// Store a double-word instance field
    IputWide = 0x5A,
    /// Store a object instance field
    IputObject = 0x5B,
    /// Store a boolean instance field
    IputBoolean = 0x5C,
    /// Store a byte instance field
    IputByte = 0x5D,
    /// Store a char instance field
    IputChar = 0x5E,
    /// Store a short instance field
    IputShort = 0x5F,

    // ===== Static Fields =====
    /// Load a 32-bit static field
    Sget = 0x60,
    /// Load a double-word static field
    SgetWide = 0x61,
    /// Load a object static field
    SgetObject = 0x62,
    /// Load a boolean static field
    SgetBoolean = 0x63,
    /// Load a byte static field
    SgetByte = 0x64,
    /// Load a char static field
    SgetChar = 0x65,
    /// Load a short static field
    SgetShort = 0x66,
    /// Store a 32-bit static field
    Sput = 0x67,
    /// Store a double-word static field
    SputWide = 0x68,
    /// Store a object static field
    SputObject = 0x69,
    /// Store a boolean static field
    SputBoolean = 0x6A,
    /// Store a byte static field
    SputByte = 0x6B,
    /// Store a char static field
    SputChar = 0x6C,
    /// Store a short static field
    SputShort = 0x6D,

    // ===== Invocation =====
    /// Invoke a virtual method
    InvokeVirtual = 0x6E,
    /// Invoke the superclass implementation of a method
    InvokeSuper = 0x6F,
    /// Invoke a direct method
    InvokeDirect = 0x70,
    /// Invoke a static method
    InvokeStatic = 0x71,
    /// Invoke an interface method
    InvokeInterface = 0x72,
    /// Invoke a virtual method with a register range
    InvokeVirtualRange = 0x74,
    /// Invoke the superclass implementation of a method with a register range
    InvokeSuperRange = 0x75,
    /// Invoke a direct method with a register range
    InvokeDirectRange = 0x76,
    /// Invoke a static method with a register range
    InvokeStaticRange = 0x77,
    /// Invoke an interface method with a register range
    InvokeInterfaceRange = 0x78,

    // ===== Unary Operations and Conversions =====
    /// Negate an int
    NegInt = 0x7B,
    /// Bitwise complement of an int
    NotInt = 0x7C,
    /// Negate a long
    NegLong = 0x7D,
    /// Bitwise complement of a long
    NotLong = 0x7E,
    /// Negate a float
    NegFloat = 0x7F,
    /// Negate a double
    NegDouble = 0x80,
    /// Convert int to long
    IntToLong = 0x81,
    /// Convert int to float
    IntToFloat = 0x82,
    /// Convert int to double
    IntToDouble = 0x83,
    /// Convert long to int
    LongToInt = 0x84,
    /// Convert long to float
    LongToFloat = 0x85,
    /// Convert long to double
    LongToDouble = 0x86,
    /// Convert float to int
    FloatToInt = 0x87,
    /// Convert float to long
    FloatToLong = 0x88,
    /// Convert float to double
    FloatToDouble = 0x89,
    /// Convert double to int
    DoubleToInt = 0x8A,
    /// Convert double to long
    DoubleToLong = 0x8B,
    /// Convert double to float
    DoubleToFloat = 0x8C,
    /// Convert int to byte
    IntToByte = 0x8D,
    /// Convert int to char
    IntToChar = 0x8E,
    /// Convert int to short
    IntToShort = 0x8F,

    // ===== Binary Operations =====
    /// Add ints
    AddInt = 0x90,
    /// Subtract ints
    SubInt = 0x91,
    /// Multiply ints
    MulInt = 0x92,
    /// Divide ints
    DivInt = 0x93,
    /// Remainder of ints
    RemInt = 0x94,
    /// Bitwise and of ints
    AndInt = 0x95,
    /// Bitwise or of ints
    OrInt = 0x96,
    /// Bitwise xor of ints
    XorInt = 0x97,
    /// Shift left ints
    ShlInt = 0x98,
    /// Arithmetic shift right ints
    ShrInt = 0x99,
    /// Logical shift right ints
    UshrInt = 0x9A,
    /// Add longs
    AddLong = 0x9B,
    /// Subtract longs
    SubLong = 0x9C,
    /// Multiply longs
    MulLong = 0x9D,
    /// Divide longs
    DivLong = 0x9E,
    /// Remainder of longs
    RemLong = 0x9F,
    /// Bitwise and of longs
    AndLong = 0xA0,
    /// Bitwise or of longs
    OrLong = 0xA1,
    /// Bitwise xor of longs
    XorLong = 0xA2,
    /// Shift left longs
    ShlLong = 0xA3,
    /// Arithmetic shift right longs
    ShrLong = 0xA4,
    /// Logical shift right longs
    UshrLong = 0xA5,
    /// Add floats
    AddFloat = 0xA6,
    /// Subtract floats
    SubFloat = 0xA7,
    /// Multiply floats
    MulFloat = 0xA8,
    /// Divide floats
    DivFloat = 0xA9,
    /// Remainder of floats
    RemFloat = 0xAA,
    /// Add doubles
    AddDouble = 0xAB,
    /// Subtract doubles
    SubDouble = 0xAC,
    /// Multiply doubles
    MulDouble = 0xAD,
    /// Divide doubles
    DivDouble = 0xAE,
    /// Remainder of doubles
    RemDouble = 0xAF,

    // ===== Binary Operations (2-address) =====
    /// Add ints in place
    AddInt2Addr = 0xB0,
    /// Subtract ints in place
    SubInt2Addr = 0xB1,
    /// Multiply ints in place
    MulInt2Addr = 0xB2,
    /// Divide ints in place
    DivInt2Addr = 0xB3,
    /// Remainder of ints in place
    RemInt2Addr = 0xB4,
    /// Bitwise and of ints in place
    AndInt2Addr = 0xB5,
    /// Bitwise or of ints in place
    OrInt2Addr = 0xB6,
    /// Bitwise xor of ints in place
    XorInt2Addr = 0xB7,
    /// Shift left ints in place
    ShlInt2Addr = 0xB8,
    /// Arithmetic shift right ints in place
    ShrInt2Addr = 0xB9,
    /// Logical shift right ints in place
    UshrInt2Addr = 0xBA,
    /// Add longs in place
    AddLong2Addr = 0xBB,
    /// Subtract longs in place
    SubLong2Addr = 0xBC,
    /// Multiply longs in place
    MulLong2Addr = 0xBD,
    /// Divide longs in place
    DivLong2Addr = 0xBE,
    /// Remainder of longs in place
    RemLong2Addr = 0xBF,
    /// Bitwise and of longs in place
    AndLong2Addr = 0xC0,
    /// Bitwise or of longs in place
    OrLong2Addr = 0xC1,
    /// Bitwise xor of longs in place
    XorLong2Addr = 0xC2,
    /// Shift left longs in place
    ShlLong2Addr = 0xC3,
    /// Arithmetic shift right longs in place
    ShrLong2Addr = 0xC4,
    /// Logical shift right longs in place
    UshrLong2Addr = 0xC5,
    /// Add floats in place
    AddFloat2Addr = 0xC6,
    /// Subtract floats in place
    SubFloat2Addr = 0xC7,
    /// Multiply floats in place
    MulFloat2Addr = 0xC8,
    /// Divide floats in place
    DivFloat2Addr = 0xC9,
    /// Remainder of floats in place
    RemFloat2Addr = 0xCA,
    /// Add doubles in place
    AddDouble2Addr = 0xCB,
    /// Subtract doubles in place
    SubDouble2Addr = 0xCC,
    /// Multiply doubles in place
    MulDouble2Addr = 0xCD,
    /// Divide doubles in place
    DivDouble2Addr = 0xCE,
    /// Remainder of doubles in place
    RemDouble2Addr = 0xCF,

    // ===== Binary Operations (literal) =====
    /// Add a 16-bit literal
    AddIntLit16 = 0xD0,
    /// Subtract from a 16-bit literal
    RsubInt = 0xD1,
    /// Multiply by a 16-bit literal
    MulIntLit16 = 0xD2,
    /// Divide by a 16-bit literal
    DivIntLit16 = 0xD3,
    /// Remainder by a 16-bit literal
    RemIntLit16 = 0xD4,
    /// Bitwise and with a 16-bit literal
    AndIntLit16 = 0xD5,
    /// Bitwise or with a 16-bit literal
    OrIntLit16 = 0xD6,
    /// Bitwise xor with a 16-bit literal
    XorIntLit16 = 0xD7,
    /// Add an 8-bit literal
    AddIntLit8 = 0xD8,
    /// Subtract from an 8-bit literal
    RsubIntLit8 = 0xD9,
    /// Multiply by an 8-bit literal
    MulIntLit8 = 0xDA,
    /// Divide by an 8-bit literal
    DivIntLit8 = 0xDB,
    /// Remainder by an 8-bit literal
    RemIntLit8 = 0xDC,
    /// Bitwise and with an 8-bit literal
    AndIntLit8 = 0xDD,
    /// Bitwise or with an 8-bit literal
    OrIntLit8 = 0xDE,
    /// Bitwise xor with an 8-bit literal
    XorIntLit8 = 0xDF,
    /// Shift left by an 8-bit literal
    ShlIntLit8 = 0xE0,
    /// Arithmetic shift right by an 8-bit literal
    ShrIntLit8 = 0xE1,
    /// Logical shift right by an 8-bit literal
    UshrIntLit8 = 0xE2,
}

impl Opcode {
    /// Convert byte to opcode
    ///
    /// Returns None if the byte does not correspond to a defined opcode.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::Move),
            0x02 => Some(Self::MoveFrom16),
            0x03 => Some(Self::Move16),
            0x04 => Some(Self::MoveWide),
            0x05 => Some(Self::MoveWideFrom16),
            0x06 => Some(Self::MoveWide16),
            0x07 => Some(Self::MoveObject),
            0x08 => Some(Self::MoveObjectFrom16),
            0x09 => Some(Self::MoveObject16),
            0x0A => Some(Self::MoveResult),
            0x0B => Some(Self::MoveResultWide),
            0x0C => Some(Self::MoveResultObject),
            0x0D => Some(Self::MoveException),
            0x0E => Some(Self::ReturnVoid),
            0x0F => Some(Self::Return),
            0x10 => Some(Self::ReturnWide),
            0x11 => Some(Self::ReturnObject),
            0x12 => Some(Self::Const4),
            0x13 => Some(Self::Const16),
            0x14 => Some(Self::Const),
            0x15 => Some(Self::ConstHigh16),
            0x16 => Some(Self::ConstWide16),
            0x17 => Some(Self::ConstWide32),
            0x18 => Some(Self::ConstWide),
            0x19 => Some(Self::ConstWideHigh16),
            0x1A => Some(Self::ConstString),
            0x1B => Some(Self::ConstStringJumbo),
            0x1C => Some(Self::ConstClass),
            0x1D => Some(Self::MonitorEnter),
            0x1E => Some(Self::MonitorExit),
            0x1F => Some(Self::CheckCast),
            0x20 => Some(Self::InstanceOf),
            0x21 => Some(Self::ArrayLength),
            0x22 => Some(Self::NewInstance),
            0x23 => Some(Self::NewArray),
            0x24 => Some(Self::FilledNewArray),
            0x25 => Some(Self::FilledNewArrayRange),
            0x26 => Some(Self::FillArrayData),
            0x27 => Some(Self::Throw),
            0x28 => Some(Self::Goto),
            0x29 => Some(Self::Goto16),
            0x2A => Some(Self::Goto32),
            0x2B => Some(Self::PackedSwitch),
            0x2C => Some(Self::SparseSwitch),
            0x2D => Some(Self::CmplFloat),
            0x2E => Some(Self::CmpgFloat),
            0x2F => Some(Self::CmplDouble),
            0x30 => Some(Self::CmpgDouble),
            0x31 => Some(Self::CmpLong),
            0x32 => Some(Self::IfEq),
            0x33 => Some(Self::IfNe),
            0x34 => Some(Self::IfLt),
            0x35 => Some(Self::IfGe),
            0x36 => Some(Self::IfGt),
            0x37 => Some(Self::IfLe),
            0x38 => Some(Self::IfEqz),
            0x39 => Some(Self::IfNez),
            0x3A => Some(Self::IfLtz),
            0x3B => Some(Self::IfGez),
            0x3C => Some(Self::IfGtz),
            0x3D => Some(Self::IfLez),
            0x44 => Some(Self::Aget),
            0x45 => Some(Self::AgetWide),
            0x46 => Some(Self::AgetObject),
            0x47 => Some(Self::AgetBoolean),
            0x48 => Some(Self::AgetByte),
            0x49 => Some(Self::AgetChar),
            0x4A => Some(Self::AgetShort),
            0x4B => Some(Self::Aput),
            0x4C => Some(Self::AputWide),
            0x4D => Some(Self::AputObject),
            0x4E => Some(Self::AputBoolean),
            0x4F => Some(Self::AputByte),
            0x50 => Some(Self::AputChar),
            0x51 => Some(Self::AputShort),
            0x52 => Some(Self::Iget),
            0x53 => Some(Self::IgetWide),
            0x54 => Some(Self::IgetObject),
            0x55 => Some(Self::IgetBoolean),
            0x56 => Some(Self::IgetByte),
            0x57 => Some(Self::IgetChar),
            0x58 => Some(Self::IgetShort),
            0x59 => Some(Self::Iput),
            0x5A => Some(Self::IputWide),
            0x5B => Some(Self::IputObject),
            0x5C => Some(Self::IputBoolean),
            0x5D => Some(Self::IputByte),
            0x5E => Some(Self::IputChar),
            0x5F => Some(Self::IputShort),
            0x60 => Some(Self::Sget),
            0x61 => Some(Self::SgetWide),
            0x62 => Some(Self::SgetObject),
            0x63 => Some(Self::SgetBoolean),
            0x64 => Some(Self::SgetByte),
            0x65 => Some(Self::SgetChar),
            0x66 => Some(Self::SgetShort),
            0x67 => Some(Self::Sput),
            0x68 => Some(Self::SputWide),
            0x69 => Some(Self::SputObject),
            0x6A => Some(Self::SputBoolean),
            0x6B => Some(Self::SputByte),
            0x6C => Some(Self::SputChar),
            0x6D => Some(Self::SputShort),
            0x6E => Some(Self::InvokeVirtual),
            0x6F => Some(Self::InvokeSuper),
            0x70 => Some(Self::InvokeDirect),
            0x71 => Some(Self::InvokeStatic),
            0x72 => Some(Self::InvokeInterface),
            0x74 => Some(Self::InvokeVirtualRange),
            0x75 => Some(Self::InvokeSuperRange),
            0x76 => Some(Self::InvokeDirectRange),
            0x77 => Some(Self::InvokeStaticRange),
            0x78 => Some(Self::InvokeInterfaceRange),
            0x7B => Some(Self::NegInt),
            0x7C => Some(Self::NotInt),
            0x7D => Some(Self::NegLong),
            0x7E => Some(Self::NotLong),
            0x7F => Some(Self::NegFloat),
            0x80 => Some(Self::NegDouble),
            0x81 => Some(Self::IntToLong),
            0x82 => Some(Self::IntToFloat),
            0x83 => Some(Self::IntToDouble),
            0x84 => Some(Self::LongToInt),
            0x85 => Some(Self::LongToFloat),
            0x86 => Some(Self::LongToDouble),
            0x87 => Some(Self::FloatToInt),
            0x88 => Some(Self::FloatToLong),
            0x89 => Some(Self::FloatToDouble),
            0x8A => Some(Self::DoubleToInt),
            0x8B => Some(Self::DoubleToLong),
            0x8C => Some(Self::DoubleToFloat),
            0x8D => Some(Self::IntToByte),
            0x8E => Some(Self::IntToChar),
            0x8F => Some(Self::IntToShort),
            0x90 => Some(Self::AddInt),
            0x91 => Some(Self::SubInt),
            0x92 => Some(Self::MulInt),
            0x93 => Some(Self::DivInt),
            0x94 => Some(Self::RemInt),
            0x95 => Some(Self::AndInt),
            0x96 => Some(Self::OrInt),
            0x97 => Some(Self::XorInt),
            0x98 => Some(Self::ShlInt),
            0x99 => Some(Self::ShrInt),
            0x9A => Some(Self::UshrInt),
            0x9B => Some(Self::AddLong),
            0x9C => Some(Self::SubLong),
            0x9D => Some(Self::MulLong),
            0x9E => Some(Self::DivLong),
            0x9F => Some(Self::RemLong),
            0xA0 => Some(Self::AndLong),
            0xA1 => Some(Self::OrLong),
            0xA2 => Some(Self::XorLong),
            0xA3 => Some(Self::ShlLong),
            0xA4 => Some(Self::ShrLong),
            0xA5 => Some(Self::UshrLong),
            0xA6 => Some(Self::AddFloat),
            0xA7 => Some(Self::SubFloat),
            0xA8 => Some(Self::MulFloat),
            0xA9 => Some(Self::DivFloat),
            0xAA => Some(Self::RemFloat),
            0xAB => Some(Self::AddDouble),
            0xAC => Some(Self::SubDouble),
            0xAD => Some(Self::MulDouble),
            0xAE => Some(Self::DivDouble),
            0xAF => Some(Self::RemDouble),
            0xB0 => Some(Self::AddInt2Addr),
            0xB1 => Some(Self::SubInt2Addr),
            0xB2 => Some(Self::MulInt2Addr),
            0xB3 => Some(Self::DivInt2Addr),
            0xB4 => Some(Self::RemInt2Addr),
            0xB5 => Some(Self::AndInt2Addr),
            0xB6 => Some(Self::OrInt2Addr),
            0xB7 => Some(Self::XorInt2Addr),
            0xB8 => Some(Self::ShlInt2Addr),
            0xB9 => Some(Self::ShrInt2Addr),
            0xBA => Some(Self::UshrInt2Addr),
            0xBB => Some(Self::AddLong2Addr),
            0xBC => Some(Self::SubLong2Addr),
            0xBD => Some(Self::MulLong2Addr),
            0xBE => Some(Self::DivLong2Addr),
            0xBF => Some(Self::RemLong2Addr),
            0xC0 => Some(Self::AndLong2Addr),
            0xC1 => Some(Self::OrLong2Addr),
            0xC2 => Some(Self::XorLong2Addr),
            0xC3 => Some(Self::ShlLong2Addr),
            0xC4 => Some(Self::ShrLong2Addr),
            0xC5 => Some(Self::UshrLong2Addr),
            0xC6 => Some(Self::AddFloat2Addr),
            0xC7 => Some(Self::SubFloat2Addr),
            0xC8 => Some(Self::MulFloat2Addr),
            0xC9 => Some(Self::DivFloat2Addr),
            0xCA => Some(Self::RemFloat2Addr),
            0xCB => Some(Self::AddDouble2Addr),
            0xCC => Some(Self::SubDouble2Addr),
            0xCD => Some(Self::MulDouble2Addr),
            0xCE => Some(Self::DivDouble2Addr),
            0xCF => Some(Self::RemDouble2Addr),
            0xD0 => Some(Self::AddIntLit16),
            0xD1 => Some(Self::RsubInt),
            0xD2 => Some(Self::MulIntLit16),
            0xD3 => Some(Self::DivIntLit16),
            0xD4 => Some(Self::RemIntLit16),
            0xD5 => Some(Self::AndIntLit16),
            0xD6 => Some(Self::OrIntLit16),
            0xD7 => Some(Self::XorIntLit16),
            0xD8 => Some(Self::AddIntLit8),
            0xD9 => Some(Self::RsubIntLit8),
            0xDA => Some(Self::MulIntLit8),
            0xDB => Some(Self::DivIntLit8),
            0xDC => Some(Self::RemIntLit8),
            0xDD => Some(Self::AndIntLit8),
            0xDE => Some(Self::OrIntLit8),
            0xDF => Some(Self::XorIntLit8),
            0xE0 => Some(Self::ShlIntLit8),
            0xE1 => Some(Self::ShrIntLit8),
            0xE2 => Some(Self::UshrIntLit8),
            _ => None,
        }
    }

    /// Convert opcode to byte
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get the mnemonic of the opcode
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Move => "move",
            Self::MoveFrom16 => "move/from16",
            Self::Move16 => "move/16",
            Self::MoveWide => "move-wide",
            Self::MoveWideFrom16 => "move-wide/from16",
            Self::MoveWide16 => "move-wide/16",
            Self::MoveObject => "move-object",
            Self::MoveObjectFrom16 => "move-object/from16",
            Self::MoveObject16 => "move-object/16",
            Self::MoveResult => "move-result",
            Self::MoveResultWide => "move-result-wide",
            Self::MoveResultObject => "move-result-object",
            Self::MoveException => "move-exception",
            Self::ReturnVoid => "return-void",
            Self::Return => "return",
            Self::ReturnWide => "return-wide",
            Self::ReturnObject => "return-object",
            Self::Const4 => "const/4",
            Self::Const16 => "const/16",
            Self::Const => "const",
            Self::ConstHigh16 => "const/high16",
            Self::ConstWide16 => "const-wide/16",
            Self::ConstWide32 => "const-wide/32",
            Self::ConstWide => "const-wide",
            Self::ConstWideHigh16 => "const-wide/high16",
            Self::ConstString => "const-string",
            Self::ConstStringJumbo => "const-string/jumbo",
            Self::ConstClass => "const-class",
            Self::MonitorEnter => "monitor-enter",
            Self::MonitorExit => "monitor-exit",
            Self::CheckCast => "check-cast",
            Self::InstanceOf => "instance-of",
            Self::ArrayLength => "array-length",
            Self::NewInstance => "new-instance",
            Self::NewArray => "new-array",
            Self::FilledNewArray => "filled-new-array",
            Self::FilledNewArrayRange => "filled-new-array/range",
            Self::FillArrayData => "fill-array-data",
            Self::Throw => "throw",
            Self::Goto => "goto",
            Self::Goto16 => "goto/16",
            Self::Goto32 => "goto/32",
            Self::PackedSwitch => "packed-switch",
            Self::SparseSwitch => "sparse-switch",
            Self::CmplFloat => "cmpl-float",
            Self::CmpgFloat => "cmpg-float",
            Self::CmplDouble => "cmpl-double",
            Self::CmpgDouble => "cmpg-double",
            Self::CmpLong => "cmp-long",
            Self::IfEq => "if-eq",
            Self::IfNe => "if-ne",
            Self::IfLt => "if-lt",
            Self::IfGe => "if-ge",
            Self::IfGt => "if-gt",
            Self::IfLe => "if-le",
            Self::IfEqz => "if-eqz",
            Self::IfNez => "if-nez",
            Self::IfLtz => "if-ltz",
            Self::IfGez => "if-gez",
            Self::IfGtz => "if-gtz",
            Self::IfLez => "if-lez",
            Self::Aget => "aget",
            Self::AgetWide => "aget-wide",
            Self::AgetObject => "aget-object",
            Self::AgetBoolean => "aget-boolean",
            Self::AgetByte => "aget-byte",
            Self::AgetChar => "aget-char",
            Self::AgetShort => "aget-short",
            Self::Aput => "aput",
            Self::AputWide => "aput-wide",
            Self::AputObject => "aput-object",
            Self::AputBoolean => "aput-boolean",
            Self::AputByte => "aput-byte",
            Self::AputChar => "aput-char",
            Self::AputShort => "aput-short",
            Self::Iget => "iget",
            Self::IgetWide => "iget-wide",
            Self::IgetObject => "iget-object",
            Self::IgetBoolean => "iget-boolean",
            Self::IgetByte => "iget-byte",
            Self::IgetChar => "iget-char",
            Self::IgetShort => "iget-short",
            Self::Iput => "iput",
            Self::IputWide => "iput-wide",
            Self::IputObject => "iput-object",
            Self::IputBoolean => "iput-boolean",
            Self::IputByte => "iput-byte",
            Self::IputChar => "iput-char",
            Self::IputShort => "iput-short",
            Self::Sget => "sget",
            Self::SgetWide => "sget-wide",
            Self::SgetObject => "sget-object",
            Self::SgetBoolean => "sget-boolean",
            Self::SgetByte => "sget-byte",
            Self::SgetChar => "sget-char",
            Self::SgetShort => "sget-short",
            Self::Sput => "sput",
            Self::SputWide => "sput-wide",
            Self::SputObject => "sput-object",
            Self::SputBoolean => "sput-boolean",
            Self::SputByte => "sput-byte",
            Self::SputChar => "sput-char",
            Self::SputShort => "sput-short",
            Self::InvokeVirtual => "invoke-virtual",
            Self::InvokeSuper => "invoke-super",
            Self::InvokeDirect => "invoke-direct",
            Self::InvokeStatic => "invoke-static",
            Self::InvokeInterface => "invoke-interface",
            Self::InvokeVirtualRange => "invoke-virtual/range",
            Self::InvokeSuperRange => "invoke-super/range",
            Self::InvokeDirectRange => "invoke-direct/range",
            Self::InvokeStaticRange => "invoke-static/range",
            Self::InvokeInterfaceRange => "invoke-interface/range",
            Self::NegInt => "neg-int",
            Self::NotInt => "not-int",
            Self::NegLong => "neg-long",
            Self::NotLong => "not-long",
            Self::NegFloat => "neg-float",
            Self::NegDouble => "neg-double",
            Self::IntToLong => "int-to-long",
            Self::IntToFloat => "int-to-float",
            Self::IntToDouble => "int-to-double",
            Self::LongToInt => "long-to-int",
            Self::LongToFloat => "long-to-float",
            Self::LongToDouble => "long-to-double",
            Self::FloatToInt => "float-to-int",
            Self::FloatToLong => "float-to-long",
            Self::FloatToDouble => "float-to-double",
            Self::DoubleToInt => "double-to-int",
            Self::DoubleToLong => "double-to-long",
            Self::DoubleToFloat => "double-to-float",
            Self::IntToByte => "int-to-byte",
            Self::IntToChar => "int-to-char",
            Self::IntToShort => "int-to-short",
            Self::AddInt => "add-int",
            Self::SubInt => "sub-int",
            Self::MulInt => "mul-int",
            Self::DivInt => "div-int",
            Self::RemInt => "rem-int",
            Self::AndInt => "and-int",
            Self::OrInt => "or-int",
            Self::XorInt => "xor-int",
            Self::ShlInt => "shl-int",
            Self::ShrInt => "shr-int",
            Self::UshrInt => "ushr-int",
            Self::AddLong => "add-long",
            Self::SubLong => "sub-long",
            Self::MulLong => "mul-long",
            Self::DivLong => "div-long",
            Self::RemLong => "rem-long",
            Self::AndLong => "and-long",
            Self::OrLong => "or-long",
            Self::XorLong => "xor-long",
            Self::ShlLong => "shl-long",
            Self::ShrLong => "shr-long",
            Self::UshrLong => "ushr-long",
            Self::AddFloat => "add-float",
            Self::SubFloat => "sub-float",
            Self::MulFloat => "mul-float",
            Self::DivFloat => "div-float",
            Self::RemFloat => "rem-float",
            Self::AddDouble => "add-double",
            Self::SubDouble => "sub-double",
            Self::MulDouble => "mul-double",
            Self::DivDouble => "div-double",
            Self::RemDouble => "rem-double",
            Self::AddInt2Addr => "add-int/2addr",
            Self::SubInt2Addr => "sub-int/2addr",
            Self::MulInt2Addr => "mul-int/2addr",
            Self::DivInt2Addr => "div-int/2addr",
            Self::RemInt2Addr => "rem-int/2addr",
            Self::AndInt2Addr => "and-int/2addr",
            Self::OrInt2Addr => "or-int/2addr",
            Self::XorInt2Addr => "xor-int/2addr",
            Self::ShlInt2Addr => "shl-int/2addr",
            Self::ShrInt2Addr => "shr-int/2addr",
            Self::UshrInt2Addr => "ushr-int/2addr",
            Self::AddLong2Addr => "add-long/2addr",
            Self::SubLong2Addr => "sub-long/2addr",
            Self::MulLong2Addr => "mul-long/2addr",
            Self::DivLong2Addr => "div-long/2addr",
            Self::RemLong2Addr => "rem-long/2addr",
            Self::AndLong2Addr => "and-long/2addr",
            Self::OrLong2Addr => "or-long/2addr",
            Self::XorLong2Addr => "xor-long/2addr",
            Self::ShlLong2Addr => "shl-long/2addr",
            Self::ShrLong2Addr => "shr-long/2addr",
            Self::UshrLong2Addr => "ushr-long/2addr",
            Self::AddFloat2Addr => "add-float/2addr",
            Self::SubFloat2Addr => "sub-float/2addr",
            Self::MulFloat2Addr => "mul-float/2addr",
            Self::DivFloat2Addr => "div-float/2addr",
            Self::RemFloat2Addr => "rem-float/2addr",
            Self::AddDouble2Addr => "add-double/2addr",
            Self::SubDouble2Addr => "sub-double/2addr",
            Self::MulDouble2Addr => "mul-double/2addr",
            Self::DivDouble2Addr => "div-double/2addr",
            Self::RemDouble2Addr => "rem-double/2addr",
            Self::AddIntLit16 => "add-int/lit16",
            Self::RsubInt => "rsub-int",
            Self::MulIntLit16 => "mul-int/lit16",
            Self::DivIntLit16 => "div-int/lit16",
            Self::RemIntLit16 => "rem-int/lit16",
            Self::AndIntLit16 => "and-int/lit16",
            Self::OrIntLit16 => "or-int/lit16",
            Self::XorIntLit16 => "xor-int/lit16",
            Self::AddIntLit8 => "add-int/lit8",
            Self::RsubIntLit8 => "rsub-int/lit8",
            Self::MulIntLit8 => "mul-int/lit8",
            Self::DivIntLit8 => "div-int/lit8",
            Self::RemIntLit8 => "rem-int/lit8",
            Self::AndIntLit8 => "and-int/lit8",
            Self::OrIntLit8 => "or-int/lit8",
            Self::XorIntLit8 => "xor-int/lit8",
            Self::ShlIntLit8 => "shl-int/lit8",
            Self::ShrIntLit8 => "shr-int/lit8",
            Self::UshrIntLit8 => "ushr-int/lit8",
        }
    }

    /// Get the encoding format of the opcode
    pub fn format(self) -> Format {
        match self {
            Self::Nop | Self::ReturnVoid => Format::F10x,
            Self::Move | Self::MoveWide | Self::MoveObject | Self::ArrayLength | Self::NegInt
            | Self::NotInt | Self::NegLong | Self::NotLong | Self::NegFloat | Self::NegDouble
            | Self::IntToLong | Self::IntToFloat | Self::IntToDouble | Self::LongToInt
            | Self::LongToFloat | Self::LongToDouble | Self::FloatToInt | Self::FloatToLong
            | Self::FloatToDouble | Self::DoubleToInt | Self::DoubleToLong | Self::DoubleToFloat
            | Self::IntToByte | Self::IntToChar | Self::IntToShort | Self::AddInt2Addr
            | Self::SubInt2Addr | Self::MulInt2Addr | Self::DivInt2Addr | Self::RemInt2Addr
            | Self::AndInt2Addr | Self::OrInt2Addr | Self::XorInt2Addr | Self::ShlInt2Addr
            | Self::ShrInt2Addr | Self::UshrInt2Addr | Self::AddLong2Addr | Self::SubLong2Addr
            | Self::MulLong2Addr | Self::DivLong2Addr | Self::RemLong2Addr | Self::AndLong2Addr
            | Self::OrLong2Addr | Self::XorLong2Addr | Self::ShlLong2Addr | Self::ShrLong2Addr
            | Self::UshrLong2Addr | Self::AddFloat2Addr | Self::SubFloat2Addr
            | Self::MulFloat2Addr | Self::DivFloat2Addr | Self::RemFloat2Addr
            | Self::AddDouble2Addr | Self::SubDouble2Addr | Self::MulDouble2Addr
            | Self::DivDouble2Addr | Self::RemDouble2Addr => Format::F12x,
            Self::Const4 => Format::F11n,
            Self::MoveResult | Self::MoveResultWide | Self::MoveResultObject
            | Self::MoveException | Self::Return | Self::ReturnWide | Self::ReturnObject
            | Self::MonitorEnter | Self::MonitorExit | Self::Throw => Format::F11x,
            Self::Goto => Format::F10t,
            Self::Goto16 => Format::F20t,
            Self::MoveFrom16 | Self::MoveWideFrom16 | Self::MoveObjectFrom16 => Format::F22x,
            Self::IfEqz | Self::IfNez | Self::IfLtz | Self::IfGez | Self::IfGtz | Self::IfLez => Format::F21t,
            Self::Const16 | Self::ConstWide16 => Format::F21s,
            Self::ConstHigh16 | Self::ConstWideHigh16 => Format::F21h,
            Self::ConstString | Self::ConstClass | Self::CheckCast | Self::NewInstance
            | Self::Sget | Self::SgetWide | Self::SgetObject | Self::SgetBoolean
            | Self::SgetByte | Self::SgetChar | Self::SgetShort | Self::Sput | Self::SputWide
            | Self::SputObject | Self::SputBoolean | Self::SputByte | Self::SputChar
            | Self::SputShort => Format::F21c,
            Self::CmplFloat | Self::CmpgFloat | Self::CmplDouble | Self::CmpgDouble
            | Self::CmpLong | Self::Aget | Self::AgetWide | Self::AgetObject | Self::AgetBoolean
            | Self::AgetByte | Self::AgetChar | Self::AgetShort | Self::Aput | Self::AputWide
            | Self::AputObject | Self::AputBoolean | Self::AputByte | Self::AputChar
            | Self::AputShort | Self::AddInt | Self::SubInt | Self::MulInt | Self::DivInt
            | Self::RemInt | Self::AndInt | Self::OrInt | Self::XorInt | Self::ShlInt
            | Self::ShrInt | Self::UshrInt | Self::AddLong | Self::SubLong | Self::MulLong
            | Self::DivLong | Self::RemLong | Self::AndLong | Self::OrLong | Self::XorLong
            | Self::ShlLong | Self::ShrLong | Self::UshrLong | Self::AddFloat | Self::SubFloat
            | Self::MulFloat | Self::DivFloat | Self::RemFloat | Self::AddDouble
            | Self::SubDouble | Self::MulDouble | Self::DivDouble | Self::RemDouble => Format::F23x,
            Self::AddIntLit8 | Self::RsubIntLit8 | Self::MulIntLit8 | Self::DivIntLit8
            | Self::RemIntLit8 | Self::AndIntLit8 | Self::OrIntLit8 | Self::XorIntLit8
            | Self::ShlIntLit8 | Self::ShrIntLit8 | Self::UshrIntLit8 => Format::F22b,
            Self::IfEq | Self::IfNe | Self::IfLt | Self::IfGe | Self::IfGt | Self::IfLe => Format::F22t,
            Self::AddIntLit16 | Self::RsubInt | Self::MulIntLit16 | Self::DivIntLit16
            | Self::RemIntLit16 | Self::AndIntLit16 | Self::OrIntLit16 | Self::XorIntLit16 => Format::F22s,
            Self::InstanceOf | Self::NewArray | Self::Iget | Self::IgetWide | Self::IgetObject
            | Self::IgetBoolean | Self::IgetByte | Self::IgetChar | Self::IgetShort | Self::Iput
            | Self::IputWide | Self::IputObject | Self::IputBoolean | Self::IputByte
            | Self::IputChar | Self::IputShort => Format::F22c,
            Self::Goto32 => Format::F30t,
            Self::Move16 | Self::MoveWide16 | Self::MoveObject16 => Format::F32x,
            Self::Const | Self::ConstWide32 => Format::F31i,
            Self::FillArrayData | Self::PackedSwitch | Self::SparseSwitch => Format::F31t,
            Self::ConstStringJumbo => Format::F31c,
            Self::FilledNewArray | Self::InvokeVirtual | Self::InvokeSuper | Self::InvokeDirect
            | Self::InvokeStatic | Self::InvokeInterface => Format::F35c,
            Self::FilledNewArrayRange | Self::InvokeVirtualRange | Self::InvokeSuperRange
            | Self::InvokeDirectRange | Self::InvokeStaticRange | Self::InvokeInterfaceRange => Format::F3rc,
            Self::ConstWide => Format::F51l,
        }
    }

    /// Number of 16-bit code units the instruction occupies
    pub fn width(self) -> u32 {
        self.format().width()
    }

    /// Check if opcode is a method invocation
    pub fn is_invoke(self) -> bool {
        matches!(self.to_u8(), 0x6E..=0x72 | 0x74..=0x78)
    }

    /// Check if opcode returns from the current method
    pub fn is_return(self) -> bool {
        matches!(
            self,
            Self::ReturnVoid | Self::Return | Self::ReturnWide | Self::ReturnObject
        )
    }

    /// Check if opcode transfers control unconditionally
    pub fn is_terminator(self) -> bool {
        self.is_return() || matches!(self, Self::Goto | Self::Goto16 | Self::Goto32 | Self::Throw)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defined_opcode_count() {
        let defined = (0..=255u8).filter_map(Opcode::from_u8).count();
        assert_eq!(defined, 218);
    }

    #[test]
    fn test_opcode_byte_matches_discriminant() {
        for byte in 0..=255u8 {
            if let Some(opcode) = Opcode::from_u8(byte) {
                assert_eq!(opcode.to_u8(), byte, "{}", opcode);
            }
        }
    }

    #[test]
    fn test_unused_opcodes() {
        for byte in [0x3E, 0x43, 0x73, 0x79, 0x7A, 0xE3, 0xFF] {
            assert!(Opcode::from_u8(byte).is_none(), "0x{:02X}", byte);
        }
    }

    #[test]
    fn test_opcode_widths() {
        assert_eq!(Opcode::Nop.width(), 1);
        assert_eq!(Opcode::MoveFrom16.width(), 2);
        assert_eq!(Opcode::Move16.width(), 3);
        assert_eq!(Opcode::ConstWide.width(), 5);
        assert_eq!(Opcode::InvokeVirtual.width(), 3);
        assert_eq!(Opcode::InvokeStaticRange.width(), 3);
        assert_eq!(Opcode::FillArrayData.width(), 3);
        assert_eq!(Opcode::AddIntLit8.width(), 2);
        assert_eq!(Opcode::AddInt2Addr.width(), 1);
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(Opcode::MoveResultWide.name(), "move-result-wide");
        assert_eq!(Opcode::UshrLong2Addr.name(), "ushr-long/2addr");
        assert_eq!(Opcode::RsubInt.name(), "rsub-int");
        assert_eq!(Opcode::InvokeInterfaceRange.to_string(), "invoke-interface/range");
    }

    #[test]
    fn test_opcode_categories() {
        assert!(Opcode::InvokeSuper.is_invoke());
        assert!(Opcode::InvokeDirectRange.is_invoke());
        assert!(!Opcode::FilledNewArray.is_invoke());
        assert!(Opcode::ReturnObject.is_terminator());
        assert!(Opcode::Throw.is_terminator());
        assert!(!Opcode::IfEqz.is_terminator());
    }
}
