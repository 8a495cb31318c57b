//! dexvm bytecode definitions
//!
//! This crate provides the Dalvik instruction set, the DEX module format
//! decoder and a module writer used to produce test and tool inputs.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod builder;
pub mod descriptor;
pub mod dex;
pub mod loader;
pub mod opcode;
pub mod reader;

pub use builder::{Asm, BuildError, ClassBuilder, Code, DexBuilder, Label};
pub use descriptor::{DescriptorError, MethodDescriptor};
pub use dex::{
    CatchHandler, ClassDef, CodeItem, DexFile, EncodedField, EncodedMethod, EncodedValue,
    FieldRef, HandlerGroup, MethodRef, TryItem,
};
pub use loader::LoadError;
pub use opcode::{Format, Opcode};
pub use reader::{DecodeError, DexReader};
