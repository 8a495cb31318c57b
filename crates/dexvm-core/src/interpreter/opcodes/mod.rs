//! Opcode handler modules for the interpreter
//!
//! Each module implements a family of opcode handlers as methods on `Interpreter`.

pub mod arithmetic;
pub mod arrays;
pub mod calls;
pub mod comparison;
pub mod constants;
pub mod control_flow;
pub mod conversion;
pub mod exceptions;
pub mod fields;
pub mod moves;
pub mod objects;
