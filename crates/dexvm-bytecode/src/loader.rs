//! DEX module loader
//!
//! Parses a complete module buffer into a [`DexFile`]. Only the header is
//! validated; everything after it is trusted and located through the explicit
//! offsets of each table, never through the map section.

use crate::descriptor;
use crate::dex::*;
use crate::reader::{DecodeError, DexReader};
use thiserror::Error;

/// `dex\n035\0`
pub const DEX_MAGIC: [u8; 8] = [0x64, 0x65, 0x78, 0x0A, 0x30, 0x33, 0x35, 0x00];

/// Size of the fixed header
pub const HEADER_SIZE: u32 = 0x70;

/// Little-endian tag
pub const ENDIAN_CONSTANT: u32 = 0x1234_5678;

/// String-builder class name rewritten on load
const LEGACY_BUILDER_CLASS: &str = "java/lang/StringBuilder";
/// Replacement for [`LEGACY_BUILDER_CLASS`]
const BUFFER_CLASS: &str = "java/lang/StringBuffer";

const VALUE_BYTE: u8 = 0x00;
const VALUE_SHORT: u8 = 0x02;
const VALUE_CHAR: u8 = 0x03;
const VALUE_INT: u8 = 0x04;
const VALUE_LONG: u8 = 0x06;
const VALUE_FLOAT: u8 = 0x10;
const VALUE_DOUBLE: u8 = 0x11;
const VALUE_STRING: u8 = 0x17;
const VALUE_NULL: u8 = 0x1E;
const VALUE_BOOLEAN: u8 = 0x1F;

/// Errors that can occur while loading a module
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// A header field did not have its required value
    #[error("illegal {field}: expected {expected:#x}, found {found:#x}")]
    IllegalHeader {
        /// Header field name
        field: &'static str,
        /// Required value
        expected: u32,
        /// Value in the buffer
        found: u32,
    },

    /// The magic number is not `dex\n035\0`
    #[error("illegal magic number")]
    IllegalMagic,

    /// Encoded value tag outside the supported set
    #[error("not supported value type: 0x{0:x}")]
    UnsupportedValueType(u8),

    /// A table index points past the end of its table
    #[error("{table} index {index} out of range")]
    IndexOutOfRange {
        /// Table name
        table: &'static str,
        /// Offending index
        index: u32,
    },

    /// A try item references a handler offset that starts no handler group
    #[error("no handler group at offset {0}")]
    MissingHandler(u16),

    /// Raw decoding failure
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl DexFile {
    /// Parse a DEX module
    pub fn parse(bytes: &[u8]) -> Result<DexFile, LoadError> {
        let mut loader = Loader {
            reader: DexReader::new(bytes),
            dex: DexFile::default(),
        };
        loader.read_header()?;
        loader.read_map()?;
        loader.read_strings()?;
        loader.read_types()?;
        loader.read_protos()?;
        loader.read_field_ids()?;
        loader.read_method_ids()?;
        loader.read_class_defs()?;

        let dex = loader.dex;
        log::debug!(
            "parsed module: {} strings, {} types, {} methods, {} classes",
            dex.strings.len(),
            dex.types.len(),
            dex.method_ids.len(),
            dex.class_defs.len()
        );
        Ok(dex)
    }
}

fn lookup<'t>(table: &'t [String], name: &'static str, index: u32) -> Result<&'t String, LoadError> {
    table
        .get(index as usize)
        .ok_or(LoadError::IndexOutOfRange { table: name, index })
}

struct Loader<'a> {
    reader: DexReader<'a>,
    dex: DexFile,
}

impl<'a> Loader<'a> {
    fn check_u32(&mut self, field: &'static str, expected: u32) -> Result<u32, LoadError> {
        let found = self.reader.read_u32()?;
        if found != expected {
            return Err(LoadError::IllegalHeader {
                field,
                expected,
                found,
            });
        }
        Ok(found)
    }

    fn type_at(&self, index: u32) -> Result<&String, LoadError> {
        lookup(&self.dex.types, "type", index)
    }

    fn class_at(&self, index: u32) -> Result<String, LoadError> {
        Ok(descriptor::class_name(self.type_at(index)?).to_string())
    }

    // ===== Header and Tables =====

    fn read_header(&mut self) -> Result<(), LoadError> {
        for expected in DEX_MAGIC {
            if self.reader.read_u8()? != expected {
                return Err(LoadError::IllegalMagic);
            }
        }

        let header = &mut self.dex.header;
        header.checksum = self.reader.read_u32()?;
        for byte in header.signature.iter_mut() {
            *byte = self.reader.read_u8()?;
        }

        let file_size = self.reader.len() as u32;
        self.dex.header.file_size = self.check_u32("file size", file_size)?;
        self.dex.header.header_size = self.check_u32("header size", HEADER_SIZE)?;
        self.check_u32("endian", ENDIAN_CONSTANT)?;
        self.check_u32("link size", 0)?;
        self.check_u32("link offset", 0)?;
        Ok(())
    }

    fn read_map(&mut self) -> Result<(), LoadError> {
        let map_off = self.reader.read_u32()?;
        self.dex.header.map_off = map_off;
        if map_off == 0 {
            return Ok(());
        }

        self.reader.push_offset(map_off as usize);
        let count = self.reader.read_u32()?;
        for _ in 0..count {
            let type_code = self.reader.read_u16()?;
            self.reader.skip(2)?;
            let size = self.reader.read_u32()?;
            let offset = self.reader.read_u32()?;
            self.dex.map.push(MapItem {
                type_code,
                size,
                offset,
            });
        }
        self.reader.pop_offset()?;
        Ok(())
    }

    fn read_strings(&mut self) -> Result<(), LoadError> {
        let count = self.reader.read_u32()?;
        let offset = self.reader.read_u32()?;
        self.reader.push_offset(offset as usize);
        for _ in 0..count {
            let data_off = self.reader.read_u32()?;
            self.reader.push_offset(data_off as usize);
            let length = self.reader.read_uleb128()?;
            let value = self.reader.read_mutf8(length as usize)?;
            self.dex.strings.push(rewrite_builder_class(value));
            self.reader.pop_offset()?;
        }
        self.reader.pop_offset()?;
        Ok(())
    }

    fn read_types(&mut self) -> Result<(), LoadError> {
        let count = self.reader.read_u32()?;
        let offset = self.reader.read_u32()?;
        self.reader.push_offset(offset as usize);
        for _ in 0..count {
            let index = self.reader.read_u32()?;
            let value = lookup(&self.dex.strings, "string", index)?.clone();
            self.dex.types.push(value);
        }
        self.reader.pop_offset()?;
        Ok(())
    }

    fn read_protos(&mut self) -> Result<(), LoadError> {
        let count = self.reader.read_u32()?;
        let offset = self.reader.read_u32()?;
        self.reader.push_offset(offset as usize);
        for _ in 0..count {
            // shorty
            self.reader.skip(4)?;
            let return_index = self.reader.read_u32()?;
            let params_off = self.reader.read_u32()?;

            let mut value = String::from("(");
            if params_off != 0 {
                self.reader.push_offset(params_off as usize);
                let size = self.reader.read_u32()?;
                for _ in 0..size {
                    let index = self.reader.read_u16()? as u32;
                    value.push_str(self.type_at(index)?);
                }
                self.reader.pop_offset()?;
            }
            value.push(')');
            value.push_str(self.type_at(return_index)?);
            self.dex.protos.push(value);
        }
        self.reader.pop_offset()?;
        Ok(())
    }

    fn read_field_ids(&mut self) -> Result<(), LoadError> {
        let count = self.reader.read_u32()?;
        let offset = self.reader.read_u32()?;
        if offset == 0 {
            return Ok(());
        }
        self.reader.push_offset(offset as usize);
        for _ in 0..count {
            let class_index = self.reader.read_u16()? as u32;
            let type_index = self.reader.read_u16()? as u32;
            let name_index = self.reader.read_u32()?;
            let class_name = self.class_at(class_index)?;
            let type_desc = self.type_at(type_index)?.clone();
            let name = lookup(&self.dex.strings, "string", name_index)?.clone();
            self.dex.field_ids.push(FieldRef {
                class_name,
                type_desc,
                name,
            });
        }
        self.reader.pop_offset()?;
        Ok(())
    }

    fn read_method_ids(&mut self) -> Result<(), LoadError> {
        let count = self.reader.read_u32()?;
        let offset = self.reader.read_u32()?;
        if offset == 0 {
            return Ok(());
        }
        self.reader.push_offset(offset as usize);
        for _ in 0..count {
            let class_index = self.reader.read_u16()? as u32;
            let proto_index = self.reader.read_u16()? as u32;
            let name_index = self.reader.read_u32()?;
            let class_name = self.class_at(class_index)?;
            let descriptor = lookup(&self.dex.protos, "proto", proto_index)?.clone();
            let name = lookup(&self.dex.strings, "string", name_index)?.clone();
            self.dex.method_ids.push(MethodRef {
                class_name,
                descriptor,
                name,
            });
        }
        self.reader.pop_offset()?;
        Ok(())
    }

    // ===== Class Definitions =====

    fn read_class_defs(&mut self) -> Result<(), LoadError> {
        let count = self.reader.read_u32()?;
        let offset = self.reader.read_u32()?;
        if offset == 0 {
            return Ok(());
        }
        self.reader.push_offset(offset as usize);
        for _ in 0..count {
            let class = self.read_class_def()?;
            self.dex.class_defs.push(class);
        }
        self.reader.pop_offset()?;
        Ok(())
    }

    fn read_class_def(&mut self) -> Result<ClassDef, LoadError> {
        let class_index = self.reader.read_u32()?;
        let name = self.class_at(class_index)?;
        let access_flags = self.reader.read_u32()?;
        let superclass_index = self.reader.read_u32()?;
        let superclass = if superclass_index == NO_INDEX {
            "java/lang/Object".to_string()
        } else {
            self.class_at(superclass_index)?
        };

        let mut interfaces = Vec::new();
        let interfaces_off = self.reader.read_u32()?;
        if interfaces_off != 0 {
            self.reader.push_offset(interfaces_off as usize);
            let size = self.reader.read_u32()?;
            for _ in 0..size {
                let index = self.reader.read_u16()? as u32;
                interfaces.push(self.class_at(index)?);
            }
            self.reader.pop_offset()?;
        }

        // source file, annotations
        self.reader.skip(8)?;

        let mut class = ClassDef {
            name,
            access_flags,
            is_interface: access_flags & (ACC_INTERFACE | ACC_ABSTRACT) != 0,
            superclass,
            interfaces,
            static_fields: Vec::new(),
            instance_fields: Vec::new(),
            direct_methods: Vec::new(),
            virtual_methods: Vec::new(),
            static_values: Vec::new(),
        };

        let class_data_off = self.reader.read_u32()?;
        if class_data_off != 0 {
            self.reader.push_offset(class_data_off as usize);
            let static_count = self.reader.read_uleb128()?;
            let instance_count = self.reader.read_uleb128()?;
            let direct_count = self.reader.read_uleb128()?;
            let virtual_count = self.reader.read_uleb128()?;
            class.static_fields = self.read_encoded_fields(static_count)?;
            class.instance_fields = self.read_encoded_fields(instance_count)?;
            class.direct_methods = self.read_encoded_methods(direct_count)?;
            class.virtual_methods = self.read_encoded_methods(virtual_count)?;
            self.reader.pop_offset()?;
        }

        let static_values_off = self.reader.read_u32()?;
        if static_values_off != 0 {
            self.reader.push_offset(static_values_off as usize);
            let size = self.reader.read_uleb128()?;
            if size as usize > class.static_fields.len() {
                return Err(LoadError::IndexOutOfRange {
                    table: "static field",
                    index: size - 1,
                });
            }
            for _ in 0..size {
                let value = self.read_encoded_value()?;
                class.static_values.push(value);
            }
            self.reader.pop_offset()?;
        }

        Ok(class)
    }

    fn read_encoded_fields(&mut self, count: u32) -> Result<Vec<EncodedField>, LoadError> {
        let mut fields = Vec::with_capacity(count as usize);
        let mut field_index = 0u32;
        for i in 0..count {
            let delta = self.reader.read_uleb128()?;
            field_index = if i == 0 { delta } else { field_index.wrapping_add(delta) };
            let access_flags = self.reader.read_uleb128()?;
            let field_ref = self
                .dex
                .field_ids
                .get(field_index as usize)
                .ok_or(LoadError::IndexOutOfRange {
                    table: "field",
                    index: field_index,
                })?;
            fields.push(EncodedField {
                field_index,
                access_flags,
                name: field_ref.name.clone(),
                type_desc: field_ref.type_desc.clone(),
            });
        }
        Ok(fields)
    }

    fn read_encoded_methods(&mut self, count: u32) -> Result<Vec<EncodedMethod>, LoadError> {
        let mut methods = Vec::with_capacity(count as usize);
        let mut method_index = 0u32;
        for i in 0..count {
            let delta = self.reader.read_uleb128()?;
            method_index = if i == 0 { delta } else { method_index.wrapping_add(delta) };
            let access_flags = self.reader.read_uleb128()?;
            let code_off = self.reader.read_uleb128()?;

            let method_ref = self
                .dex
                .method_ids
                .get(method_index as usize)
                .ok_or(LoadError::IndexOutOfRange {
                    table: "method",
                    index: method_index,
                })?;
            let name = method_ref.name.clone();
            let descriptor = method_ref.descriptor.clone();

            let code = if code_off != 0 {
                self.reader.push_offset(code_off as usize);
                let code = self.read_code_item()?;
                self.reader.pop_offset()?;
                Some(code)
            } else {
                None
            };

            methods.push(EncodedMethod {
                method_index,
                access_flags,
                name,
                descriptor,
                code,
            });
        }
        Ok(methods)
    }

    fn read_code_item(&mut self) -> Result<CodeItem, LoadError> {
        let registers_size = self.reader.read_u16()?;
        let ins_size = self.reader.read_u16()?;
        let outs_size = self.reader.read_u16()?;
        let tries_size = self.reader.read_u16()?;
        // debug info
        self.reader.skip(4)?;

        let insns_size = self.reader.read_u32()?;
        let mut insns = Vec::with_capacity(insns_size as usize);
        for _ in 0..insns_size {
            insns.push(self.reader.read_u16()?);
        }
        if insns_size % 2 != 0 && tries_size != 0 {
            self.reader.skip(2)?;
        }

        let mut raw_tries = Vec::with_capacity(tries_size as usize);
        for _ in 0..tries_size {
            let start = self.reader.read_u32()?;
            let count = self.reader.read_u16()? as u32;
            let handler_off = self.reader.read_u16()?;
            raw_tries.push((start, start + count, handler_off));
        }

        let mut handlers = Vec::new();
        let mut group_offsets = Vec::new();
        if tries_size != 0 {
            let base = self.reader.position();
            let list_size = self.reader.read_uleb128()?;
            for _ in 0..list_size {
                group_offsets.push(self.reader.position() - base);
                let size = self.reader.read_sleb128()?;
                let mut group = HandlerGroup::default();
                for _ in 0..size.unsigned_abs() {
                    let type_index = self.reader.read_uleb128()?;
                    let address = self.reader.read_uleb128()?;
                    group.catches.push(CatchHandler {
                        type_name: Some(self.class_at(type_index)?),
                        address,
                    });
                }
                if size <= 0 {
                    let address = self.reader.read_uleb128()?;
                    group.catches.push(CatchHandler {
                        type_name: None,
                        address,
                    });
                }
                handlers.push(group);
            }
        }

        let mut tries = Vec::with_capacity(raw_tries.len());
        for (start, end, handler_off) in raw_tries {
            let handler = group_offsets
                .iter()
                .position(|&offset| offset == handler_off as usize)
                .ok_or(LoadError::MissingHandler(handler_off))?;
            tries.push(TryItem {
                start,
                end,
                handler,
            });
        }

        Ok(CodeItem {
            registers_size,
            ins_size,
            outs_size,
            insns,
            tries,
            handlers,
        })
    }

    fn read_encoded_value(&mut self) -> Result<EncodedValue, LoadError> {
        let data = self.reader.read_u8()?;
        let value_type = data & 0x1F;
        let value_arg = (data >> 5) as usize;
        let width = value_arg + 1;
        let value = match value_type {
            VALUE_BYTE => EncodedValue::Byte(self.reader.read_i8()?),
            VALUE_SHORT => EncodedValue::Short(self.reader.read_signed(width)? as i16),
            VALUE_CHAR => EncodedValue::Char(self.reader.read_unsigned(width)? as u16),
            VALUE_INT => EncodedValue::Int(self.reader.read_signed(width)? as i32),
            VALUE_LONG => EncodedValue::Long(self.reader.read_signed(width)?),
            VALUE_FLOAT => {
                let bits = self.reader.read_right_extended(width, 4)? as u32;
                EncodedValue::Float(f32::from_bits(bits))
            }
            VALUE_DOUBLE => {
                let bits = self.reader.read_right_extended(width, 8)?;
                EncodedValue::Double(f64::from_bits(bits))
            }
            VALUE_STRING => {
                let index = self.reader.read_unsigned(width)? as u32;
                lookup(&self.dex.strings, "string", index)?;
                EncodedValue::String(index)
            }
            VALUE_NULL => EncodedValue::Null,
            VALUE_BOOLEAN => EncodedValue::Boolean(value_arg != 0),
            other => return Err(LoadError::UnsupportedValueType(other)),
        };
        Ok(value)
    }
}

/// Replace every occurrence of the legacy string-builder class name
fn rewrite_builder_class(value: String) -> String {
    if value.contains(LEGACY_BUILDER_CLASS) {
        value.replace(LEGACY_BUILDER_CLASS, BUFFER_CLASS)
    } else {
        value
    }
}
