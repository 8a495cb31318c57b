//! DEX module writer
//!
//! `DexBuilder` interns strings, types, protos, field and method references,
//! accepts class definitions and lays out a complete module that
//! [`DexFile::parse`](crate::dex::DexFile::parse) accepts. `Asm` assembles
//! instruction streams with forward labels and switch/array payloads.
//!
//! ```
//! use dexvm_bytecode::builder::{Asm, ClassBuilder, Code, DexBuilder};
//! use dexvm_bytecode::{DexFile, Opcode};
//!
//! let mut dex = DexBuilder::new();
//! let mut asm = Asm::new();
//! asm.op10x(Opcode::ReturnVoid);
//! let code = Code::new(1, 1, 0, asm.finish().unwrap());
//! dex.add_class(
//!     ClassBuilder::new("Lcom/example/Main;")
//!         .direct_method("main", "([Ljava/lang/String;)V", 0x9, Some(code)),
//! );
//! let bytes = dex.build().unwrap();
//! let parsed = DexFile::parse(&bytes).unwrap();
//! assert_eq!(parsed.class_defs[0].name, "com/example/Main");
//! ```

use crate::descriptor::{DescriptorError, MethodDescriptor};
use crate::dex::{EncodedValue, ACC_PUBLIC, NO_INDEX};
use crate::loader::{DEX_MAGIC, ENDIAN_CONSTANT, HEADER_SIZE};
use crate::opcode::Opcode;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Errors reported when a module or code block cannot be assembled
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A branch refers to a label that was never bound
    #[error("Unbound label {0}")]
    UnboundLabel(usize),

    /// An 8- or 16-bit branch offset does not fit its field
    #[error("Branch offset {offset} does not fit at code unit {at}")]
    BranchOutOfRange {
        /// Code unit holding the offset
        at: usize,
        /// Required offset
        offset: i64,
    },

    /// A method descriptor could not be parsed
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

// ============================================================================
// Class and Code Specifications
// ============================================================================

/// Method body with its exception table
#[derive(Debug, Clone, Default)]
pub struct Code {
    registers: u16,
    ins: u16,
    outs: u16,
    insns: Vec<u16>,
    tries: Vec<(u32, u32, usize)>,
    handlers: Vec<(Vec<(String, u32)>, Option<u32>)>,
}

impl Code {
    /// Create a body from an assembled instruction stream
    pub fn new(registers: u16, ins: u16, outs: u16, insns: Vec<u16>) -> Self {
        Self {
            registers,
            ins,
            outs,
            insns,
            tries: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Protect `start..end` with a new handler group
    ///
    /// `catches` pairs a class descriptor with a handler address; `catch_all`
    /// is the address of the untyped handler. Ranges are written in call
    /// order, so nested ranges are added outer first.
    pub fn catch(mut self, start: u32, end: u32, catches: &[(&str, u32)], catch_all: Option<u32>) -> Self {
        let group = self.handlers.len();
        self.handlers.push((
            catches.iter().map(|(t, a)| (t.to_string(), *a)).collect(),
            catch_all,
        ));
        self.tries.push((start, end, group));
        self
    }

    /// Protect `start..end` with an existing handler group
    pub fn catch_with_group(mut self, start: u32, end: u32, group: usize) -> Self {
        self.tries.push((start, end, group));
        self
    }
}

enum InitialValue {
    Encoded(EncodedValue),
    Str(String),
}

struct FieldSpec {
    name: String,
    type_desc: String,
    access_flags: u32,
    value: Option<InitialValue>,
}

struct MethodSpec {
    name: String,
    descriptor: String,
    access_flags: u32,
    code: Option<Code>,
}

/// Class definition under construction
pub struct ClassBuilder {
    descriptor: String,
    access_flags: u32,
    superclass: Option<String>,
    interfaces: Vec<String>,
    static_fields: Vec<FieldSpec>,
    instance_fields: Vec<FieldSpec>,
    direct_methods: Vec<MethodSpec>,
    virtual_methods: Vec<MethodSpec>,
}

impl ClassBuilder {
    /// Start a public class extending `java/lang/Object`
    pub fn new(descriptor: &str) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            access_flags: ACC_PUBLIC,
            superclass: Some("Ljava/lang/Object;".to_string()),
            interfaces: Vec::new(),
            static_fields: Vec::new(),
            instance_fields: Vec::new(),
            direct_methods: Vec::new(),
            virtual_methods: Vec::new(),
        }
    }

    /// Replace the class access flags
    pub fn access(mut self, access_flags: u32) -> Self {
        self.access_flags = access_flags;
        self
    }

    /// Set the superclass descriptor
    pub fn superclass(mut self, descriptor: &str) -> Self {
        self.superclass = Some(descriptor.to_string());
        self
    }

    /// Write `NO_INDEX` as the superclass
    pub fn no_superclass(mut self) -> Self {
        self.superclass = None;
        self
    }

    /// Add an implemented interface
    pub fn interface(mut self, descriptor: &str) -> Self {
        self.interfaces.push(descriptor.to_string());
        self
    }

    /// Add a static field, optionally with an initial value
    pub fn static_field(mut self, name: &str, type_desc: &str, value: Option<EncodedValue>) -> Self {
        self.static_fields.push(FieldSpec {
            name: name.to_string(),
            type_desc: type_desc.to_string(),
            access_flags: crate::dex::ACC_STATIC,
            value: value.map(InitialValue::Encoded),
        });
        self
    }

    /// Add a static `String` field initialised to `value`
    pub fn static_string(mut self, name: &str, value: &str) -> Self {
        self.static_fields.push(FieldSpec {
            name: name.to_string(),
            type_desc: "Ljava/lang/String;".to_string(),
            access_flags: crate::dex::ACC_STATIC,
            value: Some(InitialValue::Str(value.to_string())),
        });
        self
    }

    /// Add an instance field
    pub fn instance_field(mut self, name: &str, type_desc: &str) -> Self {
        self.instance_fields.push(FieldSpec {
            name: name.to_string(),
            type_desc: type_desc.to_string(),
            access_flags: 0,
            value: None,
        });
        self
    }

    /// Add a static, private or constructor method
    pub fn direct_method(mut self, name: &str, descriptor: &str, access_flags: u32, code: Option<Code>) -> Self {
        self.direct_methods.push(MethodSpec {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access_flags,
            code,
        });
        self
    }

    /// Add an overridable method
    pub fn virtual_method(mut self, name: &str, descriptor: &str, access_flags: u32, code: Option<Code>) -> Self {
        self.virtual_methods.push(MethodSpec {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access_flags,
            code,
        });
        self
    }
}

// ============================================================================
// Module Builder
// ============================================================================

struct CodeEntry {
    code: Code,
    catch_types: Vec<Vec<u32>>,
}

struct ClassEntry {
    class_idx: u32,
    access_flags: u32,
    superclass_idx: u32,
    interfaces: Vec<u32>,
    static_fields: Vec<(u32, u32)>,
    static_values: Vec<EncodedValue>,
    instance_fields: Vec<(u32, u32)>,
    direct_methods: Vec<(u32, u32, Option<CodeEntry>)>,
    virtual_methods: Vec<(u32, u32, Option<CodeEntry>)>,
}

/// Interning module writer
#[derive(Default)]
pub struct DexBuilder {
    strings: Vec<String>,
    string_index: FxHashMap<String, u32>,
    types: Vec<u32>,
    type_index: FxHashMap<String, u32>,
    protos: Vec<(u32, u32, Vec<u32>)>,
    proto_index: FxHashMap<String, u32>,
    fields: Vec<(u32, u32, u32)>,
    field_index: FxHashMap<(String, String, String), u32>,
    methods: Vec<(u32, u32, u32)>,
    method_index: FxHashMap<(String, String, String), u32>,
    classes: Vec<ClassEntry>,
    errors: Vec<DescriptorError>,
}

impl DexBuilder {
    /// Create an empty module
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string
    pub fn string(&mut self, value: &str) -> u32 {
        if let Some(&index) = self.string_index.get(value) {
            return index;
        }
        let index = self.strings.len() as u32;
        self.strings.push(value.to_string());
        self.string_index.insert(value.to_string(), index);
        index
    }

    /// Intern a type descriptor
    pub fn type_id(&mut self, descriptor: &str) -> u32 {
        if let Some(&index) = self.type_index.get(descriptor) {
            return index;
        }
        let string = self.string(descriptor);
        let index = self.types.len() as u32;
        self.types.push(string);
        self.type_index.insert(descriptor.to_string(), index);
        index
    }

    /// Intern a method descriptor
    pub fn proto(&mut self, descriptor: &str) -> u32 {
        if let Some(&index) = self.proto_index.get(descriptor) {
            return index;
        }
        let parsed = match MethodDescriptor::parse(descriptor) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.errors.push(err);
                MethodDescriptor {
                    params: Vec::new(),
                    return_type: "V".to_string(),
                }
            }
        };
        let shorty = self.string(&parsed.shorty());
        let return_type = self.type_id(&parsed.return_type);
        let params = parsed.params.iter().map(|p| self.type_id(p)).collect();
        let index = self.protos.len() as u32;
        self.protos.push((shorty, return_type, params));
        self.proto_index.insert(descriptor.to_string(), index);
        index
    }

    /// Intern a field reference (`class` and `type_desc` in descriptor form)
    pub fn field(&mut self, class: &str, name: &str, type_desc: &str) -> u32 {
        let key = (class.to_string(), name.to_string(), type_desc.to_string());
        if let Some(&index) = self.field_index.get(&key) {
            return index;
        }
        let entry = (self.type_id(class), self.type_id(type_desc), self.string(name));
        let index = self.fields.len() as u32;
        self.fields.push(entry);
        self.field_index.insert(key, index);
        index
    }

    /// Intern a method reference (`class` in descriptor form)
    pub fn method(&mut self, class: &str, name: &str, descriptor: &str) -> u32 {
        let key = (class.to_string(), name.to_string(), descriptor.to_string());
        if let Some(&index) = self.method_index.get(&key) {
            return index;
        }
        let entry = (self.type_id(class), self.proto(descriptor), self.string(name));
        let index = self.methods.len() as u32;
        self.methods.push(entry);
        self.method_index.insert(key, index);
        index
    }

    /// Add a class definition, interning everything it references
    pub fn add_class(&mut self, class: ClassBuilder) {
        let class_idx = self.type_id(&class.descriptor);
        let superclass_idx = match &class.superclass {
            Some(superclass) => self.type_id(superclass),
            None => NO_INDEX,
        };
        let interfaces = class.interfaces.iter().map(|i| self.type_id(i)).collect();

        let mut statics: Vec<(u32, u32, Option<EncodedValue>, String)> = Vec::new();
        for field in &class.static_fields {
            let index = self.field(&class.descriptor, &field.name, &field.type_desc);
            let value = match &field.value {
                Some(InitialValue::Encoded(value)) => Some(value.clone()),
                Some(InitialValue::Str(s)) => Some(EncodedValue::String(self.string(s))),
                None => None,
            };
            statics.push((index, field.access_flags, value, field.type_desc.clone()));
        }
        statics.sort_by_key(|s| s.0);
        let last_value = statics.iter().rposition(|s| s.2.is_some());
        let static_values = match last_value {
            Some(last) => statics[..=last]
                .iter()
                .map(|s| s.2.clone().unwrap_or_else(|| default_value(&s.3)))
                .collect(),
            None => Vec::new(),
        };
        let static_fields = statics.iter().map(|s| (s.0, s.1)).collect();

        let mut instance_fields: Vec<(u32, u32)> = class
            .instance_fields
            .iter()
            .map(|f| (self.field(&class.descriptor, &f.name, &f.type_desc), f.access_flags))
            .collect();
        instance_fields.sort_by_key(|f| f.0);

        let direct_methods = self.intern_methods(&class.descriptor, class.direct_methods);
        let virtual_methods = self.intern_methods(&class.descriptor, class.virtual_methods);

        self.classes.push(ClassEntry {
            class_idx,
            access_flags: class.access_flags,
            superclass_idx,
            interfaces,
            static_fields,
            static_values,
            instance_fields,
            direct_methods,
            virtual_methods,
        });
    }

    fn intern_methods(&mut self, class: &str, methods: Vec<MethodSpec>) -> Vec<(u32, u32, Option<CodeEntry>)> {
        let mut entries: Vec<(u32, u32, Option<CodeEntry>)> = methods
            .into_iter()
            .map(|m| {
                let index = self.method(class, &m.name, &m.descriptor);
                let code = m.code.map(|code| {
                    let catch_types = code
                        .handlers
                        .iter()
                        .map(|(catches, _)| catches.iter().map(|(t, _)| self.type_id(t)).collect())
                        .collect();
                    CodeEntry { code, catch_types }
                });
                (index, m.access_flags, code)
            })
            .collect();
        entries.sort_by_key(|m| m.0);
        entries
    }

    /// Lay out the module
    pub fn build(&self) -> Result<Vec<u8>, BuildError> {
        if let Some(err) = self.errors.first() {
            return Err(err.clone().into());
        }

        let string_ids_off = HEADER_SIZE as usize;
        let type_ids_off = string_ids_off + 4 * self.strings.len();
        let proto_ids_off = type_ids_off + 4 * self.types.len();
        let field_ids_off = proto_ids_off + 12 * self.protos.len();
        let method_ids_off = field_ids_off + 8 * self.fields.len();
        let class_defs_off = method_ids_off + 8 * self.methods.len();
        let data_off = align4(class_defs_off + 32 * self.classes.len());

        let mut data = Writer::at(data_off);

        let mut string_offsets = Vec::with_capacity(self.strings.len());
        for s in &self.strings {
            string_offsets.push(data.offset());
            let units: Vec<u16> = s.encode_utf16().collect();
            data.uleb128(units.len() as u32);
            data.bytes(&encode_mutf8(&units));
            data.u8(0);
        }

        let mut proto_params = Vec::with_capacity(self.protos.len());
        for (_, _, params) in &self.protos {
            proto_params.push(data.type_list(params));
        }

        let mut class_records = Vec::with_capacity(self.classes.len());
        for class in &self.classes {
            let interfaces_off = data.type_list(&class.interfaces);
            let class_data_off = self.write_class_data(&mut data, class);
            let static_values_off = if class.static_values.is_empty() {
                0
            } else {
                let offset = data.offset();
                data.uleb128(class.static_values.len() as u32);
                for value in &class.static_values {
                    data.encoded_value(value);
                }
                offset
            };
            class_records.push((interfaces_off, class_data_off, static_values_off));
        }

        data.align4();
        let map_off = data.offset();
        let sections = [
            (0x0000u16, 1usize, 0usize),
            (0x0001, self.strings.len(), string_ids_off),
            (0x0002, self.types.len(), type_ids_off),
            (0x0003, self.protos.len(), proto_ids_off),
            (0x0004, self.fields.len(), field_ids_off),
            (0x0005, self.methods.len(), method_ids_off),
            (0x0006, self.classes.len(), class_defs_off),
            (0x1000, 1, map_off),
        ];
        let present: Vec<_> = sections.iter().filter(|s| s.1 != 0).collect();
        data.u32(present.len() as u32);
        for (type_code, size, offset) in present {
            data.u16(*type_code);
            data.u16(0);
            data.u32(*size as u32);
            data.u32(*offset as u32);
        }

        let file_size = data.offset();
        let data_size = file_size - data_off;

        let mut out = Writer::at(0);
        out.bytes(&DEX_MAGIC);
        out.u32(0);
        out.bytes(&[0u8; 20]);
        out.u32(file_size as u32);
        out.u32(HEADER_SIZE);
        out.u32(ENDIAN_CONSTANT);
        out.u32(0);
        out.u32(0);
        out.u32(map_off as u32);
        for (count, offset) in [
            (self.strings.len(), string_ids_off),
            (self.types.len(), type_ids_off),
            (self.protos.len(), proto_ids_off),
            (self.fields.len(), field_ids_off),
            (self.methods.len(), method_ids_off),
            (self.classes.len(), class_defs_off),
        ] {
            out.u32(count as u32);
            out.u32(if count == 0 { 0 } else { offset as u32 });
        }
        out.u32(data_size as u32);
        out.u32(data_off as u32);

        for offset in string_offsets {
            out.u32(offset as u32);
        }
        for string in &self.types {
            out.u32(*string);
        }
        for ((shorty, return_type, _), params_off) in self.protos.iter().zip(proto_params) {
            out.u32(*shorty);
            out.u32(*return_type);
            out.u32(params_off as u32);
        }
        for (class, type_desc, name) in &self.fields {
            out.u16(*class as u16);
            out.u16(*type_desc as u16);
            out.u32(*name);
        }
        for (class, proto, name) in &self.methods {
            out.u16(*class as u16);
            out.u16(*proto as u16);
            out.u32(*name);
        }
        for (class, (interfaces_off, class_data_off, static_values_off)) in
            self.classes.iter().zip(class_records)
        {
            out.u32(class.class_idx);
            out.u32(class.access_flags);
            out.u32(class.superclass_idx);
            out.u32(interfaces_off as u32);
            out.u32(NO_INDEX);
            out.u32(0);
            out.u32(class_data_off as u32);
            out.u32(static_values_off as u32);
        }
        while out.offset() < data_off {
            out.u8(0);
        }

        let mut bytes = out.buffer;
        bytes.extend_from_slice(&data.buffer);
        let checksum = adler32(&bytes[12..]);
        bytes[8..12].copy_from_slice(&checksum.to_le_bytes());
        Ok(bytes)
    }

    fn write_class_data(&self, data: &mut Writer, class: &ClassEntry) -> usize {
        if class.static_fields.is_empty()
            && class.instance_fields.is_empty()
            && class.direct_methods.is_empty()
            && class.virtual_methods.is_empty()
        {
            return 0;
        }

        // code items first so their offsets are known
        let direct_code: Vec<usize> = class
            .direct_methods
            .iter()
            .map(|m| m.2.as_ref().map_or(0, |c| data.code_item(c)))
            .collect();
        let virtual_code: Vec<usize> = class
            .virtual_methods
            .iter()
            .map(|m| m.2.as_ref().map_or(0, |c| data.code_item(c)))
            .collect();

        let offset = data.offset();
        data.uleb128(class.static_fields.len() as u32);
        data.uleb128(class.instance_fields.len() as u32);
        data.uleb128(class.direct_methods.len() as u32);
        data.uleb128(class.virtual_methods.len() as u32);
        for fields in [&class.static_fields, &class.instance_fields] {
            let mut previous = 0;
            for (i, (index, flags)) in fields.iter().enumerate() {
                data.uleb128(if i == 0 { *index } else { index - previous });
                data.uleb128(*flags);
                previous = *index;
            }
        }
        for (methods, code_offsets) in [
            (&class.direct_methods, &direct_code),
            (&class.virtual_methods, &virtual_code),
        ] {
            let mut previous = 0;
            for (i, ((index, flags, _), code_off)) in methods.iter().zip(code_offsets).enumerate() {
                data.uleb128(if i == 0 { *index } else { index - previous });
                data.uleb128(*flags);
                data.uleb128(*code_off as u32);
                previous = *index;
            }
        }
        offset
    }
}

fn default_value(type_desc: &str) -> EncodedValue {
    match type_desc.as_bytes().first() {
        Some(b'Z') => EncodedValue::Boolean(false),
        Some(b'B') => EncodedValue::Byte(0),
        Some(b'S') => EncodedValue::Short(0),
        Some(b'C') => EncodedValue::Char(0),
        Some(b'I') => EncodedValue::Int(0),
        Some(b'J') => EncodedValue::Long(0),
        Some(b'F') => EncodedValue::Float(0.0),
        Some(b'D') => EncodedValue::Double(0.0),
        _ => EncodedValue::Null,
    }
}

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

fn encode_mutf8(units: &[u16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(units.len());
    for &unit in units {
        match unit {
            0x0001..=0x007F => bytes.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                bytes.push(0xC0 | (unit >> 6) as u8);
                bytes.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                bytes.push(0xE0 | (unit >> 12) as u8);
                bytes.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                bytes.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    bytes
}

fn adler32(bytes: &[u8]) -> u32 {
    const MOD: u32 = 65521;
    let (mut a, mut b) = (1u32, 0u32);
    for &byte in bytes {
        a = (a + byte as u32) % MOD;
        b = (b + a) % MOD;
    }
    (b << 16) | a
}

/// Byte buffer that knows its absolute file offset
struct Writer {
    base: usize,
    buffer: Vec<u8>,
}

impl Writer {
    fn at(base: usize) -> Self {
        Self {
            base,
            buffer: Vec::new(),
        }
    }

    fn offset(&self) -> usize {
        self.base + self.buffer.len()
    }

    fn align4(&mut self) {
        while self.offset() % 4 != 0 {
            self.buffer.push(0);
        }
    }

    fn u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn uleb128(&mut self, mut value: u32) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.buffer.push(byte);
                return;
            }
            self.buffer.push(byte | 0x80);
        }
    }

    fn sleb128(&mut self, mut value: i32) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
            if done {
                self.buffer.push(byte);
                return;
            }
            self.buffer.push(byte | 0x80);
        }
    }

    /// Write a type list, returning 0 for an empty list
    fn type_list(&mut self, types: &[u32]) -> usize {
        if types.is_empty() {
            return 0;
        }
        self.align4();
        let offset = self.offset();
        self.u32(types.len() as u32);
        for &t in types {
            self.u16(t as u16);
        }
        offset
    }

    fn code_item(&mut self, entry: &CodeEntry) -> usize {
        let code = &entry.code;
        self.align4();
        let offset = self.offset();
        self.u16(code.registers);
        self.u16(code.ins);
        self.u16(code.outs);
        self.u16(code.tries.len() as u16);
        self.u32(0);
        self.u32(code.insns.len() as u32);
        for &word in &code.insns {
            self.u16(word);
        }
        if code.tries.is_empty() {
            return offset;
        }
        if code.insns.len() % 2 != 0 {
            self.u16(0);
        }

        let mut list = Writer::at(0);
        let mut group_offsets = Vec::with_capacity(code.handlers.len());
        list.uleb128(code.handlers.len() as u32);
        for ((catches, catch_all), types) in code.handlers.iter().zip(&entry.catch_types) {
            group_offsets.push(list.offset());
            let count = catches.len() as i32;
            list.sleb128(if catch_all.is_some() { -count } else { count });
            for ((_, address), type_idx) in catches.iter().zip(types) {
                list.uleb128(*type_idx);
                list.uleb128(*address);
            }
            if let Some(address) = catch_all {
                list.uleb128(*address);
            }
        }

        for &(start, end, group) in &code.tries {
            self.u32(start);
            self.u16((end - start) as u16);
            self.u16(group_offsets.get(group).copied().unwrap_or(0) as u16);
        }
        self.bytes(&list.buffer);
        offset
    }

    fn encoded_value(&mut self, value: &EncodedValue) {
        match *value {
            EncodedValue::Byte(v) => {
                self.u8(0x00);
                self.u8(v as u8);
            }
            EncodedValue::Short(v) => self.signed(0x02, v as i64),
            EncodedValue::Char(v) => self.unsigned(0x03, v as u64),
            EncodedValue::Int(v) => self.signed(0x04, v as i64),
            EncodedValue::Long(v) => self.signed(0x06, v),
            EncodedValue::Float(v) => self.right_zero_extended(0x10, v.to_bits() as u64, 4),
            EncodedValue::Double(v) => self.right_zero_extended(0x11, v.to_bits(), 8),
            EncodedValue::String(index) => self.unsigned(0x17, index as u64),
            EncodedValue::Null => self.u8(0x1E),
            EncodedValue::Boolean(v) => self.u8(((v as u8) << 5) | 0x1F),
        }
    }

    fn signed(&mut self, value_type: u8, value: i64) {
        let mut width = 1;
        while width < 8 {
            let shift = 64 - 8 * width;
            if (value << shift) >> shift == value {
                break;
            }
            width += 1;
        }
        self.u8((((width - 1) as u8) << 5) | value_type);
        for i in 0..width {
            self.u8((value >> (8 * i)) as u8);
        }
    }

    fn unsigned(&mut self, value_type: u8, value: u64) {
        let mut width = 1;
        while width < 8 && value >> (8 * width) != 0 {
            width += 1;
        }
        self.u8((((width - 1) as u8) << 5) | value_type);
        for i in 0..width {
            self.u8((value >> (8 * i)) as u8);
        }
    }

    fn right_zero_extended(&mut self, value_type: u8, bits: u64, size: usize) {
        let mut width = size;
        while width > 1 && (bits >> (8 * (size - width))) & 0xFF == 0 {
            width -= 1;
        }
        let high = bits >> (8 * (size - width));
        self.u8((((width - 1) as u8) << 5) | value_type);
        for i in 0..width {
            self.u8((high >> (8 * i)) as u8);
        }
    }
}

// ============================================================================
// Instruction Assembler
// ============================================================================

/// Forward-referenceable code position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Clone, Copy)]
enum Patch {
    /// High byte of the opcode unit
    Byte,
    /// One full code unit
    Unit,
    /// Two code units, low first
    Pair,
}

struct Fixup {
    base: u32,
    at: usize,
    patch: Patch,
    label: Label,
}

enum Payload {
    Packed { first_key: i32, targets: Vec<Label> },
    Sparse { entries: Vec<(i32, Label)> },
    ArrayData { element_width: u16, values: Vec<i64> },
}

/// Instruction stream assembler
///
/// Emitters are named after the instruction format; the fields follow the
/// format's operand order.
#[derive(Default)]
pub struct Asm {
    words: Vec<u16>,
    labels: Vec<Option<u32>>,
    fixups: Vec<Fixup>,
    payloads: Vec<(u32, usize, Payload)>,
}

impl Asm {
    /// Create an empty stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position in code units
    pub fn pos(&self) -> u32 {
        self.words.len() as u32
    }

    /// Create an unbound label
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind a label to the current position
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.pos());
    }

    fn unit(&mut self, op: Opcode, high: u8) {
        self.words.push(op.to_u8() as u16 | ((high as u16) << 8));
    }

    fn fixup(&mut self, base: u32, patch: Patch, label: Label) {
        let at = match patch {
            Patch::Byte => self.words.len() - 1,
            Patch::Unit | Patch::Pair => self.words.len(),
        };
        self.fixups.push(Fixup {
            base,
            at,
            patch,
            label,
        });
        match patch {
            Patch::Byte => {}
            Patch::Unit => self.words.push(0),
            Patch::Pair => self.words.extend([0, 0]),
        }
    }

    // ===== Formats =====

    /// `op`
    pub fn op10x(&mut self, op: Opcode) {
        self.unit(op, 0);
    }

    /// `op vA, vB` with 4-bit registers
    pub fn op12x(&mut self, op: Opcode, a: u8, b: u8) {
        self.unit(op, (a & 0xF) | (b << 4));
    }

    /// `op vA, #+B` with a 4-bit literal
    pub fn op11n(&mut self, op: Opcode, a: u8, literal: i8) {
        self.unit(op, (a & 0xF) | ((literal as u8) << 4));
    }

    /// `op vAA`
    pub fn op11x(&mut self, op: Opcode, a: u8) {
        self.unit(op, a);
    }

    /// `op vAA, vBBBB`
    pub fn op22x(&mut self, op: Opcode, a: u8, b: u16) {
        self.unit(op, a);
        self.words.push(b);
    }

    /// `op vAAAA, vBBBB`
    pub fn op32x(&mut self, op: Opcode, a: u16, b: u16) {
        self.unit(op, 0);
        self.words.extend([a, b]);
    }

    /// `op vAA, #+BBBB`
    pub fn op21s(&mut self, op: Opcode, a: u8, literal: i16) {
        self.unit(op, a);
        self.words.push(literal as u16);
    }

    /// `op vAA, #+BBBB0000` (or the 64-bit `...000000000000` form)
    pub fn op21h(&mut self, op: Opcode, a: u8, high: u16) {
        self.unit(op, a);
        self.words.push(high);
    }

    /// `op vAA, kind@BBBB`
    pub fn op21c(&mut self, op: Opcode, a: u8, index: u32) {
        self.unit(op, a);
        self.words.push(index as u16);
    }

    /// `op vAA, #+BBBBBBBB`
    pub fn op31i(&mut self, op: Opcode, a: u8, literal: i32) {
        self.unit(op, a);
        self.words.extend([literal as u16, (literal >> 16) as u16]);
    }

    /// `op vAA, string@BBBBBBBB`
    pub fn op31c(&mut self, op: Opcode, a: u8, index: u32) {
        self.unit(op, a);
        self.words.extend([index as u16, (index >> 16) as u16]);
    }

    /// `op vAA, #+BBBBBBBBBBBBBBBB`
    pub fn op51l(&mut self, op: Opcode, a: u8, literal: i64) {
        self.unit(op, a);
        for i in 0..4 {
            self.words.push((literal >> (16 * i)) as u16);
        }
    }

    /// `op vAA, vBB, vCC`
    pub fn op23x(&mut self, op: Opcode, a: u8, b: u8, c: u8) {
        self.unit(op, a);
        self.words.push(b as u16 | ((c as u16) << 8));
    }

    /// `op vAA, vBB, #+CC`
    pub fn op22b(&mut self, op: Opcode, a: u8, b: u8, literal: i8) {
        self.unit(op, a);
        self.words.push(b as u16 | ((literal as u8 as u16) << 8));
    }

    /// `op vA, vB, #+CCCC`
    pub fn op22s(&mut self, op: Opcode, a: u8, b: u8, literal: i16) {
        self.unit(op, (a & 0xF) | (b << 4));
        self.words.push(literal as u16);
    }

    /// `op vA, vB, kind@CCCC`
    pub fn op22c(&mut self, op: Opcode, a: u8, b: u8, index: u32) {
        self.unit(op, (a & 0xF) | (b << 4));
        self.words.push(index as u16);
    }

    /// `op {vC, vD, vE, vF, vG}, kind@BBBB`
    pub fn op35c(&mut self, op: Opcode, index: u32, registers: &[u8]) {
        let count = registers.len().min(5) as u8;
        let g = if count == 5 { registers[4] & 0xF } else { 0 };
        self.unit(op, g | (count << 4));
        self.words.push(index as u16);
        let mut packed = 0u16;
        for (i, &r) in registers.iter().take(4).enumerate() {
            packed |= ((r & 0xF) as u16) << (4 * i);
        }
        self.words.push(packed);
    }

    /// `op {vCCCC .. vNNNN}, kind@BBBB`
    pub fn op3rc(&mut self, op: Opcode, index: u32, first: u16, count: u8) {
        self.unit(op, count);
        self.words.extend([index as u16, first]);
    }

    // ===== Branches =====

    /// `op +AA`
    pub fn op10t(&mut self, op: Opcode, target: Label) {
        let base = self.pos();
        self.unit(op, 0);
        self.fixup(base, Patch::Byte, target);
    }

    /// `op +AAAA`
    pub fn op20t(&mut self, op: Opcode, target: Label) {
        let base = self.pos();
        self.unit(op, 0);
        self.fixup(base, Patch::Unit, target);
    }

    /// `op +AAAAAAAA`
    pub fn op30t(&mut self, op: Opcode, target: Label) {
        let base = self.pos();
        self.unit(op, 0);
        self.fixup(base, Patch::Pair, target);
    }

    /// `op vAA, +BBBB`
    pub fn op21t(&mut self, op: Opcode, a: u8, target: Label) {
        let base = self.pos();
        self.unit(op, a);
        self.fixup(base, Patch::Unit, target);
    }

    /// `op vA, vB, +CCCC`
    pub fn op22t(&mut self, op: Opcode, a: u8, b: u8, target: Label) {
        let base = self.pos();
        self.unit(op, (a & 0xF) | (b << 4));
        self.fixup(base, Patch::Unit, target);
    }

    // ===== Payload Instructions =====

    /// `packed-switch vAA` over consecutive keys starting at `first_key`
    pub fn packed_switch(&mut self, a: u8, first_key: i32, targets: &[Label]) {
        self.payload_insn(
            Opcode::PackedSwitch,
            a,
            Payload::Packed {
                first_key,
                targets: targets.to_vec(),
            },
        );
    }

    /// `sparse-switch vAA` over `(key, target)` pairs sorted by key
    pub fn sparse_switch(&mut self, a: u8, entries: &[(i32, Label)]) {
        self.payload_insn(
            Opcode::SparseSwitch,
            a,
            Payload::Sparse {
                entries: entries.to_vec(),
            },
        );
    }

    /// `fill-array-data vAA` with elements of `element_width` bytes
    pub fn fill_array_data(&mut self, a: u8, element_width: u16, values: &[i64]) {
        self.payload_insn(
            Opcode::FillArrayData,
            a,
            Payload::ArrayData {
                element_width,
                values: values.to_vec(),
            },
        );
    }

    fn payload_insn(&mut self, op: Opcode, a: u8, payload: Payload) {
        let base = self.pos();
        self.unit(op, a);
        let at = self.words.len();
        self.words.extend([0, 0]);
        self.payloads.push((base, at, payload));
    }

    /// Resolve labels, append payloads and return the code units
    pub fn finish(mut self) -> Result<Vec<u16>, BuildError> {
        let payloads = std::mem::take(&mut self.payloads);
        for (base, at, payload) in payloads {
            if self.words.len() % 2 != 0 {
                self.words.push(Opcode::Nop.to_u8() as u16);
            }
            let offset = self.pos() as i32 - base as i32;
            self.words[at] = offset as u16;
            self.words[at + 1] = (offset >> 16) as u16;
            match payload {
                Payload::Packed { first_key, targets } => {
                    self.words.extend([0x0100, targets.len() as u16]);
                    self.words.extend([first_key as u16, (first_key >> 16) as u16]);
                    for target in targets {
                        self.fixup(base, Patch::Pair, target);
                    }
                }
                Payload::Sparse { entries } => {
                    self.words.extend([0x0200, entries.len() as u16]);
                    for (key, _) in &entries {
                        self.words.extend([*key as u16, (*key >> 16) as u16]);
                    }
                    for (_, target) in entries {
                        self.fixup(base, Patch::Pair, target);
                    }
                }
                Payload::ArrayData {
                    element_width,
                    values,
                } => {
                    let count = values.len() as u32;
                    self.words.extend([0x0300, element_width, count as u16, (count >> 16) as u16]);
                    let mut bytes = Vec::new();
                    for value in values {
                        for i in 0..element_width as usize {
                            bytes.push((value >> (8 * i)) as u8);
                        }
                    }
                    if bytes.len() % 2 != 0 {
                        bytes.push(0);
                    }
                    for pair in bytes.chunks(2) {
                        self.words.push(pair[0] as u16 | ((pair[1] as u16) << 8));
                    }
                }
            }
        }

        for fixup in &self.fixups {
            let target = self.labels[fixup.label.0].ok_or(BuildError::UnboundLabel(fixup.label.0))?;
            let offset = target as i64 - fixup.base as i64;
            match fixup.patch {
                Patch::Byte => {
                    if offset < i8::MIN as i64 || offset > i8::MAX as i64 {
                        return Err(BuildError::BranchOutOfRange { at: fixup.at, offset });
                    }
                    let word = &mut self.words[fixup.at];
                    *word = (*word & 0x00FF) | ((offset as i8 as u8 as u16) << 8);
                }
                Patch::Unit => {
                    if offset < i16::MIN as i64 || offset > i16::MAX as i64 {
                        return Err(BuildError::BranchOutOfRange { at: fixup.at, offset });
                    }
                    self.words[fixup.at] = offset as i16 as u16;
                }
                Patch::Pair => {
                    self.words[fixup.at] = offset as u16;
                    self.words[fixup.at + 1] = (offset >> 16) as u16;
                }
            }
        }
        Ok(self.words)
    }

    // ===== Helpers =====

    /// Load a 32-bit constant with the narrowest `const` form
    pub fn const_int(&mut self, a: u8, value: i32) {
        if (-8..=7).contains(&value) && a < 16 {
            self.op11n(Opcode::Const4, a, value as i8);
        } else if (i16::MIN as i32..=i16::MAX as i32).contains(&value) {
            self.op21s(Opcode::Const16, a, value as i16);
        } else if value & 0xFFFF == 0 {
            self.op21h(Opcode::ConstHigh16, a, (value >> 16) as u16);
        } else {
            self.op31i(Opcode::Const, a, value);
        }
    }

    /// Load a 64-bit constant with the narrowest `const-wide` form
    pub fn const_wide(&mut self, a: u8, value: i64) {
        if (i16::MIN as i64..=i16::MAX as i64).contains(&value) {
            self.op21s(Opcode::ConstWide16, a, value as i16);
        } else if (i32::MIN as i64..=i32::MAX as i64).contains(&value) {
            self.op31i(Opcode::ConstWide32, a, value as i32);
        } else if value & 0x0000_FFFF_FFFF_FFFF == 0 {
            self.op21h(Opcode::ConstWideHigh16, a, (value >> 48) as u16);
        } else {
            self.op51l(Opcode::ConstWide, a, value);
        }
    }

    /// `invoke-*` with explicit registers
    pub fn invoke(&mut self, op: Opcode, method: u32, registers: &[u8]) {
        self.op35c(op, method, registers);
    }
}
