//! Object model
//!
//! Every heap value is an [`Object`] behind a reference-counted [`ObjectRef`].
//! Identity comparisons (`if-eq`, monitors, wait-sets) use pointer equality.
//! Objects of module classes are [`Instance`]s, host library objects are
//! [`HostObject`]s and arrays carry a typed backing vector.

use crate::class::ClassId;
use crate::field::{Field, FieldValue};
use crate::thread::ThreadId;
use crate::value::{double_to_long, float_to_int, long_to_double, int_to_float};
use crate::{VmError, VmResult};
use rustc_hash::FxHashMap;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// Shared reference to a heap object
#[derive(Clone)]
pub struct ObjectRef(Rc<Object>);

impl ObjectRef {
    /// Allocate a new object
    pub fn new(obj: Object) -> Self {
        ObjectRef(Rc::new(obj))
    }

    /// Allocate a host string
    pub fn string(value: impl Into<String>) -> Self {
        Self::new(Object::host(HostObject::String(value.into())))
    }

    /// Reference identity
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Identity hash, stable for the lifetime of the object
    pub fn identity_hash(&self) -> i32 {
        let addr = Rc::as_ptr(&self.0) as usize as u64;
        ((addr >> 3) ^ (addr >> 35)) as i32 & 0x7FFF_FFFF
    }

    /// Internal class name of the object (array descriptor for arrays)
    pub fn type_name(&self) -> String {
        match &*self.0 {
            Object::Instance(instance) => instance.class_name().to_string(),
            Object::Array(array) => array.borrow().descriptor(),
            Object::Host(host) => host.borrow().class_name().to_string(),
        }
    }
}

impl Deref for ObjectRef {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.0
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:x}", self.type_name(), self.identity_hash())
    }
}

/// Heap object
pub enum Object {
    /// Instance of a module class
    Instance(Instance),
    /// Array of any element type
    Array(RefCell<ArrayData>),
    /// Host library object, mutable in place by constructor hooks
    Host(RefCell<HostObject>),
}

impl Object {
    /// Wrap a host object
    pub fn host(host: HostObject) -> Self {
        Object::Host(RefCell::new(host))
    }

    /// Wrap an array
    pub fn array(array: ArrayData) -> Self {
        Object::Array(RefCell::new(array))
    }

    /// Module instance view
    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Object::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    /// Array view
    pub fn as_array(&self) -> Option<&RefCell<ArrayData>> {
        match self {
            Object::Array(array) => Some(array),
            _ => None,
        }
    }

    /// Borrow the host object, if this is one
    pub fn host_ref(&self) -> Option<Ref<'_, HostObject>> {
        match self {
            Object::Host(host) => Some(host.borrow()),
            _ => None,
        }
    }

    /// Mutably borrow the host object, if this is one
    pub fn host_mut(&self) -> Option<RefMut<'_, HostObject>> {
        match self {
            Object::Host(host) => Some(host.borrow_mut()),
            _ => None,
        }
    }

    /// Contents of a host string
    pub fn as_str(&self) -> Option<String> {
        match &*self.host_ref()? {
            HostObject::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Instance of a module-defined class
pub struct Instance {
    class: ClassId,
    /// Own class followed by its module superclasses
    chain: Vec<String>,
    /// Field copies keyed by defining class, then by field name
    fields: RefCell<FxHashMap<String, FxHashMap<String, Field>>>,
    /// Host counterpart when the chain ends in a host class
    parent: RefCell<Option<ObjectRef>>,
}

impl Instance {
    /// Create an instance from the field templates of each class in `chain`
    pub fn new(class: ClassId, chain: Vec<String>, templates: Vec<(String, Vec<Field>)>) -> Self {
        let mut fields = FxHashMap::default();
        for (class_name, class_fields) in templates {
            let by_name: FxHashMap<String, Field> = class_fields
                .into_iter()
                .map(|field| (field.name.clone(), field))
                .collect();
            fields.insert(class_name, by_name);
        }
        Self {
            class,
            chain,
            fields: RefCell::new(fields),
            parent: RefCell::new(None),
        }
    }

    /// Registry id of the instance class
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Internal name of the instance class
    pub fn class_name(&self) -> &str {
        self.chain.first().map(String::as_str).unwrap_or("java/lang/Object")
    }

    /// Module classes from the instance class upwards
    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// Classes searched for a field referenced through `class_name`
    fn lookup_order<'s>(&'s self, class_name: &str) -> &'s [String] {
        let start = self
            .chain
            .iter()
            .position(|c| c == class_name)
            .unwrap_or(0);
        &self.chain[start..]
    }

    /// Read a field, searching from `class_name` up the chain
    pub fn get_field(&self, class_name: &str, name: &str) -> Option<FieldValue> {
        let fields = self.fields.borrow();
        let value = self
            .lookup_order(class_name)
            .iter()
            .find_map(|c| fields.get(c).and_then(|m| m.get(name)))
            .map(|field| field.value.clone());
        value
    }

    /// Write a field, searching from `class_name` up the chain
    ///
    /// Returns `false` when no class in the chain declares the field.
    pub fn set_field(&self, class_name: &str, name: &str, value: FieldValue) -> bool {
        let mut fields = self.fields.borrow_mut();
        for c in self.lookup_order(class_name) {
            if let Some(field) = fields.get_mut(c).and_then(|m| m.get_mut(name)) {
                field.value = value;
                return true;
            }
        }
        false
    }

    /// Host counterpart, if constructed
    pub fn parent(&self) -> Option<ObjectRef> {
        self.parent.borrow().clone()
    }

    /// Attach the host counterpart
    pub fn set_parent(&self, parent: ObjectRef) {
        *self.parent.borrow_mut() = Some(parent);
    }
}

/// Output stream of a `java/io/PrintStream`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// `System.out`
    Out,
    /// `System.err`
    Err,
}

/// Boxed primitive
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Boxed {
    /// `java/lang/Boolean`
    Boolean(bool),
    /// `java/lang/Byte`
    Byte(i8),
    /// `java/lang/Character`
    Char(u16),
    /// `java/lang/Short`
    Short(i16),
    /// `java/lang/Integer`
    Integer(i32),
    /// `java/lang/Long`
    Long(i64),
    /// `java/lang/Float`
    Float(f32),
    /// `java/lang/Double`
    Double(f64),
}

impl Boxed {
    /// Internal name of the box class
    pub fn class_name(&self) -> &'static str {
        match self {
            Boxed::Boolean(_) => "java/lang/Boolean",
            Boxed::Byte(_) => "java/lang/Byte",
            Boxed::Char(_) => "java/lang/Character",
            Boxed::Short(_) => "java/lang/Short",
            Boxed::Integer(_) => "java/lang/Integer",
            Boxed::Long(_) => "java/lang/Long",
            Boxed::Float(_) => "java/lang/Float",
            Boxed::Double(_) => "java/lang/Double",
        }
    }
}

/// Object of the host class library
#[derive(Debug, Clone)]
pub enum HostObject {
    /// Allocated by `new-instance`, awaiting its constructor
    Uninitialized(String),
    /// Plain `java/lang/Object`
    Object,
    /// Immutable string
    String(String),
    /// Mutable string buffer
    StringBuffer(String),
    /// Boxed primitive
    Boxed(Boxed),
    /// Class handle, by type descriptor
    Class(String),
    /// Handle of a VM thread
    Thread(ThreadId),
    /// Member of the throwable family
    Throwable {
        /// Internal class name
        class_name: String,
        /// Detail message
        message: Option<String>,
        /// Cause, if any
        cause: Option<ObjectRef>,
    },
    /// `java/io/PrintStream`
    PrintStream(Stream),
}

impl HostObject {
    /// Create a throwable
    pub fn throwable(class_name: &str, message: Option<String>) -> Self {
        HostObject::Throwable {
            class_name: class_name.to_string(),
            message,
            cause: None,
        }
    }

    /// Internal class name
    pub fn class_name(&self) -> &str {
        match self {
            HostObject::Uninitialized(name) => name,
            HostObject::Object => "java/lang/Object",
            HostObject::String(_) => "java/lang/String",
            HostObject::StringBuffer(_) => "java/lang/StringBuffer",
            HostObject::Boxed(boxed) => boxed.class_name(),
            HostObject::Class(_) => "java/lang/Class",
            HostObject::Thread(_) => "java/lang/Thread",
            HostObject::Throwable { class_name, .. } => class_name,
            HostObject::PrintStream(_) => "java/io/PrintStream",
        }
    }
}

/// Backing storage of an array
#[derive(Debug, Clone)]
pub enum ArrayData {
    /// `[Z`
    Boolean(Vec<bool>),
    /// `[B`
    Byte(Vec<i8>),
    /// `[C`
    Char(Vec<u16>),
    /// `[S`
    Short(Vec<i16>),
    /// `[I`
    Int(Vec<i32>),
    /// `[J`
    Long(Vec<i64>),
    /// `[F`
    Float(Vec<f32>),
    /// `[D`
    Double(Vec<f64>),
    /// Array of references
    Object {
        /// Component type descriptor
        component: String,
        /// Elements
        items: Vec<Option<ObjectRef>>,
    },
}

impl ArrayData {
    /// Allocate a zeroed array for a component type descriptor
    pub fn new(component: &str, len: usize) -> Option<Self> {
        let array = match component.as_bytes().first()? {
            b'Z' => ArrayData::Boolean(vec![false; len]),
            b'B' => ArrayData::Byte(vec![0; len]),
            b'C' => ArrayData::Char(vec![0; len]),
            b'S' => ArrayData::Short(vec![0; len]),
            b'I' => ArrayData::Int(vec![0; len]),
            b'J' => ArrayData::Long(vec![0; len]),
            b'F' => ArrayData::Float(vec![0.0; len]),
            b'D' => ArrayData::Double(vec![0.0; len]),
            b'L' | b'[' => ArrayData::Object {
                component: component.to_string(),
                items: vec![None; len],
            },
            _ => return None,
        };
        Some(array)
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Boolean(v) => v.len(),
            ArrayData::Byte(v) => v.len(),
            ArrayData::Char(v) => v.len(),
            ArrayData::Short(v) => v.len(),
            ArrayData::Int(v) => v.len(),
            ArrayData::Long(v) => v.len(),
            ArrayData::Float(v) => v.len(),
            ArrayData::Double(v) => v.len(),
            ArrayData::Object { items, .. } => items.len(),
        }
    }

    /// Check whether the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Component type descriptor
    pub fn component(&self) -> &str {
        match self {
            ArrayData::Boolean(_) => "Z",
            ArrayData::Byte(_) => "B",
            ArrayData::Char(_) => "C",
            ArrayData::Short(_) => "S",
            ArrayData::Int(_) => "I",
            ArrayData::Long(_) => "J",
            ArrayData::Float(_) => "F",
            ArrayData::Double(_) => "D",
            ArrayData::Object { component, .. } => component,
        }
    }

    /// Array type descriptor
    pub fn descriptor(&self) -> String {
        format!("[{}", self.component())
    }

    /// Size in bytes of one element in `fill-array-data` payloads
    pub fn element_width(&self) -> Option<usize> {
        match self {
            ArrayData::Boolean(_) | ArrayData::Byte(_) => Some(1),
            ArrayData::Char(_) | ArrayData::Short(_) => Some(2),
            ArrayData::Int(_) | ArrayData::Float(_) => Some(4),
            ArrayData::Long(_) | ArrayData::Double(_) => Some(8),
            ArrayData::Object { .. } => None,
        }
    }

    fn kind_error(&self, access: &str) -> VmError {
        VmError::TypeError(format!("{} on array {}", access, self.descriptor()))
    }

    /// Read a 32-bit or narrower element as a register word
    pub fn get_word(&self, index: usize) -> VmResult<i32> {
        let word = match self {
            ArrayData::Boolean(v) => v[index] as i32,
            ArrayData::Byte(v) => v[index] as i32,
            ArrayData::Char(v) => v[index] as i32,
            ArrayData::Short(v) => v[index] as i32,
            ArrayData::Int(v) => v[index],
            ArrayData::Float(v) => float_to_int(v[index]),
            _ => return Err(self.kind_error("aget")),
        };
        Ok(word)
    }

    /// Store a register word, narrowing to the element type
    pub fn set_word(&mut self, index: usize, word: i32) -> VmResult<()> {
        match self {
            ArrayData::Boolean(v) => v[index] = word != 0,
            ArrayData::Byte(v) => v[index] = word as i8,
            ArrayData::Char(v) => v[index] = word as u16,
            ArrayData::Short(v) => v[index] = word as i16,
            ArrayData::Int(v) => v[index] = word,
            ArrayData::Float(v) => v[index] = int_to_float(word),
            _ => return Err(self.kind_error("aput")),
        }
        Ok(())
    }

    /// Read a 64-bit element (doubles as raw bits)
    pub fn get_wide(&self, index: usize) -> VmResult<i64> {
        match self {
            ArrayData::Long(v) => Ok(v[index]),
            ArrayData::Double(v) => Ok(double_to_long(v[index])),
            _ => Err(self.kind_error("aget-wide")),
        }
    }

    /// Store a 64-bit element (doubles as raw bits)
    pub fn set_wide(&mut self, index: usize, value: i64) -> VmResult<()> {
        match self {
            ArrayData::Long(v) => v[index] = value,
            ArrayData::Double(v) => v[index] = long_to_double(value),
            _ => return Err(self.kind_error("aput-wide")),
        }
        Ok(())
    }

    /// Read a reference element
    pub fn get_object(&self, index: usize) -> VmResult<Option<ObjectRef>> {
        match self {
            ArrayData::Object { items, .. } => Ok(items[index].clone()),
            _ => Err(self.kind_error("aget-object")),
        }
    }

    /// Store a reference element
    pub fn set_object(&mut self, index: usize, value: Option<ObjectRef>) -> VmResult<()> {
        match self {
            ArrayData::Object { items, .. } => items[index] = value,
            _ => return Err(self.kind_error("aput-object")),
        }
        Ok(())
    }

    /// Copy `len` elements of `src` starting at `src_pos` to `dst_pos`
    ///
    /// Both ranges must be in bounds. Returns `false` when the element types
    /// differ.
    pub fn copy_from(&mut self, dst_pos: usize, src: &ArrayData, src_pos: usize, len: usize) -> bool {
        macro_rules! copy_same {
            ($pair:expr; $($kind:ident),*) => {
                match $pair {
                    $((ArrayData::$kind(dst), ArrayData::$kind(from)) => {
                        dst[dst_pos..dst_pos + len].copy_from_slice(&from[src_pos..src_pos + len]);
                        true
                    })*
                    (ArrayData::Object { items: dst, .. }, ArrayData::Object { items: from, .. }) => {
                        dst[dst_pos..dst_pos + len].clone_from_slice(&from[src_pos..src_pos + len]);
                        true
                    }
                    _ => false,
                }
            };
        }
        copy_same!((self, src); Boolean, Byte, Char, Short, Int, Long, Float, Double)
    }

    /// Fill from little-endian `fill-array-data` payload bytes
    pub fn fill(&mut self, bytes: &[u8]) {
        fn chunks<const N: usize>(bytes: &[u8]) -> impl Iterator<Item = [u8; N]> + '_ {
            bytes.chunks_exact(N).map(|c| {
                let mut out = [0u8; N];
                out.copy_from_slice(c);
                out
            })
        }
        match self {
            ArrayData::Boolean(v) => v.iter_mut().zip(bytes).for_each(|(d, b)| *d = *b != 0),
            ArrayData::Byte(v) => v.iter_mut().zip(bytes).for_each(|(d, b)| *d = *b as i8),
            ArrayData::Char(v) => v
                .iter_mut()
                .zip(chunks::<2>(bytes))
                .for_each(|(d, b)| *d = u16::from_le_bytes(b)),
            ArrayData::Short(v) => v
                .iter_mut()
                .zip(chunks::<2>(bytes))
                .for_each(|(d, b)| *d = i16::from_le_bytes(b)),
            ArrayData::Int(v) => v
                .iter_mut()
                .zip(chunks::<4>(bytes))
                .for_each(|(d, b)| *d = i32::from_le_bytes(b)),
            ArrayData::Float(v) => v
                .iter_mut()
                .zip(chunks::<4>(bytes))
                .for_each(|(d, b)| *d = f32::from_le_bytes(b)),
            ArrayData::Long(v) => v
                .iter_mut()
                .zip(chunks::<8>(bytes))
                .for_each(|(d, b)| *d = i64::from_le_bytes(b)),
            ArrayData::Double(v) => v
                .iter_mut()
                .zip(chunks::<8>(bytes))
                .for_each(|(d, b)| *d = f64::from_le_bytes(b)),
            ArrayData::Object { .. } => {}
        }
    }
}
