//! Default host library
//!
//! Covers the slice of `java.lang` and `java.io` that compiled test programs
//! reach for: strings and buffers, boxes, `Math`, `System`, `PrintStream`,
//! threads, the throwable family and reflective array allocation.

use super::format::{double_to_string, float_to_string};
use super::{HookResult, Shim, ShimContext};
use crate::field::FieldValue;
use crate::object::{ArrayData, Boxed, HostObject, Object, ObjectRef, Stream};
use crate::thread::{ThreadId, ThreadStatus, MAX_PRIORITY, MIN_PRIORITY};
use crate::value::{double_to_long, float_to_int, int_to_float, long_to_double, Register};
use crate::{VmError, VmResult};
use dexvm_bytecode::descriptor::{class_descriptor, MethodDescriptor};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::time::{SystemTime, UNIX_EPOCH};

/// Host classes below `java/lang/Object`, with their superclass
const HIERARCHY: &[(&str, &str)] = &[
    ("java/lang/Throwable", "java/lang/Object"),
    ("java/lang/Exception", "java/lang/Throwable"),
    ("java/lang/Error", "java/lang/Throwable"),
    ("java/lang/RuntimeException", "java/lang/Exception"),
    ("java/lang/InterruptedException", "java/lang/Exception"),
    ("java/lang/CloneNotSupportedException", "java/lang/Exception"),
    ("java/lang/ReflectiveOperationException", "java/lang/Exception"),
    ("java/lang/ClassNotFoundException", "java/lang/ReflectiveOperationException"),
    ("java/io/IOException", "java/lang/Exception"),
    ("java/lang/NullPointerException", "java/lang/RuntimeException"),
    ("java/lang/ArithmeticException", "java/lang/RuntimeException"),
    ("java/lang/ClassCastException", "java/lang/RuntimeException"),
    ("java/lang/NegativeArraySizeException", "java/lang/RuntimeException"),
    ("java/lang/ArrayStoreException", "java/lang/RuntimeException"),
    ("java/lang/IllegalMonitorStateException", "java/lang/RuntimeException"),
    ("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
    ("java/lang/IllegalStateException", "java/lang/RuntimeException"),
    ("java/lang/UnsupportedOperationException", "java/lang/RuntimeException"),
    ("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException"),
    ("java/lang/ArrayIndexOutOfBoundsException", "java/lang/IndexOutOfBoundsException"),
    ("java/lang/StringIndexOutOfBoundsException", "java/lang/IndexOutOfBoundsException"),
    ("java/lang/NumberFormatException", "java/lang/IllegalArgumentException"),
    ("java/lang/IllegalThreadStateException", "java/lang/IllegalArgumentException"),
    ("java/util/NoSuchElementException", "java/lang/RuntimeException"),
    ("java/util/ConcurrentModificationException", "java/lang/RuntimeException"),
    ("java/lang/LinkageError", "java/lang/Error"),
    ("java/lang/ExceptionInInitializerError", "java/lang/LinkageError"),
    ("java/lang/AssertionError", "java/lang/Error"),
    ("java/lang/VirtualMachineError", "java/lang/Error"),
    ("java/lang/StackOverflowError", "java/lang/VirtualMachineError"),
    ("java/lang/OutOfMemoryError", "java/lang/VirtualMachineError"),
    ("java/lang/Number", "java/lang/Object"),
    ("java/lang/Byte", "java/lang/Number"),
    ("java/lang/Short", "java/lang/Number"),
    ("java/lang/Integer", "java/lang/Number"),
    ("java/lang/Long", "java/lang/Number"),
    ("java/lang/Float", "java/lang/Number"),
    ("java/lang/Double", "java/lang/Number"),
];

const THROWABLE: &str = "java/lang/Throwable";
const OBJECT: &str = "java/lang/Object";

/// The default [`Shim`]
#[derive(Default)]
pub struct StandardShim {
    /// Singleton host objects such as `System.out` and `Boolean.TRUE`
    singletons: RefCell<FxHashMap<&'static str, ObjectRef>>,
}

impl StandardShim {
    /// Create the default host library
    pub fn new() -> Self {
        Self::default()
    }

    fn singleton(&self, key: &'static str, make: impl FnOnce() -> HostObject) -> ObjectRef {
        self.singletons
            .borrow_mut()
            .entry(key)
            .or_insert_with(|| ObjectRef::new(Object::host(make())))
            .clone()
    }

    fn boolean(&self, value: bool) -> ObjectRef {
        let key = if value { "Boolean.TRUE" } else { "Boolean.FALSE" };
        self.singleton(key, || HostObject::Boxed(Boxed::Boolean(value)))
    }

    fn is_throwable(&self, class_name: &str) -> bool {
        let mut current = class_name.to_string();
        loop {
            if current == THROWABLE {
                return true;
            }
            match self.superclass_of(&current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    // =========================================================
    // Static Methods
    // =========================================================

    fn boxed_static(
        &self,
        ctx: &mut ShimContext<'_>,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> VmResult<HookResult> {
        match (class_name, name, descriptor) {
            ("java/lang/Integer", "valueOf", "(I)Ljava/lang/Integer;") => {
                let value = ctx.arg_int(0)?;
                ctx.return_object(Some(boxed(Boxed::Integer(value))))?;
            }
            ("java/lang/Integer", "valueOf", "(Ljava/lang/String;)Ljava/lang/Integer;") => {
                let value = parse_arg::<i32>(ctx)?;
                ctx.return_object(Some(boxed(Boxed::Integer(value))))?;
            }
            ("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I") => {
                let value = parse_arg::<i32>(ctx)?;
                ctx.return_int(value)?;
            }
            ("java/lang/Integer", "toString", "(I)Ljava/lang/String;") => {
                let value = ctx.arg_int(0)?;
                ctx.return_string(value.to_string())?;
            }
            ("java/lang/Integer", "toHexString", "(I)Ljava/lang/String;") => {
                let value = ctx.arg_int(0)?;
                ctx.return_string(format!("{:x}", value))?;
            }
            ("java/lang/Integer", "toBinaryString", "(I)Ljava/lang/String;") => {
                let value = ctx.arg_int(0)?;
                ctx.return_string(format!("{:b}", value))?;
            }
            ("java/lang/Long", "valueOf", "(J)Ljava/lang/Long;") => {
                let value = ctx.arg_long(0)?;
                ctx.return_object(Some(boxed(Boxed::Long(value))))?;
            }
            ("java/lang/Long", "parseLong", "(Ljava/lang/String;)J") => {
                let value = parse_arg::<i64>(ctx)?;
                ctx.return_long(value)?;
            }
            ("java/lang/Long", "toString", "(J)Ljava/lang/String;") => {
                let value = ctx.arg_long(0)?;
                ctx.return_string(value.to_string())?;
            }
            ("java/lang/Boolean", "valueOf", "(Z)Ljava/lang/Boolean;") => {
                let value = ctx.arg_int(0)? != 0;
                ctx.return_object(Some(self.boolean(value)))?;
            }
            ("java/lang/Boolean", "valueOf", "(Ljava/lang/String;)Ljava/lang/Boolean;") => {
                let value = parse_boolean(ctx)?;
                ctx.return_object(Some(self.boolean(value)))?;
            }
            ("java/lang/Boolean", "parseBoolean", "(Ljava/lang/String;)Z") => {
                let value = parse_boolean(ctx)?;
                ctx.return_bool(value)?;
            }
            ("java/lang/Boolean", "toString", "(Z)Ljava/lang/String;") => {
                let value = ctx.arg_int(0)? != 0;
                ctx.return_string(value.to_string())?;
            }
            ("java/lang/Character", "valueOf", "(C)Ljava/lang/Character;") => {
                let value = ctx.arg_int(0)? as u16;
                ctx.return_object(Some(boxed(Boxed::Char(value))))?;
            }
            ("java/lang/Character", "toString", "(C)Ljava/lang/String;") => {
                let value = ctx.arg_int(0)? as u16;
                ctx.return_string(char_text(value))?;
            }
            ("java/lang/Character", "isDigit", "(C)Z") => {
                let value = ctx.arg_int(0)? as u16;
                ctx.return_bool(as_char(value).map_or(false, |c| c.is_numeric()))?;
            }
            ("java/lang/Character", "isLetter", "(C)Z") => {
                let value = ctx.arg_int(0)? as u16;
                ctx.return_bool(as_char(value).map_or(false, char::is_alphabetic))?;
            }
            _ => return Ok(HookResult::Unhandled),
        }
        Ok(HookResult::Done)
    }

    fn thread_static(&self, ctx: &mut ShimContext<'_>, name: &str, descriptor: &str) -> VmResult<HookResult> {
        match (name, descriptor) {
            ("currentThread", "()Ljava/lang/Thread;") => {
                let handle = ctx.vm.thread_object(ctx.thread);
                ctx.return_object(Some(handle))?;
            }
            ("yield", "()V") => return Ok(HookResult::Yield),
            ("sleep", "(J)V") => {
                let millis = ctx.arg_long(0)?;
                ctx.vm.sleep(ctx.thread, millis)?;
                return Ok(HookResult::Yield);
            }
            ("sleep", "(JI)V") => {
                let millis = ctx.arg_long(0)?;
                let nanos = ctx.arg_int(2)?;
                if !(0..=999_999).contains(&nanos) {
                    return Err(ctx.throw(
                        "java/lang/IllegalArgumentException",
                        Some("nanosecond timeout value out of range"),
                    ));
                }
                let millis = if nanos >= 500_000 { millis.saturating_add(1) } else { millis };
                ctx.vm.sleep(ctx.thread, millis)?;
                return Ok(HookResult::Yield);
            }
            ("activeCount", "()I") => {
                let count = ctx.vm.live_threads().len() as i32;
                ctx.return_int(count)?;
            }
            _ => return Ok(HookResult::Unhandled),
        }
        Ok(HookResult::Done)
    }
}

impl Shim for StandardShim {
    fn class_method(
        &self,
        ctx: &mut ShimContext<'_>,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> VmResult<HookResult> {
        match class_name {
            "java/lang/String" => string_static(ctx, name, descriptor),
            "java/lang/Integer" | "java/lang/Long" | "java/lang/Boolean" | "java/lang/Character" => {
                self.boxed_static(ctx, class_name, name, descriptor)
            }
            "java/lang/Math" => math(ctx, name, descriptor),
            "java/lang/System" => system(ctx, name, descriptor),
            "java/lang/Thread" => self.thread_static(ctx, name, descriptor),
            "java/lang/reflect/Array" => reflect_array(ctx, name, descriptor),
            _ => Ok(HookResult::Unhandled),
        }
    }

    fn instance_method(
        &self,
        ctx: &mut ShimContext<'_>,
        _class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> VmResult<HookResult> {
        let receiver = ctx.receiver()?;
        let result = monitor_method(ctx, &receiver, name, descriptor)?;
        if result != HookResult::Unhandled {
            return Ok(result);
        }

        let target = ctx.to_target_instance(&receiver);
        let result = match Kind::of(&target) {
            Kind::String(text) => string_method(ctx, &receiver, &text, name, descriptor)?,
            Kind::Buffer => buffer_method(ctx, &receiver, name, descriptor)?,
            Kind::Boxed(value) => boxed_method(ctx, &value, name, descriptor)?,
            Kind::Thread(id) => thread_method(ctx, id, name, descriptor)?,
            Kind::Throwable => throwable_method(ctx, &receiver, &target, name, descriptor)?,
            Kind::PrintStream(stream) => print_method(ctx, stream, name, descriptor)?,
            Kind::Class(type_desc) => class_method(ctx, &type_desc, name, descriptor)?,
            Kind::Other => HookResult::Unhandled,
        };
        if result != HookResult::Unhandled {
            return Ok(result);
        }
        object_method(ctx, &receiver, name, descriptor)
    }

    fn constructor(&self, ctx: &mut ShimContext<'_>, class_name: &str, descriptor: &str) -> VmResult<HookResult> {
        let receiver = ctx.receiver()?;
        let host = match class_name {
            OBJECT => {
                if receiver.as_instance().is_some() {
                    return Ok(HookResult::Done);
                }
                HostObject::Object
            }
            "java/lang/String" => {
                let text = match descriptor {
                    "()V" => String::new(),
                    "(Ljava/lang/String;)V" | "(Ljava/lang/StringBuffer;)V" => text_arg(ctx, "Ljava/lang/String;", 1)?,
                    "([C)V" => chars_arg(ctx, 1, None)?,
                    "([CII)V" => {
                        let range = (ctx.arg_int(2)?, ctx.arg_int(3)?);
                        chars_arg(ctx, 1, Some(range))?
                    }
                    _ => return Ok(HookResult::Unhandled),
                };
                HostObject::String(text)
            }
            "java/lang/StringBuffer" | "java/lang/StringBuilder" => {
                let text = match descriptor {
                    "()V" | "(I)V" => String::new(),
                    "(Ljava/lang/String;)V" | "(Ljava/lang/CharSequence;)V" => text_arg(ctx, "Ljava/lang/String;", 1)?,
                    _ => return Ok(HookResult::Unhandled),
                };
                HostObject::StringBuffer(text)
            }
            "java/lang/Thread" => return construct_thread(ctx, &receiver, descriptor),
            _ if self.is_throwable(class_name) => {
                let (message, cause) = match descriptor {
                    "()V" => (None, None),
                    "(Ljava/lang/String;)V" => (string_arg(ctx, 1)?, None),
                    "(Ljava/lang/String;Ljava/lang/Throwable;)V" => (string_arg(ctx, 1)?, ctx.arg_object(2)?),
                    "(Ljava/lang/Throwable;)V" => {
                        let cause = ctx.arg_object(1)?;
                        let message = match &cause {
                            Some(cause) => Some(ctx.string_of(Some(cause))?),
                            None => None,
                        };
                        (message, cause)
                    }
                    _ => return Ok(HookResult::Unhandled),
                };
                HostObject::Throwable {
                    class_name: class_name.to_string(),
                    message,
                    cause,
                }
            }
            _ => match box_constructor(ctx, class_name, descriptor)? {
                Some(value) => HostObject::Boxed(value),
                None => return Ok(HookResult::Unhandled),
            },
        };
        install(&receiver, host);
        Ok(HookResult::Done)
    }

    fn class_field_get(
        &self,
        ctx: &mut ShimContext<'_>,
        class_name: &str,
        name: &str,
        _type_desc: &str,
    ) -> VmResult<Option<FieldValue>> {
        let value = match (class_name, name) {
            ("java/lang/System", "out") => self.singleton("System.out", || HostObject::PrintStream(Stream::Out)),
            ("java/lang/System", "err") => self.singleton("System.err", || HostObject::PrintStream(Stream::Err)),
            ("java/lang/Boolean", "TRUE") => self.boolean(true),
            ("java/lang/Boolean", "FALSE") => self.boolean(false),
            (_, "TYPE") => match primitive_of(class_name) {
                Some(primitive) => ctx.vm.class_object(ctx.thread, primitive)?,
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
        Ok(Some(FieldValue::Object(Some(value))))
    }

    fn class_field_set(
        &self,
        _ctx: &mut ShimContext<'_>,
        _class_name: &str,
        _name: &str,
        _type_desc: &str,
        _value: FieldValue,
    ) -> VmResult<bool> {
        Ok(false)
    }

    fn superclass_of(&self, class_name: &str) -> Option<String> {
        if class_name == OBJECT {
            return None;
        }
        if let Some((_, parent)) = HIERARCHY.iter().find(|(class, _)| *class == class_name) {
            return Some(parent.to_string());
        }
        let parent = if class_name.ends_with("Exception") {
            "java/lang/Exception"
        } else if class_name.ends_with("Error") {
            "java/lang/Error"
        } else {
            OBJECT
        };
        Some(parent.to_string())
    }

    fn interfaces_of(&self, class_name: &str) -> Vec<String> {
        let interfaces: &[&str] = match class_name {
            "java/lang/Thread" => &["java/lang/Runnable"],
            "java/lang/String" => &["java/lang/CharSequence", "java/lang/Comparable", "java/io/Serializable"],
            "java/lang/StringBuffer" => &["java/lang/CharSequence", "java/io/Serializable"],
            THROWABLE | "java/lang/Number" => &["java/io/Serializable"],
            _ => &[],
        };
        interfaces.iter().map(|i| i.to_string()).collect()
    }
}

/// Host kind of an instance-call target
enum Kind {
    String(String),
    Buffer,
    Boxed(Boxed),
    Thread(ThreadId),
    Throwable,
    PrintStream(Stream),
    Class(String),
    Other,
}

impl Kind {
    fn of(obj: &ObjectRef) -> Self {
        match obj.host_ref().as_deref() {
            Some(HostObject::String(text)) => Kind::String(text.clone()),
            Some(HostObject::StringBuffer(_)) => Kind::Buffer,
            Some(HostObject::Boxed(value)) => Kind::Boxed(*value),
            Some(HostObject::Thread(id)) => Kind::Thread(*id),
            Some(HostObject::Throwable { .. }) => Kind::Throwable,
            Some(HostObject::PrintStream(stream)) => Kind::PrintStream(*stream),
            Some(HostObject::Class(type_desc)) => Kind::Class(type_desc.clone()),
            _ => Kind::Other,
        }
    }
}

// =========================================================
// java/lang/Object
// =========================================================

fn monitor_method(
    ctx: &mut ShimContext<'_>,
    receiver: &ObjectRef,
    name: &str,
    descriptor: &str,
) -> VmResult<HookResult> {
    match (name, descriptor) {
        ("wait", "()V") => ctx.vm.wait(ctx.thread, receiver, 0, 0)?,
        ("wait", "(J)V") => {
            let millis = ctx.arg_long(1)?;
            ctx.vm.wait(ctx.thread, receiver, millis, 0)?;
        }
        ("wait", "(JI)V") => {
            let millis = ctx.arg_long(1)?;
            let nanos = ctx.arg_int(3)?;
            ctx.vm.wait(ctx.thread, receiver, millis, nanos)?;
        }
        ("notify", "()V") => {
            ctx.vm.notify(ctx.thread, receiver)?;
            return Ok(HookResult::Done);
        }
        ("notifyAll", "()V") => {
            ctx.vm.notify_all(ctx.thread, receiver)?;
            return Ok(HookResult::Done);
        }
        ("getClass", "()Ljava/lang/Class;") => {
            let type_name = receiver.type_name();
            let type_desc = if type_name.starts_with('[') {
                type_name
            } else {
                class_descriptor(&type_name)
            };
            let class = ctx.vm.class_object(ctx.thread, &type_desc)?;
            ctx.return_object(Some(class))?;
            return Ok(HookResult::Done);
        }
        _ => return Ok(HookResult::Unhandled),
    }
    Ok(HookResult::Yield)
}

fn object_method(
    ctx: &mut ShimContext<'_>,
    receiver: &ObjectRef,
    name: &str,
    descriptor: &str,
) -> VmResult<HookResult> {
    match (name, descriptor) {
        ("hashCode", "()I") => ctx.return_int(receiver.identity_hash())?,
        ("equals", "(Ljava/lang/Object;)Z") => {
            let other = ctx.arg_object(1)?;
            ctx.return_bool(other.map_or(false, |other| other.ptr_eq(receiver)))?;
        }
        ("toString", "()Ljava/lang/String;") => {
            let text = ctx.describe(receiver);
            ctx.return_string(text)?;
        }
        _ => return Ok(HookResult::Unhandled),
    }
    Ok(HookResult::Done)
}

/// Give `receiver` its host state
///
/// A host object under construction is replaced in place, a module instance
/// gets a host parent.
fn install(receiver: &ObjectRef, host: HostObject) {
    match &**receiver {
        Object::Instance(instance) => instance.set_parent(ObjectRef::new(Object::host(host))),
        Object::Host(cell) => *cell.borrow_mut() = host,
        Object::Array(_) => {}
    }
}

// =========================================================
// Strings
// =========================================================

fn string_static(ctx: &mut ShimContext<'_>, name: &str, descriptor: &str) -> VmResult<HookResult> {
    if name != "valueOf" && name != "copyValueOf" {
        return Ok(HookResult::Unhandled);
    }
    let params = params(descriptor)?;
    let text = match params.as_slice() {
        [param] => text_arg(ctx, param, 0)?,
        _ => return Ok(HookResult::Unhandled),
    };
    ctx.return_string(text)?;
    Ok(HookResult::Done)
}

fn string_method(
    ctx: &mut ShimContext<'_>,
    receiver: &ObjectRef,
    text: &str,
    name: &str,
    descriptor: &str,
) -> VmResult<HookResult> {
    let units = || text.encode_utf16().collect::<Vec<u16>>();
    match (name, descriptor) {
        ("length", "()I") => ctx.return_int(units().len() as i32)?,
        ("isEmpty", "()Z") => ctx.return_bool(text.is_empty())?,
        ("charAt", "(I)C") => {
            let index = ctx.arg_int(1)?;
            let units = units();
            let unit = checked_index(ctx, index, units.len())?;
            ctx.return_int(units[unit] as i32)?;
        }
        ("equals", "(Ljava/lang/Object;)Z") => {
            let other = ctx.arg_object(1)?.and_then(|other| other.as_str());
            ctx.return_bool(other.as_deref() == Some(text))?;
        }
        ("equalsIgnoreCase", "(Ljava/lang/String;)Z") => {
            let other = ctx.arg_object(1)?.and_then(|other| other.as_str());
            let equal = other.map_or(false, |other| other.to_lowercase() == text.to_lowercase());
            ctx.return_bool(equal)?;
        }
        ("hashCode", "()I") => ctx.return_int(string_hash(text))?,
        ("toString", "()Ljava/lang/String;") => ctx.return_object(Some(receiver.clone()))?,
        ("concat", "(Ljava/lang/String;)Ljava/lang/String;") => {
            let other = required_string(ctx, 1)?;
            ctx.return_string(format!("{}{}", text, other))?;
        }
        ("substring", "(I)Ljava/lang/String;") | ("substring", "(II)Ljava/lang/String;") => {
            let units = units();
            let begin = ctx.arg_int(1)?;
            let end = if descriptor == "(II)Ljava/lang/String;" {
                ctx.arg_int(2)?
            } else {
                units.len() as i32
            };
            if begin < 0 || end < begin || end as usize > units.len() {
                let message = format!("begin {}, end {}, length {}", begin, end, units.len());
                return Err(ctx.throw("java/lang/StringIndexOutOfBoundsException", Some(&message)));
            }
            ctx.return_string(String::from_utf16_lossy(&units[begin as usize..end as usize]))?;
        }
        ("indexOf", "(I)I") => {
            let unit = ctx.arg_int(1)?;
            let found = units().iter().position(|u| *u as i32 == unit);
            ctx.return_int(found.map_or(-1, |i| i as i32))?;
        }
        ("indexOf", "(Ljava/lang/String;)I") => {
            let needle: Vec<u16> = required_string(ctx, 1)?.encode_utf16().collect();
            let haystack = units();
            let found = if needle.is_empty() {
                Some(0)
            } else {
                haystack.windows(needle.len()).position(|w| w == needle.as_slice())
            };
            ctx.return_int(found.map_or(-1, |i| i as i32))?;
        }
        ("startsWith", "(Ljava/lang/String;)Z") => {
            let prefix = required_string(ctx, 1)?;
            ctx.return_bool(text.starts_with(&prefix))?;
        }
        ("endsWith", "(Ljava/lang/String;)Z") => {
            let suffix = required_string(ctx, 1)?;
            ctx.return_bool(text.ends_with(&suffix))?;
        }
        ("toUpperCase", "()Ljava/lang/String;") => ctx.return_string(text.to_uppercase())?,
        ("toLowerCase", "()Ljava/lang/String;") => ctx.return_string(text.to_lowercase())?,
        ("trim", "()Ljava/lang/String;") => ctx.return_string(text.trim_matches(|c: char| c <= ' '))?,
        _ => return Ok(HookResult::Unhandled),
    }
    Ok(HookResult::Done)
}

fn buffer_method(
    ctx: &mut ShimContext<'_>,
    receiver: &ObjectRef,
    name: &str,
    descriptor: &str,
) -> VmResult<HookResult> {
    let contents = || match receiver.host_ref().as_deref() {
        Some(HostObject::StringBuffer(text)) => text.clone(),
        _ => String::new(),
    };
    match (name, descriptor) {
        ("append", _) => {
            let params = params(descriptor)?;
            let [param] = params.as_slice() else {
                return Ok(HookResult::Unhandled);
            };
            // the argument is rendered before the buffer is borrowed
            let text = text_arg(ctx, param, 1)?;
            if let Some(HostObject::StringBuffer(buffer)) = receiver.host_mut().as_deref_mut() {
                buffer.push_str(&text);
            }
            ctx.return_object(Some(receiver.clone()))?;
        }
        ("toString", "()Ljava/lang/String;") => ctx.return_string(contents())?,
        ("length", "()I") => ctx.return_int(contents().encode_utf16().count() as i32)?,
        ("charAt", "(I)C") => {
            let index = ctx.arg_int(1)?;
            let units: Vec<u16> = contents().encode_utf16().collect();
            let unit = checked_index(ctx, index, units.len())?;
            ctx.return_int(units[unit] as i32)?;
        }
        ("reverse", _) => {
            if let Some(HostObject::StringBuffer(buffer)) = receiver.host_mut().as_deref_mut() {
                *buffer = buffer.chars().rev().collect();
            }
            ctx.return_object(Some(receiver.clone()))?;
        }
        ("setLength", "(I)V") => {
            let len = ctx.arg_int(1)?;
            if len < 0 {
                return Err(ctx.throw("java/lang/StringIndexOutOfBoundsException", Some(&len.to_string())));
            }
            if let Some(HostObject::StringBuffer(buffer)) = receiver.host_mut().as_deref_mut() {
                let mut units: Vec<u16> = buffer.encode_utf16().collect();
                units.resize(len as usize, 0);
                *buffer = String::from_utf16_lossy(&units);
            }
        }
        _ => return Ok(HookResult::Unhandled),
    }
    Ok(HookResult::Done)
}

/// Java `String.hashCode` over UTF-16 code units
pub(crate) fn string_hash(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

fn checked_index(ctx: &ShimContext<'_>, index: i32, len: usize) -> VmResult<usize> {
    if index < 0 || index as usize >= len {
        let message = format!("index {}, length {}", index, len);
        return Err(ctx.throw("java/lang/StringIndexOutOfBoundsException", Some(&message)));
    }
    Ok(index as usize)
}

/// Text of the argument at `position`, rendered by its type descriptor
fn text_arg(ctx: &mut ShimContext<'_>, type_desc: &str, position: usize) -> VmResult<String> {
    let text = match type_desc {
        "Z" => (ctx.arg_int(position)? != 0).to_string(),
        "C" => char_text(ctx.arg_int(position)? as u16),
        "B" | "S" | "I" => ctx.arg_int(position)?.to_string(),
        "J" => ctx.arg_long(position)?.to_string(),
        "F" => float_to_string(int_to_float(ctx.arg_int(position)?)),
        "D" => double_to_string(long_to_double(ctx.arg_long(position)?)),
        "[C" => chars_arg(ctx, position, None)?,
        _ => {
            let obj = ctx.arg_object(position)?;
            ctx.string_of(obj.as_ref())?
        }
    };
    Ok(text)
}

/// Contents of a `char[]` argument, optionally an (offset, count) window
fn chars_arg(ctx: &ShimContext<'_>, position: usize, range: Option<(i32, i32)>) -> VmResult<String> {
    let array = ctx
        .arg_object(position)?
        .ok_or_else(|| ctx.throw("java/lang/NullPointerException", None))?;
    let data = array
        .as_array()
        .ok_or_else(|| VmError::TypeError(format!("{:?} is not a char array", array)))?
        .borrow();
    let ArrayData::Char(units) = &*data else {
        return Err(VmError::TypeError(format!("{} is not a char array", data.descriptor())));
    };
    let (offset, count) = range.unwrap_or((0, units.len() as i32));
    if offset < 0 || count < 0 || (offset as usize + count as usize) > units.len() {
        let message = format!("offset {}, count {}, length {}", offset, count, units.len());
        return Err(ctx.throw("java/lang/StringIndexOutOfBoundsException", Some(&message)));
    }
    Ok(String::from_utf16_lossy(&units[offset as usize..(offset + count) as usize]))
}

/// Nullable string argument
fn string_arg(ctx: &ShimContext<'_>, position: usize) -> VmResult<Option<String>> {
    Ok(ctx.arg_object(position)?.and_then(|obj| obj.as_str()))
}

/// Non-null string argument
fn required_string(ctx: &ShimContext<'_>, position: usize) -> VmResult<String> {
    string_arg(ctx, position)?.ok_or_else(|| ctx.throw("java/lang/NullPointerException", None))
}

fn params(descriptor: &str) -> VmResult<Vec<String>> {
    MethodDescriptor::parse(descriptor)
        .map(|parsed| parsed.params)
        .map_err(|err| VmError::Internal(format!("shim descriptor {}: {}", descriptor, err)))
}

fn as_char(unit: u16) -> Option<char> {
    char::from_u32(unit as u32)
}

fn char_text(unit: u16) -> String {
    String::from_utf16_lossy(&[unit])
}

// =========================================================
// Boxes
// =========================================================

fn boxed(value: Boxed) -> ObjectRef {
    ObjectRef::new(Object::host(HostObject::Boxed(value)))
}

fn parse_arg<T: std::str::FromStr>(ctx: &ShimContext<'_>) -> VmResult<T> {
    let Some(text) = string_arg(ctx, 0)? else {
        return Err(ctx.throw(
            "java/lang/NumberFormatException",
            Some("Cannot parse null string: null"),
        ));
    };
    text.parse::<T>().map_err(|_| {
        let message = format!("For input string: \"{}\"", text);
        ctx.throw("java/lang/NumberFormatException", Some(&message))
    })
}

fn parse_boolean(ctx: &ShimContext<'_>) -> VmResult<bool> {
    Ok(string_arg(ctx, 0)?.map_or(false, |text| text.eq_ignore_ascii_case("true")))
}

fn box_constructor(ctx: &ShimContext<'_>, class_name: &str, descriptor: &str) -> VmResult<Option<Boxed>> {
    let value = match (class_name, descriptor) {
        ("java/lang/Boolean", "(Z)V") => Boxed::Boolean(ctx.arg_int(1)? != 0),
        ("java/lang/Byte", "(B)V") => Boxed::Byte(ctx.arg_int(1)? as i8),
        ("java/lang/Character", "(C)V") => Boxed::Char(ctx.arg_int(1)? as u16),
        ("java/lang/Short", "(S)V") => Boxed::Short(ctx.arg_int(1)? as i16),
        ("java/lang/Integer", "(I)V") => Boxed::Integer(ctx.arg_int(1)?),
        ("java/lang/Long", "(J)V") => Boxed::Long(ctx.arg_long(1)?),
        ("java/lang/Float", "(F)V") => Boxed::Float(int_to_float(ctx.arg_int(1)?)),
        ("java/lang/Double", "(D)V") => Boxed::Double(long_to_double(ctx.arg_long(1)?)),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn boxed_method(ctx: &mut ShimContext<'_>, value: &Boxed, name: &str, descriptor: &str) -> VmResult<HookResult> {
    match (name, descriptor) {
        ("intValue", "()I") => ctx.return_int(match *value {
            Boxed::Float(v) => v as i32,
            Boxed::Double(v) => v as i32,
            other => boxed_long(&other) as i32,
        })?,
        ("shortValue", "()S") => ctx.return_int(boxed_long(value) as i16 as i32)?,
        ("byteValue", "()B") => ctx.return_int(boxed_long(value) as i8 as i32)?,
        ("longValue", "()J") => ctx.return_long(boxed_long(value))?,
        ("floatValue", "()F") => ctx.return_int(float_to_int(boxed_double(value) as f32))?,
        ("doubleValue", "()D") => ctx.return_long(double_to_long(boxed_double(value)))?,
        ("booleanValue", "()Z") => ctx.return_bool(matches!(value, Boxed::Boolean(true)))?,
        ("charValue", "()C") => ctx.return_int(boxed_long(value) as u16 as i32)?,
        ("toString", "()Ljava/lang/String;") => ctx.return_string(boxed_string(value))?,
        ("hashCode", "()I") => ctx.return_int(boxed_hash(value))?,
        ("equals", "(Ljava/lang/Object;)Z") => {
            let other = ctx.arg_object(1)?;
            let other = other.as_ref().and_then(|o| match o.host_ref().as_deref() {
                Some(HostObject::Boxed(other)) => Some(*other),
                _ => None,
            });
            ctx.return_bool(other.map_or(false, |other| boxed_equal(value, &other)))?;
        }
        _ => return Ok(HookResult::Unhandled),
    }
    Ok(HookResult::Done)
}

fn boxed_long(value: &Boxed) -> i64 {
    match *value {
        Boxed::Boolean(v) => v as i64,
        Boxed::Byte(v) => v as i64,
        Boxed::Char(v) => v as i64,
        Boxed::Short(v) => v as i64,
        Boxed::Integer(v) => v as i64,
        Boxed::Long(v) => v,
        Boxed::Float(v) => v as i64,
        Boxed::Double(v) => v as i64,
    }
}

fn boxed_double(value: &Boxed) -> f64 {
    match *value {
        Boxed::Float(v) => v as f64,
        Boxed::Double(v) => v,
        other => boxed_long(&other) as f64,
    }
}

fn boxed_equal(a: &Boxed, b: &Boxed) -> bool {
    match (*a, *b) {
        (Boxed::Float(x), Boxed::Float(y)) => x.to_bits() == y.to_bits(),
        (Boxed::Double(x), Boxed::Double(y)) => x.to_bits() == y.to_bits(),
        (x, y) => x.class_name() == y.class_name() && boxed_long(&x) == boxed_long(&y),
    }
}

fn boxed_hash(value: &Boxed) -> i32 {
    match *value {
        Boxed::Boolean(true) => 1231,
        Boxed::Boolean(false) => 1237,
        Boxed::Long(v) => (v ^ ((v as u64) >> 32) as i64) as i32,
        Boxed::Float(v) => v.to_bits() as i32,
        Boxed::Double(v) => {
            let bits = v.to_bits();
            (bits ^ (bits >> 32)) as i32
        }
        other => boxed_long(&other) as i32,
    }
}

/// `toString` of a boxed primitive
pub(super) fn boxed_string(value: &Boxed) -> String {
    match *value {
        Boxed::Boolean(v) => v.to_string(),
        Boxed::Char(v) => char_text(v),
        Boxed::Float(v) => float_to_string(v),
        Boxed::Double(v) => double_to_string(v),
        other => boxed_long(&other).to_string(),
    }
}

// =========================================================
// Math and System
// =========================================================

fn math(ctx: &mut ShimContext<'_>, name: &str, descriptor: &str) -> VmResult<HookResult> {
    match (name, descriptor) {
        ("abs", "(I)I") => ctx.return_int(ctx.arg_int(0)?.wrapping_abs())?,
        ("abs", "(J)J") => ctx.return_long(ctx.arg_long(0)?.wrapping_abs())?,
        ("abs", "(F)F") => ctx.return_int(float_to_int(int_to_float(ctx.arg_int(0)?).abs()))?,
        ("abs", "(D)D") => ctx.return_long(double_to_long(long_to_double(ctx.arg_long(0)?).abs()))?,
        ("max", "(II)I") => ctx.return_int(ctx.arg_int(0)?.max(ctx.arg_int(1)?))?,
        ("min", "(II)I") => ctx.return_int(ctx.arg_int(0)?.min(ctx.arg_int(1)?))?,
        ("max", "(JJ)J") => ctx.return_long(ctx.arg_long(0)?.max(ctx.arg_long(2)?))?,
        ("min", "(JJ)J") => ctx.return_long(ctx.arg_long(0)?.min(ctx.arg_long(2)?))?,
        ("max", "(FF)F") | ("min", "(FF)F") => {
            let (a, b) = (int_to_float(ctx.arg_int(0)?), int_to_float(ctx.arg_int(1)?));
            let result = if a.is_nan() || b.is_nan() {
                f32::NAN
            } else if name == "max" {
                a.max(b)
            } else {
                a.min(b)
            };
            ctx.return_int(float_to_int(result))?;
        }
        ("max", "(DD)D") | ("min", "(DD)D") => {
            let (a, b) = (long_to_double(ctx.arg_long(0)?), long_to_double(ctx.arg_long(2)?));
            let result = if a.is_nan() || b.is_nan() {
                f64::NAN
            } else if name == "max" {
                a.max(b)
            } else {
                a.min(b)
            };
            ctx.return_long(double_to_long(result))?;
        }
        ("sqrt", "(D)D") => ctx.return_long(double_to_long(long_to_double(ctx.arg_long(0)?).sqrt()))?,
        ("pow", "(DD)D") => {
            let (base, exponent) = (long_to_double(ctx.arg_long(0)?), long_to_double(ctx.arg_long(2)?));
            ctx.return_long(double_to_long(base.powf(exponent)))?;
        }
        _ => return Ok(HookResult::Unhandled),
    }
    Ok(HookResult::Done)
}

fn system(ctx: &mut ShimContext<'_>, name: &str, descriptor: &str) -> VmResult<HookResult> {
    match (name, descriptor) {
        ("currentTimeMillis", "()J") => {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |elapsed| elapsed.as_millis() as i64);
            ctx.return_long(millis)?;
        }
        ("nanoTime", "()J") => {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |elapsed| elapsed.as_nanos() as i64);
            ctx.return_long(nanos)?;
        }
        ("identityHashCode", "(Ljava/lang/Object;)I") => {
            let hash = ctx.arg_object(0)?.map_or(0, |obj| obj.identity_hash());
            ctx.return_int(hash)?;
        }
        ("arraycopy", "(Ljava/lang/Object;ILjava/lang/Object;II)V") => array_copy(ctx)?,
        _ => return Ok(HookResult::Unhandled),
    }
    Ok(HookResult::Done)
}

fn array_copy(ctx: &mut ShimContext<'_>) -> VmResult<()> {
    let (Some(src), Some(dst)) = (ctx.arg_object(0)?, ctx.arg_object(2)?) else {
        return Err(ctx.throw("java/lang/NullPointerException", None));
    };
    let (src_pos, dst_pos, len) = (ctx.arg_int(1)?, ctx.arg_int(3)?, ctx.arg_int(4)?);
    let (Some(src_cell), Some(dst_cell)) = (src.as_array(), dst.as_array()) else {
        let message = format!("arraycopy: {} or {} is not an array", src.type_name(), dst.type_name());
        return Err(ctx.throw("java/lang/ArrayStoreException", Some(&message)));
    };

    let src_len = src_cell.borrow().len() as i64;
    let dst_len = dst_cell.borrow().len() as i64;
    let in_bounds = src_pos >= 0
        && dst_pos >= 0
        && len >= 0
        && src_pos as i64 + len as i64 <= src_len
        && dst_pos as i64 + len as i64 <= dst_len;
    if !in_bounds {
        let message = format!(
            "arraycopy: source index {}, destination index {}, length {}",
            src_pos, dst_pos, len
        );
        return Err(ctx.throw("java/lang/ArrayIndexOutOfBoundsException", Some(&message)));
    }

    let (src_pos, dst_pos, len) = (src_pos as usize, dst_pos as usize, len as usize);
    let copied = if src.ptr_eq(&dst) {
        let snapshot = src_cell.borrow().clone();
        dst_cell.borrow_mut().copy_from(dst_pos, &snapshot, src_pos, len)
    } else {
        dst_cell.borrow_mut().copy_from(dst_pos, &src_cell.borrow(), src_pos, len)
    };
    if !copied {
        let message = format!(
            "arraycopy: type mismatch: can not copy {} into {}",
            src.type_name(),
            dst.type_name()
        );
        return Err(ctx.throw("java/lang/ArrayStoreException", Some(&message)));
    }
    Ok(())
}

// =========================================================
// PrintStream
// =========================================================

fn print_method(ctx: &mut ShimContext<'_>, stream: Stream, name: &str, descriptor: &str) -> VmResult<HookResult> {
    let newline = match name {
        "print" => false,
        "println" => true,
        "flush" => return Ok(HookResult::Done),
        _ => return Ok(HookResult::Unhandled),
    };
    let params = params(descriptor)?;
    let mut text = match params.as_slice() {
        [] if newline => String::new(),
        [param] => text_arg(ctx, param, 1)?,
        _ => return Ok(HookResult::Unhandled),
    };
    if newline {
        text.push('\n');
    }
    ctx.write(stream, &text)?;
    Ok(HookResult::Done)
}

// =========================================================
// Threads
// =========================================================

fn construct_thread(ctx: &mut ShimContext<'_>, receiver: &ObjectRef, descriptor: &str) -> VmResult<HookResult> {
    let (runnable, name) = match descriptor {
        "()V" => (None, None),
        "(Ljava/lang/Runnable;)V" => (ctx.arg_object(1)?, None),
        "(Ljava/lang/String;)V" => (None, string_arg(ctx, 1)?),
        "(Ljava/lang/Runnable;Ljava/lang/String;)V" => (ctx.arg_object(1)?, string_arg(ctx, 2)?),
        _ => return Ok(HookResult::Unhandled),
    };
    // a Thread subclass without a Runnable runs its own run()
    let target = runnable.or_else(|| receiver.as_instance().map(|_| receiver.clone()));

    let id = ctx.vm.create_thread(name);
    let thread = ctx.vm.thread_mut(id);
    thread.target = target;
    thread.handle = Some(receiver.clone());
    install(receiver, HostObject::Thread(id));
    Ok(HookResult::Done)
}

fn thread_method(ctx: &mut ShimContext<'_>, id: ThreadId, name: &str, descriptor: &str) -> VmResult<HookResult> {
    match (name, descriptor) {
        ("start", "()V") => {
            if ctx.vm.thread(id).status != ThreadStatus::NotStarted {
                return Err(ctx.throw("java/lang/IllegalThreadStateException", None));
            }
            ctx.vm.start_thread(id)?;
        }
        ("run", "()V") => {
            let target = ctx.vm.thread(id).target.clone();
            let Some(target) = target else {
                return Ok(HookResult::Done);
            };
            let Some(class_name) = target.as_instance().map(|i| i.class_name().to_string()) else {
                return Ok(HookResult::Done);
            };
            if let Some(run) = ctx.vm.get_virtual_method(&class_name, "run", "()V")? {
                if !ctx.vm.enter_method(ctx.thread, run, &[Register::object(target)])? {
                    return Ok(HookResult::Yield);
                }
            }
        }
        ("interrupt", "()V") => ctx.vm.interrupt(id),
        ("isAlive", "()Z") => {
            let alive = ctx.vm.thread(id).is_alive();
            ctx.return_bool(alive)?;
        }
        ("setPriority", "(I)V") => {
            let priority = ctx.arg_int(1)?;
            if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
                return Err(ctx.throw("java/lang/IllegalArgumentException", None));
            }
            ctx.vm.set_priority(id, priority)?;
        }
        ("getPriority", "()I") => {
            let priority = ctx.vm.thread(id).priority;
            ctx.return_int(priority)?;
        }
        ("getName", "()Ljava/lang/String;") => {
            let name = ctx.vm.thread(id).name.clone();
            ctx.return_string(name)?;
        }
        ("setName", "(Ljava/lang/String;)V") => {
            let name = required_string(ctx, 1)?;
            ctx.vm.thread_mut(id).name = name;
        }
        ("getId", "()J") => ctx.return_long(id.index() as i64)?,
        ("setDaemon", "(Z)V") => {}
        ("isDaemon", "()Z") => ctx.return_bool(false)?,
        ("join", "()V") | ("join", "(J)V") => {
            if ctx.vm.join(ctx.thread, id) {
                return Ok(HookResult::Yield);
            }
        }
        ("toString", "()Ljava/lang/String;") => {
            let text = ctx.vm.thread(id).describe();
            ctx.return_string(text)?;
        }
        _ => return Ok(HookResult::Unhandled),
    }
    Ok(HookResult::Done)
}

// =========================================================
// Throwables
// =========================================================

fn throwable_method(
    ctx: &mut ShimContext<'_>,
    receiver: &ObjectRef,
    target: &ObjectRef,
    name: &str,
    descriptor: &str,
) -> VmResult<HookResult> {
    match (name, descriptor) {
        ("getMessage", "()Ljava/lang/String;") | ("getLocalizedMessage", "()Ljava/lang/String;") => {
            let message = match target.host_ref().as_deref() {
                Some(HostObject::Throwable { message, .. }) => message.clone(),
                _ => None,
            };
            ctx.return_object(message.map(ObjectRef::string))?;
        }
        ("getCause", "()Ljava/lang/Throwable;") => {
            let cause = match target.host_ref().as_deref() {
                Some(HostObject::Throwable { cause, .. }) => cause.clone(),
                _ => None,
            };
            ctx.return_object(cause)?;
        }
        ("initCause", "(Ljava/lang/Throwable;)Ljava/lang/Throwable;") => {
            let new_cause = ctx.arg_object(1)?;
            if let Some(HostObject::Throwable { cause, .. }) = target.host_mut().as_deref_mut() {
                *cause = new_cause;
            }
            ctx.return_object(Some(receiver.clone()))?;
        }
        ("fillInStackTrace", "()Ljava/lang/Throwable;") => ctx.return_object(Some(receiver.clone()))?,
        ("toString", "()Ljava/lang/String;") => {
            let text = ctx.describe(receiver);
            ctx.return_string(text)?;
        }
        ("printStackTrace", "()V") => {
            let text = format!("{}\n", ctx.describe(receiver));
            ctx.write(Stream::Err, &text)?;
        }
        _ => return Ok(HookResult::Unhandled),
    }
    Ok(HookResult::Done)
}

// =========================================================
// Classes and Reflection
// =========================================================

fn class_method(ctx: &mut ShimContext<'_>, type_desc: &str, name: &str, descriptor: &str) -> VmResult<HookResult> {
    match (name, descriptor) {
        ("getName", "()Ljava/lang/String;") => ctx.return_string(type_name(type_desc))?,
        ("getSimpleName", "()Ljava/lang/String;") => {
            let name = type_name(type_desc);
            let simple = name.rsplit('.').next().unwrap_or(&name).to_string();
            ctx.return_string(simple)?;
        }
        ("toString", "()Ljava/lang/String;") => ctx.return_string(class_string(type_desc))?,
        ("isInstance", "(Ljava/lang/Object;)Z") => {
            let matches = match ctx.arg_object(1)? {
                Some(obj) => ctx.vm.is_instance_of(&obj, type_desc)?,
                None => false,
            };
            ctx.return_bool(matches)?;
        }
        ("isArray", "()Z") => ctx.return_bool(type_desc.starts_with('['))?,
        ("isPrimitive", "()Z") => ctx.return_bool(primitive_name(type_desc).is_some())?,
        _ => return Ok(HookResult::Unhandled),
    }
    Ok(HookResult::Done)
}

/// `Class.toString` of a type descriptor
pub(super) fn class_string(type_desc: &str) -> String {
    match primitive_name(type_desc) {
        Some(name) => name.to_string(),
        None => format!("class {}", type_name(type_desc)),
    }
}

/// `Class.getName` of a type descriptor
fn type_name(type_desc: &str) -> String {
    if let Some(name) = primitive_name(type_desc) {
        return name.to_string();
    }
    if type_desc.starts_with('[') {
        return type_desc.replace('/', ".");
    }
    dexvm_bytecode::descriptor::class_name(type_desc).replace('/', ".")
}

fn primitive_name(type_desc: &str) -> Option<&'static str> {
    let name = match type_desc {
        "Z" => "boolean",
        "B" => "byte",
        "C" => "char",
        "S" => "short",
        "I" => "int",
        "J" => "long",
        "F" => "float",
        "D" => "double",
        "V" => "void",
        _ => return None,
    };
    Some(name)
}

/// Primitive descriptor behind a box class's `TYPE` field
fn primitive_of(class_name: &str) -> Option<&'static str> {
    let primitive = match class_name {
        "java/lang/Boolean" => "Z",
        "java/lang/Byte" => "B",
        "java/lang/Character" => "C",
        "java/lang/Short" => "S",
        "java/lang/Integer" => "I",
        "java/lang/Long" => "J",
        "java/lang/Float" => "F",
        "java/lang/Double" => "D",
        "java/lang/Void" => "V",
        _ => return None,
    };
    Some(primitive)
}

fn reflect_array(ctx: &mut ShimContext<'_>, name: &str, descriptor: &str) -> VmResult<HookResult> {
    let dims = match (name, descriptor) {
        ("newInstance", "(Ljava/lang/Class;I)Ljava/lang/Object;") => vec![ctx.arg_int(1)?],
        ("newInstance", "(Ljava/lang/Class;[I)Ljava/lang/Object;") => {
            let array = ctx
                .arg_object(1)?
                .ok_or_else(|| ctx.throw("java/lang/NullPointerException", None))?;
            let dims = match array.as_array().map(|cell| cell.borrow().clone()) {
                Some(ArrayData::Int(dims)) => dims,
                _ => return Err(VmError::TypeError("Array.newInstance dimensions are not an int[]".to_string())),
            };
            if dims.is_empty() {
                return Err(ctx.throw("java/lang/IllegalArgumentException", Some("Empty dimensions array")));
            }
            dims
        }
        _ => return Ok(HookResult::Unhandled),
    };
    let class = ctx
        .arg_object(0)?
        .ok_or_else(|| ctx.throw("java/lang/NullPointerException", None))?;
    let component = match class.host_ref().as_deref() {
        Some(HostObject::Class(type_desc)) => type_desc.clone(),
        _ => return Err(VmError::TypeError(format!("{:?} is not a class object", class))),
    };
    let array = new_array(ctx, &component, &dims)?;
    ctx.return_object(Some(array))?;
    Ok(HookResult::Done)
}

/// Allocate nested arrays of `component` with the outermost dimension first
fn new_array(ctx: &ShimContext<'_>, component: &str, dims: &[i32]) -> VmResult<ObjectRef> {
    let (&len, inner) = dims
        .split_first()
        .ok_or_else(|| VmError::Internal("array allocation without dimensions".to_string()))?;
    if len < 0 {
        return Err(ctx.throw("java/lang/NegativeArraySizeException", Some(&len.to_string())));
    }
    if inner.is_empty() {
        let data = ArrayData::new(component, len as usize)
            .ok_or_else(|| ctx.throw("java/lang/IllegalArgumentException", Some(component)))?;
        return Ok(ObjectRef::new(Object::array(data)));
    }
    let items = (0..len)
        .map(|_| new_array(ctx, component, inner).map(Some))
        .collect::<VmResult<Vec<_>>>()?;
    let data = ArrayData::Object {
        component: format!("{}{}", "[".repeat(inner.len()), component),
        items,
    };
    Ok(ObjectRef::new(Object::array(data)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SharedBuffer;
    use crate::vm::Vm;
    use dexvm_bytecode::{ClassBuilder, Code, DexBuilder, DexFile, Opcode};

    const ACC_STATIC: u32 = 0x0008;

    /// VM with one running thread whose top frame has `args` staged
    fn context_vm(args: &[Register]) -> (Vm, ThreadId, SharedBuffer) {
        let out = SharedBuffer::new();
        let mut vm = Vm::new().with_output(out.clone());
        let thread = vm.create_thread(Some("test".to_string()));
        let mut dex = DexBuilder::new();
        let body = Code::new(1, 0, 5, vec![Opcode::ReturnVoid.to_u8() as u16]);
        dex.add_class(ClassBuilder::new("Lt/Host;").direct_method("call", "()V", ACC_STATIC, Some(body)));
        let dex = DexFile::parse(&dex.build().unwrap()).unwrap();
        vm.load_module(&dex).unwrap();
        let method = vm.get_direct_method("t/Host", "call", "()V").unwrap().unwrap();
        vm.push_frame(thread, method, false).unwrap();
        let frame = vm.thread_mut(thread).frame_mut().unwrap();
        for (position, arg) in args.iter().enumerate() {
            match arg {
                Register::Int(v) => frame.set_argument_int(position, *v),
                Register::Object(obj) => frame.set_argument_object(position, obj.clone()),
            }
        }
        (vm, thread, out)
    }

    #[test]
    fn test_string_methods_use_utf16_units() {
        let shim = StandardShim::new();
        let text = ObjectRef::string("h\u{e9}llo \u{1F600}");
        let (mut vm, thread, _) = context_vm(&[Register::object(text)]);
        let mut ctx = ShimContext::new(&mut vm, thread);
        shim.instance_method(&mut ctx, "java/lang/String", "length", "()I").unwrap();
        assert_eq!(ctx.frame().unwrap().single_return, 8);
        shim.instance_method(&mut ctx, "java/lang/String", "hashCode", "()I").unwrap();
        assert_eq!(ctx.frame().unwrap().single_return, string_hash("h\u{e9}llo \u{1F600}"));
        assert_eq!(string_hash("hello"), 99162322);
    }

    #[test]
    fn test_char_at_out_of_range_throws() {
        let shim = StandardShim::new();
        let (mut vm, thread, _) = context_vm(&[Register::object(ObjectRef::string("ab")), Register::Int(2)]);
        let mut ctx = ShimContext::new(&mut vm, thread);
        let err = shim.instance_method(&mut ctx, "java/lang/String", "charAt", "(I)C").unwrap_err();
        let VmError::Throw(exception) = err else {
            panic!("expected a module-level exception");
        };
        assert_eq!(exception.type_name(), "java/lang/StringIndexOutOfBoundsException");
    }

    #[test]
    fn test_println_formats_doubles() {
        let shim = StandardShim::new();
        let (low, high) = crate::value::split_wide(double_to_long(1e10));
        let out_stream = shim.singleton("System.out", || HostObject::PrintStream(Stream::Out));
        let (mut vm, thread, out) = context_vm(&[Register::object(out_stream), Register::Int(low), Register::Int(high)]);
        let mut ctx = ShimContext::new(&mut vm, thread);
        let result = shim.instance_method(&mut ctx, "java/io/PrintStream", "println", "(D)V").unwrap();
        assert_eq!(result, HookResult::Done);
        assert_eq!(out.contents(), "1.0E10\n");
    }

    #[test]
    fn test_buffer_append_returns_receiver() {
        let shim = StandardShim::new();
        let buffer = ObjectRef::new(Object::host(HostObject::StringBuffer("x=".to_string())));
        let (mut vm, thread, _) = context_vm(&[Register::object(buffer.clone()), Register::Int(42)]);
        let mut ctx = ShimContext::new(&mut vm, thread);
        shim.instance_method(&mut ctx, "java/lang/StringBuffer", "append", "(I)Ljava/lang/StringBuffer;")
            .unwrap();
        let returned = ctx.frame().unwrap().object_return.clone().unwrap();
        assert!(returned.ptr_eq(&buffer));
        assert!(matches!(&*buffer.host_ref().unwrap(), HostObject::StringBuffer(s) if s == "x=42"));
    }

    #[test]
    fn test_throwable_constructor_fills_host_object() {
        let shim = StandardShim::new();
        let exception = ObjectRef::new(Object::host(HostObject::Uninitialized(
            "java/lang/IllegalStateException".to_string(),
        )));
        let (mut vm, thread, _) = context_vm(&[
            Register::object(exception.clone()),
            Register::object(ObjectRef::string("bad")),
        ]);
        let mut ctx = ShimContext::new(&mut vm, thread);
        let result = shim
            .constructor(&mut ctx, "java/lang/IllegalStateException", "(Ljava/lang/String;)V")
            .unwrap();
        assert_eq!(result, HookResult::Done);
        assert_eq!(ctx.describe(&exception), "java.lang.IllegalStateException: bad");
        assert_eq!(vm.describe_exception(&exception), "java.lang.IllegalStateException:bad");
    }

    #[test]
    fn test_hierarchy() {
        let shim = StandardShim::new();
        assert!(shim.is_throwable("java/lang/ArrayIndexOutOfBoundsException"));
        assert!(shim.is_throwable("com/acme/WidgetException"));
        assert!(!shim.is_throwable("java/lang/String"));
        assert_eq!(shim.superclass_of(OBJECT), None);
        assert_eq!(shim.superclass_of("java/lang/Integer").as_deref(), Some("java/lang/Number"));
    }

    #[test]
    fn test_multi_dimension_array() {
        let (vm, thread, _) = context_vm(&[]);
        let mut vm = vm;
        let ctx = ShimContext::new(&mut vm, thread);
        let array = new_array(&ctx, "I", &[2, 3]).unwrap();
        let outer = array.as_array().unwrap().borrow();
        assert_eq!(outer.descriptor(), "[[I");
        let inner = outer.get_object(1).unwrap().unwrap();
        assert_eq!(inner.as_array().unwrap().borrow().len(), 3);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(class_string("I"), "int");
        assert_eq!(class_string("Ljava/lang/String;"), "class java.lang.String");
        assert_eq!(type_name("[Ljava/lang/String;"), "[Ljava.lang.String;");
    }
}
