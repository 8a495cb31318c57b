//! Type and method descriptor parsing
//!
//! Field types use the JVM descriptor grammar (`I`, `J`, `Ljava/lang/String;`,
//! `[[I`, ...). Method descriptors are `(` parameter types `)` return type.

use thiserror::Error;

/// Errors produced when a descriptor does not follow the grammar
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// Missing parenthesis around the parameter list
    #[error("Malformed method descriptor: {0}")]
    MalformedMethod(String),

    /// Unknown type character or unterminated class name
    #[error("Malformed type descriptor '{descriptor}' at {position}")]
    MalformedType {
        /// Descriptor being parsed
        descriptor: String,
        /// Byte position of the failure
        position: usize,
    },
}

/// Parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Parameter type descriptors, in order
    pub params: Vec<String>,
    /// Return type descriptor
    pub return_type: String,
}

impl MethodDescriptor {
    /// Parse a `(params)return` descriptor
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let malformed = || DescriptorError::MalformedMethod(descriptor.to_string());
        let inner = descriptor.strip_prefix('(').ok_or_else(malformed)?;
        let close = inner.find(')').ok_or_else(malformed)?;
        let (param_list, rest) = inner.split_at(close);
        let return_type = &rest[1..];

        let mut params = Vec::new();
        let mut position = 0;
        while position < param_list.len() {
            let end = type_end(param_list, position).ok_or_else(|| DescriptorError::MalformedType {
                descriptor: descriptor.to_string(),
                position: position + 1,
            })?;
            params.push(param_list[position..end].to_string());
            position = end;
        }

        if return_type.is_empty() || type_end(return_type, 0) != Some(return_type.len()) {
            return Err(malformed());
        }

        Ok(Self {
            params,
            return_type: return_type.to_string(),
        })
    }

    /// Number of 32-bit argument words the parameters occupy
    pub fn param_words(&self) -> usize {
        self.params.iter().map(|p| type_words(p)).sum()
    }

    /// Short form used by the DEX proto table (`V` + one char per parameter)
    pub fn shorty(&self) -> String {
        std::iter::once(self.return_type.as_str())
            .chain(self.params.iter().map(String::as_str))
            .map(shorty_char)
            .collect()
    }
}

/// Find where the type starting at `start` ends
fn type_end(descriptor: &str, start: usize) -> Option<usize> {
    let bytes = descriptor.as_bytes();
    let mut position = start;
    while bytes.get(position) == Some(&b'[') {
        position += 1;
    }
    match bytes.get(position)? {
        b'Z' | b'B' | b'S' | b'C' | b'I' | b'J' | b'F' | b'D' | b'V' => Some(position + 1),
        b'L' => descriptor[position..].find(';').map(|i| position + i + 1),
        _ => None,
    }
}

/// Number of registers a value of this type occupies
pub fn type_words(type_desc: &str) -> usize {
    if is_wide(type_desc) {
        2
    } else {
        1
    }
}

/// Check whether the type is a 64-bit primitive (`J` or `D`)
pub fn is_wide(type_desc: &str) -> bool {
    matches!(type_desc.as_bytes().first(), Some(b'J') | Some(b'D'))
}

/// Check whether the type is a reference type (class or array)
pub fn is_reference(type_desc: &str) -> bool {
    matches!(type_desc.as_bytes().first(), Some(b'L') | Some(b'['))
}

/// Shorty character for a type descriptor
pub fn shorty_char(type_desc: &str) -> char {
    match type_desc.chars().next() {
        Some('L') | Some('[') | None => 'L',
        Some(c) => c,
    }
}

/// `Ljava/lang/String;` to `java/lang/String`
///
/// Array and primitive descriptors are returned unchanged.
pub fn class_name(type_desc: &str) -> &str {
    type_desc
        .strip_prefix('L')
        .and_then(|s| s.strip_suffix(';'))
        .unwrap_or(type_desc)
}

/// `java/lang/String` to `Ljava/lang/String;`
///
/// Names already in descriptor form (arrays) are returned unchanged.
pub fn class_descriptor(class_name: &str) -> String {
    if class_name.starts_with('[') || (class_name.starts_with('L') && class_name.ends_with(';')) {
        class_name.to_string()
    } else {
        format!("L{};", class_name)
    }
}
