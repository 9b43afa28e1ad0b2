// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use alloc::sync::Arc;
use core::{
    any::Any,
    fmt::{self, Write as _},
    hash::{Hash, Hasher},
    mem,
};
use std::sync::{Mutex, MutexGuard};

use crate::{Map, OperationError, Primitive, Type, util::lock_no_poison};

/// Shared handle to a heap object of the system under test.
pub type ObjectRef = Arc<Object>;

/// Shared handle to an array.
pub type ArrayRef = Arc<Array>;

/// Heap object: a runtime type, a field table and an optional native payload.
pub struct Object {
    ty: Type,
    fields: Mutex<Map<Box<str>, Value>>,
    payload: Option<Box<dyn Any + Send + Sync>>,
}

impl Object {
    /// Runtime type.
    #[must_use]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Read a field; unset fields read as null.
    #[must_use]
    pub fn field(&self, name: &str) -> Value {
        lock_no_poison(&self.fields)
            .get(name)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Write a field, returning the previous value.
    pub fn set_field(&self, name: &str, value: Value) -> Value {
        lock_no_poison(&self.fields)
            .insert(Box::from(name), value)
            .unwrap_or(Value::Null)
    }

    /// Native payload attached at construction, if it has type `T`.
    #[must_use]
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| {
            let p: &dyn Any = p;
            p.downcast_ref()
        })
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("ty", &self.ty)
            .field("fields", &*lock_no_poison(&self.fields))
            .field("payload", &self.payload.is_some())
            .finish()
    }
}

/// Fixed-length array with a declared element type.
#[derive(Debug)]
pub struct Array {
    element: Type,
    elements: Mutex<Vec<Value>>,
}

impl Array {
    /// Element type.
    #[must_use]
    pub fn element_type(&self) -> &Type {
        &self.element
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements().len()
    }

    /// Whether the array has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock and access the elements.
    pub fn elements(&self) -> MutexGuard<'_, Vec<Value>> {
        lock_no_poison(&self.elements)
    }
}

/// Runtime value flowing between statements.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent reference.
    #[default]
    Null,
    /// `boolean`
    Bool(bool),
    /// `char`
    Char(char),
    /// `byte`
    Byte(i8),
    /// `short`
    Short(i16),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// Immutable string.
    Str(Arc<str>),
    /// Enum constant.
    Enum {
        /// Enum type.
        ty: Type,
        /// Constant name.
        name: Arc<str>,
    },
    /// Array reference.
    Array(ArrayRef),
    /// Object reference.
    Object(ObjectRef),
}

impl Value {
    /// Allocate a fresh object with no fields set.
    #[must_use]
    pub fn new_object(ty: Type) -> Self {
        Self::Object(Arc::new(Object {
            ty,
            fields: Mutex::default(),
            payload: None,
        }))
    }

    /// Allocate a fresh object carrying a native payload.
    #[must_use]
    pub fn new_object_with(ty: Type, payload: impl Any + Send + Sync) -> Self {
        Self::Object(Arc::new(Object {
            ty,
            fields: Mutex::default(),
            payload: Some(Box::new(payload)),
        }))
    }

    /// Allocate an array from its elements.
    #[must_use]
    pub fn new_array(element: Type, elements: Vec<Self>) -> Self {
        Self::Array(Arc::new(Array {
            element,
            elements: Mutex::new(elements),
        }))
    }

    /// String value.
    #[must_use]
    pub fn str(s: &str) -> Self {
        Self::Str(Arc::from(s))
    }

    /// Is this null?
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Object reference, if this is an object.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Array reference, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Integer value, if this is an `int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match *self {
            Self::Int(i) => Some(i),
            _ => None,
        }
    }

    /// Boolean value, if this is a `boolean`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// String contents, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Runtime type; `None` for null.
    #[must_use]
    pub fn runtime_type(&self) -> Option<Type> {
        match self {
            Self::Null => None,
            Self::Str(_) => Some(Type::string()),
            Self::Enum { ty, .. } => Some(ty.clone()),
            Self::Array(a) => Some(Type::array(a.element.clone())),
            Self::Object(o) => Some(o.ty.clone()),
            _ => self.primitive().map(Type::primitive),
        }
    }

    /// Type of a primitive or string literal; `None` for any other value.
    #[must_use]
    pub fn literal_type(&self) -> Option<Type> {
        match self {
            Self::Str(_) => Some(Type::string()),
            _ => self.primitive().map(Type::primitive),
        }
    }

    fn primitive(&self) -> Option<Primitive> {
        Some(match self {
            Self::Bool(_) => Primitive::Boolean,
            Self::Char(_) => Primitive::Char,
            Self::Byte(_) => Primitive::Byte,
            Self::Short(_) => Primitive::Short,
            Self::Int(_) => Primitive::Int,
            Self::Long(_) => Primitive::Long,
            Self::Float(_) => Primitive::Float,
            Self::Double(_) => Primitive::Double,
            _ => return None,
        })
    }

    /// Can this value be stored in a slot of type `ty`?
    #[must_use]
    pub fn is_instance_of(&self, ty: &Type) -> bool {
        match self.runtime_type() {
            None => ty.is_reference(),
            Some(t) => ty.is_assignable_from(&t),
        }
    }

    /// This value as stored in a slot of type `ty`: primitives are widened
    /// to the slot's primitive type, other values are kept as they are.
    /// `None` when the value does not fit the slot.
    #[expect(clippy::cast_precision_loss)]
    pub(crate) fn convert_to(&self, ty: &Type) -> Option<Self> {
        let Some(target) = ty.as_primitive() else {
            return self.is_instance_of(ty).then(|| self.clone());
        };
        let source = self.primitive()?;
        if source == target {
            return Some(self.clone());
        }
        if !source.widens_to(target) {
            return None;
        }
        let int = match *self {
            Self::Byte(v) => i64::from(v),
            Self::Short(v) => i64::from(v),
            Self::Char(c) => i64::from(u32::from(c)),
            Self::Int(v) => i64::from(v),
            Self::Long(v) => v,
            Self::Float(v) => return Some(Self::Double(f64::from(v))),
            _ => return None,
        };
        Some(match target {
            Primitive::Short => Self::Short(int as i16),
            Primitive::Int => Self::Int(int as i32),
            Primitive::Long => Self::Long(int),
            Primitive::Float => Self::Float(int as f32),
            Primitive::Double => Self::Double(int as f64),
            Primitive::Boolean | Primitive::Byte | Primitive::Char => return None,
        })
    }

    /// Initial value used to seed a type: `0`, `false`, `'a'`, `""` or null.
    #[must_use]
    pub fn zero_for(ty: &Type) -> Self {
        match ty.as_primitive() {
            Some(Primitive::Char) => Self::Char('a'),
            Some(p) => Self::default_for_primitive(p),
            None if ty.is_string() => Self::str(""),
            None => Self::Null,
        }
    }

    /// Default value of an unset field of type `ty`.
    #[must_use]
    pub fn default_for(ty: &Type) -> Self {
        ty.as_primitive()
            .map_or(Self::Null, Self::default_for_primitive)
    }

    fn default_for_primitive(p: Primitive) -> Self {
        match p {
            Primitive::Boolean => Self::Bool(false),
            Primitive::Byte => Self::Byte(0),
            Primitive::Short => Self::Short(0),
            Primitive::Char => Self::Char('\0'),
            Primitive::Int => Self::Int(0),
            Primitive::Long => Self::Long(0),
            Primitive::Float => Self::Float(0.0),
            Primitive::Double => Self::Double(0.0),
        }
    }

    /// Can this value appear in a literal statement of type `ty`?
    pub(crate) fn check_literal(&self, ty: &Type, maxlen: usize) -> Result<(), OperationError> {
        let invalid = |reason| OperationError::InvalidLiteral {
            ty: ty.name().to_owned(),
            reason,
        };
        if ty.is_void() {
            return Err(OperationError::VoidNotAllowed);
        }
        match self {
            Self::Null if ty.is_reference() => Ok(()),
            Self::Null => Err(invalid("null for a primitive type")),
            Self::Str(s) if ty.is_string() => {
                if s.chars().count() > maxlen {
                    Err(invalid("string exceeds maximum literal length"))
                } else {
                    Ok(())
                }
            }
            _ if self.primitive().is_some() && self.primitive() == ty.as_primitive() => Ok(()),
            _ => Err(invalid("value is not a primitive or string of this type")),
        }
    }

    /// Same value with every NaN collapsed to the default bit pattern, which
    /// is the only one the literal text form can express.
    #[must_use]
    pub(crate) fn canonical(self) -> Self {
        match self {
            Self::Float(v) if v.is_nan() => Self::Float(f32::NAN),
            Self::Double(v) if v.is_nan() => Self::Double(f64::NAN),
            v => v,
        }
    }

    /// Text of this value in a literal descriptor: `5`, `61` (char), `"a\n"`, `null`.
    #[must_use]
    pub fn format_literal(&self) -> String {
        match self {
            Self::Null => "null".into(),
            Self::Bool(b) => b.to_string(),
            Self::Char(c) => format!("{:x}", u32::from(*c)),
            Self::Byte(v) => v.to_string(),
            Self::Short(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Long(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Double(v) => v.to_string(),
            Self::Str(s) => format!("\"{}\"", s.escape_default()),
            Self::Enum { ty, name } => format!("{ty}.{name}"),
            Self::Array(a) => format!("{}[{}]", a.element, a.len()),
            Self::Object(o) => format!("{}@{:p}", o.ty, Arc::as_ptr(o)),
        }
    }

    /// Parse literal descriptor text for type `ty`.
    ///
    /// # Errors
    ///
    /// Fails when the text is not a valid literal of `ty`.
    pub fn parse_literal(ty: &Type, text: &str) -> Result<Self, OperationError> {
        let invalid = |reason| OperationError::InvalidLiteral {
            ty: ty.name().to_owned(),
            reason,
        };
        let text = text.trim();
        if text == "null" {
            return if ty.is_reference() {
                Ok(Self::Null)
            } else {
                Err(invalid("null for a primitive type"))
            };
        }
        if ty.is_string() {
            let inner = text
                .strip_prefix('"')
                .and_then(|t| t.strip_suffix('"'))
                .ok_or_else(|| invalid("string must be enclosed in double quotes"))?;
            return unescape(inner)
                .map(|s| Self::Str(Arc::from(s)))
                .ok_or_else(|| invalid("invalid escape sequence"));
        }
        let Some(p) = ty.as_primitive() else {
            return Err(invalid("only primitives, strings and null have literals"));
        };
        let number = || invalid("malformed number");
        Ok(match p {
            Primitive::Boolean => Self::Bool(text.parse().map_err(|_| invalid("expected true or false"))?),
            Primitive::Char => Self::Char(
                u32::from_str_radix(text, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| invalid("char must be a hexadecimal code point"))?,
            ),
            Primitive::Byte => Self::Byte(text.parse().map_err(|_| number())?),
            Primitive::Short => Self::Short(text.parse().map_err(|_| number())?),
            Primitive::Int => Self::Int(text.parse().map_err(|_| number())?),
            Primitive::Long => Self::Long(text.parse().map_err(|_| number())?),
            Primitive::Float => Self::Float(text.parse().map_err(|_| number())?),
            Primitive::Double => Self::Double(text.parse().map_err(|_| number())?),
        }
        .canonical())
    }

    /// Source-code rendering of a literal value.
    #[must_use]
    pub fn code_literal(&self) -> String {
        match self {
            Self::Char(c) => format!("'{}'", c.escape_default()),
            Self::Byte(v) => format!("(byte){v}"),
            Self::Short(v) => format!("(short){v}"),
            Self::Long(v) => format!("{v}L"),
            Self::Float(v) => float_code(f64::from(*v), "f"),
            Self::Double(v) => float_code(*v, ""),
            _ => self.format_literal(),
        }
    }
}

fn float_code(v: f64, suffix: &str) -> String {
    let mut s = v.to_string();
    if v.is_finite() && !s.contains(['.', 'e']) {
        s.push_str(".0");
    }
    s.push_str(suffix);
    s
}

fn unescape(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let e = chars.next()?;
        out.push(match e {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' | '"' | '\'' => e,
            'u' => {
                if chars.next()? != '{' {
                    return None;
                }
                let mut hex = String::new();
                for h in chars.by_ref() {
                    if h == '}' {
                        break;
                    }
                    hex.push(h);
                }
                char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?
            }
            _ => return None,
        });
    }
    Some(out)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Byte(a), Self::Byte(b)) => a == b,
            (Self::Short(a), Self::Short(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Enum { ty: t1, name: n1 }, Self::Enum { ty: t2, name: n2 }) => {
                t1 == t2 && n1 == n2
            }
            (Self::Array(a), Self::Array(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Char(v) => v.hash(state),
            Self::Byte(v) => v.hash(state),
            Self::Short(v) => v.hash(state),
            Self::Int(v) => v.hash(state),
            Self::Long(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Double(v) => v.to_bits().hash(state),
            Self::Str(s) => s.hash(state),
            Self::Enum { ty, name } => {
                ty.hash(state);
                name.hash(state);
            }
            Self::Array(a) => Arc::as_ptr(a).hash(state),
            Self::Object(o) => Arc::as_ptr(o).hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array(a) => {
                f.write_char('[')?;
                for (i, e) in a.elements().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{e}")?;
                }
                f.write_char(']')
            }
            _ => f.write_str(&self.code_literal()),
        }
    }
}

/// Fault thrown by an operation under test.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fault {
    /// Fault class, e.g. `IllegalArgument`.
    pub name: String,
    /// Human-readable message.
    pub message: String,
    /// Source location, for faults raised by panics.
    pub location: Option<String>,
}

impl Fault {
    /// Name of the fault raised when a method is called on a null receiver.
    pub const NULL_REFERENCE: &'static str = "NullReference";
    /// Name of the fault raised for panics inside operations.
    pub const PANIC: &'static str = "Panic";

    /// Create a fault.
    #[must_use]
    pub fn new(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_owned(),
            message: message.into(),
            location: None,
        }
    }

    /// Fault for a call on a null receiver.
    #[must_use]
    pub fn null_reference(operation: &str) -> Self {
        Self::new(
            Self::NULL_REFERENCE,
            format!("receiver of `{operation}` is null"),
        )
    }

    /// Fault for a panic caught while running an operation.
    #[must_use]
    pub(crate) fn from_panic(message: String, location: Option<String>) -> Self {
        Self {
            name: Self::PANIC.to_owned(),
            message,
            location,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " at {loc}")?;
        }
        Ok(())
    }
}

impl core::error::Error for Fault {}

#[cfg(test)]
mod tests {
    use chaos_theory::{check, make};

    use super::*;

    fn roundtrip(ty: &Type, v: &Value) {
        let text = v.format_literal();
        let back = Value::parse_literal(ty, &text).unwrap();
        assert_eq!(&back, v, "{text}");
    }

    #[test]
    fn literal_text_roundtrip() {
        check(|src| {
            let i: i32 = src.any("i");
            roundtrip(&Type::int(), &Value::Int(i));
            let l: i64 = src.any("l");
            roundtrip(&Type::primitive(Primitive::Long), &Value::Long(l));
            let d = src.any_of("d", make::float_in_range(-1e12..1e12f64));
            roundtrip(&Type::primitive(Primitive::Double), &Value::Double(d));
            let c: char = src.any("c");
            roundtrip(&Type::primitive(Primitive::Char), &Value::Char(c));
            let s: String = src.any("s");
            roundtrip(&Type::string(), &Value::str(&s));
        });
    }

    #[test]
    fn literal_text_format() {
        assert_eq!(Value::Char(' ').format_literal(), "20");
        assert_eq!(Value::str("a\n\"").format_literal(), r#""a\n\"""#);
        assert_eq!(Value::Null.format_literal(), "null");
        assert_eq!(
            Value::parse_literal(&Type::object(), "null"),
            Ok(Value::Null)
        );
        assert!(Value::parse_literal(&Type::int(), "null").is_err());
        assert!(Value::parse_literal(&Type::string(), "abc").is_err());
        assert!(Value::parse_literal(&Type::int(), "1.5").is_err());
    }

    #[test]
    fn zero_values() {
        assert_eq!(Value::zero_for(&Type::int()), Value::Int(0));
        assert_eq!(
            Value::zero_for(&Type::primitive(Primitive::Char)),
            Value::Char('a')
        );
        assert_eq!(Value::zero_for(&Type::string()), Value::str(""));
        assert_eq!(Value::zero_for(&Type::object()), Value::Null);
        assert_eq!(
            Value::default_for(&Type::primitive(Primitive::Char)),
            Value::Char('\0')
        );
    }

    #[test]
    fn reference_identity() {
        let ty = Type::class("Foo", []).unwrap();
        let a = Value::new_object(ty.clone());
        let b = Value::new_object(ty);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
    }

    #[test]
    fn literal_types() {
        assert_eq!(Value::Int(1).literal_type(), Some(Type::int()));
        assert_eq!(Value::str("a").literal_type(), Some(Type::string()));
        assert_eq!(Value::Null.literal_type(), None);
        let foo = Type::class("Foo", []).unwrap();
        assert_eq!(Value::new_object(foo).literal_type(), None);
        assert_eq!(Value::new_array(Type::int(), vec![]).literal_type(), None);
    }

    #[test]
    fn object_fields_and_payload() {
        let ty = Type::class("Counter", []).unwrap();
        let v = Value::new_object_with(ty.clone(), 41u32);
        let o = v.as_object().unwrap();
        assert_eq!(o.field("n"), Value::Null);
        o.set_field("n", Value::Int(1));
        assert_eq!(o.field("n"), Value::Int(1));
        assert_eq!(o.payload::<u32>(), Some(&41));
        assert_eq!(o.payload::<i64>(), None);
        assert_eq!(v.runtime_type(), Some(ty));
    }

    #[test]
    fn literal_checks() {
        let long_string = Value::str(&"x".repeat(11));
        assert!(long_string.check_literal(&Type::string(), 10).is_err());
        assert!(long_string.check_literal(&Type::string(), 11).is_ok());
        assert!(Value::Int(1).check_literal(&Type::boolean(), 10).is_err());
        assert!(Value::Null.check_literal(&Type::object(), 10).is_ok());
        assert_eq!(
            Value::Int(1).check_literal(&Type::void(), 10),
            Err(OperationError::VoidNotAllowed)
        );
    }

    #[test]
    fn code_rendering() {
        assert_eq!(Value::Long(3).code_literal(), "3L");
        assert_eq!(Value::Float(1.0).code_literal(), "1.0f");
        assert_eq!(Value::Char('\'').code_literal(), r"'\''");
        assert_eq!(Value::str("hi").code_literal(), "\"hi\"");
    }

    #[test]
    fn instance_checks() {
        let base = Type::class("Base", []).unwrap();
        let derived = Type::class("Derived", [base.clone()]).unwrap();
        let v = Value::new_object(derived);
        assert!(v.is_instance_of(&base));
        assert!(v.is_instance_of(&Type::object()));
        assert!(Value::Null.is_instance_of(&base));
        assert!(!Value::Null.is_instance_of(&Type::int()));
        assert!(Value::Int(1).is_instance_of(&Type::primitive(Primitive::Long)));
    }
}
