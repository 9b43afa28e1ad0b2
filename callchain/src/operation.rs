// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use alloc::sync::Arc;
use core::{
    fmt::{self, Write as _},
    hash::{Hash, Hasher},
    mem,
};
use std::{sync::Mutex, time::Instant};

use crate::{
    ExecutionOutcome, Fault, InvocationError, OperationError, Output, Type, Value,
    config::string_maxlen, unwind::catch_silent, util::lock_no_poison,
};

/// Native implementation of a constructor or method.
///
/// Receives the receiver (for instance methods) followed by the arguments.
pub type Callable = Arc<dyn Fn(&[Value], &mut Output) -> Result<Value, Fault> + Send + Sync>;

/// Constructor of a class.
#[derive(Clone)]
pub struct ConstructorCall {
    ty: Type,
    params: Arc<[Type]>,
    callable: Callable,
}

/// Instance or static method.
#[derive(Clone)]
pub struct MethodCall {
    declaring: Type,
    name: Box<str>,
    inputs: Arc<[Type]>,
    output: Type,
    is_static: bool,
    callable: Callable,
}

/// Instance or static field. Static fields own one shared storage slot.
#[derive(Debug, Clone)]
pub struct Field {
    declaring: Type,
    name: Box<str>,
    ty: Type,
    slot: Option<Arc<Mutex<Value>>>,
}

impl Field {
    /// Instance field, stored in each receiver's field table.
    #[must_use]
    pub fn instance(declaring: Type, name: &str, ty: Type) -> Self {
        Self {
            declaring,
            name: name.into(),
            ty,
            slot: None,
        }
    }

    /// Static field with its own storage, initialized to the type's default.
    #[must_use]
    pub fn static_field(declaring: Type, name: &str, ty: Type) -> Self {
        let init = Value::default_for(&ty);
        Self {
            declaring,
            name: name.into(),
            ty,
            slot: Some(Arc::new(Mutex::new(init))),
        }
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field type.
    #[must_use]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Declaring type.
    #[must_use]
    pub fn declaring_type(&self) -> &Type {
        &self.declaring
    }

    /// Is this a static field?
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.slot.is_some()
    }

    fn descriptor(&self) -> String {
        format!("{}:{}.{}", self.ty, self.declaring, self.name)
    }

    fn same(&self, other: &Self) -> bool {
        self.declaring == other.declaring
            && self.name == other.name
            && self.ty == other.ty
            && self.is_static() == other.is_static()
    }
}

/// A callable unit under test: one statement kind of a sequence.
#[derive(Clone)]
pub enum Operation {
    /// `new T(args)`
    ConstructorCall(ConstructorCall),
    /// `recv.m(args)` or `T.m(args)`
    MethodCall(MethodCall),
    /// Read of a field.
    FieldGet {
        /// Accessed field.
        field: Field,
        /// Receiver type (instance fields) or nothing.
        inputs: Arc<[Type]>,
    },
    /// Write of a field.
    FieldSet {
        /// Accessed field.
        field: Field,
        /// Receiver type (instance fields) and the field type.
        inputs: Arc<[Type]>,
    },
    /// Primitive, string or null literal.
    Literal {
        /// Declared type.
        ty: Type,
        /// Literal value.
        value: Value,
    },
    /// `new T[] { e1, ..., en }`
    ArrayCreation {
        /// Element type.
        element: Type,
        /// Array type.
        array: Type,
        /// `length` copies of the element type.
        inputs: Arc<[Type]>,
    },
    /// Named constant of an enum.
    EnumConstant {
        /// Enum type.
        ty: Type,
        /// Constant name.
        name: Arc<str>,
    },
}

const KIND_LITERAL: &str = "prim";
const KIND_CONSTRUCTOR: &str = "cons";
const KIND_METHOD: &str = "method";
const KIND_FIELD: &str = "field";
const KIND_ARRAY: &str = "array";
const KIND_ENUM: &str = "enum";

impl Operation {
    /// Constructor of `ty` taking `params`.
    ///
    /// # Errors
    ///
    /// Fails when `ty` or a parameter type is `void`.
    pub fn constructor(
        ty: Type,
        params: impl IntoIterator<Item = Type>,
        callable: impl Fn(&[Value], &mut Output) -> Result<Value, Fault> + Send + Sync + 'static,
    ) -> Result<Self, OperationError> {
        let params: Arc<[Type]> = params.into_iter().collect();
        if ty.is_void() || params.iter().any(Type::is_void) {
            return Err(OperationError::VoidNotAllowed);
        }
        Ok(Self::ConstructorCall(ConstructorCall {
            ty,
            params,
            callable: Arc::new(callable),
        }))
    }

    /// Instance method `name` of `declaring`; the receiver is the first input.
    ///
    /// # Errors
    ///
    /// Fails when a parameter type is `void`.
    pub fn method(
        declaring: Type,
        name: &str,
        params: impl IntoIterator<Item = Type>,
        output: Type,
        callable: impl Fn(&[Value], &mut Output) -> Result<Value, Fault> + Send + Sync + 'static,
    ) -> Result<Self, OperationError> {
        let inputs = core::iter::once(declaring.clone()).chain(params).collect();
        Self::new_method(declaring, name, inputs, output, false, Arc::new(callable))
    }

    /// Static method `name` of `declaring`.
    ///
    /// # Errors
    ///
    /// Fails when a parameter type is `void`.
    pub fn static_method(
        declaring: Type,
        name: &str,
        params: impl IntoIterator<Item = Type>,
        output: Type,
        callable: impl Fn(&[Value], &mut Output) -> Result<Value, Fault> + Send + Sync + 'static,
    ) -> Result<Self, OperationError> {
        let inputs = params.into_iter().collect();
        Self::new_method(declaring, name, inputs, output, true, Arc::new(callable))
    }

    fn new_method(
        declaring: Type,
        name: &str,
        inputs: Arc<[Type]>,
        output: Type,
        is_static: bool,
        callable: Callable,
    ) -> Result<Self, OperationError> {
        if inputs.iter().any(Type::is_void) {
            return Err(OperationError::VoidNotAllowed);
        }
        Ok(Self::MethodCall(MethodCall {
            declaring,
            name: name.into(),
            inputs,
            output,
            is_static,
            callable,
        }))
    }

    /// Getter for `field`.
    #[must_use]
    pub fn field_get(field: Field) -> Self {
        let inputs = if field.is_static() {
            Arc::from([])
        } else {
            Arc::from([field.declaring.clone()])
        };
        Self::FieldGet { field, inputs }
    }

    /// Setter for `field`.
    #[must_use]
    pub fn field_set(field: Field) -> Self {
        let inputs = if field.is_static() {
            Arc::from([field.ty.clone()])
        } else {
            Arc::from([field.declaring.clone(), field.ty.clone()])
        };
        Self::FieldSet { field, inputs }
    }

    /// Literal of `ty`.
    ///
    /// # Errors
    ///
    /// Fails when `value` is not a primitive, string or null literal of `ty`,
    /// or a string is longer than the configured maximum.
    pub fn literal(ty: Type, value: Value) -> Result<Self, OperationError> {
        value.check_literal(&ty, string_maxlen())?;
        Ok(Self::Literal {
            ty,
            value: value.canonical(),
        })
    }

    /// Array of `length` elements of type `element`.
    ///
    /// # Errors
    ///
    /// Fails when `element` is `void`.
    pub fn array_creation(element: Type, length: usize) -> Result<Self, OperationError> {
        if element.is_void() {
            return Err(OperationError::VoidNotAllowed);
        }
        Ok(Self::ArrayCreation {
            array: Type::array(element.clone()),
            inputs: core::iter::repeat_n(element.clone(), length).collect(),
            element,
        })
    }

    /// Constant `name` of enum `ty`.
    ///
    /// # Errors
    ///
    /// Fails when `ty` is not an enum or has no such constant.
    pub fn enum_constant(ty: Type, name: &str) -> Result<Self, OperationError> {
        if !ty.is_enum() {
            return Err(OperationError::NotAnEnum(ty.name().to_owned()));
        }
        if !ty.enum_constants().iter().any(|c| &**c == name) {
            return Err(OperationError::UnknownEnumConstant {
                ty: ty.name().to_owned(),
                name: name.to_owned(),
            });
        }
        Ok(Self::EnumConstant {
            ty,
            name: name.into(),
        })
    }

    /// Declared input types, receiver first for instance members.
    #[must_use]
    pub fn input_types(&self) -> &[Type] {
        match self {
            Self::ConstructorCall(c) => &c.params,
            Self::MethodCall(m) => &m.inputs,
            Self::FieldGet { inputs, .. }
            | Self::FieldSet { inputs, .. }
            | Self::ArrayCreation { inputs, .. } => inputs,
            Self::Literal { .. } | Self::EnumConstant { .. } => &[],
        }
    }

    /// Declared output type; `void` for setters and void methods.
    #[must_use]
    pub fn output_type(&self) -> Type {
        match self {
            Self::ConstructorCall(c) => c.ty.clone(),
            Self::MethodCall(m) => m.output.clone(),
            Self::FieldGet { field, .. } => field.ty.clone(),
            Self::FieldSet { .. } => Type::void(),
            Self::Literal { ty, .. } | Self::EnumConstant { ty, .. } => ty.clone(),
            Self::ArrayCreation { array, .. } => array.clone(),
        }
    }

    /// Type whose code this operation belongs to.
    #[must_use]
    pub fn declaring_type(&self) -> Option<&Type> {
        match self {
            Self::ConstructorCall(c) => Some(&c.ty),
            Self::MethodCall(m) => Some(&m.declaring),
            Self::FieldGet { field, .. } | Self::FieldSet { field, .. } => Some(&field.declaring),
            Self::EnumConstant { ty, .. } => Some(ty),
            Self::Literal { .. } | Self::ArrayCreation { .. } => None,
        }
    }

    /// Static method or static field access.
    #[must_use]
    pub fn is_static(&self) -> bool {
        match self {
            Self::MethodCall(m) => m.is_static,
            Self::FieldGet { field, .. } | Self::FieldSet { field, .. } => field.is_static(),
            _ => false,
        }
    }

    /// Method call.
    #[must_use]
    pub fn is_message(&self) -> bool {
        matches!(self, Self::MethodCall(_))
    }

    /// Constructor call.
    #[must_use]
    pub fn is_constructor_call(&self) -> bool {
        matches!(self, Self::ConstructorCall(_))
    }

    /// Literal or enum constant: a value that does not count toward sequence size.
    #[must_use]
    pub fn is_nonreceiving_value(&self) -> bool {
        matches!(self, Self::Literal { .. } | Self::EnumConstant { .. })
    }

    /// Literal `null`.
    #[must_use]
    pub fn is_null_literal(&self) -> bool {
        matches!(self, Self::Literal { value: Value::Null, .. })
    }

    /// Literal value, for literal operations.
    #[must_use]
    pub fn literal_value(&self) -> Option<&Value> {
        match self {
            Self::Literal { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Run the operation on concrete inputs.
    ///
    /// Faults of the operation under test (including panics and null
    /// receivers) become exceptional outcomes. Text written to `out` is moved
    /// into the outcome.
    ///
    /// # Errors
    ///
    /// Fails when the inputs do not match the operation's shape, which is a
    /// fault of the execution machinery rather than of the code under test.
    pub fn execute(
        &self,
        inputs: &[Value],
        out: &mut Output,
    ) -> Result<ExecutionOutcome, InvocationError> {
        let expected = self.input_types().len();
        if inputs.len() != expected {
            return Err(InvocationError::Arity {
                expected,
                actual: inputs.len(),
            });
        }
        let start = Instant::now();
        let r = match self {
            Self::ConstructorCall(c) => invoke(&c.callable, inputs, out),
            Self::MethodCall(m) => {
                if !m.is_static && inputs[0].is_null() {
                    Err(Fault::null_reference(&self.to_parsable_string()))
                } else {
                    invoke(&m.callable, inputs, out)
                }
            }
            Self::FieldGet { field, .. } => match &field.slot {
                Some(slot) => Ok(lock_no_poison(slot).clone()),
                None => self.receiver(inputs).map(|r| {
                    r.map(|o| match o.field(&field.name) {
                        Value::Null => Value::default_for(&field.ty),
                        v => v,
                    })
                })?,
            },
            Self::FieldSet { field, .. } => match &field.slot {
                Some(slot) => {
                    *lock_no_poison(slot) = inputs[0].clone();
                    Ok(Value::Null)
                }
                None => self.receiver(inputs).map(|r| {
                    r.map(|o| {
                        o.set_field(&field.name, inputs[1].clone());
                        Value::Null
                    })
                })?,
            },
            Self::Literal { value, .. } => Ok(value.clone()),
            Self::ArrayCreation { element, .. } => {
                let mut elements = Vec::with_capacity(inputs.len());
                for (index, v) in inputs.iter().enumerate() {
                    let Some(v) = v.convert_to(element) else {
                        return Err(InvocationError::ArrayElement {
                            index,
                            element: element.name().to_owned(),
                        });
                    };
                    elements.push(v);
                }
                Ok(Value::new_array(element.clone(), elements))
            }
            Self::EnumConstant { ty, name } => Ok(Value::Enum {
                ty: ty.clone(),
                name: Arc::clone(name),
            }),
        };
        let elapsed = start.elapsed();
        let output = out.take();
        Ok(match r {
            Ok(value) => ExecutionOutcome::Normal {
                value,
                elapsed,
                output,
            },
            Err(fault) => ExecutionOutcome::Exceptional {
                fault,
                elapsed,
                output,
            },
        })
    }

    // Outer error: machinery fault; inner: null receiver fault.
    fn receiver<'v>(
        &self,
        inputs: &'v [Value],
    ) -> Result<Result<&'v crate::ObjectRef, Fault>, InvocationError> {
        match &inputs[0] {
            Value::Object(o) => Ok(Ok(o)),
            Value::Null => Ok(Err(Fault::null_reference(&self.to_parsable_string()))),
            v => Err(InvocationError::NotAnObject {
                operation: self.to_parsable_string(),
                found: format!("{v:?}"),
            }),
        }
    }

    /// Append source code for this operation applied to `inputs` (variable
    /// names or inline expressions) to `buf`.
    pub fn append_code(&self, inputs: &[String], buf: &mut String) {
        debug_assert_eq!(inputs.len(), self.input_types().len());
        // Writing to a String can not fail.
        let _ = self.write_code(inputs, buf);
    }

    fn write_code(&self, inputs: &[String], buf: &mut String) -> fmt::Result {
        match self {
            Self::ConstructorCall(c) => {
                write!(buf, "new {}(", c.ty)?;
                write_list(buf, inputs)?;
                buf.push(')');
            }
            Self::MethodCall(m) => {
                let args = if m.is_static {
                    write!(buf, "{}", m.declaring)?;
                    inputs
                } else {
                    buf.push_str(&inputs[0]);
                    &inputs[1..]
                };
                write!(buf, ".{}(", m.name)?;
                write_list(buf, args)?;
                buf.push(')');
            }
            Self::FieldGet { field, .. } => {
                if field.is_static() {
                    write!(buf, "{}.{}", field.declaring, field.name)?;
                } else {
                    write!(buf, "{}.{}", inputs[0], field.name)?;
                }
            }
            Self::FieldSet { field, .. } => {
                if field.is_static() {
                    write!(buf, "{}.{} = {}", field.declaring, field.name, inputs[0])?;
                } else {
                    write!(buf, "{}.{} = {}", inputs[0], field.name, inputs[1])?;
                }
            }
            Self::Literal { ty, value } => {
                if value.is_null() && !ty.is_object() {
                    write!(buf, "({ty}) null")?;
                } else {
                    buf.push_str(&value.code_literal());
                }
            }
            Self::ArrayCreation { element, .. } => {
                write!(buf, "new {element}[] {{ ")?;
                write_list(buf, inputs)?;
                buf.push_str(" }");
            }
            Self::EnumConstant { ty, name } => write!(buf, "{ty}.{name}")?,
        }
        Ok(())
    }

    /// Descriptor text, including the kind tag: `cons : Foo.<init>(int)`.
    #[must_use]
    pub fn to_parsable_string(&self) -> String {
        let mut s = String::new();
        // Writing to a String can not fail.
        let _ = self.write_descriptor(&mut s);
        s
    }

    fn write_descriptor(&self, s: &mut String) -> fmt::Result {
        match self {
            Self::ConstructorCall(c) => {
                write!(s, "{KIND_CONSTRUCTOR} : {}.<init>(", c.ty)?;
                write_type_list(s, &c.params)?;
                s.push(')');
            }
            Self::MethodCall(m) => {
                write!(s, "{KIND_METHOD} : ")?;
                let params = if m.is_static {
                    s.push_str("static ");
                    &m.inputs[..]
                } else {
                    &m.inputs[1..]
                };
                write!(s, "{}.{}(", m.declaring, m.name)?;
                write_type_list(s, params)?;
                s.push(')');
            }
            Self::FieldGet { field, .. } => {
                write!(s, "{KIND_FIELD} : <get>({})", field.descriptor())?;
            }
            Self::FieldSet { field, .. } => {
                write!(s, "{KIND_FIELD} : <set>({})", field.descriptor())?;
            }
            Self::Literal { ty, value } => {
                write!(s, "{KIND_LITERAL} : {ty}:{}", value.format_literal())?;
            }
            Self::ArrayCreation { element, inputs, .. } => {
                write!(s, "{KIND_ARRAY} : {element}[{}]", inputs.len())?;
            }
            Self::EnumConstant { ty, name } => write!(s, "{KIND_ENUM} : {ty}:{name}")?,
        }
        Ok(())
    }
}

fn invoke(callable: &Callable, inputs: &[Value], out: &mut Output) -> Result<Value, Fault> {
    match catch_silent(|| callable(inputs, out)) {
        Ok(r) => r,
        Err(panic) => {
            let location = panic.location();
            Err(Fault::from_panic(panic.message, location))
        }
    }
}

fn write_list(buf: &mut String, items: &[String]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            buf.push_str(", ");
        }
        buf.push_str(item);
    }
    Ok(())
}

fn write_type_list(buf: &mut String, types: &[Type]) -> fmt::Result {
    for (i, t) in types.iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        write!(buf, "{t}")?;
    }
    Ok(())
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::ConstructorCall(a), Self::ConstructorCall(b)) => {
                a.ty == b.ty && a.params == b.params
            }
            (Self::MethodCall(a), Self::MethodCall(b)) => {
                a.declaring == b.declaring
                    && a.name == b.name
                    && a.inputs == b.inputs
                    && a.is_static == b.is_static
            }
            (Self::FieldGet { field: a, .. }, Self::FieldGet { field: b, .. })
            | (Self::FieldSet { field: a, .. }, Self::FieldSet { field: b, .. }) => a.same(b),
            (Self::Literal { ty: t1, value: v1 }, Self::Literal { ty: t2, value: v2 }) => {
                t1 == t2 && v1 == v2
            }
            (
                Self::ArrayCreation {
                    element: e1,
                    inputs: i1,
                    ..
                },
                Self::ArrayCreation {
                    element: e2,
                    inputs: i2,
                    ..
                },
            ) => e1 == e2 && i1.len() == i2.len(),
            (Self::EnumConstant { ty: t1, name: n1 }, Self::EnumConstant { ty: t2, name: n2 }) => {
                t1 == t2 && n1 == n2
            }
            _ => false,
        }
    }
}

impl Eq for Operation {}

impl Hash for Operation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Self::ConstructorCall(c) => {
                c.ty.hash(state);
                c.params.hash(state);
            }
            Self::MethodCall(m) => {
                m.declaring.hash(state);
                m.name.hash(state);
                m.inputs.hash(state);
                m.is_static.hash(state);
            }
            Self::FieldGet { field, .. } | Self::FieldSet { field, .. } => {
                field.declaring.hash(state);
                field.name.hash(state);
                field.ty.hash(state);
            }
            Self::Literal { ty, value } => {
                ty.hash(state);
                value.hash(state);
            }
            Self::ArrayCreation {
                element, inputs, ..
            } => {
                element.hash(state);
                inputs.len().hash(state);
            }
            Self::EnumConstant { ty, name } => {
                ty.hash(state);
                name.hash(state);
            }
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_parsable_string())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_parsable_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::Fixture;

    #[test]
    fn descriptors() {
        let fx = Fixture::new();
        assert_eq!(
            fx.op("cons : Foo.<init>(int)").to_parsable_string(),
            "cons : Foo.<init>(int)"
        );
        let lit = Operation::literal(Type::string(), Value::str("a:b")).unwrap();
        assert_eq!(lit.to_parsable_string(), r#"prim : String:"a:b""#);
        let arr = Operation::array_creation(Type::int(), 3).unwrap();
        assert_eq!(arr.to_parsable_string(), "array : int[3]");
        assert_eq!(arr.input_types().len(), 3);
        assert_eq!(arr.output_type().name(), "int[]");
    }

    #[test]
    fn predicates() {
        let fx = Fixture::new();
        let cons = fx.op("cons : Foo.<init>(int)");
        assert!(cons.is_constructor_call());
        assert!(!cons.is_message());
        let bar = fx.op("method : Foo.bar()");
        assert!(bar.is_message());
        assert!(!bar.is_static());
        assert_eq!(bar.input_types(), &[fx.foo.clone()]);
        assert!(fx.op("method : static Foo.make()").is_static());
        let lit = Operation::literal(Type::int(), Value::Int(1)).unwrap();
        assert!(lit.is_nonreceiving_value());
        assert!(!cons.is_nonreceiving_value());
    }

    #[test]
    fn null_receiver_is_exceptional() {
        let fx = Fixture::new();
        let bar = fx.op("method : Foo.bar()");
        let outcome = bar.execute(&[Value::Null], &mut Output::discard()).unwrap();
        assert_eq!(outcome.fault().unwrap().name, Fault::NULL_REFERENCE);
    }

    #[test]
    fn panic_is_exceptional() {
        let fx = Fixture::new();
        let boom = fx.op("method : Foo.boom()");
        let foo = Value::new_object(fx.foo.clone());
        let outcome = boom.execute(&[foo], &mut Output::discard()).unwrap();
        let fault = outcome.fault().unwrap();
        assert_eq!(fault.name, Fault::PANIC);
        assert!(fault.location.is_some());
    }

    #[test]
    fn invocation_errors() {
        let fx = Fixture::new();
        let bar = fx.op("method : Foo.bar()");
        assert_eq!(
            bar.execute(&[], &mut Output::discard()),
            Err(InvocationError::Arity {
                expected: 1,
                actual: 0
            })
        );
        let get = fx.op("field : <get>(int:Foo.count)");
        assert!(matches!(
            get.execute(&[Value::Int(1)], &mut Output::discard()),
            Err(InvocationError::NotAnObject { .. })
        ));
        let arr = Operation::array_creation(Type::int(), 1).unwrap();
        assert!(matches!(
            arr.execute(&[Value::str("x")], &mut Output::discard()),
            Err(InvocationError::ArrayElement { index: 0, .. })
        ));
    }

    #[test]
    fn array_elements_widened_to_element_type() {
        let long = Type::primitive(crate::Primitive::Long);
        let arr = Operation::array_creation(long.clone(), 3).unwrap();
        let out = arr
            .execute(
                &[Value::Int(-2), Value::Char('a'), Value::Long(5)],
                &mut Output::discard(),
            )
            .unwrap();
        let array = out.value().and_then(Value::as_array).unwrap();
        assert_eq!(
            *array.elements(),
            [Value::Long(-2), Value::Long(97), Value::Long(5)]
        );
        assert_eq!(
            arr.execute(
                &[Value::Int(1), Value::Double(1.0), Value::Long(0)],
                &mut Output::discard()
            ),
            Err(InvocationError::ArrayElement {
                index: 1,
                element: long.name().to_owned()
            })
        );

        let double = Type::primitive(crate::Primitive::Double);
        let arr = Operation::array_creation(double, 1).unwrap();
        let out = arr
            .execute(&[Value::Float(1.5)], &mut Output::discard())
            .unwrap();
        let array = out.value().and_then(Value::as_array).unwrap();
        assert_eq!(*array.elements(), [Value::Double(1.5)]);
    }

    #[test]
    fn fields() {
        let fx = Fixture::new();
        let get = fx.op("field : <get>(int:Foo.count)");
        let set = fx.op("field : <set>(int:Foo.count)");
        let foo = Value::new_object(fx.foo.clone());
        let mut out = Output::discard();
        let v = get.execute(&[foo.clone()], &mut out).unwrap();
        assert_eq!(v.value(), Some(&Value::Int(0)));
        set.execute(&[foo.clone(), Value::Int(5)], &mut out).unwrap();
        let v = get.execute(&[foo], &mut out).unwrap();
        assert_eq!(v.value(), Some(&Value::Int(5)));
        assert_eq!(set.output_type(), Type::void());
    }

    #[test]
    fn static_field_shared_between_accessors() {
        let fx = Fixture::new();
        let get = fx.op("field : <get>(int:Foo.instances)");
        let set = fx.op("field : <set>(int:Foo.instances)");
        let mut out = Output::discard();
        set.execute(&[Value::Int(9)], &mut out).unwrap();
        let v = get.execute(&[], &mut out).unwrap();
        assert_eq!(v.value(), Some(&Value::Int(9)));
    }

    #[test]
    fn output_moved_into_outcome() {
        let fx = Fixture::new();
        let shout = fx.op("method : static Foo.shout(String)");
        let mut out = Output::capture();
        let outcome = shout.execute(&[Value::str("hi")], &mut out).unwrap();
        assert_eq!(outcome.output(), "HI\n");
        assert_eq!(out.take(), "");
    }

    #[test]
    fn code() {
        let fx = Fixture::new();
        let mut buf = String::new();
        fx.op("method : Foo.add(int)")
            .append_code(&["foo0".into(), "int1".into()], &mut buf);
        assert_eq!(buf, "foo0.add(int1)");
        buf.clear();
        Operation::array_creation(Type::int(), 2)
            .unwrap()
            .append_code(&["1".into(), "2".into()], &mut buf);
        assert_eq!(buf, "new int[] { 1, 2 }");
        buf.clear();
        Operation::literal(fx.foo.clone(), Value::Null)
            .unwrap()
            .append_code(&[], &mut buf);
        assert_eq!(buf, "(Foo) null");
    }

    #[test]
    fn signature_equality() {
        let a = Operation::static_method(Type::int(), "f", [], Type::int(), |_, _| Ok(Value::Int(1)));
        let b = Operation::static_method(Type::int(), "f", [], Type::int(), |_, _| Ok(Value::Int(2)));
        assert_eq!(a, b);
        // The return type is not part of a method's identity, as in its descriptor.
        let c = Operation::static_method(Type::int(), "f", [], Type::string(), |_, _| {
            Ok(Value::str("x"))
        });
        assert_eq!(a, c);
        let (a, c) = (a.unwrap(), c.unwrap());
        assert_eq!(a.to_parsable_string(), c.to_parsable_string());
        assert_ne!(
            Operation::literal(Type::int(), Value::Int(1)).unwrap(),
            Operation::literal(Type::int(), Value::Int(2)).unwrap()
        );
        assert_eq!(
            Operation::enum_constant(Type::int(), "X"),
            Err(OperationError::NotAnEnum("int".to_owned()))
        );
    }
}
