// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use alloc::sync::Arc;
use core::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};
use std::sync::LazyLock;

use crate::{Map, Set, TypeError};

/// Primitive value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// `boolean`
    Boolean,
    /// `byte`
    Byte,
    /// `short`
    Short,
    /// `char`
    Char,
    /// `int`
    Int,
    /// `long`
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
}

impl Primitive {
    const ALL: [Self; 8] = [
        Self::Boolean,
        Self::Byte,
        Self::Short,
        Self::Char,
        Self::Int,
        Self::Long,
        Self::Float,
        Self::Double,
    ];

    /// Source-level name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Char => "char",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
        }
    }

    /// Parse a source-level name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Whether a value of `self` can be implicitly widened to `target`.
    #[must_use]
    pub fn widens_to(self, target: Self) -> bool {
        use Primitive::{Byte, Char, Double, Float, Int, Long, Short};
        self == target
            || matches!(
                (self, target),
                (Byte, Short | Int | Long | Float | Double)
                    | (Short | Char, Int | Long | Float | Double)
                    | (Int, Long | Float | Double)
                    | (Long, Float | Double)
                    | (Float, Double)
            )
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Shape of a [`Type`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// No value.
    Void,
    /// Primitive value type.
    Primitive(Primitive),
    /// Immutable string, a non-receiver reference type.
    String,
    /// Concrete or abstract class.
    Class,
    /// Interface.
    Interface,
    /// Enum with its constants in declaration order.
    Enum(Arc<[Box<str>]>),
    /// Array of the element type.
    Array(Type),
}

struct TypeData {
    name: Box<str>,
    kind: TypeKind,
    supertypes: Vec<Type>,
}

/// Handle to a type of the system under test.
///
/// Cheap to clone. Equality, ordering and hashing use the binary name only.
#[derive(Clone)]
pub struct Type(Arc<TypeData>);

static VOID: LazyLock<Type> = LazyLock::new(|| Type::new("void", TypeKind::Void, Vec::new()));
static OBJECT: LazyLock<Type> =
    LazyLock::new(|| Type::new("Object", TypeKind::Class, Vec::new()));
static STRING: LazyLock<Type> =
    LazyLock::new(|| Type::new("String", TypeKind::String, Vec::new()));
static PRIMITIVES: LazyLock<[Type; 8]> = LazyLock::new(|| {
    Primitive::ALL.map(|p| Type::new(p.name(), TypeKind::Primitive(p), Vec::new()))
});

impl Type {
    fn new(name: &str, kind: TypeKind, supertypes: Vec<Self>) -> Self {
        Self(Arc::new(TypeData {
            name: name.into(),
            kind,
            supertypes,
        }))
    }

    /// The `void` pseudo-type.
    #[must_use]
    pub fn void() -> Self {
        VOID.clone()
    }

    /// Root of all reference types.
    #[must_use]
    pub fn object() -> Self {
        OBJECT.clone()
    }

    /// The string type.
    #[must_use]
    pub fn string() -> Self {
        STRING.clone()
    }

    /// A primitive type.
    #[must_use]
    pub fn primitive(p: Primitive) -> Self {
        PRIMITIVES[p.index()].clone()
    }

    /// `int`, the most common primitive.
    #[must_use]
    pub fn int() -> Self {
        Self::primitive(Primitive::Int)
    }

    /// `boolean`.
    #[must_use]
    pub fn boolean() -> Self {
        Self::primitive(Primitive::Boolean)
    }

    /// Define a class with the given direct supertypes.
    ///
    /// # Errors
    ///
    /// Fails when a supertype is not a class or interface.
    pub fn class(
        name: &str,
        supertypes: impl IntoIterator<Item = Self>,
    ) -> Result<Self, TypeError> {
        Ok(Self::new(name, TypeKind::Class, Self::check_supertypes(supertypes)?))
    }

    /// Define an interface with the given direct superinterfaces.
    ///
    /// # Errors
    ///
    /// Fails when a supertype is not a class or interface.
    pub fn interface(
        name: &str,
        supertypes: impl IntoIterator<Item = Self>,
    ) -> Result<Self, TypeError> {
        Ok(Self::new(
            name,
            TypeKind::Interface,
            Self::check_supertypes(supertypes)?,
        ))
    }

    /// Define an enum with the given constants.
    #[must_use]
    pub fn enumeration<'a>(name: &str, constants: impl IntoIterator<Item = &'a str>) -> Self {
        let constants: Arc<[Box<str>]> = constants.into_iter().map(Box::from).collect();
        Self::new(name, TypeKind::Enum(constants), Vec::new())
    }

    /// Array type with this element type.
    #[must_use]
    pub fn array(element: Self) -> Self {
        let name = format!("{}[]", element.name());
        Self::new(&name, TypeKind::Array(element), Vec::new())
    }

    fn check_supertypes(supertypes: impl IntoIterator<Item = Self>) -> Result<Vec<Self>, TypeError> {
        supertypes
            .into_iter()
            .map(|t| match t.kind() {
                TypeKind::Class | TypeKind::Interface => Ok(t),
                _ => Err(TypeError::InvalidSupertype(t.name().to_owned())),
            })
            .collect()
    }

    /// Binary name, e.g. `int`, `Foo`, `Foo[]`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Shape of this type.
    #[must_use]
    pub fn kind(&self) -> &TypeKind {
        &self.0.kind
    }

    /// Direct supertypes, as declared.
    #[must_use]
    pub fn supertypes(&self) -> &[Self] {
        &self.0.supertypes
    }

    /// Is this `void`?
    #[must_use]
    pub fn is_void(&self) -> bool {
        self.0.kind == TypeKind::Void
    }

    /// The primitive, if this is a primitive type.
    #[must_use]
    pub fn as_primitive(&self) -> Option<Primitive> {
        match self.0.kind {
            TypeKind::Primitive(p) => Some(p),
            _ => None,
        }
    }

    /// Is this a primitive type?
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        self.as_primitive().is_some()
    }

    /// Is this the string type?
    #[must_use]
    pub fn is_string(&self) -> bool {
        self.0.kind == TypeKind::String
    }

    /// Is this `Object`?
    #[must_use]
    pub fn is_object(&self) -> bool {
        *self == *OBJECT
    }

    /// Can values of this type be null?
    #[must_use]
    pub fn is_reference(&self) -> bool {
        !self.is_void() && !self.is_primitive()
    }

    /// Element type, if this is an array type.
    #[must_use]
    pub fn element_type(&self) -> Option<&Self> {
        match &self.0.kind {
            TypeKind::Array(e) => Some(e),
            _ => None,
        }
    }

    /// Is this an array type?
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.element_type().is_some()
    }

    /// Enum constants, or an empty slice for non-enum types.
    #[must_use]
    pub fn enum_constants(&self) -> &[Box<str>] {
        match &self.0.kind {
            TypeKind::Enum(c) => c,
            _ => &[],
        }
    }

    /// Is this an enum type?
    #[must_use]
    pub fn is_enum(&self) -> bool {
        matches!(self.0.kind, TypeKind::Enum(_))
    }

    /// Class, interface, enum or string: a declared type with a supertype lattice.
    #[must_use]
    pub fn is_class_or_interface(&self) -> bool {
        matches!(
            self.0.kind,
            TypeKind::Class | TypeKind::Interface | TypeKind::Enum(_) | TypeKind::String
        )
    }

    /// Values of this type never serve as a call receiver (primitives and strings).
    #[must_use]
    pub fn is_nonreceiver_type(&self) -> bool {
        self.is_primitive() || self.is_string()
    }

    /// Transitive supertypes, excluding `self`. Reference types other than
    /// `Object` always include `Object` last.
    #[must_use]
    pub fn all_supertypes(&self) -> Vec<Self> {
        let mut seen = Set::default();
        let mut out = Vec::new();
        let mut stack: Vec<&Self> = self.supertypes().iter().rev().collect();
        while let Some(t) = stack.pop() {
            if seen.insert(t.clone()) {
                out.push(t.clone());
                stack.extend(t.supertypes().iter().rev());
            }
        }
        if self.is_reference() && !self.is_object() && !seen.contains(&*OBJECT) {
            out.push(Self::object());
        }
        out
    }

    fn has_declared_supertype(&self, target: &Self) -> bool {
        self.supertypes()
            .iter()
            .any(|s| s == target || s.has_declared_supertype(target))
    }

    /// Can a value of type `source` be used where `self` is expected?
    #[must_use]
    pub fn is_assignable_from(&self, source: &Self) -> bool {
        if self == source {
            return true;
        }
        match (self.kind(), source.kind()) {
            (TypeKind::Void, _) | (_, TypeKind::Void) => false,
            (TypeKind::Primitive(t), TypeKind::Primitive(s)) => s.widens_to(*t),
            (TypeKind::Primitive(_), _) | (_, TypeKind::Primitive(_)) => false,
            _ if self.is_object() => true,
            (TypeKind::Array(t), TypeKind::Array(s)) => {
                if t.is_primitive() || s.is_primitive() {
                    t == s
                } else {
                    t.is_assignable_from(s)
                }
            }
            _ => source.has_declared_supertype(self),
        }
    }

    /// Prefix for variables holding values of this type: `int`, `foo`, `string_array`.
    #[must_use]
    pub fn variable_name_prefix(&self) -> String {
        if let Some(e) = self.element_type() {
            return format!("{}_array", e.variable_name_prefix());
        }
        let simple = self.name().rsplit('.').next().unwrap_or_default();
        let mut chars = simple.chars();
        chars.next().map_or_else(String::new, |c| {
            c.to_lowercase().chain(chars).collect::<String>()
        })
    }

    fn same_shape(&self, other: &Self) -> bool {
        self.name() == other.name()
            && self.kind() == other.kind()
            && self.supertypes() == other.supertypes()
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.name == other.0.name
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

impl PartialOrd for Type {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Type {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.name.cmp(&other.0.name)
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name → [`Type`] registry used to resolve type names in descriptors.
///
/// Comes pre-populated with `void`, `Object`, `String` and the primitives.
/// Array names (`T[]`) are resolved on demand from their element type.
#[derive(Debug, Clone)]
pub struct TypeTable {
    types: Map<Box<str>, Type>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    /// Create a table with the built-in types.
    #[must_use]
    pub fn new() -> Self {
        let mut types = Map::default();
        for t in [Type::void(), Type::object(), Type::string()]
            .into_iter()
            .chain(PRIMITIVES.iter().cloned())
        {
            types.insert(Box::from(t.name()), t);
        }
        Self { types }
    }

    /// Register a type. Re-registering an identical definition is a no-op.
    ///
    /// # Errors
    ///
    /// Fails when the name is taken by a differently shaped type.
    pub fn define(&mut self, ty: Type) -> Result<Type, TypeError> {
        if let Some(existing) = self.types.get(ty.name()) {
            return if existing.same_shape(&ty) {
                Ok(existing.clone())
            } else {
                Err(TypeError::Conflict(ty.name().to_owned()))
            };
        }
        self.types.insert(Box::from(ty.name()), ty.clone());
        Ok(ty)
    }

    /// Define and register a class whose supertypes are given by name.
    ///
    /// # Errors
    ///
    /// Fails on unknown supertypes, invalid supertypes or a conflicting definition.
    pub fn define_class(&mut self, name: &str, supertypes: &[&str]) -> Result<Type, TypeError> {
        let supers = self.resolve_all(supertypes)?;
        self.define(Type::class(name, supers)?)
    }

    /// Define and register an interface whose superinterfaces are given by name.
    ///
    /// # Errors
    ///
    /// Fails on unknown supertypes, invalid supertypes or a conflicting definition.
    pub fn define_interface(
        &mut self,
        name: &str,
        supertypes: &[&str],
    ) -> Result<Type, TypeError> {
        let supers = self.resolve_all(supertypes)?;
        self.define(Type::interface(name, supers)?)
    }

    /// Define and register an enum.
    ///
    /// # Errors
    ///
    /// Fails on a conflicting definition.
    pub fn define_enum(&mut self, name: &str, constants: &[&str]) -> Result<Type, TypeError> {
        self.define(Type::enumeration(name, constants.iter().copied()))
    }

    /// Look up a type by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Type> {
        if let Some(element) = name.strip_suffix("[]") {
            return self.get(element.trim_end()).map(Type::array);
        }
        self.types.get(name).cloned()
    }

    /// Look up a type by name, failing when unknown.
    ///
    /// # Errors
    ///
    /// Fails when the name is not registered.
    pub fn resolve(&self, name: &str) -> Result<Type, TypeError> {
        self.get(name.trim())
            .ok_or_else(|| TypeError::Unknown(name.trim().to_owned()))
    }

    fn resolve_all(&self, names: &[&str]) -> Result<Vec<Type>, TypeError> {
        names.iter().map(|n| self.resolve(n)).collect()
    }

    /// Number of registered (non-array) types, including built-ins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Always false: built-ins are present from the start.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
