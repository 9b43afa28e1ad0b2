// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{Field, Map, Operation, OperationParseError, Type, TypeError, TypeTable, Value};

/// Registry of the types and callable operations of the code under test.
///
/// Literals, arrays and enum constants are structural and are parsed
/// directly against the type table; constructors, methods and field
/// accessors must be registered first.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    types: TypeTable,
    operations: Map<String, Operation>,
}

impl Catalog {
    /// Empty catalog with only built-in types.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog over an existing type table.
    #[must_use]
    pub fn with_types(types: TypeTable) -> Self {
        Self {
            types,
            operations: Map::default(),
        }
    }

    /// Registered types.
    #[must_use]
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Registered types, for defining more.
    pub fn types_mut(&mut self) -> &mut TypeTable {
        &mut self.types
    }

    /// Register a constructor or method. Registering the same descriptor again
    /// replaces the implementation.
    ///
    /// # Panics
    ///
    /// Panics when given a field accessor or a structural operation, which
    /// have dedicated registration paths.
    pub fn register(&mut self, op: Operation) -> Operation {
        assert!(
            op.is_constructor_call() || op.is_message(),
            "only constructors and methods can be registered directly, got `{op}`"
        );
        self.insert(op.clone());
        op
    }

    /// Register both accessors of a field; returns `(getter, setter)`.
    pub fn register_field(&mut self, field: Field) -> (Operation, Operation) {
        let get = Operation::field_get(field.clone());
        let set = Operation::field_set(field);
        self.insert(get.clone());
        self.insert(set.clone());
        (get, set)
    }

    fn insert(&mut self, op: Operation) {
        let key = op.to_parsable_string();
        log::trace!(target: "callchain::catalog", "register {key}");
        if let Some(old) = self.operations.insert(key, op) {
            log::warn!(target: "callchain::catalog", "`{old}` replaced by a later registration");
        }
    }

    /// Registered callable operations, in no particular order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    /// Parse an operation descriptor produced by [`Operation::to_parsable_string`].
    ///
    /// # Errors
    ///
    /// Fails on malformed descriptors, unknown types, invalid literals and
    /// unregistered callables.
    pub fn parse_operation(&self, descriptor: &str) -> Result<Operation, OperationParseError> {
        let descriptor = descriptor.trim();
        let (kind, body) = descriptor.split_once(':').ok_or_else(|| {
            OperationParseError::Malformed {
                kind: "operation",
                text: descriptor.to_owned(),
                reason: "missing `:` after the kind tag",
            }
        })?;
        let (kind, body) = (kind.trim(), body.trim());
        match kind {
            "prim" => self.parse_literal(body),
            "array" => self.parse_array(body),
            "enum" => self.parse_enum(body),
            "cons" | "method" | "field" => {
                let key = format!("{kind} : {body}");
                self.operations
                    .get(&key)
                    .cloned()
                    .ok_or(OperationParseError::UnknownOperation(key))
            }
            _ => Err(OperationParseError::UnknownKind(kind.to_owned())),
        }
    }

    fn parse_literal(&self, body: &str) -> Result<Operation, OperationParseError> {
        let (ty, text) = body
            .split_once(':')
            .ok_or_else(|| OperationParseError::Malformed {
                kind: "prim",
                text: body.to_owned(),
                reason: "expected `TYPE:VALUE`",
            })?;
        let ty = self.types.resolve(ty)?;
        let value = Value::parse_literal(&ty, text)?;
        Ok(Operation::literal(ty, value)?)
    }

    fn parse_array(&self, body: &str) -> Result<Operation, OperationParseError> {
        let malformed = || OperationParseError::Malformed {
            kind: "array",
            text: body.to_owned(),
            reason: "expected `TYPE[LENGTH]`",
        };
        let (element, length) = body
            .strip_suffix(']')
            .and_then(|b| b.rsplit_once('['))
            .ok_or_else(malformed)?;
        let length = length.trim().parse().map_err(|_| malformed())?;
        let element = self.types.resolve(element)?;
        Ok(Operation::array_creation(element, length)?)
    }

    fn parse_enum(&self, body: &str) -> Result<Operation, OperationParseError> {
        let (ty, name) = body
            .split_once(':')
            .ok_or_else(|| OperationParseError::Malformed {
                kind: "enum",
                text: body.to_owned(),
                reason: "expected `TYPE:CONSTANT`",
            })?;
        let ty = self.types.resolve(ty)?;
        Ok(Operation::enum_constant(ty, name.trim())?)
    }

    /// Define a class; shorthand for [`TypeTable::define_class`].
    ///
    /// # Errors
    ///
    /// See [`TypeTable::define_class`].
    pub fn define_class(
        &mut self,
        name: &str,
        supertypes: &[&str],
    ) -> Result<Type, TypeError> {
        self.types.define_class(name, supertypes)
    }
}
