// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::{
    fmt,
    hash::{BuildHasher as _, Hash, Hasher},
};

use rustc_hash::FxBuildHasher;

use crate::{Operation, Sequence, Type};

/// One operation invocation with its inputs given as negative offsets from
/// the statement's own position.
///
/// Offset `-k` at position `p` names the value produced at position `p - k`,
/// so a statement stays valid wherever its inputs keep the same distance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Statement {
    operation: Operation,
    inputs: Box<[isize]>,
}

impl Statement {
    pub(crate) fn new(operation: Operation, inputs: Box<[isize]>) -> Self {
        debug_assert_eq!(operation.input_types().len(), inputs.len());
        debug_assert!(inputs.iter().all(|&i| i < 0));
        Self { operation, inputs }
    }

    /// Invoked operation.
    #[must_use]
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Relative input offsets, all negative.
    #[must_use]
    pub fn inputs(&self) -> &[isize] {
        &self.inputs
    }

    /// Declared output type.
    #[must_use]
    pub fn output_type(&self) -> Type {
        self.operation.output_type()
    }

    /// Literal or enum constant.
    #[must_use]
    pub fn is_nonreceiving_value(&self) -> bool {
        self.operation.is_nonreceiving_value()
    }

    /// `T x = null`.
    #[must_use]
    pub fn is_null_initialization(&self) -> bool {
        self.operation.is_null_literal()
    }

    /// Deterministic per-statement hash; sequence hashes are wrapping sums of these.
    pub(crate) fn stable_hash(&self) -> u64 {
        let mut h = FxBuildHasher.build_hasher();
        self.hash(&mut h);
        h.finish()
    }
}

/// The value produced at position `index` of a sequence.
///
/// Equality and hashing consider the index only.
#[derive(Clone, Copy)]
pub struct Variable<'s> {
    sequence: &'s Sequence,
    index: usize,
}

impl<'s> Variable<'s> {
    pub(crate) fn new(sequence: &'s Sequence, index: usize) -> Self {
        debug_assert!(index < sequence.size());
        Self { sequence, index }
    }

    /// Position of the producing statement.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Sequence this variable belongs to.
    #[must_use]
    pub fn sequence(&self) -> &'s Sequence {
        self.sequence
    }

    /// Producing statement.
    #[must_use]
    pub fn declaring_statement(&self) -> &'s Statement {
        self.sequence.statement(self.index)
    }

    /// Declared type of the value.
    #[must_use]
    pub fn ty(&self) -> Type {
        self.declaring_statement().output_type()
    }

    /// Source-level name: `foo3`, `int0`, `vec2_5`.
    ///
    /// Distinct positions always get distinct names: a prefix that ends in a
    /// digit or `_` is separated from the index by `_`.
    #[must_use]
    pub fn name(&self) -> String {
        let prefix = self.ty().variable_name_prefix();
        let sep = if prefix.ends_with(|c: char| c.is_ascii_digit() || c == '_') {
            "_"
        } else {
            ""
        };
        format!("{prefix}{sep}{}", self.index)
    }
}

impl PartialEq for Variable<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for Variable<'_> {}

impl Hash for Variable<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl fmt::Debug for Variable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Variable({})", self.index)
    }
}

impl fmt::Display for Variable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Sequence, Type, Value, tests::Fixture};

    #[test]
    fn variable_equality_by_index() {
        let a = Sequence::for_primitive(Value::Int(1)).unwrap();
        let b = Sequence::for_primitive(Value::str("x")).unwrap();
        assert_eq!(a.variable(0).unwrap(), b.variable(0).unwrap());
        assert_eq!(a.variable(0).unwrap().ty(), Type::int());
        assert_eq!(b.variable(0).unwrap().name(), "string0");
    }

    #[test]
    fn statement_hash_stable() {
        let fx = Fixture::new();
        let s1 = fx.foo_sequence();
        let s2 = fx.foo_sequence();
        for i in 0..s1.size() {
            assert_eq!(s1.statement(i).stable_hash(), s2.statement(i).stable_hash());
        }
        assert!(s1.statement(0).is_nonreceiving_value());
        assert!(!s1.statement(1).is_nonreceiving_value());
    }
}
