// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::Fault;

/// Error while defining or resolving a type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// No type with this name is known.
    #[error("unknown type `{0}`")]
    Unknown(String),
    /// A type with this name is already defined with a different kind or supertypes.
    #[error("type `{0}` is already defined with a different shape")]
    Conflict(String),
    /// Only classes and interfaces can be extended.
    #[error("type `{0}` cannot be used as a supertype")]
    InvalidSupertype(String),
}

/// Error while constructing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The literal value does not fit the declared type.
    #[error("invalid literal of type `{ty}`: {reason}")]
    InvalidLiteral {
        /// Declared literal type.
        ty: String,
        /// What is wrong with the value.
        reason: &'static str,
    },
    /// The enum type has no such constant.
    #[error("enum `{ty}` has no constant `{name}`")]
    UnknownEnumConstant {
        /// Enum type.
        ty: String,
        /// Requested constant name.
        name: String,
    },
    /// The type is not an enum.
    #[error("type `{0}` is not an enum")]
    NotAnEnum(String),
    /// Void can not be produced, stored or passed.
    #[error("`void` is not allowed here")]
    VoidNotAllowed,
}

/// Error while parsing an operation descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationParseError {
    /// Descriptor text does not follow the grammar of its kind.
    #[error("malformed {kind} descriptor `{text}`: {reason}")]
    Malformed {
        /// Descriptor kind tag.
        kind: &'static str,
        /// Offending text.
        text: String,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// The kind tag before the first `:` is not recognized.
    #[error("unknown operation kind `{0}`")]
    UnknownKind(String),
    /// The descriptor is well-formed but no such operation is registered.
    #[error("no registered operation matches `{0}`")]
    UnknownOperation(String),
    /// A type named in the descriptor could not be resolved.
    #[error(transparent)]
    Type(#[from] TypeError),
    /// The described operation could not be constructed.
    #[error(transparent)]
    Operation(#[from] OperationError),
}

/// Error while constructing a sequence.
///
/// These are programming-contract violations of the caller and are never repaired silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    /// Number of input variables differs from the operation's declared arity.
    #[error("operation `{operation}` takes {expected} inputs, got {actual}")]
    ArityMismatch {
        /// Operation descriptor.
        operation: String,
        /// Declared number of inputs.
        expected: usize,
        /// Supplied number of inputs.
        actual: usize,
    },
    /// An input variable belongs to a different sequence.
    #[error("input {position} (variable {index}) does not belong to this sequence")]
    ForeignVariable {
        /// Input position.
        position: usize,
        /// Variable index.
        index: usize,
    },
    /// An input variable's type is not assignable to the declared input type.
    #[error("input {position}: `{expected}` is not assignable from `{actual}`")]
    TypeMismatch {
        /// Input position.
        position: usize,
        /// Declared input type.
        expected: String,
        /// Type produced at the referenced position.
        actual: String,
    },
    /// A variable index is outside of the sequence.
    #[error("index {index} out of range for sequence of size {size}")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Sequence size.
        size: usize,
    },
    /// A relative input offset does not point to an earlier statement.
    #[error("statement {statement}: relative offset {offset} does not point to an earlier statement")]
    InvalidOffset {
        /// Statement position.
        statement: usize,
        /// Offending offset.
        offset: isize,
    },
    /// Literal could not be constructed.
    #[error(transparent)]
    Operation(#[from] OperationError),
    /// No variable of the requested type exists at an active position.
    #[error("no variable of type `{ty}` available (only receivers: {only_receivers})")]
    NoMatchingVariable {
        /// Requested type.
        ty: String,
        /// Whether only receiver-capable values were accepted.
        only_receivers: bool,
    },
    /// Tuple construction got a different number of sequences and indices.
    #[error("{sequences} component sequences but {indices} output indices")]
    TupleShape {
        /// Number of component sequences.
        sequences: usize,
        /// Number of output indices.
        indices: usize,
    },
}

/// What went wrong on a line of sequence text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// Missing `=` between result variable and descriptor.
    #[error("statement must have the form `var = <operation> : var ... var`, but is missing `=`")]
    MissingEquals,
    /// Missing `:` before the input variable list.
    #[error("statement must have the form `var = <operation> : var ... var`, but is missing `:`")]
    MissingColon,
    /// The result variable name is empty.
    #[error("empty result variable name")]
    EmptyVariable,
    /// The result variable name is reused.
    #[error("result variable `{0}` was already declared by a previous statement")]
    DuplicateVariable(String),
    /// An input refers to a name not produced by an earlier line.
    #[error("input variable `{0}` is not declared by a previous statement")]
    UndeclaredVariable(String),
    /// Input count differs from the operation's arity.
    #[error("expected {expected} input variables, found {actual}")]
    InputCount {
        /// Declared number of inputs.
        expected: usize,
        /// Number of names on the line.
        actual: usize,
    },
    /// Descriptor could not be parsed.
    #[error(transparent)]
    Operation(#[from] OperationParseError),
    /// The statement could not be appended.
    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

/// Error while parsing sequence text, with the offending line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("error at statement {line} `{text}`: {kind}")]
pub struct ParseError {
    /// 0-based index of the offending statement line.
    pub line: usize,
    /// Offending line, trimmed.
    pub text: String,
    /// What went wrong.
    pub kind: ParseErrorKind,
}

/// Fault raised by execution machinery itself, as opposed to the operation under test.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    /// Wrong number of runtime arguments.
    #[error("expected {expected} arguments, got {actual}")]
    Arity {
        /// Declared arity.
        expected: usize,
        /// Supplied arguments.
        actual: usize,
    },
    /// Field access on something that is not an object.
    #[error("receiver of `{operation}` is not an object: {found}")]
    NotAnObject {
        /// Operation descriptor.
        operation: String,
        /// Debug rendering of the receiver.
        found: String,
    },
    /// Array element of an incompatible runtime type.
    #[error("array element {index} is not assignable to `{element}`")]
    ArrayElement {
        /// Element position.
        index: usize,
        /// Array element type.
        element: String,
    },
}

/// Fatal error while executing a sequence.
///
/// Abnormal outcomes of operations under test are not errors; these indicate a
/// defect in the engine, its collaborators, or a strict-mode violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// A statement was left without an outcome after its turn.
    #[error("statement {index} was not executed after its turn")]
    Unexecuted {
        /// Statement position.
        index: usize,
    },
    /// Strict mode: a fault before the final statement.
    #[error("encountered exception before final statement (statement {index}): {fault}")]
    ExceptionBeforeFinal {
        /// Statement position.
        index: usize,
        /// The fault that was thrown.
        fault: Fault,
    },
    /// An input value was requested from a statement that did not complete normally.
    #[error("input {input} of statement {index} reads statement {producer}, which did not complete normally")]
    InputNotNormal {
        /// Consuming statement.
        index: usize,
        /// Input position.
        input: usize,
        /// Producing statement.
        producer: usize,
    },
    /// Execution machinery failed.
    #[error("statement {index}: {error}")]
    Invocation {
        /// Statement position.
        index: usize,
        /// Machinery fault.
        error: InvocationError,
    },
}
