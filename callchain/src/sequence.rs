// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use alloc::sync::Arc;
use core::{
    fmt,
    hash::{Hash, Hasher},
};

use regex::Regex;

use crate::{
    Catalog, Map, Operation, OperationError, ParseError, ParseErrorKind, Rand, SequenceError,
    Statement, TupleSequence, Type, Value, Variable, config::debug_checks_enabled,
    statement_list::StatementList, util::count_ones,
};

/// Immutable list of statements.
///
/// `extend` and `concatenate` share the statements of their operands; the
/// cached hash is the wrapping sum of per-statement hashes, so concatenation
/// hashes are sums of operand hashes.
///
/// Besides the statements, a sequence carries one mutable piece of state:
/// per-position "active" flags that say which values may be reused as
/// inputs of new statements.
#[derive(Clone)]
pub struct Sequence {
    statements: StatementList,
    hash: u64,
    net_size: usize,
    // Output of the last statement (if not void), then its inputs.
    last_vars: Arc<[usize]>,
    active: Vec<u64>,
    inline_literals: bool,
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequence {
    /// Empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(StatementList::new(), 0, 0)
    }

    fn from_parts(statements: StatementList, hash: u64, net_size: usize) -> Self {
        let size = statements.len();
        let last_vars = match size.checked_sub(1).and_then(|i| statements.get(i).map(|s| (i, s))) {
            None => Arc::from([]),
            Some((last, s)) => {
                let output = (!s.output_type().is_void()).then_some(last);
                output
                    .into_iter()
                    .chain(s.inputs().iter().map(|&o| absolute(last, o)))
                    .collect()
            }
        };
        let mut active = vec![0; size.div_ceil(64)];
        set_bits(&mut active, size);
        let s = Self {
            statements,
            hash,
            net_size,
            last_vars,
            active,
            inline_literals: true,
        };
        if debug_checks_enabled() {
            if let Err(e) = s.validate() {
                unreachable!("internal error: invalid sequence ({e}):\n{}", s.to_parsable_string());
            }
        }
        s
    }

    /// `T x = <zero>`: null for reference types, `""` for strings, zero otherwise.
    ///
    /// # Errors
    ///
    /// Fails for `void`.
    pub fn zero(ty: &Type) -> Result<Self, SequenceError> {
        let op = Operation::literal(ty.clone(), Value::zero_for(ty))?;
        Self::new().extend(op, &[])
    }

    /// One-statement sequence declaring a primitive or string value.
    ///
    /// # Errors
    ///
    /// Fails when `value` is null or not a primitive or string.
    pub fn for_primitive(value: Value) -> Result<Self, SequenceError> {
        let ty = value
            .literal_type()
            .ok_or_else(|| OperationError::InvalidLiteral {
                ty: value
                    .runtime_type()
                    .map_or_else(|| "null".to_owned(), |t| t.name().to_owned()),
                reason: "value is not a primitive or string",
            })?;
        let op = Operation::literal(ty, value)?;
        Self::new().extend(op, &[])
    }

    /// Concatenate `inputs` and apply `op` to the values at absolute `indexes`
    /// of the concatenation.
    ///
    /// # Errors
    ///
    /// Fails when an index is out of range or `op` does not accept the values.
    pub fn create(
        op: Operation,
        inputs: &[Self],
        indexes: &[usize],
    ) -> Result<Self, SequenceError> {
        let s = Self::concatenate(inputs);
        let vars = indexes
            .iter()
            .map(|&i| s.variable(i))
            .collect::<Result<Vec<_>, _>>()?;
        s.extend(op, &vars)
    }

    /// Apply `op` to the elements of a tuple.
    ///
    /// # Errors
    ///
    /// Fails when `op` does not accept the tuple elements.
    pub fn create_from_tuple(op: Operation, tuple: &TupleSequence) -> Result<Self, SequenceError> {
        let s = tuple.sequence();
        let vars = tuple
            .output_indices()
            .iter()
            .map(|&i| s.variable(i))
            .collect::<Result<Vec<_>, _>>()?;
        s.extend(op, &vars)
    }

    /// New sequence with one more statement applying `op` to `inputs`.
    ///
    /// # Errors
    ///
    /// Fails when the number of inputs differs from the operation's arity,
    /// an input belongs to another sequence, or an input's type is not
    /// assignable to the declared input type.
    pub fn extend(&self, op: Operation, inputs: &[Variable<'_>]) -> Result<Self, SequenceError> {
        let expected = op.input_types().len();
        if inputs.len() != expected {
            return Err(SequenceError::ArityMismatch {
                operation: op.to_parsable_string(),
                expected,
                actual: inputs.len(),
            });
        }
        let position = self.size();
        let mut offsets = Vec::with_capacity(inputs.len());
        for (i, (var, declared)) in inputs.iter().zip(op.input_types()).enumerate() {
            if !var.sequence().statements.same_as(&self.statements) {
                return Err(SequenceError::ForeignVariable {
                    position: i,
                    index: var.index(),
                });
            }
            let actual = var.ty();
            if !declared.is_assignable_from(&actual) {
                return Err(SequenceError::TypeMismatch {
                    position: i,
                    expected: declared.name().to_owned(),
                    actual: actual.name().to_owned(),
                });
            }
            offsets.push(relative(position, var.index()));
        }
        let net_size = if op.is_nonreceiving_value() {
            self.net_size
        } else {
            self.net_size + 1
        };
        let statement = Statement::new(op, offsets.into_boxed_slice());
        let hash = self.hash.wrapping_add(statement.stable_hash());
        Ok(Self::from_parts(
            self.statements.push(Arc::new(statement)),
            hash,
            net_size,
        ))
    }

    /// Sequence with the statements of all `sequences`, in order.
    ///
    /// Relative input offsets stay valid, so no statement is rewritten.
    #[must_use]
    pub fn concatenate(sequences: &[Self]) -> Self {
        let lists: Vec<StatementList> = sequences.iter().map(|s| s.statements.clone()).collect();
        let hash = sequences
            .iter()
            .fold(0u64, |h, s| h.wrapping_add(s.hash));
        let net_size = sequences.iter().map(|s| s.net_size).sum();
        Self::from_parts(StatementList::concat(&lists), hash, net_size)
    }

    /// Number of statements.
    #[must_use]
    pub fn size(&self) -> usize {
        self.statements.len()
    }

    /// Is the sequence empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Number of statements that are not literals or enum constants.
    #[must_use]
    pub fn net_size(&self) -> usize {
        self.net_size
    }

    /// Statement at position `i`.
    ///
    /// # Panics
    ///
    /// Panics when `i` is out of range.
    #[must_use]
    pub fn statement(&self, i: usize) -> &Statement {
        match self.statements.get(i) {
            Some(s) => s,
            None => panic!("statement index {i} out of range for sequence of size {}", self.size()),
        }
    }

    /// All statements, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<Arc<Statement>> {
        self.statements.to_vec()
    }

    /// Operation of the last statement.
    #[must_use]
    pub fn operation(&self) -> Option<&Operation> {
        let last = self.size().checked_sub(1)?;
        self.statements.get(last).map(|s| s.operation())
    }

    /// Value produced at position `i`.
    ///
    /// # Errors
    ///
    /// Fails when `i` is out of range.
    pub fn variable(&self, i: usize) -> Result<Variable<'_>, SequenceError> {
        if i < self.size() {
            Ok(Variable::new(self, i))
        } else {
            Err(SequenceError::IndexOutOfRange {
                index: i,
                size: self.size(),
            })
        }
    }

    /// Value produced by the last statement.
    #[must_use]
    pub fn last_variable(&self) -> Option<Variable<'_>> {
        let last = self.size().checked_sub(1)?;
        Some(Variable::new(self, last))
    }

    /// Statement that produced `var`.
    #[must_use]
    pub fn creating_statement(&self, var: &Variable<'_>) -> &Statement {
        self.statement(var.index())
    }

    /// Input variables of the statement at `i`.
    #[must_use]
    pub fn inputs(&self, i: usize) -> Vec<Variable<'_>> {
        self.inputs_as_absolute_indices(i)
            .into_iter()
            .map(|j| Variable::new(self, j))
            .collect()
    }

    /// Input positions of the statement at `i`.
    #[must_use]
    pub fn inputs_as_absolute_indices(&self, i: usize) -> Vec<usize> {
        self.statement(i)
            .inputs()
            .iter()
            .map(|&o| absolute(i, o))
            .collect()
    }

    /// A single literal statement.
    #[must_use]
    pub fn is_nonreceiver(&self) -> bool {
        self.size() == 1 && self.statement(0).is_nonreceiving_value()
    }

    /// Does any statement belong to a type whose name matches `pattern`?
    #[must_use]
    pub fn has_use_of_matching_type(&self, pattern: &Regex) -> bool {
        self.statements.to_vec().iter().any(|s| {
            s.operation()
                .declaring_type()
                .is_some_and(|t| pattern.is_match(t.name()))
        })
    }

    /// Self-contained sequence that ends with the statement at `index`.
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of range.
    #[must_use]
    pub fn subsequence(&self, index: usize) -> Self {
        assert!(index < self.size(), "subsequence index {index} out of range");
        let statements = self.statements.prefix(index + 1);
        let all = statements.to_vec();
        let hash = all
            .iter()
            .fold(0u64, |h, s| h.wrapping_add(s.stable_hash()));
        let net_size = all.iter().filter(|s| !s.is_nonreceiving_value()).count();
        Self::from_parts(statements, hash, net_size)
    }

    /// Is any position active?
    #[must_use]
    pub fn has_active_flags(&self) -> bool {
        count_ones(&self.active) > 0
    }

    /// Can the value at position `i` be reused as an input?
    #[must_use]
    pub fn is_active(&self, i: usize) -> bool {
        self.active
            .get(i / 64)
            .is_some_and(|w| w & (1 << (i % 64)) != 0)
    }

    /// Exclude the value at `i` from reuse.
    pub fn clear_active_flag(&mut self, i: usize) {
        if let Some(w) = self.active.get_mut(i / 64) {
            *w &= !(1 << (i % 64));
        }
    }

    /// Exclude every value from reuse.
    pub fn clear_all_active_flags(&mut self) {
        self.active.fill(0);
    }

    /// Print every statement in [`Sequence::to_code_string`], instead of
    /// inlining literal arguments.
    pub fn do_not_inline_literals(&mut self) {
        self.inline_literals = false;
    }

    /// Output of the last statement (when not void) followed by its inputs.
    #[must_use]
    pub fn last_statement_variables(&self) -> Vec<Variable<'_>> {
        self.last_vars
            .iter()
            .map(|&i| Variable::new(self, i))
            .collect()
    }

    /// Declared types of [`Sequence::last_statement_variables`].
    #[must_use]
    pub fn last_statement_types(&self) -> Vec<Type> {
        self.last_vars
            .iter()
            .map(|&i| self.statement(i).output_type())
            .collect()
    }

    /// Variables of the last statement whose values can be used as `ty`.
    #[must_use]
    pub fn all_variables_for_type_last_statement(
        &self,
        ty: &Type,
        only_receivers: bool,
    ) -> Vec<Variable<'_>> {
        self.last_statement_variables()
            .into_iter()
            .filter(|v| {
                let s = v.declaring_statement();
                let out = s.output_type();
                ty.is_assignable_from(&out)
                    && !(only_receivers && (out.is_nonreceiver_type() || s.is_nonreceiving_value()))
            })
            .collect()
    }

    /// Random variable of the last statement usable as `ty`.
    ///
    /// # Errors
    ///
    /// Fails when the last statement has no such variable.
    pub fn random_variable_for_type_last_statement(
        &self,
        ty: &Type,
        only_receivers: bool,
        rng: &mut Rand,
    ) -> Result<Variable<'_>, SequenceError> {
        let vars = self.all_variables_for_type_last_statement(ty, only_receivers);
        rng.choose(&vars)
            .copied()
            .ok_or_else(|| SequenceError::NoMatchingVariable {
                ty: ty.name().to_owned(),
                only_receivers,
            })
    }

    /// Random active variable of the whole sequence usable as `ty`.
    ///
    /// # Errors
    ///
    /// Fails when no active position produces such a value.
    pub fn random_variable_for_type(
        &self,
        ty: &Type,
        only_receivers: bool,
        rng: &mut Rand,
    ) -> Result<Variable<'_>, SequenceError> {
        let candidates: Vec<usize> = self
            .statements
            .to_vec()
            .iter()
            .enumerate()
            .filter(|&(i, s)| {
                let out = s.output_type();
                self.is_active(i)
                    && ty.is_assignable_from(&out)
                    && !(only_receivers && out.is_nonreceiver_type())
            })
            .map(|(i, _)| i)
            .collect();
        let i = rng
            .choose(&candidates)
            .ok_or_else(|| SequenceError::NoMatchingVariable {
                ty: ty.name().to_owned(),
                only_receivers,
            })?;
        Ok(Variable::new(self, *i))
    }

    fn is_inlined(&self, i: usize) -> bool {
        let s = self.statement(i);
        self.inline_literals && s.is_nonreceiving_value() && !s.is_null_initialization()
    }

    /// Source expressions for the inputs of statement `i`: variable names, or
    /// literal text for inlined literals.
    fn input_expressions(&self, i: usize) -> Vec<String> {
        self.inputs(i)
            .iter()
            .map(|v| {
                if self.is_inlined(v.index()) {
                    let mut e = String::new();
                    self.statement(v.index()).operation().append_code(&[], &mut e);
                    e
                } else {
                    v.name()
                }
            })
            .collect()
    }

    /// Append code for statement `i` (without a line terminator).
    pub(crate) fn append_code(&self, i: usize, buf: &mut String) {
        let s = self.statement(i);
        let out = s.output_type();
        if !out.is_void() {
            buf.push_str(out.name());
            buf.push(' ');
            buf.push_str(&Variable::new(self, i).name());
            buf.push_str(" = ");
        }
        s.operation().append_code(&self.input_expressions(i), buf);
        buf.push(';');
    }

    /// Should statement `i` be omitted from code output?
    pub(crate) fn is_hidden_in_code(&self, i: usize) -> bool {
        i + 1 != self.size() && self.is_inlined(i)
    }

    /// Source code, one statement per line. Literals used as arguments are
    /// inlined unless they are the last statement.
    #[must_use]
    pub fn to_code_string(&self) -> String {
        let mut buf = String::new();
        for i in 0..self.size() {
            if self.is_hidden_in_code(i) {
                continue;
            }
            self.append_code(i, &mut buf);
            buf.push('\n');
        }
        buf
    }

    fn to_full_code_string(&self) -> String {
        let mut buf = String::new();
        for i in 0..self.size() {
            self.append_code(i, &mut buf);
            buf.push('\n');
        }
        buf
    }

    /// Write the full code of this sequence to the debug log.
    pub fn log(&self) {
        if log::log_enabled!(target: "callchain::sequence", log::Level::Debug) {
            log::debug!(target: "callchain::sequence", "\n{}", self.to_full_code_string());
        }
    }

    /// Text form, one `var = <operation> : var ... var` line per statement.
    #[must_use]
    pub fn to_parsable_string(&self) -> String {
        let mut buf = String::new();
        for i in 0..self.size() {
            let s = self.statement(i);
            buf.push_str(&Variable::new(self, i).name());
            buf.push_str(" = ");
            buf.push_str(&s.operation().to_parsable_string());
            buf.push_str(" :");
            for v in self.inputs(i) {
                buf.push(' ');
                buf.push_str(&v.name());
            }
            buf.push('\n');
        }
        buf
    }

    /// Parse the text form produced by [`Sequence::to_parsable_string`].
    /// Blank lines are ignored.
    ///
    /// # Errors
    ///
    /// Fails with the 0-based statement index and text of the first bad line.
    pub fn parse(text: &str, catalog: &Catalog) -> Result<Self, ParseError> {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        Self::parse_lines(&lines, catalog)
    }

    /// Parse one statement per element of `lines`.
    ///
    /// # Errors
    ///
    /// Fails with the 0-based statement index and text of the first bad line.
    pub fn parse_lines(lines: &[&str], catalog: &Catalog) -> Result<Self, ParseError> {
        let mut names: Map<&str, usize> = Map::default();
        let mut seq = Self::new();
        for (line, text) in lines.iter().enumerate() {
            let text = text.trim();
            let err = |kind| ParseError {
                line,
                text: text.to_owned(),
                kind,
            };
            seq = parse_statement(&seq, text, catalog, &mut names).map_err(err)?;
        }
        Ok(seq)
    }

    /// Check that every input offset points to an earlier position whose
    /// type is assignable to the declared input type.
    ///
    /// # Errors
    ///
    /// Reports the first violation.
    pub fn validate(&self) -> Result<(), SequenceError> {
        let all = self.statements.to_vec();
        for (p, s) in all.iter().enumerate() {
            let declared = s.operation().input_types();
            if declared.len() != s.inputs().len() {
                return Err(SequenceError::ArityMismatch {
                    operation: s.operation().to_parsable_string(),
                    expected: declared.len(),
                    actual: s.inputs().len(),
                });
            }
            for (i, (&offset, ty)) in s.inputs().iter().zip(declared).enumerate() {
                let target = p.checked_add_signed(offset).filter(|_| offset < 0);
                let Some(target) = target else {
                    return Err(SequenceError::InvalidOffset {
                        statement: p,
                        offset,
                    });
                };
                let actual = all[target].output_type();
                if !ty.is_assignable_from(&actual) {
                    return Err(SequenceError::TypeMismatch {
                        position: i,
                        expected: ty.name().to_owned(),
                        actual: actual.name().to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    fn structurally_equal(&self, other: &Self) -> bool {
        if self.statements.same_as(&other.statements) {
            return true;
        }
        self.size() == other.size()
            && self.hash == other.hash
            && self
                .statements
                .to_vec()
                .iter()
                .zip(other.statements.to_vec().iter())
                .all(|(a, b)| Arc::ptr_eq(a, b) || a == b)
    }
}

fn parse_statement<'t>(
    seq: &Sequence,
    text: &'t str,
    catalog: &Catalog,
    names: &mut Map<&'t str, usize>,
) -> Result<Sequence, ParseErrorKind> {
    let eq = text.find('=').ok_or(ParseErrorKind::MissingEquals)?;
    let colon = text.rfind(':').ok_or(ParseErrorKind::MissingColon)?;
    if colon < eq {
        return Err(ParseErrorKind::MissingColon);
    }
    let var = text[..eq].trim();
    let descriptor = text[eq + 1..colon].trim();
    let inputs = text[colon + 1..].trim();
    if var.is_empty() {
        return Err(ParseErrorKind::EmptyVariable);
    }
    if names.contains_key(var) {
        return Err(ParseErrorKind::DuplicateVariable(var.to_owned()));
    }
    let op = catalog.parse_operation(descriptor)?;
    let input_names: Vec<&str> = inputs.split_whitespace().collect();
    let expected = op.input_types().len();
    if input_names.len() != expected {
        return Err(ParseErrorKind::InputCount {
            expected,
            actual: input_names.len(),
        });
    }
    let vars = input_names
        .iter()
        .map(|n| {
            let i = *names
                .get(n)
                .ok_or_else(|| ParseErrorKind::UndeclaredVariable((*n).to_owned()))?;
            Ok(Variable::new(seq, i))
        })
        .collect::<Result<Vec<_>, ParseErrorKind>>()?;
    let next = seq.extend(op, &vars)?;
    names.insert(var, seq.size());
    Ok(next)
}

fn relative(position: usize, index: usize) -> isize {
    debug_assert!(index < position);
    // Sequences are far smaller than isize::MAX.
    -((position - index) as isize)
}

fn absolute(position: usize, offset: isize) -> usize {
    match position.checked_add_signed(offset) {
        Some(i) if offset < 0 => i,
        _ => unreachable!("internal error: offset {offset} at statement {position}"),
    }
}

fn set_bits(words: &mut [u64], n: usize) {
    for (w, word) in words.iter_mut().enumerate() {
        let bits = n.saturating_sub(w * 64).min(64);
        *word = if bits == 64 { u64::MAX } else { (1 << bits) - 1 };
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        let eq = self.structurally_equal(other);
        if !eq && debug_checks_enabled() && self.to_parsable_string() == other.to_parsable_string()
        {
            unreachable!(
                "internal error: unequal sequences with identical text:\n{}",
                self.to_parsable_string()
            );
        }
        eq
    }
}

impl Eq for Sequence {}

impl Hash for Sequence {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl Sequence {
    /// Cached structural hash: the wrapping sum of statement hashes.
    #[must_use]
    pub fn hash_code(&self) -> u64 {
        self.hash
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("size", &self.size())
            .field("net_size", &self.net_size)
            .field("hash", &format_args!("{:#x}", self.hash))
            .field("text", &self.to_parsable_string())
            .finish()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_code_string())
    }
}
