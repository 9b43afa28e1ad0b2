// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::fmt;

use crate::{ExecutableSequence, Sequence, Value};

/// One observation about an executed sequence, rendered as code placed
/// around the final statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Check {
    description: String,
    pre: String,
    post: String,
}

impl Check {
    /// Check with no code of its own.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            pre: String::new(),
            post: String::new(),
        }
    }

    /// Code emitted before the final statement.
    #[must_use]
    pub fn with_pre_statement(mut self, code: impl Into<String>) -> Self {
        self.pre = code.into();
        self
    }

    /// Code emitted after the final statement.
    #[must_use]
    pub fn with_post_statement(mut self, code: impl Into<String>) -> Self {
        self.post = code.into();
        self
    }

    /// The final statement is expected to fail with a fault named `name`.
    #[must_use]
    pub fn expected_fault(name: &str) -> Self {
        Self::new(format!("expected fault {name}"))
            .with_pre_statement("try {\n  ")
            .with_post_statement(format!(
                "\n  fail(\"Expected fault {name}\");\n}} catch ({name} e) {{\n  // expected\n}}"
            ))
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Code emitted before the final statement.
    #[must_use]
    pub fn pre_statement(&self) -> &str {
        &self.pre
    }

    /// Code emitted after the final statement.
    #[must_use]
    pub fn post_statement(&self) -> &str {
        &self.post
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// How a sequence behaved, as judged by a [`CheckGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Behavior {
    /// Expected behavior, to be preserved by future versions.
    Regression,
    /// Behavior that reveals a defect.
    Error,
    /// The sequence is not a legal use of the code under test.
    Invalid,
}

/// Checks produced for one execution of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checks {
    behavior: Behavior,
    checks: Vec<(Check, bool)>,
    exception: Option<Check>,
}

impl Checks {
    /// No checks yet.
    #[must_use]
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            checks: Vec::new(),
            exception: None,
        }
    }

    /// The final call was rejected before it ran.
    #[must_use]
    pub fn invalid_call(reason: &str) -> Self {
        let mut c = Self::new(Behavior::Invalid);
        c.add(Check::new(format!("invalid call: {reason}")), false);
        c
    }

    /// Record `check` and whether it held.
    pub fn add(&mut self, check: Check, passed: bool) {
        self.checks.push((check, passed));
    }

    /// Set the check about the fault thrown by the final statement.
    pub fn set_exception_check(&mut self, check: Check) {
        self.exception = Some(check);
    }

    /// Behavior classification.
    #[must_use]
    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    /// Check about the fault thrown by the final statement.
    #[must_use]
    pub fn exception_check(&self) -> Option<&Check> {
        self.exception.as_ref()
    }

    /// Recorded checks with their pass flags.
    pub fn iter(&self) -> impl Iterator<Item = (&Check, bool)> {
        self.checks.iter().map(|(c, p)| (c, *p))
    }

    /// Is there anything to assert?
    #[must_use]
    pub fn has_checks(&self) -> bool {
        match self.behavior {
            Behavior::Regression => !self.checks.is_empty() || self.exception.is_some(),
            Behavior::Error | Behavior::Invalid => !self.checks.is_empty(),
        }
    }

    /// Does the sequence reveal a defect?
    #[must_use]
    pub fn has_error_behavior(&self) -> bool {
        self.behavior == Behavior::Error
    }

    /// Is the sequence an illegal use?
    #[must_use]
    pub fn has_invalid_behavior(&self) -> bool {
        self.behavior == Behavior::Invalid
    }
}

/// Concrete state right before the final call of a sequence.
#[derive(Debug, Clone, Copy)]
pub struct Prestate<'a> {
    /// Sequence being executed.
    pub sequence: &'a Sequence,
    /// Position of the final statement.
    pub index: usize,
    /// Resolved input values of the final statement.
    pub inputs: &'a [Value],
}

/// Produces [`Checks`] for executed sequences.
pub trait CheckGenerator {
    /// Inspect the inputs of the final constructor or method call before it
    /// runs. Returning a reason marks the call invalid and skips it.
    fn check_prestate(&mut self, prestate: &Prestate<'_>) -> Option<String> {
        let _ = prestate;
        None
    }

    /// Produce checks for a completed execution.
    fn generate(&mut self, sequence: &ExecutableSequence) -> Checks;
}

/// Generator that records no checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyCheckGenerator;

impl CheckGenerator for DummyCheckGenerator {
    fn generate(&mut self, _sequence: &ExecutableSequence) -> Checks {
        Checks::new(Behavior::Regression)
    }
}

/// Observer of sequence execution.
pub trait ExecutionVisitor {
    /// Execution is about to begin.
    fn initialize(&mut self, sequence: &ExecutableSequence) {
        let _ = sequence;
    }

    /// Statement `i` is about to run.
    fn visit_before_statement(&mut self, sequence: &ExecutableSequence, i: usize) {
        let _ = (sequence, i);
    }

    /// Statement `i` has run.
    fn visit_after_statement(&mut self, sequence: &ExecutableSequence, i: usize) {
        let _ = (sequence, i);
    }

    /// Execution has finished.
    fn visit_after_sequence(&mut self, sequence: &ExecutableSequence) {
        let _ = sequence;
    }
}

/// Visitor that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyVisitor;

impl ExecutionVisitor for DummyVisitor {}

/// Forwards every event to each visitor in order.
#[derive(Default)]
pub struct MultiVisitor<'v> {
    visitors: Vec<&'v mut dyn ExecutionVisitor>,
}

impl<'v> MultiVisitor<'v> {
    /// Visitor over `visitors`.
    #[must_use]
    pub fn new(visitors: Vec<&'v mut dyn ExecutionVisitor>) -> Self {
        Self { visitors }
    }

    /// Append a visitor.
    pub fn push(&mut self, visitor: &'v mut dyn ExecutionVisitor) {
        self.visitors.push(visitor);
    }
}

impl ExecutionVisitor for MultiVisitor<'_> {
    fn initialize(&mut self, sequence: &ExecutableSequence) {
        for v in &mut self.visitors {
            v.initialize(sequence);
        }
    }

    fn visit_before_statement(&mut self, sequence: &ExecutableSequence, i: usize) {
        for v in &mut self.visitors {
            v.visit_before_statement(sequence, i);
        }
    }

    fn visit_after_statement(&mut self, sequence: &ExecutableSequence, i: usize) {
        for v in &mut self.visitors {
            v.visit_after_statement(sequence, i);
        }
    }

    fn visit_after_sequence(&mut self, sequence: &ExecutableSequence) {
        for v in &mut self.visitors {
            v.visit_after_sequence(sequence);
        }
    }
}
