// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::{
    fmt::{self, Write as _},
    hash::{Hash, Hasher},
    time::Duration,
};
use std::time::Instant;

use crate::{
    CheckGenerator, Checks, ExecOptions, Execution, ExecutionError, ExecutionOutcome,
    ExecutionVisitor, Output, Prestate, Sequence, Type, Value,
};

/// A sequence together with the outcome of its most recent execution and
/// the checks generated for it.
#[derive(Debug, Clone)]
pub struct ExecutableSequence {
    sequence: Sequence,
    execution: Execution,
    checks: Option<Checks>,
    has_null_input: bool,
    /// Time spent generating the sequence, as reported by the generator.
    pub generation_time: Option<Duration>,
    /// Wall time of the most recent execution.
    pub execution_time: Option<Duration>,
}

impl ExecutableSequence {
    /// Wrap `sequence`; every statement starts out not executed.
    #[must_use]
    pub fn new(sequence: Sequence) -> Self {
        let execution = Execution::new(sequence.size());
        Self {
            sequence,
            execution,
            checks: None,
            has_null_input: false,
            generation_time: None,
            execution_time: None,
        }
    }

    /// Wrapped sequence.
    #[must_use]
    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    /// Outcomes of the most recent execution.
    #[must_use]
    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    /// Checks of the most recent execution.
    #[must_use]
    pub fn checks(&self) -> Option<&Checks> {
        self.checks.as_ref()
    }

    /// Execute with default options: no output capture, early termination.
    ///
    /// # Errors
    ///
    /// See [`ExecutableSequence::execute_with`].
    pub fn execute(
        &mut self,
        visitor: &mut dyn ExecutionVisitor,
        generator: &mut dyn CheckGenerator,
    ) -> Result<(), ExecutionError> {
        self.execute_with(visitor, generator, &ExecOptions::default())
    }

    /// Run every statement in order and generate checks.
    ///
    /// An exceptional outcome before the final statement ends execution
    /// early; the remaining statements stay not executed. When the final
    /// statement is a constructor or method call, `generator` may reject it
    /// from its inputs, in which case it is not run and the checks mark the
    /// sequence invalid.
    ///
    /// # Errors
    ///
    /// Fails when execution machinery breaks, and in strict mode when a
    /// statement before the final one is exceptional.
    pub fn execute_with(
        &mut self,
        visitor: &mut dyn ExecutionVisitor,
        generator: &mut dyn CheckGenerator,
        options: &ExecOptions,
    ) -> Result<(), ExecutionError> {
        let start = Instant::now();
        let size = self.sequence.size();
        self.execution.reset(size);
        self.has_null_input = false;
        self.checks = None;
        visitor.initialize(self);

        for i in 0..size {
            let inputs = self.runtime_inputs(i)?;
            let op = self.sequence.statement(i).operation();
            if i + 1 == size && (op.is_constructor_call() || op.is_message()) {
                let prestate = Prestate {
                    sequence: &self.sequence,
                    index: i,
                    inputs: &inputs,
                };
                if let Some(reason) = generator.check_prestate(&prestate) {
                    log::debug!(
                        target: "callchain::executable",
                        "statement {i} rejected before execution: {reason}"
                    );
                    self.checks = Some(Checks::invalid_call(&reason));
                    self.execution_time = Some(start.elapsed());
                    return Ok(());
                }
            }

            visitor.visit_before_statement(self, i);
            let outcome = self.execute_statement(i, &inputs, options)?;
            self.execution.set(i, outcome);

            let outcome = self.execution.get(i);
            if !outcome.is_executed() {
                return Err(ExecutionError::Unexecuted { index: i });
            }
            if let Some(fault) = outcome.fault() {
                if i + 1 < size {
                    if options.strict {
                        return Err(ExecutionError::ExceptionBeforeFinal {
                            index: i,
                            fault: fault.clone(),
                        });
                    }
                    log::trace!(
                        target: "callchain::executable",
                        "statement {i} threw {fault}, stopping"
                    );
                    break;
                }
            }
            visitor.visit_after_statement(self, i);
        }

        visitor.visit_after_sequence(self);
        self.checks = Some(generator.generate(self));
        self.execution_time = Some(start.elapsed());
        Ok(())
    }

    fn execute_statement(
        &self,
        i: usize,
        inputs: &[Value],
        options: &ExecOptions,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let op = self.sequence.statement(i).operation();
        let invocation = |index, error| ExecutionError::Invocation { index, error };
        match &options.capture {
            None => op
                .execute(inputs, &mut Output::discard())
                .map_err(|e| invocation(i, e)),
            Some(capture) => {
                // Held for the whole statement: captures never interleave.
                let mut shared = capture.acquire();
                let outcome = op
                    .execute(inputs, &mut Output::capture())
                    .map_err(|e| invocation(i, e))?;
                shared.push_str(outcome.output());
                Ok(outcome)
            }
        }
    }

    fn runtime_inputs(&mut self, i: usize) -> Result<Vec<Value>, ExecutionError> {
        let mut values = Vec::new();
        for (input, producer) in self
            .sequence
            .inputs_as_absolute_indices(i)
            .into_iter()
            .enumerate()
        {
            let value = self
                .execution
                .get(producer)
                .value()
                .ok_or(ExecutionError::InputNotNormal {
                    index: i,
                    input,
                    producer,
                })?;
            if value.is_null() && !self.sequence.statement(producer).is_null_initialization() {
                self.has_null_input = true;
            }
            values.push(value.clone());
        }
        Ok(values)
    }

    /// Outcome of statement `i`.
    ///
    /// # Panics
    ///
    /// Panics when `i` is out of range.
    #[must_use]
    pub fn result(&self, i: usize) -> &ExecutionOutcome {
        self.execution.get(i)
    }

    /// All outcomes, one per statement.
    #[must_use]
    pub fn results(&self) -> &[ExecutionOutcome] {
        self.execution.outcomes()
    }

    /// Number of statements executed before the first unexecuted one.
    #[must_use]
    pub fn executed_size(&self) -> usize {
        self.results()
            .iter()
            .take_while(|o| o.is_executed())
            .count()
    }

    /// Did statement `i` complete normally?
    #[must_use]
    pub fn is_normal_execution(&self, i: usize) -> bool {
        self.result(i).is_normal()
    }

    /// First statement that did not complete normally.
    #[must_use]
    pub fn non_normal_execution_index(&self) -> Option<usize> {
        self.results().iter().position(|o| !o.is_normal())
    }

    /// Did every statement complete normally?
    #[must_use]
    pub fn is_normal_execution_all(&self) -> bool {
        self.non_normal_execution_index().is_none()
    }

    /// First statement with an exceptional outcome.
    #[must_use]
    pub fn exception_index(&self) -> Option<usize> {
        self.results().iter().position(ExecutionOutcome::is_exceptional)
    }

    /// Did any statement fail?
    #[must_use]
    pub fn throws_exception(&self) -> bool {
        self.exception_index().is_some()
    }

    /// First statement that failed with a fault named `name`.
    #[must_use]
    pub fn fault_index(&self, name: &str) -> Option<usize> {
        self.results()
            .iter()
            .position(|o| o.fault().is_some_and(|f| f.name == name))
    }

    /// Did any statement fail with a fault named `name`?
    #[must_use]
    pub fn throws_fault_named(&self, name: &str) -> bool {
        self.fault_index(name).is_some()
    }

    /// Last statement that was not executed.
    #[must_use]
    pub fn non_executed_index(&self) -> Option<usize> {
        self.results().iter().rposition(|o| !o.is_executed())
    }

    /// Was any statement left unexecuted?
    #[must_use]
    pub fn has_non_executed_statements(&self) -> bool {
        self.non_executed_index().is_some()
    }

    /// Did a statement receive a null that was not written as a literal?
    #[must_use]
    pub fn has_null_input(&self) -> bool {
        self.has_null_input
    }

    /// Do the checks reveal a defect?
    #[must_use]
    pub fn has_failure(&self) -> bool {
        self.checks.as_ref().is_some_and(Checks::has_error_behavior)
    }

    /// Are there checks to assert?
    #[must_use]
    pub fn has_checks(&self) -> bool {
        self.checks.as_ref().is_some_and(Checks::has_checks)
    }

    /// Was the sequence judged an illegal use?
    #[must_use]
    pub fn has_invalid_behavior(&self) -> bool {
        self.checks.as_ref().is_some_and(Checks::has_invalid_behavior)
    }

    /// Record that code of `ty` ran.
    pub fn add_covered_type(&mut self, ty: Type) {
        self.execution.add_covered_type(ty);
    }

    /// Did code of `ty` run?
    #[must_use]
    pub fn covers_type(&self, ty: &Type) -> bool {
        self.execution.covers_type(ty)
    }

    /// Source code of statement `i`.
    #[must_use]
    pub fn statement_to_code_string(&self, i: usize) -> String {
        let mut buf = String::new();
        self.sequence.append_code(i, &mut buf);
        buf
    }

    /// Source code with check code wrapped around the final statement.
    #[must_use]
    pub fn to_code_string(&self) -> String {
        let size = self.sequence.size();
        let mut out = String::new();
        for i in 0..size {
            if self.sequence.is_hidden_in_code(i) {
                continue;
            }
            let mut stmt = self.statement_to_code_string(i);
            if i + 1 == size {
                if let Some(checks) = &self.checks {
                    let wrappers = checks
                        .exception_check()
                        .into_iter()
                        .chain(checks.iter().map(|(c, _)| c));
                    for c in wrappers {
                        stmt.insert_str(0, c.pre_statement());
                        stmt.push_str(c.post_statement());
                        stmt.push('\n');
                    }
                }
            }
            out.push_str(&stmt);
            if !stmt.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}

impl PartialEq for ExecutableSequence {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence && self.checks == other.checks
    }
}

impl Eq for ExecutableSequence {}

impl Hash for ExecutableSequence {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sequence.hash(state);
        self.checks.hash(state);
    }
}

impl fmt::Display for ExecutableSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.sequence.size();
        for i in 0..size {
            let mut line = self.statement_to_code_string(i);
            if let Some(o) = self.execution.outcomes().get(i) {
                let _ = write!(line, " // {o}");
            }
            f.write_str(&line)?;
            if i + 1 == size {
                if let Some(checks) = &self.checks {
                    for (c, passed) in checks.iter() {
                        write!(f, "\n{c} : {passed}")?;
                    }
                }
            }
            f.write_str("\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Behavior, Check, DummyCheckGenerator, DummyVisitor, Fault, MultiVisitor, OutputCapture,
        tests::Fixture,
    };

    /// Records the fault of the final statement, if any.
    struct FaultChecks;

    impl CheckGenerator for FaultChecks {
        fn generate(&mut self, es: &ExecutableSequence) -> Checks {
            let mut checks = Checks::new(Behavior::Regression);
            let last = es.sequence().size() - 1;
            if let Some(fault) = es.result(last).fault() {
                checks.set_exception_check(Check::expected_fault(&fault.name));
            }
            checks
        }
    }

    /// Rejects calls whose only argument is a negative int.
    struct NonNegative;

    impl CheckGenerator for NonNegative {
        fn check_prestate(&mut self, p: &Prestate<'_>) -> Option<String> {
            let last = p.inputs.last()?.as_int()?;
            (last < 0).then(|| format!("argument {last} is negative"))
        }

        fn generate(&mut self, _es: &ExecutableSequence) -> Checks {
            Checks::new(Behavior::Regression)
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl ExecutionVisitor for Recorder {
        fn initialize(&mut self, _es: &ExecutableSequence) {
            self.events.push("init".into());
        }

        fn visit_before_statement(&mut self, _es: &ExecutableSequence, i: usize) {
            self.events.push(format!("before {i}"));
        }

        fn visit_after_statement(&mut self, es: &ExecutableSequence, i: usize) {
            assert!(es.result(i).is_executed());
            self.events.push(format!("after {i}"));
        }

        fn visit_after_sequence(&mut self, _es: &ExecutableSequence) {
            self.events.push("done".into());
        }
    }

    fn run(s: Sequence) -> ExecutableSequence {
        let mut es = ExecutableSequence::new(s);
        es.execute(&mut DummyVisitor, &mut DummyCheckGenerator)
            .unwrap();
        es
    }

    #[test]
    fn simple_chain() {
        let fx = Fixture::new();
        let s = fx.foo_sequence();
        let bar = fx.op("method : Foo.bar()");
        let s = s.extend(bar, &[s.variable(1).unwrap()]).unwrap();
        let es = run(s);
        assert!(es.is_normal_execution_all());
        assert_eq!(es.executed_size(), 3);
        let foo = es.result(1).value().unwrap();
        assert_eq!(foo.runtime_type(), Some(fx.foo.clone()));
        assert_eq!(es.result(2).value(), Some(&Value::Int(7)));
        assert!(!es.has_null_input());
        assert!(!es.has_non_executed_statements());
        assert!(es.checks().is_some());
        assert!(es.execution_time.is_some());
    }

    #[test]
    fn early_termination() {
        let fx = Fixture::new();
        let s = fx.boom_sequence();
        let bar = fx.op("method : Foo.bar()");
        let s = s.extend(bar, &[s.variable(0).unwrap()]).unwrap();
        let s = Sequence::concatenate(&[s, Sequence::for_primitive(Value::Int(1)).unwrap()]);
        let mut es = ExecutableSequence::new(s);
        let mut rec = Recorder::default();
        es.execute(&mut rec, &mut DummyCheckGenerator).unwrap();
        let kinds: Vec<(bool, bool)> = es
            .results()
            .iter()
            .map(|o| (o.is_normal(), o.is_exceptional()))
            .collect();
        assert_eq!(kinds, [(true, false), (false, true), (false, false), (false, false)]);
        assert_eq!(es.exception_index(), Some(1));
        assert_eq!(es.non_normal_execution_index(), Some(1));
        assert_eq!(es.non_executed_index(), Some(3));
        assert_eq!(es.executed_size(), 2);
        assert!(es.throws_fault_named(Fault::PANIC));
        assert!(!es.throws_fault_named(Fault::NULL_REFERENCE));
        assert_eq!(
            rec.events,
            ["init", "before 0", "after 0", "before 1", "done"]
        );
        assert!(es.checks().is_some());
    }

    #[test]
    fn failing_first_statement() {
        let fx = Fixture::new();
        let fail = fx.op("method : static Foo.fail()");
        let s = Sequence::new().extend(fail, &[]).unwrap();
        let s = Sequence::concatenate(&[
            s,
            Sequence::for_primitive(Value::Int(1)).unwrap(),
            Sequence::for_primitive(Value::Int(2)).unwrap(),
        ]);
        let es = run(s);
        let kinds: Vec<bool> = es.results().iter().map(ExecutionOutcome::is_executed).collect();
        assert_eq!(kinds, [true, false, false]);
        assert!(es.result(0).is_exceptional());
    }

    #[test]
    fn strict_mode() {
        let fx = Fixture::new();
        let s = fx.boom_sequence();
        let s = Sequence::concatenate(&[s, Sequence::for_primitive(Value::Int(1)).unwrap()]);
        let mut es = ExecutableSequence::new(s);
        let options = ExecOptions {
            strict: true,
            capture: None,
        };
        let err = es
            .execute_with(&mut DummyVisitor, &mut DummyCheckGenerator, &options)
            .unwrap_err();
        let ExecutionError::ExceptionBeforeFinal { index, fault } = err else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(index, 1);
        assert_eq!(fault.name, Fault::PANIC);
    }

    #[test]
    fn final_exception_is_not_strict_violation() {
        let fx = Fixture::new();
        let mut es = ExecutableSequence::new(fx.boom_sequence());
        let options = ExecOptions {
            strict: true,
            capture: None,
        };
        es.execute_with(&mut DummyVisitor, &mut FaultChecks, &options)
            .unwrap();
        assert!(es.throws_exception());
        assert!(es.has_checks());
        let code = es.to_code_string();
        assert!(code.starts_with("Foo foo0 = new Foo();\ntry {\n  foo0.boom();"), "{code}");
        assert!(code.contains("catch (Panic e)"), "{code}");
    }

    #[test]
    fn precondition_short_circuit() {
        let fx = Fixture::new();
        let s = Sequence::for_primitive(Value::Int(-3)).unwrap();
        let cons = fx.op("cons : Foo.<init>(int)");
        let s = s.extend(cons, &[s.variable(0).unwrap()]).unwrap();
        let mut es = ExecutableSequence::new(s.clone());
        let mut rec = Recorder::default();
        es.execute(&mut rec, &mut NonNegative).unwrap();
        assert!(es.has_invalid_behavior());
        assert!(!es.result(1).is_executed());
        assert_eq!(rec.events, ["init", "before 0", "after 0"]);

        // Non-final statements are never rejected.
        let bar = fx.op("method : Foo.bar()");
        let s = s.extend(bar, &[s.variable(1).unwrap()]).unwrap();
        let mut es = ExecutableSequence::new(s);
        es.execute(&mut DummyVisitor, &mut NonNegative).unwrap();
        assert!(!es.has_invalid_behavior());
        assert!(es.is_normal_execution_all());
    }

    #[test]
    fn null_input_flag() {
        let fx = Fixture::new();
        let none = fx.op("method : static Foo.none()");
        let bar = fx.op("method : Foo.bar()");
        let s = Sequence::new().extend(none, &[]).unwrap();
        let s = s.extend(bar.clone(), &[s.variable(0).unwrap()]).unwrap();
        let es = run(s);
        assert!(es.has_null_input());
        assert!(es.throws_fault_named(Fault::NULL_REFERENCE));

        // An explicit null literal does not count.
        let s = Sequence::zero(&fx.foo).unwrap();
        let s = s.extend(bar, &[s.variable(0).unwrap()]).unwrap();
        let es = run(s);
        assert!(!es.has_null_input());
        assert!(es.throws_fault_named(Fault::NULL_REFERENCE));
    }

    #[test]
    fn output_capture() {
        let fx = Fixture::new();
        let shout = fx.op("method : static Foo.shout(String)");
        let s = Sequence::for_primitive(Value::str("hey")).unwrap();
        let s = s.extend(shout, &[s.variable(0).unwrap()]).unwrap();
        let capture = OutputCapture::new();
        let options = ExecOptions {
            strict: false,
            capture: Some(capture.clone()),
        };
        let mut es = ExecutableSequence::new(s.clone());
        es.execute_with(&mut DummyVisitor, &mut DummyCheckGenerator, &options)
            .unwrap();
        assert_eq!(es.result(1).output(), "HEY\n");
        assert_eq!(capture.take(), "HEY\n");

        let es = run(s);
        assert_eq!(es.result(1).output(), "");
    }

    #[test]
    fn reexecution_resets() {
        let fx = Fixture::new();
        let mut es = ExecutableSequence::new(fx.boom_sequence());
        es.add_covered_type(fx.foo.clone());
        assert!(es.covers_type(&fx.foo));
        es.execute(&mut DummyVisitor, &mut FaultChecks).unwrap();
        assert!(!es.covers_type(&fx.foo));
        let first = es.checks().cloned();
        es.execute(&mut DummyVisitor, &mut FaultChecks).unwrap();
        assert_eq!(es.checks().cloned(), first);
    }

    #[test]
    fn multi_visitor_forwards() {
        let fx = Fixture::new();
        let mut a = Recorder::default();
        let mut b = Recorder::default();
        let mut es = ExecutableSequence::new(fx.foo_sequence());
        {
            let mut multi = MultiVisitor::default();
            multi.push(&mut a);
            multi.push(&mut b);
            es.execute(&mut multi, &mut DummyCheckGenerator).unwrap();
        }
        assert_eq!(a.events, b.events);
        assert_eq!(a.events.len(), 6);
    }

    #[test]
    fn display_and_equality() {
        let fx = Fixture::new();
        let es = run(fx.foo_sequence());
        let text = es.to_string();
        assert!(text.starts_with("int int0 = 7;"), "{text}");
        assert_eq!(text.lines().count(), 2);
        assert_eq!(es, run(fx.foo_sequence()));
        assert_ne!(es, ExecutableSequence::new(fx.foo_sequence()));
        assert_eq!(es.to_code_string(), "Foo foo1 = new Foo(7);\n");
    }
}
