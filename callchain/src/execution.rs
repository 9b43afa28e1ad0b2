// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use alloc::sync::Arc;
use core::{fmt, mem, time::Duration};
use std::sync::{Mutex, MutexGuard};

use crate::{Fault, Set, Type, Value, util::lock_no_poison};

/// Result of running one statement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExecutionOutcome {
    /// The operation returned a value (null for `void` operations).
    Normal {
        /// Produced value.
        value: Value,
        /// Wall-clock time spent in the operation.
        elapsed: Duration,
        /// Text written by the operation, when output is captured.
        output: String,
    },
    /// The operation raised a fault.
    Exceptional {
        /// Raised fault.
        fault: Fault,
        /// Wall-clock time spent in the operation.
        elapsed: Duration,
        /// Text written by the operation, when output is captured.
        output: String,
    },
    /// The statement has not run.
    #[default]
    NotExecuted,
}

impl ExecutionOutcome {
    /// Is this a normal outcome?
    #[must_use]
    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Normal { .. })
    }

    /// Is this an exceptional outcome?
    #[must_use]
    pub fn is_exceptional(&self) -> bool {
        matches!(self, Self::Exceptional { .. })
    }

    /// Has the statement run at all?
    #[must_use]
    pub fn is_executed(&self) -> bool {
        !matches!(self, Self::NotExecuted)
    }

    /// Produced value of a normal outcome.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Normal { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Raised fault of an exceptional outcome.
    #[must_use]
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Exceptional { fault, .. } => Some(fault),
            _ => None,
        }
    }

    /// Time spent, zero when not executed.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Normal { elapsed, .. } | Self::Exceptional { elapsed, .. } => *elapsed,
            Self::NotExecuted => Duration::ZERO,
        }
    }

    /// Captured output, empty when not executed or not captured.
    #[must_use]
    pub fn output(&self) -> &str {
        match self {
            Self::Normal { output, .. } | Self::Exceptional { output, .. } => output,
            Self::NotExecuted => "",
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal { value, .. } => write!(f, "normal: {value}"),
            Self::Exceptional { fault, .. } => write!(f, "exceptional: {fault}"),
            Self::NotExecuted => f.write_str("not executed"),
        }
    }
}

/// Per-statement outcomes of one run, plus the declaring types touched by it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    outcomes: Vec<ExecutionOutcome>,
    covered: Set<Type>,
}

impl Execution {
    /// All-`NotExecuted` execution with `size` slots.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            outcomes: vec![ExecutionOutcome::NotExecuted; size],
            covered: Set::default(),
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn size(&self) -> usize {
        self.outcomes.len()
    }

    /// Outcome at `i`.
    ///
    /// # Panics
    ///
    /// Panics when `i` is out of range.
    #[must_use]
    pub fn get(&self, i: usize) -> &ExecutionOutcome {
        &self.outcomes[i]
    }

    /// All outcomes in statement order.
    #[must_use]
    pub fn outcomes(&self) -> &[ExecutionOutcome] {
        &self.outcomes
    }

    pub(crate) fn set(&mut self, i: usize, outcome: ExecutionOutcome) {
        self.outcomes[i] = outcome;
    }

    pub(crate) fn reset(&mut self, size: usize) {
        self.outcomes.clear();
        self.outcomes.resize(size, ExecutionOutcome::NotExecuted);
        self.covered.clear();
    }

    /// Record that code of `ty` ran.
    pub fn add_covered_type(&mut self, ty: Type) {
        self.covered.insert(ty);
    }

    /// Did code of `ty` run?
    #[must_use]
    pub fn covers_type(&self, ty: &Type) -> bool {
        self.covered.contains(ty)
    }

    /// Covered declaring types, in no particular order.
    pub fn covered_types(&self) -> impl Iterator<Item = &Type> {
        self.covered.iter()
    }
}

/// Sink handed to operations for their incidental output.
///
/// Either discards everything or buffers it for the current statement.
#[derive(Debug, Default)]
pub struct Output {
    buf: Option<String>,
}

impl Output {
    /// Sink that drops all text.
    #[must_use]
    pub fn discard() -> Self {
        Self { buf: None }
    }

    /// Sink that keeps text until [`Output::take`].
    #[must_use]
    pub fn capture() -> Self {
        Self {
            buf: Some(String::new()),
        }
    }

    /// Is text being kept?
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.buf.is_some()
    }

    /// Take the buffered text, leaving the sink empty.
    pub fn take(&mut self) -> String {
        self.buf.as_mut().map(mem::take).unwrap_or_default()
    }
}

impl fmt::Write for Output {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if let Some(buf) = &mut self.buf {
            buf.push_str(s);
        }
        Ok(())
    }
}

/// Shared, lock-guarded log of captured operation output.
///
/// Clones share the same buffer. The lock is held for the whole duration of
/// each captured statement, so statements of sequences running on different
/// threads with the same handle never interleave their output.
#[derive(Debug, Clone, Default)]
pub struct OutputCapture {
    inner: Arc<Mutex<String>>,
}

impl OutputCapture {
    /// Create an empty capture buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the buffer for one statement.
    pub(crate) fn acquire(&self) -> MutexGuard<'_, String> {
        lock_no_poison(&self.inner)
    }

    /// Copy of everything captured so far.
    #[must_use]
    pub fn contents(&self) -> String {
        self.acquire().clone()
    }

    /// Take everything captured so far, leaving the buffer empty.
    pub fn take(&self) -> String {
        mem::take(&mut *self.acquire())
    }
}
