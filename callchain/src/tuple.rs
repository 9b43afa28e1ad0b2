// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{Operation, Rand, Sequence, SequenceError, SequenceView, Type, Variable};

/// Concatenation of component sequences with one chosen value per component.
///
/// Supplies the arguments of variable-arity operations such as array
/// creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleSequence {
    sequence: Sequence,
    output_indices: Vec<usize>,
}

impl TupleSequence {
    /// Concatenate `sequences`, taking the value at `indices[k]` of `sequences[k]`.
    ///
    /// # Errors
    ///
    /// Fails when the slices differ in length or an index is outside its
    /// component.
    pub fn new(sequences: &[Sequence], indices: &[usize]) -> Result<Self, SequenceError> {
        if sequences.len() != indices.len() {
            return Err(SequenceError::TupleShape {
                sequences: sequences.len(),
                indices: indices.len(),
            });
        }
        let mut output_indices = Vec::with_capacity(indices.len());
        let mut start = 0;
        for (s, &i) in sequences.iter().zip(indices) {
            if i >= s.size() {
                return Err(SequenceError::IndexOutOfRange {
                    index: i,
                    size: s.size(),
                });
            }
            output_indices.push(start + i);
            start += s.size();
        }
        Ok(Self {
            sequence: Sequence::concatenate(sequences),
            output_indices,
        })
    }

    /// Sample `length` components from `candidates`, each contributing a
    /// random value of `element` from its last statement.
    ///
    /// Returns `None` when there are no candidates or a sampled candidate
    /// has no such value.
    pub fn create_elements_sequence(
        candidates: &SequenceView<'_>,
        element: &Type,
        length: usize,
        rng: &mut Rand,
    ) -> Option<Self> {
        if candidates.is_empty() {
            return None;
        }
        let mut sequences = Vec::with_capacity(length);
        let mut indices = Vec::with_capacity(length);
        for _ in 0..length {
            let s = candidates.choose(rng)?;
            let var = s
                .random_variable_for_type_last_statement(element, false, rng)
                .ok()?;
            indices.push(var.index());
            sequences.push(s.clone());
        }
        let tuple = Self::new(&sequences, &indices).ok();
        debug_assert!(tuple.is_some());
        tuple
    }

    /// Sample a tuple as [`TupleSequence::create_elements_sequence`] does
    /// and build an array of its elements.
    ///
    /// # Errors
    ///
    /// Fails when `element` can not be an array element type.
    pub fn create_array_sequence(
        candidates: &SequenceView<'_>,
        element: &Type,
        length: usize,
        rng: &mut Rand,
    ) -> Result<Option<Sequence>, SequenceError> {
        let op = Operation::array_creation(element.clone(), length)?;
        match Self::create_elements_sequence(candidates, element, length, rng) {
            None => Ok(None),
            Some(tuple) => Sequence::create_from_tuple(op, &tuple).map(Some),
        }
    }

    /// The concatenated sequence.
    #[must_use]
    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    /// Position of each component's chosen value in [`TupleSequence::sequence`].
    #[must_use]
    pub fn output_indices(&self) -> &[usize] {
        &self.output_indices
    }

    /// The chosen values, in component order.
    #[must_use]
    pub fn elements(&self) -> Vec<Variable<'_>> {
        self.output_indices
            .iter()
            .map(|&i| Variable::new(&self.sequence, i))
            .collect()
    }
}
