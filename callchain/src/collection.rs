// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use alloc::{collections::BTreeSet, sync::Arc};
use core::fmt;

use crate::{Map, Rand, Sequence, Set, Type, config::debug_checks_enabled};

/// Pool of sequences indexed by the types of the values their last
/// statement touches.
///
/// A sequence is stored under the exact declared type of each active
/// variable of its last statement. Subtype-compatible lookups go through an
/// index of stored types that caches, per query type, the stored types
/// assignable to it.
#[derive(Default)]
pub struct SequenceCollection {
    by_type: Map<Type, Vec<Sequence>>,
    index: TypeIndex,
    known: BTreeSet<Type>,
    supertypes: Map<Type, Arc<[Type]>>,
    count: usize,
}

/// Stored types in insertion order, with cached assignability queries.
#[derive(Default)]
struct TypeIndex {
    types: Vec<Type>,
    present: Set<Type>,
    matches: Map<Type, Vec<Type>>,
}

impl TypeIndex {
    fn add(&mut self, ty: &Type) {
        if !self.present.insert(ty.clone()) {
            return;
        }
        self.types.push(ty.clone());
        for (query, m) in &mut self.matches {
            if query.is_assignable_from(ty) {
                m.push(ty.clone());
            }
        }
    }

    /// Stored types assignable to `query`.
    fn matches(&mut self, query: &Type) -> &[Type] {
        let types = &self.types;
        self.matches.entry(query.clone()).or_insert_with(|| {
            types
                .iter()
                .filter(|t| query.is_assignable_from(t))
                .cloned()
                .collect()
        })
    }

    fn len(&self) -> usize {
        self.types.len()
    }

    fn contains(&self, ty: &Type) -> bool {
        self.present.contains(ty)
    }
}

impl SequenceCollection {
    /// Empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection holding `sequences`.
    pub fn with_sequences<'a>(sequences: impl IntoIterator<Item = &'a Sequence>) -> Self {
        let mut c = Self::new();
        c.add_all(sequences);
        c
    }

    /// Number of registrations: a sequence stored under two types counts twice.
    #[must_use]
    pub fn size(&self) -> usize {
        self.count
    }

    /// Remove every sequence and forget all known types.
    pub fn clear(&mut self) {
        log::debug!(target: "callchain::collection", "clearing sequence collection");
        *self = Self::default();
    }

    /// Store `sequence` under the type of each active variable of its last
    /// statement. A type is registered at most once per call.
    pub fn add(&mut self, sequence: &Sequence) {
        let mut registered: Vec<Type> = Vec::new();
        for var in sequence.last_statement_variables() {
            if !sequence.is_active(var.index()) {
                continue;
            }
            let ty = var.ty();
            if registered.contains(&ty) {
                continue;
            }
            self.register_type(&ty);
            let list = self.by_type.entry(ty.clone()).or_default();
            list.push(sequence.clone());
            log::trace!(
                target: "callchain::collection",
                "adding sequence #{} of type {ty} of length {}",
                list.len(),
                sequence.size()
            );
            self.count += 1;
            registered.push(ty);
        }
        self.check_rep();
    }

    /// [`SequenceCollection::add`] each of `sequences`.
    pub fn add_all<'a>(&mut self, sequences: impl IntoIterator<Item = &'a Sequence>) {
        for s in sequences {
            self.add(s);
        }
    }

    /// Add every sequence stored in `other`.
    pub fn add_collection(&mut self, other: &Self) {
        self.add_all(other.all_sequences());
    }

    fn register_type(&mut self, ty: &Type) {
        self.known.insert(ty.clone());
        if ty.is_class_or_interface() {
            let supers = self.supertypes_of(ty);
            self.known.extend(supers.iter().cloned());
        }
        self.index.add(ty);
    }

    fn supertypes_of(&mut self, ty: &Type) -> Arc<[Type]> {
        Arc::clone(
            self.supertypes
                .entry(ty.clone())
                .or_insert_with(|| ty.all_supertypes().into()),
        )
    }

    /// Sequences producing a value usable as `ty`.
    ///
    /// With `exact`, only sequences stored under `ty` itself. Otherwise all
    /// sequences stored under types assignable to `ty`; `only_receivers`
    /// then drops primitive and string types.
    pub fn get_sequences_for_type(
        &mut self,
        ty: &Type,
        exact: bool,
        only_receivers: bool,
    ) -> SequenceView<'_> {
        let mut parts: Vec<&[Sequence]> = Vec::new();
        if exact {
            if let Some(list) = self.by_type.get(ty) {
                parts.push(list);
            }
        } else {
            for t in self.index.matches(ty) {
                if only_receivers && t.is_nonreceiver_type() {
                    continue;
                }
                if let Some(list) = self.by_type.get(t) {
                    parts.push(list);
                }
            }
        }
        let view = SequenceView::new(parts);
        log::trace!(
            target: "callchain::collection",
            "get_sequences_for_type({ty}, exact: {exact}, only_receivers: {only_receivers}) => {} sequences",
            view.len()
        );
        view
    }

    /// Every stored sequence once, in registration order.
    #[must_use]
    pub fn all_sequences(&self) -> Vec<&Sequence> {
        let mut seen: Set<&Sequence> = Set::default();
        self.index
            .types
            .iter()
            .filter_map(|t| self.by_type.get(t))
            .flatten()
            .filter(|s| seen.insert(*s))
            .collect()
    }

    /// Stored types and the supertypes of stored classes and interfaces, by name.
    pub fn known_types(&self) -> impl Iterator<Item = &Type> {
        self.known.iter()
    }

    /// Dump the collection to the debug log.
    pub fn log(&self) {
        if !log::log_enabled!(target: "callchain::collection", log::Level::Debug) {
            return;
        }
        for ty in &self.index.types {
            let list = self.by_type.get(ty).map_or(&[][..], Vec::as_slice);
            log::debug!(target: "callchain::collection", "type {ty}: {} sequences", list.len());
            for (i, s) in list.iter().enumerate() {
                log::debug!(
                    target: "callchain::collection",
                    "  #{i}: {}",
                    s.to_string().trim().replace('\n', "\n       ")
                );
            }
        }
    }

    fn check_rep(&self) {
        if !debug_checks_enabled() {
            return;
        }
        let consistent = self.by_type.len() == self.index.len()
            && self.by_type.keys().all(|t| self.index.contains(t));
        if !consistent {
            unreachable!(
                "internal error: stored types {:?} disagree with type index {:?}",
                self.by_type.keys().collect::<Vec<_>>(),
                self.index.types
            );
        }
    }
}

impl fmt::Debug for SequenceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceCollection")
            .field("types", &self.index.types)
            .field("size", &self.count)
            .finish_non_exhaustive()
    }
}

/// Lazy concatenation of stored sequence lists.
#[derive(Debug, Clone, Default)]
pub struct SequenceView<'a> {
    parts: Vec<&'a [Sequence]>,
    len: usize,
}

impl<'a> SequenceView<'a> {
    fn new(parts: Vec<&'a [Sequence]>) -> Self {
        let len = parts.iter().map(|p| p.len()).sum();
        Self { parts, len }
    }

    /// Number of sequences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// No sequences?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sequence at position `i` of the concatenation.
    #[must_use]
    pub fn get(&self, mut i: usize) -> Option<&'a Sequence> {
        for p in &self.parts {
            if i < p.len() {
                return p.get(i);
            }
            i -= p.len();
        }
        None
    }

    /// Uniformly random sequence.
    pub fn choose(&self, rng: &mut Rand) -> Option<&'a Sequence> {
        if self.is_empty() {
            return None;
        }
        self.get(rng.next_below(self.len))
    }

    /// All sequences in order.
    pub fn iter(&self) -> impl Iterator<Item = &'a Sequence> + '_ {
        self.parts.iter().flat_map(|p| p.iter())
    }

    /// Does the view contain a sequence equal to `s`?
    #[must_use]
    pub fn contains(&self, s: &Sequence) -> bool {
        self.iter().any(|x| x == s)
    }
}

#[cfg(test)]
mod tests {
    use chaos_theory::check;

    use super::*;
    use crate::{Value, tests::Fixture};

    #[test]
    fn exact_and_subtype_retrieval() {
        let fx = Fixture::new();
        let bar = fx.bar_sequence();
        let mut c = SequenceCollection::new();
        c.add(&bar);
        assert!(c.get_sequences_for_type(&fx.bar, true, false).contains(&bar));
        assert!(c.get_sequences_for_type(&fx.foo, true, false).is_empty());
        assert!(c.get_sequences_for_type(&fx.foo, false, false).contains(&bar));
        assert!(c.get_sequences_for_type(&fx.shape, false, true).contains(&bar));
        assert!(c.get_sequences_for_type(&Type::object(), false, true).contains(&bar));
        assert!(c.get_sequences_for_type(&Type::int(), false, false).is_empty());
    }

    #[test]
    fn cached_queries_see_later_additions() {
        let fx = Fixture::new();
        let mut c = SequenceCollection::new();
        assert!(c.get_sequences_for_type(&fx.shape, false, false).is_empty());
        c.add(&fx.foo_sequence());
        assert_eq!(c.get_sequences_for_type(&fx.shape, false, false).len(), 1);
        c.add(&fx.bar_sequence());
        assert_eq!(c.get_sequences_for_type(&fx.shape, false, false).len(), 2);
        assert_eq!(c.get_sequences_for_type(&fx.bar, false, false).len(), 1);
    }

    #[test]
    fn primitives_widen_and_are_not_receivers() {
        let mut c = SequenceCollection::new();
        let i = Sequence::for_primitive(Value::Int(3)).unwrap();
        c.add(&i);
        let long = Type::primitive(crate::Primitive::Long);
        assert!(c.get_sequences_for_type(&long, false, false).contains(&i));
        assert!(c.get_sequences_for_type(&long, true, false).is_empty());
        assert!(c.get_sequences_for_type(&long, false, true).is_empty());
        assert!(c.get_sequences_for_type(&Type::object(), false, false).is_empty());
    }

    #[test]
    fn inactive_values_not_indexed() {
        let fx = Fixture::new();
        let mut s = fx.foo_sequence();
        s.clear_active_flag(1);
        let mut c = SequenceCollection::new();
        c.add(&s);
        assert_eq!(c.size(), 1);
        assert!(c.get_sequences_for_type(&fx.foo, false, false).is_empty());
        assert!(c.get_sequences_for_type(&Type::int(), true, false).contains(&s));
    }

    #[test]
    fn type_registered_once_per_add() {
        let fx = Fixture::new();
        let max = fx.op("method : static Foo.max(int,int)");
        let s = Sequence::create(
            max,
            &[
                Sequence::for_primitive(Value::Int(1)).unwrap(),
                Sequence::for_primitive(Value::Int(2)).unwrap(),
            ],
            &[0, 1],
        )
        .unwrap();
        assert_eq!(s.last_statement_variables().len(), 3);
        let mut c = SequenceCollection::new();
        c.add(&s);
        assert_eq!(c.size(), 1);
        assert_eq!(c.get_sequences_for_type(&Type::int(), true, false).len(), 1);
    }

    #[test]
    fn every_registered_type() {
        let fx = Fixture::new();
        let add = fx.op("method : Foo.add(int)");
        let s = fx.foo_sequence();
        let s = s
            .extend(add, &[s.variable(1).unwrap(), s.variable(0).unwrap()])
            .unwrap();
        let mut c = SequenceCollection::new();
        c.add(&s);
        // `add` returns void: the receiver and the argument are registered.
        assert_eq!(c.size(), 2);
        assert!(c.get_sequences_for_type(&fx.foo, true, false).contains(&s));
        assert!(c.get_sequences_for_type(&Type::int(), true, false).contains(&s));
    }

    #[test]
    fn bookkeeping() {
        let fx = Fixture::new();
        let mut c = SequenceCollection::with_sequences(&[fx.bar_sequence(), fx.foo_sequence()]);
        // The Foo sequence is also stored under its `int` argument.
        assert_eq!(c.size(), 3);
        assert_eq!(c.all_sequences().len(), 2);
        let known: Vec<&str> = c.known_types().map(Type::name).collect();
        assert_eq!(known, ["Bar", "Foo", "Object", "Shape", "int"]);

        let mut d = SequenceCollection::new();
        d.add_collection(&c);
        d.add_collection(&c);
        assert_eq!(d.size(), 6);
        assert_eq!(d.all_sequences().len(), 2);
        c.log();
        c.clear();
        assert_eq!(c.size(), 0);
        assert_eq!(c.known_types().count(), 0);
        assert!(c.get_sequences_for_type(&fx.foo, false, false).is_empty());
    }

    #[test]
    fn merged_sequence_stored_once_per_type() {
        let fx = Fixture::new();
        let s = fx.foo_sequence();
        let c = SequenceCollection::with_sequences([&s]);
        let mut d = SequenceCollection::new();
        d.add_collection(&c);
        assert_eq!(d.size(), 2);
        assert_eq!(d.get_sequences_for_type(&fx.foo, true, false).len(), 1);
        assert_eq!(d.get_sequences_for_type(&Type::int(), true, false).len(), 1);
    }

    #[test]
    fn view_indexing() {
        let fx = Fixture::new();
        let mut c = SequenceCollection::new();
        c.add_all(&[fx.foo_sequence(), fx.bar_sequence(), fx.foo_sequence()]);
        let view = c.get_sequences_for_type(&fx.foo, false, false);
        assert_eq!(view.len(), 3);
        let all: Vec<&Sequence> = view.iter().collect();
        for (i, s) in all.iter().enumerate() {
            assert_eq!(view.get(i), Some(*s));
        }
        assert!(view.get(3).is_none());
        let mut rng = Rand::new(7);
        assert!(view.choose(&mut rng).is_some());
    }

    #[test]
    fn retrieval_matches_assignability() {
        let fx = Fixture::new();
        check(|src| {
            let mut c = SequenceCollection::new();
            let mut added = Vec::new();
            for _ in 0..src.any_of("n", chaos_theory::make::int_in_range(1..6usize)) {
                let s = fx.any_sequence(src);
                c.add(&s);
                added.push(s);
            }
            for s in &added {
                for var in s.last_statement_variables() {
                    let ty = var.ty();
                    assert!(c.get_sequences_for_type(&ty, true, false).contains(s));
                    for sup in ty.all_supertypes() {
                        assert!(c.get_sequences_for_type(&sup, false, false).contains(s));
                    }
                }
            }
        });
    }
}
