// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use alloc::sync::Arc;

use crate::Statement;

/// Persistent list of statements with structural sharing.
///
/// `push` and `concat` never copy existing statements; all lists derived
/// from one another share their nodes.
#[derive(Debug, Clone)]
pub(crate) struct StatementList {
    node: Arc<Node>,
}

#[derive(Debug)]
enum Node {
    Leaf(Vec<Arc<Statement>>),
    Append {
        prefix: StatementList,
        last: Arc<Statement>,
        len: usize,
    },
    Concat {
        parts: Vec<StatementList>,
        // Start position of each part.
        starts: Vec<usize>,
        len: usize,
    },
}

impl Default for StatementList {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementList {
    pub(crate) fn new() -> Self {
        Self {
            node: Arc::new(Node::Leaf(Vec::new())),
        }
    }

    fn from_node(node: Node) -> Self {
        Self {
            node: Arc::new(node),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match &*self.node {
            Node::Leaf(v) => v.len(),
            Node::Append { len, .. } | Node::Concat { len, .. } => *len,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Do both lists share the same root node?
    pub(crate) fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    pub(crate) fn push(&self, statement: Arc<Statement>) -> Self {
        Self::from_node(Node::Append {
            prefix: self.clone(),
            last: statement,
            len: self.len() + 1,
        })
    }

    pub(crate) fn concat(lists: &[Self]) -> Self {
        let parts: Vec<Self> = lists.iter().filter(|l| !l.is_empty()).cloned().collect();
        match parts.len() {
            0 => Self::new(),
            1 => parts[0].clone(),
            _ => {
                let mut starts = Vec::with_capacity(parts.len());
                let mut len = 0;
                for p in &parts {
                    starts.push(len);
                    len += p.len();
                }
                Self::from_node(Node::Concat { parts, starts, len })
            }
        }
    }

    /// Statement at `i`, or `None` when out of range.
    pub(crate) fn get(&self, mut i: usize) -> Option<&Arc<Statement>> {
        if i >= self.len() {
            return None;
        }
        let mut node = &*self.node;
        loop {
            match node {
                Node::Leaf(v) => return v.get(i),
                Node::Append { prefix, last, len } => {
                    if i + 1 == *len {
                        return Some(last);
                    }
                    node = &prefix.node;
                }
                Node::Concat { parts, starts, .. } => {
                    let p = starts.partition_point(|&s| s <= i) - 1;
                    i -= starts[p];
                    node = &parts[p].node;
                }
            }
        }
    }

    /// First `n` statements.
    pub(crate) fn prefix(&self, n: usize) -> Self {
        debug_assert!(n <= self.len());
        if n >= self.len() {
            return self.clone();
        }
        if n == 0 {
            return Self::new();
        }
        match &*self.node {
            Node::Leaf(v) => Self::from_node(Node::Leaf(v[..n].to_vec())),
            Node::Append { prefix, .. } => prefix.prefix(n),
            Node::Concat { parts, starts, .. } => {
                let p = starts.partition_point(|&s| s < n) - 1;
                let mut head: Vec<Self> = parts[..p].to_vec();
                head.push(parts[p].prefix(n - starts[p]));
                Self::concat(&head)
            }
        }
    }

    /// All statements in order, in linear time.
    pub(crate) fn to_vec(&self) -> Vec<Arc<Statement>> {
        enum Item<'a> {
            List(&'a StatementList),
            One(&'a Arc<Statement>),
        }
        let mut out = Vec::with_capacity(self.len());
        let mut stack = vec![Item::List(self)];
        while let Some(item) = stack.pop() {
            match item {
                Item::One(s) => out.push(Arc::clone(s)),
                Item::List(l) => match &*l.node {
                    Node::Leaf(v) => out.extend(v.iter().cloned()),
                    Node::Append { prefix, last, .. } => {
                        stack.push(Item::One(last));
                        stack.push(Item::List(prefix));
                    }
                    Node::Concat { parts, .. } => {
                        stack.extend(parts.iter().rev().map(Item::List));
                    }
                },
            }
        }
        debug_assert_eq!(out.len(), self.len());
        out
    }
}

impl FromIterator<Arc<Statement>> for StatementList {
    fn from_iter<I: IntoIterator<Item = Arc<Statement>>>(iter: I) -> Self {
        Self::from_node(Node::Leaf(iter.into_iter().collect()))
    }
}

#[cfg(test)]
mod tests {
    use chaos_theory::{check, make};

    use super::*;
    use crate::{Operation, Value};

    fn lit(i: i32) -> Arc<Statement> {
        let op = Operation::literal(crate::Type::int(), Value::Int(i)).unwrap();
        Arc::new(Statement::new(op, Box::new([])))
    }

    fn ints(l: &StatementList) -> Vec<i32> {
        l.to_vec()
            .iter()
            .map(|s| s.operation().literal_value().unwrap().as_int().unwrap())
            .collect()
    }

    fn build(values: &[i32]) -> StatementList {
        values
            .iter()
            .fold(StatementList::new(), |l, &v| l.push(lit(v)))
    }

    #[test]
    fn get_matches_to_vec() {
        check(|src| {
            let a: Vec<i32> = src.any_of("a", make::vec(make::int_in_range(0..100)));
            let b: Vec<i32> = src.any_of("b", make::vec(make::int_in_range(0..100)));
            let c: Vec<i32> = src.any("c");
            let leaf: StatementList = c.iter().map(|&v| lit(v)).collect();
            let l = StatementList::concat(&[build(&a), leaf, build(&b)]).push(lit(-1));
            let all = ints(&l);
            assert_eq!(all.len(), l.len());
            for (i, v) in all.iter().enumerate() {
                let s = l.get(i).unwrap();
                assert_eq!(s.operation().literal_value(), Some(&Value::Int(*v)));
            }
            assert!(l.get(l.len()).is_none());
            let n = src.any_of("n", make::int_in_range(0..=l.len()));
            assert_eq!(ints(&l.prefix(n)), all[..n]);
        });
    }

    #[test]
    fn structural_sharing() {
        let base = build(&[1, 2, 3]);
        let a = base.push(lit(4));
        let b = base.push(lit(5));
        assert_eq!(ints(&a), [1, 2, 3, 4]);
        assert_eq!(ints(&b), [1, 2, 3, 5]);
        assert!(Arc::ptr_eq(a.get(0).unwrap(), b.get(0).unwrap()));
        assert!(a.prefix(3).same_as(&base));
    }

    #[test]
    fn concat_skips_empty() {
        let a = build(&[1]);
        let c = StatementList::concat(&[StatementList::new(), a.clone(), StatementList::new()]);
        assert!(c.same_as(&a));
        assert!(StatementList::concat(&[]).is_empty());
    }
}
