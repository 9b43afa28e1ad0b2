// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
`callchain` is the core of a feedback-directed random test generator: immutable
call sequences with relative input addressing, a type-indexed pool of previously
built sequences, and a staged executor that classifies per-statement outcomes.
*/

extern crate alloc;

mod catalog;
mod checks;
mod collection;
mod config;
mod error;
mod executable;
mod execution;
mod operation;
mod rand;
mod sequence;
mod statement;
mod statement_list;
#[cfg(test)]
mod tests;
mod tuple;
mod types;
mod unwind;
mod util;
mod value;

pub use catalog::*;
pub use checks::*;
pub use collection::*;
pub use config::*;
pub use error::*;
pub use executable::*;
pub use execution::*;
pub use operation::*;
pub use rand::Rand;
pub use sequence::*;
pub use statement::*;
pub use tuple::*;
pub use types::*;
pub use value::*;

pub(crate) type Set<K> = std::collections::HashSet<K, rustc_hash::FxBuildHasher>;
pub(crate) type Map<K, V> = std::collections::HashMap<K, V, rustc_hash::FxBuildHasher>;
