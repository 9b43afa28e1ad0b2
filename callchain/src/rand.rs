// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Seeded pseudo-random number generator used for variable and component selection.
///
/// Selection is reproducible: the same seed and the same sequence of calls
/// yield the same choices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rand {
    seed: u64,
}

impl Rand {
    /// Create a generator from a 64-bit seed.
    #[must_use]
    pub fn new(mut seed: u64) -> Self {
        Self {
            seed: splitmix64(&mut seed),
        }
    }

    /// Create a generator with a fresh, process-random seed.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::new(random_seed())
    }

    /// Next raw 64-bit output (wyrand).
    pub fn next_u64(&mut self) -> u64 {
        self.seed = self.seed.wrapping_add(0x2d358dccaa6c78a5);
        let (lo, hi) = wide_mul(self.seed, self.seed ^ 0x8bb84b93962eacc9);
        lo ^ hi
    }

    /// Uniform index in `0..n`.
    ///
    /// # Panics
    ///
    /// Panics in debug builds when `n` is zero.
    pub fn next_below(&mut self, n: usize) -> usize {
        fast_reduce_u64(self.next_u64(), n as u64) as usize
    }

    /// Pick a uniformly random element of a non-empty slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        if items.len() == 1 {
            return items.first();
        }
        items.get(self.next_below(items.len()))
    }
}

pub(crate) fn random_seed() -> u64 {
    use core::hash::{BuildHasher as _, Hasher as _};
    use std::collections::hash_map::RandomState;
    RandomState::new().build_hasher().finish()
}

// https://prng.di.unimi.it/splitmix64.c
fn splitmix64(x: &mut u64) -> u64 {
    *x = x.wrapping_add(0x9e3779b97f4a7c15);
    let mut z = *x;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

fn wide_mul(a: u64, b: u64) -> (u64, u64) {
    let m = u128::from(a).wrapping_mul(u128::from(b));
    (m as u64, (m >> 64) as u64)
}

fn fast_reduce_u64(r: u64, n: u64) -> u64 {
    debug_assert_ne!(n, 0);
    let (_, hi) = wide_mul(n, r);
    hi
}
