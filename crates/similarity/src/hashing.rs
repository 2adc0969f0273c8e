//! Universal hash family `h(x) = (a*x + b) mod R` and the run's random source.

use crate::config::{validate_hash_count, validate_modulus};
use crate::error::{Result, SimilarityError};
use crate::types::MemberId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Random source for one run: seeded when reproducibility matters,
/// OS-seeded otherwise.
pub fn run_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// One hash function descriptor `(a, b)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashFunction {
    pub a: u64,
    pub b: u64,
}

impl HashFunction {
    /// `(a*x + b) mod modulus`, computed in 128 bits so it cannot overflow
    #[inline]
    pub fn hash(&self, x: MemberId, modulus: u64) -> u64 {
        ((self.a as u128 * x as u128 + self.b as u128) % modulus as u128) as u64
    }
}

/// The pool of hash functions used for every signature of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashFamily {
    modulus: u64,
    functions: Vec<HashFunction>,
}

impl HashFamily {
    /// Sample `num_hash_functions` descriptors from `[0, modulus)`.
    ///
    /// The `a` coefficients are distinct among themselves, and so are the
    /// `b` coefficients; the two lists are independent, so a repeated
    /// `(a, b)` pair is impossible but equal hash outputs are not.
    ///
    /// Descriptors are drawn position by position, which makes the pool
    /// prefix-stable: with the same seed, the first `k` descriptors are
    /// identical for every pool size of at least `k`.
    pub fn sample<R: Rng>(
        num_hash_functions: usize,
        modulus: u64,
        rng: &mut R,
    ) -> Result<Self> {
        validate_modulus(modulus)?;
        validate_hash_count(num_hash_functions, modulus)?;

        let mut used_a = HashSet::with_capacity(num_hash_functions);
        let mut used_b = HashSet::with_capacity(num_hash_functions);
        let mut functions = Vec::with_capacity(num_hash_functions);
        for _ in 0..num_hash_functions {
            let a = draw_unused(rng, modulus, &mut used_a);
            let b = draw_unused(rng, modulus, &mut used_b);
            functions.push(HashFunction { a, b });
        }

        Ok(Self { modulus, functions })
    }

    /// Use explicit descriptors instead of sampling them
    pub fn from_functions(functions: Vec<HashFunction>, modulus: u64) -> Result<Self> {
        validate_modulus(modulus)?;
        validate_hash_count(functions.len(), modulus)?;
        if let Some(bad) = functions.iter().find(|f| f.a >= modulus || f.b >= modulus) {
            return Err(SimilarityError::config(
                "hash_functions",
                format!("({}, {}) has a coefficient outside [0, {})", bad.a, bad.b, modulus),
            ));
        }
        Ok(Self { modulus, functions })
    }

    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    /// Initial value of every signature slot; larger than any hash value
    pub fn sentinel(&self) -> u64 {
        self.modulus + 1
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn functions(&self) -> &[HashFunction] {
        &self.functions
    }
}

fn draw_unused<R: Rng>(rng: &mut R, modulus: u64, used: &mut HashSet<u64>) -> u64 {
    loop {
        let value = rng.random_range(0..modulus);
        if used.insert(value) {
            return value;
        }
    }
}
