//! Stopping-rule engine (spec §4.H, component H): the dynamic-programming
//! computation of `n_k`, the number of distinct flow identifiers that
//! must be probed through a load balancer before concluding, with
//! confidence `1-α`, that all of its `k` next-hop interfaces have been
//! observed.
//!
//! Modeled as the random walk spec §4.H describes: `q[j]` is the
//! probability of having observed exactly `j` distinct branches after a
//! given number of probes, assuming `k` branches are hashed to
//! uniformly. From state `j` a new probe repeats a previously-seen
//! branch with probability `j/k` or reveals a new one with probability
//! `(k-j+1)/k`; `n_k` is the first probe count at which the probability
//! of having observed all `k` branches reaches `1-α`.
//!
//! Per the design notes, double precision is insufficient once `k` grows
//! past about a dozen: the probabilities involved shrink fast enough that
//! `f64` loses the last few bits exactly where the stopping point lives.
//! We use [`rust_decimal::Decimal`], a 128-bit fixed-point rational (the
//! same crate `ob-poc` reaches for when it needs exact decimal
//! arithmetic), in its place.

use rust_decimal::Decimal;
use std::convert::TryFrom;

/// A table of `n_k` values, built once per algorithm instance at `Init`
/// and immutable thereafter (spec §3 "Stopping-rule table").
#[derive(Debug, Clone)]
pub struct StoppingRuleTable {
    /// `n[k]` for `k` in `2..=max_k`; indices `0` and `1` are unused.
    n: Vec<usize>,
    max_k: u8,
}

impl StoppingRuleTable {
    /// Builds the table for confidence `alpha` and branching bound
    /// `max_k` (spec: `K ∈ [2, 64]`).
    #[must_use]
    pub fn build(alpha: f64, max_k: u8) -> Self {
        assert!(alpha > 0.0 && alpha < 1.0, "alpha must lie in (0, 1)");
        assert!(max_k >= 2, "max_k must be at least 2");
        let threshold = Decimal::ONE - decimal_from_f64(alpha);
        let mut n = vec![0_usize; usize::from(max_k) + 1];
        for hypothesis in 2..=max_k {
            n[usize::from(hypothesis)] = stopping_point(hypothesis, threshold);
        }
        Self { n, max_k }
    }

    /// Returns `n_k`, or `0` if `k` is outside `[2, max_k]`.
    #[must_use]
    pub fn n_k(&self, k: u8) -> usize {
        if k < 2 || k > self.max_k {
            return 0;
        }
        self.n[usize::from(k)]
    }

    #[must_use]
    pub fn max_k(&self) -> u8 {
        self.max_k
    }
}

/// Computes `n_h`: the smallest probe count `i` at which the cumulative
/// probability of having discovered all `h` branches reaches `threshold`
/// (`1 - α`), assuming `h` branches are hashed to uniformly.
fn stopping_point(hypothesis: u8, threshold: Decimal) -> usize {
    let h = usize::from(hypothesis);
    let h_dec = Decimal::from(u64::try_from(h).unwrap());
    // q[j] = Pr[exactly j distinct branches observed after i probes].
    let mut q = vec![Decimal::ZERO; h + 1];
    q[1] = Decimal::ONE; // the first probe always yields exactly one branch.
    let mut i = 1_usize;
    loop {
        if q[h] >= threshold {
            return i;
        }
        i += 1;
        let mut next = vec![Decimal::ZERO; h + 1];
        for j in 1..=h {
            let stay = q[j] * Decimal::from(u64::try_from(j).unwrap()) / h_dec;
            let new_branch = if j >= 1 {
                let weight = u64::try_from(h - j + 1).unwrap();
                q[j - 1] * Decimal::from(weight) / h_dec
            } else {
                Decimal::ZERO
            };
            next[j] = stay + new_branch;
        }
        q = next;
        assert!(i < 100_000, "stopping rule failed to converge for k={hypothesis}");
    }
}

fn decimal_from_f64(value: f64) -> Decimal {
    Decimal::from_f64_retain(value).expect("alpha must be a finite decimal value")
}
