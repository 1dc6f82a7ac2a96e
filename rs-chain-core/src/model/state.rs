use std::collections::BTreeMap;

use rand::Rng;

use super::transition::Token;

/// All observed successors of one predecessor.
///
/// Conceptually, this is a node in a Markov chain where outgoing edges
/// are weighted by their number of observations.
///
/// ## Invariants
/// - Every successor count is strictly positive once recorded
/// - Successors are kept ordered so sampling is reproducible under a seeded RNG
#[derive(Clone, Debug, Default)]
pub(crate) struct State {
	/// Example: { Boundary => 3, Word("world") => 42 }
	successors: BTreeMap<Token, u64>,
}

impl State {
	/// Adds `occurrences` observations of `successor` and returns the new count.
	///
	/// A missing successor starts at 0 before being increased.
	pub fn add(&mut self, successor: Token, occurrences: u64) -> u64 {
		let frequency = self.successors.entry(successor).or_insert(0);
		*frequency += occurrences;
		*frequency
	}

	pub fn frequency(&self, successor: &Token) -> u64 {
		self.successors.get(successor).copied().unwrap_or(0)
	}

	pub fn successors(&self) -> impl Iterator<Item = (&Token, u64)> {
		self.successors.iter().map(|(token, frequency)| (token, *frequency))
	}

	pub fn len(&self) -> usize {
		self.successors.len()
	}

	/// Picks a successor with probability proportional to its frequency.
	///
	/// Roulette selection: draw `r` in `[0, total)` then walk the successors,
	/// subtracting each frequency until `r` falls inside one bucket. A
	/// zero-frequency successor owns an empty bucket and is never returned.
	///
	/// Returns `None` if the state has no successors.
	pub fn predict<R: Rng>(&self, rng: &mut R) -> Option<&Token> {
		let total: u64 = self.successors.values().sum();
		if total == 0 {
			return None;
		}

		let mut r = rng.random_range(0..total);
		for (successor, frequency) in &self.successors {
			if r < *frequency {
				return Some(successor);
			}
			r -= frequency;
		}

		// r < total, so the loop always returns
		None
	}
}
