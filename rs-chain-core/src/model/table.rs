use std::collections::BTreeMap;

use rand::Rng;

use super::state::State;
use super::transition::{Token, Transition};

/// In-memory transition table of one partition.
///
/// # Responsibilities
/// - Accumulate transition counts per predecessor
/// - Sample a successor given a predecessor
/// - Merge with another table (parallel corpus import)
/// - Convert to and from the persisted row layout
///
/// # Invariants
/// - At most one count per `(predecessor, successor)` pair
/// - Counts never decrease
#[derive(Clone, Debug, Default)]
pub(crate) struct TransitionTable {
	/// Mapping from a predecessor to its observed successors
	states: BTreeMap<Token, State>,
}

impl TransitionTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a table from persisted rows.
	///
	/// Duplicate pairs are folded together by summing their frequencies, so
	/// the uniqueness invariant holds even for hand-edited or legacy files.
	pub fn from_rows(rows: Vec<Transition>) -> Self {
		let mut table = Self::new();
		for row in rows {
			table.add(row.predecessor.into(), row.successor.into(), row.frequency);
		}
		table
	}

	/// Exports the table as rows ordered by predecessor then successor.
	pub fn rows(&self) -> Vec<Transition> {
		self.states
			.iter()
			.flat_map(|(predecessor, state)| {
				state.successors().map(move |(successor, frequency)| {
					Transition::new(predecessor.clone(), successor.clone(), frequency)
				})
			})
			.collect()
	}

	/// Records one observation of `predecessor → successor` and returns the
	/// new frequency.
	pub fn record(&mut self, predecessor: Token, successor: Token) -> u64 {
		self.add(predecessor, successor, 1)
	}

	/// Adds `occurrences` observations of a pair.
	pub fn add(&mut self, predecessor: Token, successor: Token, occurrences: u64) -> u64 {
		self.states.entry(predecessor).or_default().add(successor, occurrences)
	}

	pub fn frequency(&self, predecessor: &Token, successor: &Token) -> u64 {
		self.states.get(predecessor).map_or(0, |state| state.frequency(successor))
	}

	/// Samples a successor of `predecessor`, weighted by frequency.
	///
	/// Returns `None` if the predecessor was never observed.
	pub fn sample<R: Rng>(&self, predecessor: &Token, rng: &mut R) -> Option<Token> {
		self.states.get(predecessor)?.predict(rng).cloned()
	}

	/// Number of distinct `(predecessor, successor)` pairs.
	pub fn len(&self) -> usize {
		self.states.values().map(State::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.states.is_empty()
	}

	/// Merges another table into this one. Counts of matching pairs are summed.
	pub fn merge(&mut self, other: &Self) {
		for (predecessor, state) in &other.states {
			let existing = self.states.entry(predecessor.clone()).or_default();
			for (successor, frequency) in state.successors() {
				existing.add(successor.clone(), frequency);
			}
		}
	}
}
