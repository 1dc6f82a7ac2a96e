use rand::Rng;

use crate::error::{ChainError, Result};
use crate::model::store::FrequencyStore;
use crate::model::transition::Token;

/// Default bound on the number of successors a single walk may sample.
pub const DEFAULT_MAX_STEPS: usize = 100;

/// Where a length-enforced chain starts.
///
/// # Variants
/// - `Random`: the first word is sampled among the phrase openers.
/// - `Word(w)`: the phrase starts with `w`.
/// - `Pair(w1, w2)`: the phrase starts with `w1 w2`, which must be a
///   recorded transition.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainStart {
	Random,
	Word(String),
	Pair(String, String),
}

impl ChainStart {
	/// Builds a start from an optional seed of zero, one or two words.
	///
	/// # Errors
	/// Returns `InvalidSeed` for a seed of more than two words.
	pub fn from_seed(seed: Option<&str>) -> Result<Self> {
		let words: Vec<&str> = seed.map(|s| s.split_whitespace().collect()).unwrap_or_default();
		match words.as_slice() {
			[] => Ok(ChainStart::Random),
			[word] => Ok(ChainStart::Word((*word).to_owned())),
			[first, second] => Ok(ChainStart::Pair((*first).to_owned(), (*second).to_owned())),
			_ => Err(ChainError::InvalidSeed(format!(
				"expected at most two words, got {}",
				words.len()
			))),
		}
	}
}

/// Outcome of a single walk.
enum Walk {
	/// The chain reached the boundary or ran out of data.
	Complete(Vec<String>),
	/// The step bound was hit; the words so far.
	Truncated(Vec<String>),
}

/// Builds phrases by walking the transitions of a partition.
///
/// The transition graph may contain cycles that never reach the boundary,
/// so every walk is bounded by `max_steps` samples. Sampling the opening
/// word of an unseeded phrase counts as one of them.
#[derive(Debug, Clone, Copy)]
pub struct ChainWalker {
	max_steps: usize,
}

impl Default for ChainWalker {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_STEPS)
	}
}

impl ChainWalker {
	/// Creates a walker. A bound of 0 is raised to 1.
	pub fn new(max_steps: usize) -> Self {
		Self { max_steps: max_steps.max(1) }
	}

	pub fn max_steps(&self) -> usize {
		self.max_steps
	}

	/// Builds a phrase, optionally starting from `seed`.
	///
	/// - Without a seed the first word is sampled after the boundary; an
	///   empty partition gives an empty phrase.
	/// - With a seed the phrase starts with it.
	/// - Walking stops at the boundary or when the last word has no recorded
	///   successor.
	/// - Hitting the step bound is logged and the phrase built so far is
	///   returned. An unseeded phrase has at most `max_steps` words.
	///
	/// Only storage failures are reported as errors.
	pub fn build_phrase(&self, store: &FrequencyStore, partition: &str, seed: Option<&str>) -> Result<String> {
		self.build_phrase_with(store, partition, seed, &mut rand::rng())
	}

	/// Same as [`build_phrase`](Self::build_phrase) with an explicit random source.
	pub fn build_phrase_with<R: Rng>(
		&self,
		store: &FrequencyStore,
		partition: &str,
		seed: Option<&str>,
		rng: &mut R,
	) -> Result<String> {
		let (words, steps) = match seed {
			Some(seed) => (vec![seed.to_owned()], self.max_steps),
			None => match store.sample_successor_with(partition, &Token::Boundary, rng)? {
				Some(Token::Word(first)) => (vec![first], self.max_steps - 1),
				// No phrase openers recorded
				_ => return Ok(String::new()),
			},
		};

		let words = match self.walk(store, partition, words, steps, false, rng)? {
			Walk::Complete(words) => words,
			Walk::Truncated(words) => {
				log::warn!(
					"{partition}: {}, returning the first {} words",
					ChainError::ChainOverflow { max_steps: self.max_steps },
					words.len()
				);
				words
			}
		};
		Ok(words.join(" "))
	}

	/// Builds a phrase of at least `min_length` words, retrying up to
	/// `max_attempts` times.
	///
	/// Unlike [`build_phrase`](Self::build_phrase), a missing link is an
	/// error here:
	/// - `NoData` when a random start finds no phrase opener
	/// - `BrokenLink` when a start pair was never observed, or when a word
	///   has no successor at all (not even the boundary)
	/// - `InsufficientLength` when every attempt came out too short
	///
	/// A walk cut by the step bound counts as an attempt of the length it
	/// reached.
	pub fn build_with_min_length<R: Rng>(
		&self,
		store: &FrequencyStore,
		partition: &str,
		start: &ChainStart,
		min_length: u32,
		max_attempts: u32,
		rng: &mut R,
	) -> Result<String> {
		for attempt in 1..=max_attempts.max(1) {
			let (words, steps) = match start {
				ChainStart::Random => match store.sample_successor_with(partition, &Token::Boundary, rng)? {
					Some(Token::Word(first)) => (vec![first], self.max_steps - 1),
					_ => return Err(ChainError::NoData { partition: partition.to_owned() }),
				},
				ChainStart::Word(word) => (vec![word.clone()], self.max_steps),
				ChainStart::Pair(first, second) => {
					let observed = store.frequency(partition, &Token::word(first.as_str()), &Token::word(second.as_str()))?;
					if observed == 0 {
						return Err(ChainError::BrokenLink { word: first.clone() });
					}
					(vec![first.clone(), second.clone()], self.max_steps)
				}
			};

			let words = match self.walk(store, partition, words, steps, true, rng)? {
				Walk::Complete(words) | Walk::Truncated(words) => words,
			};
			if words.len() >= min_length as usize {
				return Ok(words.join(" "));
			}
			log::debug!("{partition}: attempt {attempt} gave {} words, need {min_length}", words.len());
		}

		Err(ChainError::InsufficientLength { min_length })
	}

	/// Extends `words` one sampled successor at a time, for at most `steps`
	/// samples.
	///
	/// With `strict`, a word without any successor is a `BrokenLink` instead
	/// of the end of the chain.
	fn walk<R: Rng>(
		&self,
		store: &FrequencyStore,
		partition: &str,
		mut words: Vec<String>,
		steps: usize,
		strict: bool,
		rng: &mut R,
	) -> Result<Walk> {
		for _ in 0..steps {
			let Some(current) = words.last() else {
				return Ok(Walk::Complete(words));
			};
			match store.sample_successor_with(partition, &Token::word(current.as_str()), rng)? {
				Some(Token::Word(next)) => words.push(next),
				Some(Token::Boundary) => return Ok(Walk::Complete(words)),
				None if strict => return Err(ChainError::BrokenLink { word: current.clone() }),
				None => return Ok(Walk::Complete(words)),
			}
		}
		Ok(Walk::Truncated(words))
	}
}
