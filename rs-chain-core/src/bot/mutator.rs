use rand::Rng;

/// The word substituted by the filter.
pub const BANANA: &str = "banana";

/// The word after which a substitution may happen.
const TRIGGER_WORD: &str = "the";

/// Stochastic word-substitution filter applied to outgoing messages.
///
/// A single draw per phrase decides whether the filter applies at all. When
/// it does, the word following each `the` becomes `banana`.
#[derive(Debug, Clone, Copy)]
pub struct OutputMutator {
	probability: f64,
}

impl OutputMutator {
	/// Creates a filter firing with the given probability (clamped to 0..=1).
	pub fn new(probability: f64) -> Self {
		Self { probability: probability.clamp(0.0, 1.0) }
	}

	pub fn probability(&self) -> f64 {
		self.probability
	}

	/// Mutates a phrase given as words.
	///
	/// With probability `1 - probability` the phrase is returned unchanged.
	/// Otherwise every word directly following a `the` (compared on the
	/// original word, so `the the x` becomes `the banana banana`) is
	/// replaced. A probability of 0 is the identity.
	pub fn mutate<R: Rng>(&self, words: Vec<String>, rng: &mut R) -> Vec<String> {
		let chance: f64 = rng.random();
		if chance >= self.probability {
			return words;
		}

		let mut armed = false;
		words
			.into_iter()
			.map(|word| {
				let is_trigger = word == TRIGGER_WORD;
				let out = if armed {
					armed = false;
					// Keeps the random stream aligned with one draw per substitution
					let _: f64 = rng.random();
					BANANA.to_owned()
				} else {
					word
				};
				if is_trigger {
					armed = true;
				}
				out
			})
			.collect()
	}

	/// Mutates a whitespace-separated text.
	///
	/// When the filter does not fire the text is returned byte-for-byte;
	/// when it does, words are re-joined with single spaces.
	pub fn mutate_text<R: Rng>(&self, text: &str, rng: &mut R) -> String {
		let words: Vec<String> = text.split_whitespace().map(str::to_owned).collect();
		let mutated = self.mutate(words.clone(), rng);
		if mutated == words {
			return text.to_owned();
		}
		mutated.join(" ")
	}
}
