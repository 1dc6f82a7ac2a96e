use std::time::{Duration, Instant};

use rand::Rng;

use crate::chain::walker::ChainWalker;
use crate::config::RandomSpeaking;
use crate::error::Result;
use crate::model::store::FrequencyStore;

/// Cooldown state of one partition.
///
/// Owned by the caller (one per partition) and handed to
/// [`PassiveTrigger::maybe_speak`], which only updates it after a phrase was
/// actually produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerState {
	last_allowed: Instant,
}

impl TriggerState {
	/// Starts the cooldown at `now`: nothing is said spontaneously before one
	/// full throttle period has passed.
	pub fn new(now: Instant) -> Self {
		Self { last_allowed: now }
	}

	pub fn last_allowed(&self) -> Instant {
		self.last_allowed
	}
}

/// Decides whether an incoming message is answered with a spontaneous phrase.
#[derive(Debug, Clone, Copy)]
pub struct PassiveTrigger {
	probability: f64,
	throttle_time: Duration,
	max_delay: Duration,
}

impl PassiveTrigger {
	pub fn new(probability: f64, throttle_time: Duration, max_delay: Duration) -> Self {
		Self {
			probability: probability.clamp(0.0, 1.0),
			throttle_time,
			max_delay,
		}
	}

	pub fn from_config(config: &RandomSpeaking) -> Self {
		Self::new(
			config.probability,
			Duration::from_secs(config.throttle_time),
			Duration::from_secs(config.max_delay),
		)
	}

	/// Whether the cooldown allows speaking at `now`.
	///
	/// Strictly after `last_allowed + throttle_time`. An instant that cannot
	/// be represented is never reached.
	pub fn is_eligible(&self, state: &TriggerState, now: Instant) -> bool {
		state
			.last_allowed
			.checked_add(self.throttle_time)
			.is_some_and(|allowed| now > allowed)
	}

	/// Possibly builds a spontaneous phrase from a partition.
	///
	/// See [`maybe_speak_with`](Self::maybe_speak_with) for the rules.
	pub fn maybe_speak<R: Rng>(
		&self,
		state: &mut TriggerState,
		store: &FrequencyStore,
		walker: &ChainWalker,
		partition: &str,
		now: Instant,
		rng: &mut R,
	) -> Result<Option<String>> {
		self.maybe_speak_with(state, now, rng, |rng| walker.build_phrase_with(store, partition, None, rng))
	}

	/// Possibly produces a phrase with `generate`.
	///
	/// - Not eligible: `None`, no random draw.
	/// - Eligible: one uniform draw; below `probability`, `generate` runs.
	/// - A non-empty phrase is returned and the cooldown restarts at
	///   `now + uniform(0..=max_delay)`.
	/// - An empty phrase is suppressed and the state is left untouched.
	/// - Errors from `generate` propagate and the state is left untouched.
	pub fn maybe_speak_with<R, F>(&self, state: &mut TriggerState, now: Instant, rng: &mut R, generate: F) -> Result<Option<String>>
	where
		R: Rng,
		F: FnOnce(&mut R) -> Result<String>,
	{
		if !self.is_eligible(state, now) {
			return Ok(None);
		}
		let chance: f64 = rng.random();
		if chance >= self.probability {
			return Ok(None);
		}

		let phrase = generate(rng)?;
		if phrase.is_empty() {
			return Ok(None);
		}

		let delay = Duration::from_secs(rng.random_range(0..=self.max_delay.as_secs()));
		state.last_allowed = now.checked_add(delay).unwrap_or(now);
		Ok(Some(phrase))
	}
}
