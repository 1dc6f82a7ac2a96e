//! Chat-facing glue: routes inbound messages to the trigger and the
//! learner, serves the generate command and filters outgoing text.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use rand::Rng;

use crate::chain::learner;
use crate::chain::walker::{ChainStart, ChainWalker};
use crate::config::{ChannelConfig, Config};
use crate::error::{ChainError, Result};
use crate::io::corpus_path;
use crate::model::store::{partition_key, FrequencyStore};

use self::mutator::OutputMutator;
use self::trigger::{PassiveTrigger, TriggerState};

/// Inbound messages and CTCP handling.
pub mod message;

/// The banana output filter.
pub mod mutator;

/// Spontaneous speech with a per-partition cooldown.
pub mod trigger;

pub use self::message::InboundMessage;

/// A chat bot learning from every channel it sees.
///
/// # Responsibilities
/// - Own the frequency store and the per-partition trigger states
/// - On each message: maybe speak first, then learn
/// - Serve the generate command, using the length-enforcing walk when the
///   channel asks for a minimum chain length
/// - Pass every outgoing phrase through the banana filter
pub struct ChainBot {
	config: Config,
	store: FrequencyStore,
	walker: ChainWalker,
	triggers: Mutex<HashMap<String, TriggerState>>,
}

impl ChainBot {
	/// Opens the store under `config.data_dir` and creates the corpus
	/// directory next to it.
	pub fn new(config: Config) -> Result<Self> {
		let store = FrequencyStore::open(&config.data_dir)?.with_flush_every(config.flush_every);
		let corpus_dir = config.corpus_dir();
		fs::create_dir_all(&corpus_dir)
			.map_err(|e| ChainError::storage(&corpus_dir.display().to_string(), e))?;
		let walker = ChainWalker::new(config.max_steps);
		Ok(Self {
			config,
			store,
			walker,
			triggers: Mutex::new(HashMap::new()),
		})
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn store(&self) -> &FrequencyStore {
		&self.store
	}

	/// Handles an inbound message at the current time.
	///
	/// Returns the filtered spontaneous reply, if any.
	pub fn on_message(&self, message: &InboundMessage) -> Result<Option<String>> {
		self.on_message_at(message, Instant::now(), &mut rand::rng())
	}

	/// Handles an inbound message at `now`.
	///
	/// The trigger runs before learning, so a message is never echoed back
	/// from its own transitions. Once a reply is produced it is returned even
	/// if learning then fails, since the cooldown already counts it.
	pub fn on_message_at<R: Rng>(&self, message: &InboundMessage, now: Instant, rng: &mut R) -> Result<Option<String>> {
		let partition = message.partition.as_str();
		let channel = self.config.channel(partition);

		let reply = self.speak_spontaneously(partition, &channel, now, rng)?;

		let learned = if channel.ignore_bot_commands && message.addressed {
			log::debug!("{partition}: not learning a message addressed to the bot");
			Ok(0)
		} else {
			learner::update(&self.store, partition, &message.tokenize())
		};
		if let Err(e) = learned {
			if reply.is_none() {
				return Err(e);
			}
			log::warn!("{partition}: replying although learning failed: {e}");
		}

		Ok(reply.map(|phrase| self.out_filter_with(partition, &phrase, rng)))
	}

	fn lock_triggers(&self, partition: &str) -> Result<MutexGuard<'_, HashMap<String, TriggerState>>> {
		self.triggers
			.lock()
			.map_err(|_| ChainError::storage(partition, "trigger state lock poisoned"))
	}

	/// Runs the trigger of `partition` on a copy of its state, so the state
	/// map is not locked while a phrase is generated.
	///
	/// The new state is written back only when a phrase was produced and no
	/// other message of the partition spoke in the meantime; otherwise the
	/// phrase is dropped.
	fn speak_spontaneously<R: Rng>(
		&self,
		partition: &str,
		channel: &ChannelConfig,
		now: Instant,
		rng: &mut R,
	) -> Result<Option<String>> {
		let key = partition_key(partition);
		let before = *self
			.lock_triggers(partition)?
			.entry(key.clone())
			.or_insert_with(|| TriggerState::new(now));
		let mut state = before;

		let trigger = PassiveTrigger::from_config(&channel.random_speaking);
		let reply = if channel.enforces_length() {
			trigger.maybe_speak_with(&mut state, now, rng, |rng| {
				match self.walker.build_with_min_length(
					&self.store,
					partition,
					&ChainStart::Random,
					channel.min_chain_length,
					channel.max_attempts,
					rng,
				) {
					Ok(phrase) => Ok(phrase),
					Err(e) if e.is_storage() => Err(e),
					Err(e) => {
						log::debug!("{partition}: not speaking spontaneously: {e}");
						Ok(String::new())
					}
				}
			})?
		} else {
			trigger.maybe_speak(&mut state, &self.store, &self.walker, partition, now, rng)?
		};
		if reply.is_none() {
			return Ok(None);
		}

		let mut triggers = self.lock_triggers(partition)?;
		let current = triggers.entry(key).or_insert(before);
		if *current != before {
			log::debug!("{partition}: another message already spoke, dropping the phrase");
			return Ok(None);
		}
		*current = state;
		Ok(reply)
	}

	/// The generate command: a filtered phrase from `partition`.
	///
	/// `seed` holds at most two words. With the default minimum length of 1
	/// the direct walk is used and never fails for lack of data; a larger
	/// `min_chain_length` switches to the retrying walk, whose failures are
	/// returned to the caller.
	pub fn generate(&self, partition: &str, seed: Option<&str>) -> Result<String> {
		self.generate_with(partition, seed, &mut rand::rng())
	}

	/// Same as [`generate`](Self::generate) with an explicit random source.
	pub fn generate_with<R: Rng>(&self, partition: &str, seed: Option<&str>, rng: &mut R) -> Result<String> {
		let channel = self.config.channel(partition);
		let start = ChainStart::from_seed(seed)?;

		let phrase = if channel.enforces_length() {
			self.walker.build_with_min_length(
				&self.store,
				partition,
				&start,
				channel.min_chain_length,
				channel.max_attempts,
				rng,
			)?
		} else {
			match start {
				ChainStart::Random => self.walker.build_phrase_with(&self.store, partition, None, rng)?,
				ChainStart::Word(word) => self.walker.build_phrase_with(&self.store, partition, Some(&word), rng)?,
				ChainStart::Pair(first, second) => {
					let rest = self.walker.build_phrase_with(&self.store, partition, Some(&second), rng)?;
					format!("{first} {rest}")
				}
			}
		};

		log::debug!("{partition}: generated {:?}", phrase);
		Ok(self.out_filter_with(partition, &phrase, rng))
	}

	/// Applies the partition's banana filter to an outgoing text.
	///
	/// CTCP ACTION messages are filtered on their body and re-wrapped.
	pub fn out_filter(&self, partition: &str, text: &str) -> String {
		self.out_filter_with(partition, text, &mut rand::rng())
	}

	/// Same as [`out_filter`](Self::out_filter) with an explicit random source.
	pub fn out_filter_with<R: Rng>(&self, partition: &str, text: &str, rng: &mut R) -> String {
		let mutator = OutputMutator::new(self.config.channel(partition).random_speaking.banana_chance);
		match message::split_action(text) {
			Some(body) => message::action(&mutator.mutate_text(body, rng)),
			None => mutator.mutate_text(text, rng),
		}
	}

	/// Bulk-learns a corpus file into a partition.
	///
	/// `name` is relative to [`Config::corpus_dir`]; anything resolving
	/// outside of it is rejected with `InvalidCorpus`.
	pub fn import(&self, partition: &str, name: &Path) -> Result<usize> {
		let corpus = corpus_path(&self.config.corpus_dir(), name).map_err(|e| ChainError::InvalidCorpus {
			name: name.display().to_string(),
			reason: e.to_string(),
		})?;
		self.store.import_corpus(partition, corpus)
	}

	/// Forgets the cooldown of a partition and closes its table.
	pub fn retire(&self, partition: &str) -> Result<()> {
		if let Ok(mut triggers) = self.triggers.lock() {
			triggers.remove(&partition_key(partition));
		}
		self.store.retire(partition)
	}

	/// Flushes and closes every partition.
	pub fn close(&self) -> Result<()> {
		self.store.close()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::RandomSpeaking;
	use crate::io::{partition_path, CORPUS_DIR};
	use crate::model::transition::Token;
	use rand::SeedableRng;
	use rand::rngs::StdRng;
	use std::time::Duration;

	fn bot_with(channel: ChannelConfig) -> (tempfile::TempDir, ChainBot) {
		let dir = tempfile::tempdir().unwrap();
		let mut config = Config::default();
		config.data_dir = dir.path().to_path_buf();
		config.flush_every = 1;
		config.defaults = channel;
		let bot = ChainBot::new(config).unwrap();
		(dir, bot)
	}

	fn quiet() -> ChannelConfig {
		ChannelConfig {
			random_speaking: RandomSpeaking { banana_chance: 0.0, ..RandomSpeaking::default() },
			..ChannelConfig::default()
		}
	}

	fn chatty() -> ChannelConfig {
		ChannelConfig {
			random_speaking: RandomSpeaking { probability: 1.0, banana_chance: 0.0, ..RandomSpeaking::default() },
			..ChannelConfig::default()
		}
	}

	#[test]
	fn messages_are_learned() {
		let (_dir, bot) = bot_with(quiet());
		let mut rng = StdRng::seed_from_u64(1);
		bot.on_message_at(&InboundMessage::new("#a", "hello world"), Instant::now(), &mut rng).unwrap();
		let frequency = bot.store().frequency("#a", &Token::word("hello"), &Token::word("world")).unwrap();
		assert_eq!(frequency, 1);
	}

	#[test]
	fn addressed_messages_can_be_ignored() {
		let (_dir, bot) = bot_with(ChannelConfig { ignore_bot_commands: true, ..quiet() });
		let mut rng = StdRng::seed_from_u64(1);
		let message = InboundMessage::new("#a", "bot: say something").addressed(true);
		bot.on_message_at(&message, Instant::now(), &mut rng).unwrap();
		assert!(bot.store().transitions("#a").unwrap().is_empty());
	}

	#[test]
	fn trigger_speaks_before_learning() {
		let (_dir, bot) = bot_with(chatty());
		let mut rng = StdRng::seed_from_u64(1);
		let start = Instant::now();
		// First message registers the partition and starts its cooldown
		let first = bot.on_message_at(&InboundMessage::new("#a", "hello world"), start, &mut rng).unwrap();
		assert_eq!(first, None);

		let later = start + Duration::from_secs(301);
		let reply = bot.on_message_at(&InboundMessage::new("#a", "good night"), later, &mut rng).unwrap();
		assert_eq!(reply.as_deref(), Some("hello world"));

		let soon = later + Duration::from_secs(5);
		let reply = bot.on_message_at(&InboundMessage::new("#a", "anyone"), soon, &mut rng).unwrap();
		assert_eq!(reply, None);
	}

	/// Turns the table file of `partition` into a non-empty directory, so
	/// writing it fails until the directory is removed.
	fn block_table(dir: &Path, partition: &str) -> std::path::PathBuf {
		let table = partition_path(dir, partition);
		fs::remove_file(&table).unwrap();
		fs::create_dir(&table).unwrap();
		fs::write(table.join("blocker"), "x").unwrap();
		table
	}

	#[test]
	fn reply_survives_a_failed_write() {
		let (dir, bot) = bot_with(chatty());
		let mut rng = StdRng::seed_from_u64(1);
		let start = Instant::now();
		bot.on_message_at(&InboundMessage::new("#a", "hello world"), start, &mut rng).unwrap();
		let table = block_table(dir.path(), "#a");

		let later = start + Duration::from_secs(301);
		let reply = bot.on_message_at(&InboundMessage::new("#a", "good night"), later, &mut rng).unwrap();
		assert_eq!(reply.as_deref(), Some("hello world"));

		// The message is still pending and reaches the disk once writable again
		fs::remove_dir_all(&table).unwrap();
		bot.close().unwrap();
		let store = FrequencyStore::open(dir.path()).unwrap();
		assert_eq!(store.frequency("#a", &Token::word("good"), &Token::word("night")).unwrap(), 1);
	}

	#[test]
	fn failed_write_without_reply_keeps_the_cooldown() {
		let (dir, bot) = bot_with(chatty());
		let mut rng = StdRng::seed_from_u64(1);
		let start = Instant::now();
		bot.on_message_at(&InboundMessage::new("#a", "hello world"), start, &mut rng).unwrap();
		let table = block_table(dir.path(), "#a");

		let soon = start + Duration::from_secs(10);
		let err = bot.on_message_at(&InboundMessage::new("#a", "good night"), soon, &mut rng).unwrap_err();
		assert!(err.is_storage());

		fs::remove_dir_all(&table).unwrap();
		let later = start + Duration::from_secs(301);
		let reply = bot.on_message_at(&InboundMessage::new("#a", "anyone here"), later, &mut rng).unwrap();
		assert!(reply.is_some());
	}

	#[test]
	fn concurrent_messages_speak_once_per_cooldown() {
		let (_dir, bot) = bot_with(chatty());
		let start = Instant::now();
		bot.on_message_at(&InboundMessage::new("#a", "hello world"), start, &mut StdRng::seed_from_u64(1))
			.unwrap();

		let later = start + Duration::from_secs(301);
		let replies = std::thread::scope(|scope| {
			let workers: Vec<_> = (0..8)
				.map(|i| {
					let bot = &bot;
					scope.spawn(move || {
						let mut rng = StdRng::seed_from_u64(i);
						bot.on_message_at(&InboundMessage::new("#a", "are you there"), later, &mut rng)
							.unwrap()
					})
				})
				.collect();
			workers.into_iter().filter_map(|worker| worker.join().unwrap()).count()
		});
		assert_eq!(replies, 1);
	}

	#[test]
	fn import_reads_only_from_the_corpus_directory() {
		let (dir, bot) = bot_with(quiet());
		fs::write(dir.path().join(CORPUS_DIR).join("log.txt"), "hello world\nhello there\n").unwrap();
		fs::write(dir.path().join("secret.txt"), "private words here now\n").unwrap();

		assert_eq!(bot.import("#a", Path::new("log.txt")).unwrap(), 2);
		assert_eq!(bot.store().frequency("#a", &Token::Boundary, &Token::word("hello")).unwrap(), 2);

		for name in ["../secret.txt", "missing.txt"] {
			let err = bot.import("#a", Path::new(name)).unwrap_err();
			assert!(matches!(err, ChainError::InvalidCorpus { .. }), "{name}: {err}");
		}
		let err = bot.import("#a", &dir.path().join("secret.txt")).unwrap_err();
		assert!(matches!(err, ChainError::InvalidCorpus { .. }));
		assert_eq!(bot.store().frequency("#a", &Token::Boundary, &Token::word("private")).unwrap(), 0);
	}

	#[test]
	fn generate_with_seed_pair() {
		let (_dir, bot) = bot_with(quiet());
		let mut rng = StdRng::seed_from_u64(1);
		bot.on_message_at(&InboundMessage::new("#a", "a b c d"), Instant::now(), &mut rng).unwrap();
		assert_eq!(bot.generate_with("#a", Some("x c"), &mut rng).unwrap(), "x c d");
	}

	#[test]
	fn length_enforcement_surfaces_errors() {
		let (_dir, bot) = bot_with(ChannelConfig { min_chain_length: 5, max_attempts: 2, ..quiet() });
		let mut rng = StdRng::seed_from_u64(1);
		bot.on_message_at(&InboundMessage::new("#a", "too short"), Instant::now(), &mut rng).unwrap();
		let err = bot.generate_with("#a", None, &mut rng).unwrap_err();
		assert!(matches!(err, ChainError::InsufficientLength { min_length: 5 }));
	}

	#[test]
	fn length_enforcement_is_silent_for_the_trigger() {
		let (_dir, bot) = bot_with(ChannelConfig { min_chain_length: 5, ..chatty() });
		let mut rng = StdRng::seed_from_u64(1);
		let start = Instant::now();
		bot.on_message_at(&InboundMessage::new("#a", "too short"), start, &mut rng).unwrap();
		let later = start + Duration::from_secs(301);
		let reply = bot.on_message_at(&InboundMessage::new("#a", "still short"), later, &mut rng).unwrap();
		assert_eq!(reply, None);
	}

	#[test]
	fn actions_are_filtered_on_their_body() {
		let channel = ChannelConfig {
			random_speaking: RandomSpeaking { banana_chance: 1.0, ..RandomSpeaking::default() },
			..ChannelConfig::default()
		};
		let (_dir, bot) = bot_with(channel);
		let mut rng = StdRng::seed_from_u64(1);
		let filtered = bot.out_filter_with("#a", &message::action("eats the cake"), &mut rng);
		assert_eq!(filtered, message::action("eats the banana"));
	}
}
