use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ChainError, Result};
use crate::io::{normalize_folder, CORPUS_DIR};
use crate::model::store::partition_key;

/// Environment variable pointing at the configuration file.
pub const CONFIG_ENV: &str = "RS_CHAIN_CONFIG";

/// Configuration file looked up in the working directory when
/// `RS_CHAIN_CONFIG` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "rs-chain.toml";

/// Top-level configuration.
///
/// ```toml
/// data_dir = "./data"
/// max_steps = 100
/// flush_every = 16
///
/// [defaults.random_speaking]
/// probability = 0.05
///
/// [channels."#rust"]
/// ignore_bot_commands = true
/// ```
///
/// A `[channels."..."]` table overrides `[defaults]` key by key: keys it
/// leaves out keep the `[defaults]` value.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	#[serde(default = "default_data_dir")]
	pub data_dir: PathBuf,
	#[serde(default = "default_max_steps")]
	pub max_steps: usize,
	/// Number of learned messages after which a partition is written to disk.
	#[serde(default = "default_flush_every")]
	pub flush_every: u32,
	/// Browser origins allowed to call the HTTP front end. Empty means none.
	#[serde(default)]
	pub allowed_origins: Vec<String>,
	#[serde(default)]
	pub defaults: ChannelConfig,
	#[serde(default)]
	channels: HashMap<String, ChannelOverrides>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			data_dir: default_data_dir(),
			max_steps: default_max_steps(),
			flush_every: default_flush_every(),
			allowed_origins: Vec::new(),
			defaults: ChannelConfig::default(),
			channels: HashMap::new(),
		}
	}
}

fn default_data_dir() -> PathBuf {
	Path::new("./data").to_path_buf()
}

fn default_max_steps() -> usize {
	crate::chain::walker::DEFAULT_MAX_STEPS
}

fn default_flush_every() -> u32 {
	crate::model::store::DEFAULT_FLUSH_EVERY
}

impl Config {
	/// Loads the configuration from `RS_CHAIN_CONFIG`, then
	/// `./rs-chain.toml`, falling back to built-in defaults when neither
	/// exists.
	pub fn load() -> Result<Self> {
		let path = resolve_config_path();
		if path.exists() {
			return Self::from_path(&path);
		}
		log::debug!("no configuration at {}, using defaults", path.display());
		Ok(Self::default())
	}

	/// Reads and validates a TOML configuration file.
	pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
		let raw = fs::read_to_string(path.as_ref()).map_err(ChainError::ConfigIo)?;
		let config = Self::from_toml_str(&raw)?;
		log::info!("loaded configuration from {}", path.as_ref().display());
		Ok(config)
	}

	/// Parses and validates a TOML document.
	pub fn from_toml_str(raw: &str) -> Result<Self> {
		let mut config: Config = toml::from_str(raw)?;
		// Channel names are case-insensitive
		config.channels = std::mem::take(&mut config.channels)
			.into_iter()
			.map(|(name, channel)| (partition_key(&name), channel))
			.collect();
		config.data_dir = normalize_folder(&config.data_dir);
		config.validate()?;
		Ok(config)
	}

	/// Overrides some settings of one channel.
	pub fn set_channel(&mut self, partition: &str, overrides: ChannelOverrides) {
		self.channels.insert(partition_key(partition), overrides);
	}

	/// Returns the configuration that applies to `partition`: `defaults`
	/// with the channel's overrides on top.
	pub fn channel(&self, partition: &str) -> ChannelConfig {
		match self.channels.get(&partition_key(partition)) {
			Some(overrides) => overrides.apply(&self.defaults),
			None => self.defaults,
		}
	}

	/// Directory corpus files are imported from.
	pub fn corpus_dir(&self) -> PathBuf {
		self.data_dir.join(CORPUS_DIR)
	}

	/// Checks ranges that serde cannot express.
	pub fn validate(&self) -> Result<()> {
		if self.max_steps == 0 {
			return Err(ChainError::InvalidConfig("max_steps must be positive".to_owned()));
		}
		if self.flush_every == 0 {
			return Err(ChainError::InvalidConfig("flush_every must be positive".to_owned()));
		}
		if self.allowed_origins.iter().any(|origin| origin.trim().is_empty() || origin.contains('*')) {
			return Err(ChainError::InvalidConfig("allowed_origins must list explicit origins".to_owned()));
		}
		self.defaults.validate("defaults")?;
		for name in self.channels.keys() {
			self.channel(name).validate(name)?;
		}
		Ok(())
	}
}

fn resolve_config_path() -> PathBuf {
	if let Ok(path) = env::var(CONFIG_ENV) {
		return PathBuf::from(path);
	}
	Path::new(DEFAULT_CONFIG_FILE).to_path_buf()
}

/// Per-channel settings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
	/// Do not learn from messages addressed to the bot.
	pub ignore_bot_commands: bool,
	/// Smallest chain the generate command accepts. Values above 1 switch
	/// generation to the retrying, length-enforcing path.
	pub min_chain_length: u32,
	/// Number of attempts at reaching `min_chain_length`.
	pub max_attempts: u32,
	pub random_speaking: RandomSpeaking,
}

impl Default for ChannelConfig {
	fn default() -> Self {
		Self {
			ignore_bot_commands: false,
			min_chain_length: 1,
			max_attempts: 1,
			random_speaking: RandomSpeaking::default(),
		}
	}
}

impl ChannelConfig {
	/// Whether the length-enforcing generation path is in use.
	pub fn enforces_length(&self) -> bool {
		self.min_chain_length > 1
	}

	fn validate(&self, name: &str) -> Result<()> {
		if self.min_chain_length == 0 {
			return Err(ChainError::InvalidConfig(format!("{name}: min_chain_length must be positive")));
		}
		if self.max_attempts == 0 {
			return Err(ChainError::InvalidConfig(format!("{name}: max_attempts must be positive")));
		}
		self.random_speaking.validate(name)
	}
}

/// Channel settings that differ from `[defaults]`. `None` keeps the default.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ChannelOverrides {
	pub ignore_bot_commands: Option<bool>,
	pub min_chain_length: Option<u32>,
	pub max_attempts: Option<u32>,
	pub random_speaking: RandomSpeakingOverrides,
}

impl ChannelOverrides {
	/// Lays the overrides over `base`.
	pub fn apply(&self, base: &ChannelConfig) -> ChannelConfig {
		ChannelConfig {
			ignore_bot_commands: self.ignore_bot_commands.unwrap_or(base.ignore_bot_commands),
			min_chain_length: self.min_chain_length.unwrap_or(base.min_chain_length),
			max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
			random_speaking: self.random_speaking.apply(&base.random_speaking),
		}
	}
}

/// `random_speaking` settings that differ from `[defaults]`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct RandomSpeakingOverrides {
	pub probability: Option<f64>,
	pub max_delay: Option<u64>,
	pub throttle_time: Option<u64>,
	pub banana_chance: Option<f64>,
}

impl RandomSpeakingOverrides {
	pub fn apply(&self, base: &RandomSpeaking) -> RandomSpeaking {
		RandomSpeaking {
			probability: self.probability.unwrap_or(base.probability),
			max_delay: self.max_delay.unwrap_or(base.max_delay),
			throttle_time: self.throttle_time.unwrap_or(base.throttle_time),
			banana_chance: self.banana_chance.unwrap_or(base.banana_chance),
		}
	}
}

/// Spontaneous speech and output filter settings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RandomSpeaking {
	/// Chance of speaking on an eligible message. 0 never speaks, 1 always does.
	pub probability: f64,
	/// Upper bound, in seconds, of the random extra delay added after speaking.
	pub max_delay: u64,
	/// Minimum number of seconds between two spontaneous phrases.
	pub throttle_time: u64,
	/// Chance that an outgoing message goes through the banana filter.
	pub banana_chance: f64,
}

impl Default for RandomSpeaking {
	fn default() -> Self {
		Self {
			probability: 0.0,
			max_delay: 10,
			throttle_time: 300,
			banana_chance: 0.1,
		}
	}
}

impl RandomSpeaking {
	fn validate(&self, name: &str) -> Result<()> {
		if !(0.0..=1.0).contains(&self.probability) {
			return Err(ChainError::InvalidConfig(format!(
				"{name}: random_speaking.probability must be between 0.0 and 1.0, got {}",
				self.probability
			)));
		}
		if !(0.0..=1.0).contains(&self.banana_chance) {
			return Err(ChainError::InvalidConfig(format!(
				"{name}: random_speaking.banana_chance must be between 0.0 and 1.0, got {}",
				self.banana_chance
			)));
		}
		if self.max_delay == 0 || self.throttle_time == 0 {
			return Err(ChainError::InvalidConfig(format!(
				"{name}: random_speaking.max_delay and throttle_time must be positive"
			)));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_document_uses_defaults() {
		let config = Config::from_toml_str("").unwrap();
		assert_eq!(config.max_steps, 100);
		assert_eq!(config.flush_every, 16);
		assert!(config.allowed_origins.is_empty());
		let channel = config.channel("#anything");
		assert!(!channel.ignore_bot_commands);
		assert_eq!(channel.min_chain_length, 1);
		assert_eq!(channel.max_attempts, 1);
		assert_eq!(channel.random_speaking.probability, 0.0);
		assert_eq!(channel.random_speaking.max_delay, 10);
		assert_eq!(channel.random_speaking.throttle_time, 300);
		assert_eq!(channel.random_speaking.banana_chance, 0.1);
	}

	#[test]
	fn channel_tables_are_case_insensitive() {
		let config = Config::from_toml_str(
			r##"
			[defaults.random_speaking]
			probability = 0.5

			[channels."#Rust"]
			ignore_bot_commands = true
			"##,
		)
		.unwrap();

		assert!(config.channel("#rust").ignore_bot_commands);
		assert!(config.channel("#RUST").ignore_bot_commands);
		assert!(!config.channel("#other").ignore_bot_commands);
	}

	#[test]
	fn channel_tables_fall_back_to_defaults() {
		let config = Config::from_toml_str(
			r##"
			[defaults]
			max_attempts = 4

			[defaults.random_speaking]
			probability = 0.5
			banana_chance = 0.0

			[channels."#rust"]
			ignore_bot_commands = true

			[channels."#rust".random_speaking]
			probability = 0.25
			"##,
		)
		.unwrap();

		let rust = config.channel("#rust");
		assert!(rust.ignore_bot_commands);
		assert_eq!(rust.max_attempts, 4);
		assert_eq!(rust.random_speaking.probability, 0.25);
		assert_eq!(rust.random_speaking.banana_chance, 0.0);
		assert_eq!(rust.random_speaking.throttle_time, 300);
		assert_eq!(config.channel("#other").random_speaking.probability, 0.5);
	}

	#[test]
	fn overrides_are_validated_after_merging() {
		let err = Config::from_toml_str("[channels.\"#a\".random_speaking]\nprobability = 2.0\n").unwrap_err();
		assert!(matches!(err, ChainError::InvalidConfig(_)));
	}

	#[test]
	fn wildcard_origin_is_rejected() {
		let config = Config::from_toml_str("allowed_origins = [\"http://localhost:8080\"]").unwrap();
		assert_eq!(config.allowed_origins, vec!["http://localhost:8080".to_owned()]);
		let err = Config::from_toml_str("allowed_origins = [\"*\"]").unwrap_err();
		assert!(matches!(err, ChainError::InvalidConfig(_)));
	}

	#[test]
	fn zero_flush_interval_is_rejected() {
		let err = Config::from_toml_str("flush_every = 0").unwrap_err();
		assert!(matches!(err, ChainError::InvalidConfig(_)));
	}

	#[test]
	fn out_of_range_probability_is_rejected() {
		let err = Config::from_toml_str("[defaults.random_speaking]\nbanana_chance = 1.5\n").unwrap_err();
		assert!(matches!(err, ChainError::InvalidConfig(_)));
	}

	#[test]
	fn zero_attempts_is_rejected() {
		let err = Config::from_toml_str("[channels.\"#a\"]\nmax_attempts = 0\n").unwrap_err();
		assert!(matches!(err, ChainError::InvalidConfig(_)));
	}

	#[test]
	fn malformed_document_is_a_parse_error() {
		let err = Config::from_toml_str("max_steps = \"lots\"").unwrap_err();
		assert!(matches!(err, ChainError::ConfigParse(_)));
	}
}
