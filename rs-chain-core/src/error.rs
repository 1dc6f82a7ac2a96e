use thiserror::Error;

/// Errors raised while learning, storing or generating chains.
///
/// Only `StorageUnavailable` indicates that something is actually broken.
/// `NoData` and `ChainOverflow` are recovered inside the direct generation
/// path; the remaining kinds are user-facing failures of the
/// minimum-length generation path, of corpus imports or of the
/// configuration layer.
#[derive(Debug, Error)]
pub enum ChainError {
	#[error("I don't have any first words for {partition}")]
	NoData { partition: String },

	#[error("chain exceeded {max_steps} steps")]
	ChainOverflow { max_steps: usize },

	#[error("I found a broken link in the Markov chain after '{word}'")]
	BrokenLink { word: String },

	#[error("I was unable to generate a Markov chain at least {min_length} words long")]
	InsufficientLength { min_length: u32 },

	#[error("storage for {partition} is unavailable: {reason}")]
	StorageUnavailable { partition: String, reason: String },

	#[error("words must not be empty")]
	EmptyWord,

	#[error("invalid seed: {0}")]
	InvalidSeed(String),

	#[error("cannot import corpus {name}: {reason}")]
	InvalidCorpus { name: String, reason: String },

	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("failed to read configuration: {0}")]
	ConfigIo(std::io::Error),

	#[error("failed to parse configuration: {0}")]
	ConfigParse(#[from] toml::de::Error),
}

impl ChainError {
	/// Builds a `StorageUnavailable` error from anything displayable.
	pub(crate) fn storage(partition: &str, reason: impl std::fmt::Display) -> Self {
		Self::StorageUnavailable {
			partition: partition.to_owned(),
			reason: reason.to_string(),
		}
	}

	/// Whether the error comes from the storage layer rather than from the
	/// chain itself.
	pub fn is_storage(&self) -> bool {
		matches!(self, Self::StorageUnavailable { .. })
	}
}

pub type Result<T> = std::result::Result<T, ChainError>;
