use serde::{Deserialize, Serialize};
use std::fmt;

/// One side of a transition: a word or the phrase boundary.
///
/// As a predecessor the boundary means "start of phrase", as a successor it
/// means "end of phrase". `Boundary` orders before every word.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
	Boundary,
	Word(String),
}

impl Token {
	/// Builds a word token.
	pub fn word(word: impl Into<String>) -> Self {
		Token::Word(word.into())
	}

	/// Returns the word, or `None` for the boundary.
	pub fn as_word(&self) -> Option<&str> {
		match self {
			Token::Word(word) => Some(word),
			Token::Boundary => None,
		}
	}

	pub fn is_boundary(&self) -> bool {
		matches!(self, Token::Boundary)
	}

	/// A word token is valid only if it is non-empty.
	pub(crate) fn is_valid(&self) -> bool {
		match self {
			Token::Word(word) => !word.is_empty(),
			Token::Boundary => true,
		}
	}
}

impl From<Option<String>> for Token {
	fn from(value: Option<String>) -> Self {
		value.map_or(Token::Boundary, Token::Word)
	}
}

impl From<Token> for Option<String> {
	fn from(value: Token) -> Self {
		match value {
			Token::Word(word) => Some(word),
			Token::Boundary => None,
		}
	}
}

impl fmt::Display for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Token::Word(word) => f.write_str(word),
			Token::Boundary => f.write_str("<boundary>"),
		}
	}
}

/// A persisted row: how many times `successor` followed `predecessor`.
///
/// `None` on either side encodes the boundary.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transition {
	pub predecessor: Option<String>,
	pub successor: Option<String>,
	pub frequency: u64,
}

impl Transition {
	pub fn new(predecessor: Token, successor: Token, frequency: u64) -> Self {
		Self {
			predecessor: predecessor.into(),
			successor: successor.into(),
			frequency,
		}
	}
}
