use crate::error::Result;
use crate::model::store::FrequencyStore;
use crate::model::transition::Token;

/// Splits a message into words on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
	text.split_whitespace().map(str::to_owned).collect()
}

/// Returns the transitions a message contributes, in recording order.
///
/// - Nothing for an empty message.
/// - Nothing for a message of exactly three words. Such messages are
///   mostly commands and short reactions, and are kept out of the model on
///   purpose.
/// - Otherwise: `boundary → first`, `last → boundary`, then every
///   consecutive pair. A single word yields both boundary transitions.
pub fn transitions(tokens: &[String]) -> Vec<(Token, Token)> {
	let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
		return Vec::new();
	};
	if tokens.len() == 3 {
		return Vec::new();
	}

	let mut pairs = Vec::with_capacity(tokens.len() + 1);
	pairs.push((Token::Boundary, Token::word(first.as_str())));
	pairs.push((Token::word(last.as_str()), Token::Boundary));
	for window in tokens.windows(2) {
		pairs.push((Token::word(window[0].as_str()), Token::word(window[1].as_str())));
	}
	pairs
}

/// Learns one tokenized message into a partition.
///
/// Every transition goes through [`FrequencyStore::record_transition`], then
/// the message is counted with [`FrequencyStore::message_learned`], which
/// writes the partition every `flush_every` messages. Learning is strictly
/// additive.
///
/// Returns the number of transitions recorded (0 for skipped messages).
pub fn update(store: &FrequencyStore, partition: &str, tokens: &[String]) -> Result<usize> {
	let pairs = transitions(tokens);
	if pairs.is_empty() {
		log::debug!("{partition}: not learning a {}-word message", tokens.len());
		return Ok(0);
	}

	let recorded = pairs.len();
	for (predecessor, successor) in pairs {
		store.record_transition(partition, predecessor, successor)?;
	}
	store.message_learned(partition)?;
	log::debug!("{partition}: learned {recorded} transitions");
	Ok(recorded)
}
