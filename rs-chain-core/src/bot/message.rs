use crate::chain::learner;

/// CTCP delimiter.
const CTCP: char = '\u{1}';

/// One message received from the messaging layer.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
	/// Partition (channel) the message was sent to.
	pub partition: String,
	/// Raw message text, possibly a CTCP request.
	pub text: String,
	/// Whether the message was addressed to the bot (a command).
	pub addressed: bool,
}

impl InboundMessage {
	pub fn new(partition: impl Into<String>, text: impl Into<String>) -> Self {
		Self {
			partition: partition.into(),
			text: text.into(),
			addressed: false,
		}
	}

	pub fn addressed(mut self, addressed: bool) -> Self {
		self.addressed = addressed;
		self
	}

	/// Words to learn from.
	///
	/// The body of a CTCP ACTION (`/me ...`) is tokenized like plain text;
	/// any other CTCP request yields nothing.
	pub fn tokenize(&self) -> Vec<String> {
		match ctcp_body(&self.text) {
			None => learner::tokenize(&self.text),
			Some(body) => action_text(body).map(learner::tokenize).unwrap_or_default(),
		}
	}
}

/// Returns the inside of a CTCP message, `None` for plain text.
fn ctcp_body(text: &str) -> Option<&str> {
	let body = text.strip_prefix(CTCP)?;
	Some(body.strip_suffix(CTCP).unwrap_or(body))
}

/// Returns the text of an ACTION body, `None` for other CTCP commands.
fn action_text(body: &str) -> Option<&str> {
	match body.split_once(' ') {
		Some(("ACTION", text)) => Some(text),
		None if body == "ACTION" => Some(""),
		_ => None,
	}
}

/// Splits an outgoing text into its ACTION body, if it is one.
pub(crate) fn split_action(text: &str) -> Option<&str> {
	ctcp_body(text).and_then(action_text)
}

/// Wraps a text into a CTCP ACTION.
pub fn action(text: &str) -> String {
	format!("{CTCP}ACTION {text}{CTCP}")
}
