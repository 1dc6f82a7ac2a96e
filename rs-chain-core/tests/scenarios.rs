//! End-to-end behaviour of learning, generation and spontaneous speech.

use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;

use rs_chain_core::bot::trigger::{PassiveTrigger, TriggerState};
use rs_chain_core::chain::learner::{self, tokenize};
use rs_chain_core::chain::walker::ChainWalker;
use rs_chain_core::model::store::FrequencyStore;
use rs_chain_core::model::transition::{Token, Transition};

fn open_store() -> (tempfile::TempDir, FrequencyStore) {
	let dir = tempfile::tempdir().expect("Failed to create temp directory");
	let store = FrequencyStore::open(dir.path()).expect("Failed to open store");
	(dir, store)
}

fn row(predecessor: Option<&str>, successor: Option<&str>, frequency: u64) -> Transition {
	Transition {
		predecessor: predecessor.map(str::to_owned),
		successor: successor.map(str::to_owned),
		frequency,
	}
}

// =============================================================================
// Learning
// =============================================================================

#[test]
fn hello_world_hello_there() {
	let (_dir, store) = open_store();
	learner::update(&store, "#p", &tokenize("hello world")).unwrap();
	learner::update(&store, "#p", &tokenize("hello there")).unwrap();

	assert_eq!(
		store.transitions("#p").unwrap(),
		vec![
			row(None, Some("hello"), 2),
			row(Some("hello"), Some("there"), 1),
			row(Some("hello"), Some("world"), 1),
			row(Some("there"), None, 1),
			row(Some("world"), None, 1),
		]
	);

	let walker = ChainWalker::default();
	for _ in 0..50 {
		let phrase = walker.build_phrase(&store, "#p", Some("hello")).unwrap();
		assert!(phrase == "hello world" || phrase == "hello there", "unexpected phrase {phrase:?}");
	}
}

#[test]
fn every_pair_of_a_message_is_incremented_once() {
	let (_dir, store) = open_store();
	learner::update(&store, "#p", &tokenize("a b a b c")).unwrap();
	let before = store.transitions("#p").unwrap();
	learner::update(&store, "#p", &tokenize("a b a b c")).unwrap();

	let after = store.transitions("#p").unwrap();
	assert_eq!(after.len(), before.len());
	for (old, new) in before.iter().zip(&after) {
		assert_eq!(new.frequency, old.frequency * 2);
	}
	assert_eq!(store.frequency("#p", &Token::word("a"), &Token::word("b")).unwrap(), 4);
	assert_eq!(store.frequency("#p", &Token::Boundary, &Token::word("a")).unwrap(), 2);
	assert_eq!(store.frequency("#p", &Token::word("c"), &Token::Boundary).unwrap(), 2);
}

#[test]
fn empty_and_three_word_messages_leave_the_store_unchanged() {
	let (_dir, store) = open_store();
	learner::update(&store, "#p", &tokenize("seed message here now")).unwrap();
	let before = store.transitions("#p").unwrap();

	assert_eq!(learner::update(&store, "#p", &tokenize("")).unwrap(), 0);
	assert_eq!(learner::update(&store, "#p", &tokenize("one two three")).unwrap(), 0);
	assert_eq!(store.transitions("#p").unwrap(), before);
}

#[test]
fn partitions_are_isolated() {
	let (_dir, store) = open_store();
	learner::update(&store, "#b", &tokenize("left alone")).unwrap();
	let before = store.transitions("#b").unwrap();

	learner::update(&store, "#a", &tokenize("left alone forever and ever")).unwrap();
	assert_eq!(store.transitions("#b").unwrap(), before);
	assert!(ChainWalker::default().build_phrase(&store, "#c", None).unwrap().is_empty());
}

#[test]
fn learned_messages_are_durable() {
	let dir = tempfile::tempdir().unwrap();
	{
		let store = FrequencyStore::open(dir.path()).unwrap().with_flush_every(2);
		learner::update(&store, "#p", &tokenize("hello world")).unwrap();
		learner::update(&store, "#p", &tokenize("hello there")).unwrap();
		// Not closed: the second message completes a batch
		std::mem::forget(store);
	}
	let store = FrequencyStore::open(dir.path()).unwrap();
	assert_eq!(store.frequency("#p", &Token::word("hello"), &Token::word("world")).unwrap(), 1);
}

// =============================================================================
// Generation
// =============================================================================

#[test]
fn generation_terminates_on_a_cyclic_graph() {
	let (_dir, store) = open_store();
	learner::update(&store, "#p", &tokenize("ping pong ping pong")).unwrap();
	// Reinforce the cycle so it rarely reaches the boundary
	for _ in 0..200 {
		store.record_transition("#p", Token::word("pong"), Token::word("ping")).unwrap();
	}

	let walker = ChainWalker::new(25);
	let mut rng = StdRng::seed_from_u64(9);
	for _ in 0..20 {
		let phrase = walker.build_phrase_with(&store, "#p", None, &mut rng).unwrap();
		assert!(phrase.split(' ').count() <= 25);
	}
}

#[test]
fn sampling_never_returns_unrecorded_successors() {
	let (_dir, store) = open_store();
	learner::update(&store, "#p", &tokenize("x y")).unwrap();
	learner::update(&store, "#p", &tokenize("x z")).unwrap();

	let mut rng = StdRng::seed_from_u64(21);
	for _ in 0..200 {
		let next = store.sample_successor_with("#p", &Token::word("x"), &mut rng).unwrap();
		assert!(matches!(next.as_ref().and_then(Token::as_word), Some("y") | Some("z")));
	}
	assert_eq!(store.sample_successor("#p", &Token::word("nothing")).unwrap(), None);
}

// =============================================================================
// Spontaneous speech
// =============================================================================

#[test]
fn second_call_within_throttle_time_is_silent() {
	let (_dir, store) = open_store();
	learner::update(&store, "#p", &tokenize("hello world")).unwrap();

	let walker = ChainWalker::default();
	let trigger = PassiveTrigger::new(1.0, Duration::from_secs(300), Duration::from_secs(10));
	let mut rng = StdRng::seed_from_u64(4);

	let start = Instant::now();
	let mut state = TriggerState::new(start);
	let now = start + Duration::from_secs(301);

	let first = trigger.maybe_speak(&mut state, &store, &walker, "#p", now, &mut rng).unwrap();
	assert_eq!(first.as_deref(), Some("hello world"));

	let second = trigger
		.maybe_speak(&mut state, &store, &walker, "#p", now + Duration::from_secs(299), &mut rng)
		.unwrap();
	assert_eq!(second, None);
}

#[test]
fn empty_partition_never_speaks_nor_delays() {
	let (_dir, store) = open_store();
	let walker = ChainWalker::default();
	let trigger = PassiveTrigger::new(1.0, Duration::from_secs(300), Duration::from_secs(10));
	let mut rng = StdRng::seed_from_u64(4);

	let start = Instant::now();
	let mut state = TriggerState::new(start);
	let now = start + Duration::from_secs(301);

	let said = trigger.maybe_speak(&mut state, &store, &walker, "#empty", now, &mut rng).unwrap();
	assert_eq!(said, None);
	assert_eq!(state.last_allowed(), start);
}
