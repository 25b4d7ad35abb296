//! Signal integration tests
//!
//! Delivery order, receiver lifetime, conditions and muting, exercised
//! through the public API only.

use parking_lot::Mutex;
use proptest::prelude::*;
use rstest::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tether_signals::{
	Payload, ReceiverId, Signal, SignalError, SignalOptions, condition_fn,
};

struct Listener {
	seen: Mutex<Vec<Payload>>,
}

impl Listener {
	fn new() -> Arc<Self> {
		Arc::new(Self {
			seen: Mutex::new(Vec::new()),
		})
	}

	fn on_event(&self, payload: &Payload) {
		self.seen.lock().push(payload.clone());
	}

	fn count(&self) -> usize {
		self.seen.lock().len()
	}
}

#[fixture]
fn signal() -> Signal {
	Signal::named("changed")
}

// ============================================================================
// Delivery
// ============================================================================

proptest! {
	/// Test: every receiver is invoked once, in connection order
	///
	/// Category: Property
	/// Connecting N receivers and emitting once delivers the same payload to
	/// each receiver exactly once, in the order they were connected.
	#[test]
	fn prop_emit_reaches_all_receivers_in_order(n in 0usize..24, value in any::<i64>()) {
		let signal: Signal = Signal::new();
		let order = Arc::new(Mutex::new(Vec::new()));
		for index in 0..n {
			let order = order.clone();
			signal
				.connect_fn(
					move |payload: &Payload| order.lock().push((index, payload.get_i64("v"))),
					Payload::new(),
				)
				.unwrap();
		}

		let delivered = signal.emit(&Payload::new().with("v", value));

		let expected: Vec<(usize, Option<i64>)> = (0..n).map(|i| (i, Some(value))).collect();
		prop_assert_eq!(delivered, n);
		prop_assert_eq!(order.lock().clone(), expected);
	}
}

#[rstest]
fn test_nested_emit_from_receiver(signal: Signal) {
	// Arrange
	let inner: Signal = Signal::named("inner");
	let inner_hits = Arc::new(AtomicUsize::new(0));
	let counter = inner_hits.clone();
	inner
		.connect_fn(
			move |_: &Payload| {
				counter.fetch_add(1, Ordering::SeqCst);
			},
			Payload::new(),
		)
		.unwrap();
	let forward = inner.clone();
	signal
		.connect_fn(
			move |payload: &Payload| {
				forward.emit(payload);
			},
			Payload::new(),
		)
		.unwrap();

	// Act
	signal.emit(&Payload::new());
	signal.emit(&Payload::new());

	// Assert
	assert_eq!(inner_hits.load(Ordering::SeqCst), 2);
}

#[rstest]
fn test_receiver_connecting_during_emit_joins_next_emit(signal: Signal) {
	// Arrange
	let hits = Arc::new(AtomicUsize::new(0));
	let handle = signal.clone();
	let counter = hits.clone();
	signal
		.connect_fn(
			move |_: &Payload| {
				let counter = counter.clone();
				handle
					.connect_fn(
						move |_: &Payload| {
							counter.fetch_add(1, Ordering::SeqCst);
						},
						Payload::new(),
					)
					.unwrap();
			},
			Payload::new(),
		)
		.unwrap();

	// Act
	let first = signal.emit(&Payload::new());
	let before_second = hits.load(Ordering::SeqCst);
	signal.emit(&Payload::new());

	// Assert
	assert_eq!(first, 1);
	assert_eq!(before_second, 0);
	assert_eq!(hits.load(Ordering::SeqCst), 1);
	signal.disconnect_all();
}

// ============================================================================
// Receiver lifetime
// ============================================================================

#[rstest]
fn test_released_owner_is_skipped_and_pruned(signal: Signal) {
	// Arrange
	let kept = Listener::new();
	let released = Listener::new();
	signal
		.connect_method(&kept, Listener::on_event, Payload::new())
		.unwrap();
	let released_id = signal
		.connect_method(&released, Listener::on_event, Payload::new())
		.unwrap();

	// Act
	drop(released);
	let delivered = signal.emit(&Payload::new().with("a", 1));

	// Assert
	assert_eq!(delivered, 1);
	assert_eq!(kept.count(), 1);
	assert!(!signal.receiver_ids().contains(&released_id));
	assert!(signal.receiver_metadata(released_id).is_none());
}

#[rstest]
fn test_disconnect_twice_is_noop(signal: Signal) {
	// Arrange
	let listener = Listener::new();
	let id = signal
		.connect_method(&listener, Listener::on_event, Payload::new())
		.unwrap();

	// Act
	let first = signal.disconnect(id);
	let second = signal.disconnect(id);
	let unknown = signal.disconnect(id);

	// Assert
	assert!(first);
	assert!(!second);
	assert!(!unknown);
	assert!(signal.is_empty());
}

#[rstest]
fn test_subscription_disconnects_on_drop(signal: Signal) {
	// Arrange
	let listener = Listener::new();
	let subscription = signal
		.subscribe_method(&listener, Listener::on_event, Payload::new())
		.unwrap();
	let id: ReceiverId = subscription.id();

	// Act
	drop(subscription);
	signal.emit(&Payload::new());

	// Assert
	assert_eq!(listener.count(), 0);
	assert!(!signal.receiver_ids().contains(&id));
}

#[rstest]
fn test_weak_closure_lives_as_long_as_caller_keeps_it(signal: Signal) {
	// Arrange
	let hits = Arc::new(AtomicUsize::new(0));
	let counter = hits.clone();
	let receiver = Arc::new(move |_: &Payload| {
		counter.fetch_add(1, Ordering::SeqCst);
	});
	signal.connect(&receiver, Payload::new()).unwrap();

	// Act
	signal.emit(&Payload::new());
	drop(receiver);
	signal.emit(&Payload::new());

	// Assert
	assert_eq!(hits.load(Ordering::SeqCst), 1);
	assert!(!signal.has_receivers());
}

// ============================================================================
// Suppliers
// ============================================================================

#[rstest]
fn test_single_supplier_scenario() {
	// Arrange
	let signal: Signal<f64> = Signal::with_options(SignalOptions::new().with_receiver_limit(1));
	signal
		.connect_fn(|p: &Payload| p.get_f64("a").unwrap_or(f64::NAN), Payload::new())
		.unwrap();

	// Act
	let fetched = signal.fetch(&Payload::new().with("a", 5.7)).unwrap();
	let second = signal.connect_fn(|_: &Payload| 0.0, Payload::new());

	// Assert
	assert_eq!(fetched, 5.7);
	assert_eq!(
		second,
		Err(SignalError::Capacity {
			channel: "<unnamed>".to_string(),
			limit: 1,
		})
	);
}

#[rstest]
fn test_fetch_all_collects_in_order() {
	// Arrange
	let signal: Signal<String> = Signal::new();
	for label in ["first", "second", "third"] {
		signal
			.connect_fn(move |_: &Payload| label.to_string(), Payload::new())
			.unwrap();
	}

	// Act
	let values = signal.fetch_all(&Payload::new()).unwrap();

	// Assert
	assert_eq!(values, vec!["first", "second", "third"]);
}

// ============================================================================
// Conditions and muting
// ============================================================================

#[rstest]
#[case(5, 1)]
#[case(15, 0)]
fn test_condition_scenario(signal: Signal, #[case] a: i64, #[case] expected: usize) {
	// Arrange
	let listener = Listener::new();
	signal
		.connect_method(&listener, Listener::on_event, Payload::new())
		.unwrap();
	signal
		.add_condition(condition_fn("below_ten", |args| {
			args.get_i64("a").is_some_and(|a| a < 10)
		}))
		.unwrap();

	// Act
	signal.emit(&Payload::new().with("a", a));

	// Assert
	assert_eq!(listener.count(), expected);
}

#[rstest]
fn test_condition_round_trip_matches_unconditional_delivery() {
	// Arrange
	let plain: Signal = Signal::new();
	let toggled: Signal = Signal::new();
	let plain_listener = Listener::new();
	let toggled_listener = Listener::new();
	plain
		.connect_method(&plain_listener, Listener::on_event, Payload::new())
		.unwrap();
	toggled
		.connect_method(&toggled_listener, Listener::on_event, Payload::new())
		.unwrap();
	toggled
		.add_condition(condition_fn("never", |_| false))
		.unwrap();

	// Act
	toggled.remove_condition("never");
	for a in [1, 50, -3] {
		let payload = Payload::new().with("a", a);
		plain.emit(&payload);
		toggled.emit(&payload);
	}

	// Assert
	assert!(!toggled.is_conditioned());
	assert_eq!(
		*plain_listener.seen.lock(),
		*toggled_listener.seen.lock()
	);
}

#[rstest]
fn test_mute_scenario(signal: Signal) {
	// Arrange
	let listener = Listener::new();
	signal
		.connect_method(&listener, Listener::on_event, Payload::new())
		.unwrap();

	// Act
	signal.mute();
	signal.emit(&Payload::new().with("a", 1));
	signal.unmute().unwrap();
	signal.emit(&Payload::new().with("a", 2));

	// Assert
	let seen = listener.seen.lock();
	assert_eq!(seen.len(), 1);
	assert_eq!(seen[0].get_i64("a"), Some(2));
}

#[rstest]
fn test_signal_is_shared_across_threads(signal: Signal) {
	// Arrange
	let hits = Arc::new(AtomicUsize::new(0));
	let counter = hits.clone();
	signal
		.connect_fn(
			move |_: &Payload| {
				counter.fetch_add(1, Ordering::SeqCst);
			},
			Payload::new(),
		)
		.unwrap();

	// Act
	let handles: Vec<_> = (0..4)
		.map(|_| {
			let signal = signal.clone();
			std::thread::spawn(move || {
				for _ in 0..25 {
					signal.emit(&Payload::new());
				}
			})
		})
		.collect();
	for handle in handles {
		handle.join().unwrap();
	}

	// Assert
	assert_eq!(hits.load(Ordering::SeqCst), 100);
}
