//! Receiver bindings held by a signal
//!
//! A binding resolves to a callable at delivery time. Weak bindings resolve
//! to nothing once their target is gone, which is how a signal notices that
//! a receiver's owner was dropped.

use crate::core::Payload;
use std::sync::{Arc, Weak};

/// Receiver function type for signals
pub type ReceiverFn<R> = dyn Fn(&Payload) -> R + Send + Sync;

/// A receiver as stored by a signal
pub(crate) trait Binding<R>: Send + Sync {
	/// Call the receiver, or `None` when its target has been dropped
	fn invoke(&self, payload: &Payload) -> Option<R>;

	/// Whether the receiver can still be called
	fn is_alive(&self) -> bool;

	/// Short label used in log output
	fn kind(&self) -> &'static str;
}

/// Closure held through a weak reference; the caller keeps it alive
pub(crate) struct WeakFn<R> {
	receiver: Weak<ReceiverFn<R>>,
}

impl<R> WeakFn<R> {
	pub(crate) fn new(receiver: Weak<ReceiverFn<R>>) -> Self {
		Self { receiver }
	}
}

impl<R: 'static> Binding<R> for WeakFn<R> {
	fn invoke(&self, payload: &Payload) -> Option<R> {
		self.receiver.upgrade().map(|receiver| receiver(payload))
	}

	fn is_alive(&self) -> bool {
		self.receiver.strong_count() > 0
	}

	fn kind(&self) -> &'static str {
		"weak"
	}
}

/// Method bound to an owner held through a weak reference
///
/// The call is rebuilt from the owner on every delivery so the signal never
/// holds the owner itself.
pub(crate) struct MethodBinding<O, M> {
	owner: Weak<O>,
	method: M,
}

impl<O, M> MethodBinding<O, M> {
	pub(crate) fn new(owner: &Arc<O>, method: M) -> Self {
		Self {
			owner: Arc::downgrade(owner),
			method,
		}
	}
}

impl<O, M, R> Binding<R> for MethodBinding<O, M>
where
	O: Send + Sync + 'static,
	M: Fn(&O, &Payload) -> R + Send + Sync + 'static,
{
	fn invoke(&self, payload: &Payload) -> Option<R> {
		let owner = self.owner.upgrade()?;
		Some((self.method)(&owner, payload))
	}

	fn is_alive(&self) -> bool {
		self.owner.strong_count() > 0
	}

	fn kind(&self) -> &'static str {
		"method"
	}
}

/// Function held strongly; only removed by an explicit disconnect
pub(crate) struct StaticFn<F> {
	receiver: F,
}

impl<F> StaticFn<F> {
	pub(crate) fn new(receiver: F) -> Self {
		Self { receiver }
	}
}

impl<F, R> Binding<R> for StaticFn<F>
where
	F: Fn(&Payload) -> R + Send + Sync + 'static,
{
	fn invoke(&self, payload: &Payload) -> Option<R> {
		Some((self.receiver)(payload))
	}

	fn is_alive(&self) -> bool {
		true
	}

	fn kind(&self) -> &'static str {
		"static"
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	struct Owner {
		offset: i64,
	}

	impl Owner {
		fn add(&self, payload: &Payload) -> i64 {
			payload.get_i64("a").unwrap_or_default() + self.offset
		}
	}

	#[rstest]
	fn test_weak_fn_dies_with_caller_reference() {
		// Arrange
		let receiver: Arc<ReceiverFn<i64>> = Arc::new(|p: &Payload| p.len() as i64);
		let binding = WeakFn::new(Arc::downgrade(&receiver));

		// Act
		let before = binding.invoke(&Payload::new().with("a", 1));
		drop(receiver);
		let after = binding.invoke(&Payload::new());

		// Assert
		assert_eq!(before, Some(1));
		assert_eq!(after, None);
		assert!(!binding.is_alive());
	}

	#[rstest]
	fn test_method_binding_rebuilds_call_from_owner() {
		// Arrange
		let owner = Arc::new(Owner { offset: 10 });
		let binding = MethodBinding::new(&owner, Owner::add);

		// Act
		let result = binding.invoke(&Payload::new().with("a", 5));

		// Assert
		assert_eq!(result, Some(15));
		assert_eq!(Arc::strong_count(&owner), 1);
		assert_eq!(binding.kind(), "method");
	}

	#[rstest]
	fn test_method_binding_dead_after_owner_drop() {
		// Arrange
		let owner = Arc::new(Owner { offset: 0 });
		let binding = MethodBinding::new(&owner, Owner::add);

		// Act
		drop(owner);

		// Assert
		assert!(!binding.is_alive());
		assert_eq!(binding.invoke(&Payload::new()), None);
	}

	#[rstest]
	fn test_static_fn_always_alive() {
		// Arrange
		let binding = StaticFn::new(|p: &Payload| p.is_empty());

		// Act & Assert
		assert!(binding.is_alive());
		assert_eq!(binding.invoke(&Payload::new()), Some(true));
	}
}
