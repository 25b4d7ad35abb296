//! Delivery conditions
//!
//! A [`Condition`] decides per receiver whether an emission is delivered.
//! It sees the receiver's connect-time metadata merged with the emit-time
//! payload, so one condition can implement per-receiver filtering.
//!
//! ```
//! use tether_signals::{Payload, Signal, condition_fn};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let signal: Signal = Signal::new();
//! let hits = Arc::new(AtomicUsize::new(0));
//! let counter = hits.clone();
//! signal
//!     .connect_fn(move |_p: &Payload| { counter.fetch_add(1, Ordering::SeqCst); }, Payload::new())
//!     .unwrap();
//!
//! signal
//!     .add_condition(condition_fn("small", |args| args.get_f64("a").is_some_and(|a| a < 10.0)))
//!     .unwrap();
//! signal.emit(&Payload::new().with("a", 5));
//! signal.emit(&Payload::new().with("a", 15));
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! ```

use crate::core::Payload;
use std::fmt;
use std::sync::Arc;

/// Predicate function type used by [`FnCondition`]
pub type PredicateFn = Arc<dyn Fn(&Payload) -> bool + Send + Sync>;

/// A named predicate gating delivery to each receiver
///
/// The name is the key in a signal's condition set: adding a condition with
/// a name already present replaces the earlier one.
pub trait Condition: Send + Sync {
	/// Key of this condition within a signal
	fn name(&self) -> &str;

	/// Decide delivery from receiver metadata merged with the emit payload
	fn check(&self, args: &Payload) -> bool;
}

/// A [`Condition`] backed by a closure
#[derive(Clone)]
pub struct FnCondition {
	name: String,
	predicate: PredicateFn,
}

impl FnCondition {
	/// Create a named condition from a predicate
	pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
	where
		F: Fn(&Payload) -> bool + Send + Sync + 'static,
	{
		Self {
			name: name.into(),
			predicate: Arc::new(predicate),
		}
	}
}

impl Condition for FnCondition {
	fn name(&self) -> &str {
		&self.name
	}

	fn check(&self, args: &Payload) -> bool {
		(self.predicate)(args)
	}
}

impl fmt::Debug for FnCondition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FnCondition")
			.field("name", &self.name)
			.finish()
	}
}

/// Shorthand for [`FnCondition::new`]
pub fn condition_fn<F>(name: impl Into<String>, predicate: F) -> FnCondition
where
	F: Fn(&Payload) -> bool + Send + Sync + 'static,
{
	FnCondition::new(name, predicate)
}

/// Passes when every condition passes; an empty set always passes
pub(crate) fn check_all(conditions: &[Arc<dyn Condition>], args: &Payload) -> bool {
	conditions.iter().all(|condition| condition.check(args))
}
