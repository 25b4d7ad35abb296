//! # Tether
//!
//! Signals, wires and scoped channel containers for wiring components of a
//! single process together.
//!
//! The engine lives in [`signals`]; the [`prelude`] gathers what a typical
//! component needs.
//!
//! ```
//! use tether::prelude::*;
//!
//! let signals: SignalBox = SignalBox::new();
//! let changed = signals.get("changed");
//! assert!(changed.ptr_eq(&signals.get("changed")));
//! ```

pub use tether_signals as signals;

pub mod prelude {
	pub use tether_signals::{
		Channel,
		ChannelBox,
		Condition,
		Connection,
		Container,
		Key,
		Payload,
		ReceiverId,
		ReconnectPolicy,
		Signal,
		SignalBox,
		SignalContainer,
		SignalError,
		SignalOptions,
		SignalResult,
		Subscription,
		Target,
		Wire,
		WireBox,
		WireContainer,
		WireOptions,
		Wired,
		condition_fn,
	};
}
