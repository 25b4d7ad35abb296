//! # Tether Signals
//!
//! In-process publish/subscribe plumbing: broadcast signals whose receivers
//! are held weakly, single-receiver wires, and keyed containers and boxes
//! that create channels on first use.
//!
//! ## Channels
//!
//! - [`Signal`]: any number of receivers, delivered in connection order.
//!   Receivers are held weakly and disappear with their owner. Delivery can
//!   be gated by [`Condition`]s and suppressed with [`Signal::mute`].
//! - [`Wire`]: exactly one receiver, held strongly, called with a plain
//!   argument.
//!
//! ## Collections
//!
//! - [`Container`]: get-or-create mapping from names to channels.
//! - [`ChannelBox`]: containers keyed by scope id with one active scope.
//!   A scope can be tied to an owner and discarded when the owner is dropped.
//!
//! ## Quick Start
//!
//! ```
//! use tether_signals::{Payload, Signal, SignalOptions};
//!
//! let supplier: Signal<f64> = Signal::with_options(SignalOptions::new().with_receiver_limit(1));
//! supplier
//!     .connect_fn(|p: &Payload| p.get_f64("a").unwrap_or(0.0), Payload::new())
//!     .unwrap();
//!
//! assert_eq!(supplier.fetch(&Payload::new().with("a", 5.7)).unwrap(), 5.7);
//! assert!(supplier.connect_fn(|_: &Payload| 0.0, Payload::new()).is_err());
//! ```
//!
//! ## Threads
//!
//! Every handle is `Send + Sync`. Receivers run on the emitting thread with
//! no internal lock held, so a receiver may emit, connect or disconnect.

pub mod channel_box;
pub mod condition;
pub mod config;
pub mod container;
pub mod core;
pub mod error;
pub mod receiver;
pub mod registry;
pub mod signal;
pub mod wire;
pub mod wired;

pub use channel_box::{ChannelBox, ScopeGuard, SignalBox, WireBox};
pub use condition::{Condition, FnCondition, PredicateFn, condition_fn};
pub use config::{ReconnectPolicy, WireSettings};
pub use container::{Container, SignalContainer, WireContainer};
pub use crate::core::{Channel, ChannelName, Key, Payload, ReceiverId, ScopeId};
pub use error::{SignalError, SignalResult};
pub use receiver::ReceiverFn;
pub use registry::{default_container, default_signal, default_wire};
pub use signal::{Signal, SignalOptions, Subscription};
pub use wire::{Wire, WireFn, WireOptions};
pub use wired::{Connection, Target, Wired, connect_all, receive_fn, supply_fn};
