//! Error types for signal, wire, container and box operations

use thiserror::Error;

/// Result type for channel operations.
pub type SignalResult<T> = Result<T, SignalError>;

/// Failures raised synchronously to the caller of a channel operation.
///
/// None of these are retried internally. Receivers whose owner has been
/// dropped are never reported here; they are pruned silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SignalError {
	/// A connect was attempted beyond the signal's receiver limit.
	#[error("receiver limit of {limit} reached for signal '{channel}'")]
	Capacity {
		/// Signal name, or `<unnamed>`.
		channel: String,
		/// The configured limit.
		limit: usize,
	},

	/// The operation is not valid in the channel's current state.
	#[error("precondition failed: {0}")]
	Precondition(String),

	/// No receiver, channel or scope matched.
	#[error("not found: {0}")]
	NotFound(String),

	/// A wire was emitted or fetched before anything was connected.
	#[error("wire '{0}' is not connected")]
	NotConnected(String),

	/// A wire already has a receiver and the reconnect policy is strict.
	#[error("wire '{0}' is already connected and must first be disconnected")]
	AlreadyConnected(String),
}

impl SignalError {
	pub(crate) fn precondition(message: impl Into<String>) -> Self {
		Self::Precondition(message.into())
	}

	pub(crate) fn not_found(message: impl Into<String>) -> Self {
		Self::NotFound(message.into())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(
		SignalError::Capacity { channel: "ticks".into(), limit: 1 },
		"receiver limit of 1 reached for signal 'ticks'"
	)]
	#[case(SignalError::NotConnected("out".into()), "wire 'out' is not connected")]
	#[case(SignalError::not_found("no receivers"), "not found: no receivers")]
	fn test_error_display(#[case] error: SignalError, #[case] expected: &str) {
		assert_eq!(error.to_string(), expected);
	}
}
