//! Process-wide settings
//!
//! The only switch is the [`ReconnectPolicy`] applied when a [`Wire`](crate::Wire)
//! that already has a receiver is connected again. It is read from the
//! `TETHER_WIRE_RECONNECT` environment variable on first access and can be
//! changed at runtime with [`set_reconnect_policy`].
//!
//! ```
//! use tether_signals::config::{ReconnectPolicy, WireSettings};
//!
//! let settings: WireSettings =
//!     serde_json::from_str(r#"{"reconnect_policy": "warn_and_replace"}"#).unwrap();
//! assert_eq!(settings.reconnect_policy, ReconnectPolicy::WarnAndReplace);
//! ```

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

/// Environment variable consulted by [`WireSettings::from_env`]
pub const RECONNECT_ENV_VAR: &str = "TETHER_WIRE_RECONNECT";

/// What a wire does when `connect` is called while it already has a receiver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
	/// Fail with [`SignalError::AlreadyConnected`](crate::SignalError::AlreadyConnected)
	#[default]
	Strict,
	/// Log a warning and replace the existing receiver
	#[serde(alias = "warn")]
	WarnAndReplace,
}

impl FromStr for ReconnectPolicy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"strict" | "raise" => Ok(Self::Strict),
			"warn_and_replace" | "warn" => Ok(Self::WarnAndReplace),
			other => Err(format!("unknown reconnect policy '{}'", other)),
		}
	}
}

impl fmt::Display for ReconnectPolicy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Strict => write!(f, "strict"),
			Self::WarnAndReplace => write!(f, "warn_and_replace"),
		}
	}
}

/// Wire-related settings, embeddable in a host application's configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireSettings {
	/// Policy for connecting an already-connected wire
	pub reconnect_policy: ReconnectPolicy,
}

impl WireSettings {
	/// Create settings with the defaults
	pub fn new() -> Self {
		Self::default()
	}

	/// Set the reconnect policy
	pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
		self.reconnect_policy = policy;
		self
	}

	/// Load settings from the environment
	///
	/// Unknown values are ignored with a warning and the default is kept.
	pub fn from_env() -> Self {
		let mut settings = Self::default();
		if let Ok(raw) = env::var(RECONNECT_ENV_VAR) {
			match raw.parse::<ReconnectPolicy>() {
				Ok(policy) => settings.reconnect_policy = policy,
				Err(e) => tracing::warn!(
					var = RECONNECT_ENV_VAR,
					"{}, keeping {}",
					e,
					settings.reconnect_policy
				),
			}
		}
		settings
	}
}

static SETTINGS: Lazy<RwLock<WireSettings>> = Lazy::new(|| RwLock::new(WireSettings::from_env()));

/// Snapshot of the process-wide settings
pub fn settings() -> WireSettings {
	SETTINGS.read().clone()
}

/// Replace the process-wide settings
pub fn configure(settings: WireSettings) {
	tracing::debug!(policy = %settings.reconnect_policy, "wire settings replaced");
	*SETTINGS.write() = settings;
}

/// The process-wide reconnect policy
pub fn reconnect_policy() -> ReconnectPolicy {
	SETTINGS.read().reconnect_policy
}

/// Change the process-wide reconnect policy
pub fn set_reconnect_policy(policy: ReconnectPolicy) {
	tracing::debug!(%policy, "wire reconnect policy changed");
	SETTINGS.write().reconnect_policy = policy;
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serial_test::serial;

	#[rstest]
	#[case("strict", ReconnectPolicy::Strict)]
	#[case("raise", ReconnectPolicy::Strict)]
	#[case("warn", ReconnectPolicy::WarnAndReplace)]
	#[case(" Warn_And_Replace ", ReconnectPolicy::WarnAndReplace)]
	fn test_policy_from_str(#[case] input: &str, #[case] expected: ReconnectPolicy) {
		assert_eq!(input.parse::<ReconnectPolicy>().unwrap(), expected);
	}

	#[rstest]
	fn test_policy_from_str_rejects_unknown() {
		assert!("sometimes".parse::<ReconnectPolicy>().is_err());
	}

	#[rstest]
	fn test_default_policy_is_strict() {
		assert_eq!(WireSettings::default().reconnect_policy, ReconnectPolicy::Strict);
	}

	#[rstest]
	fn test_settings_deserialize_missing_field_uses_default() {
		// Act
		let settings: WireSettings = serde_json::from_str("{}").unwrap();

		// Assert
		assert_eq!(settings, WireSettings::default());
	}

	#[rstest]
	fn test_settings_deserialize_alias() {
		// Act
		let settings: WireSettings =
			serde_json::from_str(r#"{"reconnect_policy": "warn"}"#).unwrap();

		// Assert
		assert_eq!(settings.reconnect_policy, ReconnectPolicy::WarnAndReplace);
	}

	#[rstest]
	#[serial(reconnect_policy)]
	fn test_set_reconnect_policy_round_trip() {
		// Arrange
		let previous = reconnect_policy();

		// Act
		set_reconnect_policy(ReconnectPolicy::WarnAndReplace);
		let changed = reconnect_policy();
		set_reconnect_policy(previous);

		// Assert
		assert_eq!(changed, ReconnectPolicy::WarnAndReplace);
		assert_eq!(reconnect_policy(), previous);
	}
}
