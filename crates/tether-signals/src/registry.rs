//! Process-wide default containers
//!
//! One container per channel type, created on first access and never torn
//! down. Applications that want isolation should own their containers and
//! boxes instead.

use crate::container::Container;
use crate::core::{Channel, ChannelName};
use crate::signal::Signal;
use crate::wire::Wire;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Default containers keyed by channel type
pub(crate) struct ContainerRegistry {
	containers: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl ContainerRegistry {
	fn new() -> Self {
		Self {
			containers: RwLock::new(HashMap::new()),
		}
	}

	/// Get or create the container for channel type `C`
	pub(crate) fn container<C: Channel>(&self) -> Container<C> {
		let type_id = TypeId::of::<C>();

		{
			let containers = self.containers.read();
			if let Some(container_any) = containers.get(&type_id)
				&& let Some(container) = container_any.downcast_ref::<Container<C>>()
			{
				return container.clone();
			}
		}

		let mut containers = self.containers.write();
		let entry = containers.entry(type_id).or_insert_with(|| {
			tracing::debug!(channel_type = std::any::type_name::<C>(), "default container created");
			Box::new(Container::<C>::new()) as Box<dyn Any + Send + Sync>
		});
		match entry.downcast_ref::<Container<C>>() {
			Some(container) => container.clone(),
			// Keyed by the type id of `C`, so the downcast cannot miss
			None => Container::new(),
		}
	}
}

static GLOBAL_REGISTRY: once_cell::sync::Lazy<ContainerRegistry> =
	once_cell::sync::Lazy::new(ContainerRegistry::new);

/// The process-wide container for channel type `C`
pub fn default_container<C: Channel>() -> Container<C> {
	GLOBAL_REGISTRY.container()
}

/// Get or create a signal in the process-wide signal container
///
/// ```
/// use tether_signals::default_signal;
///
/// let a = default_signal::<()>("app_started");
/// let b = default_signal::<()>("app_started");
/// assert!(a.ptr_eq(&b));
/// ```
pub fn default_signal<R: 'static>(name: impl Into<ChannelName>) -> Signal<R> {
	default_container::<Signal<R>>().get(name)
}

/// Get or create a wire in the process-wide wire container
pub fn default_wire<A: 'static, R: 'static>(name: impl Into<ChannelName>) -> Wire<A, R> {
	default_container::<Wire<A, R>>().get(name)
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_registry_returns_same_container_per_type() {
		// Arrange
		let registry = ContainerRegistry::new();

		// Act
		let first = registry.container::<Signal<i32>>();
		let second = registry.container::<Signal<i32>>();

		// Assert
		assert!(first.ptr_eq(&second));
	}

	#[rstest]
	fn test_registry_separates_channel_types() {
		// Arrange
		let registry = ContainerRegistry::new();

		// Act
		let signals = registry.container::<Signal<i32>>();
		signals.get("shared_name");
		let other = registry.container::<Signal<String>>();

		// Assert
		assert!(!other.contains("shared_name"));
		assert_eq!(registry.containers.read().len(), 2);
	}

	#[rstest]
	fn test_default_wire_is_shared() {
		// Arrange
		let wire = default_wire::<u8, u8>("registry_test_wire");
		wire.connect(|x| x + 1).unwrap();

		// Act
		let again = default_wire::<u8, u8>("registry_test_wire");

		// Assert
		assert_eq!(again.fetch(1).unwrap(), 2);
	}
}
