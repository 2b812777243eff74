//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Each pluggable module (storage backends, signing accounts) provides a
/// `Registry` struct implementing this trait, declaring the name used in the
/// configuration file and the factory that builds it.
pub trait ImplementationRegistry {
	/// Name used as the key under `<section>.implementations` in the TOML
	/// configuration, e.g. "memory" for `storage.implementations.memory`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
