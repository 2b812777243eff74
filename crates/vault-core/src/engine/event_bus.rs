//! Broadcast bus for vault audit events.

use tokio::sync::broadcast;
use vault_types::VaultEvent;

/// Fan-out channel for audit events. Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<VaultEvent>,
}

impl EventBus {
	/// Creates a bus that buffers up to `capacity` events per subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event. Fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: VaultEvent,
	) -> Result<(), broadcast::error::SendError<VaultEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1000)
	}
}
