//! Reentrancy guard around fund release.

use crate::VaultError;
use std::sync::atomic::{AtomicBool, Ordering};

/// Single-acquisition flag. Nested acquisition fails with
/// [`VaultError::ReentrantCall`] for as long as the outer handle lives.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
	entered: AtomicBool,
}

/// Holds the guard; releases it on drop, including on error paths.
#[derive(Debug)]
pub struct GuardHandle<'a> {
	entered: &'a AtomicBool,
}

impl ReentrancyGuard {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn enter(&self) -> Result<GuardHandle<'_>, VaultError> {
		self.entered
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.map_err(|_| VaultError::ReentrantCall)?;
		Ok(GuardHandle {
			entered: &self.entered,
		})
	}

	pub fn is_entered(&self) -> bool {
		self.entered.load(Ordering::Acquire)
	}
}

impl Drop for GuardHandle<'_> {
	fn drop(&mut self) {
		self.entered.store(false, Ordering::Release);
	}
}
