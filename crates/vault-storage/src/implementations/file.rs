//! File-based storage backend.
//!
//! Each key is written to its own file under `storage_path`. Writes go to a
//! temporary file first and are renamed into place, so a crash never leaves
//! a half-written vault state behind.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use vault_types::{ConfigSchema, Field, ImplementationRegistry, Schema, ValidationError};

const DEFAULT_STORAGE_PATH: &str = "./data/vault";

/// File-based storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	/// Converts a storage key to a filesystem-safe file path.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.json", safe_key))
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);

		match fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		tracing::trace!(key = %key, path = ?path, "Stored value");
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		const SCHEMA: Schema = Schema(&[Field::optional("storage_path").check(|path| {
			if path.trim().is_empty() {
				return Err("storage_path cannot be empty".into());
			}
			Ok(())
		})]);
		SCHEMA.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for state files (default: "./data/vault")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH)
		.to_string();

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[tokio::test]
	async fn test_file_round_trip() {
		let dir = tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		let key = "vault_state:0x5fbdb2315678afecb367f032d93f642f64180aa3";
		storage.set_bytes(key, b"{}".to_vec()).await.unwrap();

		assert!(storage.exists(key).await.unwrap());
		assert_eq!(storage.get_bytes(key).await.unwrap(), b"{}".to_vec());
		assert!(dir
			.path()
			.join("vault_state_0x5fbdb2315678afecb367f032d93f642f64180aa3.json")
			.exists());

		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());
		// Deleting twice is fine.
		storage.delete(key).await.unwrap();
	}

	#[tokio::test]
	async fn test_missing_key_is_not_found() {
		let dir = tempdir().unwrap();
		let storage = FileStorage::new(dir.path().join("nested"));
		assert!(matches!(
			storage.get_bytes("events:x").await,
			Err(StorageError::NotFound)
		));
	}

	#[test]
	fn test_factory_validates_path() {
		let mut table = toml::map::Map::new();
		table.insert("storage_path".into(), toml::Value::String("  ".into()));
		assert!(matches!(
			create_storage(&toml::Value::Table(table)),
			Err(StorageError::Configuration(_))
		));

		let mut table = toml::map::Map::new();
		table.insert("storage_path".into(), toml::Value::Integer(3));
		assert!(create_storage(&toml::Value::Table(table)).is_err());
	}
}
