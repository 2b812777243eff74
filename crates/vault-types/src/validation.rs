//! Configuration validation for pluggable implementations.
//!
//! Storage backends and signing accounts receive their own raw TOML table.
//! Every setting they take is a string, so a [`Schema`] is a fixed list of
//! string fields, each optionally checked by a plain function.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(&'static str),
	#[error("Unknown field: {0}")]
	UnknownField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: &'static str, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: &'static str,
		actual: &'static str,
	},
}

/// Check run on a field's value; returns an error message on failure.
pub type Check = fn(&str) -> Result<(), String>;

/// A string setting in an implementation's table.
#[derive(Debug, Clone, Copy)]
pub struct Field {
	pub name: &'static str,
	pub required: bool,
	pub check: Option<Check>,
}

impl Field {
	pub const fn required(name: &'static str) -> Self {
		Self {
			name,
			required: true,
			check: None,
		}
	}

	pub const fn optional(name: &'static str) -> Self {
		Self {
			name,
			required: false,
			check: None,
		}
	}

	pub const fn check(self, check: Check) -> Self {
		Self {
			check: Some(check),
			..self
		}
	}
}

/// The settings an implementation accepts. Anything else in its table is
/// rejected so typos do not silently fall back to defaults.
#[derive(Debug, Clone, Copy)]
pub struct Schema(pub &'static [Field]);

impl Schema {
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table",
				actual: config.type_str(),
			})?;

		if let Some(unknown) = table
			.keys()
			.find(|key| !self.0.iter().any(|field| field.name == key.as_str()))
		{
			return Err(ValidationError::UnknownField(unknown.clone()));
		}

		for field in self.0 {
			let Some(value) = table.get(field.name) else {
				if field.required {
					return Err(ValidationError::MissingField(field.name));
				}
				continue;
			};
			let text = value.as_str().ok_or_else(|| ValidationError::TypeMismatch {
				field: field.name.to_string(),
				expected: "string",
				actual: value.type_str(),
			})?;
			if let Some(check) = field.check {
				check(text).map_err(|message| ValidationError::InvalidValue {
					field: field.name,
					message,
				})?;
			}
		}
		Ok(())
	}
}

/// A configuration schema that can validate an implementation's TOML table.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	const SCHEMA: Schema = Schema(&[
		Field::required("private_key").check(|key| {
			if key.trim_start_matches("0x").len() == 64 {
				Ok(())
			} else {
				Err("must be 32 bytes of hex".into())
			}
		}),
		Field::optional("label"),
	]);

	const KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn table(s: &str) -> toml::Value {
		toml::Value::Table(s.parse::<toml::Table>().unwrap())
	}

	#[test]
	fn test_missing_required_field() {
		assert_eq!(
			SCHEMA.validate(&table("label = \"hot\"")),
			Err(ValidationError::MissingField("private_key"))
		);
	}

	#[test]
	fn test_check_and_types() {
		assert!(matches!(
			SCHEMA.validate(&table("private_key = \"0x1234\"")),
			Err(ValidationError::InvalidValue { field: "private_key", .. })
		));
		assert!(matches!(
			SCHEMA.validate(&table(&format!("private_key = \"{KEY}\"\nlabel = 7"))),
			Err(ValidationError::TypeMismatch { expected: "string", actual: "integer", .. })
		));
		assert!(SCHEMA
			.validate(&table(&format!("private_key = \"{KEY}\"\nlabel = \"hot\"")))
			.is_ok());
	}

	#[test]
	fn test_unknown_fields_and_non_tables_rejected() {
		assert_eq!(
			SCHEMA.validate(&table(&format!("private_key = \"{KEY}\"\nprivate_kye = \"x\""))),
			Err(ValidationError::UnknownField("private_kye".into()))
		);
		assert!(matches!(
			SCHEMA.validate(&toml::Value::String(KEY.into())),
			Err(ValidationError::TypeMismatch { expected: "table", .. })
		));
	}
}
