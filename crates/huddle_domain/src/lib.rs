#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

fn non_empty(value: String) -> Result<String, ParseIdError> {
	if value.trim().is_empty() {
		return Err(ParseIdError::Empty);
	}
	Ok(value)
}

/// Identities end up as a path segment of the socket address.
fn path_segment(value: String) -> Result<String, ParseIdError> {
	let value = non_empty(value)?;
	if let Some(c) = value
		.chars()
		.find(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace())
	{
		return Err(ParseIdError::InvalidFormat(format!(
			"{c:?} is not allowed in a path segment: {value}"
		)));
	}
	Ok(value)
}

macro_rules! string_id {
	($(#[$meta:meta])* $name:ident, $check:path) => {
		$(#[$meta])*
		#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);

		impl $name {
			pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
				$check(id.into()).map(Self)
			}
			pub fn as_str(&self) -> &str {
				&self.0
			}
			pub fn into_string(self) -> String {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl FromStr for $name {
			type Err = ParseIdError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s.to_string())
			}
		}

		impl TryFrom<String> for $name {
			type Error = ParseIdError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				Self::new(value)
			}
		}

		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}

		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
	};
}

string_id!(
	/// Opaque token naming the local user to the backend and to the socket address.
	Identity,
	path_segment
);

string_id!(
	/// Backend-assigned group identifier.
	GroupId,
	non_empty
);

string_id!(
	/// Key package identifier as listed by the package index.
	PackageId,
	non_empty
);

string_id!(
	/// Display name used when creating the local user.
	UserName,
	non_empty
);
