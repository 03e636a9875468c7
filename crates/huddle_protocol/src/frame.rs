#![forbid(unsafe_code)]

use bytes::Bytes;

use crate::ProtocolError;

/// One message unit received on the real-time socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
	Binary(Bytes),
	Text(String),
}

impl Frame {
	pub fn len(&self) -> usize {
		match self {
			Frame::Binary(b) => b.len(),
			Frame::Text(t) => t.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Frame::Binary(_) => "binary",
			Frame::Text(_) => "text",
		}
	}

	/// Only binary frames carry application messages; text on this socket means the two
	/// framings got mixed up somewhere.
	pub fn into_binary(self) -> Result<Bytes, ProtocolError> {
		match self {
			Frame::Binary(b) => Ok(b),
			Frame::Text(t) => Err(ProtocolError::UnexpectedTextFrame { len: t.len() }),
		}
	}
}

impl From<Vec<u8>> for Frame {
	fn from(value: Vec<u8>) -> Self {
		Frame::Binary(Bytes::from(value))
	}
}

impl From<Bytes> for Frame {
	fn from(value: Bytes) -> Self {
		Frame::Binary(value)
	}
}
