use thiserror::Error;

use crate::NodeId;

/// Closed taxonomy of everything a node fetch can fail with.
///
/// Classification happens where the error is produced (the factory or the
/// client), never by inspecting message text downstream.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchError {
	#[error("connection could not be constructed: {0}")]
	Construction(String),

	#[error("referenced item no longer exists: {0}")]
	StaleReference(String),

	#[error("fetch failed: {0}")]
	Transient(String),

	#[error("connection rejected the request: {0}")]
	ConnectionFatal(String),
}

/// How a failure is absorbed by the cascade.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
	/// Reset the failed node and its descendants, keep the connection.
	Soft,
	/// Tear the whole chain down and force re-authentication.
	Hard,
}

impl FetchError {
	/// Failures at the root are always hard; elsewhere only
	/// connection-level errors escalate.
	pub fn severity(&self, node: NodeId) -> Severity {
		match self {
			FetchError::Construction(_) | FetchError::ConnectionFatal(_) => Severity::Hard,
			_ if node == NodeId::Connection => Severity::Hard,
			_ => Severity::Soft,
		}
	}

	pub fn is_hard(&self, node: NodeId) -> bool {
		self.severity(node) == Severity::Hard
	}
}
