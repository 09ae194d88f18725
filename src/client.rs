use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;

use crate::error::FetchError;

pub type CollectionId = String;
pub type DocumentId = String;

/// Opaque key/value metadata attached to collections and documents.
pub type Metadata = Vec<(String, String)>;

#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub enum Auth {
	#[default]
	None,
	Bearer(String),
	Basic { username: String, password: String },
}

impl fmt::Debug for Auth {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// Credentials stay out of logs.
		match self {
			Auth::None => f.write_str("None"),
			Auth::Bearer(_) => f.write_str("Bearer(..)"),
			Auth::Basic { username, .. } => f
				.debug_struct("Basic")
				.field("username", username)
				.finish_non_exhaustive(),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct ConnectParams {
	pub endpoint: String,
	pub auth: Auth,
	pub tenant: Option<String>,
	pub database: Option<String>,
}

impl ConnectParams {
	pub fn new(endpoint: impl Into<String>) -> Self {
		ConnectParams {
			endpoint: endpoint.into(),
			..Default::default()
		}
	}

	pub fn with_auth(mut self, auth: Auth) -> Self {
		self.auth = auth;
		self
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionMeta {
	pub id: CollectionId,
	pub name: String,
	pub metadata: Metadata,
}

/// Handle to one opened collection, as returned by the remote system.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionRef {
	pub id: CollectionId,
	pub name: String,
	pub metadata: Metadata,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Document {
	pub id: DocumentId,
	pub content: Option<String>,
	pub metadata: Metadata,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct DocumentSet {
	pub documents: Vec<Document>,
}

impl DocumentSet {
	pub fn find(&self, id: &str) -> Option<&Document> {
		self.documents.iter().find(|doc| doc.id == id)
	}

	pub fn contains(&self, id: &str) -> bool {
		self.find(id).is_some()
	}

	pub fn len(&self) -> usize {
		self.documents.len()
	}

	pub fn is_empty(&self) -> bool {
		self.documents.is_empty()
	}
}

/// The remote system as the chain consumes it. Implementations own the
/// wire protocol; every failure must arrive as an explicit [`FetchError`].
pub trait Client: 'static {
	fn list_collections(&self) -> LocalBoxFuture<'static, Result<Vec<CollectionMeta>, FetchError>>;

	fn open_collection(
		&self,
		name: String,
	) -> LocalBoxFuture<'static, Result<CollectionRef, FetchError>>;

	fn peek(
		&self,
		collection: CollectionRef,
		limit: u32,
	) -> LocalBoxFuture<'static, Result<DocumentSet, FetchError>>;
}

/// Builds a live client handle out of connection parameters.
///
/// Synchronous, and must not panic on bad parameters; a failed attempt
/// comes back as [`FetchError::Construction`]. Retries belong to the
/// caller.
pub trait Factory: 'static {
	fn build(&self, params: &ConnectParams) -> Result<Rc<dyn Client>, FetchError>;
}

impl<F> Factory for F
where
	F: Fn(&ConnectParams) -> Result<Rc<dyn Client>, FetchError> + 'static,
{
	fn build(&self, params: &ConnectParams) -> Result<Rc<dyn Client>, FetchError> {
		self(params)
	}
}
