mod client;
mod engine;
mod error;
mod eval;
mod snapshot;
mod store;

pub use client::{
	Auth, Client, CollectionId, CollectionMeta, CollectionRef, ConnectParams, Document,
	DocumentId, DocumentSet, Factory, Metadata,
};
pub use engine::{Engine, DEFAULT_PEEK_LIMIT};
pub use error::{FetchError, Severity};
pub use eval::{assess, node_inputs, Decision, Inputs};
pub use snapshot::{NodeState, Reloads, Snapshot};
pub use store::{Store, Subscription, MAX_CASCADE_STEPS};

/// One derived slot in the dependency chain, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
	Connection,
	Collections,
	Collection,
	Documents,
	Document,
}

/// Topological evaluation order of the chain.
pub const CHAIN: [NodeId; 5] = [
	NodeId::Connection,
	NodeId::Collections,
	NodeId::Collection,
	NodeId::Documents,
	NodeId::Document,
];
