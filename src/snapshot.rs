use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use crate::client::{
	Client, CollectionId, CollectionMeta, CollectionRef, ConnectParams, Document, DocumentId,
	DocumentSet,
};
use crate::error::FetchError;
use crate::NodeId;

/// One derived slot in the chain.
///
/// `inputs` is the generation hash of the declared inputs the state was
/// produced under; `version` is the hash of the settled value itself, so
/// re-settling an identical value is invisible to descendants.
#[derive(Clone, PartialEq)]
pub enum NodeState<T> {
	Absent,
	Pending { inputs: u64 },
	Settled { value: T, inputs: u64, version: u64 },
	Failed { error: FetchError, inputs: u64 },
}

impl<T> NodeState<T> {
	pub fn settled(value: T, inputs: u64) -> Self
	where
		T: Hash,
	{
		let version = fxhash::hash64(&value);
		NodeState::Settled {
			value,
			inputs,
			version,
		}
	}

	pub fn value(&self) -> Option<&T> {
		match self {
			NodeState::Settled { value, .. } => Some(value),
			_ => None,
		}
	}

	pub fn version(&self) -> Option<u64> {
		match self {
			NodeState::Settled { version, .. } => Some(*version),
			_ => None,
		}
	}

	/// Generation the current state was produced (or failed) under.
	pub fn inputs(&self) -> Option<u64> {
		match self {
			NodeState::Absent => None,
			NodeState::Pending { inputs }
			| NodeState::Settled { inputs, .. }
			| NodeState::Failed { inputs, .. } => Some(*inputs),
		}
	}

	pub fn error(&self) -> Option<&FetchError> {
		match self {
			NodeState::Failed { error, .. } => Some(error),
			_ => None,
		}
	}

	pub fn is_absent(&self) -> bool {
		matches!(self, NodeState::Absent)
	}

	pub fn is_pending(&self) -> bool {
		matches!(self, NodeState::Pending { .. })
	}

	pub fn is_settled(&self) -> bool {
		matches!(self, NodeState::Settled { .. })
	}

	pub fn phase(&self) -> &'static str {
		match self {
			NodeState::Absent => "absent",
			NodeState::Pending { .. } => "pending",
			NodeState::Settled { .. } => "settled",
			NodeState::Failed { .. } => "failed",
		}
	}
}

impl<T> Default for NodeState<T> {
	fn default() -> Self {
		NodeState::Absent
	}
}

impl<T> fmt::Debug for NodeState<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			NodeState::Failed { error, .. } => write!(f, "failed({error})"),
			other => f.write_str(other.phase()),
		}
	}
}

/// Per-node reload epochs. Bumping one forces the node's next input
/// generation to differ even when nothing else changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Reloads {
	pub connection: u64,
	pub collections: u64,
	pub collection: u64,
	pub documents: u64,
}

impl Reloads {
	pub fn bump(&mut self, node: NodeId) {
		match node {
			NodeId::Connection => self.connection += 1,
			NodeId::Collections => self.collections += 1,
			NodeId::Collection => self.collection += 1,
			// The detail node owns no fetch; reloading it means
			// reloading the set it projects from.
			NodeId::Documents | NodeId::Document => self.documents += 1,
		}
	}
}

/// Immutable full state of the chain at one instant. Only ever replaced
/// wholesale through the store, never mutated in place.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
	pub params: ConnectParams,
	pub confirmed: bool,
	pub selected_collection: Option<CollectionId>,
	pub load_documents: bool,
	pub selected_document: Option<DocumentId>,
	pub reloads: Reloads,

	pub connection: NodeState<Rc<dyn Client>>,
	pub collections: NodeState<Rc<Vec<CollectionMeta>>>,
	pub collection: NodeState<Rc<CollectionRef>>,
	pub documents: NodeState<Rc<DocumentSet>>,
	pub document: NodeState<Rc<Document>>,
}

impl Snapshot {
	pub fn new(params: ConnectParams) -> Self {
		Snapshot {
			params,
			..Default::default()
		}
	}

	pub fn meta(&self, id: &str) -> Option<&CollectionMeta> {
		self.collections
			.value()
			.and_then(|list| list.iter().find(|meta| meta.id == id))
	}

	pub fn phase(&self, node: NodeId) -> &'static str {
		match node {
			NodeId::Connection => self.connection.phase(),
			NodeId::Collections => self.collections.phase(),
			NodeId::Collection => self.collection.phase(),
			NodeId::Documents => self.documents.phase(),
			NodeId::Document => self.document.phase(),
		}
	}
}

impl PartialEq for Snapshot {
	fn eq(&self, other: &Self) -> bool {
		// The client handle has no value hash; identity plus the
		// generation it was built under stands in for equality.
		let connection = match (&self.connection, &other.connection) {
			(NodeState::Absent, NodeState::Absent) => true,
			(NodeState::Pending { inputs: a }, NodeState::Pending { inputs: b }) => a == b,
			(
				NodeState::Settled {
					value: a,
					inputs: ai,
					..
				},
				NodeState::Settled {
					value: b,
					inputs: bi,
					..
				},
			) => Rc::ptr_eq(a, b) && ai == bi,
			(
				NodeState::Failed {
					error: a,
					inputs: ai,
				},
				NodeState::Failed {
					error: b,
					inputs: bi,
				},
			) => a == b && ai == bi,
			_ => false,
		};

		connection
			&& self.params == other.params
			&& self.confirmed == other.confirmed
			&& self.selected_collection == other.selected_collection
			&& self.load_documents == other.load_documents
			&& self.selected_document == other.selected_document
			&& self.reloads == other.reloads
			&& self.collections == other.collections
			&& self.collection == other.collection
			&& self.documents == other.documents
			&& self.document == other.document
	}
}
