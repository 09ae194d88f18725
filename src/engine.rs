use std::rc::{Rc, Weak};

use enclose::enclose;
use tracing::{debug, trace, warn};

use crate::client::{CollectionId, CollectionMeta, ConnectParams, DocumentId, Factory};
use crate::error::{FetchError, Severity};
use crate::eval::{assess, node_inputs, Decision};
use crate::snapshot::{NodeState, Snapshot};
use crate::store::{Store, Subscription};
use crate::NodeId;

/// How many documents a collection preview asks the remote system for.
pub const DEFAULT_PEEK_LIMIT: u32 = 100;

/// The cascade controller. Subscribes to its [`Store`] and keeps walking
/// the chain until no node is stale; external mutations go through the
/// setters, fetch completions re-enter through the store.
///
/// Fetches are spawned as local tasks, so the engine must live on a
/// thread driving a [`tokio::task::LocalSet`].
pub struct Engine {
	body: Rc<EngineBody>,
}

impl Clone for Engine {
	fn clone(&self) -> Self {
		Engine {
			body: self.body.clone(),
		}
	}
}

struct EngineBody {
	store: Store,
	factory: Box<dyn Factory>,
	peek_limit: u32,
	_subscription: Subscription,
}

impl Engine {
	pub fn new(store: Store, factory: impl Factory) -> Self {
		Engine::with_peek_limit(store, factory, DEFAULT_PEEK_LIMIT)
	}

	pub fn with_peek_limit(store: Store, factory: impl Factory, peek_limit: u32) -> Self {
		let body = Rc::new_cyclic(|this: &Weak<EngineBody>| {
			let subscription = store.subscribe(enclose!((this) move |_next, _prev| {
				if let Some(body) = this.upgrade() {
					EngineBody::scan(&body);
				}
			}));

			EngineBody {
				store: store.clone(),
				factory: Box::new(factory),
				peek_limit,
				_subscription: subscription,
			}
		});

		// Catch up with whatever the store already holds.
		EngineBody::scan(&body);

		Engine { body }
	}

	pub fn store(&self) -> &Store {
		&self.body.store
	}

	pub fn snapshot(&self) -> Rc<Snapshot> {
		self.body.store.get()
	}

	pub fn set_params(&self, params: ConnectParams) {
		self.mutate(|next| next.params = params);
	}

	/// Flipping this on starts the chain; the engine flips it back off
	/// on a hard failure to force re-authentication.
	pub fn set_confirmed(&self, confirmed: bool) {
		self.mutate(|next| next.confirmed = confirmed);
	}

	pub fn set_selected_collection(&self, id: Option<CollectionId>) {
		self.mutate(|next| next.selected_collection = id);
	}

	pub fn set_load_documents(&self, load: bool) {
		self.mutate(|next| next.load_documents = load);
	}

	pub fn set_selected_document(&self, id: Option<DocumentId>) {
		self.mutate(|next| next.selected_document = id);
	}

	/// Forces a refetch of `node` even when its inputs are unchanged.
	pub fn request_reload(&self, node: NodeId) {
		self.mutate(|next| next.reloads.bump(node));
	}

	fn mutate(&self, func: impl FnOnce(&mut Snapshot)) {
		let mut next = (*self.body.store.get()).clone();
		func(&mut next);
		self.body.store.set(next);
	}
}

impl EngineBody {
	/// One evaluation pass. Walks the chain top-down and performs the
	/// first state-changing action; the store notifies again once the
	/// action lands, which restarts the scan from the top. A pass that
	/// reaches the end without acting is the fixed point.
	fn scan(this: &Rc<EngineBody>) {
		let snapshot = this.store.get();

		let acted = Self::connection(this, &snapshot)
			|| Self::collections(this, &snapshot)
			|| Self::prune_collection(this, &snapshot)
			|| Self::collection(this, &snapshot)
			|| Self::documents(this, &snapshot)
			|| Self::prune_document(this, &snapshot)
			|| Self::document(this, &snapshot);

		if !acted {
			trace!("fixed point");
		}
	}

	fn replace(&self, snapshot: &Snapshot, func: impl FnOnce(&mut Snapshot)) {
		let mut next = snapshot.clone();
		func(&mut next);
		self.store.set(next);
	}

	fn connection(this: &Rc<EngineBody>, snapshot: &Snapshot) -> bool {
		match assess(&snapshot.connection, node_inputs(snapshot, NodeId::Connection)) {
			Decision::Unchanged => false,
			Decision::Invalidate => {
				debug!(node = ?NodeId::Connection, "reset");
				this.replace(snapshot, |next| next.connection = NodeState::Absent);
				true
			}
			Decision::Fetch { inputs } => {
				// The factory is synchronous; this node never passes
				// through `Pending`.
				match this.factory.build(&snapshot.params) {
					Ok(client) => {
						debug!(node = ?NodeId::Connection, "built");
						this.replace(snapshot, |next| {
							next.connection = NodeState::Settled {
								value: client,
								inputs,
								version: inputs,
							};
						});
					}
					Err(error) => Self::hard_failure(this, snapshot, NodeId::Connection, &error),
				}
				true
			}
		}
	}

	fn collections(this: &Rc<EngineBody>, snapshot: &Snapshot) -> bool {
		match assess(&snapshot.collections, node_inputs(snapshot, NodeId::Collections)) {
			Decision::Unchanged => false,
			Decision::Invalidate => {
				debug!(node = ?NodeId::Collections, "reset");
				this.replace(snapshot, |next| next.collections = NodeState::Absent);
				true
			}
			Decision::Fetch { inputs } => {
				let Some(client) = snapshot.connection.value() else {
					return false;
				};

				debug!(node = ?NodeId::Collections, "fetch");
				let future = client.list_collections();
				this.replace(snapshot, |next| {
					next.collections = NodeState::Pending { inputs }
				});

				let this = Rc::downgrade(this);
				tokio::task::spawn_local(async move {
					let result = future.await;
					let Some(this) = this.upgrade() else {
						return;
					};
					Self::settle_collections(&this, inputs, result);
				});
				true
			}
		}
	}

	fn settle_collections(
		this: &Rc<EngineBody>,
		issued: u64,
		result: Result<Vec<CollectionMeta>, FetchError>,
	) {
		let snapshot = this.store.get();
		if !still_pending(&snapshot.collections, issued) {
			trace!(node = ?NodeId::Collections, "stale response discarded");
			return;
		}

		match result {
			Ok(mut list) => {
				list.sort_by(|a, b| a.name.cmp(&b.name));
				this.replace(&snapshot, |next| {
					next.collections = NodeState::settled(Rc::new(list), issued);
				});
			}
			Err(error) => match error.severity(NodeId::Collections) {
				Severity::Hard => Self::hard_failure(this, &snapshot, NodeId::Collections, &error),
				Severity::Soft => {
					warn!(node = ?NodeId::Collections, %error, "fetch failed");
					this.replace(&snapshot, |next| {
						next.collections = NodeState::Failed {
							error,
							inputs: issued,
						};
					});
				}
			},
		}
	}

	/// A selection that no longer resolves in the settled index is
	/// cleared; one that still resolves survives a reload untouched.
	fn prune_collection(this: &Rc<EngineBody>, snapshot: &Snapshot) -> bool {
		let Some(selected) = &snapshot.selected_collection else {
			return false;
		};
		let Some(list) = snapshot.collections.value() else {
			return false;
		};
		if list.iter().any(|meta| meta.id == *selected) {
			return false;
		}

		debug!(%selected, "selected collection vanished from the index");
		this.replace(snapshot, |next| next.selected_collection = None);
		true
	}

	fn collection(this: &Rc<EngineBody>, snapshot: &Snapshot) -> bool {
		match assess(&snapshot.collection, node_inputs(snapshot, NodeId::Collection)) {
			Decision::Unchanged => false,
			Decision::Invalidate => {
				debug!(node = ?NodeId::Collection, "reset");
				this.replace(snapshot, |next| next.collection = NodeState::Absent);
				true
			}
			Decision::Fetch { inputs } => {
				let name = snapshot
					.selected_collection
					.as_ref()
					.and_then(|id| snapshot.meta(id))
					.map(|meta| meta.name.clone());
				let (Some(client), Some(name)) = (snapshot.connection.value(), name) else {
					return false;
				};

				debug!(node = ?NodeId::Collection, %name, "fetch");
				let future = client.open_collection(name);
				this.replace(snapshot, |next| {
					next.collection = NodeState::Pending { inputs }
				});

				let this = Rc::downgrade(this);
				tokio::task::spawn_local(async move {
					let result = future.await;
					let Some(this) = this.upgrade() else {
						return;
					};
					Self::settle_collection(&this, inputs, result);
				});
				true
			}
		}
	}

	fn settle_collection(
		this: &Rc<EngineBody>,
		issued: u64,
		result: Result<crate::client::CollectionRef, FetchError>,
	) {
		let snapshot = this.store.get();
		if !still_pending(&snapshot.collection, issued) {
			trace!(node = ?NodeId::Collection, "stale response discarded");
			return;
		}

		match result {
			Ok(collection) => {
				this.replace(&snapshot, |next| {
					next.collection = NodeState::settled(Rc::new(collection), issued);
				});
			}
			Err(error) => match error.severity(NodeId::Collection) {
				Severity::Hard => Self::hard_failure(this, &snapshot, NodeId::Collection, &error),
				Severity::Soft => {
					warn!(node = ?NodeId::Collection, %error, "fetch failed");
					this.replace(&snapshot, |next| {
						next.collection = NodeState::Failed {
							error,
							inputs: issued,
						};
					});
				}
			},
		}
	}

	fn documents(this: &Rc<EngineBody>, snapshot: &Snapshot) -> bool {
		match assess(&snapshot.documents, node_inputs(snapshot, NodeId::Documents)) {
			Decision::Unchanged => false,
			Decision::Invalidate => {
				debug!(node = ?NodeId::Documents, "reset");
				this.replace(snapshot, |next| next.documents = NodeState::Absent);
				true
			}
			Decision::Fetch { inputs } => {
				let (Some(client), Some(collection)) =
					(snapshot.connection.value(), snapshot.collection.value())
				else {
					return false;
				};

				debug!(node = ?NodeId::Documents, limit = this.peek_limit, "fetch");
				let future = client.peek(collection.as_ref().clone(), this.peek_limit);
				this.replace(snapshot, |next| {
					next.documents = NodeState::Pending { inputs }
				});

				let this = Rc::downgrade(this);
				tokio::task::spawn_local(async move {
					let result = future.await;
					let Some(this) = this.upgrade() else {
						return;
					};
					Self::settle_documents(&this, inputs, result);
				});
				true
			}
		}
	}

	fn settle_documents(
		this: &Rc<EngineBody>,
		issued: u64,
		result: Result<crate::client::DocumentSet, FetchError>,
	) {
		let snapshot = this.store.get();
		if !still_pending(&snapshot.documents, issued) {
			trace!(node = ?NodeId::Documents, "stale response discarded");
			return;
		}

		match result {
			Ok(documents) => {
				this.replace(&snapshot, |next| {
					next.documents = NodeState::settled(Rc::new(documents), issued);
				});
			}
			Err(error) => match error.severity(NodeId::Documents) {
				Severity::Hard => Self::hard_failure(this, &snapshot, NodeId::Documents, &error),
				Severity::Soft => {
					warn!(node = ?NodeId::Documents, %error, "fetch failed");
					this.replace(&snapshot, |next| {
						next.documents = NodeState::Failed {
							error,
							inputs: issued,
						};
					});
				}
			},
		}
	}

	fn prune_document(this: &Rc<EngineBody>, snapshot: &Snapshot) -> bool {
		let Some(selected) = &snapshot.selected_document else {
			return false;
		};
		let Some(set) = snapshot.documents.value() else {
			return false;
		};
		if set.contains(selected) {
			return false;
		}

		debug!(%selected, "selected document vanished from the set");
		this.replace(snapshot, |next| next.selected_document = None);
		true
	}

	/// The detail node is a synchronous projection out of the settled
	/// document set; it owns no remote call.
	fn document(this: &Rc<EngineBody>, snapshot: &Snapshot) -> bool {
		match assess(&snapshot.document, node_inputs(snapshot, NodeId::Document)) {
			Decision::Unchanged => false,
			Decision::Invalidate => {
				debug!(node = ?NodeId::Document, "reset");
				this.replace(snapshot, |next| next.document = NodeState::Absent);
				true
			}
			Decision::Fetch { inputs } => {
				let found = snapshot
					.selected_document
					.as_ref()
					.zip(snapshot.documents.value())
					.and_then(|(id, set)| set.find(id).cloned());
				let Some(found) = found else {
					return false;
				};

				debug!(node = ?NodeId::Document, "project");
				this.replace(snapshot, |next| {
					next.document = NodeState::settled(Rc::new(found), inputs);
				});
				true
			}
		}
	}

	/// Whole-chain teardown: every node back to `Absent` and the
	/// confirmed flag off, sending the embedding UI back to
	/// authentication. Parameters, selections and reload epochs survive
	/// for the next login.
	fn hard_failure(this: &Rc<EngineBody>, snapshot: &Snapshot, node: NodeId, error: &FetchError) {
		warn!(node = ?node, %error, "connection failure, forcing re-authentication");
		this.replace(snapshot, |next| {
			next.confirmed = false;
			next.connection = NodeState::Absent;
			next.collections = NodeState::Absent;
			next.collection = NodeState::Absent;
			next.documents = NodeState::Absent;
			next.document = NodeState::Absent;
		});
	}
}

fn still_pending<T>(state: &NodeState<T>, issued: u64) -> bool {
	matches!(state, NodeState::Pending { inputs } if *inputs == issued)
}
