use std::hash::Hash;

use crate::snapshot::{NodeState, Snapshot};
use crate::NodeId;

/// Availability of one node's declared inputs in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inputs {
	/// Every input has a value; carries the node's current generation.
	Ready(u64),
	/// A required input has no value and will not get one without an
	/// upstream change, so the node must hold no value either.
	Missing,
	/// An upstream fetch is in flight; the node is left untouched until
	/// it settles.
	Busy,
}

/// What the controller should do with one node this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
	Unchanged,
	Invalidate,
	Fetch { inputs: u64 },
}

fn generation(inputs: &impl Hash) -> u64 {
	fxhash::hash64(inputs)
}

/// Computes the current input generation for `node`. Ancestor values
/// enter the hash through their settled `version`, so an ancestor
/// re-settling an identical value keeps the generation stable.
pub fn node_inputs(snapshot: &Snapshot, node: NodeId) -> Inputs {
	match node {
		NodeId::Connection => connection_inputs(snapshot),
		NodeId::Collections => collections_inputs(snapshot),
		NodeId::Collection => collection_inputs(snapshot),
		NodeId::Documents => documents_inputs(snapshot),
		NodeId::Document => document_inputs(snapshot),
	}
}

fn connection_inputs(snapshot: &Snapshot) -> Inputs {
	if !snapshot.confirmed {
		return Inputs::Missing;
	}

	Inputs::Ready(generation(&(&snapshot.params, snapshot.reloads.connection)))
}

fn collections_inputs(snapshot: &Snapshot) -> Inputs {
	match &snapshot.connection {
		NodeState::Settled { version, .. } => {
			Inputs::Ready(generation(&(*version, snapshot.reloads.collections)))
		}
		NodeState::Pending { .. } => Inputs::Busy,
		NodeState::Absent | NodeState::Failed { .. } => Inputs::Missing,
	}
}

fn collection_inputs(snapshot: &Snapshot) -> Inputs {
	let selected = match &snapshot.selected_collection {
		Some(id) => id,
		None => return Inputs::Missing,
	};

	match &snapshot.collections {
		NodeState::Settled { value, version, .. } => {
			// A selection that no longer resolves in the index never
			// reaches the fetch; the controller clears it separately.
			if !value.iter().any(|meta| meta.id == *selected) {
				return Inputs::Missing;
			}
			Inputs::Ready(generation(&(
				*version,
				selected,
				snapshot.reloads.collection,
			)))
		}
		NodeState::Pending { .. } => Inputs::Busy,
		NodeState::Absent | NodeState::Failed { .. } => Inputs::Missing,
	}
}

fn documents_inputs(snapshot: &Snapshot) -> Inputs {
	if !snapshot.load_documents {
		return Inputs::Missing;
	}

	match &snapshot.collection {
		NodeState::Settled { version, .. } => {
			Inputs::Ready(generation(&(*version, snapshot.reloads.documents)))
		}
		NodeState::Pending { .. } => Inputs::Busy,
		NodeState::Absent | NodeState::Failed { .. } => Inputs::Missing,
	}
}

fn document_inputs(snapshot: &Snapshot) -> Inputs {
	let selected = match &snapshot.selected_document {
		Some(id) => id,
		None => return Inputs::Missing,
	};

	match &snapshot.documents {
		NodeState::Settled { value, version, .. } => {
			if !value.contains(selected) {
				return Inputs::Missing;
			}
			Inputs::Ready(generation(&(*version, selected)))
		}
		NodeState::Pending { .. } => Inputs::Busy,
		NodeState::Absent | NodeState::Failed { .. } => Inputs::Missing,
	}
}

/// Decides what to do with one node given its recorded state and its
/// current inputs.
///
/// A `Failed` state keeps its generation: while the inputs that failed
/// are still current the node stays failed instead of refetching, so a
/// soft failure never turns into a retry loop. An input change or a
/// reload epoch bump produces a fresh generation and clears it.
pub fn assess<T>(state: &NodeState<T>, inputs: Inputs) -> Decision {
	match inputs {
		Inputs::Busy => Decision::Unchanged,
		Inputs::Missing => {
			if state.is_absent() {
				Decision::Unchanged
			} else {
				Decision::Invalidate
			}
		}
		Inputs::Ready(current) => match state.inputs() {
			Some(previous) if previous == current => Decision::Unchanged,
			_ => Decision::Fetch { inputs: current },
		},
	}
}
