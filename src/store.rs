use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::trace;

use crate::snapshot::Snapshot;

/// Upper bound on synchronous snapshot replacements drained by one
/// external `set`. The cascade converges in a handful of steps; hitting
/// the cap means a subscriber keeps producing fresh snapshots forever,
/// which is a programming error.
pub const MAX_CASCADE_STEPS: usize = 1024;

type Listener = Rc<dyn Fn(&Snapshot, &Snapshot)>;

/// Holder of the current [`Snapshot`]. The snapshot is replaced
/// wholesale, never mutated, so a reader holding an old reference never
/// observes a torn state.
pub struct Store {
	body: Rc<StoreBody>,
}

struct StoreBody {
	snapshot: RefCell<Rc<Snapshot>>,
	subscribers: RefCell<SmallVec<[(u64, Listener); 2]>>,
	next_id: Cell<u64>,
	queue: RefCell<VecDeque<Rc<Snapshot>>>,
	draining: Cell<bool>,
}

impl Clone for Store {
	fn clone(&self) -> Self {
		Store {
			body: self.body.clone(),
		}
	}
}

impl Default for Store {
	fn default() -> Self {
		Store::new(Snapshot::default())
	}
}

impl Store {
	pub fn new(initial: Snapshot) -> Self {
		Store {
			body: Rc::new(StoreBody {
				snapshot: RefCell::new(Rc::new(initial)),
				subscribers: RefCell::new(SmallVec::new()),
				next_id: Cell::new(0),
				queue: RefCell::new(VecDeque::new()),
				draining: Cell::new(false),
			}),
		}
	}

	pub fn get(&self) -> Rc<Snapshot> {
		self.body.snapshot.borrow().clone()
	}

	/// Replaces the snapshot and synchronously notifies every subscriber
	/// with `(next, prev)`. Subscribers are free to call `set` again;
	/// re-entrant replacements are queued and drained here, so by the
	/// time the outermost `set` returns the store has converged.
	pub fn set(&self, next: Snapshot) {
		self.body.queue.borrow_mut().push_back(Rc::new(next));

		if self.body.draining.get() {
			return;
		}

		self.body.draining.set(true);

		let mut steps = 0;
		loop {
			let next = match self.body.queue.borrow_mut().pop_front() {
				Some(next) => next,
				None => break,
			};

			steps += 1;
			if steps > MAX_CASCADE_STEPS {
				self.body.draining.set(false);
				panic!("store did not converge after {MAX_CASCADE_STEPS} replacements");
			}

			let prev = std::mem::replace(&mut *self.body.snapshot.borrow_mut(), next.clone());

			// Subscribers may (un)subscribe while being notified.
			let subscribers = self.body.subscribers.borrow().clone();
			for (_, listener) in &subscribers {
				listener(&next, &prev);
			}
		}

		self.body.draining.set(false);
		trace!(steps, "store settled");
	}

	#[must_use]
	pub fn subscribe(&self, listener: impl Fn(&Snapshot, &Snapshot) + 'static) -> Subscription {
		let id = self.body.next_id.get();
		self.body.next_id.set(id + 1);
		self.body
			.subscribers
			.borrow_mut()
			.push((id, Rc::new(listener)));
		Subscription {
			id,
			body: Rc::downgrade(&self.body),
		}
	}
}

/// Keeps the listener registered; dropping it unsubscribes.
pub struct Subscription {
	id: u64,
	body: Weak<StoreBody>,
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(body) = self.body.upgrade() {
			body.subscribers.borrow_mut().retain(|(id, _)| *id != self.id);
		}
	}
}
