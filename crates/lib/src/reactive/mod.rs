//! Minimal fine-grained reactive cells.
//!
//! The engine needs three primitives:
//! - [`Signal`]: a mutable cell; reading it inside a derived body subscribes
//! - [`Memo`]: a lazily recomputed derived value with dirty-flag propagation
//! - [`Effect`]: a side-effecting body that re-runs when anything it read changes
//!
//! Everything is single-threaded. A thread-local observer stack records which
//! cell is currently computing so that reads register subscriptions
//! automatically. Effects never run while a memo is computing, another effect
//! is running, or a [`batch`] is open; they are queued and flushed once the
//! outermost of those returns.

mod effect;
mod memo;
mod signal;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use tracing::error;

pub use effect::Effect;
pub use memo::Memo;
pub use signal::Signal;

/// Identifier shared by every reactive node.
pub(crate) type NodeId = u64;

/// Upper bound on effect runs in one flush before the queue is abandoned.
const MAX_FLUSH_RUNS: usize = 100_000;

thread_local! {
  static NEXT_ID: Cell<NodeId> = const { Cell::new(1) };
  static OBSERVERS: RefCell<Vec<Option<Rc<dyn Subscriber>>>> = const { RefCell::new(Vec::new()) };
  static HOLD: Cell<usize> = const { Cell::new(0) };
  static FLUSHING: Cell<bool> = const { Cell::new(false) };
  static PENDING: RefCell<VecDeque<Rc<effect::EffectInner>>> = const { RefCell::new(VecDeque::new()) };
}

/// A node that can be read and therefore subscribed to.
pub(crate) trait Source {
  fn node_id(&self) -> NodeId;
  fn subscribe(&self, id: NodeId, subscriber: Weak<dyn Subscriber>);
  fn unsubscribe(&self, id: NodeId);
}

/// A node that reads other nodes and wants to hear about their changes.
pub(crate) trait Subscriber {
  fn node_id(&self) -> NodeId;
  fn notify(&self);
  fn add_source(&self, source: Rc<dyn Source>);
}

pub(crate) fn next_id() -> NodeId {
  NEXT_ID.with(|next| {
    let id = next.get();
    next.set(id + 1);
    id
  })
}

/// Subscriber list held by every [`Source`].
#[derive(Default)]
pub(crate) struct Subscribers {
  list: RefCell<Vec<(NodeId, Weak<dyn Subscriber>)>>,
}

impl Subscribers {
  pub(crate) fn add(&self, id: NodeId, subscriber: Weak<dyn Subscriber>) {
    let mut list = self.list.borrow_mut();
    if !list.iter().any(|(existing, _)| *existing == id) {
      list.push((id, subscriber));
    }
  }

  pub(crate) fn remove(&self, id: NodeId) {
    self.list.borrow_mut().retain(|(existing, _)| *existing != id);
  }

  pub(crate) fn len(&self) -> usize {
    self.list.borrow().len()
  }

  /// Notify every live subscriber. The list is copied out first so that
  /// subscribers may (un)subscribe while being notified.
  pub(crate) fn notify(&self) {
    let live: Vec<Rc<dyn Subscriber>> = {
      let mut list = self.list.borrow_mut();
      list.retain(|(_, weak)| weak.strong_count() > 0);
      list.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
    };
    for subscriber in live {
      subscriber.notify();
    }
  }
}

/// Source list held by every [`Subscriber`].
#[derive(Default)]
pub(crate) struct Sources {
  list: RefCell<Vec<Rc<dyn Source>>>,
}

impl Sources {
  pub(crate) fn add(&self, source: Rc<dyn Source>) {
    let mut list = self.list.borrow_mut();
    if !list.iter().any(|existing| existing.node_id() == source.node_id()) {
      list.push(source);
    }
  }

  /// Drop every subscription held by `owner`.
  pub(crate) fn clear(&self, owner: NodeId) {
    for source in self.list.take() {
      source.unsubscribe(owner);
    }
  }
}

/// Register `source` with the observer currently on top of the stack, if any.
pub(crate) fn track(source: Rc<dyn Source>) {
  let observer = OBSERVERS.with(|stack| stack.borrow().last().cloned().flatten());
  if let Some(observer) = observer {
    source.subscribe(observer.node_id(), Rc::downgrade(&observer));
    observer.add_source(source);
  }
}

struct ObserverGuard;

impl Drop for ObserverGuard {
  fn drop(&mut self) {
    OBSERVERS.with(|stack| {
      stack.borrow_mut().pop();
    });
  }
}

pub(crate) fn with_observer<R>(observer: Option<Rc<dyn Subscriber>>, f: impl FnOnce() -> R) -> R {
  OBSERVERS.with(|stack| stack.borrow_mut().push(observer));
  let _guard = ObserverGuard;
  f()
}

struct HoldGuard;

impl Drop for HoldGuard {
  fn drop(&mut self) {
    HOLD.with(|hold| hold.set(hold.get().saturating_sub(1)));
  }
}

/// Run `f` with effect flushing suspended. Does not flush afterwards.
pub(crate) fn hold<R>(f: impl FnOnce() -> R) -> R {
  HOLD.with(|hold| hold.set(hold.get() + 1));
  let _guard = HoldGuard;
  f()
}

/// Run `f` without registering any subscription for the reads it performs.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
  with_observer(None, f)
}

/// Apply several changes and run the affected effects once, afterwards.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
  let result = hold(f);
  flush();
  result
}

pub(crate) fn enqueue(effect: Rc<effect::EffectInner>) {
  PENDING.with(|pending| pending.borrow_mut().push_back(effect));
}

struct FlushGuard;

impl Drop for FlushGuard {
  fn drop(&mut self) {
    FLUSHING.with(|flushing| flushing.set(false));
  }
}

/// Run queued effects unless a hold or another flush is active.
pub(crate) fn flush() {
  if HOLD.with(|hold| hold.get()) > 0 || FLUSHING.with(|flushing| flushing.get()) {
    return;
  }
  FLUSHING.with(|flushing| flushing.set(true));
  let _guard = FlushGuard;

  let mut runs = 0usize;
  while let Some(effect) = PENDING.with(|pending| pending.borrow_mut().pop_front()) {
    runs += 1;
    if runs > MAX_FLUSH_RUNS {
      error!(runs, "effect flush did not settle, dropping pending effects");
      PENDING.with(|pending| pending.borrow_mut().clear());
      break;
    }
    effect.run_queued();
  }
}
