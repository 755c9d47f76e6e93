use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use super::{NodeId, Source, Sources, Subscriber, Subscribers, hold, next_id, track, with_observer};

struct MemoInner<T> {
  id: NodeId,
  compute: Box<dyn Fn() -> T>,
  cached: RefCell<Option<T>>,
  dirty: Cell<bool>,
  computing: Cell<bool>,
  version: Cell<u64>,
  sources: Sources,
  subscribers: Subscribers,
  this: Weak<MemoInner<T>>,
}

struct ComputingGuard<'a>(&'a Cell<bool>);

impl Drop for ComputingGuard<'_> {
  fn drop(&mut self) {
    self.0.set(false);
  }
}

impl<T: Clone + Default + 'static> MemoInner<T> {
  fn value(&self) -> T {
    if self.dirty.get() {
      self.recompute();
    }
    self.cached.borrow().clone().unwrap_or_default()
  }

  fn recompute(&self) {
    if self.computing.get() {
      warn!(memo = self.id, "reactive cycle detected, serving last cached value");
      return;
    }
    self.computing.set(true);
    let _guard = ComputingGuard(&self.computing);

    self.sources.clear(self.id);
    // Cleared before computing so a change that lands mid-computation
    // leaves the memo dirty again.
    self.dirty.set(false);

    let observer = self.this.upgrade().map(|rc| rc as Rc<dyn Subscriber>);
    let value = hold(|| with_observer(observer, || (self.compute)()));
    *self.cached.borrow_mut() = Some(value);
    self.version.set(self.version.get() + 1);
  }
}

impl<T> Source for MemoInner<T> {
  fn node_id(&self) -> NodeId {
    self.id
  }

  fn subscribe(&self, id: NodeId, subscriber: Weak<dyn Subscriber>) {
    self.subscribers.add(id, subscriber);
  }

  fn unsubscribe(&self, id: NodeId) {
    self.subscribers.remove(id);
  }
}

impl<T> Subscriber for MemoInner<T> {
  fn node_id(&self) -> NodeId {
    self.id
  }

  fn notify(&self) {
    if !self.dirty.get() {
      self.dirty.set(true);
      self.subscribers.notify();
    }
  }

  fn add_source(&self, source: Rc<dyn Source>) {
    self.sources.add(source);
  }
}

/// A lazily evaluated, memoized value derived from other cells.
///
/// The compute function runs on the first read and again on the first read
/// after any cell it touched has changed. Cloning yields another handle to
/// the same memo.
pub struct Memo<T: 'static> {
  inner: Rc<MemoInner<T>>,
}

impl<T: 'static> Clone for Memo<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Rc::clone(&self.inner),
    }
  }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Memo<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Memo")
      .field("id", &self.inner.id)
      .field("cached", &self.inner.cached.borrow())
      .field("dirty", &self.inner.dirty.get())
      .field("version", &self.inner.version.get())
      .finish()
  }
}

impl<T: Clone + Default + 'static> Memo<T> {
  pub fn new(compute: impl Fn() -> T + 'static) -> Self {
    let inner = Rc::new_cyclic(|this| MemoInner {
      id: next_id(),
      compute: Box::new(compute),
      cached: RefCell::new(None),
      dirty: Cell::new(true),
      computing: Cell::new(false),
      version: Cell::new(0),
      sources: Sources::default(),
      subscribers: Subscribers::default(),
      this: this.clone(),
    });
    Self { inner }
  }

  /// Current value, recomputed if stale. Subscribes the running observer.
  pub fn get(&self) -> T {
    track(self.inner.clone());
    self.inner.value()
  }

  pub fn get_untracked(&self) -> T {
    self.inner.value()
  }

  /// Mark the memo stale and notify its subscribers.
  pub fn invalidate(&self) {
    self.inner.notify();
    super::flush();
  }

  /// Number of recomputations so far.
  pub fn version(&self) -> u64 {
    self.inner.version.get()
  }
}
