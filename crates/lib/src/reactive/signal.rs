use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::{NodeId, Source, Subscriber, Subscribers, flush, next_id, track};

struct SignalInner<T> {
  id: NodeId,
  value: RefCell<T>,
  subscribers: Subscribers,
}

impl<T> Source for SignalInner<T> {
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

/// A mutable reactive cell.
///
/// Cloning a `Signal` yields another handle to the same cell. Reads through
/// [`get`](Signal::get) or [`with`](Signal::with) inside a memo or effect body
/// subscribe that body to the cell.
pub struct Signal<T: 'static> {
  inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Clone for Signal<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Rc::clone(&self.inner),
    }
  }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Signal<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Signal")
      .field("id", &self.inner.id)
      .field("value", &self.inner.value.borrow())
      .finish()
  }
}

impl<T: 'static> Signal<T> {
  pub fn new(value: T) -> Self {
    Self {
      inner: Rc::new(SignalInner {
        id: next_id(),
        value: RefCell::new(value),
        subscribers: Subscribers::default(),
      }),
    }
  }

  /// Borrow the current value, subscribing the running observer.
  ///
  /// `f` must not write to this same signal.
  pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
    track(self.inner.clone());
    f(&self.inner.value.borrow())
  }

  pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
    f(&self.inner.value.borrow())
  }

  /// Mutate in place and notify subscribers unconditionally.
  pub fn update(&self, f: impl FnOnce(&mut T)) {
    f(&mut self.inner.value.borrow_mut());
    self.inner.subscribers.notify();
    flush();
  }

  /// Number of live subscriptions, mostly useful for leak checks in tests.
  pub fn subscriber_count(&self) -> usize {
    self.inner.subscribers.len()
  }
}

impl<T: Clone + 'static> Signal<T> {
  pub fn get(&self) -> T {
    self.with(T::clone)
  }

  pub fn get_untracked(&self) -> T {
    self.with_untracked(T::clone)
  }
}

impl<T: PartialEq + 'static> Signal<T> {
  /// Replace the value. Subscribers are notified only when it changed.
  pub fn set(&self, value: T) {
    {
      let mut current = self.inner.value.borrow_mut();
      if *current == value {
        return;
      }
      *current = value;
    }
    self.inner.subscribers.notify();
    flush();
  }
}
