use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::{NodeId, Source, Sources, Subscriber, enqueue, flush, hold, next_id, with_observer};

pub(crate) struct EffectInner {
  id: NodeId,
  body: RefCell<Box<dyn FnMut()>>,
  sources: Sources,
  queued: Cell<bool>,
  running: Cell<bool>,
  disposed: Cell<bool>,
  this: Weak<EffectInner>,
}

struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
  fn drop(&mut self) {
    self.0.set(false);
  }
}

impl EffectInner {
  fn execute(&self) {
    if self.disposed.get() {
      return;
    }
    if self.running.get() {
      self.schedule();
      return;
    }
    self.running.set(true);
    let _guard = RunningGuard(&self.running);

    self.sources.clear(self.id);
    let observer = self.this.upgrade().map(|rc| rc as Rc<dyn Subscriber>);
    hold(|| {
      with_observer(observer, || {
        let mut body = self.body.borrow_mut();
        body();
      })
    });
  }

  fn schedule(&self) {
    if self.queued.get() || self.disposed.get() {
      return;
    }
    if let Some(this) = self.this.upgrade() {
      self.queued.set(true);
      enqueue(this);
    }
  }

  pub(crate) fn run_queued(&self) {
    self.queued.set(false);
    self.execute();
  }

  fn dispose(&self) {
    self.disposed.set(true);
    self.sources.clear(self.id);
  }
}

impl Subscriber for EffectInner {
  fn node_id(&self) -> NodeId {
    self.id
  }

  fn notify(&self) {
    self.schedule();
  }

  fn add_source(&self, source: Rc<dyn Source>) {
    self.sources.add(source);
  }
}

/// A side-effecting body that re-runs whenever a cell it read changes.
///
/// The body runs once immediately. Dropping the handle disposes the effect.
pub struct Effect {
  inner: Rc<EffectInner>,
}

impl Effect {
  pub fn new(body: impl FnMut() + 'static) -> Self {
    let inner = Rc::new_cyclic(|this| EffectInner {
      id: next_id(),
      body: RefCell::new(Box::new(body)),
      sources: Sources::default(),
      queued: Cell::new(false),
      running: Cell::new(false),
      disposed: Cell::new(false),
      this: this.clone(),
    });
    inner.execute();
    flush();
    Self { inner }
  }

  /// Stop reacting and release every subscription.
  pub fn dispose(&self) {
    self.inner.dispose();
  }

  pub fn is_disposed(&self) -> bool {
    self.inner.disposed.get()
  }
}

impl Drop for Effect {
  fn drop(&mut self) {
    self.inner.dispose();
  }
}

impl std::fmt::Debug for Effect {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Effect")
      .field("id", &self.inner.id)
      .field("disposed", &self.inner.disposed.get())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::reactive::Signal;

  #[test]
  fn effect_writing_its_own_source_settles() {
    let counter = Signal::new(0);
    let runs = Rc::new(Cell::new(0));
    let _effect = {
      let (counter, runs) = (counter.clone(), runs.clone());
      Effect::new(move || {
        runs.set(runs.get() + 1);
        let value = counter.get();
        if value < 3 {
          counter.set(value + 1);
        }
      })
    };

    assert_eq!(counter.get_untracked(), 3);
    assert_eq!(runs.get(), 4);
  }

  #[test]
  fn disposed_effect_stops_running() {
    let source = Signal::new(0);
    let runs = Rc::new(Cell::new(0));
    let effect = {
      let (source, runs) = (source.clone(), runs.clone());
      Effect::new(move || {
        source.get();
        runs.set(runs.get() + 1);
      })
    };

    effect.dispose();
    source.set(1);
    assert_eq!(runs.get(), 1);
    assert!(effect.is_disposed());
  }
}
