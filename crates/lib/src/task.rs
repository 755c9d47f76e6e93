//! Local task spawning.
//!
//! Deferred work (debounce timers, next-tick responder runs, fire-and-forget
//! query runs from scripts) is spawned with `tokio::task::spawn_local`, which
//! needs a [`LocalSet`]. Drive the application inside [`run_local`] so the
//! engine knows one is available; outside of it deferred work is skipped
//! with a warning instead of panicking.

use std::cell::Cell;
use std::future::Future;

use tokio::task::{JoinHandle, LocalSet};
use tracing::warn;

thread_local! {
  static LOCAL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct LocalGuard;

impl LocalGuard {
  fn enter() -> Self {
    LOCAL_DEPTH.with(|d| d.set(d.get() + 1));
    LocalGuard
  }
}

impl Drop for LocalGuard {
  fn drop(&mut self) {
    LOCAL_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
  }
}

/// Runs `future` to completion inside a fresh [`LocalSet`].
///
/// Tasks still pending when `future` completes are dropped with the set.
pub async fn run_local<F: Future>(future: F) -> F::Output {
  let local = LocalSet::new();
  let _guard = LocalGuard::enter();
  local.run_until(future).await
}

/// Whether [`spawn`] can currently place work on a local task set.
pub fn is_local_active() -> bool {
  LOCAL_DEPTH.with(|d| d.get() > 0)
}

/// Spawns `future` on the current local task set, if any.
pub fn spawn<F>(what: &str, future: F) -> Option<JoinHandle<F::Output>>
where
  F: Future + 'static,
  F::Output: 'static,
{
  if !is_local_active() {
    warn!(task = what, "no local task set is active, skipping deferred work");
    return None;
  }
  Some(tokio::task::spawn_local(future))
}
