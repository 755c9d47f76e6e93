use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::Map as JsonMap;

use super::builtins;
use super::value::Value;

/// Names that reach the scope object itself.
pub const GLOBAL_ALIASES: &[&str] = &["globalThis", "window", "self", "global"];

/// Host capabilities an expression must never reach. Each resolves to
/// [`Value::Inert`].
pub const DENYLIST: &[&str] = &[
  // dynamic code
  "eval",
  "Function",
  "AsyncFunction",
  "GeneratorFunction",
  "Reflect",
  "Proxy",
  // network
  "fetch",
  "XMLHttpRequest",
  "WebSocket",
  "EventSource",
  // DOM and global handles
  "document",
  "navigator",
  "location",
  "history",
  "localStorage",
  "sessionStorage",
  "indexedDB",
  "caches",
  "cookieStore",
  "parent",
  "top",
  "frames",
  "opener",
  // timers
  "setTimeout",
  "setInterval",
  "setImmediate",
  "clearTimeout",
  "clearInterval",
  "requestAnimationFrame",
  "queueMicrotask",
  // module loaders and workers
  "importScripts",
  "Worker",
  "SharedWorker",
  "require",
  "module",
  "exports",
  "process",
  // prototype handles
  "constructor",
  "__proto__",
  "prototype",
];

pub fn is_prototype_handle(name: &str) -> bool {
  matches!(name, "constructor" | "__proto__" | "prototype" | "__defineGetter__" | "__defineSetter__")
}

/// Interception layer between an expression and its caller context.
///
/// Context entries are converted on first access and cached for the lifetime
/// of this scope, which is a single evaluation call. Converted values are
/// immutable; the interpreter has no operation that writes through them.
pub struct Scope<'a> {
  context: &'a JsonMap<String, serde_json::Value>,
  cache: RefCell<HashMap<String, Value>>,
}

impl<'a> Scope<'a> {
  pub fn new(context: &'a JsonMap<String, serde_json::Value>) -> Self {
    Self {
      context,
      cache: RefCell::new(HashMap::new()),
    }
  }

  /// Resolves a name that is not bound locally.
  pub fn lookup(&self, name: &str) -> Value {
    if GLOBAL_ALIASES.contains(&name) {
      return Value::Scope;
    }
    if DENYLIST.contains(&name) {
      return Value::Inert;
    }
    if let Some(cached) = self.cache.borrow().get(name) {
      return cached.clone();
    }
    if let Some(json) = self.context.get(name) {
      let value = Value::from_json(json);
      self.cache.borrow_mut().insert(name.to_string(), value.clone());
      return value;
    }
    builtins::global(name).unwrap_or(Value::Undefined)
  }

  #[cfg(test)]
  fn cached_len(&self) -> usize {
    self.cache.borrow().len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn context() -> JsonMap<String, serde_json::Value> {
    json!({ "user": { "name": "Ada" }, "Math": 1 }).as_object().cloned().unwrap()
  }

  #[test]
  fn lookup_order() {
    let ctx = context();
    let scope = Scope::new(&ctx);
    assert!(matches!(scope.lookup("window"), Value::Scope));
    assert!(matches!(scope.lookup("fetch"), Value::Inert));
    // context shadows built-ins
    assert!(matches!(scope.lookup("Math"), Value::Number(n) if n == 1.0));
    assert!(matches!(scope.lookup("JSON"), Value::Builtin("JSON")));
    assert!(matches!(scope.lookup("nothing"), Value::Undefined));
  }

  #[test]
  fn context_entries_convert_once() {
    let ctx = context();
    let scope = Scope::new(&ctx);
    let first = scope.lookup("user");
    let second = scope.lookup("user");
    assert_eq!(scope.cached_len(), 1);
    match (first, second) {
      (Value::Object(a), Value::Object(b)) => assert!(std::rc::Rc::ptr_eq(&a, &b)),
      other => panic!("expected objects, got {:?}", other),
    }
  }
}
