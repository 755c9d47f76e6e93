//! The application namespace: every entity's exposed values keyed by name.

use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::reactive::Memo;

pub type NamespaceMap = JsonMap<String, JsonValue>;

/// Entity kinds in namespace build order. Later kinds shadow earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
  Component,
  Query,
  TempState,
  Transformer,
  DataResponder,
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      EntityKind::Component => "component",
      EntityKind::Query => "query",
      EntityKind::TempState => "temp state",
      EntityKind::Transformer => "transformer",
      EntityKind::DataResponder => "data responder",
    };
    f.write_str(label)
  }
}

/// Two entities exposed under the same name; `winner` is the one visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameCollision {
  pub name: String,
  pub shadowed: EntityKind,
  pub winner: EntityKind,
}

/// One kind's exposed entries, in insertion order.
pub type Layer = (EntityKind, Rc<Vec<(String, JsonValue)>>);

/// Merges layers into one map. Later entries overwrite earlier ones.
pub fn assemble(layers: &[Layer]) -> (NamespaceMap, Vec<NameCollision>) {
  let mut map = NamespaceMap::new();
  let mut owners: Vec<(String, EntityKind)> = Vec::new();
  let mut collisions = Vec::new();

  for (kind, entries) in layers {
    for (name, value) in entries.iter() {
      if let Some((_, previous)) = owners.iter_mut().find(|(n, _)| n == name) {
        collisions.push(NameCollision {
          name: name.clone(),
          shadowed: *previous,
          winner: *kind,
        });
        *previous = *kind;
      } else {
        owners.push((name.clone(), *kind));
      }
      map.insert(name.clone(), value.clone());
    }
  }
  (map, collisions)
}

/// Read handle on the live namespace cell.
#[derive(Clone, Debug)]
pub struct Namespace {
  memo: Memo<Rc<NamespaceMap>>,
}

impl Namespace {
  pub(crate) fn new(memo: Memo<Rc<NamespaceMap>>) -> Self {
    Self { memo }
  }

  /// Tracked read; the caller re-runs whenever the namespace recomputes.
  pub fn get(&self) -> Rc<NamespaceMap> {
    self.memo.get()
  }

  pub fn get_untracked(&self) -> Rc<NamespaceMap> {
    self.memo.get_untracked()
  }

  pub fn lookup(&self, name: &str) -> Option<JsonValue> {
    self.memo.get_untracked().get(name).cloned()
  }

  /// Number of recomputations so far.
  pub fn version(&self) -> u64 {
    self.memo.version()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn layer(kind: EntityKind, entries: &[(&str, JsonValue)]) -> Layer {
    (
      kind,
      Rc::new(entries.iter().map(|(n, v)| (n.to_string(), v.clone())).collect()),
    )
  }

  #[test]
  fn later_kinds_shadow_earlier_ones() {
    let (map, collisions) = assemble(&[
      layer(EntityKind::Component, &[("input1", json!({"value": "a"})), ("shared", json!(1))]),
      layer(EntityKind::Query, &[("shared", json!(2))]),
      layer(EntityKind::Transformer, &[("shared", json!(3))]),
    ]);
    assert_eq!(map["input1"], json!({"value": "a"}));
    assert_eq!(map["shared"], json!(3));
    assert_eq!(
      collisions,
      vec![
        NameCollision {
          name: "shared".into(),
          shadowed: EntityKind::Component,
          winner: EntityKind::Query,
        },
        NameCollision {
          name: "shared".into(),
          shadowed: EntityKind::Query,
          winner: EntityKind::Transformer,
        },
      ]
    );
  }

  #[test]
  fn unique_names_do_not_collide() {
    let (map, collisions) = assemble(&[
      layer(EntityKind::Query, &[("q", json!(null))]),
      layer(EntityKind::TempState, &[("s", json!(null))]),
    ]);
    assert_eq!(map.len(), 2);
    assert!(collisions.is_empty());
  }
}
