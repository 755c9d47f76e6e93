//! The application: every entity, the namespace that joins them, and the
//! collaborators they share.
//!
//! [`App`] is a cheap handle around shared state. Entities hold an
//! [`AppRef`] (a weak handle) back to it, so dropping the last `App` tears
//! everything down.

use std::cell::RefCell;
use std::io;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::component::ComponentSet;
use crate::config::EngineConfig;
use crate::entity::{DataResponder, Entity, EntityError, Manager, Query, QueryResult, TempState, Transformer};
use crate::expr::{EvalError, Evaluator};
use crate::http::{HttpExecutor, ReqwestExecutor};
use crate::namespace::{EntityKind, NameCollision, Namespace, NamespaceMap, assemble};
use crate::reactive::{Memo, batch};
use crate::registry::TypeRegistry;
use crate::resolve::Resolver;
use crate::schema::Schema;
use crate::script::{ScriptError, ScriptHost};
use crate::task;

#[derive(Debug, Error)]
pub enum AppError {
  #[error(transparent)]
  Script(#[from] ScriptError),

  #[error(transparent)]
  Entity(#[from] EntityError),

  #[error("invalid schema: {0}")]
  Schema(#[from] serde_json::Error),

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

pub(crate) struct AppInner {
  config: EngineConfig,
  resolver: Resolver,
  executor: Rc<dyn HttpExecutor>,
  scripts: ScriptHost,
  components: ComponentSet,
  queries: Manager<Query>,
  temp_states: Manager<TempState>,
  transformers: Manager<Transformer>,
  responders: Manager<DataResponder>,
  namespace: Namespace,
  collisions: RefCell<Vec<NameCollision>>,
}

/// Weak handle entities use to reach their application.
#[derive(Clone, Debug, Default)]
pub struct AppRef(Weak<AppInner>);

impl AppRef {
  pub fn upgrade(&self) -> Option<App> {
    self.0.upgrade().map(|inner| App { inner })
  }
}

#[derive(Clone)]
pub struct App {
  inner: Rc<AppInner>,
}

impl std::fmt::Debug for App {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("App")
      .field("components", &self.inner.components.len())
      .field("queries", &self.inner.queries.len())
      .field("temp_states", &self.inner.temp_states.len())
      .field("transformers", &self.inner.transformers.len())
      .field("responders", &self.inner.responders.len())
      .finish()
  }
}

impl App {
  pub fn new(config: EngineConfig, registry: TypeRegistry, executor: Rc<dyn HttpExecutor>) -> Result<Self, AppError> {
    let scripts = ScriptHost::new(config.script_memory_limit)?;
    let resolver = Resolver::new(Evaluator::new(config.max_expression_depth));

    let inner = Rc::new_cyclic(|weak: &Weak<AppInner>| {
      let namespace = Namespace::new(Memo::new({
        let weak = weak.clone();
        move || match weak.upgrade() {
          Some(inner) => Rc::new(inner.assemble_namespace()),
          None => Rc::new(NamespaceMap::new()),
        }
      }));
      let app = AppRef(weak.clone());
      AppInner {
        components: ComponentSet::new(registry, namespace.clone(), resolver),
        queries: Manager::new(app.clone()),
        temp_states: Manager::new(app.clone()),
        transformers: Manager::new(app.clone()),
        responders: Manager::new(app),
        config,
        resolver,
        executor,
        scripts,
        namespace,
        collisions: RefCell::new(Vec::new()),
      }
    });
    info!("application created");
    Ok(Self { inner })
  }

  /// An application with the standard widget types and a `reqwest` executor.
  pub fn with_config(config: EngineConfig) -> Result<Self, AppError> {
    Self::new(config, TypeRegistry::standard(), Rc::new(ReqwestExecutor::new()))
  }

  pub fn handle(&self) -> AppRef {
    AppRef(Rc::downgrade(&self.inner))
  }

  pub fn config(&self) -> &EngineConfig {
    &self.inner.config
  }

  pub fn resolver(&self) -> &Resolver {
    &self.inner.resolver
  }

  pub fn registry(&self) -> &TypeRegistry {
    self.inner.components.registry()
  }

  pub fn executor(&self) -> Rc<dyn HttpExecutor> {
    self.inner.executor.clone()
  }

  pub fn scripts(&self) -> &ScriptHost {
    &self.inner.scripts
  }

  pub fn components(&self) -> &ComponentSet {
    &self.inner.components
  }

  pub fn queries(&self) -> &Manager<Query> {
    &self.inner.queries
  }

  pub fn temp_states(&self) -> &Manager<TempState> {
    &self.inner.temp_states
  }

  pub fn transformers(&self) -> &Manager<Transformer> {
    &self.inner.transformers
  }

  pub fn responders(&self) -> &Manager<DataResponder> {
    &self.inner.responders
  }

  /// The live namespace cell, for tracked reads.
  pub fn namespace_cell(&self) -> &Namespace {
    &self.inner.namespace
  }

  /// Current namespace, without subscribing.
  pub fn snapshot(&self) -> Rc<NamespaceMap> {
    self.inner.namespace.get_untracked()
  }

  /// Resolves a binding string (`{{ ... }}`, template or plain text) against the namespace.
  pub fn resolve(&self, input: &str) -> Result<JsonValue, EvalError> {
    self.inner.resolver.resolve(input, &self.snapshot())
  }

  /// Evaluates a bare expression against the namespace.
  pub fn evaluate(&self, code: &str) -> Result<JsonValue, EvalError> {
    self.inner.resolver.evaluator().evaluate(code, &self.snapshot())
  }

  /// Names currently exposed by more than one entity.
  pub fn name_collisions(&self) -> Vec<NameCollision> {
    self.snapshot();
    self.inner.collisions.borrow().clone()
  }

  /// Adds every definition in `schema`.
  ///
  /// Data responders are added after everything else has settled so their
  /// first snapshot sees the loaded state. `runOnLoad` queries are spawned
  /// when a local task set is active.
  pub fn load_schema(&self, schema: Schema) -> Result<(), AppError> {
    let total = schema.len();
    let Schema {
      components,
      queries,
      temp_states,
      transformers,
      data_responders,
    } = schema;

    batch(|| -> Result<(), AppError> {
      for definition in components {
        self.inner.components.add(definition)?;
      }
      for definition in queries {
        self.inner.queries.add(definition)?;
      }
      for definition in temp_states {
        self.inner.temp_states.add(definition)?;
      }
      for definition in transformers {
        self.inner.transformers.add(definition)?;
      }
      Ok(())
    })?;
    batch(|| -> Result<(), AppError> {
      for definition in data_responders {
        self.inner.responders.add(definition)?;
      }
      Ok(())
    })?;
    info!(definitions = total, "schema loaded");

    let on_load: Vec<_> = self
      .inner
      .queries
      .all()
      .into_iter()
      .filter(|q| q.definition().run_on_load && q.definition().enabled)
      .collect();
    if on_load.is_empty() {
      return Ok(());
    }
    if !task::is_local_active() {
      warn!(count = on_load.len(), "no local task set is active, skipping runOnLoad queries");
      return Ok(());
    }
    for query in on_load {
      debug!(query = %query.definition().name, "running query on load");
      query.spawn_run(JsonValue::Null);
    }
    Ok(())
  }

  /// Every definition, with bindable props in their persisted form.
  pub fn to_schema(&self) -> Schema {
    Schema {
      components: self.inner.components.definitions(),
      queries: self.inner.queries.definitions(),
      temp_states: self.inner.temp_states.definitions(),
      transformers: self.inner.transformers.definitions(),
      data_responders: self.inner.responders.definitions(),
    }
  }

  /// Removes every entity.
  pub fn clear(&self) {
    batch(|| {
      self.inner.responders.clear();
      self.inner.transformers.clear();
      self.inner.temp_states.clear();
      self.inner.queries.clear();
      self.inner.components.clear();
    });
    info!("application cleared");
  }

  /// Runs a query by id or name and waits for its result.
  pub async fn run_query(&self, key: &str, args: JsonValue) -> Result<QueryResult, EntityError> {
    let query = self
      .inner
      .queries
      .get(key)
      .or_else(|| self.inner.queries.get_by_name(key))
      .ok_or_else(|| EntityError::NotFound {
        kind: EntityKind::Query,
        id: key.to_string(),
      })?;
    Ok(query.run(args).await)
  }
}

impl AppInner {
  fn assemble_namespace(&self) -> NamespaceMap {
    let layers = [
      (EntityKind::Component, self.components.exposed()),
      (EntityKind::Query, self.queries.exposed()),
      (EntityKind::TempState, self.temp_states.exposed()),
      (EntityKind::Transformer, self.transformers.exposed()),
      (EntityKind::DataResponder, self.responders.exposed()),
    ];
    let (map, collisions) = assemble(&layers);

    let mut known = self.collisions.borrow_mut();
    if *known != collisions {
      if self.config.warn_on_name_collision {
        for collision in collisions.iter().filter(|c| !known.contains(c)) {
          warn!(
            name = %collision.name,
            shadowed = %collision.shadowed,
            winner = %collision.winner,
            "name collision in namespace"
          );
        }
      }
      *known = collisions;
    }
    debug!(entries = map.len(), "namespace recomputed");
    map
  }
}
