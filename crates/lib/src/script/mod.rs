//! Embedded Lua for author code blocks.
//!
//! One VM serves the whole application. Each run gets a fresh environment
//! table, so scripts never see each other's globals:
//!
//! - restricted (transformers): namespace entries as plain tables plus a
//!   small pure subset of the standard library
//! - effect (responders, script queries): the VM's global table, `args`,
//!   and namespace entries that carry mutator functions (see [`bridge`])

pub(crate) mod bridge;

use std::cell::RefCell;
use std::rc::Rc;

use mlua::prelude::*;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::namespace::NamespaceMap;

#[derive(Debug, Error)]
pub enum ScriptError {
  #[error("failed to initialize Lua: {0}")]
  Init(String),

  #[error("script '{name}' failed: {message}")]
  Runtime { name: String, message: String },

  #[error("script '{name}' returned a value that cannot be represented as JSON: {message}")]
  Convert { name: String, message: String },
}

/// Globals copied into the restricted environment.
const RESTRICTED_GLOBALS: &[&str] = &[
  "pairs", "ipairs", "next", "select", "type", "tostring", "tonumber", "pcall", "error", "assert", "rawequal",
  "rawlen", "log",
];

/// Library tables copied into the restricted environment, minus the listed members.
const RESTRICTED_LIBRARIES: &[(&str, &[&str])] = &[
  // transformers must be deterministic or they never settle
  ("math", &["random", "randomseed"]),
  ("string", &[]),
  ("table", &[]),
  ("utf8", &[]),
];

fn init_error(err: LuaError) -> ScriptError {
  ScriptError::Init(err.to_string())
}

pub struct ScriptHost {
  lua: Lua,
}

impl std::fmt::Debug for ScriptHost {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ScriptHost")
      .field("used_memory", &self.lua.used_memory())
      .finish()
  }
}

impl ScriptHost {
  /// Creates the VM with the math, string, table, utf8 and coroutine libraries.
  pub fn new(memory_limit: Option<usize>) -> Result<Self, ScriptError> {
    let libs = LuaStdLib::MATH | LuaStdLib::STRING | LuaStdLib::TABLE | LuaStdLib::UTF8 | LuaStdLib::COROUTINE;
    let lua = Lua::new_with(libs, LuaOptions::default()).map_err(init_error)?;
    if let Some(limit) = memory_limit {
      lua.set_memory_limit(limit).map_err(init_error)?;
      debug!(limit, "lua memory limit set");
    }
    register_log(&lua).map_err(init_error)?;
    Ok(Self { lua })
  }

  pub fn lua(&self) -> &Lua {
    &self.lua
  }

  /// Converts a JSON value into a Lua value.
  pub fn to_lua(&self, value: &JsonValue) -> LuaResult<LuaValue> {
    self.lua.to_value(value)
  }

  /// Environment for pure computations: no mutators, no host access.
  pub fn restricted_env(&self, namespace: &NamespaceMap) -> LuaResult<LuaTable> {
    let env = self.lua.create_table()?;
    let globals = self.lua.globals();

    for name in RESTRICTED_GLOBALS {
      env.set(*name, globals.get::<LuaValue>(*name)?)?;
    }
    for (library, excluded) in RESTRICTED_LIBRARIES {
      let source: LuaTable = globals.get(*library)?;
      let copy = self.lua.create_table()?;
      for pair in source.pairs::<LuaValue, LuaValue>() {
        let (key, value) = pair?;
        if let LuaValue::String(k) = &key
          && excluded.contains(&k.to_string_lossy().as_str())
        {
          continue;
        }
        copy.set(key, value)?;
      }
      env.set(*library, copy)?;
    }

    for (name, value) in namespace {
      env.set(name.as_str(), self.lua.to_value(value)?)?;
    }
    Ok(env)
  }

  /// Environment with every VM global plus `args` and plain namespace entries.
  ///
  /// Mutators are attached by the caller.
  pub fn effect_env(&self, namespace: &NamespaceMap, args: &JsonValue) -> LuaResult<LuaTable> {
    let env = self.lua.create_table()?;
    for pair in self.lua.globals().pairs::<LuaValue, LuaValue>() {
      let (key, value) = pair?;
      env.set(key, value)?;
    }
    for (name, value) in namespace {
      env.set(name.as_str(), self.lua.to_value(value)?)?;
    }
    env.set("args", self.lua.to_value(args)?)?;
    Ok(env)
  }

  /// Runs `code` in `env` and converts its result to JSON.
  ///
  /// The chunk may be a single expression (`a.value * 2`) or a block ending
  /// in `return`.
  pub fn eval(&self, name: &str, code: &str, env: LuaTable) -> Result<JsonValue, ScriptError> {
    let result = self
      .lua
      .load(code)
      .set_name(format!("={}", name))
      .set_environment(env)
      .eval::<LuaValue>()
      .map_err(|err| {
        error!(script = name, error = %err, "script failed");
        ScriptError::Runtime {
          name: name.to_string(),
          message: err.to_string(),
        }
      })?;

    if matches!(result, LuaValue::Nil) {
      return Ok(JsonValue::Null);
    }
    self.lua.from_value(result).map_err(|err| ScriptError::Convert {
      name: name.to_string(),
      message: err.to_string(),
    })
  }

  /// Restricted environment that hands out namespace entries on first read
  /// and records every global name the code looks up.
  fn tracking_env(&self, namespace: Rc<NamespaceMap>, reads: Rc<RefCell<Vec<String>>>) -> LuaResult<LuaTable> {
    let env = self.restricted_env(&NamespaceMap::new())?;
    let index = self.lua.create_function(move |lua, (env, key): (LuaTable, LuaValue)| {
      let LuaValue::String(key) = key else {
        return Ok(LuaValue::Nil);
      };
      let key = key.to_string_lossy();
      {
        let mut reads = reads.borrow_mut();
        if !reads.contains(&key) {
          reads.push(key.clone());
        }
      }
      match namespace.get(&key) {
        Some(value) => {
          let value = lua.to_value(value)?;
          env.raw_set(key, value.clone())?;
          Ok(value)
        }
        None => Ok(LuaValue::Nil),
      }
    })?;
    let meta = self.lua.create_table()?;
    meta.set("__index", index)?;
    let setmetatable: LuaFunction = self.lua.globals().get("setmetatable")?;
    setmetatable.call::<()>((env.clone(), meta))?;
    Ok(env)
  }

  /// Runs a transformer-style computation and reports the namespace names
  /// it read, in first-read order. Names read but absent are reported too.
  pub fn run_tracked(&self, name: &str, code: &str, namespace: &Rc<NamespaceMap>) -> (Result<JsonValue, ScriptError>, Vec<String>) {
    let reads = Rc::new(RefCell::new(Vec::new()));
    let result = self
      .tracking_env(Rc::clone(namespace), Rc::clone(&reads))
      .map_err(|err| ScriptError::Runtime {
        name: name.to_string(),
        message: err.to_string(),
      })
      .and_then(|env| self.eval(name, code, env));
    let reads = reads.take();
    (result, reads)
  }

  /// Runs a transformer-style computation.
  pub fn run_restricted(&self, name: &str, code: &str, namespace: &NamespaceMap) -> Result<JsonValue, ScriptError> {
    let env = self.restricted_env(namespace).map_err(|err| ScriptError::Runtime {
      name: name.to_string(),
      message: err.to_string(),
    })?;
    self.eval(name, code, env)
  }
}

fn display(value: &LuaValue) -> String {
  match value {
    LuaValue::Nil => "nil".to_string(),
    LuaValue::Boolean(b) => b.to_string(),
    LuaValue::Integer(i) => i.to_string(),
    LuaValue::Number(n) => n.to_string(),
    LuaValue::String(s) => s.to_string_lossy(),
    other => other.type_name().to_string(),
  }
}

/// `log(...)` writes its arguments to the `bindscope::script` tracing target.
/// A leading `"warn"` or `"error"` argument picks the level.
fn register_log(lua: &Lua) -> LuaResult<()> {
  let log = lua.create_function(|_, args: LuaVariadic<LuaValue>| {
    let mut parts: Vec<String> = args.iter().map(display).collect();
    let level = match parts.first().map(String::as_str) {
      Some("warn") | Some("error") if parts.len() > 1 => Some(parts.remove(0)),
      _ => None,
    };
    let message = parts.join(" ");
    match level.as_deref() {
      Some("warn") => warn!(target: "bindscope::script", "{}", message),
      Some("error") => error!(target: "bindscope::script", "{}", message),
      _ => info!(target: "bindscope::script", "{}", message),
    }
    Ok(())
  })?;
  lua.globals().set("log", log)
}
