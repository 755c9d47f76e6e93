//! Mutators attached to namespace entries in effect environments.
//!
//! Every entity table gains the functions its kind supports. They are
//! called with a dot, not a colon:
//!
//! ```lua
//! query1.run({ id = input1.value })
//! state1.setValue(query1.data)
//! state1.setIn("filters.page", 1)
//! ```
//!
//! `query.run` only schedules the run; the script does not wait for it.

use std::rc::Rc;

use mlua::prelude::*;
use serde_json::Value as JsonValue;

use super::ScriptError;
use crate::app::App;
use crate::entity::Entity;
use crate::namespace::NamespaceMap;

pub(crate) fn effect_env(app: &App, namespace: &NamespaceMap, args: &JsonValue) -> Result<LuaTable, ScriptError> {
  build(app, namespace, args).map_err(|err| ScriptError::Runtime {
    name: "environment".to_string(),
    message: err.to_string(),
  })
}

fn build(app: &App, namespace: &NamespaceMap, args: &JsonValue) -> LuaResult<LuaTable> {
  let host = app.scripts();
  let lua = host.lua();
  let env = host.effect_env(namespace, args)?;

  for query in app.queries().all() {
    let Some(table) = entry(&env, query.name())? else {
      continue;
    };
    attach(lua, &table, "run", &query, |lua, query, args| {
      query.spawn_run(json_arg(lua, args.into_iter().next())?);
      Ok(())
    })?;
    attach(lua, &table, "reset", &query, |_, query, _| {
      query.reset();
      Ok(())
    })?;
    attach(lua, &table, "cancel", &query, |_, query, _| {
      query.cancel();
      Ok(())
    })?;
  }

  for state in app.temp_states().all() {
    let Some(table) = entry(&env, state.name())? else {
      continue;
    };
    attach(lua, &table, "setValue", &state, |lua, state, args| {
      state.set_value(json_arg(lua, args.into_iter().next())?);
      Ok(())
    })?;
    attach(lua, &table, "reset", &state, |_, state, _| {
      state.reset();
      Ok(())
    })?;
    attach(lua, &table, "setIn", &state, |lua, state, args| {
      let mut args = args.into_iter();
      let path = match args.next() {
        Some(LuaValue::String(path)) => path.to_string_lossy(),
        _ => return Err(LuaError::RuntimeError("setIn expects a path string".to_string())),
      };
      state
        .set_in(&path, json_arg(lua, args.next())?)
        .map_err(|err| LuaError::RuntimeError(err.to_string()))
    })?;
  }

  for transformer in app.transformers().all() {
    let Some(table) = entry(&env, transformer.name())? else {
      continue;
    };
    attach(lua, &table, "refresh", &transformer, |_, transformer, _| {
      transformer.refresh();
      Ok(())
    })?;
  }

  for responder in app.responders().all() {
    let Some(table) = entry(&env, responder.name())? else {
      continue;
    };
    attach(lua, &table, "trigger", &responder, |_, responder, _| {
      responder.trigger();
      Ok(())
    })?;
  }

  Ok(env)
}

fn entry(env: &LuaTable, name: &str) -> LuaResult<Option<LuaTable>> {
  match env.raw_get::<LuaValue>(name)? {
    LuaValue::Table(table) => Ok(Some(table)),
    _ => Ok(None),
  }
}

fn json_arg(lua: &Lua, value: Option<LuaValue>) -> LuaResult<JsonValue> {
  match value {
    None | Some(LuaValue::Nil) => Ok(JsonValue::Null),
    Some(value) => lua.from_value(value),
  }
}

/// Binds `f` to `table[key]`. The closure holds a weak handle, so a removed
/// entity turns its functions into no-ops.
fn attach<T, F>(lua: &Lua, table: &LuaTable, key: &str, target: &Rc<T>, f: F) -> LuaResult<()>
where
  T: 'static,
  F: Fn(&Lua, Rc<T>, LuaMultiValue) -> LuaResult<()> + 'static,
{
  let target = Rc::downgrade(target);
  let function = lua.create_function(move |lua, args: LuaMultiValue| match target.upgrade() {
    Some(target) => f(lua, target, args),
    None => Ok(()),
  })?;
  table.set(key, function)
}
