//! bindscope-lib: reactive bindings for low-code applications
//!
//! Widgets, queries, transformers, temporary state and data responders refer
//! to each other by name inside `{{ ... }}` expressions. This crate keeps
//! every derived value and watcher current as those names change:
//! - `reactive`: signals, memos and effects
//! - `expr` and `resolve`: the sandboxed expression language and binding strings
//! - `entity`: the runtime entity kinds and their managers
//! - `app`: the application that joins them through one namespace

pub mod app;
pub mod component;
pub mod config;
pub mod entity;
pub mod expr;
pub mod http;
pub mod namespace;
pub mod reactive;
pub mod registry;
pub mod resolve;
pub mod schema;
pub mod script;
pub mod state;
pub mod task;

pub use app::{App, AppError, AppRef};
pub use config::EngineConfig;
pub use schema::Schema;
