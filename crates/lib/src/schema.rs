//! Persisted application shape.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::app::AppError;
use crate::component::ComponentDefinition;
use crate::entity::{DataResponderDefinition, QueryDefinition, TempStateDefinition, TransformerDefinition};

/// Every definition of an application, in camelCase JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Schema {
  pub components: Vec<ComponentDefinition>,
  pub queries: Vec<QueryDefinition>,
  pub temp_states: Vec<TempStateDefinition>,
  pub transformers: Vec<TransformerDefinition>,
  pub data_responders: Vec<DataResponderDefinition>,
}

impl Schema {
  pub fn from_json_str(content: &str) -> Result<Self, AppError> {
    Ok(serde_json::from_str(content)?)
  }

  pub fn load(path: &Path) -> Result<Self, AppError> {
    let content = fs::read_to_string(path).map_err(|source| AppError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json_str(&content)
  }

  pub fn to_json_pretty(&self) -> Result<String, AppError> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  /// Total number of definitions.
  pub fn len(&self) -> usize {
    self.components.len()
      + self.queries.len()
      + self.temp_states.len()
      + self.transformers.len()
      + self.data_responders.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
