// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph configuration stored as RON.
//!
//! A configuration names the graph and declares which value types its
//! registry starts with. Custom types reuse the conversion of a builtin
//! type and declare their own compatibility list, e.g.
//!
//! ```ron
//! GraphConfig(
//!     name: "Shader",
//!     builtin_types: true,
//!     value_types: [
//!         (name: "Color", converter: "String", compatible_from: ["String"]),
//!     ],
//! )
//! ```

use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::value_type::{builtin, ValueTypeInfo, ValueTypeRegistry};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A value type declared in a configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueTypeConfig {
    /// Type name
    pub name: String,
    /// Builtin type whose conversion the type reuses
    pub converter: String,
    /// Types that may be connected into this one
    #[serde(default)]
    pub compatible_from: Vec<String>,
}

/// Graph configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Graph name
    pub name: String,
    /// Whether the builtin types are registered
    pub builtin_types: bool,
    /// Additional value types
    pub value_types: Vec<ValueTypeConfig>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            name: "Untitled".to_string(),
            builtin_types: true,
            value_types: Vec::new(),
        }
    }
}

impl GraphConfig {
    /// Parse a configuration from RON
    pub fn from_ron(content: &str) -> Result<Self> {
        Ok(ron::from_str(content)?)
    }

    /// Serialize the configuration to RON
    pub fn to_ron(&self) -> Result<String> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| GraphError::ConfigIo {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_ron(&content)
    }

    /// Save the configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_ron()?;
        std::fs::write(path, content).map_err(|e| GraphError::ConfigIo {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Build the value-type registry the configuration describes
    pub fn registry(&self) -> Result<ValueTypeRegistry> {
        let mut registry = if self.builtin_types {
            ValueTypeRegistry::with_builtins()
        } else {
            ValueTypeRegistry::new()
        };
        for declared in &self.value_types {
            let convert = builtin::converter(&declared.converter)
                .ok_or_else(|| GraphError::UnknownValueType(declared.converter.clone()))?;
            registry.register(
                ValueTypeInfo::new(declared.name.clone(), convert)
                    .with_compatible_from(declared.compatible_from.iter().cloned()),
            )?;
        }
        Ok(registry)
    }
}

impl Graph {
    /// Create an empty graph from a configuration
    pub fn from_config(config: &GraphConfig) -> Result<Self> {
        Ok(Self::with_registry(config.name.clone(), config.registry()?))
    }
}
