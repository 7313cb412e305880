//! JSON Schema validation of overridden configurations

use std::fmt;

use jsonschema::JSONSchema;
use serde_json::Value;

use crate::error::{OverrideError, OverrideResult, ValidationIssue};

/// A compiled configuration schema
pub struct ConfigSchema {
    compiled: JSONSchema,
}

impl ConfigSchema {
    /// Compile a JSON Schema document
    pub fn compile(schema: &Value) -> OverrideResult<Self> {
        let compiled =
            JSONSchema::compile(schema).map_err(|e| OverrideError::InvalidSchema(e.to_string()))?;
        Ok(Self { compiled })
    }

    /// Validate `config`, returning every violation found
    pub fn validate(&self, config: &Value) -> Result<(), Vec<ValidationIssue>> {
        self.compiled.validate(config).map_err(|errors| {
            errors
                .map(|error| ValidationIssue {
                    path: error.instance_path.to_string(),
                    message: error.to_string(),
                })
                .collect()
        })
    }

    pub fn is_valid(&self, config: &Value) -> bool {
        self.compiled.is_valid(config)
    }
}

impl fmt::Debug for ConfigSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSchema").finish_non_exhaustive()
    }
}
