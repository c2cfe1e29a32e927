// Runtime validation for the invariant-enforcing newtypes in `types`.
// Mirrors the teacher's contract-enforcement layer: every `Validated*`
// constructor funnels through one of these checks so invalid values are
// unrepresentable once constructed.

use anyhow::{bail, Result};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("precondition failed: {condition}")]
    PreconditionFailed { condition: String, context: String },
    #[error("invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },
}

#[derive(Clone)]
pub struct ValidationContext {
    operation: String,
    attributes: HashMap<String, String>,
}

impl ValidationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn validate(self, condition: bool, message: &str) -> Result<()> {
        if !condition {
            let context = format!("operation={}, attributes={:?}", self.operation, self.attributes);
            bail!(ValidationError::PreconditionFailed {
                condition: message.to_string(),
                context,
            });
        }
        Ok(())
    }
}

/// Path validation, shared by component `file_path` and discovery roots.
pub mod path {
    use super::*;
    use std::ffi::OsStr;
    use std::path::Path;

    const MAX_PATH_LENGTH: usize = 4096;
    const RESERVED_NAMES: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];

    pub fn validate_file_path(path: &str) -> Result<()> {
        let ctx = ValidationContext::new("validate_file_path").with_attribute("path", path);

        ctx.clone().validate(!path.is_empty(), "path cannot be empty")?;
        ctx.clone().validate(
            path.len() < MAX_PATH_LENGTH,
            &format!("path exceeds maximum length of {MAX_PATH_LENGTH}"),
        )?;
        ctx.clone()
            .validate(!path.contains('\0'), "path contains null bytes")?;

        let path_obj = Path::new(path);
        for component in path_obj.components() {
            if let std::path::Component::ParentDir = component {
                bail!(ValidationError::InvalidInput {
                    field: "path".to_string(),
                    reason: "parent directory references (..) not allowed".to_string(),
                });
            }
        }

        if let Some(stem) = path_obj.file_stem().and_then(OsStr::to_str) {
            let upper = stem.to_uppercase();
            if RESERVED_NAMES.contains(&upper.as_str()) {
                bail!(ValidationError::InvalidInput {
                    field: "path".to_string(),
                    reason: format!("reserved filename: {stem}"),
                });
            }
        }

        if path_obj.to_str().is_none() {
            bail!(ValidationError::InvalidInput {
                field: "path".to_string(),
                reason: "path is not valid UTF-8".to_string(),
            });
        }

        Ok(())
    }
}

/// Tag/name validation shared by `ValidatedTag` and FQN segments.
pub mod index {
    use super::*;

    const MAX_TAG_LENGTH: usize = 128;

    pub fn validate_tag(tag: &str) -> Result<()> {
        let ctx = ValidationContext::new("validate_tag").with_attribute("tag", tag);
        ctx.clone().validate(!tag.trim().is_empty(), "tag cannot be empty")?;
        ctx.clone().validate(
            tag.len() <= MAX_TAG_LENGTH,
            &format!("tag exceeds maximum length of {MAX_TAG_LENGTH}"),
        )?;
        ctx.validate(
            tag.chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ' ' | ':' | '.' | '\\' | '/')),
            "tag contains disallowed characters",
        )?;
        Ok(())
    }
}
