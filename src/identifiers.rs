//! Strongly-typed identifier newtypes for fal.ai concepts.
//!
//! Model endpoints, workflows and queue requests are all addressed by free-form
//! strings on the wire. Wrapping them keeps call sites honest about which kind
//! of identifier they expect.
//!
//! ```ignore
//! use fal_node::{ModelId, WorkflowId};
//!
//! let model: ModelId = "fal-ai/flux/dev".into();
//! let workflow: WorkflowId = "my-team/upscale-pipeline".into();
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Macro to generate string wrapper newtypes with consistent implementations.
///
/// Each generated type:
/// - Trims whitespace from input values
/// - Implements `From<&str>`, `From<String>`, `Into<String>`
/// - Implements `Display` for string formatting
/// - Serializes/deserializes as a plain string
macro_rules! string_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from any string-like value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into().trim().to_string())
            }

            /// Get the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            /// Check if the identifier is empty (after trimming).
            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self(String::new())
            }
        }
    };
}

// ============================================================================
// Model endpoint identifier
// ============================================================================

string_id_type!(
    ModelId,
    "Model endpoint identifier (e.g., \"fal-ai/flux/dev\", \"fal-ai/fast-sdxl\")."
);

impl ModelId {
    /// Reject blank identifiers before any request is built.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::new("model id is required").with_field("modelId"));
        }
        Ok(())
    }
}

// ============================================================================
// Workflow identifier
// ============================================================================

string_id_type!(
    WorkflowId,
    "Workflow identifier in `namespace/name` form (e.g., \"my-team/upscale\")."
);

impl WorkflowId {
    /// Split into `(namespace, name)`, validating the required shape.
    pub fn parts(&self) -> Result<(&str, &str), ValidationError> {
        let invalid = || {
            ValidationError::new(format!(
                "workflow id must have the form 'namespace/name' (got {:?})",
                self.as_str()
            ))
            .with_field("workflowId")
        };
        let (namespace, name) = self.as_str().split_once('/').ok_or_else(invalid)?;
        let namespace = namespace.trim();
        let name = name.trim().trim_end_matches('/');
        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        Ok((namespace, name))
    }

    /// Validate the `namespace/name` shape without borrowing the parts.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.parts().map(|_| ())
    }
}

// ============================================================================
// Queue request identifier
// ============================================================================

string_id_type!(
    RequestId,
    "Queue request identifier returned by the fal queue on submission."
);
