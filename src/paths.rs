//! Queue path resolution.
//!
//! A model id may carry an app sub-path below its `namespace/name` pair
//! (`fal-ai/flux/dev`). Submission must target the full path, while the
//! status, result and cancel endpoints hang off the two-segment base. Mixing
//! the two up produces 404s while polling.

use crate::identifiers::{ModelId, RequestId, WorkflowId};

/// Submission path and URL anchor for one queue endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePath {
    /// `namespace/name`; anchors the per-request URLs.
    pub base_model_id: String,
    /// Base plus any app sub-path; the submission target.
    pub submit_path: String,
}

impl QueuePath {
    /// Resolve a model id into its base and submission path.
    pub fn resolve(model_id: &str) -> Self {
        let segments: Vec<&str> = model_id.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() <= 2 {
            let joined = segments.join("/");
            return Self {
                base_model_id: joined.clone(),
                submit_path: joined,
            };
        }
        let base_model_id = segments[..2].join("/");
        let submit_path = format!("{}/{}", base_model_id, segments[2..].join("/"));
        Self {
            base_model_id,
            submit_path,
        }
    }

    /// Queue path for a model endpoint.
    pub fn for_model(model_id: &ModelId) -> Self {
        Self::resolve(model_id.as_str())
    }

    /// Queue path for a workflow; both paths live under `workflows/`.
    pub fn for_workflow(namespace: &str, name: &str) -> Self {
        let path = format!("workflows/{namespace}/{name}");
        Self {
            base_model_id: path.clone(),
            submit_path: path,
        }
    }

    /// Queue path for a validated workflow id.
    pub fn for_workflow_id(workflow_id: &WorkflowId) -> crate::errors::Result<Self> {
        let (namespace, name) = workflow_id.parts()?;
        Ok(Self::for_workflow(namespace, name))
    }
}

/// Per-request queue URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueUrls {
    pub status_url: String,
    pub response_url: String,
    pub cancel_url: String,
}

impl QueueUrls {
    /// Derive the fixed URL templates from the queue base and base id.
    pub fn derive(queue_base_url: &str, base_model_id: &str, request_id: &RequestId) -> Self {
        let root = format!(
            "{}/{}/requests/{}",
            queue_base_url.trim_end_matches('/'),
            base_model_id.trim_matches('/'),
            request_id
        );
        Self {
            status_url: format!("{root}/status"),
            cancel_url: format!("{root}/cancel"),
            response_url: root,
        }
    }
}
