//! Option lists for host pickers (model search, workflow search, parameter names).

use serde::Serialize;

use crate::{
    client::Client,
    errors::Result,
    identifiers::ModelId,
    models::ModelSearch,
    schema::ParameterDescriptor,
    workflows::WorkflowSearch,
};

/// One selectable entry in a host drop-down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionEntry {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Models matching `filter`, labelled with their display names.
pub async fn model_options(client: &Client, filter: Option<&str>) -> Result<Vec<OptionEntry>> {
    let search = ModelSearch {
        query: filter.map(str::to_string),
        ..Default::default()
    };
    let page = client.models().search(&search).await?;
    Ok(page
        .models
        .into_iter()
        .map(|m| OptionEntry {
            name: m
                .metadata
                .display_name
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| m.endpoint_id.clone()),
            value: m.endpoint_id,
            description: m.metadata.description,
        })
        .collect())
}

/// Workflows matching `filter`, valued by their `owner/name` id.
pub async fn workflow_options(client: &Client, filter: Option<&str>) -> Result<Vec<OptionEntry>> {
    let search = WorkflowSearch {
        query: filter.map(str::to_string),
        ..Default::default()
    };
    let page = client.workflows().list(&search).await?;
    Ok(page
        .workflows
        .into_iter()
        .map(|w| {
            let id = w.workflow_id().to_string();
            OptionEntry {
                name: w.title.clone().unwrap_or_else(|| id.clone()),
                value: id,
                description: w.description,
            }
        })
        .collect())
}

/// Input parameter names of a model. Never fails; unknown models list nothing.
pub async fn parameter_options(client: &Client, model_id: &ModelId) -> Vec<OptionEntry> {
    client
        .models()
        .list_parameters(model_id)
        .await
        .iter()
        .map(parameter_entry)
        .collect()
}

fn parameter_entry(param: &ParameterDescriptor) -> OptionEntry {
    let label = param.title.as_deref().unwrap_or(&param.name);
    let name = if param.required {
        format!("{label} (required)")
    } else {
        label.to_string()
    };
    let description = match &param.description {
        Some(desc) => format!("{}: {desc}", param.param_type.as_str()),
        None => param.param_type.as_str().to_string(),
    };
    OptionEntry {
        name,
        value: param.name.clone(),
        description: Some(description),
    }
}
