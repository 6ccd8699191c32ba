//! Task description payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::tree::Element;
use crate::error::{OpenMlError, OpenMlResult};

/// Estimation procedure of a task; names the split file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationProcedure {
    /// e.g. `crossvalidation`, `holdout`.
    pub procedure_type: String,
    pub data_splits_url: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

/// Parsed `<oml:task>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub id: u64,
    pub task_type: String,
    pub task_type_id: Option<u32>,
    /// Dataset the task is defined on.
    pub dataset_id: u64,
    pub target_feature: Option<String>,
    pub estimation_procedure: Option<EstimationProcedure>,
    #[serde(default)]
    pub evaluation_measures: Vec<String>,
    pub raw_description: String,
}

impl TaskDescriptor {
    pub fn from_xml(bytes: &[u8]) -> OpenMlResult<Self> {
        let root = Element::parse_root(bytes, "task")?;

        let source = input(&root, "source_data")
            .and_then(|i| i.child("data_set"))
            .ok_or_else(|| {
                OpenMlError::invalid_response("task has no source_data input")
            })?;

        let estimation_procedure = input(&root, "estimation_procedure")
            .and_then(|i| i.child("estimation_procedure"))
            .map(|p| {
                Ok::<_, OpenMlError>(EstimationProcedure {
                    procedure_type: p.require("type")?,
                    data_splits_url: p.optional("data_splits_url"),
                    parameters: p
                        .children_named("parameter")
                        .filter_map(|param| {
                            let name = param.attribute("name")?;
                            Some((name.to_string(), param.text.trim().to_string()))
                        })
                        .collect(),
                })
            })
            .transpose()?;

        let evaluation_measures = input(&root, "evaluation_measures")
            .and_then(|i| i.child("evaluation_measures"))
            .map(|m| {
                m.children_named("evaluation_measure")
                    .map(|e| e.text.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            id: root.require("task_id")?,
            task_type: root.require("task_type")?,
            task_type_id: root.child_text("task_type_id").and_then(|v| v.parse().ok()),
            dataset_id: source.require("data_set_id")?,
            target_feature: source.optional("target_feature"),
            estimation_procedure,
            evaluation_measures,
            raw_description: String::from_utf8_lossy(bytes).into_owned(),
        })
    }

    /// Where the train/test split file can be downloaded.
    pub fn data_splits_url(&self) -> Option<&str> {
        self.estimation_procedure
            .as_ref()
            .and_then(|p| p.data_splits_url.as_deref())
    }
}

fn input<'a>(root: &'a Element, name: &str) -> Option<&'a Element> {
    root.children_named("input")
        .find(|i| i.attribute("name") == Some(name))
}
