//! List payloads (`data/list`, `task/list`). Never cached.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::tree::Element;
use crate::error::{OpenMlError, OpenMlResult};

/// Publication status of a dataset or task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    InPreparation,
    Active,
    Deactivated,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InPreparation => "in_preparation",
            Self::Active => "active",
            Self::Deactivated => "deactivated",
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityStatus {
    type Err = OpenMlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "in_preparation" => Ok(Self::InPreparation),
            "active" => Ok(Self::Active),
            "deactivated" => Ok(Self::Deactivated),
            other => Err(OpenMlError::invalid_response(format!(
                "unknown status {:?}",
                other
            ))),
        }
    }
}

/// One row of a list response.
///
/// `fields` holds every child of the row; `quality` and `input` children are
/// keyed by their `name` attribute, repeated keys are comma-joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityListEntry {
    pub id: u64,
    pub status: EntityStatus,
    pub fields: BTreeMap<String, String>,
}

impl EntityListEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.field("name")
    }

    /// Dataset id (`did`); equals `id` for dataset rows.
    pub fn dataset_id(&self) -> Option<u64> {
        self.field("did").and_then(|v| v.parse().ok())
    }
}

pub(crate) fn parse_dataset_list(bytes: &[u8]) -> OpenMlResult<Vec<EntityListEntry>> {
    parse_rows(bytes, "data", "dataset", "did")
}

pub(crate) fn parse_task_list(bytes: &[u8]) -> OpenMlResult<Vec<EntityListEntry>> {
    parse_rows(bytes, "tasks", "task", "task_id")
}

fn parse_rows(
    bytes: &[u8],
    root_name: &str,
    row_name: &str,
    id_field: &str,
) -> OpenMlResult<Vec<EntityListEntry>> {
    let root = Element::parse_root(bytes, root_name)?;
    let rows = root
        .children_named(row_name)
        .filter_map(|row| match parse_row(row, id_field) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(
                    row = row_name,
                    id = row.child_text(id_field).unwrap_or_default(),
                    error = %e,
                    "skipping unreadable list row"
                );
                None
            }
        })
        .collect();
    Ok(rows)
}

fn parse_row(row: &Element, id_field: &str) -> OpenMlResult<EntityListEntry> {
    Ok(EntityListEntry {
        id: row.require(id_field)?,
        status: row.require("status")?,
        fields: flatten(row),
    })
}

fn flatten(row: &Element) -> BTreeMap<String, String> {
    let mut fields: BTreeMap<String, String> = BTreeMap::new();
    for child in &row.children {
        let key = child.attribute("name").unwrap_or(&child.name).to_string();
        let value = child.text.trim();
        fields
            .entry(key)
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_list() {
        let xml = br#"<oml:data xmlns:oml="http://openml.org/openml">
            <oml:dataset>
                <oml:did>1</oml:did><oml:name>anneal</oml:name><oml:status>active</oml:status>
                <oml:format>ARFF</oml:format>
                <oml:quality name="NumberOfInstances">898</oml:quality>
            </oml:dataset>
            <oml:dataset>
                <oml:did>2</oml:did><oml:name>kr-vs-kp</oml:name><oml:status>in_preparation</oml:status>
            </oml:dataset>
        </oml:data>"#;
        let rows = parse_dataset_list(xml).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[0].dataset_id(), Some(1));
        assert_eq!(rows[0].name(), Some("anneal"));
        assert_eq!(rows[0].field("NumberOfInstances"), Some("898"));
        assert_eq!(rows[1].status, EntityStatus::InPreparation);
    }

    #[test]
    fn test_task_list_joins_repeated_fields() {
        let xml = br#"<oml:tasks xmlns:oml="http://openml.org/openml">
            <oml:task>
                <oml:task_id>1</oml:task_id><oml:task_type>Supervised Classification</oml:task_type>
                <oml:did>1</oml:did><oml:status>active</oml:status>
                <oml:input name="estimation_procedure">1</oml:input>
                <oml:tag>basic</oml:tag><oml:tag>study_1</oml:tag>
            </oml:task>
        </oml:tasks>"#;
        let rows = parse_task_list(xml).unwrap();
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[0].dataset_id(), Some(1));
        assert_eq!(rows[0].field("estimation_procedure"), Some("1"));
        assert_eq!(rows[0].field("tag"), Some("basic,study_1"));
    }

    #[test]
    fn test_unreadable_rows_are_skipped() {
        let xml = b"<oml:data>\
            <oml:dataset><oml:did>1</oml:did><oml:status>active</oml:status></oml:dataset>\
            <oml:dataset><oml:did>2</oml:did><oml:status>gone</oml:status></oml:dataset>\
            <oml:dataset><oml:did>x</oml:did><oml:status>active</oml:status></oml:dataset>\
            <oml:dataset><oml:did>4</oml:did><oml:status>deactivated</oml:status></oml:dataset>\
            </oml:data>";
        let rows = parse_dataset_list(xml).unwrap();
        let ids: Vec<u64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(rows[1].status, EntityStatus::Deactivated);
    }

    #[test]
    fn test_wrong_root_is_rejected() {
        let xml = b"<oml:tasks><oml:task><oml:task_id>1</oml:task_id></oml:task></oml:tasks>";
        assert!(parse_dataset_list(xml).is_err());
    }

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [
            EntityStatus::InPreparation,
            EntityStatus::Active,
            EntityStatus::Deactivated,
        ] {
            assert_eq!(status.as_str().parse::<EntityStatus>().unwrap(), status);
        }
    }
}
