//! Dataset description, features and qualities payloads.

use serde::{Deserialize, Serialize};

use super::list::EntityStatus;
use super::tree::Element;
use crate::error::OpenMlResult;

/// Parsed `<oml:data_set_description>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub id: u64,
    pub name: String,
    pub version: Option<String>,
    /// Data file format, e.g. `ARFF`.
    pub format: String,
    pub description: Option<String>,
    pub upload_date: Option<String>,
    pub licence: Option<String>,
    /// Download location of the data file.
    pub url: Option<String>,
    pub default_target_attribute: Option<String>,
    pub row_id_attribute: Option<String>,
    #[serde(default)]
    pub ignore_attributes: Vec<String>,
    pub md5_checksum: Option<String>,
    pub status: Option<EntityStatus>,
    /// The payload this descriptor was parsed from.
    pub raw_description: String,
}

impl DatasetDescriptor {
    pub fn from_xml(bytes: &[u8]) -> OpenMlResult<Self> {
        let root = Element::parse_root(bytes, "data_set_description")?;

        Ok(Self {
            id: root.require("id")?,
            name: root.require("name")?,
            version: root.optional("version"),
            format: root.require("format")?,
            description: root.optional("description"),
            upload_date: root.optional("upload_date"),
            licence: root.optional("licence"),
            url: root.optional("url"),
            default_target_attribute: root.optional("default_target_attribute"),
            row_id_attribute: root.optional("row_id_attribute"),
            ignore_attributes: root
                .children_named("ignore_attribute")
                .map(|c| c.text.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            md5_checksum: root.optional("md5_checksum"),
            status: root.child_text("status").and_then(|s| s.parse().ok()),
            raw_description: String::from_utf8_lossy(bytes).into_owned(),
        })
    }
}

/// One `<oml:feature>` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub index: u32,
    pub name: String,
    pub data_type: String,
    pub is_target: bool,
    pub is_ignore: bool,
    pub is_row_identifier: bool,
    pub number_of_missing_values: Option<u64>,
}

/// Parsed `<oml:data_features>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetFeatures {
    /// `<oml:did>` when the server includes it.
    #[serde(default)]
    pub dataset_id: Option<u64>,
    pub features: Vec<Feature>,
}

impl DatasetFeatures {
    pub fn from_xml(bytes: &[u8]) -> OpenMlResult<Self> {
        let root = Element::parse_root(bytes, "data_features")?;
        let features = root
            .children_named("feature")
            .map(|f| {
                Ok(Feature {
                    index: f.require("index")?,
                    name: f.require("name")?,
                    data_type: f.require("data_type")?,
                    is_target: flag(f, "is_target"),
                    is_ignore: flag(f, "is_ignore"),
                    is_row_identifier: flag(f, "is_row_identifier"),
                    number_of_missing_values: f
                        .child_text("number_of_missing_values")
                        .and_then(|v| v.parse().ok()),
                })
            })
            .collect::<OpenMlResult<Vec<_>>>()?;
        Ok(Self {
            dataset_id: root.child_text("did").and_then(|v| v.parse().ok()),
            features,
        })
    }

    /// The feature flagged as target, if any.
    pub fn target(&self) -> Option<&Feature> {
        self.features.iter().find(|f| f.is_target)
    }
}

/// One `<oml:quality>` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quality {
    pub name: String,
    /// `None` when the server reports no (or a non-numeric) value.
    pub value: Option<f64>,
}

/// Parsed `<oml:data_qualities>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetQualities {
    #[serde(default)]
    pub dataset_id: Option<u64>,
    pub qualities: Vec<Quality>,
}

impl DatasetQualities {
    pub fn from_xml(bytes: &[u8]) -> OpenMlResult<Self> {
        let root = Element::parse_root(bytes, "data_qualities")?;
        let qualities = root
            .children_named("quality")
            .map(|q| {
                Ok(Quality {
                    name: q.require("name")?,
                    value: q.child_text("value").and_then(|v| v.parse().ok()),
                })
            })
            .collect::<OpenMlResult<Vec<_>>>()?;
        Ok(Self {
            dataset_id: root.child_text("did").and_then(|v| v.parse().ok()),
            qualities,
        })
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.qualities
            .iter()
            .find(|q| q.name == name)
            .and_then(|q| q.value)
    }
}

fn flag(element: &Element, name: &str) -> bool {
    element
        .child_text(name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
