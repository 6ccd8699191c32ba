//! Typed records parsed from API payloads.
//!
//! One parser per payload kind; everything above this module works with the
//! typed records only.

mod dataset;
mod list;
mod task;
pub(crate) mod tree;

pub use dataset::{DatasetDescriptor, DatasetFeatures, DatasetQualities, Feature, Quality};
pub use list::{EntityListEntry, EntityStatus};
pub use task::{EstimationProcedure, TaskDescriptor};

pub(crate) use list::{parse_dataset_list, parse_task_list};

use tree::Element;

/// Body of an `<oml:error>` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServerError {
    pub code: Option<u32>,
    pub message: String,
}

/// Parse an `<oml:error>` body; `None` when the body is something else.
pub(crate) fn parse_server_error(body: &[u8]) -> Option<ServerError> {
    let root = Element::parse_root(body, "error").ok()?;
    let code = root.child_text("code").and_then(|c| c.parse().ok());
    let mut message = root
        .optional("message")
        .unwrap_or_else(|| "no message provided".to_string());
    if let Some(extra) = root.child_text("additional_information") {
        message.push_str(" - ");
        message.push_str(extra);
    }
    Some(ServerError { code, message })
}
