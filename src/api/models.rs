use serde::{Deserialize, Serialize};

use crate::api::binder::Artifact;

/// Current value of a dropdown: nothing, a single choice, or a multi-select.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    #[default]
    Empty,
    One(String),
    Many(Vec<String>),
}

impl ControlValue {
    pub fn single(&self) -> &str {
        match self {
            ControlValue::Empty => "",
            ControlValue::One(value) => value,
            ControlValue::Many(values) => values.first().map(String::as_str).unwrap_or(""),
        }
    }

    pub fn list(&self) -> Vec<String> {
        match self {
            ControlValue::Empty => Vec::new(),
            ControlValue::One(value) if value.is_empty() => Vec::new(),
            ControlValue::One(value) => vec![value.clone()],
            ControlValue::Many(values) => values.clone(),
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateRequest {
    pub output: String,
    #[serde(default)]
    pub value: ControlValue,
    #[serde(default)]
    pub seq: u64,
}

#[derive(Serialize)]
pub struct UpdateResponse {
    pub output: String,
    /// Echo of the request's sequence number; clients drop stale replies.
    pub seq: u64,
    pub artifact: Artifact,
}
