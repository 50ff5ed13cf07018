//! Data models for controller responses.
//!
//! The transport hands back raw `serde_json::Value`s. These structs give the
//! front ends typed access to the fields the controller firmware reports,
//! while keeping any field they do not know about.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Machine status as reported by `status` / `statuswait`.
///
/// Every field is optional: older firmware reports a subset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knitting_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carriage_position_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub even_rows_left_to_right: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carriage_position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_needles_cnt: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_row: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_min_x: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_min_y: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_max_x: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_max_y: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_width: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_height: Option<i64>,
    /// Fields not modeled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MachineStatus {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Whether a pattern is loaded (firmware reports zero width without one).
    pub fn has_pattern(&self) -> bool {
        self.pattern_width.unwrap_or(0) > 0 && self.pattern_height.unwrap_or(0) > 0
    }

    /// Carriage position, if the controller trusts it.
    pub fn carriage(&self) -> Option<i64> {
        match self.carriage_position_valid {
            Some(false) => None,
            _ => self.carriage_position,
        }
    }
}

/// Reply to a state-changing command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub msg_type: String,
    #[serde(default)]
    pub message: String,
}

impl Acknowledgement {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Whether the controller accepted the command.
    pub fn is_ok(&self) -> bool {
        matches!(self.msg_type.as_str(), "ok" | "success")
    }
}
