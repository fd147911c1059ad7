//! Operator command surface.
//!
//! Commands arrive as JSON objects tagged by `type`:
//!
//! ```json
//! {"type": "override_part", "partId": "PART-00012", "failedSensorId": "snsr-aa-1-01"}
//! {"type": "get_part_history", "partId": "PART-00012"}
//! {"type": "search_part", "query": "0001"}
//! ```
//!
//! Anything that does not parse is dropped.

use serde::{Deserialize, Serialize};

use crate::model::Part;

/// Operator request to resume a part stopped on a belt.
///
/// The optional fields pin the stop point; when absent the tracker's
/// recorded stop location is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideCommand {
    pub part_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_station_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_station_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_sensor_id: Option<String>,
}

impl OverrideCommand {
    pub fn new(part_id: &str) -> Self {
        Self {
            part_id: part_id.to_string(),
            from_station_id: None,
            to_station_id: None,
            failed_sensor_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    OverridePart(OverrideCommand),
    #[serde(rename_all = "camelCase")]
    GetPartHistory { part_id: String },
    SearchPart { query: String },
}

impl Command {
    /// Parses a JSON command. Malformed input yields `None`.
    pub fn decode(bytes: &[u8]) -> Option<Command> {
        serde_json::from_slice(bytes).ok()
    }
}

/// Reply to a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum CommandResponse {
    PartHistory(Option<Part>),
    SearchResults(Vec<Part>),
    #[serde(rename_all = "camelCase")]
    OverrideAccepted { part_id: String },
    #[serde(rename_all = "camelCase")]
    OverrideRejected { part_id: String },
}
