use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A host request into the surface. Every request carries a correlation
/// id; the matching response resolves the caller's continuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    Command {
        id: u64,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
    },
    Query {
        id: u64,
        name: String,
    },
    SetContent {
        id: u64,
        html: String,
    },
    GetBody {
        id: u64,
    },
    Shutdown,
}

impl Request {
    pub fn id(&self) -> Option<u64> {
        match self {
            Request::Command { id, .. }
            | Request::Query { id, .. }
            | Request::SetContent { id, .. }
            | Request::GetBody { id } => Some(*id),
            Request::Shutdown => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    Err {
        id: u64,
        message: String,
    },
}

impl Response {
    pub fn id(&self) -> u64 {
        match self {
            Response::Ok { id, .. } | Response::Err { id, .. } => *id,
        }
    }
}

/// Channel event names mirror the legacy surface channels.
pub const CONTENT_CHANGED: &str = "contentChanged";
pub const SELECTION_CHANGED: &str = "selectionChanged";
pub const TABLE_CLICKED: &str = "tableClicked";
pub const TABLE_DELETED: &str = "tableDeleted";
pub const TABLES_DEACTIVATED: &str = "tablesDeactivated";

/// The sentinel payload for `contentChanged`.
pub const CHANGED_SENTINEL: &str = "changed";

/// An event posted from the surface to the host. Sequence numbers are
/// monotone per surface; consumers drop anything older than what they
/// have already applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub seq: u64,
    pub name: String,
    pub payload: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_as_json() {
        let request = Request::Command {
            id: 7,
            name: "bold".to_string(),
            args: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id(), Some(7));
    }

    #[test]
    fn string_args_are_json_encoded() {
        let request = Request::Command {
            id: 1,
            name: "fontName".to_string(),
            args: Some(serde_json::json!({ "name": "Libre \"Quoted\" Serif" })),
        };
        let json = serde_json::to_string(&request).unwrap();
        // The quote must arrive escaped, never spliced raw into the wire.
        assert!(json.contains("\\\"Quoted\\\""));
    }
}
