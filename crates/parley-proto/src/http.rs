//! Payloads of the auxiliary HTTP endpoints.

use serde::{Deserialize, Serialize};

use crate::message::MessageRecord;

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Free-form status string, usually `"ok"`.
    #[serde(default)]
    pub status: String,
    /// Externally visible address of the server, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// Response of `GET /info`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Externally visible address of the server.
    #[serde(default)]
    pub ip: String,
}

/// Body of `POST /export`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    /// Room the transcript belongs to.
    pub room_code: String,
    /// Messages to render, in log order.
    pub messages: Vec<MessageRecord>,
}
