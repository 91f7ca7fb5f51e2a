use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone, Default, Eq, PartialEq)]
pub(super) struct PresentRequest {
    pub token: String,
}

#[derive(Serialize, Debug, Clone, Default, Eq, PartialEq)]
pub(super) struct PresentResult {
    pub token: String,
}

/// Serializes as `{}`.
#[derive(Serialize, Debug, Clone, Copy, Default, Eq, PartialEq)]
pub(super) struct Empty {}

#[derive(Serialize, Debug, Clone, Eq, PartialEq)]
pub(super) struct Envelope<T> {
    pub code: u16,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        Envelope {
            code: status.as_u16(),
            message: message.into(),
            data,
        }
    }

    pub fn success(data: T) -> Self {
        Self::new(StatusCode::OK, "Success", data)
    }
}
