//! Response envelope shared by both services

use serde::Serialize;

use crate::error::AccountError;

/// Success envelope: `{statusCode, data, message, success}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status_code: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status_code: u16, data: T, message: impl Into<String>) -> Self {
        Self {
            status_code,
            data,
            message: message.into(),
            success: status_code < 400,
        }
    }
}

/// Error envelope: `{statusCode, error, message, success}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub error: &'static str,
    pub message: String,
    pub success: bool,
}

impl From<&AccountError> for ErrorBody {
    fn from(err: &AccountError) -> Self {
        Self {
            status_code: err.status_code(),
            error: err.kind().as_str(),
            message: err.message().to_string(),
            success: false,
        }
    }
}
