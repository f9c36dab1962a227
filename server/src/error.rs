use std::fmt;

use anyhow::Error as AnyError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lessonroom_core::policy::DenyReason;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use tracing::error;

/// Coarse error taxonomy callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    AccessDenied,
    NotFound,
    UserNotFound,
    Forbidden,
    CreationFailed,
    ServiceUnavailable,
}

#[derive(Debug, Clone, Copy)]
struct ErrorDescriptor {
    kind: ErrorKind,
    status: StatusCode,
    name: &'static str,
    error_type: &'static str,
    default_message: &'static str,
}

const BAD_REQUEST_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::BadRequest,
    status: StatusCode::BAD_REQUEST,
    name: "BAD_REQUEST",
    error_type: "BAD_REQUEST",
    default_message: "Bad request.",
};

const UNAUTHORIZED_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::Unauthorized,
    status: StatusCode::UNAUTHORIZED,
    name: "AUTHENTICATION_REQUIRED",
    error_type: "AUTHENTICATION_REQUIRED",
    default_message: "You must sign in first to access this resource.",
};

const ACCESS_DENIED_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::AccessDenied,
    status: StatusCode::FORBIDDEN,
    name: "ACCESS_DENIED",
    error_type: "NO_PERMISSION",
    default_message: "You don't have access to this document.",
};

const NOT_FOUND_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::NotFound,
    status: StatusCode::NOT_FOUND,
    name: "NOT_FOUND",
    error_type: "RESOURCE_NOT_FOUND",
    default_message: "Resource not found.",
};

const USER_NOT_FOUND_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::UserNotFound,
    status: StatusCode::NOT_FOUND,
    name: "USER_NOT_FOUND",
    error_type: "RESOURCE_NOT_FOUND",
    default_message: "User not found.",
};

const FORBIDDEN_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::Forbidden,
    status: StatusCode::FORBIDDEN,
    name: "ACTION_FORBIDDEN",
    error_type: "ACTION_FORBIDDEN",
    default_message: "Action forbidden.",
};

const CREATION_FAILED_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::CreationFailed,
    status: StatusCode::BAD_GATEWAY,
    name: "CREATION_FAILED",
    error_type: "CREATION_FAILED",
    default_message: "The document could not be created.",
};

const SERVICE_UNAVAILABLE_DESCRIPTOR: ErrorDescriptor = ErrorDescriptor {
    kind: ErrorKind::ServiceUnavailable,
    status: StatusCode::SERVICE_UNAVAILABLE,
    name: "SERVICE_UNAVAILABLE",
    error_type: "SERVICE_UNAVAILABLE",
    default_message: "A collaboration service is unavailable. Please try again.",
};

#[derive(Debug)]
pub struct AppError {
    descriptor: &'static ErrorDescriptor,
    name: String,
    error_type: String,
    message: String,
    data: Option<JsonValue>,
    source: Option<AnyError>,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::from_descriptor(&BAD_REQUEST_DESCRIPTOR, Some(message.into()))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::from_descriptor(&UNAUTHORIZED_DESCRIPTOR, Some(message.into()))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::from_descriptor(&FORBIDDEN_DESCRIPTOR, Some(message.into()))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::from_descriptor(&NOT_FOUND_DESCRIPTOR, Some(message.into()))
    }

    /// A policy rule rejected the action; the rule text is shown verbatim.
    pub fn access_denied(reason: DenyReason) -> Self {
        Self::from_descriptor(&ACCESS_DENIED_DESCRIPTOR, Some(reason.message().to_owned()))
            .with_data(json!({ "reason": reason.code() }))
    }

    pub fn doc_access_denied(doc_id: &str) -> Self {
        Self::from_descriptor(&ACCESS_DENIED_DESCRIPTOR, None)
            .with_data(json!({ "docId": doc_id, "reason": DenyReason::NoAccess.code() }))
    }

    pub fn doc_not_found(doc_id: &str) -> Self {
        let message = format!("Document {doc_id} not found.");
        Self::from_descriptor(&NOT_FOUND_DESCRIPTOR, Some(message))
            .with_name("DOC_NOT_FOUND")
            .with_data(json!({ "docId": doc_id }))
    }

    pub fn thread_not_found(doc_id: &str, thread_id: &str) -> Self {
        let message = format!("Thread {thread_id} not found in document {doc_id}.");
        Self::from_descriptor(&NOT_FOUND_DESCRIPTOR, Some(message))
            .with_name("THREAD_NOT_FOUND")
            .with_data(json!({ "docId": doc_id, "threadId": thread_id }))
    }

    pub fn notification_not_found(notification_id: &str) -> Self {
        let message = format!("Notification {notification_id} not found.");
        Self::from_descriptor(&NOT_FOUND_DESCRIPTOR, Some(message))
            .with_name("NOTIFICATION_NOT_FOUND")
            .with_data(json!({ "notificationId": notification_id }))
    }

    pub fn user_not_found(email: &str) -> Self {
        let message = format!("No user found with email {email}. Check the email address.");
        Self::from_descriptor(&USER_NOT_FOUND_DESCRIPTOR, Some(message))
            .with_data(json!({ "email": email }))
    }

    pub fn creation_failed(error: AnyError) -> Self {
        error!(?error, "document creation failed");
        Self::from_descriptor(&CREATION_FAILED_DESCRIPTOR, None).with_source(error)
    }

    pub fn service_unavailable(error: AnyError) -> Self {
        error!(?error, "external service call failed");
        Self::from_descriptor(&SERVICE_UNAVAILABLE_DESCRIPTOR, None).with_source(error)
    }

    /// Every `anyhow` error in this crate comes from an external service call.
    pub fn from_anyhow(error: AnyError) -> Self {
        Self::service_unavailable(error)
    }

    pub fn kind(&self) -> ErrorKind {
        self.descriptor.kind
    }

    pub fn status(&self) -> StatusCode {
        self.descriptor.status
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn into_payload(self) -> (StatusCode, UserFriendlyPayload) {
        let AppError {
            descriptor,
            name,
            error_type,
            message,
            data,
            source: _,
        } = self;

        let status = descriptor.status;
        let (code, reason) = code_and_reason(status);
        let payload = UserFriendlyPayload {
            status: status.as_u16(),
            code,
            reason,
            error_type,
            name,
            message,
            data,
        };

        (status, payload)
    }

    fn from_descriptor(descriptor: &'static ErrorDescriptor, message: Option<String>) -> Self {
        Self {
            descriptor,
            name: descriptor.name.to_owned(),
            error_type: descriptor.error_type.to_owned(),
            message: message.unwrap_or_else(|| descriptor.default_message.to_owned()),
            data: None,
            source: None,
        }
    }

    fn with_source(mut self, error: AnyError) -> Self {
        self.source = Some(error);
        self
    }

    pub(crate) fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub(crate) fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| &**err as &(dyn std::error::Error + 'static))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, payload) = self.into_payload();
        (status, Json(payload)).into_response()
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct UserFriendlyPayload {
    pub(crate) status: u16,
    pub(crate) code: String,
    pub(crate) reason: String,
    #[serde(rename = "type")]
    pub(crate) error_type: String,
    pub(crate) name: String,
    pub(crate) message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) data: Option<JsonValue>,
}

fn code_and_reason(status: StatusCode) -> (String, String) {
    let reason = status
        .canonical_reason()
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("Status {}", status.as_u16()));

    let code = reason
        .chars()
        .map(|ch| match ch {
            'a'..='z' => ch.to_ascii_uppercase(),
            'A'..='Z' | '0'..='9' => ch,
            _ => '_',
        })
        .collect::<String>();

    (code, reason)
}
