//! An error from the Cocoa client

use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;

use crate::models::TaskFailure;

/// The broad classification of an [`Error`]
///
/// Kinds drive retry decisions and the idempotent cleanup paths: a
/// `NotFound` from a delete is a normal outcome, a `Transient` is worth
/// retrying, and everything else is surfaced to the caller as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller supplied structurally invalid options or identifiers
    InvalidInput,
    /// A referenced task, task definition, secret, or cluster does not exist
    NotFound,
    /// The provider denied access for this operation
    Unauthorized,
    /// A network/throttling/5xx failure that may succeed on retry
    Transient,
    /// A create collided with a resource that already exists
    AlreadyExists,
    /// The provider ran part of the request and rejected the rest
    PartialFailure,
    /// The operation was cancelled before it completed
    Cancelled,
    /// A failure with no more specific classification
    Internal,
}

/// An error from the Cocoa client
#[derive(Debug)]
pub enum Error {
    /// The caller supplied structurally invalid options or identifiers
    InvalidInput(String),
    /// A referenced task, task definition, secret, or cluster does not exist
    NotFound(String),
    /// The provider denied access for this operation
    Unauthorized(String),
    /// A transient provider failure that may succeed on retry
    Transient(String),
    /// A create collided with a resource that already exists
    AlreadyExists(String),
    /// The provider ran part of the request and rejected the rest
    PartialFailure {
        /// The operation that partially failed
        op: String,
        /// The failures the provider reported
        failures: Vec<TaskFailure>,
    },
    /// The operation was cancelled before it completed
    Cancelled(String),
    /// A failure with no more specific classification
    Internal(String),
    /// Multiple failures aggregated from a multi-step operation
    Aggregate(Vec<Error>),
    /// An error from loading a config
    Config(config::ConfigError),
    /// An error from converting a value with serde
    Serde(serde_json::Error),
    /// An IO error
    IO(std::io::Error),
    /// An error from building a provider request
    Build(aws_smithy_types::error::operation::BuildError),
}

impl Error {
    /// Create a new generic error
    ///
    /// # Arguments
    ///
    /// * `msg` - The error message to set
    pub fn new<T: Into<String>>(msg: T) -> Self {
        Error::Internal(msg.into())
    }

    /// Get the kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::Transient(_) => ErrorKind::Transient,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::PartialFailure { .. } => ErrorKind::PartialFailure,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Internal(_) | Error::Serde(_) | Error::IO(_) => ErrorKind::Internal,
            // an aggregate takes the kind of its first member
            Error::Aggregate(errors) => errors
                .first()
                .map_or(ErrorKind::Internal, |first| first.kind()),
            // config and request build problems are caller input problems
            Error::Config(_) | Error::Build(_) => ErrorKind::InvalidInput,
        }
    }

    /// Whether this error is worth retrying
    pub fn retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Whether this error means the referenced resource does not exist
    ///
    /// The idempotent cleanup paths swallow these.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Get the error message for this error if one exists
    pub fn msg(&self) -> Option<String> {
        match self {
            Error::InvalidInput(msg)
            | Error::NotFound(msg)
            | Error::Unauthorized(msg)
            | Error::Transient(msg)
            | Error::AlreadyExists(msg)
            | Error::Cancelled(msg)
            | Error::Internal(msg) => Some(msg.clone()),
            Error::PartialFailure { op, failures } => {
                // list each failure the provider handed back
                let listed = failures
                    .iter()
                    .map(TaskFailure::to_string)
                    .collect::<Vec<String>>()
                    .join(", ");
                Some(format!("{op}: [{listed}]"))
            }
            Error::Aggregate(errors) => {
                let listed = errors
                    .iter()
                    .filter_map(Error::msg)
                    .collect::<Vec<String>>()
                    .join("; ");
                Some(listed)
            }
            Error::Config(err) => Some(err.to_string()),
            Error::Serde(err) => Some(err.to_string()),
            Error::IO(err) => Some(err.to_string()),
            Error::Build(err) => Some(err.to_string()),
        }
    }

    /// Prefix this error's message with some context, keeping its kind
    ///
    /// # Arguments
    ///
    /// * `ctx` - The operation name and key identifiers to prepend
    pub fn context<C: std::fmt::Display>(self, ctx: C) -> Self {
        match self {
            Error::InvalidInput(msg) => Error::InvalidInput(format!("{ctx}: {msg}")),
            Error::NotFound(msg) => Error::NotFound(format!("{ctx}: {msg}")),
            Error::Unauthorized(msg) => Error::Unauthorized(format!("{ctx}: {msg}")),
            Error::Transient(msg) => Error::Transient(format!("{ctx}: {msg}")),
            Error::AlreadyExists(msg) => Error::AlreadyExists(format!("{ctx}: {msg}")),
            Error::Cancelled(msg) => Error::Cancelled(format!("{ctx}: {msg}")),
            Error::Internal(msg) => Error::Internal(format!("{ctx}: {msg}")),
            // the remaining variants carry their own context
            other => other,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.msg() {
            Some(msg) => write!(f, "{msg}"),
            None => write!(f, "{self:?}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(err) => Some(err),
            Error::Serde(err) => Some(err),
            Error::IO(err) => Some(err),
            Error::Build(err) => Some(err),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err)
    }
}

impl From<aws_smithy_types::error::operation::BuildError> for Error {
    fn from(err: aws_smithy_types::error::operation::BuildError) -> Self {
        Error::Build(err)
    }
}

/// Classify a provider error code into a domain error
///
/// The table is shared by the container service and the secret store since
/// both surface their error codes through the same metadata shape.
///
/// # Arguments
///
/// * `op` - The operation that failed
/// * `ident` - The key identifier the operation was called with
/// * `code` - The provider's error code
/// * `message` - The provider's error message
/// * `status` - The http status of the response
pub(crate) fn classify_code(
    op: &str,
    ident: &str,
    code: &str,
    message: &str,
    status: u16,
) -> Error {
    let msg = format!("{op} {ident}: {code}: {message}");
    match code {
        // parameter problems are never retried
        "InvalidParameterException"
        | "InvalidParameterValueException"
        | "InvalidRequestException"
        | "ValidationException"
        | "ClientException"
        | "MalformedPolicyDocumentException" => Error::InvalidInput(msg),
        // the referenced resource does not exist
        "ResourceNotFoundException" | "ClusterNotFoundException" => Error::NotFound(msg),
        "AccessDeniedException" | "AccessDenied" | "UnauthorizedOperation"
        | "UnrecognizedClientException" => Error::Unauthorized(msg),
        "ResourceExistsException" => Error::AlreadyExists(msg),
        // update-in-progress conflicts settle on their own
        "UpdateInProgressException"
        | "ThrottlingException"
        | "TooManyRequestsException"
        | "RequestLimitExceeded"
        | "LimitExceededException"
        | "ServerException"
        | "ServiceUnavailableException"
        | "InternalServiceError"
        | "InternalServiceException" => Error::Transient(msg),
        _ if status >= 500 => Error::Transient(msg),
        _ => Error::Internal(msg),
    }
}

/// Classify a failed provider call into a domain error
///
/// # Arguments
///
/// * `op` - The operation that failed
/// * `ident` - The key identifier the operation was called with
/// * `err` - The error the sdk returned
pub(crate) fn classify_sdk<E>(
    op: &str,
    ident: &str,
    err: SdkError<E, aws_smithy_runtime_api::client::orchestrator::HttpResponse>,
) -> Error
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    match &err {
        // the request never completed so it is safe to try again
        SdkError::TimeoutError(_) => {
            Error::Transient(format!("{op} {ident}: request timed out"))
        }
        SdkError::DispatchFailure(failure) => {
            Error::Transient(format!("{op} {ident}: dispatch failure: {failure:?}"))
        }
        SdkError::ResponseError(_) => {
            Error::Transient(format!("{op} {ident}: unparseable response"))
        }
        SdkError::ServiceError(_) => {
            let code = err.code().unwrap_or("Unknown").to_owned();
            let message = err.message().unwrap_or("no message").to_owned();
            // the raw response is only reachable through the owned context
            let status = match err {
                SdkError::ServiceError(ctx) => ctx.raw().status().as_u16(),
                _ => 0,
            };
            classify_code(op, ident, &code, &message, status)
        }
        _ => Error::Internal(format!("{op} {ident}: {err:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_problems_are_not_retried() {
        for code in ["InvalidParameterException", "ClientException", "ValidationException"] {
            let err = classify_code("op", "id", code, "bad", 400);
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
            assert!(!err.retryable());
        }
    }

    #[test]
    fn missing_resources_are_not_found() {
        for code in ["ResourceNotFoundException", "ClusterNotFoundException"] {
            let err = classify_code("op", "id", code, "missing", 400);
            assert_eq!(err.kind(), ErrorKind::NotFound);
            assert!(err.is_not_found());
        }
    }

    #[test]
    fn conflicts_and_throttles_are_transient() {
        for code in [
            "UpdateInProgressException",
            "ThrottlingException",
            "ServerException",
        ] {
            let err = classify_code("op", "id", code, "busy", 400);
            assert!(err.retryable(), "{code} should be retryable");
        }
    }

    #[test]
    fn unknown_codes_fall_back_on_status() {
        assert_eq!(
            classify_code("op", "id", "SomethingNew", "?", 503).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            classify_code("op", "id", "SomethingNew", "?", 400).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn existing_names_surface_as_conflicts() {
        let err = classify_code("create_secret", "pfx/n", "ResourceExistsException", "taken", 400);
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn context_keeps_the_kind() {
        let err = Error::NotFound("secret x not found".to_owned()).context("deleting secret x");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.msg().unwrap().starts_with("deleting secret x: "));
    }

    #[test]
    fn aggregates_take_their_first_kind() {
        let err = Error::Aggregate(vec![
            Error::Transient("throttled".to_owned()),
            Error::NotFound("gone".to_owned()),
        ]);
        assert_eq!(err.kind(), ErrorKind::Transient);
        // an empty aggregate still classifies
        assert_eq!(Error::Aggregate(Vec::new()).kind(), ErrorKind::Internal);
    }
}
