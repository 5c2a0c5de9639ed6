//! Atlas API errors and transient-error classification.

use thiserror::Error;

/// An error returned by the Atlas API.
///
/// Carries the HTTP status and the Atlas `errorCode`, which is what call
/// sites classify on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Atlas API error {status} ({code}): {detail}", code = .error_code.as_deref().unwrap_or("UNKNOWN"))]
pub struct AtlasError {
    /// HTTP status code.
    pub status: u16,
    /// Atlas error code, e.g. `ATLAS_CUSTOM_ROLE_NOT_FOUND`.
    pub error_code: Option<String>,
    /// Human-readable detail from the response body.
    pub detail: String,
}

impl AtlasError {
    /// Create an error with a status and detail and no error code.
    pub fn new(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status,
            error_code: None,
            detail: detail.into(),
        }
    }

    /// Attach an Atlas error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    /// A 404 with the given error code.
    pub fn not_found(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(404, detail).with_code(code)
    }

    /// Whether the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Whether the error carries the given Atlas error code.
    pub fn has_code(&self, code: &str) -> bool {
        self.error_code.as_deref() == Some(code)
    }
}

/// How a call site treats an error from a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The backend has not converged yet; probe again.
    Pending,
    /// Surface the error immediately.
    Fatal,
}

/// A set of HTTP statuses and Atlas error codes that a call site treats as
/// transient.
///
/// An error is pending if its status or its code is listed; everything else
/// is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPolicy {
    statuses: &'static [u16],
    codes: &'static [&'static str],
}

impl ErrorPolicy {
    /// Create a policy.
    pub const fn new(statuses: &'static [u16], codes: &'static [&'static str]) -> Self {
        Self { statuses, codes }
    }

    /// Classify an error.
    pub fn classify(&self, err: &AtlasError) -> ErrorClass {
        let status_listed = self.statuses.contains(&err.status);
        let code_listed = err
            .error_code
            .as_deref()
            .is_some_and(|code| self.codes.iter().any(|listed| *listed == code));

        if status_listed || code_listed {
            ErrorClass::Pending
        } else {
            ErrorClass::Fatal
        }
    }

    /// Shorthand for `classify(err) == ErrorClass::Pending`.
    pub fn is_pending(&self, err: &AtlasError) -> bool {
        self.classify(err) == ErrorClass::Pending
    }
}
