use std::fmt;
use thiserror::Error;

/// Main error type for Xcom operations
#[derive(Error, Debug)]
pub enum XcomError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Write failure: {0}")]
    Write(String),

    #[error("Read failure: {0}")]
    Read(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Malformed package: {0}")]
    MalformedPackage(String),

    #[error("Response is error: {message} (0x{code:04X})")]
    ResponseIsError { code: u16, message: String },

    #[error("Unknown datapoint: {nr}{}", family_suffix(.family))]
    UnknownDatapoint { nr: u16, family: Option<String> },

    #[error("Address out of range: {designator} ({reason})")]
    AddressOutOfRange { designator: String, reason: String },

    #[error("Unknown device family: {0}")]
    UnknownFamily(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Malformed value: {0}")]
    MalformedValue(String),

    #[error("Value out of range: {0}")]
    ValueOutOfRange(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

fn family_suffix(family: &Option<String>) -> String {
    family.as_deref().map(|f| format!(" ({f})")).unwrap_or_default()
}

/// Result type alias for Xcom operations
pub type XcomResult<T> = Result<T, XcomError>;

/// Flat discriminant of [`XcomError`], for callers that branch on the kind of
/// failure rather than on its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Connection,
    Write,
    Read,
    Timeout,
    MalformedPackage,
    ResponseIsError,
    UnknownDatapoint,
    AddressOutOfRange,
    UnknownFamily,
    Cancelled,
    MalformedValue,
    ValueOutOfRange,
    InvalidRequest,
    InvalidData,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl XcomError {
    /// Get the kind of this failure
    pub fn kind(&self) -> FailureKind {
        match self {
            XcomError::Connection(_) => FailureKind::Connection,
            XcomError::Write(_) => FailureKind::Write,
            XcomError::Read(_) => FailureKind::Read,
            XcomError::Timeout(_) => FailureKind::Timeout,
            XcomError::MalformedPackage(_) => FailureKind::MalformedPackage,
            XcomError::ResponseIsError { .. } => FailureKind::ResponseIsError,
            XcomError::UnknownDatapoint { .. } => FailureKind::UnknownDatapoint,
            XcomError::AddressOutOfRange { .. } => FailureKind::AddressOutOfRange,
            XcomError::UnknownFamily(_) => FailureKind::UnknownFamily,
            XcomError::Cancelled => FailureKind::Cancelled,
            XcomError::MalformedValue(_) => FailureKind::MalformedValue,
            XcomError::ValueOutOfRange(_) => FailureKind::ValueOutOfRange,
            XcomError::InvalidRequest(_) => FailureKind::InvalidRequest,
            XcomError::InvalidData(_) => FailureKind::InvalidData,
        }
    }

    /// Whether another attempt of the same exchange may succeed.
    ///
    /// Only transport level failures qualify. A response carrying an error
    /// status is a rejection by the device and is never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            XcomError::Write(_) | XcomError::Read(_) | XcomError::Timeout(_)
        )
    }

    /// Error code reported by the device, if this is an error response
    pub fn response_code(&self) -> Option<u16> {
        match self {
            XcomError::ResponseIsError { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Cloneable snapshot of an [`XcomError`], stored per item in batch responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub kind: FailureKind,
    pub code: Option<u16>,
    pub message: String,
}

impl From<&XcomError> for ItemFailure {
    fn from(err: &XcomError) -> Self {
        Self {
            kind: err.kind(),
            code: err.response_code(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
