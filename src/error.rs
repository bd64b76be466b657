use crate::ffi::{self, Status};

/// Semantic category of a failed native call.
///
/// Callers branch on the kind, never on raw status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    PermissionDenied,
    /// The hardware or library cannot provide the capability; expected and
    /// recoverable.
    Unsupported,
    /// Call [`crate::DeviceSession::reconnect`], do not reopen the session.
    ConnectionLost,
    TimedOut,
    ResourceExhausted,
    InvalidArgument,
    /// Already started, subscribed, busy, in progress, or called from inside
    /// a callback. Retry after the current `process_callbacks` returns.
    ConflictingState,
    /// The operation was refused for now, e.g. time sync requested too often.
    OperationAborted,
    Unknown,
}

/// Map a native status code to its failure category. `0` is success.
pub fn translate(code: Status) -> Option<FailureKind> {
    let kind = match code {
        ffi::ERROR_NO_ERROR => return None,
        ffi::ERROR_INSUFFICIENT_LICENSE | ffi::ERROR_UNAUTHORIZED => FailureKind::PermissionDenied,
        ffi::ERROR_NOT_SUPPORTED | ffi::ERROR_NOT_AVAILABLE => FailureKind::Unsupported,
        ffi::ERROR_CONNECTION_FAILED | ffi::ERROR_CONNECTION_FAILED_DRIVER => {
            FailureKind::ConnectionLost
        }
        ffi::ERROR_TIMED_OUT => FailureKind::TimedOut,
        ffi::ERROR_ALLOCATION_FAILED => FailureKind::ResourceExhausted,
        ffi::ERROR_INVALID_PARAMETER => FailureKind::InvalidArgument,
        ffi::ERROR_CALIBRATION_ALREADY_STARTED
        | ffi::ERROR_CALIBRATION_NOT_STARTED
        | ffi::ERROR_ALREADY_SUBSCRIBED
        | ffi::ERROR_NOT_SUBSCRIBED
        | ffi::ERROR_CONFLICTING_API_INSTANCES
        | ffi::ERROR_CALIBRATION_BUSY
        | ffi::ERROR_CALLBACK_IN_PROGRESS
        | ffi::ERROR_TOO_MANY_SUBSCRIBERS
        | ffi::ERROR_FIRMWARE_UPGRADE_IN_PROGRESS => FailureKind::ConflictingState,
        ffi::ERROR_OPERATION_FAILED => FailureKind::OperationAborted,
        _ => FailureKind::Unknown,
    };
    Some(kind)
}

/// Errors that can occur when driving the native library.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{operation} failed: {message} ({kind:?}, code {code})")]
    Native {
        operation: &'static str,
        kind: FailureKind,
        code: Status,
        message: String,
    },

    #[error("Native allocation failed")]
    OutOfMemory,

    #[error("{0} used after close")]
    Disposed(&'static str),

    #[error("Native library integrity check failed: {0}")]
    Integrity(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} device session(s) still open; close them before the root context")]
    SessionsOpen(usize),

    #[error("Failed to load native library: {0}")]
    Load(#[from] libloading::Error),

    #[error("Native library is missing symbol {0}")]
    MissingSymbol(String),
}

impl EngineError {
    /// Failure category, for errors that have one.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            EngineError::Native { kind, .. } => Some(*kind),
            EngineError::InvalidArgument(_) => Some(FailureKind::InvalidArgument),
            EngineError::OutOfMemory => Some(FailureKind::ResourceExhausted),
            EngineError::SessionsOpen(_) => Some(FailureKind::ConflictingState),
            _ => None,
        }
    }

    /// Native status code, for translated native failures.
    pub fn code(&self) -> Option<Status> {
        match self {
            EngineError::Native { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        self.kind() == Some(FailureKind::Unsupported)
    }

    pub(crate) fn unsupported(operation: &'static str, message: impl Into<String>) -> Self {
        EngineError::Native {
            operation,
            kind: FailureKind::Unsupported,
            code: ffi::ERROR_NOT_SUPPORTED,
            message: message.into(),
        }
    }
}
