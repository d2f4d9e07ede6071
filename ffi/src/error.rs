use std::ffi::{c_char, CString};

use treegroup::ErrorKind;

/// Failures of a call across the C boundary.
#[derive(thiserror::Error, Debug)]
pub enum FfiError {
    #[error(transparent)]
    Core(#[from] treegroup::Error),

    #[error("null pointer passed as {0}")]
    NullPointer(&'static str),

    #[error("{0} handle is stale or was released")]
    StaleHandle(&'static str),

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("no signer is bound to the group")]
    NoSigner,

    #[error("too many live {0} handles")]
    ArenaFull(&'static str),

    #[error("panic while handling the call")]
    Panic,
}

pub type Result<T> = std::result::Result<T, FfiError>;

impl FfiError {
    /// Everything that is not a protocol failure is a caller bug.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FfiError::Core(err) => err.kind(),
            _ => ErrorKind::ResourceMisuse,
        }
    }
}

/// Outcome of every fallible call. `error_message` is owned by the library until it is handed
/// back to [`crate::free_error_message`].
#[repr(C)]
#[derive(Debug)]
pub struct FfiResult {
    pub success: bool,
    pub error_message: *mut c_char,
}

impl FfiResult {
    pub(crate) fn ok() -> Self {
        Self {
            success: true,
            error_message: std::ptr::null_mut(),
        }
    }

    /// The message reads `<kind>: <detail>`, so callers can branch on the prefix.
    pub(crate) fn error(err: &FfiError) -> Self {
        let message = CString::new(format!("{}: {err}", err.kind())).unwrap_or_default();
        Self {
            success: false,
            error_message: message.into_raw(),
        }
    }
}
