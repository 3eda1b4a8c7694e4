// src/exception/kind.rs
//! Error kinds and symbolic keys

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure class; decides logging, notification and termination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Unrecoverable host condition
    Fatal,
    /// Server or infrastructure defect
    InternalServer,
    /// Diagnostic-only internal signal
    InternalFacing,
    /// Caused by the hosted program's own code or structure
    UserInitiated,
    /// Anything unclassified
    Unknown,
}

/// Log severity applied to a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSeverity {
    Severe,
    Warning,
    None,
}

/// Routing row for one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindPolicy {
    pub log: LogSeverity,
    pub notify_user: bool,
    pub terminate: bool,
}

impl ErrorKind {
    pub fn policy(&self) -> KindPolicy {
        match self {
            ErrorKind::Fatal => KindPolicy {
                log: LogSeverity::Severe,
                notify_user: true,
                terminate: true,
            },
            ErrorKind::InternalServer => KindPolicy {
                log: LogSeverity::Severe,
                notify_user: true,
                terminate: false,
            },
            ErrorKind::InternalFacing => KindPolicy {
                log: LogSeverity::Warning,
                notify_user: false,
                terminate: false,
            },
            ErrorKind::UserInitiated => KindPolicy {
                log: LogSeverity::None,
                notify_user: true,
                terminate: false,
            },
            ErrorKind::Unknown => KindPolicy {
                log: LogSeverity::Severe,
                notify_user: true,
                terminate: false,
            },
        }
    }

    /// Text used when neither the catalog nor the record has any
    pub fn generic_message(&self) -> &'static str {
        match self {
            ErrorKind::Fatal => "The server ran out of resources and had to stop your program.",
            ErrorKind::InternalServer | ErrorKind::InternalFacing => {
                "Something went wrong on our end. Please try again."
            }
            ErrorKind::UserInitiated => "Your program could not be run.",
            ErrorKind::Unknown => "An unexpected error occurred.",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Fatal => "fatal",
            ErrorKind::InternalServer => "internal_server",
            ErrorKind::InternalFacing => "internal_facing",
            ErrorKind::UserInitiated => "user_initiated",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbolic failure key sent to clients instead of raw diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionKey {
    // Hosted program structure and behavior
    CompilerError,
    RuntimeError,
    NoEntryPoint,
    TwoEntryPoints,
    InvalidEntryPointSignature,
    ClassNotFound,
    InvalidClass,
    TooManyWrites,
    TooManyUploads,
    InvalidFileName,
    ProgramTimeout,
    ProgramStopped,
    ProgramInterrupted,

    // Host defects
    InternalException,
    InternalCompilerException,
    InternalRuntimeException,
    ContentStoreFailure,

    // Diagnostics
    ConnectionTerminated,
    ListenerFailure,

    // Host resource exhaustion
    LowDiskSpace,
    OutOfMemory,
    TempDirectoryCleanupFailed,

    UnknownError,
}

impl ExceptionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionKey::CompilerError => "COMPILER_ERROR",
            ExceptionKey::RuntimeError => "RUNTIME_ERROR",
            ExceptionKey::NoEntryPoint => "NO_ENTRY_POINT",
            ExceptionKey::TwoEntryPoints => "TWO_ENTRY_POINTS",
            ExceptionKey::InvalidEntryPointSignature => "INVALID_ENTRY_POINT_SIGNATURE",
            ExceptionKey::ClassNotFound => "CLASS_NOT_FOUND",
            ExceptionKey::InvalidClass => "INVALID_CLASS",
            ExceptionKey::TooManyWrites => "TOO_MANY_WRITES",
            ExceptionKey::TooManyUploads => "TOO_MANY_UPLOADS",
            ExceptionKey::InvalidFileName => "INVALID_FILE_NAME",
            ExceptionKey::ProgramTimeout => "PROGRAM_TIMEOUT",
            ExceptionKey::ProgramStopped => "PROGRAM_STOPPED",
            ExceptionKey::ProgramInterrupted => "PROGRAM_INTERRUPTED",
            ExceptionKey::InternalException => "INTERNAL_EXCEPTION",
            ExceptionKey::InternalCompilerException => "INTERNAL_COMPILER_EXCEPTION",
            ExceptionKey::InternalRuntimeException => "INTERNAL_RUNTIME_EXCEPTION",
            ExceptionKey::ContentStoreFailure => "CONTENT_STORE_FAILURE",
            ExceptionKey::ConnectionTerminated => "CONNECTION_TERMINATED",
            ExceptionKey::ListenerFailure => "LISTENER_FAILURE",
            ExceptionKey::LowDiskSpace => "LOW_DISK_SPACE",
            ExceptionKey::OutOfMemory => "OUT_OF_MEMORY",
            ExceptionKey::TempDirectoryCleanupFailed => "TEMP_DIRECTORY_CLEANUP_FAILED",
            ExceptionKey::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Process exit code encoded by fatal keys
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExceptionKey::LowDiskSpace => Some(50),
            ExceptionKey::OutOfMemory => Some(51),
            ExceptionKey::TempDirectoryCleanupFailed => Some(52),
            _ => None,
        }
    }

    /// Kind a key is normally raised with
    pub fn default_kind(&self) -> ErrorKind {
        match self {
            ExceptionKey::CompilerError
            | ExceptionKey::RuntimeError
            | ExceptionKey::NoEntryPoint
            | ExceptionKey::TwoEntryPoints
            | ExceptionKey::InvalidEntryPointSignature
            | ExceptionKey::ClassNotFound
            | ExceptionKey::InvalidClass
            | ExceptionKey::TooManyWrites
            | ExceptionKey::TooManyUploads
            | ExceptionKey::InvalidFileName
            | ExceptionKey::ProgramTimeout
            | ExceptionKey::ProgramStopped
            | ExceptionKey::ProgramInterrupted => ErrorKind::UserInitiated,
            ExceptionKey::InternalException
            | ExceptionKey::InternalCompilerException
            | ExceptionKey::InternalRuntimeException
            | ExceptionKey::ContentStoreFailure => ErrorKind::InternalServer,
            ExceptionKey::ConnectionTerminated | ExceptionKey::ListenerFailure => {
                ErrorKind::InternalFacing
            }
            ExceptionKey::LowDiskSpace
            | ExceptionKey::OutOfMemory
            | ExceptionKey::TempDirectoryCleanupFailed => ErrorKind::Fatal,
            ExceptionKey::UnknownError => ErrorKind::Unknown,
        }
    }
}

impl fmt::Display for ExceptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
