// Copyright 2022 Swarmdb Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The error type shared by every crate in the workspace.
//!
//! `ErrorCode` is the taxonomy described in the design docs: recoverable
//! transient failures, query-fatal failures, instance-fatal failures
//! promoted to query-fatal, user cancellation, and admission control
//! rejections. Every fallible operation in this workspace returns
//! `exception::Result<T>`.

mod exit_code;

pub use exit_code::ExitCode;

use std::backtrace::Backtrace;
use std::fmt;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ErrorCode>;

#[derive(thiserror::Error)]
pub enum ErrorCode {
    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Memory limit exceeded: {0}")]
    MemoryLimitExceeded(String),

    #[error("Query cancelled: {0}")]
    QueryCancelled(String),

    #[error("Recoverable transient error (attempt {attempts}): {message}")]
    RecoverableTransient { message: String, attempts: u32 },

    #[error("Admission denied: {0}")]
    AdmissionDenied(String),

    #[error("Resource preempted: {0}")]
    ResourcePreempted(String),

    #[error("Timed out: {0}")]
    TimedOut(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Receiver closed: {0}")]
    ReceiverClosed(String),

    #[error("Unknown fragment instance: {0}")]
    UnknownInstance(String),

    #[error("Bad wire format: {0}")]
    BadWireFormat(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ErrorCode {
    pub fn code(&self) -> u16 {
        match self {
            ErrorCode::InternalError(_) => 1001,
            ErrorCode::MemoryLimitExceeded(_) => 1002,
            ErrorCode::QueryCancelled(_) => 1003,
            ErrorCode::RecoverableTransient { .. } => 1004,
            ErrorCode::AdmissionDenied(_) => 1005,
            ErrorCode::ResourcePreempted(_) => 1006,
            ErrorCode::TimedOut(_) => 1007,
            ErrorCode::NotAuthorized(_) => 1008,
            ErrorCode::ReceiverClosed(_) => 1009,
            ErrorCode::UnknownInstance(_) => 1010,
            ErrorCode::BadWireFormat(_) => 1011,
            ErrorCode::InvalidConfig(_) => 1012,
        }
    }

    /// Whether this error should be latched as query-fatal (vs. handled
    /// locally as a recoverable retry).
    pub fn is_query_fatal(&self) -> bool {
        !matches!(self, ErrorCode::RecoverableTransient { .. })
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            ErrorCode::MemoryLimitExceeded(_) => ExitCode::MemLimitExceeded,
            ErrorCode::QueryCancelled(_) => ExitCode::Cancelled,
            ErrorCode::TimedOut(_) => ExitCode::TimedOut,
            ErrorCode::NotAuthorized(_) => ExitCode::NotAuthorized,
            _ => ExitCode::InternalError,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ErrorCode::InternalError(msg.into())
    }

    pub fn mem_limit_exceeded(tracker_label: impl Into<String>) -> Self {
        ErrorCode::MemoryLimitExceeded(tracker_label.into())
    }
}

impl fmt::Debug for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ErrorCode::{:04}: {}\n\n{}",
            self.code(),
            self,
            Backtrace::capture()
        )
    }
}

impl From<ErrorCode> for tonic::Status {
    fn from(err: ErrorCode) -> Self {
        let code = match &err {
            ErrorCode::MemoryLimitExceeded(_) => tonic::Code::ResourceExhausted,
            ErrorCode::QueryCancelled(_) => tonic::Code::Cancelled,
            ErrorCode::TimedOut(_) => tonic::Code::DeadlineExceeded,
            ErrorCode::NotAuthorized(_) => tonic::Code::PermissionDenied,
            ErrorCode::UnknownInstance(_) => tonic::Code::NotFound,
            ErrorCode::RecoverableTransient { .. } => tonic::Code::Unavailable,
            _ => tonic::Code::Internal,
        };
        tonic::Status::new(code, format!("{:04} {}", err.code(), err))
    }
}

impl From<tonic::Status> for ErrorCode {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::Unavailable => ErrorCode::RecoverableTransient {
                message: status.message().to_string(),
                attempts: 1,
            },
            tonic::Code::Cancelled => ErrorCode::QueryCancelled(status.message().to_string()),
            tonic::Code::DeadlineExceeded => ErrorCode::TimedOut(status.message().to_string()),
            tonic::Code::PermissionDenied => ErrorCode::NotAuthorized(status.message().to_string()),
            _ => ErrorCode::InternalError(status.message().to_string()),
        }
    }
}

impl From<std::io::Error> for ErrorCode {
    fn from(err: std::io::Error) -> Self {
        ErrorCode::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for ErrorCode {
    fn from(err: serde_json::Error) -> Self {
        ErrorCode::BadWireFormat(err.to_string())
    }
}

/// Latches the first error into a `watch`-style cell, mirroring the
/// "first-error-wins" rule the coordinator applies to instance status
/// reports.
pub struct FirstErrorLatch {
    inner: std::sync::Mutex<Option<ErrorCode>>,
}

impl Default for FirstErrorLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl FirstErrorLatch {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Mutex::new(None),
        }
    }

    /// Records `err` only if nothing has been latched yet. Returns true if
    /// this call was the one that latched it.
    pub fn latch(&self, err: ErrorCode) -> bool {
        let mut guard = self.inner.lock().unwrap();
        if guard.is_none() {
            *guard = Some(err);
            true
        } else {
            false
        }
    }

    pub fn get(&self) -> Option<ErrorCode> {
        self.inner.lock().unwrap().as_ref().map(clone_error_code)
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock().unwrap().is_some()
    }
}

// `ErrorCode` intentionally doesn't derive `Clone` (it carries a formatted
// backtrace on Debug, not on the value itself) so the latch clones the
// small set of fields it needs instead.
fn clone_error_code(err: &ErrorCode) -> ErrorCode {
    match err {
        ErrorCode::InternalError(s) => ErrorCode::InternalError(s.clone()),
        ErrorCode::MemoryLimitExceeded(s) => ErrorCode::MemoryLimitExceeded(s.clone()),
        ErrorCode::QueryCancelled(s) => ErrorCode::QueryCancelled(s.clone()),
        ErrorCode::RecoverableTransient { message, attempts } => ErrorCode::RecoverableTransient {
            message: message.clone(),
            attempts: *attempts,
        },
        ErrorCode::AdmissionDenied(s) => ErrorCode::AdmissionDenied(s.clone()),
        ErrorCode::ResourcePreempted(s) => ErrorCode::ResourcePreempted(s.clone()),
        ErrorCode::TimedOut(s) => ErrorCode::TimedOut(s.clone()),
        ErrorCode::NotAuthorized(s) => ErrorCode::NotAuthorized(s.clone()),
        ErrorCode::ReceiverClosed(s) => ErrorCode::ReceiverClosed(s.clone()),
        ErrorCode::UnknownInstance(s) => ErrorCode::UnknownInstance(s.clone()),
        ErrorCode::BadWireFormat(s) => ErrorCode::BadWireFormat(s.clone()),
        ErrorCode::InvalidConfig(s) => ErrorCode::InvalidConfig(s.clone()),
    }
}
