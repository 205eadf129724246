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

use common_exception::ErrorCode;
use common_exception::ExitCode;

use crate::exec::TStatus;
use crate::exec::TStatusCode;

/// Converts the result of an RPC handler into the wire status message,
/// collapsing the full `ErrorCode` taxonomy down to the six
/// caller-facing status codes.
pub fn status_to_proto(result: &Result<(), ErrorCode>) -> TStatus {
    match result {
        Ok(()) => TStatus {
            code: TStatusCode::Ok as i32,
            message: String::new(),
        },
        Err(err) => TStatus {
            code: exit_code_to_proto(err.exit_code()) as i32,
            message: err.to_string(),
        },
    }
}

/// Reconstructs an `ErrorCode` from a received `TStatus`. Lossy by
/// construction (the original variant's extra fields don't survive the
/// six-code wire taxonomy) but sufficient for a caller that only needs
/// to branch on status class and surface the message.
pub fn status_from_proto(status: &TStatus) -> Result<(), ErrorCode> {
    match TStatusCode::from_i32(status.code) {
        Some(TStatusCode::Ok) => Ok(()),
        Some(TStatusCode::Cancelled) => Err(ErrorCode::QueryCancelled(status.message.clone())),
        Some(TStatusCode::MemLimitExceeded) => Err(ErrorCode::MemoryLimitExceeded(status.message.clone())),
        Some(TStatusCode::TimedOut) => Err(ErrorCode::TimedOut(status.message.clone())),
        Some(TStatusCode::NotAuthorized) => Err(ErrorCode::NotAuthorized(status.message.clone())),
        _ => Err(ErrorCode::InternalError(status.message.clone())),
    }
}

fn exit_code_to_proto(code: ExitCode) -> TStatusCode {
    match code {
        ExitCode::Ok => TStatusCode::Ok,
        ExitCode::Cancelled => TStatusCode::Cancelled,
        ExitCode::MemLimitExceeded => TStatusCode::MemLimitExceeded,
        ExitCode::InternalError => TStatusCode::InternalError,
        ExitCode::TimedOut => TStatusCode::TimedOut,
        ExitCode::NotAuthorized => TStatusCode::NotAuthorized,
    }
}
