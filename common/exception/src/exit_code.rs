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

use serde::Deserialize;
use serde::Serialize;

/// The status codes the coordinator surfaces to the client-facing CLI
/// layer (out of scope here, but this is the fixed vocabulary it consumes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitCode {
    Ok,
    Cancelled,
    MemLimitExceeded,
    InternalError,
    TimedOut,
    NotAuthorized,
}

impl Default for ExitCode {
    fn default() -> Self {
        ExitCode::Ok
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitCode::Ok => "ok",
            ExitCode::Cancelled => "cancelled",
            ExitCode::MemLimitExceeded => "mem_limit_exceeded",
            ExitCode::InternalError => "internal_error",
            ExitCode::TimedOut => "timed_out",
            ExitCode::NotAuthorized => "not_authorized",
        };
        write!(f, "{}", s)
    }
}
