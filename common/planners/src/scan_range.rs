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

/// The unit of work assigned to a scan-bearing fragment instance.
/// `replicas` are the hostnames known to hold a copy of this range,
/// used by the scheduler to prefer a local assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRange {
    pub file: String,
    pub offset: u64,
    pub length: u64,
    pub replicas: Vec<String>,
}

impl ScanRange {
    pub fn new(file: impl Into<String>, offset: u64, length: u64, replicas: Vec<String>) -> Self {
        Self {
            file: file.into(),
            offset,
            length,
            replicas,
        }
    }
}
