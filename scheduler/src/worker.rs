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

/// One live member of the cluster, as the coordinator's membership
/// subscription (an external collaborator) reports it at the moment a
/// `schedule` call starts. Neither the scheduler nor the coordinator
/// holds this across calls — every `schedule_fragment` is handed a
/// fresh snapshot, which is what gives the scheduler's round robin its
/// per-run freezing behaviour without any lock on cluster membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerNode {
    pub address: String,
    pub hostname: String,
}

impl WorkerNode {
    pub fn new(address: impl Into<String>, hostname: impl Into<String>) -> Self {
        WorkerNode {
            address: address.into(),
            hostname: hostname.into(),
        }
    }
}
