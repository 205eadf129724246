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

use common_base::FragmentInstanceId;
use serde::Deserialize;
use serde::Serialize;

use crate::fragment::FragmentId;
use crate::scan_range::ScanRange;

/// One sender this instance's sink transmits to: a node id (the
/// `sender_index` the receiving side uses to key its per-sender FIFO),
/// the destination instance id, and the address to dial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationInstance {
    pub instance_id: FragmentInstanceId,
    pub address: String,
    pub node_id: u32,
}

/// One runtime instantiation of a fragment on a specific worker. This
/// is what the scheduler hands the coordinator, and what the
/// coordinator's `prepare` RPC ships to the owning worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentInstance {
    pub instance_id: FragmentInstanceId,
    pub fragment_id: FragmentId,
    pub worker_address: String,
    /// Deterministic index of this instance among its fragment's
    /// instances, used for partition-to-worker mapping (hash bucket i
    /// goes to the instance whose `worker_num == i % n`).
    pub worker_num: u32,
    pub scan_ranges: Vec<ScanRange>,
    pub destinations: Vec<DestinationInstance>,
}
