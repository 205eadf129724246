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

use crate::expr::Expr;
use crate::node::PlanNode;

pub type FragmentId = u32;

/// How a fragment's output (or input) is spread across instances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PartitionScheme {
    Unpartitioned,
    Hashed(Vec<Expr>),
    Broadcast,
    Random,
}

/// The sink a fragment's root writes its output batches to. Unlike
/// `FragmentInstance::destinations`, this carries no addresses — those
/// are filled in by the scheduler once instances are placed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DataSink {
    Broadcast,
    HashPartitioned(Vec<Expr>),
    Unpartitioned,
    Result,
}

/// A subtree of the logical plan that executes as a unit on a worker.
/// The root of every non-leaf fragment is an exchange-receive node; the
/// scheduler is the thing that turns `PlanFragment` + the membership
/// list into concrete `FragmentInstance`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFragment {
    pub fragment_id: FragmentId,
    pub root: PlanNode,
    pub sink: Option<DataSink>,
    pub input_partition: PartitionScheme,
    pub output_partition: PartitionScheme,
    /// Force every scan range in this fragment onto the coordinator's
    /// own backend (used for small broadcast-join build sides and
    /// catalog-adjacent reads the planner pins to the coordinator).
    pub exec_at_coord: bool,
}

impl PlanFragment {
    /// True if this fragment has no input fragments feeding it, i.e. its
    /// root's subtree bottoms out in scans rather than an
    /// exchange-receive.
    pub fn is_leaf(&self) -> bool {
        !self
            .root
            .flatten()
            .iter()
            .any(|n| matches!(n.kind, crate::node::PlanNodeKind::ExchangeReceive { .. }))
    }

    pub fn serialisable_nodes(&self) -> Vec<&PlanNode> {
        self.root.flatten()
    }
}
