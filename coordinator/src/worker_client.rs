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

use async_trait::async_trait;
use common_base::FragmentInstanceId;
use common_base::QueryId;
use common_exception::Result;
use common_planners::FragmentInstance;
use common_planners::PlanFragment;

/// The coordinator-to-worker leg of the three RPC services: `prepare`
/// ships a fragment instance's plan to its worker, `exec` starts it
/// running, `cancel` asks it to unwind early. A production
/// implementation dials through a `flight-rpc` `ConnectionPool`; tests
/// use an in-memory double so the coordinator's lifecycle state machine
/// is exercised without a network.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// `instance` carries the placement record `prepare` needs beyond
    /// the fragment's plan tree itself: its scan ranges, destinations,
    /// and `worker_num`.
    async fn prepare(
        &self,
        worker_address: &str,
        query_id: QueryId,
        fragment: &PlanFragment,
        instance: &FragmentInstance,
    ) -> Result<()>;

    async fn exec(&self, worker_address: &str, instance_id: FragmentInstanceId) -> Result<()>;

    async fn cancel(&self, worker_address: &str, instance_id: FragmentInstanceId) -> Result<()>;
}
