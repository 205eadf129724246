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

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common_base::FragmentInstanceId;
use common_base::QueryId;
use common_exception::ErrorCode;
use common_exception::Result;
use common_memory::MemoryTrackerRef;
use common_planners::FragmentInstance;
use common_planners::PlanFragment;
use common_profile::ProfileNode;
use common_profile::ProfileSnapshot;
use scheduler::Scheduler;
use scheduler::WorkerNode;

use crate::status_table::StatusTable;
use crate::worker_client::WorkerClient;

/// The coordinator's view of one fragment it has placed: the
/// `PlanFragment` it came from and the concrete instances the scheduler
/// assigned it to.
struct ScheduledFragment {
    fragment: PlanFragment,
    instances: Vec<FragmentInstance>,
}

/// Orchestrates one query end to end: schedule every fragment, prepare
/// and exec every instance on its worker, collect status until every
/// instance reports done, and cancel the rest of the query the moment
/// any instance reports a failure. A `Coordinator` is one-shot — it is
/// constructed per query and discarded once `complete` (or `cancel`)
/// returns.
pub struct Coordinator<W: WorkerClient> {
    query_id: QueryId,
    worker_client: Arc<W>,
    scheduler: Arc<Scheduler>,
    memory_tracker: MemoryTrackerRef,
    profile: ProfileNode,
    status: Arc<StatusTable>,
    cancelled: AtomicBool,
    fragments: Vec<ScheduledFragment>,
}

impl<W: WorkerClient> Coordinator<W> {
    pub fn create(
        query_id: QueryId,
        worker_client: Arc<W>,
        scheduler: Arc<Scheduler>,
        memory_tracker: MemoryTrackerRef,
    ) -> Self {
        Coordinator {
            query_id,
            worker_client,
            scheduler,
            memory_tracker,
            profile: ProfileNode::create("query"),
            status: Arc::new(StatusTable::create()),
            cancelled: AtomicBool::new(false),
            fragments: Vec::new(),
        }
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub fn memory_tracker(&self) -> &MemoryTrackerRef {
        &self.memory_tracker
    }

    pub fn profile(&self) -> &ProfileNode {
        &self.profile
    }

    pub fn status_table(&self) -> &Arc<StatusTable> {
        &self.status
    }

    /// Schedules every fragment against the given membership snapshot.
    /// Called once, before `prepare_and_exec`; fragments are scheduled
    /// in the order given, root fragment last, matching the planner's
    /// leaves-first fragment list.
    pub async fn schedule(
        &mut self,
        plan_fragments: Vec<PlanFragment>,
        membership: &[WorkerNode],
        coordinator_worker: &WorkerNode,
    ) -> Result<()> {
        for fragment in plan_fragments {
            let instances = self
                .scheduler
                .schedule_fragment(&fragment, membership, coordinator_worker)
                .await?;
            self.fragments.push(ScheduledFragment { fragment, instances });
        }
        Ok(())
    }

    pub fn total_instances(&self) -> usize {
        self.fragments.iter().map(|f| f.instances.len()).sum()
    }

    /// Ships every instance to its worker and starts it running. A
    /// `prepare` or `exec` failure on any one instance fails the whole
    /// query immediately — the instances already started are cancelled
    /// before the error propagates.
    pub async fn prepare_and_exec(&self) -> Result<()> {
        for scheduled in &self.fragments {
            for instance in &scheduled.instances {
                if let Err(err) = self
                    .worker_client
                    .prepare(&instance.worker_address, self.query_id, &scheduled.fragment, instance)
                    .await
                {
                    self.cancel_all().await;
                    return Err(err);
                }
                if let Err(err) = self.worker_client.exec(&instance.worker_address, instance.instance_id).await {
                    self.cancel_all().await;
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Applies one `report_status` delivery from a worker. Returns
    /// whether the query should now be cancelled (a failure was just
    /// observed for the first time), leaving the actual cancel RPCs to
    /// the caller's subsequent `cancel` call so the report handler
    /// itself stays non-blocking.
    ///
    /// An applied (non-stale) report has its profile folded into the
    /// query-wide aggregate as a child of `self.profile` keyed by the
    /// reporting instance's own profile root name, so repeated reports
    /// from the same instance merge rather than append.
    pub fn apply_status_report(
        &self,
        instance_id: FragmentInstanceId,
        sequence: u64,
        done: bool,
        status: &Result<()>,
        profile_json: String,
    ) -> bool {
        let applied = self.status.apply_report(instance_id, sequence, done, status, profile_json.clone());
        if applied {
            match serde_json::from_str::<ProfileSnapshot>(&profile_json) {
                Ok(snapshot) => self.profile.merge_child_snapshot(&snapshot),
                Err(err) => tracing::warn!(%err, instance = %instance_id, "dropping unparsable profile in status report"),
            }
        }
        applied && status.is_err()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// First-error-wins: cancels every instance of every fragment. Safe
    /// to call more than once; only the first call actually issues the
    /// cancel RPCs.
    pub async fn cancel_all(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        for scheduled in &self.fragments {
            for instance in &scheduled.instances {
                if let Err(err) = self.worker_client.cancel(&instance.worker_address, instance.instance_id).await {
                    tracing::warn!(%err, instance = %instance.instance_id, "cancel RPC failed during query teardown");
                }
            }
        }
    }

    /// True once every scheduled instance has reported done, or the
    /// query has already been cancelled.
    pub fn is_complete(&self) -> bool {
        self.is_cancelled() || self.status.all_done(self.total_instances())
    }

    /// Waits (by polling the status table, matching the per-instance
    /// status-report cadence rather than a push notification) until the
    /// query reaches a terminal state or a failure is observed, then
    /// cancels the rest of the query if a failure occurred. Returns the
    /// first error seen, if any.
    pub async fn complete(&self, poll_interval: std::time::Duration) -> Result<()> {
        loop {
            if self.status.has_failure() {
                self.cancel_all().await;
                return Err(self
                    .status
                    .first_error()
                    .unwrap_or_else(|| ErrorCode::InternalError("instance reported failure with no status".to_string())));
            }
            if self.is_complete() {
                return Ok(());
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
