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

use std::sync::Arc;

use common_exception::ErrorCode;
use common_exception::Result;
use common_planners::FragmentInstance;
use common_planners::PlanFragment;

use crate::placement::place_fragment;
use crate::reservation::ReservationBroker;
use crate::worker::WorkerNode;

/// Turns one `PlanFragment` into its concrete `FragmentInstance`s
/// against a given membership snapshot. A `Scheduler` is cheap to
/// construct and holds no membership state of its own — every call
/// receives its own snapshot, which is what lets the round robin
/// inside scan-range assignment reset on every run rather than drift
/// across schedule calls made minutes apart against a changing
/// cluster.
pub struct Scheduler {
    broker: Arc<dyn ReservationBroker>,
    reserve_bytes_per_instance: i64,
}

impl Scheduler {
    pub fn create(broker: Arc<dyn ReservationBroker>, reserve_bytes_per_instance: i64) -> Self {
        Scheduler {
            broker,
            reserve_bytes_per_instance,
        }
    }

    /// Places instances for `fragment`, reserving `reserve_bytes_per_instance`
    /// on each instance's worker through the broker before it is handed
    /// back to the caller. A reservation denial on any worker fails the
    /// whole call; reservations already granted for earlier instances in
    /// this same call are released before returning the error, so a
    /// partially admitted fragment never leaks a hold.
    pub async fn schedule_fragment(
        &self,
        fragment: &PlanFragment,
        membership: &[WorkerNode],
        coordinator: &WorkerNode,
    ) -> Result<Vec<FragmentInstance>> {
        if membership.is_empty() {
            return Err(ErrorCode::InternalError(
                "cannot schedule against an empty worker membership".to_string(),
            ));
        }

        let instances = place_fragment(fragment, membership, coordinator)?;

        let mut admitted_workers: Vec<WorkerNode> = Vec::new();
        for instance in &instances {
            let worker = WorkerNode::new(instance.worker_address.clone(), instance.worker_address.clone());
            match self.broker.reserve(&worker, self.reserve_bytes_per_instance).await {
                Ok(true) => admitted_workers.push(worker),
                Ok(false) => {
                    self.release_all(&admitted_workers).await;
                    return Err(ErrorCode::AdmissionDenied(format!(
                        "worker {} refused admission for fragment {}",
                        instance.worker_address, fragment.fragment_id
                    )));
                }
                Err(err) => {
                    self.release_all(&admitted_workers).await;
                    return Err(err);
                }
            }
        }

        Ok(instances)
    }

    async fn release_all(&self, workers: &[WorkerNode]) {
        for worker in workers {
            if let Err(err) = self.broker.release(worker, self.reserve_bytes_per_instance).await {
                tracing::warn!(%err, worker = %worker.address, "failed to release reservation after a partially admitted schedule call");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use async_trait::async_trait;
    use common_datavalues::DataSchema;
    use common_planners::DataSink;
    use common_planners::PartitionScheme;
    use common_planners::PlanNode;
    use common_planners::PlanNodeKind;
    use common_planners::ScanRange;

    use super::*;
    use crate::reservation::NoopReservationBroker;

    fn workers(n: usize) -> Vec<WorkerNode> {
        (0..n)
            .map(|i| WorkerNode::new(format!("10.0.0.{}:9090", i), format!("host-{}", i)))
            .collect()
    }

    fn scan_fragment(ranges: Vec<ScanRange>) -> PlanFragment {
        PlanFragment {
            fragment_id: 1,
            root: PlanNode {
                id: 1,
                kind: PlanNodeKind::Scan { ranges, exec_at_coord: false },
                children: vec![],
                conjuncts: vec![],
                output_schema: Arc::new(DataSchema::new(vec![])),
            },
            sink: Some(DataSink::Result),
            input_partition: PartitionScheme::Unpartitioned,
            output_partition: PartitionScheme::Unpartitioned,
            exec_at_coord: false,
        }
    }

    #[tokio::test]
    async fn schedules_a_scan_fragment_with_the_noop_broker() {
        let scheduler = Scheduler::create(Arc::new(NoopReservationBroker), 1 << 20);
        let workers = workers(2);
        let ranges = vec![ScanRange::new("f1", 0, 10, vec!["host-0".to_string()])];
        let fragment = scan_fragment(ranges);
        let instances = scheduler
            .schedule_fragment(&fragment, &workers, &workers[0])
            .await
            .unwrap();
        assert_eq!(instances.len(), 1);
    }

    struct DenyingBroker {
        reserved: AtomicUsize,
        released: AtomicUsize,
    }

    #[async_trait]
    impl ReservationBroker for DenyingBroker {
        async fn reserve(&self, _worker: &WorkerNode, _estimated_bytes: i64) -> Result<bool> {
            self.reserved.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }

        async fn release(&self, _worker: &WorkerNode, _estimated_bytes: i64) -> Result<()> {
            self.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn admission_denial_surfaces_as_an_error() {
        let broker = Arc::new(DenyingBroker {
            reserved: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::create(broker, 1 << 20);
        let workers = workers(1);
        let ranges = vec![ScanRange::new("f1", 0, 10, vec!["host-0".to_string()])];
        let fragment = scan_fragment(ranges);
        let result = scheduler.schedule_fragment(&fragment, &workers, &workers[0]).await;
        assert!(matches!(result, Err(ErrorCode::AdmissionDenied(_))));
    }

    #[tokio::test]
    async fn scheduling_against_empty_membership_is_rejected_before_placement() {
        let scheduler = Scheduler::create(Arc::new(NoopReservationBroker), 1 << 20);
        let fragment = scan_fragment(vec![]);
        let coordinator = WorkerNode::new("coord:9090", "coord-host");
        let result = scheduler.schedule_fragment(&fragment, &[], &coordinator).await;
        assert!(result.is_err());
    }
}
