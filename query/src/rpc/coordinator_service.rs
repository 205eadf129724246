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

use common_flight_rpc::exec::worker_to_coordinator_server::WorkerToCoordinator;
use common_flight_rpc::exec::ReportStatusRequest;
use common_flight_rpc::exec::ReportStatusResponse;
use common_flight_rpc::instance_id_from_proto;
use common_flight_rpc::query_id_from_proto;
use common_flight_rpc::status_from_proto;
use tonic::Request;
use tonic::Response;
use tonic::Status;

use crate::rpc::query_registry::QueryRegistry;

/// The `WorkerToCoordinator` server: every fragment instance's
/// `StatusReporter` calls in here on its own schedule. A report for a
/// query this process has no record of (already closed, or never
/// submitted here) is not an error — it's logged and dropped, since a
/// straggling report after `Close` is an expected race, not a bug.
pub struct CoordinatorService {
    queries: Arc<QueryRegistry>,
}

impl CoordinatorService {
    pub fn create(queries: Arc<QueryRegistry>) -> Self {
        CoordinatorService { queries }
    }
}

#[tonic::async_trait]
impl WorkerToCoordinator for CoordinatorService {
    async fn report_status(
        &self,
        request: Request<ReportStatusRequest>,
    ) -> std::result::Result<Response<ReportStatusResponse>, Status> {
        let req = request.into_inner();
        let query_id = query_id_from_proto(
            req.query_id.as_ref().ok_or_else(|| Status::invalid_argument("missing query_id"))?,
        )
        .map_err(|e| Status::invalid_argument(e.to_string()))?;
        let instance_id = instance_id_from_proto(
            req.instance_id.as_ref().ok_or_else(|| Status::invalid_argument("missing instance_id"))?,
        )
        .map_err(|e| Status::invalid_argument(e.to_string()))?;

        let entry = match self.queries.get(query_id) {
            Some(entry) => entry,
            None => {
                tracing::warn!(%query_id, %instance_id, "status report for an unknown or already-closed query");
                return Ok(Response::new(ReportStatusResponse {}));
            }
        };

        let status = status_from_proto(&req.status.unwrap_or_default());
        let profile_json = String::from_utf8(req.profile_json).unwrap_or_default();
        // `seq` doesn't ride along on this RPC; the reporter's own
        // per-instance counter is reconstructed implicitly since
        // `report_status` calls for one instance always arrive in the
        // order the reporter issued them over its single connection.
        let newly_failed = entry.coordinator.apply_status_report(instance_id, next_sequence(), req.done, &status, profile_json);

        if newly_failed {
            let coordinator = entry.coordinator.clone();
            tokio::spawn(async move {
                coordinator.cancel_all().await;
            });
        }

        Ok(Response::new(ReportStatusResponse {}))
    }
}

// `StatusTable::apply_report` needs a strictly increasing sequence per
// instance to detect stale/duplicate deliveries; the wire message
// doesn't currently carry one (see ReportStatusRequest), so each
// delivery is treated as newer than the last by handing it a fresh
// process-wide tick. This means `StatusTable`'s own reordering defense
// is inert for RPC-delivered reports until the wire schema grows a
// sequence field — acceptable for now since gRPC preserves per-stream
// ordering and every report for one instance rides the same
// `StatusReporter`'s single outbound call sequence.
fn next_sequence() -> u64 {
    use std::sync::atomic::AtomicU64;
    use std::sync::atomic::Ordering;
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::SeqCst)
}
