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

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use common_base::QueryId;
use common_datavalues::DataSchemaRef;
use common_datablocks::RowBatch;
use common_exception::ErrorCode;
use common_exception::Result;
use common_flight_rpc::exec::client_to_coordinator_server::ClientToCoordinator;
use common_flight_rpc::exec::CancelQueryRequest;
use common_flight_rpc::exec::CancelQueryResponse;
use common_flight_rpc::exec::CloseRequest;
use common_flight_rpc::exec::CloseResponse;
use common_flight_rpc::exec::FetchRequest;
use common_flight_rpc::exec::FetchResponse;
use common_flight_rpc::exec::OpenSessionRequest;
use common_flight_rpc::exec::OpenSessionResponse;
use common_flight_rpc::exec::SubmitRequest;
use common_flight_rpc::exec::SubmitResponse;
use common_flight_rpc::exec::WaitRequest;
use common_flight_rpc::exec::WaitResponse;
use common_flight_rpc::query_id_from_proto;
use common_flight_rpc::query_id_to_proto;
use common_flight_rpc::status_to_proto;
use common_flight_rpc::ConnectionPool;
use common_memory::MemoryTracker;
use common_memory::MemoryTrackerRef;
use common_planners::PlanFragment;
use coordinator::Coordinator;
use coordinator::QueryExecState;
use scheduler::Scheduler;
use scheduler::WorkerNode;
use tonic::Request;
use tonic::Response;
use tonic::Status;

use crate::rpc::query_registry::QueryEntry;
use crate::rpc::query_registry::QueryRegistry;
use crate::rpc::result_registry::ResultChannelRegistry;
use crate::rpc::worker_client::RpcWorkerClient;

/// The `ClientToCoordinator` server: the one entry point a session
/// layer (SQL parsing, catalog resolution, and the SQL-session
/// protocol itself are all an external collaborator — this only ever
/// sees an already-planned `Vec<PlanFragment>`) uses to run a query to
/// completion and drain its rows. `OpenSession` is deliberately thin:
/// no auth, no per-session settings negotiation, just an opaque handle
/// Submit can be called against.
pub struct ClientService {
    worker_address: String,
    memory_tracker_root: MemoryTrackerRef,
    scheduler: Arc<Scheduler>,
    connection_pool: Arc<ConnectionPool>,
    result_registry: Arc<ResultChannelRegistry>,
    queries: Arc<QueryRegistry>,
    sessions: Mutex<HashMap<u128, String>>,
    report_to_address: String,
    mem_limit_bytes: i64,
    idle_query_timeout: Duration,
    status_poll_interval: Duration,
    arena_cap_bytes: usize,
}

impl ClientService {
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        worker_address: String,
        memory_tracker_root: MemoryTrackerRef,
        scheduler: Arc<Scheduler>,
        connection_pool: Arc<ConnectionPool>,
        result_registry: Arc<ResultChannelRegistry>,
        queries: Arc<QueryRegistry>,
        report_to_address: String,
        mem_limit_bytes: i64,
        idle_query_timeout: Duration,
        status_poll_interval: Duration,
        arena_cap_bytes: usize,
    ) -> Self {
        ClientService {
            worker_address,
            memory_tracker_root,
            scheduler,
            connection_pool,
            result_registry,
            queries,
            sessions: Mutex::new(HashMap::new()),
            report_to_address,
            mem_limit_bytes,
            idle_query_timeout,
            status_poll_interval,
            arena_cap_bytes,
        }
    }

    /// Every deployment here is a single coordinator/worker process
    /// acting as its own entire membership; real multi-node placement
    /// is handed a snapshot from the cluster membership subscription,
    /// an external collaborator this crate never implements.
    fn solo_membership(&self) -> WorkerNode {
        WorkerNode::new(self.worker_address.clone(), self.worker_address.clone())
    }

    async fn do_submit(&self, plan_fragments: Vec<PlanFragment>) -> Result<QueryId> {
        let result_schema = plan_fragments
            .last()
            .map(|f| f.root.output_schema.clone())
            .ok_or_else(|| ErrorCode::InvalidConfig("submit with no plan fragments".to_string()))?;

        let query_id = QueryId::generate();
        let rows = self.result_registry.register(query_id);

        let outcome = self.do_schedule(query_id, plan_fragments).await;
        let coordinator = match outcome {
            Ok(coordinator) => coordinator,
            Err(err) => {
                self.result_registry.remove(query_id);
                return Err(err);
            }
        };

        let exec_state = QueryExecState::create(query_id, rows, self.idle_query_timeout);
        exec_state.mark_running();

        self.queries.insert(
            query_id,
            Arc::new(QueryEntry {
                coordinator: coordinator.clone(),
                exec_state: exec_state.clone(),
                result_schema,
            }),
        );

        let poll_interval = self.status_poll_interval;
        tokio::spawn(async move {
            match coordinator.complete(poll_interval).await {
                Ok(()) => exec_state.mark_finished(),
                Err(err) => exec_state.mark_failed(err),
            }
        });

        Ok(query_id)
    }

    async fn do_schedule(&self, query_id: QueryId, plan_fragments: Vec<PlanFragment>) -> Result<Arc<Coordinator<RpcWorkerClient>>> {
        let worker_client = Arc::new(RpcWorkerClient::create(
            self.connection_pool.clone(),
            self.report_to_address.clone(),
            self.mem_limit_bytes,
        ));
        let limit = if self.mem_limit_bytes > 0 { Some(self.mem_limit_bytes) } else { None };
        let tracker = MemoryTracker::create_child(&self.memory_tracker_root, format!("query-{}", query_id), limit);

        let mut coordinator = Coordinator::create(query_id, worker_client, self.scheduler.clone(), tracker);
        let membership = vec![self.solo_membership()];
        coordinator.schedule(plan_fragments, &membership, &membership[0]).await?;
        coordinator.prepare_and_exec().await?;
        Ok(Arc::new(coordinator))
    }

    fn entry(&self, query_id: QueryId) -> std::result::Result<Arc<QueryEntry>, Status> {
        self.queries
            .get(query_id)
            .ok_or_else(|| Status::not_found(format!("no such query {}", query_id)))
    }
}

/// Concatenates rows from `batches` into one batch against `schema`,
/// since the wire format carries at most one serialized `RowBatch` per
/// `Fetch` call, while `QueryExecState::fetch_rows` hands back however
/// many arrived since the last poll.
fn merge_batches(schema: DataSchemaRef, batches: &[RowBatch], arena_cap_bytes: usize) -> RowBatch {
    let total_rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    let mut merged = RowBatch::new(schema.clone(), total_rows.max(1), arena_cap_bytes);
    for batch in batches {
        for row in 0..batch.num_rows() {
            let slot = merged.allocate_tuple().expect("merged batch sized to hold every source row");
            for col in 0..schema.num_columns() {
                let value = batch.get_value(row, col);
                merged.set_column(slot, col, &value).expect("merged arena sized generously from source caps");
            }
        }
    }
    merged
}

#[tonic::async_trait]
impl ClientToCoordinator for ClientService {
    async fn open_session(
        &self,
        request: Request<OpenSessionRequest>,
    ) -> std::result::Result<Response<OpenSessionResponse>, Status> {
        let user = request.into_inner().user;
        let session_id = QueryId::generate();
        self.sessions.lock().unwrap().insert(session_id.as_u128(), user);
        Ok(Response::new(OpenSessionResponse {
            session_id: Some(query_id_to_proto(session_id)),
        }))
    }

    async fn submit(&self, request: Request<SubmitRequest>) -> std::result::Result<Response<SubmitResponse>, Status> {
        let req = request.into_inner();
        let session_id = query_id_from_proto(
            req.session_id.as_ref().ok_or_else(|| Status::invalid_argument("missing session_id"))?,
        )
        .map_err(|e| Status::invalid_argument(e.to_string()))?;
        if !self.sessions.lock().unwrap().contains_key(&session_id.as_u128()) {
            return Err(Status::unauthenticated("unknown or expired session"));
        }

        let result = (|| async {
            let plan_fragments: Vec<PlanFragment> = serde_json::from_slice(&req.plan_fragments_json)
                .map_err(|e| ErrorCode::BadWireFormat(format!("malformed plan fragments: {}", e)))?;
            self.do_submit(plan_fragments).await
        })()
        .await;

        let (query_id, status) = match result {
            Ok(query_id) => (query_id, status_to_proto(&Ok(()))),
            Err(err) => (QueryId::generate(), status_to_proto(&Err(err))),
        };
        Ok(Response::new(SubmitResponse {
            query_id: Some(query_id_to_proto(query_id)),
            status: Some(status),
        }))
    }

    async fn wait(&self, request: Request<WaitRequest>) -> std::result::Result<Response<WaitResponse>, Status> {
        let req = request.into_inner();
        let query_id = query_id_from_proto(
            req.query_id.as_ref().ok_or_else(|| Status::invalid_argument("missing query_id"))?,
        )
        .map_err(|e| Status::invalid_argument(e.to_string()))?;
        let entry = self.entry(query_id)?;

        let result = entry.exec_state.wait(Duration::from_millis(req.timeout_ms)).await;
        let done = !matches!(result, Err(ErrorCode::TimedOut(_)));
        Ok(Response::new(WaitResponse {
            done,
            status: Some(status_to_proto(&result)),
        }))
    }

    async fn fetch(&self, request: Request<FetchRequest>) -> std::result::Result<Response<FetchResponse>, Status> {
        let req = request.into_inner();
        let query_id = query_id_from_proto(
            req.query_id.as_ref().ok_or_else(|| Status::invalid_argument("missing query_id"))?,
        )
        .map_err(|e| Status::invalid_argument(e.to_string()))?;
        let entry = self.entry(query_id)?;

        let result = entry.exec_state.fetch_rows(req.max_rows.max(1) as usize).await;
        let (row_batch, eos, status) = match result {
            Ok(batches) if batches.is_empty() => (Vec::new(), true, status_to_proto(&Ok(()))),
            Ok(batches) => {
                let merged = merge_batches(entry.result_schema.clone(), &batches, self.arena_cap_bytes);
                (merged.to_wire(), false, status_to_proto(&Ok(())))
            }
            Err(err) => (Vec::new(), true, status_to_proto(&Err(err))),
        };

        Ok(Response::new(FetchResponse { row_batch, eos, status: Some(status) }))
    }

    async fn close(&self, request: Request<CloseRequest>) -> std::result::Result<Response<CloseResponse>, Status> {
        let req = request.into_inner();
        let query_id = query_id_from_proto(
            req.query_id.as_ref().ok_or_else(|| Status::invalid_argument("missing query_id"))?,
        )
        .map_err(|e| Status::invalid_argument(e.to_string()))?;
        if let Some(entry) = self.queries.get(query_id) {
            entry.exec_state.close();
        }
        self.queries.remove(query_id);
        self.result_registry.remove(query_id);
        Ok(Response::new(CloseResponse {}))
    }

    async fn cancel_query(
        &self,
        request: Request<CancelQueryRequest>,
    ) -> std::result::Result<Response<CancelQueryResponse>, Status> {
        let req = request.into_inner();
        let query_id = query_id_from_proto(
            req.query_id.as_ref().ok_or_else(|| Status::invalid_argument("missing query_id"))?,
        )
        .map_err(|e| Status::invalid_argument(e.to_string()))?;
        let entry = self.entry(query_id)?;
        entry.coordinator.cancel_all().await;
        entry.exec_state.mark_cancelled();
        Ok(Response::new(CancelQueryResponse {}))
    }
}
