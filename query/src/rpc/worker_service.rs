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
use std::time::Duration;

use common_base::FragmentInstanceId;
use common_base::QueryId;
use common_base::Stoppable;
use common_exception::ErrorCode;
use common_exception::Result;
use common_exchange::DataStreamManager;
use common_exchange::ExchangeTransport;
use common_exchange::LocalTransport;
use common_exchange::ReceiverKey;
use common_flight_rpc::exec::coordinator_to_worker_server::CoordinatorToWorker;
use common_flight_rpc::exec::worker_to_coordinator_client::WorkerToCoordinatorClient;
use common_flight_rpc::exec::CancelRequest;
use common_flight_rpc::exec::CancelResponse;
use common_flight_rpc::exec::ExecRequest;
use common_flight_rpc::exec::ExecResponse;
use common_flight_rpc::exec::PrepareRequest;
use common_flight_rpc::exec::PrepareResponse;
use common_flight_rpc::exec::ReportStatusRequest;
use common_flight_rpc::exec::TransmitBatchRequest;
use common_flight_rpc::exec::TransmitBatchResponse;
use common_flight_rpc::exec::TransmitEosRequest;
use common_flight_rpc::exec::TransmitEosResponse;
use common_flight_rpc::exec::TTransmitAck;
use common_flight_rpc::instance_id_from_proto;
use common_flight_rpc::instance_id_to_proto;
use common_flight_rpc::query_id_from_proto;
use common_flight_rpc::query_id_to_proto;
use common_flight_rpc::status_to_proto;
use common_flight_rpc::ConnectionPool;
use common_memory::MemoryTracker;
use common_memory::MemoryTrackerRef;
use common_planners::DataSink;
use common_planners::PlanNode;
use common_planners::PlanNodeKind;
use common_profile::ProfileNode;
use execution::build_operator_tree;
use execution::BroadcastSink;
use execution::FactoryContext;
use execution::FragmentExecutor;
use execution::HashPartitionedSink;
use execution::ReportState;
use execution::ResultSink;
use execution::Sink;
use execution::StatusReporter;
use execution::StatusReportSink;
use execution::UnpartitionedSink;
use tonic::Request;
use tonic::Response;
use tonic::Status;

use crate::rpc::fragment_payload::FragmentInstancePayload;
use crate::rpc::result_registry::ResultChannelRegistry;
use crate::rpc::scan_source::EmptyScanSourceProvider;
use crate::rpc::transport::RpcExchangeTransport;

/// One instance this worker is currently preparing, running, or has
/// finished running. `prepare` registers the entry; `exec` spawns the
/// task that drives it and, once it finishes, removes the entry;
/// `cancel` looks the entry up and flips its cancellation flag without
/// otherwise touching it.
struct LiveInstance {
    executor: Arc<FragmentExecutor>,
    report_state: Arc<ReportState>,
    query_id: QueryId,
    report_to_address: String,
}

/// Reports an instance's status to the coordinator address recorded in
/// its `FragmentInstancePayload` by dialing `WorkerToCoordinator`
/// through the shared connection pool.
struct RpcStatusReportSink {
    pool: Arc<ConnectionPool>,
    query_id: QueryId,
    report_to_address: String,
}

#[async_trait::async_trait]
impl StatusReportSink for RpcStatusReportSink {
    async fn report(
        &self,
        instance_id: FragmentInstanceId,
        _sequence: u64,
        done: bool,
        status: &Result<()>,
        profile_json: &str,
    ) -> Result<()> {
        let channel = self.pool.get_or_connect(&self.report_to_address).await?;
        let mut client = WorkerToCoordinatorClient::new(channel);
        let request = ReportStatusRequest {
            query_id: Some(query_id_to_proto(self.query_id)),
            instance_id: Some(instance_id_to_proto(instance_id)),
            done,
            status: Some(status_to_proto(status)),
            profile_json: profile_json.as_bytes().to_vec(),
        };
        client
            .report_status(request)
            .await
            .map_err(|status| ErrorCode::RecoverableTransient {
                message: format!("report_status to {} failed: {}", self.report_to_address, status),
                attempts: 1,
            })?;
        Ok(())
    }
}

/// The `CoordinatorToWorker` server: receives `Prepare`/`Exec`/`Cancel`
/// for fragment instances placed on this worker, and receives
/// `TransmitBatch`/`TransmitEos` for batches addressed to one of this
/// worker's exchange receivers (whether sent by the coordinator's own
/// process or by a peer worker — the wire schema doesn't distinguish).
pub struct WorkerService {
    worker_address: String,
    memory_tracker_root: MemoryTrackerRef,
    exchange_manager: Arc<DataStreamManager>,
    result_registry: Arc<ResultChannelRegistry>,
    connection_pool: Arc<ConnectionPool>,
    batch_size: usize,
    arena_cap_bytes: usize,
    exchange_receive_buffer_bytes: usize,
    recv_timeout: Duration,
    status_report_period: Duration,
    instances: tokio::sync::Mutex<HashMap<FragmentInstanceId, LiveInstance>>,
}

impl WorkerService {
    pub fn create(
        worker_address: String,
        memory_tracker_root: MemoryTrackerRef,
        exchange_manager: Arc<DataStreamManager>,
        result_registry: Arc<ResultChannelRegistry>,
        connection_pool: Arc<ConnectionPool>,
        batch_size: usize,
        arena_cap_bytes: usize,
        exchange_receive_buffer_bytes: usize,
        recv_timeout: Duration,
        status_report_period: Duration,
    ) -> Self {
        WorkerService {
            worker_address,
            memory_tracker_root,
            exchange_manager,
            result_registry,
            connection_pool,
            batch_size,
            arena_cap_bytes,
            exchange_receive_buffer_bytes,
            recv_timeout,
            status_report_period,
            instances: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Registers an `ExchangeReceiver` for every `ExchangeReceive` node
    /// in the fragment so the operator tree can be built against them;
    /// `input_schemas.len()` is the number of senders feeding that node,
    /// a simplification that assumes exactly one sender per upstream
    /// fragment instance rather than per upstream partition.
    fn register_receivers(
        &self,
        query_id: QueryId,
        instance_id: FragmentInstanceId,
        root: &PlanNode,
    ) -> HashMap<u32, Arc<common_exchange::ExchangeReceiver>> {
        let mut receivers = HashMap::new();
        for node in root.flatten() {
            if let PlanNodeKind::ExchangeReceive { input_schemas } = &node.kind {
                let key = ReceiverKey {
                    query_id,
                    dest_instance_id: instance_id,
                    node_id: node.id,
                };
                let receiver = self.exchange_manager.create_receiver(
                    key,
                    input_schemas.len().max(1),
                    self.exchange_receive_buffer_bytes,
                    ProfileNode::create(format!("ExchangeReceive({})", node.id)),
                );
                receivers.insert(node.id, receiver);
            }
        }
        receivers
    }

    fn transport_for(&self, query_id: QueryId, address: &str, dest_instance_id: FragmentInstanceId, dest_node_id: u32) -> Arc<dyn ExchangeTransport> {
        if address == self.worker_address {
            Arc::new(LocalTransport::new(
                self.exchange_manager.clone(),
                ReceiverKey {
                    query_id,
                    dest_instance_id,
                    node_id: dest_node_id,
                },
            ))
        } else {
            Arc::new(RpcExchangeTransport::new(
                self.connection_pool.clone(),
                address.to_string(),
                query_id,
                dest_instance_id,
                dest_node_id,
            ))
        }
    }

    fn build_sink(&self, payload: &FragmentInstancePayload, query_id: QueryId) -> Result<Box<dyn Sink>> {
        let destinations = &payload.instance.destinations;
        match &payload.fragment.sink {
            None | Some(DataSink::Result) => {
                let sender = self.result_registry.take_sender(query_id).ok_or_else(|| {
                    ErrorCode::InternalError(format!(
                        "no result channel registered for query {} before its root fragment ran",
                        query_id
                    ))
                })?;
                Ok(Box::new(ResultSink::create(sender)))
            }
            Some(DataSink::Broadcast) => {
                let transports = destinations
                    .iter()
                    .map(|d| self.transport_for(query_id, &d.address, d.instance_id, d.node_id))
                    .collect();
                Ok(Box::new(BroadcastSink::create(transports, payload.instance.worker_num)))
            }
            Some(DataSink::Unpartitioned) => {
                let dest = destinations.first().ok_or_else(|| {
                    ErrorCode::InternalError("unpartitioned sink has no destination".to_string())
                })?;
                let transport = self.transport_for(query_id, &dest.address, dest.instance_id, dest.node_id);
                Ok(Box::new(UnpartitionedSink::create(transport, payload.instance.worker_num)))
            }
            Some(DataSink::HashPartitioned(exprs)) => {
                let transports = destinations
                    .iter()
                    .map(|d| self.transport_for(query_id, &d.address, d.instance_id, d.node_id))
                    .collect();
                Ok(Box::new(HashPartitionedSink::create(
                    transports,
                    exprs.clone(),
                    payload.fragment.root.output_schema.clone(),
                    payload.instance.worker_num,
                )))
            }
        }
    }
}

#[tonic::async_trait]
impl CoordinatorToWorker for WorkerService {
    async fn prepare(&self, request: Request<PrepareRequest>) -> std::result::Result<Response<PrepareResponse>, Status> {
        let req = request.into_inner();
        let result = (|| async {
            let query_id = query_id_from_proto(req.query_id.as_ref().ok_or_else(|| {
                ErrorCode::BadWireFormat("prepare request missing query_id".to_string())
            })?)?;
            let instance_id = instance_id_from_proto(req.instance_id.as_ref().ok_or_else(|| {
                ErrorCode::BadWireFormat("prepare request missing instance_id".to_string())
            })?)?;
            let payload: FragmentInstancePayload = serde_json::from_slice(&req.fragment_instance_json)
                .map_err(|e| ErrorCode::BadWireFormat(format!("malformed fragment instance payload: {}", e)))?;

            let limit = if req.mem_limit_bytes > 0 { Some(req.mem_limit_bytes) } else { None };
            let memory_tracker = MemoryTracker::create_child(
                &self.memory_tracker_root,
                format!("instance-{}", instance_id),
                limit,
            );
            let profile = Arc::new(ProfileNode::create(format!("instance-{}", instance_id)));

            let receivers = self.register_receivers(query_id, instance_id, &payload.fragment.root);

            let factory_ctx = FactoryContext {
                scan_source_provider: Arc::new(EmptyScanSourceProvider),
                receivers,
                batch_size: self.batch_size,
                arena_cap_bytes: self.arena_cap_bytes,
                recv_timeout: self.recv_timeout,
                memory_tracker: memory_tracker.clone(),
            };
            let operator = build_operator_tree(&payload.fragment.root, &factory_ctx)?;
            let sink = self.build_sink(&payload, query_id)?;

            let executor = Arc::new(FragmentExecutor::create(
                instance_id,
                operator,
                sink,
                memory_tracker,
                profile.clone(),
            ));
            executor.prepare().await?;

            let report_state = ReportState::create(profile);
            self.instances.lock().await.insert(
                instance_id,
                LiveInstance {
                    executor,
                    report_state,
                    query_id,
                    report_to_address: payload.report_to_address,
                },
            );

            Ok::<_, ErrorCode>(())
        })()
        .await;

        Ok(Response::new(PrepareResponse {
            status: Some(status_to_proto(&result)),
        }))
    }

    async fn exec(&self, request: Request<ExecRequest>) -> std::result::Result<Response<ExecResponse>, Status> {
        let req = request.into_inner();
        let result = (|| async {
            let instance_id = instance_id_from_proto(
                req.instance_id.as_ref().ok_or_else(|| ErrorCode::BadWireFormat("exec request missing instance_id".to_string()))?,
            )?;

            let (executor, report_state, query_id, report_to_address) = {
                let instances = self.instances.lock().await;
                let live = instances.get(&instance_id).ok_or_else(|| {
                    ErrorCode::UnknownInstance(format!("no prepared instance {} to exec", instance_id))
                })?;
                (
                    live.executor.clone(),
                    live.report_state.clone(),
                    live.query_id,
                    live.report_to_address.clone(),
                )
            };

            let sink = Arc::new(RpcStatusReportSink {
                pool: self.connection_pool.clone(),
                query_id,
                report_to_address,
            });
            let mut reporter =
                StatusReporter::create(instance_id, report_state.clone(), sink, self.status_report_period);
            reporter.start().await?;

            tokio::spawn(async move {
                let outcome = executor.run().await;
                match outcome {
                    Ok(()) => report_state.mark_finished(),
                    Err(err) => report_state.mark_failed(err),
                }
            });

            Ok::<_, ErrorCode>(())
        })()
        .await;

        Ok(Response::new(ExecResponse {
            status: Some(status_to_proto(&result)),
        }))
    }

    async fn cancel(&self, request: Request<CancelRequest>) -> std::result::Result<Response<CancelResponse>, Status> {
        let req = request.into_inner();
        let result = (|| async {
            let instance_id = instance_id_from_proto(
                req.instance_id.as_ref().ok_or_else(|| ErrorCode::BadWireFormat("cancel request missing instance_id".to_string()))?,
            )?;
            let instances = self.instances.lock().await;
            match instances.get(&instance_id) {
                Some(live) => {
                    live.executor.cancel();
                    Ok::<_, ErrorCode>(())
                }
                None => Err(ErrorCode::UnknownInstance(format!("no live instance {} to cancel", instance_id))),
            }
        })()
        .await;

        Ok(Response::new(CancelResponse {
            status: Some(status_to_proto(&result)),
        }))
    }

    async fn transmit_batch(
        &self,
        request: Request<TransmitBatchRequest>,
    ) -> std::result::Result<Response<TransmitBatchResponse>, Status> {
        let req = request.into_inner();
        let query_id = query_id_from_proto(
            req.query_id.as_ref().ok_or_else(|| Status::invalid_argument("missing query_id"))?,
        )
        .map_err(|e| Status::invalid_argument(e.to_string()))?;
        let dest_instance_id = instance_id_from_proto(
            req.dest_instance_id.as_ref().ok_or_else(|| Status::invalid_argument("missing dest_instance_id"))?,
        )
        .map_err(|e| Status::invalid_argument(e.to_string()))?;
        let key = ReceiverKey {
            query_id,
            dest_instance_id,
            node_id: req.dest_node_id,
        };
        let ack = self
            .exchange_manager
            .transmit(&key, req.sender_index, req.seq, req.row_batch)
            .await
            .map_err(|e| Status::internal(e.to_string()))?;
        let wire_ack = match ack {
            common_exchange::TransmitAck::Ok => TTransmitAck::TransmitOk,
            common_exchange::TransmitAck::ReceiverClosed => TTransmitAck::TransmitReceiverClosed,
            common_exchange::TransmitAck::QueryCancelled => TTransmitAck::TransmitQueryCancelled,
        };
        Ok(Response::new(TransmitBatchResponse { ack: wire_ack as i32 }))
    }

    async fn transmit_eos(
        &self,
        request: Request<TransmitEosRequest>,
    ) -> std::result::Result<Response<TransmitEosResponse>, Status> {
        let req = request.into_inner();
        let query_id = query_id_from_proto(
            req.query_id.as_ref().ok_or_else(|| Status::invalid_argument("missing query_id"))?,
        )
        .map_err(|e| Status::invalid_argument(e.to_string()))?;
        let dest_instance_id = instance_id_from_proto(
            req.dest_instance_id.as_ref().ok_or_else(|| Status::invalid_argument("missing dest_instance_id"))?,
        )
        .map_err(|e| Status::invalid_argument(e.to_string()))?;
        let key = ReceiverKey {
            query_id,
            dest_instance_id,
            node_id: req.dest_node_id,
        };
        self.exchange_manager.transmit_end_of_stream(&key, req.sender_index).await;
        Ok(Response::new(TransmitEosResponse {}))
    }
}
