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

use async_trait::async_trait;
use common_base::FragmentInstanceId;
use common_base::QueryId;
use common_exception::ErrorCode;
use common_exception::Result;
use common_flight_rpc::exec::coordinator_to_worker_client::CoordinatorToWorkerClient;
use common_flight_rpc::exec::CancelRequest;
use common_flight_rpc::exec::ExecRequest;
use common_flight_rpc::exec::PrepareRequest;
use common_flight_rpc::instance_id_to_proto;
use common_flight_rpc::query_id_to_proto;
use common_flight_rpc::status_from_proto;
use common_flight_rpc::ConnectionPool;
use common_planners::FragmentInstance;
use common_planners::PlanFragment;
use coordinator::WorkerClient;

use crate::rpc::fragment_payload::FragmentInstancePayload;

/// The production `WorkerClient`: every call dials the target worker's
/// `CoordinatorToWorker` service through the shared connection pool.
/// `report_to_address` is this coordinator's own `WorkerToCoordinator`
/// listen address, baked into every `PrepareRequest` so the worker
/// knows where to send status reports for the life of the instance.
pub struct RpcWorkerClient {
    pool: Arc<ConnectionPool>,
    report_to_address: String,
    mem_limit_bytes: i64,
}

impl RpcWorkerClient {
    pub fn create(pool: Arc<ConnectionPool>, report_to_address: String, mem_limit_bytes: i64) -> Self {
        RpcWorkerClient {
            pool,
            report_to_address,
            mem_limit_bytes,
        }
    }

    async fn client(&self, worker_address: &str) -> Result<CoordinatorToWorkerClient<tonic::transport::Channel>> {
        let channel = self.pool.get_or_connect(worker_address).await?;
        Ok(CoordinatorToWorkerClient::new(channel))
    }
}

#[async_trait]
impl WorkerClient for RpcWorkerClient {
    async fn prepare(
        &self,
        worker_address: &str,
        query_id: QueryId,
        fragment: &PlanFragment,
        instance: &FragmentInstance,
    ) -> Result<()> {
        let payload = FragmentInstancePayload {
            fragment: fragment.clone(),
            instance: instance.clone(),
            report_to_address: self.report_to_address.clone(),
        };
        let fragment_instance_json = serde_json::to_vec(&payload)
            .map_err(|e| ErrorCode::InternalError(format!("failed to serialise fragment instance payload: {}", e)))?;

        let mut client = self.client(worker_address).await?;
        let response = client
            .prepare(PrepareRequest {
                query_id: Some(query_id_to_proto(query_id)),
                instance_id: Some(instance_id_to_proto(instance.instance_id)),
                fragment_instance_json,
                mem_limit_bytes: self.mem_limit_bytes,
            })
            .await
            .map_err(|status| ErrorCode::RecoverableTransient {
                message: format!("prepare on {} failed: {}", worker_address, status),
                attempts: 1,
            })?
            .into_inner();
        status_from_proto(&response.status.unwrap_or_default())
    }

    async fn exec(&self, worker_address: &str, instance_id: FragmentInstanceId) -> Result<()> {
        let mut client = self.client(worker_address).await?;
        let response = client
            .exec(ExecRequest {
                query_id: None,
                instance_id: Some(instance_id_to_proto(instance_id)),
            })
            .await
            .map_err(|status| ErrorCode::RecoverableTransient {
                message: format!("exec on {} failed: {}", worker_address, status),
                attempts: 1,
            })?
            .into_inner();
        status_from_proto(&response.status.unwrap_or_default())
    }

    async fn cancel(&self, worker_address: &str, instance_id: FragmentInstanceId) -> Result<()> {
        let mut client = self.client(worker_address).await?;
        let response = client
            .cancel(CancelRequest {
                query_id: None,
                instance_id: Some(instance_id_to_proto(instance_id)),
            })
            .await
            .map_err(|status| ErrorCode::RecoverableTransient {
                message: format!("cancel on {} failed: {}", worker_address, status),
                attempts: 1,
            })?
            .into_inner();
        status_from_proto(&response.status.unwrap_or_default())
    }
}
