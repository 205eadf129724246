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
use common_exchange::ExchangeTransport;
use common_flight_rpc::exec::coordinator_to_worker_client::CoordinatorToWorkerClient;
use common_flight_rpc::exec::TransmitBatchRequest;
use common_flight_rpc::exec::TransmitEosRequest;
use common_flight_rpc::instance_id_to_proto;
use common_flight_rpc::query_id_to_proto;
use common_flight_rpc::ConnectionPool;

/// The remote leg of `ExchangeTransport`: delivers batches to a
/// destination instance that lives on another worker by calling that
/// worker's `CoordinatorToWorker.TransmitBatch`/`TransmitEos` RPCs (the
/// same service coordinator-to-worker prepare/exec traffic uses — the
/// wire schema doesn't distinguish coordinator-origin from
/// peer-worker-origin transmits).
pub struct RpcExchangeTransport {
    pool: Arc<ConnectionPool>,
    address: String,
    query_id: QueryId,
    dest_instance_id: FragmentInstanceId,
    dest_node_id: u32,
}

impl RpcExchangeTransport {
    pub fn new(
        pool: Arc<ConnectionPool>,
        address: String,
        query_id: QueryId,
        dest_instance_id: FragmentInstanceId,
        dest_node_id: u32,
    ) -> Self {
        RpcExchangeTransport {
            pool,
            address,
            query_id,
            dest_instance_id,
            dest_node_id,
        }
    }

    async fn client(&self) -> Result<CoordinatorToWorkerClient<tonic::transport::Channel>> {
        let channel = self.pool.get_or_connect(&self.address).await?;
        Ok(CoordinatorToWorkerClient::new(channel))
    }
}

#[async_trait]
impl ExchangeTransport for RpcExchangeTransport {
    async fn transmit_batch(&self, sender_index: u32, seq: u64, batch_bytes: &[u8]) -> Result<()> {
        let mut client = self.client().await?;
        let request = TransmitBatchRequest {
            query_id: Some(query_id_to_proto(self.query_id)),
            dest_instance_id: Some(instance_id_to_proto(self.dest_instance_id)),
            dest_node_id: self.dest_node_id,
            sender_index,
            seq,
            row_batch: batch_bytes.to_vec(),
        };
        client
            .transmit_batch(request)
            .await
            .map_err(|status| ErrorCode::RecoverableTransient {
                message: format!("transmit_batch to {} failed: {}", self.address, status),
                attempts: 1,
            })?;
        Ok(())
    }

    async fn transmit_eos(&self, sender_index: u32) -> Result<()> {
        let mut client = self.client().await?;
        let request = TransmitEosRequest {
            query_id: Some(query_id_to_proto(self.query_id)),
            dest_instance_id: Some(instance_id_to_proto(self.dest_instance_id)),
            dest_node_id: self.dest_node_id,
            sender_index,
        };
        client
            .transmit_eos(request)
            .await
            .map_err(|status| ErrorCode::RecoverableTransient {
                message: format!("transmit_eos to {} failed: {}", self.address, status),
                attempts: 1,
            })?;
        Ok(())
    }
}
