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
use common_exception::Result;

/// Abstracts how a fragment instance's sink gets a batch to a
/// destination instance, so the sink code is the same whether the
/// destination happens to live on this worker or has to go over the
/// wire. A same-process implementation calls `DataStreamManager`
/// directly; a remote one goes through the flight RPC client.
#[async_trait]
pub trait ExchangeTransport: Send + Sync {
    async fn transmit_batch(&self, sender_index: u32, seq: u64, batch_bytes: &[u8]) -> Result<()>;

    async fn transmit_eos(&self, sender_index: u32) -> Result<()>;
}

/// Delivers directly into a local `DataStreamManager`'s receiver,
/// skipping RPC entirely for destinations that happen to be co-located
/// with the sender.
pub struct LocalTransport {
    manager: std::sync::Arc<crate::manager::DataStreamManager>,
    key: crate::manager::ReceiverKey,
}

impl LocalTransport {
    pub fn new(
        manager: std::sync::Arc<crate::manager::DataStreamManager>,
        key: crate::manager::ReceiverKey,
    ) -> Self {
        LocalTransport { manager, key }
    }
}

#[async_trait]
impl ExchangeTransport for LocalTransport {
    async fn transmit_batch(&self, sender_index: u32, seq: u64, batch_bytes: &[u8]) -> Result<()> {
        use common_exception::ErrorCode;

        use crate::receiver::TransmitAck;

        match self
            .manager
            .transmit(&self.key, sender_index, seq, batch_bytes.to_vec())
            .await?
        {
            TransmitAck::Ok => Ok(()),
            TransmitAck::ReceiverClosed => Err(ErrorCode::ReceiverClosed(format!(
                "receiver {:?} is closed",
                self.key
            ))),
            TransmitAck::QueryCancelled => Err(ErrorCode::QueryCancelled(format!(
                "query for receiver {:?} was cancelled",
                self.key
            ))),
        }
    }

    async fn transmit_eos(&self, sender_index: u32) -> Result<()> {
        self.manager.transmit_end_of_stream(&self.key, sender_index).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common_base::FragmentInstanceId;
    use common_base::QueryId;
    use common_profile::ProfileNode;

    use super::*;
    use crate::manager::DataStreamManager;
    use crate::manager::ReceiverKey;
    use crate::receiver::GetBatchResult;

    #[tokio::test]
    async fn local_transport_delivers_into_the_registered_receiver() {
        let manager = DataStreamManager::create();
        let key = ReceiverKey {
            query_id: QueryId::generate(),
            dest_instance_id: FragmentInstanceId::generate(),
            node_id: 1,
        };
        let receiver = manager.create_receiver(key, 1, 1024, ProfileNode::create("recv"));
        let transport = LocalTransport::new(manager, key);

        transport.transmit_batch(0, 1, &[7, 8, 9]).await.unwrap();
        transport.transmit_eos(0).await.unwrap();

        match receiver
            .get_batch(std::time::Duration::from_millis(200))
            .await
            .unwrap()
        {
            GetBatchResult::Batch(b) => assert_eq!(b, vec![7, 8, 9]),
            GetBatchResult::Eos => panic!("expected a batch before eos"),
        }
    }
}
