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

use common_base::FragmentInstanceId;
use common_base::QueryId;
use common_profile::ProfileNode;

use crate::receiver::ExchangeReceiver;
use crate::receiver::GetBatchResult;
use crate::receiver::TransmitAck;

/// Identifies one receiver on this worker: the query it belongs to, the
/// fragment instance it feeds, and the plan node id within that
/// instance that owns the exchange-receive (a single instance may have
/// more than one exchange-receive child).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverKey {
    pub query_id: QueryId,
    pub dest_instance_id: FragmentInstanceId,
    pub node_id: u32,
}

/// The per-worker registry of live `ExchangeReceiver`s. Senders and the
/// owning instance's exchange-receive operator both look receivers up
/// by `ReceiverKey`; the registry is the only thing that needs to know
/// both sides exist.
pub struct DataStreamManager {
    receivers: Mutex<HashMap<ReceiverKey, Arc<ExchangeReceiver>>>,
}

impl DataStreamManager {
    pub fn create() -> Arc<DataStreamManager> {
        Arc::new(DataStreamManager {
            receivers: Mutex::new(HashMap::new()),
        })
    }

    /// Registers a new receiver, overwriting any previous registration
    /// under the same key (a retried `prepare` RPC is expected to
    /// recreate the receiver for an instance that never started).
    pub fn create_receiver(
        &self,
        key: ReceiverKey,
        num_senders: usize,
        buffer_bytes_cap: usize,
        profile: ProfileNode,
    ) -> Arc<ExchangeReceiver> {
        let receiver = Arc::new(ExchangeReceiver::create(
            key,
            num_senders,
            buffer_bytes_cap,
            profile,
        ));
        self.receivers.lock().unwrap().insert(key, receiver.clone());
        receiver
    }

    pub fn get_receiver(&self, key: &ReceiverKey) -> Option<Arc<ExchangeReceiver>> {
        self.receivers.lock().unwrap().get(key).cloned()
    }

    /// Removes the receiver from the registry. Called once its owning
    /// instance has drained it to `Eos` or the instance is cancelled;
    /// the `Arc` itself may still be held by in-flight senders.
    pub fn remove_receiver(&self, key: &ReceiverKey) {
        self.receivers.lock().unwrap().remove(key);
    }

    /// Convenience wrapper used by the RPC transmit handler: look up the
    /// receiver and enqueue, or report it gone if the instance already
    /// finished or was never created.
    pub async fn transmit(
        &self,
        key: &ReceiverKey,
        sender_index: u32,
        seq: u64,
        batch_bytes: Vec<u8>,
    ) -> common_exception::Result<TransmitAck> {
        match self.get_receiver(key) {
            Some(receiver) => receiver.enqueue(sender_index, seq, batch_bytes).await,
            None => Ok(TransmitAck::ReceiverClosed),
        }
    }

    pub async fn transmit_end_of_stream(&self, key: &ReceiverKey, sender_index: u32) {
        if let Some(receiver) = self.get_receiver(key) {
            receiver.close_sender(sender_index).await;
        }
    }

    pub async fn close_receiver(&self, key: &ReceiverKey) {
        if let Some(receiver) = self.get_receiver(key) {
            receiver.close().await;
        }
        self.remove_receiver(key);
    }

    pub async fn cancel_receiver(&self, key: &ReceiverKey) {
        if let Some(receiver) = self.get_receiver(key) {
            receiver.cancel().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn key() -> ReceiverKey {
        ReceiverKey {
            query_id: QueryId::generate(),
            dest_instance_id: FragmentInstanceId::generate(),
            node_id: 1,
        }
    }

    #[tokio::test]
    async fn created_receiver_is_retrievable_by_key() {
        let mgr = DataStreamManager::create();
        let k = key();
        mgr.create_receiver(k, 1, 1024, ProfileNode::create("recv"));
        assert!(mgr.get_receiver(&k).is_some());
    }

    #[tokio::test]
    async fn transmit_to_unknown_key_reports_receiver_closed() {
        let mgr = DataStreamManager::create();
        let ack = mgr.transmit(&key(), 0, 1, vec![1, 2, 3]).await.unwrap();
        assert_eq!(ack, TransmitAck::ReceiverClosed);
    }

    #[tokio::test]
    async fn close_receiver_removes_it_from_the_registry() {
        let mgr = DataStreamManager::create();
        let k = key();
        let receiver = mgr.create_receiver(k, 1, 1024, ProfileNode::create("recv"));
        receiver.close_sender(0).await;
        mgr.close_receiver(&k).await;
        assert!(mgr.get_receiver(&k).is_none());
    }

    #[tokio::test]
    async fn end_to_end_transmit_and_drain() {
        let mgr = DataStreamManager::create();
        let k = key();
        let receiver = mgr.create_receiver(k, 1, 1024, ProfileNode::create("recv"));
        mgr.transmit(&k, 0, 1, vec![9, 9]).await.unwrap();
        mgr.transmit_end_of_stream(&k, 0).await;

        match receiver.get_batch(Duration::from_millis(200)).await.unwrap() {
            GetBatchResult::Batch(b) => assert_eq!(b, vec![9, 9]),
            GetBatchResult::Eos => panic!("expected a batch before eos"),
        }
        match receiver.get_batch(Duration::from_millis(200)).await.unwrap() {
            GetBatchResult::Eos => {}
            GetBatchResult::Batch(_) => panic!("expected eos"),
        }
    }
}
