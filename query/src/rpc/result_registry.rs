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
use std::sync::Mutex;

use common_base::QueryId;
use common_datablocks::RowBatch;
use tokio::sync::mpsc;

/// The root (result-sink) fragment of every query in this deployment is
/// always scheduled with `exec_at_coord = true`, so it runs in the same
/// process as the coordinator and its client-facing `QueryExecState`.
/// This registry is how the two halves of that one process hand off
/// the channel: `ClientToCoordinator.Submit` creates the receiving end
/// and registers the sending end here before dispatching the plan to
/// the worker-side executor, which looks the sender up by `query_id`
/// when it builds the root fragment's `ResultSink`.
pub struct ResultChannelRegistry {
    senders: Mutex<HashMap<QueryId, mpsc::UnboundedSender<RowBatch>>>,
}

impl ResultChannelRegistry {
    pub fn create() -> Self {
        ResultChannelRegistry {
            senders: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, query_id: QueryId) -> mpsc::UnboundedReceiver<RowBatch> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().insert(query_id, tx);
        rx
    }

    pub fn take_sender(&self, query_id: QueryId) -> Option<mpsc::UnboundedSender<RowBatch>> {
        self.senders.lock().unwrap().get(&query_id).cloned()
    }

    pub fn remove(&self, query_id: QueryId) {
        self.senders.lock().unwrap().remove(&query_id);
    }
}
