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

use common_base::QueryId;
use common_datavalues::DataSchemaRef;
use coordinator::Coordinator;
use coordinator::QueryExecState;

use crate::rpc::worker_client::RpcWorkerClient;

/// Everything a live query needs looked up by either the client-facing
/// service (`Wait`/`Fetch`/`Close`) or the worker-facing service
/// (`ReportStatus`): the `Coordinator` driving it, the `QueryExecState`
/// the client side polls and drains, and the result fragment's output
/// schema, so `Fetch` can produce an empty-but-well-formed wire batch
/// even once the row stream has gone dry.
pub struct QueryEntry {
    pub coordinator: Arc<Coordinator<RpcWorkerClient>>,
    pub exec_state: Arc<QueryExecState>,
    pub result_schema: DataSchemaRef,
}

/// The coordinator process's table of in-flight queries, keyed by
/// `query_id`. `ClientToCoordinator.Submit` inserts an entry;
/// `WorkerToCoordinator.ReportStatus` reads it to forward a status
/// report to the right `Coordinator`; `Close`/`CancelQuery` remove it.
pub struct QueryRegistry {
    queries: Mutex<HashMap<QueryId, Arc<QueryEntry>>>,
}

impl QueryRegistry {
    pub fn create() -> Arc<QueryRegistry> {
        Arc::new(QueryRegistry {
            queries: Mutex::new(HashMap::new()),
        })
    }

    pub fn insert(&self, query_id: QueryId, entry: Arc<QueryEntry>) {
        self.queries.lock().unwrap().insert(query_id, entry);
    }

    pub fn get(&self, query_id: QueryId) -> Option<Arc<QueryEntry>> {
        self.queries.lock().unwrap().get(&query_id).cloned()
    }

    pub fn remove(&self, query_id: QueryId) {
        self.queries.lock().unwrap().remove(&query_id);
    }
}
