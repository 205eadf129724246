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

//! The per-query coordinator (component 4.8) and its client-facing
//! handle (component 4.9): schedules a query's fragments, drives every
//! instance through prepare/exec, merges out-of-order status reports,
//! cancels the rest of the query on first failure, and exposes the
//! result stream through an exec/wait/fetch_rows/close handle.

mod coordinator;
mod query_exec_state;
mod status_table;
mod worker_client;

pub use coordinator::Coordinator;
pub use query_exec_state::QueryExecState;
pub use query_exec_state::QueryExecStateStatus;
pub use status_table::StatusTable;
pub use worker_client::WorkerClient;
