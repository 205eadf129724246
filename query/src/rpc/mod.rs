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

//! The three RPC-facing pieces of a query node glued together: the
//! `CoordinatorToWorker` server a worker exposes, the
//! `WorkerToCoordinator` server a coordinator exposes, and the
//! `ClientToCoordinator` server a coordinator exposes to whatever calls
//! it with an already-planned query. Every `swarmdb-query` process runs
//! all three, acting as both a worker and a coordinator at once.

mod client_service;
mod coordinator_service;
mod fragment_payload;
mod query_registry;
mod result_registry;
mod scan_source;
mod transport;
mod worker_client;
mod worker_service;

pub use client_service::ClientService;
pub use coordinator_service::CoordinatorService;
pub use query_registry::QueryEntry;
pub use query_registry::QueryRegistry;
pub use result_registry::ResultChannelRegistry;
pub use worker_client::RpcWorkerClient;
pub use worker_service::WorkerService;
