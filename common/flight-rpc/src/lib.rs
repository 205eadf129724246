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

//! Generated gRPC stubs and the supporting plumbing (auth, connection
//! pooling, status conversion) for the three RPC services in the
//! external interfaces: coordinator-to-worker, worker-to-coordinator,
//! client-to-coordinator.

pub mod exec {
    tonic::include_proto!("swarmdb.exec");
}

mod auth;
mod ids;
mod pool;
mod status;

pub use auth::AuthInterceptor;
pub use auth::TokenIssuer;
pub use ids::instance_id_from_proto;
pub use ids::instance_id_to_proto;
pub use ids::query_id_from_proto;
pub use ids::query_id_to_proto;
pub use pool::ConnectionPool;
pub use status::status_to_proto;
pub use status::status_from_proto;
