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

use crate::worker::WorkerNode;

/// Admission-control hook: before an instance is placed on a worker the
/// scheduler asks the broker to reserve the memory it intends to use
/// there, and releases it once the instance is done. A denial surfaces
/// as `ErrorCode::AdmissionDenied` from the reserving call site, not
/// from this trait itself — implementations simply report yes/no (or
/// fail outright on a broker-side error).
#[async_trait]
pub trait ReservationBroker: Send + Sync {
    async fn reserve(&self, worker: &WorkerNode, estimated_bytes: i64) -> Result<bool>;
    async fn release(&self, worker: &WorkerNode, estimated_bytes: i64) -> Result<()>;
}

/// Admits everything unconditionally. This is what a deployment runs
/// with until a real admission controller (tracking per-worker
/// reservations against their memory trackers) is wired in; nothing in
/// this workspace depends on reservations actually being enforced.
pub struct NoopReservationBroker;

#[async_trait]
impl ReservationBroker for NoopReservationBroker {
    async fn reserve(&self, _worker: &WorkerNode, _estimated_bytes: i64) -> Result<bool> {
        Ok(true)
    }

    async fn release(&self, _worker: &WorkerNode, _estimated_bytes: i64) -> Result<()> {
        Ok(())
    }
}
