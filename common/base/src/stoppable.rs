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

/// A long-running background task with an explicit start/stop contract:
/// the per-instance status reporter, the periodic counter-sampling
/// thread, and the three RPC servers all implement this.
#[async_trait]
pub trait Stoppable {
    async fn start(&mut self) -> Result<()>;

    /// Request a graceful stop. `force` skips any drain and returns as
    /// soon as the task observes the flag.
    async fn stop(&mut self, force: bool) -> Result<()>;
}
