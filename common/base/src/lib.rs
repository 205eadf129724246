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

//! Process-lifecycle building blocks shared by every thread pool in the
//! workspace: a named multi-thread `Runtime`, a `TrySpawn` capability
//! trait, and a `Stoppable` contract for long-running background tasks
//! (status reporters, the periodic counter thread, RPC servers).

mod progress;
mod query_id;
mod runtime;
mod stoppable;

pub use progress::Progress;
pub use progress::ProgressCallback;
pub use progress::ProgressValues;
pub use query_id::FragmentInstanceId;
pub use query_id::QueryId;
pub use runtime::Runtime;
pub use runtime::TrySpawn;
pub use stoppable::Stoppable;

pub use tokio;
