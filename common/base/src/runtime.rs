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

use std::future::Future;

use common_exception::ErrorCode;
use common_exception::Result;
use tokio::runtime::Builder;
use tokio::task::JoinHandle;

/// A named tokio multi-thread runtime. Every thread pool enumerated in the
/// concurrency model (session handlers, coordinator result pumps, RPC
/// workers) is one of these, sized from `num_cpus` unless overridden.
pub struct Runtime {
    name: String,
    handle: tokio::runtime::Runtime,
}

impl Runtime {
    pub fn with_worker_threads(name: impl Into<String>, worker_threads: usize) -> Result<Self> {
        let name = name.into();
        let thread_name = name.clone();
        let handle = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name(thread_name)
            .enable_all()
            .build()
            .map_err(|e| ErrorCode::internal(format!("failed to start runtime {name}: {e}")))?;
        Ok(Self { name, handle })
    }

    pub fn with_default_worker_threads(name: impl Into<String>) -> Result<Self> {
        Self::with_worker_threads(name, num_cpus::get())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }
}

/// Capability to spawn work onto whatever runtime a caller owns, without
/// the caller needing to know if that's the global runtime or a
/// per-query one.
pub trait TrySpawn {
    fn try_spawn<T>(&self, task: T) -> Result<JoinHandle<T::Output>>
    where
        T: Future + Send + 'static,
        T::Output: Send + 'static;
}

impl TrySpawn for Runtime {
    fn try_spawn<T>(&self, task: T) -> Result<JoinHandle<T::Output>>
    where
        T: Future + Send + 'static,
        T::Output: Send + 'static,
    {
        Ok(self.spawn(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_runs_a_future() {
        let rt = Runtime::with_worker_threads("test-rt", 2).unwrap();
        let out = rt.block_on(async { 1 + 1 });
        assert_eq!(out, 2);
    }
}
