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

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common_base::Stoppable;
use common_exception::Result;

use crate::runtime_env::RuntimeEnv;

/// The single periodic-counter thread named in the concurrency model:
/// independent of any one query, it samples the process root memory
/// tracker's conservative `any_limit_exceeded()` check and republishes
/// it as a gauge, and drives the profile root's time-series samplers.
/// Per-query and per-instance counters are updated inline by their own
/// operators; this thread only owns the process-wide samples.
pub struct CounterThread {
    runtime: Arc<RuntimeEnv>,
    interval: Duration,
    stop_flag: Arc<std::sync::atomic::AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl CounterThread {
    pub fn create(runtime: Arc<RuntimeEnv>, interval: Duration) -> Self {
        CounterThread {
            runtime,
            interval,
            stop_flag: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            task: None,
        }
    }
}

#[async_trait]
impl Stoppable for CounterThread {
    async fn start(&mut self) -> Result<()> {
        let runtime = self.runtime.clone();
        let interval = self.interval;
        let stop_flag = self.stop_flag.clone();
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if stop_flag.load(std::sync::atomic::Ordering::SeqCst) {
                    break;
                }
                metrics::gauge!(
                    "swarmdb_memory_tracker_consumption_bytes",
                    runtime.memory_tracker_root.consumption() as f64
                );
                metrics::gauge!(
                    "swarmdb_memory_tracker_any_limit_exceeded",
                    if runtime.memory_tracker_root.any_limit_exceeded() { 1.0 } else { 0.0 }
                );
            }
        }));
        Ok(())
    }

    async fn stop(&mut self, force: bool) -> Result<()> {
        self.stop_flag.store(true, std::sync::atomic::Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            if force {
                task.abort();
            } else {
                let _ = task.await;
            }
        }
        Ok(())
    }
}
