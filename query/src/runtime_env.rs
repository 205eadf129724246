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

use common_exchange::DataStreamManager;
use common_memory::MemoryTrackerRef;
use common_profile::ProfileNode;

use crate::config::Config;

/// Ties together the process-wide singletons every query touches: the
/// root of the memory tracker tree, the root of the process-level
/// profile tree, this worker's exchange-receiver registry, and the
/// resolved configuration. There is exactly one `RuntimeEnv` per
/// process; it carries no query-specific state itself, matching the
/// design notes' "no ambient global state (explicit `RuntimeEnv`)"
/// decision.
pub struct RuntimeEnv {
    pub config: Config,
    pub memory_tracker_root: MemoryTrackerRef,
    pub profile_root: ProfileNode,
    pub exchange_manager: Arc<DataStreamManager>,
}

impl RuntimeEnv {
    pub fn create(config: Config) -> Arc<RuntimeEnv> {
        let limit = if config.mem_limit_bytes > 0 {
            Some(config.mem_limit_bytes)
        } else {
            None
        };
        Arc::new(RuntimeEnv {
            memory_tracker_root: common_memory::MemoryTracker::create_root("process", limit),
            profile_root: ProfileNode::create("process"),
            exchange_manager: DataStreamManager::create(),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_wires_a_process_root_tracker_honouring_the_configured_limit() {
        let mut config = Config::default();
        config.mem_limit_bytes = 1024;
        let env = RuntimeEnv::create(config);
        assert_eq!(env.memory_tracker_root.limit(), Some(1024));
    }

    #[test]
    fn zero_mem_limit_means_unbounded() {
        let env = RuntimeEnv::create(Config::default());
        assert_eq!(env.memory_tracker_root.limit(), None);
    }
}
