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

//! The query node binary's library half: process configuration, the
//! shared `RuntimeEnv`, the periodic counter thread, and the RPC
//! service implementations that tie the `execution`/`coordinator`/
//! `scheduler` crates together into one running process.

pub mod config;
pub mod counter_thread;
pub mod rpc;
pub mod runtime_env;

pub use config::Config;
pub use counter_thread::CounterThread;
pub use runtime_env::RuntimeEnv;
