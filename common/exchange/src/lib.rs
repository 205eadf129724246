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

//! The data-stream exchange fabric (component 4.4): a per-worker
//! registry of receivers, keyed by `(query_id, dest_instance_id,
//! node_id)`, each backed by a bounded, byte-measured queue with
//! backpressure and cancellation.

mod manager;
mod receiver;
mod retry;
mod transport;

pub use manager::DataStreamManager;
pub use manager::ReceiverKey;
pub use receiver::ExchangeReceiver;
pub use receiver::GetBatchResult;
pub use receiver::ReceiverLifecycle;
pub use receiver::TransmitAck;
pub use retry::retrying_transmit;
pub use retry::RetryPolicy;
pub use transport::ExchangeTransport;
