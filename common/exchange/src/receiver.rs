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

use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::time::Duration;

use common_exception::ErrorCode;
use common_exception::Result;
use common_profile::CounterValue;
use common_profile::ProfileNode;
use tokio::sync::Mutex;
use tokio::sync::Notify;
use tokio::time::timeout;

use crate::manager::ReceiverKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverLifecycle {
    Open,
    Draining,
    Closed,
}

#[derive(Debug)]
pub enum GetBatchResult {
    Batch(Vec<u8>),
    Eos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitAck {
    Ok,
    ReceiverClosed,
    QueryCancelled,
}

struct Inner {
    queue: VecDeque<(u32, Vec<u8>)>,
    buffered_bytes: usize,
    senders_closed: HashSet<u32>,
    last_seq_by_sender: HashMap<u32, u64>,
    cancelled: bool,
    lifecycle: ReceiverLifecycle,
}

/// One sender-to-receiver aggregation point. Senders transmit by
/// `sender_index`; the combined queue preserves arrival order across
/// senders (FIFO per sender falls out of pushing each sender's batches
/// in the order that sender's RPCs land).
pub struct ExchangeReceiver {
    key: ReceiverKey,
    num_senders: usize,
    buffer_bytes_cap: usize,
    profile: ProfileNode,
    inner: Mutex<Inner>,
    not_empty: Notify,
    not_full: Notify,
}

impl ExchangeReceiver {
    pub(crate) fn create(
        key: ReceiverKey,
        num_senders: usize,
        buffer_bytes_cap: usize,
        profile: ProfileNode,
    ) -> Self {
        let lifecycle = if num_senders == 0 {
            ReceiverLifecycle::Draining
        } else {
            ReceiverLifecycle::Open
        };
        ExchangeReceiver {
            key,
            num_senders,
            buffer_bytes_cap,
            profile,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                buffered_bytes: 0,
                senders_closed: HashSet::new(),
                last_seq_by_sender: HashMap::new(),
                cancelled: false,
                lifecycle,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    pub fn key(&self) -> &ReceiverKey {
        &self.key
    }

    /// Enqueues `batch_bytes` from `sender_index`, blocking (yielding)
    /// until there is buffer space. `seq` must be strictly increasing
    /// per sender; the receiver rejects (without enqueuing) a
    /// non-increasing sequence rather than silently reordering.
    pub async fn enqueue(&self, sender_index: u32, seq: u64, batch_bytes: Vec<u8>) -> Result<TransmitAck> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if inner.cancelled {
                    return Ok(TransmitAck::QueryCancelled);
                }
                if inner.lifecycle == ReceiverLifecycle::Closed {
                    return Ok(TransmitAck::ReceiverClosed);
                }
                if let Some(&last) = inner.last_seq_by_sender.get(&sender_index) {
                    if seq <= last {
                        return Err(ErrorCode::internal(format!(
                            "out-of-order transmit from sender {}: seq {} after {}",
                            sender_index, seq, last
                        )));
                    }
                }
                if inner.buffered_bytes + batch_bytes.len() <= self.buffer_bytes_cap
                    || inner.buffered_bytes == 0
                {
                    inner.last_seq_by_sender.insert(sender_index, seq);
                    inner.buffered_bytes += batch_bytes.len();
                    self.profile.update_counter(
                        "BytesReceived",
                        CounterValue::MonotonicBytes(batch_bytes.len() as u64),
                    );
                    inner.queue.push_back((sender_index, batch_bytes));
                    self.not_empty.notify_waiters();
                    return Ok(TransmitAck::Ok);
                }
            }
            self.not_full.notified().await;
        }
    }

    /// Delivers the closed marker for `sender_index`. Idempotent: a
    /// second call for the same sender is a no-op.
    pub async fn close_sender(&self, sender_index: u32) {
        let mut inner = self.inner.lock().await;
        let newly_closed = inner.senders_closed.insert(sender_index);
        if newly_closed && inner.senders_closed.len() == self.num_senders {
            if inner.lifecycle == ReceiverLifecycle::Open {
                inner.lifecycle = ReceiverLifecycle::Draining;
            }
            self.not_empty.notify_waiters();
        }
    }

    /// Blocks until a batch is ready, end-of-stream, cancellation, or
    /// `recv_timeout` elapses.
    pub async fn get_batch(&self, recv_timeout: Duration) -> Result<GetBatchResult> {
        let fut = self.get_batch_inner();
        match timeout(recv_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ErrorCode::TimedOut(format!(
                "exchange receiver {:?} timed out waiting for a batch",
                self.key
            ))),
        }
    }

    async fn get_batch_inner(&self) -> Result<GetBatchResult> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if inner.cancelled {
                    return Err(ErrorCode::QueryCancelled(format!(
                        "exchange receiver {:?} cancelled",
                        self.key
                    )));
                }
                if let Some((_sender, bytes)) = inner.queue.pop_front() {
                    inner.buffered_bytes -= bytes.len();
                    self.not_full.notify_waiters();
                    return Ok(GetBatchResult::Batch(bytes));
                }
                let all_senders_done = inner.senders_closed.len() == self.num_senders;
                if all_senders_done {
                    inner.lifecycle = ReceiverLifecycle::Closed;
                    return Ok(GetBatchResult::Eos);
                }
            }
            self.not_empty.notified().await;
        }
    }

    /// Marks the receiver done. In-flight and future `enqueue` calls get
    /// a `ReceiverClosed` ack and may discard their batches.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.lifecycle = ReceiverLifecycle::Closed;
        inner.queue.clear();
        inner.buffered_bytes = 0;
        drop(inner);
        self.not_full.notify_waiters();
        self.not_empty.notify_waiters();
    }

    /// Marks the receiver cancelled: blocked `get_batch` calls return an
    /// error, and further transmits are accepted-and-discarded rather
    /// than deadlocking the sender.
    pub async fn cancel(&self) {
        let mut inner = self.inner.lock().await;
        inner.cancelled = true;
        drop(inner);
        self.not_full.notify_waiters();
        self.not_empty.notify_waiters();
    }

    pub async fn lifecycle(&self) -> ReceiverLifecycle {
        self.inner.lock().await.lifecycle
    }

    pub async fn buffered_bytes(&self) -> usize {
        self.inner.lock().await.buffered_bytes
    }
}
