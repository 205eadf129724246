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

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use common_base::QueryId;
use common_datablocks::RowBatch;
use common_exception::ErrorCode;
use common_exception::FirstErrorLatch;
use common_exception::Result;
use tokio::sync::mpsc;

/// Lifecycle of the client-visible handle. Distinct from
/// `FragmentExecutorState` — this tracks the *query's* externally
/// observable state, which outlives any one fragment instance and
/// persists a little past `Finished`/`Failed`/`Cancelled` until the
/// client actually calls `close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryExecStateStatus {
    Created,
    Running,
    Finished,
    Cancelled,
    Failed,
    Closed,
}

/// The client-facing handle that multiplexes the fetch protocol over
/// the coordinator's result sink. Rows arrive over an unbounded channel
/// fed by the result fragment's `ResultSink`; `fetch_rows` drains it
/// up to a row cap per call. `eos` is sticky: once the channel has been
/// observed closed, every subsequent `fetch_rows` call returns an empty
/// batch list immediately rather than re-polling a closed channel.
pub struct QueryExecState {
    query_id: QueryId,
    status: Mutex<QueryExecStateStatus>,
    rows: tokio::sync::Mutex<mpsc::UnboundedReceiver<RowBatch>>,
    eos: AtomicBool,
    error: FirstErrorLatch,
    last_active: Mutex<Instant>,
    idle_timeout: Duration,
}

impl QueryExecState {
    pub fn create(query_id: QueryId, rows: mpsc::UnboundedReceiver<RowBatch>, idle_timeout: Duration) -> Arc<Self> {
        Arc::new(QueryExecState {
            query_id,
            status: Mutex::new(QueryExecStateStatus::Created),
            rows: tokio::sync::Mutex::new(rows),
            eos: AtomicBool::new(false),
            error: FirstErrorLatch::new(),
            last_active: Mutex::new(Instant::now()),
            idle_timeout,
        })
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub fn status(&self) -> QueryExecStateStatus {
        *self.status.lock().unwrap()
    }

    fn set_status(&self, status: QueryExecStateStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn mark_running(&self) {
        self.set_status(QueryExecStateStatus::Running);
        self.touch();
    }

    pub fn mark_finished(&self) {
        self.set_status(QueryExecStateStatus::Finished);
    }

    pub fn mark_cancelled(&self) {
        self.set_status(QueryExecStateStatus::Cancelled);
    }

    pub fn mark_failed(&self, err: ErrorCode) {
        self.error.latch(err);
        self.set_status(QueryExecStateStatus::Failed);
    }

    fn touch(&self) {
        *self.last_active.lock().unwrap() = Instant::now();
    }

    /// True once no client call has touched this handle for longer
    /// than `idle_timeout` — the idle-query reaper's signal to close it
    /// out from under a client that disappeared without calling
    /// `close`.
    pub fn is_idle_expired(&self) -> bool {
        self.last_active.lock().unwrap().elapsed() > self.idle_timeout
    }

    /// Blocks (by polling, matching the coordinator's own status-table
    /// polling) until the query reaches a terminal state or `timeout`
    /// elapses, whichever is first.
    pub async fn wait(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            self.touch();
            match self.status() {
                QueryExecStateStatus::Finished | QueryExecStateStatus::Cancelled | QueryExecStateStatus::Closed => {
                    return Ok(())
                }
                QueryExecStateStatus::Failed => {
                    return Err(self
                        .error
                        .get()
                        .unwrap_or_else(|| ErrorCode::InternalError("query failed with no recorded error".to_string())));
                }
                _ => {}
            }
            if Instant::now() >= deadline {
                return Err(ErrorCode::TimedOut(format!("query {} did not reach a terminal state in time", self.query_id)));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Drains up to `max_rows` worth of already-arrived row batches
    /// without blocking beyond what's immediately available. Returns an
    /// empty vector once the channel has closed (sticky `eos`) rather
    /// than erroring — end of stream is a normal outcome, not a
    /// failure.
    pub async fn fetch_rows(&self, max_rows: usize) -> Result<Vec<RowBatch>> {
        self.touch();
        if self.eos.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        if let Some(err) = self.error.get() {
            return Err(err);
        }

        let mut rows = self.rows.lock().await;
        let mut batches = Vec::new();
        let mut collected = 0usize;
        while collected < max_rows {
            match rows.recv().await {
                Some(batch) => {
                    collected += batch.num_rows();
                    batches.push(batch);
                }
                None => {
                    self.eos.store(true, Ordering::SeqCst);
                    break;
                }
            }
            // Non-blocking drain of whatever else is already queued up,
            // so one `fetch_rows` call doesn't leave a full channel
            // behind it for the next call to pay for one batch at a
            // time.
            while collected < max_rows {
                match rows.try_recv() {
                    Ok(batch) => {
                        collected += batch.num_rows();
                        batches.push(batch);
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        self.eos.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
            break;
        }
        Ok(batches)
    }

    /// Idempotent: the client (or the idle reaper) may call this more
    /// than once.
    pub fn close(&self) {
        self.touch();
        let mut status = self.status.lock().unwrap();
        if *status != QueryExecStateStatus::Failed {
            *status = QueryExecStateStatus::Closed;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common_datavalues::DataSchema;

    use super::*;

    fn empty_batch() -> RowBatch {
        RowBatch::new(Arc::new(DataSchema::new(vec![])), 1, 0)
    }

    #[tokio::test]
    async fn fetch_rows_returns_batches_as_they_arrive_and_then_eos() {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = QueryExecState::create(QueryId::generate(), rx, Duration::from_secs(60));
        tx.send(empty_batch()).unwrap();
        drop(tx);

        let batches = state.fetch_rows(1024).await.unwrap();
        assert_eq!(batches.len(), 1);

        // channel is closed now; subsequent fetches are a sticky, cheap no-op.
        let more = state.fetch_rows(1024).await.unwrap();
        assert!(more.is_empty());
    }

    #[tokio::test]
    async fn wait_returns_the_latched_error_once_the_query_fails() {
        let (_tx, rx) = mpsc::unbounded_channel::<RowBatch>();
        let state = QueryExecState::create(QueryId::generate(), rx, Duration::from_secs(60));
        state.mark_running();
        state.mark_failed(ErrorCode::MemoryLimitExceeded("over budget".to_string()));
        let result = state.wait(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ErrorCode::MemoryLimitExceeded(_))));
    }

    #[tokio::test]
    async fn wait_times_out_if_the_query_never_reaches_a_terminal_state() {
        let (_tx, rx) = mpsc::unbounded_channel::<RowBatch>();
        let state = QueryExecState::create(QueryId::generate(), rx, Duration::from_secs(60));
        state.mark_running();
        let result = state.wait(Duration::from_millis(30)).await;
        assert!(matches!(result, Err(ErrorCode::TimedOut(_))));
    }

    #[test]
    fn close_is_idempotent_and_does_not_override_a_failed_status() {
        let (_tx, rx) = mpsc::unbounded_channel::<RowBatch>();
        let state = QueryExecState::create(QueryId::generate(), rx, Duration::from_secs(60));
        state.mark_failed(ErrorCode::InternalError("boom".to_string()));
        state.close();
        assert_eq!(state.status(), QueryExecStateStatus::Failed);
    }
}
