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

use common_base::FragmentInstanceId;
use common_exception::ErrorCode;
use common_exception::Result;
use common_memory::MemoryTrackerRef;
use common_profile::CounterValue;
use common_profile::ProfileNode;
use tokio::sync::Mutex as AsyncMutex;

use crate::operator::BoxedOperator;
use crate::operator::Operator;
use crate::sink::BoxedSink;

/// `created` on construction, `prepared` after `prepare`, `running`
/// while `run` is pulling batches, then exactly one of the three
/// terminal states. Once terminal, a `FragmentExecutor` never
/// transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentExecutorState {
    Created,
    Prepared,
    Running,
    Finished,
    Cancelled,
    Failed,
}

/// Drives one plan fragment's operator tree to completion on one
/// worker: `prepare` resolves the tree without touching input, `run`
/// opens it, pulls every batch through to `sink`, and tears it down.
/// `cancel` is safe to call from another task at any point; `run`
/// observes it between batches and unwinds through `close`/`finish`
/// exactly like a normal error.
///
/// `operator`/`sink` live behind an async mutex rather than being
/// exposed through `&mut self`, so a registry can hold one shared
/// `Arc<FragmentExecutor>` for the lifetime of an instance: the task
/// driving `run` holds the lock for the whole call, while `cancel`
/// (which only touches the atomic flag) and `state`/`instance_id`
/// never need it.
pub struct FragmentExecutor {
    instance_id: FragmentInstanceId,
    operator: AsyncMutex<BoxedOperator>,
    sink: AsyncMutex<BoxedSink>,
    memory_tracker: MemoryTrackerRef,
    profile: Arc<ProfileNode>,
    state: Mutex<FragmentExecutorState>,
    cancelled: AtomicBool,
}

impl FragmentExecutor {
    pub fn create(
        instance_id: FragmentInstanceId,
        operator: BoxedOperator,
        sink: BoxedSink,
        memory_tracker: MemoryTrackerRef,
        profile: Arc<ProfileNode>,
    ) -> Self {
        FragmentExecutor {
            instance_id,
            operator: AsyncMutex::new(operator),
            sink: AsyncMutex::new(sink),
            memory_tracker,
            profile,
            state: Mutex::new(FragmentExecutorState::Created),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn instance_id(&self) -> FragmentInstanceId {
        self.instance_id
    }

    /// The live profile this instance updates as it runs; shared with a
    /// `StatusReporter` so the reports it sends reflect real progress
    /// rather than a snapshot taken once at construction.
    pub fn profile(&self) -> &Arc<ProfileNode> {
        &self.profile
    }

    pub fn state(&self) -> FragmentExecutorState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: FragmentExecutorState) {
        *self.state.lock().unwrap() = state;
    }

    /// Requests cancellation. Idempotent; a fragment already in a
    /// terminal state is unaffected.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn prepare(&self) -> Result<()> {
        if self.state() != FragmentExecutorState::Created {
            return Err(ErrorCode::InternalError(format!(
                "fragment instance {} prepared more than once",
                self.instance_id
            )));
        }
        self.operator.lock().await.prepare().await?;
        self.set_state(FragmentExecutorState::Prepared);
        Ok(())
    }

    pub async fn run(&self) -> Result<()> {
        if self.state() != FragmentExecutorState::Prepared {
            return Err(ErrorCode::InternalError(format!(
                "fragment instance {} run before prepare completed",
                self.instance_id
            )));
        }
        self.set_state(FragmentExecutorState::Running);

        let result = self.drive().await;
        match &result {
            Ok(()) => self.set_state(FragmentExecutorState::Finished),
            Err(ErrorCode::QueryCancelled(_)) => self.set_state(FragmentExecutorState::Cancelled),
            Err(_) => self.set_state(FragmentExecutorState::Failed),
        }
        result
    }

    async fn drive(&self) -> Result<()> {
        let mut operator = self.operator.lock().await;
        let mut sink = self.sink.lock().await;
        operator.open().await?;
        loop {
            if self.is_cancelled() {
                let _ = operator.close().await;
                return Err(ErrorCode::QueryCancelled(format!(
                    "fragment instance {} cancelled",
                    self.instance_id
                )));
            }
            match operator.get_next().await {
                Ok(Some(batch)) => {
                    let approx_bytes = batch.to_wire().len() as i64;
                    if !self.memory_tracker.try_consume(approx_bytes) {
                        let _ = operator.close().await;
                        return Err(ErrorCode::MemoryLimitExceeded(format!(
                            "fragment instance {} exceeded its memory limit",
                            self.instance_id
                        )));
                    }
                    self.profile
                        .update_counter("RowsProduced", CounterValue::MonotonicBytes(batch.num_rows() as u64));
                    let write_result = sink.write(batch).await;
                    self.memory_tracker.release(approx_bytes);
                    write_result?;
                }
                Ok(None) => break,
                Err(err) => {
                    let _ = operator.close().await;
                    return Err(err);
                }
            }
        }
        sink.finish().await?;
        operator.close().await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use common_datablocks::RowBatch;
    use common_datavalues::DataField;
    use common_datavalues::DataSchema;
    use common_datavalues::DataSchemaRef;
    use common_datavalues::DataValue;
    use common_memory::MemoryTracker;
    use std::sync::Arc;

    use super::*;
    use crate::sink::Sink;

    struct FixedOperator {
        batches: Vec<RowBatch>,
        schema: DataSchemaRef,
        opened: bool,
        closed: bool,
    }

    #[async_trait]
    impl Operator for FixedOperator {
        async fn prepare(&mut self) -> Result<()> {
            Ok(())
        }
        async fn open(&mut self) -> Result<()> {
            self.opened = true;
            Ok(())
        }
        async fn get_next(&mut self) -> Result<Option<RowBatch>> {
            Ok(self.batches.pop())
        }
        async fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
        fn output_schema(&self) -> &DataSchemaRef {
            &self.schema
        }
        fn name(&self) -> &'static str {
            "Fixed"
        }
    }

    struct CountingSink {
        written: usize,
        finished: bool,
    }

    #[async_trait]
    impl Sink for CountingSink {
        async fn write(&mut self, _batch: RowBatch) -> Result<()> {
            self.written += 1;
            Ok(())
        }
        async fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    fn schema() -> DataSchemaRef {
        Arc::new(DataSchema::new(vec![DataField::new("a", common_datavalues::DataType::Int64, true)]))
    }

    fn batch() -> RowBatch {
        let mut b = RowBatch::new(schema(), 1, 0);
        let s = b.allocate_tuple().unwrap();
        b.set_column(s, 0, &DataValue::Int64(Some(1))).unwrap();
        b
    }

    #[tokio::test]
    async fn runs_through_to_finished_and_drains_every_batch() {
        let op = Box::new(FixedOperator {
            batches: vec![batch(), batch()],
            schema: schema(),
            opened: false,
            closed: false,
        });
        let mut executor = FragmentExecutor::create(
            FragmentInstanceId::generate(),
            op,
            Box::new(CountingSink {
                written: 0,
                finished: false,
            }),
            MemoryTracker::create_root("test", None),
            Arc::new(ProfileNode::create("fragment")),
        );
        executor.prepare().await.unwrap();
        executor.run().await.unwrap();
        assert_eq!(executor.state(), FragmentExecutorState::Finished);
    }

    #[tokio::test]
    async fn cancellation_observed_before_the_next_batch_unwinds_as_cancelled() {
        let op = Box::new(FixedOperator {
            batches: vec![batch(), batch(), batch()],
            schema: schema(),
            opened: false,
            closed: false,
        });
        let mut executor = FragmentExecutor::create(
            FragmentInstanceId::generate(),
            op,
            Box::new(CountingSink {
                written: 0,
                finished: false,
            }),
            MemoryTracker::create_root("test", None),
            Arc::new(ProfileNode::create("fragment")),
        );
        executor.prepare().await.unwrap();
        executor.cancel();
        let result = executor.run().await;
        assert!(result.is_err());
        assert_eq!(executor.state(), FragmentExecutorState::Cancelled);
    }

    #[tokio::test]
    async fn running_before_prepare_is_rejected() {
        let op = Box::new(FixedOperator {
            batches: vec![],
            schema: schema(),
            opened: false,
            closed: false,
        });
        let mut executor = FragmentExecutor::create(
            FragmentInstanceId::generate(),
            op,
            Box::new(CountingSink {
                written: 0,
                finished: false,
            }),
            MemoryTracker::create_root("test", None),
            Arc::new(ProfileNode::create("fragment")),
        );
        assert!(executor.run().await.is_err());
    }
}
