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

use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use async_trait::async_trait;
use common_datablocks::RowBatch;
use common_datavalues::DataSchemaRef;
use common_datavalues::DataValue;
use common_exception::Result;
use common_exchange::ExchangeTransport;
use common_exchange::RetryPolicy;
use common_planners::Expr;

use crate::expr_eval::eval;

/// What a fragment's root operator hands its batches to. `write` takes
/// ownership of a produced batch; `finish` signals end-of-stream to
/// every destination and is called exactly once after the operator
/// tree is exhausted.
#[async_trait]
pub trait Sink: Send {
    async fn write(&mut self, batch: RowBatch) -> Result<()>;

    async fn finish(&mut self) -> Result<()>;
}

pub type BoxedSink = Box<dyn Sink>;

struct Destination {
    transport: Arc<dyn ExchangeTransport>,
    next_seq: u64,
}

impl Destination {
    fn new(transport: Arc<dyn ExchangeTransport>) -> Self {
        Destination { transport, next_seq: 1 }
    }

    async fn transmit(&mut self, sender_index: u32, bytes: &[u8], policy: RetryPolicy) -> Result<()> {
        let seq = self.next_seq;
        self.next_seq += 1;
        common_exchange::retrying_transmit(self.transport.as_ref(), sender_index, seq, bytes, policy).await
    }

    async fn finish(&self, sender_index: u32) -> Result<()> {
        self.transport.transmit_eos(sender_index).await
    }
}

/// Sends every batch to every destination unmodified. Used for
/// broadcast-join build sides and small dimension scans.
pub struct BroadcastSink {
    destinations: Vec<Destination>,
    sender_index: u32,
    retry_policy: RetryPolicy,
}

impl BroadcastSink {
    pub fn create(transports: Vec<Arc<dyn ExchangeTransport>>, sender_index: u32) -> Self {
        BroadcastSink {
            destinations: transports.into_iter().map(Destination::new).collect(),
            sender_index,
            retry_policy: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl Sink for BroadcastSink {
    async fn write(&mut self, batch: RowBatch) -> Result<()> {
        let bytes = batch.to_wire();
        for dest in &mut self.destinations {
            dest.transmit(self.sender_index, &bytes, self.retry_policy).await?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        for dest in &self.destinations {
            dest.finish(self.sender_index).await?;
        }
        Ok(())
    }
}

/// Forwards every batch to the sole destination instance unmodified.
pub struct UnpartitionedSink {
    destination: Destination,
    sender_index: u32,
    retry_policy: RetryPolicy,
}

impl UnpartitionedSink {
    pub fn create(transport: Arc<dyn ExchangeTransport>, sender_index: u32) -> Self {
        UnpartitionedSink {
            destination: Destination::new(transport),
            sender_index,
            retry_policy: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl Sink for UnpartitionedSink {
    async fn write(&mut self, batch: RowBatch) -> Result<()> {
        let bytes = batch.to_wire();
        self.destination.transmit(self.sender_index, &bytes, self.retry_policy).await
    }

    async fn finish(&mut self) -> Result<()> {
        self.destination.finish(self.sender_index).await
    }
}

fn hash_bucket(key: &[DataValue], num_buckets: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    for value in key {
        format!("{:?}", value).hash(&mut hasher);
    }
    (hasher.finish() as usize) % num_buckets.max(1)
}

/// Splits each incoming batch by `partition_exprs` hashed mod the
/// destination count, shipping each destination only the rows that
/// hash to it. Column-for-column identical to the input schema: this
/// sink repartitions rows, it never projects them.
pub struct HashPartitionedSink {
    destinations: Vec<Destination>,
    partition_exprs: Vec<Expr>,
    output_schema: DataSchemaRef,
    sender_index: u32,
    retry_policy: RetryPolicy,
}

impl HashPartitionedSink {
    pub fn create(
        transports: Vec<Arc<dyn ExchangeTransport>>,
        partition_exprs: Vec<Expr>,
        output_schema: DataSchemaRef,
        sender_index: u32,
    ) -> Self {
        HashPartitionedSink {
            destinations: transports.into_iter().map(Destination::new).collect(),
            partition_exprs,
            output_schema,
            sender_index,
            retry_policy: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl Sink for HashPartitionedSink {
    async fn write(&mut self, batch: RowBatch) -> Result<()> {
        let num_columns = self.output_schema.num_columns();
        let num_destinations = self.destinations.len();
        let mut by_bucket: Vec<RowBatch> = (0..num_destinations)
            .map(|_| RowBatch::new(self.output_schema.clone(), batch.num_rows().max(1), usize::MAX))
            .collect();

        for slot in 0..batch.num_rows() {
            let key: Vec<DataValue> = self.partition_exprs.iter().map(|e| eval(e, &batch, slot)).collect();
            let bucket = hash_bucket(&key, num_destinations);
            let dest_slot = by_bucket[bucket]
                .allocate_tuple()
                .expect("dest batch sized to at least num_rows() of the source");
            for col in 0..num_columns {
                by_bucket[bucket].set_column(dest_slot, col, &batch.get_value(slot, col))?;
            }
        }

        for (bucket, dest_batch) in by_bucket.into_iter().enumerate() {
            if dest_batch.num_rows() == 0 {
                continue;
            }
            let bytes = dest_batch.to_wire();
            self.destinations[bucket]
                .transmit(self.sender_index, &bytes, self.retry_policy)
                .await?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        for dest in &self.destinations {
            dest.finish(self.sender_index).await?;
        }
        Ok(())
    }
}

/// Hands batches directly to the coordinator-local `QueryExecState`
/// rather than through the exchange fabric: the root fragment of every
/// query runs at the coordinator and its output is this sink.
pub struct ResultSink {
    sender: tokio::sync::mpsc::UnboundedSender<RowBatch>,
}

impl ResultSink {
    pub fn create(sender: tokio::sync::mpsc::UnboundedSender<RowBatch>) -> Self {
        ResultSink { sender }
    }
}

#[async_trait]
impl Sink for ResultSink {
    async fn write(&mut self, batch: RowBatch) -> Result<()> {
        self.sender
            .send(batch)
            .map_err(|_| common_exception::ErrorCode::ReceiverClosed("result channel closed".into()))
    }

    async fn finish(&mut self) -> Result<()> {
        // dropping the sender (on operator teardown) signals EOS to the
        // receiving QueryExecState; nothing to send here.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    use common_datavalues::DataField;
    use common_datavalues::DataSchema;

    use super::*;

    struct RecordingTransport {
        batches: Mutex<Vec<Vec<u8>>>,
        eos_count: AtomicUsize,
    }

    impl RecordingTransport {
        fn new() -> Self {
            RecordingTransport {
                batches: Mutex::new(Vec::new()),
                eos_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ExchangeTransport for RecordingTransport {
        async fn transmit_batch(&self, _sender_index: u32, _seq: u64, batch_bytes: &[u8]) -> Result<()> {
            self.batches.lock().unwrap().push(batch_bytes.to_vec());
            Ok(())
        }

        async fn transmit_eos(&self, _sender_index: u32) -> Result<()> {
            self.eos_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn schema() -> DataSchemaRef {
        Arc::new(DataSchema::new(vec![DataField::new(
            "a",
            common_datavalues::DataType::Int64,
            true,
        )]))
    }

    fn batch_with(values: &[i64]) -> RowBatch {
        let mut batch = RowBatch::new(schema(), values.len(), 0);
        for v in values {
            let s = batch.allocate_tuple().unwrap();
            batch.set_column(s, 0, &DataValue::Int64(Some(*v))).unwrap();
        }
        batch
    }

    #[tokio::test]
    async fn broadcast_sink_sends_every_batch_to_every_destination() {
        let a = Arc::new(RecordingTransport::new());
        let b = Arc::new(RecordingTransport::new());
        let mut sink = BroadcastSink::create(vec![a.clone(), b.clone()], 0);
        sink.write(batch_with(&[1, 2])).await.unwrap();
        sink.finish().await.unwrap();
        assert_eq!(a.batches.lock().unwrap().len(), 1);
        assert_eq!(b.batches.lock().unwrap().len(), 1);
        assert_eq!(a.eos_count.load(Ordering::SeqCst), 1);
        assert_eq!(b.eos_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hash_partitioned_sink_splits_rows_deterministically() {
        let a = Arc::new(RecordingTransport::new());
        let b = Arc::new(RecordingTransport::new());
        let mut sink =
            HashPartitionedSink::create(vec![a.clone(), b.clone()], vec![Expr::Column(0)], schema(), 0);
        sink.write(batch_with(&[1, 2, 3, 4, 5])).await.unwrap();
        sink.finish().await.unwrap();
        let total: usize = a.batches.lock().unwrap().iter().map(|b| b.len()).count()
            + b.batches.lock().unwrap().iter().map(|b| b.len()).count();
        assert!(total > 0);
        // re-running the same input produces the same split (determinism).
        let mut sink2 =
            HashPartitionedSink::create(vec![a.clone(), b.clone()], vec![Expr::Column(0)], schema(), 0);
        sink2.write(batch_with(&[1, 2, 3, 4, 5])).await.unwrap();
        assert_eq!(a.batches.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn result_sink_forwards_batches_over_the_channel() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut sink = ResultSink::create(tx);
        sink.write(batch_with(&[7])).await.unwrap();
        sink.finish().await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.get_i64(0, 0), Some(7));
    }
}
