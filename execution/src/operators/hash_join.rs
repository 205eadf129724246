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

use async_trait::async_trait;
use common_datablocks::RowBatch;
use common_datavalues::DataSchemaRef;
use common_datavalues::DataValue;
use common_exception::ErrorCode;
use common_exception::Result;
use common_memory::MemoryTrackerRef;
use common_planners::Expr;

use crate::expr_eval::eval;
use crate::operator::BoxedOperator;
use crate::operator::Operator;

/// A debug-formatted bucket key. `DataValue` carries no `Hash`/`Eq` impl
/// (it nests floats), so candidates are bucketed by their textual form
/// and confirmed with an exact per-component check once a bucket is
/// found — exactness lives in `keys_equal`, not in this key.
fn bucket_key(values: &[DataValue]) -> String {
    format!("{:?}", values)
}

fn keys_equal(a: &[DataValue], b: &[DataValue]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| !x.is_null() && !y.is_null() && x == y)
}

struct BuildRow {
    key: Vec<DataValue>,
    values: Vec<DataValue>,
}

/// Inner equi-join: the build side is read fully in `open` and hashed on
/// `build_exprs`, then every probe row is matched against its bucket and
/// exactly checked for equality. NULL key components never match,
/// matching standard SQL join semantics.
pub struct HashJoinOperator {
    build_child: BoxedOperator,
    probe_child: BoxedOperator,
    build_exprs: Vec<Expr>,
    probe_exprs: Vec<Expr>,
    build_num_columns: usize,
    output_schema: DataSchemaRef,
    output_batch_size: usize,
    build_rows: Vec<BuildRow>,
    buckets: HashMap<String, Vec<usize>>,
    pending: Vec<(usize, Vec<DataValue>)>,
    memory_tracker: MemoryTrackerRef,
    consumed_bytes: i64,
}

impl HashJoinOperator {
    pub fn create(
        build_child: BoxedOperator,
        probe_child: BoxedOperator,
        build_exprs: Vec<Expr>,
        probe_exprs: Vec<Expr>,
        output_schema: DataSchemaRef,
        output_batch_size: usize,
        memory_tracker: MemoryTrackerRef,
    ) -> Self {
        let build_num_columns = build_child.output_schema().num_columns();
        HashJoinOperator {
            build_child,
            probe_child,
            build_exprs,
            probe_exprs,
            build_num_columns,
            output_schema,
            output_batch_size,
            build_rows: Vec::new(),
            buckets: HashMap::new(),
            pending: Vec::new(),
            memory_tracker,
            consumed_bytes: 0,
        }
    }

    fn drain_pending_into_batch(&mut self) -> Result<RowBatch> {
        let probe_num_columns = self.output_schema.num_columns() - self.build_num_columns;
        let take = self.pending.len().min(self.output_batch_size);
        let mut batch = RowBatch::new(self.output_schema.clone(), take, usize::MAX);
        for (build_idx, probe_row) in self.pending.drain(..take) {
            let slot = batch.allocate_tuple().expect("sized to `take`");
            for col in 0..self.build_num_columns {
                batch.set_column(slot, col, &self.build_rows[build_idx].values[col])?;
            }
            for col in 0..probe_num_columns {
                batch.set_column(slot, self.build_num_columns + col, &probe_row[col])?;
            }
        }
        Ok(batch)
    }
}

#[async_trait]
impl Operator for HashJoinOperator {
    async fn prepare(&mut self) -> Result<()> {
        self.build_child.prepare().await?;
        self.probe_child.prepare().await
    }

    async fn open(&mut self) -> Result<()> {
        self.build_child.open().await?;
        while let Some(batch) = self.build_child.get_next().await? {
            let approx_bytes = batch.to_wire().len() as i64;
            if !self.memory_tracker.try_consume(approx_bytes) {
                return Err(ErrorCode::MemoryLimitExceeded(format!(
                    "hash-join build side exceeded the memory tracker's limit after buffering {} rows",
                    self.build_rows.len()
                )));
            }
            self.consumed_bytes += approx_bytes;
            for slot in 0..batch.num_rows() {
                let key: Vec<DataValue> = self.build_exprs.iter().map(|e| eval(e, &batch, slot)).collect();
                let values: Vec<DataValue> = (0..self.build_num_columns).map(|c| batch.get_value(slot, c)).collect();
                let idx = self.build_rows.len();
                self.buckets.entry(bucket_key(&key)).or_default().push(idx);
                self.build_rows.push(BuildRow { key, values });
            }
        }
        self.build_child.close().await?;
        self.probe_child.open().await
    }

    async fn get_next(&mut self) -> Result<Option<RowBatch>> {
        loop {
            if !self.pending.is_empty() {
                return Ok(Some(self.drain_pending_into_batch()?));
            }
            let batch = match self.probe_child.get_next().await? {
                Some(b) => b,
                None => return Ok(None),
            };
            let probe_num_columns = batch.schema().num_columns();
            for slot in 0..batch.num_rows() {
                let key: Vec<DataValue> = self.probe_exprs.iter().map(|e| eval(e, &batch, slot)).collect();
                if key.iter().any(|v| v.is_null()) {
                    continue;
                }
                if let Some(candidates) = self.buckets.get(&bucket_key(&key)) {
                    let probe_row: Vec<DataValue> =
                        (0..probe_num_columns).map(|c| batch.get_value(slot, c)).collect();
                    for &build_idx in candidates {
                        if keys_equal(&self.build_rows[build_idx].key, &key) {
                            self.pending.push((build_idx, probe_row.clone()));
                        }
                    }
                }
            }
            if !self.pending.is_empty() {
                return Ok(Some(self.drain_pending_into_batch()?));
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.build_rows.clear();
        self.buckets.clear();
        if self.consumed_bytes > 0 {
            self.memory_tracker.release(self.consumed_bytes);
            self.consumed_bytes = 0;
        }
        self.probe_child.close().await
    }

    fn output_schema(&self) -> &DataSchemaRef {
        &self.output_schema
    }

    fn name(&self) -> &'static str {
        "HashJoin"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common_datavalues::DataField;
    use common_datavalues::DataSchema;
    use common_datavalues::DataType;

    use super::*;

    struct FixedOperator {
        batches: Vec<RowBatch>,
        schema: DataSchemaRef,
    }

    #[async_trait]
    impl Operator for FixedOperator {
        async fn prepare(&mut self) -> Result<()> {
            Ok(())
        }
        async fn open(&mut self) -> Result<()> {
            Ok(())
        }
        async fn get_next(&mut self) -> Result<Option<RowBatch>> {
            Ok(self.batches.pop())
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
        fn output_schema(&self) -> &DataSchemaRef {
            &self.schema
        }
        fn name(&self) -> &'static str {
            "Fixed"
        }
    }

    fn side_schema(name: &str) -> DataSchemaRef {
        Arc::new(DataSchema::new(vec![
            DataField::new(&format!("{}_key", name), DataType::Int64, true),
            DataField::new(&format!("{}_val", name), DataType::Int64, true),
        ]))
    }

    fn output_schema() -> DataSchemaRef {
        Arc::new(DataSchema::new(vec![
            DataField::new("build_key", DataType::Int64, true),
            DataField::new("build_val", DataType::Int64, true),
            DataField::new("probe_key", DataType::Int64, true),
            DataField::new("probe_val", DataType::Int64, true),
        ]))
    }

    fn batch_with(schema: DataSchemaRef, rows: &[(Option<i64>, Option<i64>)]) -> RowBatch {
        let mut batch = RowBatch::new(schema, rows.len(), 0);
        for (k, v) in rows {
            let s = batch.allocate_tuple().unwrap();
            batch.set_column(s, 0, &DataValue::Int64(*k)).unwrap();
            batch.set_column(s, 1, &DataValue::Int64(*v)).unwrap();
        }
        batch
    }

    #[tokio::test]
    async fn matches_rows_with_equal_keys() {
        let build = Box::new(FixedOperator {
            batches: vec![batch_with(side_schema("build"), &[(Some(1), Some(100)), (Some(2), Some(200))])],
            schema: side_schema("build"),
        });
        let probe = Box::new(FixedOperator {
            batches: vec![batch_with(side_schema("probe"), &[(Some(2), Some(20)), (Some(3), Some(30))])],
            schema: side_schema("probe"),
        });
        let mut join = HashJoinOperator::create(
            build,
            probe,
            vec![Expr::Column(0)],
            vec![Expr::Column(0)],
            output_schema(),
            10,
            common_memory::MemoryTracker::create_root("test", None),
        );
        join.open().await.unwrap();
        let out = join.get_next().await.unwrap().unwrap();
        assert_eq!(out.num_rows(), 1);
        assert_eq!(out.get_i64(0, 0), Some(2));
        assert_eq!(out.get_i64(0, 1), Some(200));
        assert_eq!(out.get_i64(0, 2), Some(2));
        assert_eq!(out.get_i64(0, 3), Some(20));
    }

    #[tokio::test]
    async fn null_keys_never_match() {
        let build = Box::new(FixedOperator {
            batches: vec![batch_with(side_schema("build"), &[(None, Some(100))])],
            schema: side_schema("build"),
        });
        let probe = Box::new(FixedOperator {
            batches: vec![batch_with(side_schema("probe"), &[(None, Some(20))])],
            schema: side_schema("probe"),
        });
        let mut join = HashJoinOperator::create(
            build,
            probe,
            vec![Expr::Column(0)],
            vec![Expr::Column(0)],
            output_schema(),
            10,
            common_memory::MemoryTracker::create_root("test", None),
        );
        join.open().await.unwrap();
        assert!(join.get_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn build_side_over_the_memory_limit_fails_open_instead_of_buffering_unbounded() {
        let build = Box::new(FixedOperator {
            batches: vec![batch_with(side_schema("build"), &[(Some(1), Some(100)), (Some(2), Some(200))])],
            schema: side_schema("build"),
        });
        let probe = Box::new(FixedOperator {
            batches: vec![],
            schema: side_schema("probe"),
        });
        let tracker = common_memory::MemoryTracker::create_root("hash-join-build", Some(1));
        let mut join = HashJoinOperator::create(
            build,
            probe,
            vec![Expr::Column(0)],
            vec![Expr::Column(0)],
            output_schema(),
            10,
            tracker,
        );
        let result = join.open().await;
        assert!(matches!(result, Err(ErrorCode::MemoryLimitExceeded(_))));
    }
}
