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

use async_trait::async_trait;
use common_datablocks::RowBatch;
use common_datavalues::DataSchemaRef;
use common_datavalues::DataValue;
use common_exception::ErrorCode;
use common_exception::Result;
use common_memory::MemoryTrackerRef;
use common_planners::Expr;

use crate::expr_eval::compare;
use crate::expr_eval::eval;
use crate::operator::BoxedOperator;
use crate::operator::Operator;

/// Fully materializes its child's output, sorts it by `order_exprs`
/// ascending with NULLs last, then replays it downstream one batch at
/// a time. A blocking node: `get_next` returns nothing until `open`
/// has drained and sorted the entire input.
pub struct SortOperator {
    child: BoxedOperator,
    order_exprs: Vec<Expr>,
    output_schema: DataSchemaRef,
    output_batch_size: usize,
    rows: Vec<Vec<DataValue>>,
    cursor: usize,
    memory_tracker: MemoryTrackerRef,
    consumed_bytes: i64,
}

impl SortOperator {
    pub fn create(
        child: BoxedOperator,
        order_exprs: Vec<Expr>,
        output_schema: DataSchemaRef,
        output_batch_size: usize,
        memory_tracker: MemoryTrackerRef,
    ) -> Self {
        SortOperator {
            child,
            order_exprs,
            output_schema,
            output_batch_size,
            rows: Vec::new(),
            cursor: 0,
            memory_tracker,
            consumed_bytes: 0,
        }
    }

    fn row_cmp(&self, a: &[DataValue], b: &[DataValue]) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        for (i, _) in self.order_exprs.iter().enumerate() {
            let ordering = match (a[i].is_null(), b[i].is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => compare(&a[i], &b[i]).unwrap_or(Ordering::Equal),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

#[async_trait]
impl Operator for SortOperator {
    async fn prepare(&mut self) -> Result<()> {
        self.child.prepare().await
    }

    async fn open(&mut self) -> Result<()> {
        self.child.open().await?;
        while let Some(batch) = self.child.get_next().await? {
            let approx_bytes = batch.to_wire().len() as i64;
            if !self.memory_tracker.try_consume(approx_bytes) {
                return Err(ErrorCode::MemoryLimitExceeded(format!(
                    "sort exceeded the memory tracker's limit after buffering {} rows",
                    self.rows.len()
                )));
            }
            self.consumed_bytes += approx_bytes;
            for slot in 0..batch.num_rows() {
                let key: Vec<DataValue> = self.order_exprs.iter().map(|e| eval(e, &batch, slot)).collect();
                let num_columns = self.output_schema.num_columns();
                let row: Vec<DataValue> = (0..num_columns).map(|c| batch.get_value(slot, c)).collect();
                // store key columns followed by the full row so the
                // comparator only ever looks at the leading slice.
                let mut combined = key;
                combined.extend(row);
                self.rows.push(combined);
            }
        }
        let num_order = self.order_exprs.len();
        self.rows.sort_by(|a, b| self.row_cmp(&a[..num_order], &b[..num_order]));
        Ok(())
    }

    async fn get_next(&mut self) -> Result<Option<RowBatch>> {
        if self.cursor >= self.rows.len() {
            return Ok(None);
        }
        let num_order = self.order_exprs.len();
        let num_columns = self.output_schema.num_columns();
        let end = (self.cursor + self.output_batch_size).min(self.rows.len());
        let mut batch = RowBatch::new(self.output_schema.clone(), end - self.cursor, usize::MAX);
        for combined in &self.rows[self.cursor..end] {
            let slot = batch.allocate_tuple().expect("sized to this chunk's length");
            for col in 0..num_columns {
                batch.set_column(slot, col, &combined[num_order + col])?;
            }
        }
        self.cursor = end;
        Ok(Some(batch))
    }

    async fn close(&mut self) -> Result<()> {
        self.rows.clear();
        if self.consumed_bytes > 0 {
            self.memory_tracker.release(self.consumed_bytes);
            self.consumed_bytes = 0;
        }
        self.child.close().await
    }

    fn output_schema(&self) -> &DataSchemaRef {
        &self.output_schema
    }

    fn name(&self) -> &'static str {
        "Sort"
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

    fn schema() -> DataSchemaRef {
        Arc::new(DataSchema::new(vec![DataField::new("a", DataType::Int64, true)]))
    }

    fn batch_with(values: &[Option<i64>]) -> RowBatch {
        let mut batch = RowBatch::new(schema(), values.len(), 0);
        for v in values {
            let s = batch.allocate_tuple().unwrap();
            batch.set_column(s, 0, &DataValue::Int64(*v)).unwrap();
        }
        batch
    }

    #[tokio::test]
    async fn sorts_ascending_with_nulls_last() {
        let child = Box::new(FixedOperator {
            batches: vec![batch_with(&[Some(3), None, Some(1), Some(2)])],
            schema: schema(),
        });
        let order = vec![Expr::Column(0)];
        let mut sort = SortOperator::create(child, order, schema(), 10, common_memory::MemoryTracker::create_root("test", None));
        sort.open().await.unwrap();
        let out = sort.get_next().await.unwrap().unwrap();
        assert_eq!(out.num_rows(), 4);
        assert_eq!(out.get_i64(0, 0), Some(1));
        assert_eq!(out.get_i64(1, 0), Some(2));
        assert_eq!(out.get_i64(2, 0), Some(3));
        assert_eq!(out.get_i64(3, 0), None);
    }

    #[tokio::test]
    async fn output_is_chunked_by_batch_size() {
        let child = Box::new(FixedOperator {
            batches: vec![batch_with(&[Some(1), Some(2), Some(3)])],
            schema: schema(),
        });
        let order = vec![Expr::Column(0)];
        let mut sort = SortOperator::create(child, order, schema(), 2, common_memory::MemoryTracker::create_root("test", None));
        sort.open().await.unwrap();
        let first = sort.get_next().await.unwrap().unwrap();
        let second = sort.get_next().await.unwrap().unwrap();
        assert_eq!(first.num_rows(), 2);
        assert_eq!(second.num_rows(), 1);
        assert!(sort.get_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn over_the_memory_limit_fails_open_instead_of_buffering_unbounded() {
        let child = Box::new(FixedOperator {
            batches: vec![batch_with(&[Some(3), Some(1), Some(2)])],
            schema: schema(),
        });
        let order = vec![Expr::Column(0)];
        let tracker = common_memory::MemoryTracker::create_root("sort", Some(1));
        let mut sort = SortOperator::create(child, order, schema(), 10, tracker);
        let result = sort.open().await;
        assert!(matches!(result, Err(ErrorCode::MemoryLimitExceeded(_))));
    }
}
