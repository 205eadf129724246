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
use common_planners::AggregateFunction;
use common_planners::Expr;

use crate::expr_eval::compare;
use crate::expr_eval::eval;
use crate::operator::BoxedOperator;
use crate::operator::Operator;

struct GroupState {
    key: Vec<DataValue>,
    /// One slot per `aggregate_exprs` entry. `Count` tracks its running
    /// total directly so it never has to borrow a type from the values
    /// it's counting; `Sum`/`Min`/`Max` adopt the type of the first
    /// non-null value they see and stay `None` (propagating as NULL)
    /// until then.
    counts: Vec<i64>,
    values: Vec<Option<DataValue>>,
}

/// `GROUP BY group_exprs, aggregate_exprs`. `is_merge_finalize` marks
/// the coordinator-side instance of a two-phase aggregation: its input
/// rows already hold per-worker partial states (for `Count`, a partial
/// count rather than one row per original tuple), so `Count` sums
/// those partials instead of counting input rows. `Sum`/`Min`/`Max` are
/// the same operation whether applied to raw values or partials.
pub struct AggregateOperator {
    child: BoxedOperator,
    group_exprs: Vec<Expr>,
    aggregate_exprs: Vec<(AggregateFunction, Expr)>,
    is_merge_finalize: bool,
    output_schema: DataSchemaRef,
    output_batch_size: usize,
    groups: Vec<GroupState>,
    cursor: usize,
    memory_tracker: MemoryTrackerRef,
    consumed_bytes: i64,
}

impl AggregateOperator {
    pub fn create(
        child: BoxedOperator,
        group_exprs: Vec<Expr>,
        aggregate_exprs: Vec<(AggregateFunction, Expr)>,
        is_merge_finalize: bool,
        output_schema: DataSchemaRef,
        output_batch_size: usize,
        memory_tracker: MemoryTrackerRef,
    ) -> Self {
        AggregateOperator {
            child,
            group_exprs,
            aggregate_exprs,
            is_merge_finalize,
            output_schema,
            output_batch_size,
            groups: Vec::new(),
            cursor: 0,
            memory_tracker,
            consumed_bytes: 0,
        }
    }

    fn find_or_insert_group(&mut self, key: &[DataValue]) -> usize {
        if let Some(pos) = self.groups.iter().position(|g| group_key_eq(&g.key, key)) {
            return pos;
        }
        self.groups.push(GroupState {
            key: key.to_vec(),
            counts: vec![0; self.aggregate_exprs.len()],
            values: vec![None; self.aggregate_exprs.len()],
        });
        self.groups.len() - 1
    }

    fn accumulate(&mut self, group_idx: usize, batch: &RowBatch, slot: usize) {
        let aggregate_exprs = &self.aggregate_exprs;
        let is_merge_finalize = self.is_merge_finalize;
        let group = &mut self.groups[group_idx];
        for (i, (func, expr)) in aggregate_exprs.iter().enumerate() {
            let value = eval(expr, batch, slot);
            match func {
                AggregateFunction::Count => {
                    if is_merge_finalize {
                        if let DataValue::Int64(Some(partial)) = &value {
                            group.counts[i] += partial;
                        }
                    } else if !value.is_null() {
                        group.counts[i] += 1;
                    }
                }
                AggregateFunction::Sum => {
                    if !value.is_null() {
                        group.values[i] = Some(match &group.values[i] {
                            Some(existing) => existing.wrapping_add(&value),
                            None => value,
                        });
                    }
                }
                AggregateFunction::Min => {
                    if !value.is_null() {
                        group.values[i] = Some(match &group.values[i] {
                            Some(existing) if compare(existing, &value) == Some(std::cmp::Ordering::Less) => {
                                existing.clone()
                            }
                            _ => value,
                        });
                    }
                }
                AggregateFunction::Max => {
                    if !value.is_null() {
                        group.values[i] = Some(match &group.values[i] {
                            Some(existing) if compare(existing, &value) == Some(std::cmp::Ordering::Greater) => {
                                existing.clone()
                            }
                            _ => value,
                        });
                    }
                }
            }
        }
    }
}

fn group_key_eq(a: &[DataValue], b: &[DataValue]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b.iter()).all(|(x, y)| match (x.is_null(), y.is_null()) {
            (true, true) => true,
            (false, false) => compare(x, y) == Some(std::cmp::Ordering::Equal),
            _ => false,
        })
}

#[async_trait]
impl Operator for AggregateOperator {
    async fn prepare(&mut self) -> Result<()> {
        self.child.prepare().await
    }

    async fn open(&mut self) -> Result<()> {
        self.child.open().await?;
        while let Some(batch) = self.child.get_next().await? {
            let approx_bytes = batch.to_wire().len() as i64;
            if !self.memory_tracker.try_consume(approx_bytes) {
                return Err(ErrorCode::MemoryLimitExceeded(format!(
                    "aggregate exceeded the memory tracker's limit after buffering {} groups",
                    self.groups.len()
                )));
            }
            self.consumed_bytes += approx_bytes;
            for slot in 0..batch.num_rows() {
                let key: Vec<DataValue> = self.group_exprs.iter().map(|e| eval(e, &batch, slot)).collect();
                let group_idx = self.find_or_insert_group(&key);
                self.accumulate(group_idx, &batch, slot);
            }
        }
        Ok(())
    }

    async fn get_next(&mut self) -> Result<Option<RowBatch>> {
        if self.cursor >= self.groups.len() {
            return Ok(None);
        }
        let num_group = self.group_exprs.len();
        let chunk_end = (self.cursor + self.output_batch_size).min(self.groups.len());
        let mut batch = RowBatch::new(self.output_schema.clone(), chunk_end - self.cursor, usize::MAX);
        for group in &self.groups[self.cursor..chunk_end] {
            let slot = batch.allocate_tuple().expect("sized to remaining groups");
            for (i, v) in group.key.iter().enumerate() {
                batch.set_column(slot, i, v)?;
            }
            for (i, (func, _)) in self.aggregate_exprs.iter().enumerate() {
                let value = match func {
                    AggregateFunction::Count => DataValue::Int64(Some(group.counts[i])),
                    _ => group.values[i].clone().unwrap_or(DataValue::Int64(None)),
                };
                batch.set_column(slot, num_group + i, &value)?;
            }
        }
        self.cursor = chunk_end;
        Ok(Some(batch))
    }

    async fn close(&mut self) -> Result<()> {
        self.groups.clear();
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
        "Aggregate"
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

    fn input_schema() -> DataSchemaRef {
        Arc::new(DataSchema::new(vec![
            DataField::new("group", DataType::Int64, true),
            DataField::new("value", DataType::Int64, true),
        ]))
    }

    fn output_schema() -> DataSchemaRef {
        Arc::new(DataSchema::new(vec![
            DataField::new("group", DataType::Int64, true),
            DataField::new("count", DataType::Int64, true),
            DataField::new("sum", DataType::Int64, true),
        ]))
    }

    fn batch_with(rows: &[(i64, i64)]) -> RowBatch {
        let mut batch = RowBatch::new(input_schema(), rows.len(), 0);
        for (g, v) in rows {
            let s = batch.allocate_tuple().unwrap();
            batch.set_column(s, 0, &DataValue::Int64(Some(*g))).unwrap();
            batch.set_column(s, 1, &DataValue::Int64(Some(*v))).unwrap();
        }
        batch
    }

    #[tokio::test]
    async fn groups_and_aggregates_count_and_sum() {
        let child = Box::new(FixedOperator {
            batches: vec![batch_with(&[(1, 10), (2, 5), (1, 20)])],
            schema: input_schema(),
        });
        let mut agg = AggregateOperator::create(
            child,
            vec![Expr::Column(0)],
            vec![
                (AggregateFunction::Count, Expr::Column(1)),
                (AggregateFunction::Sum, Expr::Column(1)),
            ],
            false,
            output_schema(),
            1024,
            common_memory::MemoryTracker::create_root("test", None),
        );
        agg.open().await.unwrap();
        let out = agg.get_next().await.unwrap().unwrap();
        assert_eq!(out.num_rows(), 2);

        let mut rows: Vec<(i64, i64, i64)> = (0..out.num_rows())
            .map(|i| {
                (
                    out.get_i64(i, 0).unwrap(),
                    out.get_i64(i, 1).unwrap(),
                    out.get_i64(i, 2).unwrap(),
                )
            })
            .collect();
        rows.sort();
        assert_eq!(rows, vec![(1, 2, 30), (2, 1, 5)]);
    }

    #[tokio::test]
    async fn merge_finalize_sums_partial_counts_instead_of_counting_rows() {
        let child = Box::new(FixedOperator {
            batches: vec![batch_with(&[(1, 3), (1, 4)])],
            schema: input_schema(),
        });
        let mut agg = AggregateOperator::create(
            child,
            vec![Expr::Column(0)],
            vec![(AggregateFunction::Count, Expr::Column(1))],
            true,
            Arc::new(DataSchema::new(vec![
                DataField::new("group", DataType::Int64, true),
                DataField::new("count", DataType::Int64, true),
            ])),
            1024,
            common_memory::MemoryTracker::create_root("test", None),
        );
        agg.open().await.unwrap();
        let out = agg.get_next().await.unwrap().unwrap();
        assert_eq!(out.num_rows(), 1);
        assert_eq!(out.get_i64(0, 1), Some(7));
    }

    #[tokio::test]
    async fn sum_with_no_non_null_values_is_null() {
        let mut batch = RowBatch::new(input_schema(), 1, 0);
        let s = batch.allocate_tuple().unwrap();
        batch.set_column(s, 0, &DataValue::Int64(Some(1))).unwrap();
        batch.set_column(s, 1, &DataValue::Int64(None)).unwrap();
        let child = Box::new(FixedOperator {
            batches: vec![batch],
            schema: input_schema(),
        });
        let mut agg = AggregateOperator::create(
            child,
            vec![Expr::Column(0)],
            vec![(AggregateFunction::Sum, Expr::Column(1))],
            false,
            Arc::new(DataSchema::new(vec![
                DataField::new("group", DataType::Int64, true),
                DataField::new("sum", DataType::Int64, true),
            ])),
            1024,
            common_memory::MemoryTracker::create_root("test", None),
        );
        agg.open().await.unwrap();
        let out = agg.get_next().await.unwrap().unwrap();
        assert_eq!(out.get_i64(0, 1), None);
    }

    #[tokio::test]
    async fn output_is_chunked_by_batch_size() {
        let child = Box::new(FixedOperator {
            batches: vec![batch_with(&[(1, 1), (2, 1), (3, 1)])],
            schema: input_schema(),
        });
        let mut agg = AggregateOperator::create(
            child,
            vec![Expr::Column(0)],
            vec![(AggregateFunction::Count, Expr::Column(1))],
            false,
            Arc::new(DataSchema::new(vec![
                DataField::new("group", DataType::Int64, true),
                DataField::new("count", DataType::Int64, true),
            ])),
            2,
            common_memory::MemoryTracker::create_root("test", None),
        );
        agg.open().await.unwrap();
        let first = agg.get_next().await.unwrap().unwrap();
        let second = agg.get_next().await.unwrap().unwrap();
        assert_eq!(first.num_rows(), 2);
        assert_eq!(second.num_rows(), 1);
        assert!(agg.get_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn over_the_memory_limit_fails_open_instead_of_buffering_unbounded() {
        let child = Box::new(FixedOperator {
            batches: vec![batch_with(&[(1, 10), (2, 5), (1, 20)])],
            schema: input_schema(),
        });
        let tracker = common_memory::MemoryTracker::create_root("aggregate", Some(1));
        let mut agg = AggregateOperator::create(
            child,
            vec![Expr::Column(0)],
            vec![
                (AggregateFunction::Count, Expr::Column(1)),
                (AggregateFunction::Sum, Expr::Column(1)),
            ],
            false,
            output_schema(),
            1024,
            tracker,
        );
        let result = agg.open().await;
        assert!(matches!(result, Err(ErrorCode::MemoryLimitExceeded(_))));
    }
}
