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

use std::cmp::Ordering;

use async_trait::async_trait;
use common_datablocks::RowBatch;
use common_datavalues::DataSchemaRef;
use common_datavalues::DataValue;
use common_exception::Result;
use common_planners::Expr;

use crate::expr_eval::compare;
use crate::expr_eval::eval;
use crate::operator::BoxedOperator;
use crate::operator::Operator;

fn key_cmp(a: &[DataValue], b: &[DataValue]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ordering = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => compare(x, y).unwrap_or(Ordering::Equal),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn keys_match(a: &[DataValue], b: &[DataValue]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| !x.is_null() && !y.is_null() && x == y)
}

struct Side {
    keys: Vec<Vec<DataValue>>,
    rows: Vec<Vec<DataValue>>,
}

/// Inner join over two inputs each already produced in ascending order
/// of their respective join keys — the planner only emits this node
/// below two sorted producers. Both sides are read fully in `open`
/// (their sortedness is the planner's contract, not re-checked here)
/// and walked with the classic merge-join two-cursor algorithm, cross
/// joining runs of equal keys on each side.
pub struct MergeJoinOperator {
    left_child: BoxedOperator,
    right_child: BoxedOperator,
    left_exprs: Vec<Expr>,
    right_exprs: Vec<Expr>,
    left_num_columns: usize,
    output_schema: DataSchemaRef,
    output_batch_size: usize,
    left: Side,
    right: Side,
    li: usize,
    ri: usize,
    pending: Vec<(usize, usize)>,
}

impl MergeJoinOperator {
    pub fn create(
        left_child: BoxedOperator,
        right_child: BoxedOperator,
        left_exprs: Vec<Expr>,
        right_exprs: Vec<Expr>,
        output_schema: DataSchemaRef,
        output_batch_size: usize,
    ) -> Self {
        let left_num_columns = left_child.output_schema().num_columns();
        MergeJoinOperator {
            left_child,
            right_child,
            left_exprs,
            right_exprs,
            left_num_columns,
            output_schema,
            output_batch_size,
            left: Side {
                keys: Vec::new(),
                rows: Vec::new(),
            },
            right: Side {
                keys: Vec::new(),
                rows: Vec::new(),
            },
            li: 0,
            ri: 0,
            pending: Vec::new(),
        }
    }

    fn advance_cursors(&mut self) {
        while self.pending.is_empty() && self.li < self.left.keys.len() && self.ri < self.right.keys.len() {
            match key_cmp(&self.left.keys[self.li], &self.right.keys[self.ri]) {
                Ordering::Less => self.li += 1,
                Ordering::Greater => self.ri += 1,
                Ordering::Equal => {
                    if !keys_match(&self.left.keys[self.li], &self.right.keys[self.ri]) {
                        // both NULL on this key component: never a match, advance the
                        // side with fewer remaining NULLs worth of run to make progress.
                        self.li += 1;
                        continue;
                    }
                    let key = self.left.keys[self.li].clone();
                    let left_run_end = self.left.keys[self.li..]
                        .iter()
                        .take_while(|k| keys_match(k, &key))
                        .count()
                        + self.li;
                    let right_run_end = self.right.keys[self.ri..]
                        .iter()
                        .take_while(|k| keys_match(k, &key))
                        .count()
                        + self.ri;
                    for l in self.li..left_run_end {
                        for r in self.ri..right_run_end {
                            self.pending.push((l, r));
                        }
                    }
                    self.li = left_run_end;
                    self.ri = right_run_end;
                }
            }
        }
    }

    fn drain_pending_into_batch(&mut self) -> Result<RowBatch> {
        let right_num_columns = self.output_schema.num_columns() - self.left_num_columns;
        let take = self.pending.len().min(self.output_batch_size);
        let mut batch = RowBatch::new(self.output_schema.clone(), take, usize::MAX);
        for (l, r) in self.pending.drain(..take) {
            let slot = batch.allocate_tuple().expect("sized to `take`");
            for col in 0..self.left_num_columns {
                batch.set_column(slot, col, &self.left.rows[l][col])?;
            }
            for col in 0..right_num_columns {
                batch.set_column(slot, self.left_num_columns + col, &self.right.rows[r][col])?;
            }
        }
        Ok(batch)
    }
}

#[async_trait]
impl Operator for MergeJoinOperator {
    async fn prepare(&mut self) -> Result<()> {
        self.left_child.prepare().await?;
        self.right_child.prepare().await
    }

    async fn open(&mut self) -> Result<()> {
        self.left_child.open().await?;
        while let Some(batch) = self.left_child.get_next().await? {
            for slot in 0..batch.num_rows() {
                self.left.keys.push(self.left_exprs.iter().map(|e| eval(e, &batch, slot)).collect());
                self.left
                    .rows
                    .push((0..self.left_num_columns).map(|c| batch.get_value(slot, c)).collect());
            }
        }
        self.left_child.close().await?;

        self.right_child.open().await?;
        let right_num_columns = self.output_schema.num_columns() - self.left_num_columns;
        while let Some(batch) = self.right_child.get_next().await? {
            for slot in 0..batch.num_rows() {
                self.right.keys.push(self.right_exprs.iter().map(|e| eval(e, &batch, slot)).collect());
                self.right
                    .rows
                    .push((0..right_num_columns).map(|c| batch.get_value(slot, c)).collect());
            }
        }
        Ok(())
    }

    async fn get_next(&mut self) -> Result<Option<RowBatch>> {
        loop {
            if !self.pending.is_empty() {
                return Ok(Some(self.drain_pending_into_batch()?));
            }
            if self.li >= self.left.keys.len() || self.ri >= self.right.keys.len() {
                return Ok(None);
            }
            self.advance_cursors();
            if self.pending.is_empty() {
                return Ok(None);
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.left.keys.clear();
        self.left.rows.clear();
        self.right.keys.clear();
        self.right.rows.clear();
        self.right_child.close().await
    }

    fn output_schema(&self) -> &DataSchemaRef {
        &self.output_schema
    }

    fn name(&self) -> &'static str {
        "MergeJoin"
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

    fn side_schema() -> DataSchemaRef {
        Arc::new(DataSchema::new(vec![
            DataField::new("key", DataType::Int64, true),
            DataField::new("val", DataType::Int64, true),
        ]))
    }

    fn output_schema() -> DataSchemaRef {
        Arc::new(DataSchema::new(vec![
            DataField::new("left_key", DataType::Int64, true),
            DataField::new("left_val", DataType::Int64, true),
            DataField::new("right_key", DataType::Int64, true),
            DataField::new("right_val", DataType::Int64, true),
        ]))
    }

    fn batch_with(rows: &[(i64, i64)]) -> RowBatch {
        let mut batch = RowBatch::new(side_schema(), rows.len(), 0);
        for (k, v) in rows {
            let s = batch.allocate_tuple().unwrap();
            batch.set_column(s, 0, &DataValue::Int64(Some(*k))).unwrap();
            batch.set_column(s, 1, &DataValue::Int64(Some(*v))).unwrap();
        }
        batch
    }

    #[tokio::test]
    async fn merges_sorted_sides_including_duplicate_keys() {
        let left = Box::new(FixedOperator {
            batches: vec![batch_with(&[(1, 10), (2, 20), (2, 21)])],
            schema: side_schema(),
        });
        let right = Box::new(FixedOperator {
            batches: vec![batch_with(&[(2, 200), (3, 300)])],
            schema: side_schema(),
        });
        let mut join = MergeJoinOperator::create(
            left,
            right,
            vec![Expr::Column(0)],
            vec![Expr::Column(0)],
            output_schema(),
            10,
        );
        join.open().await.unwrap();
        let out = join.get_next().await.unwrap().unwrap();
        assert_eq!(out.num_rows(), 2);
        let mut pairs: Vec<(i64, i64)> = (0..out.num_rows())
            .map(|i| (out.get_i64(i, 1).unwrap(), out.get_i64(i, 3).unwrap()))
            .collect();
        pairs.sort();
        assert_eq!(pairs, vec![(20, 200), (21, 200)]);
        assert!(join.get_next().await.unwrap().is_none());
    }
}
