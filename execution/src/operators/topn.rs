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
use common_exception::Result;
use common_planners::Expr;

use crate::expr_eval::compare;
use crate::expr_eval::eval;
use crate::operator::BoxedOperator;
use crate::operator::Operator;

/// `ORDER BY ... LIMIT n`: keeps only the smallest `limit` rows seen so
/// far (ascending, NULLs last), re-sorting the retained set on every
/// insertion. `limit` is expected to be small (this is the plan the
/// planner picks specifically because a full sort would be wasteful),
/// so the O(limit) insertion cost this takes is the right tradeoff over
/// a heap.
pub struct TopNOperator {
    child: BoxedOperator,
    order_exprs: Vec<Expr>,
    limit: usize,
    output_schema: DataSchemaRef,
    retained: Vec<Vec<DataValue>>,
    emitted: bool,
}

impl TopNOperator {
    pub fn create(child: BoxedOperator, order_exprs: Vec<Expr>, limit: usize, output_schema: DataSchemaRef) -> Self {
        TopNOperator {
            child,
            order_exprs,
            limit,
            output_schema,
            retained: Vec::new(),
            emitted: false,
        }
    }

    fn key_cmp(&self, a: &[DataValue], b: &[DataValue]) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        for i in 0..self.order_exprs.len() {
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
impl Operator for TopNOperator {
    async fn prepare(&mut self) -> Result<()> {
        self.child.prepare().await
    }

    async fn open(&mut self) -> Result<()> {
        self.child.open().await?;
        let num_order = self.order_exprs.len();
        let num_columns = self.output_schema.num_columns();
        if self.limit == 0 {
            return Ok(());
        }
        while let Some(batch) = self.child.get_next().await? {
            for slot in 0..batch.num_rows() {
                let key: Vec<DataValue> = self.order_exprs.iter().map(|e| eval(e, &batch, slot)).collect();
                let row: Vec<DataValue> = (0..num_columns).map(|c| batch.get_value(slot, c)).collect();
                let mut combined = key;
                combined.extend(row);

                let pos = self
                    .retained
                    .binary_search_by(|existing| self.key_cmp(&existing[..num_order], &combined[..num_order]))
                    .unwrap_or_else(|i| i);
                self.retained.insert(pos, combined);
                if self.retained.len() > self.limit {
                    self.retained.truncate(self.limit);
                }
            }
        }
        Ok(())
    }

    async fn get_next(&mut self) -> Result<Option<RowBatch>> {
        if self.emitted || self.retained.is_empty() {
            return Ok(None);
        }
        self.emitted = true;
        let num_order = self.order_exprs.len();
        let num_columns = self.output_schema.num_columns();
        let mut batch = RowBatch::new(self.output_schema.clone(), self.retained.len(), usize::MAX);
        for combined in &self.retained {
            let slot = batch.allocate_tuple().expect("sized to retained.len()");
            for col in 0..num_columns {
                batch.set_column(slot, col, &combined[num_order + col])?;
            }
        }
        Ok(Some(batch))
    }

    async fn close(&mut self) -> Result<()> {
        self.retained.clear();
        self.child.close().await
    }

    fn output_schema(&self) -> &DataSchemaRef {
        &self.output_schema
    }

    fn name(&self) -> &'static str {
        "TopN"
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

    fn batch_with(values: &[i64]) -> RowBatch {
        let mut batch = RowBatch::new(schema(), values.len(), 0);
        for v in values {
            let s = batch.allocate_tuple().unwrap();
            batch.set_column(s, 0, &DataValue::Int64(Some(*v))).unwrap();
        }
        batch
    }

    #[tokio::test]
    async fn keeps_only_the_smallest_limit_rows() {
        let child = Box::new(FixedOperator {
            batches: vec![batch_with(&[9, 1, 8, 2, 7, 3])],
            schema: schema(),
        });
        let mut topn = TopNOperator::create(child, vec![Expr::Column(0)], 3, schema());
        topn.open().await.unwrap();
        let out = topn.get_next().await.unwrap().unwrap();
        assert_eq!(out.num_rows(), 3);
        assert_eq!(out.get_i64(0, 0), Some(1));
        assert_eq!(out.get_i64(1, 0), Some(2));
        assert_eq!(out.get_i64(2, 0), Some(3));
        assert!(topn.get_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn limit_zero_produces_no_rows() {
        let child = Box::new(FixedOperator {
            batches: vec![batch_with(&[1, 2])],
            schema: schema(),
        });
        let mut topn = TopNOperator::create(child, vec![Expr::Column(0)], 0, schema());
        topn.open().await.unwrap();
        assert!(topn.get_next().await.unwrap().is_none());
    }
}
