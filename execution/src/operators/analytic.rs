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

fn tuple_cmp(a: &[DataValue], b: &[DataValue]) -> Ordering {
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

/// Windowed row numbering: partitions the fully-materialized input by
/// `partition_exprs`, orders each partition by `order_exprs`, and
/// appends a 1-based position-within-partition column after the input
/// columns. A blocking node, like `Sort` and `TopN`: the window isn't
/// known until every row of the partition has arrived.
pub struct AnalyticOperator {
    child: BoxedOperator,
    partition_exprs: Vec<Expr>,
    order_exprs: Vec<Expr>,
    input_num_columns: usize,
    output_schema: DataSchemaRef,
    output_batch_size: usize,
    rows: Vec<(Vec<DataValue>, Vec<DataValue>, Vec<DataValue>, i64)>,
    cursor: usize,
}

impl AnalyticOperator {
    pub fn create(
        child: BoxedOperator,
        partition_exprs: Vec<Expr>,
        order_exprs: Vec<Expr>,
        output_schema: DataSchemaRef,
        output_batch_size: usize,
    ) -> Self {
        let input_num_columns = child.output_schema().num_columns();
        AnalyticOperator {
            child,
            partition_exprs,
            order_exprs,
            input_num_columns,
            output_schema,
            output_batch_size,
            rows: Vec::new(),
            cursor: 0,
        }
    }
}

#[async_trait]
impl Operator for AnalyticOperator {
    async fn prepare(&mut self) -> Result<()> {
        self.child.prepare().await
    }

    async fn open(&mut self) -> Result<()> {
        self.child.open().await?;
        while let Some(batch) = self.child.get_next().await? {
            for slot in 0..batch.num_rows() {
                let partition_key: Vec<DataValue> =
                    self.partition_exprs.iter().map(|e| eval(e, &batch, slot)).collect();
                let order_key: Vec<DataValue> = self.order_exprs.iter().map(|e| eval(e, &batch, slot)).collect();
                let row: Vec<DataValue> = (0..self.input_num_columns).map(|c| batch.get_value(slot, c)).collect();
                self.rows.push((partition_key, order_key, row, 0));
            }
        }
        self.rows.sort_by(|a, b| tuple_cmp(&a.0, &b.0).then_with(|| tuple_cmp(&a.1, &b.1)));

        let mut position: i64 = 0;
        for i in 0..self.rows.len() {
            if i == 0 || tuple_cmp(&self.rows[i].0, &self.rows[i - 1].0) != Ordering::Equal {
                position = 1;
            } else {
                position += 1;
            }
            self.rows[i].3 = position;
        }
        Ok(())
    }

    async fn get_next(&mut self) -> Result<Option<RowBatch>> {
        if self.cursor >= self.rows.len() {
            return Ok(None);
        }
        let end = (self.cursor + self.output_batch_size).min(self.rows.len());
        let mut batch = RowBatch::new(self.output_schema.clone(), end - self.cursor, usize::MAX);
        for (_, _, row, position) in &self.rows[self.cursor..end] {
            let slot = batch.allocate_tuple().expect("sized to this chunk's length");
            for col in 0..self.input_num_columns {
                batch.set_column(slot, col, &row[col])?;
            }
            batch.set_column(slot, self.input_num_columns, &DataValue::Int64(Some(*position)))?;
        }
        self.cursor = end;
        Ok(Some(batch))
    }

    async fn close(&mut self) -> Result<()> {
        self.rows.clear();
        self.child.close().await
    }

    fn output_schema(&self) -> &DataSchemaRef {
        &self.output_schema
    }

    fn name(&self) -> &'static str {
        "Analytic"
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
            DataField::new("part", DataType::Int64, true),
            DataField::new("order", DataType::Int64, true),
        ]))
    }

    fn output_schema() -> DataSchemaRef {
        Arc::new(DataSchema::new(vec![
            DataField::new("part", DataType::Int64, true),
            DataField::new("order", DataType::Int64, true),
            DataField::new("rn", DataType::Int64, true),
        ]))
    }

    fn batch_with(rows: &[(i64, i64)]) -> RowBatch {
        let mut batch = RowBatch::new(input_schema(), rows.len(), 0);
        for (p, o) in rows {
            let s = batch.allocate_tuple().unwrap();
            batch.set_column(s, 0, &DataValue::Int64(Some(*p))).unwrap();
            batch.set_column(s, 1, &DataValue::Int64(Some(*o))).unwrap();
        }
        batch
    }

    #[tokio::test]
    async fn numbers_rows_within_each_partition_independently() {
        let child = Box::new(FixedOperator {
            batches: vec![batch_with(&[(1, 30), (1, 10), (2, 5), (1, 20)])],
            schema: input_schema(),
        });
        let mut op =
            AnalyticOperator::create(child, vec![Expr::Column(0)], vec![Expr::Column(1)], output_schema(), 10);
        op.open().await.unwrap();
        let out = op.get_next().await.unwrap().unwrap();
        assert_eq!(out.num_rows(), 4);

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
        assert_eq!(rows, vec![(1, 10, 1), (1, 20, 2), (1, 30, 3), (2, 5, 1)]);
    }
}
