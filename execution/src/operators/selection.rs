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
use common_exception::Result;
use common_planners::Expr;

use crate::expr_eval::row_passes;
use crate::operator::BoxedOperator;
use crate::operator::Operator;

/// Applies `conjuncts` to every batch its child produces. Distinct from
/// a scan node's own conjuncts (which the scan applies inline) — this
/// is the standalone `Selection` plan node used for predicates pushed
/// below a blocking operator rather than down into a scan.
pub struct SelectionOperator {
    child: BoxedOperator,
    conjuncts: Vec<Expr>,
    output_schema: DataSchemaRef,
}

impl SelectionOperator {
    pub fn create(child: BoxedOperator, conjuncts: Vec<Expr>, output_schema: DataSchemaRef) -> Self {
        SelectionOperator {
            child,
            conjuncts,
            output_schema,
        }
    }
}

#[async_trait]
impl Operator for SelectionOperator {
    async fn prepare(&mut self) -> Result<()> {
        self.child.prepare().await
    }

    async fn open(&mut self) -> Result<()> {
        self.child.open().await
    }

    async fn get_next(&mut self) -> Result<Option<RowBatch>> {
        loop {
            let batch = match self.child.get_next().await? {
                Some(b) => b,
                None => return Ok(None),
            };
            let num_columns = self.output_schema.num_columns();
            let mut kept = RowBatch::new(self.output_schema.clone(), batch.num_rows().max(1), usize::MAX);
            for slot in 0..batch.num_rows() {
                if row_passes(&self.conjuncts, &batch, slot) {
                    let dest = kept.allocate_tuple().expect("bounded by source num_rows()");
                    for col in 0..num_columns {
                        kept.set_column(dest, col, &batch.get_value(slot, col))?;
                    }
                }
            }
            if kept.num_rows() > 0 {
                return Ok(Some(kept));
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.child.close().await
    }

    fn output_schema(&self) -> &DataSchemaRef {
        &self.output_schema
    }

    fn name(&self) -> &'static str {
        "Selection"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common_datavalues::DataField;
    use common_datavalues::DataSchema;
    use common_datavalues::DataType;
    use common_datavalues::DataValue;
    use common_planners::BinaryOperator;
    use common_planners::LiteralValue;

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
    async fn rows_failing_the_predicate_are_dropped() {
        let child = Box::new(FixedOperator {
            batches: vec![batch_with(&[1, 5, 10])],
            schema: schema(),
        });
        let conjuncts = vec![Expr::BinaryOp {
            op: BinaryOperator::Gt,
            left: Box::new(Expr::Column(0)),
            right: Box::new(Expr::Literal(LiteralValue::Int64(3))),
        }];
        let mut sel = SelectionOperator::create(child, conjuncts, schema());
        let out = sel.get_next().await.unwrap().unwrap();
        assert_eq!(out.num_rows(), 2);
        assert_eq!(out.get_i64(0, 0), Some(5));
        assert_eq!(out.get_i64(1, 0), Some(10));
    }

    #[tokio::test]
    async fn an_all_rejected_batch_is_skipped_rather_than_returned_empty() {
        let child = Box::new(FixedOperator {
            batches: vec![batch_with(&[1])],
            schema: schema(),
        });
        let conjuncts = vec![Expr::BinaryOp {
            op: BinaryOperator::Gt,
            left: Box::new(Expr::Column(0)),
            right: Box::new(Expr::Literal(LiteralValue::Int64(100))),
        }];
        let mut sel = SelectionOperator::create(child, conjuncts, schema());
        assert!(sel.get_next().await.unwrap().is_none());
    }
}
