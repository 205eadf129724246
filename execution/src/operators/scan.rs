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
use common_planners::ScanRange;

use crate::expr_eval::row_passes;
use crate::operator::Operator;

/// File-format reading is an external collaborator; this trait is the
/// seam the executor calls through instead of knowing about any
/// concrete format. One source instance is created per scan range.
#[async_trait]
pub trait ScanSource: Send {
    async fn open(&mut self, range: &ScanRange) -> Result<()>;

    /// Returns `None` once `range` is exhausted.
    async fn next_batch(&mut self) -> Result<Option<RowBatch>>;

    async fn close(&mut self) -> Result<()>;
}

pub type BoxedScanSourceFactory = Box<dyn Fn() -> Box<dyn ScanSource> + Send>;

/// Iterates a fragment instance's assigned scan ranges in order,
/// pulling batches from a fresh `ScanSource` per range and applying the
/// plan node's conjuncts before handing a batch upstream.
pub struct ScanOperator {
    ranges: Vec<ScanRange>,
    conjuncts: Vec<Expr>,
    output_schema: DataSchemaRef,
    make_source: BoxedScanSourceFactory,
    current_range: usize,
    current_source: Option<Box<dyn ScanSource>>,
}

impl ScanOperator {
    pub fn create(
        ranges: Vec<ScanRange>,
        conjuncts: Vec<Expr>,
        output_schema: DataSchemaRef,
        make_source: BoxedScanSourceFactory,
    ) -> Self {
        ScanOperator {
            ranges,
            conjuncts,
            output_schema,
            make_source,
            current_range: 0,
            current_source: None,
        }
    }

    fn filter(&self, batch: RowBatch) -> Result<RowBatch> {
        if self.conjuncts.is_empty() {
            return Ok(batch);
        }
        let num_columns = self.output_schema.num_columns();
        // Uncapped: we're only ever copying bytes already accepted by
        // the source batch's own arena cap, so this can't grow unbounded.
        let mut kept = RowBatch::new(self.output_schema.clone(), batch.num_rows().max(1), usize::MAX);
        for slot in 0..batch.num_rows() {
            if row_passes(&self.conjuncts, &batch, slot) {
                let dest = kept
                    .allocate_tuple()
                    .expect("dest batch sized to at least num_rows() of the source");
                for col in 0..num_columns {
                    kept.set_column(dest, col, &batch.get_value(slot, col))?;
                }
            }
        }
        Ok(kept)
    }
}

#[async_trait]
impl Operator for ScanOperator {
    async fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    async fn open(&mut self) -> Result<()> {
        if let Some(range) = self.ranges.first() {
            let mut source = (self.make_source)();
            source.open(range).await?;
            self.current_source = Some(source);
        }
        Ok(())
    }

    async fn get_next(&mut self) -> Result<Option<RowBatch>> {
        loop {
            let source = match self.current_source.as_mut() {
                Some(s) => s,
                None => return Ok(None),
            };
            match source.next_batch().await? {
                Some(batch) => return Ok(Some(self.filter(batch)?)),
                None => {
                    source.close().await?;
                    self.current_range += 1;
                    match self.ranges.get(self.current_range) {
                        Some(range) => {
                            let mut next = (self.make_source)();
                            next.open(range).await?;
                            self.current_source = Some(next);
                        }
                        None => {
                            self.current_source = None;
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut source) = self.current_source.take() {
            source.close().await?;
        }
        Ok(())
    }

    fn output_schema(&self) -> &DataSchemaRef {
        &self.output_schema
    }

    fn name(&self) -> &'static str {
        "Scan"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common_datavalues::DataField;
    use common_datavalues::DataSchema;
    use common_datavalues::DataType;
    use common_datavalues::DataValue;

    use super::*;

    struct OneBatchSource {
        served: bool,
    }

    #[async_trait]
    impl ScanSource for OneBatchSource {
        async fn open(&mut self, _range: &ScanRange) -> Result<()> {
            Ok(())
        }

        async fn next_batch(&mut self) -> Result<Option<RowBatch>> {
            if self.served {
                return Ok(None);
            }
            self.served = true;
            let schema = Arc::new(DataSchema::new(vec![DataField::new("a", DataType::Int64, true)]));
            let mut batch = RowBatch::new(schema, 2, 0);
            let s0 = batch.allocate_tuple().unwrap();
            batch.set_column(s0, 0, &DataValue::Int64(Some(1))).unwrap();
            let s1 = batch.allocate_tuple().unwrap();
            batch.set_column(s1, 0, &DataValue::Int64(Some(2))).unwrap();
            Ok(Some(batch))
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn schema() -> DataSchemaRef {
        Arc::new(DataSchema::new(vec![DataField::new("a", DataType::Int64, true)]))
    }

    #[tokio::test]
    async fn scan_walks_ranges_and_terminates() {
        let ranges = vec![ScanRange::new("f1", 0, 10, vec![])];
        let mut scan = ScanOperator::create(
            ranges,
            vec![],
            schema(),
            Box::new(|| Box::new(OneBatchSource { served: false })),
        );
        scan.prepare().await.unwrap();
        scan.open().await.unwrap();
        let batch = scan.get_next().await.unwrap().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert!(scan.get_next().await.unwrap().is_none());
        scan.close().await.unwrap();
    }

    #[tokio::test]
    async fn conjuncts_filter_rows() {
        let ranges = vec![ScanRange::new("f1", 0, 10, vec![])];
        let conjuncts = vec![Expr::BinaryOp {
            op: common_planners::BinaryOperator::Gt,
            left: Box::new(Expr::Column(0)),
            right: Box::new(Expr::Literal(common_planners::LiteralValue::Int64(1))),
        }];
        let mut scan = ScanOperator::create(
            ranges,
            conjuncts,
            schema(),
            Box::new(|| Box::new(OneBatchSource { served: false })),
        );
        scan.open().await.unwrap();
        let batch = scan.get_next().await.unwrap().unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.get_i64(0, 0), Some(2));
    }
}
