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
use std::sync::Arc;
use std::time::Duration;

use common_exception::ErrorCode;
use common_exception::Result;
use common_exchange::ExchangeReceiver;
use common_memory::MemoryTrackerRef;
use common_planners::PlanNode;
use common_planners::PlanNodeId;
use common_planners::PlanNodeKind;

use crate::operator::BoxedOperator;
use crate::operators::aggregate::AggregateOperator;
use crate::operators::analytic::AnalyticOperator;
use crate::operators::exchange_receive::ExchangeReceiveOperator;
use crate::operators::hash_join::HashJoinOperator;
use crate::operators::merge_join::MergeJoinOperator;
use crate::operators::scan::BoxedScanSourceFactory;
use crate::operators::scan::ScanOperator;
use crate::operators::selection::SelectionOperator;
use crate::operators::sort::SortOperator;
use crate::operators::topn::TopNOperator;
use crate::operators::union::UnionOperator;

/// The executor's seam onto the (out-of-scope) file-format readers: one
/// factory closure per scan plan node id, each call producing a fresh
/// `ScanSource` for one scan range.
pub trait ScanSourceProvider: Send + Sync {
    fn make_source_factory(&self, node_id: PlanNodeId) -> BoxedScanSourceFactory;
}

/// Everything the factory needs that isn't carried on the plan tree
/// itself: the scan source seam, the exchange receivers this fragment
/// instance already had the `DataStreamManager` create for it (keyed by
/// the id of their `ExchangeReceive` plan node), and batching defaults.
pub struct FactoryContext {
    pub scan_source_provider: Arc<dyn ScanSourceProvider>,
    pub receivers: HashMap<PlanNodeId, Arc<ExchangeReceiver>>,
    pub batch_size: usize,
    pub arena_cap_bytes: usize,
    pub recv_timeout: Duration,
    /// Consulted by blocking operators (hash-join build side, sort,
    /// aggregate) as they materialize rows in `open`.
    pub memory_tracker: MemoryTrackerRef,
}

/// Recursively turns a `PlanNode` into the operator tree that executes
/// it. Predicates are pushed straight into `ScanOperator`; every other
/// node kind gets its own operator wrapped in a `SelectionOperator` when
/// it carries conjuncts, since filtering is the entire job of the
/// standalone `Selection` node kind and is otherwise orthogonal to what
/// each kind computes.
pub fn build_operator_tree(node: &PlanNode, ctx: &FactoryContext) -> Result<BoxedOperator> {
    let base: BoxedOperator = match &node.kind {
        PlanNodeKind::Scan { ranges, .. } => Box::new(ScanOperator::create(
            ranges.clone(),
            node.conjuncts.clone(),
            node.output_schema.clone(),
            ctx.scan_source_provider.make_source_factory(node.id),
        )),
        PlanNodeKind::Aggregate {
            group_exprs,
            aggregate_exprs,
            is_merge_finalize,
        } => {
            let child = build_operator_tree(require_child(node, 0)?, ctx)?;
            Box::new(AggregateOperator::create(
                child,
                group_exprs.clone(),
                aggregate_exprs.clone(),
                *is_merge_finalize,
                node.output_schema.clone(),
                ctx.batch_size,
                ctx.memory_tracker.clone(),
            ))
        }
        PlanNodeKind::HashJoin { build_exprs, probe_exprs } => {
            let build = build_operator_tree(require_child(node, 0)?, ctx)?;
            let probe = build_operator_tree(require_child(node, 1)?, ctx)?;
            Box::new(HashJoinOperator::create(
                build,
                probe,
                build_exprs.clone(),
                probe_exprs.clone(),
                node.output_schema.clone(),
                ctx.batch_size,
                ctx.memory_tracker.clone(),
            ))
        }
        PlanNodeKind::MergeJoin { left_exprs, right_exprs } => {
            let left = build_operator_tree(require_child(node, 0)?, ctx)?;
            let right = build_operator_tree(require_child(node, 1)?, ctx)?;
            Box::new(MergeJoinOperator::create(
                left,
                right,
                left_exprs.clone(),
                right_exprs.clone(),
                node.output_schema.clone(),
                ctx.batch_size,
            ))
        }
        PlanNodeKind::Union => {
            let children = node
                .children
                .iter()
                .map(|c| build_operator_tree(c, ctx))
                .collect::<Result<Vec<_>>>()?;
            Box::new(UnionOperator::create(children, node.output_schema.clone()))
        }
        PlanNodeKind::Sort { order_exprs } => {
            let child = build_operator_tree(require_child(node, 0)?, ctx)?;
            Box::new(SortOperator::create(
                child,
                order_exprs.clone(),
                node.output_schema.clone(),
                ctx.batch_size,
                ctx.memory_tracker.clone(),
            ))
        }
        PlanNodeKind::TopN { order_exprs, limit } => {
            let child = build_operator_tree(require_child(node, 0)?, ctx)?;
            Box::new(TopNOperator::create(
                child,
                order_exprs.clone(),
                *limit,
                node.output_schema.clone(),
            ))
        }
        PlanNodeKind::ExchangeReceive { .. } => {
            let receiver = ctx.receivers.get(&node.id).cloned().ok_or_else(|| {
                ErrorCode::InternalError(format!(
                    "no exchange receiver registered for plan node {} before building its operator",
                    node.id
                ))
            })?;
            Box::new(ExchangeReceiveOperator::create(
                receiver,
                node.output_schema.clone(),
                ctx.batch_size,
                ctx.arena_cap_bytes,
                ctx.recv_timeout,
            ))
        }
        PlanNodeKind::Selection => build_operator_tree(require_child(node, 0)?, ctx)?,
        PlanNodeKind::Analytic {
            partition_exprs,
            order_exprs,
        } => {
            let child = build_operator_tree(require_child(node, 0)?, ctx)?;
            Box::new(AnalyticOperator::create(
                child,
                partition_exprs.clone(),
                order_exprs.clone(),
                node.output_schema.clone(),
                ctx.batch_size,
            ))
        }
    };

    if node.conjuncts.is_empty() || matches!(node.kind, PlanNodeKind::Scan { .. }) {
        Ok(base)
    } else {
        Ok(Box::new(SelectionOperator::create(
            base,
            node.conjuncts.clone(),
            node.output_schema.clone(),
        )))
    }
}

fn require_child(node: &PlanNode, index: usize) -> Result<&PlanNode> {
    node.children.get(index).ok_or_else(|| {
        ErrorCode::InternalError(format!(
            "plan node {} ({}) is missing expected child {}",
            node.id,
            node.kind_name(),
            index
        ))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc as StdArc;

    use async_trait::async_trait;
    use common_datavalues::DataField;
    use common_datavalues::DataSchema;
    use common_datavalues::DataType;
    use common_datablocks::RowBatch;
    use common_planners::ScanRange;

    use super::*;
    use crate::operator::Operator;
    use crate::operators::scan::ScanSource;

    struct OneRowSource {
        served: bool,
    }

    #[async_trait]
    impl ScanSource for OneRowSource {
        async fn open(&mut self, _range: &ScanRange) -> Result<()> {
            Ok(())
        }
        async fn next_batch(&mut self) -> Result<Option<RowBatch>> {
            if self.served {
                return Ok(None);
            }
            self.served = true;
            let schema = StdArc::new(DataSchema::new(vec![DataField::new("a", DataType::Int64, true)]));
            let mut batch = RowBatch::new(schema, 1, 0);
            let s = batch.allocate_tuple().unwrap();
            batch
                .set_column(s, 0, &common_datavalues::DataValue::Int64(Some(5)))
                .unwrap();
            Ok(Some(batch))
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct TestProvider;

    impl ScanSourceProvider for TestProvider {
        fn make_source_factory(&self, _node_id: PlanNodeId) -> BoxedScanSourceFactory {
            Box::new(|| Box::new(OneRowSource { served: false }))
        }
    }

    fn schema() -> common_datavalues::DataSchemaRef {
        StdArc::new(DataSchema::new(vec![DataField::new("a", DataType::Int64, true)]))
    }

    #[tokio::test]
    async fn builds_a_scan_wrapped_in_nothing_when_conjuncts_are_empty() {
        let node = PlanNode {
            id: 1,
            kind: PlanNodeKind::Scan {
                ranges: vec![ScanRange::new("f1", 0, 10, vec![])],
                exec_at_coord: false,
            },
            children: vec![],
            conjuncts: vec![],
            output_schema: schema(),
        };
        let ctx = FactoryContext {
            scan_source_provider: StdArc::new(TestProvider),
            receivers: HashMap::new(),
            batch_size: 1024,
            arena_cap_bytes: 0,
            recv_timeout: Duration::from_millis(200),
            memory_tracker: common_memory::MemoryTracker::create_root("test", None),
        };
        let mut op = build_operator_tree(&node, &ctx).unwrap();
        op.open().await.unwrap();
        let batch = op.get_next().await.unwrap().unwrap();
        assert_eq!(batch.get_i64(0, 0), Some(5));
    }

    #[tokio::test]
    async fn a_missing_child_is_an_internal_error_not_a_panic() {
        let node = PlanNode {
            id: 1,
            kind: PlanNodeKind::Sort { order_exprs: vec![] },
            children: vec![],
            conjuncts: vec![],
            output_schema: schema(),
        };
        let ctx = FactoryContext {
            scan_source_provider: StdArc::new(TestProvider),
            receivers: HashMap::new(),
            batch_size: 1024,
            arena_cap_bytes: 0,
            recv_timeout: Duration::from_millis(200),
            memory_tracker: common_memory::MemoryTracker::create_root("test", None),
        };
        assert!(build_operator_tree(&node, &ctx).is_err());
    }
}
