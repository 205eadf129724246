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

use common_datavalues::DataSchemaRef;
use serde::Deserialize;
use serde::Serialize;

use crate::expr::AggregateFunction;
use crate::expr::Expr;
use crate::scan_range::ScanRange;

pub type PlanNodeId = u32;

/// A plan node, tagged by kind, owning its children by value. Deep
/// class hierarchies in the source system collapse to this single
/// shape; the iterator contract (`prepare/open/get_next/close`) is
/// implemented per kind by the executor crate, not by this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: PlanNodeId,
    pub kind: PlanNodeKind,
    pub children: Vec<PlanNode>,
    /// Conjunctive predicates evaluated after this node produces a row;
    /// a row survives only if every conjunct is true.
    pub conjuncts: Vec<Expr>,
    pub output_schema: DataSchemaRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlanNodeKind {
    Scan {
        ranges: Vec<ScanRange>,
        exec_at_coord: bool,
    },
    Aggregate {
        group_exprs: Vec<Expr>,
        aggregate_exprs: Vec<(AggregateFunction, Expr)>,
        /// Set on the coordinator-side instance of a two-phase
        /// aggregation: merge partial states instead of computing them
        /// from scratch, then finalize.
        is_merge_finalize: bool,
    },
    HashJoin {
        build_exprs: Vec<Expr>,
        probe_exprs: Vec<Expr>,
    },
    MergeJoin {
        left_exprs: Vec<Expr>,
        right_exprs: Vec<Expr>,
    },
    Union,
    Sort {
        order_exprs: Vec<Expr>,
    },
    TopN {
        order_exprs: Vec<Expr>,
        limit: usize,
    },
    ExchangeReceive {
        input_schemas: Vec<DataSchemaRef>,
    },
    Selection,
    Analytic {
        partition_exprs: Vec<Expr>,
        order_exprs: Vec<Expr>,
    },
}

impl PlanNode {
    /// A node is blocking iff it must fully consume at least one input
    /// before producing output. The planner cuts fragment boundaries at
    /// these nodes; the executor relies on the invariant that a
    /// blocking node never appears below an exchange-send sink without
    /// a fragment boundary between them.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self.kind,
            PlanNodeKind::Aggregate { .. }
                | PlanNodeKind::HashJoin { .. }
                | PlanNodeKind::Sort { .. }
                | PlanNodeKind::TopN { .. }
                | PlanNodeKind::Analytic { .. }
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            PlanNodeKind::Scan { .. } => "Scan",
            PlanNodeKind::Aggregate { .. } => "Aggregate",
            PlanNodeKind::HashJoin { .. } => "HashJoin",
            PlanNodeKind::MergeJoin { .. } => "MergeJoin",
            PlanNodeKind::Union => "Union",
            PlanNodeKind::Sort { .. } => "Sort",
            PlanNodeKind::TopN { .. } => "TopN",
            PlanNodeKind::ExchangeReceive { .. } => "ExchangeReceive",
            PlanNodeKind::Selection => "Selection",
            PlanNodeKind::Analytic { .. } => "Analytic",
        }
    }

    /// Pre-order traversal: root first, leaves last. This is the
    /// serialisable list form described for `PlanFragment`.
    pub fn flatten(&self) -> Vec<&PlanNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.flatten());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_datavalues::DataSchema;
    use std::sync::Arc;

    fn leaf(id: PlanNodeId) -> PlanNode {
        PlanNode {
            id,
            kind: PlanNodeKind::Scan {
                ranges: vec![],
                exec_at_coord: false,
            },
            children: vec![],
            conjuncts: vec![],
            output_schema: Arc::new(DataSchema::new(vec![])),
        }
    }

    #[test]
    fn blocking_nodes_are_tagged_correctly() {
        let agg = PlanNode {
            id: 1,
            kind: PlanNodeKind::Aggregate {
                group_exprs: vec![],
                aggregate_exprs: vec![],
                is_merge_finalize: false,
            },
            children: vec![leaf(2)],
            conjuncts: vec![],
            output_schema: Arc::new(DataSchema::new(vec![])),
        };
        assert!(agg.is_blocking());
        assert!(!leaf(2).is_blocking());
    }

    #[test]
    fn flatten_is_root_first_leaves_last() {
        let tree = PlanNode {
            id: 0,
            kind: PlanNodeKind::Union,
            children: vec![leaf(1), leaf(2)],
            conjuncts: vec![],
            output_schema: Arc::new(DataSchema::new(vec![])),
        };
        let flat = tree.flatten();
        assert_eq!(flat[0].id, 0);
        assert_eq!(flat[1].id, 1);
        assert_eq!(flat[2].id, 2);
    }
}
