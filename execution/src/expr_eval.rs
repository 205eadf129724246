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

use common_datablocks::RowBatch;
use common_datavalues::DataValue;
use common_planners::BinaryOperator;
use common_planners::Expr;

/// Evaluates `expr` against row `slot` of `batch`. Column references
/// resolve to the batch's own columns; the planner is expected to hand
/// the executor expressions already bound to column indices, so there
/// is no name lookup here.
pub fn eval(expr: &Expr, batch: &RowBatch, slot: usize) -> DataValue {
    match expr {
        Expr::Column(idx) => batch.get_value(slot, *idx),
        Expr::Literal(lit) => DataValue::from(lit),
        Expr::Not(inner) => match eval(inner, batch, slot) {
            DataValue::Boolean(Some(b)) => DataValue::Boolean(Some(!b)),
            _ => DataValue::Boolean(None),
        },
        Expr::BinaryOp { op, left, right } => {
            let l = eval(left, batch, slot);
            let r = eval(right, batch, slot);
            eval_binary(*op, &l, &r)
        }
    }
}

/// True iff every conjunct in `conjuncts` evaluates to `Boolean(Some(true))`
/// for this row. A NULL or non-boolean result fails the row, matching SQL's
/// three-valued-logic `WHERE` semantics (unknown is not true).
pub fn row_passes(conjuncts: &[Expr], batch: &RowBatch, slot: usize) -> bool {
    conjuncts
        .iter()
        .all(|c| matches!(eval(c, batch, slot), DataValue::Boolean(Some(true))))
}

fn eval_binary(op: BinaryOperator, l: &DataValue, r: &DataValue) -> DataValue {
    use BinaryOperator::*;

    match op {
        And => match (as_bool(l), as_bool(r)) {
            (Some(false), _) | (_, Some(false)) => DataValue::Boolean(Some(false)),
            (Some(a), Some(b)) => DataValue::Boolean(Some(a && b)),
            _ => DataValue::Boolean(None),
        },
        Or => match (as_bool(l), as_bool(r)) {
            (Some(true), _) | (_, Some(true)) => DataValue::Boolean(Some(true)),
            (Some(a), Some(b)) => DataValue::Boolean(Some(a || b)),
            _ => DataValue::Boolean(None),
        },
        Eq | NotEq | Lt | LtEq | Gt | GtEq => match compare(l, r) {
            Some(ordering) => {
                let result = match op {
                    Eq => ordering == std::cmp::Ordering::Equal,
                    NotEq => ordering != std::cmp::Ordering::Equal,
                    Lt => ordering == std::cmp::Ordering::Less,
                    LtEq => ordering != std::cmp::Ordering::Greater,
                    Gt => ordering == std::cmp::Ordering::Greater,
                    GtEq => ordering != std::cmp::Ordering::Less,
                    And | Or => unreachable!(),
                };
                DataValue::Boolean(Some(result))
            }
            None => DataValue::Boolean(None),
        },
    }
}

fn as_bool(v: &DataValue) -> Option<bool> {
    match v {
        DataValue::Boolean(b) => *b,
        _ => None,
    }
}

/// Compares two values of the same logical kind, returning `None` if
/// either is NULL or they're not comparable (mixed numeric/string kinds
/// can't occur once the planner has type-checked the expression).
pub fn compare(l: &DataValue, r: &DataValue) -> Option<std::cmp::Ordering> {
    if l.is_null() || r.is_null() {
        return None;
    }
    match (l, r) {
        (DataValue::Int64(Some(a)), DataValue::Int64(Some(b))) => a.partial_cmp(b),
        (DataValue::UInt64(Some(a)), DataValue::UInt64(Some(b))) => a.partial_cmp(b),
        (DataValue::Float64(Some(a)), DataValue::Float64(Some(b))) => a.partial_cmp(b),
        (DataValue::Utf8(Some(a)), DataValue::Utf8(Some(b))) => a.partial_cmp(b),
        (DataValue::Boolean(Some(a)), DataValue::Boolean(Some(b))) => a.partial_cmp(b),
        (DataValue::Int32(Some(a)), DataValue::Int32(Some(b))) => a.partial_cmp(b),
        (DataValue::Int16(Some(a)), DataValue::Int16(Some(b))) => a.partial_cmp(b),
        (DataValue::Int8(Some(a)), DataValue::Int8(Some(b))) => a.partial_cmp(b),
        (DataValue::UInt32(Some(a)), DataValue::UInt32(Some(b))) => a.partial_cmp(b),
        (DataValue::UInt16(Some(a)), DataValue::UInt16(Some(b))) => a.partial_cmp(b),
        (DataValue::UInt8(Some(a)), DataValue::UInt8(Some(b))) => a.partial_cmp(b),
        (DataValue::Float32(Some(a)), DataValue::Float32(Some(b))) => a.partial_cmp(b),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common_datavalues::DataField;
    use common_datavalues::DataSchema;
    use common_datavalues::DataType;

    use super::*;

    fn batch_with_one_i64(value: i64) -> RowBatch {
        let schema = Arc::new(DataSchema::new(vec![DataField::new("a", DataType::Int64, true)]));
        let mut batch = RowBatch::new(schema, 1, 16);
        let slot = batch.allocate_tuple().unwrap();
        batch.set_column(slot, 0, &DataValue::Int64(Some(value))).unwrap();
        batch
    }

    #[test]
    fn column_greater_than_literal() {
        let batch = batch_with_one_i64(10);
        let expr = Expr::BinaryOp {
            op: BinaryOperator::Gt,
            left: Box::new(Expr::Column(0)),
            right: Box::new(Expr::Literal(common_planners::LiteralValue::Int64(5))),
        };
        assert_eq!(eval(&expr, &batch, 0), DataValue::Boolean(Some(true)));
    }

    #[test]
    fn conjuncts_reject_on_null_comparison() {
        let schema = Arc::new(DataSchema::new(vec![DataField::new("a", DataType::Int64, true)]));
        let mut batch = RowBatch::new(schema, 1, 16);
        let slot = batch.allocate_tuple().unwrap();
        batch.set_column(slot, 0, &DataValue::Int64(None)).unwrap();

        let expr = Expr::BinaryOp {
            op: BinaryOperator::Eq,
            left: Box::new(Expr::Column(0)),
            right: Box::new(Expr::Literal(common_planners::LiteralValue::Int64(5))),
        };
        assert!(!row_passes(&[expr], &batch, 0));
    }

    #[test]
    fn and_short_circuits_on_false() {
        let batch = batch_with_one_i64(10);
        let expr = Expr::BinaryOp {
            op: BinaryOperator::And,
            left: Box::new(Expr::Literal(common_planners::LiteralValue::Boolean(false))),
            right: Box::new(Expr::Literal(common_planners::LiteralValue::Null)),
        };
        assert_eq!(eval(&expr, &batch, 0), DataValue::Boolean(Some(false)));
    }
}
