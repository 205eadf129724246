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

use common_datavalues::DataValue;
use serde::Deserialize;
use serde::Serialize;

/// A scalar expression over one row's columns. The planner produces
/// these already resolved to column indices; there is no name
/// resolution left to do at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    Column(usize),
    Literal(LiteralValue),
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
}

/// A serialisable stand-in for `DataValue` (which itself isn't
/// `Serialize` because it borrows no external state but nests `Option`s
/// that round-trip more simply through this mirror type on the wire).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LiteralValue {
    Null,
    Boolean(bool),
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    Utf8(String),
}

impl From<&LiteralValue> for DataValue {
    fn from(v: &LiteralValue) -> Self {
        match v {
            LiteralValue::Null => DataValue::Int64(None),
            LiteralValue::Boolean(b) => DataValue::Boolean(Some(*b)),
            LiteralValue::Int64(i) => DataValue::Int64(Some(*i)),
            LiteralValue::UInt64(u) => DataValue::UInt64(Some(*u)),
            LiteralValue::Float64(f) => DataValue::Float64(Some(*f)),
            LiteralValue::Utf8(s) => DataValue::Utf8(Some(s.clone())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
}
