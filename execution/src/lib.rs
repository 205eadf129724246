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

//! The per-fragment runtime executor (component 4.6): turns a
//! `PlanFragment` into an operator tree, drives it through
//! `prepare`/`open`/`get_next`/`close`, and reports liveness back to
//! the coordinator on a timer.

mod expr_eval;
mod factory;
mod fragment_executor;
mod operator;
mod operators;
mod sink;
mod status_reporter;

pub use expr_eval::compare;
pub use expr_eval::eval;
pub use expr_eval::row_passes;
pub use factory::build_operator_tree;
pub use factory::FactoryContext;
pub use factory::ScanSourceProvider;
pub use fragment_executor::FragmentExecutor;
pub use fragment_executor::FragmentExecutorState;
pub use operator::drain_to_close;
pub use operator::BoxedOperator;
pub use operator::Operator;
pub use operators::aggregate::AggregateOperator;
pub use operators::analytic::AnalyticOperator;
pub use operators::exchange_receive::ExchangeReceiveOperator;
pub use operators::hash_join::HashJoinOperator;
pub use operators::merge_join::MergeJoinOperator;
pub use operators::scan::BoxedScanSourceFactory;
pub use operators::scan::ScanOperator;
pub use operators::scan::ScanSource;
pub use operators::selection::SelectionOperator;
pub use operators::sort::SortOperator;
pub use operators::topn::TopNOperator;
pub use operators::union::UnionOperator;
pub use sink::BoxedSink;
pub use sink::BroadcastSink;
pub use sink::HashPartitionedSink;
pub use sink::ResultSink;
pub use sink::Sink;
pub use sink::UnpartitionedSink;
pub use status_reporter::ReportState;
pub use status_reporter::StatusReportSink;
pub use status_reporter::StatusReporter;
