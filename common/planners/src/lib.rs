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

//! The plan-fragment model (component 3/4.5's data half): the typed,
//! already-planned tree this workspace consumes. The planner itself
//! (SQL parsing, semantic analysis, cost-based optimisation) is an
//! external collaborator; what lives here is just the shape of its
//! output and the serialisable fragment/instance records derived from
//! it.

mod expr;
mod fragment;
mod instance;
mod node;
mod scan_range;

pub use expr::AggregateFunction;
pub use expr::BinaryOperator;
pub use expr::Expr;
pub use expr::LiteralValue;
pub use fragment::DataSink;
pub use fragment::PartitionScheme;
pub use fragment::PlanFragment;
pub use instance::DestinationInstance;
pub use instance::FragmentInstance;
pub use node::PlanNode;
pub use node::PlanNodeId;
pub use node::PlanNodeKind;
pub use scan_range::ScanRange;
