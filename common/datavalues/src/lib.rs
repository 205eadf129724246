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

//! The scalar type system shared by plan nodes, row batches, and
//! predicate evaluation. This is the already-typed abstract plan's value
//! vocabulary; the planner (out of scope) is the only producer of
//! `DataType`/`DataValue` instances that matters to this crate.

mod data_type;
mod data_value;
mod schema;

pub use data_type::DataType;
pub use data_value::DataValue;
pub use schema::DataField;
pub use schema::DataSchema;
pub use schema::DataSchemaRef;
