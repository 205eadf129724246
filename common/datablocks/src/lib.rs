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

//! The row batch (component 4.2): the sole unit of data crossing
//! operator and network boundaries. A batch owns a flat, fixed-stride
//! row buffer, a side arena for variable-length payloads, and a NULL
//! bitmap, and can be serialised to and from a length-prefixed wire
//! blob without renegotiating schema per batch.

mod row_batch;
mod wire;

pub use row_batch::RowBatch;
pub use wire::WIRE_MAGIC;
pub use wire::WireHeader;

/// Query-option default from the configuration surface.
pub const DEFAULT_BATCH_SIZE: usize = 1024;
