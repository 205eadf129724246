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
use common_datavalues::DataSchemaRef;
use common_exception::Result;

/// The iterator contract every plan-node operator implements:
/// `prepare` resolves expressions and allocates buffers but touches no
/// input, `open` may block pulling and materializing input (hash-build,
/// sort), `get_next` yields one batch at a time or `None` at
/// end-of-stream, `close` releases resources and is safe to call more
/// than once.
#[async_trait]
pub trait Operator: Send {
    async fn prepare(&mut self) -> Result<()>;

    async fn open(&mut self) -> Result<()>;

    async fn get_next(&mut self) -> Result<Option<common_datablocks::RowBatch>>;

    async fn close(&mut self) -> Result<()>;

    fn output_schema(&self) -> &DataSchemaRef;

    fn name(&self) -> &'static str;
}

pub type BoxedOperator = Box<dyn Operator>;

/// Drives an already-prepared-and-opened operator tree until it is
/// exhausted, calling `close` exactly once regardless of whether
/// `get_next` errors partway through.
pub async fn drain_to_close(op: &mut dyn Operator) -> Result<Vec<common_datablocks::RowBatch>> {
    let mut batches = Vec::new();
    let result = async {
        loop {
            match op.get_next().await? {
                Some(batch) => batches.push(batch),
                None => break,
            }
        }
        Ok(())
    }
    .await;
    op.close().await?;
    result.map(|()| batches)
}
