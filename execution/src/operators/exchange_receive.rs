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

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common_datablocks::RowBatch;
use common_datavalues::DataSchemaRef;
use common_exception::Result;
use common_exchange::ExchangeReceiver;
use common_exchange::GetBatchResult;

use crate::operator::Operator;

/// Pulls wire-encoded batches off an `ExchangeReceiver` and decodes
/// them against this node's output schema. The root of every non-leaf
/// fragment is exactly one of these.
pub struct ExchangeReceiveOperator {
    receiver: Arc<ExchangeReceiver>,
    output_schema: DataSchemaRef,
    batch_size: usize,
    arena_cap_bytes: usize,
    recv_timeout: Duration,
}

impl ExchangeReceiveOperator {
    pub fn create(
        receiver: Arc<ExchangeReceiver>,
        output_schema: DataSchemaRef,
        batch_size: usize,
        arena_cap_bytes: usize,
        recv_timeout: Duration,
    ) -> Self {
        ExchangeReceiveOperator {
            receiver,
            output_schema,
            batch_size,
            arena_cap_bytes,
            recv_timeout,
        }
    }
}

#[async_trait]
impl Operator for ExchangeReceiveOperator {
    async fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    async fn get_next(&mut self) -> Result<Option<RowBatch>> {
        match self.receiver.get_batch(self.recv_timeout).await? {
            GetBatchResult::Eos => Ok(None),
            GetBatchResult::Batch(bytes) => {
                let batch = RowBatch::from_wire(
                    &bytes,
                    self.output_schema.clone(),
                    self.batch_size,
                    self.arena_cap_bytes,
                )?;
                Ok(Some(batch))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.receiver.close().await;
        Ok(())
    }

    fn output_schema(&self) -> &DataSchemaRef {
        &self.output_schema
    }

    fn name(&self) -> &'static str {
        "ExchangeReceive"
    }
}
