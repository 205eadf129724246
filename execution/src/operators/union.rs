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
use common_datablocks::RowBatch;
use common_datavalues::DataSchemaRef;
use common_exception::Result;

use crate::operator::BoxedOperator;
use crate::operator::Operator;

/// Non-blocking concatenation of its children's output, one child
/// drained fully before the next starts.
pub struct UnionOperator {
    children: Vec<BoxedOperator>,
    current: usize,
    output_schema: DataSchemaRef,
}

impl UnionOperator {
    pub fn create(children: Vec<BoxedOperator>, output_schema: DataSchemaRef) -> Self {
        UnionOperator {
            children,
            current: 0,
            output_schema,
        }
    }
}

#[async_trait]
impl Operator for UnionOperator {
    async fn prepare(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.prepare().await?;
        }
        Ok(())
    }

    async fn open(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.open().await?;
        }
        Ok(())
    }

    async fn get_next(&mut self) -> Result<Option<RowBatch>> {
        while self.current < self.children.len() {
            match self.children[self.current].get_next().await? {
                Some(batch) => return Ok(Some(batch)),
                None => self.current += 1,
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.close().await?;
        }
        Ok(())
    }

    fn output_schema(&self) -> &DataSchemaRef {
        &self.output_schema
    }

    fn name(&self) -> &'static str {
        "Union"
    }
}
