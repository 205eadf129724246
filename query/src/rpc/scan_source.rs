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
use common_exception::Result;
use common_planners::PlanNodeId;
use common_planners::ScanRange;
use execution::BoxedScanSourceFactory;
use execution::ScanSource;
use execution::ScanSourceProvider;

/// File-format readers (HDFS/Avro/Parquet scanners) are an external
/// collaborator this repository deliberately doesn't implement. This
/// provider stands in for that collaborator: every scan range opens
/// and immediately reports exhausted, so a plan containing a scan is
/// fully executable end to end (exercising the fragment executor, the
/// exchange fabric, and the sinks) without a real storage layer wired
/// in yet.
pub struct EmptyScanSourceProvider;

struct EmptySource;

#[async_trait]
impl ScanSource for EmptySource {
    async fn open(&mut self, _range: &ScanRange) -> Result<()> {
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<RowBatch>> {
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl ScanSourceProvider for EmptyScanSourceProvider {
    fn make_source_factory(&self, _node_id: PlanNodeId) -> BoxedScanSourceFactory {
        Box::new(|| Box::new(EmptySource))
    }
}
