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

use std::collections::HashMap;

use common_planners::ScanRange;

use crate::worker::WorkerNode;

/// Assigns scan ranges to workers, preferring a worker that hosts a
/// replica of the range (locality) and falling back to round robin
/// across the whole membership for ranges with no local replica. The
/// round-robin cursor lives only for the duration of one
/// `assign_ranges` call — a fresh `ScanRangeAssigner` is created per
/// `schedule_fragment` invocation, so cursor state never survives past
/// the membership snapshot it was built against.
pub struct ScanRangeAssigner<'a> {
    workers: &'a [WorkerNode],
    round_robin_cursor: usize,
}

impl<'a> ScanRangeAssigner<'a> {
    pub fn create(workers: &'a [WorkerNode]) -> Self {
        ScanRangeAssigner {
            workers,
            round_robin_cursor: 0,
        }
    }

    fn next_round_robin(&mut self) -> &'a WorkerNode {
        let worker = &self.workers[self.round_robin_cursor % self.workers.len()];
        self.round_robin_cursor += 1;
        worker
    }

    /// Returns the chosen worker's address as key. Empty `workers` is a
    /// caller error (no cluster to run on); callers should check
    /// `membership.is_empty()` before scheduling at all.
    pub fn assign_ranges(&mut self, ranges: &[ScanRange]) -> HashMap<String, Vec<ScanRange>> {
        let mut by_worker: HashMap<String, Vec<ScanRange>> = HashMap::new();
        for range in ranges {
            let local = self
                .workers
                .iter()
                .find(|w| range.replicas.iter().any(|r| r == &w.hostname));
            let worker = match local {
                Some(w) => w,
                None => self.next_round_robin(),
            };
            by_worker.entry(worker.address.clone()).or_default().push(range.clone());
        }
        by_worker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workers() -> Vec<WorkerNode> {
        vec![
            WorkerNode::new("10.0.0.1:9090", "host-a"),
            WorkerNode::new("10.0.0.2:9090", "host-b"),
            WorkerNode::new("10.0.0.3:9090", "host-c"),
        ]
    }

    #[test]
    fn prefers_the_replica_local_worker() {
        let workers = workers();
        let mut assigner = ScanRangeAssigner::create(&workers);
        let ranges = vec![ScanRange::new("f1", 0, 10, vec!["host-b".to_string()])];
        let assignment = assigner.assign_ranges(&ranges);
        assert_eq!(assignment.get("10.0.0.2:9090").map(|v| v.len()), Some(1));
        assert_eq!(assignment.len(), 1);
    }

    #[test]
    fn falls_back_to_round_robin_for_non_local_ranges() {
        let workers = workers();
        let mut assigner = ScanRangeAssigner::create(&workers);
        let ranges = vec![
            ScanRange::new("f1", 0, 10, vec!["nowhere".to_string()]),
            ScanRange::new("f2", 10, 10, vec!["nowhere".to_string()]),
            ScanRange::new("f3", 20, 10, vec!["nowhere".to_string()]),
        ];
        let assignment = assigner.assign_ranges(&ranges);
        // three ranges, three workers, round robin should spread one to each.
        assert_eq!(assignment.len(), 3);
        for ranges in assignment.values() {
            assert_eq!(ranges.len(), 1);
        }
    }

    #[test]
    fn round_robin_cursor_does_not_persist_across_assigner_instances() {
        let workers = workers();
        let ranges = vec![ScanRange::new("f1", 0, 10, vec!["nowhere".to_string()])];

        let mut first = ScanRangeAssigner::create(&workers);
        let first_assignment = first.assign_ranges(&ranges);

        let mut second = ScanRangeAssigner::create(&workers);
        let second_assignment = second.assign_ranges(&ranges);

        assert_eq!(first_assignment, second_assignment);
    }
}
