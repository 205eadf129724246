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

use common_base::FragmentInstanceId;
use common_exception::ErrorCode;
use common_exception::Result;
use common_planners::DestinationInstance;
use common_planners::FragmentInstance;
use common_planners::PartitionScheme;
use common_planners::PlanFragment;

use crate::scan_assignment::ScanRangeAssigner;
use crate::worker::WorkerNode;

/// Collects every `ScanRange` out of a fragment's node tree. A fragment
/// can carry scans on more than one leaf (e.g. both sides of a join
/// pushed into the same fragment), so ranges from every `Scan` node are
/// pooled before assignment.
fn collect_scan_ranges(fragment: &PlanFragment) -> Vec<common_planners::ScanRange> {
    let mut ranges = Vec::new();
    for node in fragment.root.flatten() {
        if let common_planners::PlanNodeKind::Scan { ranges: node_ranges, .. } = &node.kind {
            ranges.extend(node_ranges.iter().cloned());
        }
    }
    ranges
}

/// Places instances for one fragment against a membership snapshot.
/// `membership` must be non-empty; the scheduler owning this call is
/// responsible for refusing to schedule against an empty cluster
/// before ever reaching here.
///
/// - A leaf fragment (one whose subtree bottoms out in scans rather
///   than an exchange-receive) gets one instance per worker that was
///   assigned at least one scan range.
/// - A non-leaf fragment's instance count follows `input_partition`:
///   `Unpartitioned` places a single instance, everything else
///   (`Hashed`, `Random`, `Broadcast`) places one instance per worker
///   in the membership snapshot.
/// - `exec_at_coord` overrides both of the above: every scan range (if
///   any) and the fragment's one and only instance are forced onto
///   `coordinator`.
pub fn place_fragment(
    fragment: &PlanFragment,
    membership: &[WorkerNode],
    coordinator: &WorkerNode,
) -> Result<Vec<FragmentInstance>> {
    if membership.is_empty() {
        return Err(ErrorCode::InternalError(
            "cannot place a fragment against an empty worker membership".to_string(),
        ));
    }

    if fragment.exec_at_coord {
        let scan_ranges = collect_scan_ranges(fragment);
        return Ok(vec![FragmentInstance {
            instance_id: FragmentInstanceId::generate(),
            fragment_id: fragment.fragment_id,
            worker_address: coordinator.address.clone(),
            worker_num: 0,
            scan_ranges,
            destinations: Vec::new(),
        }]);
    }

    if fragment.is_leaf() {
        let scan_ranges = collect_scan_ranges(fragment);
        let mut assigner = ScanRangeAssigner::create(membership);
        let by_worker = assigner.assign_ranges(&scan_ranges);

        let mut instances = Vec::new();
        let mut worker_num = 0;
        for worker in membership {
            if let Some(ranges) = by_worker.get(&worker.address) {
                instances.push(FragmentInstance {
                    instance_id: FragmentInstanceId::generate(),
                    fragment_id: fragment.fragment_id,
                    worker_address: worker.address.clone(),
                    worker_num,
                    scan_ranges: ranges.clone(),
                    destinations: Vec::new(),
                });
                worker_num += 1;
            }
        }
        return Ok(instances);
    }

    let worker_addresses: Vec<&WorkerNode> = match &fragment.input_partition {
        PartitionScheme::Unpartitioned => vec![&membership[0]],
        PartitionScheme::Hashed(_) | PartitionScheme::Random | PartitionScheme::Broadcast => membership.iter().collect(),
    };

    let instances = worker_addresses
        .into_iter()
        .enumerate()
        .map(|(worker_num, worker)| FragmentInstance {
            instance_id: FragmentInstanceId::generate(),
            fragment_id: fragment.fragment_id,
            worker_address: worker.address.clone(),
            worker_num: worker_num as u32,
            scan_ranges: Vec::new(),
            destinations: Vec::new(),
        })
        .collect();
    Ok(instances)
}

/// Every sender instance of a fragment gets the identical destination
/// list: per-row routing among those destinations (broadcast, hash
/// bucket, or the single unpartitioned target) is the sink's job at
/// runtime, not the scheduler's.
pub fn destinations_for(downstream_instances: &[FragmentInstance], downstream_node_id: u32) -> Vec<DestinationInstance> {
    downstream_instances
        .iter()
        .map(|instance| DestinationInstance {
            instance_id: instance.instance_id,
            address: instance.worker_address.clone(),
            node_id: downstream_node_id,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common_datavalues::DataSchema;
    use common_planners::DataSink;
    use common_planners::PlanNode;
    use common_planners::PlanNodeKind;
    use common_planners::ScanRange;

    use super::*;

    fn workers(n: usize) -> Vec<WorkerNode> {
        (0..n)
            .map(|i| WorkerNode::new(format!("10.0.0.{}:9090", i), format!("host-{}", i)))
            .collect()
    }

    fn scan_fragment(ranges: Vec<ScanRange>, exec_at_coord: bool) -> PlanFragment {
        PlanFragment {
            fragment_id: 1,
            root: PlanNode {
                id: 1,
                kind: PlanNodeKind::Scan { ranges, exec_at_coord },
                children: vec![],
                conjuncts: vec![],
                output_schema: Arc::new(DataSchema::new(vec![])),
            },
            sink: Some(DataSink::Result),
            input_partition: PartitionScheme::Unpartitioned,
            output_partition: PartitionScheme::Unpartitioned,
            exec_at_coord,
        }
    }

    fn exchange_fragment(input_partition: PartitionScheme) -> PlanFragment {
        PlanFragment {
            fragment_id: 2,
            root: PlanNode {
                id: 2,
                kind: PlanNodeKind::ExchangeReceive { input_schemas: vec![] },
                children: vec![],
                conjuncts: vec![],
                output_schema: Arc::new(DataSchema::new(vec![])),
            },
            sink: Some(DataSink::Result),
            input_partition,
            output_partition: PartitionScheme::Unpartitioned,
            exec_at_coord: false,
        }
    }

    #[test]
    fn leaf_fragment_gets_one_instance_per_worker_that_received_a_range() {
        let workers = workers(3);
        let ranges = vec![
            ScanRange::new("f1", 0, 10, vec!["host-0".to_string()]),
            ScanRange::new("f2", 0, 10, vec!["host-1".to_string()]),
        ];
        let fragment = scan_fragment(ranges, false);
        let instances = place_fragment(&fragment, &workers, &workers[0]).unwrap();
        assert_eq!(instances.len(), 2);
    }

    #[test]
    fn exec_at_coord_forces_a_single_instance_on_the_coordinator() {
        let workers = workers(3);
        let ranges = vec![ScanRange::new("f1", 0, 10, vec!["host-1".to_string()])];
        let fragment = scan_fragment(ranges, true);
        let coordinator = WorkerNode::new("coord:9090", "coord-host");
        let instances = place_fragment(&fragment, &workers, &coordinator).unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].worker_address, "coord:9090");
        assert_eq!(instances[0].scan_ranges.len(), 1);
    }

    #[test]
    fn unpartitioned_non_leaf_fragment_gets_a_single_instance() {
        let workers = workers(3);
        let fragment = exchange_fragment(PartitionScheme::Unpartitioned);
        let instances = place_fragment(&fragment, &workers, &workers[0]).unwrap();
        assert_eq!(instances.len(), 1);
    }

    #[test]
    fn hashed_non_leaf_fragment_gets_one_instance_per_worker() {
        let workers = workers(3);
        let fragment = exchange_fragment(PartitionScheme::Hashed(vec![]));
        let instances = place_fragment(&fragment, &workers, &workers[0]).unwrap();
        assert_eq!(instances.len(), 3);
        let worker_nums: Vec<u32> = instances.iter().map(|i| i.worker_num).collect();
        assert_eq!(worker_nums, vec![0, 1, 2]);
    }

    #[test]
    fn destinations_for_hands_every_sender_the_same_full_list() {
        let workers = workers(2);
        let fragment = exchange_fragment(PartitionScheme::Hashed(vec![]));
        let downstream = place_fragment(&fragment, &workers, &workers[0]).unwrap();
        let destinations = destinations_for(&downstream, 7);
        assert_eq!(destinations.len(), 2);
        assert!(destinations.iter().all(|d| d.node_id == 7));
    }

    #[test]
    fn placing_against_empty_membership_is_an_error() {
        let fragment = scan_fragment(vec![], false);
        let coord = WorkerNode::new("coord:9090", "coord-host");
        assert!(place_fragment(&fragment, &[], &coord).is_err());
    }
}
