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
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use common_base::FragmentInstanceId;
use common_exception::ErrorCode;
use common_exception::FirstErrorLatch;
use common_exception::Result;

/// The last-applied status report for one fragment instance. `sequence`
/// is the reporter's own strictly-increasing counter; a report whose
/// sequence is not greater than what is already recorded here is a
/// stale duplicate or an out-of-order delivery and is dropped rather
/// than applied.
#[derive(Debug, Clone)]
struct InstanceStatus {
    sequence: u64,
    done: bool,
    failed: bool,
    profile_json: String,
}

/// Merges `report_status` RPCs from every fragment instance of a query,
/// tolerating the transport's lack of an ordering guarantee. A report
/// older than or equal to the one already on file for its instance is
/// dropped, and `ordering_violations` counts how often that happens —
/// surfaced as a metric rather than silently swallowed. The first
/// instance failure observed is latched query-wide through
/// `FirstErrorLatch`, matching the coordinator's first-error-wins rule.
pub struct StatusTable {
    instances: Mutex<HashMap<FragmentInstanceId, InstanceStatus>>,
    ordering_violations: AtomicU64,
    first_error: FirstErrorLatch,
}

impl StatusTable {
    pub fn create() -> Self {
        StatusTable {
            instances: Mutex::new(HashMap::new()),
            ordering_violations: AtomicU64::new(0),
            first_error: FirstErrorLatch::new(),
        }
    }

    /// Applies a report, returning `true` if it was newer than what was
    /// already on file (and thus applied) or `false` if it was dropped
    /// as stale.
    pub fn apply_report(
        &self,
        instance_id: FragmentInstanceId,
        sequence: u64,
        done: bool,
        status: &Result<()>,
        profile_json: String,
    ) -> bool {
        let mut instances = self.instances.lock().unwrap();
        match instances.get(&instance_id) {
            Some(existing) if existing.sequence >= sequence => {
                self.ordering_violations.fetch_add(1, Ordering::Relaxed);
                false
            }
            _ => {
                if let Err(err) = status {
                    self.first_error.latch(clone_status_error(err));
                }
                instances.insert(
                    instance_id,
                    InstanceStatus {
                        sequence,
                        done,
                        failed: status.is_err(),
                        profile_json,
                    },
                );
                true
            }
        }
    }

    pub fn ordering_violations(&self) -> u64 {
        self.ordering_violations.load(Ordering::Relaxed)
    }

    /// True once every tracked instance has reported `done=true`. A
    /// query with zero tracked instances is not "all done" — the
    /// coordinator registers every scheduled instance before it starts
    /// polling this.
    pub fn all_done(&self, expected_instances: usize) -> bool {
        let instances = self.instances.lock().unwrap();
        instances.len() >= expected_instances && instances.values().all(|s| s.done)
    }

    /// True if at least one tracked instance has reported a failure.
    pub fn has_failure(&self) -> bool {
        self.instances.lock().unwrap().values().any(|s| s.failed)
    }

    /// The first failing status observed across the whole query, if
    /// any — the basis for the coordinator's first-error-wins
    /// cancellation.
    pub fn first_error(&self) -> Option<ErrorCode> {
        self.first_error.get()
    }

    pub fn profile_json(&self, instance_id: FragmentInstanceId) -> Option<String> {
        self.instances.lock().unwrap().get(&instance_id).map(|s| s.profile_json.clone())
    }
}

// `ErrorCode` doesn't derive `Clone`; reconstruct the small set of
// variants a worker status report can actually carry (per the six-code
// wire taxonomy in `flight-rpc::status`).
fn clone_status_error(err: &ErrorCode) -> ErrorCode {
    match err {
        ErrorCode::QueryCancelled(s) => ErrorCode::QueryCancelled(s.clone()),
        ErrorCode::MemoryLimitExceeded(s) => ErrorCode::MemoryLimitExceeded(s.clone()),
        ErrorCode::TimedOut(s) => ErrorCode::TimedOut(s.clone()),
        ErrorCode::NotAuthorized(s) => ErrorCode::NotAuthorized(s.clone()),
        other => ErrorCode::InternalError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_reports_are_dropped_and_counted() {
        let table = StatusTable::create();
        let instance = FragmentInstanceId::generate();
        assert!(table.apply_report(instance, 5, false, &Ok(()), "{}".to_string()));
        assert!(!table.apply_report(instance, 3, false, &Ok(()), "{}".to_string()));
        assert_eq!(table.ordering_violations(), 1);
        assert!(!table.apply_report(instance, 5, true, &Ok(()), "{}".to_string()));
        assert_eq!(table.ordering_violations(), 2);
    }

    #[test]
    fn all_done_requires_every_expected_instance_to_report_done() {
        let table = StatusTable::create();
        let a = FragmentInstanceId::generate();
        let b = FragmentInstanceId::generate();
        table.apply_report(a, 1, true, &Ok(()), "{}".to_string());
        assert!(!table.all_done(2));
        table.apply_report(b, 1, true, &Ok(()), "{}".to_string());
        assert!(table.all_done(2));
    }

    #[test]
    fn first_error_surfaces_a_failing_instance() {
        let table = StatusTable::create();
        let a = FragmentInstanceId::generate();
        let err: Result<()> = Err(ErrorCode::MemoryLimitExceeded("over".to_string()));
        table.apply_report(a, 1, true, &err, "{}".to_string());
        assert!(table.has_failure());
        assert!(matches!(table.first_error(), Some(ErrorCode::MemoryLimitExceeded(_))));
    }
}
