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

//! The memory tracker tree (component 4.1).
//!
//! Trackers form a tree: every non-root tracker holds a weak pointer to
//! its parent, and the parent owns its children by value. `try_consume`
//! walks from a leaf to the root, optimistically applying the
//! consumption to every tracker on the path, then checking every
//! ancestor's limit; on any overshoot the whole path is rolled back and
//! the call returns `false`. This keeps the hot path lock-free (plain
//! atomics) at the cost of a brief, self-healing overshoot window on the
//! losing side of a race, which is invisible to callers because they
//! never observe partial success.

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;

/// A node in the memory tracker tree. Construct the root with
/// [`MemoryTracker::create_root`] and every descendant with
/// [`MemoryTracker::create_child`].
pub struct MemoryTracker {
    label: String,
    limit: Option<i64>,
    consumption: AtomicI64,
    peak: AtomicI64,
    parent: Option<Weak<MemoryTracker>>,
    children: Mutex<Vec<Arc<MemoryTracker>>>,
}

pub type MemoryTrackerRef = Arc<MemoryTracker>;

impl MemoryTracker {
    pub fn create_root(label: impl Into<String>, limit_bytes: Option<i64>) -> MemoryTrackerRef {
        Arc::new(MemoryTracker {
            label: label.into(),
            limit: limit_bytes,
            consumption: AtomicI64::new(0),
            peak: AtomicI64::new(0),
            parent: None,
            children: Mutex::new(Vec::new()),
        })
    }

    /// Create a child of `parent` and register it in `parent.children`.
    pub fn create_child(
        parent: &MemoryTrackerRef,
        label: impl Into<String>,
        limit_bytes: Option<i64>,
    ) -> MemoryTrackerRef {
        let child = Arc::new(MemoryTracker {
            label: label.into(),
            limit: limit_bytes,
            consumption: AtomicI64::new(0),
            peak: AtomicI64::new(0),
            parent: Some(Arc::downgrade(parent)),
            children: Mutex::new(Vec::new()),
        });
        parent.children.lock().unwrap().push(child.clone());
        child
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn consumption(&self) -> i64 {
        self.consumption.load(Ordering::Acquire)
    }

    pub fn peak_consumption(&self) -> i64 {
        self.peak.load(Ordering::Acquire)
    }

    /// Walk from `self` to the root, collecting strong references. `self`
    /// is first in the returned vector, the root is last.
    fn path_to_root(self: &Arc<Self>) -> Vec<Arc<MemoryTracker>> {
        let mut path = vec![self.clone()];
        let mut current = self.clone();
        while let Some(parent_weak) = &current.parent {
            match parent_weak.upgrade() {
                Some(parent) => {
                    path.push(parent.clone());
                    current = parent;
                }
                None => break,
            }
        }
        path
    }

    /// Try to account `n` bytes against this tracker and every ancestor.
    /// Returns `false`, leaving every tracker unchanged, if any ancestor's
    /// limit would be exceeded.
    pub fn try_consume(self: &Arc<Self>, n: i64) -> bool {
        if n == 0 {
            return true;
        }
        let path = self.path_to_root();

        for tracker in &path {
            tracker.add_and_bump_peak(n);
        }

        for tracker in &path {
            if let Some(limit) = tracker.limit {
                if tracker.consumption() > limit {
                    // Roll back the whole path; nobody downstream has
                    // observed the intermediate state as final because
                    // we haven't returned yet.
                    for t in &path {
                        t.consumption.fetch_sub(n, Ordering::AcqRel);
                    }
                    tracing::debug!(
                        tracker = tracker.label.as_str(),
                        limit,
                        "memory limit exceeded"
                    );
                    return false;
                }
            }
        }
        true
    }

    /// Infallibly release `n` bytes previously accounted by `try_consume`.
    pub fn release(self: &Arc<Self>, n: i64) {
        if n == 0 {
            return;
        }
        for tracker in self.path_to_root() {
            tracker.consumption.fetch_sub(n, Ordering::AcqRel);
        }
    }

    fn add_and_bump_peak(&self, n: i64) {
        let new_value = self.consumption.fetch_add(n, Ordering::AcqRel) + n;
        self.peak.fetch_max(new_value, Ordering::AcqRel);
    }

    /// Conservative check used by the periodic counter thread: true if
    /// this tracker or any ancestor currently exceeds its limit.
    pub fn any_limit_exceeded(self: &Arc<Self>) -> bool {
        self.path_to_root().iter().any(|t| match t.limit {
            Some(limit) => t.consumption() > limit,
            None => false,
        })
    }

    /// Destroy this subtree's bookkeeping by detaching it from its
    /// parent's children list, so consumption no longer counts toward
    /// the parent once every fragment instance holding it is dropped.
    pub fn detach_from_parent(self: &Arc<Self>) {
        if let Some(parent) = self.parent.as_ref().and_then(|p| p.upgrade()) {
            parent
                .children
                .lock()
                .unwrap()
                .retain(|c| !Arc::ptr_eq(c, self));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_and_release_round_trip() {
        let root = MemoryTracker::create_root("process", None);
        let query = MemoryTracker::create_child(&root, "query", Some(1024));
        let instance = MemoryTracker::create_child(&query, "instance", None);

        assert!(instance.try_consume(512));
        assert_eq!(instance.consumption(), 512);
        assert_eq!(query.consumption(), 512);
        assert_eq!(root.consumption(), 512);

        instance.release(512);
        assert_eq!(instance.consumption(), 0);
        assert_eq!(query.consumption(), 0);
        assert_eq!(root.consumption(), 0);
    }

    #[test]
    fn overshoot_is_rejected_and_rolled_back() {
        let root = MemoryTracker::create_root("process", None);
        let query = MemoryTracker::create_child(&root, "query", Some(1024));
        let build_side = MemoryTracker::create_child(&query, "hash-join-build", None);

        assert!(build_side.try_consume(1000));
        assert!(!build_side.try_consume(100));
        // Rolled back: consumption unchanged on every tracker on the path.
        assert_eq!(build_side.consumption(), 1000);
        assert_eq!(query.consumption(), 1000);
        assert_eq!(root.consumption(), 1000);
    }

    #[test]
    fn unlimited_tracker_never_rejects_consumption_alone() {
        let root = MemoryTracker::create_root("process", None);
        let query = MemoryTracker::create_child(&root, "query", None);
        assert!(query.try_consume(i64::MAX / 2));
    }

    #[test]
    fn peak_consumption_tracks_high_water_mark() {
        let root = MemoryTracker::create_root("process", None);
        assert!(root.try_consume(100));
        root.release(60);
        assert!(root.try_consume(10));
        assert_eq!(root.consumption(), 50);
        assert_eq!(root.peak_consumption(), 100);
    }

    #[test]
    fn any_limit_exceeded_is_conservative() {
        let root = MemoryTracker::create_root("process", Some(10));
        let query = MemoryTracker::create_child(&root, "query", None);
        // Bypass try_consume to simulate a transient overshoot window.
        root.consumption.fetch_add(11, Ordering::AcqRel);
        assert!(query.any_limit_exceeded());
    }
}
