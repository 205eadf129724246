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

//! The runtime profile (component 4.3): a labelled tree of counters
//! attached to every operator and fragment, mergeable across workers at
//! the coordinator.

use std::sync::Arc;
use std::sync::Mutex;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;

/// The value kinds a counter can hold. `merge` combines two counters of
/// the same kind; mixing kinds on the same key is a programmer error
/// caught in debug builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CounterValue {
    /// Sums on merge. Used for `BytesSent`, `RowsReturned`, etc.
    MonotonicBytes(u64),
    /// Sums on merge. Used for elapsed-time accumulators in nanoseconds.
    MonotonicTimeNs(u64),
    /// Takes the max on merge. Used for `PeakMemoryUsage`.
    HighWaterMark(i64),
    /// Concatenates on merge. A bounded ring of (timestamp_ms, value)
    /// samples taken by the periodic counter thread.
    TimeSeries(Vec<(u64, i64)>),
    /// The evaluated value of a callback registered with
    /// `add_derived_counter`, taken at snapshot time rather than tracked
    /// eagerly. Takes the max on merge, same as a high-water mark.
    Derived(i64),
}

impl CounterValue {
    fn merge(&mut self, other: &CounterValue) {
        match (self, other) {
            (CounterValue::MonotonicBytes(a), CounterValue::MonotonicBytes(b)) => *a += b,
            (CounterValue::MonotonicTimeNs(a), CounterValue::MonotonicTimeNs(b)) => *a += b,
            (CounterValue::HighWaterMark(a), CounterValue::HighWaterMark(b)) => {
                *a = (*a).max(*b)
            }
            (CounterValue::TimeSeries(a), CounterValue::TimeSeries(b)) => {
                a.extend(b.iter().cloned())
            }
            (CounterValue::Derived(a), CounterValue::Derived(b)) => *a = (*a).max(*b),
            (a, b) => {
                debug_assert!(false, "merging mismatched counter kinds: {:?} / {:?}", a, b);
            }
        }
    }
}

/// A serialisable snapshot of one profile node, produced by a pre-order
/// traversal. This is what crosses the wire in a status report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub name: String,
    pub counters: Vec<(String, CounterValue)>,
    pub info_strings: Vec<(String, String)>,
    pub children: Vec<ProfileSnapshot>,
}

struct Inner {
    counters: IndexMap<String, CounterValue>,
    info_strings: IndexMap<String, String>,
    children: Vec<ProfileNode>,
    derived: IndexMap<String, Arc<dyn Fn() -> i64 + Send + Sync>>,
}

/// A single node in the profile tree. Cheap to clone (it's an `Arc`-like
/// handle internally via `Mutex` sharing would require `Arc<Mutex<..>>`,
/// but nodes are normally owned by exactly one operator/fragment, so
/// plain ownership with interior mutability for counters is enough).
pub struct ProfileNode {
    name: String,
    inner: Mutex<Inner>,
}

impl ProfileNode {
    pub fn create(name: impl Into<String>) -> Self {
        ProfileNode {
            name: name.into(),
            inner: Mutex::new(Inner {
                counters: IndexMap::new(),
                info_strings: IndexMap::new(),
                children: Vec::new(),
                derived: IndexMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adding a counter is idempotent: calling this twice with the same
    /// name just returns without resetting the existing value.
    pub fn add_counter(&self, name: impl Into<String>, initial: CounterValue) {
        let name = name.into();
        let mut inner = self.inner.lock().unwrap();
        inner.counters.entry(name).or_insert(initial);
    }

    pub fn update_counter(&self, name: &str, delta: CounterValue) {
        let mut inner = self.inner.lock().unwrap();
        match inner.counters.get_mut(name) {
            Some(existing) => existing.merge(&delta),
            None => {
                inner.counters.insert(name.to_string(), delta);
            }
        }
    }

    pub fn counter(&self, name: &str) -> Option<CounterValue> {
        self.inner.lock().unwrap().counters.get(name).cloned()
    }

    /// Info strings are keyed upserts: the later call always wins.
    pub fn set_info_string(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .info_strings
            .insert(key.into(), value.into());
    }

    /// Child order is the order `add_child` was first called in.
    pub fn add_child(&self, child: ProfileNode) {
        self.inner.lock().unwrap().children.push(child);
    }

    /// Registers a callback evaluated each time `snapshot` is taken,
    /// rather than a value tracked eagerly on the hot path. Useful for
    /// counters like "rows currently buffered" that are cheap to read
    /// off another structure but awkward to keep in sync by hand.
    pub fn add_derived_counter(&self, name: impl Into<String>, f: impl Fn() -> i64 + Send + Sync + 'static) {
        self.inner.lock().unwrap().derived.insert(name.into(), Arc::new(f));
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        let inner = self.inner.lock().unwrap();
        let mut counters: Vec<(String, CounterValue)> = inner
            .counters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, f) in inner.derived.iter() {
            counters.push((k.clone(), CounterValue::Derived(f())));
        }
        ProfileSnapshot {
            name: self.name.clone(),
            counters,
            info_strings: inner
                .info_strings
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            children: inner.children.iter().map(|c| c.snapshot()).collect(),
        }
    }

    /// Builds a detached node from a snapshot, used when merging in a
    /// child the node has never seen before.
    fn from_snapshot(snapshot: &ProfileSnapshot) -> ProfileNode {
        let node = ProfileNode::create(snapshot.name.clone());
        {
            let mut inner = node.inner.lock().unwrap();
            for (k, v) in &snapshot.counters {
                inner.counters.insert(k.clone(), v.clone());
            }
            for (k, v) in &snapshot.info_strings {
                inner.info_strings.insert(k.clone(), v.clone());
            }
        }
        for child in &snapshot.children {
            node.add_child(ProfileNode::from_snapshot(child));
        }
        node
    }

    /// Merges a snapshot taken elsewhere (typically a worker instance's
    /// profile, received over a status report) into this node in place.
    /// Matches children by name, recursing into existing ones and
    /// grafting on unmatched ones, the same pairing `ProfileSnapshot::merge`
    /// uses.
    pub fn merge_snapshot(&self, snapshot: &ProfileSnapshot) {
        debug_assert_eq!(self.name, snapshot.name, "merging mismatched profile nodes");
        {
            let mut inner = self.inner.lock().unwrap();
            for (k, v) in &snapshot.counters {
                match inner.counters.get_mut(k) {
                    Some(existing) => existing.merge(v),
                    None => {
                        inner.counters.insert(k.clone(), v.clone());
                    }
                }
            }
            for (k, v) in &snapshot.info_strings {
                inner.info_strings.insert(k.clone(), v.clone());
            }
        }
        for child_snapshot in &snapshot.children {
            self.merge_child_snapshot(child_snapshot);
        }
    }

    /// Finds the child matching `snapshot.name` and merges into it,
    /// creating a new child from the snapshot if none matches.
    pub fn merge_child_snapshot(&self, snapshot: &ProfileSnapshot) {
        let found = {
            let inner = self.inner.lock().unwrap();
            inner.children.iter().any(|c| c.name == snapshot.name)
        };
        if found {
            let inner = self.inner.lock().unwrap();
            let child = inner.children.iter().find(|c| c.name == snapshot.name).unwrap();
            child.merge_snapshot(snapshot);
        } else {
            self.add_child(ProfileNode::from_snapshot(snapshot));
        }
    }
}

impl ProfileSnapshot {
    /// Merge `other` into `self` in place, matching the teacher's
    /// `(profile_path, name)` keying by pairing nodes positionally under
    /// the same name and recursing into children with matching names.
    /// Nodes present in `other` but not `self` are appended.
    pub fn merge(&mut self, other: &ProfileSnapshot) {
        debug_assert_eq!(self.name, other.name, "merging mismatched profile nodes");

        for (key, value) in &other.counters {
            match self.counters.iter_mut().find(|(k, _)| k == key) {
                Some((_, existing)) => existing.merge(value),
                None => self.counters.push((key.clone(), value.clone())),
            }
        }

        for (key, value) in &other.info_strings {
            match self.info_strings.iter_mut().find(|(k, _)| k == key) {
                Some((_, existing)) => *existing = value.clone(),
                None => self.info_strings.push((key.clone(), value.clone())),
            }
        }

        for other_child in &other.children {
            match self
                .children
                .iter_mut()
                .find(|c| c.name == other_child.name)
            {
                Some(existing) => existing.merge(other_child),
                None => self.children.push(other_child.clone()),
            }
        }
    }

    pub fn to_json(&self) -> common_exception::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_counter_is_idempotent() {
        let node = ProfileNode::create("scan");
        node.add_counter("RowsReturned", CounterValue::MonotonicBytes(0));
        node.update_counter("RowsReturned", CounterValue::MonotonicBytes(5));
        node.add_counter("RowsReturned", CounterValue::MonotonicBytes(999));
        match node.counter("RowsReturned").unwrap() {
            CounterValue::MonotonicBytes(v) => assert_eq!(v, 5),
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn merge_sums_monotonic_and_maxes_high_water() {
        let mut a = ProfileSnapshot {
            name: "fragment".into(),
            counters: vec![
                ("BytesSent".into(), CounterValue::MonotonicBytes(100)),
                ("PeakMemoryUsage".into(), CounterValue::HighWaterMark(50)),
            ],
            info_strings: vec![],
            children: vec![],
        };
        let b = ProfileSnapshot {
            name: "fragment".into(),
            counters: vec![
                ("BytesSent".into(), CounterValue::MonotonicBytes(50)),
                ("PeakMemoryUsage".into(), CounterValue::HighWaterMark(80)),
            ],
            info_strings: vec![],
            children: vec![],
        };
        a.merge(&b);
        match &a.counters[0] {
            (_, CounterValue::MonotonicBytes(v)) => assert_eq!(*v, 150),
            _ => panic!(),
        }
        match &a.counters[1] {
            (_, CounterValue::HighWaterMark(v)) => assert_eq!(*v, 80),
            _ => panic!(),
        }
    }

    #[test]
    fn merge_is_idempotent_for_monotonic_and_high_water() {
        let base = ProfileSnapshot {
            name: "f".into(),
            counters: vec![
                ("BytesSent".into(), CounterValue::MonotonicBytes(10)),
                ("Peak".into(), CounterValue::HighWaterMark(10)),
            ],
            info_strings: vec![],
            children: vec![],
        };
        let p = ProfileSnapshot {
            name: "f".into(),
            counters: vec![("Peak".into(), CounterValue::HighWaterMark(20))],
            info_strings: vec![],
            children: vec![],
        };
        let mut once = base.clone();
        once.merge(&p);
        let mut twice = once.clone();
        twice.merge(&p);
        match (&once.counters[1], &twice.counters[1]) {
            ((_, CounterValue::HighWaterMark(a)), (_, CounterValue::HighWaterMark(b))) => {
                assert_eq!(a, b)
            }
            _ => panic!(),
        }
    }

    #[test]
    fn info_strings_upsert_with_later_winning() {
        let node = ProfileNode::create("n");
        node.set_info_string("PlanVersion", "1");
        node.set_info_string("PlanVersion", "2");
        let snap = node.snapshot();
        assert_eq!(snap.info_strings, vec![("PlanVersion".to_string(), "2".to_string())]);
    }

    #[test]
    fn derived_counter_is_evaluated_at_snapshot_time() {
        let node = ProfileNode::create("scan");
        let buffered = std::sync::Arc::new(std::sync::atomic::AtomicI64::new(3));
        let buffered_for_closure = buffered.clone();
        node.add_derived_counter("RowsBuffered", move || {
            buffered_for_closure.load(std::sync::atomic::Ordering::SeqCst)
        });
        buffered.store(7, std::sync::atomic::Ordering::SeqCst);
        let snap = node.snapshot();
        match snap.counters.iter().find(|(k, _)| k == "RowsBuffered").unwrap() {
            (_, CounterValue::Derived(v)) => assert_eq!(*v, 7),
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn merge_child_snapshot_grafts_an_unseen_child_and_merges_a_known_one() {
        let root = ProfileNode::create("query");
        let instance_a = ProfileSnapshot {
            name: "instance".into(),
            counters: vec![("RowsReturned".into(), CounterValue::MonotonicBytes(10))],
            info_strings: vec![],
            children: vec![],
        };
        root.merge_child_snapshot(&instance_a);
        let instance_b = ProfileSnapshot {
            name: "instance".into(),
            counters: vec![("RowsReturned".into(), CounterValue::MonotonicBytes(5))],
            info_strings: vec![],
            children: vec![],
        };
        root.merge_child_snapshot(&instance_b);

        let snap = root.snapshot();
        assert_eq!(snap.children.len(), 1);
        match &snap.children[0].counters[0] {
            (_, CounterValue::MonotonicBytes(v)) => assert_eq!(*v, 15),
            _ => panic!(),
        }
    }

    #[test]
    fn child_order_is_insertion_order() {
        let root = ProfileNode::create("root");
        root.add_child(ProfileNode::create("b"));
        root.add_child(ProfileNode::create("a"));
        let snap = root.snapshot();
        assert_eq!(snap.children[0].name, "b");
        assert_eq!(snap.children[1].name, "a");
    }
}
