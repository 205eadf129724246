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

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

/// Rows/bytes read so far, reported by a scan-bearing fragment instance
/// back to its local query context between status reports.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProgressValues {
    pub read_rows: usize,
    pub read_bytes: usize,
}

pub type ProgressCallback = Box<dyn Fn(&ProgressValues) + Send + Sync>;

#[derive(Default)]
pub struct Progress {
    read_rows: AtomicUsize,
    read_bytes: AtomicUsize,
}

impl Progress {
    pub fn create() -> Self {
        Self::default()
    }

    pub fn incr(&self, value: &ProgressValues) {
        self.read_rows.fetch_add(value.read_rows, Ordering::Relaxed);
        self.read_bytes.fetch_add(value.read_bytes, Ordering::Relaxed);
    }

    pub fn get_values(&self) -> ProgressValues {
        ProgressValues {
            read_rows: self.read_rows.load(Ordering::Relaxed),
            read_bytes: self.read_bytes.load(Ordering::Relaxed),
        }
    }

    pub fn get_and_reset(&self) -> ProgressValues {
        ProgressValues {
            read_rows: self.read_rows.swap(0, Ordering::Relaxed),
            read_bytes: self.read_bytes.swap(0, Ordering::Relaxed),
        }
    }
}
