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

//! The scheduler (component 4.7): turns a `PlanFragment` plus a
//! membership snapshot into concrete `FragmentInstance`s. Cluster
//! membership itself, and the gossip protocol that maintains it, are an
//! external collaborator — this crate only ever sees the snapshot it is
//! handed for the duration of one `schedule_fragment` call.

mod placement;
mod reservation;
mod scan_assignment;
mod scheduler;
mod worker;

pub use placement::destinations_for;
pub use placement::place_fragment;
pub use reservation::NoopReservationBroker;
pub use reservation::ReservationBroker;
pub use scan_assignment::ScanRangeAssigner;
pub use scheduler::Scheduler;
pub use worker::WorkerNode;
