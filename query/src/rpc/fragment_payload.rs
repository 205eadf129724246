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

use common_planners::FragmentInstance;
use common_planners::PlanFragment;
use serde::Deserialize;
use serde::Serialize;

/// The opaque JSON envelope `PrepareRequest.fragment_instance_json`
/// carries: the fragment this instance belongs to, the instance's own
/// placement record, and the address the worker should send status
/// reports to for the life of this instance.
#[derive(Serialize, Deserialize)]
pub struct FragmentInstancePayload {
    pub fragment: PlanFragment,
    pub instance: FragmentInstance,
    pub report_to_address: String,
}
