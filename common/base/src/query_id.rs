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

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// A 128-bit globally unique query identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(Uuid);

/// A 128-bit identifier unique within its query's fragment instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentInstanceId(Uuid);

macro_rules! id_newtype {
    ($ty:ident) => {
        impl $ty {
            pub fn generate() -> Self {
                $ty(Uuid::new_v4())
            }

            pub fn as_u128(&self) -> u128 {
                self.0.as_u128()
            }

            pub fn from_u128(v: u128) -> Self {
                $ty(Uuid::from_u128(v))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::generate()
            }
        }
    };
}

id_newtype!(QueryId);
id_newtype!(FragmentInstanceId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(QueryId::generate(), QueryId::generate());
        assert_ne!(
            FragmentInstanceId::generate(),
            FragmentInstanceId::generate()
        );
    }

    #[test]
    fn round_trips_through_u128() {
        let id = QueryId::generate();
        assert_eq!(QueryId::from_u128(id.as_u128()), id);
    }
}
