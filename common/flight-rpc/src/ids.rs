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
use common_base::QueryId;
use common_exception::ErrorCode;
use common_exception::Result;

use crate::exec::TUuid;

pub fn query_id_to_proto(id: QueryId) -> TUuid {
    TUuid {
        bytes16: id.as_u128().to_be_bytes().to_vec(),
    }
}

pub fn query_id_from_proto(proto: &TUuid) -> Result<QueryId> {
    Ok(QueryId::from_u128(u128_from_bytes16(&proto.bytes16)?))
}

pub fn instance_id_to_proto(id: FragmentInstanceId) -> TUuid {
    TUuid {
        bytes16: id.as_u128().to_be_bytes().to_vec(),
    }
}

pub fn instance_id_from_proto(proto: &TUuid) -> Result<FragmentInstanceId> {
    Ok(FragmentInstanceId::from_u128(u128_from_bytes16(&proto.bytes16)?))
}

fn u128_from_bytes16(bytes: &[u8]) -> Result<u128> {
    let array: [u8; 16] = bytes
        .try_into()
        .map_err(|_| ErrorCode::BadWireFormat(format!("expected 16-byte id, got {} bytes", bytes.len())))?;
    Ok(u128::from_be_bytes(array))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_id_round_trips_through_proto() {
        let id = QueryId::generate();
        let proto = query_id_to_proto(id);
        assert_eq!(query_id_from_proto(&proto).unwrap(), id);
    }

    #[test]
    fn malformed_id_bytes_are_rejected() {
        let bad = TUuid {
            bytes16: vec![1, 2, 3],
        };
        assert!(query_id_from_proto(&bad).is_err());
    }
}
