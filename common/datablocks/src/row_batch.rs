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
use common_datavalues::DataSchemaRef;
use common_datavalues::DataValue;
use common_exception::ErrorCode;
use common_exception::Result;

use crate::wire::WireHeader;
use crate::wire::WIRE_MAGIC;
use crate::wire::WIRE_VERSION_MAJOR;
use crate::wire::WIRE_VERSION_MINOR;

/// A bounded sequence of tuples sharing a schema. `allocate_tuple` hands
/// out the next row slot; `set_column` writes one value at the offset
/// the schema computes for it. A batch is immutable to producers once
/// `is_full` returns true.
pub struct RowBatch {
    schema: DataSchemaRef,
    batch_size: usize,
    arena_cap_bytes: usize,
    row_buffer: Vec<u8>,
    null_bitmap: Vec<u8>,
    arena: Vec<u8>,
    count: usize,
}

impl RowBatch {
    pub fn new(schema: DataSchemaRef, batch_size: usize, arena_cap_bytes: usize) -> Self {
        let row_stride = schema.row_stride();
        let bitmap_stride = schema.null_bitmap_bytes();
        RowBatch {
            row_buffer: vec![0u8; batch_size * row_stride],
            null_bitmap: vec![0u8; batch_size * bitmap_stride],
            arena: Vec::new(),
            schema,
            batch_size,
            arena_cap_bytes,
            count: 0,
        }
    }

    pub fn schema(&self) -> &DataSchemaRef {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.count
    }

    /// Allocates the next row slot, returning its index, or `None` if
    /// the batch is already at `batch_size` rows.
    pub fn allocate_tuple(&mut self) -> Option<usize> {
        if self.count >= self.batch_size {
            return None;
        }
        let slot = self.count;
        self.count += 1;
        Some(slot)
    }

    /// Writes `value` into column `col_idx` of row `slot`, growing the
    /// arena if `value` is variable-length. Returns an error if the
    /// write would push the arena past its configured cap.
    pub fn set_column(&mut self, slot: usize, col_idx: usize, value: &DataValue) -> Result<()> {
        let num_columns = self.schema.num_columns();
        self.set_null_bit(slot, col_idx, value.is_null());

        if value.is_null() {
            return Ok(());
        }

        let row_stride = self.schema.row_stride();
        let col_offset = self.schema.column_offset(col_idx);
        let row_start = slot * row_stride + col_offset;

        match value {
            DataValue::Utf8(Some(s)) => {
                let bytes = s.as_bytes();
                if self.arena.len() + bytes.len() > self.arena_cap_bytes {
                    return Err(ErrorCode::internal(format!(
                        "row batch arena cap {} exceeded writing {} bytes",
                        self.arena_cap_bytes,
                        bytes.len()
                    )));
                }
                let arena_offset = self.arena.len() as u32;
                self.arena.extend_from_slice(bytes);
                LittleEndian::write_u32(&mut self.row_buffer[row_start..row_start + 4], arena_offset);
                LittleEndian::write_u32(
                    &mut self.row_buffer[row_start + 4..row_start + 8],
                    bytes.len() as u32,
                );
            }
            DataValue::Boolean(Some(v)) => self.row_buffer[row_start] = *v as u8,
            DataValue::Int8(Some(v)) => self.row_buffer[row_start] = *v as u8,
            DataValue::UInt8(Some(v)) => self.row_buffer[row_start] = *v,
            DataValue::Int16(Some(v)) => {
                LittleEndian::write_i16(&mut self.row_buffer[row_start..row_start + 2], *v)
            }
            DataValue::UInt16(Some(v)) => {
                LittleEndian::write_u16(&mut self.row_buffer[row_start..row_start + 2], *v)
            }
            DataValue::Int32(Some(v)) => {
                LittleEndian::write_i32(&mut self.row_buffer[row_start..row_start + 4], *v)
            }
            DataValue::UInt32(Some(v)) => {
                LittleEndian::write_u32(&mut self.row_buffer[row_start..row_start + 4], *v)
            }
            DataValue::Float32(Some(v)) => {
                LittleEndian::write_f32(&mut self.row_buffer[row_start..row_start + 4], *v)
            }
            DataValue::Int64(Some(v)) => {
                LittleEndian::write_i64(&mut self.row_buffer[row_start..row_start + 8], *v)
            }
            DataValue::UInt64(Some(v)) => {
                LittleEndian::write_u64(&mut self.row_buffer[row_start..row_start + 8], *v)
            }
            DataValue::Float64(Some(v)) => {
                LittleEndian::write_f64(&mut self.row_buffer[row_start..row_start + 8], *v)
            }
            _ => unreachable!("is_null() already handled the None case for {:?}", value.data_type()),
        }
        let _ = num_columns;
        Ok(())
    }

    fn set_null_bit(&mut self, slot: usize, col_idx: usize, is_null: bool) {
        let num_columns = self.schema.num_columns();
        let bit_index = slot * num_columns + col_idx;
        let byte_idx = bit_index / 8;
        let bit_in_byte = 7 - (bit_index % 8);
        if is_null {
            self.null_bitmap[byte_idx] |= 1 << bit_in_byte;
        } else {
            self.null_bitmap[byte_idx] &= !(1 << bit_in_byte);
        }
    }

    pub fn is_null(&self, slot: usize, col_idx: usize) -> bool {
        let num_columns = self.schema.num_columns();
        let bit_index = slot * num_columns + col_idx;
        let byte_idx = bit_index / 8;
        let bit_in_byte = 7 - (bit_index % 8);
        (self.null_bitmap[byte_idx] >> bit_in_byte) & 1 == 1
    }

    /// True once the row count has reached `batch_size`, or once
    /// `additional_arena_bytes` more would exceed the arena cap.
    pub fn is_full(&self, additional_arena_bytes: usize) -> bool {
        self.count >= self.batch_size || self.arena.len() + additional_arena_bytes > self.arena_cap_bytes
    }

    fn active_bitmap_bytes(&self) -> usize {
        (self.count * self.schema.num_columns() + 7) / 8
    }

    /// Produces a length-prefixed wire blob: header, then the active
    /// rows' NULL bitmap, then the active rows' fixed buffer, then the
    /// arena. `from_wire` is the exact byte-for-byte inverse.
    pub fn to_wire(&self) -> Vec<u8> {
        let bitmap_bytes = self.active_bitmap_bytes();
        let row_bytes = self.count * self.schema.row_stride();
        let arena_bytes = self.arena.len();

        let header = WireHeader {
            magic: WIRE_MAGIC,
            version_major: WIRE_VERSION_MAJOR,
            version_minor: WIRE_VERSION_MINOR,
            row_count: self.count as u32,
            bitmap_bytes: bitmap_bytes as u32,
            row_bytes: row_bytes as u32,
            arena_bytes: arena_bytes as u32,
        };

        let mut out = Vec::with_capacity(WireHeader::WIRE_LEN + bitmap_bytes + row_bytes + arena_bytes);
        header.write_to(&mut out);
        out.extend_from_slice(&self.null_bitmap[..bitmap_bytes]);
        out.extend_from_slice(&self.row_buffer[..row_bytes]);
        out.extend_from_slice(&self.arena[..arena_bytes]);
        out
    }

    /// Reconstructs a batch from `to_wire`'s output. `batch_size` and
    /// `arena_cap_bytes` describe the receiving side's configured
    /// limits, which need not match the sender's — the header alone
    /// carries everything needed to lay the rows back out.
    pub fn from_wire(
        bytes: &[u8],
        schema: DataSchemaRef,
        batch_size: usize,
        arena_cap_bytes: usize,
    ) -> Result<Self> {
        let header = WireHeader::read_from(bytes)?;
        let mut offset = WireHeader::WIRE_LEN;

        let bitmap_bytes = header.bitmap_bytes as usize;
        let row_bytes = header.row_bytes as usize;
        let arena_bytes = header.arena_bytes as usize;
        let expected_len = offset + bitmap_bytes + row_bytes + arena_bytes;
        if bytes.len() != expected_len {
            return Err(ErrorCode::BadWireFormat(format!(
                "expected {} bytes, got {}",
                expected_len,
                bytes.len()
            )));
        }

        let row_stride = schema.row_stride();
        let bitmap_stride = schema.null_bitmap_bytes();
        let mut row_buffer = vec![0u8; batch_size.max(header.row_count as usize) * row_stride];
        let mut null_bitmap = vec![0u8; batch_size.max(header.row_count as usize) * bitmap_stride];

        null_bitmap[..bitmap_bytes].copy_from_slice(&bytes[offset..offset + bitmap_bytes]);
        offset += bitmap_bytes;
        row_buffer[..row_bytes].copy_from_slice(&bytes[offset..offset + row_bytes]);
        offset += row_bytes;
        let arena = bytes[offset..offset + arena_bytes].to_vec();

        Ok(RowBatch {
            schema,
            batch_size: batch_size.max(header.row_count as usize),
            arena_cap_bytes,
            row_buffer,
            null_bitmap,
            arena,
            count: header.row_count as usize,
        })
    }

    /// Reads column `col_idx` of row `slot` back into a tagged
    /// `DataValue`, dispatching on the schema's declared type. This is
    /// the generic counterpart to the typed `get_i64`/`get_utf8`
    /// accessors, used by operators that evaluate arbitrary expressions
    /// over a row rather than a single known column.
    pub fn get_value(&self, slot: usize, col_idx: usize) -> DataValue {
        use common_datavalues::DataType;

        let data_type = self.schema.fields()[col_idx].data_type();
        if self.is_null(slot, col_idx) {
            return match data_type {
                DataType::Boolean => DataValue::Boolean(None),
                DataType::Int8 => DataValue::Int8(None),
                DataType::Int16 => DataValue::Int16(None),
                DataType::Int32 => DataValue::Int32(None),
                DataType::Int64 => DataValue::Int64(None),
                DataType::UInt8 => DataValue::UInt8(None),
                DataType::UInt16 => DataValue::UInt16(None),
                DataType::UInt32 => DataValue::UInt32(None),
                DataType::UInt64 => DataValue::UInt64(None),
                DataType::Float32 => DataValue::Float32(None),
                DataType::Float64 => DataValue::Float64(None),
                DataType::Utf8 => DataValue::Utf8(None),
            };
        }

        let row_start = slot * self.schema.row_stride() + self.schema.column_offset(col_idx);
        match data_type {
            DataType::Boolean => DataValue::Boolean(Some(self.row_buffer[row_start] != 0)),
            DataType::Int8 => DataValue::Int8(Some(self.row_buffer[row_start] as i8)),
            DataType::UInt8 => DataValue::UInt8(Some(self.row_buffer[row_start])),
            DataType::Int16 => {
                DataValue::Int16(Some(LittleEndian::read_i16(&self.row_buffer[row_start..row_start + 2])))
            }
            DataType::UInt16 => {
                DataValue::UInt16(Some(LittleEndian::read_u16(&self.row_buffer[row_start..row_start + 2])))
            }
            DataType::Int32 => {
                DataValue::Int32(Some(LittleEndian::read_i32(&self.row_buffer[row_start..row_start + 4])))
            }
            DataType::UInt32 => {
                DataValue::UInt32(Some(LittleEndian::read_u32(&self.row_buffer[row_start..row_start + 4])))
            }
            DataType::Float32 => {
                DataValue::Float32(Some(LittleEndian::read_f32(&self.row_buffer[row_start..row_start + 4])))
            }
            DataType::Int64 => {
                DataValue::Int64(Some(LittleEndian::read_i64(&self.row_buffer[row_start..row_start + 8])))
            }
            DataType::UInt64 => {
                DataValue::UInt64(Some(LittleEndian::read_u64(&self.row_buffer[row_start..row_start + 8])))
            }
            DataType::Float64 => {
                DataValue::Float64(Some(LittleEndian::read_f64(&self.row_buffer[row_start..row_start + 8])))
            }
            DataType::Utf8 => DataValue::Utf8(self.get_utf8(slot, col_idx)),
        }
    }

    pub fn get_i64(&self, slot: usize, col_idx: usize) -> Option<i64> {
        if self.is_null(slot, col_idx) {
            return None;
        }
        let row_start = slot * self.schema.row_stride() + self.schema.column_offset(col_idx);
        Some(LittleEndian::read_i64(&self.row_buffer[row_start..row_start + 8]))
    }

    pub fn get_utf8(&self, slot: usize, col_idx: usize) -> Option<String> {
        if self.is_null(slot, col_idx) {
            return None;
        }
        let row_start = slot * self.schema.row_stride() + self.schema.column_offset(col_idx);
        let arena_offset = LittleEndian::read_u32(&self.row_buffer[row_start..row_start + 4]) as usize;
        let arena_len = LittleEndian::read_u32(&self.row_buffer[row_start + 4..row_start + 8]) as usize;
        Some(String::from_utf8_lossy(&self.arena[arena_offset..arena_offset + arena_len]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use common_datavalues::DataField;
    use common_datavalues::DataSchema;
    use common_datavalues::DataType;
    use std::sync::Arc;

    use super::*;

    fn schema() -> DataSchemaRef {
        Arc::new(DataSchema::new(vec![
            DataField::new("a", DataType::Int64, true),
            DataField::new("b", DataType::Utf8, true),
        ]))
    }

    #[test]
    fn wire_round_trip_is_byte_for_byte() {
        let mut batch = RowBatch::new(schema(), 4, 1024);
        let s = batch.allocate_tuple().unwrap();
        batch.set_column(s, 0, &DataValue::Int64(Some(42))).unwrap();
        batch.set_column(s, 1, &DataValue::Utf8(Some("hi".into()))).unwrap();
        let s2 = batch.allocate_tuple().unwrap();
        batch.set_column(s2, 0, &DataValue::Int64(None)).unwrap();
        batch.set_column(s2, 1, &DataValue::Utf8(Some("there".into()))).unwrap();

        let wire = batch.to_wire();
        let back = RowBatch::from_wire(&wire, schema(), 4, 1024).unwrap();
        assert_eq!(back.to_wire(), wire);

        assert_eq!(back.get_i64(0, 0), Some(42));
        assert_eq!(back.get_utf8(0, 1), Some("hi".to_string()));
        assert_eq!(back.get_i64(1, 0), None);
        assert_eq!(back.get_utf8(1, 1), Some("there".to_string()));
    }

    #[test]
    fn get_value_dispatches_on_schema_type() {
        let mut batch = RowBatch::new(schema(), 4, 1024);
        let s = batch.allocate_tuple().unwrap();
        batch.set_column(s, 0, &DataValue::Int64(Some(7))).unwrap();
        batch.set_column(s, 1, &DataValue::Utf8(None)).unwrap();
        assert_eq!(batch.get_value(s, 0), DataValue::Int64(Some(7)));
        assert_eq!(batch.get_value(s, 1), DataValue::Utf8(None));
    }

    #[test]
    fn is_full_on_row_count() {
        let mut batch = RowBatch::new(schema(), 1, 1024);
        batch.allocate_tuple().unwrap();
        assert!(batch.is_full(0));
        assert!(batch.allocate_tuple().is_none());
    }

    #[test]
    fn is_full_on_arena_cap() {
        let mut batch = RowBatch::new(schema(), 100, 4);
        let s = batch.allocate_tuple().unwrap();
        let err = batch.set_column(s, 1, &DataValue::Utf8(Some("toolong".into())));
        assert!(err.is_err());
    }

    #[test]
    fn empty_batch_round_trips() {
        let batch = RowBatch::new(schema(), 4, 1024);
        let wire = batch.to_wire();
        let back = RowBatch::from_wire(&wire, schema(), 4, 1024).unwrap();
        assert_eq!(back.num_rows(), 0);
        assert_eq!(back.to_wire(), wire);
    }
}
