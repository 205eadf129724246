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

use crate::data_type::DataType;

/// A single scalar value, tagged by type, with `None` meaning SQL NULL.
/// Integer arithmetic on these wraps on overflow; float arithmetic
/// follows IEEE-754, matching the numeric semantics of row batch
/// columns.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Boolean(Option<bool>),
    Int8(Option<i8>),
    Int16(Option<i16>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    UInt8(Option<u8>),
    UInt16(Option<u16>),
    UInt32(Option<u32>),
    UInt64(Option<u64>),
    Float32(Option<f32>),
    Float64(Option<f64>),
    Utf8(Option<String>),
}

impl DataValue {
    pub fn is_null(&self) -> bool {
        match self {
            DataValue::Boolean(v) => v.is_none(),
            DataValue::Int8(v) => v.is_none(),
            DataValue::Int16(v) => v.is_none(),
            DataValue::Int32(v) => v.is_none(),
            DataValue::Int64(v) => v.is_none(),
            DataValue::UInt8(v) => v.is_none(),
            DataValue::UInt16(v) => v.is_none(),
            DataValue::UInt32(v) => v.is_none(),
            DataValue::UInt64(v) => v.is_none(),
            DataValue::Float32(v) => v.is_none(),
            DataValue::Float64(v) => v.is_none(),
            DataValue::Utf8(v) => v.is_none(),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            DataValue::Boolean(_) => DataType::Boolean,
            DataValue::Int8(_) => DataType::Int8,
            DataValue::Int16(_) => DataType::Int16,
            DataValue::Int32(_) => DataType::Int32,
            DataValue::Int64(_) => DataType::Int64,
            DataValue::UInt8(_) => DataType::UInt8,
            DataValue::UInt16(_) => DataType::UInt16,
            DataValue::UInt32(_) => DataType::UInt32,
            DataValue::UInt64(_) => DataType::UInt64,
            DataValue::Float32(_) => DataType::Float32,
            DataValue::Float64(_) => DataType::Float64,
            DataValue::Utf8(_) => DataType::Utf8,
        }
    }

    /// Wrapping add for the integer variants; used by aggregate `sum`.
    /// Mixing variants or adding to/through a NULL yields NULL, matching
    /// standard SQL NULL propagation.
    pub fn wrapping_add(&self, other: &DataValue) -> DataValue {
        match (self, other) {
            (DataValue::Int64(Some(a)), DataValue::Int64(Some(b))) => {
                DataValue::Int64(Some(a.wrapping_add(*b)))
            }
            (DataValue::UInt64(Some(a)), DataValue::UInt64(Some(b))) => {
                DataValue::UInt64(Some(a.wrapping_add(*b)))
            }
            (DataValue::Float64(Some(a)), DataValue::Float64(Some(b))) => {
                DataValue::Float64(Some(a + b))
            }
            (a, _) => match a {
                DataValue::Int64(_) => DataValue::Int64(None),
                DataValue::UInt64(_) => DataValue::UInt64(None),
                DataValue::Float64(_) => DataValue::Float64(None),
                other => other.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_addition_wraps() {
        let a = DataValue::Int64(Some(i64::MAX));
        let b = DataValue::Int64(Some(1));
        assert_eq!(a.wrapping_add(&b), DataValue::Int64(Some(i64::MIN)));
    }

    #[test]
    fn null_is_detected_per_variant() {
        assert!(DataValue::Int32(None).is_null());
        assert!(!DataValue::Int32(Some(0)).is_null());
    }
}
