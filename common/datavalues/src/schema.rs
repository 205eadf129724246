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

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::data_type::DataType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataField {
    name: String,
    data_type: DataType,
    nullable: bool,
}

impl DataField {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// The output tuple schema carried on every plan node and row batch.
/// Row offsets are computed from field order, so schema order is load
/// bearing: it must match the order `set_column` writes values in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSchema {
    fields: Vec<DataField>,
}

pub type DataSchemaRef = Arc<DataSchema>;

impl DataSchema {
    pub fn new(fields: Vec<DataField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[DataField] {
        &self.fields
    }

    pub fn num_columns(&self) -> usize {
        self.fields.len()
    }

    /// Byte offset of column `idx` within one row's fixed-width region,
    /// not counting the leading NULL bitmap.
    pub fn column_offset(&self, idx: usize) -> usize {
        self.fields[..idx]
            .iter()
            .map(|f| f.data_type.fixed_width())
            .sum()
    }

    /// Total fixed-width bytes per row, not counting the NULL bitmap.
    pub fn row_stride(&self) -> usize {
        self.fields.iter().map(|f| f.data_type.fixed_width()).sum()
    }

    /// Size of the per-row NULL bitmap in bytes: one bit per column,
    /// MSB-first within each byte, rounded up.
    pub fn null_bitmap_bytes(&self) -> usize {
        (self.fields.len() + 7) / 8
    }
}
