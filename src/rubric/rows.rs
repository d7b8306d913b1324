// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed source rows, after null normalization.

/// The two source tables, each with its own id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceTable {
    LineItems,
    GradingMap,
}

impl SourceTable {
    /// Prefix of record ids derived from rows of this table.
    pub fn id_prefix(self) -> &'static str {
        match self {
            SourceTable::LineItems => "rubric_item",
            SourceTable::GradingMap => "grading_map",
        }
    }

    /// Stable id for the row at `row_index` of this table.
    pub fn record_id(self, row_index: usize) -> String {
        format!("{}_{}", self.id_prefix(), row_index)
    }
}

/// A row of the rubric line items table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RubricLineItem {
    pub row_index: usize,
    pub section_code: String,
    /// The prompt text shown to the applicant
    pub question: String,
    pub points: String,
}

/// A row of the grade-to-score map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradingMapEntry {
    pub row_index: usize,
    pub grade: String,
    pub from: String,
    pub to: String,
}

/// One row from either table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRow {
    LineItem(RubricLineItem),
    GradingMap(GradingMapEntry),
}

impl SourceRow {
    pub fn table(&self) -> SourceTable {
        match self {
            SourceRow::LineItem(_) => SourceTable::LineItems,
            SourceRow::GradingMap(_) => SourceTable::GradingMap,
        }
    }

    pub fn row_index(&self) -> usize {
        match self {
            SourceRow::LineItem(item) => item.row_index,
            SourceRow::GradingMap(entry) => entry.row_index,
        }
    }

    pub fn record_id(&self) -> String {
        self.table().record_id(self.row_index())
    }
}
