// SPDX-License-Identifier: MIT OR Apache-2.0

//! Record builder: turns typed source rows into indexable records.
//!
//! Building is pure. A row that fails the inclusion rules yields
//! [`BuildOutcome::Skipped`] with the reason; nothing here returns an error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::rows::{GradingMapEntry, RubricLineItem, SourceRow};

/// Leading text of the instruction row at the top of the rubric sheet.
pub const DEFAULT_BOILERPLATE_MARKER: &str = "Please save";
/// Label of the header row in the grading map.
pub const DEFAULT_HEADER_LABEL: &str = "Grade Map";
/// Metadata `type` value carried by grading map records.
pub const GRADING_MAP_TYPE: &str = "grading_map";

/// The unit stored in and returned from the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Deterministic id: `{table_prefix}_{row_index}`
    pub id: String,
    /// Composed chunk text that gets embedded (never empty)
    pub text: String,
    /// String-only metadata
    pub metadata: BTreeMap<String, String>,
}

/// Why a row was left out of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    BlankQuestion,
    Boilerplate,
    BlankGrade,
    HeaderRow,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::BlankQuestion => write!(f, "blank question"),
            SkipReason::Boilerplate => write!(f, "boilerplate"),
            SkipReason::BlankGrade => write!(f, "blank grade"),
            SkipReason::HeaderRow => write!(f, "header row"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Accepted(VectorRecord),
    Skipped(SkipReason),
}

impl BuildOutcome {
    pub fn accepted(self) -> Option<VectorRecord> {
        match self {
            BuildOutcome::Accepted(record) => Some(record),
            BuildOutcome::Skipped(_) => None,
        }
    }
}

/// Applies skip rules and text composition to source rows.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    boilerplate_marker: String,
    header_label: String,
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BOILERPLATE_MARKER, DEFAULT_HEADER_LABEL)
    }
}

impl RecordBuilder {
    pub fn new(boilerplate_marker: impl Into<String>, header_label: impl Into<String>) -> Self {
        Self {
            boilerplate_marker: boilerplate_marker.into(),
            header_label: header_label.into(),
        }
    }

    pub fn build(&self, row: &SourceRow) -> BuildOutcome {
        match row {
            SourceRow::LineItem(item) => self.build_line_item(row.record_id(), item),
            SourceRow::GradingMap(entry) => self.build_grading_entry(row.record_id(), entry),
        }
    }

    fn build_line_item(&self, id: String, item: &RubricLineItem) -> BuildOutcome {
        let question = item.question.trim();
        if question.is_empty() {
            return BuildOutcome::Skipped(SkipReason::BlankQuestion);
        }
        if !self.boilerplate_marker.is_empty() && question.starts_with(&self.boilerplate_marker) {
            return BuildOutcome::Skipped(SkipReason::Boilerplate);
        }

        let section_code = item.section_code.trim();
        let points = item.points.trim();

        let mut text = String::new();
        if !section_code.is_empty() {
            text.push_str(&format!("Section {}: ", section_code));
        }
        text.push_str(question);
        if !points.is_empty() {
            text.push_str(&format!(" (Points: {})", points));
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("section_code".to_string(), section_code.to_string());
        metadata.insert("question".to_string(), question.to_string());
        metadata.insert("points".to_string(), points.to_string());
        metadata.insert("row_index".to_string(), item.row_index.to_string());

        BuildOutcome::Accepted(VectorRecord { id, text, metadata })
    }

    fn build_grading_entry(&self, id: String, entry: &GradingMapEntry) -> BuildOutcome {
        let grade = entry.grade.trim();
        if grade.is_empty() {
            return BuildOutcome::Skipped(SkipReason::BlankGrade);
        }
        if grade == self.header_label {
            return BuildOutcome::Skipped(SkipReason::HeaderRow);
        }

        let from = entry.from.trim();
        let to = entry.to.trim();
        let text = format!("Grade {}: Score range from {} to {}", grade, from, to);

        let mut metadata = BTreeMap::new();
        metadata.insert("type".to_string(), GRADING_MAP_TYPE.to_string());
        metadata.insert("grade".to_string(), grade.to_string());
        metadata.insert("from".to_string(), from.to_string());
        metadata.insert("to".to_string(), to.to_string());

        BuildOutcome::Accepted(VectorRecord { id, text, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_item(row_index: usize, section: &str, question: &str, points: &str) -> SourceRow {
        SourceRow::LineItem(RubricLineItem {
            row_index,
            section_code: section.to_string(),
            question: question.to_string(),
            points: points.to_string(),
        })
    }

    fn grade_row(row_index: usize, grade: &str, from: &str, to: &str) -> SourceRow {
        SourceRow::GradingMap(GradingMapEntry {
            row_index,
            grade: grade.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    #[test]
    fn composes_full_line_item() {
        let builder = RecordBuilder::default();
        let record = builder
            .build(&line_item(4, "A1", "Describe your passions and goals", "5"))
            .accepted()
            .unwrap();

        assert_eq!(record.id, "rubric_item_4");
        assert_eq!(
            record.text,
            "Section A1: Describe your passions and goals (Points: 5)"
        );
        assert_eq!(record.metadata["section_code"], "A1");
        assert_eq!(record.metadata["points"], "5");
        assert_eq!(record.metadata["row_index"], "4");
        assert!(!record.metadata.contains_key("type"));
    }

    #[test]
    fn omits_missing_prefix_and_suffix() {
        let builder = RecordBuilder::default();
        let record = builder
            .build(&line_item(0, "", "What are your values?", ""))
            .accepted()
            .unwrap();
        assert_eq!(record.text, "What are your values?");
        assert_eq!(record.metadata["section_code"], "");
        assert_eq!(record.metadata["points"], "");
    }

    #[test]
    fn skips_blank_and_boilerplate_questions() {
        let builder = RecordBuilder::default();
        assert_eq!(
            builder.build(&line_item(1, "A2", "   ", "3")),
            BuildOutcome::Skipped(SkipReason::BlankQuestion)
        );
        assert_eq!(
            builder.build(&line_item(2, "", "Please save this form before grading", "")),
            BuildOutcome::Skipped(SkipReason::Boilerplate)
        );
    }

    #[test]
    fn composes_grading_map_entry() {
        let builder = RecordBuilder::default();
        let record = builder
            .build(&grade_row(2, "B", "70", "79"))
            .accepted()
            .unwrap();
        assert_eq!(record.id, "grading_map_2");
        assert_eq!(record.text, "Grade B: Score range from 70 to 79");
        assert_eq!(record.metadata["type"], GRADING_MAP_TYPE);
        assert_eq!(record.metadata["grade"], "B");
        assert_eq!(record.metadata["from"], "70");
        assert_eq!(record.metadata["to"], "79");
    }

    #[test]
    fn skips_blank_grade_and_header() {
        let builder = RecordBuilder::default();
        assert_eq!(
            builder.build(&grade_row(0, "Grade Map", "", "")),
            BuildOutcome::Skipped(SkipReason::HeaderRow)
        );
        assert_eq!(
            builder.build(&grade_row(1, " ", "0", "10")),
            BuildOutcome::Skipped(SkipReason::BlankGrade)
        );
    }

    #[test]
    fn same_row_index_in_different_tables_gives_distinct_ids() {
        let builder = RecordBuilder::default();
        let a = builder.build(&line_item(0, "", "Q", "")).accepted().unwrap();
        let b = builder.build(&grade_row(0, "A", "90", "100")).accepted().unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn custom_marker_and_header() {
        let builder = RecordBuilder::new("NOTE:", "Grades");
        assert_eq!(
            builder.build(&line_item(0, "", "NOTE: internal", "")),
            BuildOutcome::Skipped(SkipReason::Boilerplate)
        );
        assert!(builder
            .build(&line_item(1, "", "Please save", ""))
            .accepted()
            .is_some());
        assert_eq!(
            builder.build(&grade_row(0, "Grades", "", "")),
            BuildOutcome::Skipped(SkipReason::HeaderRow)
        );
    }
}
