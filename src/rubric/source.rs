// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only access to the rubric source store.
//!
//! The source is a SQLite file with two tables: rubric line items and the
//! grade-to-score map. Cells are dynamically typed and nullable; this module
//! normalizes them into the typed row structs in [`super::rows`] so the
//! record builder never sees a null.

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

use super::rows::{GradingMapEntry, RubricLineItem, SourceRow};
use crate::errors::{RagError, Result};

/// Anything that can hand the ingestion pipeline its full set of rows.
pub trait RowSource {
    /// Reads every row of both tables, line items first.
    fn read_rows(&self) -> Result<Vec<SourceRow>>;
}

impl RowSource for Vec<SourceRow> {
    fn read_rows(&self) -> Result<Vec<SourceRow>> {
        Ok(self.clone())
    }
}

/// Table and column names of the source store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayout {
    pub line_items_table: String,
    pub grading_map_table: String,
    pub question_column: String,
    pub section_column: String,
    pub points_column: String,
    pub grade_column: String,
    pub from_column: String,
    pub to_column: String,
}

impl Default for SourceLayout {
    fn default() -> Self {
        Self {
            line_items_table: "Line_By_Line".to_string(),
            grading_map_table: "Grading_Map".to_string(),
            question_column: "GEM_2025_Thrive_Map_GRADING_FORM".to_string(),
            section_column: "Column_1".to_string(),
            points_column: "Column_3".to_string(),
            grade_column: "Grade".to_string(),
            from_column: "From".to_string(),
            to_column: "To".to_string(),
        }
    }
}

/// SQLite-backed rubric source.
pub struct SqliteSource {
    conn: Connection,
    layout: SourceLayout,
}

impl SqliteSource {
    /// Opens the source database read-only. A missing file is an error.
    pub fn open<P: AsRef<Path>>(path: P, layout: SourceLayout) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            RagError::source_unavailable(format!("cannot open {}", path.display()), e)
        })?;
        Ok(Self { conn, layout })
    }

    /// Wraps an existing connection (used for in-memory fixtures).
    pub fn from_connection(conn: Connection, layout: SourceLayout) -> Self {
        Self { conn, layout }
    }

    /// Reads the rubric line items table.
    pub fn line_items(&self) -> Result<Vec<RubricLineItem>> {
        let layout = &self.layout;
        let cells = self.read_table(
            &layout.line_items_table,
            &[
                &layout.section_column,
                &layout.question_column,
                &layout.points_column,
            ],
        )?;

        Ok(cells
            .into_iter()
            .enumerate()
            .map(|(row_index, mut cols)| {
                let points = cols.pop().unwrap_or_default();
                let question = cols.pop().unwrap_or_default();
                let section_code = cols.pop().unwrap_or_default();
                RubricLineItem {
                    row_index,
                    section_code,
                    question,
                    points,
                }
            })
            .collect())
    }

    /// Reads the grading map table.
    pub fn grading_map(&self) -> Result<Vec<GradingMapEntry>> {
        let layout = &self.layout;
        let cells = self.read_table(
            &layout.grading_map_table,
            &[&layout.grade_column, &layout.from_column, &layout.to_column],
        )?;

        Ok(cells
            .into_iter()
            .enumerate()
            .map(|(row_index, mut cols)| {
                let to = cols.pop().unwrap_or_default();
                let from = cols.pop().unwrap_or_default();
                let grade = cols.pop().unwrap_or_default();
                GradingMapEntry {
                    row_index,
                    grade,
                    from,
                    to,
                }
            })
            .collect())
    }

    /// Full-table read returning the normalized values of `wanted` columns
    /// for every row, in rowid order. Columns missing from the table read
    /// as empty strings.
    fn read_table(&self, table: &str, wanted: &[&String]) -> Result<Vec<Vec<String>>> {
        let sql = format!("SELECT * FROM {} ORDER BY rowid", quote_ident(table));
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| RagError::source_unavailable(format!("cannot read table {}", table), e))?;

        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let positions: Vec<Option<usize>> = wanted
            .iter()
            .map(|column| find_column(&names, column))
            .collect();

        for (column, pos) in wanted.iter().zip(&positions) {
            if pos.is_none() {
                tracing::warn!("column {} not found in table {}; reading as empty", column, table);
            }
        }

        let rows = stmt
            .query_map([], |row| {
                positions
                    .iter()
                    .map(|pos| match pos {
                        Some(idx) => row.get::<_, Value>(*idx).map(|v| normalize_value(&v)),
                        None => Ok(String::new()),
                    })
                    .collect::<rusqlite::Result<Vec<String>>>()
            })
            .and_then(|mapped| mapped.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| RagError::source_unavailable(format!("cannot read table {}", table), e))?;

        tracing::debug!("read {} rows from {}", rows.len(), table);
        Ok(rows)
    }
}

impl RowSource for SqliteSource {
    fn read_rows(&self) -> Result<Vec<SourceRow>> {
        let mut rows: Vec<SourceRow> = self
            .line_items()?
            .into_iter()
            .map(SourceRow::LineItem)
            .collect();
        rows.extend(self.grading_map()?.into_iter().map(SourceRow::GradingMap));
        Ok(rows)
    }
}

/// Normalizes a dynamically typed SQLite cell into a display string.
///
/// Nulls, NaN and the `nan`/`None` text artefacts left by spreadsheet
/// exports all become the empty string.
pub fn normalize_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => {
            if !f.is_finite() {
                String::new()
            } else if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Value::Text(s) => {
            let trimmed = s.trim();
            match trimmed {
                "nan" | "NaN" | "None" => String::new(),
                _ => trimmed.to_string(),
            }
        }
        Value::Blob(b) => String::from_utf8_lossy(b).trim().to_string(),
    }
}

fn find_column(names: &[String], wanted: &str) -> Option<usize> {
    names
        .iter()
        .position(|n| n == wanted)
        .or_else(|| names.iter().position(|n| n.eq_ignore_ascii_case(wanted)))
}

/// Quotes SQLite identifiers, escaping embedded quotes.
fn quote_ident(input: &str) -> String {
    format!("\"{}\"", input.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric::SourceTable;

    fn fixture() -> SqliteSource {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE Line_By_Line (
                GEM_2025_Thrive_Map_GRADING_FORM TEXT,
                Column_1 TEXT,
                Column_3 REAL
            );
            INSERT INTO Line_By_Line VALUES ('Please save a copy', NULL, NULL);
            INSERT INTO Line_By_Line VALUES ('Describe your passions and goals', 'A1', 5.0);
            INSERT INTO Line_By_Line VALUES (NULL, 'A2', 2.5);

            CREATE TABLE Grading_Map (Grade TEXT, "From" INTEGER, "To" INTEGER);
            INSERT INTO Grading_Map VALUES ('Grade Map', NULL, NULL);
            INSERT INTO Grading_Map VALUES ('B', 70, 79);
            "#,
        )
        .unwrap();
        SqliteSource::from_connection(conn, SourceLayout::default())
    }

    #[test]
    fn reads_line_items_in_rowid_order() {
        let source = fixture();
        let items = source.line_items().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].row_index, 1);
        assert_eq!(items[1].section_code, "A1");
        assert_eq!(items[1].points, "5");
        assert_eq!(items[2].question, "");
        assert_eq!(items[2].points, "2.5");
    }

    #[test]
    fn reads_grading_map() {
        let source = fixture();
        let entries = source.grading_map().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].grade, "Grade Map");
        assert_eq!(entries[0].from, "");
        assert_eq!(entries[1].grade, "B");
        assert_eq!(entries[1].from, "70");
        assert_eq!(entries[1].to, "79");
    }

    #[test]
    fn read_rows_covers_both_tables() {
        let rows = fixture().read_rows().unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].table(), SourceTable::LineItems);
        assert_eq!(rows[4].table(), SourceTable::GradingMap);
    }

    #[test]
    fn missing_table_is_source_unavailable() {
        let conn = Connection::open_in_memory().unwrap();
        let source = SqliteSource::from_connection(conn, SourceLayout::default());
        let err = source.read_rows().unwrap_err();
        assert!(matches!(err, RagError::SourceUnavailable { .. }));
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result = SqliteSource::open(dir.path().join("nope.db"), SourceLayout::default());
        assert!(matches!(result, Err(RagError::SourceUnavailable { .. })));
    }

    #[test]
    fn missing_column_reads_empty() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE Line_By_Line (GEM_2025_Thrive_Map_GRADING_FORM TEXT);
            INSERT INTO Line_By_Line VALUES ('Only a question');
            "#,
        )
        .unwrap();
        let source = SqliteSource::from_connection(conn, SourceLayout::default());
        let items = source.line_items().unwrap();
        assert_eq!(items[0].question, "Only a question");
        assert_eq!(items[0].section_code, "");
        assert_eq!(items[0].points, "");
    }

    #[test]
    fn normalize_value_handles_nulls_and_floats() {
        assert_eq!(normalize_value(&Value::Null), "");
        assert_eq!(normalize_value(&Value::Real(f64::NAN)), "");
        assert_eq!(normalize_value(&Value::Real(3.0)), "3");
        assert_eq!(normalize_value(&Value::Real(0.5)), "0.5");
        assert_eq!(normalize_value(&Value::Integer(7)), "7");
        assert_eq!(normalize_value(&Value::Text("  nan ".into())), "");
        assert_eq!(normalize_value(&Value::Text(" B ".into())), "B");
    }
}
