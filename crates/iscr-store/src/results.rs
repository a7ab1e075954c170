//! The per-year classified-cases table.
//!
//! Rows are held as Arrow string columns and written as CSV with a header
//! (`case_id, outcome, guideline_flags, rationale_summary, model_version,
//! classified_at, source_url`). Each upsert rewrites the whole table through
//! [`write_atomic`], so a crash leaves either the previous table or the new
//! one on disk, never a partial row.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, Mutex};

use arrow::array::{Array, ArrayRef, StringArray};
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, SecondsFormat, Utc};
use iscr_core::{ClassificationResult, Outcome, output};
use tracing::{debug, info};

use crate::{CacheLayout, StoreError, write_atomic};

/// A stored row: the classification plus the document URL it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedCase {
    pub result: ClassificationResult,
    pub source_url: String,
}

impl ClassifiedCase {
    pub fn case_id(&self) -> &str {
        &self.result.case_id
    }
}

/// Reader/writer for `output/classified_cases_{year}.csv`.
///
/// Upserts are serialised through a lock shared by every clone, so concurrent
/// tasks may each hold a handle to one store.
#[derive(Debug, Clone)]
pub struct ResultStore {
    layout: CacheLayout,
    write_lock: Arc<Mutex<()>>,
}

impl ResultStore {
    pub fn new(layout: CacheLayout) -> Self {
        Self {
            layout,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// All rows for `year` in table order. A missing table is empty.
    pub fn load(&self, year: i32) -> Result<Vec<ClassifiedCase>, StoreError> {
        read_table(&self.layout.output_path(year))
    }

    /// Insert `case`, replacing any existing row with the same `case_id` in place.
    pub fn upsert(&self, year: i32, case: ClassifiedCase) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let path = self.layout.output_path(year);
        let mut rows = read_table(&path)?;
        match rows.iter_mut().find(|row| row.case_id() == case.case_id()) {
            Some(existing) => {
                debug!(year, case_id = case.case_id(), "replacing classified row");
                *existing = case;
            }
            None => rows.push(case),
        }

        let csv = encode_table(&rows)?;
        write_atomic(&path, &csv)?;
        info!(year, rows = rows.len(), path = %path.display(), "classified table updated");
        Ok(())
    }
}

// ── Encoding ──

fn to_batch(rows: &[ClassifiedCase]) -> Result<RecordBatch, StoreError> {
    let columns = vec![
        string_column(rows, |r| r.result.case_id.clone()),
        string_column(rows, |r| r.result.outcome.as_str().to_string()),
        string_column(rows, |r| r.result.flags_cell()),
        string_column(rows, |r| r.result.rationale_summary.clone()),
        string_column(rows, |r| r.result.model_version.clone()),
        string_column(rows, |r| {
            r.result
                .classified_at
                .to_rfc3339_opts(SecondsFormat::AutoSi, true)
        }),
        string_column(rows, |r| r.source_url.clone()),
    ];

    Ok(RecordBatch::try_new(
        Arc::new(output::classified_cases_schema()),
        columns,
    )?)
}

fn string_column(rows: &[ClassifiedCase], value: impl Fn(&ClassifiedCase) -> String) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(rows.iter().map(value)))
}

fn encode_table(rows: &[ClassifiedCase]) -> Result<Vec<u8>, StoreError> {
    let batch = to_batch(rows)?;
    let mut writer = WriterBuilder::new().with_header(true).build(Vec::new());
    writer.write(&batch)?;
    Ok(writer.into_inner())
}

// ── Decoding ──

fn read_table(path: &Path) -> Result<Vec<ClassifiedCase>, StoreError> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let mut reader = BufReader::new(file);
    let mut header = String::new();
    reader
        .read_line(&mut header)
        .map_err(|e| StoreError::io(path, e))?;
    if header.trim().is_empty() {
        return Ok(Vec::new());
    }
    let columns: Vec<&str> = header.trim_end().split(',').collect();
    if columns != output::COLUMNS {
        return Err(StoreError::Malformed {
            path: path.to_path_buf(),
            detail: format!("unexpected header {:?}", header.trim_end()),
        });
    }

    // Header already consumed above.
    let csv = ReaderBuilder::new(Arc::new(output::classified_cases_schema()))
        .with_header(false)
        .build(reader)?;

    let mut rows = Vec::new();
    for batch in csv {
        rows.extend(from_batch(path, &batch?)?);
    }
    Ok(rows)
}

fn from_batch(path: &Path, batch: &RecordBatch) -> Result<Vec<ClassifiedCase>, StoreError> {
    let case_id = column(path, batch, output::CASE_ID)?;
    let outcome = column(path, batch, output::OUTCOME)?;
    let flags = column(path, batch, output::GUIDELINE_FLAGS)?;
    let rationale = column(path, batch, output::RATIONALE_SUMMARY)?;
    let model = column(path, batch, output::MODEL_VERSION)?;
    let classified_at = column(path, batch, output::CLASSIFIED_AT)?;
    let source_url = column(path, batch, output::SOURCE_URL)?;
    let malformed = |detail: String| StoreError::Malformed {
        path: path.to_path_buf(),
        detail,
    };

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let id = get(case_id, i);
        let parsed_outcome = Outcome::from_label(get(outcome, i))
            .ok_or_else(|| malformed(format!("row {id}: bad outcome {:?}", get(outcome, i))))?;
        let timestamp = DateTime::parse_from_rfc3339(get(classified_at, i))
            .map_err(|e| malformed(format!("row {id}: bad classified_at: {e}")))?
            .with_timezone(&Utc);

        rows.push(ClassifiedCase {
            result: ClassificationResult {
                case_id: id.to_string(),
                outcome: parsed_outcome,
                guideline_flags: ClassificationResult::parse_flags_cell(get(flags, i)),
                rationale_summary: get(rationale, i).to_string(),
                model_version: get(model, i).to_string(),
                classified_at: timestamp,
            },
            source_url: get(source_url, i).to_string(),
        });
    }
    Ok(rows)
}

fn column<'a>(
    path: &Path,
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::Malformed {
            path: path.to_path_buf(),
            detail: format!("missing '{name}' column"),
        })
}

/// String value at `row`, treating null as empty.
fn get(array: &StringArray, row: usize) -> &str {
    if array.is_null(row) {
        ""
    } else {
        array.value(row)
    }
}
