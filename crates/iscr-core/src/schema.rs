/// Arrow schema of the per-year output table (`classified_cases_<YEAR>.csv`).
///
/// This is the only contract the dashboard reads. Column order is fixed.
pub mod output {
    use arrow::datatypes::{DataType, Field, Schema};

    pub const CASE_ID: &str = "case_id";
    pub const OUTCOME: &str = "outcome";
    pub const GUIDELINE_FLAGS: &str = "guideline_flags";
    pub const RATIONALE_SUMMARY: &str = "rationale_summary";
    pub const MODEL_VERSION: &str = "model_version";
    pub const CLASSIFIED_AT: &str = "classified_at";
    pub const SOURCE_URL: &str = "source_url";

    pub const COLUMNS: [&str; 7] = [
        CASE_ID,
        OUTCOME,
        GUIDELINE_FLAGS,
        RATIONALE_SUMMARY,
        MODEL_VERSION,
        CLASSIFIED_AT,
        SOURCE_URL,
    ];

    /// Schema for classified case rows. Every column is text so the CSV is
    /// readable without type inference; `classified_at` is RFC 3339.
    pub fn classified_cases_schema() -> Schema {
        Schema::new(vec![
            Field::new(CASE_ID, DataType::Utf8, false),
            Field::new(OUTCOME, DataType::Utf8, false),
            Field::new(GUIDELINE_FLAGS, DataType::Utf8, true),
            Field::new(RATIONALE_SUMMARY, DataType::Utf8, true),
            Field::new(MODEL_VERSION, DataType::Utf8, true),
            Field::new(CLASSIFIED_AT, DataType::Utf8, false),
            Field::new(SOURCE_URL, DataType::Utf8, true),
        ])
    }

    /// Output file name for a year.
    pub fn file_name(year: i32) -> String {
        format!("classified_cases_{year}.csv")
    }
}
