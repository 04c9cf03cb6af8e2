//! Exam registry tools.
//!
//! Tools: insert, select, delete
//!
//! Each tool forwards a caller-supplied SQL string to the database verbatim.
//! Failures never surface as errors here; they come back as `false` after
//! being logged by the store (unknown tools and missing arguments are the
//! only error paths).

use serde_json::{Map, Value as JsonValue};

use crate::convert::{get_optional_string, get_string_arg, rows_to_tuples};
use crate::db::ExamStore;
use crate::error::{McpError, Result};
use crate::schema;
use crate::tools::ToolDef;

/// Query used by the select tool when the caller supplies none.
pub const DEFAULT_SELECT: &str = "SELECT * FROM exams";

/// Get all exam tool definitions.
pub fn tools() -> Vec<ToolDef> {
    vec![
        ToolDef::new(
            "insert",
            "Add a new exam record with a raw SQL INSERT statement, e.g. \
             INSERT INTO exams (patient_name, age, result) VALUES ('Alice Guerra', 25, 'Retinopatia diabética'). \
             patient_name (text), age (integer) and result (text) are required; \
             exam_id is generated automatically. Returns true when the row was \
             inserted, false otherwise.",
            schema!(object {
                required: { "query": string }
            }),
        ),
        ToolDef::new(
            "select",
            "Read exam records with a raw SQL SELECT statement. Defaults to \
             SELECT * FROM exams. Returns rows as arrays in column order; the \
             default query yields [exam_id, patient_name, age, result]. \
             Returns false when the query fails.",
            schema!(object {
                optional: { "query": string }
            }),
        ),
        ToolDef::new(
            "delete",
            "Remove exam records with a raw SQL DELETE statement, e.g. \
             DELETE FROM exams WHERE patient_name='João Silva' AND age=45. \
             Returns true when the statement executed, false otherwise.",
            schema!(object {
                required: { "query": string }
            }),
        ),
    ]
}

/// Dispatch an exam tool call.
pub async fn dispatch(
    store: &ExamStore,
    name: &str,
    args: Map<String, JsonValue>,
) -> Result<JsonValue> {
    match name {
        "insert" => {
            let query = get_string_arg(&args, "query")?;
            Ok(JsonValue::Bool(store.execute_statement(&query).await))
        }

        "select" => {
            let query =
                get_optional_string(&args, "query").unwrap_or_else(|| DEFAULT_SELECT.to_string());
            match store.fetch_rows(&query).await {
                Some(rows) => Ok(rows_to_tuples(&rows)),
                None => Ok(JsonValue::Bool(false)),
            }
        }

        "delete" => {
            let query = get_string_arg(&args, "query")?;
            Ok(JsonValue::Bool(store.execute_statement(&query).await))
        }

        _ => Err(McpError::UnknownTool(name.to_string())),
    }
}
