//! Pairs header columns with row values.
//!
//! Rows whose length differs from the header are still indexed: columns
//! are paired up to the shorter of the two and the row is reported as a
//! warning rather than rejected.

use prefill_core::FieldMap;

use crate::config::Delimiter;

/// A row that did not line up with the header. The import still stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowWarning {
    /// 0-based line number in the source file
    pub line_number: usize,
    /// The row's values joined by the active delimiter
    pub line: String,
}

impl std::fmt::Display for RowWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "The line {} does not match the header columns, it has still been imported but might lead to prefill issues.",
            self.line
        )
    }
}

#[derive(Debug, Clone)]
pub struct IndexedRow {
    pub fields: FieldMap,
    pub warning: Option<RowWarning>,
}

/// Trim Unicode whitespace from both ends and escape HTML special characters.
pub fn sanitize(value: &str) -> String {
    let trimmed = value.trim();
    let mut out = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Build the field map for one data row.
///
/// `header` and `values` are raw cells with the hash column already removed;
/// both are sanitized here.
pub fn index(header: &[String], values: &[String], delimiter: Delimiter, line_number: usize) -> IndexedRow {
    let header: Vec<String> = header.iter().map(|h| sanitize(h)).collect();
    let values: Vec<String> = values.iter().map(|v| sanitize(v)).collect();

    let fields: FieldMap = header.iter().cloned().zip(values.iter().cloned()).collect();

    let warning = (header.len() != values.len()).then(|| RowWarning {
        line_number,
        line: delimiter.join(&values),
    });

    IndexedRow { fields, warning }
}
