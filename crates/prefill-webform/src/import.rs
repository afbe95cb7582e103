//! Import pipeline: delimited file -> records of one scope.
//!
//! Steps, each one a hard gate:
//! 1. Read the header line and split it on the scope's delimiter
//! 2. Require at least one column shared with the scope's fields
//! 3. Require a `hash` column (case-insensitive)
//! 4. Delete every existing record of the scope
//! 5. Index and insert each data line; the first duplicate hash aborts
//! 6. Require one insert per data line
//!
//! Replacing a scope is not atomic. A failure in step 5 or 6 leaves the
//! old records deleted and the rows inserted so far in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use prefill_core::{Record, RecordStore, StoreError};

use crate::collaborators::{FormDefinitions, Uploads};
use crate::config::{Delimiter, ImportConfig, SETTING_DELIMITER};
use crate::error::{ImportError, ImportResult};
use crate::indexer::{self, RowWarning};
use crate::lines::LineReader;
use crate::schema;

/// Outcome of a successful import.
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub scope: String,
    /// Records written (equals the number of data lines)
    pub inserted: usize,
    /// Rows stored despite a column-count mismatch
    pub warnings: Vec<RowWarning>,
}

/// Runs imports against a record store.
pub struct Importer {
    store: Arc<RecordStore>,
    forms: Arc<dyn FormDefinitions>,
    config: ImportConfig,
}

impl Importer {
    pub fn new(store: Arc<RecordStore>, forms: Arc<dyn FormDefinitions>, config: ImportConfig) -> Self {
        Self { store, forms, config }
    }

    /// Import `path` into `scope`, replacing the scope's records.
    ///
    /// The file is deleted afterwards whether or not the import succeeded.
    pub fn import_file(&self, scope: &str, path: &Path) -> ImportResult<ImportReport> {
        let result = self.run(scope, path);
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("Could not delete import source {}: {}", path.display(), e);
        }
        result
    }

    /// Import an upload, then discard it whatever the outcome.
    pub fn import_upload(&self, scope: &str, uploads: &dyn Uploads, id: &str) -> ImportResult<ImportReport> {
        let path = uploads.locate(id).map_err(|e| ImportError::Io {
            path: PathBuf::from(id),
            kind: std::io::ErrorKind::NotFound,
            message: e.message,
        })?;
        let result = self.run(scope, &path);
        if let Err(e) = uploads.discard(id) {
            log::warn!("Could not discard upload {}: {}", id, e);
        }
        result
    }

    fn run(&self, scope: &str, path: &Path) -> ImportResult<ImportReport> {
        let result = self.replace_scope(scope, path);
        match &result {
            Ok(report) => log::info!(
                "Imported {} records into '{}' ({} warnings)",
                report.inserted,
                scope,
                report.warnings.len()
            ),
            Err(e) => log::error!("Import into '{}' failed: {}", scope, e),
        }
        result
    }

    /// The scope's delimiter setting, or the configured default.
    fn delimiter_for(&self, scope: &str) -> Delimiter {
        match self.forms.setting(scope, SETTING_DELIMITER) {
            Ok(Some(value)) => value.as_text().map_or(self.config.delimiter, Delimiter::from_setting),
            Ok(None) => self.config.delimiter,
            Err(e) => {
                log::error!("Cannot read delimiter setting of '{}': {}", scope, e);
                self.config.delimiter
            }
        }
    }

    fn replace_scope(&self, scope: &str, path: &Path) -> ImportResult<ImportReport> {
        let delimiter = self.delimiter_for(scope);

        let header_line = LineReader::open(path, 1)
            .map_err(|e| ImportError::io(path, e))?
            .next()
            .transpose()
            .map_err(|e| ImportError::io(path, e))?
            .unwrap_or_default();
        let header = delimiter.split(&header_line);

        if !schema::validate(self.forms.as_ref(), scope, &header) {
            return Err(ImportError::SchemaMismatch { scope: scope.to_string() });
        }

        let hash_column = header
            .iter()
            .position(|column| column.to_lowercase() == "hash")
            .ok_or(ImportError::MissingHashColumn)?;

        let mut columns = header;
        columns.remove(hash_column);

        self.store.delete_scope(scope)?;

        let outcome = self.insert_rows(scope, path, delimiter, hash_column, &columns);
        // Sync whatever made it in, even on failure; those rows stay
        let synced = self.store.sync();
        let (data_lines, inserted, warnings) = outcome?;
        synced?;

        if inserted != data_lines {
            return Err(ImportError::RowCountMismatch { expected: data_lines, inserted });
        }

        if let Err(e) = self.store.maybe_compact() {
            log::warn!("WAL compaction after import of '{}' failed: {}", scope, e);
        }

        Ok(ImportReport { scope: scope.to_string(), inserted, warnings })
    }

    fn insert_rows(
        &self,
        scope: &str,
        path: &Path,
        delimiter: Delimiter,
        hash_column: usize,
        columns: &[String],
    ) -> ImportResult<(usize, usize, Vec<RowWarning>)> {
        let mut data_lines = 0;
        let mut inserted = 0;
        let mut warnings = Vec::new();

        let lines = LineReader::open(path, 0).map_err(|e| ImportError::io(path, e))?;
        for (line_number, line) in lines.enumerate() {
            let line = line.map_err(|e| ImportError::io(path, e))?;
            if line_number == 0 {
                continue;
            }

            if let Some(deadline) = self.config.deadline {
                if Instant::now() >= deadline {
                    return Err(ImportError::ImportTimeout { inserted });
                }
            }

            data_lines += 1;
            let mut values = delimiter.split(&line);
            if hash_column >= values.len() {
                return Err(ImportError::MissingHashValue { line: line_number });
            }
            let hash = values.remove(hash_column);
            if hash.trim().is_empty() {
                return Err(ImportError::MissingHashValue { line: line_number });
            }

            let row = indexer::index(columns, &values, delimiter, line_number);
            if let Some(warning) = row.warning {
                log::warn!("{} (line {})", warning, warning.line_number);
                warnings.push(warning);
            }

            match self.store.insert(Record::new(scope, hash, row.fields)) {
                Ok(()) => inserted += 1,
                Err(StoreError::DuplicateHash { hash, .. }) => {
                    return Err(ImportError::DuplicateHash { hash, line: line_number });
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok((data_lines, inserted, warnings))
    }
}
