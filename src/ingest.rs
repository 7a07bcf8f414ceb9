//! # Ingestion
//!
//! Loads a delimited file of precomputed embeddings into a collection.
//!
//! The pieces, leaves first:
//!
//! - [`RowSchema`]: an ordered list of `(column name, target field, parser)`
//!   entries, resolved against the header row by name.
//! - [`IdGenerator`]: hands out `PK_0`, `PK_1`, ... for rows without an
//!   explicit id. One generator belongs to one ingestion run.
//! - [`CsvRecordSource`]: a lazy, finite producer of [`Record`]s, one per data
//!   row, in file order.
//! - [`ingest`]: drains a source into a [`MemoryStore`] collection, checking
//!   the cancellation token between rows and reporting progress per batch.
//! - [`CsvLoader`]: downloads the file when it is missing, then runs the above.
//!
//! ## Malformed rows
//!
//! A row whose embedding does not parse (or has the wrong length) is handled
//! per [`MalformedRowPolicy`]. `Skip`, the default, records the row in
//! [`IngestReport::skipped`] and keeps going; `Abort` stops the run with
//! [`IngestError::Aborted`]. Either way the records already upserted stay put.
//! Unreadable files and missing columns always end the run.
//!
//! The source file is read with `tokio::fs` before parsing; row mapping and
//! upserts are in-memory work, and the run yields to the runtime after every
//! progress batch.
//!
//! ## Example
//! ```rust
//! use olympiq::ingest::{ingest, CsvRecordSource, IdGenerator, IngestOptions, RowSchema};
//! use olympiq::vector_store::MemoryStore;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let csv = "text,embedding\n\"Curling, mixed doubles\",\"[1.0, 0.0]\"\n";
//! let source = CsvRecordSource::from_reader(csv.as_bytes(), RowSchema::embeddings_csv(), IdGenerator::default())?;
//!
//! let store = MemoryStore::new();
//! store.create_collection("winterOlympics")?;
//! let report = ingest(&store, "winterOlympics", source, &IngestOptions::default(), &CancellationToken::new(), |_| {}).await?;
//! assert_eq!(report.ingested, 1);
//! assert_eq!(store.get("winterOlympics", "PK_0")?.text(), "Curling, mixed doubles");
//! # Ok(()) }
//! ```

use serde::{Deserialize, Serialize};
use std::{
    io::{self, Cursor, Read},
    path::{Path, PathBuf},
};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::OlympiqConfig;
use crate::error::IngestError;
use crate::record::{Record, RecordMetadata};
use crate::vector_store::MemoryStore;

/// What a run does with a row that cannot become a valid record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MalformedRowPolicy {
    /// Count the row as skipped and continue.
    #[default]
    Skip,
    /// Stop at the row; earlier records are kept.
    Abort,
}

/// Synthetic ids for rows that do not carry one.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    prefix: String,
    next: u64,
}

impl IdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::starting_at(prefix, 0)
    }

    pub fn starting_at(prefix: impl Into<String>, next: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next,
        }
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        id
    }

    /// How many ids this generator has handed out past its starting point.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new("PK_")
    }
}

/// Record field a column feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    Id,
    Text,
    Embedding,
    Description,
    ExternalSource,
}

impl RecordField {
    fn label(self) -> &'static str {
        match self {
            RecordField::Id => "id",
            RecordField::Text => "text",
            RecordField::Embedding => "embedding",
            RecordField::Description => "description",
            RecordField::ExternalSource => "external_source_name",
        }
    }
}

/// A parsed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Vector(Vec<f32>),
}

/// Turns a raw cell into a [`FieldValue`]; the error string ends up in the
/// skipped-row report.
pub type FieldParser = fn(&str) -> Result<FieldValue, String>;

pub fn parse_text(raw: &str) -> Result<FieldValue, String> {
    Ok(FieldValue::Text(raw.to_string()))
}

/// Parse a JSON array of floats, e.g. `[0.1, -0.2, 0.3]`.
pub fn parse_embedding(raw: &str) -> Result<FieldValue, String> {
    let values: Vec<f32> = serde_json::from_str(raw.trim()).map_err(|e| e.to_string())?;
    if values.is_empty() {
        return Err("empty vector".to_string());
    }
    if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
        return Err(format!("component {pos} is not a finite f32"));
    }
    Ok(FieldValue::Vector(values))
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub field: RecordField,
    pub parser: FieldParser,
}

/// Ordered column bindings consumed by [`CsvRecordSource`].
#[derive(Debug, Clone, Default)]
pub struct RowSchema {
    columns: Vec<Column>,
}

impl RowSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, name: impl Into<String>, field: RecordField, parser: FieldParser) -> Self {
        self.columns.push(Column {
            name: name.into(),
            field,
            parser,
        });
        self
    }

    /// `text` and `embedding` columns, as in the Winter Olympics export.
    pub fn embeddings_csv() -> Self {
        Self::new()
            .column("text", RecordField::Text, parse_text)
            .column("embedding", RecordField::Embedding, parse_embedding)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Pair each column with its position in `headers`.
    fn resolve(&self, headers: &csv::StringRecord) -> Result<Vec<(usize, Column)>, IngestError> {
        self.columns
            .iter()
            .map(|col| {
                headers
                    .iter()
                    .position(|h| h == col.name)
                    .map(|idx| (idx, col.clone()))
                    .ok_or_else(|| IngestError::MissingColumn(col.name.clone()))
            })
            .collect()
    }
}

/// Lazy producer of records from CSV rows.
///
/// Yields one item per data row, in file order. Row numbers in errors are
/// 1-based and exclude the header.
pub struct CsvRecordSource<R> {
    reader: csv::Reader<R>,
    columns: Vec<(usize, Column)>,
    ids: IdGenerator,
    source_name: Option<String>,
    row: usize,
    buf: csv::StringRecord,
    done: bool,
}

impl CsvRecordSource<Cursor<Vec<u8>>> {
    /// Read `path` through `tokio::fs`, then parse rows from memory, so
    /// draining the source never blocks the runtime on disk I/O.
    pub async fn load(path: &Path, schema: RowSchema, ids: IdGenerator) -> Result<Self, IngestError> {
        let bytes = tokio::fs::read(path).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "source file read");
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        let mut source = Self::from_reader(Cursor::new(bytes), schema, ids)?;
        source.source_name = name;
        Ok(source)
    }
}

impl<R: Read> CsvRecordSource<R> {
    pub fn from_reader(reader: R, schema: RowSchema, ids: IdGenerator) -> Result<Self, IngestError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);
        let headers = reader.headers()?.clone();
        let columns = schema.resolve(&headers)?;
        debug!(columns = columns.len(), "resolved source columns");

        Ok(Self {
            reader,
            columns,
            ids,
            source_name: None,
            row: 0,
            buf: csv::StringRecord::new(),
            done: false,
        })
    }

    /// Tag every produced record with `name` as its external source.
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Data rows consumed so far.
    pub fn rows_read(&self) -> usize {
        self.row
    }

    fn map_row(&mut self) -> Result<Record, IngestError> {
        let row = self.row;
        let mut id = None;
        let mut text = None;
        let mut embedding = None;
        let mut metadata = RecordMetadata {
            external_source_name: self.source_name.clone(),
            ..Default::default()
        };

        for (idx, col) in &self.columns {
            let raw = self.buf.get(*idx).unwrap_or_default();
            let parsed = (col.parser)(raw);
            match (col.field, parsed) {
                (RecordField::Embedding, Ok(FieldValue::Vector(v))) => embedding = Some(v),
                (RecordField::Embedding, Ok(FieldValue::Text(_))) => {
                    return Err(IngestError::MalformedEmbedding {
                        row,
                        reason: format!("column {:?} did not parse to a vector", col.name),
                    });
                }
                (RecordField::Embedding, Err(reason)) => {
                    return Err(IngestError::MalformedEmbedding { row, reason });
                }
                (_, Err(reason)) => {
                    return Err(IngestError::MalformedRow {
                        row,
                        reason: format!("column {:?}: {reason}", col.name),
                    });
                }
                (field, Ok(FieldValue::Vector(_))) => {
                    return Err(IngestError::MalformedRow {
                        row,
                        reason: format!("column {:?} is not valid {}", col.name, field.label()),
                    });
                }
                (RecordField::Id, Ok(FieldValue::Text(s))) => id = Some(s).filter(|s| !s.is_empty()),
                (RecordField::Text, Ok(FieldValue::Text(s))) => text = Some(s),
                (RecordField::Description, Ok(FieldValue::Text(s))) => {
                    metadata.description = Some(s).filter(|s| !s.is_empty())
                }
                (RecordField::ExternalSource, Ok(FieldValue::Text(s))) => {
                    metadata.external_source_name = Some(s).filter(|s| !s.is_empty())
                }
            }
        }

        let text = text.ok_or(IngestError::MissingField { row, field: "text" })?;
        let embedding = embedding.ok_or(IngestError::MissingField {
            row,
            field: "embedding",
        })?;
        let id = id.unwrap_or_else(|| self.ids.next_id());

        Ok(Record::new(id, text, embedding)
            .with_metadata(metadata)
            .as_reference())
    }
}

impl<R: Read> Iterator for CsvRecordSource<R> {
    type Item = Result<Record, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_record(&mut self.buf) {
            Ok(false) => {
                self.done = true;
                None
            }
            Ok(true) => {
                self.row += 1;
                Some(self.map_row())
            }
            Err(err) if err.is_io_error() => {
                self.done = true;
                Some(Err(IngestError::Csv(err)))
            }
            Err(err) => {
                self.row += 1;
                Some(Err(IngestError::MalformedRow {
                    row: self.row,
                    reason: err.to_string(),
                }))
            }
        }
    }
}

/// Knobs for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub policy: MalformedRowPolicy,
    /// Progress is reported, and the task yields, every this many records.
    pub progress_interval: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            policy: MalformedRowPolicy::Skip,
            progress_interval: 1000,
        }
    }
}

impl IngestOptions {
    pub fn from_config(config: &OlympiqConfig) -> Self {
        Self {
            policy: config.malformed_rows,
            progress_interval: config.progress_interval,
        }
    }
}

/// Snapshot handed to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestProgress {
    pub rows_read: usize,
    pub ingested: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: String,
}

/// Outcome of a completed or cancelled run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub rows_read: usize,
    pub ingested: usize,
    pub skipped: Vec<SkippedRow>,
    /// The run stopped early because the token was cancelled.
    pub cancelled: bool,
}

impl IngestReport {
    fn progress(&self) -> IngestProgress {
        IngestProgress {
            rows_read: self.rows_read,
            ingested: self.ingested,
            skipped: self.skipped.len(),
        }
    }
}

/// Upsert every record `source` produces into `collection`, in order.
///
/// The collection must already exist. `cancel` is checked before each row is
/// pulled; once it fires the run returns with `cancelled` set and everything
/// upserted so far left in place. `progress` is called every
/// `options.progress_interval` ingested records and once at the end.
pub async fn ingest<I, F>(
    store: &MemoryStore,
    collection: &str,
    source: I,
    options: &IngestOptions,
    cancel: &CancellationToken,
    mut progress: F,
) -> Result<IngestReport, IngestError>
where
    I: IntoIterator<Item = Result<Record, IngestError>>,
    F: FnMut(IngestProgress),
{
    store.get_collection(collection)?;

    let interval = options.progress_interval.max(1);
    let mut report = IngestReport::default();
    let mut rows = source.into_iter();

    loop {
        if cancel.is_cancelled() {
            info!(collection, ingested = report.ingested, "ingestion cancelled");
            report.cancelled = true;
            break;
        }
        let Some(item) = rows.next() else { break };
        report.rows_read += 1;
        let row = report.rows_read;

        let outcome = item.and_then(|record| {
            store.upsert(collection, record).map_err(|source| {
                if source.is_not_found() {
                    IngestError::Store(source)
                } else {
                    IngestError::Rejected { row, source }
                }
            })
        });

        match outcome {
            Ok(()) => {
                report.ingested += 1;
                if report.ingested % interval == 0 {
                    progress(report.progress());
                    tokio::task::yield_now().await;
                }
            }
            Err(err) => match (err.row(), options.policy) {
                (Some(row), MalformedRowPolicy::Skip) => {
                    warn!(collection, row, "skipping row: {err}");
                    report.skipped.push(SkippedRow {
                        row,
                        reason: err.to_string(),
                    });
                }
                (Some(row), MalformedRowPolicy::Abort) => {
                    warn!(collection, row, ingested = report.ingested, "aborting ingestion: {err}");
                    return Err(IngestError::Aborted {
                        row,
                        ingested: report.ingested,
                        source: Box::new(err),
                    });
                }
                (None, _) => return Err(err),
            },
        }
    }

    progress(report.progress());
    info!(
        collection,
        rows = report.rows_read,
        ingested = report.ingested,
        skipped = report.skipped.len(),
        "ingestion finished"
    );
    Ok(report)
}

/// Fetches the source CSV when needed and loads it into a collection.
#[derive(Debug, Clone)]
pub struct CsvLoader {
    url: String,
    path: PathBuf,
    options: IngestOptions,
}

impl CsvLoader {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            options: IngestOptions::default(),
        }
    }

    pub fn from_config(config: &OlympiqConfig) -> Self {
        Self::new(config.csv_url.clone(), config.csv_path.clone())
            .with_options(IngestOptions::from_config(config))
    }

    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Download the CSV to `path` unless it already exists.
    ///
    /// Bytes are streamed into `<path>.part` and renamed on completion, so an
    /// interrupted download never leaves a truncated file behind. Returns
    /// `true` when a download happened.
    pub async fn ensure_source_file(&self, cancel: &CancellationToken) -> Result<bool, IngestError> {
        if tokio::fs::try_exists(&self.path).await? {
            debug!(path = %self.path.display(), "source file present");
            return Ok(false);
        }
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        info!(url = %self.url, path = %self.path.display(), "downloading source file");
        let mut response = reqwest::get(&self.url).await?.error_for_status()?;

        let mut part = self.path.clone().into_os_string();
        part.push(".part");
        let part = PathBuf::from(part);

        match self.download_to(&part, &mut response, cancel).await {
            Ok(written) => {
                info!(bytes = written, "download complete");
                Ok(true)
            }
            Err(err) => {
                warn!(path = %part.display(), "download failed: {err}");
                let _ = tokio::fs::remove_file(&part).await;
                Err(err)
            }
        }
    }

    async fn download_to(
        &self,
        part: &Path,
        response: &mut reqwest::Response,
        cancel: &CancellationToken,
    ) -> Result<u64, IngestError> {
        let mut file = tokio::fs::File::create(part).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            if cancel.is_cancelled() {
                return Err(IngestError::Io(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "download cancelled",
                )));
            }
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(part, &self.path).await?;
        Ok(written)
    }

    /// A fresh record source over the local file, with its own id sequence.
    pub async fn open_source(&self) -> Result<CsvRecordSource<Cursor<Vec<u8>>>, IngestError> {
        CsvRecordSource::load(&self.path, RowSchema::embeddings_csv(), IdGenerator::default()).await
    }

    /// Create `collection` (idempotently), make sure the file is present and
    /// ingest it.
    pub async fn initialize<F>(
        &self,
        store: &MemoryStore,
        collection: &str,
        cancel: &CancellationToken,
        progress: F,
    ) -> Result<IngestReport, IngestError>
    where
        F: FnMut(IngestProgress),
    {
        store.create_collection(collection)?;
        self.ensure_source_file(cancel).await?;
        let source = self.open_source().await?;
        ingest(store, collection, source, &self.options, cancel, progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use httpmock::prelude::*;
    use std::fmt::Write as _;
    use tempfile::tempdir;

    fn csv_with_rows(n: usize, malformed_at: Option<usize>) -> String {
        let mut csv = String::from("text,embedding\n");
        for row in 1..=n {
            if Some(row) == malformed_at {
                writeln!(csv, "\"Passage {row}, broken\",\"[0.1, oops]\"").unwrap();
            } else {
                writeln!(csv, "\"Passage {row}, fine\",\"[{row}.0, 1.0, 0.5]\"").unwrap();
            }
        }
        csv
    }

    fn source(csv: &str) -> CsvRecordSource<&[u8]> {
        CsvRecordSource::from_reader(csv.as_bytes(), RowSchema::embeddings_csv(), IdGenerator::default())
            .unwrap()
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_collection("wo").unwrap();
        store
    }

    #[test]
    fn test_id_generator_is_isolated_and_monotonic() {
        let mut a = IdGenerator::default();
        let mut b = IdGenerator::default();
        assert_eq!(a.next_id(), "PK_0");
        assert_eq!(a.next_id(), "PK_1");
        assert_eq!(b.next_id(), "PK_0");
        assert_eq!(a.peek(), 2);
        assert_eq!(IdGenerator::starting_at("doc-", 7).next_id(), "doc-7");
    }

    #[test]
    fn test_parse_embedding() {
        assert_eq!(
            parse_embedding(" [1.5, -2, 0.25] "),
            Ok(FieldValue::Vector(vec![1.5, -2.0, 0.25]))
        );
        assert!(parse_embedding("[]").is_err());
        assert!(parse_embedding("not json").is_err());
        assert!(parse_embedding("[\"a\"]").is_err());
        // Overflows f32 and would score NaN against every query.
        assert_eq!(
            parse_embedding("[1e39, 0.5]"),
            Err("component 0 is not a finite f32".to_string())
        );
    }

    #[test]
    fn test_source_yields_records_in_row_order() {
        let csv = "text,embedding\n\"Gold, curling\",\"[1.0, 0.0]\"\nLuge,\"[0.0, 1.0]\"\n";
        let records: Vec<Record> = source(csv).collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id(), "PK_0");
        assert_eq!(records[0].text(), "Gold, curling");
        assert_eq!(records[0].embedding(), &[1.0, 0.0]);
        assert!(records[0].is_reference());
        assert_eq!(records[1].id(), "PK_1");
        assert_eq!(records[1].text(), "Luge");
    }

    #[test]
    fn test_columns_bind_by_header_name() {
        let csv = "embedding,text\n\"[1.0]\",Biathlon\n";
        let records: Vec<Record> = source(csv).collect::<Result<_, _>>().unwrap();
        assert_eq!(records[0].text(), "Biathlon");
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let err = CsvRecordSource::from_reader(
            "text,vector\nA,\"[1.0]\"\n".as_bytes(),
            RowSchema::embeddings_csv(),
            IdGenerator::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, IngestError::MissingColumn(ref c) if c == "embedding"));
    }

    #[test]
    fn test_explicit_id_and_description_columns() {
        let schema = RowSchema::new()
            .column("key", RecordField::Id, parse_text)
            .column("body", RecordField::Text, parse_text)
            .column("desc", RecordField::Description, parse_text)
            .column("vec", RecordField::Embedding, parse_embedding);
        let csv = "key,body,desc,vec\ndoc-9,Skeleton,Sliding sport,\"[0.5]\"\n,Bobsleigh,,\"[0.25]\"\n";
        let records: Vec<Record> =
            CsvRecordSource::from_reader(csv.as_bytes(), schema, IdGenerator::default())
                .unwrap()
                .with_source_name("sports.csv")
                .collect::<Result<_, _>>()
                .unwrap();

        assert_eq!(records[0].id(), "doc-9");
        assert_eq!(records[0].metadata().description.as_deref(), Some("Sliding sport"));
        assert_eq!(
            records[0].metadata().external_source_name.as_deref(),
            Some("sports.csv")
        );
        // Blank id falls back to the generator, which has not been used yet.
        assert_eq!(records[1].id(), "PK_0");
        assert_eq!(records[1].metadata().description, None);
    }

    #[test]
    fn test_malformed_row_does_not_end_the_source() {
        let items: Vec<_> = source(&csv_with_rows(3, Some(2))).collect();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(matches!(
            items[1],
            Err(IngestError::MalformedEmbedding { row: 2, .. })
        ));
        // Ids are only issued to rows that parsed.
        assert_eq!(items[2].as_ref().unwrap().id(), "PK_1");
    }

    #[tokio::test]
    async fn test_skip_policy_counts_failures() {
        let store = store();
        let report = ingest(
            &store,
            "wo",
            source(&csv_with_rows(100, Some(50))),
            &IngestOptions::default(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(report.rows_read, 100);
        assert_eq!(report.ingested, 99);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].row, 50);
        assert!(!report.cancelled);
        assert_eq!(store.len("wo").unwrap(), 99);
    }

    #[tokio::test]
    async fn test_abort_policy_keeps_earlier_rows() {
        let store = store();
        let options = IngestOptions {
            policy: MalformedRowPolicy::Abort,
            ..IngestOptions::default()
        };
        let err = ingest(
            &store,
            "wo",
            source(&csv_with_rows(100, Some(50))),
            &options,
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

        match err {
            IngestError::Aborted { row, ingested, source } => {
                assert_eq!(row, 50);
                assert_eq!(ingested, 49);
                assert!(matches!(*source, IngestError::MalformedEmbedding { row: 50, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.len("wo").unwrap(), 49);
        assert!(store.get("wo", "PK_48").is_ok());
        assert!(store.get("wo", "PK_49").is_err());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_row_follows_policy() {
        let csv = "text,embedding\nA,\"[1.0, 0.0]\"\nB,\"[1.0, 0.0, 0.0]\"\nC,\"[0.0, 1.0]\"\n";
        let store = store();
        let report = ingest(
            &store,
            "wo",
            source(csv),
            &IngestOptions::default(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(report.ingested, 2);
        assert_eq!(report.skipped[0].row, 2);
        assert!(report.skipped[0].reason.contains("dimension mismatch"));
    }

    #[tokio::test]
    async fn test_overflowing_embedding_is_skipped() {
        let csv = "text,embedding\nA,\"[1.0, 0.0]\"\nHuge,\"[1e39, 0.5]\"\n";
        let store = store();
        let report = ingest(
            &store,
            "wo",
            source(csv),
            &IngestOptions::default(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(report.ingested, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].row, 2);
        assert!(report.skipped[0].reason.contains("malformed embedding"));
        assert_eq!(store.len("wo").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_keeps_partial_progress() {
        let store = store();
        let token = CancellationToken::new();
        let trigger = token.clone();
        let csv = csv_with_rows(10, None);
        let rows = source(&csv).enumerate().map(move |(i, item)| {
            if i + 1 == 4 {
                trigger.cancel();
            }
            item
        });

        let report = ingest(&store, "wo", rows, &IngestOptions::default(), &token, |_| {})
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.ingested, 4);
        assert_eq!(store.len("wo").unwrap(), 4);
    }

    #[tokio::test]
    async fn test_progress_reported_per_batch() {
        let store = store();
        let options = IngestOptions {
            progress_interval: 10,
            ..IngestOptions::default()
        };
        let mut seen = Vec::new();
        ingest(
            &store,
            "wo",
            source(&csv_with_rows(25, None)),
            &options,
            &CancellationToken::new(),
            |p| seen.push(p.ingested),
        )
        .await
        .unwrap();

        assert_eq!(seen, [10, 20, 25]);
    }

    #[tokio::test]
    async fn test_ingest_into_missing_collection() {
        let store = MemoryStore::new();
        let err = ingest(
            &store,
            "nope",
            source(&csv_with_rows(1, None)),
            &IngestOptions::default(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IngestError::Store(StoreError::CollectionNotFound(_))));
    }

    #[tokio::test]
    async fn test_loader_downloads_once_then_ingests() {
        let server = MockServer::start_async().await;
        let body = csv_with_rows(5, None);
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/data/winter_olympics_2022.csv");
                then.status(200).body(body.clone());
            })
            .await;

        let dir = tempdir().unwrap();
        let path = dir.path().join("TestData").join("winter_olympics_2022.csv");
        let loader = CsvLoader::new(server.url("/data/winter_olympics_2022.csv"), &path);
        let cancel = CancellationToken::new();

        assert!(loader.ensure_source_file(&cancel).await.unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), body);

        let store = MemoryStore::new();
        let report = loader
            .initialize(&store, "winterOlympics", &cancel, |_| {})
            .await
            .unwrap();
        assert_eq!(report.ingested, 5);

        let rec = store.get("winterOlympics", "PK_0").unwrap();
        assert_eq!(
            rec.metadata().external_source_name.as_deref(),
            Some("winter_olympics_2022.csv")
        );
        // The file was already there for `initialize`.
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_interrupted_download_leaves_no_partial_file() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/data.csv");
                then.status(200).body(csv_with_rows(3, None));
            })
            .await;

        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let loader = CsvLoader::new(server.url("/data.csv"), &path);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = loader.ensure_source_file(&cancel).await.unwrap_err();
        assert!(matches!(err, IngestError::Io(ref e) if e.kind() == io::ErrorKind::Interrupted));
        assert!(!path.exists());
        assert!(!dir.path().join("data.csv.part").exists());
    }

    #[tokio::test]
    async fn test_load_reads_file_and_names_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sections.csv");
        std::fs::write(&path, csv_with_rows(2, None)).unwrap();

        let records: Vec<Record> =
            CsvRecordSource::load(&path, RowSchema::embeddings_csv(), IdGenerator::default())
                .await
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].id(), "PK_1");
        assert_eq!(
            records[1].metadata().external_source_name.as_deref(),
            Some("sections.csv")
        );

        let missing = CsvRecordSource::load(
            &dir.path().join("absent.csv"),
            RowSchema::embeddings_csv(),
            IdGenerator::default(),
        )
        .await;
        assert!(matches!(missing, Err(IngestError::Io(_))));
    }

    #[tokio::test]
    async fn test_loader_download_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing.csv");
                then.status(404);
            })
            .await;

        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.csv");
        let loader = CsvLoader::new(server.url("/missing.csv"), &path);
        let err = loader
            .ensure_source_file(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Download(_)));
        assert!(!path.exists());
    }
}
