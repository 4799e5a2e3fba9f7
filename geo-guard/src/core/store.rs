//! File-backed relational store.
//!
//! [`GeoStore`] wraps a DataFusion [`SessionContext`]. Snapshots are CSV
//! files; loading one materializes it in memory and registers it as a named
//! view. Rewrites run a query, write the result next to the target file and
//! rename it over the target, so no reader ever sees a half-written snapshot.

use crate::error::{GeoError, Result};
use arrow::array::{Array, ArrayRef, AsArray, Date32Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use datafusion::datasource::MemTable;
use datafusion::execution::context::{SessionConfig, SessionContext};
use datafusion::execution::memory_pool::{FairSpillPool, MemoryPool};
use datafusion::execution::runtime_env::RuntimeEnvBuilder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Name of the 1-based row number column added to every loaded view.
pub const ROW_COLUMN: &str = "_row";

/// Configuration for creating a [`GeoStore`].
#[derive(Debug, Clone)]
pub struct GeoStoreConfig {
    /// Batch size for query execution
    pub batch_size: usize,
    /// Target number of partitions for query execution
    pub target_partitions: usize,
    /// Maximum memory for query execution (in bytes)
    pub max_memory: usize,
}

impl Default for GeoStoreConfig {
    fn default() -> Self {
        Self {
            batch_size: 8192,
            target_partitions: std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4),
            max_memory: 1024 * 1024 * 1024, // 1GB
        }
    }
}

/// A DataFusion session holding the views of one collection run.
pub struct GeoStore {
    inner: SessionContext,
    config: GeoStoreConfig,
}

impl GeoStore {
    /// Creates a store with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(GeoStoreConfig::default())
    }

    #[instrument(skip(config))]
    pub fn with_config(config: GeoStoreConfig) -> Result<Self> {
        let session_config = SessionConfig::new()
            .with_batch_size(config.batch_size)
            .with_target_partitions(config.target_partitions);

        let memory_pool = Arc::new(FairSpillPool::new(config.max_memory)) as Arc<dyn MemoryPool>;

        let runtime_env = RuntimeEnvBuilder::new()
            .with_memory_pool(memory_pool)
            .with_temp_file_path(std::env::temp_dir())
            .build()
            .map(Arc::new)?;

        let inner = SessionContext::new_with_config_rt(session_config, runtime_env);

        Ok(Self { inner, config })
    }

    /// Returns the underlying DataFusion session.
    pub fn inner(&self) -> &SessionContext {
        &self.inner
    }

    pub fn config(&self) -> &GeoStoreConfig {
        &self.config
    }

    pub fn has_view(&self, name: &str) -> Result<bool> {
        Ok(self.inner.table_exist(name)?)
    }

    /// Reads a snapshot file with the declared schema.
    ///
    /// Header mismatches and undecodable cells are reported as
    /// [`GeoError::Parse`]; a missing file is an I/O error.
    #[instrument(skip(self, schema), fields(path = %path.display()))]
    pub fn read_snapshot(&self, path: &Path, schema: SchemaRef) -> Result<Vec<RecordBatch>> {
        check_header(path, &schema)?;

        let file = File::open(path)?;
        let reader = arrow::csv::ReaderBuilder::new(schema.clone())
            .with_header(true)
            .with_batch_size(self.config.batch_size)
            .build(file)
            .map_err(|e| GeoError::Parse(format!("{}: {e}", path.display())))?;

        let batches = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| GeoError::Parse(format!("{}: {e}", path.display())))?;

        debug!(
            rows = batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
            "Snapshot read"
        );
        Ok(batches)
    }

    /// Registers batches as a view, replacing any previous view of that name.
    /// A 1-based [`ROW_COLUMN`] is appended in file order.
    pub fn register_batches(&self, name: &str, batches: Vec<RecordBatch>) -> Result<()> {
        let numbered = number_rows(batches)?;
        let schema = match numbered.first() {
            Some(batch) => batch.schema(),
            None => {
                return Err(GeoError::Internal(format!(
                    "no schema available to register view '{name}'"
                )))
            }
        };
        let table = MemTable::try_new(schema, vec![numbered])?;
        self.inner.deregister_table(name)?;
        self.inner.register_table(name, Arc::new(table))?;
        Ok(())
    }

    /// Reads `path` and registers it as view `name`.
    #[instrument(skip(self, schema), fields(view = name))]
    pub async fn load_view(&self, name: &str, path: &Path, schema: SchemaRef) -> Result<usize> {
        let mut batches = self.read_snapshot(path, schema.clone())?;
        let rows = batches.iter().map(RecordBatch::num_rows).sum();
        if batches.is_empty() {
            batches.push(RecordBatch::new_empty(schema));
        }
        self.register_batches(name, batches)?;
        Ok(rows)
    }

    /// Runs a query and collects its result.
    pub async fn query(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        debug!(sql, "Executing query");
        let df = self.inner.sql(sql).await?;
        Ok(df.collect().await?)
    }

    /// Runs `sql`, atomically replaces `target` with its result and reloads
    /// view `name` from the new file. Returns the number of rows written.
    #[instrument(skip(self, sql, schema), fields(view = name, target = %target.display()))]
    pub async fn rewrite(
        &self,
        name: &str,
        sql: &str,
        target: &Path,
        schema: SchemaRef,
    ) -> Result<usize> {
        let batches = self.query(sql).await?;
        let batches = conform(&batches, &schema)?;
        let rows = write_snapshot(target, &schema, &batches)?;
        self.load_view(name, target, schema).await?;
        Ok(rows)
    }
}

fn check_header(path: &Path, schema: &Schema) -> Result<()> {
    let file = File::open(path)?;
    let mut first_line = String::new();
    BufReader::new(file).read_line(&mut first_line)?;
    let header: Vec<&str> = first_line
        .trim_start_matches('\u{feff}')
        .trim_end_matches(['\r', '\n'])
        .split(',')
        .map(|h| h.trim_matches('"'))
        .collect();
    let expected: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    if header != expected {
        return Err(GeoError::Parse(format!(
            "{}: unexpected header [{}], expected [{}]",
            path.display(),
            header.join(", "),
            expected.join(", ")
        )));
    }
    Ok(())
}

fn number_rows(batches: Vec<RecordBatch>) -> Result<Vec<RecordBatch>> {
    let mut next: i64 = 1;
    let mut numbered = Vec::with_capacity(batches.len());
    for batch in batches {
        let rows = batch.num_rows() as i64;
        let row_numbers: ArrayRef = Arc::new(Int64Array::from_iter_values(next..next + rows));
        next += rows;

        let mut fields: Vec<Field> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        fields.push(Field::new(ROW_COLUMN, DataType::Int64, false));
        let mut columns = batch.columns().to_vec();
        columns.push(row_numbers);
        numbered.push(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?);
    }
    Ok(numbered)
}

/// Casts query output onto the snapshot schema, matching columns by name.
fn conform(batches: &[RecordBatch], schema: &SchemaRef) -> Result<Vec<RecordBatch>> {
    batches
        .iter()
        .map(|batch| {
            let columns = schema
                .fields()
                .iter()
                .map(|field| {
                    let column = batch.column_by_name(field.name()).ok_or_else(|| {
                        GeoError::Internal(format!("rewrite output lacks column '{}'", field.name()))
                    })?;
                    Ok(cast(column, field.data_type())?)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(RecordBatch::try_new(schema.clone(), columns)?)
        })
        .collect()
}

/// Writes batches to a temporary sibling of `target`, then renames it over
/// `target`. Parent directories are created as needed.
pub fn write_snapshot(target: &Path, schema: &SchemaRef, batches: &[RecordBatch]) -> Result<usize> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temporary_sibling(target);
    {
        let file = File::create(&tmp)?;
        let mut writer = arrow::csv::WriterBuilder::new().with_header(true).build(file);
        if batches.is_empty() {
            writer.write(&RecordBatch::new_empty(schema.clone()))?;
        }
        for batch in batches {
            writer.write(batch)?;
        }
    }
    std::fs::rename(&tmp, target)?;
    Ok(batches.iter().map(RecordBatch::num_rows).sum())
}

fn temporary_sibling(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

/// Borrows a text column of a snapshot batch.
pub fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| GeoError::Parse(format!("missing text column '{name}'")))
}

/// Borrows a date column of a snapshot batch.
pub fn date_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Date32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Date32Array>())
        .ok_or_else(|| GeoError::Parse(format!("missing date column '{name}'")))
}

fn column_as(batch: &RecordBatch, name: &str, data_type: &DataType) -> Result<ArrayRef> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| GeoError::Internal(format!("query result lacks column '{name}'")))?;
    Ok(cast(column, data_type)?)
}

/// Text values of a query result column, whatever string type the engine chose.
pub fn string_values(batch: &RecordBatch, name: &str) -> Result<Vec<Option<String>>> {
    let array = column_as(batch, name, &DataType::Utf8)?;
    let strings = array.as_string::<i32>();
    Ok(strings.iter().map(|v| v.map(str::to_string)).collect())
}

/// Date values of a query result column.
pub fn date_values(batch: &RecordBatch, name: &str) -> Result<Vec<Option<NaiveDate>>> {
    let array = column_as(batch, name, &DataType::Date32)?;
    let dates = array
        .as_any()
        .downcast_ref::<Date32Array>()
        .ok_or_else(|| GeoError::Internal(format!("column '{name}' is not a date column")))?;
    Ok((0..dates.len())
        .map(|i| if dates.is_null(i) { None } else { dates.value_as_date(i) })
        .collect())
}

/// Integer values of a query result column.
pub fn int_values(batch: &RecordBatch, name: &str) -> Result<Vec<Option<i64>>> {
    let array = column_as(batch, name, &DataType::Int64)?;
    let ints = array
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| GeoError::Internal(format!("column '{name}' is not an integer column")))?;
    Ok(ints.iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("uri", DataType::Utf8, true),
            Field::new("start_date", DataType::Date32, true),
            Field::new("start_date_count", DataType::Int64, true),
        ]))
    }

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_load_view_numbers_rows() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "a.csv",
            "uri,start_date,start_date_count\nu1,2020-01-01,1\nu2,,2\n",
        );
        let store = GeoStore::new().unwrap();
        let rows = store.load_view("snapshot_a", &path, schema()).await.unwrap();
        assert_eq!(rows, 2);
        assert!(store.has_view("snapshot_a").unwrap());

        let batches = store
            .query("SELECT uri, _row, start_date FROM snapshot_a ORDER BY _row")
            .await
            .unwrap();
        assert_eq!(
            string_values(&batches[0], "uri").unwrap(),
            vec![Some("u1".to_string()), Some("u2".to_string())]
        );
        assert_eq!(int_values(&batches[0], "_row").unwrap(), vec![Some(1), Some(2)]);
        assert_eq!(
            date_values(&batches[0], "start_date").unwrap(),
            vec![NaiveDate::from_ymd_opt(2020, 1, 1), None]
        );
    }

    #[tokio::test]
    async fn test_header_mismatch_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "b.csv", "uri,start,start_date_count\nu1,2020-01-01,1\n");
        let store = GeoStore::new().unwrap();
        let err = store.load_view("snapshot_b", &path, schema()).await.unwrap_err();
        assert!(matches!(err, GeoError::Parse(ref m) if m.contains("unexpected header")));
    }

    #[tokio::test]
    async fn test_bad_cell_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "c.csv",
            "uri,start_date,start_date_count\nu1,not-a-date,1\n",
        );
        let store = GeoStore::new().unwrap();
        let err = store.load_view("snapshot_c", &path, schema()).await.unwrap_err();
        assert!(matches!(err, GeoError::Parse(_)));
    }

    #[tokio::test]
    async fn test_rewrite_replaces_file_and_view() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "d.csv",
            "uri,start_date,start_date_count\nu1,2020-01-01,1\nu2,2021-01-01,1\n",
        );
        let store = GeoStore::new().unwrap();
        store.load_view("snapshot_d", &path, schema()).await.unwrap();

        let rows = store
            .rewrite(
                "snapshot_d",
                "SELECT uri, start_date, start_date_count FROM snapshot_d WHERE uri <> 'u1' ORDER BY _row",
                &path,
                schema(),
            )
            .await
            .unwrap();
        assert_eq!(rows, 1);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "uri,start_date,start_date_count\nu2,2021-01-01,1\n");
        assert!(!temporary_sibling(&path).exists());

        let batches = store.query("SELECT COUNT(*) AS n FROM snapshot_d").await.unwrap();
        assert_eq!(int_values(&batches[0], "n").unwrap(), vec![Some(1)]);
    }

    #[tokio::test]
    async fn test_rewrite_to_empty_keeps_header() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "e.csv", "uri,start_date,start_date_count\nu1,2020-01-01,1\n");
        let store = GeoStore::new().unwrap();
        store.load_view("snapshot_e", &path, schema()).await.unwrap();
        store
            .rewrite(
                "snapshot_e",
                "SELECT uri, start_date, start_date_count FROM snapshot_e WHERE uri <> 'u1'",
                &path,
                schema(),
            )
            .await
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "uri,start_date,start_date_count\n");
        let batches = store.query("SELECT COUNT(*) AS n FROM snapshot_e").await.unwrap();
        assert_eq!(int_values(&batches[0], "n").unwrap(), vec![Some(0)]);
    }
}
