use super::ScanError;
use crate::value::Value;
use std::path::{Path, PathBuf};
use strata_schema::types::FieldType;
use tokio::{fs, io::AsyncWriteExt};

///
/// ResumeCursor
///
/// Append-only file recording the last id visited by one scan partition.
/// Only the last non-empty line counts, so a torn final write falls back to
/// the previous checkpoint.
///

#[derive(Clone, Debug)]
pub struct ResumeCursor {
    path: PathBuf,
}

impl ResumeCursor {
    #[must_use]
    pub fn new(dir: &Path, object: &str, partition: usize) -> Self {
        Self {
            path: dir.join(format!("{object}-{partition}.cursor")),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last recorded id, typed as the object's id. A missing file means the
    /// partition starts from the beginning.
    pub async fn load(&self, id_type: FieldType) -> Result<Option<Value>, ScanError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ScanError::Cursor {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let Some(last) = contents.lines().map(str::trim).rfind(|line| !line.is_empty()) else {
            return Ok(None);
        };

        Value::text(last)
            .coerce(id_type)
            .map(Some)
            .map_err(|err| ScanError::CorruptCursor {
                path: self.path.clone(),
                reason: err.to_string(),
            })
    }

    pub async fn record(&self, id: &Value) -> Result<(), ScanError> {
        let io_err = |source| ScanError::Cursor {
            path: self.path.clone(),
            source,
        };

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        file.write_all(format!("{}\n", id.to_index_string()).as_bytes())
            .await
            .map_err(io_err)?;
        file.flush().await.map_err(io_err)
    }
}
