use std::collections::HashMap;
use std::fs::{self, File};
use std::future::Future;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::SinkError;
use crate::records::{RecordBatch, RecordKind};

/// Destination for the records of completed blocks.
pub trait RecordSink {
    /// Appends every record of one block. Called once per block, in height order.
    fn append(&mut self, batch: &RecordBatch) -> impl Future<Output = Result<(), SinkError>>;

    /// Called once after the last block of a successful replay.
    fn finish(&mut self) -> impl Future<Output = Result<(), SinkError>>;
}

/// Writes each record stream to `<dir>/<stream>.csv`.
pub struct CsvSink {
    writers: HashMap<RecordKind, BufWriter<File>>,
}

impl CsvSink {
    /// Creates `dir` if needed and truncates every stream file.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut writers = HashMap::new();
        for kind in RecordKind::ALL {
            let file = File::create(Self::path_for(&dir, kind))?;
            writers.insert(kind, BufWriter::new(file));
        }

        info!("Writing CSV streams to {:?}", dir);
        Ok(Self { writers })
    }

    pub fn path_for(dir: &Path, kind: RecordKind) -> PathBuf {
        dir.join(format!("{}.csv", kind.stream_name()))
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl RecordSink for CsvSink {
    async fn append(&mut self, batch: &RecordBatch) -> Result<(), SinkError> {
        for kind in RecordKind::ALL {
            if let Some(writer) = self.writers.get_mut(&kind) {
                for line in batch.lines(kind) {
                    writer.write_all(line.as_bytes())?;
                }
            }
        }
        self.flush()
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        self.flush()
    }
}
