//! The cluster mark file: a small persistent record of the latest candidate
//! term, so that a vote cast just before a crash cannot be cast again in the
//! same term.
//!
//! Persistence is a write-then-force pair: the election writes the new term,
//! then forces it at the configured sync level before any vote message is
//! emitted. Keeping the two steps separate gives tests a seam to inject a
//! fault between them.

use std::fs::File;
use std::fs::OpenOptions;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use anyerror::AnyError;

use crate::config::FileSyncLevel;
use crate::error::ElectionError;

pub trait ClusterMarkFile {
    /// The latest candidate term written, `None` on a fresh file.
    fn candidate_term_id(&self) -> Option<u64>;

    /// Write a new candidate term. Not durable until [`force`](Self::force).
    fn update_candidate_term_id(&mut self, candidate_term_id: u64) -> Result<(), ElectionError>;

    fn force(&mut self, level: FileSyncLevel) -> Result<(), ElectionError>;
}

const MAGIC: u32 = 0x434c_4d46; // "CLMF"
const VERSION: u32 = 1;
const HEADER_LEN: usize = 8;
const RECORD_LEN: usize = HEADER_LEN + 9;

/// File-backed mark file: an 8 byte header followed by a presence byte and
/// the candidate term in little-endian.
#[derive(Debug)]
pub struct FileMarkFile {
    path: PathBuf,
    file: File,
    candidate_term_id: Option<u64>,
}

impl FileMarkFile {
    /// Open an existing mark file or create a fresh one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ElectionError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |e: std::io::Error| {
            ElectionError::MarkFile(AnyError::error(format!("{}: {}", path.display(), e)))
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;

        let mut buf = [0u8; RECORD_LEN];
        let len = file.metadata().map_err(io_err)?.len();

        let candidate_term_id = if len == 0 {
            let mut header = [0u8; RECORD_LEN];
            header[..4].copy_from_slice(&MAGIC.to_le_bytes());
            header[4..8].copy_from_slice(&VERSION.to_le_bytes());
            file.write_all(&header).map_err(io_err)?;
            None
        } else {
            file.read_exact(&mut buf).map_err(io_err)?;

            let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
            let version = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
            if magic != MAGIC || version != VERSION {
                return Err(ElectionError::MarkFile(AnyError::error(format!(
                    "{}: not a mark file (magic {:#x}, version {})",
                    path.display(),
                    magic,
                    version
                ))));
            }

            if buf[HEADER_LEN] == 1 {
                let mut term = [0u8; 8];
                term.copy_from_slice(&buf[HEADER_LEN + 1..RECORD_LEN]);
                Some(u64::from_le_bytes(term))
            } else {
                None
            }
        };

        Ok(Self {
            path,
            file,
            candidate_term_id,
        })
    }

    fn io_err(&self, e: std::io::Error) -> ElectionError {
        ElectionError::MarkFile(AnyError::error(format!("{}: {}", self.path.display(), e)))
    }
}

impl ClusterMarkFile for FileMarkFile {
    fn candidate_term_id(&self) -> Option<u64> {
        self.candidate_term_id
    }

    fn update_candidate_term_id(&mut self, candidate_term_id: u64) -> Result<(), ElectionError> {
        let mut record = [0u8; 9];
        record[0] = 1;
        record[1..].copy_from_slice(&candidate_term_id.to_le_bytes());

        self.file.seek(SeekFrom::Start(HEADER_LEN as u64)).map_err(|e| self.io_err(e))?;
        self.file.write_all(&record).map_err(|e| self.io_err(e))?;

        self.candidate_term_id = Some(candidate_term_id);
        Ok(())
    }

    fn force(&mut self, level: FileSyncLevel) -> Result<(), ElectionError> {
        let res = match level {
            FileSyncLevel::None => Ok(()),
            FileSyncLevel::Data => self.file.sync_data(),
            FileSyncLevel::Metadata => self.file.sync_all(),
        };

        res.map_err(|e| self.io_err(e))
    }
}
