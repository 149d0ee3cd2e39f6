//! Double-buffered file reading.
//!
//! A background thread fills pooled buffers while the caller consumes the
//! previous one, so hashing a large file overlaps with reading it. At most two
//! chunks are in flight: one in the channel and one being filled.

use crate::error::CacheError;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Size of every pooled read buffer.
pub const CHUNK_SIZE: usize = 1 << 20;

type Pool = Arc<Mutex<Vec<Vec<u8>>>>;

/// Reads one file ahead of its consumer in [`CHUNK_SIZE`] pieces.
pub struct AsyncFileReader {
    path: PathBuf,
    size: u64,
    pool: Pool,
    chunks: Receiver<std::io::Result<(Vec<u8>, usize)>>,
    worker: Option<JoinHandle<()>>,
}

impl AsyncFileReader {
    /// Opens `path` and starts reading it in the background.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let mut file = File::open(path).map_err(|e| CacheError::io(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| CacheError::io(path, e))?
            .len();
        let pool: Pool = Arc::new(Mutex::new(Vec::new()));
        let (tx, chunks) = sync_channel(1);
        let worker_pool = Arc::clone(&pool);
        let worker = std::thread::spawn(move || loop {
            let mut buffer = worker_pool
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop()
                .unwrap_or_else(|| vec![0; CHUNK_SIZE]);
            match read_full(&mut file, &mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(Ok((buffer, n))).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        });
        Ok(Self {
            path: path.to_path_buf(),
            size,
            pool,
            chunks,
            worker: Some(worker),
        })
    }

    /// Size of the file when it was opened.
    pub fn file_size(&self) -> u64 {
        self.size
    }

    /// Feeds every chunk to `consume`, in file order.
    pub fn for_each_chunk(
        mut self,
        mut consume: impl FnMut(&[u8]),
    ) -> Result<(), CacheError> {
        for chunk in self.chunks.iter() {
            let (buffer, len) = chunk.map_err(|e| CacheError::io(&self.path, e))?;
            consume(&buffer[..len]);
            self.pool
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(buffer);
        }
        if let Some(worker) = self.worker.take() {
            worker.join().map_err(|_| CacheError::ReaderStopped {
                path: self.path.clone(),
            })?;
        }
        Ok(())
    }
}

/// Fills `buffer` as far as the file allows, returning the byte count.
fn read_full(file: &mut File, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match file.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
