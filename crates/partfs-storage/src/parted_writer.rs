//! Concurrent N-way part writer.
//!
//! Accepts one logical byte stream of unknown length and delivers it to a
//! part handler in at-most-`part_size` chunks, using `concurrency` upload
//! workers. Producer and workers meet at a bounded pipe: the producer blocks
//! on back-pressure, the workers pull serialised chunks through a
//! [`SyncReader`], and chunk sequence numbers are assigned under the read
//! lock, so sorting parts by number always reconstructs the stream even when
//! uploads finish out of order.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::buffer_pool::BufferPool;
use crate::error::{StorageError, StorageResult};
use crate::pipe::{pipe, PipeFault, PipeReader, PipeWriter};
use crate::sync_reader::SyncReader;

/// Callback invoked once per part with its 1-based number and payload.
pub type PartHandler = Arc<dyn Fn(u64, &[u8]) -> StorageResult<()> + Send + Sync>;

/// Pipe-fed chunker running `concurrency` part handlers in parallel.
pub struct PartedWriter {
    writer: PipeWriter,
    error: Arc<Mutex<Option<StorageError>>>,
    workers: Vec<JoinHandle<()>>,
    closed: bool,
}

impl PartedWriter {
    /// Starts the worker pool. `part_size` and `concurrency` must be
    /// positive.
    pub fn new(part_size: usize, concurrency: usize, handler: PartHandler) -> StorageResult<Self> {
        if part_size == 0 {
            return Err(StorageError::InvalidConfig(
                "part size must be positive".to_string(),
            ));
        }
        if concurrency == 0 {
            return Err(StorageError::InvalidConfig(
                "concurrency must be positive".to_string(),
            ));
        }

        let (writer, reader) = pipe();
        let fault = reader.fault_handle();
        let source = Arc::new(SyncReader::new(reader));
        let pool = Arc::new(BufferPool::new(part_size, concurrency));
        let error = Arc::new(Mutex::new(None));

        let mut workers = Vec::with_capacity(concurrency);
        for _ in 0..concurrency {
            let source = Arc::clone(&source);
            let pool = Arc::clone(&pool);
            let handler = Arc::clone(&handler);
            let error = Arc::clone(&error);
            let fault = fault.clone();
            workers.push(std::thread::spawn(move || {
                run_worker(source, pool, handler, error, fault)
            }));
        }
        debug!(part_size, concurrency, "parted writer started");

        Ok(Self {
            writer,
            error,
            workers,
            closed: false,
        })
    }

    /// Feeds bytes into the pipe. Blocks when the pipe is full and every
    /// worker is busy; fails fast once any worker has failed.
    pub fn write(&mut self, data: &[u8]) -> StorageResult<usize> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        if let Some(err) = self.error.lock().unwrap().clone() {
            return Err(StorageError::Aborted(err.to_string()));
        }
        match self.writer.write_all(data) {
            Ok(()) => Ok(data.len()),
            Err(io_err) => {
                // A poisoned pipe means a worker failed while we were
                // blocked; surface the sticky error rather than the plumbing.
                if let Some(err) = self.error.lock().unwrap().clone() {
                    Err(StorageError::Aborted(err.to_string()))
                } else {
                    Err(StorageError::Io(io_err.to_string()))
                }
            }
        }
    }

    /// Signals EOF, waits for every worker to drain, and returns the first
    /// error any worker observed. A second close returns [`StorageError::Closed`].
    pub fn close(&mut self) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        self.closed = true;
        match self.shutdown() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn shutdown(&mut self) -> Option<StorageError> {
        self.writer.close();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        self.error.lock().unwrap().take()
    }
}

impl Drop for PartedWriter {
    fn drop(&mut self) {
        if !self.closed {
            self.shutdown();
        }
    }
}

impl Write for PartedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        PartedWriter::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn run_worker(
    source: Arc<SyncReader<PipeReader>>,
    pool: Arc<BufferPool>,
    handler: PartHandler,
    error: Arc<Mutex<Option<StorageError>>>,
    fault: PipeFault,
) {
    let mut buf = pool.acquire();
    loop {
        if error.lock().unwrap().is_some() {
            break;
        }
        match source.next_chunk(&mut buf) {
            Ok(Some(chunk)) => {
                if let Err(err) = handler(chunk.seq, &buf[..chunk.len]) {
                    warn!(part = chunk.seq, %err, "part handler failed");
                    record_error(&error, &fault, err);
                    break;
                }
            }
            Ok(None) => break,
            Err(io_err) => {
                record_error(&error, &fault, StorageError::Io(io_err.to_string()));
                break;
            }
        }
    }
    pool.release(buf);
}

/// First error wins; the pipe is poisoned either way so a blocked producer
/// wakes up promptly.
fn record_error(error: &Mutex<Option<StorageError>>, fault: &PipeFault, err: StorageError) {
    let mut slot = error.lock().unwrap();
    if slot.is_none() {
        *slot = Some(err.clone());
    }
    drop(slot);
    fault.fail(&err.to_string());
}
