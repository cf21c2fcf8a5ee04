//! Bounded in-memory byte pipe with back-pressure.
//!
//! The write end blocks once the internal buffer is full, which is what
//! throttles a fast producer against slow upload workers. The read end blocks
//! while the buffer is empty and reports EOF once the write end has closed
//! and the buffer has drained. Either side can go away early: dropping the
//! reader (or poisoning the pipe through [`PipeFault`]) makes pending and
//! future writes fail instead of blocking forever.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex};

const DEFAULT_CAPACITY: usize = 64 * 1024;

struct State {
    buf: VecDeque<u8>,
    capacity: usize,
    write_closed: bool,
    read_closed: bool,
    fault: Option<String>,
}

struct Shared {
    state: Mutex<State>,
    // Signalled when bytes or EOF become available to readers.
    readable: Condvar,
    // Signalled when space frees up or the read side goes away.
    writable: Condvar,
}

/// Creates a connected pipe with the default buffer capacity.
pub fn pipe() -> (PipeWriter, PipeReader) {
    pipe_with_capacity(DEFAULT_CAPACITY)
}

/// Creates a connected pipe with an explicit buffer capacity.
pub fn pipe_with_capacity(capacity: usize) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            buf: VecDeque::new(),
            capacity: capacity.max(1),
            write_closed: false,
            read_closed: false,
            fault: None,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
    });
    (
        PipeWriter {
            shared: Arc::clone(&shared),
            closed: false,
        },
        PipeReader { shared },
    )
}

/// Write end of the pipe.
pub struct PipeWriter {
    shared: Arc<Shared>,
    closed: bool,
}

impl PipeWriter {
    /// Closes the write end, signalling EOF to the read side. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.shared.state.lock().unwrap();
        state.write_closed = true;
        self.shared.readable.notify_all();
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if self.closed || state.write_closed {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "write end is closed",
                ));
            }
            if let Some(msg) = &state.fault {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, msg.clone()));
            }
            if state.read_closed {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "read end is closed",
                ));
            }
            let space = state.capacity - state.buf.len();
            if space > 0 {
                let n = space.min(data.len());
                state.buf.extend(&data[..n]);
                self.shared.readable.notify_one();
                return Ok(n);
            }
            state = self.shared.writable.wait(state).unwrap();
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read end of the pipe.
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Returns a handle that can poison the pipe from another thread.
    pub fn fault_handle(&self) -> PipeFault {
        PipeFault {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if let Some(msg) = &state.fault {
                return Err(io::Error::other(msg.clone()));
            }
            if !state.buf.is_empty() {
                let n = buf.len().min(state.buf.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = state.buf.pop_front().expect("buffer length checked");
                }
                self.shared.writable.notify_one();
                return Ok(n);
            }
            if state.write_closed {
                return Ok(0);
            }
            state = self.shared.readable.wait(state).unwrap();
        }
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.read_closed = true;
        self.shared.writable.notify_all();
    }
}

/// Poisons the pipe so blocked and future writers fail with the given message.
#[derive(Clone)]
pub struct PipeFault {
    shared: Arc<Shared>,
}

impl PipeFault {
    /// Records the failure and wakes every blocked party.
    pub fn fail(&self, msg: &str) {
        let mut state = self.shared.state.lock().unwrap();
        if state.fault.is_none() {
            state.fault = Some(msg.to_string());
        }
        self.shared.readable.notify_all();
        self.shared.writable.notify_all();
    }
}
