//! In-memory [`Transport`] that plays back canned firmware replies.
//!
//! Each written frame pops the next queued reply into the input buffer; once
//! the queue runs dry the device stays silent and reads wait forever, which
//! the caller's acknowledgment timeout turns into a transmission failure.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::transport::Transport;

#[derive(Debug)]
pub struct MockTransport {
    input: VecDeque<u8>,
    replies: VecDeque<Option<Vec<u8>>>,
    chunk_size: usize,
    written: Arc<Mutex<Vec<u8>>>,
    released: Arc<AtomicBool>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            input: VecDeque::new(),
            replies: VecDeque::new(),
            chunk_size: usize::MAX,
            written: Arc::new(Mutex::new(Vec::new())),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue the reply to the next frame.
    pub fn reply(mut self, bytes: &[u8]) -> Self {
        self.replies.push_back(Some(bytes.to_vec()));
        self
    }

    /// Queue `count` acknowledgments.
    pub fn acks(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.replies.push_back(Some(crate::protocol::ACK.to_vec()));
        }
        self
    }

    /// The next frame gets no reply at all.
    pub fn silent(mut self) -> Self {
        self.replies.push_back(None);
        self
    }

    /// Bytes already waiting in the input buffer before the first frame.
    pub fn stale(mut self, bytes: &[u8]) -> Self {
        self.input.extend(bytes);
        self
    }

    /// Limit how many bytes a single read returns.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Everything written so far.
    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        self.written.clone()
    }

    /// Set once the transport has been dropped.
    pub fn released(&self) -> Arc<AtomicBool> {
        self.released.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.written
            .lock()
            .map_err(|_| io::Error::other("mock write log poisoned"))?
            .extend_from_slice(buf);
        if let Some(Some(reply)) = self.replies.pop_front() {
            self.input.extend(reply);
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.input.is_empty() {
            std::future::pending::<()>().await;
        }
        let n = self.input.len().min(buf.len()).min(self.chunk_size);
        for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.input.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}
