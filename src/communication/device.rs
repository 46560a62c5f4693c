// src/communication/device.rs - frame/acknowledge exchange with the engraver
use std::time::Duration;

use tokio::time::timeout;

use super::transport::Transport;
use crate::protocol::{self, ProtocolError};
use crate::script::Point;

pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a reply line; the firmware only ever sends `OK\r\n`.
const MAX_REPLY_LEN: usize = 64;

/// Exclusive owner of a device link for the duration of a run.
///
/// The link is released when the connection is closed or dropped, whichever
/// comes first; `close` may be called any number of times.
pub struct DeviceConnection {
    transport: Option<Box<dyn Transport>>,
    ack_timeout: Duration,
    name: String,
}

impl DeviceConnection {
    pub fn new(transport: Box<dyn Transport>, ack_timeout: Duration) -> Self {
        let name = transport.name().to_string();
        Self {
            transport: Some(transport),
            ack_timeout,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Send one point and wait for its acknowledgment.
    ///
    /// `Ok(false)` is a transmission failure: wrong reply, timeout or link I/O
    /// error. Only an unencodable point or a closed connection is an `Err`.
    pub async fn send_point(&mut self, point: Point) -> Result<bool, ProtocolError> {
        let frame = protocol::encode_point(point)?;
        let ack_timeout = self.ack_timeout;
        let transport = self.transport.as_deref_mut().ok_or(ProtocolError::Closed)?;

        tracing::trace!("TX {}", String::from_utf8_lossy(&frame));
        if let Err(e) = transport.discard_input() {
            tracing::debug!("Failed to discard stale input: {}", e);
        }
        if let Err(e) = transport.write_all(&frame).await {
            tracing::warn!("Serial write error on {}: {}", self.name, e);
            return Ok(false);
        }

        let ok = match timeout(ack_timeout, read_reply(transport)).await {
            Ok(Ok(reply)) => {
                tracing::trace!("RX {:?}", String::from_utf8_lossy(&reply));
                protocol::decode_ack(&reply)
            }
            Ok(Err(e)) => {
                tracing::warn!("Serial read error on {}: {}", self.name, e);
                false
            }
            Err(_) => {
                tracing::warn!(
                    "Timeout after {:?} waiting for acknowledgment of {:?}",
                    ack_timeout,
                    point
                );
                false
            }
        };

        if let Err(e) = transport.discard_input() {
            tracing::debug!("Failed to discard input after reply: {}", e);
        }
        Ok(ok)
    }

    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            tracing::info!("Released device connection {}", self.name);
        }
    }
}

impl Drop for DeviceConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .field("ack_timeout", &self.ack_timeout)
            .finish()
    }
}

/// Read up to and including the first `\n`, like a serial `readline`.
async fn read_reply<T: Transport + ?Sized>(transport: &mut T) -> std::io::Result<Vec<u8>> {
    let mut reply = Vec::with_capacity(protocol::ACK.len());
    let mut buf = [0u8; 16];
    loop {
        let n = transport.read(&mut buf).await?;
        if n == 0 {
            return Ok(reply);
        }
        reply.extend_from_slice(&buf[..n]);
        if let Some(end) = reply.iter().position(|&b| b == b'\n') {
            reply.truncate(end + 1);
            return Ok(reply);
        }
        if reply.len() >= MAX_REPLY_LEN {
            return Ok(reply);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::mock::MockTransport;

    #[tokio::test]
    async fn test_acknowledged_point() {
        let mock = MockTransport::new().reply(b"OK\r\n");
        let written = mock.written();
        let mut conn = DeviceConnection::new(Box::new(mock), Duration::from_millis(200));
        assert!(conn.send_point(Point::new(10, 500)).await.unwrap());
        assert_eq!(written.lock().unwrap().as_slice(), b"x00ay1f4");
    }

    #[tokio::test]
    async fn test_reply_split_across_reads() {
        let mock = MockTransport::new().reply(b"OK\r\n").chunk_size(1);
        let mut conn = DeviceConnection::new(Box::new(mock), Duration::from_millis(200));
        assert!(conn.send_point(Point::new(1, 1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_bad_reply_is_failure() {
        let mock = MockTransport::new().reply(b"ERR\r\n");
        let mut conn = DeviceConnection::new(Box::new(mock), Duration::from_millis(200));
        assert!(!conn.send_point(Point::new(1, 1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_silence_times_out_as_failure() {
        let mock = MockTransport::new();
        let mut conn = DeviceConnection::new(Box::new(mock), Duration::from_millis(20));
        assert!(!conn.send_point(Point::new(1, 1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_input_is_discarded_before_send() {
        let mock = MockTransport::new().stale(b"OK\r\n").reply(b"NO\r\n");
        let mut conn = DeviceConnection::new(Box::new(mock), Duration::from_millis(200));
        assert!(!conn.send_point(Point::new(1, 1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_unencodable_point_is_fatal() {
        let mock = MockTransport::new().reply(b"OK\r\n");
        let written = mock.written();
        let mut conn = DeviceConnection::new(Box::new(mock), Duration::from_millis(200));
        let err = conn.send_point(Point::new(5000, 0)).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Encoding { value: 5000, .. }));
        assert!(written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_releases() {
        let mock = MockTransport::new();
        let released = mock.released();
        let mut conn = DeviceConnection::new(Box::new(mock), DEFAULT_ACK_TIMEOUT);
        conn.close();
        conn.close();
        assert!(!conn.is_open());
        assert!(released.load(std::sync::atomic::Ordering::SeqCst));
        assert!(matches!(conn.send_point(Point::new(0, 0)).await, Err(ProtocolError::Closed)));
    }
}
