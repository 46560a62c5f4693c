// src/communication/transport.rs - byte links to the engraver
use std::io;

use async_trait::async_trait;
use serial2_tokio::SerialPort;

pub const DEFAULT_BAUD: u32 = 9600;

/// Byte-oriented link used by [`DeviceConnection`](super::device::DeviceConnection).
#[async_trait]
pub trait Transport: Send {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    /// Read whatever is available, waiting for at least one byte. `Ok(0)` means the link closed.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Drop any unread input.
    fn discard_input(&mut self) -> io::Result<()>;
    fn name(&self) -> &str;
}

/// Serial port implementation using serial2-tokio.
pub struct SerialTransport {
    port: SerialPort,
    name: String,
}

impl SerialTransport {
    pub fn open(port_name: &str, baud: u32) -> io::Result<Self> {
        tracing::info!("Opening serial port {} @ {} baud", port_name, baud);
        let port = SerialPort::open(port_name, baud)?;
        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.port.write_all(buf).await
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf).await
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port.discard_input_buffer()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport").field("name", &self.name).finish()
    }
}

/// Serial ports currently present on the host.
pub fn available_ports() -> Vec<String> {
    match SerialPort::available_ports() {
        Ok(paths) => paths.iter().map(|p| p.display().to_string()).collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate serial ports: {}", e);
            vec![]
        }
    }
}
