pub mod device;
pub mod mock;
pub mod transport;

pub use device::{DeviceConnection, DEFAULT_ACK_TIMEOUT};
pub use transport::{available_ports, SerialTransport, Transport, DEFAULT_BAUD};
