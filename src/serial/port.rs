use async_trait::async_trait;
use log::{error, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{self, Duration};
use tokio_serial::SerialPortBuilderExt;
pub use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPort, SerialPortType, SerialStream, StopBits,
};

use crate::error::{Result, SerialConsoleError};
use crate::serial::data::ByteChunk;

/// serial port baud rate
pub const COMMON_BAUD_RATES: &[u32] = &[
    4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 500000, 576000, 921600, 1000000,
    1500000, 2000000,
];

/// baud rate used when none (or an unusable one) is given
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// longest a single read may wait for data
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// serial port settings
#[derive(Clone, Debug, PartialEq)]
pub struct PortSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
    pub timeout: Duration,
}

/// serial port settings implementation
impl PortSettings {
    /// serial port settings for `port_name` at `baud_rate`, 8N1 without flow control
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        PortSettings {
            port_name: port_name.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// check the settings can be used to open a port
    pub fn validate(&self) -> Result<()> {
        if self.port_name.trim().is_empty() {
            return Err(SerialConsoleError::invalid_config("port name is empty"));
        }
        if self.baud_rate == 0 {
            return Err(SerialConsoleError::invalid_config(
                "baud rate must be positive",
            ));
        }
        if self.timeout.is_zero() {
            return Err(SerialConsoleError::invalid_config(
                "read timeout must be positive",
            ));
        }
        Ok(())
    }

    /// short `8N1`-style description of the framing
    pub fn framing(&self) -> String {
        let data_bits = match self.data_bits {
            DataBits::Five => '5',
            DataBits::Six => '6',
            DataBits::Seven => '7',
            DataBits::Eight => '8',
        };
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        let stop_bits = match self.stop_bits {
            StopBits::One => '1',
            StopBits::Two => '2',
        };
        format!("{data_bits}{parity}{stop_bits}")
    }
}

impl Default for PortSettings {
    fn default() -> Self {
        Self::new(String::new(), DEFAULT_BAUD_RATE)
    }
}

/// A discovered serial port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortInfo {
    pub port_name: String,
    pub description: String,
}

/// list the serial ports present on this machine
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = tokio_serial::available_ports().map_err(|e| {
        error!("Error listing ports: {e}");
        SerialConsoleError::Io(e.into())
    })?;
    Ok(ports
        .into_iter()
        .map(|p| PortInfo {
            description: describe_port(&p.port_type),
            port_name: p.port_name,
        })
        .collect())
}

fn describe_port(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => usb
            .product
            .clone()
            .or_else(|| usb.manufacturer.clone())
            .unwrap_or_else(|| format!("USB {:04X}:{:04X}", usb.vid, usb.pid)),
        SerialPortType::PciPort => "PCI device".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth device".to_string(),
        SerialPortType::Unknown => "n/a".to_string(),
    }
}

/// An open byte link to a device.
#[async_trait]
pub trait Transport: Send {
    /// Bytes waiting in the OS receive buffer.
    fn bytes_to_read(&mut self) -> Result<usize>;

    /// Reads at most `max_len` bytes, waiting no longer than `max_wait`.
    /// Returns an empty chunk on timeout.
    async fn read(&mut self, max_len: usize, max_wait: Duration) -> Result<ByteChunk>;

    /// Writes all of `data`, returning the number of bytes written.
    async fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Releases the OS handle. Safe to call more than once.
    fn close(&mut self);
}

/// Opens transports from port settings.
#[cfg_attr(test, mockall::automock)]
pub trait Connector: Send {
    fn open(&self, settings: &PortSettings) -> Result<Box<dyn Transport>>;
}

/// Opens real serial ports through `tokio-serial`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    fn open(&self, settings: &PortSettings) -> Result<Box<dyn Transport>> {
        let stream = open_port(settings)?;
        Ok(Box::new(SerialTransport::new(
            settings.port_name.clone(),
            stream,
        )))
    }
}

/// open serial port
fn open_port(settings: &PortSettings) -> Result<SerialStream> {
    match tokio_serial::new(settings.port_name.as_str(), settings.baud_rate)
        .data_bits(settings.data_bits)
        .parity(settings.parity)
        .stop_bits(settings.stop_bits)
        .flow_control(settings.flow_control)
        .timeout(settings.timeout)
        .open_native_async()
    {
        Ok(stream) => {
            info!(
                "Opened serial port {} at {} {}",
                settings.port_name,
                settings.baud_rate,
                settings.framing()
            );
            Ok(stream)
        }
        Err(e) => {
            error!("Failed to open serial port {}: {}", settings.port_name, e);
            Err(SerialConsoleError::port_open(
                settings.port_name.as_str(),
                e.to_string(),
            ))
        }
    }
}

/// serial port
pub struct SerialTransport {
    port_name: String,
    stream: Option<SerialStream>,
}

impl SerialTransport {
    pub fn new(port_name: String, stream: SerialStream) -> Self {
        SerialTransport {
            port_name,
            stream: Some(stream),
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn bytes_to_read(&mut self) -> Result<usize> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| SerialConsoleError::port_read("port is closed"))?;
        let pending = stream
            .bytes_to_read()
            .map_err(|e| SerialConsoleError::port_read(e.to_string()))?;
        Ok(pending as usize)
    }

    async fn read(&mut self, max_len: usize, max_wait: Duration) -> Result<ByteChunk> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SerialConsoleError::port_read("port is closed"))?;
        let mut buffer = vec![0u8; max_len.max(1)];
        match time::timeout(max_wait, stream.read(&mut buffer)).await {
            Err(_) => Ok(ByteChunk::empty()),
            Ok(Ok(count)) => {
                buffer.truncate(count);
                Ok(ByteChunk::from(buffer))
            }
            Ok(Err(e)) => Err(SerialConsoleError::port_read(e.to_string())),
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SerialConsoleError::port_write("port is closed"))?;
        stream
            .write_all(data)
            .await
            .map_err(|e| SerialConsoleError::port_write(e.to_string()))?;
        stream
            .flush()
            .await
            .map_err(|e| SerialConsoleError::port_write(e.to_string()))?;
        Ok(data.len())
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            info!("Closed serial port {}", self.port_name);
        }
    }
}
