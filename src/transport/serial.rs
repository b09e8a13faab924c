//! Serial port transport.
//!
//! Opens real serial ports through `tokio-serial`'s blocking builder, plus the
//! `loop://` and `hwgrep://<regex>` pseudo addresses.

use std::io::{self, Read, Write};
use std::time::Duration;

use regex::Regex;
use tokio_serial::{ClearBuffer, DataBits, SerialPort, SerialPortInfo, SerialPortType, StopBits};

use crate::config::{LineSettings, Parity};
use crate::error::{Error, Result, TransportError};
use crate::transport::{Connector, Link, Loopback, PortInfo};

/// Address of the in-memory loopback line.
pub const LOOPBACK_ADDRESS: &str = "loop://";

/// Prefix of addresses resolved by matching available ports against a regex.
pub const HWGREP_PREFIX: &str = "hwgrep://";

/// Connector for the host's serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemConnector;

impl SystemConnector {
    fn open_port(path: &str, settings: &LineSettings) -> Result<Box<dyn Link>> {
        settings.validate()?;
        let data_bits = match settings.byte_size {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };
        let parity = match settings.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        };
        let stop_bits = if settings.stop_bits == 2 {
            StopBits::Two
        } else {
            StopBits::One
        };

        let port = tokio_serial::new(path, settings.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(settings.timeout)
            .open()
            .map_err(TransportError::Serial)?;

        tracing::debug!("opened serial port {} ({})", path, settings);
        Ok(Box::new(SerialLink { port }))
    }

    fn resolve_hwgrep(pattern: &str) -> Result<String> {
        tracing::warn!("relying on hwgrep for serial port identification is not recommended");
        let regex = Regex::new(pattern)?;
        list_ports()?
            .into_iter()
            .find(|port| port_matches(&regex, port))
            .map(|port| port.address)
            .ok_or_else(|| TransportError::NoMatchingPort(pattern.to_owned()).into())
    }
}

impl Connector for SystemConnector {
    fn open(&self, address: &str, settings: &LineSettings) -> Result<Box<dyn Link>> {
        if address == LOOPBACK_ADDRESS {
            return Ok(Box::new(Loopback::new()));
        }
        if let Some(pattern) = address.strip_prefix(HWGREP_PREFIX) {
            let path = Self::resolve_hwgrep(pattern)?;
            return Self::open_port(&path, settings);
        }
        if let Some((scheme, _)) = address.split_once("://") {
            return Err(Error::Config(format!("unsupported address scheme: {scheme}")));
        }
        Self::open_port(address, settings)
    }

    fn available_ports(&self) -> Result<Vec<PortInfo>> {
        list_ports()
    }
}

/// Returns true if the port's address or description matches `regex`.
pub(crate) fn port_matches(regex: &Regex, port: &PortInfo) -> bool {
    regex.is_match(&port.address)
        || port
            .description
            .as_deref()
            .is_some_and(|description| regex.is_match(description))
}

fn describe(info: &SerialPortInfo) -> Option<String> {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => Some(usb_description(
            [usb.manufacturer.as_deref(), usb.product.as_deref(), usb.serial_number.as_deref()],
            usb.vid,
            usb.pid,
        )),
        SerialPortType::PciPort => Some("PCI".into()),
        SerialPortType::BluetoothPort => Some("Bluetooth".into()),
        SerialPortType::Unknown => None,
    }
}

/// `manufacturer product serial USB VID:PID=vvvv:pppp`, skipping missing parts.
fn usb_description(parts: [Option<&str>; 3], vid: u16, pid: u16) -> String {
    let ids = format!("USB VID:PID={vid:04x}:{pid:04x}");
    let known: Vec<&str> = parts.into_iter().flatten().collect();
    if known.is_empty() {
        ids
    } else {
        format!("{} {}", known.join(" "), ids)
    }
}

/// Lists available serial ports.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = tokio_serial::available_ports().map_err(TransportError::Serial)?;
    Ok(ports
        .iter()
        .map(|info| PortInfo {
            address: info.port_name.clone(),
            description: describe(info),
        })
        .collect())
}

/// An open serial port.
struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl Link for SerialLink {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.port.set_timeout(timeout).map_err(io::Error::from)?;
        self.port.read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, data)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut self.port)
    }

    fn set_baud_rate(&mut self, rate: u32) -> io::Result<()> {
        self.port.set_baud_rate(rate).map_err(io::Error::from)
    }

    fn bytes_to_read(&mut self) -> io::Result<usize> {
        let n = self.port.bytes_to_read().map_err(io::Error::from)?;
        Ok(n as usize)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_address() {
        let mut link = SystemConnector
            .open(LOOPBACK_ADDRESS, &LineSettings::default())
            .unwrap();
        link.write_all(b"ping").unwrap();
        let mut buf = [0u8; 8];
        let n = link.read(&mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(&buf[..n], b"ping");
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = SystemConnector
            .open("rfc2217://host:7000", &LineSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
        assert!(!err.is_field_condition());
    }

    #[test]
    fn test_invalid_line_settings() {
        let settings = LineSettings::default().byte_size(9);
        let err = SystemConnector.open("/dev/ttyUSB0", &settings).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_port_matches_description() {
        let regex = Regex::new("CP210").unwrap();
        let port = PortInfo {
            address: "/dev/ttyUSB0".into(),
            description: Some("Silicon Labs CP2104 USB VID:PID=10c4:ea60".into()),
        };
        assert!(port_matches(&regex, &port));
        assert!(!port_matches(&regex, &PortInfo::new("/dev/ttyS0")));
        assert!(port_matches(&Regex::new("ttyS").unwrap(), &PortInfo::new("/dev/ttyS0")));
    }

    #[test]
    fn test_usb_description() {
        assert_eq!(
            usb_description([Some("Silicon Labs"), Some("CP2104"), None], 0x10c4, 0xea60),
            "Silicon Labs CP2104 USB VID:PID=10c4:ea60"
        );
        assert_eq!(usb_description([None; 3], 0x0403, 0x6001), "USB VID:PID=0403:6001");

        let hwgrep = Regex::new("10c4:ea60").unwrap();
        let port = PortInfo {
            address: "/dev/ttyUSB3".into(),
            description: Some(usb_description([None, None, Some("0001")], 0x10c4, 0xea60)),
        };
        assert!(port_matches(&hwgrep, &port));
    }
}
