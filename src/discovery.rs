//! Port probing.
//!
//! Every candidate port is probed by a fresh reader built from a template
//! configuration, so no state carries over between candidates.

use std::sync::Arc;

use regex::Regex;

use crate::config::MeterConfig;
use crate::error::{Error, Result};
use crate::reader;
use crate::transport::serial::port_matches;
use crate::transport::{Connector, PortInfo, SystemConnector};
use crate::types::Device;

/// Pattern used when no filter is given.
pub const MATCH_ALL: &str = ".*";

/// Probes the host's serial ports for meters speaking `template.protocol`.
///
/// See [`detect_with`].
pub fn detect(pattern: Option<&str>, template: &MeterConfig) -> Result<Vec<Device>> {
    detect_with(Arc::new(SystemConnector), pattern, template)
}

/// Probes every port of `connector` whose address or description matches `pattern`.
///
/// Devices are returned in enumeration order. A port without a meter is skipped; an
/// unexpected fault while probing aborts discovery with [`Error::Probe`].
pub fn detect_with(
    connector: Arc<dyn Connector>,
    pattern: Option<&str>,
    template: &MeterConfig,
) -> Result<Vec<Device>> {
    detect_all_with(connector, pattern, std::slice::from_ref(template))
}

/// Probes the host's serial ports once per template.
///
/// See [`detect_all_with`].
pub fn detect_all(pattern: Option<&str>, templates: &[MeterConfig]) -> Result<Vec<Device>> {
    detect_all_with(Arc::new(SystemConnector), pattern, templates)
}

/// Sweeps the matching ports with each template in turn.
///
/// A port that already reported a meter is not probed again by later templates.
/// Devices are grouped by template, each group in enumeration order.
pub fn detect_all_with(
    connector: Arc<dyn Connector>,
    pattern: Option<&str>,
    templates: &[MeterConfig],
) -> Result<Vec<Device>> {
    let filter = Regex::new(pattern.unwrap_or(MATCH_ALL))?;
    let candidates: Vec<PortInfo> = connector
        .available_ports()?
        .into_iter()
        .filter(|port| port_matches(&filter, port))
        .collect();

    let mut devices: Vec<Device> = Vec::new();
    for template in templates {
        tracing::debug!("probing {} ports for {} meters", candidates.len(), template.protocol);
        for port in &candidates {
            if devices.iter().any(|device| device.access_path == port.address) {
                tracing::debug!("{} already claimed, skipping {} probe", port.address, template.protocol);
                continue;
            }
            if let Some(device) = probe(&connector, port, template)? {
                devices.push(device);
            }
        }
    }
    Ok(devices)
}

/// Probes one port with a fresh reader built from `template`.
fn probe(connector: &Arc<dyn Connector>, port: &PortInfo, template: &MeterConfig) -> Result<Option<Device>> {
    let config = template.for_address(&port.address, format!("unknown@{}", port.address));
    let mut reader = reader::build_with(config, Arc::clone(connector));
    match reader.discover() {
        Ok(Some(device)) => {
            tracing::info!("found {} meter {} at {}", device.protocol, device.identifier, port.address);
            Ok(Some(device))
        }
        Ok(None) => {
            tracing::info!("no {} meter at {}", template.protocol, port.address);
            Ok(None)
        }
        Err(e) => {
            tracing::error!("probing {} failed: {}", port.address, e);
            Err(Error::Probe {
                address: port.address.clone(),
                source: Box::new(e),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockConnector, MockPort};
    use crate::types::Protocol;

    fn answering(id: &str) -> MockPort {
        let port = MockPort::new();
        port.reply_to(
            b"/?!\r\n",
            format!("/XYZ5\r\n6.8(0000001*kWh)9.21({id})\r\n").as_bytes(),
        );
        port
    }

    #[test]
    fn test_skips_silent_ports() {
        let connector = MockConnector::new()
            .with_port("/dev/ttyUSB0", MockPort::new())
            .with_port("/dev/ttyUSB1", answering("11111111"));
        let devices = detect_with(
            Arc::new(connector),
            None,
            &MeterConfig::plain("", "").wakeup_zeros(0),
        )
        .unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].access_path, "/dev/ttyUSB1");
    }

    #[test]
    fn test_pattern_filters_ports() {
        let usb0 = answering("11111111");
        let acm0 = answering("22222222").description("Optical probe");
        let connector = MockConnector::new()
            .with_port("/dev/ttyUSB0", usb0.clone())
            .with_port("/dev/ttyACM0", acm0.clone());
        let template = MeterConfig::plain("", "");

        let devices = detect_with(Arc::new(connector), Some("Optical"), &template).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].identifier, "22222222");
        assert_eq!(usb0.open_count(), 0);
        assert_eq!(acm0.open_count(), 1);
    }

    #[test]
    fn test_invalid_pattern() {
        let err = detect_with(Arc::new(MockConnector::new()), Some("("), &MeterConfig::sml("", ""))
            .unwrap_err();
        assert!(matches!(err, Error::Pattern(_)));
    }

    #[test]
    fn test_claimed_ports_are_not_reprobed() {
        let meter = answering("11111111");
        let connector = MockConnector::new()
            .with_port("/dev/ttyUSB0", meter.clone())
            .with_port("/dev/ttyUSB1", MockPort::new());
        let templates = [MeterConfig::plain("", ""), MeterConfig::sml("", "")];

        let devices = detect_all_with(Arc::new(connector), None, &templates).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].protocol, Protocol::Plain);
        assert_eq!(meter.open_count(), 1);
    }

    #[test]
    fn test_fault_propagates() {
        let connector = MockConnector::new()
            .with_port("/dev/ttyUSB0", answering("11111111"))
            .with_faulty_port("/dev/ttyUSB1", "permission model violated");
        let err = detect_with(Arc::new(connector), None, &MeterConfig::plain("", "")).unwrap_err();
        match err {
            Error::Probe { address, source } => {
                assert_eq!(address, "/dev/ttyUSB1");
                assert!(matches!(*source, Error::Config(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
