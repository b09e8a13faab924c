//! Reader for meters pushing SML frames.

use std::sync::Arc;

use bytes::BytesMut;

use crate::config::MeterConfig;
use crate::error::{Error, FrameError, Result};
use crate::protocol::frame::{self, END, START, TRAILER_LEN};
use crate::protocol::obis::SML_METER_ID;
use crate::protocol::{Node, SmlDecoder, TlvDecoder};
use crate::reader::MeterReader;
use crate::transport::{Connector, SystemConnector, Transport};
use crate::types::{Channel, Protocol, Sample};

/// Unread bytes beyond which the backlog is dropped (about two frames).
pub const FLUSH_THRESHOLD: usize = 800;

/// Reads SML frames from a continuously transmitting meter.
///
/// Each read opens the port at the configured baud rate, skips to the next start
/// sequence and reassembles one frame from the stream.
pub struct SmlReader<D = SmlDecoder> {
    config: MeterConfig,
    transport: Transport,
    decoder: D,
}

impl SmlReader {
    /// Creates a reader on the system serial ports.
    #[must_use]
    pub fn new(config: MeterConfig) -> Self {
        Self::with_connector(config, Arc::new(SystemConnector))
    }

    /// Creates a reader using the given connector.
    #[must_use]
    pub fn with_connector(config: MeterConfig, connector: Arc<dyn Connector>) -> Self {
        Self::with_decoder(config, connector, SmlDecoder)
    }
}

impl<D: TlvDecoder> SmlReader<D> {
    /// Creates a reader with a custom TLV decoder.
    #[must_use]
    pub fn with_decoder(config: MeterConfig, connector: Arc<dyn Connector>, decoder: D) -> Self {
        let transport = Transport::with_connector(config.address.clone(), config.line.clone(), connector);
        Self {
            config,
            transport,
            decoder,
        }
    }

    fn exchange(&mut self) -> Result<Sample> {
        let timeout = self.config.line.timeout;
        self.transport.initialize()?;

        let waiting = self.transport.bytes_waiting()?;
        if waiting > FLUSH_THRESHOLD {
            self.transport.discard_input()?;
            tracing::debug!("flushed {} stale bytes from {}", waiting, self.config.address);
        }

        self.transport.read_until(START, timeout)?;
        let payload = self.transport.read_until(END, timeout)?;
        let trailer = self.transport.read_exact(TRAILER_LEN, timeout)?;

        let mut frame = BytesMut::with_capacity(START.len() + payload.len() + trailer.len());
        frame.extend_from_slice(START);
        frame.extend_from_slice(&payload);
        frame.extend_from_slice(&trailer);
        tracing::debug!("frame from {}: {}", self.config.address, hex::encode(&frame));

        parse_frame(&self.decoder, &frame)
    }
}

impl<D: TlvDecoder> MeterReader for SmlReader<D> {
    fn protocol(&self) -> Protocol {
        Protocol::Sml
    }

    fn config(&self) -> &MeterConfig {
        &self.config
    }

    fn read_sample(&mut self) -> Result<Sample> {
        let result = self.exchange();
        self.transport.close();
        result
    }
}

/// Validates, decodes and flattens one reassembled frame.
fn parse_frame(decoder: &impl TlvDecoder, frame: &[u8]) -> Result<Sample> {
    frame::validate(frame).map_err(|kind| Error::frame(kind, frame))?;
    if !frame::checksum_matches(frame) {
        tracing::debug!("frame checksum mismatch, decoding anyway");
    }

    let tree = decoder.decode(frame).map_err(|e| Error::decode(e, frame))?;
    let top = tree.as_list().unwrap_or_default();
    if top.len() != 2 {
        return Err(Error::frame(FrameError::TopLevel(top.len()), frame));
    }

    let mut sample = Sample::new();
    flatten(&top[1], &mut sample);
    Ok(sample)
}

/// Collects channels and the meter id from every message below `node`.
fn flatten(node: &Node, sample: &mut Sample) {
    match node {
        Node::List(items) => {
            for item in items {
                flatten(item, sample);
            }
        }
        Node::Map(fields) => {
            if let Some(body) = fields.get("messageBody") {
                collect_message(body, sample);
            }
        }
        Node::Scalar(_) => {}
    }
}

/// Entries with a unit are channels; the first unit-less identification entry of a
/// message is its meter id. Channels are kept only once a meter id is known.
fn collect_message(body: &Node, sample: &mut Sample) {
    let Some(entries) = body.get("valList").and_then(Node::as_list) else {
        return;
    };

    let mut meter_id = None;
    let mut channels = Vec::new();
    for entry in entries {
        let Some(name) = entry.get("objName").and_then(Node::as_str) else {
            continue;
        };
        let Some(value) = entry.get("value").and_then(Node::as_value) else {
            continue;
        };
        match entry.get("unit").and_then(Node::as_str) {
            Some(unit) => channels.push(Channel::new(name, value.clone(), Some(unit))),
            None if meter_id.is_none() && name.contains(SML_METER_ID) => {
                meter_id = Some(value.to_string());
            }
            None => {}
        }
    }

    if let Some(id) = meter_id {
        sample.meter_id.get_or_insert(id);
    }
    if sample.meter_id.is_some() {
        sample.channels.extend(channels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::protocol::sml::GOLDEN_FRAME;
    use crate::transport::mock::{MockConnector, MockPort};
    use crate::types::Value;

    const ADDRESS: &str = "/dev/ttyUSB0";

    fn golden() -> Vec<u8> {
        hex::decode(GOLDEN_FRAME).unwrap()
    }

    fn reader(port: &MockPort, expected: &str) -> SmlReader {
        let connector = MockConnector::new().with_port(ADDRESS, port.clone());
        SmlReader::with_connector(MeterConfig::sml(expected, ADDRESS), Arc::new(connector))
    }

    #[test]
    fn test_golden_frame() {
        let port = MockPort::new();
        port.queue(&golden());
        let sample = reader(&port, "1EMH004921570").poll().unwrap().unwrap();

        assert_eq!(sample.meter_id.as_deref(), Some("1 EMH 00 4921570"));
        let names: Vec<&str> = sample.channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "1-0:1.8.0*255",
                "1-0:2.8.0*255",
                "1-0:1.8.1*255",
                "1-0:2.8.1*255",
                "1-0:1.8.2*255",
                "1-0:2.8.2*255",
                "1-0:16.7.0*255",
            ]
        );
        assert_eq!(
            sample.channels[0],
            Channel::new("1-0:1.8.0*255", 27_400_268.6, Some("Wh"))
        );
        assert_eq!(sample.channels[1].value, Value::Float(18_929_944.0));
        assert_eq!(
            sample.channels[6],
            Channel::new("1-0:16.7.0*255", -307.8, Some("W"))
        );
        assert!(!port.is_open());
    }

    #[test]
    fn test_leading_garbage_is_skipped() {
        let port = MockPort::new().chunk_size(7);
        let mut stream = golden()[200..].to_vec();
        stream.extend_from_slice(&golden());
        port.queue(&stream);
        let sample = reader(&port, "1EMH004921570").poll().unwrap().unwrap();
        assert_eq!(sample.channels.len(), 7);
    }

    #[test]
    fn test_backlog_is_flushed() {
        let port = MockPort::new();
        let mut stale = golden();
        // Backlog from a different meter: serial 4921571.
        while let Some(pos) = stale.windows(3).position(|w| w == [0x4b, 0x18, 0xe2]) {
            stale[pos + 2] = 0xe3;
        }
        for _ in 0..3 {
            port.queue(&stale);
        }
        port.after_discard(&golden());
        assert!(port.pending() > FLUSH_THRESHOLD);

        let mut reader = reader(&port, "1EMH004921570");
        let sample = reader.poll().unwrap().unwrap();
        assert_eq!(sample.meter_id.as_deref(), Some("1 EMH 00 4921570"));
    }

    #[test]
    fn test_malformed_frame_returns_nothing() {
        let mut frame = golden();
        // Corrupt the end escape: the reader runs into the next frame's start.
        let n = frame.len();
        frame[n - 5] = 0x00;
        let port = MockPort::new();
        port.queue(&frame);
        port.queue(&golden());
        let mut reader = reader(&port, "1EMH004921570");
        assert!(reader.poll().unwrap().is_none());
        assert!(!port.is_open());
    }

    #[test]
    fn test_silent_port_returns_nothing() {
        let port = MockPort::new();
        let mut reader = reader(&port, "1EMH004921570");
        assert!(reader.poll().unwrap().is_none());
        assert!(reader.discover().unwrap().is_none());
        assert_eq!(port.open_count(), 2);
        assert!(!port.is_open());
    }

    #[test]
    fn test_discover_reports_any_id() {
        let port = MockPort::new();
        port.queue(&golden());
        let device = reader(&port, "unknown").discover().unwrap().unwrap();
        assert_eq!(device.identifier, "1 EMH 00 4921570");
        assert_eq!(device.access_path, ADDRESS);
        assert_eq!(device.protocol, Protocol::Sml);
        assert_eq!(device.channels.len(), 7);
    }

    struct TopLevel(usize);

    impl TlvDecoder for TopLevel {
        fn decode(&self, _frame: &[u8]) -> std::result::Result<Node, DecodeError> {
            Ok(Node::List(vec![Node::List(Vec::new()); self.0]))
        }
    }

    #[test]
    fn test_top_level_count_is_validated() {
        let err = parse_frame(&TopLevel(3), &golden()).unwrap_err();
        assert!(matches!(
            err,
            Error::FrameValidation {
                kind: FrameError::TopLevel(3),
                ..
            }
        ));
        let sample = parse_frame(&TopLevel(2), &golden()).unwrap();
        assert!(sample.meter_id.is_none());
    }

    #[test]
    fn test_first_id_per_message_wins() {
        let entry = |name: &str, value: &str| {
            let mut fields = std::collections::BTreeMap::new();
            fields.insert("objName".to_owned(), Node::from(Value::from(name)));
            fields.insert("value".to_owned(), Node::from(Value::from(value)));
            Node::Map(fields)
        };
        let message = |entries: Vec<Node>| {
            let mut body = std::collections::BTreeMap::new();
            body.insert("valList".to_owned(), Node::List(entries));
            let mut fields = std::collections::BTreeMap::new();
            fields.insert("messageBody".to_owned(), Node::Map(body));
            Node::Map(fields)
        };
        let tree = Node::List(vec![
            message(vec![entry("1-0:0.0.9*255", "first"), entry("1-0:0.0.9*255", "second")]),
            message(vec![entry("1-0:0.0.9*255", "third")]),
        ]);
        let mut sample = Sample::at(0.0);
        flatten(&tree, &mut sample);
        assert_eq!(sample.meter_id.as_deref(), Some("first"));
    }
}
