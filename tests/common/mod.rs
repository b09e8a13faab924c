//! Shared helpers for integration tests: SML encoding, captured frames, log capture.

#![allow(dead_code)]

use std::fmt;
use std::sync::{Arc, Mutex};

use meterreader::protocol::frame;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Captured frame of an EMH eHZ meter with id `1 EMH 00 4921570`.
pub const EMH_FRAME: &str = concat!(
    "1b1b1b1b01010101760700070df8b2d762006200726301017601010700070b3f3b9d0b0901454d48",
    "00004b18e2010163586b00760700070df8b2d8620062007263070177010b0901454d4800004b18e2",
    "070100620affff726201650b3fee6a7a77078181c78203ff0101010104454d480177070100000009",
    "ff010101010b0901454d4800004b18e20177070100010800ff640101a201621e52ff56001054f2fe",
    "0177070100020800ff640101a201621e52ff56000b487af00177070100010801ff0101621e52ff56",
    "001054f2fe0177070100020801ff0101621e52ff56000b487af00177070100010802ff0101621e52",
    "ff5600000000000177070100020802ff0101621e52ff5600000000000177070100100700ff010162",
    "1b52ff55fffff3fa0177078181c78205ff01726201650b3fee6a0101830258af289a611352984cf8",
    "5295237ef26670cb3d367e218b48d952789fc4a5888604012b323490ced3d96d341c9e9ccf770101",
    "01635b1200760700070df8b2db62006200726302017101633b1500001b1b1b1b1a011be1",
);

pub fn emh_frame() -> Vec<u8> {
    hex::decode(EMH_FRAME).unwrap()
}

/// Installs a test log subscriber, filtered by `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Log events recorded by [`capture_logs`].
#[derive(Clone, Default)]
pub struct Logs(Arc<Mutex<Vec<(Level, String)>>>);

impl Logs {
    /// Messages logged at exactly `level`.
    pub fn at(&self, level: Level) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

struct Message(String);

impl Visit for Message {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for Logs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = Message(String::new());
        event.record(&mut message);
        self.0.lock().unwrap().push((*event.metadata().level(), message.0));
    }
}

/// Runs `f` with every log event on this thread recorded.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, Logs) {
    let logs = Logs::default();
    let subscriber = tracing_subscriber::registry().with(logs.clone());
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs)
}

/// SML element for building test frames.
pub enum Tlv {
    Absent,
    End,
    Octets(Vec<u8>),
    Int(i64, usize),
    Uint(u64, usize),
    List(Vec<Tlv>),
}

impl Tlv {
    pub fn text(s: &str) -> Self {
        Self::Octets(s.as_bytes().to_vec())
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Absent => out.push(0x01),
            Self::End => out.push(0x00),
            Self::Octets(data) => {
                let total = data.len() + 1;
                if total <= 0x0f {
                    out.push(total as u8);
                } else {
                    let total = data.len() + 2;
                    assert!(total <= 0xff, "octet string too long for test encoder");
                    out.push(0x80 | (total >> 4) as u8);
                    out.push((total & 0x0f) as u8);
                }
                out.extend_from_slice(data);
            }
            Self::Int(v, size) => {
                out.push(0x50 | (size + 1) as u8);
                out.extend_from_slice(&v.to_be_bytes()[8 - size..]);
            }
            Self::Uint(v, size) => {
                out.push(0x60 | (size + 1) as u8);
                out.extend_from_slice(&v.to_be_bytes()[8 - size..]);
            }
            Self::List(items) => {
                assert!(items.len() <= 0x0f, "list too long for test encoder");
                out.push(0x70 | items.len() as u8);
                for item in items {
                    item.encode(out);
                }
            }
        }
    }
}

/// `SML_ListEntry` without status, time and signature.
pub fn entry(obis: [u8; 6], unit: Option<u8>, scaler: Option<i8>, value: Tlv) -> Tlv {
    Tlv::List(vec![
        Tlv::Octets(obis.to_vec()),
        Tlv::Absent,
        Tlv::Absent,
        unit.map_or(Tlv::Absent, |u| Tlv::Uint(u64::from(u), 1)),
        scaler.map_or(Tlv::Absent, |s| Tlv::Int(i64::from(s), 1)),
        value,
        Tlv::Absent,
    ])
}

/// One `GetListResponse` message carrying `entries`.
pub fn get_list_response(transaction: u8, entries: Vec<Tlv>) -> Vec<u8> {
    let body = Tlv::List(vec![
        Tlv::Absent,
        Tlv::Octets(vec![0x09, 0x01, 0x45, 0x4d, 0x48, 0x00, 0x00, 0x4b, 0x18, 0xe2]),
        Tlv::Octets(vec![1, 0, 98, 10, 255, 255]),
        Tlv::Absent,
        Tlv::List(entries),
        Tlv::Absent,
        Tlv::Absent,
    ]);
    let message = Tlv::List(vec![
        Tlv::Octets(vec![0x00, transaction]),
        Tlv::Uint(0, 1),
        Tlv::Uint(0, 1),
        Tlv::List(vec![Tlv::Uint(0x0701, 2), body]),
        Tlv::Uint(0, 2),
        Tlv::End,
    ]);
    let mut out = Vec::new();
    message.encode(&mut out);
    out
}

/// Frame with one identification entry and two value entries.
pub fn scenario_frame() -> Vec<u8> {
    let message = get_list_response(
        1,
        vec![
            entry([1, 0, 0, 0, 9, 255], None, None, Tlv::text("1 EMH 00 4921570")),
            entry([1, 0, 1, 8, 0, 255], Some(30), Some(-1), Tlv::Int(274_002_686, 4)),
            entry([1, 0, 16, 7, 0, 255], Some(27), Some(-1), Tlv::Int(-3078, 2)),
        ],
    );
    frame::encode(&message).to_vec()
}
