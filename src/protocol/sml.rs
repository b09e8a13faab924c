//! SML 1.04 type-length-value decoding.
//!
//! Every element starts with a TL field:
//! ```text
//!   bit 7     more TL bytes follow
//!   bits 6-4  type: 000 octet string, 100 boolean, 101 signed, 110 unsigned, 111 list
//!   bits 3-0  length (continued in the low nibble of each following TL byte)
//! ```
//! For scalars the length includes the TL bytes, for lists it is the element
//! count. `0x01` is an empty octet string (an absent optional) and `0x00` ends a
//! message.

use std::collections::BTreeMap;

use crate::error::DecodeError;
use crate::protocol::frame::{END, MIN_FRAME_SIZE, START, TRAILER_LEN};
use crate::protocol::{Node, TlvDecoder, obis};
use crate::types::Value;

/// Deepest list nesting accepted.
const MAX_DEPTH: usize = 16;

/// Longest TL field accepted.
const MAX_TL_BYTES: usize = 4;

const OPEN_RESPONSE: u32 = 0x0101;
const CLOSE_RESPONSE: u32 = 0x0201;
const GET_LIST_RESPONSE: u32 = 0x0701;

const OPEN_RESPONSE_FIELDS: &[&str] = &[
    "codepage",
    "clientId",
    "reqFileId",
    "serverId",
    "refTime",
    "smlVersion",
];
const CLOSE_RESPONSE_FIELDS: &[&str] = &["globalSignature"];
const GET_LIST_RESPONSE_FIELDS: &[&str] = &[
    "clientId",
    "serverId",
    "listName",
    "actSensorTime",
    "valList",
    "listSignature",
    "actGatewayTime",
];

/// Decoder for complete SML frames.
///
/// The result has exactly two top-level elements: a header map (`version`,
/// `fillBytes`, `crc16`) and the list of messages. Each message is a map with
/// `transactionId`, `groupNo`, `abortOnError`, `messageBody` and `crc16`; a
/// `GetListResponse` body carries its entries under `valList`. Absent optional
/// fields are omitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmlDecoder;

impl TlvDecoder for SmlDecoder {
    fn decode(&self, frame: &[u8]) -> Result<Node, DecodeError> {
        if frame.len() < MIN_FRAME_SIZE || !frame.starts_with(START) {
            return Err(DecodeError::Structure("not an SML frame".into()));
        }
        let trailer = &frame[frame.len() - TRAILER_LEN..];
        let body = &frame[START.len()..frame.len() - TRAILER_LEN - END.len()];

        let fill = usize::from(trailer[1]);
        if fill > body.len() || body[body.len() - fill..].iter().any(|&b| b != 0) {
            return Err(DecodeError::Structure(format!(
                "trailer announces {fill} fill bytes"
            )));
        }

        let mut cursor = Cursor::new(&body[..body.len() - fill], START.len());
        let mut messages = Vec::new();
        while let Some(next) = cursor.peek() {
            if next == 0x00 {
                return Err(DecodeError::TrailingData(cursor.remaining()));
            }
            messages.push(message(cursor.element(0)?)?);
        }

        let mut header = Fields::default();
        header.put("version", Some(Value::Integer(1).into()));
        header.put("fillBytes", Some(Value::Integer(fill as i64).into()));
        header.put(
            "crc16",
            Some(Value::Integer(i64::from(u16::from_le_bytes([trailer[2], trailer[3]]))).into()),
        );
        Ok(Node::List(vec![header.into_node(), Node::List(messages)]))
    }
}

/// One decoded element, still borrowing octet strings from the frame.
#[derive(Debug, Clone, PartialEq)]
enum Element<'a> {
    Absent,
    EndOfMessage,
    Octets(&'a [u8]),
    Bool(bool),
    Int(i64),
    Uint(u64),
    List(Vec<Element<'a>>),
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Cursor<'a> {
    /// `base` is the offset of `data` within the frame, for error reporting.
    const fn new(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    const fn offset(&self) -> usize {
        self.base + self.pos
    }

    const fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let byte = self
            .peek()
            .ok_or(DecodeError::UnexpectedEnd(self.offset()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::UnexpectedEnd(self.base + self.data.len()));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn element(&mut self, depth: usize) -> Result<Element<'a>, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::Structure(format!(
                "lists nested deeper than {MAX_DEPTH} at offset {}",
                self.offset()
            )));
        }

        let offset = self.offset();
        let tl = self.byte()?;
        if tl == 0x00 {
            return Ok(Element::EndOfMessage);
        }

        let kind = (tl >> 4) & 0x07;
        let mut length = usize::from(tl & 0x0f);
        let mut tl_len = 1;
        let mut more = tl & 0x80 != 0;
        while more {
            if tl_len == MAX_TL_BYTES {
                return Err(DecodeError::InvalidLength { length, offset });
            }
            let next = self.byte()?;
            length = (length << 4) | usize::from(next & 0x0f);
            tl_len += 1;
            more = next & 0x80 != 0;
        }

        if kind == 0x07 {
            let mut items = Vec::new();
            for _ in 0..length {
                items.push(self.element(depth + 1)?);
            }
            return Ok(Element::List(items));
        }

        let size = length
            .checked_sub(tl_len)
            .ok_or(DecodeError::InvalidLength { length, offset })?;
        let invalid = DecodeError::InvalidLength { length, offset };
        match kind {
            0x00 => {
                let data = self.take(size)?;
                Ok(if data.is_empty() {
                    Element::Absent
                } else {
                    Element::Octets(data)
                })
            }
            0x04 => match self.take(size)? {
                [b] => Ok(Element::Bool(*b != 0)),
                _ => Err(invalid),
            },
            0x05 => match self.take(size)? {
                data @ [first, ..] if data.len() <= 8 => {
                    let init: i64 = if first & 0x80 == 0 { 0 } else { -1 };
                    Ok(Element::Int(
                        data.iter().fold(init, |acc, &b| (acc << 8) | i64::from(b)),
                    ))
                }
                _ => Err(invalid),
            },
            0x06 => match self.take(size)? {
                data if !data.is_empty() && data.len() <= 8 => Ok(Element::Uint(
                    data.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b)),
                )),
                _ => Err(invalid),
            },
            _ => Err(DecodeError::UnknownType { tl, offset }),
        }
    }
}

/// Map under construction; absent fields are skipped.
#[derive(Default)]
struct Fields(BTreeMap<String, Node>);

impl Fields {
    fn put(&mut self, key: &str, node: Option<Node>) {
        if let Some(node) = node {
            self.0.insert(key.to_owned(), node);
        }
    }

    fn into_node(self) -> Node {
        Node::Map(self.0)
    }
}

fn structure(message: impl Into<String>) -> DecodeError {
    DecodeError::Structure(message.into())
}

fn into_array<'a, const N: usize>(
    element: Element<'a>,
    what: &str,
) -> Result<[Element<'a>; N], DecodeError> {
    let Element::List(items) = element else {
        return Err(structure(format!("{what} is not a list")));
    };
    <[Element<'a>; N]>::try_from(items).map_err(|items| {
        structure(format!("{what} has {} elements, expected {N}", items.len()))
    })
}

fn message(element: Element<'_>) -> Result<Node, DecodeError> {
    let [transaction_id, group_no, abort_on_error, body, crc, end] =
        into_array::<6>(element, "message")?;
    if end != Element::EndOfMessage {
        return Err(structure("message not terminated by end-of-message"));
    }

    let mut fields = Fields::default();
    fields.put("transactionId", generic(transaction_id));
    fields.put("groupNo", generic(group_no));
    fields.put("abortOnError", generic(abort_on_error));
    fields.put("messageBody", Some(message_body(body)?));
    fields.put("crc16", generic(crc));
    Ok(fields.into_node())
}

fn message_body(element: Element<'_>) -> Result<Node, DecodeError> {
    let [tag, content] = into_array::<2>(element, "message body")?;
    let Element::Uint(tag) = tag else {
        return Err(structure("message body tag is not an unsigned integer"));
    };
    let tag = u32::try_from(tag).map_err(|_| structure(format!("message tag 0x{tag:x}")))?;

    let (name, names) = match tag {
        OPEN_RESPONSE => ("OpenResponse", OPEN_RESPONSE_FIELDS),
        CLOSE_RESPONSE => ("CloseResponse", CLOSE_RESPONSE_FIELDS),
        GET_LIST_RESPONSE => ("GetListResponse", GET_LIST_RESPONSE_FIELDS),
        _ => {
            let mut fields = Fields::default();
            fields.put("type", Some(Value::Text(format!("0x{tag:04x}")).into()));
            fields.put("content", generic(content));
            return Ok(fields.into_node());
        }
    };

    let Element::List(items) = content else {
        return Err(structure(format!("{name} is not a list")));
    };
    if items.len() != names.len() {
        return Err(structure(format!(
            "{name} has {} elements, expected {}",
            items.len(),
            names.len()
        )));
    }

    let mut fields = Fields::default();
    fields.put("type", Some(Value::from(name).into()));
    for (key, item) in names.iter().zip(items) {
        let node = match *key {
            "valList" => Some(value_list(item)?),
            "listName" => octets_as_obis(item),
            key if key.ends_with("Time") => time(item),
            _ => generic(item),
        };
        fields.put(key, node);
    }
    Ok(fields.into_node())
}

fn value_list(element: Element<'_>) -> Result<Node, DecodeError> {
    match element {
        Element::List(entries) => entries
            .into_iter()
            .map(list_entry)
            .collect::<Result<Vec<_>, _>>()
            .map(Node::List),
        Element::Absent => Ok(Node::List(Vec::new())),
        _ => Err(structure("valList is not a list")),
    }
}

fn list_entry(element: Element<'_>) -> Result<Node, DecodeError> {
    let [obj_name, status, val_time, unit, scaler, value, signature] =
        into_array::<7>(element, "list entry")?;

    let mut fields = Fields::default();
    let Some(obj_name) = octets_as_obis(obj_name) else {
        return Err(structure("list entry without objName"));
    };
    fields.put("objName", Some(obj_name));
    fields.put("status", generic(status));
    fields.put("valTime", time(val_time));

    let unit = match unit {
        Element::Absent => None,
        Element::Uint(code) => {
            let code = u8::try_from(code).map_err(|_| structure(format!("unit code {code}")))?;
            Some(Value::Text(obis::unit_name(code).into_owned()).into())
        }
        _ => return Err(structure("unit is not an unsigned integer")),
    };
    fields.put("unit", unit);

    let scaler = match scaler {
        Element::Absent => None,
        Element::Int(s) => Some(s),
        Element::Uint(s) => Some(i64::try_from(s).map_err(|_| structure("scaler out of range"))?),
        _ => return Err(structure("scaler is not an integer")),
    };
    // SML scalers are Integer8.
    let scaler = scaler
        .map(|s| i8::try_from(s).map_err(|_| structure(format!("scaler {s} out of range"))))
        .transpose()?;
    fields.put("scaler", scaler.map(|s| Value::Integer(i64::from(s)).into()));
    fields.put("value", scaled(value, scaler));
    fields.put("valueSignature", generic(signature));
    Ok(fields.into_node())
}

/// Applies a decimal scaler. Values without a scaler keep their integer type.
fn scaled(element: Element<'_>, scaler: Option<i8>) -> Option<Node> {
    let raw = match element {
        Element::Int(v) => v as f64,
        Element::Uint(v) => v as f64,
        other => return generic(other),
    };
    match scaler {
        Some(s) if s < 0 => Some(Value::Float(raw / 10f64.powi(-i32::from(s))).into()),
        Some(s) if s > 0 => Some(Value::Float(raw * 10f64.powi(i32::from(s))).into()),
        _ => generic(element),
    }
}

fn octets_as_obis(element: Element<'_>) -> Option<Node> {
    match element {
        Element::Octets(code) => Some(
            Value::Text(obis::format(code).unwrap_or_else(|| render_octets(code))).into(),
        ),
        other => generic(other),
    }
}

/// `SML_Time` is a choice of seconds index or timestamp; both become integers.
fn time(element: Element<'_>) -> Option<Node> {
    match element {
        Element::List(items) => match items.as_slice() {
            [Element::Uint(_), Element::Uint(v)] => integer(*v),
            _ => generic(Element::List(items)),
        },
        other => generic(other),
    }
}

fn integer(v: u64) -> Option<Node> {
    Some(
        i64::try_from(v)
            .map_or(Value::Float(v as f64), Value::Integer)
            .into(),
    )
}

/// Converts an element without field-specific meaning.
fn generic(element: Element<'_>) -> Option<Node> {
    match element {
        Element::Absent | Element::EndOfMessage => None,
        Element::Octets(bytes) => Some(Value::Text(render_octets(bytes)).into()),
        Element::Bool(b) => Some(Value::Integer(i64::from(b)).into()),
        Element::Int(v) => Some(Value::Integer(v).into()),
        Element::Uint(v) => integer(v),
        Element::List(items) => Some(Node::List(items.into_iter().filter_map(generic).collect())),
    }
}

/// Renders an octet string: DIN 43863-5 server ids in their printed form,
/// printable ASCII as text, anything else as lowercase hex.
#[must_use]
pub fn render_octets(bytes: &[u8]) -> String {
    if let Some(id) = server_id(bytes) {
        return id;
    }
    if !bytes.is_empty() && bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        return bytes.iter().copied().map(char::from).collect();
    }
    hex::encode(bytes)
}

/// Formats a 10-byte server id (`09`, medium, 3-letter manufacturer, version,
/// 32-bit serial) as `"1 EMH 00 4921570"`.
fn server_id(bytes: &[u8]) -> Option<String> {
    match *bytes {
        [0x09, medium, m1, m2, m3, version, s0, s1, s2, s3]
            if [m1, m2, m3].iter().all(u8::is_ascii_uppercase) =>
        {
            Some(format!(
                "{medium} {}{}{} {version:02} {}",
                char::from(m1),
                char::from(m2),
                char::from(m3),
                u32::from_be_bytes([s0, s1, s2, s3])
            ))
        }
        _ => None,
    }
}

/// Captured frame of an EMH eHZ meter: OpenResponse, GetListResponse with
/// ten entries, CloseResponse.
#[cfg(test)]
pub(crate) const GOLDEN_FRAME: &str = concat!(
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
