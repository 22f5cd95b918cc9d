// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Xilinx `.bit` container framing.
//!
//! Layout:
//!
//! ```text
//! 00 09 0F F0 0F F0 0F F0 0F F0 00 00 01     preamble
//! 'a' len:u16 design-name\0                  text fields, any order
//! 'b' len:u16 device-name\0
//! 'c' len:u16 date\0
//! 'd' len:u16 time\0
//! 'e' size:u32 <size bytes of configuration data>
//! ```
//!
//! All integers are big-endian. A text field length counts the body
//! including its zero terminator.
//!
//! Two modes are provided: [`HeaderFramer`] consumes the header one byte at a
//! time for unbuffered streams, and [`locate_field`] / [`locate_payload`]
//! scan a header that is already resident in memory.

use core::fmt;

/// Fixed opening of every container.
pub const PREAMBLE: [u8; 13] = [
    0x00, 0x09, 0x0F, 0xF0, 0x0F, 0xF0, 0x0F, 0xF0, 0x0F, 0xF0, 0x00, 0x00, 0x01,
];

/// Longest text field accepted, terminator included.
pub const MAX_TEXT_FIELD_LEN: u16 = 1000;

/// Fields examined by the buffered scan before giving up.
pub const MAX_HEADER_FIELDS: usize = 8;

/// Width of the payload size prefix.
pub const PAYLOAD_SIZE_LEN: usize = 4;

const TEXT_LEN_LEN: usize = 2;

// Accumulator windows checked while the preamble streams in.
const PREAMBLE_LEN_WORD: u32 = 0x0009;
const PREAMBLE_SYNC_WORD: u32 = 0x0FF0_0FF0;
const PREAMBLE_END_WORD: u32 = 0xF000_0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FieldId {
    Design = b'a',
    Device = b'b',
    Date = b'c',
    Time = b'd',
    Payload = b'e',
}

impl FieldId {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'a' => Some(FieldId::Design),
            b'b' => Some(FieldId::Device),
            b'c' => Some(FieldId::Date),
            b'd' => Some(FieldId::Time),
            b'e' => Some(FieldId::Payload),
            _ => None,
        }
    }

    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    pub const fn is_text(self) -> bool {
        !matches!(self, FieldId::Payload)
    }

    pub const fn name(self) -> &'static str {
        match self {
            FieldId::Design => "design",
            FieldId::Device => "device",
            FieldId::Date => "date",
            FieldId::Time => "time",
            FieldId::Payload => "payload",
        }
    }
}

/// Reasons a container is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FramerError {
    BadPreamble,
    FieldTooLong(u16),
    UnknownField(u8),
    MissingTerminator,
    EmptyPayload,
}

impl fmt::Display for FramerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramerError::BadPreamble => write!(f, "bad preamble"),
            FramerError::FieldTooLong(len) => write!(f, "text field of {} bytes", len),
            FramerError::UnknownField(id) => write!(f, "unknown field id 0x{:02x}", id),
            FramerError::MissingTerminator => write!(f, "text field not zero-terminated"),
            FramerError::EmptyPayload => write!(f, "empty payload"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FramerError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FramerSignal {
    NeedMore,
    /// The header is complete; the next byte is the first payload byte.
    PayloadReady(u32),
    Fail(FramerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Intro,
    FieldId,
    TextField { len: u16 },
    SizeField,
    Done { size: u32 },
    Failed(FramerError),
}

/// Incremental header parser.
///
/// Failure is sticky: once [`FramerSignal::Fail`] has been returned every
/// further byte yields the same failure until [`HeaderFramer::reset`].
#[derive(Debug, Clone)]
pub struct HeaderFramer {
    stage: Stage,
    acc: u32,
    byte_in_field: u16,
}

impl Default for HeaderFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderFramer {
    pub const fn new() -> Self {
        Self {
            stage: Stage::Intro,
            acc: 0,
            byte_in_field: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.stage, Stage::Failed(_))
    }

    pub fn feed(&mut self, byte: u8) -> FramerSignal {
        let next = match self.stage {
            Stage::Failed(err) => return FramerSignal::Fail(err),
            Stage::Done { size } => return FramerSignal::PayloadReady(size),
            Stage::Intro => self.intro(byte),
            Stage::FieldId => Self::field_id(byte),
            Stage::TextField { len } => self.text_field(byte, len),
            Stage::SizeField => self.size_field(byte),
        };

        match next {
            Ok(stage) => {
                self.stage = stage;
                match stage {
                    Stage::Done { size } => FramerSignal::PayloadReady(size),
                    _ => FramerSignal::NeedMore,
                }
            }
            Err(err) => {
                trace!("header rejected: {}", err);
                self.stage = Stage::Failed(err);
                FramerSignal::Fail(err)
            }
        }
    }

    fn shift_in(&mut self, byte: u8) {
        self.acc = (self.acc << 8) | u32::from(byte);
        self.byte_in_field += 1;
    }

    fn intro(&mut self, byte: u8) -> Result<Stage, FramerError> {
        self.shift_in(byte);
        let ok = match self.byte_in_field {
            2 => self.acc & 0xFFFF == PREAMBLE_LEN_WORD,
            6 | 10 => self.acc == PREAMBLE_SYNC_WORD,
            13 => {
                if self.acc != PREAMBLE_END_WORD {
                    return Err(FramerError::BadPreamble);
                }
                self.byte_in_field = 0;
                return Ok(Stage::FieldId);
            }
            _ => true,
        };
        if ok {
            Ok(Stage::Intro)
        } else {
            Err(FramerError::BadPreamble)
        }
    }

    fn field_id(byte: u8) -> Result<Stage, FramerError> {
        match FieldId::from_byte(byte) {
            Some(FieldId::Payload) => Ok(Stage::SizeField),
            Some(_) => Ok(Stage::TextField { len: 0 }),
            None => Err(FramerError::UnknownField(byte)),
        }
    }

    fn text_field(&mut self, byte: u8, len: u16) -> Result<Stage, FramerError> {
        self.shift_in(byte);
        let pos = self.byte_in_field;
        if pos as usize == TEXT_LEN_LEN {
            let len = self.acc as u16;
            if len > MAX_TEXT_FIELD_LEN {
                return Err(FramerError::FieldTooLong(len));
            }
            // No room for the terminator.
            if len == 0 {
                return Err(FramerError::MissingTerminator);
            }
            return Ok(Stage::TextField { len });
        }
        if pos == len + TEXT_LEN_LEN as u16 {
            self.byte_in_field = 0;
            return if byte == 0 {
                Ok(Stage::FieldId)
            } else {
                Err(FramerError::MissingTerminator)
            };
        }
        Ok(Stage::TextField { len })
    }

    fn size_field(&mut self, byte: u8) -> Result<Stage, FramerError> {
        self.shift_in(byte);
        if self.byte_in_field as usize != PAYLOAD_SIZE_LEN {
            return Ok(Stage::SizeField);
        }
        self.byte_in_field = 0;
        match self.acc {
            0 => Err(FramerError::EmptyPayload),
            size => Ok(Stage::Done { size }),
        }
    }
}

/// Where the payload sits inside a resident header buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PayloadLocation {
    /// Offset of the 4-byte size prefix.
    pub size_offset: usize,
    /// Offset of the first configuration byte.
    pub data_offset: usize,
    pub size: u32,
}

impl PayloadLocation {
    /// Offset one past the last configuration byte, i.e. the length of the
    /// whole container.
    pub fn end(&self) -> u64 {
        self.data_offset as u64 + u64::from(self.size)
    }
}

fn be_u16(bytes: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes(bytes.get(..2)?.try_into().ok()?))
}

/// Offset of the content of field `id`, i.e. just past its length prefix.
///
/// For text fields that is the first character; for the payload field it is
/// the first configuration byte, right after the 4-byte size. Returns `None`
/// when the preamble does not match, when the walk runs off the buffer or
/// into a malformed field, or when `id` is not among the first
/// [`MAX_HEADER_FIELDS`] fields.
pub fn locate_field(buf: &[u8], id: FieldId) -> Option<usize> {
    if !buf.starts_with(&PREAMBLE) {
        return None;
    }
    let mut pos = PREAMBLE.len();

    for _ in 0..MAX_HEADER_FIELDS {
        let found = FieldId::from_byte(*buf.get(pos)?)?;
        pos += 1;

        if found == FieldId::Payload {
            // The payload field is always last.
            let start = pos + PAYLOAD_SIZE_LEN;
            return (id == FieldId::Payload && start <= buf.len()).then_some(start);
        }

        let len = be_u16(buf.get(pos..)?)?;
        if len > MAX_TEXT_FIELD_LEN {
            return None;
        }
        pos += TEXT_LEN_LEN;
        if found == id {
            return Some(pos);
        }
        pos += len as usize;
    }
    None
}

/// Read the payload size from a slice that starts at the size prefix.
pub fn extract_payload_size(bytes: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(
        bytes.get(..PAYLOAD_SIZE_LEN)?.try_into().ok()?,
    ))
}

/// Locate the payload and read its size. An empty payload is rejected.
pub fn locate_payload(buf: &[u8]) -> Option<PayloadLocation> {
    let data_offset = locate_field(buf, FieldId::Payload)?;
    let size_offset = data_offset - PAYLOAD_SIZE_LEN;
    let size = extract_payload_size(&buf[size_offset..])?;
    if size == 0 {
        return None;
    }
    Some(PayloadLocation {
        size_offset,
        data_offset,
        size,
    })
}

/// Text of field `id` without its terminator.
pub fn text_field(buf: &[u8], id: FieldId) -> Option<&str> {
    if !id.is_text() {
        return None;
    }
    let start = locate_field(buf, id)?;
    let len = be_u16(&buf[start - TEXT_LEN_LEN..])? as usize;
    let body = buf.get(start..start + len)?;
    match body.split_last() {
        Some((&0, text)) => core::str::from_utf8(text).ok(),
        _ => None,
    }
}

/// Iterate over the text fields of a resident header, in order.
pub fn header_fields(buf: &[u8]) -> HeaderFields<'_> {
    HeaderFields {
        buf,
        pos: if buf.starts_with(&PREAMBLE) {
            Some(PREAMBLE.len())
        } else {
            None
        },
        seen: 0,
    }
}

pub struct HeaderFields<'a> {
    buf: &'a [u8],
    pos: Option<usize>,
    seen: usize,
}

impl<'a> Iterator for HeaderFields<'a> {
    type Item = (FieldId, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let pos = self.pos.take()?;
        if self.seen == MAX_HEADER_FIELDS {
            return None;
        }
        self.seen += 1;

        let id = FieldId::from_byte(*self.buf.get(pos)?)?;
        if !id.is_text() {
            return None;
        }
        let start = pos + 1 + TEXT_LEN_LEN;
        let len = be_u16(self.buf.get(pos + 1..)?)?;
        if len > MAX_TEXT_FIELD_LEN {
            return None;
        }
        let body = self.buf.get(start..start + len as usize)?;
        let text = match body.split_last() {
            Some((&0, text)) => core::str::from_utf8(text).ok()?,
            _ => return None,
        };
        self.pos = Some(start + len as usize);
        Some((id, text))
    }
}
