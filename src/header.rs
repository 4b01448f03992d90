//! DXB message header: routing pre-header followed by the block header.
//!
//! Only parsing and skipping are supported here. Signatures and encrypted
//! bodies are carried through untouched.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::cursor::{Cursor, Result};
use crate::endpoint::{Endpoint, EndpointKind, InstanceRef};
use crate::error::DecodeError;
use crate::opcode::Opcode;
use crate::wire::{push_op, push_u8, push_u16, push_u32, push_u64};

pub const MAGIC: [u8; 2] = [0x01, 0x64];
pub const VERSION: u8 = 1;
pub const DEFAULT_TTL: u8 = 64;
/// Header timestamps count milliseconds from 2022-01-21T23:00:00Z.
pub const BIG_BANG_MS: i64 = 1_642_806_000_000;
pub const SIGNATURE_SIZE: usize = 96;
pub const IV_SIZE: usize = 16;

const FLOOD: u16 = u16::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Security {
    None,
    Signed,
    SignedEncrypted,
    Encrypted,
}

impl Security {
    fn from_byte(byte: u8) -> Option<Security> {
        match byte {
            0 => Some(Security::None),
            1 => Some(Security::Signed),
            2 => Some(Security::SignedEncrypted),
            3 => Some(Security::Encrypted),
            _ => None,
        }
    }

    fn byte(self) -> u8 {
        match self {
            Security::None => 0,
            Security::Signed => 1,
            Security::SignedEncrypted => 2,
            Security::Encrypted => 3,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Security::Signed | Security::SignedEncrypted)
    }

    pub fn is_encrypted(self) -> bool {
        matches!(self, Security::Encrypted | Security::SignedEncrypted)
    }
}

/// What the block body carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BlockType {
    Request = 0,
    Response = 1,
    Data = 2,
    TmpScope = 3,
    Local = 4,
    Hello = 5,
    Debugger = 6,
    SourceMap = 7,
    Update = 8,
    Goodbye = 9,
}

impl BlockType {
    fn from_byte(byte: u8) -> Option<BlockType> {
        use BlockType::*;
        [Request, Response, Data, TmpScope, Local, Hello, Debugger, SourceMap, Update, Goodbye]
            .get(byte as usize)
            .copied()
    }
}

/// Receivers of a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Receivers {
    Flood,
    /// Opaque encoded receiver filter; empty when the block has no receivers.
    Filter(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub version: u8,
    pub block_size: u16,
    pub ttl: u8,
    pub priority: u8,
    pub security: Security,
    pub sender: Option<Endpoint>,
    pub receivers: Receivers,
    pub scope_id: u32,
    pub return_index: u16,
    pub block_increment: u16,
    pub block_type: BlockType,
    pub flags: u8,
    pub timestamp: DateTime<Utc>,
}

impl Header {
    pub fn encrypted_flag(&self) -> bool {
        self.flags & 0x80 != 0
    }

    pub fn executable(&self) -> bool {
        self.flags & 0x40 != 0
    }

    pub fn end_of_scope(&self) -> bool {
        self.flags & 0x20 != 0
    }

    pub fn device_type(&self) -> u8 {
        self.flags & 0x1f
    }

    /// Write the header. Signature and IV slots are zero-filled.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&MAGIC);
        push_u8(buf, self.version);
        push_u16(buf, self.block_size);
        push_u8(buf, self.ttl);
        push_u8(buf, self.priority);
        push_u8(buf, self.security.byte());
        match &self.sender {
            Some(sender) => encode_sender(sender, buf),
            None => push_u8(buf, 0),
        }
        match &self.receivers {
            Receivers::Flood => push_u16(buf, FLOOD),
            Receivers::Filter(bytes) => {
                push_u16(buf, bytes.len() as u16);
                buf.extend_from_slice(bytes);
            }
        }
        if self.security.is_signed() {
            buf.resize(buf.len() + SIGNATURE_SIZE, 0);
        }
        push_u32(buf, self.scope_id);
        push_u16(buf, self.return_index);
        push_u16(buf, self.block_increment);
        push_u8(buf, self.block_type as u8);
        push_u8(buf, self.flags);
        let since = self.timestamp.timestamp_millis().saturating_sub(BIG_BANG_MS).max(0);
        push_u64(buf, since as u64);
        if self.security.is_encrypted() {
            buf.resize(buf.len() + IV_SIZE, 0);
        }
    }
}

impl Default for Header {
    fn default() -> Self {
        Header {
            version: VERSION,
            block_size: 0,
            ttl: DEFAULT_TTL,
            priority: 0,
            security: Security::None,
            sender: None,
            receivers: Receivers::Filter(Vec::new()),
            scope_id: 0,
            return_index: 0,
            block_increment: 0,
            block_type: BlockType::Request,
            flags: 0,
            timestamp: DateTime::from_timestamp_millis(BIG_BANG_MS).unwrap_or_default(),
        }
    }
}

/// Split a message into its header and body.
///
/// Every failure, including truncation, is reported as
/// [`DecodeError::InvalidHeader`] at the offset where parsing stopped.
pub fn strip(dxb: &[u8]) -> Result<(Header, &[u8])> {
    let mut cur = Cursor::new(dxb);
    match parse(&mut cur) {
        Ok(header) => {
            let body = &dxb[cur.offset()..];
            debug!(
                scope_id = header.scope_id,
                block_type = ?header.block_type,
                body_len = body.len(),
                "stripped header"
            );
            Ok((header, body))
        }
        Err(_) => Err(DecodeError::InvalidHeader {
            offset: cur.offset(),
        }),
    }
}

fn parse(cur: &mut Cursor<'_>) -> Result<Header> {
    let invalid = |cur: &Cursor<'_>| DecodeError::InvalidHeader {
        offset: cur.offset(),
    };
    if cur.bytes(2)? != MAGIC {
        return Err(invalid(cur));
    }
    let version = cur.u8()?;
    let block_size = cur.u16()?;
    let ttl = cur.u8()?;
    let priority = cur.u8()?;
    let security = Security::from_byte(cur.u8()?).ok_or_else(|| invalid(cur))?;
    let sender = read_sender(cur, true)?;
    let receivers = match cur.u16()? {
        FLOOD => Receivers::Flood,
        len => Receivers::Filter(cur.bytes(len as usize)?.to_vec()),
    };
    if security.is_signed() {
        cur.skip(SIGNATURE_SIZE)?;
    }

    let scope_id = cur.u32()?;
    let return_index = cur.u16()?;
    let block_increment = cur.u16()?;
    let block_type = BlockType::from_byte(cur.u8()?).ok_or_else(|| invalid(cur))?;
    let flags = cur.u8()?;
    let since = cur.u64()?;
    let timestamp = i64::try_from(since)
        .ok()
        .and_then(|since| since.checked_add(BIG_BANG_MS))
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| invalid(cur))?;
    if security.is_encrypted() {
        cur.skip(IV_SIZE)?;
    }

    Ok(Header {
        version,
        block_size,
        ttl,
        priority,
        security,
        sender,
        receivers,
        scope_id,
        return_index,
        block_increment,
        block_type,
        flags,
        timestamp,
    })
}

/// Sender record. The appspace endpoint, when flagged, follows directly and
/// has no appspace byte of its own; it is read and dropped.
fn read_sender(cur: &mut Cursor<'_>, with_appspace: bool) -> Result<Option<Endpoint>> {
    let start = cur.offset();
    let invalid = DecodeError::InvalidHeader { offset: start };
    let kind_byte = cur.u8()?;
    if kind_byte == 0 {
        return Ok(None);
    }
    let kind = Opcode::from_byte(kind_byte)
        .and_then(EndpointKind::from_opcode)
        .ok_or_else(|| invalid.clone())?;
    let name_len = cur.u8()? as usize;
    let subspace_count = cur.u8()?;
    let instance_len = cur.u8()?;
    let has_appspace = with_appspace && cur.u8()? != 0;
    if instance_len == 0 {
        return Err(invalid);
    }
    let name = cur.bytes(name_len)?;
    for _ in 0..subspace_count {
        match cur.u8()? {
            0 => return Err(invalid),
            len => {
                cur.text(len as usize)?;
            }
        }
    }
    let instance = match instance_len {
        255 => InstanceRef::Default,
        len => InstanceRef::Text(cur.text(len as usize)?),
    };
    let sender = Endpoint::from_binary(kind, name, instance).map_err(|_| invalid)?;
    if has_appspace {
        read_sender(cur, false)?;
    }
    Ok(Some(sender))
}

fn encode_sender(sender: &Endpoint, buf: &mut Vec<u8>) {
    push_op(buf, sender.kind().opcode(false));
    let mut record = Vec::new();
    sender.encode_record(&mut record);
    // record: name length, subspace count, instance length, then the rest
    buf.extend_from_slice(&record[..3]);
    push_u8(buf, 0);
    buf.extend_from_slice(&record[3..]);
}
