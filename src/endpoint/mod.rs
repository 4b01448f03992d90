//! Addressable identities (`@person`, `@+institution`, `@@id`, `*bot`).
//!
//! Endpoints are interned per canonical string: while any handle is alive,
//! every lookup of the same identity yields the same allocation, so equality
//! is pointer identity. The last handle going away removes the table entry.

pub mod liveness;
mod registry;
mod target;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::trace;

use crate::cursor::Cursor;
use crate::error::{EndpointError, RecordError};
use crate::hex;
use crate::opcode::Opcode;
use crate::wire::push_u8;

use liveness::LivenessCell;
use registry::Registry;

pub use liveness::{Network, TraceHop, TraceRequest, TraceStep, Transport};
pub use target::{Target, WildcardTarget, logical_match};

/// Size of the binary name slot.
pub const NAME_SLOT: usize = 18;
/// Size of the binary instance slot.
pub const INSTANCE_SLOT: usize = 2;

pub type Result<T> = std::result::Result<T, EndpointError>;

static ENDPOINTS: Lazy<Registry<EndpointInner>> = Lazy::new(Registry::new);

static LOCAL: Lazy<Endpoint> = Lazy::new(|| {
    Endpoint::from_binary(EndpointKind::Id, &[0x00; NAME_SLOT], InstanceRef::Default)
        .expect("local endpoint is valid")
});

static BROADCAST: Lazy<Endpoint> = Lazy::new(|| {
    Endpoint::from_binary(EndpointKind::Id, &[0xff; NAME_SLOT], InstanceRef::Default)
        .expect("broadcast endpoint is valid")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Person,
    Institution,
    Id,
    Bot,
}

impl EndpointKind {
    pub fn prefix(self) -> &'static str {
        match self {
            EndpointKind::Person => "@",
            EndpointKind::Institution => "@+",
            EndpointKind::Id => "@@",
            EndpointKind::Bot => "*",
        }
    }

    pub fn opcode(self, wildcard: bool) -> Opcode {
        match (self, wildcard) {
            (EndpointKind::Person, false) => Opcode::PersonAlias,
            (EndpointKind::Person, true) => Opcode::PersonAliasWildcard,
            (EndpointKind::Institution, false) => Opcode::InstitutionAlias,
            (EndpointKind::Institution, true) => Opcode::InstitutionAliasWildcard,
            (EndpointKind::Id, false) => Opcode::Endpoint,
            (EndpointKind::Id, true) => Opcode::EndpointWildcard,
            (EndpointKind::Bot, false) => Opcode::Bot,
            (EndpointKind::Bot, true) => Opcode::BotWildcard,
        }
    }

    pub fn from_opcode(op: Opcode) -> Option<EndpointKind> {
        match op {
            Opcode::PersonAlias | Opcode::PersonAliasWildcard => Some(EndpointKind::Person),
            Opcode::InstitutionAlias | Opcode::InstitutionAliasWildcard => {
                Some(EndpointKind::Institution)
            }
            Opcode::Endpoint | Opcode::EndpointWildcard => Some(EndpointKind::Id),
            Opcode::Bot | Opcode::BotWildcard => Some(EndpointKind::Bot),
            _ => None,
        }
    }

    /// Split a textual endpoint into its kind and the remainder.
    pub fn split_prefix(text: &str) -> Option<(EndpointKind, &str)> {
        if let Some(rest) = text.strip_prefix("@@") {
            Some((EndpointKind::Id, rest))
        } else if let Some(rest) = text.strip_prefix("@+") {
            Some((EndpointKind::Institution, rest))
        } else if let Some(rest) = text.strip_prefix('@') {
            Some((EndpointKind::Person, rest))
        } else {
            text.strip_prefix('*').map(|rest| (EndpointKind::Bot, rest))
        }
    }
}

/// Instance designator accepted by the endpoint constructors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceRef<'a> {
    /// No instance, the main endpoint.
    Default,
    /// Wildcard instance (`*`); resolves to the main endpoint.
    Any,
    /// Hex text, case-insensitive, at most four digits.
    Text(&'a str),
    /// Raw slot bytes, big-endian, at most two.
    Binary(&'a [u8]),
    Numeric(u16),
}

impl InstanceRef<'_> {
    pub fn resolve(self) -> Result<u16> {
        match self {
            InstanceRef::Default | InstanceRef::Any => Ok(0),
            InstanceRef::Numeric(value) => Ok(value),
            InstanceRef::Binary(bytes) => {
                if bytes.len() > INSTANCE_SLOT {
                    return Err(EndpointError::InstanceTooLong {
                        len: bytes.len(),
                        max: INSTANCE_SLOT,
                    });
                }
                Ok(bytes
                    .iter()
                    .fold(0u16, |acc, byte| (acc << 8) | u16::from(*byte)))
            }
            InstanceRef::Text(text) => {
                if text.is_empty() || text == "*" {
                    return Ok(0);
                }
                if !text.bytes().all(|b| hex::hex_value(b).is_some()) {
                    return Err(EndpointError::MalformedInstance(text.to_string()));
                }
                if text.len() > INSTANCE_SLOT * 2 {
                    return Err(EndpointError::InstanceTooLong {
                        len: text.len().div_ceil(2),
                        max: INSTANCE_SLOT,
                    });
                }
                u16::from_str_radix(text, 16)
                    .map_err(|_| EndpointError::MalformedInstance(text.to_string()))
            }
        }
    }
}

pub(crate) struct EndpointInner {
    kind: EndpointKind,
    binary_name: [u8; NAME_SLOT],
    name: String,
    instance: u16,
    canonical: String,
    main: Option<Endpoint>,
    pub(crate) liveness: LivenessCell,
}

impl Drop for EndpointInner {
    fn drop(&mut self) {
        ENDPOINTS.release(&self.canonical);
    }
}

/// Interned handle to an endpoint identity.
#[derive(Clone)]
pub struct Endpoint(Arc<EndpointInner>);

impl Endpoint {
    /// Parse `@name`, `@+name`, `@@hex` or `*name`, optionally followed by `/instance`.
    pub fn get(text: &str) -> Result<Endpoint> {
        let (kind, rest) = EndpointKind::split_prefix(text)
            .ok_or_else(|| EndpointError::UnknownPrefix(text.to_string()))?;
        match rest.split_once('/') {
            Some((name, instance)) => Endpoint::from_name(kind, name, InstanceRef::Text(instance)),
            None => Endpoint::from_name(kind, rest, InstanceRef::Default),
        }
    }

    /// Build from a textual name without prefix. Id names are hex, `local` or `any`.
    pub fn from_name(kind: EndpointKind, name: &str, instance: InstanceRef<'_>) -> Result<Endpoint> {
        let binary_name = match kind {
            EndpointKind::Id => parse_id(name)?,
            _ => text_slot(name)?,
        };
        Endpoint::build(kind, binary_name, instance.resolve()?)
    }

    /// Build from a raw name slot (NUL padded for text kinds).
    pub fn from_binary(kind: EndpointKind, name: &[u8], instance: InstanceRef<'_>) -> Result<Endpoint> {
        if name.len() > NAME_SLOT {
            return Err(EndpointError::NameTooLong {
                len: name.len(),
                max: NAME_SLOT,
            });
        }
        let binary_name = match kind {
            EndpointKind::Id => {
                let mut slot = [0u8; NAME_SLOT];
                slot[..name.len()].copy_from_slice(name);
                slot
            }
            _ => {
                let end = name.iter().rposition(|b| *b != 0).map_or(0, |idx| idx + 1);
                let text =
                    std::str::from_utf8(&name[..end]).map_err(|_| EndpointError::NonUtf8Name)?;
                text_slot(text)?
            }
        };
        Endpoint::build(kind, binary_name, instance.resolve()?)
    }

    fn build(kind: EndpointKind, binary_name: [u8; NAME_SLOT], instance: u16) -> Result<Endpoint> {
        let name = display_name(kind, &binary_name);
        let main = if instance == 0 {
            None
        } else {
            Some(Endpoint::build(kind, binary_name, 0)?)
        };
        let canonical = match instance {
            0 => format!("{}{name}", kind.prefix()),
            n => format!("{}{name}/{n:04x}", kind.prefix()),
        };
        let inner = ENDPOINTS.intern(&canonical, || {
            Ok::<_, EndpointError>(EndpointInner {
                kind,
                binary_name,
                name,
                instance,
                canonical: canonical.clone(),
                main,
                liveness: LivenessCell::default(),
            })
        })?;
        Ok(Endpoint(inner))
    }

    /// `@@local`, the all-zero id.
    pub fn local() -> Endpoint {
        LOCAL.clone()
    }

    /// `@@any`, the broadcast id that every filter check accepts.
    pub fn broadcast() -> Endpoint {
        BROADCAST.clone()
    }

    pub fn kind(&self) -> EndpointKind {
        self.0.kind
    }

    /// Name without prefix or instance.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn binary_name(&self) -> &[u8; NAME_SLOT] {
        &self.0.binary_name
    }

    pub fn instance(&self) -> u16 {
        self.0.instance
    }

    pub fn binary_instance(&self) -> [u8; INSTANCE_SLOT] {
        self.0.instance.to_be_bytes()
    }

    pub fn has_default_instance(&self) -> bool {
        self.0.instance == 0
    }

    /// The same identity without an instance.
    pub fn main(&self) -> Endpoint {
        match &self.0.main {
            Some(main) => main.clone(),
            None => self.clone(),
        }
    }

    /// The same identity with another instance.
    pub fn with_instance(&self, instance: InstanceRef<'_>) -> Result<Endpoint> {
        Endpoint::build(self.0.kind, self.0.binary_name, instance.resolve()?)
    }

    pub fn equals(&self, other: &Endpoint) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_local(&self) -> bool {
        self.equals(&LOCAL)
    }

    pub fn is_broadcast(&self) -> bool {
        self.equals(&BROADCAST)
    }

    pub fn to_string_with(&self, with_instance: bool) -> String {
        if with_instance {
            self.0.canonical.clone()
        } else {
            format!("{}{}", self.0.kind.prefix(), self.0.name)
        }
    }

    pub(crate) fn liveness(&self) -> &LivenessCell {
        &self.0.liveness
    }

    /// Write the endpoint record (without opcode).
    ///
    /// Id names are written as the full slot; other kinds write their UTF-8 name.
    pub fn encode_record(&self, buf: &mut Vec<u8>) {
        let name: &[u8] = match self.0.kind {
            EndpointKind::Id => &self.0.binary_name,
            _ => self.0.name.as_bytes(),
        };
        let instance = (!self.has_default_instance()).then(|| format!("{:04x}", self.0.instance));
        push_u8(buf, name.len() as u8);
        push_u8(buf, 0);
        push_u8(buf, instance.as_ref().map_or(255, |text| text.len() as u8));
        buf.extend_from_slice(name);
        if let Some(text) = instance {
            buf.extend_from_slice(text.as_bytes());
        }
    }

    /// Read an endpoint record following `op`.
    ///
    /// All record bytes are consumed before the identity is validated, so a
    /// value error leaves the cursor at the next instruction.
    pub fn decode_record(cur: &mut Cursor<'_>, op: Opcode) -> std::result::Result<Target, RecordError> {
        let kind = EndpointKind::from_opcode(op).unwrap_or(EndpointKind::Id);
        let name_len = cur.u8()? as usize;
        let subspace_count = cur.u8()?;
        let instance_len = cur.u8()?;
        let name = cur.bytes(name_len)?;
        let mut subspaces = Vec::with_capacity(subspace_count as usize);
        for _ in 0..subspace_count {
            match cur.u8()? {
                0 => subspaces.push("*"),
                len => subspaces.push(cur.text(len as usize)?),
            }
        }
        let instance = match instance_len {
            0 => InstanceRef::Any,
            255 => InstanceRef::Default,
            len => InstanceRef::Text(cur.text(len as usize)?),
        };
        if !subspaces.is_empty() {
            trace!(?subspaces, "ignoring endpoint subspaces");
        }
        let endpoint = Endpoint::from_binary(kind, name, instance)?;
        if op.is_wildcard_endpoint() {
            Ok(Target::Wildcard(WildcardTarget::get(&endpoint)))
        } else {
            Ok(Target::Endpoint(endpoint))
        }
    }
}

/// True while some handle keeps the identity with this canonical form alive.
pub fn is_interned(canonical: &str) -> bool {
    ENDPOINTS.contains(canonical)
}

fn text_slot(name: &str) -> Result<[u8; NAME_SLOT]> {
    if name.is_empty() {
        return Err(EndpointError::EmptyName);
    }
    if name.contains('.') {
        return Err(EndpointError::DotInName(name.to_string()));
    }
    if name.contains(['/', '\0']) {
        return Err(EndpointError::ReservedCharacter(name.to_string()));
    }
    if name.len() > NAME_SLOT {
        return Err(EndpointError::NameTooLong {
            len: name.len(),
            max: NAME_SLOT,
        });
    }
    let mut slot = [0u8; NAME_SLOT];
    slot[..name.len()].copy_from_slice(name.as_bytes());
    Ok(slot)
}

fn parse_id(name: &str) -> Result<[u8; NAME_SLOT]> {
    match name {
        "local" => return Ok([0x00; NAME_SLOT]),
        "any" => return Ok([0xff; NAME_SLOT]),
        _ => {}
    }
    if name.contains('.') {
        return Err(EndpointError::DotInName(name.to_string()));
    }
    let bytes = hex::decode(name)
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| EndpointError::MalformedId(name.to_string()))?;
    if bytes.len() > NAME_SLOT {
        return Err(EndpointError::NameTooLong {
            len: bytes.len(),
            max: NAME_SLOT,
        });
    }
    let mut slot = [0u8; NAME_SLOT];
    slot[..bytes.len()].copy_from_slice(&bytes);
    Ok(slot)
}

fn display_name(kind: EndpointKind, slot: &[u8; NAME_SLOT]) -> String {
    let end = slot.iter().rposition(|b| *b != 0).map_or(0, |idx| idx + 1);
    match kind {
        EndpointKind::Id if end == 0 => "local".to_string(),
        EndpointKind::Id if slot.iter().all(|b| *b == 0xff) => "any".to_string(),
        EndpointKind::Id => hex::encode_upper(&slot[..end]),
        // text slots were validated as UTF-8 on the way in
        _ => String::from_utf8_lossy(&slot[..end]).into_owned(),
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.canonical)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint({})", self.0.canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_kind() -> Result<()> {
        assert_eq!(Endpoint::get("@ep_alice")?.kind(), EndpointKind::Person);
        assert_eq!(Endpoint::get("@+ep_unyt")?.kind(), EndpointKind::Institution);
        assert_eq!(Endpoint::get("*ep_bot")?.kind(), EndpointKind::Bot);
        let id = Endpoint::get("@@abcd01")?;
        assert_eq!(id.kind(), EndpointKind::Id);
        assert_eq!(id.to_string(), "@@ABCD01");
        assert_eq!(&id.binary_name()[..4], &[0xab, 0xcd, 0x01, 0x00]);
        Ok(())
    }

    #[test]
    fn interning_returns_the_same_instance() -> Result<()> {
        let a = Endpoint::get("@ep_intern")?;
        let b = Endpoint::get("@ep_intern")?;
        assert!(a.equals(&b));
        assert!(Arc::ptr_eq(&a.0, &b.0));
        let c = Endpoint::from_name(EndpointKind::Person, "ep_intern", InstanceRef::Default)?;
        assert_eq!(a, c);
        Ok(())
    }

    #[test]
    fn dropping_all_handles_removes_the_entry() -> Result<()> {
        let a = Endpoint::get("@ep_dropped")?;
        assert!(is_interned("@ep_dropped"));
        drop(a);
        assert!(!is_interned("@ep_dropped"));
        let again = Endpoint::get("@ep_dropped")?;
        assert_eq!(again.name(), "ep_dropped");
        Ok(())
    }

    #[test]
    fn instance_endpoints_keep_their_main_alive() -> Result<()> {
        let e = Endpoint::get("@ep_main/00A1")?;
        assert_eq!(e.to_string(), "@ep_main/00a1");
        assert_eq!(e.instance(), 0x00a1);
        assert_eq!(e.binary_instance(), [0x00, 0xa1]);
        assert!(is_interned("@ep_main"));
        assert_eq!(e.main().to_string(), "@ep_main");
        assert_eq!(e.main(), Endpoint::get("@ep_main")?);
        assert_eq!(e.to_string_with(false), "@ep_main");
        assert_eq!(Endpoint::get("@ep_main/a1")?, e);
        Ok(())
    }

    #[test]
    fn main_of_main_is_itself() -> Result<()> {
        let m = Endpoint::get("@+ep_inst")?;
        assert!(m.has_default_instance());
        assert!(m.main().equals(&m));
        Ok(())
    }

    #[test]
    fn local_and_broadcast_singletons() -> Result<()> {
        let local = Endpoint::get("@@local")?;
        assert_eq!(local, Endpoint::local());
        assert_eq!(local.to_string(), "@@local");
        assert!(local.is_local());
        assert_eq!(Endpoint::get("@@any")?, Endpoint::broadcast());
        assert_eq!(Endpoint::broadcast().binary_name(), &[0xff; NAME_SLOT]);
        Ok(())
    }

    #[test]
    fn value_errors_are_raised_at_construction() {
        assert_eq!(
            Endpoint::get("@a.b").unwrap_err(),
            EndpointError::DotInName("a.b".into())
        );
        assert_eq!(
            Endpoint::get("@abcdefghijklmnopqrs").unwrap_err(),
            EndpointError::NameTooLong { len: 19, max: 18 }
        );
        assert_eq!(
            Endpoint::get("@x/12345").unwrap_err(),
            EndpointError::InstanceTooLong { len: 3, max: 2 }
        );
        assert_eq!(
            Endpoint::get("@x/desk").unwrap_err(),
            EndpointError::MalformedInstance("desk".into())
        );
        assert_eq!(Endpoint::get("@").unwrap_err(), EndpointError::EmptyName);
        assert_eq!(
            Endpoint::get("alice").unwrap_err(),
            EndpointError::UnknownPrefix("alice".into())
        );
        assert!(matches!(
            Endpoint::get("@@zz").unwrap_err(),
            EndpointError::MalformedId(_)
        ));
        assert!(
            Endpoint::from_binary(EndpointKind::Id, &[1; 19], InstanceRef::Default).is_err()
        );
        assert!(
            Endpoint::from_binary(EndpointKind::Person, b"x", InstanceRef::Binary(&[1, 2, 3]))
                .is_err()
        );
    }

    #[test]
    fn instance_forms_agree() -> Result<()> {
        let text = Endpoint::from_name(EndpointKind::Person, "ep_forms", InstanceRef::Text("0102"))?;
        let binary =
            Endpoint::from_name(EndpointKind::Person, "ep_forms", InstanceRef::Binary(&[1, 2]))?;
        let numeric =
            Endpoint::from_name(EndpointKind::Person, "ep_forms", InstanceRef::Numeric(0x0102))?;
        assert_eq!(text, binary);
        assert_eq!(binary, numeric);
        let any = Endpoint::from_name(EndpointKind::Person, "ep_forms", InstanceRef::Any)?;
        assert_eq!(any, text.main());
        Ok(())
    }

    #[test]
    fn binary_names_strip_padding() -> Result<()> {
        let mut slot = [0u8; NAME_SLOT];
        slot[..6].copy_from_slice(b"ep_pad");
        let e = Endpoint::from_binary(EndpointKind::Person, &slot, InstanceRef::Default)?;
        assert_eq!(e.to_string(), "@ep_pad");
        assert_eq!(e, Endpoint::get("@ep_pad")?);
        Ok(())
    }

    #[test]
    fn record_roundtrip() -> std::result::Result<(), RecordError> {
        for text in ["@ep_rec", "@+ep_rec/0003", "@@0102", "@@local"] {
            let e = Endpoint::get(text)?;
            let mut buf = Vec::new();
            e.encode_record(&mut buf);
            let mut cur = Cursor::new(&buf);
            let decoded = Endpoint::decode_record(&mut cur, e.kind().opcode(false))?;
            assert_eq!(decoded, Target::Endpoint(e));
            assert!(!cur.has_remaining());
        }
        Ok(())
    }

    #[test]
    fn record_with_subspaces_and_wildcard_instance() -> std::result::Result<(), RecordError> {
        let mut buf = vec![7, 2, 0];
        buf.extend_from_slice(b"ep_subs");
        buf.extend_from_slice(&[3, b'a', b'b', b'c', 0]);
        let mut cur = Cursor::new(&buf);
        let target = Endpoint::decode_record(&mut cur, Opcode::PersonAliasWildcard)?;
        let Target::Wildcard(w) = target else {
            panic!("expected a wildcard target");
        };
        assert_eq!(w.endpoint().to_string(), "@ep_subs");
        assert_eq!(cur.offset(), buf.len());
        Ok(())
    }

    #[test]
    fn record_value_error_consumes_the_record() {
        let mut buf = vec![3, 0, 255];
        buf.extend_from_slice(b"a.b");
        buf.push(0xc6);
        let mut cur = Cursor::new(&buf);
        let err = Endpoint::decode_record(&mut cur, Opcode::PersonAlias).unwrap_err();
        assert!(matches!(err, RecordError::Value(EndpointError::DotInName(_))));
        assert_eq!(cur.offset(), 6);
    }

    #[test]
    fn truncated_record_is_structural() {
        let buf = [10, 0, 255, b'a'];
        let err = Endpoint::decode_record(&mut Cursor::new(&buf), Opcode::PersonAlias).unwrap_err();
        assert!(matches!(err, RecordError::Decode(_)));
    }

    #[test]
    fn concurrent_gets_share_one_instance() {
        use std::sync::Barrier;
        use std::thread;

        const THREADS: usize = 8;
        for _ in 0..200 {
            let barrier = Barrier::new(THREADS);
            let handles: Vec<Endpoint> = thread::scope(|scope| {
                let workers: Vec<_> = (0..THREADS)
                    .map(|_| {
                        scope.spawn(|| {
                            barrier.wait();
                            // churn: drop a handle and take a new one mid-race
                            drop(Endpoint::get("@race_shared/0007").unwrap());
                            Endpoint::get("@race_shared/0007").unwrap()
                        })
                    })
                    .collect();
                workers.into_iter().map(|w| w.join().unwrap()).collect()
            });
            assert!(handles.iter().all(|e| Arc::ptr_eq(&e.0, &handles[0].0)));
            assert!(is_interned("@race_shared/0007"));
            drop(handles);
        }
        assert!(!is_interned("@race_shared/0007"));
    }
}

