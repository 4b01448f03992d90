//! DATEX binary (DXB) tooling: a decompiler that turns DXB messages back into
//! script text, the quantity codec and interned endpoint identities.

pub mod config;
pub mod cursor;
pub mod decompiler;
pub mod endpoint;
pub mod error;
pub mod header;
pub mod hex;
pub mod opcode;
pub mod quantity;
pub mod unit;
pub mod wire;

pub type Result<T> = anyhow::Result<T>;

pub use config::{Config, LivenessConfig};
pub use cursor::Cursor;
pub use decompiler::{
    DecompileOptions, PartialTokenTree, TokenTree, decode, decompile, decompile_base64,
};
pub use endpoint::{Endpoint, EndpointKind, InstanceRef, Target, WildcardTarget, logical_match};
pub use error::{DecodeError, EndpointError, LivenessError, QuantityError, RecordError};
pub use header::Header;
pub use opcode::Opcode;
pub use quantity::Quantity;
pub use unit::{Unit, UnitFactor};
