//! The closed DXB opcode table.
//!
//! Byte values are part of the wire format and must never be reassigned.

macro_rules! opcodes {
    ($($(#[$meta:meta])* $name:ident = $value:literal,)*) => {
        /// One-byte DXB instruction tag.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($(#[$meta])* $name = $value,)*
        }

        impl Opcode {
            /// Look up the opcode for a raw byte, `None` for unassigned values.
            pub fn from_byte(byte: u8) -> Option<Opcode> {
                match byte {
                    $($value => Some(Opcode::$name),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    // flow
    Exit = 0x00,
    CloseAndStore = 0x01,
    SubscopeStart = 0x02,
    SubscopeEnd = 0x03,
    CachePoint = 0x04,
    CacheReset = 0x05,

    // standard types
    StdTypeText = 0x10,
    StdTypeInt = 0x11,
    StdTypeFloat = 0x12,
    StdTypeBoolean = 0x13,
    StdTypeNull = 0x14,
    StdTypeVoid = 0x15,
    StdTypeBuffer = 0x16,
    StdTypeCodeBlock = 0x17,
    StdTypeUnit = 0x18,
    StdTypeTime = 0x19,
    StdTypeUrl = 0x1a,
    StdTypeArray = 0x1b,
    StdTypeObject = 0x1c,
    StdTypeSet = 0x1d,
    StdTypeMap = 0x1e,
    StdTypeTuple = 0x1f,
    StdTypeFunction = 0x20,
    StdTypeStream = 0x21,
    StdTypeAny = 0x22,
    StdTypeAssertion = 0x23,
    StdTypeTask = 0x24,
    StdTypeIterator = 0x25,

    // internal variable shorthands
    VarResult = 0x30,
    SetVarResult = 0x31,
    SetVarResultReference = 0x32,
    VarResultAction = 0x33,
    VarSubResult = 0x34,
    SetVarSubResult = 0x35,
    SetVarSubResultReference = 0x36,
    VarSubResultAction = 0x37,
    VarVoid = 0x38,
    SetVarVoid = 0x39,
    SetVarVoidReference = 0x3a,
    VarVoidAction = 0x3b,
    VarOriginInternal = 0x3c,
    SetVarOriginInternal = 0x3d,
    SetVarOriginInternalReference = 0x3e,
    VarOriginInternalAction = 0x3f,
    VarIt = 0x40,
    SetVarIt = 0x41,
    SetVarItReference = 0x42,
    VarItAction = 0x43,
    VarRemote = 0x44,
    VarRemoteAction = 0x45,
    VarOrigin = 0x46,
    VarEndpoint = 0x47,
    VarEntrypoint = 0x48,
    VarStd = 0x49,
    VarMeta = 0x4b,
    VarPublic = 0x4c,
    VarThis = 0x4d,
    VarLocation = 0x4e,
    VarEnv = 0x4f,

    // keywords
    Return = 0x50,
    Template = 0x51,
    Extends = 0x52,
    Implements = 0x53,
    Matches = 0x54,
    Debugger = 0x55,
    Jmp = 0x56,
    Jtr = 0x57,
    Jfa = 0x58,
    Count = 0x59,
    About = 0x5a,
    New = 0x5b,
    DeletePointer = 0x5c,
    Copy = 0x5f,
    Clone = 0x60,
    Origin = 0x61,
    Subscribers = 0x62,
    PlainScope = 0x63,
    Transform = 0x65,
    Observe = 0x66,
    Run = 0x67,
    Await = 0x68,
    Defer = 0x69,
    Function = 0x6a,
    Assert = 0x6b,
    Iterator = 0x6c,
    Next = 0x6d,
    Freeze = 0x6e,
    Seal = 0x6f,
    Has = 0x70,
    Keys = 0x71,
    GetType = 0x72,
    Get = 0x73,
    Range = 0x74,
    ResolveRelativePath = 0x75,
    Do = 0x76,
    Default = 0x77,
    Collapse = 0x78,
    Response = 0x79,
    CloneCollapse = 0x88,

    // comparators
    EqualValue = 0x80,
    NotEqualValue = 0x81,
    Equal = 0x82,
    NotEqual = 0x83,
    Greater = 0x84,
    Less = 0x85,
    GreaterEqual = 0x86,
    LessEqual = 0x87,

    // operators
    And = 0x90,
    Or = 0x91,
    Add = 0x92,
    Subtract = 0x93,
    Multiply = 0x94,
    Divide = 0x95,
    Not = 0x96,
    Modulo = 0x97,
    Power = 0x98,
    Increment = 0x99,
    Decrement = 0x9a,

    // variables and pointers
    InternalVar = 0xa4,
    SetInternalVar = 0xa5,
    InitInternalVar = 0xa6,
    InternalVarAction = 0xa7,
    SetInternalVarReference = 0xa8,
    Label = 0xa9,
    SetLabel = 0xaa,
    InitLabel = 0xab,
    LabelAction = 0xac,
    Pointer = 0xad,
    SetPointer = 0xae,
    InitPointer = 0xaf,
    PointerAction = 0xb0,
    CreatePointer = 0xb1,
    ChildGet = 0xb2,
    ChildSet = 0xb3,
    ChildSetReference = 0xb4,
    ChildAction = 0xb5,
    ChildGetRef = 0xb6,
    Wildcard = 0xb7,

    // values
    Text = 0xc0,
    Int8 = 0xc1,
    Int16 = 0xc2,
    Int32 = 0xc3,
    Int64 = 0xc4,
    Float64 = 0xc5,
    True = 0xc6,
    False = 0xc7,
    Null = 0xc8,
    Void = 0xc9,
    Buffer = 0xca,
    ScopeBlock = 0xcb,
    Quantity = 0xcc,
    FloatAsInt32 = 0xcd,
    ShortText = 0xce,
    PersonAlias = 0xcf,
    PersonAliasWildcard = 0xd0,
    InstitutionAlias = 0xd1,
    InstitutionAliasWildcard = 0xd2,
    Bot = 0xd3,
    BotWildcard = 0xd4,
    Endpoint = 0xd5,
    EndpointWildcard = 0xd6,
    Url = 0xd8,
    Type = 0xd9,
    ExtendedType = 0xda,
    Conjunction = 0xdb,
    Disjunction = 0xdc,
    Time = 0xdd,
    FloatAsInt8 = 0xde,

    // collections
    ArrayStart = 0xe0,
    ArrayEnd = 0xe1,
    ObjectStart = 0xe2,
    ObjectEnd = 0xe3,
    TupleStart = 0xe4,
    TupleEnd = 0xe5,
    ElementWithKey = 0xe6,
    ElementWithIntKey = 0xe7,
    ElementWithDynamicKey = 0xe8,
    KeyPermission = 0xe9,
    Element = 0xea,
    InternalObjectSlot = 0xef,

    // special
    Sync = 0xf0,
    StopSync = 0xf1,
    Stream = 0xf2,
    StopStream = 0xf3,
    Extend = 0xf4,
    Yeet = 0xf5,
    Remote = 0xf6,
    SyncSilent = 0xf7,
}

impl Opcode {
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Whether this opcode encodes an endpoint record operand.
    pub fn is_endpoint(self) -> bool {
        matches!(
            self,
            Opcode::PersonAlias
                | Opcode::PersonAliasWildcard
                | Opcode::InstitutionAlias
                | Opcode::InstitutionAliasWildcard
                | Opcode::Bot
                | Opcode::BotWildcard
                | Opcode::Endpoint
                | Opcode::EndpointWildcard
        )
    }

    /// Whether an endpoint opcode denotes the wildcard form.
    pub fn is_wildcard_endpoint(self) -> bool {
        matches!(
            self,
            Opcode::PersonAliasWildcard
                | Opcode::InstitutionAliasWildcard
                | Opcode::BotWildcard
                | Opcode::EndpointWildcard
        )
    }

    /// Spelling of an operator byte inside an assignment action (`x += y`).
    pub fn action_symbol(byte: u8) -> &'static str {
        match Opcode::from_byte(byte) {
            Some(Opcode::Add) => "+",
            Some(Opcode::Subtract) => "-",
            Some(Opcode::Multiply) => "*",
            Some(Opcode::Power) => "^",
            Some(Opcode::Modulo) => "%",
            Some(Opcode::Divide) => "/",
            Some(Opcode::And) => "&",
            Some(Opcode::Or) => "|",
            Some(Opcode::CreatePointer) => ":",
            _ => "?",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::from_byte(byte).ok_or(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_assigned_byte_round_trips() {
        let mut assigned = 0;
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_byte(byte) {
                assert_eq!(op.byte(), byte);
                assigned += 1;
            }
        }
        assert_eq!(assigned, 188);
    }

    #[test]
    fn stable_values() {
        assert_eq!(Opcode::Int8 as u8, 0xc1);
        assert_eq!(Opcode::Disjunction as u8, 0xdc);
        assert_eq!(Opcode::ScopeBlock as u8, 0xcb);
        assert_eq!(Opcode::Quantity as u8, 0xcc);
        assert_eq!(Opcode::CloneCollapse as u8, 0x88);
        assert_eq!(Opcode::try_from(0x4a), Err(0x4a));
        assert_eq!(Opcode::try_from(0xd7), Err(0xd7));
    }

    #[test]
    fn action_symbols() {
        assert_eq!(Opcode::action_symbol(Opcode::Add as u8), "+");
        assert_eq!(Opcode::action_symbol(Opcode::CreatePointer as u8), ":");
        assert_eq!(Opcode::action_symbol(0x00), "?");
    }
}
