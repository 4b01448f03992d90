//! Token tree produced by the decoder.
//!
//! Scopes live in an arena and refer to their children by index, so the
//! decoder can keep appending to a parent while a child is still open.

use serde::Serialize;

use crate::error::DecodeError;
use crate::opcode::Opcode;

pub type ScopeId = usize;

pub const ROOT: ScopeId = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Root,
    Subscope,
    Tuple,
    Array,
    Object,
    Disjunction,
    Conjunction,
}

impl ScopeKind {
    pub fn for_opcode(op: Opcode) -> Option<ScopeKind> {
        match op {
            Opcode::SubscopeStart => Some(ScopeKind::Subscope),
            Opcode::TupleStart => Some(ScopeKind::Tuple),
            Opcode::ArrayStart => Some(ScopeKind::Array),
            Opcode::ObjectStart => Some(ScopeKind::Object),
            Opcode::Disjunction => Some(ScopeKind::Disjunction),
            Opcode::Conjunction => Some(ScopeKind::Conjunction),
            _ => None,
        }
    }

    /// Opening and closing bracket; connectives and the root have none.
    pub fn brackets(self) -> Option<(&'static str, &'static str)> {
        match self {
            ScopeKind::Subscope | ScopeKind::Tuple => Some(("(", ")")),
            ScopeKind::Array => Some(("[", "]")),
            ScopeKind::Object => Some(("{", "}")),
            ScopeKind::Root | ScopeKind::Disjunction | ScopeKind::Conjunction => None,
        }
    }

    /// Infix operator joining the members of a connective.
    pub fn infix(self) -> Option<&'static str> {
        match self {
            ScopeKind::Disjunction => Some("|"),
            ScopeKind::Conjunction => Some("&"),
            _ => None,
        }
    }
}

/// Fragment an operator asks to be written after the token that follows it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Deferred {
    Assign,
    AssignReference,
    Range,
    CloseType,
    Action(&'static str),
}

impl Deferred {
    pub fn fragment(self) -> String {
        match self {
            Deferred::Assign => " = ".to_string(),
            Deferred::AssignReference => " $= ".to_string(),
            Deferred::Range => "..".to_string(),
            Deferred::CloseType => ">".to_string(),
            Deferred::Action(symbol) => format!(" {symbol}= "),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Token {
    /// Rendered literal or reference.
    Value {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        defer: Option<Deferred>,
    },
    /// Keyword, operator or statement fragment.
    Operator {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        defer: Option<Deferred>,
    },
    /// Collection element marker; a comma goes before it.
    Separator { text: String },
    Scope { id: ScopeId },
}

impl Token {
    pub fn value(text: impl Into<String>) -> Token {
        Token::Value {
            text: text.into(),
            defer: None,
        }
    }

    pub fn operator(text: impl Into<String>) -> Token {
        Token::Operator {
            text: text.into(),
            defer: None,
        }
    }

    pub fn separator(text: impl Into<String>) -> Token {
        Token::Separator { text: text.into() }
    }

    /// Whether the token stands for a value when grouping connective members.
    pub fn is_value(&self) -> bool {
        matches!(self, Token::Value { .. } | Token::Scope { .. })
    }

    pub fn is_separator(&self) -> bool {
        matches!(self, Token::Separator { .. })
    }

    pub fn defer(&self) -> Option<Deferred> {
        match self {
            Token::Value { defer, .. } | Token::Operator { defer, .. } => *defer,
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub tokens: Vec<Token>,
    /// Members a connective still expects before it closes itself.
    #[serde(skip)]
    pub(crate) remaining: Option<u32>,
}

/// Arena of scopes; index [`ROOT`] is the program itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenTree {
    scopes: Vec<Scope>,
}

impl Default for TokenTree {
    fn default() -> Self {
        TokenTree {
            scopes: vec![Scope {
                kind: ScopeKind::Root,
                tokens: Vec::new(),
                remaining: None,
            }],
        }
    }
}

impl TokenTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> &Scope {
        &self.scopes[ROOT]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    pub(crate) fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root().tokens.is_empty()
    }

    pub(crate) fn push(&mut self, scope: ScopeId, token: Token) {
        self.scopes[scope].tokens.push(token);
    }

    /// Create a child scope and append its token to `parent`.
    pub(crate) fn open(&mut self, parent: ScopeId, kind: ScopeKind, remaining: Option<u32>) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(Scope {
            kind,
            tokens: Vec::new(),
            remaining,
        });
        self.push(parent, Token::Scope { id });
        id
    }
}

/// What could be decoded before a structural error stopped the decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialTokenTree {
    pub tree: TokenTree,
    pub error: DecodeError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_links_child_into_parent() {
        let mut tree = TokenTree::new();
        let child = tree.open(ROOT, ScopeKind::Array, None);
        tree.push(child, Token::value("1"));
        assert_eq!(tree.root().tokens, vec![Token::Scope { id: child }]);
        assert_eq!(tree.scope(child).tokens.len(), 1);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn serializes_tagged_tokens() -> serde_json::Result<()> {
        let mut tree = TokenTree::new();
        tree.push(ROOT, Token::value("42"));
        let json = serde_json::to_value(&tree)?;
        assert_eq!(json["scopes"][0]["kind"], "root");
        assert_eq!(json["scopes"][0]["tokens"][0]["type"], "value");
        assert_eq!(json["scopes"][0]["tokens"][0]["text"], "42");
        Ok(())
    }

    #[test]
    fn deferred_fragments() {
        assert_eq!(Deferred::Action("+").fragment(), " += ");
        assert_eq!(Deferred::Range.fragment(), "..");
    }
}
