//! Single-pass opcode scanner building a [`TokenTree`].

use tracing::{debug, trace, warn};

use super::literal;
use super::token::{Deferred, PartialTokenTree, ROOT, ScopeId, ScopeKind, Token, TokenTree};
use super::DecompileOptions;
use crate::cursor::{Cursor, Result};
use crate::endpoint::Endpoint;
use crate::error::{DecodeError, QuantityError, RecordError};
use crate::opcode::Opcode;
use crate::quantity::Quantity;

/// Combined limit on open scopes and nested programs.
pub(crate) const MAX_DEPTH: usize = 64;

pub(crate) struct Decoder<'a> {
    cur: Cursor<'a>,
    options: &'a DecompileOptions,
    tree: TokenTree,
    current: ScopeId,
    parents: Vec<ScopeId>,
    /// Depth of the enclosing program when this one is nested.
    base_depth: usize,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(body: &'a [u8], options: &'a DecompileOptions) -> Self {
        Decoder::nested(body, options, 0)
    }

    pub(crate) fn nested(body: &'a [u8], options: &'a DecompileOptions, base_depth: usize) -> Self {
        Decoder {
            cur: Cursor::new(body),
            options,
            tree: TokenTree::new(),
            current: ROOT,
            parents: Vec::new(),
            base_depth,
        }
    }

    fn depth(&self) -> usize {
        self.base_depth + self.parents.len()
    }

    fn check_depth(&self, offset: usize) -> Result<()> {
        if self.depth() >= MAX_DEPTH {
            return Err(DecodeError::TooDeep {
                offset,
                limit: MAX_DEPTH,
            });
        }
        Ok(())
    }

    pub(crate) fn run(mut self) -> std::result::Result<TokenTree, PartialTokenTree> {
        while self.cur.has_remaining() {
            if let Err(error) = self.step() {
                warn!(%error, offset = error.offset(), "decoding stopped early");
                return Err(PartialTokenTree {
                    tree: self.tree,
                    error,
                });
            }
        }
        if !self.parents.is_empty() {
            debug!(open = self.parents.len(), "program ended with open scopes");
        }
        Ok(self.tree)
    }

    fn step(&mut self) -> Result<()> {
        let offset = self.cur.offset();
        let byte = self.cur.u8()?;
        let Some(op) = Opcode::from_byte(byte) else {
            warn!(byte, offset, "unknown opcode");
            self.operator(format!("/*{byte:x}*/"));
            return Ok(());
        };
        trace!(?op, offset, "dispatch");

        if let Some(text) = keyword(op) {
            self.operator(text);
            return Ok(());
        }
        if let Some(text) = shorthand(op) {
            self.value(text);
            return Ok(());
        }
        if let Some(text) = literal::std_type(op) {
            self.value(text);
            return Ok(());
        }
        if op.is_endpoint() {
            return self.endpoint(op);
        }
        if let Some(kind) = ScopeKind::for_opcode(op) {
            self.check_depth(offset)?;
            return self.open(kind);
        }

        match op {
            Opcode::SubscopeEnd | Opcode::ArrayEnd | Opcode::ObjectEnd | Opcode::TupleEnd => {
                self.close(offset)?;
            }
            Opcode::CachePoint | Opcode::CacheReset => {}

            Opcode::Text => {
                let text = literal::text(self.cur.long_text()?, self.options.formatted_strings);
                self.value(text);
            }
            Opcode::ShortText => {
                let text = literal::text(self.cur.short_text()?, self.options.formatted_strings);
                self.value(text);
            }
            Opcode::Url => {
                let url = self.cur.long_text()?.to_string();
                self.value(url);
            }
            Opcode::ResolveRelativePath => {
                let path = self.cur.long_text()?.to_string();
                self.untracked(path);
            }
            Opcode::Buffer => {
                let text = literal::buffer(self.cur.long_bytes()?);
                self.value(text);
            }
            Opcode::Int8 => {
                let n = self.cur.i8()?;
                self.value(n.to_string());
            }
            Opcode::Int16 => {
                let n = self.cur.i16()?;
                self.value(n.to_string());
            }
            Opcode::Int32 => {
                let n = self.cur.i32()?;
                self.value(n.to_string());
            }
            Opcode::Int64 => {
                let n = self.cur.i64()?;
                self.value(n.to_string());
            }
            Opcode::Float64 => {
                let f = self.cur.f64()?;
                self.value(literal::float(f));
            }
            Opcode::FloatAsInt32 => {
                let f = self.cur.i32()?;
                self.value(literal::float(f64::from(f)));
            }
            Opcode::FloatAsInt8 => {
                let f = self.cur.i8()?;
                self.value(literal::float(f64::from(f)));
            }
            Opcode::True => self.value("true"),
            Opcode::False => self.value("false"),
            Opcode::Null => self.value("null"),
            Opcode::Void => self.value("void"),
            Opcode::Wildcard => self.untracked("*"),
            Opcode::Time => {
                let millis = self.cur.u64()?;
                match literal::time(millis) {
                    Some(text) => self.value(text),
                    None => self.value_error(offset, format!("time {millis} out of range")),
                }
            }
            Opcode::Quantity => match Quantity::decode(&mut self.cur) {
                Ok(quantity) => self.value(quantity.to_string()),
                Err(QuantityError::Decode(err)) => return Err(err),
                Err(err) => self.value_error(offset, err.to_string()),
            },
            Opcode::Type => {
                let (text, _) = literal::read_type(&mut self.cur, false)?;
                self.value(text);
            }
            Opcode::ExtendedType => {
                let (text, has_parameters) = literal::read_type(&mut self.cur, true)?;
                let defer = has_parameters.then_some(Deferred::CloseType);
                self.push(Token::Value { text, defer });
                self.tick();
            }
            Opcode::ScopeBlock => {
                self.check_depth(offset)?;
                let len = self.cur.u32()? as usize;
                if len > self.cur.remaining() {
                    return Err(DecodeError::NestedOutOfBounds {
                        offset: self.cur.offset(),
                        len,
                    });
                }
                let body = self.cur.bytes(len)?;
                debug!(offset, len, "entering nested program");
                let nested = super::decompile_nested(body, self.options, self.depth() + 1);
                self.value(format!("({nested})"));
            }

            Opcode::Pointer => {
                let text = literal::read_pointer(&mut self.cur)?;
                self.value(text);
            }
            Opcode::SetPointer => {
                let text = literal::read_pointer(&mut self.cur)?;
                self.operator(format!("{text}="));
            }
            Opcode::InitPointer => {
                let text = literal::read_pointer(&mut self.cur)?;
                let jump = self.cur.u32()?;
                self.operator(format!("{text} :={}", self.jump_note(jump)));
            }
            Opcode::PointerAction => {
                let symbol = self.action()?;
                let text = literal::read_pointer(&mut self.cur)?;
                self.operator(format!("{text} {symbol}= "));
            }

            Opcode::Label => {
                let name = literal::read_variable(&mut self.cur, '$')?;
                self.value(name);
            }
            Opcode::InternalVar => {
                let name = literal::read_variable(&mut self.cur, '#')?;
                self.value(name);
            }
            Opcode::SetLabel => {
                let name = literal::read_variable(&mut self.cur, '$')?;
                self.operator(format!("{name} = "));
            }
            Opcode::SetInternalVar => {
                let name = literal::read_variable(&mut self.cur, '#')?;
                self.operator(format!("{name} = "));
            }
            Opcode::SetInternalVarReference => {
                let name = literal::read_variable(&mut self.cur, '#')?;
                self.operator(format!("{name} $= "));
            }
            Opcode::InitLabel | Opcode::InitInternalVar => {
                let sigil = if op == Opcode::InitLabel { '$' } else { '#' };
                let name = literal::read_variable(&mut self.cur, sigil)?;
                let jump = self.cur.u32()?;
                self.operator(format!("{name} :={}", self.jump_note(jump)));
            }
            Opcode::LabelAction | Opcode::InternalVarAction => {
                let sigil = if op == Opcode::LabelAction { '$' } else { '#' };
                let symbol = self.action()?;
                let name = literal::read_variable(&mut self.cur, sigil)?;
                self.operator(format!("{name} {symbol}= "));
            }
            Opcode::VarResultAction
            | Opcode::VarSubResultAction
            | Opcode::VarVoidAction
            | Opcode::VarOriginInternalAction
            | Opcode::VarItAction
            | Opcode::VarRemoteAction => {
                let symbol = self.action()?;
                let name = shorthand_name(op);
                self.operator(format!("{name} {symbol}= "));
            }
            Opcode::SetVarResult
            | Opcode::SetVarSubResult
            | Opcode::SetVarVoid
            | Opcode::SetVarOriginInternal
            | Opcode::SetVarIt => {
                self.operator(format!("{} = ", shorthand_name(op)));
            }
            Opcode::SetVarResultReference
            | Opcode::SetVarSubResultReference
            | Opcode::SetVarVoidReference
            | Opcode::SetVarOriginInternalReference
            | Opcode::SetVarItReference => {
                self.operator(format!("{} $= ", shorthand_name(op)));
            }

            Opcode::ChildSet => self.deferring(".", Deferred::Assign),
            Opcode::ChildSetReference => self.deferring(".", Deferred::AssignReference),
            Opcode::ChildAction => {
                let symbol = self.action()?;
                self.deferring(".", Deferred::Action(symbol));
            }
            Opcode::Range => self.deferring("", Deferred::Range),

            Opcode::Jmp => {
                let target = self.cur.u32()?;
                self.operator(format!("jmp {target:x}"));
            }
            Opcode::Jtr => {
                let target = self.cur.u32()?;
                self.operator(format!("jtr {target:x} "));
            }
            Opcode::Jfa => {
                let target = self.cur.u32()?;
                self.operator(format!("jfa {target:x} "));
            }
            Opcode::Default => {
                let jump = self.cur.u32()?;
                self.operator(format!(" default{}", self.jump_note(jump)));
            }

            Opcode::ElementWithKey => {
                let key = self.cur.short_text()?.replace('\'', "\\'");
                self.push(Token::separator(format!("\"{key}\": ")));
            }
            Opcode::ElementWithIntKey => {
                let key = self.cur.u32()?;
                self.push(Token::separator(format!("{key}: ")));
            }
            Opcode::ElementWithDynamicKey => self.push(Token::separator(": ")),
            Opcode::InternalObjectSlot => {
                let slot = self.cur.u16()?;
                self.push(Token::separator(format!("{}: ", literal::object_slot(slot))));
            }
            Opcode::Element => self.push(Token::separator("")),

            other => {
                // every opcode is covered by one of the tables above
                warn!(?other, offset, "opcode without a rendering");
                self.operator(format!("/*{:x}*/", other.byte()));
            }
        }
        Ok(())
    }

    fn push(&mut self, token: Token) {
        self.tree.push(self.current, token);
    }

    /// Append a value and count it towards an enclosing connective.
    fn value(&mut self, text: impl Into<String>) {
        self.push(Token::value(text));
        self.tick();
    }

    /// A value for rendering that does not count towards connective arity.
    fn untracked(&mut self, text: impl Into<String>) {
        self.push(Token::value(text));
    }

    fn operator(&mut self, text: impl Into<String>) {
        self.push(Token::operator(text));
    }

    fn deferring(&mut self, text: &str, defer: Deferred) {
        self.push(Token::Operator {
            text: text.to_string(),
            defer: Some(defer),
        });
    }

    fn value_error(&mut self, offset: usize, message: String) {
        warn!(offset, %message, "invalid value operand");
        self.value(format!("/* ERROR: {message} */"));
    }

    fn action(&mut self) -> Result<&'static str> {
        Ok(Opcode::action_symbol(self.cur.u8()?))
    }

    fn jump_note(&self, jump: u32) -> String {
        if self.options.comments {
            format!(" /*jmp:{jump}*/")
        } else {
            String::new()
        }
    }

    fn endpoint(&mut self, op: Opcode) -> Result<()> {
        let offset = self.cur.offset();
        match Endpoint::decode_record(&mut self.cur, op) {
            Ok(target) => self.value(target.to_string()),
            Err(RecordError::Decode(err)) => return Err(err),
            Err(RecordError::Value(err)) => self.value_error(offset, err.to_string()),
        }
        Ok(())
    }

    fn open(&mut self, kind: ScopeKind) -> Result<()> {
        let remaining = match kind {
            ScopeKind::Disjunction | ScopeKind::Conjunction => Some(self.cur.u32()?),
            _ => None,
        };
        let id = self.tree.open(self.current, kind, remaining);
        self.parents.push(self.current);
        self.current = id;
        if remaining == Some(0) {
            self.leave();
            self.tick();
        }
        Ok(())
    }

    fn close(&mut self, offset: usize) -> Result<()> {
        if !self.leave() {
            return Err(DecodeError::NoParentScope { offset });
        }
        self.tick();
        Ok(())
    }

    fn leave(&mut self) -> bool {
        match self.parents.pop() {
            Some(parent) => {
                self.current = parent;
                true
            }
            None => false,
        }
    }

    /// Count one member towards the current connective, closing every
    /// connective that becomes complete.
    fn tick(&mut self) {
        loop {
            let scope = self.tree.scope_mut(self.current);
            match scope.remaining {
                Some(n) if n > 1 => {
                    scope.remaining = Some(n - 1);
                    return;
                }
                Some(_) => {
                    scope.remaining = Some(0);
                    if !self.leave() {
                        return;
                    }
                }
                None => return,
            }
        }
    }
}

fn keyword(op: Opcode) -> Option<&'static str> {
    let text = match op {
        Opcode::Exit => "exit",
        Opcode::CloseAndStore => ";\n",
        Opcode::Return => "return",
        Opcode::About => "about ",
        Opcode::Count => "count ",
        Opcode::Freeze => "freeze ",
        Opcode::Seal => "seal ",
        Opcode::Has => " has ",
        Opcode::Keys => "keys ",
        Opcode::Template => "template ",
        Opcode::Extends => " extends ",
        Opcode::Implements => " implements ",
        Opcode::Matches => " matches ",
        Opcode::PlainScope => "scope ",
        Opcode::Transform => "always ",
        Opcode::Run => "run ",
        Opcode::Do => "do ",
        Opcode::Defer => "defer ",
        Opcode::Response => "response ",
        Opcode::Iterator => "iterator ",
        Opcode::Next => "next ",
        Opcode::Assert => "assert ",
        Opcode::Await => "await ",
        Opcode::Function => "function ",
        Opcode::Observe => "observe ",
        Opcode::Debugger => "debugger",
        Opcode::New => "new ",
        Opcode::Get => "get ",
        Opcode::DeletePointer => "delete ",
        Opcode::Copy => "copy ",
        Opcode::Clone => "deepcopy ",
        Opcode::Collapse => "collapse ",
        Opcode::CloneCollapse => "clone_collapse ",
        Opcode::GetType => "type ",
        Opcode::Origin => "origin ",
        Opcode::Subscribers => "subscribers ",
        Opcode::CreatePointer => "$$",
        Opcode::Extend => "...",
        Opcode::Yeet => "yeet ",
        Opcode::Remote => " :: ",
        Opcode::ChildGet => ".",
        Opcode::ChildGetRef => "->",
        Opcode::KeyPermission => "!!",

        Opcode::EqualValue => "==",
        Opcode::Equal => "===",
        Opcode::NotEqualValue => "!=",
        Opcode::NotEqual => "!==",
        Opcode::Greater => ">",
        Opcode::GreaterEqual => ">=",
        Opcode::Less => "<",
        Opcode::LessEqual => "<=",

        Opcode::And => " and ",
        Opcode::Or => " or ",
        Opcode::Not => "not ",
        Opcode::Add => " + ",
        Opcode::Subtract => " - ",
        Opcode::Multiply => " * ",
        Opcode::Divide => " / ",
        Opcode::Modulo => " % ",
        Opcode::Power => " ^ ",
        Opcode::Increment => "++",
        Opcode::Decrement => "--",

        Opcode::Stream => " << ",
        Opcode::StopStream => " </ ",
        Opcode::Sync => " <== ",
        Opcode::StopSync => " </= ",
        Opcode::SyncSilent => " <==: ",
        _ => return None,
    };
    Some(text)
}

/// Reserved internal slots read as plain values.
fn shorthand(op: Opcode) -> Option<&'static str> {
    match op {
        Opcode::VarResult
        | Opcode::VarSubResult
        | Opcode::VarVoid
        | Opcode::VarOriginInternal
        | Opcode::VarIt
        | Opcode::VarRemote
        | Opcode::VarOrigin
        | Opcode::VarEndpoint
        | Opcode::VarEntrypoint
        | Opcode::VarStd
        | Opcode::VarMeta
        | Opcode::VarPublic
        | Opcode::VarThis
        | Opcode::VarLocation
        | Opcode::VarEnv => Some(shorthand_name(op)),
        _ => None,
    }
}

fn shorthand_name(op: Opcode) -> &'static str {
    match op {
        Opcode::VarResult
        | Opcode::SetVarResult
        | Opcode::SetVarResultReference
        | Opcode::VarResultAction => "#result",
        Opcode::VarSubResult
        | Opcode::SetVarSubResult
        | Opcode::SetVarSubResultReference
        | Opcode::VarSubResultAction => "#sub_result",
        Opcode::VarVoid | Opcode::SetVarVoid | Opcode::SetVarVoidReference | Opcode::VarVoidAction => {
            "#void"
        }
        Opcode::VarOriginInternal
        | Opcode::SetVarOriginInternal
        | Opcode::SetVarOriginInternalReference
        | Opcode::VarOriginInternalAction => "#_origin",
        Opcode::VarIt | Opcode::SetVarIt | Opcode::SetVarItReference | Opcode::VarItAction => "#it",
        Opcode::VarRemote | Opcode::VarRemoteAction => "#remote",
        Opcode::VarOrigin => "#origin",
        Opcode::VarEndpoint => "#endpoint",
        Opcode::VarEntrypoint => "#entrypoint",
        Opcode::VarStd => "#std",
        Opcode::VarMeta => "#meta",
        Opcode::VarPublic => "#public",
        Opcode::VarThis => "#this",
        Opcode::VarLocation => "#location",
        Opcode::VarEnv => "#env",
        _ => "#?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{push_i8, push_op, push_u32};
    use crate::decompiler::render;

    fn decode(bytes: &[u8]) -> std::result::Result<TokenTree, PartialTokenTree> {
        Decoder::new(bytes, &DecompileOptions::default()).run()
    }

    #[test]
    fn literal_becomes_single_value() {
        let tree = decode(&[Opcode::Int8 as u8, 0x2a]).unwrap();
        assert_eq!(tree.root().tokens, vec![Token::value("42")]);
    }

    #[test]
    fn subscope_nests_tokens() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::SubscopeStart);
        push_op(&mut buf, Opcode::Int8);
        push_i8(&mut buf, 1);
        push_op(&mut buf, Opcode::Add);
        push_op(&mut buf, Opcode::Int8);
        push_i8(&mut buf, 2);
        push_op(&mut buf, Opcode::SubscopeEnd);
        let tree = decode(&buf).unwrap();
        assert_eq!(tree.root().tokens, vec![Token::Scope { id: 1 }]);
        let inner = tree.scope(1);
        assert_eq!(inner.kind, ScopeKind::Subscope);
        assert_eq!(inner.tokens.len(), 3);
        assert!(!inner.tokens[1].is_value());
    }

    #[test]
    fn connective_closes_after_its_arity() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::Disjunction);
        push_u32(&mut buf, 2);
        push_op(&mut buf, Opcode::True);
        push_op(&mut buf, Opcode::False);
        push_op(&mut buf, Opcode::Null);
        let tree = decode(&buf).unwrap();
        assert_eq!(tree.root().tokens.len(), 2);
        assert_eq!(tree.scope(1).tokens.len(), 2);
        assert_eq!(tree.root().tokens[1], Token::value("null"));
    }

    #[test]
    fn completed_inner_connective_counts_for_outer() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::Conjunction);
        push_u32(&mut buf, 2);
        push_op(&mut buf, Opcode::Disjunction);
        push_u32(&mut buf, 1);
        push_op(&mut buf, Opcode::True);
        push_op(&mut buf, Opcode::False);
        push_op(&mut buf, Opcode::Void);
        let tree = decode(&buf).unwrap();
        assert_eq!(tree.root().tokens.len(), 2);
        assert_eq!(tree.scope(1).tokens.len(), 2);
        assert_eq!(tree.scope(2).tokens, vec![Token::value("true")]);
    }

    #[test]
    fn empty_connective_closes_immediately() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::Conjunction);
        push_u32(&mut buf, 0);
        push_op(&mut buf, Opcode::True);
        let tree = decode(&buf).unwrap();
        assert_eq!(tree.root().tokens.len(), 2);
        assert!(tree.scope(1).tokens.is_empty());
    }

    #[test]
    fn extra_close_stops_with_partial_tree() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::True);
        push_op(&mut buf, Opcode::SubscopeEnd);
        push_op(&mut buf, Opcode::False);
        let partial = decode(&buf).unwrap_err();
        assert_eq!(partial.error, DecodeError::NoParentScope { offset: 1 });
        assert_eq!(partial.tree.root().tokens, vec![Token::value("true")]);
    }

    #[test]
    fn truncated_operand_is_structural() {
        let partial = decode(&[Opcode::Int32 as u8, 0x01]).unwrap_err();
        assert!(matches!(partial.error, DecodeError::UnexpectedEof { .. }));
    }

    #[test]
    fn unknown_opcode_is_a_placeholder() {
        let tree = decode(&[0x4a, Opcode::True as u8]).unwrap();
        assert_eq!(tree.root().tokens[0], Token::operator("/*4a*/"));
        assert_eq!(tree.root().tokens[1], Token::value("true"));
    }

    #[test]
    fn wildcard_does_not_count_for_arity() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::Disjunction);
        push_u32(&mut buf, 1);
        push_op(&mut buf, Opcode::Wildcard);
        push_op(&mut buf, Opcode::True);
        let tree = decode(&buf).unwrap();
        assert_eq!(tree.root().tokens.len(), 1);
        assert_eq!(tree.scope(1).tokens.len(), 2);
    }

    #[test]
    fn deep_nesting_stops_at_the_limit() {
        let buf = vec![Opcode::SubscopeStart as u8; 100_000];
        let partial = decode(&buf).unwrap_err();
        assert_eq!(
            partial.error,
            DecodeError::TooDeep {
                offset: MAX_DEPTH,
                limit: MAX_DEPTH
            }
        );
        assert_eq!(partial.tree.len(), MAX_DEPTH + 1);
        let text = render(&partial.tree, false);
        assert_eq!(text.len(), MAX_DEPTH * 2);
    }
}
