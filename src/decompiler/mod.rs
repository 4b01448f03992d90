//! DXB decompiler: header stripping, decoding into a token tree and
//! serializing the tree back into script text.
//!
//! Structural errors never escape [`decompile`]; they end the output with an
//! inline `/* ERROR: ... */` marker after whatever could be recovered.

mod decode;
pub mod literal;
mod render;
pub mod token;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::header;
use decode::Decoder;
use render::Renderer;

pub use token::{Deferred, PartialTokenTree, ROOT, Scope, ScopeId, ScopeKind, Token, TokenTree};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DecompileOptions {
    /// Emit non-semantic annotations such as `/*jmp:N*/`.
    pub comments: bool,
    /// Indent multi-line subscopes.
    pub formatted: bool,
    /// Keep newlines in strings literal instead of escaping them.
    pub formatted_strings: bool,
    /// Input starts with a message header that must be skipped.
    pub has_header: bool,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        DecompileOptions {
            comments: true,
            formatted: false,
            formatted_strings: false,
            has_header: true,
        }
    }
}

/// Decode a message into its token tree.
///
/// A bad header yields an empty partial tree carrying the header error.
pub fn decode(dxb: &[u8], options: &DecompileOptions) -> Result<TokenTree, PartialTokenTree> {
    let body = if options.has_header {
        match header::strip(dxb) {
            Ok((_, body)) => body,
            Err(error) => {
                return Err(PartialTokenTree {
                    tree: TokenTree::new(),
                    error,
                });
            }
        }
    } else {
        dxb
    };
    Decoder::new(body, options).run()
}

pub fn decompile(dxb: &[u8], options: &DecompileOptions) -> String {
    if !options.has_header {
        return decompile_body(dxb, options);
    }
    match header::strip(dxb) {
        Ok((_, body)) => decompile_body(body, options),
        Err(error) => {
            warn!(%error, "cannot decompile");
            format!("/* ERROR: {error} */")
        }
    }
}

/// Decompile base64 input without annotations.
pub fn decompile_base64(dxb_base64: &str, formatted: bool, has_header: bool) -> String {
    let options = DecompileOptions {
        comments: false,
        formatted,
        formatted_strings: false,
        has_header,
    };
    match STANDARD.decode(dxb_base64.trim()) {
        Ok(bytes) => decompile(&bytes, &options),
        Err(error) => {
            warn!(%error, "invalid base64 input");
            "/* ERROR: Invalid base64 */".to_string()
        }
    }
}

/// Render a decoded tree as script text.
pub fn render(tree: &TokenTree, formatted: bool) -> String {
    Renderer::new(tree, formatted).render(ROOT)
}

/// Render either arm of [`decode`], marking a partial tree with its error.
pub fn render_result(result: &Result<TokenTree, PartialTokenTree>, formatted: bool) -> String {
    let text = match result {
        Ok(tree) => render(tree, formatted),
        Err(partial) => format!("{}/* ERROR: {} */", render(&partial.tree, formatted), partial.error),
    };
    match text.strip_suffix('\n') {
        Some(trimmed) => trimmed.to_string(),
        None => text,
    }
}

/// Decompile a headerless program.
pub(crate) fn decompile_body(body: &[u8], options: &DecompileOptions) -> String {
    decompile_nested(body, options, 0)
}

/// Decompile a scope block found `depth` levels below the top program.
pub(crate) fn decompile_nested(body: &[u8], options: &DecompileOptions, depth: usize) -> String {
    let result = Decoder::nested(body, options, depth).run();
    render_result(&result, options.formatted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use crate::header::Header;
    use crate::opcode::Opcode;
    use crate::quantity::Quantity;
    use crate::unit::{Unit, UnitFactor};
    use crate::wire::*;
    use num_bigint::BigUint;

    fn bare() -> DecompileOptions {
        DecompileOptions {
            has_header: false,
            ..DecompileOptions::default()
        }
    }

    fn int8(buf: &mut Vec<u8>, n: i8) {
        push_op(buf, Opcode::Int8);
        push_i8(buf, n);
    }

    #[test]
    fn single_integer() {
        assert_eq!(decompile(&[Opcode::Int8 as u8, 0x2a], &bare()), "42");
    }

    #[test]
    fn grouped_addition() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::SubscopeStart);
        int8(&mut buf, 1);
        push_op(&mut buf, Opcode::Add);
        int8(&mut buf, 2);
        push_op(&mut buf, Opcode::SubscopeEnd);
        assert_eq!(decompile(&buf, &bare()), "(1 + 2)");
    }

    #[test]
    fn disjunction_of_booleans() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::Disjunction);
        push_u32(&mut buf, 2);
        push_op(&mut buf, Opcode::True);
        push_op(&mut buf, Opcode::False);
        assert_eq!(decompile(&buf, &bare()), "(true) | (false)");
    }

    #[test]
    fn negative_int32() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::Int32);
        push_i32(&mut buf, -42);
        assert_eq!(decompile(&buf, &bare()), "-42");
    }

    #[test]
    fn extra_close_keeps_partial_output() {
        let mut buf = Vec::new();
        int8(&mut buf, 1);
        push_op(&mut buf, Opcode::SubscopeEnd);
        int8(&mut buf, 2);
        assert_eq!(
            decompile(&buf, &bare()),
            "1/* ERROR: No parent scope to go to */"
        );
    }

    #[test]
    fn truncated_stream_is_marked() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::ArrayStart);
        push_op(&mut buf, Opcode::Element);
        int8(&mut buf, 1);
        push_op(&mut buf, Opcode::Int16);
        buf.push(0x01);
        let text = decompile(&buf, &bare());
        assert!(text.starts_with("[1]/* ERROR: unexpected end of input"), "{text}");
    }

    #[test]
    fn array_and_object_elements() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::ArrayStart);
        for n in [1, 2] {
            push_op(&mut buf, Opcode::Element);
            int8(&mut buf, n);
        }
        push_op(&mut buf, Opcode::ArrayEnd);
        push_op(&mut buf, Opcode::CloseAndStore);
        push_op(&mut buf, Opcode::ObjectStart);
        push_op(&mut buf, Opcode::ElementWithKey);
        push_short_text(&mut buf, "a");
        push_op(&mut buf, Opcode::ShortText);
        push_short_text(&mut buf, "x\ny");
        push_op(&mut buf, Opcode::ElementWithIntKey);
        push_u32(&mut buf, 3);
        push_op(&mut buf, Opcode::Null);
        push_op(&mut buf, Opcode::ObjectEnd);
        push_op(&mut buf, Opcode::CloseAndStore);
        assert_eq!(
            decompile(&buf, &bare()),
            "[1,2];\n{\"a\": \"x\\ny\",3: null};"
        );
    }

    #[test]
    fn child_assignment_and_range() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::Label);
        push_short_text(&mut buf, "x");
        push_op(&mut buf, Opcode::ChildSet);
        push_op(&mut buf, Opcode::ShortText);
        push_short_text(&mut buf, "y");
        push_op(&mut buf, Opcode::Range);
        int8(&mut buf, 1);
        int8(&mut buf, 5);
        assert_eq!(decompile(&buf, &bare()), "$x.\"y\" = 1..5");
    }

    #[test]
    fn child_action_uses_symbol() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::InternalVar);
        push_short_text(&mut buf, "v");
        push_op(&mut buf, Opcode::ChildAction);
        push_op(&mut buf, Opcode::Add);
        push_op(&mut buf, Opcode::ShortText);
        push_short_text(&mut buf, "n");
        int8(&mut buf, 1);
        assert_eq!(decompile(&buf, &bare()), "#v.\"n\" += 1");
    }

    #[test]
    fn jumps_and_annotations() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::InitLabel);
        push_short_text(&mut buf, "a");
        push_u32(&mut buf, 20);
        push_op(&mut buf, Opcode::Jtr);
        push_u32(&mut buf, 0x1f);
        push_op(&mut buf, Opcode::True);
        assert_eq!(decompile(&buf, &bare()), "$a := /*jmp:20*/jtr 1f true");
        let quiet = DecompileOptions {
            comments: false,
            ..bare()
        };
        assert_eq!(decompile(&buf, &quiet), "$a :=jtr 1f true");
    }

    #[test]
    fn nested_scope_block() {
        let mut inner = Vec::new();
        int8(&mut inner, 3);
        push_op(&mut inner, Opcode::Multiply);
        int8(&mut inner, 4);
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::Return);
        push_op(&mut buf, Opcode::ScopeBlock);
        push_u32(&mut buf, inner.len() as u32);
        buf.extend_from_slice(&inner);
        assert_eq!(decompile(&buf, &bare()), "return(3 * 4)");
    }

    #[test]
    fn nested_scope_block_out_of_bounds() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::ScopeBlock);
        push_u32(&mut buf, 10);
        int8(&mut buf, 1);
        let text = decompile(&buf, &bare());
        assert!(text.starts_with("/* ERROR: nested program of 10 bytes"), "{text}");
    }

    #[test]
    fn quantity_inside_stream() {
        let quantity = Quantity::new(
            true,
            BigUint::from(2u8),
            BigUint::from(3u8),
            [UnitFactor::new(Unit::Metre, 1)],
        )
        .unwrap();
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::Label);
        push_short_text(&mut buf, "out");
        push_op(&mut buf, Opcode::Stream);
        push_op(&mut buf, Opcode::Quantity);
        quantity.encode(&mut buf);
        assert_eq!(decompile(&buf, &bare()), "$out << -2/3m");
    }

    #[test]
    fn endpoint_literals() {
        let endpoint = Endpoint::get("@dc_alice/00a1").unwrap();
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::PersonAlias);
        endpoint.encode_record(&mut buf);
        push_op(&mut buf, Opcode::Remote);
        push_op(&mut buf, Opcode::InstitutionAliasWildcard);
        Endpoint::get("@+dc_org").unwrap().encode_record(&mut buf);
        assert_eq!(decompile(&buf, &bare()), "@dc_alice/00a1 :: @+dc_org");
    }

    #[test]
    fn invalid_endpoint_is_inline_error() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::PersonAlias);
        buf.extend_from_slice(&[3, 0, 255]);
        buf.extend_from_slice(b"a.b");
        push_op(&mut buf, Opcode::True);
        let text = decompile(&buf, &bare());
        assert!(text.starts_with("/* ERROR: "), "{text}");
        assert!(text.ends_with("*/true"), "{text}");
    }

    #[test]
    fn header_is_stripped() {
        let mut buf = Vec::new();
        Header::default().encode(&mut buf);
        push_op(&mut buf, Opcode::Void);
        assert_eq!(decompile(&buf, &DecompileOptions::default()), "void");
        assert_eq!(
            decompile(&[0xff, 0x00], &DecompileOptions::default()),
            "/* ERROR: Invalid DATEX Header */"
        );
    }

    #[test]
    fn base64_wrapper() {
        let encoded = STANDARD.encode([Opcode::Int8 as u8, 7]);
        assert_eq!(decompile_base64(&encoded, false, false), "7");
        assert_eq!(decompile_base64("@@@", false, false), "/* ERROR: Invalid base64 */");
    }

    #[test]
    fn formatted_output_indents() {
        let mut buf = Vec::new();
        push_op(&mut buf, Opcode::SubscopeStart);
        int8(&mut buf, 1);
        push_op(&mut buf, Opcode::CloseAndStore);
        int8(&mut buf, 2);
        push_op(&mut buf, Opcode::CloseAndStore);
        push_op(&mut buf, Opcode::SubscopeEnd);
        let formatted = DecompileOptions {
            formatted: true,
            ..bare()
        };
        assert_eq!(decompile(&buf, &formatted), "(\n    1;\n    2;\n)");
        assert_eq!(decompile(&buf, &bare()), "(1;\n2;\n)");
    }

    #[test]
    fn single_trailing_newline_is_trimmed() {
        let buf = [Opcode::True as u8, Opcode::CloseAndStore as u8];
        assert_eq!(decompile(&buf, &bare()), "true;");
    }

    #[test]
    fn decode_exposes_partial_tree() {
        let result = decode(&[Opcode::True as u8, Opcode::ArrayEnd as u8], &bare());
        let partial = result.unwrap_err();
        assert_eq!(partial.tree.root().tokens, vec![Token::value("true")]);
        assert_eq!(render_result(&Err(partial), false), "true/* ERROR: No parent scope to go to */");
    }

    #[test]
    fn deeply_nested_scope_blocks_report_inline() {
        let levels = 50_000usize;
        let mut buf = Vec::new();
        for level in 0..levels {
            push_op(&mut buf, Opcode::ScopeBlock);
            push_u32(&mut buf, (5 * (levels - 1 - level)) as u32);
        }
        let text = decompile(&buf, &bare());
        assert!(text.contains("/* ERROR: scopes nested deeper than 64 levels"), "{text}");
        assert!(text.starts_with("(((") && text.ends_with(")))"), "{text}");
    }

    #[test]
    fn deeply_nested_subscopes_report_inline() {
        let buf = vec![Opcode::SubscopeStart as u8; 100_000];
        let text = decompile(&buf, &bare());
        assert!(text.ends_with(")/* ERROR: scopes nested deeper than 64 levels at byte 64 */"), "{text}");
    }
}
