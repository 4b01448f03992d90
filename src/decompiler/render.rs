//! Serializes a [`TokenTree`] back into script text.

use super::token::{ScopeId, Token, TokenTree};

const INDENT: &str = "    ";

pub(crate) struct Renderer<'a> {
    tree: &'a TokenTree,
    formatted: bool,
}

impl<'a> Renderer<'a> {
    pub(crate) fn new(tree: &'a TokenTree, formatted: bool) -> Self {
        Renderer { tree, formatted }
    }

    pub(crate) fn render(&self, scope: ScopeId) -> String {
        let node = self.tree.scope(scope);
        let infix = node.kind.infix();
        let tokens = &node.tokens;

        let mut out = String::new();
        let mut pending: Option<String> = None;
        let mut had_value = false;
        if infix.is_some() {
            out.push('(');
        }
        for (i, token) in tokens.iter().enumerate() {
            if let Some(op) = infix {
                if had_value {
                    out.push_str(&format!(") {op} ("));
                    had_value = false;
                }
                had_value |= token.is_value();
            }

            match token {
                Token::Scope { id } => out.push_str(&self.render_child(*id)),
                Token::Value { text, .. }
                | Token::Operator { text, .. }
                | Token::Separator { text } => out.push_str(text),
            }

            if tokens.get(i + 1).is_some_and(Token::is_separator) {
                out.push(',');
            }
            if let Some(fragment) = pending.take() {
                out.push_str(&fragment);
            }
            pending = token.defer().map(|defer| defer.fragment());
        }
        if infix.is_some() {
            out.push(')');
        }
        out
    }

    fn render_child(&self, id: ScopeId) -> String {
        let inner = self.render(id);
        let Some((open, close)) = self.tree.scope(id).kind.brackets() else {
            return inner;
        };
        if self.formatted && inner.contains('\n') {
            let body = indent(inner.trim_end_matches('\n'));
            format!("{open}\n{body}\n{close}")
        } else {
            format!("{open}{inner}{close}")
        }
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{INDENT}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
