//! Textual forms of literal operands.

use chrono::DateTime;

use crate::cursor::{Cursor, Result};
use crate::hex;
use crate::opcode::Opcode;

/// Size of a pointer id operand.
pub const POINTER_ID_SIZE: usize = 26;

pub fn text(value: &str, formatted_strings: bool) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' if !formatted_strings => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

pub fn buffer(bytes: &[u8]) -> String {
    format!("`{}`", hex::encode_upper(bytes))
}

/// Decimal rendering; integral values keep a `.0` so they read as decimals.
pub fn float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "infinity" } else { "-infinity" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// `~YYYY-MM-DD HH:MM:SS.mmm~` in UTC, `None` when out of range.
pub fn time(millis: u64) -> Option<String> {
    let millis = i64::try_from(millis).ok()?;
    let at = DateTime::from_timestamp_millis(millis)?;
    Some(format!("~{}~", at.format("%Y-%m-%d %H:%M:%S%.3f")))
}

/// Uppercase pointer id with zero runs collapsed to `xN` (N at most 15).
pub fn pointer_id(id: &[u8]) -> String {
    let mut out = String::with_capacity(id.len() * 2);
    let mut zeros = 0usize;
    for &byte in id {
        if byte == 0 {
            zeros += 1;
        } else {
            push_zero_run(&mut out, zeros);
            zeros = 0;
            out.push_str(&hex::encode_upper(&[byte]));
        }
    }
    push_zero_run(&mut out, zeros);
    out
}

fn push_zero_run(out: &mut String, mut zeros: usize) {
    while zeros > 0 {
        let run = zeros.min(15);
        if run == 1 {
            out.push_str("00");
        } else {
            out.push_str(&format!("x{run:X}"));
        }
        zeros -= run;
    }
}

pub fn read_pointer(cur: &mut Cursor<'_>) -> Result<String> {
    Ok(format!("${}", pointer_id(cur.bytes(POINTER_ID_SIZE)?)))
}

/// Variable name operand: a length byte and UTF-8, or a zero length and a `u16` id.
pub fn read_variable(cur: &mut Cursor<'_>, sigil: char) -> Result<String> {
    match cur.u8()? {
        0 => Ok(format!("{sigil}{:x}", cur.u16()?)),
        len => Ok(format!("{sigil}{}", cur.text(len as usize)?)),
    }
}

/// Type reference operand. Returns the rendering and whether parameters follow.
///
/// Extended types carry a variation and a parameter flag; with parameters the
/// closing `>` is left off for the caller to defer.
pub fn read_type(cur: &mut Cursor<'_>, extended: bool) -> Result<(String, bool)> {
    let ns_len = cur.u8()? as usize;
    let name_len = cur.u8()? as usize;
    let (variation_len, has_parameters) = if extended {
        (cur.u8()? as usize, cur.u8()? != 0)
    } else {
        (0, false)
    };
    let ns = cur.text(ns_len)?;
    let name = cur.text(name_len)?;
    let variation = cur.text(variation_len)?;

    let mut out = String::from("<");
    if !ns.is_empty() && ns != "std" {
        out.push_str(ns);
        out.push(':');
    }
    out.push_str(name);
    if !variation.is_empty() {
        out.push('/');
        out.push_str(variation);
    }
    if !has_parameters {
        out.push('>');
    }
    Ok((out, has_parameters))
}

pub fn std_type(op: Opcode) -> Option<&'static str> {
    let name = match op {
        Opcode::StdTypeText => "<text>",
        Opcode::StdTypeInt => "<integer>",
        Opcode::StdTypeFloat => "<decimal>",
        Opcode::StdTypeBoolean => "<boolean>",
        Opcode::StdTypeNull => "<null>",
        Opcode::StdTypeVoid => "<void>",
        Opcode::StdTypeBuffer => "<buffer>",
        Opcode::StdTypeCodeBlock => "<Scope>",
        Opcode::StdTypeUnit => "<quantity>",
        Opcode::StdTypeTime => "<time>",
        Opcode::StdTypeUrl => "<url>",
        Opcode::StdTypeArray => "<Array>",
        Opcode::StdTypeObject => "<Object>",
        Opcode::StdTypeSet => "<Set>",
        Opcode::StdTypeMap => "<Map>",
        Opcode::StdTypeTuple => "<Tuple>",
        Opcode::StdTypeFunction => "<Function>",
        Opcode::StdTypeStream => "<Stream>",
        Opcode::StdTypeAny => "<Any>",
        Opcode::StdTypeAssertion => "<Assertion>",
        Opcode::StdTypeTask => "<Task>",
        Opcode::StdTypeIterator => "<Iterator>",
        _ => return None,
    };
    Some(name)
}

/// Well-known object slot keys.
pub fn object_slot(slot: u16) -> String {
    match slot {
        0xfef0 => "#write".to_string(),
        0xfef1 => "#read".to_string(),
        0xfef2 => "#exec".to_string(),
        0xfef3 => "#get".to_string(),
        0xfef4 => "#set".to_string(),
        other => format!("#{other:x}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{push_short_text, push_u8, push_u16};

    #[test]
    fn escapes_text() {
        assert_eq!(text("a\"b\\c\nd", false), r#""a\"b\\c\nd""#);
        assert_eq!(text("a\nb", true), "\"a\nb\"");
    }

    #[test]
    fn floats_keep_a_decimal_point() {
        assert_eq!(float(1.0), "1.0");
        assert_eq!(float(-2.5), "-2.5");
        assert_eq!(float(f64::NAN), "nan");
        assert_eq!(float(f64::NEG_INFINITY), "-infinity");
    }

    #[test]
    fn time_is_rendered_in_utc() {
        assert_eq!(time(1_642_806_000_000).as_deref(), Some("~2022-01-21 23:00:00.000~"));
        assert_eq!(time(u64::MAX), None);
    }

    #[test]
    fn pointer_ids_collapse_zero_runs() {
        let mut id = [0u8; POINTER_ID_SIZE];
        id[0] = 0xab;
        id[3] = 0x01;
        // 2 zeros, then 22 trailing zeros split into 15 + 7
        assert_eq!(pointer_id(&id), "ABx201xFx7");
        let mut single = [0xffu8; 4];
        single[1] = 0;
        assert_eq!(pointer_id(&single), "FF00FFFF");
        let mut sixteen = [0u8; 17];
        sixteen[16] = 1;
        assert_eq!(pointer_id(&sixteen), "xF0001");
    }

    #[test]
    fn variable_names_text_or_numeric() -> Result<()> {
        let mut buf = Vec::new();
        push_short_text(&mut buf, "x");
        push_u8(&mut buf, 0);
        push_u16(&mut buf, 0x1f);
        let mut cur = Cursor::new(&buf);
        assert_eq!(read_variable(&mut cur, '$')?, "$x");
        assert_eq!(read_variable(&mut cur, '#')?, "#1f");
        Ok(())
    }

    #[test]
    fn type_references() -> Result<()> {
        let mut buf = vec![3, 4];
        buf.extend_from_slice(b"stdtext");
        buf.extend_from_slice(&[2, 3, 0, 1]);
        buf.extend_from_slice(b"myvec");
        let mut cur = Cursor::new(&buf);
        assert_eq!(read_type(&mut cur, false)?, ("<text>".to_string(), false));
        assert_eq!(read_type(&mut cur, true)?, ("<my:vec".to_string(), true));
        Ok(())
    }
}
