use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use datex::hex;

/// Read `path`, or stdin when it is `-`.
pub(crate) fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Hex text with any whitespace removed.
pub(crate) fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact).ok_or_else(|| anyhow!("invalid hex input"))
}
