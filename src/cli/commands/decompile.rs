use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use super::util::{parse_hex, read_input};
use crate::cli::DecompileArgs;
use datex::{Config, DecompileOptions, decompiler};

pub(crate) fn cmd_decompile(config: &Config, args: &DecompileArgs) -> Result<()> {
    let raw = read_input(&args.input)?;
    let options = DecompileOptions {
        comments: config.decompile.comments && !args.no_comments,
        formatted: config.decompile.formatted || args.formatted,
        formatted_strings: config.decompile.formatted_strings || args.formatted_strings,
        has_header: config.decompile.has_header && !args.no_header,
    };

    if args.base64 && !args.tokens {
        let text = String::from_utf8(raw).context("base64 input is not UTF-8")?;
        println!(
            "{}",
            decompiler::decompile_base64(&text, options.formatted, options.has_header)
        );
        return Ok(());
    }

    let dxb = if args.hex {
        parse_hex(&String::from_utf8_lossy(&raw))?
    } else if args.base64 {
        STANDARD
            .decode(String::from_utf8_lossy(&raw).trim())
            .context("invalid base64 input")?
    } else {
        raw
    };
    debug!(bytes = dxb.len(), "decompiling");

    if args.tokens {
        let json = match decompiler::decode(&dxb, &options) {
            Ok(tree) => serde_json::to_string_pretty(&tree)?,
            Err(partial) => {
                let json = serde_json::to_string_pretty(&partial.tree)?;
                eprintln!("error: {}", partial.error);
                json
            }
        };
        println!("{json}");
    } else {
        println!("{}", decompiler::decompile(&dxb, &options));
    }
    Ok(())
}
