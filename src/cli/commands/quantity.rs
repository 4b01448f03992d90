use anyhow::{Result, bail};

use super::util::parse_hex;
use crate::cli::QuantityCommand;
use datex::{Cursor, Quantity};

pub(crate) fn cmd_quantity(command: QuantityCommand) -> Result<()> {
    match command {
        QuantityCommand::Decode { hex, base } => {
            let bytes = parse_hex(&hex)?;
            let mut cur = Cursor::new(&bytes);
            let quantity = Quantity::decode(&mut cur)?;
            if cur.has_remaining() {
                bail!("{} trailing byte(s) after quantity", cur.remaining());
            }
            if base {
                println!("{}", quantity.to_base_string());
            } else {
                println!("{quantity}");
            }
        }
    }
    Ok(())
}
