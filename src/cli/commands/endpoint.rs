use anyhow::Result;

use crate::cli::EndpointCommand;
use datex::{Endpoint, Target, WildcardTarget, hex, logical_match};

pub(crate) fn cmd_endpoint(command: EndpointCommand) -> Result<()> {
    match command {
        EndpointCommand::Show { name } => {
            let endpoint = Endpoint::get(&name)?;
            let mut record = Vec::new();
            endpoint.encode_record(&mut record);
            println!("endpoint: {endpoint}");
            println!("kind:     {:?}", endpoint.kind());
            println!("main:     {}", endpoint.main());
            println!("name:     {}", hex::encode_lower(endpoint.binary_name()));
            println!("instance: {}", hex::encode_lower(&endpoint.binary_instance()));
            println!("record:   {}", hex::encode_lower(&record));
        }
        EndpointCommand::Match {
            value,
            against,
            wildcard,
        } => {
            let value = Target::from(Endpoint::get(&value)?);
            let filter = Endpoint::get(&against)?;
            let filter = if wildcard {
                Target::from(WildcardTarget::get(&filter))
            } else {
                Target::from(filter)
            };
            let matched = logical_match(&value, &filter);
            println!("{value} {} {filter}", if matched { "matches" } else { "does not match" });
        }
    }
    Ok(())
}
