mod decompile;
mod endpoint;
mod quantity;
mod util;

pub(crate) use decompile::cmd_decompile;
pub(crate) use endpoint::cmd_endpoint;
pub(crate) use quantity::cmd_quantity;
