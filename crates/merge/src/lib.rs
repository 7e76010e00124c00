mod db_merger;
mod error;
mod tile_merger;

pub use db_merger::{merge_databases, verify_merge, MergeReport};
pub use error::MergeError;
pub use tile_merger::{merge_tile_messages, merge_tiles};
