pub mod tally_repository;

pub use tally_repository::*;
