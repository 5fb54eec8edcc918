pub mod block;
pub mod builder;
pub mod filter_block;
pub mod footer;
pub mod reader;
