pub mod adapter;
pub mod binary;
pub mod handlers;
