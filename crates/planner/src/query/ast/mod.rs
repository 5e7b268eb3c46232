pub mod common;
pub mod copy;
