pub mod builtin;
pub mod client;
pub mod pool;
