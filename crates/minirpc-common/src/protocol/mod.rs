pub mod error;
pub mod request;
pub mod response;
pub mod wire;

#[cfg(test)]
mod tests;

pub use error::{MinirpcError, Result};
pub use request::{Request, META_DEADLINE, META_ONEWAY};
pub use response::Response;
pub use wire::{COMPRESSION_NONE, PREAMBLE_LEN, PROTOCOL_VERSION};
