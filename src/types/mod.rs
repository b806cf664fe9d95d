//! Core type definitions.
//!
//! - `encoding`: deterministic binary `Encode`/`Decode`, used for VM save states
//!   together with `#[derive(BinaryCodec)]`.

pub mod encoding;
