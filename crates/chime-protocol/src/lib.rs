//! # chime-protocol
//!
//! Wire formats spoken by the control plane.
//!
//! This crate provides:
//! - A strict JSON value model with parser and compact serializer
//! - Encoding and decoding of the HTTP API payloads
//! - DNS message encoding for the mDNS responder
//!
//! Like `chime-core`, this crate has no I/O and no async code.

pub mod codec;
pub mod dns;
pub mod json;

pub use codec::{decode_save_request, DecodeError};
pub use json::{parse, JsonError, JsonValue};
