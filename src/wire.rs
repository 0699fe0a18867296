// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Envelope wire encoding.
//!
//! bincode with the standard configuration. Framing (length prefix) belongs
//! to the transport; this module only maps one envelope to one byte body.

use alloc::vec::Vec;

use crate::config::MAX_FRAME_LEN;
use crate::envelope::Envelope;
use crate::error::{KernelError, KernelResult};

pub fn encode(envelope: &Envelope) -> KernelResult<Vec<u8>> {
    let bytes = bincode::serde::encode_to_vec(envelope, bincode::config::standard())
        .map_err(|_| KernelError::Encode)?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(KernelError::Encode);
    }
    Ok(bytes)
}

/// Decodes and validates one envelope. Trailing bytes are rejected.
pub fn decode(bytes: &[u8]) -> KernelResult<Envelope> {
    if bytes.len() > MAX_FRAME_LEN {
        return Err(KernelError::Decode);
    }
    let (envelope, read): (Envelope, usize) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|_| KernelError::Decode)?;
    if read != bytes.len() {
        return Err(KernelError::Decode);
    }
    envelope.validate()?;
    Ok(envelope)
}
