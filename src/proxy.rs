//! Construction of the demo "simple message" proxy call
//!
//! The target proxy contract exposes `forwardMessage(bytes,bytes)` and
//! expects a single ABI-encoded string argument.

use crate::sdk::EvmProxyMsg;

/// TAC proxy contract for the simple message demo
pub const MESSAGE_PROXY: &str = "0xe3E475d7F7EA690875C65C30856547fcE3E28F20";

/// Build the proxy message carrying a plaintext string
pub fn simple_message_call(message: &str) -> EvmProxyMsg {
    EvmProxyMsg {
        evm_target_address: MESSAGE_PROXY.to_string(),
        method_name: "forwardMessage(bytes,bytes)".to_string(),
        encoded_parameters: abi_encode_string(message),
    }
}

/// ABI-encode a single dynamic string argument: offset word, length word,
/// then the UTF-8 bytes right-padded to a 32-byte boundary.
fn abi_encode_string(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let padded_len = (bytes.len() + 31) / 32 * 32;

    let mut out = Vec::with_capacity(64 + padded_len);
    out.extend_from_slice(&word(32));
    out.extend_from_slice(&word(bytes.len() as u64));
    out.extend_from_slice(bytes);
    out.resize(64 + padded_len, 0);
    out
}

fn word(n: u64) -> [u8; 32] {
    let mut w = [0u8; 32];
    w[24..].copy_from_slice(&n.to_be_bytes());
    w
}
