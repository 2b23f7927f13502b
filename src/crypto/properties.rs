//! AES-256-SHA256 coder properties.

use crate::{Error, Result};

/// Parsed AES encryption properties carried by an entry header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AesProperties {
    /// Number of SHA-256 iterations = 2^num_cycles_power.
    pub num_cycles_power: u8,
    /// Salt for key derivation (0-16 bytes).
    pub salt: Vec<u8>,
    /// Initialization vector (padded to 16 bytes).
    pub iv: Vec<u8>,
}

impl AesProperties {
    /// Parses AES properties from the coder property bytes.
    ///
    /// The format is:
    /// - Byte 0: (salt_flag << 7) | (iv_flag << 6) | num_cycles_power
    /// - Byte 1: (salt_size_extra << 4) | iv_size_extra
    /// - Remaining bytes: salt followed by IV
    pub fn parse(properties: &[u8]) -> Result<Self> {
        let [first_byte, second_byte, ..] = *properties else {
            return Err(Error::InvalidFormat(
                "AES properties too short (need at least 2 bytes)".into(),
            ));
        };

        let num_cycles_power = first_byte & 0x3F;
        let salt_flag = (first_byte >> 7) & 1;
        let iv_flag = (first_byte >> 6) & 1;

        let salt_size = if salt_flag == 1 {
            (1 + ((second_byte >> 4) & 0x0F)) as usize
        } else {
            0
        };
        let iv_size = if iv_flag == 1 {
            (1 + (second_byte & 0x0F)) as usize
        } else {
            0
        };

        let salt_end = 2 + salt_size;
        let iv_end = salt_end + iv_size;

        if properties.len() < iv_end {
            return Err(Error::InvalidFormat(format!(
                "AES properties too short: expected {} bytes, got {}",
                iv_end,
                properties.len()
            )));
        }

        let salt = properties[2..salt_end].to_vec();

        let mut iv = vec![0u8; 16];
        let iv_data = &properties[salt_end..iv_end];
        iv[..iv_data.len()].copy_from_slice(iv_data);

        Ok(Self {
            num_cycles_power,
            salt,
            iv,
        })
    }

    /// Encodes AES properties to bytes.
    ///
    /// Header parsers never need this; it exists so callers can describe
    /// encrypted data they produced elsewhere.
    pub fn encode(num_cycles_power: u8, salt: &[u8], iv: &[u8]) -> Vec<u8> {
        let salt = &salt[..salt.len().min(16)];
        let iv = &iv[..iv.len().min(16)];

        let salt_flag = u8::from(!salt.is_empty());
        let iv_flag = u8::from(!iv.is_empty());
        let salt_size_extra = salt.len().saturating_sub(1) as u8;
        let iv_size_extra = iv.len().saturating_sub(1) as u8;

        let first_byte = (salt_flag << 7) | (iv_flag << 6) | (num_cycles_power & 0x3F);
        let second_byte = (salt_size_extra << 4) | iv_size_extra;

        let mut result = vec![first_byte, second_byte];
        result.extend_from_slice(salt);
        result.extend_from_slice(iv);
        result
    }
}
