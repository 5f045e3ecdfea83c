//! Checksum verification for staged template packages.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::Result;

/// Supported checksum types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumType {
    Md5,
    Sha1,
    Sha256,
}

impl ChecksumType {
    /// Detect checksum type from length of hex string
    pub fn from_hex_length(len: usize) -> Option<Self> {
        match len {
            32 => Some(ChecksumType::Md5),
            40 => Some(ChecksumType::Sha1),
            64 => Some(ChecksumType::Sha256),
            _ => None,
        }
    }
}

fn digest_file<D: Digest>(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = D::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// Compute the hex digest of a file
pub fn compute_checksum(path: &Path, checksum_type: ChecksumType) -> Result<String> {
    match checksum_type {
        ChecksumType::Md5 => digest_file::<Md5>(path),
        ChecksumType::Sha1 => digest_file::<Sha1>(path),
        ChecksumType::Sha256 => digest_file::<Sha256>(path),
    }
}

/// Verify checksum of a file
pub fn verify_checksum(path: &Path, expected: &str, checksum_type: ChecksumType) -> Result<bool> {
    let actual = compute_checksum(path, checksum_type)?;
    Ok(actual.eq_ignore_ascii_case(expected))
}
