//! Thin streaming wrappers around the two hash families the depot supports.

use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::io::{self, Write};

/// Incremental SHA-1 hasher (the "legacy" 160-bit tree-hash family).
#[derive(Default)]
pub struct Sha1Hash(Sha1);

impl Sha1Hash {
    pub fn new() -> Self {
        Self(Sha1::new())
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn finish_hex(self) -> String {
        hex::encode(self.0.finalize())
    }
}

impl Write for Sha1Hash {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Incremental SHA-256 hasher (the "modern" 256-bit tree-hash family, and
/// the tarball payload hash).
#[derive(Default)]
pub struct Sha256Hash(Sha256);

impl Sha256Hash {
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn finish_hex(self) -> String {
        hex::encode(self.0.finalize())
    }
}

impl Write for Sha256Hash {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_known_vector() {
        let mut h = Sha256Hash::new();
        h.update(b"abc");
        assert_eq!(
            h.finish_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
