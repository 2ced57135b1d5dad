// Sha1Hash - incremental SHA-1 wrapper over the sha1 crate

use digest::Digest;

/// Incremental SHA-1 with the update/finalize shape the auth handshake
/// code wants. `finalize` leaves the digest readable and resets the
/// hasher for the next round.
#[derive(Clone)]
pub struct Sha1Hash {
    hasher: sha1::Sha1,
    digest: [u8; 20],
}

impl Default for Sha1Hash {
    fn default() -> Self {
        Self::new()
    }
}

impl Sha1Hash {
    pub const DIGEST_LENGTH: usize = 20;

    pub fn new() -> Self {
        Sha1Hash {
            hasher: sha1::Sha1::new(),
            digest: [0u8; 20],
        }
    }

    pub fn initialize(&mut self) {
        self.hasher = sha1::Sha1::new();
    }

    pub fn update_bytes(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn update_str(&mut self, data: &str) {
        self.hasher.update(data.as_bytes());
    }

    pub fn finalize(&mut self) {
        let result = std::mem::replace(&mut self.hasher, sha1::Sha1::new()).finalize();
        self.digest.copy_from_slice(&result);
    }

    pub fn digest(&self) -> &[u8; 20] {
        &self.digest
    }

    /// One-shot digest of a byte slice.
    pub fn digest_of(data: &[u8]) -> [u8; 20] {
        let mut out = [0u8; 20];
        out.copy_from_slice(&sha1::Sha1::digest(data));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        let mut sha = Sha1Hash::new();
        sha.update_str("test");
        sha.finalize();
        // SHA1("test") = a94a8fe5ccb19ba61c4c0873d391e987982fbbd3
        assert_eq!(sha.digest()[..4], [0xa9, 0x4a, 0x8f, 0xe5]);
        assert_eq!(*sha.digest(), Sha1Hash::digest_of(b"test"));
    }

    #[test]
    fn finalize_resets_state() {
        let mut sha = Sha1Hash::new();
        sha.update_str("first");
        sha.finalize();
        sha.update_str("test");
        sha.finalize();
        assert_eq!(*sha.digest(), Sha1Hash::digest_of(b"test"));
    }
}
