// Srp6 - server half of the SRP6 variant spoken by 1.x-3.x game clients
//
// Fixed parameters: g = 7, k = 3, SHA-1, and the 256-bit safe prime the
// client ships with. Every byte string that crosses the wire (B, N, s, A,
// M1, M2, K) is little-endian.

use once_cell::sync::Lazy;

use super::big_number::BigNumber;
use super::crypto_hash::Sha1Hash;

/// 40 bytes of session key material derived from the shared secret.
pub type SessionKey = [u8; 40];

static N: Lazy<BigNumber> = Lazy::new(|| {
    let mut n = BigNumber::new();
    let ok = n.set_hex_str("894B645E89E1535BBDAD5B8B290650530801B18EBFBF5E8FAB3C82872A3E9BB7");
    debug_assert!(ok);
    n
});

static G: Lazy<BigNumber> = Lazy::new(|| BigNumber::from_u32(7));

/// Server-side SRP6 context for one login attempt.
///
/// The context is single-use: `verify_challenge` consumes it, and a second
/// call reports "no session" no matter what the client sends.
pub struct Srp6 {
    identity_hash: [u8; 20],
    salt: [u8; 32],
    v: BigNumber,
    b: BigNumber,
    public_b: BigNumber,
    used: bool,
}

impl Srp6 {
    pub const EPHEMERAL_KEY_LENGTH: usize = 32;
    pub const SALT_LENGTH: usize = 32;

    /// Build a context from the stored credentials. The verifier is the
    /// little-endian `v` column; the salt is used verbatim.
    pub fn new(username: &str, salt: &[u8; 32], verifier: &[u8; 32]) -> Self {
        let identity_hash =
            Sha1Hash::digest_of(username.to_ascii_uppercase().as_bytes());
        let v = BigNumber::from_binary(verifier);

        let mut b = BigNumber::new();
        b.set_rand(Self::EPHEMERAL_KEY_LENGTH as u64 * 8);

        // B = (g^b mod N + v * 3) mod N
        let n: &BigNumber = &N;
        let public_b = &(&G.mod_exp(&b, n) + &(&v * 3)) % n;

        Srp6 {
            identity_hash,
            salt: *salt,
            v,
            b,
            public_b,
            used: false,
        }
    }

    pub fn prime() -> &'static BigNumber {
        &N
    }

    pub fn generator() -> &'static BigNumber {
        &G
    }

    pub fn salt(&self) -> &[u8; 32] {
        &self.salt
    }

    /// Host public ephemeral B, as sent in the challenge reply.
    pub fn public_ephemeral(&self) -> [u8; 32] {
        self.public_b.to_fixed_bytes()
    }

    /// Verify the client proof `M1` against public ephemeral `A`.
    ///
    /// Returns the 40-byte session key on success and `None` on any
    /// failure: reused context, weak `A`, or a proof mismatch.
    pub fn verify_challenge(
        &mut self,
        a: &[u8; 32],
        client_m1: &[u8; 20],
    ) -> Option<SessionKey> {
        if std::mem::replace(&mut self.used, true) {
            return None;
        }

        let n: &BigNumber = &N;
        let big_a = BigNumber::from_binary(a);
        if (&big_a % n).is_zero() {
            return None;
        }

        // u = SHA1(A || B)
        let mut sha = Sha1Hash::new();
        sha.update_bytes(a);
        sha.update_bytes(&self.public_ephemeral());
        sha.finalize();
        let u = BigNumber::from_binary(sha.digest());

        // S = (A * v^u)^b mod N
        let s = (&big_a * &self.v.mod_exp(&u, n)).mod_exp(&self.b, n);
        let key = sha1_interleave(&s.to_fixed_bytes());

        let expected =
            calculate_proof(&self.identity_hash, &self.salt, a, &self.public_ephemeral(), &key);

        if constant_time_eq(client_m1, &expected) {
            Some(key)
        } else {
            None
        }
    }

    /// Server proof M2 = SHA1(A || M1 || K), sent back after a successful
    /// verification.
    pub fn server_proof(a: &[u8; 32], m1: &[u8; 20], key: &SessionKey) -> [u8; 20] {
        let mut sha = Sha1Hash::new();
        sha.update_bytes(a);
        sha.update_bytes(m1);
        sha.update_bytes(key);
        sha.finalize();
        *sha.digest()
    }
}

/// The shared proof both sides compute:
/// `SHA1((SHA1(N) XOR SHA1(g)) || SHA1(upper(user)) || s || A || B || K)`.
pub fn calculate_proof(
    identity_hash: &[u8; 20],
    salt: &[u8; 32],
    a: &[u8; 32],
    b: &[u8; 32],
    key: &SessionKey,
) -> [u8; 20] {
    let hash_n = Sha1Hash::digest_of(&N.as_byte_array(0));
    let hash_g = Sha1Hash::digest_of(&G.as_byte_array(0));

    let mut xor = [0u8; 20];
    for i in 0..20 {
        xor[i] = hash_n[i] ^ hash_g[i];
    }

    let mut sha = Sha1Hash::new();
    sha.update_bytes(&xor);
    sha.update_bytes(identity_hash);
    sha.update_bytes(salt);
    sha.update_bytes(a);
    sha.update_bytes(b);
    sha.update_bytes(key);
    sha.finalize();
    *sha.digest()
}

/// Derive the 40-byte session key from the 32-byte little-endian secret S.
///
/// S is split into its even and odd byte streams; matched leading zero
/// bytes are stripped so both streams start at the same halved offset,
/// each stream is SHA-1 hashed, and the two digests are interleaved.
pub fn sha1_interleave(s: &[u8; 32]) -> SessionKey {
    let mut skip = 0;
    while skip < s.len() && s[skip] == 0 {
        skip += 1;
    }
    if skip % 2 == 1 {
        skip += 1;
    }

    let even: Vec<u8> = s[skip..].iter().step_by(2).copied().collect();
    let odd: Vec<u8> = s[skip..].iter().skip(1).step_by(2).copied().collect();

    let hash_even = Sha1Hash::digest_of(&even);
    let hash_odd = Sha1Hash::digest_of(&odd);

    let mut key = [0u8; 40];
    for i in 0..20 {
        key[i * 2] = hash_even[i];
        key[i * 2 + 1] = hash_odd[i];
    }
    key
}

/// Verifier for the standard client registration formula:
/// `v = g^x mod N` with `x = SHA1(s || SHA1(upper(user) ":" upper(pass)))`.
pub fn calculate_verifier(username: &str, password: &str, salt: &[u8; 32]) -> [u8; 32] {
    let credentials = format!(
        "{}:{}",
        username.to_ascii_uppercase(),
        password.to_ascii_uppercase()
    );
    let inner = Sha1Hash::digest_of(credentials.as_bytes());

    let mut sha = Sha1Hash::new();
    sha.update_bytes(salt);
    sha.update_bytes(&inner);
    sha.finalize();
    let x = BigNumber::from_binary(sha.digest());

    G.mod_exp(&x, &N).to_fixed_bytes()
}

fn constant_time_eq(a: &[u8; 20], b: &[u8; 20]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: [u8; 32] = [0x01; 32];

    /// Client half of the handshake, straight from the published formulas.
    fn client_session(
        username: &str,
        password: &str,
        salt: &[u8; 32],
        b_pub: &[u8; 32],
    ) -> ([u8; 32], [u8; 20], SessionKey) {
        let n = Srp6::prime();
        let g = Srp6::generator();

        let credentials = format!(
            "{}:{}",
            username.to_ascii_uppercase(),
            password.to_ascii_uppercase()
        );
        let inner = Sha1Hash::digest_of(credentials.as_bytes());
        let mut sha = Sha1Hash::new();
        sha.update_bytes(salt);
        sha.update_bytes(&inner);
        sha.finalize();
        let x = BigNumber::from_binary(sha.digest());

        let mut a = BigNumber::new();
        a.set_rand(256);
        let a_bytes: [u8; 32] = g.mod_exp(&a, n).to_fixed_bytes();

        let mut sha = Sha1Hash::new();
        sha.update_bytes(&a_bytes);
        sha.update_bytes(b_pub);
        sha.finalize();
        let u = BigNumber::from_binary(sha.digest());

        // S = (B - 3 * g^x)^(a + u * x) mod N
        let k_g_x = &(&g.mod_exp(&x, n) * 3) % n;
        let base = &(&(&BigNumber::from_binary(b_pub) + n) - &k_g_x) % n;
        let exponent = &a + &(&u * &x);
        let s = base.mod_exp(&exponent, n);

        let key = sha1_interleave(&s.to_fixed_bytes());
        let identity = Sha1Hash::digest_of(username.to_ascii_uppercase().as_bytes());
        let m1 = calculate_proof(&identity, salt, &a_bytes, b_pub, &key);
        (a_bytes, m1, key)
    }

    #[test]
    fn honest_client_succeeds() {
        let verifier = calculate_verifier("TEST", "TEST", &SALT);
        let mut srp = Srp6::new("TEST", &SALT, &verifier);
        let b_pub = srp.public_ephemeral();

        let (a, m1, client_key) = client_session("TEST", "TEST", &SALT, &b_pub);
        let server_key = srp.verify_challenge(&a, &m1).expect("proof accepted");
        assert_eq!(server_key, client_key);
    }

    #[test]
    fn username_case_is_ignored() {
        let verifier = calculate_verifier("test", "TeSt", &SALT);
        let mut srp = Srp6::new("TeSt", &SALT, &verifier);
        let b_pub = srp.public_ephemeral();

        let (a, m1, _) = client_session("TEST", "TEST", &SALT, &b_pub);
        assert!(srp.verify_challenge(&a, &m1).is_some());
    }

    #[test]
    fn bit_flip_in_a_fails() {
        let verifier = calculate_verifier("TEST", "TEST", &SALT);
        let mut srp = Srp6::new("TEST", &SALT, &verifier);
        let (mut a, m1, _) = client_session("TEST", "TEST", &SALT, &srp.public_ephemeral());
        a[7] ^= 0x10;
        assert!(srp.verify_challenge(&a, &m1).is_none());
    }

    #[test]
    fn bit_flip_in_m1_fails() {
        let verifier = calculate_verifier("TEST", "TEST", &SALT);
        let mut srp = Srp6::new("TEST", &SALT, &verifier);
        let (a, mut m1, _) = client_session("TEST", "TEST", &SALT, &srp.public_ephemeral());
        m1[0] ^= 0x01;
        assert!(srp.verify_challenge(&a, &m1).is_none());
    }

    #[test]
    fn wrong_password_fails() {
        let verifier = calculate_verifier("TEST", "TEST", &SALT);
        let mut srp = Srp6::new("TEST", &SALT, &verifier);
        let (a, m1, _) = client_session("TEST", "WRONG", &SALT, &srp.public_ephemeral());
        assert!(srp.verify_challenge(&a, &m1).is_none());
    }

    #[test]
    fn context_is_single_use() {
        let verifier = calculate_verifier("TEST", "TEST", &SALT);
        let mut srp = Srp6::new("TEST", &SALT, &verifier);
        let (a, m1, _) = client_session("TEST", "TEST", &SALT, &srp.public_ephemeral());

        assert!(srp.verify_challenge(&a, &m1).is_some());
        // Identical, previously valid inputs are refused the second time.
        assert!(srp.verify_challenge(&a, &m1).is_none());
    }

    #[test]
    fn weak_ephemeral_rejected() {
        let verifier = calculate_verifier("TEST", "TEST", &SALT);

        let mut srp = Srp6::new("TEST", &SALT, &verifier);
        assert!(srp.verify_challenge(&[0u8; 32], &[0u8; 20]).is_none());

        // A = N is congruent to zero mod N.
        let n_bytes: [u8; 32] = Srp6::prime().to_fixed_bytes();
        let mut srp = Srp6::new("TEST", &SALT, &verifier);
        assert!(srp.verify_challenge(&n_bytes, &[0u8; 20]).is_none());
    }

    #[test]
    fn interleave_strips_matched_leading_zeros() {
        let mut s = [0u8; 32];
        for (i, byte) in s.iter_mut().enumerate() {
            *byte = i as u8 + 1;
        }
        s[0] = 0;
        s[1] = 0;

        let even: Vec<u8> = s[2..].iter().step_by(2).copied().collect();
        let odd: Vec<u8> = s[2..].iter().skip(1).step_by(2).copied().collect();
        let hash_even = Sha1Hash::digest_of(&even);
        let hash_odd = Sha1Hash::digest_of(&odd);

        let key = sha1_interleave(&s);
        for i in 0..20 {
            assert_eq!(key[i * 2], hash_even[i]);
            assert_eq!(key[i * 2 + 1], hash_odd[i]);
        }
    }

    #[test]
    fn interleave_odd_zero_run_rounds_up() {
        let mut s = [0xAAu8; 32];
        s[0] = 0;
        // A single leading zero strips one byte from each stream.
        let key = sha1_interleave(&s);
        let even = Sha1Hash::digest_of(&s[2..].iter().step_by(2).copied().collect::<Vec<_>>());
        assert_eq!(key[0], even[0]);
    }
}
