// BigNumber - large unsigned integer arithmetic over num-bigint
//
// Every SRP byte string on the wire is little-endian, while BigUint's
// natural serialization is big-endian. The conversion happens in exactly
// two places: `set_binary` and `as_byte_array`. Callers never reverse
// bytes themselves.

use num_bigint::{BigUint, RandBigInt};
use num_traits::Zero;
use rand::thread_rng;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigNumber {
    bn: BigUint,
}

impl Default for BigNumber {
    fn default() -> Self {
        Self::new()
    }
}

impl BigNumber {
    pub fn new() -> Self {
        BigNumber { bn: BigUint::zero() }
    }

    pub fn from_u32(val: u32) -> Self {
        BigNumber { bn: BigUint::from(val) }
    }

    /// Interpret `bytes` as a little-endian unsigned integer.
    pub fn from_binary(bytes: &[u8]) -> Self {
        let mut bn = BigNumber::new();
        bn.set_binary(bytes);
        bn
    }

    /// Set from binary data in little-endian order.
    pub fn set_binary(&mut self, bytes: &[u8]) {
        self.bn = BigUint::from_bytes_le(bytes);
    }

    /// Set from a big-endian hex string. Returns false on a parse error.
    pub fn set_hex_str(&mut self, hex: &str) -> bool {
        let hex = hex.trim();
        if hex.is_empty() {
            return false;
        }
        match BigUint::parse_bytes(hex.as_bytes(), 16) {
            Some(val) => {
                self.bn = val;
                true
            }
            None => false,
        }
    }

    /// Replace the value with `num_bits` of randomness from the thread RNG.
    pub fn set_rand(&mut self, num_bits: u64) {
        let mut rng = thread_rng();
        self.bn = rng.gen_biguint(num_bits);
    }

    pub fn is_zero(&self) -> bool {
        self.bn.is_zero()
    }

    /// Modular exponentiation: self^exp mod modulus.
    pub fn mod_exp(&self, exp: &BigNumber, modulus: &BigNumber) -> BigNumber {
        BigNumber {
            bn: self.bn.modpow(&exp.bn, &modulus.bn),
        }
    }

    pub fn num_bytes(&self) -> usize {
        (self.bn.bits() as usize).div_ceil(8)
    }

    pub fn as_u32(&self) -> u32 {
        use num_traits::ToPrimitive;
        self.bn.to_u32().unwrap_or(0)
    }

    /// Little-endian byte array, zero-padded up to `min_size` bytes.
    pub fn as_byte_array(&self, min_size: usize) -> Vec<u8> {
        let mut bytes = self.bn.to_bytes_le();
        if bytes.len() < min_size {
            bytes.resize(min_size, 0);
        }
        bytes
    }

    /// Little-endian fixed-size array. The value must fit in `N` bytes.
    pub fn to_fixed_bytes<const N: usize>(&self) -> [u8; N] {
        let bytes = self.as_byte_array(N);
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes[..N]);
        out
    }

    pub fn as_hex_str(&self) -> String {
        format!("{:X}", self.bn)
    }
}

impl std::ops::Add for &BigNumber {
    type Output = BigNumber;
    fn add(self, rhs: &BigNumber) -> BigNumber {
        BigNumber { bn: &self.bn + &rhs.bn }
    }
}

impl std::ops::Sub for &BigNumber {
    type Output = BigNumber;
    fn sub(self, rhs: &BigNumber) -> BigNumber {
        BigNumber {
            bn: if self.bn >= rhs.bn {
                &self.bn - &rhs.bn
            } else {
                BigUint::zero()
            },
        }
    }
}

impl std::ops::Mul for &BigNumber {
    type Output = BigNumber;
    fn mul(self, rhs: &BigNumber) -> BigNumber {
        BigNumber { bn: &self.bn * &rhs.bn }
    }
}

impl std::ops::Mul<u32> for &BigNumber {
    type Output = BigNumber;
    fn mul(self, rhs: u32) -> BigNumber {
        BigNumber { bn: &self.bn * BigUint::from(rhs) }
    }
}

impl std::ops::Rem for &BigNumber {
    type Output = BigNumber;
    fn rem(self, rhs: &BigNumber) -> BigNumber {
        BigNumber { bn: &self.bn % &rhs.bn }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let mut bn = BigNumber::new();
        assert!(bn.set_hex_str("894B645E89E1535BBDAD5B8B290650530801B18EBFBF5E8FAB3C82872A3E9BB7"));
        assert_eq!(
            bn.as_hex_str(),
            "894B645E89E1535BBDAD5B8B290650530801B18EBFBF5E8FAB3C82872A3E9BB7"
        );
        assert_eq!(bn.num_bytes(), 32);
    }

    #[test]
    fn byte_array_is_little_endian() {
        let bn = BigNumber::from_u32(0x01020304);
        assert_eq!(bn.as_byte_array(4), vec![0x04, 0x03, 0x02, 0x01]);

        let mut parsed = BigNumber::new();
        parsed.set_binary(&[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(parsed.as_u32(), 0x01020304);
    }

    #[test]
    fn byte_array_pads_with_trailing_zeros() {
        let bn = BigNumber::from_u32(7);
        let bytes = bn.as_byte_array(32);
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[0], 7);
        assert!(bytes[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn fixed_bytes_roundtrip() {
        let mut bn = BigNumber::new();
        bn.set_rand(256);
        let fixed: [u8; 32] = bn.to_fixed_bytes();
        assert_eq!(BigNumber::from_binary(&fixed), bn);
    }

    #[test]
    fn mod_exp_small_values() {
        let base = BigNumber::from_u32(4);
        let exp = BigNumber::from_u32(13);
        let modulus = BigNumber::from_u32(497);
        assert_eq!(base.mod_exp(&exp, &modulus).as_u32(), 445);
    }

    #[test]
    fn sub_saturates_at_zero() {
        let a = BigNumber::from_u32(3);
        let b = BigNumber::from_u32(10);
        assert!((&a - &b).is_zero());
    }
}
