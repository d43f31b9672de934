//! Random token generation
//!
//! Tokens are drawn one character at a time: a random prime whose bit length
//! equals the alphabet size is generated, and `prime % alphabet.len()` picks
//! the character. The default source is the thread-local CSPRNG seeded from
//! the operating system; any [`RngCore`] can be injected for deterministic tests.

use rand::RngCore;

/// Characters a token may contain.
pub const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_";

/// Length of tokens used for renamed uploads.
pub const FILE_TOKEN_LEN: usize = 32;

/// Generate a random token of exactly `len` characters.
pub fn random_token(len: usize) -> String {
    random_token_with(&mut rand::rng(), len)
}

/// Generate a random token of exactly `len` characters from `rng`.
pub fn random_token_with<R: RngCore + ?Sized>(rng: &mut R, len: usize) -> String {
    let alphabet_len = TOKEN_ALPHABET.len() as u64;
    (0..len)
        .map(|_| {
            let p = random_prime(rng, TOKEN_ALPHABET.len() as u32);
            TOKEN_ALPHABET[(p % alphabet_len) as usize] as char
        })
        .collect()
}

/// Generate a random prime of exactly `bits` bits.
///
/// The two most significant bits are always set. `bits` is clamped to `2..=64`.
pub fn random_prime<R: RngCore + ?Sized>(rng: &mut R, bits: u32) -> u64 {
    let bits = bits.clamp(2, 64);
    let value_mask = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
    let top_bits = 0b11u64 << (bits - 2);

    loop {
        let candidate = (rng.next_u64() & value_mask) | top_bits | 1;
        if is_prime(candidate) {
            return candidate;
        }
    }
}

/// Deterministic Miller-Rabin for the full `u64` range.
pub fn is_prime(n: u64) -> bool {
    const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

    if n < 2 {
        return false;
    }
    for &p in &WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for &a in &WITNESSES {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn pow_mod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut result = 1;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, m);
        }
        base = mul_mod(base, base, m);
        exp >>= 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_token_length() {
        for n in [0, 1, 10, FILE_TOKEN_LEN, 100] {
            assert_eq!(random_token(n).len(), n);
        }
    }

    #[test]
    fn test_token_alphabet() {
        let token = random_token(500);
        assert!(token.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_tokens_are_distinct() {
        let tokens: HashSet<String> = (0..1000).map(|_| random_token(10)).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let a = random_token_with(&mut StdRng::seed_from_u64(7), 16);
        let b = random_token_with(&mut StdRng::seed_from_u64(7), 16);
        assert_eq!(a, b);
    }

    #[test]
    fn test_alphabet_size() {
        assert_eq!(TOKEN_ALPHABET.len(), 63);
    }

    #[test]
    fn test_random_prime_bit_length() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let p = random_prime(&mut rng, 63);
            assert_eq!(64 - p.leading_zeros(), 63);
            assert!(is_prime(p));
        }
    }

    #[test]
    fn test_is_prime() {
        let primes = [2, 3, 5, 37, 41, 7919, 2_147_483_647, 18_446_744_073_709_551_557];
        for p in primes {
            assert!(is_prime(p), "{} should be prime", p);
        }
        let composites = [0, 1, 4, 9, 561, 1_373_653, 3_215_031_751, 18_446_744_073_709_551_615];
        for c in composites {
            assert!(!is_prime(c), "{} should not be prime", c);
        }
    }
}
