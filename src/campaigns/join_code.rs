//! Short codes players type in to join a campaign.

use rand::Rng;

/// No `0`, `O`, `1` or `I`, which read alike.
pub const ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const LEN: usize = 5;

pub fn generate(rng: &mut impl Rng) -> String {
    (0..LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// What the user typed, in the form codes are stored in.
pub fn normalize(input: &str) -> String {
    input.trim().to_uppercase()
}

pub fn is_valid(code: &str) -> bool {
    code.len() == LEN && code.bytes().all(|b| ALPHABET.contains(&b))
}
