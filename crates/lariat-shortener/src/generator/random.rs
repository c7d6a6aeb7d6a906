use rand::Rng;

use crate::generator::Generator;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Fixed length of every generated id.
pub const ID_LENGTH: usize = 10;

/// Uniformly random fixed-length ids over a 52-letter alphabet.
///
/// No uniqueness guarantee: with 52^10 possible ids true collisions are
/// vanishingly rare, and the resolution loop retries when one happens.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomGenerator;

impl RandomGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Generator for RandomGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::rng();
        (0..ID_LENGTH)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect()
    }
}
