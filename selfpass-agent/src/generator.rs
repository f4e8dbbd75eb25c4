use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SelfpassError};

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const NUMBERS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!@#$%^&*()-_=+[]{};:,.<>/?~";

pub const MAX_PASSWORD_LENGTH: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordOptions {
    pub length: usize,
    pub letters: bool,
    pub numbers: bool,
    pub special: bool,
}

impl Default for PasswordOptions {
    fn default() -> Self {
        Self {
            length: 12,
            letters: true,
            numbers: true,
            special: true,
        }
    }
}

impl PasswordOptions {
    fn alphabet(&self) -> Vec<u8> {
        let mut alphabet = Vec::new();
        if self.letters {
            alphabet.extend_from_slice(LETTERS);
        }
        if self.numbers {
            alphabet.extend_from_slice(NUMBERS);
        }
        if self.special {
            alphabet.extend_from_slice(SPECIAL);
        }
        alphabet
    }
}

/// Draw `length` characters uniformly from the enabled classes.
pub fn generate_password(options: &PasswordOptions) -> Result<String> {
    if options.length == 0 || options.length > MAX_PASSWORD_LENGTH {
        return Err(SelfpassError::InvalidInput(format!(
            "password length must be between 1 and {}",
            MAX_PASSWORD_LENGTH
        )));
    }
    let alphabet = options.alphabet();
    if alphabet.is_empty() {
        return Err(SelfpassError::InvalidInput(
            "at least one character class must be enabled".into(),
        ));
    }

    let mut rng = rand::rng();
    let password = (0..options.length)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect();
    Ok(password)
}
