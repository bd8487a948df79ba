//! Bearer credential strings.

use std::fmt;

/// Size of a credential in bytes before hex encoding (256 bits)
pub const TOKEN_SIZE: usize = 32;

/// A random single-use bearer credential, hex encoded.
///
/// `Debug` is redacted so a token never ends up in a log line by accident.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    /// Generate a fresh token from the OS RNG.
    pub fn generate() -> Self {
        let mut buff = [0u8; TOKEN_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Self(hex::encode(buff))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// Compare a presented secret against the configured one without
/// short-circuiting on the first differing byte.
pub fn secret_matches(expected: &str, presented: &str) -> bool {
    let expected = expected.as_bytes();
    let presented = presented.as_bytes();
    if expected.len() != presented.len() {
        return false;
    }
    expected
        .iter()
        .zip(presented)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
