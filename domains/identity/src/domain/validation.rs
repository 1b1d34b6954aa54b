//! Identifier normalisation and code-shape validation

use regex::Regex;

lazy_static::lazy_static! {
    /// Pragmatic email shape: one `@`, no whitespace, a dot in the domain
    pub static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();

    /// E.164: leading `+`, no leading zero, 8 to 15 digits
    pub static ref E164_REGEX: Regex = Regex::new(r"^\+[1-9][0-9]{7,14}$").unwrap();
}

/// Maximum stored length of an email identifier
pub const MAX_EMAIL_LENGTH: usize = 320;

/// Where a code is delivered
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Email(String),
    Phone(String),
}

impl Identifier {
    /// Normalise user input: trimmed lower-case email, or E.164 phone number
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("identifier is empty".to_string());
        }

        if trimmed.contains('@') {
            let email = trimmed.to_lowercase();
            if email.len() > MAX_EMAIL_LENGTH || !EMAIL_REGEX.is_match(&email) {
                return Err("identifier is not a valid email address".to_string());
            }
            return Ok(Self::Email(email));
        }

        let phone: String = trimmed
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
            .collect();
        if !E164_REGEX.is_match(&phone) {
            return Err("identifier is not an E.164 phone number".to_string());
        }
        Ok(Self::Phone(phone))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Email(s) | Self::Phone(s) => s,
        }
    }

    pub fn is_email(&self) -> bool {
        matches!(self, Self::Email(_))
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A code can only match if it has exactly `digits` ASCII digits
pub fn is_well_formed_code(code: &str, digits: u32) -> bool {
    code.len() == digits as usize && code.bytes().all(|b| b.is_ascii_digit())
}
