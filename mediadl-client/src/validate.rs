//! Credential format checks, run before any connection attempt.

use crate::errors::FormatError;

/// API identifier: non-empty, ASCII digits only.
pub fn validate_identifier(s: &str) -> Result<(), FormatError> {
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(FormatError::Identifier)
    }
}

/// API secret: exactly 32 hexadecimal characters, either case.
pub fn validate_secret(s: &str) -> Result<(), FormatError> {
    if s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(FormatError::Secret)
    }
}

/// Phone number: after trimming, an optional `+` then 10 to 15 digits.
pub fn validate_phone(s: &str) -> Result<(), FormatError> {
    let s = s.trim();
    let digits = s.strip_prefix('+').unwrap_or(s);
    if (10..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(FormatError::Phone)
    }
}

// ─── Credentials ──────────────────────────────────────────────────────────────

/// What the user types into the login form.
///
/// Fixed for the lifetime of one login attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    identifier: String,
    secret:     String,
    phone:      String,
}

impl Credentials {
    /// The phone is stored trimmed; the other fields are kept as given.
    pub fn new(
        identifier: impl Into<String>,
        secret:     impl Into<String>,
        phone:      impl AsRef<str>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            secret:     secret.into(),
            phone:      phone.as_ref().trim().to_string(),
        }
    }

    /// Run all three format checks, reporting the first failure.
    pub fn validate(&self) -> Result<(), FormatError> {
        validate_identifier(&self.identifier)?;
        validate_secret(&self.secret)?;
        validate_phone(&self.phone)
    }

    pub fn identifier(&self) -> &str { &self.identifier }
    pub fn secret(&self)     -> &str { &self.secret }
    pub fn phone(&self)      -> &str { &self.phone }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .field("phone", &self.phone)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_rules() {
        assert!(validate_identifier("123456").is_ok());
        assert_eq!(validate_identifier(""), Err(FormatError::Identifier));
        assert_eq!(validate_identifier("12a4"), Err(FormatError::Identifier));
        assert_eq!(validate_identifier(" 123"), Err(FormatError::Identifier));
        assert_eq!(validate_identifier("-12"), Err(FormatError::Identifier));
    }

    #[test]
    fn secret_rules() {
        assert!(validate_secret("0123456789abcdef0123456789abcdef").is_ok());
        assert!(validate_secret("0123456789ABCDEF0123456789ABCDEF").is_ok());
        assert_eq!(validate_secret("0123456789abcdef0123456789abcde"), Err(FormatError::Secret));
        assert_eq!(validate_secret("0123456789abcdef0123456789abcdef0"), Err(FormatError::Secret));
        assert_eq!(validate_secret("g123456789abcdef0123456789abcdef"), Err(FormatError::Secret));
    }

    #[test]
    fn phone_rules() {
        assert!(validate_phone("+1234567890").is_ok());
        assert!(validate_phone("1234567890").is_ok());
        assert!(validate_phone("  +123456789012345 ").is_ok());
        assert_eq!(validate_phone("+123456789"), Err(FormatError::Phone));
        assert_eq!(validate_phone("+1234567890123456"), Err(FormatError::Phone));
        assert_eq!(validate_phone("++1234567890"), Err(FormatError::Phone));
        assert_eq!(validate_phone("+1 234 567 890"), Err(FormatError::Phone));
        assert_eq!(validate_phone(""), Err(FormatError::Phone));
    }

    #[test]
    fn credentials_report_first_failure() {
        let c = Credentials::new("abc", "nothex", "12");
        assert_eq!(c.validate(), Err(FormatError::Identifier));
        let c = Credentials::new("1", "nothex", "12");
        assert_eq!(c.validate(), Err(FormatError::Secret));
        let c = Credentials::new("1", "0123456789abcdef0123456789abcdef", "12");
        assert_eq!(c.validate(), Err(FormatError::Phone));
    }

    #[test]
    fn credentials_trim_phone_and_hide_secret() {
        let c = Credentials::new("1", "0123456789abcdef0123456789abcdef", " +1234567890 ");
        assert_eq!(c.phone(), "+1234567890");
        assert!(c.validate().is_ok());
        assert!(!format!("{c:?}").contains("0123456789abcdef"));
    }
}
