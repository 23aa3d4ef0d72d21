use std::fmt;

/// Capability issued by the arbiter for one (host, path, method).
///
/// Opaque to the client. Never printed: `Debug` is redacted and there is no
/// `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_does_not_leak_value() {
        let token = Token::new("macaroon-secret");
        let dbg = format!("{:?}", token);
        assert!(!dbg.contains("macaroon-secret"));
        assert_eq!(dbg, "Token(<redacted>)");
    }

    #[test]
    fn as_str_returns_value_verbatim() {
        assert_eq!(Token::new(" abc \n").as_str(), " abc \n");
    }
}
