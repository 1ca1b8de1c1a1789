//! JSON-Pointer-style token escaping.

/// Decodes one path token. Order matters: `~1` must be expanded before
/// `~0`, otherwise `~01` would incorrectly become `/` instead of `~1`.
#[must_use]
pub fn unescape_token(token: &str) -> String {
    if !token.contains('~') {
        return token.to_string();
    }
    token.replace("~1", "/").replace("~0", "~")
}

#[cfg(test)]
mod tests {
    use super::unescape_token;

    #[test]
    fn decodes_slash_then_tilde() {
        assert_eq!(unescape_token("a~1b"), "a/b");
        assert_eq!(unescape_token("a~0b"), "a~b");
        assert_eq!(unescape_token("a~01b"), "a~1b");
    }

    #[test]
    fn leaves_plain_tokens_untouched() {
        assert_eq!(unescape_token("plain"), "plain");
    }
}
