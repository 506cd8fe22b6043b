//! Token encoding for URL query parameters.

/// Longest token prefix ever shown in rendered output or logs.
pub const TOKEN_PREVIEW_MAX_CHARS: usize = 10;

/// Percent-encoding and preview helpers for opaque tokens.
pub struct TokenEncoder;

impl TokenEncoder {
    /// Percent-encode every byte outside the RFC 3986 unreserved set
    /// (`A-Z a-z 0-9 - . _ ~`), so base64 alphabets (`+`, `/`, `=`) survive a
    /// trip through a query string.
    pub fn encode(token: &str) -> String {
        urlencoding::encode(token).into_owned()
    }

    /// Diagnostic prefix of a token.
    ///
    /// At most [`TOKEN_PREVIEW_MAX_CHARS`] characters and never more than half
    /// of the token, so a preview alone is never the secret.
    pub fn preview(token: &str) -> String {
        let len = token.chars().count();
        let shown = TOKEN_PREVIEW_MAX_CHARS.min(len / 2);
        token.chars().take(shown).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(encoded: &str) -> String {
        urlencoding::decode(encoded).unwrap().into_owned()
    }

    #[test]
    fn test_encode_reserved_characters() {
        assert_eq!(TokenEncoder::encode("abc+/123"), "abc%2B%2F123");
        assert_eq!(TokenEncoder::encode("a=b&c?d#e"), "a%3Db%26c%3Fd%23e");
        assert_eq!(TokenEncoder::encode("space here"), "space%20here");
    }

    #[test]
    fn test_encode_leaves_unreserved_alone() {
        let token = "AZaz09-._~";
        assert_eq!(TokenEncoder::encode(token), token);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let tokens = [
            "abc+/123",
            "q8Zr+Xk/9w==",
            "base64url-_token",
            "100% sure?&x=y#frag",
            "ünïcødé/+",
            "",
        ];
        for token in tokens {
            assert_eq!(decode(&TokenEncoder::encode(token)), token);
        }
    }

    #[test]
    fn test_encode_is_injective_on_base64_alphabet() {
        let a = TokenEncoder::encode("ab+c");
        let b = TokenEncoder::encode("ab c");
        let c = TokenEncoder::encode("ab%2Bc");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn test_preview_is_bounded() {
        let token = "0123456789abcdefghijklmnopqrstuvwxyz";
        let preview = TokenEncoder::preview(token);
        assert_eq!(preview, "0123456789");
        assert!(preview.chars().count() <= TOKEN_PREVIEW_MAX_CHARS);
        assert_ne!(preview, token);
    }

    #[test]
    fn test_preview_never_reveals_short_tokens() {
        assert_eq!(TokenEncoder::preview("abcdef"), "abc");
        assert_eq!(TokenEncoder::preview("x"), "");
        assert_eq!(TokenEncoder::preview(""), "");
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(TokenEncoder::preview("ééééé"), "éé");
    }
}
