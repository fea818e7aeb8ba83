//! Store key derivation.

/// Delimiter between the prefix, path and identity components.
const DELIMITER: char = '|';

/// A key that uniquely identifies the limiting record of one client on one route.
///
/// Format: `{prefix}|{path}|{identity}`. The path component has `%` and `|`
/// percent-escaped, so the first delimiter after the prefix always ends the
/// path and distinct (path, identity) pairs never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Derive the key for a normalized path and a client identity.
    pub fn derive(prefix: &str, path: &str, identity: &str) -> Self {
        let mut key = String::with_capacity(prefix.len() + path.len() + identity.len() + 2);
        key.push_str(prefix);
        key.push(DELIMITER);
        for ch in path.chars() {
            match ch {
                '%' => key.push_str("%25"),
                DELIMITER => key.push_str("%7C"),
                other => key.push(other),
            }
        }
        key.push(DELIMITER);
        key.push_str(identity);
        Self(key)
    }

    /// The key as stored.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip every leading and trailing `/` from a request path.
pub fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let key = ClientKey::derive("ipLimiter", "api/login", "10.0.0.1");
        assert_eq!(key.as_str(), "ipLimiter|api/login|10.0.0.1");
        assert_eq!(key.to_string(), "ipLimiter|api/login|10.0.0.1");
    }

    #[test]
    fn test_key_is_deterministic() {
        let key1 = ClientKey::derive("p", "login", "::1");
        let key2 = ClientKey::derive("p", "login", "::1");
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_delimiter_in_path_does_not_collide() {
        // Without escaping both would read "p|a|b|c".
        let key1 = ClientKey::derive("p", "a|b", "c");
        let key2 = ClientKey::derive("p", "a", "b|c");
        assert_ne!(key1, key2);
        assert_eq!(key1.as_str(), "p|a%7Cb|c");
    }

    #[test]
    fn test_escape_sequence_in_path_does_not_collide() {
        let key1 = ClientKey::derive("p", "a%7Cb", "c");
        let key2 = ClientKey::derive("p", "a|b", "c");
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_different_routes_have_separate_keys() {
        let key1 = ClientKey::derive("p", "login", "10.0.0.1");
        let key2 = ClientKey::derive("p", "signup", "10.0.0.1");
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/api/login/"), "api/login");
        assert_eq!(normalize_path("///api//login///"), "api//login");
        assert_eq!(normalize_path("/"), "");
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path("login"), "login");
    }
}
