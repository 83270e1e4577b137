//! Environment variable utilities
//!
//! Typed lookups with defaults, used by configuration layers.
//!
//! ```ignore
//! use netlane_core::env::{env_get, env_get_str};
//!
//! let acceptors: usize = env_get("NETLANE_ACCEPTORS", 1);
//! let addr = env_get_str("NETLANE_LISTEN_ADDR", "0.0.0.0:8080");
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
///
/// Unset and unparsable values both fall back to `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as optional value
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as string, or return default
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__NETLANE_UNSET_VAR__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_opt_none() {
        let val: Option<i64> = env_get_opt("__NETLANE_UNSET_VAR__");
        assert!(val.is_none());
    }

    #[test]
    fn test_env_get_str_default() {
        assert_eq!(env_get_str("__NETLANE_UNSET_VAR__", "hello"), "hello");
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__NETLANE_TEST_NUM__", " 123 ");
        let val: usize = env_get("__NETLANE_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__NETLANE_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__NETLANE_TEST_INVALID__", "not_a_number");
        let val: usize = env_get("__NETLANE_TEST_INVALID__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__NETLANE_TEST_INVALID__");
    }
}
