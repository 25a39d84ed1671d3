//! Secret references in configuration values.
//!
//! - `pass::path/in/store`: first line of `pass show path/in/store`
//! - `env::VAR_NAME`: `$VAR_NAME`
//! - anything else: the value itself

use crate::error::{ClientError, ClientResult};

/// Where a configured value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretRef<'a> {
    /// Entry in the `pass` store.
    Pass(&'a str),
    /// Environment variable.
    Env(&'a str),
    /// Plain text.
    Plain(&'a str),
}

impl<'a> SecretRef<'a> {
    /// Parses the prefix of `value`.
    pub fn parse(value: &'a str) -> Self {
        if let Some(path) = value.strip_prefix("pass::") {
            Self::Pass(path)
        } else if let Some(var) = value.strip_prefix("env::") {
            Self::Env(var)
        } else {
            Self::Plain(value)
        }
    }

    /// Returns the secret.
    pub fn resolve(self) -> ClientResult<String> {
        match self {
            Self::Pass(path) => resolve_pass(path),
            Self::Env(var) => std::env::var(var).map_err(|_| {
                ClientError::Config(format!("environment variable `{}` is not set", var))
            }),
            Self::Plain(value) => Ok(value.to_string()),
        }
    }
}

/// Resolves a value that may be a secret reference.
pub fn resolve(value: &str) -> ClientResult<String> {
    SecretRef::parse(value).resolve()
}

fn resolve_pass(path: &str) -> ClientResult<String> {
    let output = std::process::Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| ClientError::Config(format!("failed to run `pass show {}`: {}", path, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ClientError::Config(format!(
            "`pass show {}` failed ({}): {}",
            path,
            output.status,
            stderr.trim()
        )));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| ClientError::Config(format!("`pass show {}` produced no output", path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_prefixes() {
        assert_eq!(SecretRef::parse("pass::natsrpc/alice"), SecretRef::Pass("natsrpc/alice"));
        assert_eq!(SecretRef::parse("env::PASSCODE"), SecretRef::Env("PASSCODE"));
        assert_eq!(SecretRef::parse("alice"), SecretRef::Plain("alice"));
        assert_eq!(SecretRef::parse("env:x"), SecretRef::Plain("env:x"));
    }

    #[test]
    fn plain_text_passthrough() {
        assert_eq!(resolve("g9BKjHkk0T0").unwrap(), "g9BKjHkk0T0");
        assert_eq!(resolve("").unwrap(), "");
    }

    #[test]
    fn env_reference_resolves() {
        unsafe {
            std::env::set_var("_NATSRPC_TEST_SECRET", "my-secret-value");
        }
        assert_eq!(resolve("env::_NATSRPC_TEST_SECRET").unwrap(), "my-secret-value");
        unsafe {
            std::env::remove_var("_NATSRPC_TEST_SECRET");
        }
    }

    #[test]
    fn missing_env_var_errors() {
        let err = resolve("env::_NATSRPC_NONEXISTENT_VAR_12345").unwrap_err();
        assert!(err.to_string().contains("not set"));
    }

    #[test]
    fn missing_pass_entry_errors() {
        assert!(resolve("pass::nonexistent/entry/that/should/not/exist/12345").is_err());
    }
}
