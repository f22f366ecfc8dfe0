//! Process-wide runtime configuration.
//!
//! Toggles are read once through an environment lookup function that is supplied by the caller (or by
//! [`Configuration::from_environment`], which uses the process environment), and the resulting [`Configuration`]
//! is then handed to [`Client::new`](crate::Client::new). Nothing in this crate reads environment variables on its
//! own, which keeps every component testable with a fake lookup.

use crate::Error;

/// Name of the environment variable that enables the alternate lowering path.
pub const USE_ALTERNATE_LOWERING_VARIABLE: &str = "VELA_USE_ALTERNATE_LOWERING";

/// Runtime configuration of a [`Client`](crate::Client).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Configuration {
    /// If `true`, programs are lowered using the alternate lowering path before being handed to the compiler.
    pub use_alternate_lowering: bool,
}

impl Configuration {
    /// Creates a new [`Configuration`] by reading every toggle through `lookup`, which maps an environment variable
    /// name to its value (or to [`None`] if the variable is not set).
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, Error> {
        Ok(Self { use_alternate_lowering: read_flag(&lookup, USE_ALTERNATE_LOWERING_VARIABLE)? })
    }

    /// Creates a new [`Configuration`] from the environment of the current process.
    pub fn from_environment() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

/// Reads a boolean flag named `name` through `lookup`. Unset variables are `false`. Set variables are compared
/// case-insensitively (after trimming whitespace) against `1`, `true`, `yes`, and `on` for `true`, and against `0`,
/// `false`, `no`, `off`, and the empty string for `false`. Any other value results in an
/// [`Error::InvalidArgument`].
pub fn read_flag<F: Fn(&str) -> Option<String>>(lookup: F, name: &str) -> Result<bool, Error> {
    let Some(value) = lookup(name) else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::invalid_argument(format!(
            "invalid value for boolean environment variable '{name}': '{value}'",
        ))),
    }
}
