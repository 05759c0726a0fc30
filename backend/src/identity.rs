//! Identity of the operator running the utility.

use nix::unistd::{getuid, User};
use std::env;
use tracing::debug;

const FALLBACK_VARS: [&str; 2] = ["USER", "LOGNAME"];

/// Login name of the invoking user.
///
/// Looks up the real uid in the password database first, then `$USER` and
/// `$LOGNAME`. Falls back to `"unknown"`; the name is only used in message text.
pub fn operator_identity() -> String {
    match User::from_uid(getuid()) {
        Ok(Some(user)) => return user.name,
        Ok(None) => debug!(uid = getuid().as_raw(), "uid has no passwd entry"),
        Err(e) => debug!("passwd lookup failed: {}", e),
    }
    from_env_vars(|key| env::var(key).ok())
}

fn from_env_vars(lookup: impl Fn(&str) -> Option<String>) -> String {
    FALLBACK_VARS
        .iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
