use secrecy::SecretString;

/// Reads an optional credential from the environment.
///
/// Unset and empty variables both yield `None`, so a blank `GITHUB_TOKEN=`
/// line in a `.env` file means "no credentials" rather than an empty bearer token.
pub fn get_secret_env_var(name: &str) -> Option<SecretString> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(SecretString::from(v)),
        _ => None,
    }
}
