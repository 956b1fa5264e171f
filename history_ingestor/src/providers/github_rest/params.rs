use chrono::{DateTime, SecondsFormat, Utc};

use crate::providers::{ProviderError, ValidationSnafu};

/// Largest `per_page` GitHub accepts on the commits endpoint.
pub const MAX_PAGE_SIZE: u8 = 100;

/// Rejects page sizes GitHub would silently clamp.
pub fn validate_page_size(page_size: u8) -> Result<(), ProviderError> {
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return ValidationSnafu {
            message: format!("page size must be within 1..={MAX_PAGE_SIZE}, got {page_size}"),
        }
        .fail();
    }
    Ok(())
}

/// Query string for `GET /repos/{owner}/{repo}/commits`.
pub fn construct_params(
    branch: &str,
    before: DateTime<Utc>,
    page_size: u8,
) -> Vec<(String, String)> {
    vec![
        ("sha".to_string(), branch.to_string()),
        (
            "until".to_string(),
            before.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        ("per_page".to_string(), page_size.to_string()),
    ]
}
