//! Metadata endpoint resolution

use url::Url;

use super::error::CredentialError;

/// Link-local host serving container credentials
pub const CONTAINER_METADATA_HOST: &str = "http://169.254.170.2";

pub const ENV_RELATIVE_URI: &str = "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI";
pub const ENV_FULL_URI: &str = "AWS_CONTAINER_CREDENTIALS_FULL_URI";

/// Pick the credential endpoint
///
/// Precedence: explicit URL, then the relative URI under the metadata host,
/// then the full URI. `Ok(None)` means none is configured.
pub fn resolve_endpoint(
    explicit: Option<&str>,
    relative_uri: Option<&str>,
    full_uri: Option<&str>,
) -> Result<Option<Url>, CredentialError> {
    let raw = match (non_empty(explicit), non_empty(relative_uri), non_empty(full_uri)) {
        (Some(url), _, _) => url.to_string(),
        (None, Some(relative), _) => {
            let relative = relative.trim_start_matches('/');
            format!("{CONTAINER_METADATA_HOST}/{relative}")
        }
        (None, None, Some(full)) => full.to_string(),
        (None, None, None) => return Ok(None),
    };

    let url = Url::parse(&raw).map_err(|e| CredentialError::InvalidEndpoint(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(Some(url)),
        other => Err(CredentialError::InvalidEndpoint(format!(
            "{raw}: unsupported scheme {other}"
        ))),
    }
}

/// Resolve from the process environment
pub fn endpoint_from_env(explicit: Option<&str>) -> Result<Option<Url>, CredentialError> {
    let relative = std::env::var(ENV_RELATIVE_URI).ok();
    let full = std::env::var(ENV_FULL_URI).ok();
    resolve_endpoint(explicit, relative.as_deref(), full.as_deref())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
