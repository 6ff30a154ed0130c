//! Constant-time token comparison, security response headers, and path/URL
//! validation helpers shared across the Command API and Stream hub.

use std::path::{Path, PathBuf};

use axum::http::HeaderValue;
use subtle::ConstantTimeEq;
use tower_http::set_header::SetResponseHeaderLayer;
use url::Url;

/// Compare a presented token against the instance's token in constant time.
///
/// Never short-circuits on length or byte mismatch; always inspects every
/// byte of the shorter representation via `subtle`. Returns `false`
/// immediately only on a length mismatch (acceptable: token length is not
/// secret, only its content is).
pub fn tokens_match(presented: &str, expected: &str) -> bool {
    let presented = presented.as_bytes();
    let expected = expected.as_bytes();
    if presented.len() != expected.len() {
        return false;
    }
    presented.ct_eq(expected).into()
}

/// Generate a fresh ≥256-bit hex-encoded auth token.
pub fn generate_auth_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Security headers applied to every HTTP response: frame-deny, no-sniff,
/// a strict referrer policy, and a same-origin content-security-policy that
/// additionally permits WebSocket upgrades to the same host.
pub fn security_header_layers() -> Vec<SetResponseHeaderLayer<HeaderValue>> {
    vec![
        SetResponseHeaderLayer::if_not_present(
            axum::http::header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ),
        SetResponseHeaderLayer::if_not_present(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ),
        SetResponseHeaderLayer::if_not_present(
            axum::http::header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ),
        SetResponseHeaderLayer::if_not_present(
            axum::http::HeaderName::from_static("content-security-policy"),
            HeaderValue::from_static(
                "default-src 'self'; script-src 'self'; connect-src 'self' ws: wss:",
            ),
        ),
    ]
}

/// Reject any resolved path that escapes `root`.
///
/// Compares a lexically-cleaned absolute form of `candidate` against `root`;
/// does not resolve symlinks (a known limitation — symlink traversal outside
/// the workspace is not detected here and must be prevented by not placing
/// untrusted symlinks inside the workspace).
pub fn validate_workspace_path(root: &Path, candidate: &Path) -> Result<PathBuf, String> {
    let root = lexically_absolute(root);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let cleaned = lexically_absolute(&joined);

    if cleaned.starts_with(&root) {
        Ok(cleaned)
    } else {
        Err(format!(
            "path {} escapes workspace root {}",
            cleaned.display(),
            root.display()
        ))
    }
}

/// Lexically clean `.`/`..` components without touching the filesystem
/// (no symlink resolution — see [`validate_workspace_path`]'s caveat).
fn lexically_absolute(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Validate that a URL string has scheme exactly `http` or `https`, using a
/// real URL parser rather than a regex.
pub fn validate_http_url(raw: &str) -> Result<(), String> {
    let parsed = Url::parse(raw).map_err(|e| format!("invalid URL: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("URL scheme must be http or https, got {other}")),
    }
}

/// Reject strings containing control bytes or NUL characters (used for
/// attachment titles/keys).
pub fn reject_control_bytes(s: &str) -> Result<(), String> {
    if s.chars().any(|c| c.is_control()) {
        Err("value must not contain control characters".to_string())
    } else {
        Ok(())
    }
}
