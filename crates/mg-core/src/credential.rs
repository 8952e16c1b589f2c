//! Tunnel credential classification
//!
//! Operators supply the outbound tunnel credential as one opaque
//! string; its shape decides how the tunnel client is launched.

/// Marker substring identifying a structured tunnel credential
const TUNNEL_FILE_MARKER: &str = "TunnelSecret";

/// Length bounds for a registered tunnel token
const TOKEN_MIN_LEN: usize = 120;
const TOKEN_MAX_LEN: usize = 250;

/// The form of an operator-supplied tunnel credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialForm {
    /// No credential supplied; an ephemeral quick tunnel is requested
    Absent,
    /// A registered tunnel token, passed directly on the command line
    Token,
    /// A structured credential blob, written to side files before launch
    TunnelFile,
    /// Non-empty but not a recognized shape; treated like `Absent`
    Unrecognized,
}

impl CredentialForm {
    /// Whether this form launches an ephemeral quick tunnel
    pub fn is_quick(self) -> bool {
        matches!(self, CredentialForm::Absent | CredentialForm::Unrecognized)
    }
}

/// Classify a raw credential string.
///
/// Total and deterministic: every input maps to exactly one form, and
/// unmatched non-empty strings fall back to `Unrecognized` rather than
/// erroring.
pub fn classify(raw: &str) -> CredentialForm {
    if raw.is_empty() {
        return CredentialForm::Absent;
    }
    if is_token(raw) {
        return CredentialForm::Token;
    }
    if raw.contains(TUNNEL_FILE_MARKER) {
        return CredentialForm::TunnelFile;
    }
    CredentialForm::Unrecognized
}

/// A token is 120-250 characters drawn from `[A-Za-z0-9=]`
fn is_token(raw: &str) -> bool {
    (TOKEN_MIN_LEN..=TOKEN_MAX_LEN).contains(&raw.len())
        && raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'=')
}
