use crate::config::DurationPolicy;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Longest accepted fingerprint, in characters.
pub const MAX_FINGERPRINT_LEN: usize = 8192;
/// Longest accepted identity field, in characters.
pub const MAX_IDENTITY_FIELD_LEN: usize = 256;

/// Request fields exactly as the caller supplied them.
///
/// Nothing here is trusted. There is no duration field: the
/// validity period comes from the server's [`DurationPolicy`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawLicenseRequest {
    pub fingerprint: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
}

impl RawLicenseRequest {
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: Some(fingerprint.into()),
            ..Self::default()
        }
    }

    /// Trimmed fingerprint for audit copies of rejected requests.
    pub fn fingerprint_for_audit(&self) -> String {
        audit_copy(self.fingerprint.as_deref(), MAX_FINGERPRINT_LEN)
    }
}

/// Who asked for a license.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterIdentity {
    pub first_name: String,
    pub last_name: String,
    pub title: String,
    pub company: String,
    pub email: String,
}

impl RequesterIdentity {
    /// Copies the raw identity for the audit trail without validating it.
    ///
    /// Fields are trimmed and truncated, otherwise kept literally.
    pub fn for_audit(raw: &RawLicenseRequest) -> Self {
        Self {
            first_name: audit_copy(raw.first_name.as_deref(), MAX_IDENTITY_FIELD_LEN),
            last_name: audit_copy(raw.last_name.as_deref(), MAX_IDENTITY_FIELD_LEN),
            title: audit_copy(raw.title.as_deref(), MAX_IDENTITY_FIELD_LEN),
            company: audit_copy(raw.company.as_deref(), MAX_IDENTITY_FIELD_LEN),
            email: audit_copy(raw.email.as_deref(), MAX_IDENTITY_FIELD_LEN),
        }
    }

    /// Copy of every field escaped for embedding in HTML markup.
    pub fn html_escaped(&self) -> Self {
        Self {
            first_name: escape_html(&self.first_name),
            last_name: escape_html(&self.last_name),
            title: escape_html(&self.title),
            company: escape_html(&self.company),
            email: escape_html(&self.email),
        }
    }
}

/// A request that passed validation and is ready for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRequest {
    pub fingerprint: String,
    pub duration_days: u32,
    pub identity: RequesterIdentity,
}

/// Turns untrusted request fields into a [`LicenseRequest`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestValidator {
    policy: DurationPolicy,
}

impl RequestValidator {
    pub fn new(policy: DurationPolicy) -> Self {
        Self { policy }
    }

    pub fn granted_days(&self) -> u32 {
        self.policy.granted_days()
    }

    pub fn validate(&self, raw: &RawLicenseRequest) -> Result<LicenseRequest, ValidationError> {
        let fingerprint = raw.fingerprint.as_deref().map(str::trim).unwrap_or_default();
        if fingerprint.is_empty() {
            return Err(ValidationError::MissingFingerprint);
        }
        check_fingerprint(fingerprint)?;

        let identity = RequesterIdentity {
            first_name: identity_field("first_name", raw.first_name.as_deref())?,
            last_name: identity_field("last_name", raw.last_name.as_deref())?,
            title: identity_field("title", raw.title.as_deref())?,
            company: identity_field("company", raw.company.as_deref())?,
            email: identity_field("email", raw.email.as_deref())?,
        };

        Ok(LicenseRequest {
            fingerprint: fingerprint.to_string(),
            duration_days: self.policy.granted_days(),
            identity,
        })
    }
}

// The fingerprint becomes a process argument; only a base64/hex-like
// alphabet is let through.
fn check_fingerprint(fingerprint: &str) -> Result<(), ValidationError> {
    if fingerprint.chars().count() > MAX_FINGERPRINT_LEN {
        return Err(ValidationError::UnsafeInput {
            field: "fingerprint",
            reason: format!("longer than {MAX_FINGERPRINT_LEN} characters"),
        });
    }
    if let Some(c) = fingerprint.chars().find(|c| !is_fingerprint_char(*c)) {
        return Err(ValidationError::UnsafeInput {
            field: "fingerprint",
            reason: format!("character {c:?} is not allowed"),
        });
    }
    Ok(())
}

fn is_fingerprint_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '-' | '_' | '.' | ':')
}

fn identity_field(field: &'static str, value: Option<&str>) -> Result<String, ValidationError> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.chars().count() > MAX_IDENTITY_FIELD_LEN {
        return Err(ValidationError::UnsafeInput {
            field,
            reason: format!("longer than {MAX_IDENTITY_FIELD_LEN} characters"),
        });
    }
    if value.chars().any(char::is_control) {
        return Err(ValidationError::UnsafeInput {
            field,
            reason: "contains control characters".to_string(),
        });
    }
    Ok(value.to_string())
}

fn audit_copy(value: Option<&str>, max_len: usize) -> String {
    value
        .map(str::trim)
        .unwrap_or_default()
        .chars()
        .take(max_len)
        .collect()
}

/// Escapes the five characters that are significant in HTML text and
/// attribute values.
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> RequestValidator {
        RequestValidator::new(DurationPolicy::default())
    }

    #[test]
    fn test_valid_request_gets_policy_duration() {
        let mut raw = RawLicenseRequest::new("  QUJD+ZGVm/Z2hp=  ");
        raw.first_name = Some(" Ada ".to_string());
        raw.email = Some("ada@example.com".to_string());

        let request = validator().validate(&raw).unwrap();
        assert_eq!(request.fingerprint, "QUJD+ZGVm/Z2hp=");
        assert_eq!(request.duration_days, 60);
        assert_eq!(request.identity.first_name, "Ada");
        assert_eq!(request.identity.email, "ada@example.com");
        assert_eq!(request.identity.company, "");
    }

    #[test]
    fn test_missing_or_blank_fingerprint() {
        let missing = RawLicenseRequest::default();
        assert_eq!(
            validator().validate(&missing),
            Err(ValidationError::MissingFingerprint)
        );

        let blank = RawLicenseRequest::new("   ");
        assert_eq!(
            validator().validate(&blank),
            Err(ValidationError::MissingFingerprint)
        );
    }

    #[test]
    fn test_fingerprint_rejects_shell_metacharacters() {
        for fingerprint in ["abc; rm -rf /", "abc def", "$(id)", "a`b`", "a|b", "a\0b", "a'b"] {
            let result = validator().validate(&RawLicenseRequest::new(fingerprint));
            assert!(
                matches!(
                    result,
                    Err(ValidationError::UnsafeInput {
                        field: "fingerprint",
                        ..
                    })
                ),
                "{fingerprint:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_identity_keeps_sql_metacharacters_literally() {
        let mut raw = RawLicenseRequest::new("abc");
        raw.company = Some("'; DROP TABLE requests; --".to_string());

        let request = validator().validate(&raw).unwrap();
        assert_eq!(request.identity.company, "'; DROP TABLE requests; --");
    }

    #[test]
    fn test_identity_rejects_control_characters_and_oversized_fields() {
        let mut raw = RawLicenseRequest::new("abc");
        raw.last_name = Some("Smith\r\nX-Injected: 1".to_string());
        assert!(matches!(
            validator().validate(&raw),
            Err(ValidationError::UnsafeInput {
                field: "last_name",
                ..
            })
        ));

        let mut raw = RawLicenseRequest::new("abc");
        raw.title = Some("x".repeat(MAX_IDENTITY_FIELD_LEN + 1));
        assert!(matches!(
            validator().validate(&raw),
            Err(ValidationError::UnsafeInput { field: "title", .. })
        ));
    }

    #[test]
    fn test_html_escaping() {
        let identity = RequesterIdentity {
            first_name: "<script>alert('x')</script>".to_string(),
            company: "Smith & \"Sons\"".to_string(),
            ..RequesterIdentity::default()
        };
        let escaped = identity.html_escaped();
        assert_eq!(
            escaped.first_name,
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"
        );
        assert_eq!(escaped.company, "Smith &amp; &quot;Sons&quot;");
    }

    #[test]
    fn test_audit_copy_truncates() {
        let mut raw = RawLicenseRequest::new(" fp ");
        raw.email = Some("e".repeat(MAX_IDENTITY_FIELD_LEN * 2));
        let identity = RequesterIdentity::for_audit(&raw);
        assert_eq!(identity.email.len(), MAX_IDENTITY_FIELD_LEN);
        assert_eq!(raw.fingerprint_for_audit(), "fp");
    }
}
