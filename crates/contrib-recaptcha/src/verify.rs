//! Calls to the verify endpoint.

use jiff::Timestamp;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{RecaptchaError, RecaptchaResult, TRACING_TARGET_RECAPTCHA};

/// Body returned by the verify endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyResponse {
    /// Whether the response was valid for this site.
    pub success: bool,
    /// When the challenge was solved.
    pub challenge_ts: Option<Timestamp>,
    /// Host name of the site the challenge was solved on.
    pub hostname: Option<String>,
    /// Score for v3 keys, from 0.0 (likely a bot) to 1.0.
    pub score: Option<f64>,
    /// Action name for v3 keys.
    pub action: Option<String>,
    /// Failure codes.
    #[serde(rename = "error-codes")]
    pub error_codes: Vec<String>,
}

/// Posts `secret` and `response` to `url` and decodes the answer.
pub(crate) async fn site_verify(
    http: &Client,
    url: &str,
    secret: &str,
    response: &str,
) -> RecaptchaResult<VerifyResponse> {
    tracing::debug!(
        target: TRACING_TARGET_RECAPTCHA,
        url = %url,
        "Verifying captcha response"
    );

    let body = http
        .post(url)
        .form(&[("secret", secret), ("response", response)])
        .send()
        .await?
        .bytes()
        .await?;

    let verified: VerifyResponse = serde_json::from_slice(&body)?;

    if !verified.success {
        tracing::debug!(
            target: TRACING_TARGET_RECAPTCHA,
            error_codes = ?verified.error_codes,
            "Captcha response rejected"
        );
        return Err(RecaptchaError::VerificationFailed {
            error_codes: verified.error_codes,
        });
    }

    tracing::debug!(
        target: TRACING_TARGET_RECAPTCHA,
        hostname = ?verified.hostname,
        "Captcha response verified"
    );

    Ok(verified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode() -> anyhow::Result<()> {
        let body = r#"{
            "success": true,
            "challenge_ts": "2024-03-01T10:20:30Z",
            "hostname": "contrib.dev",
            "error-codes": []
        }"#;

        let response: VerifyResponse = serde_json::from_str(body)?;
        assert!(response.success);
        assert_eq!(response.hostname.as_deref(), Some("contrib.dev"));
        assert_eq!(
            response.challenge_ts.map(|ts| ts.as_second()),
            Some("2024-03-01T10:20:30Z".parse::<Timestamp>()?.as_second())
        );
        Ok(())
    }

    #[test]
    fn test_decode_failure_codes() -> anyhow::Result<()> {
        let body = r#"{"success": false, "error-codes": ["timeout-or-duplicate"]}"#;

        let response: VerifyResponse = serde_json::from_str(body)?;
        assert!(!response.success);
        assert_eq!(response.error_codes, vec!["timeout-or-duplicate"]);
        assert_eq!(response.challenge_ts, None);
        Ok(())
    }
}
