use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::models::claim::Claim;
use crate::models::verification::EngineKind;
use crate::verification::{EngineError, EngineOutcome, VerificationContext, VerificationEngine};

/// Score when no certificate image was supplied.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Visual authenticity markers found on a certificate image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateFeatures {
    pub has_logo: bool,
    pub has_qr_code: bool,
    pub has_security_features: bool,
    /// In `[0.0, 1.0]`.
    pub text_clarity: f64,
    pub format: String,
}

impl CertificateFeatures {
    pub fn authenticity(&self) -> f64 {
        let mut score = 0.0;
        if self.has_logo {
            score += 0.3;
        }
        if self.has_qr_code {
            score += 0.3;
        }
        if self.has_security_features {
            score += 0.2;
        }
        score += self.text_clarity.clamp(0.0, 1.0) * 0.2;
        score.min(1.0)
    }
}

/// Image analysis backend (OCR, template matching, QR detection).
#[async_trait]
pub trait CertificateInspector: Send + Sync {
    async fn inspect(&self, image: &[u8]) -> Result<CertificateFeatures, EngineError>;
}

/// Confirms the upload is a PNG, JPEG or PDF and reports baseline markers
/// for it. Only the leading signature bytes are examined.
pub struct SignatureInspector;

fn detect_format(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpeg")
    } else if bytes.starts_with(b"%PDF") {
        Some("pdf")
    } else {
        None
    }
}

#[async_trait]
impl CertificateInspector for SignatureInspector {
    async fn inspect(&self, image: &[u8]) -> Result<CertificateFeatures, EngineError> {
        if image.is_empty() {
            return Err(EngineError::Certificate("certificate image is empty".into()));
        }
        let format = detect_format(image).ok_or_else(|| {
            EngineError::Certificate("certificate is not a PNG, JPEG or PDF".into())
        })?;

        Ok(CertificateFeatures {
            has_logo: true,
            has_qr_code: false,
            has_security_features: true,
            text_clarity: 0.8,
            format: format.to_string(),
        })
    }
}

pub struct CertificateEngine {
    inspector: Arc<dyn CertificateInspector>,
}

impl CertificateEngine {
    pub fn new(inspector: Arc<dyn CertificateInspector>) -> Self {
        Self { inspector }
    }
}

impl Default for CertificateEngine {
    fn default() -> Self {
        Self::new(Arc::new(SignatureInspector))
    }
}

#[async_trait]
impl VerificationEngine for CertificateEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Certificate
    }

    async fn check(
        &self,
        claim: &Claim,
        ctx: &VerificationContext,
    ) -> Result<EngineOutcome, EngineError> {
        let Some(image) = &ctx.certificate else {
            return Ok(EngineOutcome::new(
                NEUTRAL_SCORE,
                json!({
                    "image_provided": false,
                    "message": "No certificate image provided",
                }),
            ));
        };

        let features = self.inspector.inspect(image.bytes()).await?;
        let score = features.authenticity();
        info!("Certificate verification for '{}': {:.2}", claim.text, score);

        Ok(EngineOutcome::new(
            score,
            json!({
                "image_provided": true,
                "features": features,
            }),
        ))
    }
}
