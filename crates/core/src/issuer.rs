//! Identifier issuance.
//!
//! The generation service is remote and owns uniqueness. Issuance only happens on the no-match
//! path, after matching, immediately before the record write. An identifier whose write then
//! fails is dropped, never handed out again by this process; the retry asks for a new one.

use async_trait::async_trait;
use register_ids::Trn;
use std::sync::Arc;

use crate::{RegisterError, RegisterResult};

/// The remote identifier generation service.
#[async_trait]
pub trait IdentifierIssuer: Send + Sync {
    /// Mints a fresh identifier. The raw value is checked by [`IssuerClient`].
    async fn issue(&self) -> RegisterResult<String>;
}

#[derive(Clone)]
pub struct IssuerClient {
    issuer: Arc<dyn IdentifierIssuer>,
}

impl IssuerClient {
    pub fn new(issuer: Arc<dyn IdentifierIssuer>) -> Self {
        Self { issuer }
    }

    /// Issues one identifier.
    ///
    /// # Errors
    ///
    /// `UpstreamUnavailable` if the service fails or answers with something that is not an
    /// identifier.
    pub async fn issue(&self) -> RegisterResult<Trn> {
        let raw = self.issuer.issue().await?;
        if raw.trim().is_empty() {
            return Err(RegisterError::UpstreamUnavailable(
                "identifier service returned an empty identifier".into(),
            ));
        }
        Trn::parse(&raw).map_err(|e| {
            RegisterError::UpstreamUnavailable(format!(
                "identifier service returned a malformed identifier: {e}"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl IdentifierIssuer for Fixed {
        async fn issue(&self) -> RegisterResult<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_issue_accepts_well_formed_identifier() {
        let client = IssuerClient::new(Arc::new(Fixed("1000042")));
        assert_eq!(client.issue().await.unwrap().as_str(), "1000042");
    }

    #[tokio::test]
    async fn test_issue_rejects_empty_identifier() {
        let client = IssuerClient::new(Arc::new(Fixed("   ")));
        let err = client.issue().await.unwrap_err();
        assert!(matches!(err, RegisterError::UpstreamUnavailable(msg) if msg.contains("empty")));
    }

    #[tokio::test]
    async fn test_issue_rejects_malformed_identifier() {
        let client = IssuerClient::new(Arc::new(Fixed("TRN-1")));
        assert!(client.issue().await.is_err());
    }
}
