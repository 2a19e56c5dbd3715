//! Approval tokens
//!
//! A token binds an approver to one recommendation and correlation id until
//! an expiry. The digest is SHA-256 over a per-engine secret and the bound
//! fields, so a token cannot be replayed against another recommendation.

use crate::error::{SafetyError, SafetyResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use vigil_types::{CorrelationId, RecommendationId};

/// Approver name used for autonomous executions
pub const SYSTEM_APPROVER: &str = "vigil:autonomous";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalToken {
    pub recommendation: RecommendationId,
    pub correlation: CorrelationId,
    pub approver: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub digest: String,
}

impl ApprovalToken {
    pub fn is_autonomous(&self) -> bool {
        self.approver == SYSTEM_APPROVER
    }
}

/// Issues and verifies approval tokens
#[derive(Debug, Clone)]
pub struct ApprovalAuthority {
    secret: Vec<u8>,
    ttl: Duration,
}

impl ApprovalAuthority {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::hours(1),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn digest(
        &self,
        recommendation: &RecommendationId,
        correlation: &CorrelationId,
        approver: &str,
        expires_at: DateTime<Utc>,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(recommendation.as_uuid().as_bytes());
        hasher.update(correlation.as_str().as_bytes());
        hasher.update(approver.as_bytes());
        hasher.update(expires_at.timestamp_millis().to_be_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn issue(
        &self,
        recommendation: RecommendationId,
        correlation: CorrelationId,
        approver: impl Into<String>,
        now: DateTime<Utc>,
    ) -> ApprovalToken {
        let approver = approver.into();
        let expires_at = now + self.ttl;
        let digest = self.digest(&recommendation, &correlation, &approver, expires_at);
        ApprovalToken {
            recommendation,
            correlation,
            approver,
            issued_at: now,
            expires_at,
            digest,
        }
    }

    /// Checks presence, binding, expiry and digest, in that order
    pub fn verify(
        &self,
        token: Option<&ApprovalToken>,
        recommendation: &RecommendationId,
        correlation: &CorrelationId,
        now: DateTime<Utc>,
    ) -> SafetyResult<()> {
        let token = token.ok_or(SafetyError::MissingApproval)?;
        if &token.recommendation != recommendation {
            return Err(SafetyError::ApprovalMismatch(format!(
                "token is for {}, not {}",
                token.recommendation, recommendation
            )));
        }
        if &token.correlation != correlation {
            return Err(SafetyError::ApprovalMismatch(format!(
                "token is for {}, not {}",
                token.correlation, correlation
            )));
        }
        if now >= token.expires_at {
            return Err(SafetyError::ApprovalExpired(token.expires_at));
        }
        let expected = self.digest(
            &token.recommendation,
            &token.correlation,
            &token.approver,
            token.expires_at,
        );
        if expected != token.digest {
            return Err(SafetyError::ApprovalForged);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (ApprovalAuthority, RecommendationId, CorrelationId) {
        (
            ApprovalAuthority::new(b"test-secret".to_vec()),
            RecommendationId::generate(),
            CorrelationId::generate(),
        )
    }

    #[test]
    fn test_issue_and_verify() {
        let (auth, rec, corr) = setup();
        let now = Utc::now();
        let token = auth.issue(rec, corr.clone(), "alice", now);
        assert!(auth.verify(Some(&token), &rec, &corr, now).is_ok());
        assert!(!token.is_autonomous());
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let (auth, rec, corr) = setup();
        assert_eq!(
            auth.verify(None, &rec, &corr, Utc::now()),
            Err(SafetyError::MissingApproval)
        );
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let (auth, rec, corr) = setup();
        let now = Utc::now();
        let token = auth.issue(rec, corr.clone(), "alice", now);
        let later = now + Duration::hours(2);
        assert!(matches!(
            auth.verify(Some(&token), &rec, &corr, later),
            Err(SafetyError::ApprovalExpired(_))
        ));
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let (auth, rec, corr) = setup();
        let now = Utc::now();
        let mut token = auth.issue(rec, corr.clone(), "alice", now);
        token.approver = "mallory".into();
        assert_eq!(
            auth.verify(Some(&token), &rec, &corr, now),
            Err(SafetyError::ApprovalForged)
        );
    }

    #[test]
    fn test_token_bound_to_recommendation() {
        let (auth, rec, corr) = setup();
        let now = Utc::now();
        let token = auth.issue(rec, corr.clone(), "alice", now);
        let other = RecommendationId::generate();
        assert!(matches!(
            auth.verify(Some(&token), &other, &corr, now),
            Err(SafetyError::ApprovalMismatch(_))
        ));
    }
}
