use crate::types::AE;
use async_trait::async_trait;
use thiserror::Error;

/// Provides the functionality of a verification request.
///
/// Verification is forwarded: the gateway only confirms the echo once the
/// RIS backend itself is reachable, so a modality's connectivity test
/// covers the whole chain.
#[async_trait]
pub trait VerificationService: Send + Sync {
	async fn verify(&self, requestor: &AE) -> Result<(), VerificationError>;
}

#[derive(Debug, Error)]
pub enum VerificationError {
	#[error(transparent)]
	Backend {
		source: Box<dyn std::error::Error + Send + Sync>,
	},
}
