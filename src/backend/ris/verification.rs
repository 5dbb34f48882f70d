use crate::api::verification::{VerificationError, VerificationService};
use crate::backend::ris::RisClient;
use crate::types::AE;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const ECHO_PATH: &str = "/dicom-web/echo";

pub struct RisVerificationService {
	client: Arc<RisClient>,
}

impl RisVerificationService {
	pub const fn new(client: Arc<RisClient>) -> Self {
		Self { client }
	}
}

#[async_trait]
impl VerificationService for RisVerificationService {
	async fn verify(&self, requestor: &AE) -> Result<(), VerificationError> {
		self.client
			.check(ECHO_PATH, requestor)
			.await
			.map(|()| debug!("RIS backend verified"))
			.map_err(|err| VerificationError::Backend {
				source: Box::new(err),
			})
	}
}
