use crate::types::AE;
use async_trait::async_trait;
use dicom::object::InMemDicomObject;
use thiserror::Error;

/// Reports performed procedure step lifecycle events to the backend.
///
/// Both operations are fire-and-confirm: one bounded backend call, no
/// internal retry, so the inbound association is never held open while the
/// backend struggles.
#[async_trait]
pub trait MppsService: Send + Sync {
	/// Reports a newly created procedure step.
	async fn report_created(
		&self,
		requestor: &AE,
		dataset: &InMemDicomObject,
	) -> Result<(), MppsReportError>;

	/// Reports an update to an existing procedure step, including
	/// completion.
	async fn report_updated(
		&self,
		requestor: &AE,
		dataset: &InMemDicomObject,
	) -> Result<(), MppsReportError>;
}

/// A procedure step lifecycle event decoded by the association layer.
#[derive(Debug)]
pub struct MppsEvent {
	pub kind: MppsEventKind,
	pub requestor: AE,
	pub dataset: InMemDicomObject,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MppsEventKind {
	Created,
	Updated,
}

#[derive(Debug, Error)]
pub enum MppsReportError {
	#[error(transparent)]
	Backend {
		source: Box<dyn std::error::Error + Send + Sync>,
	},
}
