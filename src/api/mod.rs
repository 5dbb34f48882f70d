pub mod action;
pub mod mpps;
pub mod verification;
pub mod worklist;

use crate::session::SessionRegistry;
use crate::types::{AE, StatusCode};
use action::{ActionRequest, ActionService};
use mpps::{MppsEvent, MppsEventKind, MppsService};
use tracing::{debug, error, info, instrument, warn};
use verification::VerificationService;
use worklist::{WorklistResponses, WorklistSearchRequest, WorklistService};

/// The gateway's protocol-facing surface.
///
/// The association layer decodes inbound messages into plain request
/// objects and calls one handler per operation; every handler is stateless
/// and maps its outcome to the closed [`StatusCode`] vocabulary. The only
/// state shared between sessions is the [`SessionRegistry`].
pub struct GatewayFacade {
	verification: Box<dyn VerificationService>,
	worklist: Box<dyn WorklistService>,
	mpps: Option<Box<dyn MppsService>>,
	action: Option<Box<dyn ActionService>>,
	sessions: SessionRegistry,
}

impl GatewayFacade {
	pub fn new(
		verification: Box<dyn VerificationService>,
		worklist: Box<dyn WorklistService>,
		mpps: Option<Box<dyn MppsService>>,
		action: Option<Box<dyn ActionService>>,
		sessions: SessionRegistry,
	) -> Self {
		Self {
			verification,
			worklist,
			mpps,
			action,
			sessions,
		}
	}

	/// Handles a verification request by checking backend reachability.
	/// Never fails: an unreachable backend is reported as [`StatusCode::Refused`].
	#[instrument(skip_all, fields(requestor = %requestor))]
	pub async fn echo(&self, requestor: &AE) -> StatusCode {
		match self.verification.verify(requestor).await {
			Ok(()) => StatusCode::Success,
			Err(err) => {
				warn!("Backend verification failed: {err}");
				StatusCode::Refused
			}
		}
	}

	/// Handles a worklist query. The returned sequence yields
	/// [`StatusCode::Pending`] matches until it is exhausted or cancelled;
	/// the association layer emits the final terminating response.
	#[instrument(skip_all, fields(requestor = %request.requestor))]
	pub async fn find(&self, request: WorklistSearchRequest) -> WorklistResponses {
		self.worklist.search(request).await
	}

	/// Handles a procedure step creation or update report.
	#[instrument(skip_all, fields(requestor = %event.requestor, kind = ?event.kind))]
	pub async fn procedure_step(&self, event: MppsEvent) -> StatusCode {
		let Some(mpps) = &self.mpps else {
			warn!("Received a procedure step report, but MPPS support is disabled");
			return StatusCode::ProcessingFailure;
		};

		let result = match event.kind {
			MppsEventKind::Created => mpps.report_created(&event.requestor, &event.dataset).await,
			MppsEventKind::Updated => mpps.report_updated(&event.requestor, &event.dataset).await,
		};

		match result {
			Ok(()) => StatusCode::Success,
			Err(err) => {
				error!("Procedure step report failed: {err}");
				StatusCode::ProcessingFailure
			}
		}
	}

	/// Handles a work item action by forwarding it to the backend.
	#[instrument(skip_all, fields(requestor = %request.requestor, action_type = request.action_type))]
	pub async fn workitem_action(&self, request: ActionRequest) -> StatusCode {
		let Some(action) = &self.action else {
			warn!("Received a work item action, but MPPS support is disabled");
			return StatusCode::ProcessingFailure;
		};

		match action.forward(&request).await {
			Ok(status) => {
				debug!(status, "Work item action acknowledged by backend");
				StatusCode::Success
			}
			Err(err) => {
				error!("Work item action failed: {err}");
				StatusCode::ProcessingFailure
			}
		}
	}

	/// The number of distinct application entities currently connected.
	pub fn active_sessions(&self) -> usize {
		self.sessions.active_count()
	}

	pub fn association_accepted(&self, aet: AE) {
		let active = self.sessions.accepted(aet.clone());
		info!(aet = %aet, active, "Association accepted");
	}

	pub fn association_released(&self, aet: &str) {
		let active = self.sessions.released(aet);
		info!(aet, active, "Association released");
	}
}
