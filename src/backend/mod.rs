use crate::api::action::ActionService;
use crate::api::mpps::MppsService;
use crate::api::GatewayFacade;
use crate::config::GatewayConfig;
use crate::session::SessionRegistry;
use ris::action::RisActionService;
use ris::mpps::RisMppsService;
use ris::verification::RisVerificationService;
use ris::worklist::RisWorklistService;
use ris::RisClient;
use std::sync::Arc;
use tracing::info;

pub mod ris;

/// Builds the facade with all services wired to the configured RIS
/// backend. MPPS reporting and action forwarding are only constructed for
/// deployments that enable them.
pub fn build_gateway(
	config: &GatewayConfig,
	sessions: SessionRegistry,
) -> Result<GatewayFacade, url::ParseError> {
	let client = Arc::new(RisClient::new(&config.ris)?);

	let verification = Box::new(RisVerificationService::new(Arc::clone(&client)));
	let worklist = Box::new(RisWorklistService::new(Arc::clone(&client)));

	let (mpps, action) = if config.ris.mpps {
		let mpps = RisMppsService::new(Arc::clone(&client));
		let action =
			RisActionService::new(Arc::clone(&client), config.ris.workitem_uid.clone());
		(
			Some(Box::new(mpps) as Box<dyn MppsService>),
			Some(Box::new(action) as Box<dyn ActionService>),
		)
	} else {
		info!("MPPS reporting and action forwarding are disabled for this deployment");
		(None, None)
	};

	Ok(GatewayFacade::new(
		verification,
		worklist,
		mpps,
		action,
		sessions,
	))
}
