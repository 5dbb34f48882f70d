use crate::api::action::ActionRequest;
use crate::api::mpps::{MppsEvent, MppsEventKind};
use crate::api::worklist::{CancelFlag, FindStep, WorklistSearchRequest};
use crate::api::GatewayFacade;
use crate::config::DimseServerConfig;
use crate::dimse::association::{ServerAssociation, ServerAssociationOptions};
use crate::dimse::messages::{
	ActionResponse, EchoResponse, FindResponse, GatewayRequest, NormalizedResponse,
	COMMAND_FIELD_NORMALIZED_CREATE_RESPONSE, COMMAND_FIELD_NORMALIZED_SET_RESPONSE,
};
use crate::dimse::{read_message, write_message};
use crate::types::{StatusCode, AE};
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

/// Timeout for writing a single response message.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// The DIMSE service class provider of the gateway.
///
/// Accepts inbound associations, decodes their messages and drives the
/// [`GatewayFacade`], one task per association up to the configured limit.
pub struct GatewayServiceClassProvider {
	inner: Arc<InnerGatewayServiceClassProvider>,
}

struct InnerGatewayServiceClassProvider {
	facade: GatewayFacade,
	config: DimseServerConfig,
}

impl GatewayServiceClassProvider {
	pub fn new(facade: GatewayFacade, config: DimseServerConfig) -> Self {
		Self {
			inner: Arc::new(InnerGatewayServiceClassProvider { facade, config }),
		}
	}

	pub async fn spawn(&self) -> anyhow::Result<()> {
		let address = SocketAddr::from((self.inner.config.interface, self.inner.config.port));
		let listener = TcpListener::bind(&address).await?;
		let permits = Arc::new(Semaphore::new(self.inner.config.max_associations));
		info!("Started DICOM gateway on {address}");

		loop {
			match listener.accept().await {
				Ok((stream, peer)) => {
					let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
						warn!(
							active = self.inner.facade.active_sessions(),
							"Rejecting connection from {peer}: association limit reached"
						);
						continue;
					};

					let span = info_span!(
						"DIMSE-SCP",
						aet = &self.inner.config.aet,
						peer = peer.to_string()
					);
					info!("Accepted incoming connection from {peer}");
					let inner = Arc::clone(&self.inner);
					tokio::spawn(async move {
						let _permit = permit;
						if let Err(err) = Self::process(stream, inner).instrument(span).await {
							error!("{err}");
						}
					});
				}
				Err(err) => error!("Failed to accept incoming connection: {err}"),
			};
		}
	}

	#[instrument(skip_all)]
	async fn process(
		stream: TcpStream,
		inner: Arc<InnerGatewayServiceClassProvider>,
	) -> anyhow::Result<()> {
		let tcp_stream = stream.into_std()?;
		// This is required because the `dicom-rs` crate does not use non-blocking
		// reads/writes. The actual reading/writing happens in ServerAssociation,
		// which moves IO operations to another thread.
		tcp_stream.set_nonblocking(false)?;

		let options = ServerAssociationOptions {
			aet: inner.config.aet.clone(),
			tcp_stream,
			uncompressed: inner.config.uncompressed,
		};
		let association = ServerAssociation::new(options).await?;
		let calling_aet = association.calling_aet().clone();
		inner.facade.association_accepted(calling_aet.clone());

		let result = Self::serve(&association, &inner.facade, &calling_aet).await;
		inner.facade.association_released(&calling_aet);
		result
	}

	async fn serve(
		association: &ServerAssociation,
		facade: &GatewayFacade,
		calling_aet: &AE,
	) -> anyhow::Result<()> {
		// Duration::MAX to indefinitely wait for incoming messages. The
		// loop ends when the peer releases or aborts the association.
		let mut find_cancel: Option<CancelFlag> = None;
		while let Ok(message) = read_message(association, Duration::MAX).await {
			let pctx_id = message
				.presentation_context_id
				.context("No presentation context available")?;

			let request = GatewayRequest::decode(message)?;
			match request {
				GatewayRequest::Echo(echo) => {
					let status = facade.echo(calling_aet).await;
					let response = EchoResponse {
						message_id: echo.message_id,
						status,
					};
					write_message(association, response, pctx_id, RESPONSE_TIMEOUT).await?;
				}
				GatewayRequest::Find(find) => {
					let cancel = CancelFlag::default();
					find_cancel = Some(cancel.clone());
					let mut responses = facade
						.find(WorklistSearchRequest {
							requestor: calling_aet.clone(),
							identifier: find.identifier,
							cancel,
						})
						.await;

					loop {
						let (status, identifier, last) = match responses.next() {
							FindStep::Pending(identifier) => {
								(StatusCode::Pending, Some(identifier), false)
							}
							FindStep::Cancelled => (StatusCode::Cancelled, None, true),
							FindStep::Done => (StatusCode::Success, None, true),
						};
						let response = FindResponse {
							message_id: find.message_id,
							sop_class_uid: find.sop_class_uid.clone(),
							status,
							identifier,
						};
						write_message(association, response, pctx_id, RESPONSE_TIMEOUT).await?;
						if last {
							break;
						}
					}
				}
				GatewayRequest::Cancel(cancel) => {
					// Messages are handled strictly in order, so a cancel
					// arriving here refers to a query whose responses have
					// already drained; setting the flag is then a no-op.
					if let Some(flag) = &find_cancel {
						flag.cancel();
					}
					debug!(
						acted_message_id = cancel.acted_message_id,
						"Received cancel request"
					);
				}
				GatewayRequest::ProcedureStepCreate(request) => {
					let status = facade
						.procedure_step(MppsEvent {
							kind: MppsEventKind::Created,
							requestor: calling_aet.clone(),
							dataset: request.dataset,
						})
						.await;
					let response = NormalizedResponse {
						message_id: request.message_id,
						sop_class_uid: request.sop_class_uid,
						sop_instance_uid: request.sop_instance_uid,
						status,
						command_field: COMMAND_FIELD_NORMALIZED_CREATE_RESPONSE,
					};
					write_message(association, response, pctx_id, RESPONSE_TIMEOUT).await?;
				}
				GatewayRequest::ProcedureStepSet(request) => {
					let status = facade
						.procedure_step(MppsEvent {
							kind: MppsEventKind::Updated,
							requestor: calling_aet.clone(),
							dataset: request.dataset,
						})
						.await;
					let response = NormalizedResponse {
						message_id: request.message_id,
						sop_class_uid: request.sop_class_uid,
						sop_instance_uid: request.sop_instance_uid,
						status,
						command_field: COMMAND_FIELD_NORMALIZED_SET_RESPONSE,
					};
					write_message(association, response, pctx_id, RESPONSE_TIMEOUT).await?;
				}
				GatewayRequest::WorkitemAction(request) => {
					let status = facade
						.workitem_action(ActionRequest {
							action_type: request.action_type,
							requestor: calling_aet.clone(),
							dataset: request.dataset,
						})
						.await;
					let response = ActionResponse {
						message_id: request.message_id,
						sop_class_uid: request.sop_class_uid,
						sop_instance_uid: request.sop_instance_uid,
						action_type: request.action_type,
						status,
					};
					write_message(association, response, pctx_id, RESPONSE_TIMEOUT).await?;
				}
			}
		}
		Ok(())
	}
}
