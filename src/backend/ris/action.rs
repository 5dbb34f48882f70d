use crate::api::action::{ActionError, ActionRequest, ActionService, ActionType};
use crate::backend::ris::worklist::WORKITEMS_PATH;
use crate::backend::ris::RisClient;
use crate::types::US;
use crate::utils::element_str;
use async_trait::async_trait;
use dicom::dictionary_std::tags;
use dicom::object::InMemDicomObject;
use dicom_json::DicomJson;
use std::sync::Arc;
use tracing::info;

/// Forwards work item actions to the per-item RIS endpoints.
///
/// The destination is resolved before anything touches the network: an
/// unknown action kind or an unresolvable work item identifier fails
/// immediately.
pub struct RisActionService {
	client: Arc<RisClient>,
	/// Name of the dataset attribute carrying the work item identifier.
	workitem_attribute: String,
}

impl RisActionService {
	pub const fn new(client: Arc<RisClient>, workitem_attribute: String) -> Self {
		Self {
			client,
			workitem_attribute,
		}
	}

	/// Resolves the work item identifier from the configured attribute,
	/// falling back to the accession number.
	fn resolve_workitem_uid(&self, dataset: &InMemDicomObject) -> Option<String> {
		dataset
			.element_by_name(&self.workitem_attribute)
			.ok()
			.and_then(|element| element.to_str().ok())
			.map(|value| value.trim_end_matches([' ', '\0']).to_string())
			.filter(|value| !value.is_empty())
			.or_else(|| {
				element_str(dataset, tags::ACCESSION_NUMBER).filter(|value| !value.is_empty())
			})
	}
}

#[async_trait]
impl ActionService for RisActionService {
	async fn forward(&self, request: &ActionRequest) -> Result<US, ActionError> {
		let action = ActionType::try_from(request.action_type)
			.map_err(ActionError::UnsupportedAction)?;

		let workitem_uid = self
			.resolve_workitem_uid(&request.dataset)
			.ok_or_else(|| ActionError::MissingIdentifier(self.workitem_attribute.clone()))?;

		// Actions are attributed to the performing station when the
		// dataset names one.
		let caller = element_str(&request.dataset, tags::PERFORMED_STATION_AE_TITLE)
			.filter(|aet| !aet.is_empty())
			.unwrap_or_else(|| request.requestor.clone());

		let path = format!("{WORKITEMS_PATH}/{workitem_uid}/{}", action.path_suffix());
		let response = self
			.client
			.post_json(&path, &caller, &DicomJson::from(request.dataset.clone()))
			.await
			.map_err(|err| ActionError::Backend {
				source: Box::new(err),
			})?;

		info!(
			workitem_uid = %workitem_uid,
			action = ?action,
			status = response.status,
			"Forwarded work item action"
		);
		Ok(response.status)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::RisConfig;
	use crate::types::AE;
	use dicom::core::{DataElement, VR};
	use dicom::dicom_value;

	fn service(workitem_attribute: &str) -> RisActionService {
		let client = RisClient::new(&RisConfig {
			// Reserved TEST-NET address: any attempted call would fail, but
			// the cases below must fail before a connection is even tried.
			host_name: String::from("http://192.0.2.1"),
			api_key: String::new(),
			api_secret: String::new(),
			workitem_uid: String::from(workitem_attribute),
			mpps: true,
			echo_timeout: 100,
			request_timeout: 100,
		})
		.unwrap();
		RisActionService::new(Arc::new(client), String::from(workitem_attribute))
	}

	fn request(action_type: US, dataset: InMemDicomObject) -> ActionRequest {
		ActionRequest {
			action_type,
			requestor: AE::from("CT01"),
			dataset,
		}
	}

	#[tokio::test]
	async fn unknown_action_kind_fails_fast() {
		let service = service("AccessionNumber");
		let result = service
			.forward(&request(7, InMemDicomObject::new_empty()))
			.await;

		assert!(matches!(result, Err(ActionError::UnsupportedAction(7))));
	}

	#[tokio::test]
	async fn unresolvable_identifier_fails_fast() {
		let service = service("AccessionNumber");
		let result = service
			.forward(&request(2, InMemDicomObject::new_empty()))
			.await;

		assert!(matches!(result, Err(ActionError::MissingIdentifier(_))));
	}

	#[test]
	fn identifier_prefers_the_configured_attribute() {
		let service = service("StudyInstanceUID");
		let dataset = InMemDicomObject::from_element_iter([
			DataElement::new(tags::STUDY_INSTANCE_UID, VR::UI, dicom_value!(Str, "1.2.3")),
			DataElement::new(tags::ACCESSION_NUMBER, VR::SH, dicom_value!(Str, "ACC42")),
		]);

		assert_eq!(service.resolve_workitem_uid(&dataset).as_deref(), Some("1.2.3"));
	}

	#[test]
	fn identifier_falls_back_to_accession_number() {
		let service = service("StudyInstanceUID");
		let dataset = InMemDicomObject::from_element_iter([DataElement::new(
			tags::ACCESSION_NUMBER,
			VR::SH,
			dicom_value!(Str, "ACC42"),
		)]);

		assert_eq!(service.resolve_workitem_uid(&dataset).as_deref(), Some("ACC42"));
	}

	#[test]
	fn unknown_attribute_name_resolves_through_fallback() {
		let service = service("NoSuchAttribute");
		let dataset = InMemDicomObject::from_element_iter([DataElement::new(
			tags::ACCESSION_NUMBER,
			VR::SH,
			dicom_value!(Str, "ACC42"),
		)]);

		assert_eq!(service.resolve_workitem_uid(&dataset).as_deref(), Some("ACC42"));
	}
}
