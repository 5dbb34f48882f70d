use crate::api::worklist::{
	WorklistFilter, WorklistResponses, WorklistSearchRequest, WorklistService,
};
use crate::backend::ris::{RisClient, RisError};
use crate::types::AE;
use async_trait::async_trait;
use dicom::core::value::{DataSetSequence, Value as DicomValue};
use dicom::core::{DataElement, VR};
use dicom::dicom_value;
use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;
use dicom::object::InMemDicomObject;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub const WORKITEMS_PATH: &str = "/dicom-web/workitems";

/// Worklist service backed by the RIS work item search.
///
/// The whole result batch is fetched with a single backend call; the
/// response sequence then iterates over it without further I/O. A failing
/// backend degrades to an empty worklist so the caller's session survives.
pub struct RisWorklistService {
	client: Arc<RisClient>,
}

impl RisWorklistService {
	pub const fn new(client: Arc<RisClient>) -> Self {
		Self { client }
	}

	async fn query(&self, caller: &AE, filter: &WorklistFilter) -> Result<Vec<Value>, RisError> {
		let response = self
			.client
			.post_json(WORKITEMS_PATH, caller, &filter.to_query())
			.await?;

		match response.json()? {
			Value::Array(items) => Ok(items),
			// Some backend versions wrap the result list in an envelope.
			Value::Object(mut envelope) => match envelope.remove("message") {
				Some(Value::Array(items)) => Ok(items),
				_ => Ok(Vec::new()),
			},
			_ => Ok(Vec::new()),
		}
	}
}

#[async_trait]
impl WorklistService for RisWorklistService {
	async fn search(&self, request: WorklistSearchRequest) -> WorklistResponses {
		let filter = WorklistFilter::from_identifier(&request.identifier);
		debug!(query = %filter.to_query(), "Built work item query");

		let items = match self.query(&request.requestor, &filter).await {
			Ok(items) => items,
			Err(err) => {
				// A missing backend must not fail the query; the modality
				// simply sees no scheduled items.
				warn!("Work item query failed, degrading to an empty worklist: {err}");
				Vec::new()
			}
		};

		debug!(matches = items.len(), "Work item query complete");
		let matches = items.iter().map(workitem_to_response).collect();
		WorklistResponses::new(matches, request.cancel)
	}
}

/// Reads the first value of a work item field. Fields are optional and
/// defensively typed: anything that is not a string reads as absent.
fn field_str<'a>(item: &'a Value, tag: &str) -> Option<&'a str> {
	item.get(tag)?.get("Value")?.get(0)?.as_str()
}

/// Converts one backend work item record into a worklist response dataset
/// with a single scheduled procedure step item.
fn workitem_to_response(item: &Value) -> InMemDicomObject {
	let mut response = InMemDicomObject::from_element_iter([
		DataElement::new(
			tags::PATIENT_ID,
			VR::LO,
			dicom_value!(Str, field_str(item, "00100020").unwrap_or_default()),
		),
		DataElement::new(
			tags::PATIENT_NAME,
			VR::PN,
			dicom_value!(Str, field_str(item, "00100010").unwrap_or_default()),
		),
		DataElement::new(
			tags::PATIENT_SEX,
			VR::CS,
			dicom_value!(Str, field_str(item, "00100040").unwrap_or("U")),
		),
		DataElement::new(
			tags::ACCESSION_NUMBER,
			VR::SH,
			dicom_value!(Str, field_str(item, "00080050").unwrap_or_default()),
		),
	]);

	if let Some(birth_date) = field_str(item, "00100030") {
		response.put(DataElement::new(
			tags::PATIENT_BIRTH_DATE,
			VR::DA,
			dicom_value!(Str, birth_date),
		));
	}

	let modality = field_str(item, "00081030").unwrap_or_default();
	let mut step = InMemDicomObject::from_element_iter([
		DataElement::new(tags::MODALITY, VR::CS, dicom_value!(Str, modality)),
		DataElement::new(
			tags::SCHEDULED_PROCEDURE_STEP_DESCRIPTION,
			VR::LO,
			dicom_value!(Str, format!("{modality} Imaging Procedure")),
		),
	]);

	if let Some(scheduled_date) = field_str(item, "00400002") {
		step.put(DataElement::new(
			tags::SCHEDULED_PROCEDURE_STEP_START_DATE,
			VR::DA,
			dicom_value!(Str, scheduled_date),
		));
	}

	// The scheduled datetime is a full DT value; only its HHMMSS... part
	// becomes the start time. A truncated value yields no time at all
	// rather than a malformed one.
	if let Some(scheduled_dt) = field_str(item, "00404011") {
		if scheduled_dt.len() >= 14 {
			if let Some(time) = scheduled_dt.get(8..) {
				step.put(DataElement::new(
					tags::SCHEDULED_PROCEDURE_STEP_START_TIME,
					VR::TM,
					dicom_value!(Str, time),
				));
			}
		}
	}

	let mut sequence = InMemElement::new(
		tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE,
		VR::SQ,
		DicomValue::Sequence(DataSetSequence::empty()),
	);
	if let Some(items) = sequence.items_mut() {
		items.push(step);
	}
	response.put(sequence);
	response
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn field(value: &str) -> Value {
		json!({ "vr": "LO", "Value": [value] })
	}

	#[test]
	fn converts_a_complete_work_item() {
		let item = json!({
			"00100020": field("A123"),
			"00100010": field("DOE^JANE"),
			"00081030": field("CT"),
			"00400002": field("20250101"),
		});

		let response = workitem_to_response(&item);

		assert_eq!(
			response.element(tags::PATIENT_ID).unwrap().to_str().unwrap(),
			"A123"
		);
		assert_eq!(
			response.element(tags::PATIENT_NAME).unwrap().to_str().unwrap(),
			"DOE^JANE"
		);

		let steps = response
			.element(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE)
			.unwrap()
			.items()
			.unwrap();
		assert_eq!(steps.len(), 1);
		assert_eq!(steps[0].element(tags::MODALITY).unwrap().to_str().unwrap(), "CT");
		assert_eq!(
			steps[0]
				.element(tags::SCHEDULED_PROCEDURE_STEP_DESCRIPTION)
				.unwrap()
				.to_str()
				.unwrap(),
			"CT Imaging Procedure"
		);
		assert_eq!(
			steps[0]
				.element(tags::SCHEDULED_PROCEDURE_STEP_START_DATE)
				.unwrap()
				.to_str()
				.unwrap(),
			"20250101"
		);
	}

	#[test]
	fn missing_fields_use_entity_defaults() {
		let response = workitem_to_response(&json!({}));

		assert_eq!(response.element(tags::PATIENT_ID).unwrap().to_str().unwrap(), "");
		assert_eq!(
			response.element(tags::PATIENT_SEX).unwrap().to_str().unwrap(),
			"U"
		);
		assert!(response.get(tags::PATIENT_BIRTH_DATE).is_none());

		let steps = response
			.element(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE)
			.unwrap()
			.items()
			.unwrap();
		assert!(steps[0].get(tags::SCHEDULED_PROCEDURE_STEP_START_DATE).is_none());
		assert!(steps[0].get(tags::SCHEDULED_PROCEDURE_STEP_START_TIME).is_none());
	}

	#[test]
	fn scheduled_time_requires_a_full_datetime() {
		let item = json!({ "00404011": field("20250101") });
		let response = workitem_to_response(&item);
		let steps = response
			.element(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE)
			.unwrap()
			.items()
			.unwrap();

		assert!(steps[0].get(tags::SCHEDULED_PROCEDURE_STEP_START_TIME).is_none());

		let item = json!({ "00404011": field("20250101093000") });
		let response = workitem_to_response(&item);
		let steps = response
			.element(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE)
			.unwrap()
			.items()
			.unwrap();

		assert_eq!(
			steps[0]
				.element(tags::SCHEDULED_PROCEDURE_STEP_START_TIME)
				.unwrap()
				.to_str()
				.unwrap(),
			"093000"
		);
	}

	#[test]
	fn non_string_field_values_read_as_absent() {
		let item = json!({ "00100020": { "vr": "LO", "Value": [42] } });
		let response = workitem_to_response(&item);

		assert_eq!(response.element(tags::PATIENT_ID).unwrap().to_str().unwrap(), "");
	}
}
