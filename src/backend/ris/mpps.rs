use crate::api::mpps::{MppsReportError, MppsService};
use crate::backend::ris::RisClient;
use crate::types::AE;
use crate::utils::element_str_or;
use async_trait::async_trait;
use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;
use dicom::object::InMemDicomObject;
use dicom_json::DicomJson;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

pub const CREATED_PATH: &str = "/api/method/healthcare.healthcare.api.mpps.handle_n_create";
pub const UPDATED_PATH: &str = "/api/method/healthcare.healthcare.api.mpps.handle_n_set";

/// The normalized procedure step report submitted to the RIS.
///
/// Every field is extracted defensively: an absent attribute contributes
/// its default (usually the empty string), never an error. The original
/// dataset rides along verbatim for backend-side audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MppsPayload {
	pub accession_number: String,
	pub study_instance_uid: String,
	pub patient: String,
	/// Start date and time concatenated; empty if both are absent.
	pub start_time: String,
	/// End date and time concatenated; empty if both are absent.
	pub end_time: String,
	pub status: String,
	pub series: Vec<SeriesRecord>,
	pub instances: Vec<InstanceRecord>,
	pub performed_station_ae: String,
	pub performer_name: String,
	pub raw_ds: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesRecord {
	pub series_uid: String,
	pub study_uid: String,
	pub description: String,
	pub modality: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceRecord {
	pub sop_instance_uid: String,
	pub sop_class_uid: String,
	pub series_uid: String,
	pub study_uid: String,
}

impl MppsPayload {
	/// Flattens a performed procedure step dataset into the backend
	/// payload. Pure and total: the same dataset always produces the same
	/// payload and nothing in the dataset can make it fail.
	pub fn from_dataset(dataset: &InMemDicomObject) -> Self {
		let text = |tag| element_str_or(dataset, tag, "");

		let study_uid = text(tags::STUDY_INSTANCE_UID);
		let performer = [
			tags::HUMAN_PERFORMER_NAME,
			tags::PERFORMING_PHYSICIAN_NAME,
			tags::SCHEDULED_PERFORMING_PHYSICIAN_NAME,
		]
		.into_iter()
		.map(text)
		.find(|name| !name.is_empty())
		.unwrap_or_default();

		let mut series = Vec::new();
		let mut instances = Vec::new();
		let series_items = dataset
			.get(tags::PERFORMED_SERIES_SEQUENCE)
			.and_then(InMemElement::items);
		for item in series_items.into_iter().flatten() {
			let series_uid = element_str_or(item, tags::SERIES_INSTANCE_UID, "");
			series.push(SeriesRecord {
				series_uid: series_uid.clone(),
				study_uid: study_uid.clone(),
				description: element_str_or(item, tags::SERIES_DESCRIPTION, ""),
				modality: element_str_or(item, tags::MODALITY, ""),
			});

			let image_items = item
				.get(tags::REFERENCED_IMAGE_SEQUENCE)
				.and_then(InMemElement::items);
			for image in image_items.into_iter().flatten() {
				instances.push(InstanceRecord {
					sop_instance_uid: element_str_or(image, tags::REFERENCED_SOP_INSTANCE_UID, ""),
					sop_class_uid: element_str_or(image, tags::REFERENCED_SOP_CLASS_UID, ""),
					series_uid: series_uid.clone(),
					study_uid: study_uid.clone(),
				});
			}
		}

		Self {
			accession_number: text(tags::ACCESSION_NUMBER),
			study_instance_uid: study_uid,
			patient: text(tags::PATIENT_ID),
			start_time: text(tags::PERFORMED_PROCEDURE_STEP_START_DATE)
				+ &text(tags::PERFORMED_PROCEDURE_STEP_START_TIME),
			end_time: text(tags::PERFORMED_PROCEDURE_STEP_END_DATE)
				+ &text(tags::PERFORMED_PROCEDURE_STEP_END_TIME),
			status: text(tags::PERFORMED_PROCEDURE_STEP_STATUS).to_lowercase(),
			series,
			instances,
			performed_station_ae: text(tags::PERFORMED_STATION_AE_TITLE),
			performer_name: performer,
			raw_ds: serde_json::to_value(DicomJson::from(dataset.clone())).unwrap_or_default(),
		}
	}
}

/// MPPS forwarder posting normalized reports to the RIS procedure step
/// endpoints. Fire-and-confirm: one bounded call per report, no retries.
pub struct RisMppsService {
	client: Arc<RisClient>,
}

impl RisMppsService {
	pub const fn new(client: Arc<RisClient>) -> Self {
		Self { client }
	}

	async fn submit(
		&self,
		path: &str,
		requestor: &AE,
		dataset: &InMemDicomObject,
	) -> Result<(), MppsReportError> {
		let payload = MppsPayload::from_dataset(dataset);
		debug!(
			accession_number = %payload.accession_number,
			status = %payload.status,
			series = payload.series.len(),
			instances = payload.instances.len(),
			"Built procedure step payload"
		);

		self.client
			.post_json(path, requestor, &payload)
			.await
			.map(|_| ())
			.map_err(|err| MppsReportError::Backend {
				source: Box::new(err),
			})
	}
}

#[async_trait]
impl MppsService for RisMppsService {
	async fn report_created(
		&self,
		requestor: &AE,
		dataset: &InMemDicomObject,
	) -> Result<(), MppsReportError> {
		self.submit(CREATED_PATH, requestor, dataset).await
	}

	async fn report_updated(
		&self,
		requestor: &AE,
		dataset: &InMemDicomObject,
	) -> Result<(), MppsReportError> {
		self.submit(UPDATED_PATH, requestor, dataset).await
	}
}
