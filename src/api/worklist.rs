use crate::types::AE;
use crate::utils::element_str;
use async_trait::async_trait;
use dicom::dictionary_std::tags;
use dicom::object::InMemDicomObject;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Provides the functionality of a modality worklist query.
///
/// Failures are recovered inside the implementation: a missing or
/// misbehaving backend degrades to an empty response sequence so the
/// association stays alive.
#[async_trait]
pub trait WorklistService: Send + Sync {
	async fn search(&self, request: WorklistSearchRequest) -> WorklistResponses;
}

pub struct WorklistSearchRequest {
	/// The application entity that issued the query.
	pub requestor: AE,
	/// The decoded query identifier dataset.
	pub identifier: InMemDicomObject,
	/// Cancellation signal, set by the association layer when the caller
	/// sends a cancel request.
	pub cancel: CancelFlag,
}

/// Shared cancellation signal checked between yielded worklist matches.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
	pub fn cancel(&self) {
		self.0.store(true, Ordering::Relaxed);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::Relaxed)
	}
}

/// Filter criteria extracted from a worklist query identifier.
///
/// Wildcard (`"*"`) and empty values are treated as "no filter" and never
/// forwarded to the backend. The scheduled-date lower bound is always the
/// current date: past appointments are of no use to a modality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorklistFilter {
	pub from_date: String,
	pub patient_id: Option<String>,
	pub patient_name: Option<String>,
	pub modality: Option<String>,
}

impl WorklistFilter {
	pub fn from_identifier(identifier: &InMemDicomObject) -> Self {
		Self {
			from_date: today(),
			patient_id: match_value(identifier, tags::PATIENT_ID),
			patient_name: match_value(identifier, tags::PATIENT_NAME),
			modality: match_value(identifier, tags::MODALITY),
		}
	}

	/// The backend's filter document. Keys are the field tags of the
	/// backend's work item records.
	pub fn to_query(&self) -> serde_json::Value {
		let mut query = json!({ "00400002__from": self.from_date });
		let fields = query.as_object_mut().expect("query is an object");
		if let Some(patient_id) = &self.patient_id {
			fields.insert(String::from("00100020"), json!(patient_id));
		}
		if let Some(patient_name) = &self.patient_name {
			fields.insert(String::from("00100010"), json!(patient_name));
		}
		if let Some(modality) = &self.modality {
			fields.insert(String::from("00081030"), json!(modality));
		}
		query
	}
}

fn match_value(identifier: &InMemDicomObject, tag: dicom::core::Tag) -> Option<String> {
	element_str(identifier, tag).filter(|value| !value.is_empty() && value != "*")
}

fn today() -> String {
	chrono::Local::now().format("%Y%m%d").to_string()
}

/// A single step of the worklist response sequence.
#[derive(Debug, PartialEq)]
pub enum FindStep {
	/// A match; more steps may follow.
	Pending(InMemDicomObject),
	/// The caller cancelled the query. Yielded at most once.
	Cancelled,
	/// The sequence is exhausted.
	Done,
}

/// The finite, cancellable, non-restartable sequence of worklist matches.
///
/// The backend query happens once, up front; iteration is over the already
/// fetched batch. Before each match the cancellation flag is checked: once
/// set, exactly one [`FindStep::Cancelled`] is produced and the sequence is
/// exhausted for good.
pub struct WorklistResponses {
	items: std::vec::IntoIter<InMemDicomObject>,
	cancel: CancelFlag,
	finished: bool,
}

impl WorklistResponses {
	pub fn new(items: Vec<InMemDicomObject>, cancel: CancelFlag) -> Self {
		Self {
			items: items.into_iter(),
			cancel,
			finished: false,
		}
	}

	pub fn next(&mut self) -> FindStep {
		if self.finished {
			return FindStep::Done;
		}
		if self.cancel.is_cancelled() {
			self.finished = true;
			return FindStep::Cancelled;
		}
		match self.items.next() {
			Some(item) => FindStep::Pending(item),
			None => {
				self.finished = true;
				FindStep::Done
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use dicom::core::{DataElement, VR};
	use dicom::dicom_value;

	fn identifier(patient_id: &str, patient_name: &str) -> InMemDicomObject {
		InMemDicomObject::from_element_iter([
			DataElement::new(tags::PATIENT_ID, VR::LO, dicom_value!(Str, patient_id)),
			DataElement::new(tags::PATIENT_NAME, VR::PN, dicom_value!(Str, patient_name)),
		])
	}

	#[test]
	fn wildcard_values_are_not_forwarded() {
		let filter = WorklistFilter::from_identifier(&identifier("*", "DOE^JANE"));

		assert_eq!(filter.patient_id, None);
		assert_eq!(filter.patient_name.as_deref(), Some("DOE^JANE"));
	}

	#[test]
	fn empty_values_are_not_forwarded() {
		let filter = WorklistFilter::from_identifier(&identifier("", ""));

		assert_eq!(filter.patient_id, None);
		assert_eq!(filter.patient_name, None);
		assert_eq!(filter.modality, None);
	}

	#[test]
	fn from_date_is_always_today() {
		let filter = WorklistFilter::from_identifier(&identifier("*", "*"));

		assert_eq!(filter.from_date, today());
		assert_eq!(filter.from_date.len(), 8);
	}

	#[test]
	fn query_contains_only_active_criteria() {
		let filter = WorklistFilter::from_identifier(&identifier("A123", "*"));
		let query = filter.to_query();
		let fields = query.as_object().unwrap();

		assert_eq!(fields.len(), 2);
		assert_eq!(fields["00400002__from"], json!(filter.from_date));
		assert_eq!(fields["00100020"], json!("A123"));
	}

	#[test]
	fn modality_criterion_is_forwarded() {
		let identifier = InMemDicomObject::from_element_iter([DataElement::new(
			tags::MODALITY,
			VR::CS,
			dicom_value!(Str, "CT"),
		)]);
		let filter = WorklistFilter::from_identifier(&identifier);

		assert_eq!(filter.modality.as_deref(), Some("CT"));
		assert_eq!(filter.to_query()["00081030"], json!("CT"));
	}

	fn items(count: usize) -> Vec<InMemDicomObject> {
		(0..count)
			.map(|i| {
				InMemDicomObject::from_element_iter([DataElement::new(
					tags::PATIENT_ID,
					VR::LO,
					dicom_value!(Str, format!("P{i}")),
				)])
			})
			.collect()
	}

	#[test]
	fn yields_all_items_then_done() {
		let mut responses = WorklistResponses::new(items(3), CancelFlag::default());

		for _ in 0..3 {
			assert!(matches!(responses.next(), FindStep::Pending(_)));
		}
		assert_eq!(responses.next(), FindStep::Done);
		assert_eq!(responses.next(), FindStep::Done);
	}

	#[test]
	fn cancellation_yields_exactly_one_cancelled_step() {
		// Cancel before the k-th item for every k in 1..=n.
		let n = 4;
		for k in 1..=n {
			let cancel = CancelFlag::default();
			let mut responses = WorklistResponses::new(items(n), cancel.clone());

			for _ in 0..k - 1 {
				assert!(matches!(responses.next(), FindStep::Pending(_)));
			}
			cancel.cancel();
			assert_eq!(responses.next(), FindStep::Cancelled);
			assert_eq!(responses.next(), FindStep::Done);
			assert_eq!(responses.next(), FindStep::Done);
		}
	}

	#[test]
	fn empty_sequence_is_done_immediately() {
		let mut responses = WorklistResponses::new(Vec::new(), CancelFlag::default());

		assert_eq!(responses.next(), FindStep::Done);
	}

	#[test]
	fn cancel_after_exhaustion_is_ignored() {
		let cancel = CancelFlag::default();
		let mut responses = WorklistResponses::new(items(1), cancel.clone());

		assert!(matches!(responses.next(), FindStep::Pending(_)));
		assert_eq!(responses.next(), FindStep::Done);
		cancel.cancel();
		assert_eq!(responses.next(), FindStep::Done);
	}
}
