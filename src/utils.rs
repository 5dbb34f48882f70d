use dicom::core::Tag;
use dicom::object::mem::InMemElement;
use dicom::object::InMemDicomObject;

/// Defensive string accessor for decoded datasets.
///
/// Returns `None` for absent attributes and for attributes whose value
/// cannot be represented as a string. Trailing padding is stripped, so an
/// attribute that only contains padding reads as `Some("")` — callers that
/// need to treat "absent" and "empty" differently can.
pub fn element_str(object: &InMemDicomObject, tag: Tag) -> Option<String> {
	object
		.get(tag)
		.map(InMemElement::to_str)
		.and_then(Result::ok)
		.map(|value| value.trim_end_matches([' ', '\0']).to_string())
}

/// Like [`element_str`], but folds absence and unreadable values into a
/// default.
pub fn element_str_or(object: &InMemDicomObject, tag: Tag, default: &str) -> String {
	match element_str(object, tag) {
		Some(value) if !value.is_empty() => value,
		_ => String::from(default),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use dicom::core::{DataElement, VR};
	use dicom::dicom_value;
	use dicom::dictionary_std::tags;

	#[test]
	fn absent_attribute_reads_as_none() {
		let object = InMemDicomObject::new_empty();

		assert_eq!(element_str(&object, tags::PATIENT_ID), None);
		assert_eq!(element_str_or(&object, tags::PATIENT_ID, "unknown"), "unknown");
	}

	#[test]
	fn padding_is_stripped() {
		let object = InMemDicomObject::from_element_iter([DataElement::new(
			tags::PATIENT_ID,
			VR::LO,
			dicom_value!(Str, "A123 "),
		)]);

		assert_eq!(element_str(&object, tags::PATIENT_ID).as_deref(), Some("A123"));
	}

	#[test]
	fn empty_value_falls_back_to_default() {
		let object = InMemDicomObject::from_element_iter([DataElement::new(
			tags::PATIENT_SEX,
			VR::CS,
			dicom_value!(Str, ""),
		)]);

		assert_eq!(element_str_or(&object, tags::PATIENT_SEX, "U"), "U");
	}
}
