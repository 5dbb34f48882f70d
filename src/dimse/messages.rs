use crate::dimse::{DicomMessage, DATA_SET_EXISTS, DATA_SET_MISSING};
use crate::types::{StatusCode, UI, US};
use dicom::core::{DataElement, Tag, VR};
use dicom::dicom_value;
use dicom::dictionary_std::{tags, uids};
use dicom::object::InMemDicomObject;
use thiserror::Error;

// Magic numbers defined by the DICOM specification.
pub const COMMAND_FIELD_COMPOSITE_ECHO_REQUEST: US = 0x0030;
pub const COMMAND_FIELD_COMPOSITE_ECHO_RESPONSE: US = 0x8030;
pub const COMMAND_FIELD_COMPOSITE_FIND_REQUEST: US = 0x0020;
pub const COMMAND_FIELD_COMPOSITE_FIND_RESPONSE: US = 0x8020;
pub const COMMAND_FIELD_COMPOSITE_CANCEL_REQUEST: US = 0x0FFF;
pub const COMMAND_FIELD_NORMALIZED_SET_REQUEST: US = 0x0120;
pub const COMMAND_FIELD_NORMALIZED_SET_RESPONSE: US = 0x8120;
pub const COMMAND_FIELD_NORMALIZED_ACTION_REQUEST: US = 0x0130;
pub const COMMAND_FIELD_NORMALIZED_ACTION_RESPONSE: US = 0x8130;
pub const COMMAND_FIELD_NORMALIZED_CREATE_REQUEST: US = 0x0140;
pub const COMMAND_FIELD_NORMALIZED_CREATE_RESPONSE: US = 0x8140;

/// One decoded inbound operation.
#[derive(Debug)]
pub enum GatewayRequest {
	Echo(EchoRequest),
	Find(FindRequest),
	Cancel(CancelRequest),
	ProcedureStepCreate(NormalizedRequest),
	ProcedureStepSet(NormalizedRequest),
	WorkitemAction(ActionRequestMessage),
}

impl GatewayRequest {
	/// Decodes a DICOM message by its command field.
	pub fn decode(message: DicomMessage) -> Result<Self, DecodeError> {
		let command_field = message
			.command_int(tags::COMMAND_FIELD)
			.ok_or(DecodeError::MissingAttribute(tags::COMMAND_FIELD))?;
		let message_id = message.command_int(tags::MESSAGE_ID).unwrap_or(0);

		match command_field {
			COMMAND_FIELD_COMPOSITE_ECHO_REQUEST => Ok(Self::Echo(EchoRequest { message_id })),
			COMMAND_FIELD_COMPOSITE_FIND_REQUEST => Ok(Self::Find(FindRequest {
				message_id,
				sop_class_uid: message
					.command_str(tags::AFFECTED_SOP_CLASS_UID)
					.unwrap_or_else(|| UI::from(uids::MODALITY_WORKLIST_INFORMATION_MODEL_FIND)),
				identifier: message.data.ok_or(DecodeError::MissingDataSet)?,
			})),
			COMMAND_FIELD_COMPOSITE_CANCEL_REQUEST => Ok(Self::Cancel(CancelRequest {
				acted_message_id: message
					.command_int(tags::MESSAGE_ID_BEING_RESPONDED_TO)
					.unwrap_or(0),
			})),
			COMMAND_FIELD_NORMALIZED_CREATE_REQUEST => {
				Ok(Self::ProcedureStepCreate(NormalizedRequest {
					message_id,
					sop_class_uid: message
						.command_str(tags::AFFECTED_SOP_CLASS_UID)
						.ok_or(DecodeError::MissingAttribute(tags::AFFECTED_SOP_CLASS_UID))?,
					sop_instance_uid: message
						.command_str(tags::AFFECTED_SOP_INSTANCE_UID)
						.unwrap_or_default(),
					dataset: message.data.unwrap_or_else(InMemDicomObject::new_empty),
				}))
			}
			COMMAND_FIELD_NORMALIZED_SET_REQUEST => Ok(Self::ProcedureStepSet(NormalizedRequest {
				message_id,
				sop_class_uid: message
					.command_str(tags::REQUESTED_SOP_CLASS_UID)
					.ok_or(DecodeError::MissingAttribute(tags::REQUESTED_SOP_CLASS_UID))?,
				sop_instance_uid: message
					.command_str(tags::REQUESTED_SOP_INSTANCE_UID)
					.unwrap_or_default(),
				dataset: message.data.unwrap_or_else(InMemDicomObject::new_empty),
			})),
			COMMAND_FIELD_NORMALIZED_ACTION_REQUEST => {
				Ok(Self::WorkitemAction(ActionRequestMessage {
					message_id,
					sop_class_uid: message
						.command_str(tags::REQUESTED_SOP_CLASS_UID)
						.ok_or(DecodeError::MissingAttribute(tags::REQUESTED_SOP_CLASS_UID))?,
					sop_instance_uid: message
						.command_str(tags::REQUESTED_SOP_INSTANCE_UID)
						.unwrap_or_default(),
					action_type: message
						.command_int(tags::ACTION_TYPE_ID)
						.ok_or(DecodeError::MissingAttribute(tags::ACTION_TYPE_ID))?,
					dataset: message.data.unwrap_or_else(InMemDicomObject::new_empty),
				}))
			}
			unsupported => Err(DecodeError::UnsupportedCommand(unsupported)),
		}
	}
}

#[derive(Debug, Error)]
pub enum DecodeError {
	#[error("Missing mandatory command attribute {0}")]
	MissingAttribute(Tag),
	#[error("Unsupported command field {0:#06x}")]
	UnsupportedCommand(US),
	#[error("Missing data set")]
	MissingDataSet,
}

/// C-ECHO-RQ
#[derive(Debug)]
pub struct EchoRequest {
	pub message_id: US,
}

/// C-FIND-RQ
#[derive(Debug)]
pub struct FindRequest {
	pub message_id: US,
	pub sop_class_uid: UI,
	pub identifier: InMemDicomObject,
}

/// C-CANCEL-FIND-RQ
#[derive(Debug)]
pub struct CancelRequest {
	pub acted_message_id: US,
}

/// N-CREATE-RQ / N-SET-RQ
#[derive(Debug)]
pub struct NormalizedRequest {
	pub message_id: US,
	pub sop_class_uid: UI,
	pub sop_instance_uid: UI,
	pub dataset: InMemDicomObject,
}

/// N-ACTION-RQ
#[derive(Debug)]
pub struct ActionRequestMessage {
	pub message_id: US,
	pub sop_class_uid: UI,
	pub sop_instance_uid: UI,
	pub action_type: US,
	pub dataset: InMemDicomObject,
}

/// C-ECHO-RSP
#[derive(Debug)]
pub struct EchoResponse {
	pub message_id: US,
	pub status: StatusCode,
}

impl From<EchoResponse> for DicomMessage {
	#[rustfmt::skip]
	fn from(response: EchoResponse) -> Self {
        let command = InMemDicomObject::command_from_element_iter([
            DataElement::new(tags::AFFECTED_SOP_CLASS_UID, VR::UI, dicom_value!(Str, uids::VERIFICATION)),
            DataElement::new(tags::COMMAND_FIELD, VR::US, dicom_value!(U16, [COMMAND_FIELD_COMPOSITE_ECHO_RESPONSE])),
            DataElement::new(tags::MESSAGE_ID_BEING_RESPONDED_TO, VR::US, dicom_value!(U16, [response.message_id])),
            DataElement::new(tags::COMMAND_DATA_SET_TYPE, VR::US, dicom_value!(U16, [DATA_SET_MISSING])),
            DataElement::new(tags::STATUS, VR::US, dicom_value!(U16, [response.status.as_u16()])),
        ]);

        Self {
            command,
            data: None,
            presentation_context_id: None,
        }
    }
}

/// C-FIND-RSP
#[derive(Debug)]
pub struct FindResponse {
	pub message_id: US,
	pub sop_class_uid: UI,
	pub status: StatusCode,
	pub identifier: Option<InMemDicomObject>,
}

impl From<FindResponse> for DicomMessage {
	#[rustfmt::skip]
	fn from(response: FindResponse) -> Self {
        let data_set_type = if response.identifier.is_some() { DATA_SET_EXISTS } else { DATA_SET_MISSING };
        let command = InMemDicomObject::command_from_element_iter([
            DataElement::new(tags::AFFECTED_SOP_CLASS_UID, VR::UI, dicom_value!(Str, response.sop_class_uid)),
            DataElement::new(tags::COMMAND_FIELD, VR::US, dicom_value!(U16, [COMMAND_FIELD_COMPOSITE_FIND_RESPONSE])),
            DataElement::new(tags::MESSAGE_ID_BEING_RESPONDED_TO, VR::US, dicom_value!(U16, [response.message_id])),
            DataElement::new(tags::COMMAND_DATA_SET_TYPE, VR::US, dicom_value!(U16, [data_set_type])),
            DataElement::new(tags::STATUS, VR::US, dicom_value!(U16, [response.status.as_u16()])),
        ]);

        Self {
            command,
            data: response.identifier,
            presentation_context_id: None,
        }
    }
}

/// N-CREATE-RSP / N-SET-RSP
#[derive(Debug)]
pub struct NormalizedResponse {
	pub message_id: US,
	pub sop_class_uid: UI,
	pub sop_instance_uid: UI,
	pub status: StatusCode,
	/// Response command field, creation or modification.
	pub command_field: US,
}

impl From<NormalizedResponse> for DicomMessage {
	#[rustfmt::skip]
	fn from(response: NormalizedResponse) -> Self {
        let command = InMemDicomObject::command_from_element_iter([
            DataElement::new(tags::AFFECTED_SOP_CLASS_UID, VR::UI, dicom_value!(Str, response.sop_class_uid)),
            DataElement::new(tags::COMMAND_FIELD, VR::US, dicom_value!(U16, [response.command_field])),
            DataElement::new(tags::MESSAGE_ID_BEING_RESPONDED_TO, VR::US, dicom_value!(U16, [response.message_id])),
            DataElement::new(tags::COMMAND_DATA_SET_TYPE, VR::US, dicom_value!(U16, [DATA_SET_MISSING])),
            DataElement::new(tags::STATUS, VR::US, dicom_value!(U16, [response.status.as_u16()])),
            DataElement::new(tags::AFFECTED_SOP_INSTANCE_UID, VR::UI, dicom_value!(Str, response.sop_instance_uid)),
        ]);

        Self {
            command,
            data: None,
            presentation_context_id: None,
        }
    }
}

/// N-ACTION-RSP
#[derive(Debug)]
pub struct ActionResponse {
	pub message_id: US,
	pub sop_class_uid: UI,
	pub sop_instance_uid: UI,
	pub action_type: US,
	pub status: StatusCode,
}

impl From<ActionResponse> for DicomMessage {
	#[rustfmt::skip]
	fn from(response: ActionResponse) -> Self {
        let command = InMemDicomObject::command_from_element_iter([
            DataElement::new(tags::AFFECTED_SOP_CLASS_UID, VR::UI, dicom_value!(Str, response.sop_class_uid)),
            DataElement::new(tags::COMMAND_FIELD, VR::US, dicom_value!(U16, [COMMAND_FIELD_NORMALIZED_ACTION_RESPONSE])),
            DataElement::new(tags::MESSAGE_ID_BEING_RESPONDED_TO, VR::US, dicom_value!(U16, [response.message_id])),
            DataElement::new(tags::COMMAND_DATA_SET_TYPE, VR::US, dicom_value!(U16, [DATA_SET_MISSING])),
            DataElement::new(tags::STATUS, VR::US, dicom_value!(U16, [response.status.as_u16()])),
            DataElement::new(tags::AFFECTED_SOP_INSTANCE_UID, VR::UI, dicom_value!(Str, response.sop_instance_uid)),
            DataElement::new(tags::ACTION_TYPE_ID, VR::US, dicom_value!(U16, [response.action_type])),
        ]);

        Self {
            command,
            data: None,
            presentation_context_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn message(command: InMemDicomObject, data: Option<InMemDicomObject>) -> DicomMessage {
		DicomMessage {
			command,
			data,
			presentation_context_id: Some(1),
		}
	}

	#[test]
	fn decodes_an_echo_request() {
		let command = InMemDicomObject::command_from_element_iter([
			DataElement::new(
				tags::COMMAND_FIELD,
				VR::US,
				dicom_value!(U16, [COMMAND_FIELD_COMPOSITE_ECHO_REQUEST]),
			),
			DataElement::new(tags::MESSAGE_ID, VR::US, dicom_value!(U16, [7])),
		]);

		let request = GatewayRequest::decode(message(command, None)).unwrap();
		assert!(matches!(request, GatewayRequest::Echo(EchoRequest { message_id: 7 })));
	}

	#[test]
	fn find_request_requires_an_identifier() {
		let command = InMemDicomObject::command_from_element_iter([DataElement::new(
			tags::COMMAND_FIELD,
			VR::US,
			dicom_value!(U16, [COMMAND_FIELD_COMPOSITE_FIND_REQUEST]),
		)]);

		let result = GatewayRequest::decode(message(command, None));
		assert!(matches!(result, Err(DecodeError::MissingDataSet)));
	}

	#[test]
	fn unknown_command_fields_are_rejected() {
		let command = InMemDicomObject::command_from_element_iter([DataElement::new(
			tags::COMMAND_FIELD,
			VR::US,
			dicom_value!(U16, [0x0001]),
		)]);

		let result = GatewayRequest::decode(message(command, None));
		assert!(matches!(result, Err(DecodeError::UnsupportedCommand(0x0001))));
	}

	#[test]
	fn action_request_requires_an_action_type() {
		let command = InMemDicomObject::command_from_element_iter([
			DataElement::new(
				tags::COMMAND_FIELD,
				VR::US,
				dicom_value!(U16, [COMMAND_FIELD_NORMALIZED_ACTION_REQUEST]),
			),
			DataElement::new(
				tags::REQUESTED_SOP_CLASS_UID,
				VR::UI,
				dicom_value!(Str, "1.2.840.10008.5.1.4.34.6.1"),
			),
		]);

		match GatewayRequest::decode(message(command, None)) {
			Err(DecodeError::MissingAttribute(tag)) => assert_eq!(tag, tags::ACTION_TYPE_ID),
			other => panic!("expected a missing attribute error, got {other:?}"),
		}
	}

	#[test]
	fn echo_response_carries_the_status() {
		let message = DicomMessage::from(EchoResponse {
			message_id: 7,
			status: StatusCode::Refused,
		});

		assert_eq!(
			message.command_int(tags::COMMAND_FIELD),
			Some(COMMAND_FIELD_COMPOSITE_ECHO_RESPONSE)
		);
		assert_eq!(message.command_int(tags::STATUS), Some(0xA700));
		assert_eq!(message.command_int(tags::MESSAGE_ID_BEING_RESPONDED_TO), Some(7));
		assert!(message.data.is_none());
	}

	#[test]
	fn pending_find_response_carries_the_identifier() {
		let message = DicomMessage::from(FindResponse {
			message_id: 3,
			sop_class_uid: UI::from(uids::MODALITY_WORKLIST_INFORMATION_MODEL_FIND),
			status: StatusCode::Pending,
			identifier: Some(InMemDicomObject::new_empty()),
		});

		assert_eq!(message.command_int(tags::STATUS), Some(0xFF00));
		assert_eq!(
			message.command_int(tags::COMMAND_DATA_SET_TYPE),
			Some(DATA_SET_EXISTS)
		);
		assert!(message.data.is_some());
	}

	#[test]
	fn terminal_find_response_has_no_data_set() {
		let message = DicomMessage::from(FindResponse {
			message_id: 3,
			sop_class_uid: UI::from(uids::MODALITY_WORKLIST_INFORMATION_MODEL_FIND),
			status: StatusCode::Cancelled,
			identifier: None,
		});

		assert_eq!(message.command_int(tags::STATUS), Some(0xFE00));
		assert_eq!(
			message.command_int(tags::COMMAND_DATA_SET_TYPE),
			Some(DATA_SET_MISSING)
		);
		assert!(message.data.is_none());
	}
}
