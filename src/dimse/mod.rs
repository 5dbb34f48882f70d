//! The DIMSE adapter between the wire and the gateway facade.
//!
//! Association establishment, presentation context negotiation and PDU
//! framing are handled by the `dicom-ul` upper layer; this module bridges
//! its blocking I/O into the async runtime, decodes messages into request
//! objects and writes the facade's status codes back as responses.

pub mod association;
pub mod messages;
pub mod scp;

use association::{Association, AssociationError};
use dicom::dictionary_std::tags;
use dicom::encoding::TransferSyntaxIndex;
use dicom::object::mem::InMemElement;
use dicom::object::{InMemDicomObject, Tag};
use dicom::transfer_syntax::entries::IMPLICIT_VR_LITTLE_ENDIAN;
use dicom::transfer_syntax::TransferSyntaxRegistry;
use dicom::ul::pdu::{PDataValue, PDataValueType};
use dicom::ul::Pdu;
use std::fmt::{Debug, Formatter};
use std::time::Duration;
use thiserror::Error;

use crate::types::{UI, US};

/// Should be set for [`tags::COMMAND_DATA_SET_TYPE`] if a DICOM message contains a data set.
/// For reading DICOM messages, prefer checking if (command_data_set_type != DATA_SET_MISSING)
/// as AEs are free to choose another value for a truthy state.
pub const DATA_SET_EXISTS: US = 0x0102;
/// Should be set for [`tags::COMMAND_DATA_SET_TYPE`] if a DICOM message has no data set.
pub const DATA_SET_MISSING: US = 0x0101; // DICOM NULL

/// Represents a DICOM message composed of a command set followed by an optional data set.
/// <https://dicom.nema.org/medical/dicom/current/output/chtml/part07/sect_6.3.html>
pub struct DicomMessage {
	/// The command set.
	pub command: InMemDicomObject,
	/// The data set.
	pub data: Option<InMemDicomObject>,
	/// The presentation context id
	pub presentation_context_id: Option<u8>,
}

impl Debug for DicomMessage {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		if self.data.is_some() {
			write!(f, "DicomMessage {{ command, data }}")
		} else {
			write!(f, "DicomMessage {{ command }}")
		}
	}
}

impl DicomMessage {
	/// Reads a numeric attribute from the command set.
	pub fn command_int(&self, tag: Tag) -> Option<US> {
		self.command
			.get(tag)
			.map(InMemElement::to_int::<US>)
			.and_then(Result::ok)
	}

	/// Reads a string attribute from the command set.
	pub fn command_str(&self, tag: Tag) -> Option<UI> {
		self.command
			.get(tag)
			.map(InMemElement::to_str)
			.and_then(Result::ok)
			.map(|value| value.trim_end_matches([' ', '\0']).to_string())
	}
}

#[derive(Debug, Error)]
pub enum ReadError {
	#[error("Failed to read DICOM object: {0}")]
	Reader(#[from] dicom::object::ReadError),
	#[error("Received unexpected PDU {0:?}")]
	UnexpectedPdu(Pdu),
	#[error("Received fragments out of order")]
	OutOfOrder,
	#[error("Failed to receive PDU: {0}")]
	Association(#[from] AssociationError),
	#[error(transparent)]
	Negotiation(#[from] NegotiationError),
}

#[derive(Debug, Error)]
pub enum WriteError {
	#[error("Failed to write DICOM object: {0}")]
	Writer(#[from] dicom::object::WriteError),
	#[error("Failed to send PDU: {0}")]
	Association(#[from] AssociationError),
	#[error(transparent)]
	Negotiation(#[from] NegotiationError),
}

#[derive(Debug, Error)]
pub enum NegotiationError {
	#[error("Unknown transfer syntax with UID '{0}'")]
	UnknownTransferSyntax(UI),
	#[error("Failed to negotiate a presentation context")]
	NoPresentationContext,
}

/// Reads one complete DICOM message, reassembling fragmented P-DATA
/// values. Command sets are always implicit VR little endian; data sets
/// use the transfer syntax of their presentation context.
pub async fn read_message<A: Association>(
	association: &A,
	timeout: Duration,
) -> Result<DicomMessage, ReadError> {
	let mut command_fragments = Vec::new();
	let mut data_fragments = Vec::new();
	let mut message_command: Option<InMemDicomObject> = None;

	loop {
		let pdu = association.receive(timeout).await?;
		let Pdu::PData { data } = pdu else {
			return Err(ReadError::UnexpectedPdu(pdu));
		};

		for mut pdv in data {
			match pdv.value_type {
				PDataValueType::Command => {
					if message_command.is_some() {
						// The command set is already complete; another
						// command fragment is out of order.
						return Err(ReadError::OutOfOrder);
					}
					command_fragments.append(&mut pdv.data);
					if pdv.is_last {
						let command = InMemDicomObject::read_dataset_with_ts(
							command_fragments.as_slice(),
							&IMPLICIT_VR_LITTLE_ENDIAN.erased(),
						)?;
						let has_data_set = command
							.get(tags::COMMAND_DATA_SET_TYPE)
							.map(InMemElement::to_int::<US>)
							.and_then(Result::ok)
							.is_some_and(|value| value != DATA_SET_MISSING);

						if has_data_set {
							message_command = Some(command);
						} else {
							return Ok(DicomMessage {
								command,
								data: None,
								presentation_context_id: Some(pdv.presentation_context_id),
							});
						}
					}
				}
				PDataValueType::Data => {
					if message_command.is_none() {
						// Data fragments may only follow a complete command set.
						return Err(ReadError::OutOfOrder);
					}
					data_fragments.append(&mut pdv.data);
					if pdv.is_last {
						let ts_uid =
							transfer_syntax_for(association, pdv.presentation_context_id)?;
						let Some(transfer_syntax) = TransferSyntaxRegistry.get(&ts_uid) else {
							return Err(NegotiationError::UnknownTransferSyntax(ts_uid).into());
						};
						let data = InMemDicomObject::read_dataset_with_ts(
							data_fragments.as_slice(),
							transfer_syntax,
						)?;
						let command = message_command.take().ok_or(ReadError::OutOfOrder)?;

						return Ok(DicomMessage {
							command,
							data: Some(data),
							presentation_context_id: Some(pdv.presentation_context_id),
						});
					}
				}
			}
		}
	}
}

/// Writes one DICOM message on the given presentation context.
pub async fn write_message<A: Association>(
	association: &A,
	message: impl Into<DicomMessage>,
	presentation_context_id: u8,
	timeout: Duration,
) -> Result<(), WriteError> {
	let message: DicomMessage = message.into();

	let mut command_buf = Vec::new();
	message
		.command
		.write_dataset_with_ts(&mut command_buf, &IMPLICIT_VR_LITTLE_ENDIAN.erased())?;

	let command_pdu = Pdu::PData {
		data: vec![PDataValue {
			value_type: PDataValueType::Command,
			presentation_context_id,
			is_last: true,
			data: command_buf,
		}],
	};
	association.send(command_pdu, timeout).await?;

	if let Some(data) = message.data {
		let ts_uid = transfer_syntax_for(association, presentation_context_id)?;
		let Some(transfer_syntax) = TransferSyntaxRegistry.get(&ts_uid) else {
			return Err(NegotiationError::UnknownTransferSyntax(ts_uid).into());
		};
		let mut data_buf = Vec::new();
		data.write_dataset_with_ts(&mut data_buf, transfer_syntax)?;

		let data_pdu = Pdu::PData {
			data: vec![PDataValue {
				value_type: PDataValueType::Data,
				presentation_context_id,
				is_last: true,
				data: data_buf,
			}],
		};
		association.send(data_pdu, timeout).await?;
	}

	Ok(())
}

fn transfer_syntax_for<A: Association>(
	association: &A,
	presentation_context_id: u8,
) -> Result<UI, NegotiationError> {
	association
		.presentation_contexts()
		.iter()
		.find(|pctx| pctx.id == presentation_context_id)
		.map(|pctx| UI::from(&pctx.transfer_syntax))
		.ok_or(NegotiationError::NoPresentationContext)
}
