use crate::types::{AE, US};
use async_trait::async_trait;
use dicom::object::InMemDicomObject;
use thiserror::Error;

/// Forwards generic workflow actions against a backend work item.
///
/// Unlike verification and worklist queries, failures here are surfaced to
/// the caller: an action either took effect on the backend or it did not,
/// and the requesting device must know which.
#[async_trait]
pub trait ActionService: Send + Sync {
	/// Forwards the action and returns the backend's raw HTTP status code
	/// for audit purposes.
	async fn forward(&self, request: &ActionRequest) -> Result<US, ActionError>;
}

/// A workflow action decoded by the association layer.
#[derive(Debug)]
pub struct ActionRequest {
	/// The numeric action kind as received on the wire.
	pub action_type: US,
	pub requestor: AE,
	pub dataset: InMemDicomObject,
}

/// The closed table of supported work item actions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ActionType {
	Claim = 1,
	CancelRequest = 2,
	WorkitemEvent = 3,
}

impl ActionType {
	/// The path segment of the backend endpoint handling this action.
	pub const fn path_suffix(self) -> &'static str {
		match self {
			Self::Claim => "claim",
			Self::CancelRequest => "cancelrequest",
			Self::WorkitemEvent => "workitemevent",
		}
	}
}

impl TryFrom<US> for ActionType {
	type Error = US;

	fn try_from(value: US) -> Result<Self, Self::Error> {
		match value {
			1 => Ok(Self::Claim),
			2 => Ok(Self::CancelRequest),
			3 => Ok(Self::WorkitemEvent),
			unknown => Err(unknown),
		}
	}
}

#[derive(Debug, Error)]
pub enum ActionError {
	/// The action kind is outside the known table. Failing fast here means
	/// no backend call is ever attempted for it.
	#[error("Action type {0} is not supported")]
	UnsupportedAction(US),
	/// Neither the configured identifier attribute nor the accession
	/// number is present in the dataset.
	#[error("No work item identifier in attribute '{0}'")]
	MissingIdentifier(String),
	#[error(transparent)]
	Backend {
		source: Box<dyn std::error::Error + Send + Sync>,
	},
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn action_table_is_closed() {
		assert_eq!(ActionType::try_from(1), Ok(ActionType::Claim));
		assert_eq!(ActionType::try_from(2), Ok(ActionType::CancelRequest));
		assert_eq!(ActionType::try_from(3), Ok(ActionType::WorkitemEvent));
		assert_eq!(ActionType::try_from(0), Err(0));
		assert_eq!(ActionType::try_from(4), Err(4));
	}

	#[test]
	fn path_suffixes() {
		assert_eq!(ActionType::Claim.path_suffix(), "claim");
		assert_eq!(ActionType::CancelRequest.path_suffix(), "cancelrequest");
		assert_eq!(ActionType::WorkitemEvent.path_suffix(), "workitemevent");
	}
}
