/// UI (Unique Identifier) value representation.
pub type UI = String;

/// US (Unsigned Short) value representation.
pub type US = u16;

/// AE (Application Entity) value representation.
pub type AE = String;

/// Status codes returned to the association layer.
/// This is the closed vocabulary the gateway replies with; every backend
/// outcome is folded into one of these values.
/// <https://dicom.nema.org/medical/dicom/current/output/chtml/part07/chapter_C.html>
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StatusCode {
	/// The operation was accepted (0x0000).
	Success,
	/// More worklist matches follow (0xFF00).
	Pending,
	/// The query stopped at the caller's request (0xFE00).
	Cancelled,
	/// The upstream backend could not be verified (0xA700).
	Refused,
	/// The backend rejected or could not process the report (0x0110).
	ProcessingFailure,
}

impl StatusCode {
	pub const fn as_u16(self) -> US {
		match self {
			Self::Success => 0x0000,
			Self::Pending => 0xFF00,
			Self::Cancelled => 0xFE00,
			Self::Refused => 0xA700,
			Self::ProcessingFailure => 0x0110,
		}
	}
}

impl From<StatusCode> for US {
	fn from(status: StatusCode) -> Self {
		status.as_u16()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_codes_match_part7() {
		assert_eq!(StatusCode::Success.as_u16(), 0x0000);
		assert_eq!(StatusCode::Pending.as_u16(), 0xFF00);
		assert_eq!(StatusCode::Cancelled.as_u16(), 0xFE00);
		assert_eq!(StatusCode::Refused.as_u16(), 0xA700);
		assert_eq!(StatusCode::ProcessingFailure.as_u16(), 0x0110);
	}
}
