use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};

/// Application configuration, read once at startup.
/// Sources are layered: compiled-in defaults, an optional `config.toml` in
/// the working directory and environment variables prefixed with
/// `RIS_BRIDGE`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
	pub telemetry: TelemetryConfig,
	#[serde(default)]
	pub dimse: DimseServerConfig,
	pub ris: RisConfig,
}

impl GatewayConfig {
	pub fn new() -> Result<Self, config::ConfigError> {
		use config::Config;
		let s = Config::builder()
			.add_source(config::File::from_str(
				include_str!("defaults.toml"),
				config::FileFormat::Toml,
			))
			.add_source(config::File::with_name("config.toml").required(false))
			.add_source(config::Environment::with_prefix("RIS_BRIDGE").separator("__"))
			.build()?;

		s.try_deserialize()
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
	/// Log level. Also configurable via the RUST_LOG environment variable.
	pub level: String,
	/// Sentry DSN for error tracking. An empty value disables Sentry.
	pub sentry: Option<String>,
}

/// Settings for the DIMSE listener that modalities connect to.
#[derive(Debug, Clone, Deserialize)]
pub struct DimseServerConfig {
	/// The application entity title this gateway presents.
	pub aet: String,
	pub interface: IpAddr,
	pub port: u16,
	/// Upper bound on concurrently open associations.
	pub max_associations: usize,
	/// Restricts the offered transfer syntaxes to uncompressed ones.
	pub uncompressed: bool,
}

impl Default for DimseServerConfig {
	fn default() -> Self {
		Self {
			aet: String::from("RIS-BRIDGE"),
			interface: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
			port: 11112,
			max_associations: 5,
			uncompressed: true,
		}
	}
}

/// Connection settings for the HTTP RIS backend.
#[derive(Debug, Clone, Deserialize)]
pub struct RisConfig {
	/// Base URL of the RIS, e.g. `https://ris.example.com`.
	pub host_name: String,
	pub api_key: String,
	pub api_secret: String,
	/// Name of the dataset attribute that carries the work item identifier.
	pub workitem_uid: String,
	/// Enables MPPS reporting and UPS action forwarding for this deployment.
	pub mpps: bool,
	/// Timeout for the lightweight verification check in milliseconds.
	pub echo_timeout: u64,
	/// Timeout for query and forwarding calls in milliseconds.
	pub request_timeout: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_deserialize() {
		let config: GatewayConfig = config::Config::builder()
			.add_source(config::File::from_str(
				include_str!("defaults.toml"),
				config::FileFormat::Toml,
			))
			.build()
			.unwrap()
			.try_deserialize()
			.unwrap();

		assert_eq!(config.telemetry.level, "INFO");
		assert_eq!(config.dimse.max_associations, 5);
		assert_eq!(config.ris.workitem_uid, "AccessionNumber");
		assert!(config.ris.mpps);
	}
}
