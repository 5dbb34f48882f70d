//! This module contains the HTTP RIS backend.
//! - Verification is implemented as a liveness probe against the RIS.
//! - Worklist queries are implemented as a work item search.
//! - MPPS reports are posted to the procedure step endpoints.
//! - Work item actions are posted to the per-item action endpoints.

pub mod action;
pub mod mpps;
pub mod verification;
pub mod worklist;

use crate::config::RisConfig;
use crate::types::{AE, US};
use reqwest::header;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{instrument, trace};
use url::Url;

/// Header carrying the application entity title of the device a request is
/// performed on behalf of.
pub const AE_TITLE_HEADER: &str = "X-AE-TITLE";

/// HTTP client for the RIS backend.
///
/// Builds authenticated requests and folds responses into plain results or
/// [`RisError`]s. It knows nothing about DICOM semantics; callers provide
/// paths and payloads.
pub struct RisClient {
	http: reqwest::Client,
	base_url: String,
	api_key: String,
	api_secret: String,
	check_timeout: Duration,
	request_timeout: Duration,
}

impl RisClient {
	pub fn new(config: &RisConfig) -> Result<Self, url::ParseError> {
		// Parsed for validation only; paths are joined textually so a base
		// URL with a path prefix keeps working.
		Url::parse(&config.host_name)?;

		Ok(Self {
			http: reqwest::Client::new(),
			base_url: config.host_name.trim_end_matches('/').to_string(),
			api_key: config.api_key.clone(),
			api_secret: config.api_secret.clone(),
			check_timeout: Duration::from_millis(config.echo_timeout),
			request_timeout: Duration::from_millis(config.request_timeout),
		})
	}

	/// A lightweight reachability check.
	#[instrument(skip_all, fields(path = path))]
	pub async fn check(&self, path: &str, caller: &AE) -> Result<(), RisError> {
		let response = self
			.http
			.get(self.url(path))
			.header(header::AUTHORIZATION, self.authorization())
			.header(header::ACCEPT, "application/json")
			.header(AE_TITLE_HEADER, caller.as_str())
			.timeout(self.check_timeout)
			.send()
			.await?;

		Self::accept(response).await.map(|_| ())
	}

	/// Submits a JSON document and returns the backend's response.
	#[instrument(skip_all, fields(path = path))]
	pub async fn post_json<T: Serialize + ?Sized>(
		&self,
		path: &str,
		caller: &AE,
		body: &T,
	) -> Result<RisResponse, RisError> {
		let response = self
			.http
			.post(self.url(path))
			.header(header::AUTHORIZATION, self.authorization())
			.header(header::ACCEPT, "application/json")
			.header(AE_TITLE_HEADER, caller.as_str())
			.json(body)
			.timeout(self.request_timeout)
			.send()
			.await?;

		Self::accept(response).await
	}

	async fn accept(response: reqwest::Response) -> Result<RisResponse, RisError> {
		let status = response.status();
		let body = response.text().await?;
		trace!(status = status.as_u16(), "Received RIS response");

		if status.is_success() {
			Ok(RisResponse {
				status: status.as_u16(),
				body,
			})
		} else {
			Err(RisError::Rejected {
				status: status.as_u16(),
				body,
			})
		}
	}

	fn url(&self, path: &str) -> String {
		format!("{}{path}", self.base_url)
	}

	fn authorization(&self) -> String {
		format!("token {}:{}", self.api_key, self.api_secret)
	}
}

/// A successful (2xx) backend response.
#[derive(Debug)]
pub struct RisResponse {
	pub status: US,
	body: String,
}

impl RisResponse {
	pub fn json(&self) -> Result<serde_json::Value, RisError> {
		serde_json::from_str(&self.body).map_err(RisError::from)
	}
}

#[derive(Debug, Error)]
pub enum RisError {
	/// The backend could not be reached or did not answer in time.
	#[error("Failed to reach the RIS backend: {0}")]
	Transport(#[from] reqwest::Error),
	/// The backend answered with a non-success status.
	#[error("RIS backend rejected the request with status {status}: {body}")]
	Rejected { status: US, body: String },
	/// The backend answered with a body that cannot be parsed.
	#[error("Failed to parse RIS response: {0}")]
	Malformed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
	use super::*;

	fn client(host_name: &str) -> RisClient {
		RisClient::new(&RisConfig {
			host_name: String::from(host_name),
			api_key: String::from("key"),
			api_secret: String::from("secret"),
			workitem_uid: String::from("AccessionNumber"),
			mpps: true,
			echo_timeout: 5000,
			request_timeout: 10_000,
		})
		.unwrap()
	}

	#[test]
	fn trailing_slash_is_trimmed() {
		let client = client("http://ris.example.com/");

		assert_eq!(
			client.url("/dicom-web/echo"),
			"http://ris.example.com/dicom-web/echo"
		);
	}

	#[test]
	fn base_path_prefix_is_preserved() {
		let client = client("http://ris.example.com/marley");

		assert_eq!(
			client.url("/dicom-web/workitems"),
			"http://ris.example.com/marley/dicom-web/workitems"
		);
	}

	#[test]
	fn token_authorization_scheme() {
		let client = client("http://ris.example.com");

		assert_eq!(client.authorization(), "token key:secret");
	}

	#[test]
	fn invalid_base_url_is_rejected() {
		let result = RisClient::new(&RisConfig {
			host_name: String::from("not a url"),
			api_key: String::new(),
			api_secret: String::new(),
			workitem_uid: String::from("AccessionNumber"),
			mpps: true,
			echo_timeout: 5000,
			request_timeout: 10_000,
		});

		assert!(result.is_err());
	}

	#[test]
	fn malformed_body_is_reported() {
		let response = RisResponse {
			status: 200,
			body: String::from("<html>not json</html>"),
		};

		assert!(matches!(response.json(), Err(RisError::Malformed(_))));
	}
}
