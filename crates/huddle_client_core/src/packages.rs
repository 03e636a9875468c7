#![forbid(unsafe_code)]

use std::time::Duration;

use huddle_domain::PackageId;
use huddle_util::endpoint::Endpoint;
use tracing::{debug, warn};

use crate::error::SyncError;

/// Client for the public key-package listing (`GET /packages`).
#[derive(Debug, Clone)]
pub struct PackageIndex {
	endpoint: Endpoint,
	client: reqwest::Client,
}

impl PackageIndex {
	pub fn new(endpoint: Endpoint, request_timeout: Duration) -> Result<Self, SyncError> {
		let client = reqwest::Client::builder()
			.timeout(request_timeout)
			.build()
			.map_err(|e| SyncError::PackageIndex(format!("build http client: {e}")))?;
		Ok(Self { endpoint, client })
	}

	pub fn endpoint(&self) -> &Endpoint {
		&self.endpoint
	}

	/// Fetch the package ids available for invitation.
	pub async fn list(&self) -> Result<Vec<PackageId>, SyncError> {
		let url = self.endpoint.packages_url();
		debug!(url = %url, "fetching package index");

		let resp = self.client.get(&url).send().await?;
		let status = resp.status();
		if !status.is_success() {
			warn!(url = %url, status = status.as_u16(), "package index request failed");
			return Err(SyncError::PackageIndexStatus(status.as_u16()));
		}

		let packages: Vec<PackageId> = resp.json().await?;
		debug!(count = packages.len(), "package index fetched");
		Ok(packages)
	}
}

#[cfg(test)]
mod tests {
	use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
	use tokio::net::TcpListener;

	use super::*;

	/// Serve one canned HTTP response and hand back the request line.
	async fn serve_once(status: &'static str, body: &'static str) -> (Endpoint, tokio::task::JoinHandle<String>) {
		let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
		let port = listener.local_addr().expect("addr").port();
		let task = tokio::spawn(async move {
			let (mut stream, _) = listener.accept().await.expect("accept");
			let mut buf = vec![0u8; 4096];
			let n = stream.read(&mut buf).await.expect("read");
			let request = String::from_utf8_lossy(&buf[..n]).to_string();
			let response = format!(
				"HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
				body.len()
			);
			stream.write_all(response.as_bytes()).await.expect("write");
			stream.shutdown().await.ok();
			request.lines().next().unwrap_or_default().to_string()
		});
		let endpoint = Endpoint::parse_http(&format!("http://127.0.0.1:{port}")).expect("endpoint");
		(endpoint, task)
	}

	#[tokio::test]
	async fn lists_package_ids() {
		let (endpoint, server) = serve_once("200 OK", r#"["P1","P2"]"#).await;
		let index = PackageIndex::new(endpoint, Duration::from_secs(5)).expect("client");

		let packages = index.list().await.expect("list");

		assert_eq!(packages, vec![PackageId::new("P1").unwrap(), PackageId::new("P2").unwrap()]);
		assert_eq!(server.await.expect("server"), "GET /packages HTTP/1.1");
	}

	#[tokio::test]
	async fn non_success_status_is_an_error() {
		let (endpoint, _server) = serve_once("503 Service Unavailable", "[]").await;
		let index = PackageIndex::new(endpoint, Duration::from_secs(5)).expect("client");

		let err = index.list().await.unwrap_err();

		assert!(matches!(err, SyncError::PackageIndexStatus(503)), "{err:?}");
	}

	#[tokio::test]
	async fn malformed_body_is_an_error() {
		let (endpoint, _server) = serve_once("200 OK", r#"{"packages":[]}"#).await;
		let index = PackageIndex::new(endpoint, Duration::from_secs(5)).expect("client");

		let err = index.list().await.unwrap_err();

		assert!(matches!(err, SyncError::PackageIndex(_)), "{err:?}");
	}
}
