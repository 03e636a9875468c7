#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use huddle_util::endpoint::Endpoint;
use serde::Deserialize;
use tracing::{info, warn};

pub const DEFAULT_SERVER_ENDPOINT: &str = "ws://localhost:3000";
pub const DEFAULT_PACKAGE_INDEX: &str = "http://localhost:3000";

pub const SERVER_ENDPOINT_ENV: &str = "HUDDLE_SERVER_ENDPOINT";
pub const PACKAGE_INDEX_ENV: &str = "HUDDLE_PACKAGE_INDEX_URL";
pub const CONNECT_TIMEOUT_ENV: &str = "HUDDLE_CONNECT_TIMEOUT_MS";
pub const REQUEST_TIMEOUT_ENV: &str = "HUDDLE_REQUEST_TIMEOUT_MS";

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
	/// Real-time socket server; the per-identity path is appended to it.
	pub server: Endpoint,
	/// Host serving `GET /packages`.
	pub package_index: Endpoint,
	pub connect_timeout: Duration,
	pub request_timeout: Duration,
	/// Buffer of the store change broadcast; slow readers see `Lagged` past it.
	pub store_change_capacity: usize,
	/// Buffer of the `SyncEvent` broadcast.
	pub event_capacity: usize,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			server: Endpoint::parse_socket(DEFAULT_SERVER_ENDPOINT).expect("valid default server endpoint"),
			package_index: Endpoint::parse_http(DEFAULT_PACKAGE_INDEX).expect("valid default package index"),
			connect_timeout: Duration::from_secs(15),
			request_timeout: Duration::from_secs(10),
			store_change_capacity: 1024,
			event_capacity: 256,
		}
	}
}

/// Default config path: `<config dir>/huddle/client.toml`, or `~/.config/huddle/client.toml`
/// where the platform has no config dir.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	if let Some(dir) = dirs::config_dir() {
		return Ok(dir.join("huddle").join("client.toml"));
	}
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".config").join("huddle").join("client.toml"))
}

/// Load the client config from TOML and env overrides.
pub fn load_client_config() -> anyhow::Result<ClientConfig> {
	let path = default_config_path()?;
	load_client_config_from_path(&path)
}

/// Same as `load_client_config` but with an explicit config path.
pub fn load_client_config_from_path(path: &Path) -> anyhow::Result<ClientConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ClientConfig::from_file(file_cfg);
	apply_env_overrides(&mut cfg);
	Ok(cfg)
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	server_endpoint: Option<String>,
	package_index_url: Option<String>,
	connect_timeout_ms: Option<u64>,
	request_timeout_ms: Option<u64>,
	store_change_capacity: Option<usize>,
	event_capacity: Option<usize>,
}

impl ClientConfig {
	fn from_file(file: FileConfig) -> Self {
		let defaults = ClientConfig::default();

		let server = file
			.server_endpoint
			.filter(|s| !s.trim().is_empty())
			.and_then(|s| match Endpoint::parse_socket(&s) {
				Ok(ep) => Some(ep),
				Err(e) => {
					warn!(value = %s, error = %e, "client config: invalid server_endpoint; using default");
					None
				}
			})
			.unwrap_or(defaults.server);

		let package_index = file
			.package_index_url
			.filter(|s| !s.trim().is_empty())
			.and_then(|s| match Endpoint::parse_http(&s) {
				Ok(ep) => Some(ep),
				Err(e) => {
					warn!(value = %s, error = %e, "client config: invalid package_index_url; using default");
					None
				}
			})
			.unwrap_or(defaults.package_index);

		Self {
			server,
			package_index,
			connect_timeout: file
				.connect_timeout_ms
				.filter(|v| *v > 0)
				.map(Duration::from_millis)
				.unwrap_or(defaults.connect_timeout),
			request_timeout: file
				.request_timeout_ms
				.filter(|v| *v > 0)
				.map(Duration::from_millis)
				.unwrap_or(defaults.request_timeout),
			store_change_capacity: file
				.store_change_capacity
				.filter(|v| *v > 0)
				.unwrap_or(defaults.store_change_capacity),
			event_capacity: file.event_capacity.filter(|v| *v > 0).unwrap_or(defaults.event_capacity),
		}
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut ClientConfig) {
	apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

/// Apply overrides from any key/value source; `apply_env_overrides` feeds it the process env.
pub(crate) fn apply_overrides_from(cfg: &mut ClientConfig, lookup: impl Fn(&str) -> Option<String>) {
	if let Some(v) = lookup(SERVER_ENDPOINT_ENV) {
		let v = v.trim();
		if !v.is_empty() {
			match Endpoint::parse_socket(v) {
				Ok(ep) => {
					cfg.server = ep;
					info!(server = %cfg.server, "client config: server_endpoint overridden by env");
				}
				Err(e) => warn!(value = %v, error = %e, "client config: ignoring invalid {SERVER_ENDPOINT_ENV}"),
			}
		}
	}
	if let Some(v) = lookup(PACKAGE_INDEX_ENV) {
		let v = v.trim();
		if !v.is_empty() {
			match Endpoint::parse_http(v) {
				Ok(ep) => {
					cfg.package_index = ep;
					info!(package_index = %cfg.package_index, "client config: package_index_url overridden by env");
				}
				Err(e) => warn!(value = %v, error = %e, "client config: ignoring invalid {PACKAGE_INDEX_ENV}"),
			}
		}
	}
	if let Some(ms) = lookup(CONNECT_TIMEOUT_ENV).and_then(|v| parse_env_millis(CONNECT_TIMEOUT_ENV, &v)) {
		cfg.connect_timeout = Duration::from_millis(ms);
		info!(ms, "client config: connect_timeout overridden by env");
	}
	if let Some(ms) = lookup(REQUEST_TIMEOUT_ENV).and_then(|v| parse_env_millis(REQUEST_TIMEOUT_ENV, &v)) {
		cfg.request_timeout = Duration::from_millis(ms);
		info!(ms, "client config: request_timeout overridden by env");
	}
}

fn parse_env_millis(key: &str, v: &str) -> Option<u64> {
	let v = v.trim();
	if v.is_empty() {
		return None;
	}
	match v.parse::<u64>() {
		Ok(ms) if ms > 0 => Some(ms),
		_ => {
			warn!(key, value = %v, "client config: ignoring invalid millisecond value");
			None
		}
	}
}
