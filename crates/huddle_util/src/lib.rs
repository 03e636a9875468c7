#![forbid(unsafe_code)]

pub mod endpoint {
	use core::fmt;

	/// URL schemes understood by the client.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub enum Scheme {
		Ws,
		Wss,
		Http,
		Https,
	}

	impl Scheme {
		pub const fn as_str(self) -> &'static str {
			match self {
				Scheme::Ws => "ws",
				Scheme::Wss => "wss",
				Scheme::Http => "http",
				Scheme::Https => "https",
			}
		}

		pub const fn default_port(self) -> u16 {
			match self {
				Scheme::Ws | Scheme::Http => 80,
				Scheme::Wss | Scheme::Https => 443,
			}
		}

		fn parse(s: &str) -> Option<Self> {
			match s {
				"ws" => Some(Scheme::Ws),
				"wss" => Some(Scheme::Wss),
				"http" => Some(Scheme::Http),
				"https" => Some(Scheme::Https),
				_ => None,
			}
		}
	}

	/// Socket-side schemes.
	pub const SOCKET_SCHEMES: &[Scheme] = &[Scheme::Ws, Scheme::Wss];

	/// HTTP-side schemes.
	pub const HTTP_SCHEMES: &[Scheme] = &[Scheme::Http, Scheme::Https];

	/// Parsed `scheme://host[:port]` endpoint.
	#[derive(Debug, Clone, PartialEq, Eq, Hash)]
	pub struct Endpoint {
		pub scheme: Scheme,
		pub host: String,
		pub port: u16,
	}

	impl Endpoint {
		/// Returns `host:port` (host preserved, IPv6 stays bracketed).
		pub fn hostport(&self) -> String {
			format!("{}:{}", self.host, self.port)
		}

		/// Returns `scheme://host:port` without a trailing slash.
		pub fn base_url(&self) -> String {
			format!("{}://{}", self.scheme.as_str(), self.hostport())
		}

		/// Parse `ws://host[:port]` or `wss://host[:port]`.
		pub fn parse_socket(s: &str) -> Result<Self, String> {
			Self::parse_with(s, SOCKET_SCHEMES)
		}

		/// Parse `http://host[:port]` or `https://host[:port]`.
		pub fn parse_http(s: &str) -> Result<Self, String> {
			Self::parse_with(s, HTTP_SCHEMES)
		}

		/// Parse an endpoint restricted to `allowed` schemes. A trailing `/` is tolerated, any other
		/// path, query or fragment is rejected.
		pub fn parse_with(s: &str, allowed: &[Scheme]) -> Result<Self, String> {
			let expected = allowed
				.iter()
				.map(|s| format!("{}://host:port", s.as_str()))
				.collect::<Vec<_>>()
				.join(" or ");

			let s = s.trim();
			if s.is_empty() {
				return Err(format!("endpoint must be non-empty (expected {expected})"));
			}

			let (scheme_s, rest) = s
				.split_once("://")
				.ok_or_else(|| format!("invalid endpoint (expected {expected}): {s}"))?;

			let scheme = Scheme::parse(&scheme_s.to_ascii_lowercase())
				.filter(|scheme| allowed.contains(scheme))
				.ok_or_else(|| format!("unsupported scheme {scheme_s:?} (expected {expected}): {s}"))?;

			let rest = rest.strip_suffix('/').unwrap_or(rest);
			if rest.contains('/') || rest.contains('?') || rest.contains('#') {
				return Err(format!(
					"invalid endpoint (expected {expected} without path/query/fragment): {s}"
				));
			}

			let (host, port) = match rest.rsplit_once(':') {
				// `[::1]` alone has a colon inside the brackets but no port.
				Some((host, port_str)) if !port_str.ends_with(']') => {
					let port: u16 = port_str
						.trim()
						.parse()
						.map_err(|_| format!("invalid endpoint port (expected 1..=65535): {s}"))?;
					(host.trim(), port)
				}
				_ => (rest.trim(), scheme.default_port()),
			};

			if host.is_empty() {
				return Err(format!("invalid endpoint host (expected {expected}): {s}"));
			}

			if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
				return Err(format!(
					"invalid endpoint host (IPv6 must be bracketed like ws://[::1]:3000): {s}"
				));
			}

			if port == 0 {
				return Err(format!("invalid endpoint port (expected 1..=65535): {s}"));
			}

			Ok(Self {
				scheme,
				host: host.to_string(),
				port,
			})
		}

		/// Real-time socket address for `identity`: `<base>/<identity>/messages`.
		pub fn socket_url(&self, identity: &str) -> String {
			format!("{}/{}/messages", self.base_url(), identity)
		}

		/// Package index listing: `<base>/packages`.
		pub fn packages_url(&self) -> String {
			format!("{}/packages", self.base_url())
		}
	}

	impl fmt::Display for Endpoint {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			f.write_str(&self.base_url())
		}
	}

	/// Validate a socket endpoint.
	pub fn validate_socket_endpoint(s: &str) -> Result<(), String> {
		let _ = Endpoint::parse_socket(s)?;
		Ok(())
	}

	/// Validate an HTTP endpoint.
	pub fn validate_http_endpoint(s: &str) -> Result<(), String> {
		let _ = Endpoint::parse_http(s)?;
		Ok(())
	}

	#[cfg(test)]
	mod tests {
		use super::*;

		#[test]
		fn parses_socket_hostname() {
			let e = Endpoint::parse_socket("ws://localhost:3000").unwrap();
			assert_eq!(e.scheme, Scheme::Ws);
			assert_eq!(e.host, "localhost");
			assert_eq!(e.port, 3000);
			assert_eq!(e.hostport(), "localhost:3000");
		}

		#[test]
		fn defaults_port_from_scheme() {
			assert_eq!(Endpoint::parse_socket("wss://chat.example.com").unwrap().port, 443);
			assert_eq!(Endpoint::parse_http("http://index.example.com/").unwrap().port, 80);
		}

		#[test]
		fn parses_bracketed_ipv6() {
			let e = Endpoint::parse_http("http://[::1]:3000").unwrap();
			assert_eq!(e.host, "[::1]");
			assert_eq!(e.port, 3000);

			let e = Endpoint::parse_socket("ws://[::1]").unwrap();
			assert_eq!(e.host, "[::1]");
			assert_eq!(e.port, 80);
		}

		#[test]
		fn rejects_wrong_scheme_family() {
			assert!(Endpoint::parse_socket("http://localhost:3000").is_err());
			assert!(Endpoint::parse_http("ws://localhost:3000").is_err());
			assert!(Endpoint::parse_http("localhost:3000").is_err());
		}

		#[test]
		fn rejects_path_query_fragment() {
			assert!(Endpoint::parse_socket("ws://127.0.0.1:3000/x").is_err());
			assert!(Endpoint::parse_socket("ws://127.0.0.1:3000?x=y").is_err());
			assert!(Endpoint::parse_socket("ws://127.0.0.1:3000#frag").is_err());
		}

		#[test]
		fn rejects_port_zero_and_garbage_port() {
			assert!(Endpoint::parse_socket("ws://127.0.0.1:0").is_err());
			assert!(Endpoint::parse_socket("ws://127.0.0.1:http").is_err());
		}

		#[test]
		fn rejects_unbracketed_ipv6() {
			let err = Endpoint::parse_socket("ws://::1:3000").unwrap_err();
			assert!(err.to_lowercase().contains("ipv6"));
		}

		#[test]
		fn builds_socket_and_packages_urls() {
			let ws = Endpoint::parse_socket("ws://localhost:3000").unwrap();
			assert_eq!(ws.socket_url("dXNlcjE"), "ws://localhost:3000/dXNlcjE/messages");

			let http = Endpoint::parse_http("http://localhost:3000/").unwrap();
			assert_eq!(http.packages_url(), "http://localhost:3000/packages");
		}
	}
}
