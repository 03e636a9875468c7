#![forbid(unsafe_code)]

use std::sync::Arc;

use huddle_client_core::{PackageIndex, SocketManager, SocketState, WsConnector, load_client_config};
use huddle_domain::Identity;
use huddle_util::endpoint::Endpoint;
use tokio::sync::watch;
use tracing::{info, warn};

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: huddle_client [--server ws://host:port] [--packages http://host:port] [--identity id] [--list-packages]\n\
\n\
Options:\n\
	--server         Real-time socket server (default: config file, then ws://localhost:3000)\n\
	--packages       Package index host (default: config file, then http://localhost:3000)\n\
	--identity       Identity whose socket to open; frames are logged until Ctrl-C\n\
	--list-packages  Print the package index and continue\n\
	--help           Show this help\n\
\n\
Notes:\n\
	Config is read from <config dir>/huddle/client.toml; HUDDLE_* env vars override it.\n\
\n\
Examples:\n\
	huddle_client --list-packages\n\
	huddle_client --server ws://127.0.0.1:3000 --identity dGVzdC11c2Vy\n"
	);
	std::process::exit(2)
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,huddle_client_core=debug".to_string());
	tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[derive(Debug, Default)]
struct Args {
	server: Option<Endpoint>,
	packages: Option<Endpoint>,
	identity: Option<Identity>,
	list_packages: bool,
}

fn parse_args() -> Args {
	let mut args = Args::default();

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--server" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				args.server = Some(Endpoint::parse_socket(&v).unwrap_or_else(|e| {
					eprintln!("Invalid --server value: {v}\n{e}");
					usage_and_exit()
				}));
			}
			"--packages" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				args.packages = Some(Endpoint::parse_http(&v).unwrap_or_else(|e| {
					eprintln!("Invalid --packages value: {v}\n{e}");
					usage_and_exit()
				}));
			}
			"--identity" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				args.identity = Some(Identity::new(v.trim()).unwrap_or_else(|e| {
					eprintln!("Invalid --identity value: {v}\n{e}");
					usage_and_exit()
				}));
			}
			"--list-packages" => args.list_packages = true,
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	if args.identity.is_none() && !args.list_packages {
		eprintln!("Nothing to do: pass --identity and/or --list-packages");
		usage_and_exit();
	}

	args
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();
	let args = parse_args();

	let mut cfg = load_client_config()?;
	if let Some(server) = args.server {
		cfg.server = server;
	}
	if let Some(packages) = args.packages {
		cfg.package_index = packages;
	}

	if args.list_packages {
		let index = PackageIndex::new(cfg.package_index.clone(), cfg.request_timeout)?;
		let packages = index.list().await?;
		info!(count = packages.len(), index = %cfg.package_index, "package index");
		for package in packages {
			println!("{package}");
		}
	}

	let Some(identity) = args.identity else {
		return Ok(());
	};

	let (_identity_tx, identity_rx) = watch::channel(Some(identity));
	let connector = Arc::new(WsConnector::new(cfg.connect_timeout));
	let (socket, task) = SocketManager::start(cfg.server.clone(), identity_rx, connector);
	let (_subscription, mut frames) = socket.subscribe();
	let mut state = socket.state();
	let ctrl_c = tokio::signal::ctrl_c();
	tokio::pin!(ctrl_c);

	loop {
		tokio::select! {
			_ = &mut ctrl_c => {
				info!("interrupted");
				break;
			}
			changed = state.changed() => {
				if changed.is_err() {
					break;
				}
				let current = state.borrow_and_update().clone();
				match current {
					SocketState::Connected { identity, generation } => info!(identity = %identity, generation, "connected"),
					SocketState::Connecting { identity } => info!(identity = %identity, "connecting"),
					SocketState::Disconnected { reason } => {
						warn!(reason = reason.as_deref().unwrap_or("-"), "disconnected");
						break;
					}
				}
			}
			inbound = frames.recv() => {
				let Some(inbound) = inbound else {
					break;
				};
				println!(
					"[{} #{}] {} frame, {} bytes",
					inbound.identity,
					inbound.generation,
					inbound.frame.kind(),
					inbound.frame.len()
				);
			}
		}
	}

	task.shutdown().await;
	Ok(())
}
