pub(crate) mod api;
pub(crate) mod backend;
pub(crate) mod config;
pub(crate) mod dimse;
pub(crate) mod session;
pub(crate) mod types;
pub(crate) mod utils;

use crate::config::GatewayConfig;
use crate::dimse::scp::GatewayServiceClassProvider;
use crate::session::SessionRegistry;
use tokio::signal;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn init_logger(level: tracing::Level) {
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::fmt::layer()
				.compact()
				.with_ansi(true)
				.with_file(false)
				.with_line_number(false)
				.with_target(false),
		)
		.with(
			EnvFilter::builder()
				.with_default_directive(LevelFilter::from_level(level).into())
				.from_env_lossy(),
		)
		.with(sentry::integrations::tracing::layer())
		.init();
}

fn init_sentry(config: &GatewayConfig) -> sentry::ClientInitGuard {
	let guard = sentry::init((
		// An empty string will disable Sentry
		config.telemetry.sentry.as_deref().unwrap_or_default(),
		sentry::ClientOptions {
			release: sentry::release_name!(),
			traces_sample_rate: 1.0,
			..Default::default()
		},
	));

	if let Some(dsn) = &config.telemetry.sentry {
		info!(dsn, "Enabled Sentry for tracing and error tracking");
	};

	guard
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	let config = GatewayConfig::new()?;
	let level = config
		.telemetry
		.level
		.parse()
		.unwrap_or(tracing::Level::INFO);
	init_logger(level);

	// Manually create the Tokio runtime because the Sentry client needs to be
	// created *before* the Tokio runtime, which prevents us from using the
	// #[tokio::main] macro.
	// See https://docs.sentry.io/platforms/rust/#async-main-function
	let _sentry = init_sentry(&config);

	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()?
		.block_on(async move {
			if let Err(error) = run(config).await {
				error!("Failed to start application due to error: {error}");
			}
		});
	Ok(())
}

async fn run(config: GatewayConfig) -> anyhow::Result<()> {
	info!(
		backend = config.ris.host_name,
		aet = config.dimse.aet,
		mpps = config.ris.mpps,
		"Starting up RIS bridge"
	);

	let sessions = SessionRegistry::new();
	let facade = backend::build_gateway(&config, sessions)?;
	let scp = GatewayServiceClassProvider::new(facade, config.dimse);

	tokio::select! {
		result = scp.spawn() => result,
		() = shutdown_signal() => {
			info!("Shutting down RIS bridge");
			Ok(())
		}
	}
}

async fn shutdown_signal() {
	let ctrl_c = async { signal::ctrl_c().await.unwrap() };

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.unwrap()
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
