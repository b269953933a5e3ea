use burattino::{
    events::{EventSink, JsonLinesEvents, TracingEvents},
    server::{bind_socket, run_controlplane, Controller, ControllerConfig, DEFAULT_CONTROL_PORT},
};
use clap::Parser;
use eyre::WrapErr;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tracing::{info, level_filters::LevelFilter, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Opts {
    #[clap(short, long, default_value_t = DEFAULT_CONTROL_PORT, env = "CONTROL_PORT")]
    control_port: u16,
    #[clap(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST), env = "CONTROL_HOST")]
    control_host: IpAddr,
    #[clap(short, long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED), env = "MOCK_HOST")]
    mock_host: IpAddr,
    /// How long a reset waits for in-flight mock requests.
    #[clap(long, default_value_t = 5000, env = "GRACE_PERIOD_MS")]
    grace_period_ms: u64,
    /// Append one JSON record per event to this file instead of logging them.
    #[clap(long, env = "EVENT_LOG")]
    event_log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let opts = Opts::parse();

    let subscriber = FmtSubscriber::builder()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_max_level(Level::INFO)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let events: Arc<dyn EventSink> = match &opts.event_log {
        Some(path) => Arc::new(
            JsonLinesEvents::open(path)
                .wrap_err_with(|| format!("cannot open event log {}", path.display()))?,
        ),
        None => Arc::new(TracingEvents),
    };
    let controller = Controller::with_events(
        ControllerConfig {
            mock_host: opts.mock_host,
            shutdown_grace: Duration::from_millis(opts.grace_period_ms),
        },
        events,
    );

    let control = bind_socket(SocketAddr::new(opts.control_host, opts.control_port))
        .await
        .map_err(|err| eyre::eyre!(err))
        .wrap_err("cannot bind control plane")?;
    info!(
        "Control Port on http://{}:{}/",
        opts.control_host, control.port
    );

    tokio::select! {
        result = run_controlplane(control.listener, controller.clone()) => {
            result.map_err(|err| eyre::eyre!(err))?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.wrap_err("cannot listen for ctrl-c")?;
            info!("Shutting down");
            controller.reset_all().await;
        }
    }
    Ok(())
}
