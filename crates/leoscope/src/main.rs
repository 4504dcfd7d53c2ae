mod cli;
mod config;
mod logging;

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use config::{AgentArgs, Cli, Command, CoordinatorArgs};

#[tokio::main]
async fn main() {
    let parsed = Cli::parse();
    let _logging_guard = logging::init(&parsed.logging).expect("failed to initialize logging");

    let code = dispatch(parsed.command).await;
    std::process::exit(code);
}

async fn dispatch(command: Command) -> i32 {
    match command {
        Command::Coordinator(args) => match run_coordinator(args).await {
            Ok(()) => 0,
            Err(e) => {
                tracing::error!(error = %e, "coordinator exited with an error");
                1
            }
        },
        Command::Agent(args) => match run_agent(args).await {
            Ok(()) => 0,
            Err(e) => {
                tracing::error!(error = %e, "agent exited with an error");
                1
            }
        },
        Command::User { command, conn } => run_resource(conn, |c| cli::user::run(c, command)).await,
        Command::Node { command, conn } => run_resource(conn, |c| cli::node::run(c, command)).await,
        Command::Job { command, conn } => run_resource(conn, |c| cli::job::run(c, command)).await,
        Command::Run { command, conn } => run_resource(conn, |c| cli::run::run(c, command)).await,
        Command::Config { command, conn } => run_resource(conn, |c| cli::config::run(c, command)).await,
    }
}

/// Resolves connection credentials and runs a resource subcommand against
/// them, mapping the result onto the CLI's exit-code contract.
async fn run_resource<F, Fut>(conn: config::ConnArgs, f: F) -> i32
where
    F: FnOnce(&cli::Connection) -> Fut,
    Fut: std::future::Future<Output = Result<(), cli::CliError>>,
{
    let conn = match conn.into_connection() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return 3;
        }
    };
    match f(&conn).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    }
}

async fn run_coordinator(args: CoordinatorArgs) -> Result<(), anyhow::Error> {
    let config = Arc::new(args.into_config()?);
    let pool = leoscope_storage::db::init(&config.data_dir).await?;

    leoscope_coordinator::retention::spawn(pool.clone(), config.run_retention_days);

    let state = leoscope_coordinator::AppState {
        config: config.clone(),
        db: pool,
        admission: leoscope_coordinator::admission::AdmissionGate::default(),
    };
    let app = leoscope_coordinator::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    let addr = listener.local_addr()?;
    tracing::info!(
        bind = %addr,
        data_dir = %config.data_dir.display(),
        "leoscope coordinator started"
    );

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown_signal.cancel();
        }
    });

    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn run_agent(args: AgentArgs) -> Result<(), anyhow::Error> {
    let config = args.into_config()?;

    let creds = leoscope_node::rpc_client::RpcCredentials {
        caller_id: args.node_id.clone(),
        access_token: args.access_token.clone(),
    };
    let rpc = leoscope_node::rpc_client::RpcClient::new(
        &args.coordinator_url,
        creds,
        config.rpc_timeout,
        config.rpc_retry_attempts,
    )?;

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown_signal.cancel();
        }
    });

    tracing::info!(node_id = %args.node_id, coordinator_url = %args.coordinator_url, "leoscope agent started");
    leoscope_node::run_node(rpc, config, args.node_id.clone(), shutdown).await
}
