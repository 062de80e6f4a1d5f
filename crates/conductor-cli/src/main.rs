use clap::{Parser, Subcommand};
use conductor_agent::ChatRequest;
use conductor_cli::{router, ConductorConfig};
use conductor_core::ExecutionTracer;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conductor", about = "Conductor: LLM tool-orchestration engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "conductor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Send one message and print the JSON response
    Ask {
        /// Caller identifier used for tool server selection
        #[arg(short, long, default_value = "local")]
        user: String,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
        message: String,
    },
    /// List the tools available to a caller
    Tools {
        #[arg(short, long, default_value = "local")]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = ConductorConfig::load(&cli.config).await?;
    let orchestrator = Arc::new(config.build_orchestrator().await?);

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);
            let addr = format!("{host}:{port}");

            let app = router(orchestrator);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Conductor listening on {}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Commands::Ask {
            user,
            conversation,
            message,
        } => {
            let cancel = cancel_on_ctrl_c();
            let mut request = ChatRequest::new(user, message);
            request.conversation_id = conversation;

            match orchestrator.handle(request, &cancel).await {
                Ok(response) => println!("{}", serde_json::to_string_pretty(&response)?),
                Err(failure) => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&failure.into_envelope())?
                    );
                    std::process::exit(1);
                }
            }
        }
        Commands::Tools { user } => {
            let cancel = cancel_on_ctrl_c();
            let mut tracer = ExecutionTracer::new();
            let registry = orchestrator
                .aggregator()
                .build(&user, &mut tracer, &cancel)
                .await?;

            for entry in tracer.entries() {
                eprintln!("[{:?}] {}", entry.level, entry.message);
            }
            if registry.is_empty() {
                println!("No tools available for '{user}'.");
                println!("Configure tool servers in conductor.toml under [[servers]]");
            } else {
                println!("Tools available to '{user}':");
                for tool in registry.descriptors() {
                    println!("  {}: {}", tool.wire_name, tool.description);
                }
                println!("\nTotal: {} tool(s)", registry.len());
            }
        }
    }

    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
