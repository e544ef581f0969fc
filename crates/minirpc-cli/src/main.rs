//! # minirpc CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Serve the demo user-service
//! minirpc serve -b 127.0.0.1:8081
//!
//! # Call user-service.GetById (outputs raw JSON)
//! minirpc call 127.0.0.1:8081 123
//!
//! # Same call with the binary serializer and a 500ms deadline
//! minirpc call 127.0.0.1:8081 123 --serializer binary --timeout-ms 500
//! ```

use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use minirpc_cli::{parse_serializer, user_service, GetByIdReq, UserServiceClient, USER_SERVICE};
use minirpc_client::{Client, PoolConfig};
use minirpc_common::{Context, MinirpcError};
use minirpc_server::Server;

#[derive(FromArgs)]
/// minirpc - a minimal RPC framework demo
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
}

/// Arguments for running the demo server.
///
/// # Example
///
/// ```bash
/// minirpc serve -b 0.0.0.0:8081 --greeting "hi there"
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// serve the demo user-service
struct ServeArgs {
    /// address to bind the server to
    #[argh(option, short = 'b', default = "\"127.0.0.1:8081\".into()")]
    bind: String,

    /// message GetById answers with
    #[argh(option, default = "\"hello, world\".into()")]
    greeting: String,
}

/// Arguments for calling `user-service.GetById`.
///
/// Prints the response as JSON on success, so the output can be piped to
/// tools like `jq`.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call user-service.GetById
struct CallArgs {
    /// server address (e.g., 127.0.0.1:8081)
    #[argh(positional)]
    addr: String,

    /// user id to look up
    #[argh(positional)]
    id: i64,

    /// deadline for the call in milliseconds
    #[argh(option, long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// send without waiting for a response
    #[argh(switch)]
    oneway: bool,

    /// payload serializer: json or binary
    #[argh(option, default = "\"json\".into()")]
    serializer: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Keep `call` output clean for piping.
    if !matches!(cli.command, Commands::Call(_)) {
        // Set default log level to INFO, but allow RUST_LOG env var to override
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => {
            tracing::info!("Starting minirpc server");
            tracing::info!("Binding to: {}", args.bind);

            let mut server = Server::new();
            server.register_service(user_service(args.greeting));

            let bound = server.bind(&args.bind).await?;
            bound.run().await?;
            Ok(())
        }
        Commands::Call(args) => {
            let serializer = parse_serializer(&args.serializer)?;

            // A single call needs a single connection.
            let config = PoolConfig::default().with_max_idle(1);
            let client = Client::with_config(&args.addr, config).await?;
            let users: UserServiceClient = client.init_service_with(USER_SERVICE, serializer);

            let mut ctx = Context::background();
            if let Some(ms) = args.timeout_ms {
                ctx = ctx.with_timeout(Duration::from_millis(ms));
            }
            if args.oneway {
                ctx = ctx.with_oneway();
            }

            let reply = users.get_by_id.call(&ctx, &GetByIdReq { id: args.id }).await;
            match reply.error {
                None => {
                    println!("{}", serde_json::to_string(&reply.value)?);
                    Ok(())
                }
                Some(MinirpcError::Oneway) if args.oneway => Ok(()),
                Some(err) => Err(anyhow::anyhow!("RPC call failed: {}", err)),
            }
        }
    }
}
