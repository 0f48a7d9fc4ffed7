use anyhow::Result;
use tracing::error;

use redis_replication::server::{CliError, RedisServer, ServerConfig};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = match ServerConfig::from_args(std::env::args_os()) {
        Ok(config) => config,
        Err(CliError::DisplayRequested(text)) => {
            print!("{}", text);
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let server = match RedisServer::start(&config).await {
        Ok(server) => server,
        Err(err) => {
            error!(error = ?err, "failed to start server");
            return Err(err);
        }
    };

    server.run_until_ctrl_c().await
}
