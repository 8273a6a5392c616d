use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use replikv::server::KvServer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let server = match KvServer::new(std::env::args()) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "invalid command line arguments");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "server terminated");
        std::process::exit(1);
    }
}
