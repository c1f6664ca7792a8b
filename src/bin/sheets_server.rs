//! Sheets API Server binary
//!
//! HTTP REST API for registering, processing and reading course sheets.

use std::path::PathBuf;

use clap::Parser;
use course_sheets::api::run_api_server;
use course_sheets::config::Config;

#[derive(Parser, Debug)]
#[command(name = "sheets-server")]
#[command(version)]
#[command(about = "Sheets API Server - HTTP REST API for course spreadsheet ingestion")]
#[command(long_about = r#"
Sheets API Server - HTTP REST API

Endpoints:
  - POST   /api/v1/sheets              - Register a sheet
  - GET    /api/v1/sheets/:id          - Get a registered sheet
  - POST   /api/v1/sheets/:id/process  - Fetch, normalize and store
  - GET    /api/v1/sheets/:id/status   - Processing status
  - GET    /api/v1/sheets/:id/content  - Reconstructed grid (?page&limit&fallbackToApi)
  - DELETE /api/v1/sheets/:id/content  - Clear stored content
  - GET    /api/v1/jobs/:id            - Background job status
  - POST   /api/v1/access              - Resolve a user's access

Additional endpoints:
  - GET  /health           - Health check
  - GET  /version          - Server version info
  - GET  /                 - API documentation

Example usage:
  sheets-server                           # Start on localhost:8080
  sheets-server --host 0.0.0.0 --port 3000 --config sheets.yaml

  curl -X POST http://localhost:8080/api/v1/sheets/grades/process \
    -H "Content-Type: application/json" \
    -d '{"background": true}'
"#)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "SHEETS_CONFIG")]
    config: Option<PathBuf>,

    /// Host address to bind to (overrides server.host)
    #[arg(short = 'H', long, env = "SHEETS_HOST")]
    host: Option<String>,

    /// Port to listen on (overrides server.port)
    #[arg(short, long, env = "SHEETS_PORT")]
    port: Option<u16>,

    /// Storage directory (overrides storage.data_dir)
    #[arg(short, long, env = "SHEETS_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = dir;
    }

    run_api_server(config).await
}
