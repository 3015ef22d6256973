//! Bookhive Web Server
//!
//! The web API for Bookhive - a community book sharing network.

use bookhive_web::server::BookhiveServerBuilder;
use bookhive_web::init_logging;
use clap::Parser;

/// Bookhive Web Server - community book sharing API
#[derive(Parser)]
#[command(name = "bookhive-web")]
#[command(about = "The web API for Bookhive")]
#[command(version)]
struct Args {
    /// Server host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Enable development mode
    #[arg(long)]
    dev: bool,

    /// Database URL for account storage
    #[arg(long)]
    database_url: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Set up logging first
    std::env::set_var(
        "RUST_LOG",
        format!("bookhive_web={},tower_http=debug", args.log_level),
    );
    init_logging();

    // Load environment variables
    dotenvy::dotenv().ok();

    println!("🚀 Starting Bookhive Web Server");
    println!("📍 Server: http://{}:{}", args.host, args.port);
    println!("🔧 Development mode: {}", args.dev);

    if let Some(db_url) = &args.database_url {
        println!("🗄️  Database: {}", db_url);
    }

    if std::env::var("BOOKHIVE_TOKEN_SECRET").is_err() {
        println!("⚠️  Warning: BOOKHIVE_TOKEN_SECRET is not set.");
        println!("   Tokens will be signed with the built-in development secret.");
    }

    let mut builder = BookhiveServerBuilder::new()
        .host(args.host)
        .port(args.port)
        .dev_mode(args.dev);

    if let Some(database_url) = args.database_url {
        builder = builder.database_url(database_url);
    }

    let server = match builder.build().await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("❌ Failed to build server: {}", e);
            std::process::exit(1);
        }
    };

    // Start the server (this will block until shutdown)
    if let Err(e) = server.start().await {
        eprintln!("❌ Server failed to start: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        // Test default values
        let args = Args::parse_from(["bookhive-web"]);
        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.port, 8080);
        assert!(!args.dev);

        // Test custom values
        let args =
            Args::parse_from(["bookhive-web", "--host", "0.0.0.0", "--port", "3000", "--dev"]);
        assert_eq!(args.host, "0.0.0.0");
        assert_eq!(args.port, 3000);
        assert!(args.dev);
    }
}
