use anyhow::Context;
use clap::{Parser, Subcommand};
use libris_kernel::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "libris-cli", version, about = "Operate the Libris book catalog service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service until interrupted
    Serve,
    /// Apply pending schema migrations and exit
    Migrate,
    /// Print the resolved (non-secret) settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().with_context(|| "failed to load Libris settings")?;
    libris_telemetry::init(&settings.telemetry)?;

    match cli.command {
        Command::Serve => libris_app::app::serve(settings).await?,
        Command::Migrate => {
            let applied = libris_app::app::migrate(&settings).await?;
            println!("applied {} migration(s)", applied);
        }
        Command::CheckConfig => print_settings(&settings),
    }

    Ok(())
}

fn print_settings(settings: &Settings) {
    println!("environment      {:?}", settings.environment);
    println!(
        "server           {}:{} (base path '{}', timeout {}ms)",
        settings.server.host,
        settings.server.port,
        settings.server.base_path,
        settings.server.request_timeout_ms
    );
    println!(
        "database         {} (max {} connections)",
        settings.database.url, settings.database.max_connections
    );
    println!(
        "telemetry        {:?} '{}'",
        settings.telemetry.log_format, settings.telemetry.filter
    );
    println!(
        "generator        {:?} chat={} embedding={} dims={} api_key={}",
        settings.genai.provider,
        settings.genai.chat_model,
        settings.genai.embedding_model,
        settings.genai.dimensions,
        if settings.genai.api_key.is_some() { "set" } else { "unset" }
    );
}
