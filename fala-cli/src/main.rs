use anyhow::Result;
use clap::Parser;
use fala_cli::cli::Cli;
use fala_cli::config::CliConfig;
use fala_telemetry::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;

    let format = match cli.log_format.as_deref().or(config.log_format.as_deref()) {
        Some(format) => format.parse::<LogFormat>()?,
        None => LogFormat::default(),
    };
    fala_telemetry::init_with_format("fala-cli", format, "warn,fala_realtime=info")?;

    fala_cli::run(cli, config).await
}
