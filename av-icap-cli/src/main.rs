use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, info, warn};

use av_icap::config::ConfigCache;
use av_icap::{IcapClient, ScanVerdict, ScannerConfig};

#[derive(Parser, Debug)]
#[command(
    name = "av-icap",
    about = "Antivirus scan client speaking ICAP",
    long_about = "Scans a file against an ICAP antivirus service configured in a properties file"
)]
struct Args {
    /// Scanner properties file
    #[arg(short = 'c', long)]
    config: PathBuf,

    /// File to scan
    #[arg(short = 'f', long)]
    file: PathBuf,

    /// Scanner id to use; required when the file defines more than one
    #[arg(short = 's', long)]
    scanner: Option<String>,

    /// Debug level info to stdout
    #[arg(short = 'd', long)]
    debug_level: Option<u8>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let debug_level = args.debug_level.unwrap_or(0);
    if debug_level > 0 {
        tracing_subscriber::fmt()
            .with_max_level(match debug_level {
                1 => tracing::Level::ERROR,
                2 => tracing::Level::WARN,
                3 => tracing::Level::INFO,
                4 => tracing::Level::DEBUG,
                _ => tracing::Level::TRACE,
            })
            .init();
    }

    info!("Starting av-icap");
    debug!("Arguments: {:?}", args);

    let cache = ConfigCache::new();
    let config = match &args.scanner {
        Some(id) => cache.get_by_id(&args.config, id),
        None => cache.get(&args.config),
    };
    let config = match config {
        Some(config) => config,
        None => {
            error!(
                "No usable scanner configuration in {} (use --scanner when several are defined)",
                args.config.display()
            );
            return ExitCode::FAILURE;
        }
    };

    match scan(&config, &args.file).await {
        Ok(ScanVerdict::Clean) => {
            println!("{}: clean", args.file.display());
            ExitCode::SUCCESS
        }
        Ok(ScanVerdict::Infected { reason }) => {
            println!("{}: NOT clean ({reason})", args.file.display());
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Scan failed: {}", e);
            if config.reject_file_on_error() {
                ExitCode::FAILURE
            } else {
                warn!("rejectFileOnError=false, treating the file as accepted");
                ExitCode::SUCCESS
            }
        }
    }
}

async fn scan(config: &Arc<ScannerConfig>, file: &Path) -> av_icap::IcapResult<ScanVerdict> {
    let size = tokio::fs::metadata(file).await?.len();
    if config.exceeds_max_file_size(size) {
        if config.reject_file_over_max_size() {
            info!(size, max = config.max_file_size(), "file over size limit, rejecting");
            return Ok(ScanVerdict::Infected {
                reason: format!(
                    "file size {size} exceeds the configured maximum of {}",
                    config.max_file_size()
                ),
            });
        }
        info!(size, max = config.max_file_size(), "file over size limit, skipping scan");
        return Ok(ScanVerdict::Clean);
    }

    let mut client = IcapClient::from_config(config);
    client.connect().await?;
    let verdict = client.scan_file(file).await;
    // Best effort; the verdict matters more than a failed shutdown.
    if let Err(e) = client.disconnect().await {
        warn!("Disconnect failed: {}", e);
    }
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn argument_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_the_usual_invocation() {
        let args = Args::try_parse_from([
            "av-icap",
            "-c",
            "conf/avScanner.properties",
            "-f",
            "payload.bin",
            "-d",
            "3",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("conf/avScanner.properties"));
        assert_eq!(args.file, PathBuf::from("payload.bin"));
        assert_eq!(args.scanner, None);
        assert_eq!(args.debug_level, Some(3));
    }

    #[test]
    fn config_and_file_are_required() {
        assert!(Args::try_parse_from(["av-icap", "-f", "payload.bin"]).is_err());
        assert!(Args::try_parse_from(["av-icap", "-c", "av.properties"]).is_err());
    }
}
