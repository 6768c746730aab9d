use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};

use app_gate::config::loader::{load_config, ConfigError};
use app_gate::config::GateConfig;
use app_gate::gate::replay::unix_now;

#[derive(Parser)]
#[command(name = "gate-cli")]
#[command(about = "Sign, probe and check app gate deployments", long_about = None)]
struct Cli {
    /// Gate configuration file holding the shared secret and header names.
    #[arg(short, long, default_value = "gate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the credential headers an app would send
    Sign {
        #[arg(long)]
        device_id: String,
        /// Seconds since the epoch; defaults to now
        #[arg(long)]
        timestamp: Option<i64>,
        #[arg(long, default_value = "1.0")]
        app_version: String,
    },
    /// Send a request through the gate and print the response
    Probe {
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "gate-cli-device")]
        device_id: String,
        #[arg(long)]
        user_agent: Option<String>,
        /// Leave out the credential headers
        #[arg(long)]
        unsigned: bool,
    },
    /// Validate the configuration file
    Check,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => match load_config(&cli.config) {
            Ok(_) => println!("{}: ok", cli.config.display()),
            Err(ConfigError::Validation(errors)) => {
                eprintln!("{}: {} problem(s)", cli.config.display(), errors.len());
                for e in &errors {
                    eprintln!("  - {e}");
                }
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        },
        Commands::Sign {
            device_id,
            timestamp,
            app_version,
        } => {
            let config = load_config(&cli.config)?;
            let ts = timestamp.unwrap_or_else(unix_now);
            for (name, value) in credential_headers(&config, &device_id, ts, &app_version)? {
                println!("{name}: {}", value.to_str()?);
            }
        }
        Commands::Probe {
            url,
            device_id,
            user_agent,
            unsigned,
        } => {
            let config = load_config(&cli.config)?;
            let mut headers = HeaderMap::new();
            if !unsigned {
                for (name, value) in credential_headers(&config, &device_id, unix_now(), "1.0")? {
                    headers.insert(name, value);
                }
            }
            if let Some(ua) = user_agent {
                headers.insert(USER_AGENT, HeaderValue::from_str(&ua)?);
            }

            let res = reqwest::Client::new().get(&url).headers(headers).send().await?;
            println!("Status: {}", res.status());
            println!("{}", res.text().await?);
        }
    }

    Ok(())
}

fn credential_headers(
    config: &GateConfig,
    device_id: &str,
    timestamp: i64,
    app_version: &str,
) -> Result<Vec<(HeaderName, HeaderValue)>, Box<dyn std::error::Error>> {
    let classifier = config.gate.build_classifier()?;
    let names = classifier.credential_headers();
    let ts = timestamp.to_string();
    let signature = classifier.verifier().sign(device_id, &ts);

    Ok(vec![
        (names.app_key.clone(), HeaderValue::from_str(&signature)?),
        (names.device_id.clone(), HeaderValue::from_str(device_id)?),
        (names.app_version.clone(), HeaderValue::from_str(app_version)?),
        (names.timestamp.clone(), HeaderValue::from_str(&ts)?),
    ])
}
