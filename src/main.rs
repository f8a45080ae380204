use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use qslkit::adapters::lotw::LotwAdapter;
use qslkit::utils::{logger, validation::Validate};
use qslkit::{AccountsConfig, AwardQuery, FetchFilter, Provider, VerifyRequest};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "qslkit")]
#[command(about = "Download and check QSL confirmations from LoTW, eQSL, QRZ and ClubLog")]
struct Cli {
    /// Account file with one table per provider
    #[arg(long, short, default_value = "qslkit.toml")]
    config: PathBuf,

    #[arg(long, short, help = "Enable verbose output")]
    verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download and normalize a logbook
    Fetch {
        provider: Provider,
        #[arg(long)]
        since: Option<NaiveDate>,
        #[arg(long)]
        until: Option<NaiveDate>,
        #[arg(long)]
        confirmed_only: bool,
        #[arg(long)]
        callsign: Option<String>,
        #[arg(long)]
        band: Option<String>,
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        max_records: Option<u32>,
        /// Raw provider parameter, NAME=VALUE
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Print the provider's original ADIF records instead of normalized ones
        #[arg(long)]
        raw: bool,
    },
    /// Check a single QSO against eQSL
    Verify {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        band: String,
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Look up a callsign (or DXCC entity) in the QRZ XML database
    Lookup {
        query: String,
        #[arg(long)]
        dxcc: bool,
    },
    /// QRZ logbook status
    Status,
    /// LoTW DXCC credit
    Award {
        #[arg(long)]
        entity: Option<u32>,
        #[arg(long)]
        account: Option<String>,
    },
    /// Last eQSL upload date
    LastUpload,
    /// Public LoTW user activity list, optionally for one callsign
    Activity { callsign: Option<String> },
    /// Upload a signed log (.tq5/.tq8) to LoTW
    Upload { file: PathBuf },
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init_cli_logger(cli.verbose, cli.json_logs);

    tracing::info!("Starting qslkit");
    if cli.verbose {
        tracing::debug!("Command: {:?}", cli.command);
    }

    let load_config = || -> anyhow::Result<AccountsConfig> {
        let config = AccountsConfig::from_file(&cli.config)
            .with_context(|| format!("reading {}", cli.config.display()))?;
        config.validate().context("invalid account file")?;
        Ok(config)
    };

    match cli.command {
        Command::Fetch {
            provider,
            since,
            until,
            confirmed_only,
            callsign,
            band,
            mode,
            max_records,
            params,
            raw,
        } => {
            let filter = FetchFilter {
                since,
                until,
                confirmed_only,
                callsign,
                band,
                mode,
                max_records,
                extra: params,
            };
            let logbook = load_config()?.session(provider)?.fetch_logbook(&filter)?;
            if raw {
                print_json(&logbook.original_log().records)?;
            } else {
                print_json(&logbook.records())?;
            }
        }
        Command::Verify {
            from,
            to,
            band,
            mode,
            date,
        } => {
            let request = VerifyRequest {
                callsign_from: from,
                callsign_to: to,
                band,
                mode,
                date,
            };
            let (confirmed, extra) = load_config()?
                .session(Provider::Eqsl)?
                .verify_confirmation(&request)?;
            print_json(&serde_json::json!({ "confirmed": confirmed, "extra": extra }))?;
        }
        Command::Lookup { query, dxcc } => {
            let session = load_config()?.session(Provider::Qrz)?;
            let info = if dxcc {
                session.lookup_dxcc(&query)?
            } else {
                session.lookup_callsign(&query)?
            };
            print_json(&info)?;
        }
        Command::Status => {
            print_json(&load_config()?.session(Provider::Qrz)?.logbook_status()?)?;
        }
        Command::Award { entity, account } => {
            let credit = load_config()?
                .session(Provider::Lotw)?
                .award_credit(&AwardQuery { entity, account })?;
            print_json(&credit.records())?;
        }
        Command::LastUpload => {
            print_json(&load_config()?.session(Provider::Eqsl)?.last_upload()?)?;
        }
        Command::Upload { file } => {
            let contents =
                std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.tq8".to_string());
            let message = load_config()?
                .session(Provider::Lotw)?
                .upload_logbook(&name, &contents)?;
            print_json(&serde_json::json!({ "message": message }))?;
        }
        Command::Activity { callsign } => {
            let config = AccountsConfig::from_file_or_default(&cli.config)
                .with_context(|| format!("reading {}", cli.config.display()))?;
            config.validate().context("invalid account file")?;
            let transport = config.transport()?;
            let mut users = LotwAdapter::user_activity(
                transport.as_ref(),
                config.lotw.as_ref().and_then(|l| l.endpoint.as_deref()),
            )?;
            if let Some(call) = callsign {
                users.retain(|u| u.callsign.eq_ignore_ascii_case(&call));
            }
            print_json(&users)?;
        }
    }

    Ok(())
}
