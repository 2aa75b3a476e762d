use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use consumo_core::{SummaryDocument, taxonomy_listing};
use consumo_ingest::MailExport;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

mod app;
mod config;
mod export;
mod server;

use app::{ManualRequest, build_pipeline, classify_manual, load_summary, save_summary};
use config::{Config, consumo_home, init_config};

#[derive(Parser, Debug)]
#[command(
    name = "consumo",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CONSUMO_BUILD_SHA"), ")"),
    about = "Classify bank notification emails into spending categories"
)]
struct Cli {
    /// Log level for consumo crates (RUST_LOG overrides)
    #[arg(long, global = true, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// Config/state directory (default: ~/.consumo)
    #[arg(long, global = true, env = "CONSUMO_HOME")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify every message of a mail export and write the summary JSON
    Classify {
        /// Export JSON (defaults to server.default_export)
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Summary output (defaults to server.summary_path)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Also write the records as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Extraction profile: bcp or financiero
        #[arg(long)]
        profile: Option<String>,

        /// Max in-flight oracle calls
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Classify a single transaction typed on the command line
    ClassifyOne {
        #[arg(long)]
        merchant: String,

        /// Amount text as it appears in the notification (e.g. "S/ 45.90")
        #[arg(long)]
        amount: String,

        #[arg(long, default_value = "Débito")]
        card: String,

        #[arg(long)]
        date: Option<String>,
    },

    /// List the spending categories
    Categories,

    /// Headline statistics of a saved summary
    Stats {
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Flatten a saved summary into CSV
    ExportCsv {
        #[arg(long)]
        summary: Option<PathBuf>,

        #[arg(long, short)]
        output: PathBuf,
    },

    /// Run the JSON HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },

    /// Manage ~/.consumo/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config.toml if none exists
    Init,

    /// Print the effective config
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.log_level);

    let home = consumo_home(cli.home.as_deref())?;
    let cfg = Config::load(&home)?;

    match cli.command {
        Command::Classify {
            input,
            output,
            csv,
            profile,
            concurrency,
        } => {
            let input = input.unwrap_or_else(|| cfg.server.default_export.clone());
            if !input.exists() {
                bail!("export not found: {} (pass --input <path>)", input.display());
            }
            let export = MailExport::from_path(&input)?;
            let pipeline =
                build_pipeline(&cfg, profile.as_deref(), concurrency, export.period())?;

            info!(
                input = %input.display(),
                messages = export.emails.len(),
                profile = pipeline.profile().name(),
                concurrency = pipeline.concurrency(),
                "classifying"
            );
            let outcome = pipeline.run(&export.emails).await;

            let output = output.unwrap_or_else(|| cfg.server.summary_path.clone());
            save_summary(&outcome.summary, &output)?;

            print_summary(&outcome.summary);
            let s = outcome.stats;
            println!(
                "\nmessages={} accepted={} merchant_misses={} amount_misses={} oracle_failures={}",
                s.received, s.accepted, s.merchant_misses, s.amount_misses, s.oracle_failures
            );
            println!("Summary written to {}", output.display());

            if let Some(csv_path) = csv {
                let rows = export::export_csv(&outcome.summary, &csv_path)?;
                println!("{} rows written to {}", rows, csv_path.display());
            }
        }

        Command::ClassifyOne {
            merchant,
            amount,
            card,
            date,
        } => {
            let pipeline = build_pipeline(&cfg, None, None, None)?;
            let req = ManualRequest {
                empresa: merchant,
                monto: amount,
                tipo_tarjeta: card,
                fecha: date,
            };
            let r = classify_manual(&pipeline, &req).await;
            println!(
                "{} {} (S/ {:.2}) | {}",
                r.emoji, r.categoria, r.monto_numerico, r.justificacion
            );
        }

        Command::Categories => {
            for info in taxonomy_listing() {
                println!("{} {:<14} {}", info.emoji, info.category.identifier(), info.description);
                println!("     ej: {}", info.examples.join(", "));
            }
        }

        Command::Stats { summary } => {
            let path = summary.unwrap_or_else(|| cfg.server.summary_path.clone());
            let doc = load_summary(&path)?;
            if doc.is_empty() {
                bail!("{} has no records", path.display());
            }
            let stats = doc.statistics();
            println!("Periodo:        {}", stats.period);
            println!("Consumos:       {}", stats.total_records);
            println!("Total gastado:  S/ {:.2}", stats.total_amount);
            println!("Mayor gasto:    {}\n", stats.top_category);
            print_summary(&doc);
        }

        Command::ExportCsv { summary, output } => {
            let path = summary.unwrap_or_else(|| cfg.server.summary_path.clone());
            let doc = load_summary(&path)?;
            let rows = export::export_csv(&doc, &output)?;
            println!("{} rows written to {}", rows, output.display());
        }

        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| cfg.server.host.clone());
            let port = port.unwrap_or(cfg.server.port);
            let addr: SocketAddr = format!("{host}:{port}")
                .parse()
                .with_context(|| format!("invalid listen address {host}:{port}"))?;

            let pipeline = build_pipeline(&cfg, None, None, None)?;
            let state = Arc::new(server::AppState::new(
                pipeline,
                cfg.server.default_export.clone(),
                cfg.server.summary_path.clone(),
                Duration::from_secs(cfg.server.batch_timeout_secs),
            ));
            server::serve(state, addr).await?;
        }

        Command::Config { command } => match command {
            ConfigCommand::Init => {
                let (p, written) = init_config(&home)?;
                if written {
                    println!("Wrote {}", p.display());
                } else {
                    println!("Config already exists at {}", p.display());
                }
            }
            ConfigCommand::Show => {
                let s = toml::to_string_pretty(&cfg).context("serialize config")?;
                println!("# {}\n{}", config::config_path(&home).display(), s);
            }
        },
    }

    Ok(())
}

fn print_summary(doc: &SummaryDocument) {
    println!(
        "{} consumos, total S/ {:.2} ({})",
        doc.metadata.total_records, doc.metadata.total_amount, doc.metadata.period
    );
    for (category, s) in &doc.category_summary {
        if s.count == 0 {
            continue;
        }
        println!(
            "  {} {:<14} {:>3}  S/ {:>10.2}",
            s.emoji, category.identifier(), s.count, s.total
        );
    }
}

pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => EnvFilter::from_default_env(),
        None => EnvFilter::new(format!(
            "{bin}={level},consumo_core={level},consumo_ingest={level},consumo_classify={level}",
            bin = env!("CARGO_CRATE_NAME"),
        )),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
