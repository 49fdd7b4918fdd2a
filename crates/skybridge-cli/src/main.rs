use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use skybridge_core::publisher::unix_millis;
use skybridge_core::{doctor as core_doctor, CommandConfig, Dispatcher, Session, TelemetryConfig, ZmqTransport};
use skybridge_link::autodetect::{autodetect_fc, default_candidate_bauds, default_candidate_devs};
use skybridge_link::{LinkConfig, LinkKind};

const DEFAULT_ENDPOINT: &str = "ipc:///tmp/feeds/drone.ipc";

#[derive(Debug, Parser)]
#[command(name = "skybridge", version, about = "skybridge - vehicle telemetry and command bridge")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bind the request/reply socket and serve commands until interrupted.
    Serve,
    Doctor,
    Link { #[command(subcommand)] cmd: LinkCmd },
}

#[derive(Debug, Subcommand)]
enum LinkCmd {
    /// Probe serial ports/bauds for MAVLink heartbeats.
    Autodetect,
    /// Make one connection attempt and print the resulting interface status.
    Check,
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    #[serde(default)]
    transport: TransportCfg,
    link: LinkConfig,
    #[serde(default)]
    telemetry: TelemetryConfig,
    #[serde(default)]
    commands: CommandConfig,
}

#[derive(Debug, Default, serde::Deserialize)]
struct TransportCfg {
    endpoint: Option<String>,
}

impl TransportCfg {
    fn endpoint(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    Ok(toml::from_str(&s).context("parse config toml")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Serve => serve(cfg).await?,
        Command::Doctor => doctor(&cfg)?,
        Command::Link { cmd } => link_cmd(&cfg, cmd)?,
    }
    Ok(())
}

async fn serve(cfg: Config) -> Result<()> {
    info!("serve: starting");
    let endpoint = cfg.transport.endpoint();

    // The dispatcher is a blocking request/reply loop; keep it off the async workers.
    let worker = tokio::task::spawn_blocking(move || -> Result<()> {
        let mut transport = ZmqTransport::bind(&endpoint)?;
        let mut session = Session::new(
            skybridge_link::provider(&cfg.link),
            cfg.telemetry.clone(),
            cfg.link.go_home_timeout(),
        );
        Dispatcher::new(cfg.commands.clone()).serve(&mut session, &mut transport)
    });

    tokio::select! {
        res = worker => res.context("dispatcher task panicked")?,
        _ = tokio::signal::ctrl_c() => {
            info!("serve: interrupted");
            // the blocking receive never returns on its own
            std::process::exit(0);
        }
    }
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    core_doctor::check_endpoint(&cfg.transport.endpoint())?;
    core_doctor::check_rates(&cfg.telemetry)?;

    match cfg.link.kind {
        LinkKind::Mavlink => {
            if cfg.link.autodetect {
                info!("doctor: link autodetect enabled (OK)");
            } else {
                anyhow::ensure!(
                    cfg.link.serial_dev.as_ref().map(|s| !s.is_empty()).unwrap_or(false),
                    "link.serial_dev missing"
                );
                anyhow::ensure!(cfg.link.baud.unwrap_or(0) > 0, "link.baud invalid");
            }
            if !cfg.link.allow_rtl {
                warn!("doctor: link.allow_rtl=false, return_home will always fail");
            }
        }
        LinkKind::Sim => warn!("doctor: link.kind = sim, no vehicle will be contacted"),
    }
    if !cfg.commands.extended {
        warn!("doctor: commands.extended=false, only check_interface is answered");
    }

    info!("doctor: OK");
    Ok(())
}

fn link_cmd(cfg: &Config, cmd: LinkCmd) -> Result<()> {
    match cmd {
        LinkCmd::Autodetect => {
            anyhow::ensure!(cfg.link.kind == LinkKind::Mavlink, "link.kind is not mavlink");
            let devs = cfg.link.candidate_devs.clone().unwrap_or_else(default_candidate_devs);
            let bauds = cfg.link.candidate_bauds.clone().unwrap_or_else(default_candidate_bauds);
            let res = autodetect_fc(devs, bauds, &cfg.link)?;
            if let Some((dev, baud)) = res.chosen {
                println!("CHOSEN: {} @ {}", dev, baud);
            } else {
                println!("CHOSEN: none");
            }
            for p in res.probes {
                println!("probe dev={} baud={} hb={} {}ms note={}", p.dev, p.baud, p.hb_seen, p.elapsed_ms, p.note);
            }
            Ok(())
        }
        LinkCmd::Check => {
            let mut session = Session::new(
                skybridge_link::provider(&cfg.link),
                cfg.telemetry.clone(),
                cfg.link.go_home_timeout(),
            );
            let st = session.start_interface(unix_millis());
            println!("state={:?} fail_state={:?}", st.state, st.fail_state);
            println!("active_mode={}", st.active_mode);
            println!("fail_output={:?}", st.fail_output);
            Ok(())
        }
    }
}
