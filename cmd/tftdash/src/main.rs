//! tftdash - headless monitor for the telemetry session core.
//!
//! Connects to a broker, streams notices and status changes to stdout,
//! prints per-device snapshots on an interval, and accepts on-demand
//! request commands on stdin. Ctrl-C disconnects cleanly.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tftdash_session::{
    ConnectOptions, MqttDialer, Notice, Session, SessionConfig, Severity,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Headless monitor for the tftdash telemetry session core.
#[derive(Parser, Debug)]
#[command(name = "tftdash")]
#[command(about = "Headless monitor for MQTT device telemetry")]
struct Args {
    /// Broker address, e.g. mqtt://127.0.0.1:1883
    broker: String,

    /// MQTT username
    #[arg(short, long)]
    username: Option<String>,

    /// MQTT password
    #[arg(short, long)]
    password: Option<String>,

    /// MQTT client id (generated when omitted)
    #[arg(long)]
    client_id: Option<String>,

    /// Topic prefix prepended to every request/response topic
    #[arg(long, default_value = "")]
    prefix: String,

    /// Telemetry poll interval in seconds
    #[arg(long, default_value_t = 60)]
    poll_interval: u64,

    /// Per-device snapshot print interval in seconds (0 disables)
    #[arg(long, default_value_t = 30)]
    snapshot_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let cfg = SessionConfig::default()
        .with_topic_prefix(args.prefix.clone())
        .with_poll_interval(Duration::from_secs(args.poll_interval));
    let session = Session::new(cfg, Arc::new(MqttDialer::new()));

    let mut notices = session
        .take_notices()
        .expect("notices taken once at startup");
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            print_notice(&notice);
        }
    });

    let mut status = session.watch_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow();
            println!("-- status: {current}");
        }
    });

    let mut opts = ConnectOptions::new(args.broker.clone());
    if let Some(username) = &args.username {
        opts = opts.with_credentials(username.clone(), args.password.clone().unwrap_or_default());
    }
    if let Some(client_id) = &args.client_id {
        opts = opts.with_client_id(client_id.clone());
    }
    session.connect(opts).await?;

    let snapshot_period = if args.snapshot_interval == 0 {
        // Effectively never; the branch below also skips printing
        Duration::from_secs(3600 * 24 * 365)
    } else {
        Duration::from_secs(args.snapshot_interval)
    };
    let mut snapshots = tokio::time::interval(snapshot_period);
    snapshots.tick().await;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    println!(
        "commands: info | names | status | epd | max <serial> | min <serial> | \
         reset | fota | epdmode | snapshot | quit"
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = snapshots.tick() => {
                if args.snapshot_interval != 0 {
                    print_snapshot(&session);
                }
            }
            line = stdin.next_line() => {
                match line? {
                    Some(line) => {
                        if !run_command(&session, line.trim()).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    session.disconnect().await;
    Ok(())
}

/// Executes one stdin command. Returns false when the monitor should exit.
async fn run_command(session: &Session, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (None, _) => {}
        (Some("quit" | "exit"), _) => return false,
        (Some("snapshot"), _) => print_snapshot(session),
        (Some("info"), _) => session.request_all_device_info().await,
        (Some("names"), _) => session.request_all_sensor_names().await,
        (Some("status"), _) => session.request_all_status_flags().await,
        (Some("epd"), _) => session.request_all_epd_info().await,
        (Some("reset"), _) => session.send_flag_reset().await,
        (Some("fota"), _) => session.send_fota_update().await,
        (Some("epdmode"), _) => session.send_epd_mode().await,
        (Some("max"), Some(serial)) => session.request_device_max_values(serial).await,
        (Some("min"), Some(serial)) => session.request_device_min_values(serial).await,
        (Some("max" | "min"), None) => println!("usage: max|min <device-serial>"),
        (Some(other), _) => println!("unknown command: {other}"),
    }
    true
}

fn print_notice(notice: &Notice) {
    let tag = match notice.severity {
        Severity::Info => "info",
        Severity::Warning => "warn",
        Severity::Error => "error",
    };
    println!("[{tag}] {}", notice.message);
}

fn print_snapshot(session: &Session) {
    let serials = session.device_serials();
    if serials.is_empty() {
        println!("== no devices seen yet ==");
        return;
    }

    println!("== {} device(s) ==", serials.len());
    for serial in serials {
        println!("  {serial}:");
        if let Some(point) = session.latest_point(&serial) {
            let names = session.sensor_names(&serial);
            let mut keys: Vec<&String> = point.values.keys().collect();
            keys.sort();
            for key in keys {
                let label = names
                    .as_ref()
                    .and_then(|n| n.names.get(key))
                    .cloned()
                    .unwrap_or_else(|| key.clone());
                println!("    {label}: {}", point.values[key]);
            }
            println!(
                "    history: {} point(s), last at {}",
                session.history(&serial).len(),
                point.timestamp
            );
        }
        if let Some(info) = session.device_info(&serial) {
            if let Some(fw) = &info.firmware_version {
                println!("    firmware: {fw}");
            }
            if let Some(active) = &info.time_active {
                println!("    active: {active}");
            }
        }
        if let Some(status) = session.device_status(&serial) {
            if status.is_clear() {
                println!("    flags: none");
            } else {
                for name in status.errors() {
                    println!("    error: {name}");
                }
                for name in status.warnings() {
                    println!("    warning: {name}");
                }
            }
        }
    }
}
