//! mqlink - MQTT v3.1.1 command line client
//!
//! Usage:
//!   mqlink pub -t <TOPIC> -m <MESSAGE> [OPTIONS]
//!   mqlink sub -t <TOPIC> [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>    Configuration file path
//!   -H, --host <HOST>      Server host (default: localhost)
//!   -p, --port <PORT>      Server port (default: 1883)
//!   -i, --id <ID>          Client identifier (default: random)
//!   -q, --qos <QOS>        QoS level 0, 1 or 2
//!   --user, --password     Credentials
//!   -l, --log-level        Log level (error, warn, info, debug, trace)

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mqlink::client::{ClientBuilder, OnMessage};
use mqlink::config::{Config, CredentialsConfig};
use mqlink::protocol::EncodeError;
use mqlink::{Client, Message, QoS};

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    #[default]
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
    /// Trace messages, including packet dumps
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }

    fn from_config(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Warn,
        }
    }
}

/// mqlink - MQTT v3.1.1 client
#[derive(Parser, Debug)]
#[command(name = "mqlink")]
#[command(author = "mqlink Contributors")]
#[command(version)]
#[command(about = "Publish to and subscribe on an MQTT v3.1.1 server")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect, publish one message and disconnect
    Pub {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Message body
        #[arg(short, long)]
        message: String,
    },
    /// Subscribe to a topic and print every message received
    Sub {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
}

#[derive(clap::Args, Debug)]
struct ConnectionArgs {
    /// Server host
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Client identifier
    #[arg(short, long)]
    id: Option<String>,

    /// Topic to publish or subscribe to
    #[arg(short, long)]
    topic: String,

    /// QoS level (0, 1, or 2)
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    qos: u8,

    /// Login
    #[arg(long)]
    user: Option<String>,

    /// Password (requires --user)
    #[arg(long, requires = "user")]
    password: Option<String>,
}

impl ConnectionArgs {
    /// CLI args override file config
    fn apply(&self, config: &mut Config) {
        if let Some(ref host) = self.host {
            config.connection.host = host.clone();
        }
        if let Some(port) = self.port {
            config.connection.port = port;
        }
        if let Some(ref id) = self.id {
            config.client.client_id = id.clone();
        }
        if self.user.is_some() {
            config.credentials = Some(CredentialsConfig {
                login: self.user.clone(),
                password: self.password.clone(),
            });
        }
    }

    fn qos(&self) -> Result<QoS, EncodeError> {
        QoS::try_from(self.qos)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration file if specified, otherwise defaults plus MQLINK__* overrides
    let loaded = match &args.config {
        Some(config_path) => Config::load(config_path),
        None => Config::from_env(),
    };
    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };

    // Setup logging - CLI overrides config, config overrides default (warn)
    let log_level = args
        .log_level
        .unwrap_or_else(|| LogLevel::from_config(&config.log.level));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(ref path) = args.config {
        info!("Loaded configuration from {:?}", path);
    }

    match args.command {
        Command::Pub {
            connection,
            message,
        } => {
            connection.apply(&mut config);
            if let Err(e) = config.validate() {
                eprintln!("Invalid configuration: {}", e);
                std::process::exit(1);
            }

            let client = Client::new(config.client_options());
            client.connect().await?;
            let packet_id = client
                .publish(&connection.topic, message.into_bytes(), connection.qos()?)
                .await?;
            info!("published to '{}' (packet id {:?})", connection.topic, packet_id);
            client.disconnect().await?;
        }
        Command::Sub { connection } => {
            connection.apply(&mut config);
            if let Err(e) = config.validate() {
                eprintln!("Invalid configuration: {}", e);
                std::process::exit(1);
            }

            let client = ClientBuilder::from_options(config.client_options())
                .callbacks(OnMessage(|_: &Client, message: &Message| {
                    println!("{} {}", message.topic, message.payload_str());
                }))
                .build();

            client.connect().await?;
            let granted = client.subscribe(&connection.topic, connection.qos()?).await?;
            info!("subscribed to '{}' with QoS {}", connection.topic, granted);
            let _keep_alive = client.loop_start();

            tokio::select! {
                result = client.loop_forever() => result?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    client.disconnect().await?;
                }
            }
        }
    }

    Ok(())
}
