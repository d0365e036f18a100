mod errors;

use clap::{Parser, Subcommand};
use std::{
    fs,
    path::{Path, PathBuf},
};

use node::{
    NodeConfig, PeerData,
    key_manager::{
        FileKeyStorage, load_or_create_identity_key, parse_threshold_key, save_threshold_key,
    },
    start_node::start_node,
    verifier,
};

use crate::errors::CliError;

#[derive(Parser)]
#[command(name = "tss-node")]
#[command(about = "Threshold signing node: FROST key generation and signing over gossip.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file and create the node's identity key
    Setup {
        #[arg(short, long)]
        output: Option<String>,
        #[arg(short = 't', long)]
        threshold: u16,
        #[arg(short = 'n', long)]
        participants: u16,
        /// Peer ids allowed to join, as `name=peer_id` or bare `peer_id`
        #[arg(short, long)]
        allowed_peers: Option<Vec<String>>,
        #[arg(short, long)]
        key_dir: Option<String>,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        tcp_port: Option<u16>,
        #[arg(long)]
        udp_port: Option<u16>,
        /// Serve Prometheus metrics on this port
        #[arg(long)]
        metrics_port: Option<u16>,
        /// Directory for the daily rotated node.log
        #[arg(long)]
        log_dir: Option<String>,
    },
    /// Run the node and connect to the network
    Run {
        #[arg(short, long)]
        config: Option<String>,
        #[arg(short, long)]
        log_file: Option<String>,
        /// Do not read operator commands from stdin
        #[arg(long)]
        no_console: bool,
    },
    /// Install a threshold key record produced out of band
    ImportKey {
        file: String,
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Check a signature against a group public key
    Verify {
        message: String,
        signature: String,
        public_key: String,
        /// Treat the message as hex instead of text
        #[arg(long)]
        hex: bool,
    },
    /// Print this node's peer id
    Identity {
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Setup {
            output,
            threshold,
            participants,
            allowed_peers,
            key_dir,
            topic,
            tcp_port,
            udp_port,
            metrics_port,
            log_dir,
        } => {
            let config_path = NodeConfig::get_config_file_path(output)?;
            setup_config(
                config_path,
                SetupOptions {
                    threshold,
                    participants,
                    allowed_peers: allowed_peers.unwrap_or_default(),
                    key_dir: key_dir.map(PathBuf::from),
                    topic,
                    tcp_port,
                    udp_port,
                    metrics_port,
                    log_dir: log_dir.map(PathBuf::from),
                },
            )
            .map(|(config, peer_id)| {
                println!(
                    "Config saved to {} with the peer id {peer_id}. To modify the allowed peers, edit the config file.",
                    config.config_file_path.display()
                );
            })
        }
        Commands::Run {
            config,
            log_file,
            no_console,
        } => match NodeConfig::get_config(config) {
            Ok(config) => start_node(config, log_file.map(PathBuf::from), !no_console)
                .await
                .map_err(CliError::from),
            Err(e) => Err(e.into()),
        },
        Commands::ImportKey { file, config } => {
            NodeConfig::get_config(config)
                .map_err(CliError::from)
                .and_then(|config| import_key(&config, Path::new(&file)))
                .map(|group_key| println!("Imported threshold key for group {group_key}"))
        }
        Commands::Verify {
            message,
            signature,
            public_key,
            hex,
        } => verify_signature(&message, hex, &signature, &public_key)
            .map(|()| println!("Signature is valid")),
        Commands::Identity { config } => NodeConfig::get_config(config)
            .map_err(CliError::from)
            .and_then(|config| identity(&config))
            .map(|peer_id| println!("{peer_id}")),
    };

    if let Err(e) = &result {
        eprintln!("Error: {e}");
    }
    result
}

fn parse_peer(entry: &str) -> PeerData {
    match entry.split_once('=') {
        Some((name, public_key)) => PeerData {
            name: name.to_string(),
            public_key: public_key.to_string(),
        },
        None => PeerData {
            name: entry.to_string(),
            public_key: entry.to_string(),
        },
    }
}

#[derive(Debug, Default)]
struct SetupOptions {
    threshold: u16,
    participants: u16,
    allowed_peers: Vec<String>,
    key_dir: Option<PathBuf>,
    topic: Option<String>,
    tcp_port: Option<u16>,
    udp_port: Option<u16>,
    metrics_port: Option<u16>,
    log_dir: Option<PathBuf>,
}

fn setup_config(
    config_path: PathBuf,
    options: SetupOptions,
) -> Result<(NodeConfig, String), CliError> {
    let mut config = NodeConfig::new(config_path, options.threshold, options.participants);
    config.set_allowed_peers(options.allowed_peers.iter().map(|peer| parse_peer(peer)).collect());
    if let Some(key_dir) = options.key_dir {
        config.set_key_directory(key_dir);
    }
    if let Some(topic) = options.topic {
        config.set_topic(topic);
    }
    if let Some(port) = options.tcp_port {
        config.set_libp2p_tcp_port(port);
    }
    if let Some(port) = options.udp_port {
        config.set_libp2p_udp_port(port);
    }
    if let Some(port) = options.metrics_port {
        config.set_metrics_port(port);
    }
    if let Some(log_dir) = options.log_dir {
        config.set_log_file_path(log_dir);
    }
    config.validate()?;

    let storage = FileKeyStorage::new(config.resolve_key_directory()?);
    let keypair = load_or_create_identity_key(&storage)?;
    config.save_to_file()?;

    Ok((config, keypair.public().to_peer_id().to_base58()))
}

fn import_key(config: &NodeConfig, file: &Path) -> Result<String, CliError> {
    let bytes = fs::read(file).map_err(CliError::Io)?;
    let key_set = parse_threshold_key(&bytes)?;
    if key_set.threshold != config.threshold || key_set.participants != config.participants {
        return Err(CliError::Config(format!(
            "Key is {}-of-{} but the node is configured for {}-of-{}",
            key_set.threshold, key_set.participants, config.threshold, config.participants
        )));
    }

    let storage = FileKeyStorage::new(config.resolve_key_directory()?);
    save_threshold_key(&storage, &key_set)?;
    Ok(key_set.group_public_key_hex()?)
}

fn verify_signature(
    message: &str,
    message_is_hex: bool,
    signature_hex: &str,
    public_key_hex: &str,
) -> Result<(), CliError> {
    let message = if message_is_hex {
        hex::decode(message).map_err(|e| CliError::Config(format!("Message is not hex: {e}")))?
    } else {
        message.as_bytes().to_vec()
    };

    if verifier::verify_hex(&message, signature_hex, public_key_hex) {
        Ok(())
    } else {
        Err(CliError::InvalidSignature)
    }
}

fn identity(config: &NodeConfig) -> Result<String, CliError> {
    let storage = FileKeyStorage::new(config.resolve_key_directory()?);
    let keypair = load_or_create_identity_key(&storage)?;
    Ok(keypair.public().to_peer_id().to_base58())
}
