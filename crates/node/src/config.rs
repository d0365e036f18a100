use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};
use tracing::debug;
use types::errors::NodeError;

use crate::protocol::ProtocolTimeouts;

pub const DEFAULT_TOPIC: &str = "eastnode";
pub const KEY_DIR_ENV: &str = "TSS_KEY_DIR";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerData {
    pub name: String,
    pub public_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default)]
    pub allowed_peers: Vec<PeerData>,
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,
    #[serde(default)]
    pub key_directory: Option<PathBuf>,
    #[serde(default)]
    pub libp2p_tcp_port: u16,
    #[serde(default)]
    pub libp2p_udp_port: u16,
    pub threshold: u16,
    pub participants: u16,
    #[serde(default = "default_commitment_timeout_ms")]
    pub commitment_timeout_ms: u64,
    #[serde(default = "default_signature_timeout_ms")]
    pub signature_timeout_ms: u64,
    #[serde(default = "default_participant_session_ttl_ms")]
    pub participant_session_ttl_ms: u64,
    #[serde(default)]
    pub metrics_port: Option<u16>,
    #[serde(skip)]
    pub config_file_path: PathBuf,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

const fn default_commitment_timeout_ms() -> u64 {
    5_000
}

const fn default_signature_timeout_ms() -> u64 {
    10_000
}

const fn default_participant_session_ttl_ms() -> u64 {
    15_000
}

impl NodeConfig {
    #[must_use]
    pub fn new(config_file_path: PathBuf, threshold: u16, participants: u16) -> Self {
        Self {
            topic: default_topic(),
            allowed_peers: Vec::new(),
            log_file_path: None,
            key_directory: None,
            libp2p_tcp_port: 0,
            libp2p_udp_port: 0,
            threshold,
            participants,
            commitment_timeout_ms: default_commitment_timeout_ms(),
            signature_timeout_ms: default_signature_timeout_ms(),
            participant_session_ttl_ms: default_participant_session_ttl_ms(),
            metrics_port: None,
            config_file_path,
        }
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.threshold == 0 || self.threshold > self.participants {
            return Err(NodeError::Error(format!(
                "Invalid group size: threshold {} of {} participants",
                self.threshold, self.participants
            )));
        }
        if self.topic.is_empty() {
            return Err(NodeError::Error("Gossip topic must not be empty".into()));
        }
        Ok(())
    }

    #[must_use]
    pub const fn timeouts(&self) -> ProtocolTimeouts {
        ProtocolTimeouts {
            commitment: Duration::from_millis(self.commitment_timeout_ms),
            signature: Duration::from_millis(self.signature_timeout_ms),
            participant_ttl: Duration::from_millis(self.participant_session_ttl_ms),
        }
    }

    /// Directory holding `.peer_key.json` and `.frost_key.json`. The environment
    /// override wins over the config file, which wins over the home directory.
    pub fn resolve_key_directory(&self) -> Result<PathBuf, NodeError> {
        if let Ok(dir) = dotenvy::var(KEY_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        if let Some(dir) = &self.key_directory {
            return Ok(dir.clone());
        }
        BaseDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .ok_or_else(|| NodeError::Error("Failed to determine home directory".into()))
    }

    pub fn get_config_file_path(file_path_option: Option<String>) -> Result<PathBuf, NodeError> {
        if let Some(file_path_str) = file_path_option {
            let mut path = PathBuf::from(file_path_str);
            if path.is_dir() {
                path.push("config.yaml");
            }
            debug!("Using config file path: {}", path.display());
            Ok(path)
        } else {
            let proj_dirs = ProjectDirs::from("", "", "tss-node")
                .ok_or_else(|| NodeError::Error("Failed to determine project directory".into()))?;
            Ok(proj_dirs.config_dir().join("config.yaml"))
        }
    }

    pub fn get_config(config_file_path: Option<String>) -> Result<Self, NodeError> {
        let config_file_path = Self::get_config_file_path(config_file_path)?;

        let contents = fs::read_to_string(&config_file_path).map_err(|e| {
            NodeError::Error(format!(
                "Failed to read config file {}: {e}",
                config_file_path.display()
            ))
        })?;

        let mut config = serde_yaml::from_str::<Self>(&contents)
            .map_err(|e| NodeError::Error(format!("Failed to deserialize config file: {e}")))?;
        config.config_file_path = config_file_path;
        config.validate()?;

        Ok(config)
    }

    pub fn save_to_file(&self) -> Result<(), NodeError> {
        if let Some(parent) = self.config_file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| NodeError::Error(format!("Failed to create config directory: {e}")))?;
        }

        let config_str = serde_yaml::to_string(self)
            .map_err(|e| NodeError::Error(format!("Failed to serialize config: {e}")))?;

        fs::write(&self.config_file_path, config_str)
            .map_err(|e| NodeError::Error(format!("Failed to write config: {e}")))?;

        Ok(())
    }

    pub fn set_allowed_peers(&mut self, peers: Vec<PeerData>) {
        self.allowed_peers = peers;
    }

    pub fn set_topic(&mut self, topic: String) {
        self.topic = topic;
    }

    pub fn set_key_directory(&mut self, dir: PathBuf) {
        self.key_directory = Some(dir);
    }

    pub fn set_log_file_path(&mut self, path: PathBuf) {
        self.log_file_path = Some(path);
    }

    pub const fn set_libp2p_tcp_port(&mut self, port: u16) {
        self.libp2p_tcp_port = port;
    }

    pub const fn set_libp2p_udp_port(&mut self, port: u16) {
        self.libp2p_udp_port = port;
    }

    pub const fn set_metrics_port(&mut self, port: u16) {
        self.metrics_port = Some(port);
    }
}
