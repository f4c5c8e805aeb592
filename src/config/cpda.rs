//! CPDA key agreement and clustering parameters (`cpda.*`).

use serde::{Deserialize, Serialize};

const DEFAULT_ENABLED: bool = true;
const DEFAULT_KEY_TOTAL: u16 = 100;
const DEFAULT_KEY_SELECTION: u16 = 10;
const DEFAULT_KEY_JITTER_MS: u64 = 100;
const DEFAULT_QUERY_DELAY_MS: u64 = 2000;
const DEFAULT_JOIN_TIMEOUT_MS: u64 = 1000;

/// CPDA configuration (`cpda.*`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpdaConfig {
    /// Run the key exchange at start (`cpda.enabled`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// This node floods the cluster query (`cpda.enable_query_node`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_query_node: Option<bool>,

    /// Size of the key pool; keys are drawn from `1..=key_total` (`cpda.key_total`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_total: Option<u16>,

    /// Distinct keys each node picks (`cpda.key_selection`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_selection: Option<u16>,

    /// Upper bound of the random delay before advertising keys, in ms (`cpda.key_jitter_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_jitter_ms: Option<u64>,

    /// Delay before the root floods its query, in ms (`cpda.query_delay_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_delay_ms: Option<u64>,

    /// How long a join may wait for confirmation, in ms (`cpda.join_timeout_ms`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_timeout_ms: Option<u64>,
}

impl CpdaConfig {
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(DEFAULT_ENABLED)
    }

    /// Whether this node is the cluster root. Off unless configured.
    pub fn enable_query_node(&self) -> bool {
        self.enable_query_node.unwrap_or(false)
    }

    pub fn key_total(&self) -> u16 {
        self.key_total.unwrap_or(DEFAULT_KEY_TOTAL)
    }

    pub fn key_selection(&self) -> u16 {
        self.key_selection.unwrap_or(DEFAULT_KEY_SELECTION)
    }

    pub fn key_jitter_ms(&self) -> u64 {
        self.key_jitter_ms.unwrap_or(DEFAULT_KEY_JITTER_MS)
    }

    pub fn query_delay_ms(&self) -> u64 {
        self.query_delay_ms.unwrap_or(DEFAULT_QUERY_DELAY_MS)
    }

    pub fn join_timeout_ms(&self) -> u64 {
        self.join_timeout_ms.unwrap_or(DEFAULT_JOIN_TIMEOUT_MS)
    }

    /// Merge another CPDA config into this one. Fields set in `other` win.
    pub fn merge(&mut self, other: CpdaConfig) {
        if other.enabled.is_some() {
            self.enabled = other.enabled;
        }
        if other.enable_query_node.is_some() {
            self.enable_query_node = other.enable_query_node;
        }
        if other.key_total.is_some() {
            self.key_total = other.key_total;
        }
        if other.key_selection.is_some() {
            self.key_selection = other.key_selection;
        }
        if other.key_jitter_ms.is_some() {
            self.key_jitter_ms = other.key_jitter_ms;
        }
        if other.query_delay_ms.is_some() {
            self.query_delay_ms = other.query_delay_ms;
        }
        if other.join_timeout_ms.is_some() {
            self.join_timeout_ms = other.join_timeout_ms;
        }
    }
}
