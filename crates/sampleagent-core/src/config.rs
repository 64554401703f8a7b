//! Application configuration.
//!
//! Every setting is a named, typed field with a default, so a missing or
//! partial `config.json` still yields a complete `Config`. The file lives at
//! `~/.config/sampleagent/config.json`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::TipCategory;

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "sampleagent";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_SYSTEM_CONTEXT: &str = "You are a specialized medical sample collection assistant AI. Your role is to help field agents with:

- Sample collection procedures and protocols
- Safety guidelines and contamination prevention
- Equipment troubleshooting and maintenance
- Temperature and handling requirements
- Emergency procedures and protocols
- Transportation and storage guidelines
- Quality control measures
- Regulatory compliance information

Always provide accurate, practical, and safety-focused guidance. Keep responses concise and actionable for field use.
If asked about non-medical topics, politely redirect to sample collection related questions.";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub assistant: AssistantConfig,
    pub tips: TipsConfig,
    pub performance: PerformanceConfig,
    pub storage: StorageKeys,
    pub tracking: TrackingConfig,
    pub timers: TimerConfig,
    pub connectivity: ConnectivityConfig,
    pub geo: GeoConfig,
    pub collection: CollectionConfig,
    pub security: SecurityConfig,
    pub features: FeatureFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub model: String,
    pub base_url: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub system_context: String,
    pub fallback_reply: String,
    pub request_timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta/models/".to_string(),
            max_output_tokens: 500,
            temperature: 0.7,
            system_context: DEFAULT_SYSTEM_CONTEXT.to_string(),
            fallback_reply: "Sorry, I encountered an error. Please try again later.".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TipsConfig {
    /// Remote tips endpoint. When unset the built-in tips are served.
    pub api_url: Option<String>,
    pub categories: Vec<TipCategory>,
    pub refresh_interval_secs: u64,
    pub validity_secs: u64,
    pub mock_delay_ms: u64,
}

impl Default for TipsConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            categories: vec![
                TipCategory::Safety,
                TipCategory::Handling,
                TipCategory::Transport,
                TipCategory::Storage,
                TipCategory::Quality,
            ],
            refresh_interval_secs: 300,
            validity_secs: 300,
            mock_delay_ms: 1000,
        }
    }
}

impl TipsConfig {
    pub fn validity(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.validity_secs as i64)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub chat_history_limit: usize,
    pub tips_cache_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            chat_history_limit: 50,
            tips_cache_size: 20,
        }
    }
}

/// Keys of the independently persisted slices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    pub pickups: String,
    pub preferences: String,
    pub offline_queue: String,
    pub health_tips: String,
    pub chat_history: String,
    pub report_drafts: String,
    pub capacity_bytes: usize,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            pickups: "sampleagent_pickups".to_string(),
            preferences: "sampleagent_preferences".to_string(),
            offline_queue: "sampleagent_offline_queue".to_string(),
            health_tips: "sampleagent_health_tips".to_string(),
            chat_history: "sampleagent_chat_history".to_string(),
            report_drafts: "sampleagent_report_drafts".to_string(),
            capacity_bytes: crate::storage::memory::DEFAULT_CAPACITY_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub active_pickup_id: String,
    pub auto_advance_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            active_pickup_id: "SM001".to_string(),
            auto_advance_secs: 3,
        }
    }
}

impl TrackingConfig {
    pub fn auto_advance_delay(&self) -> Duration {
        Duration::from_secs(self.auto_advance_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub clock_refresh_secs: u64,
    pub elapsed_refresh_secs: u64,
    pub connectivity_check_secs: u64,
    pub sensor_refresh_secs: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            clock_refresh_secs: 60,
            elapsed_refresh_secs: 1,
            connectivity_check_secs: 30,
            sensor_refresh_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// URL probed to decide whether we are online. When unset the console
    /// assumes it is online.
    pub probe_url: Option<String>,
    pub probe_timeout_secs: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_url: None,
            probe_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    pub max_age_ms: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 10_000,
            max_age_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    pub min: f64,
    pub max: f64,
}

impl TemperatureRange {
    pub fn contains(&self, celsius: f64) -> bool {
        celsius >= self.min && celsius <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Allowed transport temperature per sample kind, in °C
    pub temperature_ranges: HashMap<String, TemperatureRange>,
    pub max_transport_minutes: u32,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        let temperature_ranges = [
            ("blood", 2.0, 8.0),
            ("urine", 15.0, 25.0),
            ("tissue", -80.0, -70.0),
            ("swab", 15.0, 25.0),
        ]
        .into_iter()
        .map(|(kind, min, max)| (kind.to_string(), TemperatureRange { min, max }))
        .collect();

        Self {
            temperature_ranges,
            max_transport_minutes: 240,
        }
    }
}

impl CollectionConfig {
    pub fn range_for(&self, sample_kind: &str) -> Option<TemperatureRange> {
        self.temperature_ranges.get(sample_kind).copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    pub encrypt_local_data: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feature {
    VoiceInput,
    OfflineMode,
    GpsTracking,
    PushNotifications,
    BiometricAuth,
    DarkMode,
    HighContrast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub voice_input: bool,
    pub offline_mode: bool,
    pub gps_tracking: bool,
    pub push_notifications: bool,
    pub biometric_auth: bool,
    pub dark_mode: bool,
    pub high_contrast: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            voice_input: true,
            offline_mode: true,
            gps_tracking: true,
            push_notifications: true,
            biometric_auth: false,
            dark_mode: true,
            high_contrast: true,
        }
    }
}

impl FeatureFlags {
    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::VoiceInput => self.voice_input,
            Feature::OfflineMode => self.offline_mode,
            Feature::GpsTracking => self.gps_tracking,
            Feature::PushNotifications => self.push_notifications,
            Feature::BiometricAuth => self.biometric_auth,
            Feature::DarkMode => self.dark_mode,
            Feature::HighContrast => self.high_contrast,
        }
    }

    pub fn enabled(&self) -> Vec<Feature> {
        [
            Feature::VoiceInput,
            Feature::OfflineMode,
            Feature::GpsTracking,
            Feature::PushNotifications,
            Feature::BiometricAuth,
            Feature::DarkMode,
            Feature::HighContrast,
        ]
        .into_iter()
        .filter(|f| self.is_enabled(*f))
        .collect()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::from_json(&contents)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persisted slices and the log file.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}
