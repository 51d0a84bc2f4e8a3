//! Configuration loading from TOML files
//!
//! Config file is selected via `--config <path>` (default: config/dev.toml).
//! Every section is optional; missing keys take the defaults below.

use anyhow::{ensure, Context};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Unit conversion and calibration constants for metric integration
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Belt travel per encoder pulse (mm)
    pub pulse_to_mm: f64,
    pub mm_to_m: f64,
    pub mm2_to_m2: f64,
    /// Empirical factor between integrated and real volume
    pub volume_approx: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self { pulse_to_mm: 0.05, mm_to_m: 0.001, mm2_to_m2: 0.000001, volume_approx: 0.94 }
    }
}

/// When the alignment debouncer is fed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentSampling {
    /// Once per flush window, using the latest trusted alignment
    Flush,
    /// On every accepted reading, and once more at each flush
    Reading,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    Jsonl,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "conveyor".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct UdpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Datagram read buffer (bytes)
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,
    /// Kernel receive buffer (SO_RCVBUF); OS default when unset
    #[serde(default)]
    pub socket_recv_buffer_bytes: Option<usize>,
    #[serde(default = "default_retry_pause_ms")]
    pub retry_pause_ms: u64,
    #[serde(default = "default_bind_retry_ms")]
    pub bind_retry_ms: u64,
    /// Wait before the first receive, giving the sensor link time to come up
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            recv_buffer_size: default_recv_buffer_size(),
            socket_recv_buffer_bytes: None,
            retry_pause_ms: default_retry_pause_ms(),
            bind_retry_ms: default_bind_retry_ms(),
            startup_delay_secs: default_startup_delay_secs(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:50000".to_string()
}

fn default_recv_buffer_size() -> usize {
    1024
}

fn default_retry_pause_ms() -> u64 {
    100
}

fn default_bind_retry_ms() -> u64 {
    1000
}

fn default_startup_delay_secs() -> u64 {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlushConfig {
    #[serde(default = "default_flush_interval_secs")]
    pub interval_secs: u64,
    /// Bounded queue between the receive loop and the flush worker
    #[serde(default = "default_flush_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_flush_interval_secs(),
            queue_capacity: default_flush_queue_capacity(),
        }
    }
}

fn default_flush_interval_secs() -> u64 {
    3
}

fn default_flush_queue_capacity() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlignmentConfig {
    /// Plausibility band for the sensor distance; alignment outside it is not trusted
    #[serde(default = "default_distance_min_mm")]
    pub distance_min_mm: f64,
    #[serde(default = "default_distance_max_mm")]
    pub distance_max_mm: f64,
    #[serde(default = "default_alignment_sampling")]
    pub sampling: AlignmentSampling,
    /// Publish the bootstrap zone once at startup
    #[serde(default = "default_announce_initial")]
    pub announce_initial: bool,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            distance_min_mm: default_distance_min_mm(),
            distance_max_mm: default_distance_max_mm(),
            sampling: default_alignment_sampling(),
            announce_initial: default_announce_initial(),
        }
    }
}

fn default_distance_min_mm() -> f64 {
    46.0
}

fn default_distance_max_mm() -> f64 {
    54.0
}

fn default_alignment_sampling() -> AlignmentSampling {
    AlignmentSampling::Flush
}

fn default_announce_initial() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_enabled")]
    pub enabled: bool,
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Topic for alignment alerts (plain text, QoS 0)
    #[serde(default = "default_mqtt_topic")]
    pub topic: String,
    #[serde(default = "default_mqtt_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: default_mqtt_enabled(),
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            topic: default_mqtt_topic(),
            client_id: default_mqtt_client_id(),
            username: None,
            password: None,
        }
    }
}

fn default_mqtt_enabled() -> bool {
    true
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_topic() -> String {
    "conveyor/alerts".to_string()
}

fn default_mqtt_client_id() -> String {
    "conveyor-gateway".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_persistence_backend")]
    pub backend: PersistenceBackend,
    /// JSONL output file (jsonl backend)
    #[serde(default = "default_persistence_file")]
    pub file: String,
    /// Connection URL (postgres backend)
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_persistence_table")]
    pub table: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: default_persistence_backend(),
            file: default_persistence_file(),
            database_url: None,
            table: default_persistence_table(),
        }
    }
}

fn default_persistence_backend() -> PersistenceBackend {
    PersistenceBackend::Jsonl
}

fn default_persistence_file() -> String {
    "metrics.jsonl".to_string()
}

fn default_persistence_table() -> String {
    "metrics".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Append every raw datagram to a daily JSONL file
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_capture_dir")]
    pub dir: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { enabled: false, dir: default_capture_dir() }
    }
}

fn default_capture_dir() -> String {
    "logs".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Ingest counter report interval
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub udp: UdpConfig,
    #[serde(default)]
    pub flush: FlushConfig,
    #[serde(default)]
    pub calibration: Calibration,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    config_file: String,
    site_id: String,
    udp_bind_address: String,
    udp_recv_buffer_size: usize,
    udp_socket_recv_buffer_bytes: Option<usize>,
    udp_retry_pause_ms: u64,
    udp_bind_retry_ms: u64,
    startup_delay: Duration,
    flush_interval: Duration,
    flush_queue_capacity: usize,
    calibration: Calibration,
    distance_min_mm: f64,
    distance_max_mm: f64,
    alignment_sampling: AlignmentSampling,
    announce_initial: bool,
    mqtt_enabled: bool,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_topic: String,
    mqtt_client_id: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    persistence_backend: PersistenceBackend,
    persistence_file: String,
    database_url: Option<String>,
    persistence_table: String,
    capture_enabled: bool,
    capture_dir: String,
    metrics_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            config_file,
            site_id: toml_config.site.id,
            udp_bind_address: toml_config.udp.bind_address,
            udp_recv_buffer_size: toml_config.udp.recv_buffer_size,
            udp_socket_recv_buffer_bytes: toml_config.udp.socket_recv_buffer_bytes,
            udp_retry_pause_ms: toml_config.udp.retry_pause_ms,
            udp_bind_retry_ms: toml_config.udp.bind_retry_ms,
            startup_delay: Duration::from_secs(toml_config.udp.startup_delay_secs),
            flush_interval: Duration::from_secs(toml_config.flush.interval_secs),
            flush_queue_capacity: toml_config.flush.queue_capacity,
            calibration: toml_config.calibration,
            distance_min_mm: toml_config.alignment.distance_min_mm,
            distance_max_mm: toml_config.alignment.distance_max_mm,
            alignment_sampling: toml_config.alignment.sampling,
            announce_initial: toml_config.alignment.announce_initial,
            mqtt_enabled: toml_config.mqtt.enabled,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_topic: toml_config.mqtt.topic,
            mqtt_client_id: toml_config.mqtt.client_id,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            persistence_backend: toml_config.persistence.backend,
            persistence_file: toml_config.persistence.file,
            database_url: toml_config.persistence.database_url,
            persistence_table: toml_config.persistence.table,
            capture_enabled: toml_config.capture.enabled,
            capture_dir: toml_config.capture.dir,
            metrics_interval_secs: toml_config.metrics.interval_secs,
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str, source: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig =
            toml::from_str(content).with_context(|| format!("Failed to parse config {}", source))?;
        let config = Self::from_toml(toml_config, source.to_string());
        config.validate().with_context(|| format!("Invalid config {}", source))?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::warn!(path = %path, error = %reason, "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.flush_interval.is_zero(), "flush.interval_secs must be positive");
        ensure!(self.flush_queue_capacity > 0, "flush.queue_capacity must be positive");
        ensure!(
            self.distance_min_mm <= self.distance_max_mm,
            "alignment.distance_min_mm ({}) exceeds distance_max_mm ({})",
            self.distance_min_mm,
            self.distance_max_mm
        );
        ensure!(
            self.udp_recv_buffer_size >= crate::io::frame::FRAME_LEN,
            "udp.recv_buffer_size must hold a {} byte frame",
            crate::io::frame::FRAME_LEN
        );
        ensure!(
            self.calibration.volume_approx > 0.0 && self.calibration.pulse_to_mm > 0.0,
            "calibration constants must be positive"
        );
        Ok(())
    }

    // Getters for all config fields
    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn udp_bind_address(&self) -> &str {
        &self.udp_bind_address
    }

    pub fn udp_recv_buffer_size(&self) -> usize {
        self.udp_recv_buffer_size
    }

    pub fn udp_socket_recv_buffer_bytes(&self) -> Option<usize> {
        self.udp_socket_recv_buffer_bytes
    }

    pub fn udp_retry_pause(&self) -> Duration {
        Duration::from_millis(self.udp_retry_pause_ms)
    }

    pub fn udp_bind_retry(&self) -> Duration {
        Duration::from_millis(self.udp_bind_retry_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        self.startup_delay
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    pub fn flush_queue_capacity(&self) -> usize {
        self.flush_queue_capacity
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn distance_band_mm(&self) -> (f64, f64) {
        (self.distance_min_mm, self.distance_max_mm)
    }

    pub fn alignment_sampling(&self) -> AlignmentSampling {
        self.alignment_sampling
    }

    pub fn announce_initial(&self) -> bool {
        self.announce_initial
    }

    pub fn mqtt_enabled(&self) -> bool {
        self.mqtt_enabled
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn mqtt_client_id(&self) -> &str {
        &self.mqtt_client_id
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn persistence_backend(&self) -> &PersistenceBackend {
        &self.persistence_backend
    }

    pub fn persistence_file(&self) -> &str {
        &self.persistence_file
    }

    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }

    pub fn persistence_table(&self) -> &str {
        &self.persistence_table
    }

    pub fn capture_enabled(&self) -> bool {
        self.capture_enabled
    }

    pub fn capture_dir(&self) -> &str {
        &self.capture_dir
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    /// Builder method for tests to shorten the flush window
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Builder method for tests to skip the startup delay
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Builder method for tests to bind an ephemeral port
    pub fn with_udp_bind_address(mut self, addr: &str) -> Self {
        self.udp_bind_address = addr.to_string();
        self
    }

    /// Builder method for tests to change the debouncer feed
    pub fn with_alignment_sampling(mut self, sampling: AlignmentSampling) -> Self {
        self.alignment_sampling = sampling;
        self
    }

    /// Builder method for tests to silence the bootstrap announcement
    pub fn with_announce_initial(mut self, announce: bool) -> Self {
        self.announce_initial = announce;
        self
    }
}
