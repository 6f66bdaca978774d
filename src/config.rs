//! Process-wide configuration, read once at startup

use anyhow::{anyhow, Context, Result};
use gate_shared::{defaults, CommandMatcher, Lane, RetriggerPolicy, ServoGeometry};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "GATE_CONFIG";

/// Network attachment settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network name, reported in logs
    pub ssid: String,
    pub passphrase: String,
    /// Address probed to prove the link is up; defaults to the broker
    pub probe_addr: Option<String>,
    /// Immediate retries after the first failed attach
    pub max_attempts: u32,
    pub attach_timeout_ms: u64,
    /// Re-probe period once attached, zero disables link supervision
    pub watch_interval_secs: u64,
}

impl NetworkConfig {
    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.attach_timeout_ms)
    }

    pub fn watch_interval(&self) -> Option<Duration> {
        (self.watch_interval_secs > 0).then(|| Duration::from_secs(self.watch_interval_secs))
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ssid: "Ze".into(),
            passphrase: "987654321".into(),
            probe_addr: None,
            max_attempts: defaults::MAX_ATTACH_ATTEMPTS,
            attach_timeout_ms: 5000,
            watch_interval_secs: 30,
        }
    }
}

/// Message broker settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub entry_topic: String,
    pub exit_topic: String,
    pub open_token: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "138.199.217.16".into(),
            port: 1883,
            username: "parkers".into(),
            password: "parkers".into(),
            client_id: "gate-controller".into(),
            keep_alive_secs: 5,
            entry_topic: defaults::ENTRY_TOPIC.into(),
            exit_topic: defaults::EXIT_TOPIC.into(),
            open_token: defaults::OPEN_TOKEN.into(),
        }
    }
}

impl BrokerConfig {
    pub fn matcher(&self) -> CommandMatcher {
        CommandMatcher::new(&self.entry_topic, &self.exit_topic, &self.open_token)
    }
}

/// One lane's servo wiring and angles
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    /// PWM channel driving this lane's servo; entry uses 0 and exit 1 when unset
    pub channel: Option<u32>,
    pub open_angle: u32,
    pub closed_angle: u32,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            channel: None,
            open_angle: defaults::OPEN_ANGLE,
            closed_angle: defaults::CLOSED_ANGLE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatesConfig {
    pub dwell_ms: u64,
    pub retrigger: RetriggerPolicy,
    pub entry: LaneConfig,
    pub exit: LaneConfig,
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            dwell_ms: defaults::DWELL_MS,
            retrigger: RetriggerPolicy::default(),
            entry: LaneConfig::default(),
            exit: LaneConfig::default(),
        }
    }
}

impl GatesConfig {
    pub fn lane(&self, lane: Lane) -> &LaneConfig {
        match lane {
            Lane::Entry => &self.entry,
            Lane::Exit => &self.exit,
        }
    }

    /// PWM channel of a lane's servo
    pub fn channel(&self, lane: Lane) -> u32 {
        self.lane(lane).channel.unwrap_or(match lane {
            Lane::Entry => 0,
            Lane::Exit => 1,
        })
    }

    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }
}

/// Which pulse driver backs the servos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Log pulse widths only
    #[default]
    Log,
    /// Linux sysfs PWM
    Sysfs,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    pub min_pulse_us: u32,
    pub max_pulse_us: u32,
    pub max_degree: u32,
    pub period_us: u32,
    pub driver: DriverKind,
    pub pwm_chip: u32,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            min_pulse_us: defaults::MIN_PULSE_US,
            max_pulse_us: defaults::MAX_PULSE_US,
            max_degree: defaults::MAX_DEGREE,
            period_us: defaults::PWM_PERIOD_US,
            driver: DriverKind::default(),
            pwm_chip: 0,
        }
    }
}

impl ServoConfig {
    pub fn geometry(&self) -> ServoGeometry {
        ServoGeometry {
            min_pulse_us: self.min_pulse_us,
            max_pulse_us: self.max_pulse_us,
            max_degree: self.max_degree,
        }
    }
}

/// Complete controller configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GateSystemConfig {
    pub network: NetworkConfig,
    pub broker: BrokerConfig,
    pub gates: GatesConfig,
    pub servo: ServoConfig,
}

impl GateSystemConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse gate config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file path
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Load from the first CLI argument or `GATE_CONFIG`, else built-in defaults
    pub fn load() -> Result<Self> {
        let path = std::env::args()
            .nth(1)
            .or_else(|| std::env::var(CONFIG_ENV).ok());

        match path {
            Some(path) => Self::from_file(Path::new(&path)),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Address probed during network attachment
    pub fn probe_addr(&self) -> String {
        self.network
            .probe_addr
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.broker.host, self.broker.port))
    }

    pub fn validate(&self) -> Result<()> {
        let geometry = self.servo.geometry();
        geometry.validate()?;

        for lane in Lane::ALL {
            let cfg = self.gates.lane(lane);
            geometry
                .check_angle(cfg.open_angle)
                .with_context(|| format!("{} open_angle", lane))?;
            geometry
                .check_angle(cfg.closed_angle)
                .with_context(|| format!("{} closed_angle", lane))?;
        }

        if self.gates.channel(Lane::Entry) == self.gates.channel(Lane::Exit) {
            return Err(anyhow!(
                "Entry and exit servos share PWM channel {}",
                self.gates.channel(Lane::Entry)
            ));
        }
        if self.gates.dwell_ms == 0 {
            return Err(anyhow!("dwell_ms must be greater than zero"));
        }
        if self.servo.period_us <= self.servo.max_pulse_us {
            return Err(anyhow!(
                "PWM period {}us must exceed max pulse {}us",
                self.servo.period_us,
                self.servo.max_pulse_us
            ));
        }
        if self.broker.entry_topic == self.broker.exit_topic {
            return Err(anyhow!("Entry and exit topics must differ"));
        }
        if self.broker.keep_alive_secs < 5 {
            return Err(anyhow!("keep_alive_secs must be at least 5"));
        }
        if self.broker.open_token.is_empty() {
            return Err(anyhow!("open_token must not be empty"));
        }
        Ok(())
    }
}
