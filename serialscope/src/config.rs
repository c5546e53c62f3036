/*!
Configuration management for the serialscope application.
*/

use anyhow::{Context, Result};
use asyncframe::Settings;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub decoder: Settings,
    pub simulation: SimulationConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            decoder: Settings::default(),
            simulation: SimulationConfig::default(),
            output: OutputConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse config file as TOML")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Check the decoder settings and simulation parameters
    pub fn validate(&self) -> Result<()> {
        self.decoder
            .validate()
            .with_context(|| "Invalid [decoder] section")?;
        if self.simulation.sample_rate == 0 {
            anyhow::bail!("Invalid [simulation] section: sample_rate must be non-zero");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Simulation specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Sample rate of generated captures in Hz
    pub sample_rate: u32,

    /// Minimum number of samples to generate
    pub samples: u64,

    /// Directory that receives one timestamped folder per run
    pub output_directory: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sample_rate: 1_000_000,
            samples: 1_000_000,
            output_directory: "./simulations".to_string(),
        }
    }
}

/// Decode output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where `<capture>.frames.json` files go; empty means next to each capture
    pub directory: String,

    /// Indent JSON output
    pub pretty_json: bool,

    /// Include bit and error markers in the output
    pub include_markers: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: String::new(),
            pretty_json: true,
            include_markers: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asyncframe::{LineCoding, Parity, StopBits};
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_roundtrip() {
        let mut original_config = AppConfig::new();
        original_config.decoder.stop_bits = StopBits::OneAndHalf;
        original_config.decoder.parity = Parity::Odd;

        let temp_file = NamedTempFile::new().unwrap();
        let temp_path = temp_file.path();

        // Save and load
        original_config.save_to_file(temp_path).unwrap();
        let loaded_config = AppConfig::load_from_file(temp_path).unwrap();

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn test_default_values() {
        let config = AppConfig::new();

        assert_eq!(config.decoder.bit_rate, 9600);
        assert_eq!(config.decoder.bits_per_transfer, 8);
        assert_eq!(config.decoder.line_coding, LineCoding::Nrz);
        assert!(!config.decoder.use_autobaud);

        assert_eq!(config.simulation.sample_rate, 1_000_000);
        assert_eq!(config.simulation.output_directory, "./simulations");
        assert!(config.output.pretty_json);
        assert!(config.output.directory.is_empty());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [decoder]
            bit_rate = 2000
            line_coding = "biphase"
            stop_bits = 2.0
            "#,
        )
        .unwrap();

        assert_eq!(config.decoder.bit_rate, 2000);
        assert_eq!(config.decoder.line_coding, LineCoding::Biphase);
        assert_eq!(config.decoder.stop_bits, StopBits::Two);
        assert_eq!(config.decoder.bits_per_transfer, 8);
        assert_eq!(config.simulation, SimulationConfig::default());
    }

    #[test]
    fn test_invalid_settings_rejected_on_load() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(
            temp_file.path(),
            "[decoder]\nparity = \"even\"\nmode = \"mp_msb_one_means_address\"\n",
        )
        .unwrap();

        let err = AppConfig::load_from_file(temp_file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("parity cannot be combined with multiprocessor mode"));
    }

    #[test]
    fn test_unsupported_stop_bits_rejected() {
        let result: Result<AppConfig, _> = toml::from_str("[decoder]\nstop_bits = 3.0\n");
        assert!(result.is_err());
    }
}
