use crate::constants;
use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input: InputConfig,
    pub validation: ValidationConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub transactions: PathBuf,
    pub regions: PathBuf,
    pub delimiter: char,
    /// chrono formats tried in order for the transaction date
    pub date_formats: Vec<String>,
    pub transaction_columns: TransactionColumns,
    pub region_columns: RegionColumns,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            transactions: PathBuf::from("data/customer_shopping_data.csv"),
            regions: PathBuf::from("data/Region_detail_table.csv"),
            delimiter: ',',
            date_formats: constants::DEFAULT_DATE_FORMATS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            transaction_columns: TransactionColumns::default(),
            region_columns: RegionColumns::default(),
        }
    }
}

/// Header names of the transaction file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransactionColumns {
    pub transaction_id: String,
    pub customer_id: String,
    pub gender: String,
    pub age: String,
    pub category: String,
    pub quantity: String,
    pub unit_price: String,
    pub discount_rate: String,
    pub payment_method: String,
    pub transaction_date: String,
    pub mall: String,
}

impl Default for TransactionColumns {
    fn default() -> Self {
        Self {
            transaction_id: "invoice_no".to_string(),
            customer_id: "customer_id".to_string(),
            gender: "gender".to_string(),
            age: "age".to_string(),
            category: "category".to_string(),
            quantity: "quantity".to_string(),
            unit_price: "price".to_string(),
            discount_rate: "Discount".to_string(),
            payment_method: "payment_method".to_string(),
            transaction_date: "invoice_date".to_string(),
            mall: "shopping_mall".to_string(),
        }
    }
}

/// Header names of the region lookup file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegionColumns {
    pub mall: String,
    pub region: String,
}

impl Default for RegionColumns {
    fn default() -> Self {
        Self {
            mall: "shopping_mall".to_string(),
            region: "Region".to_string(),
        }
    }
}

/// What to do with rows that break a value-domain rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ViolationPolicy {
    /// Drop offending rows, count them, keep going.
    #[default]
    Exclude,
    /// Any error-severity violation fails the run.
    Abort,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub on_violation: ViolationPolicy,
    /// Fraction of transaction rows that may be excluded before the run aborts.
    pub max_excluded_ratio: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            on_violation: ViolationPolicy::Exclude,
            max_excluded_ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub root: PathBuf,
    pub decimal_places: usize,
    pub keep_generations: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("results"),
            decimal_places: 2,
            keep_generations: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let mut config: Config = toml::from_str(&config_content)?;
        config.apply_env_overrides()?;
        config.check()?;
        Ok(config)
    }

    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load_from(path);
        }
        let mut config = Config::default();
        config.apply_env_overrides()?;
        config.check()?;
        Ok(config)
    }

    /// `RETAIL_*` environment variables take precedence over the file.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("RETAIL_TRANSACTIONS_PATH") {
            self.input.transactions = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("RETAIL_REGIONS_PATH") {
            self.input.regions = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("RETAIL_OUTPUT_ROOT") {
            self.output.root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("RETAIL_SERVER_PORT") {
            self.server.port = v
                .parse()
                .map_err(|e| PipelineError::Config(format!("RETAIL_SERVER_PORT '{}': {}", v, e)))?;
        }
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.validation.max_excluded_ratio) {
            return Err(PipelineError::Config(format!(
                "validation.max_excluded_ratio must be within 0..=1, got {}",
                self.validation.max_excluded_ratio
            )));
        }
        if !self.input.delimiter.is_ascii() {
            return Err(PipelineError::Config(format!(
                "input.delimiter must be a single ASCII character, got '{}'",
                self.input.delimiter
            )));
        }
        if self.input.date_formats.is_empty() {
            return Err(PipelineError::Config(
                "input.date_formats must list at least one format".to_string(),
            ));
        }
        if self.output.keep_generations == 0 {
            return Err(PipelineError::Config(
                "output.keep_generations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [validation]
            on_violation = "abort"

            [output]
            root = "out"
            "#,
        )
        .unwrap();

        assert_eq!(config.validation.on_violation, ViolationPolicy::Abort);
        assert_eq!(config.validation.max_excluded_ratio, 1.0);
        assert_eq!(config.output.root, PathBuf::from("out"));
        assert_eq!(config.output.decimal_places, 2);
        assert_eq!(config.input.transaction_columns.unit_price, "price");
        assert_eq!(config.input.region_columns.region, "Region");
    }

    #[test]
    fn test_ratio_out_of_range_is_rejected() {
        let mut config = Config::default();
        config.validation.max_excluded_ratio = 1.5;
        assert!(matches!(config.check(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[input]\ndelimiter = ';'\ndate_formats = [\"%Y-%m-%d\"]\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.input.delimiter, ';');
        assert_eq!(config.input.date_formats, vec!["%Y-%m-%d".to_string()]);
    }
}
