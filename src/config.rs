//! Runtime configuration. Grounded on the teacher's `models::Config::from_env`
//! (`dotenv::dotenv().ok()` + `std::env::var` with per-field defaults).

use clap::Parser;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub gpio_host: String,
    pub gpio_port: u16,
    pub gpio_heartbeat_timeout_secs: u64,
    pub gpio_watchdog_interval_secs: u64,
    pub autopause_open_secs: u64,
    pub autopause_close_secs: u64,
    pub autopause_cooldown_secs: u64,
    pub autopause_reconcile_interval_secs: u64,
    pub autopause_rearm_watchdog_interval_secs: u64,
    pub counter_pin: u32,
    pub ponderal_pin: u32,
    pub etiqueta_pin: u32,
}

fn env_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_current_env()
    }

    /// Loads `path` as a dotenv-style file before resolving the rest of the
    /// fields from the environment, so `--config <FILE>` can point at a file
    /// other than `.env` (SPEC_FULL.md §10.3). Variables already set in the
    /// process environment still take precedence, matching `dotenv`'s own
    /// "never override an existing var" rule.
    pub fn from_env_with_override_file(path: Option<&str>) -> Self {
        if let Some(path) = path {
            let _ = dotenv::from_path(path);
        }
        dotenv::dotenv().ok();
        Self::from_current_env()
    }

    fn from_current_env() -> Self {
        Self {
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "./cremer-core.db".to_string()),
            gpio_host: std::env::var("GPIO_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            gpio_port: env_or("GPIO_PORT", 9100u16),
            gpio_heartbeat_timeout_secs: env_or("GPIO_HEARTBEAT_TIMEOUT_SECS", 60),
            gpio_watchdog_interval_secs: env_or("GPIO_WATCHDOG_INTERVAL_SECS", 15),
            autopause_open_secs: env_or("AUTOPAUSE_OPEN_SECS", 20),
            autopause_close_secs: env_or("AUTOPAUSE_CLOSE_SECS", 5),
            autopause_cooldown_secs: env_or("AUTOPAUSE_COOLDOWN_SECS", 30),
            autopause_reconcile_interval_secs: env_or("AUTOPAUSE_RECONCILE_INTERVAL_SECS", 5),
            autopause_rearm_watchdog_interval_secs: env_or(
                "AUTOPAUSE_REARM_WATCHDOG_INTERVAL_SECS",
                3,
            ),
            counter_pin: env_or("COUNTER_PIN", 0u32),
            ponderal_pin: env_or("PONDERAL_PIN", 1u32),
            etiqueta_pin: env_or("ETIQUETA_PIN", 2u32),
        }
    }

    pub fn apply_cli(&mut self, cli: &CliArgs) {
        if let Some(path) = &cli.database_path {
            self.database_path = path.clone();
        }
        if let Some(host) = &cli.gpio_host {
            self.gpio_host = host.clone();
        }
        if let Some(port) = cli.gpio_port {
            self.gpio_port = port;
        }
    }
}

/// Command-line overrides for the most commonly tweaked settings.
#[derive(Debug, Parser)]
#[command(name = "cremer-core", about = "Packaging-line production control core")]
pub struct CliArgs {
    /// Load a dotenv-style file of overrides before resolving the rest of
    /// this struct and `Config::from_env`'s defaults
    #[arg(long, value_name = "FILE")]
    pub config: Option<String>,

    /// Override DATABASE_PATH
    #[arg(long, env = "DATABASE_PATH")]
    pub database_path: Option<String>,

    /// Override GPIO_HOST
    #[arg(long, env = "GPIO_HOST")]
    pub gpio_host: Option<String>,

    /// Override GPIO_PORT
    #[arg(long, env = "GPIO_PORT")]
    pub gpio_port: Option<u16>,
}
