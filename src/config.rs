use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub const BIND_ADDR_VAR: &str = "TIMETABLE_BIND_ADDR";
pub const THREADS_VAR: &str = "TIMETABLE_SOLVER_THREADS";
pub const TIME_LIMIT_VAR: &str = "TIMETABLE_SOLVER_TIME_LIMIT_SECS";
pub const SEED_VAR: &str = "TIMETABLE_SOLVER_SEED";
pub const SOLVER_LOG_VAR: &str = "TIMETABLE_SOLVER_LOG";

/// Knobs handed to the HiGHS engine and to the subject shuffle.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Engine worker threads; 0 leaves the engine default.
    pub threads: u32,
    /// Wall-clock budget for one solve; `None` lets the engine run to completion.
    pub time_limit: Option<Duration>,
    /// Seed for the subject shuffle; `None` draws one from the OS.
    pub seed: Option<u64>,
    pub log_to_console: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            time_limit: Some(Duration::from_secs(30)),
            seed: None,
            log_to_console: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub solver: SolverConfig,
}

/// An environment variable that is set but cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value {:?} for {}", self.value, self.var)
    }
}

impl std::error::Error for ConfigError {}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the configuration from an arbitrary variable source, falling
    /// back to the defaults for anything unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        if let Some(addr) = parse_var(&lookup, BIND_ADDR_VAR)? {
            config.server.bind_addr = addr;
        }
        if let Some(threads) = parse_var(&lookup, THREADS_VAR)? {
            config.solver.threads = threads;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, TIME_LIMIT_VAR)? {
            config.solver.time_limit = (secs > 0).then(|| Duration::from_secs(secs));
        }
        config.solver.seed = parse_var(&lookup, SEED_VAR)?;
        if let Some(log) = parse_var(&lookup, SOLVER_LOG_VAR)? {
            config.solver.log_to_console = log;
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError { var, value: raw }),
    }
}
