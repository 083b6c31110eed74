//! Configuration loaded from the environment (§6 ENUMERATED table).
//!
//! Every option in spec.md §6 is represented here with the documented default
//! and range; an out-of-range or unparsable value is a startup error, never a
//! silent clamp.

use crate::error::ConfigError;

/// Runtime configuration for the control plane.
#[derive(Debug, Clone)]
pub struct ConductorConfig {
    pub knowledge_max_concurrency: usize,
    pub knowledge_timeout_ms: u64,
    pub knowledge_confidence_threshold: f32,
    pub knowledge_max_response_size: usize,
    pub auto_connection_enabled: bool,
    pub rate_limit_requests_per_minute: u32,
    pub rate_limit_window_ms: u64,
    pub max_content_length: usize,
    pub verification_completion_threshold: u32,
    pub execution_success_rate_threshold: f32,
    pub initial_reasoning_effectiveness: f32,
    pub min_reasoning_effectiveness: f32,
    pub max_reasoning_effectiveness: f32,
    pub allowed_hosts: Vec<String>,
    pub enable_ssrf_protection: bool,
    pub user_agent: String,
    /// Additive (§3 of SPEC_FULL.md): how often the archival sweep runs.
    pub archive_sweep_secs: u64,
    /// Additive: how long a session may sit idle before archival (§4.2).
    pub session_ttl_hours: i64,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            knowledge_max_concurrency: 2,
            knowledge_timeout_ms: 4000,
            knowledge_confidence_threshold: 0.4,
            knowledge_max_response_size: 5000,
            auto_connection_enabled: true,
            rate_limit_requests_per_minute: 5,
            rate_limit_window_ms: 60_000,
            max_content_length: 2 * 1024 * 1024,
            verification_completion_threshold: 95,
            execution_success_rate_threshold: 0.7,
            initial_reasoning_effectiveness: 0.8,
            min_reasoning_effectiveness: 0.3,
            max_reasoning_effectiveness: 1.0,
            allowed_hosts: Vec::new(),
            enable_ssrf_protection: true,
            user_agent: concat!("conductor/", env!("CARGO_PKG_VERSION")).to_string(),
            archive_sweep_secs: 3600,
            session_ttl_hours: 24,
        }
    }
}

impl ConductorConfig {
    /// Load from environment, falling back to defaults. Bounds are enforced per §6;
    /// a value outside its documented range is rejected rather than clamped.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            knowledge_max_concurrency: env_ranged_usize(
                "KNOWLEDGE_MAX_CONCURRENCY",
                defaults.knowledge_max_concurrency,
                1,
                10,
            )?,
            knowledge_timeout_ms: env_ranged_u64(
                "KNOWLEDGE_TIMEOUT_MS",
                defaults.knowledge_timeout_ms,
                1000,
                30_000,
            )?,
            knowledge_confidence_threshold: env_ranged_f32(
                "KNOWLEDGE_CONFIDENCE_THRESHOLD",
                defaults.knowledge_confidence_threshold,
                0.0,
                1.0,
            )?,
            knowledge_max_response_size: env_usize(
                "KNOWLEDGE_MAX_RESPONSE_SIZE",
                defaults.knowledge_max_response_size,
            )?,
            auto_connection_enabled: env_bool(
                "AUTO_CONNECTION_ENABLED",
                defaults.auto_connection_enabled,
            ),
            rate_limit_requests_per_minute: env_positive_u32(
                "RATE_LIMIT_REQUESTS_PER_MINUTE",
                defaults.rate_limit_requests_per_minute,
            )?,
            rate_limit_window_ms: env_positive_u64(
                "RATE_LIMIT_WINDOW_MS",
                defaults.rate_limit_window_ms,
            )?,
            max_content_length: env_usize("MAX_CONTENT_LENGTH", defaults.max_content_length)?,
            verification_completion_threshold: env_ranged_u32(
                "VERIFICATION_COMPLETION_THRESHOLD",
                defaults.verification_completion_threshold,
                50,
                100,
            )?,
            execution_success_rate_threshold: env_ranged_f32(
                "EXECUTION_SUCCESS_RATE_THRESHOLD",
                defaults.execution_success_rate_threshold,
                0.0,
                1.0,
            )?,
            initial_reasoning_effectiveness: env_f32(
                "INITIAL_REASONING_EFFECTIVENESS",
                defaults.initial_reasoning_effectiveness,
            )?,
            min_reasoning_effectiveness: env_f32(
                "MIN_REASONING_EFFECTIVENESS",
                defaults.min_reasoning_effectiveness,
            )?,
            max_reasoning_effectiveness: env_f32(
                "MAX_REASONING_EFFECTIVENESS",
                defaults.max_reasoning_effectiveness,
            )?,
            allowed_hosts: env_csv("ALLOWED_HOSTS"),
            enable_ssrf_protection: env_bool(
                "ENABLE_SSRF_PROTECTION",
                defaults.enable_ssrf_protection,
            ),
            user_agent: std::env::var("USER_AGENT").unwrap_or(defaults.user_agent),
            archive_sweep_secs: env_positive_u64("ARCHIVE_SWEEP_SECS", defaults.archive_sweep_secs)?,
            session_ttl_hours: defaults.session_ttl_hours,
        })
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) if v.trim().is_empty() => default,
        Ok(v) => v.trim().eq_ignore_ascii_case("true") || v.trim() == "1",
        Err(_) => default,
    }
}

fn env_csv(name: &str) -> Vec<String> {
    std::env::var(name)
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn env_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(v) if v.trim().is_empty() => Ok(default),
        Ok(v) => v.trim().parse::<usize>().map_err(|e| ConfigError::Invalid {
            name,
            value: v,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn env_ranged_usize(
    name: &'static str,
    default: usize,
    min: usize,
    max: usize,
) -> Result<usize, ConfigError> {
    let v = env_usize(name, default)?;
    if v < min || v > max {
        return Err(ConfigError::OutOfRange {
            name,
            value: v.to_string(),
            range: range_label(min, max),
        });
    }
    Ok(v)
}

fn env_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(v) if v.trim().is_empty() => Ok(default),
        Ok(v) => v.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
            name,
            value: v,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn env_ranged_u64(name: &'static str, default: u64, min: u64, max: u64) -> Result<u64, ConfigError> {
    let v = env_u64(name, default)?;
    if v < min || v > max {
        return Err(ConfigError::OutOfRange {
            name,
            value: v.to_string(),
            range: range_label(min as usize, max as usize),
        });
    }
    Ok(v)
}

fn env_positive_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let v = env_u64(name, default)?;
    if v == 0 {
        return Err(ConfigError::OutOfRange { name, value: v.to_string(), range: ">0" });
    }
    Ok(v)
}

fn env_positive_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(v) if v.trim().is_empty() => Ok(default),
        Ok(v) => {
            let parsed = v.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
                name,
                value: v.clone(),
                reason: e.to_string(),
            })?;
            if parsed == 0 {
                return Err(ConfigError::OutOfRange { name, value: v, range: ">0" });
            }
            Ok(parsed)
        }
        Err(_) => Ok(default),
    }
}

fn env_ranged_u32(name: &'static str, default: u32, min: u32, max: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(v) if v.trim().is_empty() => Ok(default),
        Ok(v) => {
            let parsed = v.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
                name,
                value: v.clone(),
                reason: e.to_string(),
            })?;
            if parsed < min || parsed > max {
                return Err(ConfigError::OutOfRange {
                    name,
                    value: v,
                    range: range_label(min as usize, max as usize),
                });
            }
            Ok(parsed)
        }
        Err(_) => Ok(default),
    }
}

fn env_f32(name: &'static str, default: f32) -> Result<f32, ConfigError> {
    match std::env::var(name) {
        Ok(v) if v.trim().is_empty() => Ok(default),
        Ok(v) => v.trim().parse::<f32>().map_err(|e| ConfigError::Invalid {
            name,
            value: v,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn env_ranged_f32(name: &'static str, default: f32, min: f32, max: f32) -> Result<f32, ConfigError> {
    let v = env_f32(name, default)?;
    if v < min || v > max {
        return Err(ConfigError::OutOfRange {
            name,
            value: v.to_string(),
            range: range_label_f(min, max),
        });
    }
    Ok(v)
}

fn range_label(min: usize, max: usize) -> &'static str {
    // Small fixed table: the §6 ranges used by this config, kept as static strs for the error type.
    match (min, max) {
        (1, 10) => "1-10",
        (1000, 30_000) => "1000-30000",
        (50, 100) => "50-100",
        _ => "out of range",
    }
}

fn range_label_f(min: f32, max: f32) -> &'static str {
    if min == 0.0 && max == 1.0 {
        "0.0-1.0"
    } else {
        "out of range"
    }
}
