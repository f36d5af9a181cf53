//! Merge rules: defaults, override order, conflict handling.

use crate::config::{default_connect_timeout_secs, default_request_timeout_secs};
use crate::logging::{default_format, default_log_level, default_output};
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("http.connect_timeout_secs", default_connect_timeout_secs())?
        .set_default("http.request_timeout_secs", default_request_timeout_secs())?
        .set_default("logging.level", default_log_level())?
        .set_default("logging.format", default_format())?
        .set_default("logging.output", default_output())
}
