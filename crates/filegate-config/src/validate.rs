//! Validation helpers and parsing utilities for configuration values.

use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::time::Duration;

use url::Url;

use crate::error::{ConfigError, ConfigResult};

pub(crate) fn parse_port(field: &'static str, value: &str) -> ConfigResult<u16> {
    let port = value
        .trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::invalid(field, "not_a_port", value))?;
    if port == 0 {
        return Err(ConfigError::invalid(field, "zero", value));
    }
    Ok(port)
}

pub(crate) fn parse_bind_addr(field: &'static str, value: &str) -> ConfigResult<IpAddr> {
    value
        .trim()
        .parse::<IpAddr>()
        .map_err(|_| ConfigError::invalid(field, "not_an_ip_address", value))
}

pub(crate) fn parse_positive(field: &'static str, value: &str) -> ConfigResult<u64> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::invalid(field, "zero", value)),
        Ok(parsed) => Ok(parsed),
        Err(_) => Err(ConfigError::invalid(field, "not_an_integer", value)),
    }
}

pub(crate) fn parse_seconds(field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_positive(field, value).map(Duration::from_secs)
}

pub(crate) fn parse_millis(field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_positive(field, value).map(Duration::from_millis)
}

pub(crate) fn parse_attempts(field: &'static str, value: &str) -> ConfigResult<u32> {
    let parsed = parse_positive(field, value)?;
    u32::try_from(parsed).map_err(|_| ConfigError::invalid(field, "out_of_range", value))
}

pub(crate) fn parse_url(field: &'static str, value: &str) -> ConfigResult<Url> {
    let url = Url::parse(value.trim()).map_err(|_| ConfigError::invalid(field, "not_a_url", value))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(field, "unsupported_scheme", value));
    }
    Ok(url)
}

pub(crate) fn parse_folder(field: &'static str, value: &str) -> ConfigResult<String> {
    let folder = value.trim().trim_matches('/');
    if folder.is_empty() {
        return Err(ConfigError::invalid(field, "empty", value));
    }
    if folder.contains('/') {
        return Err(ConfigError::invalid(field, "nested_folder", value));
    }
    if folder.eq_ignore_ascii_case("inbound") {
        return Err(ConfigError::invalid(field, "reserved_folder", value));
    }
    Ok(folder.to_string())
}

pub(crate) fn column_count(file_type: &str, value: usize) -> ConfigResult<NonZeroUsize> {
    NonZeroUsize::new(value).ok_or_else(|| ConfigError::invalid("columns", "zero", file_type))
}
