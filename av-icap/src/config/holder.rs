//! Immutable, validated per-scanner settings.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::key::PropertyKey;

/// Validated settings for a single scanner id.
///
/// Instances are built by the loader from already-validated property text and
/// are immutable afterwards; the cache hands them out behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    scanner_id: String,
    hostname: String,
    // The schema admits ports up to 99999, which does not fit in a u16.
    port: u32,
    service: String,
    server_version: String,
    preview_size: i32,
    std_receive_length: usize,
    std_send_length: usize,
    connection_timeout: Duration,
    reject_file_on_error: bool,
    scan_from_integrator: bool,
    max_file_size: i64,
    reject_file_over_max_size: bool,
    filename_restrictions: Vec<String>,
    protocol_restrictions: Vec<String>,
    file_extension_restrictions: Vec<String>,
    partner_name_restrictions: Vec<String>,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_ignore_case(list: &[String], needle: &str) -> bool {
    list.iter().any(|entry| entry.eq_ignore_ascii_case(needle))
}

impl ScannerConfig {
    /// Build a holder from a complete, validated property map.
    ///
    /// The loader guarantees every key in [`PropertyKey::ALL`] is present
    /// (mandatory values, applied defaults, or empty restriction lists), so
    /// the numeric parses here cannot fail; absent entries fall back to the
    /// schema defaults anyway.
    pub(crate) fn from_properties(
        scanner_id: &str,
        properties: &HashMap<PropertyKey, String>,
    ) -> ScannerConfig {
        let text = |key: PropertyKey| -> &str {
            properties
                .get(&key)
                .map(String::as_str)
                .or(key.default_value())
                .unwrap_or("")
        };

        let timeout_ms = text(PropertyKey::ConnectionTimeout).parse::<u64>().unwrap_or(10_000);

        ScannerConfig {
            scanner_id: scanner_id.to_string(),
            hostname: text(PropertyKey::Hostname).to_string(),
            port: text(PropertyKey::Port).parse().unwrap_or(0),
            service: text(PropertyKey::Service).to_string(),
            server_version: text(PropertyKey::IcapServerVersion).to_string(),
            preview_size: text(PropertyKey::PreviewSize).parse().unwrap_or(-1),
            std_receive_length: text(PropertyKey::StdReceiveLength).parse().unwrap_or(8192),
            std_send_length: text(PropertyKey::StdSendLength).parse().unwrap_or(8192),
            connection_timeout: Duration::from_millis(timeout_ms),
            reject_file_on_error: text(PropertyKey::RejectFileOnError).eq_ignore_ascii_case("true"),
            scan_from_integrator: text(PropertyKey::ScanFromIntegrator)
                .eq_ignore_ascii_case("true"),
            max_file_size: text(PropertyKey::MaxFileSize).parse().unwrap_or(-1),
            reject_file_over_max_size: text(PropertyKey::RejectFileOverMaxSize)
                .eq_ignore_ascii_case("true"),
            filename_restrictions: split_list(text(PropertyKey::FileNameRestriction)),
            protocol_restrictions: split_list(text(PropertyKey::ProtocolRestriction)),
            file_extension_restrictions: split_list(text(PropertyKey::FileExtensionRestriction)),
            partner_name_restrictions: split_list(text(PropertyKey::PartnerNameRestriction)),
        }
    }

    pub fn scanner_id(&self) -> &str {
        &self.scanner_id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u32 {
        self.port
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Configured preview size; `-1` means "adopt whatever the server offers".
    pub fn preview_size(&self) -> i32 {
        self.preview_size
    }

    pub fn std_receive_length(&self) -> usize {
        self.std_receive_length
    }

    pub fn std_send_length(&self) -> usize {
        self.std_send_length
    }

    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    pub fn reject_file_on_error(&self) -> bool {
        self.reject_file_on_error
    }

    pub fn scan_from_integrator(&self) -> bool {
        self.scan_from_integrator
    }

    /// Maximum scannable file size in bytes; non-positive means unrestricted.
    pub fn max_file_size(&self) -> i64 {
        self.max_file_size
    }

    pub fn reject_file_over_max_size(&self) -> bool {
        self.reject_file_over_max_size
    }

    pub fn filename_restrictions(&self) -> &[String] {
        &self.filename_restrictions
    }

    pub fn protocol_restrictions(&self) -> &[String] {
        &self.protocol_restrictions
    }

    pub fn file_extension_restrictions(&self) -> &[String] {
        &self.file_extension_restrictions
    }

    pub fn partner_name_restrictions(&self) -> &[String] {
        &self.partner_name_restrictions
    }

    pub fn exceeds_max_file_size(&self, len: u64) -> bool {
        self.max_file_size > 0 && len > self.max_file_size as u64
    }

    pub fn is_filename_restricted(&self, name: &str) -> bool {
        contains_ignore_case(&self.filename_restrictions, name)
    }

    pub fn is_protocol_restricted(&self, protocol: &str) -> bool {
        contains_ignore_case(&self.protocol_restrictions, protocol)
    }

    pub fn is_file_extension_restricted(&self, extension: &str) -> bool {
        contains_ignore_case(&self.file_extension_restrictions, extension)
    }

    pub fn is_partner_restricted(&self, partner: &str) -> bool {
        contains_ignore_case(&self.partner_name_restrictions, partner)
    }
}
