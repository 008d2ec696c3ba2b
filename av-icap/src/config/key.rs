//! The recognized scanner property schema.

use std::fmt;

use crate::config::validate::Validator;

/// One entry of the scanner configuration schema: the wire name used inside
/// the properties file, an optional validator and an optional default value.
///
/// A key either carries a validator (and possibly a default) or is a
/// free-form restriction list with neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Hostname,
    Port,
    Service,
    IcapServerVersion,
    PreviewSize,
    StdReceiveLength,
    StdSendLength,
    ConnectionTimeout,
    RejectFileOnError,
    ScanFromIntegrator,
    MaxFileSize,
    RejectFileOverMaxSize,
    FileNameRestriction,
    ProtocolRestriction,
    FileExtensionRestriction,
    PartnerNameRestriction,
}

impl PropertyKey {
    pub const ALL: [PropertyKey; 16] = [
        PropertyKey::Hostname,
        PropertyKey::Port,
        PropertyKey::Service,
        PropertyKey::IcapServerVersion,
        PropertyKey::PreviewSize,
        PropertyKey::StdReceiveLength,
        PropertyKey::StdSendLength,
        PropertyKey::ConnectionTimeout,
        PropertyKey::RejectFileOnError,
        PropertyKey::ScanFromIntegrator,
        PropertyKey::MaxFileSize,
        PropertyKey::RejectFileOverMaxSize,
        PropertyKey::FileNameRestriction,
        PropertyKey::ProtocolRestriction,
        PropertyKey::FileExtensionRestriction,
        PropertyKey::PartnerNameRestriction,
    ];

    /// Wire name inside the properties file (`<scannerId>.<name>`).
    pub fn name(self) -> &'static str {
        match self {
            PropertyKey::Hostname => "hostname",
            PropertyKey::Port => "port",
            PropertyKey::Service => "service",
            PropertyKey::IcapServerVersion => "ICAPServerVersion",
            PropertyKey::PreviewSize => "previewSize",
            PropertyKey::StdReceiveLength => "stdReceiveLength",
            PropertyKey::StdSendLength => "stdSendLength",
            PropertyKey::ConnectionTimeout => "connectionTimeout",
            PropertyKey::RejectFileOnError => "rejectFileOnError",
            PropertyKey::ScanFromIntegrator => "scanFromIntegrator",
            PropertyKey::MaxFileSize => "maxFileSize",
            PropertyKey::RejectFileOverMaxSize => "rejectFileOverMaxSize",
            PropertyKey::FileNameRestriction => "fileNameRestriction",
            PropertyKey::ProtocolRestriction => "protocolRestriction",
            PropertyKey::FileExtensionRestriction => "fileExtensionRestriction",
            PropertyKey::PartnerNameRestriction => "partnerNameRestriction",
        }
    }

    pub fn validator(self) -> Option<Validator> {
        match self {
            PropertyKey::Hostname => Some(Validator::RangedString { max_len: 250 }),
            PropertyKey::Port => Some(Validator::RangedInteger { min: 0, max: 99999 }),
            PropertyKey::Service => Some(Validator::RangedString { max_len: 250 }),
            PropertyKey::IcapServerVersion => Some(Validator::RangedString { max_len: 50 }),
            PropertyKey::PreviewSize
            | PropertyKey::StdReceiveLength
            | PropertyKey::StdSendLength
            | PropertyKey::ConnectionTimeout => {
                Some(Validator::RangedInteger { min: -1, max: i32::MAX })
            }
            PropertyKey::RejectFileOnError
            | PropertyKey::ScanFromIntegrator
            | PropertyKey::RejectFileOverMaxSize => Some(Validator::Boolean),
            PropertyKey::MaxFileSize => Some(Validator::RangedLong { min: 0, max: i64::MAX }),
            PropertyKey::FileNameRestriction
            | PropertyKey::ProtocolRestriction
            | PropertyKey::FileExtensionRestriction
            | PropertyKey::PartnerNameRestriction => None,
        }
    }

    pub fn default_value(self) -> Option<&'static str> {
        match self {
            // -1 is the "adopt the server's preview size" sentinel.
            PropertyKey::PreviewSize => Some("-1"),
            PropertyKey::StdReceiveLength | PropertyKey::StdSendLength => Some("8192"),
            PropertyKey::ConnectionTimeout => Some("10000"),
            PropertyKey::RejectFileOnError => Some("true"),
            PropertyKey::ScanFromIntegrator => Some("false"),
            // -1 means no size restriction.
            PropertyKey::MaxFileSize => Some("-1"),
            PropertyKey::RejectFileOverMaxSize => Some("false"),
            _ => None,
        }
    }

    /// Look up a schema key by its wire name. Case-insensitive, the property
    /// files are hand-edited.
    pub fn from_name(name: &str) -> Option<PropertyKey> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }

    /// Structurally required wire parameters: validated, no fallback.
    pub fn is_mandatory_without_default(self) -> bool {
        self.validator().is_some() && self.default_value().is_none()
    }

    /// Free-form restriction lists carry no validator.
    pub fn is_restriction(self) -> bool {
        self.validator().is_none()
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
