//! The signing message: a line-oriented EIP-4361 string binding domain,
//! address, statement, nonce and validity window.
//!
//! Layout (optional parts in brackets):
//!
//! ```text
//! [<scheme>://]<domain> wants you to sign in with your Ethereum account:
//! <address>
//!
//! [<statement>
//! ]
//! URI: <uri>
//! Version: 1
//! Chain ID: <chain id>
//! Nonce: <nonce>
//! Issued At: <rfc3339>
//! [Expiration Time: <rfc3339>]
//! [Not Before: <rfc3339>]
//! [Request ID: <id>]
//! [Resources:
//! - <uri>...]
//! ```
//!
//! The wallet signs these exact bytes, so `Display` and `FromStr` must agree
//! with every client byte for byte.

use super::address::Address;
use super::nonce::is_valid_nonce;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use std::fmt;
use std::str::FromStr;

pub const HEADER_SUFFIX: &str = " wants you to sign in with your Ethereum account:";
pub const VERSION: &str = "1";

const URI_TAG: &str = "URI: ";
const VERSION_TAG: &str = "Version: ";
const CHAIN_ID_TAG: &str = "Chain ID: ";
const NONCE_TAG: &str = "Nonce: ";
const ISSUED_AT_TAG: &str = "Issued At: ";
const EXPIRATION_TIME_TAG: &str = "Expiration Time: ";
const NOT_BEFORE_TAG: &str = "Not Before: ";
const REQUEST_ID_TAG: &str = "Request ID: ";
const RESOURCES_TAG: &str = "Resources:";
const RESOURCE_ITEM: &str = "- ";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("message is empty")]
    Empty,

    #[error("invalid message header")]
    InvalidHeader,

    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("unexpected line: {0:?}")]
    UnexpectedLine(String),
}

/// An RFC 3339 timestamp that keeps its original text.
///
/// Re-serializing must not reformat a timestamp the wallet already signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    raw: String,
    instant: DateTime<Utc>,
}

impl Timestamp {
    /// Millisecond precision with a `Z` suffix, like `Date.prototype.toISOString`.
    /// The instant is truncated to match the rendered text.
    pub fn from_datetime(instant: DateTime<Utc>) -> Self {
        let instant = instant.trunc_subsecs(3);
        Self {
            raw: instant.to_rfc3339_opts(SecondsFormat::Millis, true),
            instant,
        }
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let instant = DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc);
        Ok(Self {
            raw: s.to_string(),
            instant,
        })
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One authentication attempt. Immutable once signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiweMessage {
    pub scheme: Option<String>,
    pub domain: String,
    pub address: Address,
    statement: Option<String>,
    pub uri: String,
    pub version: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: Timestamp,
    pub expiration_time: Option<Timestamp>,
    pub not_before: Option<Timestamp>,
    pub request_id: Option<String>,
    pub resources: Vec<String>,
}

impl SiweMessage {
    pub fn new(
        domain: impl Into<String>,
        address: Address,
        uri: impl Into<String>,
        chain_id: u64,
        nonce: impl Into<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            scheme: None,
            domain: domain.into(),
            address,
            statement: None,
            uri: uri.into(),
            version: VERSION.to_string(),
            chain_id,
            nonce: nonce.into(),
            issued_at: Timestamp::from_datetime(issued_at),
            expiration_time: None,
            not_before: None,
            request_id: None,
            resources: Vec::new(),
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// Attach a statement. It must be one non-empty line that cannot be
    /// mistaken for the `URI:` field, or the message would not parse back.
    pub fn with_statement(mut self, statement: impl Into<String>) -> Result<Self, ParseError> {
        let statement = statement.into();
        let reason = if statement.is_empty() {
            Some("must not be empty")
        } else if statement.contains('\n') {
            Some("must be a single line")
        } else if statement.starts_with(URI_TAG) {
            Some("must not start with the URI tag")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(ParseError::InvalidField {
                field: "statement",
                reason: reason.to_string(),
            });
        }
        self.statement = Some(statement);
        Ok(self)
    }

    pub fn statement(&self) -> Option<&str> {
        self.statement.as_deref()
    }

    pub fn with_expiration_time(mut self, at: DateTime<Utc>) -> Self {
        self.expiration_time = Some(Timestamp::from_datetime(at));
        self
    }

    pub fn with_not_before(mut self, at: DateTime<Utc>) -> Self {
        self.not_before = Some(Timestamp::from_datetime(at));
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.push(resource.into());
        self
    }

    /// The exact string a wallet signs.
    pub fn to_canonical_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SiweMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scheme {
            Some(scheme) => write!(f, "{}://{}", scheme, self.domain)?,
            None => f.write_str(&self.domain)?,
        }
        writeln!(f, "{}", HEADER_SUFFIX)?;
        writeln!(f, "{}", self.address)?;
        writeln!(f)?;
        if let Some(statement) = &self.statement {
            writeln!(f, "{}", statement)?;
        }
        writeln!(f)?;

        write!(f, "{}{}", URI_TAG, self.uri)?;
        write!(f, "\n{}{}", VERSION_TAG, self.version)?;
        write!(f, "\n{}{}", CHAIN_ID_TAG, self.chain_id)?;
        write!(f, "\n{}{}", NONCE_TAG, self.nonce)?;
        write!(f, "\n{}{}", ISSUED_AT_TAG, self.issued_at)?;

        if let Some(expiration_time) = &self.expiration_time {
            write!(f, "\n{}{}", EXPIRATION_TIME_TAG, expiration_time)?;
        }
        if let Some(not_before) = &self.not_before {
            write!(f, "\n{}{}", NOT_BEFORE_TAG, not_before)?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, "\n{}{}", REQUEST_ID_TAG, request_id)?;
        }
        if !self.resources.is_empty() {
            write!(f, "\n{}", RESOURCES_TAG)?;
            for resource in &self.resources {
                write!(f, "\n{}{}", RESOURCE_ITEM, resource)?;
            }
        }
        Ok(())
    }
}

impl FromStr for SiweMessage {
    type Err = ParseError;

    fn from_str(message: &str) -> Result<Self, Self::Err> {
        if message.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut lines = message.split('\n').peekable();

        // Header
        let origin = lines
            .next()
            .and_then(|line| line.strip_suffix(HEADER_SUFFIX))
            .ok_or(ParseError::InvalidHeader)?;
        let (scheme, domain) = match origin.split_once("://") {
            Some((scheme, domain)) => (Some(scheme.to_string()), domain),
            None => (None, origin),
        };
        if domain.is_empty() || domain.contains(char::is_whitespace) {
            return Err(ParseError::InvalidField {
                field: "domain",
                reason: "must be a non-empty authority".to_string(),
            });
        }
        if let Some(scheme) = &scheme {
            let valid = !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c));
            if !valid {
                return Err(ParseError::InvalidField {
                    field: "scheme",
                    reason: "invalid URI scheme".to_string(),
                });
            }
        }

        // Address
        let address_line = lines.next().ok_or(ParseError::MissingField("address"))?;
        let address =
            Address::parse_checksummed(address_line).map_err(|e| ParseError::InvalidField {
                field: "address",
                reason: e.to_string(),
            })?;

        expect_blank(lines.next())?;

        // Optional statement followed by a blank line. Older clients omit the
        // second blank line when there is no statement; accept both.
        let statement = match lines.peek().copied() {
            Some("") => {
                lines.next();
                None
            }
            Some(line) if line.starts_with(URI_TAG) => None,
            Some(line) => {
                lines.next();
                expect_blank(lines.next())?;
                Some(line.to_string())
            }
            None => return Err(ParseError::MissingField("URI")),
        };

        let uri = tagged(lines.next(), URI_TAG, "URI")?;
        if uri.is_empty() || uri.contains(char::is_whitespace) {
            return Err(ParseError::InvalidField {
                field: "URI",
                reason: "must be a non-empty URI".to_string(),
            });
        }

        let version = tagged(lines.next(), VERSION_TAG, "Version")?;
        if version != VERSION {
            return Err(ParseError::UnsupportedVersion(version.to_string()));
        }

        let chain_id = tagged(lines.next(), CHAIN_ID_TAG, "Chain ID")?
            .parse::<u64>()
            .map_err(|e| ParseError::InvalidField {
                field: "Chain ID",
                reason: e.to_string(),
            })?;

        let nonce = tagged(lines.next(), NONCE_TAG, "Nonce")?;
        if !is_valid_nonce(nonce) {
            return Err(ParseError::InvalidField {
                field: "Nonce",
                reason: "must be alphanumeric".to_string(),
            });
        }

        let issued_at = parse_timestamp(
            tagged(lines.next(), ISSUED_AT_TAG, "Issued At")?,
            "Issued At",
        )?;

        let expiration_time = optional_tagged(&mut lines, EXPIRATION_TIME_TAG)
            .map(|raw| parse_timestamp(raw, "Expiration Time"))
            .transpose()?;
        let not_before = optional_tagged(&mut lines, NOT_BEFORE_TAG)
            .map(|raw| parse_timestamp(raw, "Not Before"))
            .transpose()?;
        let request_id = optional_tagged(&mut lines, REQUEST_ID_TAG).map(str::to_string);

        let mut resources = Vec::new();
        if lines.next_if_eq(&RESOURCES_TAG).is_some() {
            while let Some(line) = lines.next_if(|line| line.starts_with(RESOURCE_ITEM)) {
                resources.push(line[RESOURCE_ITEM.len()..].to_string());
            }
            if resources.is_empty() {
                return Err(ParseError::MissingField("resource"));
            }
        }

        if let Some(line) = lines.next() {
            return Err(ParseError::UnexpectedLine(line.to_string()));
        }

        Ok(Self {
            scheme,
            domain: domain.to_string(),
            address,
            statement,
            uri: uri.to_string(),
            version: version.to_string(),
            chain_id,
            nonce: nonce.to_string(),
            issued_at,
            expiration_time,
            not_before,
            request_id,
            resources,
        })
    }
}

fn expect_blank(line: Option<&str>) -> Result<(), ParseError> {
    match line {
        Some("") => Ok(()),
        Some(other) => Err(ParseError::UnexpectedLine(other.to_string())),
        None => Err(ParseError::MissingField("URI")),
    }
}

fn tagged<'a>(
    line: Option<&'a str>,
    tag: &str,
    field: &'static str,
) -> Result<&'a str, ParseError> {
    let line = line.ok_or(ParseError::MissingField(field))?;
    line.strip_prefix(tag)
        .ok_or_else(|| ParseError::UnexpectedLine(line.to_string()))
}

fn optional_tagged<'a, I>(lines: &mut std::iter::Peekable<I>, tag: &str) -> Option<&'a str>
where
    I: Iterator<Item = &'a str>,
{
    lines
        .next_if(|line| line.starts_with(tag))
        .map(|line| &line[tag.len()..])
}

fn parse_timestamp(raw: &str, field: &'static str) -> Result<Timestamp, ParseError> {
    raw.parse().map_err(|e: chrono::ParseError| ParseError::InvalidField {
        field,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn sample() -> SiweMessage {
        SiweMessage::new(
            "localhost:8080",
            ADDRESS.parse().unwrap(),
            "http://localhost:8080",
            1,
            "abc123XY",
            issued_at(),
        )
        .with_statement("Sign in with Ethereum to the app.")
        .unwrap()
    }

    #[test]
    fn test_canonical_layout() {
        let expected = "localhost:8080 wants you to sign in with your Ethereum account:\n\
            0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266\n\
            \n\
            Sign in with Ethereum to the app.\n\
            \n\
            URI: http://localhost:8080\n\
            Version: 1\n\
            Chain ID: 1\n\
            Nonce: abc123XY\n\
            Issued At: 2024-05-01T12:00:00.000Z";
        assert_eq!(sample().to_canonical_string(), expected);
    }

    #[test]
    fn test_build_is_deterministic() {
        assert_eq!(sample().to_canonical_string(), sample().to_canonical_string());
    }

    #[test]
    fn test_expiration_time_is_last_line() {
        let message = sample()
            .with_expiration_time(issued_at() + chrono::Duration::hours(1))
            .to_canonical_string();
        assert!(message.ends_with(
            "\nIssued At: 2024-05-01T12:00:00.000Z\nExpiration Time: 2024-05-01T13:00:00.000Z"
        ));
    }

    #[test]
    fn test_checksums_lowercase_address() {
        let message = SiweMessage::new(
            "example.com",
            ADDRESS.to_lowercase().parse().unwrap(),
            "https://example.com",
            1,
            "abc123XY",
            issued_at(),
        );
        assert!(message.to_canonical_string().contains(&format!("\n{}\n", ADDRESS)));
    }

    #[test]
    fn test_without_statement_has_two_blank_lines() {
        let mut message = sample();
        message.statement = None;
        let text = message.to_canonical_string();
        assert!(text.contains(&format!("{}\n\n\nURI: ", ADDRESS)));
        assert_eq!(text.parse::<SiweMessage>().unwrap(), message);
    }

    #[test]
    fn test_parse_accepts_compact_layout_without_statement() {
        let mut message = sample();
        message.statement = None;
        let compact = message
            .to_canonical_string()
            .replace(&format!("{}\n\n\n", ADDRESS), &format!("{}\n\n", ADDRESS));
        let parsed: SiweMessage = compact.parse().unwrap();
        assert_eq!(parsed.statement(), None);
        assert_eq!(parsed.nonce, "abc123XY");
    }

    #[test]
    fn test_statement_must_parse_back() {
        for bad in ["", "first line\nsecond line", "URI: https://evil.example"] {
            assert!(matches!(
                sample().with_statement(bad),
                Err(ParseError::InvalidField { field: "statement", .. })
            ));
        }

        let message = sample().with_statement("Trailing URI: is fine").unwrap();
        let parsed: SiweMessage = message.to_canonical_string().parse().unwrap();
        assert_eq!(parsed.statement(), Some("Trailing URI: is fine"));
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_scheme_prefixes_header() {
        let text = sample().with_scheme("https").to_canonical_string();
        assert!(text.starts_with("https://localhost:8080 wants you to sign in"));
        let parsed: SiweMessage = text.parse().unwrap();
        assert_eq!(parsed.scheme.as_deref(), Some("https"));
        assert_eq!(parsed.domain, "localhost:8080");
    }

    #[test]
    fn test_parse_all_optional_fields() {
        let message = sample()
            .with_expiration_time(issued_at() + chrono::Duration::minutes(10))
            .with_not_before(issued_at())
            .with_request_id("req-42")
            .with_resource("ipfs://bafybeiemxf5abjwjbikoz4mc3a3dla6ual3jsgpdr4cjr3oz3evfyavhwq/")
            .with_resource("https://example.com/my-web2-claim.json");

        let parsed: SiweMessage = message.to_canonical_string().parse().unwrap();
        assert_eq!(parsed, message);
        assert_eq!(parsed.resources.len(), 2);
        assert_eq!(parsed.request_id.as_deref(), Some("req-42"));
    }

    #[test]
    fn test_parse_preserves_timestamp_text() {
        let text = sample()
            .to_canonical_string()
            .replace("2024-05-01T12:00:00.000Z", "2024-05-01T14:00:00+02:00");
        let parsed: SiweMessage = text.parse().unwrap();
        assert_eq!(parsed.issued_at.as_str(), "2024-05-01T14:00:00+02:00");
        assert_eq!(parsed.issued_at.instant(), issued_at());
        assert_eq!(parsed.to_canonical_string(), text);
    }

    #[test]
    fn test_parse_rejects_bad_header() {
        let text = sample().to_canonical_string().replacen("wants you", "asks you", 1);
        assert_eq!(text.parse::<SiweMessage>(), Err(ParseError::InvalidHeader));
    }

    #[test]
    fn test_parse_rejects_unchecksummed_address() {
        let text = sample()
            .to_canonical_string()
            .replace(ADDRESS, &ADDRESS.to_lowercase());
        assert!(matches!(
            text.parse::<SiweMessage>(),
            Err(ParseError::InvalidField { field: "address", .. })
        ));
    }

    #[test]
    fn test_parse_rejects_wrong_version() {
        let text = sample().to_canonical_string().replace("Version: 1", "Version: 2");
        assert_eq!(
            text.parse::<SiweMessage>(),
            Err(ParseError::UnsupportedVersion("2".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_swapped_fields() {
        let text = sample()
            .to_canonical_string()
            .replace("Version: 1\nChain ID: 1", "Chain ID: 1\nVersion: 1");
        assert!(matches!(
            text.parse::<SiweMessage>(),
            Err(ParseError::UnexpectedLine(_))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        let text = sample().to_canonical_string().replace("Chain ID: 1", "Chain ID: one");
        assert!(matches!(
            text.parse::<SiweMessage>(),
            Err(ParseError::InvalidField { field: "Chain ID", .. })
        ));

        let text = sample()
            .to_canonical_string()
            .replace("2024-05-01T12:00:00.000Z", "yesterday");
        assert!(matches!(
            text.parse::<SiweMessage>(),
            Err(ParseError::InvalidField { field: "Issued At", .. })
        ));

        let text = sample().to_canonical_string().replace("abc123XY", "abc-123");
        assert!(matches!(
            text.parse::<SiweMessage>(),
            Err(ParseError::InvalidField { field: "Nonce", .. })
        ));
    }

    #[test]
    fn test_parse_rejects_truncated_and_trailing() {
        let full = sample().to_canonical_string();
        let truncated = full.split("\nIssued At").next().unwrap();
        assert_eq!(
            truncated.parse::<SiweMessage>(),
            Err(ParseError::MissingField("Issued At"))
        );

        let trailing = format!("{}\nextra", full);
        assert_eq!(
            trailing.parse::<SiweMessage>(),
            Err(ParseError::UnexpectedLine("extra".to_string()))
        );

        assert_eq!("".parse::<SiweMessage>(), Err(ParseError::Empty));
    }
}
