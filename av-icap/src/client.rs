//! ICAP antivirus client: OPTIONS negotiation and preview-based RESPMOD scans.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ScannerConfig;
use crate::error::{Error, IcapResult};
use crate::parser::parse_header;
use crate::{CHUNK_TERMINATOR, ICAP_TERMINATOR, IEOF_TERMINATOR, STATUS_CODE_KEY, USER_AGENT};

/// Outcome of scanning a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    /// The server left the file unmodified.
    Clean,
    /// The server flagged the file; `reason` carries the server's `X-*`
    /// diagnostic headers.
    Infected { reason: String },
}

impl ScanVerdict {
    pub fn is_clean(&self) -> bool {
        matches!(self, ScanVerdict::Clean)
    }
}

/// A client for one ICAP antivirus service.
///
/// Usage is connect, scan one or more files, disconnect. [`IcapClient::connect`]
/// performs the OPTIONS handshake and narrows the preview size to what the
/// server supports; [`IcapClient::scan_file`] then streams a file through a
/// RESPMOD transaction.
#[derive(Debug)]
pub struct IcapClient {
    hostname: String,
    port: u32,
    service: String,
    server_version: String,
    preview_size: i32,
    std_receive_length: usize,
    std_send_length: usize,
    connection_timeout: Duration,
    conn: Option<TcpStream>,
    failure_reason: Option<String>,
}

impl IcapClient {
    pub fn new(
        hostname: impl Into<String>,
        port: u32,
        service: impl Into<String>,
        server_version: impl Into<String>,
    ) -> IcapClient {
        IcapClient {
            hostname: hostname.into(),
            port,
            service: service.into(),
            server_version: server_version.into(),
            preview_size: -1,
            std_receive_length: 8192,
            std_send_length: 8192,
            connection_timeout: Duration::from_millis(10_000),
            conn: None,
            failure_reason: None,
        }
    }

    pub fn from_config(config: &ScannerConfig) -> IcapClient {
        IcapClient {
            hostname: config.hostname().to_string(),
            port: config.port(),
            service: config.service().to_string(),
            server_version: config.server_version().to_string(),
            preview_size: config.preview_size(),
            std_receive_length: config.std_receive_length(),
            std_send_length: config.std_send_length(),
            connection_timeout: config.connection_timeout(),
            conn: None,
            failure_reason: None,
        }
    }

    pub fn with_preview_size(mut self, preview_size: i32) -> IcapClient {
        self.preview_size = preview_size;
        self
    }

    pub fn with_connection_timeout(mut self, connection_timeout: Duration) -> IcapClient {
        self.connection_timeout = connection_timeout;
        self
    }

    pub fn with_receive_length(mut self, std_receive_length: usize) -> IcapClient {
        self.std_receive_length = std_receive_length;
        self
    }

    pub fn with_send_length(mut self, std_send_length: usize) -> IcapClient {
        self.std_send_length = std_send_length;
        self
    }

    /// Preview size currently in effect. `-1` until [`IcapClient::connect`]
    /// has adopted the server's value.
    pub fn preview_size(&self) -> i32 {
        self.preview_size
    }

    /// Diagnostic headers from the last "infected" response, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Open the TCP connection and run the OPTIONS handshake.
    ///
    /// On success the preview size has been narrowed to the minimum of the
    /// configured value and the server's offer; a configured `-1` adopts the
    /// server's value as-is. A 200 OPTIONS response without a `Preview`
    /// header is fatal.
    pub async fn connect(&mut self) -> IcapResult<()> {
        let addr = format!("{}:{}", self.hostname, self.port);
        debug!(addr = %addr, "connecting to ICAP server");
        let stream = timeout(self.connection_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::Timeout(self.connection_timeout))??;
        self.conn = Some(stream);

        let request = format!(
            "OPTIONS icap://{host}/{service} ICAP/{version}\r\n\
             Host: {host}\r\n\
             User-Agent: {agent}\r\n\
             Encapsulated: null-body=0{term}",
            host = self.hostname,
            service = self.service,
            version = self.server_version,
            agent = USER_AGENT,
            term = ICAP_TERMINATOR,
        );
        self.write_all(request.as_bytes()).await?;

        let raw = self.read_header().await?;
        let headers = parse_header(&raw);
        if connection_close(&headers) {
            debug!("server requested connection close after OPTIONS");
            self.disconnect().await?;
        }
        self.interpret_status_code(&headers)?;
        info!(
            host = %self.hostname,
            service = %self.service,
            preview = self.preview_size,
            "ICAP service ready"
        );
        Ok(())
    }

    /// Scan one file through a RESPMOD transaction and return the verdict.
    ///
    /// The file's first `preview_size` bytes go out with the request head. A
    /// file that fits entirely in the preview is closed with the ieof
    /// terminator and the next response is final; otherwise the server must
    /// answer `100 Continue` before the remainder is streamed in
    /// `std_send_length`-sized chunks.
    pub async fn scan_file(&mut self, path: &Path) -> IcapResult<ScanVerdict> {
        if self.conn.is_none() {
            return Err(Error::NotConnected);
        }
        self.failure_reason = None;

        let mut file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        let negotiated = self.preview_size.max(0) as u64;
        let preview = negotiated.min(file_size) as usize;
        let fits_in_preview = file_size <= negotiated;
        debug!(
            path = %path.display(),
            size = file_size,
            preview,
            "starting RESPMOD scan"
        );

        let res_body = format!("Content-Length: {file_size}{ICAP_TERMINATOR}");
        let head = format!(
            "RESPMOD icap://{host}/{service} ICAP/{version}\r\n\
             Host: {host}\r\n\
             User-Agent: {agent}\r\n\
             Allow: 204\r\n\
             Preview: {preview}\r\n\
             Encapsulated: res-hdr=0, res-body={body_start}{term}{res_body}",
            host = self.hostname,
            service = self.service,
            version = self.server_version,
            agent = USER_AGENT,
            body_start = res_body.len(),
            term = ICAP_TERMINATOR,
        );
        self.write_all(head.as_bytes()).await?;

        if preview > 0 {
            let mut preview_buf = vec![0u8; preview];
            file.read_exact(&mut preview_buf).await?;
            self.write_all(format!("{preview:x}\r\n").as_bytes()).await?;
            self.write_all(&preview_buf).await?;
            self.write_all(b"\r\n").await?;
        }
        let terminator = if fits_in_preview { IEOF_TERMINATOR } else { CHUNK_TERMINATOR };
        self.write_all(terminator.as_bytes()).await?;
        self.flush().await?;

        let headers = parse_header(&self.read_header().await?);
        if fits_in_preview {
            return self.verdict(&headers).await;
        }

        // Interim response: only 100 Continue lets the upload proceed. A
        // non-100 interim aborts the transfer and the file is treated as not
        // clean.
        self.interpret_status_code(&headers)?;
        if headers.get(STATUS_CODE_KEY).map(String::as_str) != Some("100") {
            warn!(path = %path.display(), "scan aborted before completion, treating file as not clean");
            let reason = self
                .failure_reason
                .clone()
                .unwrap_or_else(|| "scan aborted before the full file was transferred".to_string());
            return Ok(ScanVerdict::Infected { reason });
        }

        let mut chunk = vec![0u8; self.std_send_length.max(1)];
        loop {
            let n = file.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            self.write_all(format!("{n:x}\r\n").as_bytes()).await?;
            self.write_all(&chunk[..n]).await?;
            self.write_all(b"\r\n").await?;
        }
        self.write_all(CHUNK_TERMINATOR.as_bytes()).await?;
        self.flush().await?;

        let final_headers = parse_header(&self.read_header().await?);
        self.verdict(&final_headers).await
    }

    /// Close the connection. Safe to call when already disconnected.
    pub async fn disconnect(&mut self) -> IcapResult<()> {
        if let Some(mut conn) = self.conn.take() {
            conn.shutdown().await?;
            debug!(host = %self.hostname, "disconnected from ICAP server");
        }
        Ok(())
    }

    async fn verdict(&mut self, headers: &HashMap<String, String>) -> IcapResult<ScanVerdict> {
        if connection_close(headers) {
            debug!("server requested connection close");
            self.disconnect().await?;
        }
        if self.interpret_status_code(headers)? {
            Ok(ScanVerdict::Clean)
        } else {
            Ok(ScanVerdict::Infected {
                reason: self.failure_reason.clone().unwrap_or_default(),
            })
        }
    }

    /// Interpret a parsed response-header map.
    ///
    /// Returns `Ok(true)` when the exchange may proceed (100, 204, or a 200
    /// OPTIONS answer carrying `Methods`), `Ok(false)` when the server
    /// flagged the content, and an error for every protocol failure code.
    /// The 200-with-`Methods` case performs the preview negotiation.
    fn interpret_status_code(&mut self, headers: &HashMap<String, String>) -> IcapResult<bool> {
        let code = headers
            .get(STATUS_CODE_KEY)
            .ok_or(Error::MissingStatusCode)?;
        let code: u16 = code
            .parse()
            .map_err(|_| Error::Parse(format!("non-numeric status code: {code}")))?;

        match code {
            100 | 204 => Ok(true),
            200 => {
                if headers.contains_key("Methods") {
                    let server_preview: i32 = headers
                        .get("Preview")
                        .ok_or(Error::MissingHeader("Preview"))?
                        .parse()
                        .map_err(|_| Error::Parse("invalid Preview header".to_string()))?;
                    if self.preview_size == -1 || server_preview < self.preview_size {
                        debug!(
                            configured = self.preview_size,
                            server = server_preview,
                            "adopting server preview size"
                        );
                        self.preview_size = server_preview;
                    }
                    Ok(true)
                } else {
                    // Scan result: collect the server's diagnostic headers.
                    let mut diagnostics: Vec<&String> =
                        headers.keys().filter(|k| k.starts_with("X-")).collect();
                    diagnostics.sort();
                    let reason = diagnostics
                        .into_iter()
                        .map(|key| format!("{key}: {value}", value = headers[key]))
                        .collect::<Vec<_>>()
                        .join("; ");
                    warn!(reason = %reason, "server flagged the content");
                    self.failure_reason = Some(reason);
                    Ok(false)
                }
            }
            400 => Err(Error::Server { code, reason: "Bad request" }),
            404 => Err(Error::Server { code, reason: "ICAP Service not found" }),
            405 => Err(Error::Server { code, reason: "Method not allowed for service" }),
            408 => Err(Error::Server { code, reason: "Request timeout" }),
            500 => Err(Error::Server { code, reason: "Server error" }),
            501 => Err(Error::Server { code, reason: "Method not implemented" }),
            502 => Err(Error::Server { code, reason: "Bad Gateway" }),
            503 => Err(Error::Server { code, reason: "Service overloaded" }),
            505 => Err(Error::Server { code, reason: "ICAP version not supported by server" }),
            other => Err(Error::UnknownStatusCode(other)),
        }
    }

    /// Read one ICAP header block, byte by byte, up to the CRLFCRLF
    /// terminator. The read is capped at `std_receive_length` bytes so a
    /// misbehaving server cannot grow the buffer without bound, and every
    /// byte read is wrapped in the connection timeout.
    async fn read_header(&mut self) -> IcapResult<String> {
        let deadline = self.connection_timeout;
        let cap = self.std_receive_length;
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;

        let mut buf = Vec::with_capacity(256);
        loop {
            let byte = match timeout(deadline, conn.read_u8()).await {
                Ok(Ok(byte)) => byte,
                Ok(Err(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(Error::Parse(
                        "connection closed before end of ICAP header".to_string(),
                    ));
                }
                Ok(Err(err)) => return Err(Error::Network(err)),
                Err(_) => return Err(Error::Timeout(deadline)),
            };
            buf.push(byte);
            if buf.len() >= 4 && &buf[buf.len() - 4..] == b"\r\n\r\n" {
                break;
            }
            if buf.len() >= cap {
                return Err(Error::Parse(format!(
                    "ICAP header exceeded {cap} bytes without terminating"
                )));
            }
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    async fn write_all(&mut self, bytes: &[u8]) -> IcapResult<()> {
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
        conn.write_all(bytes).await?;
        Ok(())
    }

    async fn flush(&mut self) -> IcapResult<()> {
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
        conn.flush().await?;
        Ok(())
    }
}

fn connection_close(headers: &HashMap<String, String>) -> bool {
    headers
        .get("Connection")
        .map(|v| v.eq_ignore_ascii_case("close"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> IcapClient {
        IcapClient::new("localhost", 1344, "avscan", "1.0")
    }

    fn map(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn code_100_and_204_continue() {
        let mut c = client();
        assert!(c.interpret_status_code(&map(&[(STATUS_CODE_KEY, "100")])).unwrap());
        assert!(c.interpret_status_code(&map(&[(STATUS_CODE_KEY, "204")])).unwrap());
    }

    #[test]
    fn options_response_narrows_preview() {
        let mut c = client().with_preview_size(4096);
        let ok = c
            .interpret_status_code(&map(&[
                (STATUS_CODE_KEY, "200"),
                ("Methods", "RESPMOD"),
                ("Preview", "1024"),
            ]))
            .unwrap();
        assert!(ok);
        assert_eq!(c.preview_size(), 1024);
    }

    #[test]
    fn larger_server_preview_does_not_widen() {
        let mut c = client().with_preview_size(512);
        c.interpret_status_code(&map(&[
            (STATUS_CODE_KEY, "200"),
            ("Methods", "RESPMOD"),
            ("Preview", "4096"),
        ]))
        .unwrap();
        assert_eq!(c.preview_size(), 512);
    }

    #[test]
    fn sentinel_preview_adopts_server_value() {
        let mut c = client();
        assert_eq!(c.preview_size(), -1);
        c.interpret_status_code(&map(&[
            (STATUS_CODE_KEY, "200"),
            ("Methods", "RESPMOD"),
            ("Preview", "2048"),
        ]))
        .unwrap();
        assert_eq!(c.preview_size(), 2048);
    }

    #[test]
    fn options_response_without_preview_is_fatal() {
        let mut c = client();
        let err = c
            .interpret_status_code(&map(&[(STATUS_CODE_KEY, "200"), ("Methods", "RESPMOD")]))
            .unwrap_err();
        assert!(matches!(err, Error::MissingHeader("Preview")));
    }

    #[test]
    fn infection_headers_become_the_failure_reason() {
        let mut c = client();
        let clean = c
            .interpret_status_code(&map(&[
                (STATUS_CODE_KEY, "200"),
                ("ISTag", "CI0001"),
                ("X-Infection-Found", "Type=0; Resolution=2; Threat=EICAR;"),
                ("X-Violations-Found", "1"),
            ]))
            .unwrap();
        assert!(!clean);
        let reason = c.failure_reason().unwrap();
        assert!(reason.contains("X-Infection-Found: Type=0; Resolution=2; Threat=EICAR;"));
        assert!(reason.contains("X-Violations-Found: 1"));
        assert!(!reason.contains("ISTag"));
    }

    #[test]
    fn error_codes_map_to_distinct_messages() {
        let mut c = client();
        let cases = [
            ("400", "400: Bad request"),
            ("404", "404: ICAP Service not found"),
            ("405", "405: Method not allowed for service"),
            ("408", "408: Request timeout"),
            ("500", "500: Server error"),
            ("501", "501: Method not implemented"),
            ("502", "502: Bad Gateway"),
            ("503", "503: Service overloaded"),
            ("505", "505: ICAP version not supported by server"),
        ];
        for (code, expected) in cases {
            let err = c
                .interpret_status_code(&map(&[(STATUS_CODE_KEY, code)]))
                .unwrap_err();
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn unknown_code_is_reported_as_such() {
        let mut c = client();
        let err = c
            .interpret_status_code(&map(&[(STATUS_CODE_KEY, "600")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Server returned unknown status code: 600");
    }

    #[test]
    fn missing_status_code_is_fatal() {
        let mut c = client();
        let err = c.interpret_status_code(&map(&[("Server", "C-ICAP")])).unwrap_err();
        assert_eq!(err.to_string(), "Server didn't return a status code");
    }

    #[tokio::test]
    async fn scan_requires_a_connection() {
        let mut c = client();
        let err = c.scan_file(Path::new("/tmp/whatever")).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }
}
