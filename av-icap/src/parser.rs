//! Raw ICAP response-header parsing.

use std::collections::HashMap;

use crate::STATUS_CODE_KEY;

/// Find end of an ICAP header block (position after CRLFCRLF).
#[inline]
#[allow(dead_code)]
pub(crate) fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    memchr::memmem::find(buf, b"\r\n\r\n").map(|i| i + 4)
}

/// Parse a raw response header block into a key -> value map.
///
/// The status line has the form `ICAP/<version> <statusCode> <reasonPhrase>`;
/// the status code is the token between the first two spaces and is stored
/// under [`STATUS_CODE_KEY`]. Every following `Key: Value` line is split at
/// the first colon, the value starting two characters after it (the `": "`
/// separator). Keys are kept case-sensitive.
pub(crate) fn parse_header(response: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();

    let mut lines = response.split("\r\n");
    if let Some(status_line) = lines.next() {
        let mut spaces = status_line.match_indices(' ');
        if let (Some((x, _)), Some((y, _))) = (spaces.next(), spaces.next()) {
            headers.insert(STATUS_CODE_KEY.to_string(), status_line[x + 1..y].to_string());
        }
    }

    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some(colon) = line.find(':') {
            let key = &line[..colon];
            let value = line.get(colon + 2..).unwrap_or("");
            headers.insert(key.to_string(), value.to_string());
        }
    }

    headers
}
