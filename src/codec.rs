use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::job::{JobRequest, JobResult, RequestPayload};

/// How a result line is framed on standard output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEncoding {
    /// Bare JSON object
    Plain,
    /// Base64 of the JSON object, mirroring the request channel
    Base64,
}

/// Decodes one line of the streaming channel into a validated request
///
/// Surrounding whitespace (including the line terminator) is ignored.
pub fn decode_request(line: &[u8]) -> Result<JobRequest> {
    let decoded = STANDARD
        .decode(line.trim_ascii())
        .context("Request line is not valid base64")?;
    let payload: RequestPayload =
        serde_json::from_slice(&decoded).context("Request is not a valid job description")?;
    JobRequest::try_from(payload)
}

/// Encodes a request the way a caller writes it to the runner's stdin
pub fn encode_request(payload: &RequestPayload) -> Result<String> {
    let json = serde_json::to_string(payload)?;
    Ok(STANDARD.encode(json))
}

/// Serializes a result into a single line, without the trailing newline
pub fn encode_result(result: &JobResult, encoding: LineEncoding) -> Result<String> {
    let json = serde_json::to_string(result).context("Failed to serialize job result")?;
    Ok(match encoding {
        LineEncoding::Plain => json,
        LineEncoding::Base64 => STANDARD.encode(json),
    })
}

/// Parses a result line produced by [`encode_result`]
pub fn decode_result(line: &str, encoding: LineEncoding) -> Result<JobResult> {
    let line = line.trim();
    let json = match encoding {
        LineEncoding::Plain => line.as_bytes().to_vec(),
        LineEncoding::Base64 => STANDARD
            .decode(line)
            .context("Result line is not valid base64")?,
    };
    serde_json::from_slice(&json).context("Result line is not a valid job result")
}
