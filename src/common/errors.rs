use thiserror::Error;

/// Typed failures surfaced by the onesie protocol client.
///
/// "No player response present" is not a failure: the decode path returns
/// `Ok(None)` for a structurally valid stream with no player-response pair.
#[derive(Debug, Error)]
pub enum OnesieError {
    /// Client key material must be exactly 32 bytes (16 cipher + 16 mac).
    #[error("invalid client key length: {0} bytes, expected 32")]
    InvalidKeyLength(usize),

    /// The hot config document could not be fetched or parsed. The
    /// previously cached config, if any, is left untouched.
    #[error("hot config fetch failed: {0}")]
    ConfigFetch(String),

    /// The redirector never answered with a `Location` header.
    #[error("no delivery url after {attempts} redirector attempts")]
    ResolutionExhausted { attempts: u32 },

    /// The decoded response reported a non-OK onesie proxy status.
    #[error("onesie proxy status was not ok: {status}")]
    ProxyStatus { status: i32 },

    /// UMP framing or inner record decode failure.
    #[error("malformed onesie frame: {0}")]
    MalformedFrame(String),

    /// The video id is not valid base64 and cannot be re-encoded for the
    /// redirector lookup.
    #[error("invalid video id: {0}")]
    InvalidVideoId(String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
}
