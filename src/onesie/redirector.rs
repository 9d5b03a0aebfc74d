use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use tracing::debug;

use crate::common::errors::OnesieError;

/// Issues one non-following GET and reports the `Location` header, if any.
#[async_trait]
pub trait RedirectProbe: Send + Sync {
    async fn location_of(&self, url: &str) -> Result<Option<String>, OnesieError>;
}

pub struct HttpRedirectProbe {
    http: reqwest::Client,
}

impl HttpRedirectProbe {
    /// `http` must be built with redirects disabled, otherwise the 3xx
    /// answer is consumed before the `Location` header can be read.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl RedirectProbe for HttpRedirectProbe {
    async fn location_of(&self, url: &str) -> Result<Option<String>, OnesieError> {
        let res = self.http.get(url).send().await?;
        Ok(res
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }
}

/// Resolves the delivery URL for a video through the googlevideo
/// redirector. The endpoint intermittently answers without a `Location`
/// header for no discernible reason, so a missing header is retried up to
/// the attempt cap before the lookup is declared exhausted.
pub struct Redirector {
    probe: Box<dyn RedirectProbe>,
    base: String,
    max_attempts: u32,
}

impl Redirector {
    pub fn new(probe: Box<dyn RedirectProbe>, base: String, max_attempts: u32) -> Self {
        Self {
            probe,
            base,
            max_attempts,
        }
    }

    pub async fn resolve(
        &self,
        base_url: &str,
        encoded_video_id: &str,
    ) -> Result<String, OnesieError> {
        let lookup = format!(
            "{}{}&id={}&cmo:sensitive_content=yes&opr=1&osts=0&por=1&rn=0",
            self.base, base_url, encoded_video_id
        );

        for attempt in 1..=self.max_attempts {
            match self.probe.location_of(&lookup).await? {
                Some(url) => {
                    debug!("redirector answered on attempt {attempt}");
                    return Ok(url);
                }
                None => debug!("redirector attempt {attempt} returned no location"),
            }
        }

        Err(OnesieError::ResolutionExhausted {
            attempts: self.max_attempts,
        })
    }
}

/// Video ids travel base64-encoded; the redirector wants the raw bytes
/// re-encoded as lowercase hex.
pub fn encode_video_id(video_id: &str) -> Result<String, OnesieError> {
    let mut normalized = video_id.replace('-', "+").replace('_', "/");
    let rem = normalized.len() % 4;
    if rem != 0 {
        normalized.push_str(&"=".repeat(4 - rem));
    }
    let bytes = B64
        .decode(normalized.as_bytes())
        .map_err(|e| OnesieError::InvalidVideoId(format!("{video_id}: {e}")))?;
    Ok(hex::encode(bytes))
}
