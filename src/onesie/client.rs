use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::common::errors::OnesieError;
use crate::common::http::HttpClient;
use crate::configs::OnesieConfig;
use crate::onesie::hot_config::{HotConfigCache, HttpConfigFetcher};
use crate::onesie::redirector::{HttpRedirectProbe, Redirector, encode_video_id};
use crate::onesie::request::OnesieRequestEncoder;
use crate::onesie::response::{PlayerInfo, read_player_info};

/// Fetches player info for a video over the onesie path: hot config →
/// sealed request envelope → redirector lookup → delivery POST → UMP
/// decode. Steps run strictly in sequence; the hot config cache is the
/// only state shared across calls.
pub struct OnesieClient {
    http: reqwest::Client,
    encoder: OnesieRequestEncoder,
    redirector: Redirector,
}

impl OnesieClient {
    pub fn new() -> Result<Self, OnesieError> {
        Self::with_config(OnesieConfig::default())
    }

    pub fn with_config(config: OnesieConfig) -> Result<Self, OnesieError> {
        let http = HttpClient::new()?;

        let fetcher = HttpConfigFetcher::new(http.clone(), config.tv_config_url);
        let cache = Arc::new(HotConfigCache::with_expiry_margin(
            Box::new(fetcher),
            Duration::from_secs(config.key_expiry_margin_secs),
        ));

        let probe = HttpRedirectProbe::new(HttpClient::new_no_redirect()?);
        let redirector = Redirector::new(
            Box::new(probe),
            config.redirector_base,
            config.redirector_attempts,
        );

        Ok(Self {
            http,
            encoder: OnesieRequestEncoder::new(cache),
            redirector,
        })
    }

    /// `payload` must be a fully adjusted innertube `/player` request body
    /// carrying `videoId` and `context.client`; adapting it is the
    /// caller's concern.
    ///
    /// Returns `Ok(None)` when the stream decodes cleanly but carries no
    /// player response, meaning this path simply has nothing for that video.
    pub async fn fetch_player_info(
        &self,
        payload: &Value,
    ) -> Result<Option<PlayerInfo>, OnesieError> {
        let video_id = payload
            .get("videoId")
            .and_then(Value::as_str)
            .ok_or_else(|| OnesieError::InvalidVideoId("payload has no videoId".to_string()))?;

        let request = self.encoder.encode(payload).await?;
        let encoded_id = encode_video_id(video_id)?;
        let delivery_url = self
            .redirector
            .resolve(&request.base_url, &encoded_id)
            .await?;

        debug!(
            "posting onesie request for {} ({} bytes)",
            video_id,
            request.body.len()
        );
        let res = self
            .http
            .post(&delivery_url)
            .header("accept", "*/*")
            .header("content-type", "application/octet-stream")
            .header("referer", "https://www.youtube.com/")
            .body(request.body)
            .send()
            .await?;

        let status = res.status().as_u16();
        let bytes = res.bytes().await?;
        debug!("onesie delivery answered {status} with {} bytes", bytes.len());

        read_player_info(&bytes, status)
    }
}
