use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::common::errors::OnesieError;
use crate::common::types::AnyResult;

/// The TV config document is JSON behind an anti-XSSI prefix.
const ANTI_XSSI_PREFIX: &str = ")]}'";

/// JSON path of the onesie hot config inside the TV config document.
const HOT_CONFIG_POINTER: &str =
    "/webPlayerContextConfig/WEB_PLAYER_CONTEXT_CONFIG_ID_LIVING_ROOM_WATCH/onesieHotConfig";

pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Short-lived configuration bundle required to build a valid onesie
/// request. Replaced wholesale on refresh, never mutated in place.
#[derive(Debug, Clone)]
pub struct OnesieHotConfig {
    /// Redirector path + query the delivery URL lookup starts from.
    pub base_url: String,
    /// 32-byte client key (16 cipher + 16 mac).
    pub client_key: Vec<u8>,
    /// Server-side copy of the client key, passed through opaquely.
    pub encrypted_client_key: Vec<u8>,
    /// Opaque ustreamer blob echoed into the outer request.
    pub ustreamer_config: Vec<u8>,
    pub expires_at: Instant,
}

impl OnesieHotConfig {
    pub fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Fetches the raw TV config document. The production impl is an HTTP GET;
/// tests swap in canned documents.
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    async fn fetch_document(&self) -> AnyResult<String>;
}

pub struct HttpConfigFetcher {
    http: reqwest::Client,
    url: String,
}

impl HttpConfigFetcher {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl ConfigFetcher for HttpConfigFetcher {
    async fn fetch_document(&self) -> AnyResult<String> {
        let res = self.http.get(&self.url).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(format!("tv config request returned {status}").into());
        }
        Ok(res.text().await?)
    }
}

/// Process-wide cache of the onesie hot config.
///
/// At most one refresh runs at a time: callers that find the cache stale
/// queue on the refresh gate, then re-check the cache so a refresh that
/// completed while they waited is reused instead of repeated. A failed
/// refresh leaves the previous value and expiry untouched.
pub struct HotConfigCache {
    fetcher: Box<dyn ConfigFetcher>,
    value: RwLock<Option<OnesieHotConfig>>,
    refresh_gate: Mutex<()>,
    expiry_margin: Duration,
}

impl HotConfigCache {
    pub fn new(fetcher: Box<dyn ConfigFetcher>) -> Self {
        Self::with_expiry_margin(fetcher, DEFAULT_EXPIRY_MARGIN)
    }

    pub fn with_expiry_margin(fetcher: Box<dyn ConfigFetcher>, expiry_margin: Duration) -> Self {
        Self {
            fetcher,
            value: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            expiry_margin,
        }
    }

    pub async fn get(&self, force_refresh: bool) -> Result<OnesieHotConfig, OnesieError> {
        if !force_refresh {
            if let Some(config) = self.cached().await {
                return Ok(config);
            }
        }

        let _gate = self.refresh_gate.lock().await;
        if !force_refresh {
            if let Some(config) = self.cached().await {
                return Ok(config);
            }
        }

        let fresh = self.refresh().await?;
        *self.value.write().await = Some(fresh.clone());
        Ok(fresh)
    }

    async fn cached(&self) -> Option<OnesieHotConfig> {
        match &*self.value.read().await {
            Some(config) if config.is_fresh() => Some(config.clone()),
            _ => None,
        }
    }

    async fn refresh(&self) -> Result<OnesieHotConfig, OnesieError> {
        debug!("refreshing onesie hot config");
        let document = self
            .fetcher
            .fetch_document()
            .await
            .map_err(|e| OnesieError::ConfigFetch(e.to_string()))?;
        let config = parse_hot_config(&document, self.expiry_margin)?;
        debug!(
            "onesie hot config refreshed (base url {}, key {} bytes)",
            config.base_url,
            config.client_key.len()
        );
        Ok(config)
    }
}

/// Parse a TV config document into a hot config, stripping the `)]}'`
/// prefix and decoding the base64 key material.
pub fn parse_hot_config(document: &str, margin: Duration) -> Result<OnesieHotConfig, OnesieError> {
    let json_part = document
        .split_once(ANTI_XSSI_PREFIX)
        .map(|(_, rest)| rest)
        .unwrap_or(document);

    let root: Value = serde_json::from_str(json_part)
        .map_err(|e| OnesieError::ConfigFetch(format!("tv config is not valid json: {e}")))?;

    let hot = root
        .pointer(HOT_CONFIG_POINTER)
        .ok_or_else(|| OnesieError::ConfigFetch("tv config has no onesieHotConfig".to_string()))?;

    let base_url = string_field(hot, "baseUrl")?;
    let client_key = base64_field(hot, "clientKey")?;
    let encrypted_client_key = base64_field(hot, "encryptedClientKey")?;
    let ustreamer_config = base64_field(hot, "onesieUstreamerConfig")?;

    if client_key.len() != 32 {
        warn!(
            "onesie client key is {} bytes, expected 32; requests will fail to seal",
            client_key.len()
        );
    }

    let ttl = hot
        .get("keyExpiresInSeconds")
        .and_then(Value::as_u64)
        .ok_or_else(|| {
            OnesieError::ConfigFetch("onesieHotConfig has no keyExpiresInSeconds".to_string())
        })?;

    Ok(OnesieHotConfig {
        base_url,
        client_key,
        encrypted_client_key,
        ustreamer_config,
        expires_at: Instant::now() + Duration::from_secs(ttl).saturating_sub(margin),
    })
}

fn string_field(hot: &Value, key: &str) -> Result<String, OnesieError> {
    hot.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| OnesieError::ConfigFetch(format!("onesieHotConfig has no {key}")))
}

fn base64_field(hot: &Value, key: &str) -> Result<Vec<u8>, OnesieError> {
    let raw = string_field(hot, key)?;
    B64.decode(raw.as_bytes())
        .map_err(|e| OnesieError::ConfigFetch(format!("onesieHotConfig {key} is not base64: {e}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn sample_document(ttl_secs: u64) -> String {
        let key = B64.encode((0u8..32).collect::<Vec<u8>>());
        format!(
            concat!(
                ")]}}'\n{{\"webPlayerContextConfig\":{{",
                "\"WEB_PLAYER_CONTEXT_CONFIG_ID_LIVING_ROOM_WATCH\":{{",
                "\"onesieHotConfig\":{{",
                "\"baseUrl\":\"/initplayback?source=onesie\",",
                "\"clientKey\":\"{key}\",",
                "\"encryptedClientKey\":\"c2VhbGVkLWtleQ==\",",
                "\"onesieUstreamerConfig\":\"dXN0cmVhbWVy\",",
                "\"keyExpiresInSeconds\":{ttl}",
                "}}}}}}}}"
            ),
            key = key,
            ttl = ttl_secs
        )
    }

    struct MockFetcher {
        calls: Arc<AtomicUsize>,
        ttl_secs: u64,
        fail_after: Option<usize>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl ConfigFetcher for MockFetcher {
        async fn fetch_document(&self) -> AnyResult<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(limit) = self.fail_after {
                if call >= limit {
                    return Err("config endpoint unavailable".into());
                }
            }
            Ok(sample_document(self.ttl_secs))
        }
    }

    fn cache_with(fetcher: MockFetcher, margin: Duration) -> HotConfigCache {
        HotConfigCache::with_expiry_margin(Box::new(fetcher), margin)
    }

    #[test]
    fn test_parse_hot_config_document() {
        let config =
            parse_hot_config(&sample_document(3600), DEFAULT_EXPIRY_MARGIN).expect("should parse");
        assert_eq!(config.base_url, "/initplayback?source=onesie");
        assert_eq!(config.client_key, (0u8..32).collect::<Vec<u8>>());
        assert_eq!(config.encrypted_client_key, b"sealed-key");
        assert_eq!(config.ustreamer_config, b"ustreamer");
        assert!(config.is_fresh());
    }

    #[test]
    fn test_parse_rejects_document_without_hot_config() {
        let err = parse_hot_config(")]}'\n{\"webPlayerContextConfig\":{}}", DEFAULT_EXPIRY_MARGIN)
            .unwrap_err();
        assert!(matches!(err, OnesieError::ConfigFetch(_)));
    }

    #[test]
    fn test_parse_without_prefix_still_works() {
        let document = sample_document(3600);
        let bare = document.split_once(")]}'").unwrap().1;
        assert!(parse_hot_config(bare, DEFAULT_EXPIRY_MARGIN).is_ok());
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = cache_with(
            MockFetcher {
                calls: calls.clone(),
                ttl_secs: 3600,
                fail_after: None,
                delay: None,
            },
            DEFAULT_EXPIRY_MARGIN,
        );

        cache.get(false).await.expect("first get");
        cache.get(false).await.expect("second get");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_cache_refetches() {
        let calls = Arc::new(AtomicUsize::new(0));
        // Margin swallows the whole TTL, so every entry is born stale.
        let cache = cache_with(
            MockFetcher {
                calls: calls.clone(),
                ttl_secs: 10,
                fail_after: None,
                delay: None,
            },
            Duration::from_secs(11),
        );

        cache.get(false).await.expect("first get");
        cache.get(false).await.expect("second get");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_force_refresh_refetches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = cache_with(
            MockFetcher {
                calls: calls.clone(),
                ttl_secs: 3600,
                fail_after: None,
                delay: None,
            },
            DEFAULT_EXPIRY_MARGIN,
        );

        cache.get(false).await.expect("first get");
        cache.get(true).await.expect("forced get");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cold_cache_single_flight() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(cache_with(
            MockFetcher {
                calls: calls.clone(),
                ttl_secs: 3600,
                fail_after: None,
                delay: Some(Duration::from_millis(50)),
            },
            DEFAULT_EXPIRY_MARGIN,
        ));

        let a = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get(false).await }
        });
        let b = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get(false).await }
        });

        a.await.unwrap().expect("first racer");
        b.await.unwrap().expect("second racer");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = cache_with(
            MockFetcher {
                calls: calls.clone(),
                ttl_secs: 3600,
                fail_after: Some(1),
                delay: None,
            },
            DEFAULT_EXPIRY_MARGIN,
        );

        let first = cache.get(false).await.expect("first get");
        let err = cache.get(true).await.expect_err("forced refresh should fail");
        assert!(matches!(err, OnesieError::ConfigFetch(_)));

        // The still-fresh first value survives the failed refresh.
        let third = cache.get(false).await.expect("cached get");
        assert_eq!(third.base_url, first.base_url);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
