use onesielink::onesie::OnesieClient;
use serde_json::json;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let video_id = std::env::args()
        .nth(1)
        .ok_or("usage: onesielink <video-id>")?;

    let payload = json!({
        "videoId": video_id,
        "context": {
            "client": {
                "clientName": "TVHTML5",
                "clientVersion": "7.20250219.19.00",
                "userAgent": "Mozilla/5.0 (SmartHub; SMART-TV; U; Linux/SmartTV; Maple2012) \
                     AppleWebKit/534.7 (KHTML, like Gecko) SmartTV Safari/534.7",
                "visitorData": "",
                "hl": "en",
                "gl": "US"
            },
            "user": { "lockedSafetyMode": false },
            "request": { "useSsl": true }
        },
        "contentCheckOk": true,
        "racyCheckOk": true
    });

    let client = OnesieClient::new()?;
    match client.fetch_player_info(&payload).await? {
        Some(info) => {
            info!("player response received (http {})", info.status_code);
            println!("{}", serde_json::to_string_pretty(&info.player_response)?);
        }
        None => info!("no player response present in onesie stream"),
    }

    Ok(())
}
