use serde_json::Value;
use tracing::debug;

use crate::common::errors::OnesieError;
use crate::onesie::proto::{ProtoReader, UmpReader};

/// UMP part ids meaningful to the onesie path. Other part kinds may appear
/// in the stream and are skipped, never an error.
pub const UMP_ONESIE_HEADER: u64 = 10;
pub const UMP_ONESIE_DATA: u64 = 11;

/// Header kinds carried by an ONESIE_HEADER part. Only the player-response
/// kind matters here; anything unrecognized maps to `Unknown` and is
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnesieHeaderType {
    Unknown,
    PlayerResponse,
    MediaDecryptionKey,
}

impl OnesieHeaderType {
    fn from_u64(v: u64) -> Self {
        match v {
            1 => Self::PlayerResponse,
            2 => Self::MediaDecryptionKey,
            _ => Self::Unknown,
        }
    }
}

/// Proxy status value meaning the innertube call went through cleanly.
pub const PROXY_STATUS_OK: i32 = 1;

/// Final output of the decode pipeline: the player response JSON plus the
/// HTTP status it arrived with.
#[derive(Debug, Clone)]
pub struct PlayerInfo {
    pub player_response: Value,
    pub status_code: u16,
    pub success: bool,
}

#[derive(Debug)]
struct OnesieHeader {
    header_type: OnesieHeaderType,
    video_id: Option<String>,
}

#[derive(Debug)]
struct InnertubeResponse {
    proxy_status: i32,
    http_status: u16,
    body: Vec<u8>,
}

/// Pairing state for the header/data walk: a data part only counts once a
/// player-response header is active, and only the first pairing is kept.
enum DecodeState {
    AwaitingHeader,
    AwaitingData,
    Done(InnertubeResponse),
}

/// Decode a complete onesie response buffer into player info.
///
/// `http_status` is the delivery response's status code; it backs the
/// result when the inner response does not carry one of its own. A stream
/// with no player-response pairing decodes to `Ok(None)`.
pub fn read_player_info(
    buffer: &[u8],
    http_status: u16,
) -> Result<Option<PlayerInfo>, OnesieError> {
    let mut ump = UmpReader::new(buffer);
    let mut state = DecodeState::AwaitingHeader;

    while let Some(part) = ump.next_part() {
        match part.part_type {
            UMP_ONESIE_HEADER => {
                if !matches!(state, DecodeState::AwaitingHeader) {
                    continue;
                }
                let header = decode_onesie_header(part.data)?;
                if header.header_type == OnesieHeaderType::PlayerResponse {
                    debug!(
                        "onesie player response header (video id {:?})",
                        header.video_id
                    );
                    state = DecodeState::AwaitingData;
                }
            }
            UMP_ONESIE_DATA => {
                if matches!(state, DecodeState::AwaitingData) {
                    state = DecodeState::Done(decode_innertube_response(part.data)?);
                }
                // Data without an active header, or after the first
                // pairing, is ignored.
            }
            other => {
                debug!("skipping ump part type {other} ({} bytes)", part.data.len());
            }
        }
    }

    let DecodeState::Done(response) = state else {
        return Ok(None);
    };

    if response.proxy_status != PROXY_STATUS_OK {
        return Err(OnesieError::ProxyStatus {
            status: response.proxy_status,
        });
    }

    let text = std::str::from_utf8(&response.body)
        .map_err(|e| OnesieError::MalformedFrame(format!("response body is not utf-8: {e}")))?;
    let player_response: Value = serde_json::from_str(text)
        .map_err(|e| OnesieError::MalformedFrame(format!("response body is not json: {e}")))?;

    let status_code = if response.http_status != 0 {
        response.http_status
    } else {
        http_status
    };

    Ok(Some(PlayerInfo {
        player_response,
        status_code,
        success: true,
    }))
}

fn decode_onesie_header(data: &[u8]) -> Result<OnesieHeader, OnesieError> {
    let mut r = ProtoReader::new(data);
    let mut header = OnesieHeader {
        header_type: OnesieHeaderType::Unknown,
        video_id: None,
    };

    while r.has_remaining() {
        let tag = r
            .read_tag()
            .ok_or_else(|| OnesieError::MalformedFrame("truncated onesie header".to_string()))?;
        match tag >> 3 {
            1 => {
                let v = r.read_varint().ok_or_else(|| {
                    OnesieError::MalformedFrame("onesie header type cut short".to_string())
                })?;
                header.header_type = OnesieHeaderType::from_u64(v);
            }
            2 => {
                header.video_id = Some(r.read_string().ok_or_else(|| {
                    OnesieError::MalformedFrame("onesie header video id overruns part".to_string())
                })?);
            }
            _ => r.skip_field(tag & 7),
        }
    }

    Ok(header)
}

fn decode_innertube_response(data: &[u8]) -> Result<InnertubeResponse, OnesieError> {
    let mut r = ProtoReader::new(data);
    let mut response = InnertubeResponse {
        proxy_status: 0,
        http_status: 0,
        body: Vec::new(),
    };

    while r.has_remaining() {
        let tag = r.read_tag().ok_or_else(|| {
            OnesieError::MalformedFrame("truncated innertube response".to_string())
        })?;
        match tag >> 3 {
            1 => {
                let v = r.read_varint().ok_or_else(|| {
                    OnesieError::MalformedFrame("proxy status cut short".to_string())
                })?;
                response.proxy_status = v as i32;
            }
            2 => {
                let v = r.read_varint().ok_or_else(|| {
                    OnesieError::MalformedFrame("http status cut short".to_string())
                })?;
                response.http_status = v as u16;
            }
            4 => {
                response.body = r
                    .read_bytes()
                    .ok_or_else(|| {
                        OnesieError::MalformedFrame(
                            "response body overruns part".to_string(),
                        )
                    })?
                    .to_vec();
            }
            _ => r.skip_field(tag & 7),
        }
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onesie::proto::ProtoWriter;

    fn header_part(header_type: u64) -> Vec<u8> {
        let mut w = ProtoWriter::new();
        w.write_i32(1, header_type as i32);
        w.write_string(2, "dQw4w9WgXcQ");
        w.finish()
    }

    fn data_part(proxy_status: i32, http_status: i32, body: &[u8]) -> Vec<u8> {
        let mut w = ProtoWriter::new();
        w.write_i32(1, proxy_status);
        w.write_i32(2, http_status);
        w.write_bytes(4, body);
        w.finish()
    }

    /// Frame parts with single-byte UMP varints (fine below 128).
    fn ump_stream(parts: &[(u64, Vec<u8>)]) -> Vec<u8> {
        let mut buf = Vec::new();
        for (part_type, data) in parts {
            assert!(*part_type < 0x80 && data.len() < 0x80);
            buf.push(*part_type as u8);
            buf.push(data.len() as u8);
            buf.extend_from_slice(data);
        }
        buf
    }

    #[test]
    fn test_decode_header_then_data() {
        let stream = ump_stream(&[
            (UMP_ONESIE_HEADER, header_part(1)),
            (UMP_ONESIE_DATA, data_part(PROXY_STATUS_OK, 200, b"{\"ok\":true}")),
        ]);

        let info = read_player_info(&stream, 200)
            .expect("decode should succeed")
            .expect("player response should be present");
        assert_eq!(info.player_response["ok"], true);
        assert_eq!(info.status_code, 200);
        assert!(info.success);
    }

    #[test]
    fn test_decode_data_without_header_is_none() {
        let stream = ump_stream(&[(
            UMP_ONESIE_DATA,
            data_part(PROXY_STATUS_OK, 200, b"{\"ok\":true}"),
        )]);
        assert!(read_player_info(&stream, 200).unwrap().is_none());
    }

    #[test]
    fn test_decode_empty_stream_is_none() {
        assert!(read_player_info(&[], 200).unwrap().is_none());
    }

    #[test]
    fn test_decode_non_player_header_does_not_pair() {
        let stream = ump_stream(&[
            (UMP_ONESIE_HEADER, header_part(2)),
            (UMP_ONESIE_DATA, data_part(PROXY_STATUS_OK, 200, b"{}")),
        ]);
        assert!(read_player_info(&stream, 200).unwrap().is_none());
    }

    #[test]
    fn test_decode_ignores_unknown_part_kinds() {
        let stream = ump_stream(&[
            (21, b"media bytes".to_vec()),
            (UMP_ONESIE_HEADER, header_part(1)),
            (58, vec![0x08, 0x01]),
            (UMP_ONESIE_DATA, data_part(PROXY_STATUS_OK, 200, b"{\"ok\":true}")),
        ]);
        let info = read_player_info(&stream, 200).unwrap().unwrap();
        assert_eq!(info.player_response["ok"], true);
    }

    #[test]
    fn test_decode_first_pairing_wins() {
        let stream = ump_stream(&[
            (UMP_ONESIE_HEADER, header_part(1)),
            (UMP_ONESIE_DATA, data_part(PROXY_STATUS_OK, 200, b"{\"first\":1}")),
            (UMP_ONESIE_HEADER, header_part(1)),
            (UMP_ONESIE_DATA, data_part(PROXY_STATUS_OK, 500, b"{\"second\":2}")),
        ]);
        let info = read_player_info(&stream, 200).unwrap().unwrap();
        assert_eq!(info.player_response["first"], 1);
        assert_eq!(info.status_code, 200);
    }

    #[test]
    fn test_decode_non_ok_proxy_status_fails() {
        let stream = ump_stream(&[
            (UMP_ONESIE_HEADER, header_part(1)),
            (UMP_ONESIE_DATA, data_part(12, 200, b"{\"ok\":true}")),
        ]);
        let err = read_player_info(&stream, 200).expect_err("should fail");
        assert!(matches!(err, OnesieError::ProxyStatus { status: 12 }));
    }

    #[test]
    fn test_decode_garbage_body_is_malformed() {
        let stream = ump_stream(&[
            (UMP_ONESIE_HEADER, header_part(1)),
            (UMP_ONESIE_DATA, data_part(PROXY_STATUS_OK, 200, b"not json")),
        ]);
        assert!(matches!(
            read_player_info(&stream, 200),
            Err(OnesieError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_falls_back_to_delivery_status() {
        let stream = ump_stream(&[
            (UMP_ONESIE_HEADER, header_part(1)),
            (UMP_ONESIE_DATA, data_part(PROXY_STATUS_OK, 0, b"{\"ok\":true}")),
        ]);
        let info = read_player_info(&stream, 206).unwrap().unwrap();
        assert_eq!(info.status_code, 206);
    }
}
