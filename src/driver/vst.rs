/* Licensed to the Apache Software Foundation (ASF) under one
 * or more contributor license agreements.  See the NOTICE file
 * distributed with this work for additional information
 * regarding copyright ownership.  The ASF licenses this file
 * to you under the Apache License, Version 2.0 (the
 * "License"); you may not use this file except in compliance
 * with the License.  You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing,
 * software distributed under the License is distributed on an
 * "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
 * KIND, either express or implied.  See the License for the
 * specific language governing permissions and limitations
 * under the License.
 */

//! Binary streaming transport. One persistent connection carries all
//! requests; each message is split into chunks with a fixed 24-byte
//! little-endian header and reassembled by message id on the way back.
//! Message payloads are JSON arrays mirroring the request/response header
//! shape of the wire protocol.

use super::{Connection, Credentials, DbRequest, DbResponse, Method, SYSTEM_DATABASE};
use crate::error::{HarnessError, HarnessResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

const NEGOTIATION_HEADER: &[u8] = b"VST/1.1\r\n\r\n";
const CHUNK_HEADER_LEN: usize = 24;
const MAX_CHUNK_PAYLOAD: usize = 30 * 1024;

const MESSAGE_TYPE_REQUEST: u64 = 1;
const MESSAGE_TYPE_AUTH: u64 = 1000;

trait VstStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> VstStream for T {}

/// Chunk header: total chunk length (including the header itself), the
/// chunkX field (first chunk carries the chunk count, followers carry their
/// index; bit 0 marks the first chunk), the message id, and the total
/// message length. All fields little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChunkHeader {
    length: u32,
    chunk_x: u32,
    message_id: u64,
    message_length: u64,
}

impl ChunkHeader {
    fn first(chunk_count: u32, payload_len: usize, message_id: u64, message_length: u64) -> Self {
        Self {
            length: (CHUNK_HEADER_LEN + payload_len) as u32,
            chunk_x: (chunk_count << 1) | 1,
            message_id,
            message_length,
        }
    }

    fn follower(index: u32, payload_len: usize, message_id: u64, message_length: u64) -> Self {
        Self {
            length: (CHUNK_HEADER_LEN + payload_len) as u32,
            chunk_x: index << 1,
            message_id,
            message_length,
        }
    }

    fn encode(&self) -> [u8; CHUNK_HEADER_LEN] {
        let mut buf = [0u8; CHUNK_HEADER_LEN];
        buf[0..4].copy_from_slice(&self.length.to_le_bytes());
        buf[4..8].copy_from_slice(&self.chunk_x.to_le_bytes());
        buf[8..16].copy_from_slice(&self.message_id.to_le_bytes());
        buf[16..24].copy_from_slice(&self.message_length.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8; CHUNK_HEADER_LEN]) -> Self {
        Self {
            length: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            chunk_x: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            message_id: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            message_length: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
        }
    }

    fn is_first(&self) -> bool {
        self.chunk_x & 1 == 1
    }

    fn chunk_count(&self) -> u32 {
        self.chunk_x >> 1
    }

    fn payload_len(&self) -> HarnessResult<usize> {
        (self.length as usize)
            .checked_sub(CHUNK_HEADER_LEN)
            .ok_or_else(|| HarnessError::Protocol("chunk shorter than its header".into()))
    }
}

pub struct VstConnection {
    endpoint: String,
    stream: Mutex<Box<dyn VstStream>>,
    next_message_id: AtomicU64,
}

impl VstConnection {
    pub async fn connect(endpoints: &[String], credentials: &Credentials) -> HarnessResult<Self> {
        let endpoint = endpoints.first().ok_or_else(|| HarnessError::Connection {
            message: "no endpoints configured".into(),
        })?;
        let (secure, addr) = parse_endpoint(endpoint)?;
        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|e| HarnessError::Connection {
                message: format!("cannot reach {addr}: {e}"),
            })?;

        let mut stream: Box<dyn VstStream> = if secure {
            let connector = tokio_native_tls::native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .build()
                .map_err(|e| HarnessError::Connection {
                    message: format!("TLS setup failed: {e}"),
                })?;
            let connector = tokio_native_tls::TlsConnector::from(connector);
            let host = addr.split(':').next().unwrap_or(&addr).to_owned();
            Box::new(connector.connect(&host, tcp).await.map_err(|e| {
                HarnessError::Connection {
                    message: format!("TLS handshake with {addr} failed: {e}"),
                }
            })?)
        } else {
            Box::new(tcp)
        };

        stream
            .write_all(NEGOTIATION_HEADER)
            .await
            .map_err(|e| HarnessError::Connection {
                message: format!("protocol negotiation failed: {e}"),
            })?;

        let connection = Self {
            endpoint: endpoint.clone(),
            stream: Mutex::new(stream),
            next_message_id: AtomicU64::new(1),
        };
        connection.authenticate(credentials).await?;
        Ok(connection)
    }

    async fn authenticate(&self, credentials: &Credentials) -> HarnessResult<()> {
        let header = match credentials {
            Credentials::Jwt { token } => json!([1, MESSAGE_TYPE_AUTH, "jwt", token]),
            Credentials::Basic { username, password } => {
                json!([1, MESSAGE_TYPE_AUTH, "plain", username, password])
            }
            Credentials::None => return Ok(()),
        };
        let response = self.roundtrip(json!([header, Value::Null])).await?;
        let (status, _) = split_response(&response)?;
        if !(200..300).contains(&status) {
            return Err(HarnessError::Connection {
                message: format!("authentication rejected with status {status}"),
            });
        }
        Ok(())
    }

    async fn roundtrip(&self, message: Value) -> HarnessResult<Value> {
        let payload = serde_json::to_vec(&message)?;
        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let mut stream = self.stream.lock().await;
        write_message(stream.as_mut(), message_id, &payload).await?;
        let raw = read_message(stream.as_mut(), message_id).await?;
        serde_json::from_slice(&raw).map_err(HarnessError::from)
    }
}

async fn write_message(
    stream: &mut (dyn VstStream),
    message_id: u64,
    payload: &[u8],
) -> HarnessResult<()> {
    let message_length = payload.len() as u64;
    let pieces: Vec<&[u8]> = if payload.is_empty() {
        vec![b"".as_slice()]
    } else {
        payload.chunks(MAX_CHUNK_PAYLOAD).collect()
    };
    let chunk_count = pieces.len() as u32;
    for (index, piece) in pieces.iter().enumerate() {
        let header = if index == 0 {
            ChunkHeader::first(chunk_count, piece.len(), message_id, message_length)
        } else {
            ChunkHeader::follower(index as u32, piece.len(), message_id, message_length)
        };
        stream.write_all(&header.encode()).await?;
        stream.write_all(piece).await?;
    }
    stream.flush().await?;
    Ok(())
}

async fn read_message(stream: &mut (dyn VstStream), message_id: u64) -> HarnessResult<Vec<u8>> {
    let mut assembled = Vec::new();
    let mut expected: Option<u64> = None;
    loop {
        let mut raw_header = [0u8; CHUNK_HEADER_LEN];
        stream.read_exact(&mut raw_header).await?;
        let header = ChunkHeader::decode(&raw_header);
        let mut piece = vec![0u8; header.payload_len()?];
        stream.read_exact(&mut piece).await?;
        if header.message_id != message_id {
            // Response to an earlier, abandoned request; drop it.
            continue;
        }
        assembled.extend_from_slice(&piece);
        expected.get_or_insert(header.message_length);
        if assembled.len() as u64 >= expected.unwrap_or(0) {
            return Ok(assembled);
        }
    }
}

fn request_type(method: Method) -> u64 {
    match method {
        Method::Delete => 0,
        Method::Get => 1,
        Method::Post => 2,
    }
}

fn split_response(message: &Value) -> HarnessResult<(u16, Value)> {
    let parts = message
        .as_array()
        .ok_or_else(|| HarnessError::Protocol("response is not a message array".into()))?;
    let header = parts
        .first()
        .and_then(Value::as_array)
        .ok_or_else(|| HarnessError::Protocol("response misses its header array".into()))?;
    let status = header
        .get(2)
        .and_then(Value::as_u64)
        .ok_or_else(|| HarnessError::Protocol("response header misses a status code".into()))?;
    let body = parts.get(1).cloned().unwrap_or(Value::Null);
    Ok((status as u16, body))
}

/// Body part of a response message to raw bytes. Text payloads (such as
/// the metrics exposition) travel as strings and are handed through
/// unchanged; structured payloads are re-serialized as JSON.
fn body_bytes(body: Value) -> HarnessResult<Bytes> {
    match body {
        Value::Null => Ok(Bytes::new()),
        Value::String(text) => Ok(Bytes::from(text.into_bytes())),
        other => Ok(Bytes::from(serde_json::to_vec(&other)?)),
    }
}

fn parse_endpoint(endpoint: &str) -> HarnessResult<(bool, String)> {
    let (scheme, rest) = endpoint.split_once("://").unwrap_or(("tcp", endpoint));
    let addr = rest.trim_end_matches('/').to_owned();
    match scheme {
        "tcp" | "vst" | "http" => Ok((false, addr)),
        "ssl" | "vsts" | "https" => Ok((true, addr)),
        other => Err(HarnessError::Connection {
            message: format!("unsupported endpoint scheme '{other}'"),
        }),
    }
}

#[async_trait]
impl Connection for VstConnection {
    async fn send(&self, request: DbRequest) -> HarnessResult<DbResponse> {
        let database = if request.database.is_empty() {
            SYSTEM_DATABASE
        } else {
            &request.database
        };
        let header = json!([
            1,
            MESSAGE_TYPE_REQUEST,
            database,
            request_type(request.method),
            request.path,
            {},
            {}
        ]);
        let body = request.body.unwrap_or(Value::Null);
        let response = self.roundtrip(json!([header, body])).await?;
        let (status, body) = split_response(&response)?;
        Ok(DbResponse {
            status,
            body: body_bytes(body)?,
        })
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_header_round_trips() {
        let header = ChunkHeader::first(3, 512, 42, 70_000);
        let decoded = ChunkHeader::decode(&header.encode());
        assert_eq!(decoded, header);
        assert!(decoded.is_first());
        assert_eq!(decoded.chunk_count(), 3);
        assert_eq!(decoded.message_length, 70_000);
        assert_eq!(decoded.payload_len().unwrap(), 512);
    }

    #[test]
    fn follower_chunk_carries_index_not_count() {
        let header = ChunkHeader::follower(2, 100, 7, 1000);
        assert!(!header.is_first());
        assert_eq!(header.chunk_count(), 2);
    }

    #[test]
    fn truncated_chunk_header_is_a_protocol_error() {
        let bogus = ChunkHeader {
            length: 10,
            chunk_x: 1,
            message_id: 1,
            message_length: 0,
        };
        assert!(bogus.payload_len().is_err());
    }

    #[test]
    fn endpoint_schemes_select_tls() {
        assert_eq!(parse_endpoint("vst://db1:8529").unwrap(), (false, "db1:8529".into()));
        assert_eq!(parse_endpoint("ssl://db1:8529/").unwrap(), (true, "db1:8529".into()));
        assert_eq!(parse_endpoint("db1:8529").unwrap(), (false, "db1:8529".into()));
        assert!(parse_endpoint("quic://db1:8529").is_err());
    }

    #[test]
    fn text_response_body_passes_through_as_raw_bytes() {
        let exposition = "foo_bar 42\nfoo_baz 7\n";
        assert_eq!(
            body_bytes(json!(exposition)).unwrap().as_ref(),
            exposition.as_bytes()
        );
        assert!(body_bytes(Value::Null).unwrap().is_empty());
        assert_eq!(
            body_bytes(json!({"result": true})).unwrap().as_ref(),
            &br#"{"result":true}"#[..]
        );
    }

    #[test]
    fn response_header_yields_status_and_body() {
        let message = json!([[1, 2, 200, {}], {"result": true}]);
        let (status, body) = split_response(&message).unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, json!({"result": true}));
    }

    #[tokio::test]
    async fn message_round_trips_through_a_duplex_pipe() {
        let (mut client, mut server) = tokio::io::duplex(256 * 1024);
        // Payload larger than one chunk to exercise splitting and reassembly.
        let payload = vec![b'x'; MAX_CHUNK_PAYLOAD * 2 + 17];
        write_message(&mut client, 9, &payload).await.unwrap();
        let echoed = read_message(&mut server, 9).await.unwrap();
        assert_eq!(echoed, payload);
    }
}
