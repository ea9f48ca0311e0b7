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

use super::{Connection, Credentials, DbRequest, DbResponse, Method};
use crate::error::{HarnessError, HarnessResult};
use async_trait::async_trait;

/// How the HTTP/2 connection is negotiated, resolved from the first
/// endpoint's scheme before construction. Cleartext means h2c via prior
/// knowledge: the client opens a plain TCP connection and starts speaking
/// HTTP/2 immediately, with no TLS handshake at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Http2Mode {
    Tls,
    Cleartext,
}

impl Http2Mode {
    pub fn resolve(endpoint: &str) -> Self {
        if endpoint.starts_with("https") {
            Self::Tls
        } else {
            Self::Cleartext
        }
    }
}

/// HTTP transport over reqwest, shared by the HTTP/1.1 and HTTP/2 variants.
/// Certificate verification is disabled throughout: the test environment
/// runs on self-signed certificates.
#[derive(Debug)]
pub struct HttpConnection {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpConnection {
    pub fn http1(endpoints: &[String], credentials: &Credentials) -> HarnessResult<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .danger_accept_invalid_certs(true)
            .http1_only()
            .build()
            .map_err(connection_error)?;
        Self::with_client(client, endpoints, credentials)
    }

    pub fn http2(
        endpoints: &[String],
        mode: Http2Mode,
        credentials: &Credentials,
    ) -> HarnessResult<Self> {
        let builder = reqwest::Client::builder().http2_prior_knowledge();
        let builder = match mode {
            Http2Mode::Tls => builder
                .use_rustls_tls()
                .danger_accept_invalid_certs(true),
            Http2Mode::Cleartext => builder,
        };
        let client = builder.build().map_err(connection_error)?;
        Self::with_client(client, endpoints, credentials)
    }

    fn with_client(
        client: reqwest::Client,
        endpoints: &[String],
        credentials: &Credentials,
    ) -> HarnessResult<Self> {
        let first = endpoints.first().ok_or_else(|| HarnessError::Connection {
            message: "no endpoints configured".into(),
        })?;
        Ok(Self {
            client,
            base_url: first.trim_end_matches('/').to_owned(),
            credentials: credentials.clone(),
        })
    }

    fn url_for(&self, request: &DbRequest) -> String {
        if request.database.is_empty() {
            format!("{}{}", self.base_url, request.path)
        } else {
            format!("{}/_db/{}{}", self.base_url, request.database, request.path)
        }
    }
}

fn connection_error(err: reqwest::Error) -> HarnessError {
    HarnessError::Connection {
        message: err.to_string(),
    }
}

fn http_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn send(&self, request: DbRequest) -> HarnessResult<DbResponse> {
        let url = self.url_for(&request);
        let mut builder = self.client.request(http_method(request.method), url);
        match &self.credentials {
            Credentials::Jwt { token } => {
                builder = builder.header(reqwest::header::AUTHORIZATION, format!("bearer {token}"));
            }
            Credentials::Basic { username, password } => {
                builder = builder.basic_auth(username, Some(password));
            }
            Credentials::None => {}
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| HarnessError::Protocol(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| HarnessError::Protocol(e.to_string()))?;
        Ok(DbResponse { status, body })
    }

    fn endpoint(&self) -> String {
        self.base_url.clone()
    }
}
