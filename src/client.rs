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

use crate::config::TestConfig;
use crate::driver::http::{Http2Mode, HttpConnection};
use crate::driver::vst::VstConnection;
use crate::driver::{Connection, Credentials, DbClient};
use crate::error::HarnessResult;
use clap::ValueEnum;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    Http1,
    Http2,
    Vst,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http1 => write!(f, "http1"),
            Self::Http2 => write!(f, "http2"),
            Self::Vst => write!(f, "vst"),
        }
    }
}

/// Build a protocol-bound client: resolve credentials, open the connection
/// for the requested transport, then wrap it into a client handle. The two
/// steps fail with distinguishable errors (connection vs client
/// construction); the runner maps them to separate exit codes.
pub async fn build_client(transport: Transport, config: &TestConfig) -> HarnessResult<DbClient> {
    let credentials = Credentials::from_config(config)?;
    let connection: Arc<dyn Connection> = match transport {
        Transport::Http1 => Arc::new(HttpConnection::http1(&config.endpoints, &credentials)?),
        Transport::Http2 => {
            let first = config.endpoints.first().map(String::as_str).unwrap_or("");
            let mode = Http2Mode::resolve(first);
            Arc::new(HttpConnection::http2(&config.endpoints, mode, &credentials)?)
        }
        Transport::Vst => Arc::new(VstConnection::connect(&config.endpoints, &credentials).await?),
    };
    DbClient::new(connection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMode, Topology};

    fn config(endpoints: &[&str]) -> TestConfig {
        TestConfig {
            endpoints: endpoints.iter().map(|e| (*e).to_owned()).collect(),
            authentication: AuthMode::Jwt,
            jwt_secret: "opensesame".to_owned(),
            mode: Topology::Single,
            agents: vec![],
            dbservers: vec![],
            coordinators: vec![],
        }
    }

    #[tokio::test]
    async fn http_clients_build_without_a_live_server() {
        // reqwest connects lazily, so handle construction succeeds offline
        // for both HTTP variants and both HTTP/2 negotiation modes.
        build_client(Transport::Http1, &config(&["https://localhost:8529"]))
            .await
            .unwrap();
        build_client(Transport::Http2, &config(&["http://localhost:8529"]))
            .await
            .unwrap();
        build_client(Transport::Http2, &config(&["https://localhost:8529"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_endpoints_fail_with_connection_code() {
        let err = build_client(Transport::Http1, &config(&[]))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_NO_CONNECTION);
    }

    #[tokio::test]
    async fn unreachable_binary_endpoint_fails_with_connection_code() {
        let err = build_client(Transport::Vst, &config(&["vst://127.0.0.1:1"]))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_NO_CONNECTION);
    }
}
