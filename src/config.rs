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

use crate::error::{HarnessError, HarnessResult};
use strum::{Display, EnumString};
use tracing::warn;

/// Deployment shape of the server under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Topology {
    Cluster,
    ResilientSingle,
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AuthMode {
    Jwt,
    Basic,
    None,
}

/// Immutable per-run configuration, read once from the environment.
/// `cleanup_all` re-reads it from scratch because cleanup may run from a
/// failure context where nothing already loaded can be trusted.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub endpoints: Vec<String>,
    pub authentication: AuthMode,
    pub jwt_secret: String,
    pub mode: Topology,
    pub agents: Vec<String>,
    pub dbservers: Vec<String>,
    pub coordinators: Vec<String>,
}

impl TestConfig {
    pub fn from_env() -> HarnessResult<Self> {
        let endpoints = split_list(&require("TEST_ENDPOINTS")?);
        let raw_auth = require("TEST_AUTHENTICATION")?;
        let jwt_secret = require("TEST_JWTSECRET")?;
        let raw_mode = require("TEST_MODE")?;
        let agents = split_list(&require("TEST_AGENTS")?);
        let dbservers = split_list(&require("TEST_DBSERVERS")?);
        let coordinators = split_list(&require("TEST_COORDINATORS")?);

        let mode = raw_mode.parse::<Topology>().map_err(|_| HarnessError::Config {
            message: format!("unknown topology mode '{raw_mode}'"),
        })?;
        let authentication = raw_auth.parse::<AuthMode>().unwrap_or_else(|_| {
            warn!("Unknown authentication mode '{raw_auth}', proceeding unauthenticated");
            AuthMode::None
        });

        Ok(Self {
            endpoints,
            authentication,
            jwt_secret,
            mode,
            agents,
            dbservers,
            coordinators,
        })
    }
}

fn require(name: &str) -> HarnessResult<String> {
    std::env::var(name).map_err(|_| HarnessError::MissingEnv(name.to_owned()))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| part.trim().to_owned())
        .filter(|part| !part.is_empty())
        .collect()
}
