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

//! Thin database driver: a transport-agnostic [`Connection`] seam plus the
//! handful of operations the harness needs (databases, collections, server
//! version, raw requests for the metrics scrape). The harness never speaks
//! the wire protocols outside of this module and its transport submodules.

pub mod http;
pub mod vst;

use crate::config::{AuthMode, TestConfig};
use crate::error::{HarnessError, HarnessResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(test)]
use mockall::automock;

/// Name of the distinguished system database. Collections are tracked for
/// cleanup only when they live here; elsewhere they vanish with their
/// parent database.
pub const SYSTEM_DATABASE: &str = "_system";

pub const METRICS_PATH: &str = "/_admin/metrics/v2";

const JWT_ISSUER: &str = "cluster-harness";
const JWT_USER: &str = "root";
const JWT_LIFETIME_SECS: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

#[derive(Debug, Clone)]
pub struct DbRequest {
    pub method: Method,
    /// Database the request runs against; empty means the server default.
    pub database: String,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl DbRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            database: String::new(),
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            database: String::new(),
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            database: String::new(),
            path: path.into(),
            body: None,
        }
    }

    pub fn in_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct DbResponse {
    pub status: u16,
    pub body: Bytes,
}

impl DbResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> HarnessResult<T> {
        serde_json::from_slice(&self.body).map_err(HarnessError::from)
    }
}

/// Transport seam. One implementation per wire protocol; everything above
/// this trait is protocol-agnostic.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send(&self, request: DbRequest) -> HarnessResult<DbResponse>;

    /// Primary endpoint this connection was built against.
    fn endpoint(&self) -> String;
}

/// Authentication material resolved from the configuration before any
/// connection is built.
#[derive(Debug, Clone)]
pub enum Credentials {
    Jwt { token: String },
    Basic { username: String, password: String },
    None,
}

#[derive(Serialize)]
struct JwtClaims {
    iss: &'static str,
    preferred_username: &'static str,
    iat: u64,
    exp: u64,
}

impl Credentials {
    pub fn from_config(config: &TestConfig) -> HarnessResult<Self> {
        match config.authentication {
            AuthMode::Jwt => Ok(Self::Jwt {
                token: sign_jwt(&config.jwt_secret)?,
            }),
            AuthMode::Basic => Ok(Self::Basic {
                username: JWT_USER.to_owned(),
                password: config.jwt_secret.clone(),
            }),
            AuthMode::None => Ok(Self::None),
        }
    }
}

fn sign_jwt(secret: &str) -> HarnessResult<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let claims = JwtClaims {
        iss: JWT_ISSUER,
        preferred_username: JWT_USER,
        iat: now,
        exp: now + JWT_LIFETIME_SECS,
    };
    let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256);
    let key = jsonwebtoken::EncodingKey::from_secret(secret.as_bytes());
    jsonwebtoken::encode(&header, &claims, &key).map_err(|e| HarnessError::Connection {
        message: format!("cannot sign JWT: {e}"),
    })
}

#[derive(Debug, Deserialize)]
pub struct ServerVersion {
    pub server: String,
    pub version: String,
}

/// Options passed through to database creation; fields the caller leaves
/// unset are omitted from the request body.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication_factor: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_concern: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_shards: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication_factor: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_concern: Option<u32>,
}

#[derive(Deserialize)]
struct DatabaseList {
    result: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInfo {
    pub name: String,
    #[serde(default)]
    pub is_system: bool,
}

#[derive(Deserialize)]
struct CollectionList {
    result: Vec<CollectionInfo>,
}

/// Opaque client handle over one protocol-bound connection. Handles own no
/// shared mutable state; several may coexist with independent lifetimes and
/// none is ever explicitly closed by the harness.
#[derive(Clone)]
pub struct DbClient {
    connection: Arc<dyn Connection>,
}

impl std::fmt::Debug for DbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbClient")
            .field("endpoint", &self.connection.endpoint())
            .finish()
    }
}

impl DbClient {
    pub fn new(connection: Arc<dyn Connection>) -> HarnessResult<Self> {
        if connection.endpoint().is_empty() {
            return Err(HarnessError::Client {
                message: "connection reports no endpoint".into(),
            });
        }
        Ok(Self { connection })
    }

    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    pub async fn version(&self) -> HarnessResult<ServerVersion> {
        let response = self.connection.send(DbRequest::get("/_api/version")).await?;
        if !response.is_success() {
            return Err(HarnessError::Protocol(format!(
                "version request failed with status {}",
                response.status
            )));
        }
        response.json()
    }

    pub async fn databases(&self) -> HarnessResult<Vec<String>> {
        let response = self.connection.send(DbRequest::get("/_api/database")).await?;
        if !response.is_success() {
            return Err(HarnessError::Protocol(format!(
                "database listing failed with status {}",
                response.status
            )));
        }
        let list: DatabaseList = response.json()?;
        Ok(list.result)
    }

    pub async fn database_exists(&self, name: &str) -> HarnessResult<bool> {
        Ok(self.databases().await?.iter().any(|db| db == name))
    }

    pub async fn create_database(
        &self,
        name: &str,
        options: &DatabaseOptions,
    ) -> HarnessResult<Database> {
        let body = json!({ "name": name, "options": options });
        let response = self
            .connection
            .send(DbRequest::post("/_api/database", body))
            .await?;
        if !response.is_success() {
            return Err(HarnessError::Protocol(format!(
                "creating database '{name}' failed with status {}",
                response.status
            )));
        }
        Ok(self.database(name))
    }

    /// Handle to a database by name. No existence check; operations on a
    /// missing database surface as request errors.
    pub fn database(&self, name: &str) -> Database {
        Database {
            connection: self.connection.clone(),
            name: name.to_owned(),
        }
    }
}

pub struct Database {
    connection: Arc<dyn Connection>,
    name: String,
}

impl Database {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_system(&self) -> bool {
        self.name == SYSTEM_DATABASE
    }

    pub async fn remove(&self) -> HarnessResult<()> {
        let response = self
            .connection
            .send(DbRequest::delete(format!("/_api/database/{}", self.name)))
            .await?;
        if !response.is_success() {
            return Err(HarnessError::Protocol(format!(
                "dropping database '{}' failed with status {}",
                self.name, response.status
            )));
        }
        Ok(())
    }

    pub async fn collections(&self) -> HarnessResult<Vec<CollectionInfo>> {
        let request = DbRequest::get("/_api/collection").in_database(&self.name);
        let response = self.connection.send(request).await?;
        if !response.is_success() {
            return Err(HarnessError::Protocol(format!(
                "collection listing in '{}' failed with status {}",
                self.name, response.status
            )));
        }
        let list: CollectionList = response.json()?;
        Ok(list.result)
    }

    pub async fn collection_exists(&self, name: &str) -> HarnessResult<bool> {
        let request =
            DbRequest::get(format!("/_api/collection/{name}")).in_database(&self.name);
        let response = self.connection.send(request).await?;
        match response.status {
            404 => Ok(false),
            status if (200..300).contains(&status) => Ok(true),
            status => Err(HarnessError::Protocol(format!(
                "checking collection '{name}' failed with status {status}"
            ))),
        }
    }

    pub async fn create_collection(
        &self,
        name: &str,
        options: &CollectionOptions,
    ) -> HarnessResult<Collection> {
        let mut body = serde_json::to_value(options)?;
        body["name"] = json!(name);
        let request = DbRequest::post("/_api/collection", body).in_database(&self.name);
        let response = self.connection.send(request).await?;
        if !response.is_success() {
            return Err(HarnessError::Protocol(format!(
                "creating collection '{name}' failed with status {}",
                response.status
            )));
        }
        Ok(self.collection(name))
    }

    pub fn collection(&self, name: &str) -> Collection {
        Collection {
            connection: self.connection.clone(),
            database: self.name.clone(),
            name: name.to_owned(),
        }
    }
}

pub struct Collection {
    connection: Arc<dyn Connection>,
    database: String,
    name: String,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn remove(&self) -> HarnessResult<()> {
        let request = DbRequest::delete(format!("/_api/collection/{}", self.name))
            .in_database(&self.database);
        let response = self.connection.send(request).await?;
        if !response.is_success() {
            return Err(HarnessError::Protocol(format!(
                "dropping collection '{}' failed with status {}",
                self.name, response.status
            )));
        }
        Ok(())
    }
}
