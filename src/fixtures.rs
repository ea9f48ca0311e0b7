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

use crate::check::check_ok;
use crate::client::{build_client, Transport};
use crate::config::TestConfig;
use crate::driver::{
    Collection, CollectionOptions, Database, DatabaseOptions, DbClient, SYSTEM_DATABASE,
};
use crate::error::HarnessResult;
use tracing::warn;

/// Registry of databases and collections created during a run. Owned by the
/// test-run driver and threaded through scenarios by `&mut`, so the
/// exclusive-mutation rule is enforced by the type system rather than by a
/// lock. Lists are append-only; only the cleanup sweep consumes them.
#[derive(Debug, Default)]
pub struct FixtureTracker {
    databases: Vec<String>,
    collections: Vec<String>,
}

impl FixtureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop-then-create: always yields a fresh, empty database with the
    /// requested options, so calling twice with the same name succeeds both
    /// times and leaves exactly one database behind. The name is recorded
    /// for cleanup on every successful create.
    pub async fn ensure_database(
        &mut self,
        client: &DbClient,
        name: &str,
        options: &DatabaseOptions,
    ) -> HarnessResult<Database> {
        let exists = check_ok(
            client.database_exists(name).await,
            &format!("Cannot check for database '{name}'"),
        )?;
        if exists {
            check_ok(
                client.database(name).remove().await,
                &format!("Cannot drop database '{name}'"),
            )?;
        }
        let database = check_ok(
            client.create_database(name, options).await,
            &format!("Cannot create database '{name}'"),
        )?;
        self.databases.push(name.to_owned());
        Ok(database)
    }

    /// Same drop-then-create idempotency within `db`. The name is recorded
    /// only when `db` is the system database by exact name; collections in
    /// test-created databases disappear with their parent's drop.
    pub async fn ensure_collection(
        &mut self,
        db: &Database,
        name: &str,
        options: &CollectionOptions,
    ) -> HarnessResult<Collection> {
        let exists = check_ok(
            db.collection_exists(name).await,
            &format!("Cannot check for collection '{name}'"),
        )?;
        if exists {
            check_ok(
                db.collection(name).remove().await,
                &format!("Cannot drop collection '{name}'"),
            )?;
        }
        let collection = check_ok(
            db.create_collection(name, options).await,
            &format!("Cannot create collection '{name}'"),
        )?;
        if db.is_system() {
            self.collections.push(name.to_owned());
        }
        Ok(collection)
    }

    /// Best-effort sweep over everything recorded. Rebuilds an HTTP/1.1
    /// client from freshly-reloaded configuration: cleanup may run from a
    /// failure context where no existing handle can be trusted. Every drop
    /// error is swallowed, and the lists are left intact so a repeated
    /// sweep re-attempts drops of names whose objects are already gone.
    pub async fn cleanup_all(&self) {
        let config = match TestConfig::from_env() {
            Ok(config) => config,
            Err(e) => {
                warn!("Cleanup skipped, configuration unavailable: {e}");
                return;
            }
        };
        let client = match build_client(Transport::Http1, &config).await {
            Ok(client) => client,
            Err(e) => {
                warn!("Cleanup skipped, cannot build client: {e}");
                return;
            }
        };
        for name in &self.databases {
            if let Err(e) = client.database(name).remove().await {
                warn!("Cleanup: failed to drop database '{name}': {e}");
            }
        }
        let system = client.database(SYSTEM_DATABASE);
        for name in &self.collections {
            if let Err(e) = system.collection(name).remove().await {
                warn!("Cleanup: failed to drop collection '{name}': {e}");
            }
        }
    }

    pub fn database_names(&self) -> &[String] {
        &self.databases
    }

    pub fn collection_names(&self) -> &[String] {
        &self.collections
    }
}

/// Drop every database, and every non-system collection in the system
/// database, whose name starts with `prefix`. This is the external cleanup
/// entry point for fixtures left behind by an earlier run (`--keep-fixtures`
/// or a killed process), where no in-memory registry survives. Drop errors
/// are absorbed.
pub async fn cleanup_prefixed(client: &DbClient, prefix: &str) {
    match client.databases().await {
        Ok(names) => {
            for name in names.iter().filter(|name| name.starts_with(prefix)) {
                if let Err(e) = client.database(name).remove().await {
                    warn!("Cleanup: failed to drop database '{name}': {e}");
                }
            }
        }
        Err(e) => warn!("Cleanup: cannot list databases: {e}"),
    }
    let system = client.database(SYSTEM_DATABASE);
    match system.collections().await {
        Ok(collections) => {
            for info in collections
                .iter()
                .filter(|info| !info.is_system && info.name.starts_with(prefix))
            {
                if let Err(e) = system.collection(&info.name).remove().await {
                    warn!("Cleanup: failed to drop collection '{}': {e}", info.name);
                }
            }
        }
        Err(e) => warn!("Cleanup: cannot list collections: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DbResponse, Method, MockConnection};
    use bytes::Bytes;
    use serde_json::json;
    use serial_test::serial;
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex};

    /// In-memory server state behind the mock connection, so drop-then-create
    /// sequencing is observable end to end for databases and collections.
    #[derive(Debug, Default)]
    struct ServerState {
        databases: BTreeSet<String>,
        /// (database name, collection name)
        collections: BTreeSet<(String, String)>,
    }

    fn fake_server(state: Arc<Mutex<ServerState>>) -> DbClient {
        let mut mock = MockConnection::new();
        mock.expect_endpoint()
            .return_const("http://localhost:8529".to_owned());
        mock.expect_send().returning(move |request| {
            let mut state = state.lock().unwrap();
            let ok = |body: serde_json::Value| {
                Ok(DbResponse {
                    status: 200,
                    body: Bytes::from(serde_json::to_vec(&body).unwrap()),
                })
            };
            let error = |code: u16| {
                Ok(DbResponse {
                    status: code,
                    body: Bytes::new(),
                })
            };
            let database = if request.database.is_empty() {
                SYSTEM_DATABASE.to_owned()
            } else {
                request.database.clone()
            };
            match (request.method, request.path.as_str()) {
                (Method::Get, "/_api/database") => {
                    ok(json!({ "result": state.databases.iter().collect::<Vec<_>>() }))
                }
                (Method::Post, "/_api/database") => {
                    let name = request.body.as_ref().unwrap()["name"]
                        .as_str()
                        .unwrap()
                        .to_owned();
                    if state.databases.insert(name) {
                        ok(json!({ "result": true }))
                    } else {
                        error(409)
                    }
                }
                (Method::Delete, path) if path.starts_with("/_api/database/") => {
                    let name = path.trim_start_matches("/_api/database/").to_owned();
                    if state.databases.remove(&name) {
                        // collections vanish with their parent database
                        state.collections.retain(|(db, _)| db != &name);
                        ok(json!({ "result": true }))
                    } else {
                        error(404)
                    }
                }
                (Method::Get, "/_api/collection") => {
                    let listed: Vec<_> = state
                        .collections
                        .iter()
                        .filter(|(db, _)| *db == database)
                        .map(|(_, name)| json!({ "name": name, "isSystem": false }))
                        .collect();
                    ok(json!({ "result": listed }))
                }
                (Method::Get, path) if path.starts_with("/_api/collection/") => {
                    let name = path.trim_start_matches("/_api/collection/").to_owned();
                    if state.collections.contains(&(database, name.clone())) {
                        ok(json!({ "name": name }))
                    } else {
                        error(404)
                    }
                }
                (Method::Post, "/_api/collection") => {
                    let name = request.body.as_ref().unwrap()["name"]
                        .as_str()
                        .unwrap()
                        .to_owned();
                    if state.collections.insert((database, name)) {
                        ok(json!({ "result": true }))
                    } else {
                        error(409)
                    }
                }
                (Method::Delete, path) if path.starts_with("/_api/collection/") => {
                    let name = path.trim_start_matches("/_api/collection/").to_owned();
                    if state.collections.remove(&(database, name)) {
                        ok(json!({ "result": true }))
                    } else {
                        error(404)
                    }
                }
                _ => error(404),
            }
        });
        DbClient::new(Arc::new(mock)).unwrap()
    }

    #[tokio::test]
    async fn ensure_database_is_idempotent_under_recreation() {
        let state = Arc::new(Mutex::new(ServerState::default()));
        let client = fake_server(state.clone());
        let mut tracker = FixtureTracker::new();

        tracker
            .ensure_database(&client, "fx_db", &DatabaseOptions::default())
            .await
            .unwrap();
        tracker
            .ensure_database(&client, "fx_db", &DatabaseOptions::default())
            .await
            .unwrap();

        // Exactly one database of that name exists afterwards.
        let state = state.lock().unwrap();
        assert_eq!(state.databases.iter().collect::<Vec<_>>(), vec!["fx_db"]);
        // The tracker records every successful create, duplicates included.
        assert_eq!(tracker.database_names(), ["fx_db", "fx_db"]);
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent_under_recreation() {
        let state = Arc::new(Mutex::new(ServerState::default()));
        let client = fake_server(state.clone());
        let mut tracker = FixtureTracker::new();
        let system = client.database(SYSTEM_DATABASE);

        tracker
            .ensure_collection(&system, "fx_coll", &CollectionOptions::default())
            .await
            .unwrap();
        // The second ensure must drop the existing collection first: the
        // fake server rejects a duplicate create with 409.
        tracker
            .ensure_collection(&system, "fx_coll", &CollectionOptions::default())
            .await
            .unwrap();

        let state = state.lock().unwrap();
        assert_eq!(
            state.collections.iter().collect::<Vec<_>>(),
            vec![&(SYSTEM_DATABASE.to_owned(), "fx_coll".to_owned())]
        );
        assert_eq!(tracker.collection_names(), ["fx_coll", "fx_coll"]);
    }

    #[tokio::test]
    async fn collections_tracked_only_in_the_system_database() {
        let state = Arc::new(Mutex::new(ServerState {
            databases: BTreeSet::from(["other".to_owned()]),
            ..Default::default()
        }));
        let client = fake_server(state);
        let mut tracker = FixtureTracker::new();

        let system = client.database(SYSTEM_DATABASE);
        tracker
            .ensure_collection(&system, "fx_sys_coll", &CollectionOptions::default())
            .await
            .unwrap();

        let other = client.database("other");
        tracker
            .ensure_collection(&other, "fx_other_coll", &CollectionOptions::default())
            .await
            .unwrap();

        assert_eq!(tracker.collection_names(), ["fx_sys_coll"]);
    }

    #[tokio::test]
    async fn prefixed_sweep_drops_only_matching_fixtures() {
        let state = Arc::new(Mutex::new(ServerState {
            databases: BTreeSet::from(["harness_old_db".to_owned(), "keep_me".to_owned()]),
            collections: BTreeSet::from([
                (SYSTEM_DATABASE.to_owned(), "harness_old_coll".to_owned()),
                (SYSTEM_DATABASE.to_owned(), "payload".to_owned()),
            ]),
        }));
        let client = fake_server(state.clone());

        cleanup_prefixed(&client, "harness_").await;
        // A second sweep finds nothing prefixed and must also return
        // normally.
        cleanup_prefixed(&client, "harness_").await;

        let state = state.lock().unwrap();
        assert_eq!(state.databases.iter().collect::<Vec<_>>(), vec!["keep_me"]);
        assert_eq!(
            state.collections.iter().collect::<Vec<_>>(),
            vec![&(SYSTEM_DATABASE.to_owned(), "payload".to_owned())]
        );
    }

    #[tokio::test]
    #[serial]
    async fn repeated_cleanup_absorbs_all_drop_failures() {
        std::env::set_var("TEST_ENDPOINTS", "http://127.0.0.1:1");
        std::env::set_var("TEST_AUTHENTICATION", "none");
        std::env::set_var("TEST_JWTSECRET", "unused");
        std::env::set_var("TEST_MODE", "single");
        std::env::set_var("TEST_AGENTS", "http://127.0.0.1:1");
        std::env::set_var("TEST_DBSERVERS", "http://127.0.0.1:1");
        std::env::set_var("TEST_COORDINATORS", "http://127.0.0.1:1");

        let mut tracker = FixtureTracker::default();
        tracker.databases.push("gone_db".to_owned());
        tracker.collections.push("gone_coll".to_owned());

        // The endpoint refuses connections, so every drop fails; both
        // sweeps must return normally and leave the lists untouched.
        tracker.cleanup_all().await;
        tracker.cleanup_all().await;
        assert_eq!(tracker.database_names(), ["gone_db"]);
        assert_eq!(tracker.collection_names(), ["gone_coll"]);
    }

    #[tokio::test]
    #[serial]
    async fn cleanup_without_configuration_is_a_no_op() {
        std::env::remove_var("TEST_ENDPOINTS");
        std::env::remove_var("TEST_AUTHENTICATION");
        let tracker = FixtureTracker::new();
        tracker.cleanup_all().await;
    }
}
