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

//! Smoke-level scenarios exercising the harness itself: client
//! construction per transport, fixture churn, and a metrics read. Each
//! scenario is a plain async fn returning a result; the runner owns
//! cleanup and exit-code mapping.

use crate::check::{check, check_ok};
use crate::client::{build_client, Transport};
use crate::config::TestConfig;
use crate::driver::{CollectionOptions, DatabaseOptions};
use crate::error::HarnessResult;
use crate::fixtures::FixtureTracker;
use crate::metrics;
use clap::ValueEnum;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioName {
    Version,
    Metrics,
    Fixtures,
}

impl std::fmt::Display for ScenarioName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Version => write!(f, "version"),
            Self::Metrics => write!(f, "metrics"),
            Self::Fixtures => write!(f, "fixtures"),
        }
    }
}

pub fn greeting(message: &str) {
    info!("==========================================================");
    info!("Test starting: {message}");
    info!("==========================================================");
}

pub async fn run(
    name: ScenarioName,
    config: &TestConfig,
    tracker: &mut FixtureTracker,
    transport: Transport,
) -> HarnessResult<()> {
    match name {
        ScenarioName::Version => version_smoke(config, transport).await,
        ScenarioName::Metrics => metrics_read(config, transport).await,
        ScenarioName::Fixtures => fixture_churn(config, tracker, transport).await,
    }
}

async fn version_smoke(config: &TestConfig, transport: Transport) -> HarnessResult<()> {
    greeting(&format!("version smoke over {transport}"));
    let client = build_client(transport, config).await?;
    let version = check_ok(client.version().await, "Cannot fetch server version")?;
    check(
        !version.version.is_empty(),
        "Server reported an empty version",
    )?;
    info!(
        "Connected over {transport} to {} {} (topology {})",
        version.server, version.version, config.mode
    );
    Ok(())
}

async fn metrics_read(config: &TestConfig, transport: Transport) -> HarnessResult<()> {
    greeting(&format!("metrics read over {transport}"));
    let client = build_client(transport, config).await?;
    let snapshot = metrics::scrape(&client).await?;
    info!("Captured {} metric lines", snapshot.lines().len());
    // Individual values are informational; zero also means absent.
    snapshot.read_int_metric("server_uptime_seconds");
    snapshot.read_int_metric("http_requests_total");
    Ok(())
}

async fn fixture_churn(
    config: &TestConfig,
    tracker: &mut FixtureTracker,
    transport: Transport,
) -> HarnessResult<()> {
    greeting(&format!("fixture churn over {transport}"));
    let client = build_client(transport, config).await?;

    let db = tracker
        .ensure_database(&client, "harness_fixture_db", &DatabaseOptions::default())
        .await?;
    let options = CollectionOptions {
        number_of_shards: Some(3),
        replication_factor: Some(2),
        ..Default::default()
    };
    tracker
        .ensure_collection(&db, "harness_fixture_coll", &options)
        .await?;

    // Re-ensure with the same name: must drop the old database and leave
    // exactly one fresh instance behind.
    tracker
        .ensure_database(&client, "harness_fixture_db", &DatabaseOptions::default())
        .await?;
    let exists = check_ok(
        client.database_exists("harness_fixture_db").await,
        "Cannot check for database 'harness_fixture_db'",
    )?;
    check(exists, "Recreated database is missing")?;
    Ok(())
}
