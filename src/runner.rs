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

use crate::args::{CleanupArgs, RunArgs};
use crate::client::{build_client, Transport};
use crate::config::TestConfig;
use crate::fixtures::{self, FixtureTracker};
use crate::scenarios;
use tracing::{error, info};

/// Thin wrapper around the scenarios: owns the fixture tracker, turns any
/// error into one cleanup sweep plus the error's exit code, and performs
/// the final sweep after a successful run unless fixtures are kept.
pub struct Runner {
    args: RunArgs,
}

impl Runner {
    pub fn new(args: RunArgs) -> Self {
        Self { args }
    }

    pub async fn run(self) -> i32 {
        let config = match TestConfig::from_env() {
            Ok(config) => config,
            Err(e) => {
                error!("{e}");
                return e.exit_code();
            }
        };

        let mut tracker = FixtureTracker::new();
        for scenario in &self.args.scenarios {
            if let Err(e) = scenarios::run(*scenario, &config, &mut tracker, self.args.transport).await
            {
                error!("{e}");
                // Single-shot cleanup; drop failures inside are absorbed.
                tracker.cleanup_all().await;
                return e.exit_code();
            }
            info!("Scenario '{scenario}' passed");
        }

        if self.args.keep_fixtures {
            info!(
                "Keeping fixtures: {} databases, {} collections",
                tracker.database_names().len(),
                tracker.collection_names().len()
            );
        } else {
            tracker.cleanup_all().await;
        }
        0
    }
}

/// External cleanup entry point: no in-memory registry from a previous
/// process exists, so the sweep goes by fixture name prefix over a fresh
/// HTTP/1.1 client.
pub async fn cleanup(args: CleanupArgs) -> i32 {
    let config = match TestConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return e.exit_code();
        }
    };
    let client = match build_client(Transport::Http1, &config).await {
        Ok(client) => client,
        Err(e) => {
            error!("{e}");
            return e.exit_code();
        }
    };
    fixtures::cleanup_prefixed(&client, &args.prefix).await;
    info!("Cleanup sweep for prefix '{}' finished", args.prefix);
    0
}
