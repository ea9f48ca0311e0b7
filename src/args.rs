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

use crate::client::Transport;
use crate::scenarios::ScenarioName;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cluster-harness",
    about = "Protocol test harness for a clustered database deployment"
)]
pub struct HarnessArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run scenarios, in order, against a live deployment
    Run(RunArgs),
    /// Drop fixtures left behind by an earlier run
    Cleanup(CleanupArgs),
    /// List available scenarios
    List,
}

#[derive(Parser)]
pub struct RunArgs {
    /// Scenarios to run
    #[arg(required = true)]
    pub scenarios: Vec<ScenarioName>,

    /// Transport protocol for scenario clients
    #[arg(long, default_value = "http1")]
    pub transport: Transport,

    /// Leave fixtures in place after a successful run
    #[arg(long)]
    pub keep_fixtures: bool,
}

#[derive(Parser)]
pub struct CleanupArgs {
    /// Drop only databases and system-database collections whose name
    /// starts with this prefix
    #[arg(long, default_value = "harness_")]
    pub prefix: String,
}
