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

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

mod args;
mod check;
mod client;
mod config;
mod driver;
mod error;
mod fixtures;
mod metrics;
mod runner;
mod scenarios;

use args::{Command, HarnessArgs};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = HarnessArgs::parse();
    let code = match args.command {
        Command::Run(run_args) => runner::Runner::new(run_args).run().await,
        Command::Cleanup(cleanup_args) => runner::cleanup(cleanup_args).await,
        Command::List => {
            for scenario in scenarios::ScenarioName::value_variants() {
                println!("{scenario}");
            }
            0
        }
    };
    std::process::exit(code);
}
