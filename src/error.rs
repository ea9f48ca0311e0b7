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

use thiserror::Error;

pub const EXIT_NO_ENVIRONMENT: i32 = 1;
pub const EXIT_NO_CONNECTION: i32 = 2;
pub const EXIT_NO_CLIENT: i32 = 3;
pub const EXIT_ASSERTION_FAILED: i32 = 100;
pub const EXIT_UNEXPECTED_ERROR: i32 = 101;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Did not find {0} in the environment")]
    MissingEnv(String),

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Could not create client connection: {message}")]
    Connection { message: String },

    #[error("Could not create client: {message}")]
    Client { message: String },

    #[error("{location}: Assertion failure: {message}")]
    Assertion { location: String, message: String },

    #[error("{location}: Expected no error but got: {cause}, {message}")]
    UnexpectedError {
        location: String,
        message: String,
        cause: String,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HarnessError {
    /// Process exit status for this error. The runner maps every fatal error
    /// to one of these codes so that the surrounding test driver can tell the
    /// failure classes apart.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingEnv(_) | Self::Config { .. } => EXIT_NO_ENVIRONMENT,
            Self::Connection { .. } => EXIT_NO_CONNECTION,
            Self::Client { .. } => EXIT_NO_CLIENT,
            Self::Assertion { .. } => EXIT_ASSERTION_FAILED,
            Self::UnexpectedError { .. } | Self::Protocol(_) | Self::Io(_) | Self::Serialization(_) => {
                EXIT_UNEXPECTED_ERROR
            }
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
