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

//! Assertion primitives. Both return an error value instead of terminating
//! in place; the runner is the single point that performs cleanup and maps
//! the error to a process exit code. A scenario that trips one of these
//! never resumes past the `?`.

use crate::error::{HarnessError, HarnessResult};
use std::panic::Location;

#[track_caller]
pub fn check(condition: bool, message: &str) -> HarnessResult<()> {
    if condition {
        return Ok(());
    }
    let location = Location::caller();
    Err(HarnessError::Assertion {
        location: format!("{}:{}", location.file(), location.line()),
        message: message.to_owned(),
    })
}

#[track_caller]
pub fn check_ok<T, E: std::fmt::Display>(result: Result<T, E>, message: &str) -> HarnessResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(cause) => {
            let location = Location::caller();
            Err(HarnessError::UnexpectedError {
                location: format!("{}:{}", location.file(), location.line()),
                message: message.to_owned(),
                cause: cause.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EXIT_ASSERTION_FAILED, EXIT_UNEXPECTED_ERROR};

    #[test]
    fn check_passes_on_true() {
        assert!(check(true, "never shown").is_ok());
    }

    #[test]
    fn check_reports_caller_location_and_message() {
        let err = check(false, "count mismatch").unwrap_err();
        assert_eq!(err.exit_code(), EXIT_ASSERTION_FAILED);
        let rendered = err.to_string();
        assert!(rendered.contains("check.rs:"));
        assert!(rendered.contains("Assertion failure: count mismatch"));
    }

    #[test]
    fn check_ok_passes_value_through() {
        let value = check_ok(Ok::<_, std::io::Error>(7), "never shown").unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn check_ok_wraps_error_with_cause() {
        let io: Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"));
        let err = check_ok(io, "Cannot create database 'x'").unwrap_err();
        assert_eq!(err.exit_code(), EXIT_UNEXPECTED_ERROR);
        let rendered = err.to_string();
        assert!(rendered.contains("disk on fire"));
        assert!(rendered.contains("Cannot create database 'x'"));
    }
}
