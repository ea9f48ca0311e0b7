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

use crate::driver::{DbClient, DbRequest, METRICS_PATH};
use crate::error::HarnessResult;
use bytes::Bytes;
use tracing::{info, warn};

/// One scrape of the metrics endpoint, split into raw text lines. Immutable
/// after construction; lookups are a linear scan, first match wins.
#[derive(Debug, Default)]
pub struct MetricsSnapshot {
    lines: Vec<String>,
}

/// Issue a single GET against the metrics path and capture the raw body.
/// A non-2xx status or unexpected content type is normal here and the body
/// is kept regardless; only a transport-level failure yields an empty
/// snapshot (logged, not fatal).
pub async fn scrape(client: &DbClient) -> HarnessResult<MetricsSnapshot> {
    let body = match client.connection().send(DbRequest::get(METRICS_PATH)).await {
        Ok(response) => response.body,
        Err(e) => {
            warn!("Metrics scrape failed: {e}");
            Bytes::new()
        }
    };
    Ok(MetricsSnapshot::from_body(&body))
}

impl MetricsSnapshot {
    /// Split on line feeds. A trailing partial line without a final `\n`
    /// is dropped.
    pub fn from_body(body: &[u8]) -> Self {
        let mut lines = Vec::new();
        let mut start = 0;
        for (i, byte) in body.iter().enumerate() {
            if *byte == b'\n' {
                lines.push(String::from_utf8_lossy(&body[start..i]).into_owned());
                start = i + 1;
            }
        }
        Self { lines }
    }

    /// First line whose prefix equals `metric_name` (and which is strictly
    /// longer, so a separator follows) wins; its second space-delimited
    /// token is parsed as a base-10 integer. Absent metric or unparseable
    /// value both read as zero; callers that must tell zero from absent
    /// need a different mechanism.
    pub fn read_int_metric(&self, metric_name: &str) -> i64 {
        for line in &self.lines {
            if line.len() > metric_name.len() && line.starts_with(metric_name) {
                let token = line.split(' ').nth(1).unwrap_or("");
                let value = token.parse::<i64>().unwrap_or(0);
                info!("Metric {metric_name} : {value}");
                return value;
            }
        }
        0
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(body: &str) -> MetricsSnapshot {
        MetricsSnapshot::from_body(body.as_bytes())
    }

    #[test]
    fn first_matching_line_wins() {
        let snap = snapshot("foo_bar 42\nfoo_barbaz 7\n");
        assert_eq!(snap.read_int_metric("foo_bar"), 42);
    }

    #[test]
    fn missing_metric_reads_as_zero() {
        let snap = snapshot("foo_bar 42\n");
        assert_eq!(snap.read_int_metric("missing_metric"), 0);
    }

    #[test]
    fn unparseable_value_reads_as_zero() {
        let snap = snapshot("foo_bar notanumber\n");
        assert_eq!(snap.read_int_metric("foo_bar"), 0);
    }

    #[test]
    fn line_equal_to_name_does_not_match() {
        // Strictly-longer rule: a bare name with no separator is skipped.
        let snap = snapshot("foo_bar\nfoo_bar 9\n");
        assert_eq!(snap.read_int_metric("foo_bar"), 9);
    }

    #[test]
    fn trailing_partial_line_is_dropped() {
        let snap = snapshot("foo_bar 42\npartial_line 7");
        assert_eq!(snap.lines().len(), 1);
        assert_eq!(snap.read_int_metric("partial_line"), 0);
    }

    #[test]
    fn empty_body_yields_empty_snapshot() {
        assert!(snapshot("").is_empty());
    }

    #[test]
    fn exposition_comments_and_extra_tokens_are_tolerated() {
        let snap = snapshot("# HELP requests_total Total requests\nrequests_total 5 1700000000\n");
        assert_eq!(snap.read_int_metric("requests_total"), 5);
    }
}
