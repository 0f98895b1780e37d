use crate::logs::{Direction, LogLine, LogQuery, LogSource};
use anyhow::{bail, Context as _, Result};
use itertools::Itertools;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Grafana Loki backed [`LogSource`].
pub struct LokiClient {
    http: reqwest::Client,
    base_url: String,
    selector: String,
}

impl LokiClient {
    pub fn new(base_url: &str, selector: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            selector: selector.to_string(),
        })
    }

    fn query_range_url(&self) -> String {
        format!("{}/loki/api/v1/query_range", self.base_url)
    }
}

impl LogSource for LokiClient {
    async fn query_range(&self, query: &LogQuery) -> Result<Vec<LogLine>> {
        let expr = logql(&self.selector, &query.contains_any);
        debug!("loki query {expr} over {:?}", query.window);
        let params = [
            ("query", expr),
            ("start", query.window.start.to_string()),
            ("end", query.window.end.to_string()),
            ("limit", query.limit.to_string()),
            ("direction", query.direction.as_str().to_string()),
        ];
        let res = self
            .http
            .get(self.query_range_url())
            .query(&params)
            .send()
            .await
            .context("Loki request failed")?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            bail!("Loki returned {status}: {body}");
        }
        let body: QueryResponse = res.json().await.context("Malformed Loki response")?;
        Ok(body.into_lines(query.direction))
    }
}

/// Builds a LogQL expression keeping lines that contain any of `needles`.
pub fn logql(selector: &str, needles: &[String]) -> String {
    match needles {
        [] => selector.to_string(),
        [needle] => format!("{selector} |= \"{}\"", escape_string(needle)),
        _ => {
            let alternation = needles.iter().map(|n| regex::escape(n)).join("|");
            format!("{selector} |~ \"{}\"", escape_string(&alternation))
        }
    }
}

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    data: QueryData,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<StreamResult>,
}

#[derive(Debug, Deserialize)]
struct StreamResult {
    #[serde(default)]
    values: Vec<(String, String)>,
}

impl QueryResponse {
    /// Flattens every stream into one oldest-first sequence.
    fn into_lines(self, direction: Direction) -> Vec<LogLine> {
        self.data
            .result
            .into_iter()
            .flat_map(|stream| {
                let mut values = stream.values;
                if direction == Direction::Backward {
                    values.reverse();
                }
                values
            })
            .filter_map(|(ts, text)| match ts.parse::<u64>() {
                Ok(timestamp) => Some(LogLine { timestamp, text }),
                Err(_) => {
                    warn!("skipping log line with bad timestamp {ts:?}");
                    None
                }
            })
            .sorted_by_key(|line| line.timestamp)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SELECTOR: &str = r#"{job="zomboid",source="server"}"#;

    #[test]
    fn single_needle_uses_line_filter() {
        assert_eq!(
            logql(SELECTOR, &["SERVER STARTED".to_string()]),
            r#"{job="zomboid",source="server"} |= "SERVER STARTED""#
        );
    }

    #[test]
    fn several_needles_use_regex_filter() {
        let needles = ["SERVER STARTED".to_string(), "Server exited".to_string()];
        assert_eq!(
            logql(SELECTOR, &needles),
            r#"{job="zomboid",source="server"} |~ "SERVER STARTED|Server exited""#
        );
    }

    #[test]
    fn regex_metacharacters_are_escaped_twice() {
        let needles = ["a.b".to_string(), "\"q\"".to_string()];
        assert_eq!(logql("{}", &needles), r#"{} |~ "a\\.b|\"q\"""#);
    }

    #[test]
    fn streams_are_merged_oldest_first() {
        let body = r#"{
            "status": "success",
            "data": {
                "resultType": "streams",
                "result": [
                    {"stream": {"job": "zomboid"}, "values": [["30", "c"], ["10", "a"]]},
                    {"stream": {"job": "zomboid", "level": "warn"}, "values": [["20", "b"]]}
                ]
            }
        }"#;
        let response: QueryResponse = serde_json::from_str(body).unwrap();
        let lines = response.into_lines(Direction::Backward);
        assert_eq!(
            lines,
            vec![LogLine::new(10, "a"), LogLine::new(20, "b"), LogLine::new(30, "c")]
        );
    }

    #[test]
    fn empty_and_malformed_results_mean_no_data() {
        let response: QueryResponse = serde_json::from_str(r#"{"data": {}}"#).unwrap();
        assert!(response.into_lines(Direction::Forward).is_empty());

        let response: QueryResponse =
            serde_json::from_str(r#"{"data": {"result": [{"values": [["nope", "x"], ["7", "y"]]}]}}"#)
                .unwrap();
        assert_eq!(response.into_lines(Direction::Forward), vec![LogLine::new(7, "y")]);
    }

    #[tokio::test]
    async fn unreachable_loki_is_an_error() {
        let client = LokiClient::new("http://127.0.0.1:9/", SELECTOR, Duration::from_secs(2)).unwrap();
        assert_eq!(client.query_range_url(), "http://127.0.0.1:9/loki/api/v1/query_range");
        let query = LogQuery::new(["SERVER STARTED"], crate::logs::LogWindow::new(0, 1));
        assert!(client.query_range(&query).await.is_err());
    }
}
