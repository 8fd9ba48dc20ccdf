// SPDX-License-Identifier: Apache-2.0

use crate::checkrun::{CheckConclusion, CheckRunHost, CheckRunOutput};
use async_trait::async_trait;
use custodian_core::Error;
use serde_json::{json, Value};

/// HTTP client for the hosted check-run API.
pub struct HostedCheckClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HostedCheckClient {
    #[must_use]
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    fn output_payload(output: &CheckRunOutput) -> Value {
        let annotations: Vec<Value> = output
            .annotations
            .iter()
            .map(|a| {
                json!({
                    "path": &a.path,
                    "start_line": a.start_line,
                    "end_line": a.end_line,
                    "annotation_level": a.level,
                    "message": &a.message,
                    "title": &a.title,
                })
            })
            .collect();
        let actions: Vec<Value> = output
            .actions
            .iter()
            .map(|action| {
                json!({
                    "identifier": action.identifier(),
                    "label": action.label(),
                    "description": action.description(),
                })
            })
            .collect();
        json!({
            "output": {
                "title": &output.title,
                "summary": &output.summary,
                "text": &output.text,
                "annotations": annotations,
            },
            "actions": actions,
        })
    }
}

#[async_trait]
impl CheckRunHost for HostedCheckClient {
    async fn start_check_run(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        check_name: &str,
    ) -> Result<String, Error> {
        let url = format!("{}/repos/{owner}/{repo}/check-runs", self.base_url);
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&json!({"name": check_name, "head_sha": sha, "status": "in_progress"}))
            .send()
            .await
            .map_err(|e| Error::downstream(format!("start check-run failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::downstream(format!(
                "start check-run returned {}",
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::downstream(format!("start check-run body unreadable: {e}")))?;
        body.get("id")
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .ok_or_else(|| Error::downstream("start check-run response missing id"))
    }

    async fn conclude_check_run(
        &self,
        owner: &str,
        repo: &str,
        check_run_id: &str,
        conclusion: CheckConclusion,
        output: &CheckRunOutput,
    ) -> Result<(), Error> {
        let url = format!(
            "{}/repos/{owner}/{repo}/check-runs/{check_run_id}",
            self.base_url
        );
        let mut payload = Self::output_payload(output);
        payload["status"] = json!("completed");
        payload["conclusion"] = json!(conclusion.as_str());
        let response = self
            .request(reqwest::Method::PATCH, url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::downstream(format!("conclude check-run failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::downstream(format!(
                "conclude check-run returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
