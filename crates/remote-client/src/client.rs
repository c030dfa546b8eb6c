//! reqwest-based client.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use sync_core::{DeletedPage, ListQuery, OutgoingRecord, RecordPage, RemoteClient, SaveResult};
use tracing::debug;

use crate::response::{parse_deleted_page, parse_record_page, parse_save_results};

/// Authorization scheme of the access token.
pub const AUTH_SCHEME: &str = "Zoho-oauthtoken";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client of one API base URL, e.g. `https://www.zohoapis.com/crm/v2`.
pub struct HttpRemoteClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpRemoteClient {
    pub fn new(base_url: &str, access_token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header(
                header::AUTHORIZATION,
                format!("{AUTH_SCHEME} {}", self.access_token),
            )
    }

    /// Send and return the body; 204 and 304 give an empty body.
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<String> {
        let response: Response = request
            .send()
            .await
            .with_context(|| format!("Failed to {what}"))?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
            return Ok(String::new());
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read response to {what}"))?;
        // Per-record rejections may come back as 400 with a normal envelope.
        if !status.is_success() && !(status == StatusCode::BAD_REQUEST && body.contains("\"data\"")) {
            bail!("Failed to {what}: HTTP {status}: {}", truncate(&body, 500));
        }
        Ok(body)
    }

    async fn save_group(
        &self,
        module: &str,
        method: Method,
        records: Vec<OutgoingRecord>,
    ) -> Result<Vec<SaveResult>> {
        let count = records.len();
        let data: Vec<Value> = records.into_iter().map(record_body).collect();
        let what = format!("save {count} {module} records");
        debug!("{method} {module} with {count} records");

        let body = self
            .send(
                self.request(method, module).json(&json!({ "data": data })),
                &what,
            )
            .await?;
        parse_save_results(&body, count).with_context(|| format!("Failed to {what}"))
    }
}

fn truncate(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

fn since_header(since: DateTime<Utc>) -> String {
    since.to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn record_body(record: OutgoingRecord) -> Value {
    let mut fields = record.fields;
    if let Some(id) = record.id {
        fields.insert("id".to_string(), Value::String(id));
    }
    Value::Object(fields)
}

fn list_params(query: &ListQuery) -> Vec<(&'static str, String)> {
    vec![
        ("page", query.page.to_string()),
        ("per_page", query.page_size.to_string()),
        ("sort_by", query.sort_by.clone()),
        ("sort_order", query.order.as_str().to_string()),
    ]
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn list_records(&self, module: &str, query: &ListQuery) -> Result<RecordPage> {
        let mut request = self
            .request(Method::GET, module)
            .query(&list_params(query));
        if let Some(since) = query.modified_since {
            request = request.header(header::IF_MODIFIED_SINCE, since_header(since));
        }
        let body = self
            .send(request, &format!("list page {} of {module}", query.page))
            .await?;
        parse_record_page(&body)
    }

    async fn list_deleted_ids(
        &self,
        module: &str,
        modified_since: Option<DateTime<Utc>>,
        page: u32,
        page_size: u32,
    ) -> Result<DeletedPage> {
        let mut request = self
            .request(Method::GET, &format!("{module}/deleted"))
            .query(&[
                ("type", "all".to_string()),
                ("page", page.to_string()),
                ("per_page", page_size.to_string()),
            ]);
        if let Some(since) = modified_since {
            request = request.header(header::IF_MODIFIED_SINCE, since_header(since));
        }
        let body = self
            .send(request, &format!("list deleted {module} records"))
            .await?;
        parse_deleted_page(&body)
    }

    async fn save_records(
        &self,
        module: &str,
        records: Vec<OutgoingRecord>,
    ) -> Result<Vec<SaveResult>> {
        // Inserts are POSTed, updates PUT; results are put back in input order.
        let (inserts, updates): (Vec<_>, Vec<_>) = records
            .into_iter()
            .enumerate()
            .partition(|(_, r)| r.is_insert());

        let mut results: Vec<(usize, SaveResult)> = Vec::new();
        for (method, group) in [(Method::POST, inserts), (Method::PUT, updates)] {
            if group.is_empty() {
                continue;
            }
            let (positions, records): (Vec<usize>, Vec<OutgoingRecord>) = group.into_iter().unzip();
            let saved = self.save_group(module, method, records).await?;
            results.extend(positions.into_iter().zip(saved));
        }

        results.sort_by_key(|(position, _)| *position);
        Ok(results.into_iter().map(|(_, result)| result).collect())
    }

    async fn delete_record(&self, module: &str, id: &str) -> Result<()> {
        let what = format!("delete {module} record {id}");
        let body = self
            .send(self.request(Method::DELETE, &format!("{module}/{id}")), &what)
            .await?;
        if body.is_empty() {
            return Ok(());
        }
        match parse_save_results(&body, 1)
            .with_context(|| format!("Failed to {what}"))?
            .pop()
        {
            Some(SaveResult::Failure { message }) => bail!("Failed to {what}: {message}"),
            _ => Ok(()),
        }
    }
}
