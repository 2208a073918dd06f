use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::error::CrmError;
use super::retry::RetryPolicy;
use crate::cli::CrmArgs;

/// Uploads larger than this are refused before any request is made.
const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseQuery {
    pub ssn_last_4: String,
    pub last_name: String,
    pub first_name: Option<String>,
}

impl CaseQuery {
    /// Splits a full name: the last token is the surname, the first token is
    /// the given name when there are at least two tokens.
    pub fn from_taxpayer(ssn_last_4: &str, name: &str) -> Option<Self> {
        let tokens: Vec<&str> = name.split_whitespace().collect();
        let last_name = tokens.last()?;
        let first_name = (tokens.len() >= 2).then(|| tokens[0].to_string());
        Some(Self {
            ssn_last_4: ssn_last_4.to_string(),
            last_name: (*last_name).to_string(),
            first_name,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseHit {
    pub case_id: String,
    pub taxpayer_name: Option<String>,
    pub match_type: Option<String>,
    pub name_similarity: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CaseMatchRequest<'a> {
    last_name: &'a str,
    #[serde(rename = "last4SSN")]
    last_4_ssn: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<&'a str>,
}

/// Case lookup seam; the matcher only needs this one call.
#[async_trait]
pub trait CaseSearch: Send + Sync {
    async fn search_case(&self, query: &CaseQuery) -> Result<Option<CaseHit>, CrmError>;
}

#[derive(Debug, Clone)]
pub struct CrmConfig {
    pub base_url: String,
    pub api_key: String,
    pub secret_token: Option<String>,
    pub case_match_path: String,
    pub document_path: String,
    pub task_path: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl CrmConfig {
    pub fn from_args(args: &CrmArgs) -> Result<Self> {
        let api_key = args
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .context("CRM API key is not set (use --api-key or LOGIQS_API_KEY)")?;

        Ok(Self {
            base_url: args.crm_base_url.trim_end_matches('/').to_string(),
            api_key,
            secret_token: args
                .secret_token
                .clone()
                .filter(|token| !token.trim().is_empty()),
            case_match_path: args.case_match_path.clone(),
            document_path: args.document_path.clone(),
            task_path: args.task_path.clone(),
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            retry: RetryPolicy::with_max_retries(args.max_retries),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub case_id: String,
    pub letter_type: String,
    pub tax_year: String,
    pub last_name: String,
    pub ssn_last_4: String,
    pub due_date: NaiveDate,
}

pub struct CrmClient {
    client: Client,
    config: CrmConfig,
}

impl CrmClient {
    pub fn new(config: CrmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build CRM HTTP client")?;
        info!(base_url = %config.base_url, "CRM client ready");
        Ok(Self { client, config })
    }

    pub fn has_secret_token(&self) -> bool {
        self.config.secret_token.is_some()
    }

    /// Multipart upload of one PDF under `upload_name`; returns the HTTP status.
    pub async fn upload_document(
        &self,
        case_id: &str,
        path: &Path,
        upload_name: &str,
        comment: &str,
    ) -> Result<u16, CrmError> {
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() == 0 {
            return Err(CrmError::UnexpectedResponse(format!(
                "refusing to upload empty file {}",
                path.display()
            )));
        }
        if metadata.len() > MAX_UPLOAD_BYTES {
            return Err(CrmError::UnexpectedResponse(format!(
                "{} is {} bytes, above the {} byte upload limit",
                path.display(),
                metadata.len(),
                MAX_UPLOAD_BYTES
            )));
        }
        let bytes = tokio::fs::read(path).await?;

        let url = self.config.url(&self.config.document_path);
        let query = [
            ("apikey", self.config.api_key.as_str()),
            ("CaseID", case_id),
            ("Comment", comment),
        ];
        let client = &self.client;
        let url = &url;
        let query = &query;
        let bytes = &bytes;

        self.config
            .retry
            .run("upload_document", move || async move {
                let part = Part::bytes(bytes.clone())
                    .file_name(upload_name.to_string())
                    .mime_str("application/pdf")?;
                let form = Form::new().part("file", part);
                let response = client
                    .post(url.as_str())
                    .query(query)
                    .multipart(form)
                    .send()
                    .await?;
                let response = ensure_success(response).await?;
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                debug!(case_id, status, body = %body.trim(), "document upload accepted");
                Ok::<_, CrmError>(status)
            })
            .await
    }

    /// Creates the follow-up task and returns the CRM task id when present.
    pub async fn create_task(&self, request: &TaskRequest) -> Result<Option<String>, CrmError> {
        let secret = self.config.secret_token.as_deref().ok_or_else(|| {
            CrmError::UnexpectedResponse("CRM secret token is required for task creation".into())
        })?;

        let url = self.config.url(&self.config.task_path);
        let payload = task_payload(request);
        let client = &self.client;
        let url = &url;
        let payload = &payload;
        let api_key = self.config.api_key.as_str();

        let body = self
            .config
            .retry
            .run("create_task", move || async move {
                let response = client
                    .post(url.as_str())
                    .basic_auth(api_key, Some(secret))
                    .json(payload)
                    .send()
                    .await?;
                read_json(response).await
            })
            .await?;

        let task_id = ["Data", "data"]
            .iter()
            .find_map(|key| body.get(key).and_then(|data| data.get("TaskID")))
            .and_then(scalar_string);
        if task_id.is_none() {
            warn!(case_id = %request.case_id, "task created but response carried no TaskID");
        }
        Ok(task_id)
    }
}

#[async_trait]
impl CaseSearch for CrmClient {
    async fn search_case(&self, query: &CaseQuery) -> Result<Option<CaseHit>, CrmError> {
        let url = self.config.url(&self.config.case_match_path);
        let request = CaseMatchRequest {
            last_name: query.last_name.trim(),
            last_4_ssn: &query.ssn_last_4,
            first_name: query.first_name.as_deref().map(str::trim),
        };
        debug!(
            last_name = %query.last_name,
            ssn = %format!("***-**-{}", query.ssn_last_4),
            "searching CRM case"
        );

        let client = &self.client;
        let url = &url;
        let request = &request;
        let api_key = self.config.api_key.as_str();

        let body = self
            .config
            .retry
            .run("search_case", move || async move {
                let response = client
                    .post(url.as_str())
                    .header("X-Api-Key", api_key)
                    .json(request)
                    .send()
                    .await?;
                read_json(response).await
            })
            .await?;

        parse_case_match(&body)
    }
}

/// Task body in the CRM's field naming. Due at midnight UTC, reminder at 09:00.
pub fn task_payload(request: &TaskRequest) -> Value {
    let case_id = request
        .case_id
        .parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(request.case_id.clone()));
    let due = request.due_date.format("%Y-%m-%d");

    json!({
        "CaseID": case_id,
        "Subject": format!("Review IRS {} Notice - {}", request.letter_type, request.tax_year),
        "Reminder": format!("{due}T09:00:00Z"),
        "TaskType": 1,
        "DueDate": format!("{due}T00:00:00Z"),
        "UserID": [],
        "PriorityID": 2,
        "StatusID": 0,
        "Comments": format!(
            "IRS CP2000 document uploaded for {}. Tax Year: {}. SSN Last 4: {}. Please review and respond before due date.",
            request.last_name, request.tax_year, request.ssn_last_4
        ),
    })
}

/// Reads a case-match body. `matchFound` is authoritative when present; the
/// older `case_id` and `cases[]` shapes are still accepted.
pub fn parse_case_match(body: &Value) -> Result<Option<CaseHit>, CrmError> {
    let object = body.as_object().ok_or_else(|| {
        CrmError::UnexpectedResponse(format!("case search returned non-object JSON: {body}"))
    })?;

    match object.get("matchFound").and_then(Value::as_bool) {
        Some(true) => {
            let data = object.get("caseData").and_then(|case| case.get("data"));
            let case_id = data.and_then(|data| data.get("CaseID")).and_then(scalar_string);
            match (data, case_id) {
                (Some(data), Some(case_id)) => Ok(Some(CaseHit {
                    case_id,
                    taxpayer_name: joined_name(data),
                    match_type: object
                        .get("matchType")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    name_similarity: object.get("nameSimilarity").and_then(Value::as_f64),
                })),
                _ => {
                    warn!("CRM reported matchFound=true without a CaseID");
                    Ok(None)
                }
            }
        }
        Some(false) => Ok(None),
        None => {
            if let Some(case_id) = object.get("case_id").and_then(scalar_string) {
                return Ok(Some(legacy_hit(case_id, object.get("name"))));
            }
            let first = object
                .get("cases")
                .and_then(Value::as_array)
                .and_then(|cases| cases.first());
            Ok(first.and_then(|case| {
                case.get("case_id")
                    .and_then(scalar_string)
                    .map(|case_id| legacy_hit(case_id, case.get("name")))
            }))
        }
    }
}

fn legacy_hit(case_id: String, name: Option<&Value>) -> CaseHit {
    CaseHit {
        case_id,
        taxpayer_name: name.and_then(Value::as_str).map(str::to_string),
        match_type: Some("legacy".to_string()),
        name_similarity: None,
    }
}

fn joined_name(data: &Value) -> Option<String> {
    let parts: Vec<&str> = ["FirstName", "LastName"]
        .iter()
        .filter_map(|key| data.get(key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Maps 429 and other non-2xx statuses to errors; the body of a success is left unread.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, CrmError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = retry_after_header(response.headers());
        let body = response.text().await.unwrap_or_default();
        return Err(CrmError::RateLimited { retry_after, body });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CrmError::Server {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

async fn read_json(response: reqwest::Response) -> Result<Value, CrmError> {
    let response = ensure_success(response).await?;
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
