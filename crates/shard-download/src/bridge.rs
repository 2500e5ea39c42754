//! The bridge REST adapter (specification §4.2, §6), built on `reqwest`.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use shard_core::file_info::FileInfo;
use shard_core::ids::{BucketId, FileId};
use shard_core::ports::{
    BridgeClientPort, PointerDescriptor, PointerPage, ReplacementRequest, TokenOperation,
};
use shard_core::report::{ExchangeReport, ReportResultCode};
use shard_core::{DownloadError, DownloadResult, EngineConfig};

/// `reqwest`-backed [`BridgeClientPort`]. One instance is shared (behind an
/// `Arc`) across every download the caller drives through the same bridge
/// account, matching the teacher's one-client-per-service convention.
pub struct ReqwestBridgeClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password_sha256_hex: String,
}

impl ReqwestBridgeClient {
    /// Build a client from an [`EngineConfig`], applying its request timeout.
    pub fn new(config: &EngineConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("reqwest client builds with a plain timeout");
        Self {
            http,
            base_url: config.bridge_base_url.trim_end_matches('/').to_string(),
            user: config.bridge_user.clone(),
            password_sha256_hex: config.bridge_password_sha256_hex.clone(),
        }
    }

    /// `Authorization: Basic base64(user:sha256(password))`, per §4.2.
    fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.user, self.password_sha256_hex);
        format!("Basic {}", BASE64.encode(raw))
    }
}

/// Consume a response, mapping a non-success status to the taxonomy member
/// named in §4.2's status table; otherwise hand the response back for body
/// parsing.
async fn check_status(resp: reqwest::Response) -> DownloadResult<reqwest::Response> {
    let status = resp.status().as_u16();
    if DownloadError::from_bridge_status(status, String::new()).is_none() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(DownloadError::from_bridge_status(status, body).expect("already confirmed non-success"))
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct RawFarmer {
    address: String,
    port: u16,
    #[serde(rename = "nodeID")]
    node_id: String,
}

#[derive(Deserialize)]
struct RawPointer {
    token: Option<String>,
    hash: Option<String>,
    size: Option<u64>,
    index: Option<u32>,
    farmer: Option<RawFarmer>,
}

impl RawPointer {
    /// Validate the required fields named in §4.2 and fold into the
    /// engine's descriptor shape. A missing or wrong-typed field is a
    /// bridge-json error, per §4.2.
    fn into_descriptor(self) -> DownloadResult<PointerDescriptor> {
        let missing = |field: &str| DownloadError::bridge_json(format!("pointer missing `{field}`"));
        let token = self.token.ok_or_else(|| missing("token"))?;
        let hash = self.hash.ok_or_else(|| missing("hash"))?;
        let size = self.size.ok_or_else(|| missing("size"))?;
        let index = self.index.ok_or_else(|| missing("index"))?;
        let farmer = self.farmer.ok_or_else(|| missing("farmer"))?;
        Ok(PointerDescriptor {
            index,
            size,
            hash,
            token,
            farmer_host: farmer.address,
            farmer_port: farmer.port,
            farmer_node_id: farmer.node_id,
        })
    }
}

#[derive(Serialize)]
struct ExchangeReportBody<'a> {
    #[serde(rename = "dataHash")]
    data_hash: &'a str,
    #[serde(rename = "reporterId")]
    reporter_id: &'a str,
    #[serde(rename = "farmerId")]
    farmer_id: &'a str,
    #[serde(rename = "clientId")]
    client_id: &'a str,
    #[serde(rename = "exchangeStart")]
    exchange_start: i64,
    #[serde(rename = "exchangeEnd")]
    exchange_end: i64,
    #[serde(rename = "exchangeResultCode")]
    exchange_result_code: &'a str,
    #[serde(rename = "exchangeResultMessage")]
    exchange_result_message: &'a str,
}

#[async_trait]
impl BridgeClientPort for ReqwestBridgeClient {
    async fn post_token(&self, bucket_id: &BucketId, operation: TokenOperation) -> DownloadResult<String> {
        let op = match operation {
            TokenOperation::Pull => "PULL",
        };
        let url = format!("{}/buckets/{bucket_id}/tokens", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("Authorization", self.basic_auth_header())
            .json(&serde_json::json!({ "operation": op }))
            .send()
            .await
            .map_err(|e| DownloadError::bridge_request(e.to_string()))?;
        let resp = check_status(resp).await?;
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| DownloadError::bridge_json(e.to_string()))?;
        Ok(body.token)
    }

    async fn get_pointers(
        &self,
        bucket_id: &BucketId,
        file_id: &FileId,
        skip: u32,
        limit: u32,
        token: &str,
    ) -> DownloadResult<PointerPage> {
        let url = format!("{}/buckets/{bucket_id}/files/{file_id}?limit={limit}&skip={skip}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header("Authorization", self.basic_auth_header())
            .header("x-token", token)
            .send()
            .await
            .map_err(|e| DownloadError::bridge_request(e.to_string()))?;
        let resp = check_status(resp).await?;
        let raw: Vec<RawPointer> = resp
            .json()
            .await
            .map_err(|e| DownloadError::bridge_json(e.to_string()))?;
        let pointers = raw
            .into_iter()
            .map(RawPointer::into_descriptor)
            .collect::<DownloadResult<Vec<_>>>()?;
        Ok(PointerPage { pointers })
    }

    async fn get_replacement_pointer(
        &self,
        bucket_id: &BucketId,
        file_id: &FileId,
        request: ReplacementRequest<'_>,
        token: &str,
    ) -> DownloadResult<PointerDescriptor> {
        let url = format!(
            "{}/buckets/{bucket_id}/files/{file_id}?limit=1&skip={}&exclude={}",
            self.base_url, request.index, request.exclude_farmer_ids_csv
        );
        let resp = self
            .http
            .get(&url)
            .header("Authorization", self.basic_auth_header())
            .header("x-token", token)
            .send()
            .await
            .map_err(|e| DownloadError::bridge_request(e.to_string()))?;
        let resp = check_status(resp).await?;
        let mut raw: Vec<RawPointer> = resp
            .json()
            .await
            .map_err(|e| DownloadError::bridge_json(e.to_string()))?;
        let first = raw
            .pop()
            .ok_or_else(|| DownloadError::bridge_json("bridge returned no replacement pointer"))?;
        first.into_descriptor()
    }

    async fn get_file_info(&self, bucket_id: &BucketId, file_id: &FileId) -> DownloadResult<FileInfo> {
        let url = format!("{}/buckets/{bucket_id}/files/{file_id}/info", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header("Authorization", self.basic_auth_header())
            .send()
            .await
            .map_err(|e| DownloadError::bridge_request(e.to_string()))?;
        let resp = check_status(resp).await?;
        let info: FileInfo = resp
            .json()
            .await
            .map_err(|e| DownloadError::bridge_json(e.to_string()))?;
        if info.has_unsupported_hmac_type() {
            return Err(DownloadError::bridge_json("unsupported hmac type, expected sha512"));
        }
        Ok(info)
    }

    async fn post_exchange_report(&self, report: &ExchangeReport) -> DownloadResult<()> {
        let start = report
            .start_ms
            .ok_or_else(|| DownloadError::memory("report missing start_ms"))?;
        let end = report
            .end_ms
            .ok_or_else(|| DownloadError::memory("report missing end_ms"))?;
        let code = match report.result_code {
            Some(ReportResultCode::Success) => "success",
            Some(ReportResultCode::Failure) => "failure",
            None => return Err(DownloadError::memory("report missing result_code")),
        };
        let message = report.message.as_deref().unwrap_or("");
        let body = ExchangeReportBody {
            data_hash: &report.data_hash,
            reporter_id: &report.reporter_id,
            farmer_id: &report.farmer_id,
            client_id: &report.reporter_id,
            exchange_start: start,
            exchange_end: end,
            exchange_result_code: code,
            exchange_result_message: message,
        };
        let url = format!("{}/reports/exchanges", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("Authorization", self.basic_auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| DownloadError::bridge_request(e.to_string()))?;
        check_status(resp).await?;
        Ok(())
    }
}
