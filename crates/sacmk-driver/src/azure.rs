use std::time::{Duration, Instant};

use async_trait::async_trait;
use sacmk_domain::{parse_key_vault_id, StorageAccountRef};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::driver::{KeyVaultResolver, StorageAccountsApi};
use crate::error::DriverError;
use crate::wire::{AccountUpdateParameters, StorageAccount};

const STORAGE_API_VERSION: &str = "2019-04-01";
const KEY_VAULT_API_VERSION: &str = "2018-02-14";

// ── Configuration ─────────────────────────────────────────────────────────────

/// Operator-level settings for the Azure driver, injected at startup.
#[derive(Clone)]
pub struct AzureDriverConfig {
    /// Azure tenant ID (GUID).
    pub tenant_id: String,
    /// Subscription the storage-accounts client is bound to.
    pub subscription_id: String,
    /// Service principal client ID (optional; falls back to MSI/CLI).
    pub client_id: Option<String>,
    /// Service principal client secret (optional; falls back to MSI/CLI).
    pub client_secret: Option<String>,
}

// ── Base URLs (overridden in tests) ───────────────────────────────────────────

#[derive(Clone)]
pub(crate) struct BaseUrls {
    management: String,
    login:      String,
}

impl Default for BaseUrls {
    fn default() -> Self {
        Self {
            management: "https://management.azure.com".into(),
            login:      "https://login.microsoftonline.com".into(),
        }
    }
}

// ── Credentials ───────────────────────────────────────────────────────────────

const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Where the driver gets its Resource Manager bearer tokens from.
enum Credential {
    /// OAuth2 client-credentials grant for a service principal.
    ClientSecret {
        tenant_id:     String,
        client_id:     String,
        client_secret: String,
        login_base:    String,
    },
    /// The account signed in through `az login`.
    AzureCli { tenant_id: String },
    #[cfg(test)]
    Fixed(String),
}

struct AccessToken {
    value:      String,
    refresh_at: Instant,
}

impl Credential {
    fn from_config(config: &AzureDriverConfig, login_base: &str) -> Self {
        match (config.client_id.as_deref(), config.client_secret.as_deref()) {
            (Some(client_id), Some(client_secret)) => Credential::ClientSecret {
                tenant_id:     config.tenant_id.clone(),
                client_id:     client_id.to_string(),
                client_secret: client_secret.to_string(),
                login_base:    login_base.to_string(),
            },
            _ => Credential::AzureCli {
                tenant_id: config.tenant_id.clone(),
            },
        }
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<AccessToken, DriverError> {
        match self {
            Credential::ClientSecret { tenant_id, client_id, client_secret, login_base } => {
                let url = format!("{}/{}/oauth2/v2.0/token", login_base, tenant_id);
                let form = [
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("scope", MANAGEMENT_SCOPE),
                ];
                let body: Value = client
                    .post(&url)
                    .form(&form)
                    .send()
                    .await
                    .map_err(|e| DriverError::Internal(format!("token endpoint: {}", e)))?
                    .json()
                    .await
                    .map_err(|e| DriverError::Internal(format!("token response: {}", e)))?;

                let value = body["access_token"]
                    .as_str()
                    .ok_or_else(|| {
                        DriverError::Internal(format!(
                            "token endpoint returned no access_token for client {}",
                            client_id
                        ))
                    })?
                    .to_string();
                let lifetime = body["expires_in"].as_u64().unwrap_or(3600);
                Ok(AccessToken {
                    value,
                    refresh_at: Instant::now() + Duration::from_secs(lifetime.saturating_sub(60)),
                })
            }
            Credential::AzureCli { tenant_id } => {
                let output = tokio::process::Command::new("az")
                    .args([
                        "account",
                        "get-access-token",
                        "--scope",
                        MANAGEMENT_SCOPE,
                        "--tenant",
                        tenant_id.as_str(),
                        "--output",
                        "json",
                    ])
                    .output()
                    .await
                    .map_err(|e| {
                        DriverError::Internal(format!(
                            "running az: {}; set a client id and secret instead",
                            e
                        ))
                    })?;
                if !output.status.success() {
                    return Err(DriverError::Internal(format!(
                        "az account get-access-token: {}",
                        String::from_utf8_lossy(&output.stderr).trim()
                    )));
                }

                let body: Value = serde_json::from_slice(&output.stdout)
                    .map_err(|e| DriverError::Internal(format!("az output: {}", e)))?;
                let value = body["accessToken"]
                    .as_str()
                    .ok_or_else(|| DriverError::Internal("az output has no accessToken".into()))?
                    .to_string();
                // expiresOn is in local time; asking az again is cheaper than parsing it.
                Ok(AccessToken {
                    value,
                    refresh_at: Instant::now() + Duration::from_secs(5 * 60),
                })
            }
            #[cfg(test)]
            Credential::Fixed(value) => Ok(AccessToken {
                value:      value.clone(),
                refresh_at: Instant::now() + Duration::from_secs(3600),
            }),
        }
    }
}

// ── AzureDriver ───────────────────────────────────────────────────────────────

/// Talks to Azure Resource Manager for both the storage-accounts API and
/// key-vault URI resolution.
pub struct AzureDriver {
    config:     AzureDriverConfig,
    client:     reqwest::Client,
    credential: Credential,
    token:      Mutex<Option<AccessToken>>,
    base:       BaseUrls,
}

impl AzureDriver {
    /// Uses the service principal when both `client_id` and `client_secret`
    /// are set, the Azure CLI login otherwise.
    pub fn new(config: AzureDriverConfig) -> Result<Self, DriverError> {
        Self::with_base(config, BaseUrls::default())
    }

    pub(crate) fn with_base(config: AzureDriverConfig, base: BaseUrls) -> Result<Self, DriverError> {
        if config.subscription_id.is_empty() {
            return Err(DriverError::Internal("azure driver: subscription_id is required".into()));
        }
        let credential = Credential::from_config(&config, &base.login);
        Ok(Self {
            config,
            client: reqwest::Client::new(),
            credential,
            token: Mutex::new(None),
            base,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_fixed_token(config: AzureDriverConfig, token: &str, base: BaseUrls) -> Self {
        Self {
            config,
            client:     reqwest::Client::new(),
            credential: Credential::Fixed(token.to_string()),
            token:      Mutex::new(None),
            base,
        }
    }

    async fn bearer(&self) -> Result<String, DriverError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| Instant::now() < t.refresh_at) {
            return Ok(token.value.clone());
        }
        let fresh = self.credential.fetch(&self.client).await?;
        debug!("Fetched management API token");
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    fn account_url(&self, account: &StorageAccountRef) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Storage/storageAccounts/{}?api-version={}",
            self.base.management,
            self.config.subscription_id,
            account.resource_group,
            account.account_name,
            STORAGE_API_VERSION,
        )
    }

    // ── ARM error parsing ─────────────────────────────────────────────────────

    fn parse_arm_error(body: &Value) -> String {
        let err = body
            .get("error")
            .or_else(|| body.get("Error"))
            .unwrap_or(body);
        let code    = err["code"].as_str().unwrap_or("Unknown");
        let message = err["message"].as_str().unwrap_or("unknown error");
        format!("{}: {}", code, message)
    }

    // ── ARM async polling ─────────────────────────────────────────────────────

    /// Poll an ARM async operation URL until it completes or times out.
    ///
    /// Accepts both `Azure-AsyncOperation` URLs (body carries `status`) and
    /// `Location` URLs (202 while running, 200 with the resource when done).
    /// Backoff: `[1, 2, 4, 8, 16, 30]` cycling, max 120 polls.
    async fn wait_for_operation(&self, op_url: &str) -> Result<Value, DriverError> {
        let token  = self.bearer().await?;
        let delays = [1u64, 2, 4, 8, 16, 30];
        let max_polls = 120;

        for (i, &delay) in delays.iter().cycle().take(max_polls).enumerate() {
            let resp = self
                .client
                .get(op_url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| DriverError::UpdateFailed(format!("poll {}: {}", op_url, e)))?;

            let http_status = resp.status().as_u16();
            let body: Value = resp.json().await.unwrap_or(Value::Null);

            if http_status != 202 {
                if !(200..300).contains(&http_status) {
                    return Err(DriverError::UpdateFailed(format!(
                        "poll {}: status {}: {}",
                        op_url,
                        http_status,
                        Self::parse_arm_error(&body)
                    )));
                }
                match body["status"].as_str() {
                    None | Some("Succeeded") => return Ok(body),
                    Some(s @ ("Failed" | "Canceled")) => {
                        return Err(DriverError::UpdateFailed(format!(
                            "ARM operation failed ({}): {}",
                            s,
                            Self::parse_arm_error(&body)
                        )));
                    }
                    Some(_) => {}
                }
            }

            let poll = i + 1;
            if poll % 10 == 0 {
                info!(poll, op_url, "still waiting for Azure ARM operation");
            } else {
                debug!(poll, op_url, delay, "Azure ARM operation pending, waiting");
            }
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }

        Err(DriverError::UpdateFailed(format!(
            "Azure ARM operation timed out after {} polls: {}",
            max_polls, op_url
        )))
    }

    // ── ARM HTTP verbs ────────────────────────────────────────────────────────

    async fn arm_patch(&self, url: &str, body: &Value) -> Result<(u16, Value, Option<String>), DriverError> {
        let token = self.bearer().await?;
        debug!(url, "Azure ARM PATCH");
        let resp = self
            .client
            .patch(url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await
            .map_err(|e| DriverError::UpdateFailed(format!("PATCH {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        let async_op = resp
            .headers()
            .get("Azure-AsyncOperation")
            .or_else(|| resp.headers().get("Location"))
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body_val: Value = resp
            .json()
            .await
            .unwrap_or(Value::Null);
        Ok((status, body_val, async_op))
    }

    async fn arm_get(&self, url: &str) -> Result<(u16, Value), DriverError> {
        let token = self.bearer().await?;
        debug!(url, "Azure ARM GET");
        let resp = self
            .client
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| DriverError::ReadFailed(format!("GET {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        let body: Value = resp
            .json()
            .await
            .unwrap_or(Value::Null);
        Ok((status, body))
    }

    /// PATCH and wait for an async completion if the service returned 202.
    async fn arm_patch_and_wait(&self, url: &str, body: &Value) -> Result<Value, DriverError> {
        let (status, body_val, async_op) = self.arm_patch(url, body).await?;

        // 200/201 means synchronously complete
        if status == 200 || status == 201 {
            if body_val.get("error").is_some() {
                return Err(DriverError::UpdateFailed(format!(
                    "PATCH {}: {}",
                    url,
                    Self::parse_arm_error(&body_val)
                )));
            }
            return Ok(body_val);
        }

        if status == 202 {
            if let Some(op_url) = async_op {
                return self.wait_for_operation(&op_url).await;
            }
            return Ok(body_val);
        }

        if status == 404 {
            return Err(DriverError::NotFound(format!(
                "PATCH {}: {}",
                url,
                Self::parse_arm_error(&body_val)
            )));
        }

        Err(DriverError::UpdateFailed(format!(
            "PATCH {}: status {}: {}",
            url,
            status,
            Self::parse_arm_error(&body_val)
        )))
    }
}

// ── StorageAccountsApi impl ───────────────────────────────────────────────────

#[async_trait]
impl StorageAccountsApi for AzureDriver {
    fn subscription_id(&self) -> Option<&str> {
        Some(&self.config.subscription_id)
    }

    async fn update(
        &self,
        account: &StorageAccountRef,
        payload: &AccountUpdateParameters,
    ) -> Result<(), DriverError> {
        let url  = self.account_url(account);
        let body = serde_json::to_value(payload)
            .map_err(|e| DriverError::Internal(format!("encode update for {}: {}", account, e)))?;
        self.arm_patch_and_wait(&url, &body).await?;
        info!(
            resource_group = %account.resource_group,
            account = %account.account_name,
            key_source = %payload.encryption().key_source,
            "Storage account encryption updated"
        );
        Ok(())
    }

    async fn get_properties(
        &self,
        account: &StorageAccountRef,
    ) -> Result<StorageAccount, DriverError> {
        let url = self.account_url(account);
        let (status, body) = self.arm_get(&url).await?;

        if status == 404 {
            return Err(DriverError::NotFound(format!(
                "storage account {}: {}",
                account,
                Self::parse_arm_error(&body)
            )));
        }
        if !(200..300).contains(&status) {
            return Err(DriverError::ReadFailed(format!(
                "GET storage account {}: status {}: {}",
                account,
                status,
                Self::parse_arm_error(&body)
            )));
        }

        serde_json::from_value(body)
            .map_err(|e| DriverError::ReadFailed(format!("decode storage account {}: {}", account, e)))
    }
}

// ── KeyVaultResolver impl ─────────────────────────────────────────────────────

#[async_trait]
impl KeyVaultResolver for AzureDriver {
    async fn base_url_from_id(&self, key_vault_id: &str) -> Result<String, DriverError> {
        let vault = parse_key_vault_id(key_vault_id)
            .map_err(|e| DriverError::Internal(e.to_string()))?;

        let url = format!(
            "{}{}?api-version={}",
            self.base.management,
            key_vault_id.trim_end_matches('/'),
            KEY_VAULT_API_VERSION,
        );
        let (status, body) = self.arm_get(&url).await?;

        if status == 404 {
            return Err(DriverError::NotFound(format!(
                "key vault {} (resource group {})",
                vault.vault_name, vault.resource_group
            )));
        }
        if !(200..300).contains(&status) {
            return Err(DriverError::ReadFailed(format!(
                "GET key vault {}: status {}: {}",
                vault.vault_name,
                status,
                Self::parse_arm_error(&body)
            )));
        }

        body["properties"]["vaultUri"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                DriverError::ReadFailed(format!("key vault {}: no vaultUri in response", vault.vault_name))
            })
    }
}
