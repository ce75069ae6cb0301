// Firebase Firestore REST API client
// Using service account JWT authentication

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
/// Lifetime requested for each access token, in seconds
const TOKEN_TTL: i64 = 3600;
/// Refresh this many seconds before the token actually expires
const TOKEN_REFRESH_MARGIN: i64 = 60;

/// Firebase service account credentials
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub private_key: String,
    pub client_email: String,
}

/// JWT claims for Google OAuth2
#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    scope: &'a str,
}

/// Cached access token
struct CachedToken {
    token: String,
    expires_at: i64,
}

/// Firebase REST API client
pub struct FirebaseClient {
    client: Client,
    service_account: ServiceAccount,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl FirebaseClient {
    /// Create a new Firebase client from service account JSON file
    pub fn from_file(client: Client, path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading service account file {}", path))?;
        let service_account: ServiceAccount =
            serde_json::from_str(&content).context("parsing service account JSON")?;

        Ok(Self::new(client, service_account))
    }

    pub fn new(client: Client, service_account: ServiceAccount) -> Self {
        Self {
            client,
            service_account,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get access token (with caching)
    async fn get_access_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at > Utc::now().timestamp() + TOKEN_REFRESH_MARGIN {
                    return Ok(cached.token.clone());
                }
            }
        }

        let token = self.generate_access_token().await?;

        let mut cache = self.token_cache.write().await;
        *cache = Some(CachedToken {
            token: token.clone(),
            expires_at: Utc::now().timestamp() + TOKEN_TTL,
        });

        Ok(token)
    }

    /// Generate a new access token using JWT
    async fn generate_access_token(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        let email = self.service_account.client_email.as_str();

        let claims = Claims {
            iss: email,
            sub: email,
            aud: TOKEN_URL,
            iat: now,
            exp: now + TOKEN_TTL,
            scope: DATASTORE_SCOPE,
        };

        let key = EncodingKey::from_rsa_pem(self.service_account.private_key.as_bytes())?;
        let jwt = encode(&Header::new(Algorithm::RS256), &claims, &key)?;

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await?;
            error!("Failed to get access token: {}", body);
            return Err(anyhow!("Failed to get access token"));
        }

        let data: Value = response.json().await?;
        let token = data["access_token"]
            .as_str()
            .ok_or_else(|| anyhow!("No access_token in response"))?;

        Ok(token.to_string())
    }

    /// Base URL for Firestore REST API
    fn base_url(&self) -> String {
        format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/(default)/documents",
            self.service_account.project_id
        )
    }

    /// Get a document by path. `Ok(None)` when it does not exist.
    pub async fn get_document(&self, collection: &str, doc_id: &str) -> Result<Option<Value>> {
        let token = self.get_access_token().await?;
        let url = format!("{}/{}/{}", self.base_url(), collection, doc_id);

        let response = self.client.get(&url).bearer_auth(&token).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let doc: Value = check_status(response, "get").await?.json().await?;
        Ok(Some(from_firestore_document(&doc)))
    }

    /// Create or overwrite the listed top-level fields of a document.
    /// Firestore applies a single PATCH atomically.
    pub async fn set_document(&self, collection: &str, doc_id: &str, data: &Value) -> Result<()> {
        let token = self.get_access_token().await?;

        let field_paths: Vec<(&str, &str)> = data
            .as_object()
            .map(|obj| {
                obj.keys()
                    .map(|k| ("updateMask.fieldPaths", k.as_str()))
                    .collect()
            })
            .unwrap_or_default();

        let url = format!("{}/{}/{}", self.base_url(), collection, doc_id);

        let response = self
            .client
            .patch(&url)
            .query(&field_paths)
            .bearer_auth(&token)
            .json(&to_firestore_document(data))
            .send()
            .await?;

        check_status(response, "set").await?;
        Ok(())
    }

    /// Add a document to a subcollection, returning the generated id
    pub async fn add_to_subcollection(
        &self,
        collection: &str,
        doc_id: &str,
        subcollection: &str,
        data: &Value,
    ) -> Result<String> {
        let token = self.get_access_token().await?;
        let url = format!(
            "{}/{}/{}/{}",
            self.base_url(),
            collection,
            doc_id,
            subcollection
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&to_firestore_document(data))
            .send()
            .await?;

        let result: Value = check_status(response, "add").await?.json().await?;
        let id = result["name"]
            .as_str()
            .and_then(|name| name.rsplit('/').next())
            .unwrap_or_default();
        Ok(id.to_string())
    }
}

/// Turn a non-success response into an error, logging the body
async fn check_status(response: Response, op: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!(op, %status, "Firebase error: {}", body);
    Err(anyhow!("Firebase {} error: {}", op, status))
}

/// Convert Firestore document to regular JSON.
/// Firestore omits `fields` for an existing but empty document.
fn from_firestore_document(doc: &Value) -> Value {
    match doc.get("fields") {
        Some(fields) => from_firestore_value(&json!({ "mapValue": { "fields": fields } })),
        None => json!({}),
    }
}

/// Convert Firestore value to regular JSON value
fn from_firestore_value(value: &Value) -> Value {
    if let Some(s) = value.get("stringValue") {
        return s.clone();
    }
    if let Some(n) = value.get("integerValue") {
        // int64 values arrive as decimal strings
        return match n.as_str() {
            Some(s) => s.parse::<u64>().map(Value::from)
                .or_else(|_| s.parse::<i64>().map(Value::from))
                .unwrap_or(Value::Null),
            None => n.clone(),
        };
    }
    if let Some(v) = value.get("doubleValue").or_else(|| value.get("booleanValue")) {
        return v.clone();
    }
    if let Some(ts) = value.get("timestampValue") {
        return ts.clone();
    }
    if let Some(arr) = value
        .get("arrayValue")
        .and_then(|a| a.get("values"))
        .and_then(|v| v.as_array())
    {
        return Value::Array(arr.iter().map(from_firestore_value).collect());
    }
    if let Some(obj) = value
        .get("mapValue")
        .and_then(|m| m.get("fields"))
        .and_then(|f| f.as_object())
    {
        return Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), from_firestore_value(v)))
                .collect(),
        );
    }
    Value::Null
}

/// Convert regular JSON to Firestore document format
fn to_firestore_document(data: &Value) -> Value {
    let fields = match data.as_object() {
        Some(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), to_firestore_value(v)))
                .collect(),
        ),
        None => json!({}),
    };
    json!({ "fields": fields })
}

/// Convert JSON value to Firestore value format
fn to_firestore_value(value: &Value) -> Value {
    match value {
        Value::String(s) => json!({ "stringValue": s }),
        Value::Number(n) if n.is_f64() => json!({ "doubleValue": n }),
        Value::Number(n) => json!({ "integerValue": n.to_string() }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Array(arr) => {
            let values: Vec<Value> = arr.iter().map(to_firestore_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(obj) => {
            let fields: serde_json::Map<String, Value> = obj
                .iter()
                .map(|(k, v)| (k.clone(), to_firestore_value(v)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
        Value::Null => json!({ "nullValue": null }),
    }
}
