//! HTTP client for the sign-in flow.
//!
//! Drives `nonce -> sign -> verify` against a running server with any
//! [`WalletSigner`]. Works with either session transport: cookies are kept in
//! the client's cookie store, and an `x-session-token` header, when the server
//! sends one, is replayed as a bearer token.

use crate::auth::middleware::SESSION_TOKEN_HEADER;
use crate::siwe::message::ParseError;
use crate::siwe::{Address, SiweMessage};
use crate::wallet::{WalletError, WalletSigner};
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Invalid sign-in message: {0}")]
    Message(#[from] ParseError),

    #[error("Server returned {status}: {message}")]
    Status { status: StatusCode, message: String },
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// What the client asks the wallet to sign, apart from the nonce and address.
#[derive(Debug, Clone)]
pub struct SignInRequest {
    pub domain: String,
    pub uri: String,
    pub chain_id: u64,
    pub statement: Option<String>,
    pub expiration_time: Option<DateTime<Utc>>,
}

impl SignInRequest {
    pub fn new(domain: impl Into<String>, uri: impl Into<String>, chain_id: u64) -> Self {
        Self {
            domain: domain.into(),
            uri: uri.into(),
            chain_id,
            statement: None,
            expiration_time: None,
        }
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    pub fn with_expiration_time(mut self, at: DateTime<Utc>) -> Self {
        self.expiration_time = Some(at);
        self
    }

    /// Message Builder step: the exact text the wallet will sign.
    pub fn build_message(&self, address: Address, nonce: &str) -> Result<SiweMessage, ParseError> {
        let mut message = SiweMessage::new(
            self.domain.clone(),
            address,
            self.uri.clone(),
            self.chain_id,
            nonce,
            Utc::now(),
        );
        if let Some(statement) = &self.statement {
            message = message.with_statement(statement.clone())?;
        }
        if let Some(at) = self.expiration_time {
            message = message.with_expiration_time(at);
        }
        Ok(message)
    }
}

pub struct SiweClient {
    http: reqwest::Client,
    base_url: String,
    token: Mutex<Option<String>>,
}

impl SiweClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_token(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.token.lock().ok().and_then(|t| t.clone());
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn remember_token(&self, response: &Response) {
        let token = response
            .headers()
            .get(SESSION_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if let (Some(token), Ok(mut slot)) = (token, self.token.lock()) {
            *slot = Some(token.to_string());
        }
    }

    async fn check(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
        };
        Err(ClientError::Status { status, message })
    }

    /// GET /nonce
    pub async fn fetch_nonce(&self) -> Result<String, ClientError> {
        let response = self.with_token(self.http.get(self.url("/nonce"))).send().await?;
        let response = Self::check(response).await?;
        self.remember_token(&response);
        Ok(response.text().await?)
    }

    /// POST /verify with an already signed message.
    pub async fn submit(&self, message: &str, signature: &str) -> Result<(), ClientError> {
        let response = self
            .with_token(self.http.post(self.url("/verify")))
            .json(&json!({ "message": message, "signature": signature }))
            .send()
            .await?;
        let response = Self::check(response).await?;
        self.remember_token(&response);
        Ok(())
    }

    /// Full sign-in: fetch a nonce, build the message, have the wallet sign
    /// it, and submit it. Returns the address now signed in.
    pub async fn sign_in(
        &self,
        wallet: &dyn WalletSigner,
        request: &SignInRequest,
    ) -> Result<Address, ClientError> {
        let nonce = self.fetch_nonce().await?;
        let message = request
            .build_message(wallet.address(), &nonce)?
            .to_canonical_string();
        let signature = wallet.sign_message(&message).await?;

        self.submit(&message, &signature).await?;
        tracing::debug!(address = %wallet.address(), "Signed in");
        Ok(wallet.address())
    }

    /// GET /personal_information
    pub async fn personal_information(&self) -> Result<String, ClientError> {
        let response = self
            .with_token(self.http.get(self.url("/personal_information")))
            .send()
            .await?;
        Ok(Self::check(response).await?.text().await?)
    }

    /// POST /logout
    pub async fn logout(&self) -> Result<(), ClientError> {
        let response = self
            .with_token(self.http.post(self.url("/logout")))
            .send()
            .await?;
        Self::check(response).await?;
        if let Ok(mut slot) = self.token.lock() {
            *slot = None;
        }
        Ok(())
    }
}
