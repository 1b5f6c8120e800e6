use super::types::*;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("Rate limited, retry after: {0}s")]
    RateLimited(u64),
    #[error("API error: {0}")]
    ApiError(String),
}

pub struct TelegramClient {
    client: Client,
    // includes the bot token, never log it
    method_base: String,
    retry_delay: Duration,
    max_retries: u32,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str, poll_timeout: Duration) -> Result<Self, reqwest::Error> {
        // long polls hold the connection for poll_timeout, leave headroom on top
        let client = Client::builder()
            .user_agent("PurpleAirAqiBot/1.0")
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            method_base: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            retry_delay: Duration::from_millis(1000),
            max_retries: 3,
        })
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout_secs,
            allowed_updates: vec!["message"],
        };
        self.call("getUpdates", &request).await
    }

    /// Sends a Markdown message, backing off and retrying when Telegram rate limits us.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&ReplyKeyboardMarkup>,
    ) -> Result<Message, TelegramError> {
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "Markdown",
            reply_markup,
        };

        let mut retry_count = 0;
        let mut delay = self.retry_delay;

        loop {
            match self.call("sendMessage", &request).await {
                Err(TelegramError::RateLimited(retry_after)) if retry_count < self.max_retries => {
                    let wait = if retry_after > 0 {
                        Duration::from_secs(retry_after)
                    } else {
                        delay
                    };

                    tracing::warn!(
                        "Rate limited by Telegram API, retrying in {}ms",
                        wait.as_millis()
                    );

                    sleep(wait).await;
                    // Exponential backoff with jitter
                    delay = delay.mul_f32(2.0 + fastrand::f32() * 0.5);
                    retry_count += 1;
                }
                result => return result,
            }
        }
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, TelegramError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.method_base, method);
        // reqwest errors carry the request URL, which carries the token
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        let text = response.text().await.map_err(reqwest::Error::without_url)?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            // proxies in front of the API may answer 429 without a JSON body
            let retry_after = serde_json::from_str::<ApiResponse<serde_json::Value>>(&text)
                .ok()
                .and_then(|parsed| parsed.parameters)
                .and_then(|p| p.retry_after)
                .unwrap_or(0);
            return Err(TelegramError::RateLimited(retry_after));
        }

        let parsed: ApiResponse<T> = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(TelegramError::ApiError(format!("HTTP {}: {}", status, text)))
            }
            Err(e) => return Err(e.into()),
        };

        if parsed.error_code == Some(429) {
            let retry_after = parsed
                .parameters
                .and_then(|p| p.retry_after)
                .unwrap_or(0);
            return Err(TelegramError::RateLimited(retry_after));
        }

        if !parsed.ok {
            return Err(TelegramError::ApiError(
                parsed
                    .description
                    .unwrap_or_else(|| format!("{} failed with HTTP {}", method, status)),
            ));
        }

        parsed
            .result
            .ok_or_else(|| TelegramError::ApiError(format!("{} returned no result", method)))
    }
}
