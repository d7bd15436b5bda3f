//! Gemini `generateContent` client used as the fallback extraction oracle.

use crate::domain::model::ContactCandidates;
use crate::domain::ports::{NameOracle, TextOracle};
use crate::domain::services::owner::clean_name_reply;
use crate::domain::services::phone::{is_valid_format, normalize};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-lite-001";
pub const DEFAULT_MAX_CHARS: usize = 32_000;
pub const DEFAULT_KEY_ENVS: &[&str] = &[
    "GEMINI_API_KEY",
    "GEMINI_API_KEY_1",
    "GEMINI_API_KEY_2",
    "GEMINI_API_KEY_3",
    "GEMINI_API_KEY_4",
];

pub fn default_key_envs() -> Vec<String> {
    DEFAULT_KEY_ENVS.iter().map(|s| s.to_string()).collect()
}

/// A key is skipped once it has failed this many times.
const MAX_KEY_FAILURES: u32 = 3;
const ELISION: &str = "\n... (중략) ...\n";

#[derive(Debug)]
struct ApiKey {
    label: String,
    key: String,
    failures: AtomicU32,
}

#[derive(Debug)]
pub struct GeminiOracle {
    client: Client,
    endpoint: String,
    model: String,
    max_chars: usize,
    keys: Vec<ApiKey>,
    cursor: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct ContactReply {
    phone: Option<String>,
    fax: Option<String>,
}

impl GeminiOracle {
    /// `keys` are `(label, api_key)` pairs; empty keys are ignored.
    pub fn new(
        endpoint: &str,
        model: &str,
        keys: Vec<(String, String)>,
        max_chars: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let keys: Vec<ApiKey> = keys
            .into_iter()
            .filter(|(_, key)| !key.trim().is_empty())
            .map(|(label, key)| ApiKey {
                label,
                key,
                failures: AtomicU32::new(0),
            })
            .collect();

        if keys.is_empty() {
            return Err(EtlError::MissingConfigError {
                field: "ai.api_key_envs".to_string(),
            });
        }

        tracing::info!("🤖 Gemini oracle ready with {} key(s), model {}", keys.len(), model);

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_chars,
            keys,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Collect keys from environment variables, skipping unset ones.
    pub fn keys_from_env(names: &[String]) -> Vec<(String, String)> {
        names
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.clone(), v)))
            .collect()
    }

    pub fn available_keys(&self) -> usize {
        self.keys
            .iter()
            .filter(|k| k.failures.load(Ordering::Relaxed) < MAX_KEY_FAILURES)
            .count()
    }

    /// Round-robin over keys that are still under the failure limit. When every
    /// key is exhausted the counters start over.
    fn next_key(&self) -> &ApiKey {
        if self.available_keys() == 0 {
            tracing::warn!("🔄 All Gemini keys exhausted, resetting failure counters");
            for key in &self.keys {
                key.failures.store(0, Ordering::Relaxed);
            }
        }
        let total = self.keys.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        (0..total)
            .map(|offset| &self.keys[(start + offset) % total])
            .find(|k| k.failures.load(Ordering::Relaxed) < MAX_KEY_FAILURES)
            .unwrap_or(&self.keys[start % total])
    }

    fn prompt(&self, institution: &str, text: &str) -> String {
        format!(
            "다음 텍스트에서 '{institution}'의 전화번호와 팩스번호를 추출해주세요.\n\n\
             텍스트:\n{}\n\n\
             응답 형식 (JSON만 반환):\n\
             {{\"phone\": \"02-1234-5678\", \"fax\": \"02-1234-5679\"}}\n\
             - 없으면 null\n\
             - 번호는 하이픈(-) 포함\n\
             - 대표번호 우선",
            truncate_middle(text, self.max_chars)
        )
    }

    fn owner_prompt(&self, number: &str, texts: &[String]) -> String {
        let results: String = texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .enumerate()
            .map(|(i, t)| format!("{}. {}\n", i + 1, t))
            .collect();
        format!(
            "다음은 \"{number}\" 번호에 대한 구글 검색 결과입니다.\n\
             이 번호가 속한 정확한 기관명을 추출해주세요.\n\n\
             검색 결과:\n{}\n\
             답변은 기관명만 간단히 답해주세요. 예: \"서귀포시 송산동주민센터\"\n\
             기관명을 찾을 수 없다면 \"없음\"이라고 답해주세요.",
            truncate_middle(&results, self.max_chars)
        )
    }

    /// Send `prompt`, rotating keys; each key is tried at most once.
    async fn ask(&self, subject: &str, prompt: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 1..=self.keys.len() {
            let key = self.next_key();
            match self.generate(key, prompt).await {
                Ok(reply) => {
                    tracing::debug!(
                        "✅ {} replied for {}: {}",
                        key.label,
                        subject,
                        reply.chars().take(200).collect::<String>()
                    );
                    return Ok(reply);
                }
                Err(e) => {
                    key.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "⚠️ {} failed (attempt {}/{}): {}",
                        key.label,
                        attempt,
                        self.keys.len(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| EtlError::OracleError {
            oracle: "gemini".to_string(),
            message: "no key available".to_string(),
        }))
    }

    async fn generate(&self, key: &ApiKey, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0.1,
                "topP": 0.8,
                "topK": 40,
                "maxOutputTokens": 2048
            }
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", key.key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EtlError::OracleError {
                oracle: key.label.clone(),
                message: format!("HTTP {}", status),
            });
        }

        let reply: GenerateResponse = response.json().await?;
        let text: String = reply
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .collect();

        if text.trim().is_empty() {
            return Err(EtlError::OracleError {
                oracle: key.label.clone(),
                message: "empty response".to_string(),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl TextOracle for GeminiOracle {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn extract(&self, institution: &str, text: &str) -> Result<ContactCandidates> {
        let reply = self.ask(institution, &self.prompt(institution, text)).await?;
        parse_reply(&reply)
    }
}

#[async_trait]
impl NameOracle for GeminiOracle {
    async fn owner_name(&self, number: &str, texts: &[String]) -> Result<Option<String>> {
        let reply = self.ask(number, &self.owner_prompt(number, texts)).await?;
        let name = clean_name_reply(&reply);
        if name.is_none() {
            tracing::debug!("🤷 no usable institution name for {}: {}", number, reply.trim());
        }
        Ok(name)
    }
}

/// Keep the head (67%) and tail of `text` when it exceeds `max_chars`.
pub fn truncate_middle(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let front = max_chars * 67 / 100;
    let back = max_chars - front;
    let head: String = text.chars().take(front).collect();
    let tail: String = text.chars().skip(total - back).collect();
    format!("{head}{ELISION}{tail}")
}

/// Parse the JSON object embedded in a model reply.
pub fn parse_reply(reply: &str) -> Result<ContactCandidates> {
    let (Some(start), Some(end)) = (reply.find('{'), reply.rfind('}')) else {
        return Err(EtlError::OracleError {
            oracle: "gemini".to_string(),
            message: format!("no JSON object in reply: {}", reply.trim()),
        });
    };
    if end < start {
        return Err(EtlError::OracleError {
            oracle: "gemini".to_string(),
            message: format!("malformed reply: {}", reply.trim()),
        });
    }

    let parsed: ContactReply = serde_json::from_str(&reply[start..=end])?;
    let keep = |v: Option<String>| {
        v.map(|s| normalize(&s))
            .filter(|s| is_valid_format(s))
            .into_iter()
            .collect::<Vec<_>>()
    };
    Ok(ContactCandidates {
        phones: keep(parsed.phone),
        faxes: keep(parsed.fax),
    })
}
