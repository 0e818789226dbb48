//! External language-model adapters: the semantic intent parser and the
//! narrative generator. Both degrade to deterministic fallbacks; an absent
//! API key is never an error.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use contracts::action::{GameContext, RawIntent};
use contracts::api::ScenePayload;
use contracts::quest::{NarrativeRequest, QuestNarrative};

pub const ENV_DEEPSEEK_API_KEY: &str = "DEEPSEEK_API_KEY";
pub const ENV_DEEPSEEK_BASE_URL: &str = "DEEPSEEK_BASE_URL";
pub const ENV_DEEPSEEK_MODEL: &str = "DEEPSEEK_MODEL";

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_MODEL: &str = "deepseek-chat";

pub const PARSER_TIMEOUT: Duration = Duration::from_secs(15);
pub const NARRATIVE_TIMEOUT: Duration = Duration::from_secs(30);
const PARSER_ATTEMPTS: u32 = 1;
const NARRATIVE_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 250;

#[derive(Debug)]
pub enum LlmError {
    NoApiKey,
    Http(reqwest::Error),
    Parse(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoApiKey => write!(f, "no api key configured"),
            Self::Http(err) => write!(f, "llm http error: {err}"),
            Self::Parse(detail) => write!(f, "llm reply did not parse: {detail}"),
        }
    }
}

impl std::error::Error for LlmError {}

impl From<reqwest::Error> for LlmError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

#[derive(Debug)]
pub struct LlmClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn from_env() -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: std::env::var(ENV_DEEPSEEK_API_KEY)
                .ok()
                .filter(|key| !key.trim().is_empty()),
            base_url: std::env::var(ENV_DEEPSEEK_BASE_URL)
                .ok()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: std::env::var(ENV_DEEPSEEK_MODEL)
                .ok()
                .filter(|model| !model.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    /// A client with no key: every call degrades to the fallback path.
    pub fn disabled() -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn chat(
        &self,
        system: &str,
        user: &str,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(LlmError::NoApiKey);
        };
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "response_format": { "type": "json_object" },
        });
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let payload: serde_json::Value = response.json().await?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::Parse("missing choices[0].message.content".to_string()))
    }

    /// Semantic intent parse: one attempt, 15 s budget. The caller falls
    /// back to the pattern parser on any error.
    pub async fn parse_intent(
        &self,
        user_text: &str,
        context: &GameContext,
    ) -> Result<RawIntent, LlmError> {
        let context_json = serde_json::to_string(context)
            .map_err(|err| LlmError::Parse(err.to_string()))?;
        let system = "You convert a player's utterance into JSON: \
            {\"primaryAction\":{\"action\":string,\"target\":string?,\"dir\":string?},\
            \"secondaryActions\":[...],\"compound\":bool,\"confidence\":0..1}. \
            Actions: move take drop examine talk accept_quest complete_quest \
            ask_about_quest sit stand wait listen look inventory help cast attack sneak.";
        let user = format!("utterance: {user_text}\ncontext: {context_json}");

        let mut last_error = LlmError::NoApiKey;
        for _ in 0..PARSER_ATTEMPTS {
            match self.chat(system, &user, PARSER_TIMEOUT).await {
                Ok(reply) => {
                    return serde_json::from_str::<RawIntent>(&reply)
                        .map_err(|err| LlmError::Parse(err.to_string()));
                }
                Err(err) => last_error = err,
            }
        }
        Err(last_error)
    }

    /// Quest narrative generation: up to three attempts with exponential
    /// backoff, 30 s budget each.
    pub async fn quest_narrative(
        &self,
        request: &NarrativeRequest,
    ) -> Result<QuestNarrative, LlmError> {
        let request_json = serde_json::to_string(request)
            .map_err(|err| LlmError::Parse(err.to_string()))?;
        let system = "You write quest narrative JSON with exactly these fields: \
            narrative, objective_description, reward_description, protagonist, \
            antagonist, narrative_hooks, complications, failure_conditions, \
            step_narratives (step id -> text). Respect the constraint record: \
            never exceed the rolled reward, never name enemies outside the \
            allowed set, never use a forbidden keyword.";

        let mut last_error = LlmError::NoApiKey;
        for attempt in 0..NARRATIVE_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(BACKOFF_BASE_MS << attempt)).await;
            }
            match self.chat(system, &request_json, NARRATIVE_TIMEOUT).await {
                Ok(reply) => match serde_json::from_str::<QuestNarrative>(&reply) {
                    Ok(narrative) => return Ok(narrative),
                    Err(err) => last_error = LlmError::Parse(err.to_string()),
                },
                Err(err) => last_error = err,
            }
        }
        Err(last_error)
    }

    /// Scene narration; plain prose, no JSON contract.
    pub async fn narrate_scene(
        &self,
        scene: &ScenePayload,
        engine_summary: &str,
    ) -> Result<String, LlmError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(LlmError::NoApiKey);
        };
        let scene_json =
            serde_json::to_string(scene).map_err(|err| LlmError::Parse(err.to_string()))?;
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": "You are the narrator of a grounded \
                    text roguelike. Rewrite the scene payload as two or three \
                    sentences of second-person prose. Never invent facts absent \
                    from the payload." },
                { "role": "user", "content": format!("engine: {engine_summary}\nscene: {scene_json}") },
            ],
        });
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .timeout(NARRATIVE_TIMEOUT)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let payload: serde_json::Value = response.json().await?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::Parse("missing choices[0].message.content".to_string()))
    }
}

/// Deterministic narration used when the model is unavailable or fails.
pub fn fallback_narration(scene: &ScenePayload, engine_summary: &str) -> String {
    let mut lines = vec![format!("You are at {}.", scene.location.trim_end_matches('.'))];
    if !engine_summary.is_empty() {
        lines.push(format!("({engine_summary})"));
    }
    if let Some(nearest) = scene
        .visible_cells
        .iter()
        .find(|cell| cell.distance > 0 && !cell.description.is_empty())
    {
        lines.push(nearest.description.clone());
    }
    if !scene.present_npcs.is_empty() {
        let jobs: Vec<&str> = scene
            .present_npcs
            .iter()
            .take(3)
            .map(|npc| npc.job_category.as_str())
            .collect();
        lines.push(format!("Nearby: {}.", jobs.join(", ")));
    }
    lines.join(" ")
}

/// Parser-result cache keyed by `SHA-256(user_text|serialized_context)`.
#[derive(Debug)]
pub struct IntentCache {
    entries: Mutex<HashMap<String, (Instant, RawIntent)>>,
    ttl: Duration,
}

impl IntentCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn cache_key(user_text: &str, context: &GameContext) -> String {
        let context_json = serde_json::to_string(context).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(user_text.as_bytes());
        hasher.update(b"|");
        hasher.update(context_json.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub async fn get(&self, key: &str) -> Option<RawIntent> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((stored_at, intent)) if stored_at.elapsed() < self.ttl => Some(intent.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, key: String, intent: RawIntent) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        entries.insert(key, (Instant::now(), intent));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::action::RawAction;
    use contracts::state::Position;

    fn context() -> GameContext {
        GameContext {
            layer: 1,
            position: Position {
                mx: 3,
                my: 3,
                lx: 6,
                ly: 6,
            },
            visible_npcs: Vec::new(),
            inventory_names: vec!["rusty dagger".to_string()],
            cell_item_names: Vec::new(),
        }
    }

    #[test]
    fn cache_keys_depend_on_text_and_context() {
        let ctx = context();
        let a = IntentCache::cache_key("go north", &ctx);
        let b = IntentCache::cache_key("go north", &ctx);
        let c = IntentCache::cache_key("go south", &ctx);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut other = context();
        other.layer = 2;
        assert_ne!(a, IntentCache::cache_key("go north", &other));
    }

    #[tokio::test]
    async fn cache_entries_expire_after_ttl() {
        let cache = IntentCache::new(Duration::from_millis(20));
        let key = "k".to_string();
        let intent = RawIntent {
            primary_action: Some(RawAction {
                action: "look".to_string(),
                target: None,
                dir: None,
            }),
            secondary_actions: Vec::new(),
            compound: false,
            confidence: 0.9,
        };
        cache.put(key.clone(), intent.clone()).await;
        assert_eq!(cache.get(&key).await, Some(intent));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn disabled_client_reports_no_api_key() {
        let client = LlmClient::disabled();
        assert!(!client.available());
        let err = client
            .parse_intent("go north", &context())
            .await
            .expect_err("no key configured");
        assert!(matches!(err, LlmError::NoApiKey));
    }

    #[test]
    fn fallback_narration_reads_from_the_scene_only() {
        let scene = ScenePayload {
            layer: 1,
            position: Position {
                mx: 3,
                my: 3,
                lx: 6,
                ly: 6,
            },
            location: "A sand beach where gulls wheel against the wind.".to_string(),
            time_utc: "2026-08-01T12:00:00Z".to_string(),
            visible_cells: Vec::new(),
            present_npcs: Vec::new(),
            active_quests: Vec::new(),
            inventory_names: Vec::new(),
        };
        let prose = fallback_narration(&scene, "move north");
        assert!(prose.contains("sand beach"));
        assert!(prose.contains("move north"));
    }
}
