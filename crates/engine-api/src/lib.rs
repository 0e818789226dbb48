//! Per-session facade over the simulation core: the session table, the
//! turn flow with LLM adapters and deterministic fallbacks, system
//! commands, quest endpoints, and save plumbing.

mod llm;
mod saves;
mod server;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use contracts::action::GameContext;
use contracts::api::{
    InitResponse, NarrateResponse, QuestListResponse, QuestMutationResponse, SaveResponse,
    StatusResponse,
};
use contracts::quest::QuestStatus;
use contracts::state::SessionState;
use contracts::{ApiError, EngineConfig, ErrorCode};
use engine_core::action::{current_cell, present_npcs, resolve_intent};
use engine_core::npc::format_utc;
use engine_core::quest;
use engine_core::session::{new_session_state, normalize_cell_keys};
use engine_core::turn::{inventory_digest, run_turn, state_fingerprint_digest, TurnInput};
use engine_core::Effects;

pub use llm::{
    fallback_narration, IntentCache, LlmClient, LlmError, ENV_DEEPSEEK_API_KEY,
    ENV_DEEPSEEK_BASE_URL, ENV_DEEPSEEK_MODEL,
};
pub use saves::{sanitize_save_name, SaveError, SaveStore, DEFAULT_SAVE_ROOT, ENV_SAVE_ROOT};
pub use server::{serve, ServerError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemCommand {
    Save(Option<String>),
    Load(String),
    NewGame,
    ListSaves,
}

/// Chat-level commands that short-circuit the narrator.
pub fn detect_system_command(text: &str) -> Option<SystemCommand> {
    let lowered = text.trim().to_lowercase();
    match lowered.as_str() {
        "saves" | "my saves" | "list saves" | "show saves" => return Some(SystemCommand::ListSaves),
        "new game" | "restart" | "start over" => return Some(SystemCommand::NewGame),
        "save" => return Some(SystemCommand::Save(None)),
        _ => {}
    }
    if let Some(rest) = lowered.strip_prefix("save ") {
        let name = rest.strip_prefix("as ").unwrap_or(rest).trim();
        return Some(if name.is_empty() {
            SystemCommand::Save(None)
        } else {
            SystemCommand::Save(Some(name.to_string()))
        });
    }
    if let Some(rest) = lowered.strip_prefix("load ") {
        let name = rest.trim();
        if !name.is_empty() {
            return Some(SystemCommand::Load(name.to_string()));
        }
    }
    None
}

type SessionHandle = Arc<Mutex<SessionState>>;

pub struct SessionManager {
    config: EngineConfig,
    sessions: Mutex<BTreeMap<String, SessionHandle>>,
    saves: SaveStore,
    llm: LlmClient,
    intent_cache: IntentCache,
}

impl SessionManager {
    pub fn new(config: EngineConfig, save_root: impl Into<std::path::PathBuf>, llm: LlmClient) -> Self {
        let intent_cache = IntentCache::new(Duration::from_secs(config.intent_cache_ttl_secs));
        let max_slots = config.max_save_slots;
        Self {
            config,
            sessions: Mutex::new(BTreeMap::new()),
            saves: SaveStore::new(save_root.into(), max_slots),
            llm,
            intent_cache,
        }
    }

    pub fn from_env() -> Self {
        let save_root =
            std::env::var(ENV_SAVE_ROOT).unwrap_or_else(|_| DEFAULT_SAVE_ROOT.to_string());
        Self::new(EngineConfig::default(), save_root, LlmClient::from_env())
    }

    pub fn llm_available(&self) -> bool {
        self.llm.available()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn status(&self) -> StatusResponse {
        StatusResponse {
            schema_version: self.config.schema_version.clone(),
            sessions: self.session_count().await,
            llm_available: self.llm_available(),
            ruleset_rev: self.config.ruleset_rev.clone(),
        }
    }

    async fn get_or_create(&self, session_id: &str) -> SessionHandle {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(new_session_state(&self.config, 0, Utc::now())))
            })
            .clone()
    }

    /// `/init` and `/reset`: a fresh world, replacing any existing state
    /// for the session. A prompt runs the seeding turn immediately.
    pub async fn init_session(
        &self,
        session_id: &str,
        prompt: Option<String>,
        seed: Option<u32>,
    ) -> InitResponse {
        let mut state = new_session_state(&self.config, seed.unwrap_or(0), Utc::now());
        if let Some(prompt_text) = prompt.as_deref() {
            if let Ok(intent) = resolve_intent(None, prompt_text) {
                if let Ok(outcome) = run_turn(
                    &state,
                    &self.config,
                    TurnInput {
                        user_text: prompt_text.to_string(),
                        intent,
                        now_utc: Utc::now(),
                        turn_id: None,
                    },
                ) {
                    state = outcome.state;
                }
            }
        }

        let handle = self.get_or_create(session_id).await;
        let mut guard = handle.lock().await;
        *guard = state.clone();

        InitResponse {
            session_id: session_id.to_string(),
            status: "world_created".to_string(),
            state,
            prompt,
        }
    }

    fn game_context(state: &SessionState) -> GameContext {
        GameContext {
            layer: state.world.current_layer,
            position: state.world.position,
            visible_npcs: present_npcs(state)
                .into_iter()
                .map(|npc| npc.id.clone())
                .collect(),
            inventory_names: state
                .player
                .inventory
                .iter()
                .map(|item| item.name.clone())
                .collect(),
            cell_item_names: current_cell(state)
                .map(|cell| cell.items.iter().map(|item| item.name.clone()).collect())
                .unwrap_or_default(),
        }
    }

    fn error_response(session_id: &str, error: ApiError) -> NarrateResponse {
        NarrateResponse {
            session_id: session_id.to_string(),
            narrative: None,
            state: None,
            engine_output: None,
            scene: None,
            debug: None,
            system_command: None,
            restart: None,
            error: Some(error),
        }
    }

    /// One `/narrate` turn. State is swapped atomically at the end; any
    /// failure leaves the stored state untouched.
    pub async fn narrate(&self, session_id: &str, text: &str) -> NarrateResponse {
        if text.trim().is_empty() {
            return Self::error_response(
                session_id,
                ApiError::new(ErrorCode::EmptyInput, "empty action text", None),
            );
        }

        if let Some(command) = detect_system_command(text) {
            return self.run_system_command(session_id, command).await;
        }

        let handle = self.get_or_create(session_id).await;
        let mut guard = handle.lock().await;

        let context = Self::game_context(&guard);
        let cache_key = IntentCache::cache_key(text, &context);
        let mut used_cache = true;
        let mut raw = self.intent_cache.get(&cache_key).await;
        if raw.is_none() {
            used_cache = false;
            if self.llm.available() {
                if let Ok(parsed) = self.llm.parse_intent(text, &context).await {
                    self.intent_cache.put(cache_key, parsed.clone()).await;
                    raw = Some(parsed);
                }
            }
        }

        let intent = match resolve_intent(raw.as_ref(), text) {
            Ok(intent) => intent,
            Err(code) => {
                return Self::error_response(
                    session_id,
                    ApiError::new(code, "could not resolve an intent", None),
                )
            }
        };
        let used_semantic_parser = raw.is_some();

        let outcome = match run_turn(
            &guard,
            &self.config,
            TurnInput {
                user_text: text.to_string(),
                intent: intent.clone(),
                now_utc: Utc::now(),
                turn_id: None,
            },
        ) {
            Ok(outcome) => outcome,
            Err(error) => return Self::error_response(session_id, error),
        };

        let mut next = outcome.state;
        for request in &outcome.narrative_requests {
            let candidate = if self.llm.available() {
                self.llm.quest_narrative(request).await.ok()
            } else {
                None
            };
            quest::attach_narrative(&mut next, &request.settlement_id, &request.quest_id, candidate);
        }

        let narrative = match self.llm.narrate_scene(&outcome.scene, &outcome.summary).await {
            Ok(prose) => prose,
            Err(_) => fallback_narration(&outcome.scene, &outcome.summary),
        };

        *guard = next.clone();

        NarrateResponse {
            session_id: session_id.to_string(),
            narrative: Some(narrative),
            state: Some(next),
            engine_output: Some(outcome.blocks),
            scene: Some(outcome.scene),
            debug: Some(serde_json::json!({
                "intent": intent.primary.label(),
                "confidence": intent.confidence,
                "semantic_parser": used_semantic_parser,
                "intent_cache_hit": used_cache,
                "narrative_requests": outcome.narrative_requests.len(),
            })),
            system_command: None,
            restart: None,
            error: None,
        }
    }

    async fn run_system_command(
        &self,
        session_id: &str,
        command: SystemCommand,
    ) -> NarrateResponse {
        let mut response = NarrateResponse {
            session_id: session_id.to_string(),
            narrative: None,
            state: None,
            engine_output: None,
            scene: None,
            debug: None,
            system_command: Some(true),
            restart: None,
            error: None,
        };

        match command {
            SystemCommand::Save(name) => {
                let handle = self.get_or_create(session_id).await;
                let guard = handle.lock().await;
                let resolved_name = match name {
                    Some(name) => name,
                    None => match self.saves.next_free_name(session_id) {
                        Ok(name) => name,
                        Err(err) => {
                            response.error = Some(ApiError::new(
                                err.error_code(),
                                err.to_string(),
                                None,
                            ));
                            return response;
                        }
                    },
                };
                match self
                    .saves
                    .save(session_id, &resolved_name, &guard, &format_utc(Utc::now()))
                {
                    Ok(saved_as) => {
                        response.narrative = Some(format!("Game saved as \"{saved_as}\"."));
                    }
                    Err(err) => {
                        response.error =
                            Some(ApiError::new(err.error_code(), err.to_string(), None));
                    }
                }
            }
            SystemCommand::Load(name) => match self.saves.load(session_id, &name) {
                Ok(envelope) => {
                    let handle = self.get_or_create(session_id).await;
                    let mut guard = handle.lock().await;
                    let mut restored = envelope.game_state;
                    normalize_cell_keys(&mut restored);
                    *guard = restored.clone();
                    response.narrative =
                        Some(format!("Loaded \"{}\".", envelope.save_name));
                    response.state = Some(restored);
                }
                Err(err) => {
                    response.error = Some(ApiError::new(err.error_code(), err.to_string(), None));
                }
            },
            SystemCommand::NewGame => {
                let handle = self.get_or_create(session_id).await;
                let mut guard = handle.lock().await;
                let fresh = new_session_state(&self.config, 0, Utc::now());
                *guard = fresh.clone();
                response.narrative = Some("A new world waits for its first words.".to_string());
                response.state = Some(fresh);
                response.restart = Some(true);
            }
            SystemCommand::ListSaves => match self.saves.list(session_id) {
                Ok(saves) => {
                    let names: Vec<String> =
                        saves.iter().map(|meta| meta.save_name.clone()).collect();
                    response.narrative = Some(if names.is_empty() {
                        "No saves yet.".to_string()
                    } else {
                        format!("Saves: {}.", names.join(", "))
                    });
                    response.debug = Some(serde_json::json!({ "saves": saves }));
                }
                Err(err) => {
                    response.error = Some(ApiError::new(err.error_code(), err.to_string(), None));
                }
            },
        }

        response
    }

    pub async fn save_state(
        &self,
        session_id: &str,
        save_name: &str,
        provided: Option<SessionState>,
    ) -> SaveResponse {
        let state = match provided {
            Some(state) => state,
            None => {
                let handle = self.get_or_create(session_id).await;
                let guard = handle.lock().await;
                guard.clone()
            }
        };
        match self
            .saves
            .save(session_id, save_name, &state, &format_utc(Utc::now()))
        {
            Ok(saved_as) => SaveResponse {
                success: true,
                save_name: Some(saved_as.clone()),
                message: Some(format!("Saved as \"{saved_as}\".")),
                game_state: None,
                saves: None,
                error: None,
            },
            Err(err) => SaveResponse {
                success: false,
                save_name: None,
                message: None,
                game_state: None,
                saves: None,
                error: Some(ApiError::new(err.error_code(), err.to_string(), None)),
            },
        }
    }

    pub async fn load_state(&self, session_id: &str, save_name: &str) -> SaveResponse {
        match self.saves.load(session_id, save_name) {
            Ok(envelope) => {
                let handle = self.get_or_create(session_id).await;
                let mut guard = handle.lock().await;
                let mut restored = envelope.game_state;
                normalize_cell_keys(&mut restored);
                *guard = restored.clone();
                SaveResponse {
                    success: true,
                    save_name: Some(envelope.save_name),
                    message: None,
                    game_state: Some(restored),
                    saves: None,
                    error: None,
                }
            }
            Err(err) => SaveResponse {
                success: false,
                save_name: None,
                message: None,
                game_state: None,
                saves: None,
                error: Some(ApiError::new(err.error_code(), err.to_string(), None)),
            },
        }
    }

    pub async fn list_saves(&self, session_id: &str) -> SaveResponse {
        match self.saves.list(session_id) {
            Ok(saves) => SaveResponse {
                success: true,
                save_name: None,
                message: None,
                game_state: None,
                saves: Some(saves),
                error: None,
            },
            Err(err) => SaveResponse {
                success: false,
                save_name: None,
                message: None,
                game_state: None,
                saves: None,
                error: Some(ApiError::new(err.error_code(), err.to_string(), None)),
            },
        }
    }

    pub async fn new_save_name(&self, session_id: &str) -> SaveResponse {
        match self.saves.next_free_name(session_id) {
            Ok(name) => SaveResponse {
                success: true,
                save_name: Some(name),
                message: None,
                game_state: None,
                saves: None,
                error: None,
            },
            Err(err) => SaveResponse {
                success: false,
                save_name: None,
                message: None,
                game_state: None,
                saves: None,
                error: Some(ApiError::new(err.error_code(), err.to_string(), None)),
            },
        }
    }

    /// Applies out-of-band quest effects: counters, digests, fingerprints.
    fn commit_effects(state: &mut SessionState, effects: Effects) {
        if effects.deltas.is_empty() && !effects.inventory_rev {
            return;
        }
        state.counters.state_rev += 1;
        if effects.cell_rev {
            state.counters.cell_rev += 1;
        }
        if effects.site_rev {
            state.counters.site_rev += 1;
        }
        if effects.inventory_rev {
            state.counters.inventory_rev += 1;
            state.digests.inventory_digest = inventory_digest(state);
        }
        if effects.merchant_state_rev {
            state.counters.merchant_state_rev += 1;
        }
        if effects.faction_rev {
            state.counters.faction_rev += 1;
        }
        state.ledger_len += effects.deltas.len() as u64;
        state.fingerprint.hex_digest_state = state_fingerprint_digest(state);
        state.fingerprint.hex_digest = state.fingerprint.hex_digest_state.clone();
    }

    pub async fn quest_available(&self, session_id: &str, settlement_id: &str) -> QuestListResponse {
        let handle = self.get_or_create(session_id).await;
        let guard = handle.lock().await;
        let quests = guard
            .quests
            .all_quests_seeded
            .get(settlement_id)
            .map(|quests| {
                quests
                    .iter()
                    .filter(|quest| quest.status == QuestStatus::Available)
                    .filter(|quest| !guard.quests.active.iter().any(|active| active.id == quest.id))
                    .filter(|quest| {
                        !guard
                            .quests
                            .completed
                            .iter()
                            .any(|completed| completed.id == quest.id)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        QuestListResponse {
            session_id: session_id.to_string(),
            quests,
        }
    }

    pub async fn quest_active(&self, session_id: &str) -> QuestListResponse {
        let handle = self.get_or_create(session_id).await;
        let guard = handle.lock().await;
        QuestListResponse {
            session_id: session_id.to_string(),
            quests: guard.quests.active.clone(),
        }
    }

    pub async fn quest_accept(
        &self,
        session_id: &str,
        quest_id: &str,
        _npc_id: Option<&str>,
    ) -> QuestMutationResponse {
        let handle = self.get_or_create(session_id).await;
        let mut guard = handle.lock().await;
        let mut effects = Effects::new();
        match quest::accept_quest(&mut guard, Some(quest_id), &mut effects) {
            Ok(quest) => {
                Self::commit_effects(&mut guard, effects);
                QuestMutationResponse {
                    session_id: session_id.to_string(),
                    success: true,
                    quest: Some(quest),
                    error: None,
                }
            }
            Err(code) => QuestMutationResponse {
                session_id: session_id.to_string(),
                success: false,
                quest: None,
                error: Some(ApiError::new(code, "quest acceptance failed", None)),
            },
        }
    }

    pub async fn quest_progress(
        &self,
        session_id: &str,
        quest_id: &str,
        step: Option<usize>,
    ) -> QuestMutationResponse {
        let handle = self.get_or_create(session_id).await;
        let mut guard = handle.lock().await;
        let mut effects = Effects::new();
        match quest::progress_quest(&mut guard, Some(quest_id), step, &mut effects) {
            Ok(quest) => {
                Self::commit_effects(&mut guard, effects);
                QuestMutationResponse {
                    session_id: session_id.to_string(),
                    success: true,
                    quest: Some(quest),
                    error: None,
                }
            }
            Err(code) => QuestMutationResponse {
                session_id: session_id.to_string(),
                success: false,
                quest: None,
                error: Some(ApiError::new(code, "quest progress failed", None)),
            },
        }
    }

    pub async fn quest_complete(&self, session_id: &str, quest_id: &str) -> QuestMutationResponse {
        let handle = self.get_or_create(session_id).await;
        let mut guard = handle.lock().await;
        let mut effects = Effects::new();
        match quest::complete_quest(&mut guard, Some(quest_id), None, &mut effects) {
            Ok(quest) => {
                Self::commit_effects(&mut guard, effects);
                QuestMutationResponse {
                    session_id: session_id.to_string(),
                    success: true,
                    quest: Some(quest),
                    error: None,
                }
            }
            Err(code) => QuestMutationResponse {
                session_id: session_id.to_string(),
                success: false,
                quest: None,
                error: Some(ApiError::new(code, "quest completion failed", None)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_manager(tag: &str) -> SessionManager {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        SessionManager::new(
            EngineConfig::default(),
            std::env::temp_dir().join(format!("world_api_{tag}_{nanos}")),
            LlmClient::disabled(),
        )
    }

    #[test]
    fn system_commands_are_detected() {
        assert_eq!(
            detect_system_command("save as Harbor Run"),
            Some(SystemCommand::Save(Some("harbor run".to_string())))
        );
        assert_eq!(detect_system_command("save"), Some(SystemCommand::Save(None)));
        assert_eq!(
            detect_system_command("load harbor run"),
            Some(SystemCommand::Load("harbor run".to_string()))
        );
        assert_eq!(detect_system_command("start over"), Some(SystemCommand::NewGame));
        assert_eq!(detect_system_command("my saves"), Some(SystemCommand::ListSaves));
        assert_eq!(detect_system_command("go north"), None);
    }

    #[tokio::test]
    async fn first_narrate_seeds_the_world_without_an_llm() {
        let manager = temp_manager("seed");
        let response = manager
            .narrate("session_1", "A windy coast of pine islands.")
            .await;
        assert!(response.error.is_none());
        let state = response.state.expect("state present");
        assert_eq!(state.turn_counter, 1);
        assert_eq!(state.world.macro_biome, Some(contracts::Biome::Coast));
        assert_eq!(state.world.macro_cells.len(), 64);
        assert!(response.narrative.expect("narrative").len() > 10);
    }

    #[tokio::test]
    async fn narrate_error_leaves_state_unchanged() {
        let manager = temp_manager("error");
        let first = manager
            .narrate("session_2", "A dry canyon.")
            .await
            .state
            .expect("seeded");

        let response = manager.narrate("session_2", "drop ghost").await;
        let error = response.error.expect("validation error");
        assert_eq!(error.error_code, ErrorCode::TargetNotInInventory);

        let after = manager
            .narrate("session_2", "look")
            .await
            .state
            .expect("state");
        assert_eq!(after.turn_counter, first.turn_counter + 1);
    }

    #[tokio::test]
    async fn save_then_load_round_trips_through_narrate() {
        let manager = temp_manager("saveload");
        let seeded = manager
            .narrate("session_3", "A dry canyon.")
            .await
            .state
            .expect("seeded");

        let saved = manager.narrate("session_3", "save as one").await;
        assert_eq!(saved.system_command, Some(true));
        assert!(saved.error.is_none());

        // A second save with the same name lands in the suffixed slot.
        let again = manager.narrate("session_3", "save as one").await;
        assert!(again
            .narrative
            .expect("message names the file")
            .contains("one (1)"));

        manager.narrate("session_3", "go north").await;
        let loaded = manager.narrate("session_3", "load one").await;
        assert_eq!(loaded.system_command, Some(true));
        assert_eq!(loaded.state.expect("restored"), seeded);
    }

    #[tokio::test]
    async fn init_with_prompt_returns_a_created_world() {
        let manager = temp_manager("init");
        let response = manager
            .init_session("session_4", Some("A frozen tundra pass.".to_string()), None)
            .await;
        assert_eq!(response.status, "world_created");
        assert_eq!(
            response.state.world.macro_biome,
            Some(contracts::Biome::Tundra)
        );
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn quest_endpoints_share_session_state() {
        let manager = temp_manager("quests");
        let seeded = manager
            .narrate("session_5", "A windy coast of pine islands.")
            .await
            .state
            .expect("seeded");

        // Walk into a settlement deterministically by driving the state
        // through the facade's own session handle.
        let plan = seeded
            .world
            .macro_cells
            .get("3,3")
            .and_then(|entry| entry.site_plan.clone())
            .expect("plan");
        let cluster = plan.clusters.first().expect("cluster");
        {
            let handle = manager.get_or_create("session_5").await;
            let mut guard = handle.lock().await;
            guard.world.position.lx = cluster.center.lx;
            guard.world.position.ly = cluster.center.ly;
        }
        manager.narrate("session_5", "look").await;
        let entered = manager
            .narrate("session_5", "go down")
            .await
            .state
            .expect("entered");
        let settlement_id = entered.world.l2_active.clone().expect("active settlement");

        let available = manager.quest_available("session_5", &settlement_id).await;
        if let Some(first) = available.quests.first() {
            let accepted = manager
                .quest_accept("session_5", &first.id, None)
                .await;
            assert!(accepted.success, "{:?}", accepted.error);
            let active = manager.quest_active("session_5").await;
            assert_eq!(active.quests.len(), 1);

            let repeat = manager.quest_accept("session_5", &first.id, None).await;
            assert_eq!(
                repeat.error.expect("duplicate accept rejected").error_code,
                ErrorCode::QuestAlreadyActive
            );
        }
    }
}
