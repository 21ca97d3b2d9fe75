//! Async front for the chat pipeline.
//!
//! Store and model work run on the blocking pool. Model calls are capped by a
//! semaphore; the permit travels into the blocking task so an abandoned
//! request still counts against the cap until its completion returns.
//!
//! The Ollama client is blocking, so it is built, used and listed only from
//! blocking-pool threads.

use std::sync::Arc;

use tokio::sync::Semaphore;
use uuid::Uuid;

use super::ServiceError;
use crate::config::AppConfig;
use crate::db::{SqliteStore, TranscriptStore};
use crate::models::ChatMessage;
use crate::pipeline::chat::ChatOrchestrator;
use crate::pipeline::llm::{OllamaClient, OllamaGenerator};

pub struct ChatService {
    orchestrator: Arc<ChatOrchestrator>,
    generation_permits: Arc<Semaphore>,
}

impl ChatService {
    pub fn new(orchestrator: ChatOrchestrator, max_concurrent_generations: usize) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            generation_permits: Arc::new(Semaphore::new(max_concurrent_generations.max(1))),
        }
    }

    /// Service backed by the configured Ollama server and model.
    pub async fn connect_ollama(
        store: Arc<SqliteStore>,
        config: &AppConfig,
    ) -> Result<Self, ServiceError> {
        let url = config.ollama_url.clone();
        let model = config.model.clone();
        let timeout = config.connect_timeout;
        let generator = tokio::task::spawn_blocking(move || {
            OllamaClient::new(&url, timeout).map(|client| OllamaGenerator::new(client, model))
        })
        .await??;

        let mut orchestrator =
            ChatOrchestrator::new(store.clone(), store.clone(), store, Arc::new(generator));
        if let Some(max_chars) = config.context_max_chars {
            orchestrator = orchestrator.with_context_budget(max_chars);
        }
        Ok(Self::new(orchestrator, config.max_concurrent_generations))
    }

    /// One chat exchange. Dropping the returned future while the model is
    /// still generating discards the completion; nothing is persisted.
    pub async fn handle_chat(
        &self,
        user_input: String,
        patient_id: Option<Uuid>,
    ) -> Result<ChatMessage, ServiceError> {
        let orch = self.orchestrator.clone();
        let prepared =
            tokio::task::spawn_blocking(move || orch.prepare(&user_input, patient_id)).await??;

        let permit = self
            .generation_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServiceError::Internal("generation pool closed".into()))?;

        let orch = self.orchestrator.clone();
        let (prepared, response) = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            orch.generate(&prepared).map(|response| (prepared, response))
        })
        .await??;

        let orch = self.orchestrator.clone();
        let message = tokio::task::spawn_blocking(move || orch.record(prepared, response)).await??;
        Ok(message)
    }

    pub async fn list_chat(
        &self,
        patient_id: Option<Uuid>,
    ) -> Result<Vec<ChatMessage>, ServiceError> {
        let orch = self.orchestrator.clone();
        let messages = tokio::task::spawn_blocking(move || orch.list_chat(patient_id)).await??;
        Ok(messages)
    }

    /// Model calls that may start right now without waiting.
    pub fn available_generation_slots(&self) -> usize {
        self.generation_permits.available_permits()
    }
}

/// Stored transcript, newest first. Needs no model connection.
pub async fn chat_history<S>(
    store: Arc<S>,
    patient_id: Option<Uuid>,
) -> Result<Vec<ChatMessage>, ServiceError>
where
    S: TranscriptStore + 'static,
{
    let messages = tokio::task::spawn_blocking(move || store.list(patient_id.as_ref())).await??;
    Ok(messages)
}

/// Model names installed on the configured Ollama server.
pub async fn available_models(config: &AppConfig) -> Result<Vec<String>, ServiceError> {
    let url = config.ollama_url.clone();
    let timeout = config.connect_timeout;
    let models = tokio::task::spawn_blocking(move || {
        OllamaClient::new(&url, timeout).and_then(|client| client.list_models())
    })
    .await??;
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::db::{PatientStore, SqliteStore};
    use crate::models::enums::MessageType;
    use crate::pipeline::llm::{LlmError, LlmGenerate};

    /// Sleeps before answering and tracks peak concurrency.
    struct SlowLlm {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SlowLlm {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl LlmGenerate for SlowLlm {
        fn complete(&self, prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("Reviewed: {prompt}"))
        }
    }

    struct UrgentLlm;

    impl LlmGenerate for UrgentLlm {
        fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok("URGENT: seek emergency care".into())
        }
    }

    fn service(store: &Arc<SqliteStore>, llm: Arc<dyn LlmGenerate>, cap: usize) -> ChatService {
        let orch = ChatOrchestrator::new(store.clone(), store.clone(), store.clone(), llm);
        ChatService::new(orch, cap)
    }

    #[tokio::test]
    async fn chat_round_trip_through_service() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let patient = store.create("NFC-SVC", "Svc").unwrap();
        let svc = service(&store, Arc::new(UrgentLlm), 2);

        let msg = svc
            .handle_chat("Severe headache".into(), Some(patient.id))
            .await
            .unwrap();

        assert!(msg.requires_follow_up);
        assert_eq!(msg.message_type, MessageType::Emergency);
        assert_eq!(svc.list_chat(Some(patient.id)).await.unwrap(), vec![msg]);
    }

    #[tokio::test]
    async fn validation_and_not_found_surface_as_service_errors() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let svc = service(&store, Arc::new(UrgentLlm), 1);

        let empty = svc.handle_chat(String::new(), None).await.unwrap_err();
        assert!(matches!(empty, ServiceError::Validation(_)));

        let missing = svc
            .handle_chat("hi".into(), Some(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(missing, ServiceError::NotFound(_)));

        assert!(svc.list_chat(None).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_generations_are_capped() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let llm = SlowLlm::new(Duration::from_millis(50));
        let svc = Arc::new(service(&store, llm.clone(), 2));

        let tasks: Vec<_> = (0..6)
            .map(|i| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.handle_chat(format!("question {i}"), None).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(llm.calls.load(Ordering::SeqCst), 6);
        assert!(llm.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(svc.list_chat(None).await.unwrap().len(), 6);
        assert_eq!(svc.available_generation_slots(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abandoned_request_persists_nothing() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let llm = SlowLlm::new(Duration::from_millis(300));
        let svc = service(&store, llm.clone(), 1);

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            svc.handle_chat("slow question".into(), None),
        )
        .await;
        assert!(outcome.is_err());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
        assert!(svc.list_chat(None).await.unwrap().is_empty());
        assert_eq!(svc.available_generation_slots(), 1);
    }

    /// Config pointing at a local port with nothing listening.
    fn unreachable_ollama_config() -> AppConfig {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        AppConfig {
            ollama_url: format!("http://127.0.0.1:{port}"),
            connect_timeout: Duration::from_secs(2),
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn ollama_service_builds_inside_runtime() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let patient = store.create("NFC-RT", "Runtime").unwrap();
        let config = unreachable_ollama_config();

        let svc = ChatService::connect_ollama(store.clone(), &config).await.unwrap();

        assert!(svc.list_chat(Some(patient.id)).await.unwrap().is_empty());
        let err = svc
            .handle_chat("Any news?".into(), Some(patient.id))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Model(_)));
        assert!(chat_history(store, Some(patient.id)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn model_listing_reports_unreachable_server() {
        let config = unreachable_ollama_config();
        let err = available_models(&config).await.unwrap_err();
        assert!(matches!(err, ServiceError::Model(_)));
    }

    #[tokio::test]
    async fn history_lists_without_model() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let patient = store.create("NFC-HIST", "Hist").unwrap();
        let svc = service(&store, Arc::new(UrgentLlm), 1);
        let msg = svc
            .handle_chat("Chest pain".into(), Some(patient.id))
            .await
            .unwrap();

        let history = chat_history(store.clone(), Some(patient.id)).await.unwrap();

        assert_eq!(history, vec![msg]);
        assert!(chat_history(store, Some(Uuid::new_v4())).await.unwrap().is_empty());
    }

    #[test]
    fn zero_cap_is_raised_to_one() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let svc = service(&store, Arc::new(UrgentLlm), 0);
        assert_eq!(svc.available_generation_slots(), 1);
    }
}
