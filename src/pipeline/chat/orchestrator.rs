use std::sync::Arc;

use chrono::Local;
use uuid::Uuid;

use super::context::render_context;
use super::prompt::build_prompt;
use super::urgency::matched_markers;
use super::ChatError;
use crate::db::{PatientStore, RecordStore, TranscriptStore};
use crate::models::enums::MessageType;
use crate::models::ChatMessage;
use crate::pipeline::llm::LlmGenerate;

/// A validated request with its prompt assembled, ready for the model.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedChat {
    pub user_input: String,
    pub patient_id: Option<Uuid>,
    pub prompt: String,
}

/// Chat pipeline: validate → fetch → render → generate → classify → persist.
///
/// Every collaborator is injected, so independent instances never share state
/// beyond the stores they are handed.
pub struct ChatOrchestrator {
    patients: Arc<dyn PatientStore>,
    records: Arc<dyn RecordStore>,
    transcript: Arc<dyn TranscriptStore>,
    generator: Arc<dyn LlmGenerate>,
    max_context_chars: Option<usize>,
}

impl ChatOrchestrator {
    pub fn new(
        patients: Arc<dyn PatientStore>,
        records: Arc<dyn RecordStore>,
        transcript: Arc<dyn TranscriptStore>,
        generator: Arc<dyn LlmGenerate>,
    ) -> Self {
        Self {
            patients,
            records,
            transcript,
            generator,
            max_context_chars: None,
        }
    }

    /// Cap the rendered context at `max_chars` characters. Unbounded by default.
    pub fn with_context_budget(mut self, max_chars: usize) -> Self {
        self.max_context_chars = Some(max_chars);
        self
    }

    /// Run one exchange end to end. Nothing is written unless the model
    /// produced a usable response.
    pub fn handle_chat(
        &self,
        user_input: &str,
        patient_id: Option<Uuid>,
    ) -> Result<ChatMessage, ChatError> {
        let prepared = self.prepare(user_input, patient_id)?;
        let response = self.generate(&prepared)?;
        self.record(prepared, response)
    }

    /// Validate the input, load the patient and history, and assemble the prompt.
    pub fn prepare(
        &self,
        user_input: &str,
        patient_id: Option<Uuid>,
    ) -> Result<PreparedChat, ChatError> {
        if user_input.trim().is_empty() {
            return Err(ChatError::Validation("user_input must not be empty".into()));
        }

        let context = match patient_id {
            Some(id) => {
                let patient = self
                    .patients
                    .find_by_id(&id)?
                    .ok_or(ChatError::PatientNotFound(id))?;
                let records = self.records.list_for_patient(&id)?;
                render_context(
                    &patient,
                    &records,
                    Local::now().date_naive(),
                    self.max_context_chars,
                )
            }
            None => String::new(),
        };

        Ok(PreparedChat {
            user_input: user_input.to_string(),
            patient_id,
            prompt: build_prompt(&context, user_input),
        })
    }

    /// Invoke the model. Blocks for the duration of the completion.
    pub fn generate(&self, prepared: &PreparedChat) -> Result<String, ChatError> {
        Ok(self.generator.complete(&prepared.prompt)?)
    }

    /// Classify the response and persist the transcript entry.
    pub fn record(
        &self,
        prepared: PreparedChat,
        response: String,
    ) -> Result<ChatMessage, ChatError> {
        let markers = matched_markers(&response);
        let urgent = !markers.is_empty();

        let message = ChatMessage {
            id: Uuid::new_v4(),
            user_input: prepared.user_input,
            ai_response: response,
            created_at: Local::now().naive_local(),
            patient_id: prepared.patient_id,
            message_type: if urgent {
                MessageType::Emergency
            } else {
                MessageType::Query
            },
            confidence_score: 0.0,
            requires_follow_up: urgent,
        };

        let stored = self.transcript.insert(&message)?;

        if urgent {
            tracing::warn!(
                message_id = %stored.id,
                patient_id = ?stored.patient_id,
                markers = ?markers,
                "Model response flagged for follow-up"
            );
        } else {
            tracing::info!(
                message_id = %stored.id,
                patient_id = ?stored.patient_id,
                "Chat exchange recorded"
            );
        }

        Ok(stored)
    }

    /// Transcript entries newest first, optionally for one patient.
    pub fn list_chat(&self, patient_id: Option<Uuid>) -> Result<Vec<ChatMessage>, ChatError> {
        Ok(self.transcript.list(patient_id.as_ref())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::db::{self, SqliteStore};
    use crate::models::enums::Severity;
    use crate::models::*;
    use crate::pipeline::llm::LlmError;

    /// Echoes the prompt back as the completion.
    struct EchoLlm;

    impl LlmGenerate for EchoLlm {
        fn complete(&self, prompt: &str) -> Result<String, LlmError> {
            Ok(prompt.to_string())
        }
    }

    struct FixedLlm(String);

    impl FixedLlm {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self(response.to_string()))
        }
    }

    impl LlmGenerate for FixedLlm {
        fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok(self.0.clone())
        }
    }

    struct FailingLlm;

    impl LlmGenerate for FailingLlm {
        fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Err(LlmError::Connection("http://localhost:11434".into()))
        }
    }

    #[derive(Default)]
    struct CountingLlm {
        calls: AtomicUsize,
    }

    impl LlmGenerate for CountingLlm {
        fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("ok".into())
        }
    }

    /// Shared sink for log lines emitted while a closure runs.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .without_time()
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, buffer.contents())
    }

    fn orchestrator(store: &Arc<SqliteStore>, llm: Arc<dyn LlmGenerate>) -> ChatOrchestrator {
        ChatOrchestrator::new(store.clone(), store.clone(), store.clone(), llm)
    }

    fn patient_with_diabetes(store: &SqliteStore) -> Patient {
        let patient = store.create("NFC-DIA", "Diabetic Patient").unwrap();
        let record = MedicalRecord::from_new(
            patient.id,
            NewMedicalRecord {
                condition: "Diabetes".into(),
                description: "Type 2 Diabetes".into(),
                severity: Severity::Moderate,
                ..NewMedicalRecord::default()
            },
        );
        store
            .with_conn(|conn| db::insert_medical_record(conn, &record))
            .unwrap();
        patient
    }

    #[test]
    fn echo_scenario_includes_history_without_urgency() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let patient = patient_with_diabetes(&store);
        let orch = orchestrator(&store, Arc::new(EchoLlm));

        let msg = orch.handle_chat("What should I eat?", Some(patient.id)).unwrap();

        assert!(msg.ai_response.contains("Diabetes"));
        assert!(msg.ai_response.contains("Type 2 Diabetes"));
        assert!(msg.ai_response.ends_with("Current query: What should I eat?"));
        assert!(!msg.requires_follow_up);
        assert_eq!(msg.message_type, MessageType::Query);
        assert_eq!(msg.patient_id, Some(patient.id));
        assert_eq!(msg.confidence_score, 0.0);
    }

    #[test]
    fn urgent_response_flagged_as_emergency() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = orchestrator(&store, FixedLlm::new("This requires immediate attention."));

        let msg = orch.handle_chat("Chest pain?", None).unwrap();

        assert!(msg.requires_follow_up);
        assert_eq!(msg.message_type, MessageType::Emergency);
        assert_eq!(orch.list_chat(None).unwrap(), vec![msg]);
    }

    #[test]
    fn prompt_without_patient_is_query_verbatim() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = orchestrator(&store, Arc::new(EchoLlm));

        let prepared = orch.prepare("Dosage for ibuprofen?", None).unwrap();
        assert_eq!(prepared.prompt, "Dosage for ibuprofen?");

        let msg = orch.handle_chat("Dosage for ibuprofen?", None).unwrap();
        assert_eq!(msg.ai_response, "Dosage for ibuprofen?");
        assert_eq!(msg.patient_id, None);
    }

    #[test]
    fn prompt_has_one_pair_per_record_newest_first() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let patient = store.create("NFC-MULTI", "Multi").unwrap();
        for (i, condition) in ["Asthma", "Gout", "Anemia"].iter().enumerate() {
            let mut record = MedicalRecord::from_new(
                patient.id,
                NewMedicalRecord {
                    condition: condition.to_string(),
                    description: format!("{condition} details"),
                    ..NewMedicalRecord::default()
                },
            );
            record.created_at += chrono::Duration::seconds(i as i64);
            store
                .with_conn(|conn| db::insert_medical_record(conn, &record))
                .unwrap();
        }
        let orch = orchestrator(&store, Arc::new(EchoLlm));

        let prompt = orch.prepare("Any concerns?", Some(patient.id)).unwrap().prompt;

        assert_eq!(prompt.matches("- Condition: ").count(), 3);
        assert_eq!(prompt.matches("  Description: ").count(), 3);
        let anemia = prompt.find("Anemia").unwrap();
        let gout = prompt.find("Gout").unwrap();
        let asthma = prompt.find("Asthma").unwrap();
        assert!(anemia < gout && gout < asthma);
        assert!(prompt.ends_with("Any concerns?"));
        assert_eq!(prompt.matches("Any concerns?").count(), 1);
    }

    #[test]
    fn empty_input_is_validation_error_and_writes_nothing() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let llm = Arc::new(CountingLlm::default());
        let orch = orchestrator(&store, llm.clone());

        for input in ["", "   \n\t"] {
            let err = orch.handle_chat(input, None).unwrap_err();
            assert!(matches!(err, ChatError::Validation(_)));
        }
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
        assert!(orch.list_chat(None).unwrap().is_empty());
    }

    #[test]
    fn unknown_patient_is_not_found_and_writes_nothing() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let llm = Arc::new(CountingLlm::default());
        let orch = orchestrator(&store, llm.clone());
        let missing = Uuid::new_v4();

        let err = orch.handle_chat("Hello", Some(missing)).unwrap_err();

        assert!(matches!(err, ChatError::PatientNotFound(id) if id == missing));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
        assert!(orch.list_chat(None).unwrap().is_empty());
    }

    #[test]
    fn model_failure_propagates_and_writes_nothing() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = orchestrator(&store, Arc::new(FailingLlm));

        let err = orch.handle_chat("Hello", None).unwrap_err();

        assert!(matches!(err, ChatError::Model(LlmError::Connection(_))));
        assert!(orch.list_chat(None).unwrap().is_empty());
    }

    #[test]
    fn response_stored_unmodified() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = orchestrator(&store, FixedLlm::new(&"x".repeat(50_000)));

        let msg = orch.handle_chat("Long answer please", None).unwrap();

        assert_eq!(msg.ai_response.len(), 50_000);
        assert_eq!(orch.list_chat(None).unwrap()[0].ai_response.len(), 50_000);
    }

    #[test]
    fn list_chat_filters_by_patient_and_is_idempotent() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let p = store.create("NFC-P", "P").unwrap();
        let other = store.create("NFC-O", "O").unwrap();
        let orch = orchestrator(&store, FixedLlm::new("Stay hydrated."));

        let mine = orch.handle_chat("for P", Some(p.id)).unwrap();
        orch.handle_chat("for other", Some(other.id)).unwrap();

        let first = orch.list_chat(Some(p.id)).unwrap();
        assert_eq!(first, vec![mine]);

        let second = orch.list_chat(Some(p.id)).unwrap();
        assert_eq!(first, second);
        assert_eq!(orch.list_chat(None).unwrap().len(), 2);
    }

    #[test]
    fn list_chat_newest_first() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = orchestrator(&store, FixedLlm::new("ok"));

        orch.handle_chat("first", None).unwrap();
        orch.handle_chat("second", None).unwrap();

        let inputs: Vec<_> = orch
            .list_chat(None)
            .unwrap()
            .into_iter()
            .map(|m| m.user_input)
            .collect();
        assert_eq!(inputs, vec!["second", "first"]);
    }

    #[test]
    fn prepared_chat_not_recorded_until_record_called() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = orchestrator(&store, Arc::new(EchoLlm));

        let prepared = orch.prepare("Hello", None).unwrap();
        let response = orch.generate(&prepared).unwrap();
        assert!(orch.list_chat(None).unwrap().is_empty());

        orch.record(prepared, response).unwrap();
        assert_eq!(orch.list_chat(None).unwrap().len(), 1);
    }

    #[test]
    fn context_budget_applies_to_prompt() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let patient = patient_with_diabetes(&store);
        let orch = orchestrator(&store, Arc::new(EchoLlm)).with_context_budget(20);

        let prompt = orch.prepare("Hi", Some(patient.id)).unwrap().prompt;
        assert!(!prompt.contains("Diabetes"));
        assert!(prompt.ends_with("Current query: Hi"));
    }

    #[test]
    fn default_budget_renders_long_history_in_full() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let patient = store.create("NFC-LONG", "Long History").unwrap();
        for i in 0..80 {
            let record = MedicalRecord::from_new(
                patient.id,
                NewMedicalRecord {
                    condition: format!("Condition{i:02}"),
                    description: "d".repeat(120),
                    ..NewMedicalRecord::default()
                },
            );
            store
                .with_conn(|conn| db::insert_medical_record(conn, &record))
                .unwrap();
        }
        let orch = orchestrator(&store, Arc::new(EchoLlm));

        let prompt = orch.prepare("q", Some(patient.id)).unwrap().prompt;

        assert_eq!(prompt.matches("- Condition: ").count(), 80);
        assert_eq!(prompt.matches("  Description: ").count(), 80);
    }

    #[test]
    fn urgent_response_emits_warning_with_markers() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let patient = store.create("NFC-URG", "Urgent").unwrap();
        let orch = orchestrator(
            &store,
            FixedLlm::new("URGENT: this requires immediate attention."),
        );

        let (msg, logs) = capture_logs(|| orch.handle_chat("Chest pain", Some(patient.id)));
        let msg = msg.unwrap();

        let warning = logs
            .lines()
            .find(|line| line.contains("WARN"))
            .expect("urgent exchange should log a warning");
        assert!(warning.contains("Model response flagged for follow-up"));
        assert!(warning.contains(&msg.id.to_string()));
        assert!(warning.contains(&patient.id.to_string()));
        assert!(warning.contains("immediate attention"));
        assert!(warning.contains("urgent"));
    }

    #[test]
    fn routine_response_logs_no_warning() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = orchestrator(&store, FixedLlm::new("Stay hydrated."));

        let (msg, logs) = capture_logs(|| orch.handle_chat("Diet advice?", None));

        assert!(!msg.unwrap().requires_follow_up);
        assert!(logs.contains("Chat exchange recorded"));
        assert!(!logs.contains("WARN"));
    }
}
