use std::path::PathBuf;
use std::time::{Duration, Instant};

use ratatui::widgets::ListState;
use tokio::task::JoinHandle;

use tutora_core::helpers::generate_id;
use tutora_core::{
    begin_exchange, resolve_exchange, ApiClient, Attachment, AttachmentKind, ChatReply, ChatStore,
    Exchange, ExamPaper, FeedbackAck, Fetched, FinishedRecording, Recorder, Subject, UploadOutcome,
};

/// How long a transient notice stays in the footer.
const NOTICE_DURATION: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Home,
    Chat,
    Exams,
    Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// An exchange whose reply is still on its way.
pub struct PendingExchange {
    pub exchange: Exchange,
    pub subject: Subject,
    pub task: JoinHandle<ChatReply>,
}

/// An image upload that must finish before its message is sent.
pub struct PendingImageSend {
    pub text: String,
    pub filename: String,
    pub task: JoinHandle<UploadOutcome>,
}

pub struct PendingAudioSend {
    pub task: JoinHandle<UploadOutcome>,
}

pub struct PendingFeedback {
    pub conversation_id: String,
    pub task: JoinHandle<FeedbackAck>,
}

pub struct App {
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,

    pub store: ChatStore,
    pub api: ApiClient,

    // Home
    pub home_state: ListState,

    // Chat
    pub chat_subject: Option<Subject>,
    pub message_input: String,
    pub input_cursor: usize,
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub animation_frame: u8,
    pub pending_exchange: Option<PendingExchange>,

    // Image attachment
    pub show_attach_input: bool,
    pub attach_input: String,
    pub attach_cursor: usize,
    pub attached_image: Option<PathBuf>,
    pub pending_image_send: Option<PendingImageSend>,

    // Audio
    pub recorder: Recorder,
    pub pending_audio_send: Option<PendingAudioSend>,

    // Feedback widget
    pub feedback_rating: Option<u8>,
    pub pending_feedback: Option<PendingFeedback>,

    // Exams
    pub exam_papers: Vec<ExamPaper>,
    pub exams_loaded: bool,
    pub exams_loading: bool,
    pub exams_fallback: bool,
    pub exam_fetch: Option<JoinHandle<Fetched<Vec<ExamPaper>>>>,
    pub exam_state: ListState,
    pub year_filter: Option<i32>,
    pub subject_filter: Option<Subject>,

    // Transient footer notice
    pub notice: Option<(String, Instant)>,
}

impl App {
    pub fn new(store: ChatStore, api: ApiClient, recorder: Recorder) -> Self {
        let mut home_state = ListState::default();
        home_state.select(Some(0));

        Self {
            should_quit: false,
            screen: Screen::Home,
            input_mode: InputMode::Normal,

            store,
            api,

            home_state,

            chat_subject: None,
            message_input: String::new(),
            input_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            pending_exchange: None,

            show_attach_input: false,
            attach_input: String::new(),
            attach_cursor: 0,
            attached_image: None,
            pending_image_send: None,

            recorder,
            pending_audio_send: None,

            feedback_rating: None,
            pending_feedback: None,

            exam_papers: Vec::new(),
            exams_loaded: false,
            exams_loading: false,
            exams_fallback: false,
            exam_fetch: None,
            exam_state: ListState::default(),
            year_filter: None,
            subject_filter: None,

            notice: None,
        }
    }

    pub fn notify(&mut self, text: impl Into<String>) {
        self.notice = Some((text.into(), Instant::now()));
    }

    /// Startup navigation target. Unknown paths and unknown subjects land on
    /// the home screen.
    pub fn route(&mut self, path: &str) {
        match path.trim_matches('/') {
            "" => self.screen = Screen::Home,
            "exams" => self.open_exams(),
            "profile" => self.screen = Screen::Profile,
            other => {
                if let Some(subject) = other
                    .strip_prefix("chat/")
                    .and_then(Subject::from_str)
                {
                    self.open_chat(subject);
                } else {
                    self.screen = Screen::Home;
                }
            }
        }
    }

    /// Resume the most recent conversation for the subject, or start a fresh
    /// one when there is none yet.
    pub fn open_chat(&mut self, subject: Subject) {
        match self.store.latest_conversation_for(subject).map(|c| c.id.clone()) {
            Some(id) => self.store.set_active_conversation(Some(id)),
            None => {
                self.store.start_new_conversation(subject);
            }
        }

        self.chat_subject = Some(subject);
        self.screen = Screen::Chat;
        self.feedback_rating = None;
        self.scroll_chat_to_bottom();
    }

    pub fn open_exams(&mut self) {
        self.screen = Screen::Exams;
        if self.exam_fetch.is_none() && !self.exams_loaded {
            self.fetch_exam_papers();
        }
    }

    pub fn fetch_exam_papers(&mut self) {
        if self.exam_fetch.is_some() {
            return;
        }
        let api = self.api.clone();
        self.exams_loading = true;
        self.exam_fetch = Some(tokio::spawn(async move { api.get_exam_papers().await }));
    }

    /// Commit the message to the store and fire the backend call on a
    /// background task; the reply is folded back in from `poll_tasks`.
    pub fn start_exchange(&mut self, text: String, attachments: Vec<Attachment>) {
        let Some(subject) = self.chat_subject else { return };

        let Some(exchange) = begin_exchange(&mut self.store, &text, attachments) else {
            self.notify("Aguarde a resposta anterior chegar 😉");
            return;
        };

        let api = self.api.clone();
        let task = tokio::spawn(async move { api.send_message(&text, subject).await });
        self.pending_exchange = Some(PendingExchange {
            exchange,
            subject,
            task,
        });
        self.scroll_chat_to_bottom();
    }

    pub fn submit_feedback(&mut self) {
        let Some(rating) = self.feedback_rating else { return };
        let Some(conversation_id) = self.store.active_conversation().map(|c| c.id.clone()) else {
            return;
        };
        if self.pending_feedback.is_some() || self.store.feedback_submitted(&conversation_id) {
            return;
        }

        let api = self.api.clone();
        let id = conversation_id.clone();
        let task = tokio::spawn(async move { api.send_feedback(rating, &id).await });
        self.pending_feedback = Some(PendingFeedback {
            conversation_id,
            task,
        });
    }

    pub fn queue_audio_upload(&mut self, finished: FinishedRecording) {
        let api = self.api.clone();
        let task = tokio::spawn(async move { api.upload_audio(finished.data).await });
        self.pending_audio_send = Some(PendingAudioSend { task });
    }

    /// The feedback widget appears once a conversation is substantial and
    /// has not been rated before (the rated set is persisted, so a restart
    /// does not re-prompt).
    pub fn feedback_visible(&self) -> bool {
        match self.store.active_conversation() {
            Some(c) => c.messages.len() >= 6 && !self.store.feedback_submitted(&c.id),
            None => false,
        }
    }

    pub fn waiting_for_reply(&self) -> bool {
        self.pending_exchange.is_some()
            || self.pending_image_send.is_some()
            || self.pending_audio_send.is_some()
    }

    /// 300ms heartbeat: loading animation, notice expiry, and the recording
    /// ceiling.
    pub fn tick(&mut self) {
        if self.waiting_for_reply() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }

        if let Some((_, shown_at)) = &self.notice {
            if shown_at.elapsed() > NOTICE_DURATION {
                self.notice = None;
            }
        }

        if let Some(finished) = self.recorder.tick() {
            self.queue_audio_upload(finished);
        }
    }

    /// Fold completed background work back into the store. Called from the
    /// event loop; all state mutation stays on this one thread.
    pub async fn poll_tasks(&mut self) {
        if let Some(pending) = self.pending_exchange.take() {
            if pending.task.is_finished() {
                let reply = pending.task.await.unwrap_or_else(|_| ChatReply::fallback());
                resolve_exchange(&mut self.store, pending.subject, &pending.exchange, &reply);
                self.scroll_chat_to_bottom();
            } else {
                self.pending_exchange = Some(pending);
            }
        }

        if let Some(pending) = self.pending_image_send.take() {
            if pending.task.is_finished() {
                match pending.task.await {
                    Ok(UploadOutcome::Uploaded { url }) => {
                        let attachment = Attachment {
                            id: generate_id(),
                            kind: AttachmentKind::Image,
                            url,
                            filename: pending.filename,
                        };
                        self.start_exchange(pending.text, vec![attachment]);
                    }
                    Ok(UploadOutcome::Failed { message }) => self.notify(message),
                    Err(_) => self.notify("Erro ao enviar imagem"),
                }
            } else {
                self.pending_image_send = Some(pending);
            }
        }

        if let Some(pending) = self.pending_audio_send.take() {
            if pending.task.is_finished() {
                match pending.task.await {
                    Ok(UploadOutcome::Uploaded { url }) => {
                        let attachment = Attachment {
                            id: generate_id(),
                            kind: AttachmentKind::Audio,
                            url,
                            filename: "gravacao.mp3".to_string(),
                        };
                        self.start_exchange("🎤 Áudio enviado".to_string(), vec![attachment]);
                    }
                    Ok(UploadOutcome::Failed { message }) => self.notify(message),
                    Err(_) => self.notify("Erro ao enviar áudio"),
                }
            } else {
                self.pending_audio_send = Some(pending);
            }
        }

        if let Some(pending) = self.pending_feedback.take() {
            if pending.task.is_finished() {
                if let Ok(ack) = pending.task.await {
                    if !ack.success {
                        tracing::warn!(
                            conversation_id = %pending.conversation_id,
                            "feedback not acknowledged by backend"
                        );
                    }
                }
                // Display state flips regardless of the ack; the widget is
                // fire-and-forget.
                self.store.mark_feedback_submitted(&pending.conversation_id);
                self.notify("Feedback enviado com sucesso! 🎉");
            } else {
                self.pending_feedback = Some(pending);
            }
        }

        if let Some(task) = self.exam_fetch.take() {
            if task.is_finished() {
                let fetched = task.await.unwrap_or(Fetched::Fallback(Vec::new()));
                self.exams_fallback = fetched.is_fallback();
                self.exam_papers = fetched.into_data();
                self.exams_loading = false;
                self.exams_loaded = true;
                self.year_filter = self.exam_years().first().copied();
                self.exam_state.select(if self.exam_papers.is_empty() {
                    None
                } else {
                    Some(0)
                });
            } else {
                self.exam_fetch = Some(task);
            }
        }
    }

    // ── Exam browsing ──

    pub fn exam_years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.exam_papers.iter().map(|p| p.year).collect();
        years.sort_unstable_by(|a, b| b.cmp(a));
        years.dedup();
        years
    }

    pub fn filtered_papers(&self) -> Vec<&ExamPaper> {
        self.exam_papers
            .iter()
            .filter(|paper| {
                if let Some(year) = self.year_filter {
                    if paper.year != year {
                        return false;
                    }
                }
                if let Some(subject) = self.subject_filter {
                    if !paper.subjects.contains(&subject) {
                        return false;
                    }
                }
                true
            })
            .collect()
    }

    /// Most recent year -> older years -> all years -> back around.
    pub fn cycle_year_filter(&mut self) {
        let years = self.exam_years();
        self.year_filter = match self.year_filter {
            None => years.first().copied(),
            Some(current) => years
                .iter()
                .position(|&y| y == current)
                .and_then(|i| years.get(i + 1))
                .copied(),
        };
        self.reset_exam_selection();
    }

    pub fn cycle_subject_filter(&mut self) {
        self.subject_filter = match self.subject_filter {
            None => Some(Subject::Math),
            Some(Subject::Math) => Some(Subject::Science),
            Some(Subject::Science) => Some(Subject::Portuguese),
            Some(Subject::Portuguese) => None,
        };
        self.reset_exam_selection();
    }

    fn reset_exam_selection(&mut self) {
        self.exam_state.select(if self.filtered_papers().is_empty() {
            None
        } else {
            Some(0)
        });
    }

    pub fn selected_paper(&self) -> Option<&ExamPaper> {
        let papers = self.filtered_papers();
        self.exam_state
            .selected()
            .and_then(|i| papers.get(i).copied())
    }

    // ── Chat scrolling ──

    /// Scroll so the latest message (and the loading placeholder) is
    /// visible. Line count mirrors the wrap the renderer applies.
    pub fn scroll_chat_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let Some(conversation) = self.store.active_conversation() else {
            self.chat_scroll = 0;
            return;
        };

        let mut total_lines: u16 = 0;
        for message in &conversation.messages {
            total_lines += 1; // role label
            for line in message.content.lines() {
                let char_count = line.chars().count();
                if char_count == 0 {
                    total_lines += 1;
                } else {
                    total_lines += ((char_count / wrap_width) + 1) as u16;
                }
            }
            total_lines += message.attachments.len() as u16;
            total_lines += 1; // blank line after message
        }

        if self.feedback_visible() {
            total_lines += 5;
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        if total_lines > visible_height {
            self.chat_scroll = total_lines.saturating_sub(visible_height);
        } else {
            self.chat_scroll = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutora_core::{ArecordCaptureDevice, NewMessage};

    fn test_app() -> App {
        App::new(
            ChatStore::in_memory(),
            ApiClient::new("http://127.0.0.1:9/api"),
            Recorder::new(Box::new(ArecordCaptureDevice::new())),
        )
    }

    #[test]
    fn test_open_chat_starts_then_resumes() {
        let mut app = test_app();

        app.open_chat(Subject::Math);
        assert_eq!(app.screen, Screen::Chat);
        let first = app.store.active_conversation_id().unwrap().to_string();

        // Leaving and coming back lands in the same conversation.
        app.screen = Screen::Home;
        app.open_chat(Subject::Math);
        assert_eq!(app.store.active_conversation_id(), Some(first.as_str()));

        // A different subject gets its own conversation.
        app.open_chat(Subject::Science);
        assert_ne!(app.store.active_conversation_id(), Some(first.as_str()));
    }

    #[tokio::test]
    async fn test_route_targets() {
        let mut app = test_app();

        app.route("chat/math");
        assert_eq!(app.screen, Screen::Chat);
        assert_eq!(app.chat_subject, Some(Subject::Math));

        app.route("profile");
        assert_eq!(app.screen, Screen::Profile);

        // Unknown paths and unknown subjects land on home.
        app.route("chat/history");
        assert_eq!(app.screen, Screen::Home);
        app.route("qualquer/coisa");
        assert_eq!(app.screen, Screen::Home);
    }

    #[test]
    fn test_feedback_visibility_threshold() {
        let mut app = test_app();
        app.open_chat(Subject::Portuguese);
        assert!(!app.feedback_visible());

        // Welcome message plus five more crosses the threshold.
        for i in 0..5 {
            app.store
                .add_message(NewMessage::user(format!("msg {}", i)))
                .unwrap();
        }
        assert!(app.feedback_visible());

        let id = app.store.active_conversation_id().unwrap().to_string();
        app.store.mark_feedback_submitted(&id);
        assert!(!app.feedback_visible());
    }

    #[test]
    fn test_exam_filters() {
        let mut app = test_app();
        app.exam_papers = vec![
            ExamPaper {
                id: "1".to_string(),
                year: 2023,
                day: 1,
                color: tutora_core::PaperColor::Azul,
                subjects: vec![Subject::Portuguese],
                file_url: "#".to_string(),
                answers_url: "#".to_string(),
            },
            ExamPaper {
                id: "2".to_string(),
                year: 2022,
                day: 2,
                color: tutora_core::PaperColor::Azul,
                subjects: vec![Subject::Math, Subject::Science],
                file_url: "#".to_string(),
                answers_url: "#".to_string(),
            },
        ];

        assert_eq!(app.exam_years(), vec![2023, 2022]);

        app.year_filter = Some(2022);
        assert_eq!(app.filtered_papers().len(), 1);
        assert_eq!(app.filtered_papers()[0].id, "2");

        app.year_filter = None;
        app.subject_filter = Some(Subject::Portuguese);
        assert_eq!(app.filtered_papers().len(), 1);
        assert_eq!(app.filtered_papers()[0].id, "1");

        app.subject_filter = Some(Subject::Math);
        app.year_filter = Some(2023);
        assert!(app.filtered_papers().is_empty());
    }

    #[test]
    fn test_year_filter_cycles_through_all() {
        let mut app = test_app();
        app.exam_papers = vec![ExamPaper {
            id: "1".to_string(),
            year: 2023,
            day: 1,
            color: tutora_core::PaperColor::Azul,
            subjects: vec![Subject::Math],
            file_url: "#".to_string(),
            answers_url: "#".to_string(),
        }];

        assert_eq!(app.year_filter, None);
        app.cycle_year_filter();
        assert_eq!(app.year_filter, Some(2023));
        app.cycle_year_filter();
        assert_eq!(app.year_filter, None);
    }
}
