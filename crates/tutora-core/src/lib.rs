pub mod api;
pub mod chat;
pub mod config;
pub mod helpers;
pub mod recorder;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use api::{ApiClient, ChatReply, FeedbackAck, Fetched, UploadOutcome, DEFAULT_API_URL};
pub use chat::{
    begin_exchange, resolve_exchange, send_exchange, validate_image_file, Exchange,
    ImageRejection, MAX_IMAGE_BYTES,
};
pub use config::Config;
pub use recorder::{
    ArecordCaptureDevice, CaptureDevice, FinishedRecording, Recorder, StopReason,
    MAX_RECORDING_DURATION,
};
pub use store::{ChatStore, MessageUpdate, NewMessage, StoreState, StoreUpdate};
pub use types::{
    Attachment, AttachmentKind, Conversation, ExamPaper, Message, PaperColor, Role,
    StudentProgress, Subject, YoutubeRecommendation,
};
