//! HTTP gateway to the backend service
//!
//! Every operation here is total: a transport failure or a non-2xx status is
//! logged and converted into a typed fallback value, so no error ever
//! reaches the caller. Retry policy and all failure copy live in this one
//! layer.

use anyhow::{anyhow, Result};
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::{ExamPaper, Subject, YoutubeRecommendation};

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Apology shown in place of an assistant reply when the backend cannot be
/// reached.
const CHAT_FALLBACK: &str = "Ops, parece que estou tendo dificuldades para me conectar agora. 😅 Você pode tentar novamente daqui a pouco?";

const IMAGE_UPLOAD_FAILED: &str = "Falha ao enviar imagem. Por favor, tente novamente.";
const AUDIO_UPLOAD_FAILED: &str = "Falha ao enviar áudio. Por favor, tente novamente.";
const FEEDBACK_FAILED: &str = "Falha ao enviar feedback. Por favor, tente novamente.";

/// Distinguishes data the backend actually returned from the built-in
/// fallback payload used when it could not be reached. Both sides carry a
/// renderable value, so callers that don't care can just take the data.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Live(T),
    Fallback(T),
}

impl<T> Fetched<T> {
    pub fn data(&self) -> &T {
        match self {
            Fetched::Live(data) | Fetched::Fallback(data) => data,
        }
    }

    pub fn into_data(self) -> T {
        match self {
            Fetched::Live(data) | Fetched::Fallback(data) => data,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Fetched::Fallback(_))
    }
}

/// What the tutor answered. `error` marks the built-in apology used when the
/// backend was unreachable; the text is renderable either way.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub response: String,
    pub error: bool,
}

impl ChatReply {
    /// The reply used when the backend cannot be reached at all.
    pub fn fallback() -> Self {
        Self {
            response: CHAT_FALLBACK.to_string(),
            error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Uploaded { url: String },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackAck {
    pub success: bool,
    pub message: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    subject: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackRequest<'a> {
    rating: u8,
    conversation_id: &'a str,
}

#[derive(Deserialize)]
struct FeedbackResponse {
    success: bool,
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// POST /chat. On failure the reply is the fixed apology with the error
    /// marker set, so there is always something to render in the bubble.
    pub async fn send_message(&self, message: &str, subject: Subject) -> ChatReply {
        match self.try_send_message(message, subject).await {
            Ok(response) => ChatReply {
                response,
                error: false,
            },
            Err(e) => {
                tracing::warn!(error = %e, "chat request failed");
                ChatReply::fallback()
            }
        }
    }

    async fn try_send_message(&self, message: &str, subject: Subject) -> Result<String> {
        let url = format!("{}/chat", self.base_url);
        let request = ChatRequest {
            message,
            subject: subject.as_str(),
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "chat request failed with status: {}",
                response.status()
            ));
        }

        let reply: ChatResponse = response.json().await?;
        Ok(reply.response)
    }

    /// Multipart POST /upload-image. Size and MIME pre-flight are the
    /// caller's job; this only ships the bytes.
    pub async fn upload_image(&self, path: &Path) -> UploadOutcome {
        match self.try_upload_image(path).await {
            Ok(url) => UploadOutcome::Uploaded { url },
            Err(e) => {
                tracing::warn!(error = %e, "image upload failed");
                UploadOutcome::Failed {
                    message: IMAGE_UPLOAD_FAILED.to_string(),
                }
            }
        }
    }

    async fn try_upload_image(&self, path: &Path) -> Result<String> {
        let data = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("imagem")
            .to_string();
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        let part = multipart::Part::bytes(data)
            .file_name(filename)
            .mime_str(mime.as_ref())?;
        let form = multipart::Form::new().part("image", part);

        self.try_upload(&format!("{}/upload-image", self.base_url), form)
            .await
    }

    /// Multipart POST /upload-audio with a recorded clip.
    pub async fn upload_audio(&self, data: Vec<u8>) -> UploadOutcome {
        match self.try_upload_audio(data).await {
            Ok(url) => UploadOutcome::Uploaded { url },
            Err(e) => {
                tracing::warn!(error = %e, "audio upload failed");
                UploadOutcome::Failed {
                    message: AUDIO_UPLOAD_FAILED.to_string(),
                }
            }
        }
    }

    async fn try_upload_audio(&self, data: Vec<u8>) -> Result<String> {
        let part = multipart::Part::bytes(data)
            .file_name("audio.mp3")
            .mime_str("audio/mpeg")?;
        let form = multipart::Form::new().part("audio", part);

        self.try_upload(&format!("{}/upload-audio", self.base_url), form)
            .await
    }

    async fn try_upload(&self, url: &str, form: multipart::Form) -> Result<String> {
        let response = self.client.post(url).multipart(form).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("upload failed with status: {}", response.status()));
        }

        let uploaded: UploadResponse = response.json().await?;
        Ok(uploaded.url)
    }

    /// GET /exam-papers. The fallback payload is the empty list, so "no
    /// results" renders the same either way; `is_fallback` tells them apart.
    pub async fn get_exam_papers(&self) -> Fetched<Vec<ExamPaper>> {
        match self.try_get_exam_papers().await {
            Ok(papers) => Fetched::Live(papers),
            Err(e) => {
                tracing::warn!(error = %e, "exam papers request failed");
                Fetched::Fallback(Vec::new())
            }
        }
    }

    async fn try_get_exam_papers(&self) -> Result<Vec<ExamPaper>> {
        let url = format!("{}/exam-papers", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "exam papers request failed with status: {}",
                response.status()
            ));
        }

        Ok(response.json().await?)
    }

    /// GET /youtube-recommendations. The fallback payload is a small fixed
    /// set of study channels so the shelf never renders empty.
    pub async fn get_youtube_recommendations(
        &self,
        query: &str,
    ) -> Fetched<Vec<YoutubeRecommendation>> {
        match self.try_get_youtube_recommendations(query).await {
            Ok(recommendations) => Fetched::Live(recommendations),
            Err(e) => {
                tracing::warn!(error = %e, "youtube recommendations request failed");
                Fetched::Fallback(fallback_recommendations())
            }
        }
    }

    async fn try_get_youtube_recommendations(
        &self,
        query: &str,
    ) -> Result<Vec<YoutubeRecommendation>> {
        let url = format!("{}/youtube-recommendations", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "youtube recommendations request failed with status: {}",
                response.status()
            ));
        }

        Ok(response.json().await?)
    }

    /// POST /feedback. Fire-and-forget from the caller's point of view; the
    /// ack only drives display state.
    pub async fn send_feedback(&self, rating: u8, conversation_id: &str) -> FeedbackAck {
        match self.try_send_feedback(rating, conversation_id).await {
            Ok(success) => FeedbackAck {
                success,
                message: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "feedback request failed");
                FeedbackAck {
                    success: false,
                    message: Some(FEEDBACK_FAILED.to_string()),
                }
            }
        }
    }

    async fn try_send_feedback(&self, rating: u8, conversation_id: &str) -> Result<bool> {
        let url = format!("{}/feedback", self.base_url);
        let request = FeedbackRequest {
            rating,
            conversation_id,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "feedback request failed with status: {}",
                response.status()
            ));
        }

        let ack: FeedbackResponse = response.json().await?;
        Ok(ack.success)
    }
}

fn fallback_recommendations() -> Vec<YoutubeRecommendation> {
    vec![
        YoutubeRecommendation {
            id: "1".to_string(),
            title: "Dica de Matemática para o ENEM - Professor Ferretto".to_string(),
            url: "https://www.youtube.com/watch?v=example1".to_string(),
            thumbnail_url: "https://via.placeholder.com/320x180.png?text=Aula+de+Matematica"
                .to_string(),
        },
        YoutubeRecommendation {
            id: "2".to_string(),
            title: "Português para o ENEM - Brasil Escola".to_string(),
            url: "https://www.youtube.com/watch?v=example2".to_string(),
            thumbnail_url: "https://via.placeholder.com/320x180.png?text=Aula+de+Portugues"
                .to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    // Nothing listens on the discard port, so every request fails at the
    // transport layer. The gateway must still return its documented shape.
    fn unreachable_client() -> ApiClient {
        ApiClient::new("http://127.0.0.1:9/api")
    }

    #[test]
    fn test_fetched_accessors() {
        let live = Fetched::Live(vec![1, 2]);
        assert!(!live.is_fallback());
        assert_eq!(live.data(), &vec![1, 2]);

        let fallback = Fetched::Fallback(Vec::<i32>::new());
        assert!(fallback.is_fallback());
        assert!(fallback.into_data().is_empty());
    }

    #[tokio::test]
    async fn test_send_message_falls_back_to_apology() {
        let reply = unreachable_client()
            .send_message("2+2=?", Subject::Math)
            .await;
        assert!(reply.error);
        assert_eq!(reply.response, CHAT_FALLBACK);
    }

    #[tokio::test]
    async fn test_exam_papers_fall_back_to_empty_list() {
        let papers = unreachable_client().get_exam_papers().await;
        assert!(papers.is_fallback());
        assert!(papers.data().is_empty());
    }

    #[tokio::test]
    async fn test_recommendations_fall_back_to_placeholders() {
        let recommendations = unreachable_client()
            .get_youtube_recommendations("funções")
            .await;
        assert!(recommendations.is_fallback());
        assert_eq!(recommendations.data().len(), 2);
    }

    #[tokio::test]
    async fn test_feedback_falls_back_to_failure_ack() {
        let ack = unreachable_client().send_feedback(5, "c1").await;
        assert!(!ack.success);
        assert_eq!(ack.message.as_deref(), Some(FEEDBACK_FAILED));
    }

    #[tokio::test]
    async fn test_audio_upload_falls_back_to_failed() {
        let outcome = unreachable_client().upload_audio(vec![0u8; 16]).await;
        assert_eq!(
            outcome,
            UploadOutcome::Failed {
                message: AUDIO_UPLOAD_FAILED.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_image_upload_with_missing_file_fails_cleanly() {
        let outcome = unreachable_client()
            .upload_image(Path::new("/nao/existe/foto.png"))
            .await;
        assert_eq!(
            outcome,
            UploadOutcome::Failed {
                message: IMAGE_UPLOAD_FAILED.to_string()
            }
        );
    }
}
