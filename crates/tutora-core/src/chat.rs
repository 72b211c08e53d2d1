//! Chat exchange flow
//!
//! One exchange commits the user's message, appends a loading placeholder
//! for the assistant, and later overwrites that placeholder in place with
//! the real reply (or the apology fallback). Only one exchange may be
//! outstanding per conversation. The image pre-flight lives here too: it
//! runs before any upload call is issued.

use std::path::Path;

use crate::api::{ApiClient, ChatReply};
use crate::helpers::random_loading_message;
use crate::store::{ChatStore, MessageUpdate, NewMessage};
use crate::types::{Attachment, Role, Subject};

pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

/// Shown when the backend answered but with an empty body.
const EMPTY_REPLY: &str = "Desculpe, não consegui processar sua mensagem.";

/// Why an image was refused before upload. The display text is the
/// user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ImageRejection {
    #[error("A imagem deve ter no máximo 5MB")]
    TooLarge,
    #[error("Apenas imagens são permitidas")]
    NotAnImage,
}

/// Client-side validation, run before the upload call is ever issued.
/// Anything over 5MB or without an image MIME type is refused here.
pub fn validate_image_file(path: &Path) -> Result<(), ImageRejection> {
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if size > MAX_IMAGE_BYTES {
        return Err(ImageRejection::TooLarge);
    }

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_() != mime_guess::mime::IMAGE {
        return Err(ImageRejection::NotAnImage);
    }

    Ok(())
}

/// Handle to an exchange awaiting its reply. Carries the placeholder id used
/// to reconcile the response into the right bubble.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub conversation_id: String,
    pub placeholder_id: String,
}

/// Commit the user message and the loading placeholder to the active
/// conversation and take the in-flight slot. Returns `None` when there is no
/// resolvable active conversation, or when a send is already outstanding for
/// it (the second send is rejected, not queued).
pub fn begin_exchange(
    store: &mut ChatStore,
    text: &str,
    attachments: Vec<Attachment>,
) -> Option<Exchange> {
    let conversation_id = store.active_conversation_id()?.to_string();
    if !store.begin_send(&conversation_id) {
        return None;
    }

    let _ = store.add_message(NewMessage {
        role: Role::User,
        content: text.to_string(),
        attachments,
        is_loading: false,
    });

    let placeholder = store.add_message(NewMessage {
        role: Role::Assistant,
        content: random_loading_message().to_string(),
        attachments: Vec::new(),
        is_loading: true,
    });

    match placeholder {
        Some(placeholder_id) => Some(Exchange {
            conversation_id,
            placeholder_id,
        }),
        None => {
            store.finish_send(&conversation_id);
            None
        }
    }
}

/// Settle the exchange: fill the placeholder with the reply text, clear the
/// loading flag, and release the in-flight slot. Progress is counted only
/// for a real answer, never for the error fallback.
pub fn resolve_exchange(
    store: &mut ChatStore,
    subject: Subject,
    exchange: &Exchange,
    reply: &ChatReply,
) {
    let content = if reply.response.is_empty() {
        EMPTY_REPLY.to_string()
    } else {
        reply.response.clone()
    };

    store.update_message(
        &exchange.placeholder_id,
        MessageUpdate {
            content: Some(content),
            is_loading: Some(false),
            attachments: None,
        },
    );

    if !reply.error {
        store.update_progress(subject, None);
    }

    store.finish_send(&exchange.conversation_id);
}

/// Begin, send, resolve in one call. Interactive front ends drive the same
/// three steps themselves so the gateway call can run on a background task.
pub async fn send_exchange(
    store: &mut ChatStore,
    api: &ApiClient,
    subject: Subject,
    text: &str,
    attachments: Vec<Attachment>,
) -> Option<Exchange> {
    let exchange = begin_exchange(store, text, attachments)?;
    let reply = api.send_message(text, subject).await;
    resolve_exchange(store, subject, &exchange, &reply);
    Some(exchange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    #[test]
    fn test_oversized_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grande.png");
        let file = fs::File::create(&path).unwrap();
        file.set_len(6 * 1024 * 1024).unwrap();

        assert_eq!(validate_image_file(&path), Err(ImageRejection::TooLarge));
    }

    #[test]
    fn test_non_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anotacoes.txt");
        fs::write(&path, "apenas texto").unwrap();

        assert_eq!(validate_image_file(&path), Err(ImageRejection::NotAnImage));
    }

    #[test]
    fn test_small_png_passes_preflight() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questao.png");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(&vec![0u8; 1024 * 1024]).unwrap();

        assert_eq!(validate_image_file(&path), Ok(()));
    }

    #[test]
    fn test_rejection_messages_are_user_copy() {
        assert_eq!(
            ImageRejection::TooLarge.to_string(),
            "A imagem deve ter no máximo 5MB"
        );
        assert_eq!(
            ImageRejection::NotAnImage.to_string(),
            "Apenas imagens são permitidas"
        );
    }

    #[test]
    fn test_full_exchange_scenario() {
        let mut store = ChatStore::in_memory();
        store.start_new_conversation(Subject::Math);

        // A fresh conversation holds exactly the welcome message.
        assert_eq!(store.active_conversation().unwrap().messages.len(), 1);
        assert_eq!(
            store.active_conversation().unwrap().messages[0].role,
            Role::Assistant
        );

        let exchange = begin_exchange(&mut store, "2+2=?", Vec::new()).unwrap();

        // User message plus loading placeholder were appended.
        let messages = &store.active_conversation().unwrap().messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "2+2=?");
        assert_eq!(messages[2].role, Role::Assistant);
        assert!(messages[2].is_loading);
        assert_eq!(messages[2].id, exchange.placeholder_id);

        let reply = ChatReply {
            response: "A resposta é 4".to_string(),
            error: false,
        };
        resolve_exchange(&mut store, Subject::Math, &exchange, &reply);

        let messages = &store.active_conversation().unwrap().messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content, "A resposta é 4");
        assert!(!messages[2].is_loading);
        assert_eq!(store.progress_for(Subject::Math).unwrap().questions_answered, 1);
        assert!(!store.send_in_flight(&exchange.conversation_id));
    }

    #[test]
    fn test_failed_exchange_keeps_progress_untouched() {
        let mut store = ChatStore::in_memory();
        store.start_new_conversation(Subject::Science);

        let exchange = begin_exchange(&mut store, "?", Vec::new()).unwrap();
        let reply = ChatReply::fallback();
        resolve_exchange(&mut store, Subject::Science, &exchange, &reply);

        let messages = &store.active_conversation().unwrap().messages;
        assert_eq!(messages[2].content, reply.response);
        assert!(!messages[2].is_loading);
        assert!(store.progress_for(Subject::Science).is_none());
    }

    #[test]
    fn test_empty_reply_gets_default_copy() {
        let mut store = ChatStore::in_memory();
        store.start_new_conversation(Subject::Portuguese);

        let exchange = begin_exchange(&mut store, "oi", Vec::new()).unwrap();
        let reply = ChatReply {
            response: String::new(),
            error: false,
        };
        resolve_exchange(&mut store, Subject::Portuguese, &exchange, &reply);

        let messages = &store.active_conversation().unwrap().messages;
        assert_eq!(messages[2].content, EMPTY_REPLY);
    }

    #[test]
    fn test_second_send_while_outstanding_is_rejected() {
        let mut store = ChatStore::in_memory();
        store.start_new_conversation(Subject::Math);

        let exchange = begin_exchange(&mut store, "primeira", Vec::new()).unwrap();
        assert!(begin_exchange(&mut store, "segunda", Vec::new()).is_none());

        // Only the first exchange reached the conversation.
        assert_eq!(store.active_conversation().unwrap().messages.len(), 3);

        let reply = ChatReply {
            response: "ok".to_string(),
            error: false,
        };
        resolve_exchange(&mut store, Subject::Math, &exchange, &reply);
        assert!(begin_exchange(&mut store, "segunda", Vec::new()).is_some());
    }

    #[test]
    fn test_exchange_without_active_conversation_is_refused() {
        let mut store = ChatStore::in_memory();
        assert!(begin_exchange(&mut store, "oi", Vec::new()).is_none());
    }

    #[tokio::test]
    async fn test_send_exchange_resolves_even_when_unreachable() {
        let mut store = ChatStore::in_memory();
        store.start_new_conversation(Subject::Math);
        let api = ApiClient::new("http://127.0.0.1:9/api");

        let exchange = send_exchange(&mut store, &api, Subject::Math, "2+2=?", Vec::new())
            .await
            .unwrap();

        let messages = &store.active_conversation().unwrap().messages;
        assert_eq!(messages.len(), 3);
        assert!(!messages[2].is_loading);
        assert!(store.progress_for(Subject::Math).is_none());
        assert!(!store.send_in_flight(&exchange.conversation_id));
    }
}
