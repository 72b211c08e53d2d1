//! Small shared helpers: id generation, pt-BR date formatting, and the
//! canned assistant copy (welcome, loading, feedback acknowledgements).

use chrono::{DateTime, Local, Timelike, Utc};
use rand::seq::SliceRandom;

use crate::types::{Message, Role, Subject};

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// DD/MM/YYYY in the user's local timezone.
pub fn format_date(instant: &DateTime<Utc>) -> String {
    instant.with_timezone(&Local).format("%d/%m/%Y").to_string()
}

/// HH:MM in the user's local timezone.
pub fn format_time(instant: &DateTime<Utc>) -> String {
    instant.with_timezone(&Local).format("%H:%M").to_string()
}

pub fn greeting() -> &'static str {
    greeting_for_hour(Local::now().hour())
}

fn greeting_for_hour(hour: u32) -> &'static str {
    if hour < 12 {
        "Bom dia"
    } else if hour < 18 {
        "Boa tarde"
    } else {
        "Boa noite"
    }
}

/// The assistant message every new conversation opens with.
pub fn welcome_message(subject: Subject) -> Message {
    let content = format!(
        "{}! Eu sou a Tutora! {} Tô aqui pra te ajudar com {}! Como posso te ajudar hoje? Quer resolver alguma questão ou tem alguma dúvida específica?",
        greeting(),
        subject.emoji(),
        subject.display_name(),
    );

    Message {
        id: generate_id(),
        role: Role::Assistant,
        content,
        timestamp: Utc::now(),
        attachments: Vec::new(),
        is_loading: false,
    }
}

pub const LOADING_MESSAGES: &[&str] = &[
    "Estou pensando... ⏳",
    "Analisando sua pergunta... 🔍",
    "Só um momento! 😊",
    "Preparando uma resposta incrível... ✨",
    "Quase lá! 🚀",
    "Consultando meu conhecimento... 📚",
];

/// Placeholder text shown while an answer is on its way.
pub fn random_loading_message() -> &'static str {
    LOADING_MESSAGES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(LOADING_MESSAGES[0])
}

/// Acknowledgement line for a 1-5 star rating. Out-of-range input gets the
/// generic thank-you.
pub fn star_feedback_message(rating: u8) -> &'static str {
    match rating {
        1 => "Poxa, sinto muito! 😔 Vou me esforçar pra melhorar!",
        2 => "Hmm, preciso melhorar! 🤔 Obrigada pelo feedback!",
        3 => "3 estrelas! TÁ NO CAMINHO CERTO! 🌟🌟🌟",
        4 => "QUE LEGAL! 4 ESTRELAS! 🌟🌟🌟🌟 Muito obrigada!",
        5 => "5 ESTRELAS! Você é INCRÍVEL! ⭐⭐⭐⭐⭐ SUPER obrigada!",
        _ => "Obrigada pelo seu feedback! 💖",
    }
}

/// Char-safe truncation with a `...` suffix.
pub fn truncate_text(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_length).collect();
        format!("{}...", cut)
    }
}
