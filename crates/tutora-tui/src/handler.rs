use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, InputMode, PendingImageSend, Screen};
use crate::tui::AppEvent;
use tutora_core::{validate_image_file, Subject};

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick(),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Works in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match app.screen {
        Screen::Home => handle_home(app, key),
        Screen::Chat => handle_chat_normal(app, key),
        Screen::Exams => handle_exams(app, key),
        Screen::Profile => handle_profile(app, key),
    }
}

fn handle_home(app: &mut App, key: KeyEvent) {
    let subjects = Subject::all();

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Char('j') | KeyCode::Down => {
            let i = app.home_state.selected().unwrap_or(0);
            app.home_state.select(Some((i + 1).min(subjects.len() - 1)));
        }
        KeyCode::Char('k') | KeyCode::Up => {
            let i = app.home_state.selected().unwrap_or(0);
            app.home_state.select(Some(i.saturating_sub(1)));
        }

        KeyCode::Enter => {
            if let Some(&subject) = app.home_state.selected().and_then(|i| subjects.get(i)) {
                app.open_chat(subject);
            }
        }

        // Quick subject access
        KeyCode::Char('1') => app.open_chat(Subject::Math),
        KeyCode::Char('2') => app.open_chat(Subject::Science),
        KeyCode::Char('3') => app.open_chat(Subject::Portuguese),

        KeyCode::Char('e') => app.open_exams(),
        KeyCode::Char('p') => app.screen = Screen::Profile,

        _ => {}
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            if app.recorder.is_recording() {
                stop_recording(app);
            } else {
                app.screen = Screen::Home;
            }
        }

        // Focus the input
        KeyCode::Char('i') | KeyCode::Tab => {
            app.input_mode = InputMode::Editing;
            app.input_cursor = app.message_input.chars().count();
        }

        // Scroll chat history
        KeyCode::Char('j') | KeyCode::Down => {
            app.chat_scroll = app.chat_scroll.saturating_add(1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.chat_scroll = app.chat_scroll.saturating_sub(1);
        }
        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        // Attach an image (opens the path popup)
        KeyCode::Char('a') => {
            app.show_attach_input = true;
            app.attach_input.clear();
            app.attach_cursor = 0;
            app.input_mode = InputMode::Editing;
        }

        // Toggle audio recording
        KeyCode::Char('r') => toggle_recording(app),

        // Drop the attached image before sending
        KeyCode::Char('x') => {
            if app.attached_image.take().is_some() {
                app.notify("Imagem removida");
            }
        }

        // Fresh conversation in the same subject
        KeyCode::Char('n') => {
            if let Some(subject) = app.chat_subject {
                app.store.start_new_conversation(subject);
                app.feedback_rating = None;
                app.scroll_chat_to_bottom();
            }
        }

        // Feedback widget: pick a star count, Enter submits
        KeyCode::Char(c @ '1'..='5') if app.feedback_visible() => {
            app.feedback_rating = c.to_digit(10).map(|d| d as u8);
        }
        KeyCode::Enter if app.feedback_visible() && app.feedback_rating.is_some() => {
            app.submit_feedback();
        }

        _ => {}
    }
}

fn handle_exams(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.screen = Screen::Home,

        KeyCode::Char('j') | KeyCode::Down => {
            let len = app.filtered_papers().len();
            if len > 0 {
                let i = app.exam_state.selected().unwrap_or(0);
                app.exam_state.select(Some((i + 1).min(len - 1)));
            }
        }
        KeyCode::Char('k') | KeyCode::Up => {
            let i = app.exam_state.selected().unwrap_or(0);
            app.exam_state.select(Some(i.saturating_sub(1)));
        }

        KeyCode::Char('y') => app.cycle_year_filter(),
        KeyCode::Char('s') => app.cycle_subject_filter(),
        KeyCode::Char('r') => app.fetch_exam_papers(),

        // Open the paper itself, or its answer key
        KeyCode::Enter | KeyCode::Char('o') => {
            if let Some(url) = app.selected_paper().map(|p| p.file_url.clone()) {
                open_url(&url);
            }
        }
        KeyCode::Char('g') => {
            if let Some(url) = app.selected_paper().map(|p| p.answers_url.clone()) {
                open_url(&url);
            }
        }

        _ => {}
    }
}

fn handle_profile(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => app.screen = Screen::Home,
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    if app.show_attach_input {
        handle_attach_editing(app, key);
    } else if app.screen == Screen::Chat {
        handle_message_editing(app, key);
    } else {
        app.input_mode = InputMode::Normal;
    }
}

fn handle_attach_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_attach_input = false;
            app.attach_input.clear();
            app.attach_cursor = 0;
        }
        KeyCode::Enter => {
            let path = app.attach_input.trim().to_string();
            app.show_attach_input = false;
            app.attach_input.clear();
            app.attach_cursor = 0;

            if path.is_empty() {
                return;
            }

            // Pre-flight runs here; the upload call only ever happens for
            // files that pass both checks.
            match validate_image_file(Path::new(&path)) {
                Ok(()) => app.attached_image = Some(PathBuf::from(path)),
                Err(rejection) => app.notify(rejection.to_string()),
            }
        }
        KeyCode::Backspace => {
            if app.attach_cursor > 0 {
                app.attach_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.attach_input, app.attach_cursor);
                app.attach_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.attach_cursor = app.attach_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.attach_input.chars().count();
            app.attach_cursor = (app.attach_cursor + 1).min(char_count);
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.attach_input, app.attach_cursor);
            app.attach_input.insert(byte_pos, c);
            app.attach_cursor += 1;
        }
        _ => {}
    }
}

fn handle_message_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => submit_message(app),
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.message_input, app.input_cursor);
                app.message_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.message_input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.message_input, app.input_cursor);
                app.message_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.message_input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.message_input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.message_input, app.input_cursor);
            app.message_input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

fn submit_message(app: &mut App) {
    if app.recorder.is_recording() {
        app.notify("Pare a gravação antes de enviar");
        return;
    }

    let text = app.message_input.trim().to_string();
    if text.is_empty() && app.attached_image.is_none() {
        return;
    }

    if app.waiting_for_reply() {
        app.notify("Aguarde a resposta anterior chegar 😉");
        return;
    }

    if let Some(path) = app.attached_image.take() {
        // Upload first; the message itself is sent once the url comes back.
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("imagem")
            .to_string();
        let api = app.api.clone();
        let task = tokio::spawn(async move { api.upload_image(&path).await });
        app.pending_image_send = Some(PendingImageSend {
            text,
            filename,
            task,
        });
    } else {
        app.start_exchange(text, Vec::new());
    }

    app.message_input.clear();
    app.input_cursor = 0;
}

fn toggle_recording(app: &mut App) {
    if app.recorder.is_recording() {
        stop_recording(app);
    } else if app.pending_audio_send.is_some() {
        app.notify("Ainda enviando o áudio anterior...");
    } else {
        match app.recorder.start() {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(error = %e, "microphone unavailable");
                app.notify("Não foi possível acessar o microfone");
            }
        }
    }
}

fn stop_recording(app: &mut App) {
    if let Some(finished) = app.recorder.stop() {
        app.queue_audio_upload(finished);
    }
}

fn open_url(url: &str) {
    #[cfg(target_os = "macos")]
    let opener = "open";
    #[cfg(not(target_os = "macos"))]
    let opener = "xdg-open";

    let _ = Command::new(opener)
        .arg(url)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
}
