use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputMode, Screen};
use tutora_core::helpers::{format_date, greeting, star_feedback_message, truncate_text};
use tutora_core::{Role, Subject};

/// Render `**bold**` runs as styled spans; everything else passes through.
/// Assistant replies are markdown-ish, and bold is the part worth showing.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;
    let mut bold = false;

    while let Some(pos) = rest.find("**") {
        let (before, after) = rest.split_at(pos);
        if !before.is_empty() {
            let style = if bold {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            spans.push(Span::styled(before.to_string(), style));
        }
        bold = !bold;
        rest = &after[2..];
    }

    if !rest.is_empty() {
        if bold {
            // Unclosed marker: keep it literal.
            spans.push(Span::raw(format!("**{}", rest)));
        } else {
            spans.push(Span::raw(rest.to_string()));
        }
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Home => render_home(app, frame, body_area),
        Screen::Chat => render_chat(app, frame, body_area),
        Screen::Exams => render_exams(app, frame, body_area),
        Screen::Profile => render_profile(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if app.show_attach_input {
        render_attach_popup(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let screen_label = match app.screen {
        Screen::Home => "Início",
        Screen::Chat => app
            .chat_subject
            .map(|s| s.display_name())
            .unwrap_or("Conversa"),
        Screen::Exams => "Provas",
        Screen::Profile => "Perfil",
    };

    let title = Line::from(vec![
        Span::styled(" Tutora ", Style::default().fg(Color::Magenta).bold()),
        Span::styled(
            format!("· {} ", screen_label),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    frame.render_widget(Paragraph::new(title), area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    if let Some((notice, _)) = &app.notice {
        let line = Line::from(Span::styled(
            format!(" {}", notice),
            Style::default().fg(Color::Yellow),
        ));
        frame.render_widget(Paragraph::new(line), area);
        return;
    }

    let hints = match app.screen {
        Screen::Home => " j/k: navegar · Enter: conversar · e: provas · p: perfil · q: sair",
        Screen::Chat => {
            if app.input_mode == InputMode::Editing {
                " Enter: enviar · Esc: sair do campo"
            } else {
                " i: escrever · a: anexar imagem · r: gravar áudio · n: nova conversa · Esc: voltar"
            }
        }
        Screen::Exams => " j/k: navegar · y: ano · s: disciplina · Enter: prova · g: gabarito · Esc: voltar",
        Screen::Profile => " Esc: voltar",
    };

    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            hints,
            Style::default().fg(Color::DarkGray),
        ))),
        area,
    );
}

// ── Home ──

fn render_home(app: &mut App, frame: &mut Frame, area: Rect) {
    let [greeting_area, list_area] =
        Layout::vertical([Constraint::Length(4), Constraint::Min(0)]).areas(area);

    let greeting_text = Text::from(vec![
        Line::default(),
        Line::from(Span::styled(
            format!("  {}! Pronto pra estudar?", greeting()),
            Style::default().bold(),
        )),
        Line::from(Span::styled(
            "  Escolha uma disciplina pra conversar com a Tutora.",
            Style::default().fg(Color::DarkGray),
        )),
    ]);
    frame.render_widget(Paragraph::new(greeting_text), greeting_area);

    let items: Vec<ListItem> = Subject::all()
        .into_iter()
        .map(|subject| {
            let answered = app
                .store
                .progress_for(subject)
                .map(|p| p.questions_answered)
                .unwrap_or(0);
            let label = format!(
                "{} {}  ({} questões respondidas)",
                subject.emoji(),
                subject.display_name(),
                answered
            );
            ListItem::new(label)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" Disciplinas "))
        .highlight_style(Style::default().fg(Color::Magenta).bold())
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, list_area, &mut app.home_state);
}

// ── Chat ──

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let preview_height = if app.attached_image.is_some() { 1 } else { 0 };
    let [messages_area, preview_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(preview_height),
        Constraint::Length(3),
    ])
    .areas(area);

    // Inner size minus borders, for the scroll estimate
    app.chat_height = messages_area.height.saturating_sub(2);
    app.chat_width = messages_area.width.saturating_sub(2);

    render_messages(app, frame, messages_area);

    if let Some(path) = &app.attached_image {
        let line = Line::from(Span::styled(
            format!(" 📎 {} (x para remover)", path.display()),
            Style::default().fg(Color::Green),
        ));
        frame.render_widget(Paragraph::new(line), preview_area);
    }

    render_input(app, frame, input_area);
}

fn render_messages(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversa ");

    let Some(conversation) = app.store.active_conversation() else {
        let placeholder = Paragraph::new(Span::styled(
            "Carregando...",
            Style::default().fg(Color::DarkGray),
        ))
        .block(block);
        frame.render_widget(placeholder, area);
        return;
    };

    let mut lines: Vec<Line> = Vec::new();
    for message in &conversation.messages {
        let (label, label_color) = match message.role {
            Role::User => ("Você:", Color::Cyan),
            Role::Assistant => ("Tutora:", Color::Yellow),
            Role::System => ("Sistema:", Color::DarkGray),
        };
        lines.push(Line::from(Span::styled(
            label,
            Style::default().fg(label_color).add_modifier(Modifier::BOLD),
        )));

        if message.is_loading {
            // Animated ellipsis over the canned placeholder text
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("{}{}", message.content, dots),
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            )));
        } else {
            for line in message.content.lines() {
                lines.push(parse_markdown_line(line));
            }
        }

        for attachment in &message.attachments {
            let marker = match attachment.kind {
                tutora_core::AttachmentKind::Image => "📎",
                tutora_core::AttachmentKind::Audio => "🎤",
            };
            lines.push(Line::from(Span::styled(
                format!("{} {}", marker, attachment.filename),
                Style::default().fg(Color::Green),
            )));
        }

        lines.push(Line::default());
    }

    if app.feedback_visible() {
        append_feedback_widget(app, &mut lines);
    } else if app.store.feedback_submitted(&conversation.id) {
        lines.push(Line::from(Span::styled(
            "Obrigada pelo seu feedback! 💜",
            Style::default().fg(Color::Magenta),
        )));
    }

    let messages = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(messages, area);
}

fn append_feedback_widget(app: &App, lines: &mut Vec<Line<'static>>) {
    lines.push(Line::from(Span::styled(
        "O que achou da nossa conversa?",
        Style::default().add_modifier(Modifier::BOLD),
    )));

    let rating = app.feedback_rating.unwrap_or(0);
    let mut stars: Vec<Span> = Vec::new();
    for value in 1..=5u8 {
        let star = if value <= rating { "★ " } else { "☆ " };
        let style = if value <= rating {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        stars.push(Span::styled(star, style));
    }
    stars.push(Span::styled(
        " (1-5 para avaliar)",
        Style::default().fg(Color::DarkGray),
    ));
    lines.push(Line::from(stars));

    if app.pending_feedback.is_some() {
        lines.push(Line::from(Span::styled(
            "Enviando...",
            Style::default().fg(Color::DarkGray),
        )));
    } else if let Some(rating) = app.feedback_rating {
        lines.push(Line::from(Span::styled(
            star_feedback_message(rating).to_string(),
            Style::default().fg(Color::Magenta),
        )));
        lines.push(Line::from(Span::styled(
            "(Enter para enviar)",
            Style::default().fg(Color::DarkGray),
        )));
    }

    lines.push(Line::default());
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let recording = app.recorder.is_recording();

    let title = if recording {
        let elapsed = app.recorder.elapsed().map(|d| d.as_secs()).unwrap_or(0);
        let ceiling = app.recorder.max_duration().as_secs();
        format!(" Gravando áudio... {}s/{}s (Esc para parar) ", elapsed, ceiling)
    } else {
        " Digite sua mensagem ".to_string()
    };

    let border_color = if recording {
        Color::Red
    } else if app.input_mode == InputMode::Editing {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scroll keeps the cursor visible in a long message
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .message_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    if app.input_mode == InputMode::Editing && !app.show_attach_input {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

// ── Exams ──

fn render_exams(app: &mut App, frame: &mut Frame, area: Rect) {
    let [filter_area, list_area] =
        Layout::vertical([Constraint::Length(2), Constraint::Min(0)]).areas(area);

    let year_label = app
        .year_filter
        .map(|y| y.to_string())
        .unwrap_or_else(|| "Todos".to_string());
    let subject_label = app
        .subject_filter
        .map(|s| s.display_name())
        .unwrap_or("Todas");

    let filters = Text::from(vec![
        Line::from(vec![
            Span::styled(" Ano: ", Style::default().fg(Color::DarkGray)),
            Span::styled(year_label, Style::default().bold()),
            Span::styled("  [y]", Style::default().fg(Color::DarkGray)),
        ]),
        Line::from(vec![
            Span::styled(" Disciplina: ", Style::default().fg(Color::DarkGray)),
            Span::styled(subject_label, Style::default().bold()),
            Span::styled("  [s]", Style::default().fg(Color::DarkGray)),
        ]),
    ]);
    frame.render_widget(Paragraph::new(filters), filter_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Provas oficiais do ENEM ");

    if app.exams_loading {
        frame.render_widget(
            Paragraph::new(Span::styled(
                "Carregando provas...",
                Style::default().fg(Color::DarkGray),
            ))
            .block(block),
            list_area,
        );
        return;
    }

    let papers = app.filtered_papers();
    if papers.is_empty() {
        let text = if app.exams_fallback {
            "Não foi possível carregar as provas agora. Tente novamente (r)."
        } else {
            "Nenhuma prova encontrada com os filtros selecionados."
        };
        frame.render_widget(
            Paragraph::new(Span::styled(text, Style::default().fg(Color::DarkGray)))
                .block(block),
            list_area,
        );
        return;
    }

    let items: Vec<ListItem> = papers
        .iter()
        .map(|paper| {
            let subjects: Vec<&str> = paper.subjects.iter().map(|s| s.display_name()).collect();
            let label = format!(
                "ENEM {}  {} - Caderno {}  · {} · {}",
                paper.year,
                paper.day_label(),
                paper.color.display_name(),
                paper.day_area(),
                subjects.join(", ")
            );
            ListItem::new(label)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().fg(Color::Magenta).bold())
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, list_area, &mut app.exam_state);
}

// ── Profile ──

fn render_profile(app: &App, frame: &mut Frame, area: Rect) {
    let mut lines: Vec<Line> = vec![
        Line::default(),
        Line::from(Span::styled(
            "  Meu Perfil",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::default(),
        Line::from(format!(
            "  Questões respondidas: {}",
            app.store.total_questions_answered()
        )),
        Line::from(format!("  Conversas: {}", app.store.conversations().len())),
        Line::default(),
    ];

    for subject in Subject::all() {
        match app.store.progress_for(subject) {
            Some(progress) => lines.push(Line::from(format!(
                "  {} {} — {} questões · última atividade {}",
                subject.emoji(),
                subject.display_name(),
                progress.questions_answered,
                format_date(&progress.last_active)
            ))),
            None => lines.push(Line::from(Span::styled(
                format!("  {} {} — sem atividade ainda", subject.emoji(), subject.display_name()),
                Style::default().fg(Color::DarkGray),
            ))),
        }
    }

    lines.push(Line::default());
    lines.push(Line::from(Span::styled(
        "  Conversas recentes",
        Style::default().add_modifier(Modifier::BOLD),
    )));
    for conversation in app.store.conversations().iter().take(5) {
        lines.push(Line::from(format!(
            "  {} {} ({} mensagens)",
            conversation.subject.emoji(),
            truncate_text(&conversation.title, 40),
            conversation.messages.len()
        )));
    }

    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .block(Block::default().borders(Borders::ALL).title(" Perfil ")),
        area,
    );
}

// ── Popups ──

fn render_attach_popup(app: &App, frame: &mut Frame, area: Rect) {
    let popup = centered_rect(60, 5, area);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Anexar imagem (caminho do arquivo) ");

    let inner_width = popup.width.saturating_sub(2) as usize;
    let cursor_pos = app.attach_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .attach_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let content = Text::from(vec![
        Line::from(visible_text),
        Line::default(),
        Line::from(Span::styled(
            "Máx. 5MB · apenas imagens · Esc cancela",
            Style::default().fg(Color::DarkGray),
        )),
    ]);

    frame.render_widget(Paragraph::new(content).block(block), popup);
    frame.set_cursor_position((popup.x + (cursor_pos - scroll_offset) as u16 + 1, popup.y + 1));
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
