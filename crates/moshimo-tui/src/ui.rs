use crate::app::{App, InputMode, Notice};
use moshimo_core::Role;
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

const SIDEBAR_WIDTH: u16 = 32;

/// Ensure the selected item in a list is visible by adjusting the ListState offset.
/// This clamps the offset to a valid range where the selected item is always visible.
fn ensure_selected_visible(state: &mut ListState, visible_height: usize) {
    // Need at least 1 visible row to make sense
    let visible_height = visible_height.max(1);

    if let Some(selected) = state.selected() {
        // Valid offsets put selected anywhere from the bottom row to the top row
        let min_offset = selected.saturating_sub(visible_height - 1);
        let max_offset = selected;

        let new_offset = state.offset().clamp(min_offset, max_offset);
        if new_offset != state.offset() {
            *state.offset_mut() = new_offset;
        }
    }
}

/// Render `**bold**` runs; everything else is literal.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut current_text = String::new();

    while let Some((_, c)) = chars.next() {
        if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
            // Consume the second *
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some((_, c)) = chars.next() {
                if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    let [sidebar_area, chat_area] =
        Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(0)])
            .areas(body_area);

    render_header(app, frame, header_area);
    render_sidebar(app, frame, sidebar_area);
    render_chat_screen(app, frame, chat_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" moshimo ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("{}: {} ", app.provider.display_name(), app.controller.model()),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INSERT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let keys: &[(&str, &str)] = match app.input_mode {
        InputMode::Normal => &[
            (" i ", " type "),
            (" j/k ", " persona "),
            (" [/] ", " temp "),
            (" -/+ ", " tokens "),
            (" r ", " reset "),
            (" PgUp/PgDn ", " scroll "),
            (" q ", " quit "),
        ],
        InputMode::Editing => &[
            (" Enter ", " send "),
            (" Esc ", " settings "),
            (" ^R ", " reset "),
            (" ^C ", " quit "),
        ],
    };

    let hints = keys.iter().flat_map(|(key, label)| {
        [
            Span::styled(*key, key_style),
            Span::styled(*label, label_style),
        ]
    });

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_sidebar(app: &mut App, frame: &mut Frame, area: Rect) {
    let [personas_area, style_area, settings_area] = Layout::vertical([
        Constraint::Min(4),
        Constraint::Length(7),
        Constraint::Length(6),
    ])
    .areas(area);

    let picking = app.input_mode == InputMode::Normal;
    let border_color = if picking { Color::Cyan } else { Color::DarkGray };

    let items: Vec<ListItem> = app
        .catalog
        .list()
        .iter()
        .map(|persona| match persona.avatar() {
            Some(avatar) => ListItem::new(format!("{} {}", avatar, persona.name())),
            None => ListItem::new(persona.name().to_string()),
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border_color))
                .title(" Persona "),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let visible_height = personas_area.height.saturating_sub(2) as usize;
    ensure_selected_visible(&mut app.persona_state, visible_height);
    frame.render_stateful_widget(list, personas_area, &mut app.persona_state);

    let style = Paragraph::new(app.selected_persona().style().to_string())
        .style(Style::default().fg(Color::Gray))
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(" Style "),
        );
    frame.render_widget(style, style_area);

    let label = Style::default().fg(Color::DarkGray);
    let value = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let settings = vec![
        Line::from(vec![
            Span::styled("Temperature  ", label),
            Span::styled(format!("{:.1}", app.generation.temperature()), value),
        ]),
        Line::from(vec![
            Span::styled("Max tokens   ", label),
            Span::styled(app.generation.max_output_tokens().to_string(), value),
        ]),
        Line::from(vec![
            Span::styled("Exchanges    ", label),
            Span::styled(app.conversation_count().to_string(), value),
        ]),
    ];

    let settings = Paragraph::new(settings).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border_color))
            .title(" Settings "),
    );
    frame.render_widget(settings, settings_area);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let notice_height = if app.notice.is_some() { 1 } else { 0 };
    let [chat_area, notice_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(notice_height),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    render_chat(app, frame, chat_area);

    if let Some(notice) = &app.notice {
        let line = match notice {
            Notice::Error(message) => Line::from(Span::styled(
                format!(" {}", message),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )),
            Notice::Info(message) => Line::from(Span::styled(
                format!(" {}", message),
                Style::default().fg(Color::DarkGray),
            )),
        };
        frame.render_widget(Paragraph::new(line), notice_area);
    }

    render_input(app, frame, input_area);
}

fn render_chat(app: &App, frame: &mut Frame, area: Rect) {
    let persona = app.selected_persona();
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" Chat with {} ", persona.name()));

    let session = app.controller.session();
    let chat_text = if session.is_empty() && !app.is_thinking() {
        Text::from(Span::styled(
            format!("Start a conversation with {}", persona.name()),
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let user_style = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
        let assistant_style = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
        let mut lines: Vec<Line> = Vec::new();
        let mut replies = 0;

        for turn in session.turns() {
            let (style, speaker) = match turn.role {
                Role::Assistant => {
                    replies += 1;
                    (assistant_style, app.reply_persona(replies - 1))
                }
                _ => (user_style, persona),
            };
            lines.push(Line::from(Span::styled(
                app.speaker_label(turn.role, speaker),
                style,
            )));
            match turn.role {
                Role::Assistant => {
                    for line in turn.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
                _ => {
                    for line in turn.content.lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                }
            }
            lines.push(Line::default());
        }

        if app.is_thinking() {
            lines.push(Line::from(Span::styled(
                app.speaker_label(Role::Assistant, app.pending_persona()),
                assistant_style,
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let input_border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let title = if app.is_thinking() {
        " Message (waiting for reply) "
    } else {
        " Message "
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(title);

    let inner_width = area.width.saturating_sub(2) as usize;
    let (visible_text, cursor_x) = input_viewport(&app.input, app.cursor, inner_width);

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    if editing {
        let cursor_x = u16::try_from(cursor_x).unwrap_or(u16::MAX);
        frame.set_cursor_position((area.x.saturating_add(cursor_x).saturating_add(1), area.y + 1));
    }
}

/// Terminal cells taken by `c`; full-width characters take two.
fn char_width(c: char) -> usize {
    let mut buf = [0u8; 4];
    Span::raw(&*c.encode_utf8(&mut buf)).width()
}

/// Horizontally scroll the input so the cursor stays inside `width` cells.
/// Returns the visible text and the cursor column within it, both measured
/// in display cells rather than chars.
fn input_viewport(input: &str, cursor: usize, width: usize) -> (String, usize) {
    if width == 0 {
        return (String::new(), 0);
    }

    let chars: Vec<char> = input.chars().collect();
    let widths: Vec<usize> = chars.iter().map(|&c| char_width(c)).collect();
    let cursor = cursor.min(chars.len());

    // Drop chars from the left until the cursor cell fits
    let mut start = 0;
    let mut before: usize = widths[..cursor].iter().sum();
    while start < cursor && before >= width {
        before -= widths[start];
        start += 1;
    }

    let mut used = 0;
    let visible: String = chars[start..]
        .iter()
        .zip(&widths[start..])
        .take_while(|(_, &w)| {
            used += w;
            used <= width
        })
        .map(|(&c, _)| c)
        .collect();

    (visible, before)
}
