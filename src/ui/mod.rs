use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use regex::Regex;
use unicode_width::UnicodeWidthStr;

use crate::app::state::{AddField, AppState, EditField, OverlayState, SignInField, StatusKind};
use crate::config::themes::Palette;
use crate::highlight::{build_highlight_regex, split_matches};
use crate::model::UserIdentity;
use crate::pantry::{EditModel, ExpiryStatus, PantryView, ViewRow};

/// Pantry state a frame is drawn from.
pub struct Screen<'a> {
    pub user: Option<&'a UserIdentity>,
    pub view: &'a PantryView<'a>,
    pub edits: &'a EditModel,
}

pub fn draw_app(frame: &mut Frame, screen: &Screen<'_>, state: &AppState, list_state: &mut ListState) {
    match screen.user {
        Some(user) => draw_pantry(frame, screen, user, state, list_state),
        None => draw_landing(frame, state),
    }
    render_overlay(frame, screen, state);
}

fn draw_landing(frame: &mut Frame, state: &AppState) {
    let palette = &state.palette;
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(2)])
        .split(frame.size());

    let area = centered_rect(60, 40, vertical[0]);
    let lines = vec![
        Line::from(Span::styled(
            "Pantry Tracker",
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "Keep track of what is in your pantry and what expires soon.",
            Style::default().fg(palette.foreground),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("Press ", Style::default().fg(palette.muted)),
            Span::styled("s", Style::default().fg(palette.accent).add_modifier(Modifier::BOLD)),
            Span::styled(" to sign in, ", Style::default().fg(palette.muted)),
            Span::styled("q", Style::default().fg(palette.accent).add_modifier(Modifier::BOLD)),
            Span::styled(" to quit.", Style::default().fg(palette.muted)),
        ]),
    ];
    let paragraph = Paragraph::new(lines)
        .alignment(ratatui::layout::Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(paragraph, area);
    frame.render_widget(Paragraph::new(build_status_line(state, false)), vertical[1]);
}

fn draw_pantry(
    frame: &mut Frame,
    screen: &Screen<'_>,
    user: &UserIdentity,
    state: &AppState,
    list_state: &mut ListState,
) {
    let palette = &state.palette;
    let footer_height = if screen.view.show_total() { 1 } else { 0 };
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(footer_height),
            Constraint::Length(2),
        ])
        .split(frame.size());

    let search = screen.edits.search();
    let search_style = if state.search_active {
        Style::default().fg(palette.accent)
    } else {
        Style::default().fg(palette.muted)
    };
    let search_text = if search.is_empty() && !state.search_active {
        Span::styled("press / to search", Style::default().fg(palette.muted))
    } else {
        Span::styled(search.to_string(), Style::default().fg(palette.foreground))
    };
    let search_bar = Paragraph::new(Line::from(vec![Span::raw("🔍 "), search_text])).block(
        Block::default()
            .title(format!("Pantry of {}", user.label()))
            .borders(Borders::ALL)
            .border_style(search_style),
    );
    frame.render_widget(search_bar, vertical[0]);
    if state.search_active {
        let x = vertical[0].x + 1 + "🔍 ".width() as u16 + search.width() as u16;
        frame.set_cursor(x.min(vertical[0].right().saturating_sub(2)), vertical[0].y + 1);
    }

    let regex = build_highlight_regex(search);
    let mut items: Vec<ListItem> = screen
        .view
        .rows
        .iter()
        .map(|row| match screen.edits.edit_draft() {
            Some(draft) if draft.item_id == row.item.id => {
                ListItem::new(edit_row_line(draft, state.edit_focus, palette))
            }
            _ => ListItem::new(item_row_line(row, regex.as_ref(), palette)),
        })
        .collect();
    if items.is_empty() {
        let message = if screen.view.is_filtered_empty() {
            "No items match the search."
        } else {
            "Your pantry is empty. Press `a` to add an item."
        };
        items.push(ListItem::new(Span::styled(
            message,
            Style::default().fg(palette.muted),
        )));
    }
    let list = List::new(items)
        .block(
            Block::default()
                .title(format!("Items ({})", screen.view.rows.len()))
                .borders(Borders::ALL),
        )
        .highlight_style(
            Style::default()
                .bg(palette.selection)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, vertical[1], list_state);

    if screen.view.show_total() {
        let total = Line::from(vec![
            Span::styled("Total quantity: ", Style::default().fg(palette.muted)),
            Span::styled(
                screen.view.total_text(),
                Style::default()
                    .fg(palette.accent)
                    .add_modifier(Modifier::BOLD),
            ),
        ]);
        frame.render_widget(Paragraph::new(total), vertical[2]);
    }

    frame.render_widget(Paragraph::new(build_status_line(state, true)), vertical[3]);
}

fn item_row_line(row: &ViewRow<'_>, regex: Option<&Regex>, palette: &Palette) -> Line<'static> {
    let mut spans = highlight_line(
        &row.item.name,
        regex,
        Style::default()
            .fg(palette.highlight)
            .add_modifier(Modifier::BOLD),
        Style::default()
            .fg(palette.foreground)
            .add_modifier(Modifier::BOLD),
    );
    spans.push(Span::styled(
        format!("  × {}", row.quantity_text()),
        Style::default().fg(palette.foreground),
    ));
    if let Some(status) = row.expiry {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("[{}]", status.badge()),
            expiry_style(status, palette).add_modifier(Modifier::BOLD),
        ));
    }
    if let Some(date) = row.item.expiry_date.as_deref().filter(|d| !d.is_empty()) {
        spans.push(Span::styled(
            format!(" {date}"),
            Style::default().fg(palette.muted),
        ));
    }
    if row.item.image_url.is_some() {
        spans.push(Span::styled(" 📷", Style::default().fg(palette.muted)));
    }
    Line::from(spans)
}

fn edit_row_line(
    draft: &crate::pantry::EditDraft,
    focus: EditField,
    palette: &Palette,
) -> Line<'static> {
    let field = |label: &str, value: &str, focused: bool| {
        let style = if focused {
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::UNDERLINED)
        } else {
            Style::default().fg(palette.foreground)
        };
        vec![
            Span::styled(format!("{label}: "), Style::default().fg(palette.muted)),
            Span::styled(format!("{value}{}", if focused { "▏" } else { "" }), style),
        ]
    };
    let mut spans = vec![Span::styled(
        "✎ ",
        Style::default()
            .fg(palette.accent)
            .add_modifier(Modifier::BOLD),
    )];
    spans.extend(field("name", &draft.name, focus == EditField::Name));
    spans.push(Span::raw("  "));
    spans.extend(field("qty", &draft.quantity, focus == EditField::Quantity));
    spans.push(Span::raw("  "));
    spans.extend(field("expires", &draft.expiry_date, focus == EditField::Expiry));
    Line::from(spans)
}

fn expiry_style(status: ExpiryStatus, palette: &Palette) -> Style {
    let color = match status {
        ExpiryStatus::Expired => palette.expired,
        ExpiryStatus::Soon => palette.soon,
        ExpiryStatus::Ok => palette.fresh,
    };
    Style::default().fg(color)
}

fn build_status_line(state: &AppState, signed_in: bool) -> Text<'static> {
    let palette = &state.palette;
    let mut lines = Vec::with_capacity(2);
    let status = match state.status() {
        Some(message) => {
            let color = match message.kind {
                StatusKind::Info => palette.accent,
                StatusKind::Error => palette.error,
            };
            Span::styled(message.text.clone(), Style::default().fg(color))
        }
        None => Span::raw(""),
    };
    lines.push(Line::from(status));

    let keys = if signed_in {
        "j/k move • / search • a add • e edit • d delete • C clear all • S sign out • q quit"
    } else {
        "s sign in • q quit"
    };
    lines.push(Line::from(vec![
        Span::styled(
            "Keys: ",
            Style::default()
                .fg(palette.muted)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(keys, Style::default().fg(palette.muted)),
    ]));
    Text::from(lines)
}

fn highlight_line(
    text: &str,
    regex: Option<&Regex>,
    highlight_style: Style,
    base_style: Style,
) -> Vec<Span<'static>> {
    split_matches(text, regex)
        .into_iter()
        .map(|(segment, matched)| {
            let style = if matched { highlight_style } else { base_style };
            Span::styled(segment.to_string(), style)
        })
        .collect()
}

fn render_overlay(frame: &mut Frame, screen: &Screen<'_>, state: &AppState) {
    let palette = &state.palette;
    match state.overlay() {
        Some(OverlayState::SignIn(form)) => {
            let area = centered_rect(60, 30, frame.size());
            frame.render_widget(Clear, area);
            let fields = [
                ("Email", form.email.as_str(), form.focus == SignInField::Email),
                (
                    "Name (optional)",
                    form.display_name.as_str(),
                    form.focus == SignInField::DisplayName,
                ),
            ];
            let mut lines = form_lines(&fields, palette);
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Tab switch field • Enter sign in • Esc cancel",
                Style::default().fg(palette.muted),
            )));
            let paragraph = Paragraph::new(lines).block(
                Block::default()
                    .title("Sign in")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.accent)),
            );
            frame.render_widget(paragraph, area);
            place_cursor(frame, area, &fields);
            return;
        }
        Some(OverlayState::ConfirmSignOut) => {
            confirm_dialog(frame, "Sign out", "Sign out of your pantry? (y/n)", palette);
            return;
        }
        None => {}
    }

    if screen.user.is_none() {
        return;
    }
    if screen.edits.is_clear_dialog_open() {
        let message = format!(
            "Delete all {} item(s) from your pantry? This cannot be undone. (y/n)",
            screen.view.item_count
        );
        confirm_dialog(frame, "Clear all", &message, palette);
    } else if screen.edits.is_add_open() {
        let draft = screen.edits.add_draft();
        let area = centered_rect(60, 45, frame.size());
        frame.render_widget(Clear, area);
        let fields = [
            ("Name", draft.name.as_str(), state.add_focus == AddField::Name),
            (
                "Quantity",
                draft.quantity.as_str(),
                state.add_focus == AddField::Quantity,
            ),
            (
                "Expires (YYYY-MM-DD)",
                draft.expiry_date.as_str(),
                state.add_focus == AddField::Expiry,
            ),
            (
                "Image file",
                state.image_path.as_str(),
                state.add_focus == AddField::Image,
            ),
        ];
        let mut lines = form_lines(&fields, palette);
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Tab next field • Enter add • Esc cancel",
            Style::default().fg(palette.muted),
        )));
        let paragraph = Paragraph::new(lines).block(
            Block::default()
                .title("Add item")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.accent)),
        );
        frame.render_widget(paragraph, area);
        place_cursor(frame, area, &fields);
    }
}

fn form_lines(fields: &[(&str, &str, bool)], palette: &Palette) -> Vec<Line<'static>> {
    fields
        .iter()
        .map(|(label, value, focused)| {
            let label_style = if *focused {
                Style::default()
                    .fg(palette.accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(palette.muted)
            };
            Line::from(vec![
                Span::styled(format!("{label}: "), label_style),
                Span::styled(value.to_string(), Style::default().fg(palette.foreground)),
            ])
        })
        .collect()
}

fn place_cursor(frame: &mut Frame, area: Rect, fields: &[(&str, &str, bool)]) {
    let Some((row, (label, value, _))) = fields
        .iter()
        .enumerate()
        .find(|(_, (_, _, focused))| *focused)
    else {
        return;
    };
    let offset = label.width() + 2 + value.width();
    let x = area.x + 1 + offset as u16;
    let y = area.y + 1 + row as u16;
    if x < area.right().saturating_sub(1) && y < area.bottom().saturating_sub(1) {
        frame.set_cursor(x, y);
    }
}

fn confirm_dialog(frame: &mut Frame, title: &str, message: &str, palette: &Palette) {
    let area = centered_rect(50, 20, frame.size());
    frame.render_widget(Clear, area);
    let paragraph = Paragraph::new(message.to_string())
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title(title.to_string())
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.expired)),
        );
    frame.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
