use chrono::Local;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use super::utils::{level_color, truncate};
use crate::sync::Notification;

/// Draw the footer bar with view breadcrumb and the latest notification
pub fn draw_footer(
  frame: &mut Frame,
  area: Rect,
  breadcrumb: &[String],
  notification: Option<&Notification>,
) {
  let mut spans = vec![Span::raw(" ")];

  for (i, part) in breadcrumb.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(Color::DarkGray)));
    }

    let style = if i == breadcrumb.len() - 1 {
      Style::default().fg(Color::Cyan).bold()
    } else {
      Style::default().fg(Color::White)
    };

    spans.push(Span::styled(part.clone(), style));
  }

  if let Some(note) = notification {
    let used: usize = spans.iter().map(|s| s.content.chars().count()).sum();
    let room = (area.width as usize).saturating_sub(used + 14);
    spans.push(Span::styled("  │ ", Style::default().fg(Color::DarkGray)));
    spans.push(Span::styled(
      format!("{} ", note.at.with_timezone(&Local).format("%H:%M")),
      Style::default().fg(Color::DarkGray),
    ));
    spans.push(Span::styled(
      truncate(&note.message, room),
      Style::default().fg(level_color(note.level)),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}
