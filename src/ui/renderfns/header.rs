use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::net::LinkState;
use crate::ui::view::ShortcutInfo;

/// Draw the header bar with logo, context, connectivity and shortcuts
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  title: &str,
  user: Option<&str>,
  link: LinkState,
  shortcuts: &[ShortcutInfo],
) {
  let mut spans = vec![
    Span::styled(" edudesk ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", title), Style::default().fg(Color::White)),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", user.unwrap_or("signed out")),
      Style::default().fg(Color::Yellow).bold(),
    ),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    link_badge(link),
    Span::raw("  "),
  ];

  let mut sorted: Vec<&ShortcutInfo> = shortcuts.iter().collect();
  sorted.sort_by_key(|s| s.priority);
  for shortcut in sorted {
    // Keys and brackets highlighted, descriptions dimmed
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(
      format!(" {}   ", shortcut.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

fn link_badge(link: LinkState) -> Span<'static> {
  if link.forced_offline {
    Span::styled(" ● working offline ", Style::default().fg(Color::Magenta))
  } else if link.reachable {
    Span::styled(" ● online ", Style::default().fg(Color::Green))
  } else {
    Span::styled(" ● offline ", Style::default().fg(Color::Yellow))
  }
}
