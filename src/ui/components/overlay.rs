use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

/// Clear a bordered box near the top-left of `area` and draw the prompt line
/// in it. Returns the space left below the prompt.
pub fn draw_prompt_box(
  frame: &mut Frame,
  area: Rect,
  title: &str,
  prompt: &str,
  value: &str,
  extra_rows: u16,
) -> Rect {
  let width = (area.width * 60 / 100).clamp(30, 60).min(area.width);
  let height = (3 + extra_rows).min(area.height);
  let overlay_area = Rect::new(area.x + 1, area.y + 1, width, height).intersection(area);

  frame.render_widget(Clear, overlay_area);

  let block = Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Yellow))
    .title(format!(" {} ", title));

  let inner = block.inner(overlay_area);
  frame.render_widget(block, overlay_area);

  if inner.height == 0 {
    return inner;
  }

  let [prompt_row, rest] =
    Layout::vertical([Constraint::Length(1), Constraint::Min(0)]).areas(inner);

  let line = Line::from(vec![
    Span::styled(prompt.to_string(), Style::default().fg(Color::Yellow)),
    Span::raw(value.to_string()),
    Span::styled("_", Style::default().fg(Color::Yellow)),
  ]);
  frame.render_widget(Paragraph::new(line), prompt_row);

  rest
}
