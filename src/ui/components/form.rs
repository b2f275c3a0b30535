use super::input::{InputResult, TextInput};
use super::KeyResult;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

#[derive(Debug, Clone)]
enum FieldKind {
  Text(TextInput),
  Toggle(bool),
}

#[derive(Debug, Clone)]
pub struct FormField {
  label: &'static str,
  kind: FieldKind,
  required: bool,
}

impl FormField {
  pub fn text(label: &'static str) -> Self {
    Self {
      label,
      kind: FieldKind::Text(TextInput::new()),
      required: false,
    }
  }

  pub fn secret(label: &'static str) -> Self {
    Self {
      label,
      kind: FieldKind::Text(TextInput::masked()),
      required: false,
    }
  }

  pub fn toggle(label: &'static str) -> Self {
    Self {
      label,
      kind: FieldKind::Toggle(false),
      required: false,
    }
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub fn value(&self) -> &str {
    match &self.kind {
      FieldKind::Text(input) => input.value(),
      FieldKind::Toggle(_) => "",
    }
  }

  pub fn checked(&self) -> bool {
    matches!(self.kind, FieldKind::Toggle(true))
  }

  fn is_blank(&self) -> bool {
    match &self.kind {
      FieldKind::Text(input) => input.value().trim().is_empty(),
      FieldKind::Toggle(_) => false,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
  Submitted,
  Cancelled,
}

/// Vertical list of labelled fields.
///
/// Tab/arrows move between fields, space flips toggles, Enter on the last
/// field (or Ctrl-S anywhere) submits once every required field is filled.
#[derive(Debug, Clone)]
pub struct Form {
  fields: Vec<FormField>,
  focused: usize,
  error: Option<String>,
}

impl Form {
  pub fn new(fields: Vec<FormField>) -> Self {
    Self {
      fields,
      focused: 0,
      error: None,
    }
  }

  /// Value of the field labelled `label`.
  pub fn value(&self, label: &str) -> &str {
    self
      .fields
      .iter()
      .find(|f| f.label == label)
      .map(FormField::value)
      .unwrap_or("")
  }

  pub fn checked(&self, label: &str) -> bool {
    self
      .fields
      .iter()
      .any(|f| f.label == label && f.checked())
  }

  pub fn set_error(&mut self, error: Option<String>) {
    self.error = error;
  }

  fn move_focus(&mut self, forward: bool) {
    let len = self.fields.len();
    if len == 0 {
      return;
    }
    self.focused = if forward {
      (self.focused + 1) % len
    } else {
      (self.focused + len - 1) % len
    };
  }

  fn try_submit(&mut self) -> KeyResult<FormEvent> {
    if let Some(field) = self.fields.iter().find(|f| f.required && f.is_blank()) {
      self.error = Some(format!("{} is required", field.label));
      return KeyResult::Handled;
    }
    self.error = None;
    KeyResult::Event(FormEvent::Submitted)
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    match key.code {
      KeyCode::Esc => return KeyResult::Event(FormEvent::Cancelled),
      KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        return self.try_submit()
      }
      KeyCode::Tab | KeyCode::Down => {
        self.move_focus(true);
        return KeyResult::Handled;
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.move_focus(false);
        return KeyResult::Handled;
      }
      KeyCode::Enter => {
        if self.focused + 1 == self.fields.len() {
          return self.try_submit();
        }
        self.move_focus(true);
        return KeyResult::Handled;
      }
      _ => {}
    }

    let Some(field) = self.fields.get_mut(self.focused) else {
      return KeyResult::NotHandled;
    };
    match &mut field.kind {
      FieldKind::Toggle(on) => {
        if key.code == KeyCode::Char(' ') {
          *on = !*on;
          KeyResult::Handled
        } else {
          KeyResult::NotHandled
        }
      }
      FieldKind::Text(input) => match input.handle_key(key) {
        InputResult::Consumed => KeyResult::Handled,
        _ => KeyResult::NotHandled,
      },
    }
  }

  pub fn render(&self, frame: &mut Frame, area: Rect, title: &str) {
    let block = Block::default()
      .title(format!(" {} ", title))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let label_width = self
      .fields
      .iter()
      .map(|f| f.label.len())
      .max()
      .unwrap_or(0)
      + 2;

    let mut lines: Vec<Line> = Vec::new();
    for (i, field) in self.fields.iter().enumerate() {
      let focused = i == self.focused;
      let marker = if focused { "> " } else { "  " };
      let label_style = if focused {
        Style::default().fg(Color::Cyan).bold()
      } else {
        Style::default().fg(Color::DarkGray)
      };
      let required = if field.required { "*" } else { " " };

      let value = match &field.kind {
        FieldKind::Text(input) if focused => format!("{}_", input.display()),
        FieldKind::Text(input) => input.display(),
        FieldKind::Toggle(on) => (if *on { "[x]" } else { "[ ]" }).to_string(),
      };

      lines.push(Line::from(vec![
        Span::raw(marker),
        Span::styled(format!("{:<width$}", field.label, width = label_width), label_style),
        Span::styled(required, Style::default().fg(Color::Yellow)),
        Span::raw(" "),
        Span::raw(value),
      ]));
      lines.push(Line::raw(""));
    }

    if let Some(error) = &self.error {
      lines.push(Line::styled(error.clone(), Style::default().fg(Color::Red)));
    } else {
      lines.push(Line::styled(
        "Tab: next field  Space: toggle  Enter: next/submit  Ctrl-S: submit  Esc: cancel",
        Style::default().fg(Color::DarkGray),
      ));
    }

    frame.render_widget(Paragraph::new(lines).block(block), area);
  }
}
