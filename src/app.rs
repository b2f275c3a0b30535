use crate::event::{Event, EventHandler};
use crate::net::LinkState;
use crate::sync::{Level, Notification, SyncContext, SyncEvent};
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{PermissionListView, ProfileView, RoleListView, SignInView};
use color_eyre::Result;
use crossterm::event::{DisableFocusChange, EnableFocusChange, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Main application state
pub struct App {
  ctx: Arc<SyncContext>,
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,
  command: CommandInput,
  notification: Option<Notification>,
  title: String,
  probe_interval: Duration,
  should_quit: bool,
}

impl App {
  pub fn new(ctx: Arc<SyncContext>, title: String, probe_interval: Duration) -> Self {
    let root: Box<dyn View> = Box::new(RoleListView::new(Arc::clone(&ctx)));
    Self {
      ctx,
      view_stack: vec![root],
      command: CommandInput::new(),
      notification: None,
      title,
      probe_interval,
      should_quit: false,
    }
  }

  pub async fn run(&mut self, sync_events: mpsc::UnboundedReceiver<SyncEvent>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    // Not every terminal reports focus; revalidate-on-focus just won't fire
    if let Err(e) = stdout().execute(EnableFocusChange) {
      warn!(error = %e, "focus reporting unavailable");
    }
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut tasks = vec![
      self.ctx.start(),
      self.ctx.spawn_reconnect_watcher(),
    ];
    if !self.probe_interval.is_zero() {
      let client = self.ctx.client().clone();
      tasks.push(self.ctx.connectivity().spawn_probe(self.probe_interval, move || {
        let client = client.clone();
        async move { client.probe().await }
      }));
    }

    let mut events = EventHandler::new(Duration::from_millis(250), sync_events);

    let result = self.event_loop(&mut terminal, &mut events).await;

    for task in tasks {
      task.abort();
    }

    // Cleanup terminal
    let _ = stdout().execute(DisableFocusChange);
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop<B: Backend>(
    &mut self,
    terminal: &mut Terminal<B>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }
    Ok(())
  }

  pub fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => {
        if let Some(view) = self.view_stack.last_mut() {
          let action = view.tick();
          self.apply(action);
        }
      }
      Event::Focus(true) => {
        self.ctx.on_focus();
        if let Some(view) = self.view_stack.last_mut() {
          view.on_focus();
        }
      }
      Event::Focus(false) => {}
      Event::Sync(SyncEvent::Notice(notice)) => self.notification = Some(notice),
      Event::Sync(SyncEvent::SignInRequired) => self.open_sign_in(),
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    // The palette only opens when the view is not typing
    let view_typing = self
      .view_stack
      .last()
      .map(|v| v.captures_input())
      .unwrap_or(false);
    if self.command.is_active() || !view_typing {
      match self.command.handle_key(key) {
        KeyResult::Event(CommandEvent::Submitted(cmd)) => {
          self.execute_command(&cmd);
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled => {}
      }
    }

    if let Some(view) = self.view_stack.last_mut() {
      let action = view.handle_key(key);
      self.apply(action);
    }
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  fn reset_root(&mut self, view: Box<dyn View>) {
    self.view_stack.clear();
    self.view_stack.push(view);
  }

  /// Push the sign-in screen unless it is already open.
  fn open_sign_in(&mut self) {
    if self.view_stack.iter().any(|v| v.is_sign_in()) {
      return;
    }
    self
      .view_stack
      .push(Box::new(SignInView::new(Arc::clone(&self.ctx))));
  }

  fn execute_command(&mut self, cmd: &str) {
    info!(command = cmd, "command");
    match cmd {
      "roles" => self.reset_root(Box::new(RoleListView::new(Arc::clone(&self.ctx)))),
      "permissions" => self.reset_root(Box::new(PermissionListView::new(Arc::clone(&self.ctx)))),
      "profile" => self.reset_root(Box::new(ProfileView::new(Arc::clone(&self.ctx)))),
      "signin" => self.open_sign_in(),
      "signout" => {
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move { ctx.sign_out().await });
      }
      "offline" => {
        let forced = self.ctx.connectivity().toggle_forced_offline();
        let message = if forced {
          "Working offline: changes are disabled, cached data only"
        } else {
          "Back online"
        };
        self.notification = Some(Notification::new(Level::Info, message));
      }
      "refresh" => {
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move { ctx.refresh_all().await });
      }
      "quit" => self.should_quit = true,
      "" => {}
      other => {
        self.notification = Some(Notification::new(
          Level::Warning,
          format!("Unknown command: {}", other),
        ));
      }
    }
  }

  // Accessors for UI rendering
  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn user_label(&self) -> Option<String> {
    self
      .ctx
      .session
      .current()
      .map(|s| s.display_name().to_string())
  }

  pub fn link_state(&self) -> LinkState {
    self.ctx.connectivity().state()
  }

  pub fn notification(&self) -> Option<&Notification> {
    self.notification.as_ref()
  }

  pub fn command(&self) -> &CommandInput {
    &self.command
  }

  pub fn shortcuts(&self) -> Vec<ShortcutInfo> {
    self
      .view_stack
      .last()
      .map(|v| v.shortcuts())
      .unwrap_or_default()
  }

  pub fn render_view(&mut self, frame: &mut Frame, area: Rect) {
    if let Some(view) = self.view_stack.last_mut() {
      view.render(frame, area);
    }
  }

  pub fn view_breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|v| v.breadcrumb_label())
      .collect()
  }

  pub fn should_quit(&self) -> bool {
    self.should_quit
  }
}
