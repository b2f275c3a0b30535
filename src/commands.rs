/// Available commands and autocomplete logic

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "roles",
    aliases: &["r", "role"],
    description: "Roles and their permissions",
  },
  Command {
    name: "permissions",
    aliases: &["p", "perm", "perms"],
    description: "Permission catalog",
  },
  Command {
    name: "profile",
    aliases: &["me", "whoami"],
    description: "Signed-in user",
  },
  Command {
    name: "signin",
    aliases: &["login"],
    description: "Sign in with email and password",
  },
  Command {
    name: "signout",
    aliases: &["logout"],
    description: "Forget the session",
  },
  Command {
    name: "offline",
    aliases: &["o", "online"],
    description: "Toggle working offline",
  },
  Command {
    name: "refresh",
    aliases: &["reload", "sync"],
    description: "Refetch everything",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit edudesk",
  },
];

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.trim().to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = COMMANDS
    .iter()
    .filter_map(|cmd| match_rank(cmd, &input_lower).map(|rank| (cmd, rank)))
    .collect();

  // Stable sort keeps declaration order within a rank
  matches.sort_by_key(|(_, rank)| *rank);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Lower is better; `None` means no match.
fn match_rank(cmd: &Command, input: &str) -> Option<u32> {
  if cmd.name == input {
    Some(0)
  } else if cmd.aliases.contains(&input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if cmd.aliases.iter().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if cmd.aliases.iter().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}
