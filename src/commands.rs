//! `:` commands and their autocomplete.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "classes",
    aliases: &["c", "class", "dashboard"],
    description: "Your classes",
  },
  Command {
    name: "items",
    aliases: &["i", "item"],
    description: "Your items",
  },
  Command {
    name: "refresh",
    aliases: &["reload", "r"],
    description: "Drop cached data and reload",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit classdesk",
  },
];

/// Commands matching `input`, best match first.
///
/// Ranking: exact name, exact alias, name prefix, alias prefix, then
/// substring of name or alias.
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input = input.trim().to_lowercase();
  if input.is_empty() {
    return COMMANDS.iter().collect();
  }

  let rank = |cmd: &Command| -> Option<u8> {
    let aliases = cmd.aliases.iter();
    if cmd.name == input {
      Some(0)
    } else if cmd.aliases.contains(&input.as_str()) {
      Some(1)
    } else if cmd.name.starts_with(&input) {
      Some(2)
    } else if aliases.clone().any(|a| a.starts_with(&input)) {
      Some(3)
    } else if cmd.name.contains(&input) || aliases.clone().any(|a| a.contains(&input)) {
      Some(4)
    } else {
      None
    }
  };

  let mut matches: Vec<(&'static Command, u8)> = COMMANDS
    .iter()
    .filter_map(|cmd| rank(cmd).map(|r| (cmd, r)))
    .collect();
  // stable sort keeps declaration order within a rank
  matches.sort_by_key(|(_, r)| *r);
  matches.into_iter().map(|(cmd, _)| cmd).collect()
}
