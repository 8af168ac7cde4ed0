//! Navigation command parsing (§4.8 `navigation_agent`): commands always win
//! regardless of state, so this is checked before anything else.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    Pause,
    Repeat,
    Next,
    Previous,
    Resume,
    End,
}

/// `None` if `text` doesn't look like an explicit navigation command.
pub fn parse_navigation_command(text: &str) -> Option<NavCommand> {
    let lower = text.trim().to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();

    // Navigation commands are short, imperative utterances; a long sentence
    // that happens to contain "next" ("what comes next in physics?") is not one.
    if words.is_empty() || words.len() > 4 {
        return None;
    }

    if contains_any(&lower, &["pause", "hold on", "wait"]) {
        Some(NavCommand::Pause)
    } else if contains_any(&lower, &["repeat", "say that again", "again"]) {
        Some(NavCommand::Repeat)
    } else if contains_any(&lower, &["next", "skip ahead", "move on"]) {
        Some(NavCommand::Next)
    } else if contains_any(&lower, &["previous", "go back", "back up"]) {
        Some(NavCommand::Previous)
    } else if contains_any(&lower, &["resume", "continue", "keep going"]) {
        Some(NavCommand::Resume)
    } else if contains_any(&lower, &["end session", "stop session", "goodbye", "end the lesson"]) {
        Some(NavCommand::End)
    } else {
        None
    }
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_each_command() {
        assert_eq!(parse_navigation_command("pause"), Some(NavCommand::Pause));
        assert_eq!(parse_navigation_command("can you repeat that"), Some(NavCommand::Repeat));
        assert_eq!(parse_navigation_command("next"), Some(NavCommand::Next));
        assert_eq!(parse_navigation_command("go back"), Some(NavCommand::Previous));
        assert_eq!(parse_navigation_command("resume"), Some(NavCommand::Resume));
        assert_eq!(parse_navigation_command("goodbye"), Some(NavCommand::End));
    }

    #[test]
    fn long_sentences_are_not_commands_even_if_they_contain_keywords() {
        assert_eq!(parse_navigation_command("what comes next in the course after this topic is finished"), None);
    }

    #[test]
    fn unrelated_utterance_is_not_a_command() {
        assert_eq!(parse_navigation_command("what is a Kalman filter"), None);
    }
}
