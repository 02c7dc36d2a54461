//! Interactive `setup`: walks through the AI provider and every configured
//! extension, editing [`Settings`] in place.
//!
//! Every prompt shows the current value in brackets; an empty answer keeps
//! it. Secret values are never echoed.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use devassist_core::config::SECRET_KEYS;
use devassist_core::{BackendKind, Settings};
use serde_json::Value;

const PROVIDERS: [(BackendKind, &str); 3] = [
    (BackendKind::Local, "Local (llama.cpp)"),
    (BackendKind::Claude, "Claude (Anthropic)"),
    (BackendKind::OpenAi, "OpenAI"),
];

struct Prompter<'a, R, W> {
    input: &'a mut R,
    output: &'a mut W,
}

impl<R: BufRead, W: Write> Prompter<'_, R, W> {
    fn say(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.output, "{line}")
    }

    /// Print `prompt`, read one line, trimmed. End of input reads as empty.
    fn ask(&mut self, prompt: &str) -> io::Result<String> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

fn is_secret(key: &str) -> bool {
    SECRET_KEYS.contains(&key.to_ascii_lowercase().as_str())
}

/// How a config value is shown as the bracketed default.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(","),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Run the wizard against `settings`.
pub fn run<R: BufRead, W: Write>(
    settings: &mut Settings,
    input: &mut R,
    output: &mut W,
) -> io::Result<()> {
    let mut p = Prompter { input, output };

    p.say("DevAssist Setup Wizard")?;
    p.say(&"=".repeat(40))?;
    p.say("")?;
    p.say("AI Provider Configuration:")?;
    for (i, (_, label)) in PROVIDERS.iter().enumerate() {
        p.say(&format!("{}. {label}", i + 1))?;
    }

    let choice = p.ask(&format!(
        "Select AI provider (1-3) [{}]: ",
        settings.ai.provider
    ))?;
    if !choice.is_empty() {
        let selected = choice
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| PROVIDERS.get(i));
        match selected {
            Some((kind, _)) => settings.ai.provider = kind.as_str().to_string(),
            None => p.say(&format!(
                "Unknown choice {choice:?}, keeping {}",
                settings.ai.provider
            ))?,
        }
    }

    if settings.ai.provider == BackendKind::Local.as_str() {
        let current = settings
            .ai
            .local_model_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        let path = p.ask(&format!("Local model path [{current}]: "))?;
        if !path.is_empty() {
            settings.ai.local_model_path = Some(PathBuf::from(path));
        }
    } else {
        let key = p.ask("API key (leave empty to keep current): ")?;
        if !key.is_empty() {
            settings.ai.api_key = Some(key);
        }
        let model = p.ask(&format!("Model name [{}]: ", settings.ai.model))?;
        if !model.is_empty() {
            settings.ai.model = model;
        }
    }

    p.say("")?;
    p.say("Extension Configuration:")?;
    for (name, extension) in settings.extensions.iter_mut() {
        p.say("")?;
        p.say(&format!("{name}:"))?;

        let current = if extension.enabled { "y" } else { "n" };
        let answer = p.ask(&format!("Enable {name}? (y/n) [{current}]: "))?;
        if !answer.is_empty() {
            extension.enabled = answer.eq_ignore_ascii_case("y");
        }
        if !extension.enabled {
            continue;
        }

        let keys: Vec<String> = extension.config.keys().cloned().collect();
        for key in keys {
            let prompt = if is_secret(&key) {
                format!("{key} (leave empty to keep current): ")
            } else {
                let current = extension
                    .config
                    .get(&key)
                    .map(display_value)
                    .unwrap_or_default();
                format!("{key} [{current}]: ")
            };
            let value = p.ask(&prompt)?;
            if !value.is_empty() {
                extension.config.insert(key, Value::String(value));
            }
        }
    }

    Ok(())
}
