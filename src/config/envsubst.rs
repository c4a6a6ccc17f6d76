//! Environment variable templating for document values.
//!
//! A value may embed actions of the form `{{ env "NAME" }}`, which are
//! replaced by the value of the named environment variable. Expansion runs
//! once; the substituted text is never re-scanned for further actions.

use crate::error::ConfigError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Expands `env` actions in `input` using the process environment.
///
/// # Errors
///
/// Returns [`ConfigError::MissingEnvVar`] for an undefined variable and
/// [`ConfigError::TemplateSyntax`] for a malformed action.
pub fn expand_env(input: &str) -> Result<String, ConfigError> {
    expand_with(input, |name| std::env::var(name).ok())
}

/// Expands `env` actions in `input`, resolving names with `lookup`.
///
/// # Errors
///
/// Same as [`expand_env`].
pub fn expand_with<F>(input: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find(OPEN) {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let end = after_open
            .find(CLOSE)
            .ok_or_else(|| syntax_error(input, "unclosed action"))?;

        let name = parse_action(&after_open[..end]).map_err(|message| syntax_error(input, message))?;
        let value = lookup(&name).ok_or(ConfigError::MissingEnvVar { name })?;
        output.push_str(&value);

        rest = &after_open[end + CLOSE.len()..];
    }

    output.push_str(rest);
    Ok(output)
}

/// Parses the inside of an action, which must be `env "<name>"`.
fn parse_action(action: &str) -> Result<String, &'static str> {
    let action = action.trim();
    let argument = action
        .strip_prefix("env")
        .filter(|arg| arg.starts_with(char::is_whitespace))
        .ok_or("only the env function is supported")?
        .trim();

    let (name, trailing) = parse_string_literal(argument)?;
    if !trailing.trim().is_empty() {
        return Err("env takes exactly one argument");
    }
    Ok(name)
}

/// Parses a double-quoted or backquoted string literal at the start of `input`.
fn parse_string_literal(input: &str) -> Result<(String, &str), &'static str> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, q @ ('"' | '`'))) => q,
        _ => return Err("env expects a quoted variable name"),
    };

    let mut literal = String::new();
    while let Some((index, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((literal, &input[index + c.len_utf8()..])),
            '\\' if quote == '"' => match chars.next() {
                Some((_, '"')) => literal.push('"'),
                Some((_, '\\')) => literal.push('\\'),
                Some((_, 'n')) => literal.push('\n'),
                Some((_, 't')) => literal.push('\t'),
                _ => return Err("invalid escape sequence"),
            },
            c => literal.push(c),
        }
    }
    Err("unterminated string literal")
}

fn syntax_error(input: &str, message: &str) -> ConfigError {
    ConfigError::TemplateSyntax {
        input: input.to_string(),
        message: message.to_string(),
    }
}
