//! Script line parser
//!
//! Parses tsar script lines:
//! - `#` at line start (after leading whitespace) is a comment
//! - `[tag]` / `[!tag]` at line start guards the rest of the line
//! - `!` as the first word negates the command
//! - double-quoted words keep their whitespace; `\"` and `\\` are the only escapes
//! - `$VAR` and `${VAR}` are expanded over the whole line before splitting
//! - a trailing `&` or `&name` word runs an `exec` in the background

/// A condition guard on a script line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCondition {
    /// The condition tag without brackets or `!` (e.g. "short", "linux")
    pub tag: String,
    /// Whether the condition is negated
    pub negate: bool,
}

/// Parse error returned when a line has invalid syntax
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ParseError {}

/// Split a leading `[cond]` guard off a trimmed line.
///
/// Returns the condition (if any) and the remaining command text, trimmed.
/// An empty remainder means the line is a no-op.
pub fn split_condition(line: &str) -> Result<(Option<ScriptCondition>, &str), ParseError> {
    let Some(body) = line.strip_prefix('[') else {
        return Ok((None, line));
    };
    let end = body.find(']').ok_or_else(|| ParseError::new("unterminated condition"))?;
    let inner = body[..end].trim();
    let rest = body[end + 1..].trim();

    let (negate, tag) = match inner.strip_prefix('!') {
        Some(tag) => (true, tag.trim()),
        None => (false, inner),
    };
    if tag.is_empty() {
        return Err(ParseError::new("empty condition"));
    }

    Ok((Some(ScriptCondition { tag: tag.to_string(), negate }), rest))
}

/// Split a line into words.
///
/// Unquoted text splits on runs of spaces and tabs. A double-quoted segment
/// keeps its whitespace verbatim and may be glued to surrounding unquoted
/// text (`a"b c"d` is one word). Empty input yields no words.
pub fn split_args(line: &str) -> Result<Vec<String>, ParseError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '"' => {
                in_word = true;
                let mut closed = false;
                while let Some(q) = chars.next() {
                    match q {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some(e @ ('"' | '\\')) => current.push(e),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => current.push('\\'),
                        },
                        other => current.push(other),
                    }
                }
                if !closed {
                    return Err(ParseError::new("unterminated quoted argument"));
                }
            }
            other => {
                in_word = true;
                current.push(other);
            }
        }
    }

    if in_word {
        args.push(current);
    }
    Ok(args)
}

/// Expand environment variables in a string.
/// Supports `$VAR` and `${VAR}` syntax; a `$` not followed by a name is kept.
///
/// Unresolved names expand to the empty string.
pub fn expand_env(s: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        if chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            while let Some(&c) = chars.peek() {
                chars.next();
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            result.push_str(&lookup(&var_name).unwrap_or_default());
        } else {
            let mut var_name = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    var_name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }

            if var_name.is_empty() {
                result.push('$');
            } else {
                result.push_str(&lookup(&var_name).unwrap_or_default());
            }
        }
    }

    result
}

/// A trailing `&` / `&name` word on an `exec` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundSpec {
    /// Explicit job name, if one was given
    pub name: Option<String>,
}

impl BackgroundSpec {
    /// Match a word against `&` followed by an optional `[A-Za-z_]\w*` identifier.
    pub fn parse(word: &str) -> Option<Self> {
        let name = word.strip_prefix('&')?;
        if name.is_empty() {
            return Some(Self { name: None });
        }
        let mut chars = name.chars();
        let first = chars.next()?;
        if !(first.is_ascii_alphabetic() || first == '_') {
            return None;
        }
        if !chars.all(|c| c.is_alphanumeric() || c == '_') {
            return None;
        }
        Some(Self { name: Some(name.to_string()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_simple() {
        assert_eq!(split_args("hello world").unwrap(), words(&["hello", "world"]));
    }

    #[test]
    fn test_split_quoted() {
        assert_eq!(split_args("\"hello world\"").unwrap(), words(&["hello world"]));
        assert_eq!(split_args("\"hello\"").unwrap(), words(&["hello"]));
    }

    #[test]
    fn test_split_mixed() {
        assert_eq!(
            split_args("foo \"hello world\" bar").unwrap(),
            words(&["foo", "hello world", "bar"])
        );
        assert_eq!(
            split_args("\"foo bar\" \"baz qux\"").unwrap(),
            words(&["foo bar", "baz qux"])
        );
    }

    #[test]
    fn test_split_escapes() {
        assert_eq!(split_args(r#""hello \"world\"""#).unwrap(), words(&[r#"hello "world""#]));
        assert_eq!(split_args(r#""hello\\world""#).unwrap(), words(&[r"hello\world"]));
        assert_eq!(split_args(r#""a\nb""#).unwrap(), words(&[r"a\nb"]));
    }

    #[test]
    fn test_split_single_quotes_are_literal() {
        assert_eq!(split_args("'quoted arg'").unwrap(), words(&["'quoted", "arg'"]));
        let line = expand_env("sh -c \"echo $HOME\"", &|key| {
            if key == "HOME" { Some("/home/u".to_string()) } else { None }
        });
        assert_eq!(split_args(&line).unwrap(), words(&["sh", "-c", "echo /home/u"]));
    }

    #[test]
    fn test_split_whitespace() {
        assert_eq!(split_args("\"hello  world\"").unwrap(), words(&["hello  world"]));
        assert_eq!(split_args("foo\tbar").unwrap(), words(&["foo", "bar"]));
        assert_eq!(split_args("\"foo\tbar\"").unwrap(), words(&["foo\tbar"]));
        assert_eq!(split_args("  a   b  ").unwrap(), words(&["a", "b"]));
    }

    #[test]
    fn test_split_empty() {
        assert!(split_args("").unwrap().is_empty());
        assert!(split_args("   ").unwrap().is_empty());
        assert_eq!(split_args("\"\"").unwrap(), words(&[""]));
    }

    #[test]
    fn test_split_unterminated() {
        let err = split_args("\"hello world").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_split_condition() {
        let (cond, rest) = split_condition("[short] skip slow").unwrap();
        assert_eq!(cond, Some(ScriptCondition { tag: "short".into(), negate: false }));
        assert_eq!(rest, "skip slow");

        let (cond, rest) = split_condition("[!windows] exec ls").unwrap();
        assert_eq!(cond.unwrap().negate, true);
        assert_eq!(rest, "exec ls");

        let (cond, rest) = split_condition("exec ls").unwrap();
        assert!(cond.is_none());
        assert_eq!(rest, "exec ls");
    }

    #[test]
    fn test_split_condition_empty_command() {
        let (cond, rest) = split_condition("[linux]").unwrap();
        assert!(cond.is_some());
        assert!(rest.is_empty());
    }

    #[test]
    fn test_split_condition_unterminated() {
        assert!(split_condition("[linux exec ls").is_err());
        assert!(split_condition("[] exec ls").is_err());
    }

    #[test]
    fn test_expand_env_simple() {
        let result = expand_env("hello $NAME", &|key| {
            if key == "NAME" { Some("world".to_string()) } else { None }
        });
        assert_eq!(result, "hello world");
    }

    #[test]
    fn test_expand_env_braces() {
        let result = expand_env("${HOME}/bin", &|key| {
            if key == "HOME" { Some("/usr/local".to_string()) } else { None }
        });
        assert_eq!(result, "/usr/local/bin");
    }

    #[test]
    fn test_expand_env_undefined_is_empty() {
        let result = expand_env("hello $UNDEF end ${ALSO_UNDEF}", &|_| None);
        assert_eq!(result, "hello  end ");
    }

    #[test]
    fn test_expand_env_lone_dollar() {
        assert_eq!(expand_env("cost $ 5", &|_| None), "cost $ 5");
        assert_eq!(expand_env("end$", &|_| None), "end$");
    }

    #[test]
    fn test_background_spec() {
        assert_eq!(BackgroundSpec::parse("&"), Some(BackgroundSpec { name: None }));
        assert_eq!(BackgroundSpec::parse("&srv"), Some(BackgroundSpec { name: Some("srv".into()) }));
        assert_eq!(BackgroundSpec::parse("&_job2"), Some(BackgroundSpec { name: Some("_job2".into()) }));
        assert_eq!(BackgroundSpec::parse("&2job"), None);
        assert_eq!(BackgroundSpec::parse("&a-b"), None);
        assert_eq!(BackgroundSpec::parse("&&"), None);
        assert_eq!(BackgroundSpec::parse("srv"), None);
    }
}
