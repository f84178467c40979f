// Line tokenizer: whitespace-separated arguments, double quotes preserve whitespace.
pub const MAX_ARGS: usize = 32;

/// Splits one input line into at most `MAX_ARGS` tokens.
///
/// Quotes toggle whitespace preservation and stay in the token; use
/// [`unquote`] when a handler needs the literal value. A `\n` ends the
/// line, quoted or not. Tokens past the cap are dropped.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for ch in line.chars() {
        if ch == '\n' {
            break;
        }
        if ch == '"' {
            quoted = !quoted;
        }
        if ch.is_whitespace() && !quoted {
            if in_token {
                push_token(&mut tokens, &mut current);
                in_token = false;
            }
            continue;
        }
        in_token = true;
        current.push(ch);
    }
    if in_token {
        push_token(&mut tokens, &mut current);
    }
    tokens
}

fn push_token(tokens: &mut Vec<String>, current: &mut String) {
    let token = std::mem::take(current);
    if tokens.len() < MAX_ARGS {
        tokens.push(token);
    }
}

/// Copy of `token` with every double quote removed.
pub fn unquote(token: &str) -> String {
    token.chars().filter(|ch| *ch != '"').collect()
}

#[cfg(test)]
mod tests {
    use super::{MAX_ARGS, tokenize, unquote};

    #[test]
    fn splits_on_whitespace_and_keeps_quoted_spans() {
        let tokens = tokenize("  select   disk\t1 ");
        assert_eq!(tokens, vec!["select", "disk", "1"]);

        let tokens = tokenize("rem \"two words\" done");
        assert_eq!(tokens, vec!["rem", "\"two words\"", "done"]);
        assert_eq!(unquote(&tokens[1]), "two words");
    }

    #[test]
    fn newline_ends_the_line_even_inside_quotes() {
        let tokens = tokenize("list \"disk\nvolume");
        assert_eq!(tokens, vec!["list", "\"disk"]);
        assert_eq!(tokenize("select disk 1\n"), vec!["select", "disk", "1"]);
    }

    #[test]
    fn tokens_past_the_cap_are_dropped() {
        let line = (0..40).map(|n| n.to_string()).collect::<Vec<_>>().join(" ");
        let tokens = tokenize(&line);
        assert_eq!(tokens.len(), MAX_ARGS);
        assert_eq!(tokens.last().map(String::as_str), Some("31"));
    }

    #[test]
    fn empty_line_has_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \n").is_empty());
    }
}
