//! Text preprocessing for speech synthesis.
//!
//! Completion fragments arrive as markdown-flavoured text. The synthesizer should
//! hear words, not asterisks, so fragments are cleaned before they are spoken.

/// Upper bound on a buffered utterance before it is flushed without a sentence end.
const MAX_PENDING_CHARS: usize = 400;

/// Removes markdown decoration from one completion fragment.
///
/// Fragments are arbitrary slices of the reply, so this works character by
/// character and keeps surrounding whitespace intact; `"**Hello"` and `" world**"`
/// clean to `"Hello"` and `" world"`.
pub fn clean_text(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut line_start = true;
    let mut chars = fragment.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\n' => {
                out.push(c);
                line_start = true;
                continue;
            }
            '*' | '_' | '`' | '~' => {}
            '#' if line_start => {
                while chars.peek() == Some(&'#') {
                    chars.next();
                }
            }
            '>' if line_start => {}
            '-' | '+' if line_start && chars.peek() == Some(&' ') => {
                chars.next();
            }
            '[' => {}
            ']' if chars.peek() == Some(&'(') => {
                // Link target: drop everything up to the closing paren.
                for skipped in chars.by_ref() {
                    if skipped == ')' {
                        break;
                    }
                }
            }
            ']' => {}
            _ => out.push(c),
        }
        if !c.is_whitespace() {
            line_start = false;
        }
    }

    if out.trim().is_empty() {
        String::new()
    } else {
        out
    }
}

/// Pops the next complete sentence off the front of `pending`.
///
/// A sentence ends at `.`, `!`, `?` or a newline followed by whitespace. When no
/// boundary exists but the buffer has grown past [`MAX_PENDING_CHARS`], the
/// buffer is split at the last space instead.
pub fn take_sentence(pending: &mut String) -> Option<String> {
    let mut boundary = None;
    let mut iter = pending.char_indices().peekable();
    while let Some((idx, c)) = iter.next() {
        let terminal = matches!(c, '.' | '!' | '?' | '\n');
        if terminal && iter.peek().is_some_and(|(_, next)| next.is_whitespace()) {
            boundary = Some(idx + c.len_utf8());
            break;
        }
    }

    let boundary = match boundary {
        Some(boundary) => boundary,
        None if pending.len() > MAX_PENDING_CHARS => pending
            .rfind(' ')
            .filter(|idx| *idx > 0)
            .unwrap_or(pending.len()),
        None => return None,
    };

    let sentence: String = pending.drain(..boundary).collect();
    let rest = pending.trim_start().to_string();
    *pending = rest;

    let sentence = sentence.trim();
    if sentence.is_empty() {
        take_sentence(pending)
    } else {
        Some(sentence.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_emphasis_and_code_markers() {
        assert_eq!(clean_text("**Hello** `world`"), "Hello world");
        assert_eq!(clean_text("~~old~~ new"), "old new");
    }

    #[test]
    fn keeps_fragment_whitespace() {
        assert_eq!(clean_text(" there"), " there");
        assert_eq!(clean_text("Hi, "), "Hi, ");
    }

    #[test]
    fn strips_headings_bullets_and_quotes() {
        assert_eq!(clean_text("## Title\n- item\n> quoted"), " Title\nitem\n quoted");
    }

    #[test]
    fn keeps_link_text_only() {
        assert_eq!(clean_text("see [the docs](https://example.com) now"), "see the docs now");
    }

    #[test]
    fn decoration_only_fragment_cleans_to_empty() {
        assert_eq!(clean_text("**"), "");
        assert_eq!(clean_text("  "), "");
        assert_eq!(clean_text("```"), "");
    }

    #[test]
    fn takes_sentences_in_order() {
        let mut pending = "Hello there. How are you? I am".to_string();

        assert_eq!(take_sentence(&mut pending).as_deref(), Some("Hello there."));
        assert_eq!(take_sentence(&mut pending).as_deref(), Some("How are you?"));
        assert_eq!(take_sentence(&mut pending), None);
        assert_eq!(pending, "I am");
    }

    #[test]
    fn decimal_point_is_not_a_boundary() {
        let mut pending = "Pi is 3.14 roughly".to_string();

        assert_eq!(take_sentence(&mut pending), None);
    }

    #[test]
    fn long_runs_split_at_last_space() {
        let mut pending = "word ".repeat(100);
        pending.push_str("tail");

        let sentence = take_sentence(&mut pending).unwrap();

        assert!(sentence.starts_with("word word"));
        assert_eq!(pending, "tail");
    }
}
