//! Compiled wildcard topic patterns.
//!
//! [`TopicPattern::compile`] is a pure function: literal characters are
//! regex-escaped, `*` becomes `[^.]*`, `?` becomes `[^.]`, and the whole
//! expression is anchored. Dots are literal separators and no wildcard can
//! cross one.
//!
//! # Example
//! ```rust
//! use swarmvisor::TopicPattern;
//!
//! let p = TopicPattern::compile("audio.*.chunk");
//! assert!(p.matches("audio.tts.chunk"));
//! assert!(p.matches("audio..chunk")); // `*` also matches the empty segment
//! assert!(!p.matches("audio.tts.raw.chunk"));
//!
//! let q = TopicPattern::compile("module.stat?");
//! assert!(q.matches("module.state"));
//! assert!(!q.matches("module.stat"));
//! ```

use regex::Regex;

/// True if `topic` contains a wildcard and therefore needs compilation.
///
/// Wildcard-free topics are routed through the exact-match table instead.
pub fn is_wildcard(topic: &str) -> bool {
    topic.contains(['*', '?'])
}

/// A topic pattern compiled to an anchored regular expression.
#[derive(Debug, Clone)]
pub struct TopicPattern {
    raw: String,
    regex: Regex,
}

impl TopicPattern {
    /// Compiles a pattern. Deterministic and pure: the same input always
    /// yields an equivalent matcher.
    pub fn compile(pattern: &str) -> Self {
        let mut expr = String::with_capacity(pattern.len() + 8);
        let mut literal = String::new();
        expr.push('^');
        for ch in pattern.chars() {
            match ch {
                '*' | '?' => {
                    if !literal.is_empty() {
                        expr.push_str(&regex::escape(&literal));
                        literal.clear();
                    }
                    expr.push_str(if ch == '*' { "[^.]*" } else { "[^.]" });
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            expr.push_str(&regex::escape(&literal));
        }
        expr.push('$');

        // Escaped literals plus the two fixed character classes always form
        // a valid expression.
        let regex = Regex::new(&expr).expect("compiled topic pattern is a valid regex");
        Self {
            raw: pattern.to_string(),
            regex,
        }
    }

    /// Tests a literal topic against this pattern.
    pub fn matches(&self, topic: &str) -> bool {
        self.regex.is_match(topic)
    }

    /// The original pattern string.
    pub fn pattern(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    /// Brute-force reference matcher used to validate the compiled regex.
    fn reference_matches(pattern: &str, topic: &str) -> bool {
        fn rec(p: &[char], t: &[char]) -> bool {
            match p.first() {
                None => t.is_empty(),
                Some('*') => {
                    // Zero or more non-dot characters.
                    if rec(&p[1..], t) {
                        return true;
                    }
                    match t.first() {
                        Some(&c) if c != '.' => rec(p, &t[1..]),
                        _ => false,
                    }
                }
                Some('?') => match t.first() {
                    Some(&c) if c != '.' => rec(&p[1..], &t[1..]),
                    _ => false,
                },
                Some(&lit) => match t.first() {
                    Some(&c) if c == lit => rec(&p[1..], &t[1..]),
                    _ => false,
                },
            }
        }
        let p: Vec<char> = pattern.chars().collect();
        let t: Vec<char> = topic.chars().collect();
        rec(&p, &t)
    }

    #[test]
    fn test_star_is_segment_scoped() {
        let p = TopicPattern::compile("config.*");
        assert!(p.matches("config.volume"));
        assert!(p.matches("config."));
        assert!(!p.matches("config.volume.max"));
    }

    #[test]
    fn test_question_mark_single_char() {
        let p = TopicPattern::compile("chat.msg.?");
        assert!(p.matches("chat.msg.a"));
        assert!(!p.matches("chat.msg."));
        assert!(!p.matches("chat.msg.ab"));
        assert!(!p.matches("chat.msg.."));
    }

    #[test]
    fn test_dots_are_literal() {
        let p = TopicPattern::compile("a.b");
        assert!(p.matches("a.b"));
        assert!(!p.matches("axb"));
    }

    #[test]
    fn test_literal_regex_metacharacters_are_escaped() {
        let p = TopicPattern::compile("llm.reply+done");
        assert!(p.matches("llm.reply+done"));
        assert!(!p.matches("llm.replyydone"));

        let q = TopicPattern::compile("a(b).c*");
        assert!(q.matches("a(b).chunk"));
        assert!(!q.matches("ab.chunk"));
    }

    #[test]
    fn test_multiple_wildcards() {
        let p = TopicPattern::compile("*.tts.?hunk");
        assert!(p.matches("audio.tts.chunk"));
        assert!(p.matches(".tts.chunk"));
        assert!(!p.matches("audio.asr.chunk"));
    }

    #[test]
    fn test_matches_reference_on_random_corpus() {
        let alphabet = ['a', 'b', '.', '*', '?'];
        let topic_alphabet = ['a', 'b', 'c', '.'];
        let mut rng = rand::thread_rng();

        for _ in 0..2000 {
            let plen = rng.gen_range(0..8);
            let tlen = rng.gen_range(0..8);
            let pattern: String = (0..plen)
                .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
                .collect();
            let topic: String = (0..tlen)
                .map(|_| topic_alphabet[rng.gen_range(0..topic_alphabet.len())])
                .collect();

            let compiled = TopicPattern::compile(&pattern);
            assert_eq!(
                compiled.matches(&topic),
                reference_matches(&pattern, &topic),
                "pattern={:?} topic={:?}",
                pattern,
                topic
            );
        }
    }

    #[test]
    fn test_compile_is_deterministic() {
        let a = TopicPattern::compile("a.*.b");
        let b = TopicPattern::compile("a.*.b");
        for topic in ["a.x.b", "a..b", "a.x.y.b", "q"] {
            assert_eq!(a.matches(topic), b.matches(topic));
        }
    }
}
