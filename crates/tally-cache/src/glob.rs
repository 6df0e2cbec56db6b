//! # Glob Patterns
//!
//! The subset of Redis `MATCH` syntax the cache layer uses: `*`, `?` and
//! `\` escapes. Character classes are not supported.

/// Whether `key` matches `pattern`.
///
/// ## Example
/// ```rust
/// use tally_cache::glob::glob_match;
///
/// assert!(glob_match("bills:u1:*", "bills:u1:page:2:limit:20"));
/// assert!(!glob_match("bills:u1:*", "bills:u12:page:1:limit:20"));
/// assert!(glob_match("stats:?", "stats:x"));
/// ```
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern = tokenize(pattern);
    let key: Vec<char> = key.chars().collect();

    // Iterative matcher with single-star backtracking.
    let (mut p, mut k) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while k < key.len() {
        match pattern.get(p) {
            Some(Token::Star) => {
                star = Some((p, k));
                p += 1;
            }
            Some(Token::Any) => {
                p += 1;
                k += 1;
            }
            Some(Token::Char(c)) if *c == key[k] => {
                p += 1;
                k += 1;
            }
            _ => match star {
                Some((sp, sk)) => {
                    p = sp + 1;
                    k = sk + 1;
                    star = Some((sp, sk + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|t| matches!(t, Token::Star))
}

/// Escapes glob metacharacters so `value` matches only itself.
///
/// ```rust
/// use tally_cache::glob::{escape, glob_match};
///
/// let pattern = format!("bills:{}:*", escape("user*1"));
/// assert!(glob_match(&pattern, "bills:user*1:page:1"));
/// assert!(!glob_match(&pattern, "bills:user_a_1:page:1"));
/// ```
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Star,
    Any,
    Char(char),
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '*' => Token::Star,
            '?' => Token::Any,
            '\\' => Token::Char(chars.next().unwrap_or('\\')),
            other => Token::Char(other),
        });
    }
    tokens
}
