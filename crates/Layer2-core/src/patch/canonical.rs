//! 패턴 정규화 및 치환 템플릿 전개
//!
//! - `\i`: 식별자 (`[A-Za-z_$][\w$]*`)로 전개
//! - 템플릿: `$$`, `$&`, `$1`..`$99`, `$<name>`, `$self`

use regex::Captures;

/// `\i` 전개 결과
pub const IDENTIFIER_PATTERN: &str = r"(?:[A-Za-z_$][\w$]*)";

/// 패턴 소스 정규화 (`\i` 전개). 이스케이프된 백슬래시(`\\i`)는 유지
pub fn canonicalize_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('i') => out.push_str(IDENTIFIER_PATTERN),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}

// ============================================================================
// PatchMatch
// ============================================================================

/// 치환 대상 매치 (리터럴 또는 정규식)
pub struct PatchMatch<'a> {
    whole: &'a str,
    caps: Option<&'a Captures<'a>>,
}

impl<'a> PatchMatch<'a> {
    pub(crate) fn literal(whole: &'a str) -> Self {
        Self { whole, caps: None }
    }

    pub(crate) fn captures(caps: &'a Captures<'a>) -> Self {
        Self {
            whole: caps.get(0).map(|m| m.as_str()).unwrap_or(""),
            caps: Some(caps),
        }
    }

    /// 매치된 전체 텍스트
    pub fn text(&self) -> &'a str {
        self.whole
    }

    /// 번호 그룹 (참여하지 않은 그룹은 None)
    pub fn group(&self, index: usize) -> Option<&'a str> {
        if index == 0 {
            return Some(self.whole);
        }
        self.caps.and_then(|c| c.get(index)).map(|m| m.as_str())
    }

    /// 이름 그룹
    pub fn name(&self, name: &str) -> Option<&'a str> {
        self.caps.and_then(|c| c.name(name)).map(|m| m.as_str())
    }

    fn group_count(&self) -> usize {
        self.caps.map(|c| c.len()).unwrap_or(1)
    }

    fn is_regex(&self) -> bool {
        self.caps.is_some()
    }
}

/// 치환 템플릿 전개
pub fn expand_template(template: &str, m: &PatchMatch<'_>, self_reference: &str) -> String {
    let mut out = String::with_capacity(template.len() + self_reference.len());
    let bytes = template.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' || i + 1 >= bytes.len() {
            let next = next_char_boundary(template, i);
            out.push_str(&template[i..next]);
            i = next;
            continue;
        }

        let rest = &template[i + 1..];
        if rest.starts_with('$') {
            out.push('$');
            i += 2;
        } else if rest.starts_with('&') {
            out.push_str(m.text());
            i += 2;
        } else if rest.starts_with("self") {
            out.push_str(self_reference);
            i += 5;
        } else if rest.starts_with('<') && m.is_regex() {
            match rest.find('>') {
                Some(end) => {
                    let name = &rest[1..end];
                    out.push_str(m.name(name).unwrap_or(""));
                    i += 1 + end + 1;
                }
                None => {
                    out.push('$');
                    i += 1;
                }
            }
        } else if let Some((index, consumed)) = group_reference(rest, m.group_count()) {
            out.push_str(m.group(index).unwrap_or(""));
            i += 1 + consumed;
        } else {
            out.push('$');
            i += 1;
        }
    }
    out
}

/// `$n` / `$nn` 해석 - 두 자리 그룹이 존재하면 우선
fn group_reference(rest: &str, group_count: usize) -> Option<(usize, usize)> {
    let digits: Vec<usize> = rest
        .chars()
        .take(2)
        .map_while(|c| c.to_digit(10).map(|d| d as usize))
        .collect();

    if let [first, second] = digits.as_slice() {
        let two = first * 10 + second;
        if two >= 1 && two < group_count {
            return Some((two, 2));
        }
    }
    match digits.first() {
        Some(&one) if one >= 1 && one < group_count => Some((one, 1)),
        _ => None,
    }
}

fn next_char_boundary(s: &str, i: usize) -> usize {
    let mut next = i + 1;
    while next < s.len() && !s.is_char_boundary(next) {
        next += 1;
    }
    next
}
