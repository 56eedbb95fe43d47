//! Performance marker parsing.
//!
//! Scripts carry inline directives of the form `(*kind:value*)`. The lexer
//! splits a script into text and markers in one pass; the parser then cuts
//! the text into sentence segments and applies the markers.
//!
//! Markers of a kind map to segments by index: the Nth `pause` marker
//! belongs to the Nth segment regardless of where it sits in the text.
//! Surplus markers are dropped. `stress` is the exception and matches by
//! token text.

use tracing::debug;

use crate::config::MarkerConfig;
use crate::speech::filler::CONTROL_TOKENS;
use crate::speech::types::{Pause, PauseReason, Segment, SegmentRole, Stress};

const STRESS_STRENGTH: f32 = 1.1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerKind {
    Role,
    Tone,
    Pause,
    Stress,
    Speed,
    Unknown(String),
}

impl MarkerKind {
    fn parse(kind: &str) -> Self {
        match kind.to_lowercase().as_str() {
            "role" => MarkerKind::Role,
            "tone" => MarkerKind::Tone,
            "pause" => MarkerKind::Pause,
            "stress" => MarkerKind::Stress,
            "speed" => MarkerKind::Speed,
            other => MarkerKind::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Text(&'a str),
    /// A parsed marker and its source text, delimiters included.
    Marker(Marker, &'a str),
}

/// Split `script` into text runs and `(*...*)` markers.
pub fn lex(script: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut search_from = 0;

    while let Some(offset) = script[search_from..].find("(*") {
        let open = search_from + offset;
        let inner_start = open + 2;
        let rest = &script[inner_start..];

        let close = rest
            .find('*')
            .filter(|star| rest[star + 1..].starts_with(')'));

        match close {
            Some(star) => {
                if open > text_start {
                    tokens.push(Token::Text(&script[text_start..open]));
                }
                let end = inner_start + star + 2;
                tokens.push(Token::Marker(
                    parse_marker(&rest[..star]),
                    &script[open..end],
                ));
                text_start = end;
                search_from = text_start;
            }
            None => search_from = open + 1,
        }
    }

    if text_start < script.len() {
        tokens.push(Token::Text(&script[text_start..]));
    }
    tokens
}

fn parse_marker(inner: &str) -> Marker {
    let kind_len = inner
        .char_indices()
        .find(|(_, c)| !c.is_ascii_alphabetic())
        .map(|(i, _)| i)
        .unwrap_or(inner.len());

    if kind_len == 0 {
        return Marker {
            kind: MarkerKind::Unknown(String::new()),
            value: inner.trim().to_string(),
        };
    }

    let (kind, rest) = inner.split_at(kind_len);
    let value = rest.strip_prefix(':').unwrap_or(rest).trim();
    Marker {
        kind: MarkerKind::parse(kind),
        value: value.to_string(),
    }
}

/// Rewrite the text between markers, leaving markers verbatim.
pub fn map_text(script: &str, mut f: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(script.len());
    for token in lex(script) {
        match token {
            Token::Text(text) => out.push_str(&f(text)),
            Token::Marker(_, raw) => out.push_str(raw),
        }
    }
    out
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？')
}

/// Split text into sentences. Runs of terminators stay with their sentence,
/// line breaks end a sentence, and a period between digits does not.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\n' || c == '\r' {
            push_sentence(&mut sentences, &mut current);
            i += 1;
            continue;
        }

        current.push(c);

        let decimal_point = c == '.'
            && i > 0
            && chars[i - 1].is_ascii_digit()
            && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());

        if is_terminator(c) && !decimal_point {
            while let Some(&next) = chars.get(i + 1) {
                if is_terminator(next) {
                    current.push(next);
                    i += 1;
                } else {
                    break;
                }
            }
            while let Some((open, end)) = control_token_at(&chars, i + 1) {
                current.push(' ');
                current.extend(&chars[open..end]);
                i = end - 1;
            }
            push_sentence(&mut sentences, &mut current);
        }
        i += 1;
    }
    push_sentence(&mut sentences, &mut current);
    sentences
}

/// Span of a `[token]` control token starting at `start` after optional
/// spaces, end exclusive.
fn control_token_at(chars: &[char], start: usize) -> Option<(usize, usize)> {
    let open = (start..chars.len()).find(|&j| chars[j] != ' ' && chars[j] != '\t')?;
    CONTROL_TOKENS.iter().find_map(|name| {
        let end = open + name.chars().count() + 2;
        let candidate: String = chars.get(open..end)?.iter().collect();
        (candidate == format!("[{}]", name)).then_some((open, end))
    })
}

fn push_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let sentence = current.trim();
    if has_words(sentence) {
        sentences.push(sentence.to_string());
    } else if is_control_only(sentence) {
        // A laugh or break after a terminator belongs to the sentence before it.
        match sentences.last_mut() {
            Some(last) => {
                last.push(' ');
                last.push_str(sentence);
            }
            None => {
                *current = format!("{} ", sentence);
                return;
            }
        }
    }
    current.clear();
}

fn is_control_only(sentence: &str) -> bool {
    !sentence.is_empty() && without_control_tokens(sentence).trim().is_empty()
}

fn has_words(sentence: &str) -> bool {
    without_control_tokens(sentence)
        .chars()
        .any(char::is_alphanumeric)
}

/// `text` with every `[token]` control token removed.
fn without_control_tokens(text: &str) -> String {
    CONTROL_TOKENS
        .iter()
        .fold(text.to_string(), |acc, token| {
            acc.replace(&format!("[{}]", token), "")
        })
}

/// Rule-based parser for performance markers and default pauses.
#[derive(Debug, Clone, Default)]
pub struct MarkerParser {
    config: MarkerConfig,
}

impl MarkerParser {
    pub fn new(config: MarkerConfig) -> Self {
        Self { config }
    }

    /// Parse a script into segments with roles, pauses, stresses and tone hints.
    pub fn parse(&self, script: &str) -> Vec<Segment> {
        let mut markers = Vec::new();
        let mut clean = String::with_capacity(script.len());
        for token in lex(script) {
            match token {
                Token::Text(text) => clean.push_str(text),
                Token::Marker(marker, _) => markers.push(marker),
            }
        }

        let sentences = split_sentences(&clean);
        let total = sentences.len();
        let mut segments: Vec<Segment> = sentences
            .into_iter()
            .enumerate()
            .map(|(idx, sentence)| {
                let mut segment = Segment::new(sentence, role_for_index(idx, total));
                segment.pauses_after = self.punctuation_pauses(&segment.text);
                segment
            })
            .collect();

        self.apply_markers(&markers, &mut segments);

        for segment in &mut segments {
            match segment.role {
                SegmentRole::Opening => segment
                    .pauses_before
                    .push(Pause::new(self.config.opening_pause, PauseReason::Opening)),
                SegmentRole::Punchline => {
                    segment
                        .pauses_before
                        .push(Pause::new(self.config.punchline_pause, PauseReason::Punchline));
                    segment.pauses_after.push(Pause::new(
                        self.config.post_punchline_pause,
                        PauseReason::PostPunchline,
                    ));
                }
                SegmentRole::Outro | SegmentRole::Generic => {}
            }
        }

        segments
    }

    fn apply_markers(&self, markers: &[Marker], segments: &mut [Segment]) {
        let mut role_idx = 0;
        let mut tone_idx = 0;
        let mut pause_idx = 0;
        let mut speed_idx = 0;

        for marker in markers {
            match &marker.kind {
                MarkerKind::Role => {
                    if let Some(segment) = segments.get_mut(role_idx) {
                        if let Some(role) = SegmentRole::from_marker(&marker.value) {
                            segment.role = role;
                        }
                    }
                    role_idx += 1;
                }
                MarkerKind::Tone => {
                    if let Some(segment) = segments.get_mut(tone_idx) {
                        segment.tone_hint =
                            (!marker.value.is_empty()).then(|| marker.value.clone());
                    }
                    tone_idx += 1;
                }
                MarkerKind::Pause => {
                    if let Some(segment) = segments.get_mut(pause_idx) {
                        match marker.value.parse::<f32>() {
                            Ok(secs) if secs.is_finite() && secs >= 0.0 => segment
                                .pauses_before
                                .push(Pause::new(secs, PauseReason::Custom)),
                            _ => debug!(value = %marker.value, "ignoring unparsable pause marker"),
                        }
                    }
                    pause_idx += 1;
                }
                MarkerKind::Speed => {
                    if let Some(segment) = segments.get_mut(speed_idx) {
                        match marker.value.parse::<f32>() {
                            Ok(scale) if scale.is_finite() && scale > 0.0 => {
                                segment.speed_scale = Some(scale.clamp(0.5, 2.0));
                            }
                            _ => debug!(value = %marker.value, "ignoring unparsable speed marker"),
                        }
                    }
                    speed_idx += 1;
                }
                MarkerKind::Stress => {
                    let token = marker.value.as_str();
                    if token.is_empty() {
                        continue;
                    }
                    for segment in segments.iter_mut().filter(|s| s.text.contains(token)) {
                        segment.stresses.push(Stress {
                            token: token.to_string(),
                            strength: STRESS_STRENGTH,
                        });
                    }
                }
                MarkerKind::Unknown(kind) => debug!(kind = %kind, "ignoring unknown marker"),
            }
        }

        let counts = [
            ("role", role_idx),
            ("tone", tone_idx),
            ("pause", pause_idx),
            ("speed", speed_idx),
        ];
        for (kind, count) in counts {
            if count > segments.len() {
                debug!(
                    kind,
                    markers = count,
                    segments = segments.len(),
                    "more markers than segments, surplus ignored"
                );
            }
        }
    }

    fn punctuation_pauses(&self, sentence: &str) -> Vec<Pause> {
        match without_control_tokens(sentence).trim_end().chars().last() {
            Some(',' | '，' | ';' | '；') => {
                vec![Pause::new(self.config.comma_pause, PauseReason::Comma)]
            }
            Some(c) if is_terminator(c) => {
                vec![Pause::new(self.config.period_pause, PauseReason::Period)]
            }
            _ => Vec::new(),
        }
    }
}

fn role_for_index(idx: usize, total: usize) -> SegmentRole {
    if total <= 1 {
        SegmentRole::Punchline
    } else if idx == 0 {
        SegmentRole::Opening
    } else if idx == total - 1 {
        SegmentRole::Punchline
    } else {
        SegmentRole::Generic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> MarkerParser {
        MarkerParser::default()
    }

    #[test]
    fn test_lex_text_and_markers() {
        let tokens = lex("Hi(*pause:0.5*) there (*tone:roast*)");
        assert_eq!(
            tokens,
            vec![
                Token::Text("Hi"),
                Token::Marker(
                    Marker {
                        kind: MarkerKind::Pause,
                        value: "0.5".to_string()
                    },
                    "(*pause:0.5*)"
                ),
                Token::Text(" there "),
                Token::Marker(
                    Marker {
                        kind: MarkerKind::Tone,
                        value: "roast".to_string()
                    },
                    "(*tone:roast*)"
                ),
            ]
        );
    }

    #[test]
    fn test_lex_ignores_unclosed_and_plain_parentheses() {
        let script = "Wait (laughs) and (*pause oops";
        assert_eq!(lex(script), vec![Token::Text(script)]);
        assert_eq!(
            lex("a(*123*)b")[1],
            Token::Marker(
                Marker {
                    kind: MarkerKind::Unknown(String::new()),
                    value: "123".to_string()
                },
                "(*123*)"
            )
        );
    }

    #[test]
    fn test_map_text_keeps_markers() {
        let out = map_text("hi (*tone:laugh*) there", |t| t.to_uppercase());
        assert_eq!(out, "HI (*tone:laugh*) THERE");
    }

    #[test]
    fn test_n_sentences_make_n_segments() {
        let script = "I went to the gym. It was closed! Of course it was? Fine.";
        let segments = parser().parse(script);
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].role, SegmentRole::Opening);
        assert_eq!(segments[1].role, SegmentRole::Generic);
        assert_eq!(segments[2].role, SegmentRole::Generic);
        assert_eq!(segments[3].role, SegmentRole::Punchline);
    }

    #[test]
    fn test_single_sentence_is_punchline() {
        let segments = parser().parse("Just one line.");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].role, SegmentRole::Punchline);
    }

    #[test]
    fn test_trailing_control_token_stays_with_punchline() {
        let segments = parser().parse("A. B! [laugh]");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].text, "B! [laugh]");
        assert_eq!(segments[1].role, SegmentRole::Punchline);
        assert_eq!(segments[1].pauses_before.len(), 1);
        assert_eq!(segments[1].pauses_after[0].reason, PauseReason::Period);

        assert_eq!(
            split_sentences("[laugh]
Hello there. [lbreak] [uv_break]
Bye."),
            vec!["[laugh] Hello there. [lbreak] [uv_break]", "Bye."]
        );
        assert_eq!(
            split_sentences("Gym. Closed! [laugh] Again."),
            vec!["Gym.", "Closed! [laugh]", "Again."]
        );
    }

    #[test]
    fn test_split_sentences_edge_cases() {
        assert_eq!(
            split_sentences("Wait... what?! It costs 3.5 dollars.\nNew line"),
            vec!["Wait...", "what?!", "It costs 3.5 dollars.", "New line"]
        );
        assert_eq!(split_sentences("我去了健身房。关门了！"), vec!["我去了健身房。", "关门了！"]);
        assert!(split_sentences("  ... !! ").is_empty());
    }

    #[test]
    fn test_default_pauses() {
        let segments = parser().parse("Setup here.\nMiddle bit,\nPayoff!");
        let opening = &segments[0];
        assert_eq!(opening.pauses_before, vec![Pause::new(0.8, PauseReason::Opening)]);
        assert_eq!(opening.pauses_after, vec![Pause::new(0.6, PauseReason::Period)]);

        assert_eq!(segments[1].pauses_after, vec![Pause::new(0.35, PauseReason::Comma)]);
        assert!(segments[1].pauses_before.is_empty());

        let punch = &segments[2];
        assert_eq!(punch.pauses_before, vec![Pause::new(0.8, PauseReason::Punchline)]);
        assert_eq!(
            punch.pauses_after,
            vec![
                Pause::new(0.6, PauseReason::Period),
                Pause::new(2.0, PauseReason::PostPunchline)
            ]
        );
    }

    #[test]
    fn test_markers_apply_by_index() {
        let script = "(*tone:deadpan*)First. Second. (*pause:1.5*)(*tone:excited*)Third.";
        let segments = parser().parse(script);

        assert_eq!(segments[0].tone_hint.as_deref(), Some("deadpan"));
        assert_eq!(segments[1].tone_hint.as_deref(), Some("excited"));
        assert_eq!(segments[2].tone_hint, None);

        // The single pause marker lands on the first segment, not the third.
        assert_eq!(segments[0].pauses_before[0], Pause::new(1.5, PauseReason::Custom));
        assert!(
            segments[2]
                .pauses_before
                .iter()
                .all(|p| p.reason != PauseReason::Custom)
        );
    }

    #[test]
    fn test_role_override_changes_default_pauses() {
        let script = "(*role:generic*)(*role:outro*)Hello there. Goodbye now.";
        let segments = parser().parse(script);
        assert_eq!(segments[0].role, SegmentRole::Generic);
        assert_eq!(segments[1].role, SegmentRole::Outro);
        assert!(segments[0].pauses_before.is_empty());
        assert_eq!(segments[1].pauses_after, vec![Pause::new(0.6, PauseReason::Period)]);
    }

    #[test]
    fn test_surplus_markers_ignored() {
        let script = "(*pause:1*)(*pause:2*)(*pause:3*)Only one.";
        let segments = parser().parse(script);
        assert_eq!(segments.len(), 1);
        let custom: Vec<f32> = segments[0]
            .pauses_before
            .iter()
            .filter(|p| p.reason == PauseReason::Custom)
            .map(|p| p.duration_secs)
            .collect();
        assert_eq!(custom, vec![1.0]);
    }

    #[test]
    fn test_stress_matches_text_and_speed_clamps() {
        let script = "(*stress:gym*)(*speed:9*)The gym. My gym! Elsewhere.";
        let segments = parser().parse(script);
        assert_eq!(segments[0].stresses.len(), 1);
        assert_eq!(segments[1].stresses[0].token, "gym");
        assert!(segments[2].stresses.is_empty());
        assert_eq!(segments[0].speed_scale, Some(2.0));
        assert_eq!(segments[1].speed_scale, None);
    }

    #[test]
    fn test_invalid_values_ignored() {
        let script = "(*pause:soon*)(*role:encore*)(*mood:happy*)A. B.";
        let segments = parser().parse(script);
        assert_eq!(segments[0].role, SegmentRole::Opening);
        assert!(
            segments[0]
                .pauses_before
                .iter()
                .all(|p| p.reason != PauseReason::Custom)
        );
    }
}
