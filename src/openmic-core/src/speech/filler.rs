//! Filler word injection and control token normalisation.
//!
//! Fillers are inserted as `<word>` markup so an optional polish pass can
//! see (and move or drop) them; [`finalize_line`] removes the markup before
//! synthesis.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::FillerConfig;
use crate::llm::{ModelHandle, reply_lines};
use crate::speech::types::{Refined, Segment};

/// Control tokens understood by the synthesis backends.
pub const CONTROL_TOKENS: [&str; 3] = ["uv_break", "lbreak", "laugh"];

const START_FILLERS: [&str; 6] = ["uh", "so", "well", "呃", "其实", "说实话"];
const MIDDLE_FILLERS: [&str; 5] = ["um", "like", "I mean", "那个", "然后"];
const END_FILLERS: [&str; 5] = ["you know", "right", "okay", "对吧", "是吧"];

const POLISH_PROMPT: &str = "You polish spoken comedy text. Filler words are marked with angle \
brackets, like <uh> or <you know>. Check whether each one sounds natural where it sits. You may \
move it, replace it with a better filler (keep the angle brackets) or delete it, and you may add \
a few more if the line sounds stiff. Do not change any other words. Keep control tokens such as \
[uv_break], [lbreak] and [laugh] exactly as they are. Return only the revised text, one line per \
input line, with the same number of lines.";

fn is_clause_delimiter(c: char) -> bool {
    matches!(c, '，' | '。' | ',' | '.' | '?' | '!' | '！' | '？')
}

fn probability(p: f64) -> f64 {
    if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 }
}

/// Seeded filler inserter with an optional language model polish.
#[derive(Debug, Clone, Default)]
pub struct FillerInjector {
    config: FillerConfig,
}

impl FillerInjector {
    pub fn new(config: FillerConfig) -> Self {
        Self { config }
    }

    /// Insert fillers into segment texts, then polish them with `polish` when
    /// given. A failed or misaligned polish keeps the heuristic result.
    pub async fn inject(
        &self,
        segments: &[Segment],
        polish: Option<&ModelHandle>,
    ) -> Refined<Vec<Segment>> {
        let texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
        let marked = self.insert_fillers(&texts);

        let polished = match polish {
            Some(model) => match polish_lines(model, &marked).await {
                Ok(lines) => Ok(lines),
                Err(reason) => {
                    warn!(%reason, "filler polish failed, keeping heuristic fillers");
                    Err(Some(reason))
                }
            },
            None => Err(None),
        };

        let rebuild = |lines: &[String]| -> Vec<Segment> {
            segments
                .iter()
                .zip(lines)
                .map(|(segment, line)| Segment {
                    text: finalize_line(line),
                    ..segment.clone()
                })
                .collect()
        };

        match polished {
            Ok(lines) => Refined::Model(rebuild(&lines)),
            Err(Some(reason)) => Refined::fallback(rebuild(&marked), reason),
            Err(None) => Refined::heuristic(rebuild(&marked)),
        }
    }

    /// Heuristic pass only. Output keeps `<filler>` markup.
    pub fn insert_fillers(&self, lines: &[String]) -> Vec<String> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        lines
            .iter()
            .map(|line| self.fill_line(line, &mut rng))
            .collect()
    }

    fn fill_line(&self, line: &str, rng: &mut StdRng) -> String {
        let mut out = String::with_capacity(line.len() + 16);
        let mut rest = line;

        while !rest.is_empty() {
            let split = rest.char_indices().find(|(_, c)| is_clause_delimiter(*c));
            let (clause, delimiter, remaining) = match split {
                Some((idx, c)) => {
                    let end = idx + c.len_utf8();
                    (&rest[..idx], &rest[idx..end], &rest[end..])
                }
                None => (rest, "", ""),
            };
            self.fill_clause(clause, rng, &mut out);
            out.push_str(delimiter);
            rest = remaining;
        }
        out
    }

    fn fill_clause(&self, clause: &str, rng: &mut StdRng, out: &mut String) {
        let core = clause.trim();
        if core.is_empty() {
            out.push_str(clause);
            return;
        }
        let lead = &clause[..clause.len() - clause.trim_start().len()];
        let trail = &clause[clause.trim_end().len()..];

        out.push_str(lead);
        if rng.gen_bool(probability(self.config.prob_start)) {
            if let Some(word) = START_FILLERS.choose(rng) {
                out.push_str(&format!("<{}> ", word));
            }
        }

        let words = word_spans(core);
        for (i, &(start, end)) in words.iter().enumerate() {
            out.push_str(&core[start..end]);
            if let Some(&(next_start, _)) = words.get(i + 1) {
                if rng.gen_bool(probability(self.config.prob_middle)) {
                    if let Some(word) = MIDDLE_FILLERS.choose(rng) {
                        out.push_str(&format!(" <{}>", word));
                    }
                }
                out.push_str(&core[end..next_start]);
            }
        }

        if rng.gen_bool(probability(self.config.prob_end)) {
            if let Some(word) = END_FILLERS.choose(rng) {
                out.push_str(&format!(" <{}>", word));
            }
        }
        out.push_str(trail);
    }
}

/// Byte spans of whitespace-separated words.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (idx, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, idx));
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

async fn polish_lines(model: &ModelHandle, lines: &[String]) -> Result<Vec<String>, String> {
    // Empty lines are not sent; the model would drop them anyway.
    let indices: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, _)| idx)
        .collect();
    if indices.is_empty() {
        return Ok(lines.to_vec());
    }

    let joined = indices
        .iter()
        .map(|&idx| lines[idx].as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let reply = model
        .ask(POLISH_PROMPT, &joined, None)
        .await
        .map_err(|e| e.to_string())?;
    let polished = reply_lines(&reply);

    if polished.len() != indices.len() {
        return Err(format!(
            "polish returned {} lines for {} inputs",
            polished.len(),
            indices.len()
        ));
    }

    let mut out = lines.to_vec();
    for (idx, line) in indices.into_iter().zip(polished) {
        out[idx] = line;
    }
    debug!(lines = out.len(), "filler polish applied");
    Ok(out)
}

/// Drop filler markup and canonicalise control tokens.
pub fn finalize_line(line: &str) -> String {
    let stripped: String = line.chars().filter(|c| *c != '<' && *c != '>').collect();
    normalize_control_tokens(&stripped)
}

/// Rewrite every control token into `[token]` form: repeated or stray
/// brackets collapse and bare tokens get wrapped. Idempotent.
pub fn normalize_control_tokens(text: &str) -> String {
    let pattern = format!(r"(?:\[+\s*)?\b({})\b(?:\s*\]+)?", CONTROL_TOKENS.join("|"));
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(text, "[$1]").into_owned(),
        Err(_) => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::speech::types::SegmentRole;
    use std::sync::Arc;

    fn injector(p: f64) -> FillerInjector {
        FillerInjector::new(FillerConfig {
            prob_start: p,
            prob_middle: p,
            prob_end: p,
            seed: 7,
        })
    }

    fn lines() -> Vec<String> {
        vec![
            "I went to the gym, it was closed. Of course!".to_string(),
            "  spaced   out  words ".to_string(),
            "我去了健身房，关门了。".to_string(),
            String::new(),
        ]
    }

    fn count_fillers(text: &str) -> usize {
        text.matches('<').count()
    }

    #[test]
    fn test_zero_probability_leaves_text_unchanged() {
        assert_eq!(injector(0.0).insert_fillers(&lines()), lines());
    }

    #[test]
    fn test_full_probability_fills_every_position() {
        let out = injector(1.0).insert_fillers(&[
            "I went to the gym, it was closed.".to_string(),
            "我去了健身房，关门了。".to_string(),
        ]);
        // Clause "I went to the gym": start + 4 gaps + end.
        // Clause " it was closed": start + 2 gaps + end.
        assert_eq!(count_fillers(&out[0]), 6 + 4);
        // Two clauses of one token each: start + end.
        assert_eq!(count_fillers(&out[1]), 4);
        assert!(out[0].ends_with('.'));
    }

    #[test]
    fn test_positions_use_their_own_word_lists() {
        let out = injector(1.0).insert_fillers(&["alpha beta".to_string()]);
        let fillers: Vec<&str> = out[0]
            .split('<')
            .skip(1)
            .filter_map(|part| part.split('>').next())
            .collect();
        assert_eq!(fillers.len(), 3);
        assert!(START_FILLERS.contains(&fillers[0]));
        assert!(MIDDLE_FILLERS.contains(&fillers[1]));
        assert!(END_FILLERS.contains(&fillers[2]));
    }

    #[test]
    fn test_filler_lists_are_disjoint() {
        for word in START_FILLERS {
            assert!(!MIDDLE_FILLERS.contains(&word));
            assert!(!END_FILLERS.contains(&word));
        }
        for word in MIDDLE_FILLERS {
            assert!(!END_FILLERS.contains(&word));
        }
    }

    #[test]
    fn test_seeded_output_is_reproducible() {
        let injector = injector(0.5);
        assert_eq!(injector.insert_fillers(&lines()), injector.insert_fillers(&lines()));
    }

    #[test]
    fn test_normalize_control_tokens() {
        assert_eq!(normalize_control_tokens("no tokens here"), "no tokens here");
        assert_eq!(normalize_control_tokens("wait laugh now"), "wait [laugh] now");
        assert_eq!(normalize_control_tokens("a [laugh] b"), "a [laugh] b");
        assert_eq!(normalize_control_tokens("a [[[ uv_break ]]] b"), "a [uv_break] b");
        assert_eq!(normalize_control_tokens("a [lbreak b"), "a [lbreak] b");
        assert_eq!(normalize_control_tokens("laughter"), "laughter");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "plain text",
            "bare laugh token",
            "[uv_break] once",
            "[[[lbreak]]] nested [[ laugh]] and uv_break]]",
        ];
        for input in inputs {
            let once = normalize_control_tokens(input);
            assert_eq!(normalize_control_tokens(&once), once, "input: {input}");
        }
    }

    #[test]
    fn test_finalize_strips_markup() {
        assert_eq!(
            finalize_line("<uh> so laugh <you know>."),
            "uh so [laugh] you know."
        );
    }

    fn segments() -> Vec<Segment> {
        vec![
            Segment::new("First bit.", SegmentRole::Opening),
            Segment::new("", SegmentRole::Generic),
            Segment::new("Second bit laugh!", SegmentRole::Punchline),
        ]
    }

    #[tokio::test]
    async fn test_inject_without_model_is_heuristic() {
        let result = injector(0.0).inject(&segments(), None).await;
        assert_eq!(result.fallback_reason(), None);
        assert!(!result.is_model());
        let texts: Vec<&str> = result.value().iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["First bit.", "", "Second bit [laugh]!"]);
    }

    #[tokio::test]
    async fn test_inject_uses_polish() {
        let scripted = Arc::new(ScriptedModel::new(["<um> First bit.\nSecond bit [laugh]!"]));
        let handle = ModelHandle::new(scripted.clone(), "deepseek-chat", 256);

        let result = injector(0.0).inject(&segments(), Some(&handle)).await;
        assert!(result.is_model());
        let segs = result.into_inner();
        assert_eq!(segs[0].text, "um First bit.");
        assert_eq!(segs[1].text, "");
        assert_eq!(segs[2].role, SegmentRole::Punchline);
        assert_eq!(scripted.request_count(), 1);
    }

    #[tokio::test]
    async fn test_polish_line_mismatch_falls_back() {
        let scripted = Arc::new(ScriptedModel::new(["only one line"]));
        let handle = ModelHandle::new(scripted, "deepseek-chat", 256);

        let result = injector(0.0).inject(&segments(), Some(&handle)).await;
        assert!(result.fallback_reason().is_some_and(|r| r.contains("1 lines for 2")));
        assert_eq!(result.value()[0].text, "First bit.");
    }

    #[tokio::test]
    async fn test_polish_error_falls_back() {
        let handle = ModelHandle::new(Arc::new(ScriptedModel::failing("offline")), "m", 256);
        let result = injector(0.0).inject(&segments(), Some(&handle)).await;
        assert!(result.fallback_reason().is_some_and(|r| r.contains("offline")));
    }
}
