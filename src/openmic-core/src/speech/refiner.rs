//! Script clean-up before parsing.
//!
//! The model path runs two prompts: a rewrite for speakability, then a pass
//! that places `[laugh]`, `[uv_break]` and `[lbreak]`. The rule-based path
//! strips markdown, turns parenthesised stage cues into control tokens and
//! drops other stage directions. Both keep `(*...*)` performance markers.

use regex::Regex;
use tracing::warn;

use crate::llm::{ModelHandle, reply_lines};
use crate::speech::filler::normalize_control_tokens;
use crate::speech::markers::map_text;
use crate::speech::types::Refined;

const REWRITE_PROMPT: &str = "You rewrite stand-up comedy scripts so they can be read aloud. \
Remove anything that is not spoken: emoji, markdown, stage directions in parentheses. Keep only \
commas, periods, question marks and exclamation marks as punctuation. Spell out numbers and \
abbreviations the way a comedian would say them. Split the text into paragraphs of four or five \
sentences, and always start a new paragraph after a big laugh or a topic change. Keep any \
(*kind:value*) performance markers exactly where they are. Output only the rewritten text, \
paragraphs separated by newlines, no explanations.";

const MARKS_PROMPT: &str = "You are a comedy timing director. Add laugh and pause cues to the \
text using only these tokens: [laugh] for audience laughter, [uv_break] for a short pause, \
[lbreak] for a long pause. Put [laugh] or [lbreak] after a punchline, [uv_break] before a turn \
or a question, and [lbreak] right before a payoff. Do not overdo it within a single sentence. \
Keep the line breaks and any (*kind:value*) markers unchanged and add no other markup.";

const MARKS_TEMPERATURE: f32 = 0.2;

/// Stage cue keywords and the control token each maps to. Checked in order.
const CUE_TOKENS: [(&str, &str); 8] = [
    ("long pause", "[lbreak]"),
    ("长停顿", "[lbreak]"),
    ("长时间停顿", "[lbreak]"),
    ("laugh", "[laugh]"),
    ("笑", "[laugh]"),
    ("pause", "[uv_break]"),
    ("beat", "[uv_break]"),
    ("停顿", "[uv_break]"),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct TextRefiner;

impl TextRefiner {
    pub fn new() -> Self {
        Self
    }

    /// Refine `raw` with the model when given, otherwise (or on failure) with
    /// the rule-based cleaner.
    pub async fn refine(&self, raw: &str, model: Option<&ModelHandle>) -> Refined<String> {
        let Some(model) = model else {
            return Refined::heuristic(self.clean(raw));
        };

        match refine_with_model(model, raw).await {
            Ok(text) => Refined::Model(text),
            Err(reason) => {
                warn!(%reason, "script refinement failed, using rule-based cleaner");
                Refined::fallback(self.clean(raw), reason)
            }
        }
    }

    /// Rule-based clean-up.
    pub fn clean(&self, raw: &str) -> String {
        let cue_re = Regex::new(r"[(（]([^)）\n]{0,30})[)）]").ok();
        let space_re = Regex::new(r"[^\S\n]+").ok();

        let cleaned = map_text(raw, |text| {
            let mut text = text.replace('*', "");
            if let Some(re) = &cue_re {
                text = re
                    .replace_all(&text, |caps: &regex::Captures| cue_token(&caps[1]).to_string())
                    .into_owned();
            }
            // Stray brackets are read aloud by some backends; tokens are rewrapped below.
            let text = text.replace(['[', ']'], " ");
            let text = match &space_re {
                Some(re) => re.replace_all(&text, " ").into_owned(),
                None => text,
            };
            normalize_control_tokens(&text)
        });

        join_lines(&cleaned)
    }
}

fn cue_token(cue: &str) -> &'static str {
    let cue = cue.to_lowercase();
    CUE_TOKENS
        .iter()
        .find(|(keyword, _)| cue.contains(keyword))
        .map(|(_, token)| *token)
        .unwrap_or("")
}

fn join_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

async fn refine_with_model(model: &ModelHandle, raw: &str) -> Result<String, String> {
    let rewritten = model
        .ask(REWRITE_PROMPT, raw, None)
        .await
        .map_err(|e| format!("rewrite pass: {}", e))?;
    let rewritten = reply_lines(&rewritten);
    if rewritten.is_empty() {
        return Err("rewrite pass returned no text".to_string());
    }

    let marked = model
        .ask(MARKS_PROMPT, &rewritten.join("\n"), Some(MARKS_TEMPERATURE))
        .await
        .map_err(|e| format!("timing pass: {}", e))?;
    let marked = reply_lines(&marked);
    if marked.is_empty() {
        return Err("timing pass returned no text".to_string());
    }

    Ok(map_text(&marked.join("\n"), normalize_control_tokens))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::speech::markers::MarkerParser;
    use crate::speech::types::SegmentRole;
    use std::sync::Arc;

    #[test]
    fn test_clean_strips_markdown_and_maps_cues() {
        let raw = "**Hello** everyone! (laughs) I love *code*.\n\n\
                   (walks off stage)   Right?  (long pause) Yes.";
        assert_eq!(
            TextRefiner::new().clean(raw),
            "Hello everyone! [laugh] I love code.\nRight? [lbreak] Yes."
        );
    }

    #[test]
    fn test_clean_keeps_markers_and_rewraps_tokens() {
        let raw = "(*role:setup*)Wait [[ uv_break ]] for it（停顿）done.";
        assert_eq!(
            TextRefiner::new().clean(raw),
            "(*role:setup*)Wait [uv_break] for it [uv_break] done."
        );
    }

    #[test]
    fn test_cleaned_laugh_cue_stays_on_the_punchline() {
        let cleaned = TextRefiner::new().clean("I went to the gym. It was closed! (laughs)");
        let segments = MarkerParser::default().parse(&cleaned);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].text, "It was closed! [laugh]");
        assert_eq!(segments[1].role, SegmentRole::Punchline);
    }

    #[tokio::test]
    async fn test_refine_without_model() {
        let result = TextRefiner::new().refine("Hi (beat) there", None).await;
        assert!(!result.is_model());
        assert_eq!(result.fallback_reason(), None);
        assert_eq!(result.into_inner(), "Hi [uv_break] there");
    }

    #[tokio::test]
    async fn test_refine_two_passes() {
        let scripted = Arc::new(ScriptedModel::new([
            "Hello everyone.\n\nI love code.",
            "Hello everyone. uv_break\nI love code. [[laugh]]",
        ]));
        let handle = ModelHandle::new(scripted.clone(), "deepseek-chat", 1024);

        let result = TextRefiner::new()
            .refine("**Hello** everyone. I love code.", Some(&handle))
            .await;
        assert!(result.is_model());
        assert_eq!(result.into_inner(), "Hello everyone. [uv_break]\nI love code. [laugh]");

        let requests = scripted.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages[1].content, "Hello everyone.\nI love code.");
        assert_eq!(requests[1].temperature, Some(MARKS_TEMPERATURE));
    }

    #[tokio::test]
    async fn test_refine_falls_back_on_second_pass_failure() {
        let scripted = Arc::new(ScriptedModel::new(["Rewritten."]));
        let handle = ModelHandle::new(scripted, "deepseek-chat", 1024);

        let result = TextRefiner::new().refine("Original. (laughter)", Some(&handle)).await;
        assert!(result.fallback_reason().is_some_and(|r| r.starts_with("timing pass")));
        assert_eq!(result.into_inner(), "Original. [laugh]");
    }
}
