//! Comedy styles and the brief handed to the writing team.

use serde::{Deserialize, Serialize};

/// Performance style requested for the set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ComedyStyle {
    /// Everyday details and contradictions.
    Observational,
    /// The comic's own flaws as material.
    SelfDeprecating,
    /// Sharp takes on people and trends.
    Roast,
}

impl ComedyStyle {
    pub fn name(&self) -> &'static str {
        match self {
            ComedyStyle::Observational => "observational",
            ComedyStyle::SelfDeprecating => "self-deprecating",
            ComedyStyle::Roast => "roast",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ComedyStyle::Observational => {
                "Finds laughs in the small details and contradictions of everyday life."
            }
            ComedyStyle::SelfDeprecating => {
                "Turns the performer's own experiences and shortcomings into material."
            }
            ComedyStyle::Roast => "Delivers sharp, exaggerated takes on social trends and people.",
        }
    }

    pub fn tone(&self) -> &'static str {
        match self {
            ComedyStyle::Observational => "relaxed, insightful",
            ComedyStyle::SelfDeprecating => "humble, self-mocking",
            ComedyStyle::Roast => "sharp, exaggerated",
        }
    }

    pub fn pacing(&self) -> &'static str {
        match self {
            ComedyStyle::Observational => "medium tempo with well-placed pauses",
            ComedyStyle::SelfDeprecating => "slightly fast, with visible mood swings",
            ComedyStyle::Roast => "fast, with heavy stress",
        }
    }

    pub fn humor_type(&self) -> &'static str {
        match self {
            ComedyStyle::Observational => "insight",
            ComedyStyle::SelfDeprecating => "self-mockery",
            ComedyStyle::Roast => "satire",
        }
    }

    /// Emotion profile the speech pipeline defaults to for this style.
    pub fn preferred_profile(&self) -> &'static str {
        match self {
            ComedyStyle::Observational => "flat",
            ComedyStyle::SelfDeprecating => "deadpan",
            ComedyStyle::Roast => "roast",
        }
    }

    /// Parse a style name. Accepts the English names and the original
    /// Chinese category labels.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "observational" | "observation" | "观察类" => Some(ComedyStyle::Observational),
            "self-deprecating" | "self_deprecating" | "selfdeprecating" | "自嘲类" => {
                Some(ComedyStyle::SelfDeprecating)
            }
            "roast" | "吐槽类" => Some(ComedyStyle::Roast),
            _ => None,
        }
    }
}

/// List all available style names.
pub fn available_styles() -> Vec<&'static str> {
    vec!["observational", "self-deprecating", "roast"]
}

/// What the team is asked to write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComedyBrief {
    pub topic: String,
    pub style: ComedyStyle,
    pub duration_minutes: u32,
    pub target_audience: String,
}

impl ComedyBrief {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            style: ComedyStyle::Observational,
            duration_minutes: 3,
            target_audience: "young adults".to_string(),
        }
    }

    pub fn with_style(mut self, style: ComedyStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes.max(1);
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.target_audience = audience.into();
        self
    }

    /// The opening task message every agent sees.
    pub fn task_prompt(&self) -> String {
        format!(
            r#"Write a professional stand-up comedy set for the following brief.

[BRIEF]
- Topic: {topic}
- Style: {style} ({description} Tone: {tone}. Pacing: {pacing}.)
- Target length: {minutes} minutes
- Audience: {audience}

[WORKFLOW]
1. ComedyDirector sets the creative strategy.
2. AudienceAnalyzer profiles the audience.
3. JokeWriter writes the set using setup/punchline structure.
4. PerformanceCoach adds performance markers (pauses, stress, tone).
5. QualityController reviews and answers [PASS] or [FAIL].
6. On [FAIL], the set goes back to step 3.
7. On [PASS], QualityController outputs the complete set after [FINAL SCRIPT].

ComedyDirector speaks first."#,
            topic = self.topic,
            style = self.style.name(),
            description = self.style.description(),
            tone = self.style.tone(),
            pacing = self.style.pacing(),
            minutes = self.duration_minutes,
            audience = self.target_audience,
        )
    }
}
