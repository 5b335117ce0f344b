//! Request bodies sent to the relay.

use serde::{Deserialize, Serialize};

/// Default target length of one chapter, in characters.
pub const DEFAULT_OUTPUT_LENGTH: u32 = 800;

/// The five background documents that shape every chapter.
///
/// All fields are free text and optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worldview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_plot: Option<String>,
    /// The plot anchor ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_nodes: Option<String>,
}

impl StorySettings {
    pub fn with_characters(mut self, text: impl Into<String>) -> Self {
        self.characters = Some(text.into());
        self
    }

    pub fn with_worldview(mut self, text: impl Into<String>) -> Self {
        self.worldview = Some(text.into());
        self
    }

    pub fn with_scenes(mut self, text: impl Into<String>) -> Self {
        self.scenes = Some(text.into());
        self
    }

    pub fn with_main_plot(mut self, text: impl Into<String>) -> Self {
        self.main_plot = Some(text.into());
        self
    }

    pub fn with_story_nodes(mut self, text: impl Into<String>) -> Self {
        self.story_nodes = Some(text.into());
        self
    }
}

/// Grammatical person the chapter is written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativePov {
    First,
    Second,
    #[default]
    Third,
    /// Third person, impersonal ("it").
    ThirdIt,
}

/// Where the narrative camera sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativePerspective {
    Omniscient,
    /// Locked to one character, see [`UserPreferences::specific_character_name`].
    Specific,
}

/// Reader preferences sent with every generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub single_output_length: u32,
    pub pov: NarrativePov,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perspective: Option<NarrativePerspective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_character_name: Option<String>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            single_output_length: DEFAULT_OUTPUT_LENGTH,
            pov: NarrativePov::default(),
            perspective: None,
            specific_character_name: None,
        }
    }
}

impl UserPreferences {
    pub fn with_pov(mut self, pov: NarrativePov) -> Self {
        self.pov = pov;
        self
    }

    pub fn with_output_length(mut self, length: u32) -> Self {
        self.single_output_length = length;
        self
    }

    pub fn omniscient(mut self) -> Self {
        self.perspective = Some(NarrativePerspective::Omniscient);
        self.specific_character_name = None;
        self
    }

    /// Lock the camera to one character.
    pub fn locked_to(mut self, character: impl Into<String>) -> Self {
        self.perspective = Some(NarrativePerspective::Specific);
        self.specific_character_name = Some(character.into());
        self
    }
}

/// Everything the relay needs to write the next chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub settings: StorySettings,
    #[serde(rename = "userConfig")]
    pub preferences: UserPreferences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_summary: Option<String>,
    /// Branch text picked by the reader, or their own custom action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chosen_branch: Option<String>,
    pub next_chapter_index: u32,
}

impl GenerateRequest {
    /// Create a request for the given chapter. Indices start at 1.
    pub fn new(next_chapter_index: u32) -> Self {
        Self {
            settings: StorySettings::default(),
            preferences: UserPreferences::default(),
            context_summary: None,
            chosen_branch: None,
            next_chapter_index: next_chapter_index.max(1),
        }
    }

    pub fn with_settings(mut self, settings: StorySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_preferences(mut self, preferences: UserPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn with_context_summary(mut self, summary: impl Into<String>) -> Self {
        self.context_summary = Some(summary.into());
        self
    }

    pub fn with_chosen_branch(mut self, branch: impl Into<String>) -> Self {
        self.chosen_branch = Some(branch.into());
        self
    }
}

/// Which compaction tier a ledger summary belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactionMode {
    Phase,
    Global,
}

/// A request to the summarization endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SummaryRequest {
    /// Extract the one-line irreversible fact of a finished chapter.
    ExtractAnchor { title: String, content: String },
    /// Fold ledger text into a single summary line.
    Compact { ledger: String, mode: CompactionMode },
}

#[derive(Debug, Deserialize)]
pub(crate) struct SummaryResponse {
    pub summary: String,
}
