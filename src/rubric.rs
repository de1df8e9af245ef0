use clap::ValueEnum;
use serde::Serialize;

const GAMING_RUBRIC: &str = "Tu analyses une vidéo de gaming.
Évalue l'intérêt de ce moment sur 10 en cherchant :
- Kills impressionnants
- Comebacks épiques
- Plays techniques
- Moments drôles

Réponds EXACTEMENT dans ce format :
Score: X/10
Description: [ta description en 1-2 phrases]";

const SPORT_RUBRIC: &str = "Tu analyses une vidéo de sport.
Évalue l'intérêt de ce moment sur 10 en cherchant :
- Actions spectaculaires
- Buts ou points
- Exploits techniques
- Moments décisifs

Réponds EXACTEMENT dans ce format :
Score: X/10
Description: [ta description en 1-2 phrases]";

const ACTION_RUBRIC: &str = "Tu analyses une vidéo d'action.
Évalue l'intérêt de ce moment sur 10 en cherchant :
- Scènes dynamiques
- Moments de suspense
- Actions impactantes

Réponds EXACTEMENT dans ce format :
Score: X/10
Description: [ta description en 1-2 phrases]";

/// Content domain of the analysed video; selects the evaluation rubric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VideoType {
    #[default]
    Gaming,
    Sport,
    Action,
}

impl VideoType {
    /// Resolve a caller-supplied tag. Unknown or missing tags fall back to gaming.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some("sport") => Self::Sport,
            Some("action") => Self::Action,
            Some("gaming") | None => Self::Gaming,
            Some(other) => {
                tracing::debug!("unknown video_type `{other}`; using gaming rubric");
                Self::Gaming
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gaming => "gaming",
            Self::Sport => "sport",
            Self::Action => "action",
        }
    }

    /// Prompt text sent alongside the frame.
    pub fn rubric(self) -> &'static str {
        match self {
            Self::Gaming => GAMING_RUBRIC,
            Self::Sport => SPORT_RUBRIC,
            Self::Action => ACTION_RUBRIC,
        }
    }
}
