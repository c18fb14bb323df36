use anyhow::{anyhow, Result};

/// The six lighting treatments offered by the customization panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightingStyle {
    #[default]
    Natural,
    Studio,
    GoldenHour,
    BlueHour,
    Cinematic,
    Dramatic,
}

impl LightingStyle {
    pub const ALL: [LightingStyle; 6] = [
        LightingStyle::Natural,
        LightingStyle::Studio,
        LightingStyle::GoldenHour,
        LightingStyle::BlueHour,
        LightingStyle::Cinematic,
        LightingStyle::Dramatic,
    ];

    /// Label rendered verbatim into the composed prompt.
    pub fn label(self) -> &'static str {
        match self {
            LightingStyle::Natural => "natural light",
            LightingStyle::Studio => "studio lighting",
            LightingStyle::GoldenHour => "golden hour light",
            LightingStyle::BlueHour => "blue hour light",
            LightingStyle::Cinematic => "cinematic lighting",
            LightingStyle::Dramatic => "dramatic lighting",
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            LightingStyle::Natural => "natural",
            LightingStyle::Studio => "studio",
            LightingStyle::GoldenHour => "golden-hour",
            LightingStyle::BlueHour => "blue-hour",
            LightingStyle::Cinematic => "cinematic",
            LightingStyle::Dramatic => "dramatic",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        let normalized = value.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|style| style.keyword() == normalized)
            .ok_or_else(|| {
                anyhow!(
                    "Unknown lighting style '{value}'. Expected one of: {}",
                    keyword_list(Self::ALL.iter().map(|style| style.keyword()))
                )
            })
    }
}

/// The six camera angles offered by the customization panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraPerspective {
    #[default]
    Front,
    TopDown,
    Side,
    Angle45,
    CloseUp,
    Macro,
}

impl CameraPerspective {
    pub const ALL: [CameraPerspective; 6] = [
        CameraPerspective::Front,
        CameraPerspective::TopDown,
        CameraPerspective::Side,
        CameraPerspective::Angle45,
        CameraPerspective::CloseUp,
        CameraPerspective::Macro,
    ];

    /// Label rendered verbatim into the composed prompt.
    pub fn label(self) -> &'static str {
        match self {
            CameraPerspective::Front => "a front view",
            CameraPerspective::TopDown => "a top-down view",
            CameraPerspective::Side => "a side view",
            CameraPerspective::Angle45 => "a 45-degree angle",
            CameraPerspective::CloseUp => "a close-up shot",
            CameraPerspective::Macro => "a macro shot",
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            CameraPerspective::Front => "front",
            CameraPerspective::TopDown => "top-down",
            CameraPerspective::Side => "side",
            CameraPerspective::Angle45 => "45-degree",
            CameraPerspective::CloseUp => "close-up",
            CameraPerspective::Macro => "macro",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        let normalized = value.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|perspective| perspective.keyword() == normalized)
            .ok_or_else(|| {
                anyhow!(
                    "Unknown camera perspective '{value}'. Expected one of: {}",
                    keyword_list(Self::ALL.iter().map(|perspective| perspective.keyword()))
                )
            })
    }
}

fn keyword_list<'a>(keywords: impl Iterator<Item = &'a str>) -> String {
    keywords.collect::<Vec<_>>().join(", ")
}

/// The user's current scene selection. Always carries a valid value for
/// both axes; defaults are the first entry of each option set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SceneOptions {
    pub lighting: LightingStyle,
    pub perspective: CameraPerspective,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_the_first_option_of_each_axis() {
        let options = SceneOptions::default();
        assert_eq!(options.lighting, LightingStyle::Natural);
        assert_eq!(options.perspective, CameraPerspective::Front);
    }

    #[test]
    fn every_keyword_round_trips_through_parse() {
        for style in LightingStyle::ALL {
            assert_eq!(LightingStyle::parse(style.keyword()).unwrap(), style);
        }
        for perspective in CameraPerspective::ALL {
            assert_eq!(
                CameraPerspective::parse(perspective.keyword()).unwrap(),
                perspective
            );
        }
    }

    #[test]
    fn parse_rejects_unknown_keywords_with_the_option_list() {
        let err = LightingStyle::parse("neon").unwrap_err();
        assert!(err.to_string().contains("golden-hour"));
        assert!(CameraPerspective::parse("dutch").is_err());
    }
}
