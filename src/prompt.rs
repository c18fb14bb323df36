use crate::options::SceneOptions;

/// Outcome of the style-reference analysis as seen by the composer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StyleAnalysis {
    /// No style image is set.
    #[default]
    NoReference,
    /// A style image is set and its analysis call is still in flight.
    Pending,
    /// Analysis resolved with a short aesthetic description.
    Resolved(String),
    /// A style image is set but no description is available (analysis
    /// failed or has not run yet).
    Unavailable,
}

const PENDING_CLAUSE: &str =
    "\n\n- Style reference: the provided reference image is still being analyzed...";

const GENERIC_STYLE_CLAUSE: &str = "\n\n- Style reference: adhere closely to the aesthetics, \
color palette, texture, and overall mood of the provided reference image. The goal is to make \
the product look like it belongs to the same visual world as the style reference.";

/// Renders the instruction string sent to the generation backend.
///
/// The result is a pure function of the inputs; callers regenerate it
/// wholesale after every relevant state change instead of patching the
/// previous value.
pub fn compose_prompt(options: &SceneOptions, has_product: bool, style: &StyleAnalysis) -> String {
    if !has_product {
        return String::new();
    }

    let mut prompt = format!(
        "Generate a professional, high-resolution product photograph of the subject in the \
provided image.\n\n\
Key requirements:\n\
- Lighting: light the scene with {}. The lighting should be flattering and bring out the \
product's details.\n\
- Camera perspective: capture the product from {}.\n\
- Background: the background must be clean, non-distracting, and complementary to the \
product. An upscale, precise studio setup is preferred.\n\
- Overall mood: the image should feel premium, clean, and aspirational.",
        options.lighting.label(),
        options.perspective.label()
    );

    match style {
        StyleAnalysis::NoReference => {}
        StyleAnalysis::Pending => prompt.push_str(PENDING_CLAUSE),
        StyleAnalysis::Resolved(description) => prompt.push_str(&format!(
            "\n\n- Style reference: adhere closely to the aesthetics of the provided reference \
image, characterized by {description}. The goal is to make the product look like it belongs \
to the same visual world.",
        )),
        StyleAnalysis::Unavailable => prompt.push_str(GENERIC_STYLE_CLAUSE),
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{CameraPerspective, LightingStyle};

    #[test]
    fn no_product_image_yields_an_empty_prompt() {
        let prompt = compose_prompt(&SceneOptions::default(), false, &StyleAnalysis::NoReference);
        assert!(prompt.is_empty());
    }

    #[test]
    fn every_option_combination_names_both_labels_verbatim() {
        for lighting in LightingStyle::ALL {
            for perspective in CameraPerspective::ALL {
                let options = SceneOptions {
                    lighting,
                    perspective,
                };
                let prompt = compose_prompt(&options, true, &StyleAnalysis::NoReference);
                assert!(prompt.contains(lighting.label()), "missing {:?}", lighting);
                assert!(
                    prompt.contains(perspective.label()),
                    "missing {:?}",
                    perspective
                );
                assert!(!prompt.contains("Style reference"));
            }
        }
    }

    #[test]
    fn pending_analysis_appends_the_placeholder_clause() {
        let prompt = compose_prompt(&SceneOptions::default(), true, &StyleAnalysis::Pending);
        assert!(prompt.contains("still being analyzed"));
    }

    #[test]
    fn resolved_analysis_appends_the_description() {
        let style = StyleAnalysis::Resolved("warm backlight and muted earth tones".to_string());
        let prompt = compose_prompt(&SceneOptions::default(), true, &style);
        assert!(prompt.contains("warm backlight and muted earth tones"));
        assert!(!prompt.contains("still being analyzed"));
    }

    #[test]
    fn unavailable_analysis_falls_back_to_the_generic_clause() {
        let prompt = compose_prompt(&SceneOptions::default(), true, &StyleAnalysis::Unavailable);
        assert!(prompt.contains("color palette, texture, and overall mood"));
    }

    #[test]
    fn clearing_the_style_image_returns_to_the_base_form() {
        let options = SceneOptions::default();
        let with_style = compose_prompt(
            &options,
            true,
            &StyleAnalysis::Resolved("hard noon shadows".to_string()),
        );
        let without_style = compose_prompt(&options, true, &StyleAnalysis::NoReference);
        assert_ne!(with_style, without_style);
        assert!(!without_style.contains("Style reference"));
    }
}
