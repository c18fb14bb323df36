use tracing::{info, warn};

use crate::gemini::{AnalysisError, GenerationError};
use crate::image_file::ImageFile;
use crate::options::SceneOptions;
use crate::prompt::{compose_prompt, StyleAnalysis};

pub type RequestToken = u64;

/// Handed out when a style image is assigned; the caller runs the
/// analysis and reports back with the token so late results can be
/// matched against the current state.
#[derive(Debug)]
pub struct AnalysisTicket {
    pub token: RequestToken,
    pub image: ImageFile,
}

/// Everything the generation client needs for one submission. Ephemeral
/// by design; built fresh from current state on every attempt.
#[derive(Debug)]
pub struct GenerationRequest {
    pub product: ImageFile,
    pub prompt: String,
    pub style: Option<ImageFile>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StudioError {
    #[error("A generation request is already in progress.")]
    Busy,
    #[error("Upload a product image and make sure the prompt is not empty.")]
    NotReady,
    #[error("The style reference is still being analyzed; wait for it to finish.")]
    AnalysisPending,
}

/// Whether an asynchronous result was applied or discarded as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Current,
    Stale,
}

/// The workspace state machine: images, scene options, the composed
/// prompt, and the flags guarding the one in-flight request.
///
/// All mutation happens on a single control flow; asynchronous calls
/// re-enter through `apply_analysis` / `complete_generation` carrying
/// the token they were issued, and results whose token no longer
/// matches the latest issued one are discarded.
pub struct Studio {
    options: SceneOptions,
    product: Option<ImageFile>,
    style: Option<ImageFile>,
    style_analysis: StyleAnalysis,
    prompt: String,
    generated: Option<ImageFile>,
    busy: bool,
    exporting: bool,
    analysis_token: RequestToken,
    generation_token: RequestToken,
    next_token: RequestToken,
}

impl Studio {
    pub fn new() -> Self {
        let mut studio = Self {
            options: SceneOptions::default(),
            product: None,
            style: None,
            style_analysis: StyleAnalysis::NoReference,
            prompt: String::new(),
            generated: None,
            busy: false,
            exporting: false,
            analysis_token: 0,
            generation_token: 0,
            next_token: 0,
        };
        studio.recompute_prompt();
        studio
    }

    fn issue_token(&mut self) -> RequestToken {
        self.next_token += 1;
        self.next_token
    }

    /// The displayed prompt is a pure function of current state; any
    /// manual override is replaced wholesale here (state-change wins).
    fn recompute_prompt(&mut self) {
        self.prompt = compose_prompt(&self.options, self.product.is_some(), &self.style_analysis);
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn options(&self) -> SceneOptions {
        self.options
    }

    pub fn style_analysis(&self) -> &StyleAnalysis {
        &self.style_analysis
    }

    pub fn generated_image(&self) -> Option<&ImageFile> {
        self.generated.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn set_options(&mut self, options: SceneOptions) {
        self.options = options;
        self.recompute_prompt();
    }

    pub fn set_product_image(&mut self, image: ImageFile) {
        self.product = Some(image);
        self.recompute_prompt();
    }

    /// Assigns a style reference and hands back the one analysis ticket
    /// for it. Any outstanding analysis for a previous reference is
    /// invalidated by the new token.
    pub fn set_style_image(&mut self, image: ImageFile) -> AnalysisTicket {
        self.analysis_token = self.issue_token();
        self.style = Some(image.clone());
        self.style_analysis = StyleAnalysis::Pending;
        self.recompute_prompt();
        AnalysisTicket {
            token: self.analysis_token,
            image,
        }
    }

    pub fn clear_style_image(&mut self) {
        self.analysis_token = self.issue_token();
        self.style = None;
        self.style_analysis = StyleAnalysis::NoReference;
        self.recompute_prompt();
    }

    /// Manual prompt edit. Holds until the next state change, which
    /// regenerates the prompt and overwrites the edit (last-writer-wins
    /// in favor of state changes).
    pub fn override_prompt(&mut self, text: String) {
        self.prompt = text;
    }

    /// Folds an analysis outcome back into the workspace. Results for a
    /// reference that has since been replaced or cleared are dropped.
    pub fn apply_analysis(
        &mut self,
        token: RequestToken,
        outcome: Result<String, AnalysisError>,
    ) -> Applied {
        if token != self.analysis_token {
            warn!("Discarding stale style analysis result (token {token})");
            return Applied::Stale;
        }

        self.style_analysis = match outcome {
            Ok(description) => {
                info!("Style reference analyzed: {description}");
                StyleAnalysis::Resolved(description)
            }
            // Failed analysis clears any stale description; generation
            // proceeds with the generic style clause.
            Err(_) => StyleAnalysis::Unavailable,
        };
        self.recompute_prompt();
        Applied::Current
    }

    /// Checks the preconditions and claims the busy flag for one
    /// generation attempt.
    pub fn begin_generation(&mut self) -> Result<(RequestToken, GenerationRequest), StudioError> {
        if self.busy {
            return Err(StudioError::Busy);
        }
        if self.style_analysis == StyleAnalysis::Pending {
            return Err(StudioError::AnalysisPending);
        }
        let Some(product) = self.product.clone() else {
            return Err(StudioError::NotReady);
        };
        if self.prompt.trim().is_empty() {
            return Err(StudioError::NotReady);
        }

        self.busy = true;
        self.generated = None;
        self.generation_token = self.issue_token();
        Ok((
            self.generation_token,
            GenerationRequest {
                product,
                prompt: self.prompt.clone(),
                style: self.style.clone(),
            },
        ))
    }

    /// Applies a generation outcome and releases the busy flag. A
    /// result carrying an outdated token leaves current state alone.
    pub fn complete_generation(
        &mut self,
        token: RequestToken,
        result: Result<ImageFile, GenerationError>,
    ) -> Applied {
        if token != self.generation_token {
            warn!("Discarding stale generation result (token {token})");
            return Applied::Stale;
        }

        self.busy = false;
        if let Ok(image) = result {
            self.generated = Some(image);
        }
        Applied::Current
    }

    pub fn begin_export(&mut self) -> bool {
        if self.exporting {
            return false;
        }
        self.exporting = true;
        true
    }

    /// Always called, success or not, so the export control becomes
    /// usable again after a swallowed failure.
    pub fn finish_export(&mut self) {
        self.exporting = false;
    }
}

impl Default for Studio {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(name: &str) -> ImageFile {
        ImageFile::new(vec![0x89], "image/png".to_string(), name.to_string())
    }

    #[test]
    fn generation_requires_a_product_image_and_prompt() {
        let mut studio = Studio::new();
        assert_eq!(studio.begin_generation().unwrap_err(), StudioError::NotReady);

        studio.set_product_image(png("product.png"));
        studio.override_prompt("   ".to_string());
        assert_eq!(studio.begin_generation().unwrap_err(), StudioError::NotReady);

        studio.set_options(SceneOptions::default());
        assert!(studio.begin_generation().is_ok());
    }

    #[test]
    fn busy_flag_blocks_a_second_submission_until_completion() {
        let mut studio = Studio::new();
        studio.set_product_image(png("product.png"));

        let (token, _) = studio.begin_generation().unwrap();
        assert_eq!(studio.begin_generation().unwrap_err(), StudioError::Busy);

        studio.complete_generation(token, Ok(png("generated.png")));
        assert!(!studio.is_busy());
        assert!(studio.generated_image().is_some());
        assert!(studio.begin_generation().is_ok());
    }

    #[test]
    fn failed_generation_releases_the_busy_flag_without_a_result() {
        let mut studio = Studio::new();
        studio.set_product_image(png("product.png"));

        let (token, _) = studio.begin_generation().unwrap();
        studio.complete_generation(token, Err(GenerationError::NoImage));
        assert!(!studio.is_busy());
        assert!(studio.generated_image().is_none());
    }

    #[test]
    fn generation_waits_for_a_pending_style_analysis() {
        let mut studio = Studio::new();
        studio.set_product_image(png("product.png"));
        let ticket = studio.set_style_image(png("style.png"));

        assert_eq!(
            studio.begin_generation().unwrap_err(),
            StudioError::AnalysisPending
        );
        assert!(studio.prompt().contains("still being analyzed"));

        studio.apply_analysis(ticket.token, Ok("matte pastels".to_string()));
        assert!(studio.prompt().contains("matte pastels"));
        let (_, request) = studio.begin_generation().unwrap();
        assert!(request.style.is_some());
    }

    #[test]
    fn stale_analysis_results_are_discarded() {
        let mut studio = Studio::new();
        studio.set_product_image(png("product.png"));

        let first = studio.set_style_image(png("style-a.png"));
        let second = studio.set_style_image(png("style-b.png"));

        assert_eq!(
            studio.apply_analysis(first.token, Ok("from the old reference".to_string())),
            Applied::Stale
        );
        assert_eq!(studio.style_analysis(), &StyleAnalysis::Pending);

        assert_eq!(
            studio.apply_analysis(second.token, Ok("soft window light".to_string())),
            Applied::Current
        );
        assert!(studio.prompt().contains("soft window light"));
    }

    #[test]
    fn failed_analysis_degrades_to_the_generic_clause() {
        let mut studio = Studio::new();
        studio.set_product_image(png("product.png"));
        let ticket = studio.set_style_image(png("style.png"));

        studio.apply_analysis(ticket.token, Err(AnalysisError));
        assert_eq!(studio.style_analysis(), &StyleAnalysis::Unavailable);
        assert!(studio.prompt().contains("overall mood"));
        assert!(studio.begin_generation().is_ok());
    }

    #[test]
    fn clearing_the_style_image_invalidates_its_outstanding_analysis() {
        let mut studio = Studio::new();
        studio.set_product_image(png("product.png"));
        let ticket = studio.set_style_image(png("style.png"));

        studio.clear_style_image();
        assert_eq!(
            studio.apply_analysis(ticket.token, Ok("late description".to_string())),
            Applied::Stale
        );
        assert_eq!(studio.style_analysis(), &StyleAnalysis::NoReference);
        assert!(!studio.prompt().contains("Style reference"));
    }

    #[test]
    fn manual_prompt_edits_lose_to_subsequent_state_changes() {
        let mut studio = Studio::new();
        studio.set_product_image(png("product.png"));

        studio.override_prompt("my handcrafted prompt".to_string());
        assert_eq!(studio.prompt(), "my handcrafted prompt");

        studio.set_options(SceneOptions::default());
        assert_ne!(studio.prompt(), "my handcrafted prompt");
        assert!(studio.prompt().contains("natural light"));
    }

    #[test]
    fn stale_generation_results_do_not_touch_current_state() {
        let mut studio = Studio::new();
        studio.set_product_image(png("product.png"));

        let (first_token, _) = studio.begin_generation().unwrap();
        studio.complete_generation(first_token, Err(GenerationError::Connectivity));

        let (second_token, _) = studio.begin_generation().unwrap();
        assert_eq!(
            studio.complete_generation(first_token, Ok(png("old-render.png"))),
            Applied::Stale
        );
        assert!(studio.is_busy());
        assert!(studio.generated_image().is_none());

        studio.complete_generation(second_token, Ok(png("new-render.png")));
        assert_eq!(
            studio.generated_image().unwrap().display_name,
            "new-render.png"
        );
    }

    #[test]
    fn export_flag_is_single_entry_and_always_resettable() {
        let mut studio = Studio::new();
        assert!(studio.begin_export());
        assert!(!studio.begin_export());
        studio.finish_export();
        assert!(studio.begin_export());
    }
}
