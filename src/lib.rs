use anyhow::{Context, Result, anyhow};
use std::path::Path;
use tracing::{info, warn};

pub mod grouping;
pub mod languages;
pub mod logging;
pub mod ocr;
pub mod pipeline;
pub mod render;
pub mod server;
pub mod session;
pub mod settings;
pub mod style;
pub mod translate;

#[cfg(test)]
mod test_util;

pub use grouping::{TextBlock, group_text_blocks};
pub use ocr::{BBox, ProcessedImage, ProgressEvent, ProgressReporter, RecognizedWord, TextRecognizer};
pub use pipeline::{FailureKind, ImageUpload, OverlayView, PipelineContext, PipelineFailure};
pub use render::{DisplaySize, EXPORT_FILE_NAME, ExportMode};
pub use session::{OverlaySession, OverlaySnapshot};
pub use style::{OverlayStyleChoice, OverlayStyleId, PixelSampler, resolve_style};
pub use translate::{BlockTranslator, TranslationRecord, TranslationService, format_results};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub image: Option<String>,
    pub lang: Option<String>,
    pub style: Option<String>,
    pub output: Option<String>,
    pub overlay_svg: Option<String>,
    pub display_size: Option<String>,
    pub hide_overlay: bool,
    pub settings_path: Option<String>,
    pub show_languages: bool,
    pub serve: Option<String>,
}

pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;

    if config.show_languages {
        return Ok(format_languages());
    }
    if let Some(addr) = config.serve.clone() {
        server::run_server(settings, addr).await?;
        return Ok(String::new());
    }
    run_with_settings(config, settings).await
}

pub async fn run_with_settings(config: Config, settings: settings::Settings) -> Result<String> {
    let mut settings = settings;
    let target = resolve_target_lang(config.lang.as_deref(), &settings)?;
    if let Some(style) = config.style.as_deref() {
        settings.overlay_style = style.parse()?;
    }
    if config.hide_overlay {
        settings.overlay_visible = false;
    }
    let display = config
        .display_size
        .as_deref()
        .map(str::parse::<DisplaySize>)
        .transpose()?;

    let image = config
        .image
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| PipelineFailure::acquisition("no image given (use --image)"))?;

    let ctx = PipelineContext::new(settings)?;
    let upload = ImageUpload::from_path(Path::new(image), ctx.settings())?;

    let (reporter, mut events) = ProgressReporter::channel();
    let progress_log = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(stage = ?event.stage, percent = event.percent, "ocr progress");
        }
    });
    let result = ctx.process(&upload, &target, &reporter).await;
    drop(reporter);
    await_progress_log(progress_log).await;
    let records = result?;

    if let Some(path) = config.overlay_svg.as_deref() {
        let svg = ctx.interactive_overlay(&upload, display, true);
        std::fs::write(path, svg)
            .with_context(|| format!("failed to write overlay SVG: {}", path))?;
    }
    if let Some(path) = config.output.as_deref() {
        let png = ctx.export_png(&upload)?;
        std::fs::write(path, png)
            .with_context(|| format!("failed to write exported image: {}", path))?;
        info!(path, "exported translated image");
    }

    if records.is_empty() {
        return Ok("No text found in image.".to_string());
    }
    Ok(format_results(&records))
}

async fn await_progress_log(task: tokio::task::JoinHandle<()>) {
    if let Err(err) = task.await {
        warn!("progress logger stopped: {}", err);
    }
}

fn resolve_target_lang(requested: Option<&str>, settings: &settings::Settings) -> Result<String> {
    let code = requested
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(settings.target_lang.as_str())
        .to_ascii_lowercase();
    if !languages::is_supported(&code) {
        return Err(anyhow!(
            "unsupported target language '{}' (see --show-languages)",
            code
        ));
    }
    Ok(code)
}

fn format_languages() -> String {
    languages::SUPPORTED_LANGUAGES
        .iter()
        .map(|lang| format!("{}\t{} {}", lang.code, lang.flag, lang.name))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_lang_defaults_to_settings() {
        let settings = settings::Settings::default();
        assert_eq!(resolve_target_lang(None, &settings).unwrap(), "hi");
        assert_eq!(resolve_target_lang(Some(" FR "), &settings).unwrap(), "fr");
        assert!(resolve_target_lang(Some("tlh"), &settings).is_err());
    }

    #[test]
    fn language_listing_has_one_line_per_language() {
        let listing = format_languages();
        assert_eq!(listing.lines().count(), languages::SUPPORTED_LANGUAGES.len());
        assert!(listing.lines().any(|line| line.starts_with("hi\t") && line.ends_with("Hindi")));
    }

    #[tokio::test]
    async fn crashed_progress_logger_does_not_fail_the_run() {
        let crashed = tokio::spawn(async {
            panic!("logger crashed");
        });
        await_progress_log(crashed).await;
        await_progress_log(tokio::spawn(async {})).await;
    }

    #[tokio::test]
    async fn missing_image_is_an_acquisition_failure() {
        let err = run_with_settings(Config::default(), settings::Settings::default())
            .await
            .unwrap_err();
        assert_eq!(
            PipelineFailure::find(&err).map(|failure| failure.kind),
            Some(FailureKind::Acquisition)
        );
    }
}
