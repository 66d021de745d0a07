use anyhow::{Context, Result, anyhow};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, mpsc};
use tracing::{debug, info};

use crate::grouping::group_text_blocks;
use crate::languages;
use crate::ocr::{
    ProcessedImage, ProgressReporter, ProgressStage, TesseractRecognizer, TextRecognizer,
    downscale_for_ocr, filter_words, ocr_scale, rescale_words,
};
use crate::render::{self, DisplaySize, OverlayFont, OverlayScene, SourceImage};
use crate::session::{OverlaySession, OverlaySnapshot};
use crate::settings::Settings;
use crate::style::OverlayStyleId;
use crate::translate::{BlockRequest, BlockTranslator, TranslationRecord};

const UPLOAD_MIME: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No usable image: missing, empty or undecodable input.
    Acquisition,
    /// The OCR engine failed or could not be started.
    Recognition,
}

/// Terminal failure for the current image. The user has to start over with a new one.
#[derive(Debug, Clone)]
pub struct PipelineFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl PipelineFailure {
    pub fn acquisition(message: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Self {
            kind: FailureKind::Acquisition,
            message: message.into(),
        })
    }

    pub fn recognition(message: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Self {
            kind: FailureKind::Recognition,
            message: message.into(),
        })
    }

    /// Finds a pipeline failure anywhere in an error chain.
    pub fn find(err: &anyhow::Error) -> Option<&PipelineFailure> {
        err.chain().find_map(|cause| cause.downcast_ref::<PipelineFailure>())
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Acquisition => write!(f, "could not load image: {}", self.message),
            FailureKind::Recognition => write!(f, "text recognition failed: {}", self.message),
        }
    }
}

impl std::error::Error for PipelineFailure {}

/// An acquired image, downscaled and re-encoded for the rest of the pipeline.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pixels: RgbaImage,
}

impl ImageUpload {
    pub fn from_path(path: &Path, settings: &Settings) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|err| {
            PipelineFailure::acquisition(format!("failed to read {}: {}", path.display(), err))
        })?;
        Self::from_bytes(&bytes, settings)
    }

    /// Decodes `bytes`, shrinks the image to `upload.max_width` and re-encodes it as JPEG.
    pub fn from_bytes(bytes: &[u8], settings: &Settings) -> Result<Self> {
        if bytes.is_empty() {
            return Err(PipelineFailure::acquisition("no image data"));
        }
        let detected = infer::get(bytes)
            .map(|kind| kind.mime_type())
            .unwrap_or("application/octet-stream");
        if !detected.starts_with("image/") {
            return Err(PipelineFailure::acquisition(format!(
                "expected an image, got '{}'",
                detected
            )));
        }
        let decoded = image::load_from_memory(bytes)
            .map_err(|err| PipelineFailure::acquisition(format!("failed to decode image: {}", err)))?;
        debug!(
            mime = detected,
            width = decoded.width(),
            height = decoded.height(),
            "image acquired"
        );

        let resized = fit_width(decoded, settings.upload_max_width);
        let rgb = resized.to_rgb8();
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, settings.upload_jpeg_quality.clamp(1, 100))
            .encode_image(&rgb)
            .map_err(|err| PipelineFailure::acquisition(format!("failed to compress image: {}", err)))?;
        let pixels = DynamicImage::ImageRgb8(rgb).to_rgba8();
        let (width, height) = pixels.dimensions();
        Ok(Self {
            bytes: encoded,
            mime: UPLOAD_MIME.to_string(),
            width,
            height,
            pixels,
        })
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn source(&self) -> SourceImage<'_> {
        SourceImage {
            bytes: &self.bytes,
            mime: &self.mime,
            width: self.width,
            height: self.height,
        }
    }
}

fn fit_width(image: DynamicImage, max_width: u32) -> DynamicImage {
    if max_width == 0 || image.width() <= max_width {
        return image;
    }
    let ratio = max_width as f32 / image.width() as f32;
    let height = ((image.height() as f32 * ratio).round() as u32).max(1);
    image.resize_exact(max_width, height, FilterType::Lanczos3)
}

/// Long-lived pipeline resources: settings, the shared OCR engine (started on
/// first use), the translator and the overlay session.
pub struct PipelineContext {
    settings: Settings,
    recognizer: OnceCell<Arc<dyn TextRecognizer>>,
    translator: BlockTranslator,
    session: Arc<OverlaySession>,
    font: OverlayFont,
}

impl PipelineContext {
    pub fn new(settings: Settings) -> Result<Self> {
        let translator = BlockTranslator::from_settings(&settings)?;
        let font = OverlayFont::from_settings(&settings);
        Ok(Self::with_parts(settings, translator, font))
    }

    pub fn with_parts(settings: Settings, translator: BlockTranslator, font: OverlayFont) -> Self {
        let session = Arc::new(OverlaySession::new(
            settings.overlay_style,
            settings.overlay_visible,
        ));
        Self {
            settings,
            recognizer: OnceCell::new(),
            translator,
            session,
            font,
        }
    }

    /// Uses `recognizer` instead of starting tesseract.
    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = OnceCell::new_with(Some(recognizer));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn session(&self) -> &Arc<OverlaySession> {
        &self.session
    }

    pub fn font(&self) -> &OverlayFont {
        &self.font
    }

    async fn recognizer(&self) -> Result<Arc<dyn TextRecognizer>> {
        let settings = self.settings.clone();
        let engine = self
            .recognizer
            .get_or_try_init(|| async move {
                let engine = tokio::task::spawn_blocking(move || TesseractRecognizer::init(&settings))
                    .await
                    .map_err(|err| anyhow!("OCR engine start-up task failed: {}", err))??;
                Ok::<Arc<dyn TextRecognizer>, anyhow::Error>(Arc::new(engine))
            })
            .await
            .map_err(|err| PipelineFailure::recognition(format!("{:#}", err)))?;
        Ok(Arc::clone(engine))
    }

    /// Runs OCR on the upload. Returned boxes are in the upload's pixel space.
    pub async fn recognize(
        &self,
        upload: &ImageUpload,
        progress: &ProgressReporter,
    ) -> Result<ProcessedImage> {
        progress.emit(ProgressStage::Preparing, 5);
        let scale = ocr_scale(upload.width, self.settings.ocr_max_width);
        let image = DynamicImage::ImageRgba8(upload.pixels.clone());
        progress.emit(ProgressStage::Preparing, 15);

        let recognizer = self.recognizer().await?;
        progress.emit(ProgressStage::LoadingEngine, 25);
        info!(engine = recognizer.name(), scale, "recognizing text");

        let reporter = progress.clone();
        let recognition = tokio::task::spawn_blocking(move || {
            let scaled = downscale_for_ocr(&image, scale);
            recognizer.recognize(&scaled, &reporter)
        })
        .await
        .map_err(|err| PipelineFailure::recognition(format!("OCR task failed: {}", err)))?
        .map_err(|err| PipelineFailure::recognition(format!("{:#}", err)))?;
        progress.emit(ProgressStage::Processing, 95);

        let words = filter_words(
            rescale_words(recognition.words, scale),
            self.settings.ocr_min_confidence,
        );
        let detected_language = languages::detect_language(&recognition.full_text).to_string();
        debug!(
            words = words.len(),
            language = %detected_language,
            "recognition finished"
        );
        progress.emit(ProgressStage::Complete, 100);

        Ok(ProcessedImage {
            original_image: upload.bytes.clone(),
            mime: upload.mime.clone(),
            width: upload.width,
            height: upload.height,
            extracted_texts: words,
            full_text: recognition.full_text,
            detected_language,
        })
    }

    /// Groups and translates the recognised words, then publishes the records
    /// to the session unless a newer pass has started meanwhile. The records
    /// are returned either way.
    pub async fn translate(
        &self,
        processed: &ProcessedImage,
        target_lang: &str,
    ) -> Vec<TranslationRecord> {
        let ticket = self.session.begin_pass();
        let records = self.translate_records(processed, target_lang, Some(ticket.id())).await;
        if !self.session.commit(ticket, records.clone()) {
            debug!(target = target_lang, "records returned without updating the overlay");
        }
        records
    }

    /// Same as [`translate`](Self::translate) but leaves the session alone.
    /// Used for independent requests that render their own records.
    pub async fn translate_detached(
        &self,
        processed: &ProcessedImage,
        target_lang: &str,
    ) -> Vec<TranslationRecord> {
        self.translate_records(processed, target_lang, None).await
    }

    async fn translate_records(
        &self,
        processed: &ProcessedImage,
        target_lang: &str,
        pass: Option<u64>,
    ) -> Vec<TranslationRecord> {
        let blocks = group_text_blocks(&processed.extracted_texts);
        info!(
            blocks = blocks.len(),
            target = target_lang,
            ?pass,
            "translating blocks"
        );
        let request = BlockRequest {
            source_lang: &self.settings.translation_source_lang,
            target_lang,
            detected_language: &processed.detected_language,
        };
        self.translator.translate_blocks(&blocks, request).await
    }

    /// Acquisition-to-records in one call.
    pub async fn process(
        &self,
        upload: &ImageUpload,
        target_lang: &str,
        progress: &ProgressReporter,
    ) -> Result<Vec<TranslationRecord>> {
        let processed = self.recognize(upload, progress).await?;
        Ok(self.translate(&processed, target_lang).await)
    }

    /// [`process`](Self::process) without publishing to the session.
    pub async fn process_detached(
        &self,
        upload: &ImageUpload,
        target_lang: &str,
        progress: &ProgressReporter,
    ) -> Result<Vec<TranslationRecord>> {
        let processed = self.recognize(upload, progress).await?;
        Ok(self.translate_detached(&processed, target_lang).await)
    }

    /// Feeds displayed-size changes into the session, debounced by
    /// `overlay.resize_debounce_ms`. Runs until `sizes` closes.
    pub async fn follow_viewport(&self, sizes: mpsc::Receiver<DisplaySize>) {
        let delay = Duration::from_millis(self.settings.resize_debounce_ms);
        self.session.debounce_viewport(sizes, delay).await;
    }

    /// Overlay SVG for the current session state. Without an explicit size
    /// the session viewport is used, then the native size.
    pub fn interactive_overlay(
        &self,
        upload: &ImageUpload,
        display: Option<DisplaySize>,
        with_backdrop: bool,
    ) -> String {
        let snapshot = self.session.snapshot();
        let display = display.or(snapshot.viewport);
        self.render_overlay(upload, OverlayView::from(snapshot.as_ref()), display, with_backdrop)
    }

    /// Native-resolution PNG of the image with the current session overlay.
    pub fn export_png(&self, upload: &ImageUpload) -> Result<Vec<u8>> {
        let snapshot = self.session.snapshot();
        self.render_export(upload, OverlayView::from(snapshot.as_ref()))
    }

    pub fn render_overlay(
        &self,
        upload: &ImageUpload,
        view: OverlayView<'_>,
        display: Option<DisplaySize>,
        with_backdrop: bool,
    ) -> String {
        let display = display
            .unwrap_or_else(|| DisplaySize::new(upload.width as f32, upload.height as f32));
        let scene = self.scene(upload, view);
        render::interactive_svg(&scene, &upload.source(), display, with_backdrop)
    }

    pub fn render_export(&self, upload: &ImageUpload, view: OverlayView<'_>) -> Result<Vec<u8>> {
        let scene = self.scene(upload, view);
        render::export_png(&scene, &upload.source(), self.settings.export_mode)
            .with_context(|| "failed to export translated image")
    }

    fn scene<'a>(&'a self, upload: &'a ImageUpload, view: OverlayView<'a>) -> OverlayScene<'a> {
        OverlayScene {
            records: view.records,
            style: view.style,
            visible: view.visible,
            sampler: Some(upload.pixels()),
            font: &self.font,
        }
    }
}

/// Records plus the display choices to draw them with.
#[derive(Debug, Clone, Copy)]
pub struct OverlayView<'a> {
    pub records: &'a [TranslationRecord],
    pub style: OverlayStyleId,
    pub visible: bool,
}

impl<'a> From<&'a OverlaySnapshot> for OverlayView<'a> {
    fn from(snapshot: &'a OverlaySnapshot) -> Self {
        Self {
            records: &snapshot.records,
            style: snapshot.style,
            visible: snapshot.visible,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{BBox, Recognition, RecognizedWord};
    use crate::translate::FallbackDictionary;
    use image::Rgba as Pixel;
    use std::io::Cursor;
    use std::sync::Mutex;

    struct FakeRecognizer {
        words: Vec<RecognizedWord>,
        seen_width: Mutex<Option<u32>>,
    }

    impl FakeRecognizer {
        fn new(words: Vec<RecognizedWord>) -> Self {
            Self {
                words,
                seen_width: Mutex::new(None),
            }
        }
    }

    impl TextRecognizer for FakeRecognizer {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn recognize(&self, image: &DynamicImage, progress: &ProgressReporter) -> Result<Recognition> {
            *self.seen_width.lock().unwrap() = Some(image.width());
            progress.recognizing(1.0);
            let full_text = self
                .words
                .iter()
                .map(|word| word.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            Ok(Recognition {
                words: self.words.clone(),
                full_text,
            })
        }
    }

    struct BrokenRecognizer;

    impl TextRecognizer for BrokenRecognizer {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn recognize(&self, _: &DynamicImage, _: &ProgressReporter) -> Result<Recognition> {
            Err(anyhow!("engine crashed"))
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Pixel([240, 240, 240, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn context(recognizer: Arc<dyn TextRecognizer>) -> PipelineContext {
        let translator =
            BlockTranslator::new(None, None, FallbackDictionary::embedded().unwrap());
        PipelineContext::with_parts(Settings::default(), translator, OverlayFont::default())
            .with_recognizer(recognizer)
    }

    fn word(text: &str, conf: f32, bbox: BBox) -> RecognizedWord {
        RecognizedWord::new(text, conf, bbox)
    }

    #[test]
    fn upload_is_shrunk_and_reencoded() {
        let settings = Settings::default();
        let upload = ImageUpload::from_bytes(&png(2400, 600), &settings).unwrap();
        assert_eq!((upload.width, upload.height), (1200, 300));
        assert_eq!(upload.mime, "image/jpeg");
        assert_eq!(infer::get(&upload.bytes).unwrap().mime_type(), "image/jpeg");
    }

    #[test]
    fn small_upload_keeps_its_size() {
        let upload = ImageUpload::from_bytes(&png(300, 200), &Settings::default()).unwrap();
        assert_eq!((upload.width, upload.height), (300, 200));
    }

    #[test]
    fn bad_input_is_an_acquisition_failure() {
        for bytes in [Vec::new(), b"plain text, not an image".to_vec()] {
            let err = ImageUpload::from_bytes(&bytes, &Settings::default()).unwrap_err();
            let failure = PipelineFailure::find(&err).unwrap();
            assert_eq!(failure.kind, FailureKind::Acquisition);
        }
        let err = ImageUpload::from_path(Path::new("/no/such/image.png"), &Settings::default())
            .unwrap_err();
        assert_eq!(PipelineFailure::find(&err).unwrap().kind, FailureKind::Acquisition);
    }

    #[tokio::test]
    async fn recognition_prescales_filters_and_maps_back() {
        let fake = Arc::new(FakeRecognizer::new(vec![
            word("good", 90.0, BBox::new(50.0, 10.0, 100.0, 30.0)),
            word("morning", 80.0, BBox::new(110.0, 10.0, 200.0, 30.0)),
            word("noise", 20.0, BBox::new(0.0, 100.0, 10.0, 110.0)),
            word("  ", 99.0, BBox::new(0.0, 120.0, 10.0, 130.0)),
        ]));
        let ctx = context(fake.clone());
        let upload = ImageUpload::from_bytes(&png(1000, 400), ctx.settings()).unwrap();
        let (reporter, mut rx) = ProgressReporter::channel();

        let processed = ctx.recognize(&upload, &reporter).await.unwrap();
        assert_eq!(*fake.seen_width.lock().unwrap(), Some(800));
        let texts: Vec<&str> = processed
            .extracted_texts
            .iter()
            .map(|word| word.text.as_str())
            .collect();
        assert_eq!(texts, vec!["good", "morning"]);
        assert_eq!(processed.extracted_texts[0].bbox, BBox::new(62.5, 12.5, 125.0, 37.5));
        assert_eq!(processed.detected_language, "English");

        drop(reporter);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        let percents: Vec<u8> = events.iter().map(|event| event.percent).collect();
        assert_eq!(percents, vec![5, 15, 25, 90, 95, 100]);
        let processing = events
            .iter()
            .filter(|event| event.stage == ProgressStage::Processing)
            .count();
        assert_eq!(processing, 1);
    }

    #[tokio::test]
    async fn engine_errors_are_recognition_failures() {
        let ctx = context(Arc::new(BrokenRecognizer));
        let upload = ImageUpload::from_bytes(&png(100, 100), ctx.settings()).unwrap();
        let err = ctx
            .recognize(&upload, &ProgressReporter::silent())
            .await
            .unwrap_err();
        let failure = PipelineFailure::find(&err).unwrap();
        assert_eq!(failure.kind, FailureKind::Recognition);
        assert!(failure.message.contains("engine crashed"));
    }

    #[tokio::test]
    async fn translation_commits_to_session_and_exports() {
        let fake = Arc::new(FakeRecognizer::new(vec![
            word("good", 90.0, BBox::new(10.0, 10.0, 60.0, 30.0)),
            word("morning", 80.0, BBox::new(70.0, 10.0, 150.0, 30.0)),
        ]));
        let ctx = context(fake);
        let upload = ImageUpload::from_bytes(&png(200, 100), ctx.settings()).unwrap();
        let records = ctx
            .process(&upload, "hi", &ProgressReporter::silent())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].translated_text, "अच्छा सुबह");
        assert_eq!(ctx.session().snapshot().records.as_slice(), records.as_slice());

        let svg = ctx.interactive_overlay(&upload, Some(DisplaySize::new(100.0, 50.0)), false);
        assert!(svg.contains(r#"<rect x="1" y="1""#));

        let png = ctx.export_png(&upload).unwrap();
        let exported = image::load_from_memory(&png).unwrap();
        assert_eq!((exported.width(), exported.height()), (200, 100));
    }

    #[tokio::test]
    async fn detached_passes_leave_session_untouched() {
        let fake = Arc::new(FakeRecognizer::new(vec![
            word("good", 90.0, BBox::new(10.0, 10.0, 60.0, 30.0)),
            word("morning", 80.0, BBox::new(70.0, 10.0, 150.0, 30.0)),
        ]));
        let ctx = context(fake);
        let upload = ImageUpload::from_bytes(&png(200, 100), ctx.settings()).unwrap();
        let silent = ProgressReporter::silent();
        let (hindi, spanish) = tokio::join!(
            ctx.process_detached(&upload, "hi", &silent),
            ctx.process_detached(&upload, "es", &silent),
        );
        assert_eq!(hindi.unwrap()[0].translated_text, "अच्छा सुबह");
        assert_eq!(spanish.unwrap()[0].to_language, "Spanish");

        let snapshot = ctx.session().snapshot();
        assert_eq!(snapshot.generation, 0);
        assert_eq!(snapshot.pass, 0);
        assert!(snapshot.records.is_empty());
    }

    #[tokio::test]
    async fn viewport_changes_drive_overlay_size() {
        let ctx = context(Arc::new(FakeRecognizer::new(Vec::new())));
        let upload = ImageUpload::from_bytes(&png(200, 100), ctx.settings()).unwrap();
        let (tx, rx) = mpsc::channel(4);
        tx.send(DisplaySize::new(150.0, 75.0)).await.unwrap();
        tx.send(DisplaySize::new(100.0, 50.0)).await.unwrap();
        drop(tx);
        ctx.follow_viewport(rx).await;
        let svg = ctx.interactive_overlay(&upload, None, false);
        assert!(svg.contains(r#"width="100" height="50""#));
    }
}
