use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "ocr-overlay-translator",
    version,
    about = "Recognize text in an image, translate it and draw the translation over the original"
)]
struct Cli {
    /// Image to translate (png/jpeg/gif/webp/bmp/tiff)
    #[arg(short = 'i', long = "image")]
    image: Option<String>,

    /// Target language code (default: settings [translation].target_lang)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Overlay style: adaptive, solid, transparent, outline or shadow
    #[arg(short = 's', long = "style")]
    style: Option<String>,

    /// Write the translated image as PNG (default name: translated-image.png)
    #[arg(
        short = 'o',
        long = "output",
        num_args = 0..=1,
        default_missing_value = ocr_overlay_translator::EXPORT_FILE_NAME
    )]
    output: Option<String>,

    /// Write the interactive overlay (image + translated boxes) as SVG
    #[arg(long = "overlay-svg")]
    overlay_svg: Option<String>,

    /// Displayed size used for the overlay SVG, e.g. 640x480
    #[arg(long = "display-size", requires = "overlay_svg")]
    display_size: Option<String>,

    /// Hide the overlay (the export is the bare image)
    #[arg(long = "hide-overlay")]
    hide_overlay: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Show supported target languages and exit
    #[arg(long = "show-languages")]
    show_languages: bool,

    /// Run the HTTP server on the given address (e.g. 127.0.0.1:8787)
    #[arg(long = "serve")]
    serve: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    ocr_overlay_translator::logging::init(cli.verbose)?;

    let output = ocr_overlay_translator::run(ocr_overlay_translator::Config {
        image: cli.image,
        lang: cli.lang,
        style: cli.style,
        output: cli.output,
        overlay_svg: cli.overlay_svg,
        display_size: cli.display_size,
        hide_overlay: cli.hide_overlay,
        settings_path: cli.read_settings,
        show_languages: cli.show_languages,
        serve: cli.serve,
    })
    .await?;

    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
