//! Region command - convert a rectangle drawn on a rendered page into a
//! page-space region.

use clap::Args;

use pdfregion_core::region::Strategy;
use pdfregion_core::selection::{PixelRect, RegionSelection, scale_for_dpi};

/// Arguments for the region command.
#[derive(Args)]
pub struct RegionArgs {
    /// Column label for the region
    #[arg(short, long)]
    label: String,

    /// Pixel rectangle x0,y0,x1,y1 as drawn on the rendered page
    #[arg(short, long, value_parser = parse_pixels, allow_hyphen_values = true)]
    pixels: PixelRect,

    /// Resolution the page was rendered at
    #[arg(long, default_value_t = 72.0)]
    dpi: f32,

    /// Extraction strategy (text or ocr)
    #[arg(short, long, default_value = "text")]
    strategy: Strategy,
}

fn parse_pixels(s: &str) -> Result<PixelRect, String> {
    let coords = s
        .split(',')
        .map(|c| c.trim().parse::<f32>().map_err(|e| format!("{:?}: {}", c, e)))
        .collect::<Result<Vec<_>, _>>()?;
    match coords.as_slice() {
        [x0, y0, x1, y1] => Ok(PixelRect::from_corners((*x0, *y0), (*x1, *y1))),
        _ => Err(format!("expected x0,y0,x1,y1, got {} values", coords.len())),
    }
}

/// Print the region as a `regions` entry for a config file or `--region`.
pub async fn run(args: RegionArgs) -> anyhow::Result<()> {
    if !(args.dpi.is_finite() && args.dpi > 0.0) {
        anyhow::bail!("DPI must be positive, got {}", args.dpi);
    }

    // Replay the drag so the region comes out of the same state machine the
    // interactive selector uses.
    let mut selection = RegionSelection::new();
    selection.press(args.pixels.x0, args.pixels.y0);
    selection.drag_to(args.pixels.x1, args.pixels.y1);
    selection.release(args.pixels.x1, args.pixels.y1);

    let spec = selection.to_region_spec(&args.label, scale_for_dpi(args.dpi), args.strategy)?;

    println!("{}", serde_json::to_string_pretty(&spec)?);
    eprintln!(
        "--region {}={},{},{},{}@{}",
        spec.label(),
        spec.rect().x0,
        spec.rect().y0,
        spec.rect().x1,
        spec.rect().y1,
        match args.strategy {
            Strategy::TextLayer => "text",
            Strategy::ImageOcr => "ocr",
        }
    );

    Ok(())
}
