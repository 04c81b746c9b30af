//! Configuration for the `tile-provider` command-line tool.
//!
//! Every option can be given on the command line or through an environment
//! variable with the `TILES_` prefix:
//!
//! - `TILES_SCALE` - Display scale, destination pixels per image pixel (default: 1.0)
//! - `TILES_VIEWPORT` - Viewport size as `WIDTHxHEIGHT` (default: 1024x768)
//! - `TILES_FORMAT` - `inspect` output format, `text` or `json` (default: text)
//! - `TILES_RECT` - `render` region as `left,top,right,bottom` (default: whole image)
//! - `TILES_OUTPUT` - `render` output path (default: tiles.png)
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use tile_provider::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Command::Inspect(config) => println!("inspecting {}", config.path.display()),
//!     Command::Render(config) => println!("rendering to {}", config.output.display()),
//! }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::tile::Rect;

// =============================================================================
// Default Values
// =============================================================================

/// Default display scale.
pub const DEFAULT_SCALE: f32 = 1.0;

/// Default viewport size.
pub const DEFAULT_VIEWPORT: &str = "1024x768";

/// Default render output path.
pub const DEFAULT_OUTPUT: &str = "tiles.png";

// =============================================================================
// Value Types
// =============================================================================

/// Viewport size in display pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl FromStr for Viewport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
        let width = width
            .trim()
            .parse()
            .map_err(|e| format!("invalid viewport width '{}': {}", width, e))?;
        let height = height
            .trim()
            .parse()
            .map_err(|e| format!("invalid viewport height '{}': {}", height, e))?;
        Ok(Viewport { width, height })
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parse a `left,top,right,bottom` rectangle.
pub fn parse_rect(s: &str) -> Result<Rect, String> {
    let parts = s
        .split(',')
        .map(|part| part.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid rectangle '{}': {}", s, e))?;

    match parts.as_slice() {
        &[left, top, right, bottom] => Ok(Rect::new(left, top, right, bottom)),
        _ => Err(format!(
            "expected left,top,right,bottom, got {} value(s)",
            parts.len()
        )),
    }
}

/// Output format for `inspect`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,

    /// JSON document
    Json,
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tile Provider - multi-resolution region decoding for very large images.
#[derive(Parser, Debug, Clone)]
#[command(name = "tile-provider")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print dimensions, orientation and the tile layout of every tier
    Inspect(InspectConfig),

    /// Decode the tiles covering a region and write them as one image
    Render(RenderConfig),
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ViewConfig {
    /// Image to open.
    pub path: PathBuf,

    /// Display scale: destination pixels per image pixel.
    #[arg(short, long, default_value_t = DEFAULT_SCALE, env = "TILES_SCALE")]
    pub scale: f32,

    /// Viewport size used to lay out tile grids.
    #[arg(long, default_value = DEFAULT_VIEWPORT, env = "TILES_VIEWPORT")]
    pub viewport: Viewport,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ViewConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(format!("scale must be a positive number, got {}", self.scale));
        }

        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(format!(
                "viewport must be at least 1x1, got {}",
                self.viewport
            ));
        }

        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    #[command(flatten)]
    pub view: ViewConfig,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, env = "TILES_FORMAT")]
    pub format: OutputFormat,
}

impl InspectConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.view.validate()
    }
}

#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    #[command(flatten)]
    pub view: ViewConfig,

    /// Region to render in display coordinates, as left,top,right,bottom.
    ///
    /// Defaults to the whole image.
    #[arg(long, value_parser = parse_rect, env = "TILES_RECT")]
    pub rect: Option<Rect>,

    /// Where to write the composited image. The extension picks the format.
    #[arg(short, long, default_value = DEFAULT_OUTPUT, env = "TILES_OUTPUT")]
    pub output: PathBuf,
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.view.validate()?;

        if let Some(rect) = self.rect {
            if rect.is_empty() {
                return Err(format!("render region {} is empty", rect));
            }
        }

        if self.output.as_os_str().is_empty() {
            return Err("output path is required. Set --output or TILES_OUTPUT".to_string());
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
