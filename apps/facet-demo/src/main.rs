//! Facet demo: a triangle with live shader reloading.
//!
//! Edit `shaders/triangle.vert` or `shaders/triangle.frag` while the window
//! is open; the pipeline is rebuilt in the background and swapped in between
//! frames.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use std::path::Path;

use facet_app::{run, AppConfig};
use facet_shaders::ShaderSet;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

fn main() -> anyhow::Result<()> {
    let shader_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders");
    let shaders = ShaderSet::new(
        shader_dir.join("triangle.vert"),
        shader_dir.join("triangle.frag"),
    );

    run(AppConfig::new("facet demo", shaders).with_size(WIDTH, HEIGHT))
}
