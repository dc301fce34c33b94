mod motion;
mod scene;

use anyhow::Result;

use dotbox_engine::logging::{init_logging, LoggingConfig};
use dotbox_engine::render::SurfaceConfig;
use dotbox_engine::window::{Runtime, RuntimeConfig};

use scene::DemoScene;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let surface = SurfaceConfig::default();
    log::info!(
        "starting dotbox demo on `{}` at {}x{}",
        surface.id,
        surface.width,
        surface.height
    );

    Runtime::run(RuntimeConfig::default(), surface, DemoScene::default())
}
