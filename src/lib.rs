pub mod asset;
pub mod error;
pub mod renderer;
pub mod settings;

pub use error::{DeviceError, SettingsError};
pub use renderer::{
    DrawMode, DrawParams, GeometrySection, ObjectFlags, RecordingDevice, RenderDevice,
    RenderLookups, RenderModel, RenderModelStats, WgpuDevice,
};
pub use settings::RenderSettings;

/// Installs `env_logger` at `info`, overridable through `RUST_LOG`. Safe to
/// call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
