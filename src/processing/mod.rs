pub mod archive;
pub mod batch;
pub mod codec;
pub mod devices;
mod pipeline;
mod presets;
mod step;
pub mod transforms;

pub use archive::ArchiveEntry;
pub use batch::BatchDriver;
pub use devices::{DeviceSpec, DisplayType, all_devices, device};
pub use pipeline::Pipeline;
pub use presets::{CustomOptions, PresetFactory};
pub use step::{Phase, Step, StepKind, Transform};
