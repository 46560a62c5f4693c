// laser_engraver: motion scripts, raster conversion and device control for a
// two-axis laser engraver

pub mod communication;
pub mod config;
pub mod engrave_job;
pub mod file_manager;
pub mod protocol;
pub mod raster;
pub mod script;

pub use engrave_job::{
    DeviceTarget, EngraveJob, JobController, JobError, JobState, ProgressEvent, RunOptions,
    RunOutcome, RunSummary,
};
pub use raster::{Bitmap, RasterConverter};
pub use script::{estimate, Estimate, Interpreter, MotionScript, Point, ScriptError};
