//! Object detection behind a stable contract.
//!
//! The rest of the crate only sees `Vec<Detection>` in frame pixel space,
//! already confidence-filtered and de-duplicated. Output decoding and NMS stay
//! inside the backends.

mod backend;
pub mod backends;
pub mod nms;
mod result;

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;

pub use backend::DetectorBackend;
pub use backends::{BackgroundBackend, ScriptedBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use nms::non_max_suppression;
pub use result::Detection;

/// Build the configured backend.
pub fn build_backend(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend.as_str() {
        "background" => Ok(Box::new(BackgroundBackend::from_settings(settings))),
        "tract" => {
            #[cfg(feature = "backend-tract")]
            {
                let model_path = settings
                    .model_path
                    .as_ref()
                    .ok_or_else(|| anyhow!("tract backend requires detector.model_path"))?;
                Ok(Box::new(TractBackend::new(model_path, settings)?))
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                Err(anyhow!("tract backend requires the backend-tract feature"))
            }
        }
        other => Err(anyhow!("unknown detector backend '{}'", other)),
    }
}
