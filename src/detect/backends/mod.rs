pub mod background;
pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use background::BackgroundBackend;
pub use scripted::ScriptedBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
