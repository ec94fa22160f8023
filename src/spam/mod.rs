//! Escalating media punishment: fair media selection, capped popup
//! tracking, presenter seams and the session controller.

pub mod controller;
pub mod fairness;
pub mod headless;
pub mod presenter;
pub mod spawner;
pub mod types;

pub use controller::SpamController;
pub use fairness::MediaPool;
pub use headless::{HeadlessAudioPresenter, HeadlessMediaPresenter};
pub use presenter::{AudioPresenter, MediaPresenter, PresenterError};
pub use spawner::{generate_popup_id, TrackedPopup, VideoSpawner};
pub use types::{
    classify_media, EscalationTiming, MediaKind, SpamConfig, SpamConfigPatch, SpamStateSnapshot,
    VideoBehavior,
};
