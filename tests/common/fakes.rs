use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::BoxFuture;

use eyes_closed_punisher::detection::{DetectionError, FrameScore, FrameScorer};
use eyes_closed_punisher::spam::{
    EscalationTiming, HeadlessAudioPresenter, HeadlessMediaPresenter, SpamConfig, SpamController,
};

/// Replays a fixed list of frames, then reports no face.
pub struct ScriptedScorer {
    frames: VecDeque<FrameScore>,
    fail_init: bool,
}

impl ScriptedScorer {
    pub fn new(frames: Vec<FrameScore>) -> Self {
        Self {
            frames: frames.into(),
            fail_init: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            frames: VecDeque::new(),
            fail_init: true,
        }
    }
}

impl FrameScorer for ScriptedScorer {
    fn initialize(&mut self) -> BoxFuture<'_, Result<(), DetectionError>> {
        let fail = self.fail_init;
        Box::pin(async move {
            if fail {
                Err(DetectionError::ScorerInit("camera permission denied".to_string()))
            } else {
                Ok(())
            }
        })
    }

    fn score(&mut self) -> BoxFuture<'_, FrameScore> {
        let frame = self.frames.pop_front().unwrap_or(FrameScore::Absent);
        Box::pin(async move { frame })
    }
}

pub struct Rig {
    pub controller: SpamController,
    pub media: Arc<HeadlessMediaPresenter>,
    pub audio: Arc<HeadlessAudioPresenter>,
}

pub fn rig(config: SpamConfig, files: &[&str]) -> Rig {
    let media = Arc::new(HeadlessMediaPresenter::new());
    let audio = Arc::new(HeadlessAudioPresenter::new());
    let controller = SpamController::new(
        media.clone(),
        audio.clone(),
        config,
        EscalationTiming::default(),
    );
    controller.set_files(
        Some("/media/alarm.mp3".to_string()),
        files.iter().map(|f| f.to_string()).collect(),
    );
    Rig {
        controller,
        media,
        audio,
    }
}
