use futures::future::BoxFuture;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::types::FrameScore;
use super::DetectionError;

/// Opaque per-frame blink scorer (camera + face model).
///
/// `score` is called once per detection poll. Implementations return the
/// most recent frame's result and never buffer.
pub trait FrameScorer: Send {
    fn initialize(&mut self) -> BoxFuture<'_, Result<(), DetectionError>>;

    fn score(&mut self) -> BoxFuture<'_, FrameScore>;
}

/// Blink score from face blendshape categories: the larger of the two eyes.
///
/// `None` means the model found no face this frame.
pub fn blink_score_from_blendshapes(blendshapes: Option<&[(&str, f64)]>) -> FrameScore {
    let Some(categories) = blendshapes else {
        return FrameScore::Absent;
    };
    let find = |name: &str| {
        categories
            .iter()
            .find(|(category, _)| *category == name)
            .map(|(_, score)| *score)
            .unwrap_or(0.0)
    };
    let left = find("eyeBlinkLeft");
    let right = find("eyeBlinkRight");
    FrameScore::face(left.max(right))
}

/// Parse one line of a score feed: a number, or `none` / blank for no face.
pub fn parse_score_line(line: &str) -> Option<FrameScore> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Some(FrameScore::Absent);
    }
    trimmed.parse::<f64>().ok().map(FrameScore::face)
}

/// Reads one score per line from an async source (stdin for the daemon).
///
/// A reader task drains the source as fast as it produces and keeps only
/// the newest frame. Each poll takes the latest frame, waiting only when
/// nothing new arrived since the previous poll. End of input yields absent
/// frames.
pub struct LineScorer<R> {
    source: Option<R>,
    latest: Option<watch::Receiver<FrameScore>>,
    reader: Option<JoinHandle<()>>,
    exhausted: bool,
}

impl<R> LineScorer<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(source: R) -> Self {
        Self {
            source: Some(source),
            latest: None,
            reader: None,
            exhausted: false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    async fn next_frame(&mut self) -> FrameScore {
        if self.exhausted {
            return FrameScore::Absent;
        }
        let Some(latest) = self.latest.as_mut() else {
            return FrameScore::Absent;
        };
        // 已有未读的新帧时立即返回，否则等下一帧
        match latest.changed().await {
            Ok(()) => *latest.borrow_and_update(),
            Err(_) => {
                self.exhausted = true;
                FrameScore::Absent
            }
        }
    }
}

async fn read_lines<R>(source: R, latest: watch::Sender<FrameScore>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = source.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_score_line(&line) {
                Some(frame) => {
                    latest.send_replace(frame);
                }
                None => {
                    tracing::warn!(line = %line, "Ignoring unparsable score line");
                }
            },
            Ok(None) => {
                tracing::info!("Score source reached end of input");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Score source read failed");
                break;
            }
        }
    }
}

impl<R> FrameScorer for LineScorer<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn initialize(&mut self) -> BoxFuture<'_, Result<(), DetectionError>> {
        Box::pin(async move {
            if self.latest.is_some() {
                return Ok(());
            }
            match self.source.take() {
                Some(source) => {
                    let (tx, rx) = watch::channel(FrameScore::Absent);
                    self.reader = Some(tokio::spawn(read_lines(source, tx)));
                    self.latest = Some(rx);
                    Ok(())
                }
                None => Err(DetectionError::ScorerInit(
                    "score source already consumed".to_string(),
                )),
            }
        })
    }

    fn score(&mut self) -> BoxFuture<'_, FrameScore> {
        Box::pin(self.next_frame())
    }
}

impl<R> Drop for LineScorer<R> {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
