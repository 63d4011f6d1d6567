use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Local;
use log::{debug, info, warn};
use opencv::core::{self, Mat, Vector};
use opencv::prelude::*;

use crate::artifacts::{ArtifactWriter, timestamp};
use crate::capture::FrameSlot;
use crate::config::{Config, Region};
use crate::error::Result;
use crate::icon::{ContourCropper, IconMatcher, TeamRecognizer};
use crate::reference::{NameMatch, ReferenceStore};
use crate::region::RegionExtractor;
use crate::temporal::FrameWindow;
use crate::text::{TextRecognizer, edit_distance, has_level_marker, read_text};
use crate::type_chart::{TypeChart, TypeMultiplier};

/// One identified team slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotMatch {
    pub key: Option<String>,
    pub name: Option<String>,
    pub distance: Option<u32>,
    /// The icon matched within the accept distance.
    pub confident: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// The name box was read while a level readout was on screen.
    OpponentSighted {
        text: String,
        found: NameMatch,
        weaknesses: Vec<TypeMultiplier>,
    },
    /// A team list different from the last one was recognized.
    TeamRecognized { stamp: String, slots: Vec<SlotMatch> },
    /// New text in the battle message box.
    MessageRead { text: String },
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub window_size: usize,
    pub diff_threshold: u8,
    pub poll_interval: Duration,
    pub text_interval: Duration,
    pub team_interval: Duration,
    pub team_change_similarity: f64,
    pub battle_mode_keywords: Vec<String>,
    pub battle_mode_max_distance: usize,
}

impl From<&Config> for LoopSettings {
    fn from(config: &Config) -> Self {
        Self {
            window_size: config.window_size,
            diff_threshold: config.diff_threshold,
            poll_interval: config.poll_interval(),
            text_interval: config.text_interval(),
            team_interval: config.team_interval(),
            team_change_similarity: config.team_change_similarity,
            battle_mode_keywords: config.battle_mode_keywords.clone(),
            battle_mode_max_distance: config.battle_mode_max_distance,
        }
    }
}

/// Fraction of matrix elements equal in both images. Differently sized
/// images agree nowhere.
pub fn pixel_agreement(a: &Mat, b: &Mat) -> Result<f64> {
    if a.empty() || b.empty() || a.size()? != b.size()? || a.typ() != b.typ() {
        return Ok(0.0);
    }

    let mut diff = Mat::default();
    core::absdiff(a, b, &mut diff)?;
    let mut channels = Vector::<Mat>::new();
    core::split(&diff, &mut channels)?;

    let mut differing = 0i64;
    for channel in channels.iter() {
        differing += core::count_non_zero(&channel)? as i64;
    }
    let total = a.total() as i64 * a.channels() as i64;
    Ok(1.0 - differing as f64 / total as f64)
}

/// State of the recognition consumer: its frame window, the OCR engine and
/// what it last reported.
pub struct Recognizer {
    extractor: RegionExtractor,
    window: FrameWindow,
    text: Box<dyn TextRecognizer>,
    references: Arc<dyn ReferenceStore>,
    team: TeamRecognizer,
    type_chart: TypeChart,
    artifacts: Option<ArtifactWriter>,
    settings: LoopSettings,
    last_team_box: Option<Mat>,
    last_opponent: Option<String>,
    last_message: Option<String>,
}

impl Recognizer {
    pub fn new(
        extractor: RegionExtractor,
        text: Box<dyn TextRecognizer>,
        references: Arc<dyn ReferenceStore>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            extractor,
            window: FrameWindow::new(settings.window_size),
            text,
            references,
            team: TeamRecognizer::default(),
            type_chart: TypeChart::standard(),
            artifacts: None,
            settings,
            last_team_box: None,
            last_opponent: None,
            last_message: None,
        }
    }

    pub fn with_cropper(mut self, cropper: ContourCropper) -> Self {
        self.team = TeamRecognizer::new(cropper, IconMatcher::default());
        self
    }

    pub fn with_type_chart(mut self, type_chart: TypeChart) -> Self {
        self.type_chart = type_chart;
        self
    }

    pub fn with_artifacts(mut self, artifacts: ArtifactWriter) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn window_mut(&mut self) -> &mut FrameWindow {
        &mut self.window
    }

    fn read_region(&mut self, region: Region) -> Result<String> {
        let Some(masked) =
            self.window
                .masked_region(&self.extractor, region, self.settings.diff_threshold)?
        else {
            return Ok(String::new());
        };
        let language = self.extractor.region(region).language.clone();
        Ok(read_text(self.text.as_mut(), &masked, &language))
    }

    /// Reads the name box while a level readout is visible. Only reports an
    /// opponent different from the previous report.
    pub fn text_cycle(&mut self) -> Result<Option<RecognitionEvent>> {
        let level = self.read_region(Region::Level)?;
        if !has_level_marker(&level) {
            return Ok(None);
        }

        let name = self.read_region(Region::NameBox)?;
        let Some(found) = self.references.find_by_name(&name) else {
            debug!("name box {:?} matched nothing", name);
            return Ok(None);
        };
        if self.last_opponent.as_deref() == Some(found.record.key.as_str()) {
            return Ok(None);
        }

        info!(
            "opponent {} ({}) read as {:?}, distance {}, similarity {:.2}",
            found.record.name, found.record.key, name, found.distance, found.similarity
        );
        let weaknesses = self
            .type_chart
            .weaknesses(&found.record.type1, found.record.type2.as_deref());
        self.last_opponent = Some(found.record.key.clone());
        Ok(Some(RecognitionEvent::OpponentSighted {
            text: name,
            found,
            weaknesses,
        }))
    }

    /// Reports the message box text when it changes.
    pub fn message_cycle(&mut self) -> Result<Option<RecognitionEvent>> {
        let text = self.read_region(Region::Message)?;
        if text.is_empty() || self.last_message.as_deref() == Some(text.as_str()) {
            return Ok(None);
        }
        debug!("message {:?}", text);
        self.last_message = Some(text.clone());
        Ok(Some(RecognitionEvent::MessageRead { text }))
    }

    fn in_battle_mode_screen(&mut self) -> Result<bool> {
        let text = self.read_region(Region::BattleMode)?;
        if text.is_empty() {
            return Ok(false);
        }
        let max = self.settings.battle_mode_max_distance;
        Ok(self
            .settings
            .battle_mode_keywords
            .iter()
            .any(|keyword| edit_distance(&text, keyword) <= max))
    }

    /// On the team preview screen, recognizes the opposing team if it changed
    /// since the last recognition.
    pub fn team_cycle(&mut self) -> Result<Option<RecognitionEvent>> {
        if !self.in_battle_mode_screen()? {
            return Ok(None);
        }

        let Some(oldest) = self.window.oldest() else {
            return Ok(None);
        };
        let team_box = self.extractor.crop(&oldest.image, Region::TeamBox)?;
        if team_box.empty() {
            return Ok(None);
        }

        if let Some(previous) = &self.last_team_box {
            let agreement = pixel_agreement(previous, &team_box)?;
            if agreement > self.settings.team_change_similarity {
                debug!("team box unchanged ({:.2})", agreement);
                return Ok(None);
            }
        }

        let records = self.references.get_all_records();
        let recognition = self.team.recognize(&team_box, &records)?;
        let stamp = timestamp(Local::now());

        if let Some(artifacts) = &self.artifacts {
            if let Err(e) = artifacts
                .save_team_box(&stamp, &team_box)
                .and_then(|_| artifacts.save_icons(&stamp, &recognition.icons))
            {
                warn!("could not save team artifacts: {}", e);
            }
        }

        let slots = (0..recognition.len())
            .map(|slot| match recognition.match_at(slot) {
                Some(matched) => SlotMatch {
                    name: self.references.get_record(&matched.key).map(|r| r.name),
                    confident: self.team.matcher().is_confident(&matched),
                    distance: Some(matched.distance),
                    key: Some(matched.key),
                },
                None => SlotMatch {
                    key: None,
                    name: None,
                    distance: None,
                    confident: false,
                },
            })
            .collect();

        info!("team recognized at {}", stamp);
        self.last_team_box = Some(team_box);
        Ok(Some(RecognitionEvent::TeamRecognized { stamp, slots }))
    }
}

/// Runs a `Recognizer` on its own thread against the shared frame slot.
pub struct RecognitionLoop {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RecognitionLoop {
    pub fn start(
        recognizer: Recognizer,
        slot: Arc<FrameSlot>,
        events: Sender<RecognitionEvent>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("recognition".to_string())
            .spawn(move || recognition_loop(recognizer, slot, events, flag))?;
        info!("recognition loop started");
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("recognition thread panicked");
            }
            info!("recognition loop stopped");
        }
    }
}

impl Drop for RecognitionLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn recognition_loop(
    mut recognizer: Recognizer,
    slot: Arc<FrameSlot>,
    events: Sender<RecognitionEvent>,
    running: Arc<AtomicBool>,
) {
    let text_interval = recognizer.settings.text_interval;
    let team_interval = recognizer.settings.team_interval;
    let poll_interval = recognizer.settings.poll_interval;

    let mut last_sequence = None;
    let mut last_text: Option<Instant> = None;
    let mut last_team: Option<Instant> = None;

    while running.load(Ordering::Acquire) {
        thread::sleep(poll_interval);

        let sequence = slot.latest_sequence();
        if sequence.is_none() || sequence == last_sequence {
            continue;
        }
        match slot.latest() {
            Ok(frame) => {
                last_sequence = Some(frame.sequence);
                if let Err(e) = recognizer.window_mut().push(frame) {
                    warn!("frame dropped: {}", e);
                    continue;
                }
            }
            Err(e) => {
                debug!("no frame: {}", e);
                continue;
            }
        }

        let now = Instant::now();
        if last_text.is_none_or(|t| now.duration_since(t) >= text_interval) {
            last_text = Some(now);
            if !deliver(recognizer.text_cycle(), &events)
                || !deliver(recognizer.message_cycle(), &events)
            {
                return;
            }
        }
        if last_team.is_none_or(|t| now.duration_since(t) >= team_interval) {
            last_team = Some(now);
            if !deliver(recognizer.team_cycle(), &events) {
                return;
            }
        }
    }
}

/// Sends the event, if any. False once the receiver is gone.
fn deliver(cycle: Result<Option<RecognitionEvent>>, events: &Sender<RecognitionEvent>) -> bool {
    match cycle {
        Ok(Some(event)) => {
            if events.send(event).is_err() {
                info!("event receiver gone, recognition loop exiting");
                return false;
            }
        }
        Ok(None) => {}
        Err(e) => warn!("recognition cycle failed: {}", e),
    }
    true
}
